mod entries;
mod feeds;
mod locks;
mod schema;
mod types;

pub use locks::ChannelGuard;
pub use schema::Store;
pub use types::{CandidateEntry, Feed, SeenEntry, StoreError};
