use thiserror::Error;
use url::Url;

/// Errors from feed URL validation at subscribe time.
#[derive(Error, Debug)]
pub enum UrlCheckError {
    /// The URL string could not be parsed.
    #[error("unparseable url: {0}")]
    Unparseable(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
}

/// Validates a URL string for use as a feed source.
///
/// Only parseability and the http/https scheme are enforced here; network
/// reachability and address policy belong to the component that actually
/// fetches the feed.
///
/// # Examples
///
/// ```
/// use feedledger::util::validate_feed_url;
///
/// let url = validate_feed_url("https://example.com/feed.xml").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// assert!(validate_feed_url("not a url").is_err());
/// ```
pub fn validate_feed_url(raw: &str) -> Result<Url, UrlCheckError> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(UrlCheckError::UnsupportedScheme(scheme.to_owned())),
    }
}
