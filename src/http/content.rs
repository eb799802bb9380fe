//! Content-type classification for body logging.

/// Whether a body with this content type is safe to print in logs.
///
/// Matches `text/*` and anything mentioning json, xml or html. Case-sensitive,
/// as MIME tokens are conventionally lowercase. Empty is not printable.
pub fn is_printable(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("xml")
        || content_type.contains("html")
}
