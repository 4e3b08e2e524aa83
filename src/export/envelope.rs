//! Trace envelope handling.
//!
//! The query client's trace channel wraps the protocol document in transport
//! noise (HTTP headers, trace prefixes). The payload runs from the XML
//! declaration to the end of the outermost `CIM` element.

const DECLARATION: &str = "<?xml";
const ROOT_OPEN: &str = "<CIM";
const ROOT_CLOSE: &str = "</CIM>";

/// Slice the embedded document out of a raw trace message.
///
/// Falls back to the `<CIM` start tag when there is no declaration, and to
/// the end of the input when there is no closing tag.
pub fn extract_payload(raw: &str) -> &str {
    let start = raw
        .find(DECLARATION)
        .or_else(|| raw.find(ROOT_OPEN))
        .unwrap_or(0);
    let end = raw[start..]
        .rfind(ROOT_CLOSE)
        .map(|pos| start + pos + ROOT_CLOSE.len())
        .unwrap_or(raw.len());
    &raw[start..end]
}

/// Remove a leading XML declaration, if any.
pub fn strip_declaration(document: &str) -> &str {
    let trimmed = document.trim_start();
    if trimmed.starts_with(DECLARATION) {
        if let Some(end) = trimmed.find("?>") {
            return trimmed[end + 2..].trim_start();
        }
    }
    trimmed
}
