//! Multipart JPEG egress framing.
//!
//! Every distribution tick sends each client one "part":
//!
//! ```text
//! \r\n--newframe\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: <N>\r\n
//! \r\n
//! <N raw JPEG bytes>
//! ```
//!
//! No outer HTTP response is written; a viewer that wants one (for example a
//! browser expecting `multipart/x-mixed-replace`) gets it from whatever sits
//! in front of the relay.

/// Multipart boundary token written before every part.
pub const BOUNDARY: &str = "newframe";

/// Content type announced for every part.
pub const CONTENT_TYPE: &str = "image/jpeg";

/// Formats the textual part header for a body of `content_length` bytes.
///
/// # Examples
///
/// ```rust
/// use cam_core::protocol::multipart::part_header;
///
/// assert_eq!(
///     part_header(9),
///     "\r\n--newframe\r\nContent-Type: image/jpeg\r\nContent-Length: 9\r\n\r\n"
/// );
/// ```
pub fn part_header(content_length: usize) -> String {
    format!(
        "\r\n--{BOUNDARY}\r\nContent-Type: {CONTENT_TYPE}\r\nContent-Length: {content_length}\r\n\r\n"
    )
}

/// Encodes a complete part: the header immediately followed by `body`.
pub fn encode_part(body: &[u8]) -> Vec<u8> {
    let header = part_header(body.len());
    let mut part = Vec::with_capacity(header.len() + body.len());
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(body);
    part
}
