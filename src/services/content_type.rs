//! Extension → MIME mapping used when minting inline download URLs and when
//! the upload client has to guess the type of a local file.

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

/// Resolve the content type for an object key from its final extension.
///
/// Matching is case-insensitive; keys without a known extension (including
/// keys with no extension at all) resolve to [`FALLBACK_CONTENT_TYPE`].
pub fn content_type_for_key(key: &str) -> &'static str {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let Some((_, extension)) = file_name.rsplit_once('.') else {
        return FALLBACK_CONTENT_TYPE;
    };

    EXTENSION_TYPES
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(extension))
        .map(|(_, mime)| *mime)
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}
