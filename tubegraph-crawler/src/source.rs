use crate::error::SourceError;
use crate::result::RelatedVideo;
use std::future::Future;

/// Length of a YouTube video id.
pub const VIDEO_ID_LEN: usize = 11;

/// Anything that can answer "which videos are related to this one".
///
/// Implementations validate their own response shape: every returned
/// [`RelatedVideo`] must carry a usable id.
pub trait RelationSource: Send + Sync {
    fn fetch_related(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Vec<RelatedVideo>, SourceError>> + Send;
}

/// Check that `id` looks like a video id: 11 characters from the URL-safe
/// base64 alphabet.
pub fn is_valid_video_id(id: &str) -> bool {
    id.len() == VIDEO_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_video_ids() {
        assert!(is_valid_video_id("dQw4w9WgXcQ"));
        assert!(is_valid_video_id("a-b_c-d_e-f"));
    }

    #[test]
    fn test_invalid_video_ids() {
        assert!(!is_valid_video_id(""));
        assert!(!is_valid_video_id("dQw4w9WgXc"));
        assert!(!is_valid_video_id("dQw4w9WgXcQQ"));
        assert!(!is_valid_video_id("dQw4w9WgX?Q"));
    }
}
