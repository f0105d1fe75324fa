use crate::error::{CrawlError, SourceError};
use crate::result::{RelatedVideo, VideoMetadata};
use crate::source::{RelationSource, is_valid_video_id};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://serpapi.com";

/// Relation source backed by SerpApi's `youtube_video` engine.
pub struct SerpApiSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SerpApiSource {
    pub fn new(api_key: impl Into<String>) -> Result<Self, CrawlError> {
        Self::with_timeout(api_key, 30)
    }

    pub fn with_timeout(api_key: impl Into<String>, timeout_secs: u64) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(concat!("tubegraph/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.div_ceil(2)))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch(&self, id: &str) -> Result<Vec<RelatedVideo>, SourceError> {
        let url = format!("{}/search", self.base_url);
        debug!("Fetching related videos for {}", id);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("engine", "youtube_video"),
                ("v", id),
                ("api_key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(SourceError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(SourceError::SourceUnavailable(format!(
                "HTTP {} for {}",
                status.as_u16(),
                id
            )));
        }

        let body = response.text().await?;
        let data: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::Malformed(format!("invalid JSON for {}: {}", id, e)))?;

        parse_related_videos(&data)
    }
}

impl RelationSource for SerpApiSource {
    async fn fetch_related(&self, id: &str) -> Result<Vec<RelatedVideo>, SourceError> {
        self.fetch(id).await
    }
}

/// Extract the `related_videos` section of a `youtube_video` response.
///
/// Entries without a resolvable video id are dropped.
pub fn parse_related_videos(data: &Value) -> Result<Vec<RelatedVideo>, SourceError> {
    let object = data
        .as_object()
        .ok_or_else(|| SourceError::Malformed("response is not a JSON object".to_string()))?;

    if let Some(error) = object.get("error").and_then(Value::as_str) {
        return Err(SourceError::Malformed(error.to_string()));
    }

    let entries = match object.get("related_videos") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(SourceError::Malformed(
                "related_videos is not an array".to_string(),
            ));
        }
    };

    let mut related = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(id) = resolve_video_id(entry) else {
            debug!("Dropping related entry without a usable video id");
            continue;
        };

        let metadata = VideoMetadata {
            title: entry
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            channel: entry
                .pointer("/channel/name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            view_count: entry.get("views").map(parse_view_count).unwrap_or(0),
            duration_seconds: entry
                .get("length")
                .and_then(Value::as_str)
                .map(parse_video_length)
                .unwrap_or(0),
        };

        related.push(RelatedVideo::with_metadata(id, metadata));
    }

    Ok(related)
}

fn resolve_video_id(entry: &Value) -> Option<String> {
    if let Some(id) = entry.get("video_id").and_then(Value::as_str)
        && is_valid_video_id(id)
    {
        return Some(id.to_string());
    }

    let link = entry.get("link").and_then(Value::as_str)?;
    let id = video_id_from_link(link)?;
    if is_valid_video_id(&id) {
        Some(id)
    } else {
        warn!("Ignoring malformed video id '{}' in link {}", id, link);
        None
    }
}

/// Pull the `v` query parameter out of a watch URL.
pub fn video_id_from_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "v")
        .map(|(_, value)| value.into_owned())
}

/// Convert "MM:SS" or "H:MM:SS" into seconds. Anything else, including
/// values that overflow `u64`, is 0.
pub fn parse_video_length(length: &str) -> u64 {
    let parts: Vec<&str> = length.split(':').map(str::trim).collect();
    let numbers: Option<Vec<u64>> = parts.iter().map(|p| p.parse::<u64>().ok()).collect();

    let seconds = match numbers.as_deref() {
        Some([minutes, seconds]) => minutes.checked_mul(60).and_then(|m| m.checked_add(*seconds)),
        Some([hours, minutes, seconds]) => hours
            .checked_mul(3600)
            .and_then(|h| h.checked_add(minutes.checked_mul(60)?))
            .and_then(|hm| hm.checked_add(*seconds)),
        _ => None,
    };
    seconds.unwrap_or(0)
}

/// Read a view count that is either an integer or a display string such as
/// "12,345 views". The digits of a string are concatenated.
pub fn parse_view_count(views: &Value) -> u64 {
    match views {
        Value::Number(n) => n.as_u64().unwrap_or(0),
        Value::String(s) => {
            let digits: String = s.chars().filter(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    #[test]
    fn test_parse_video_length() {
        assert_eq!(parse_video_length("12:34"), 754);
        assert_eq!(parse_video_length("1:02:45"), 3765);
        assert_eq!(parse_video_length(" 3 : 05 "), 185);
        assert_eq!(parse_video_length("42"), 0);
        assert_eq!(parse_video_length("a:b"), 0);
        assert_eq!(parse_video_length(""), 0);
        assert_eq!(parse_video_length("18446744073709551615:00"), 0);
        assert_eq!(parse_video_length("5124095576030432:00:00"), 0);
        assert_eq!(parse_video_length("0:18446744073709551615"), 18446744073709551615);
    }

    #[test]
    fn test_parse_view_count() {
        assert_eq!(parse_view_count(&json!(1234)), 1234);
        assert_eq!(parse_view_count(&json!("12,345 views")), 12345);
        assert_eq!(parse_view_count(&json!("No views")), 0);
        assert_eq!(parse_view_count(&json!(null)), 0);
    }

    #[test]
    fn test_video_id_from_link() {
        assert_eq!(
            video_id_from_link("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10s"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(video_id_from_link("https://www.youtube.com/shorts/abc"), None);
        assert_eq!(video_id_from_link("not a link"), None);
    }

    #[test]
    fn test_parse_related_videos() {
        let data = json!({
            "related_videos": [
                {
                    "video_id": "aaaaaaaaaaa",
                    "title": "First",
                    "channel": {"name": "Chan"},
                    "views": "1,000 views",
                    "length": "4:05"
                },
                {
                    "link": "https://www.youtube.com/watch?v=bbbbbbbbbbb",
                    "title": "Second",
                    "views": 77
                },
                {
                    "title": "No id at all"
                }
            ]
        });

        let related = parse_related_videos(&data).unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].id, "aaaaaaaaaaa");
        assert_eq!(related[0].metadata.channel, "Chan");
        assert_eq!(related[0].metadata.view_count, 1000);
        assert_eq!(related[0].metadata.duration_seconds, 245);
        assert_eq!(related[1].id, "bbbbbbbbbbb");
        assert_eq!(related[1].metadata.view_count, 77);
        assert_eq!(related[1].metadata.channel, "");
    }

    #[test]
    fn test_parse_related_with_overflowing_length() {
        let data = json!({
            "related_videos": [
                {"video_id": "aaaaaaaaaaa", "length": "18446744073709551615:00"},
                {"video_id": "bbbbbbbbbbb", "length": "1:00"}
            ]
        });

        let related = parse_related_videos(&data).unwrap();
        assert_eq!(related.len(), 2);
        assert_eq!(related[0].metadata.duration_seconds, 0);
        assert_eq!(related[1].metadata.duration_seconds, 60);
    }

    #[test]
    fn test_parse_missing_related_is_empty() {
        let related = parse_related_videos(&json!({"video_results": []})).unwrap();
        assert!(related.is_empty());
    }

    #[test]
    fn test_parse_error_field_is_malformed() {
        let result = parse_related_videos(&json!({"error": "Invalid API key"}));
        assert!(matches!(result, Err(SourceError::Malformed(msg)) if msg == "Invalid API key"));
    }

    #[tokio::test]
    async fn test_fetch_related_from_server() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("engine", "youtube_video"))
            .and(query_param("v", "ccccccccccc"))
            .and(query_param("api_key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "related_videos": [
                    {"video_id": "ddddddddddd", "title": "Related", "length": "1:00"}
                ]
            })))
            .mount(&mock_server)
            .await;

        let source = SerpApiSource::new("secret")
            .unwrap()
            .with_base_url(mock_server.uri());
        let related = source.fetch_related("ccccccccccc").await.unwrap();

        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "ddddddddddd");
        assert_eq!(related[0].metadata.duration_seconds, 60);
    }

    #[tokio::test]
    async fn test_fetch_rate_limited() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&mock_server)
            .await;

        let source = SerpApiSource::new("k").unwrap().with_base_url(mock_server.uri());
        let result = source.fetch_related("ccccccccccc").await;

        match result {
            Err(SourceError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_server_error_is_unavailable() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let source = SerpApiSource::new("k").unwrap().with_base_url(mock_server.uri());
        let result = source.fetch_related("ccccccccccc").await;
        assert!(matches!(result, Err(SourceError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_fetch_non_json_is_malformed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&mock_server)
            .await;

        let source = SerpApiSource::new("k").unwrap().with_base_url(mock_server.uri());
        let result = source.fetch_related("ccccccccccc").await;
        assert!(matches!(result, Err(SourceError::Malformed(_))));
    }
}
