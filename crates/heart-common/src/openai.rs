use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct OpenAiClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub default_timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl OpenAiClientConfig {
    pub fn from_env() -> Self {
        let base_url = std::env::var("OPENAI_BASE_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();

        let default_timeout = std::env::var("OPENAI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(30));

        let max_error_body_bytes = std::env::var("OPENAI_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(8 * 1024);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            default_timeout,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OpenAiClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid api key header: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("upstream returned error: status={status} message={message}")]
    Upstream { status: StatusCode, message: String },

    #[error("upstream returned non-JSON error: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },

    #[error("thread {thread_id} has no assistant text reply")]
    NoAssistantReply { thread_id: String },
}

/// Client for the OpenAI Assistants (v2) thread/run endpoints.
#[derive(Clone)]
pub struct AssistantClient {
    config: OpenAiClientConfig,
    http: reqwest::Client,
}

impl AssistantClient {
    pub fn new(config: OpenAiClientConfig) -> Result<Self, OpenAiClientError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));

        let http = reqwest::Client::builder()
            .user_agent("heart/heart-server")
            .default_headers(headers)
            .build()?;
        Ok(Self { config, http })
    }

    pub async fn create_thread(&self) -> Result<String, OpenAiClientError> {
        let url = format!("{}/threads", self.config.base_url);
        let thread: ThreadObject = self.post_json(&url, &serde_json::json!({})).await?;
        debug!(thread_id = %thread.id, "thread created");
        Ok(thread.id)
    }

    pub async fn add_user_message(
        &self,
        thread_id: &str,
        content: &str,
    ) -> Result<(), OpenAiClientError> {
        let url = format!("{}/threads/{thread_id}/messages", self.config.base_url);
        let body = CreateMessageRequest {
            role: "user",
            content,
        };
        let _: ThreadMessage = self.post_json(&url, &body).await?;
        Ok(())
    }

    pub async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<Run, OpenAiClientError> {
        let url = format!("{}/threads/{thread_id}/runs", self.config.base_url);
        let body = CreateRunRequest { assistant_id };
        let run: Run = self.post_json(&url, &body).await?;
        debug!(thread_id, run_id = %run.id, status = %run.status, "run created");
        Ok(run)
    }

    pub async fn retrieve_run(
        &self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Run, OpenAiClientError> {
        let url = format!("{}/threads/{thread_id}/runs/{run_id}", self.config.base_url);
        self.get_json(&url).await
    }

    /// Returns the text of the newest assistant message on the thread.
    pub async fn latest_assistant_text(&self, thread_id: &str) -> Result<String, OpenAiClientError> {
        let url = format!(
            "{}/threads/{thread_id}/messages?order=desc",
            self.config.base_url
        );
        let list: MessageList = self.get_json(&url).await?;
        list.data
            .iter()
            .filter(|m| m.role == "assistant")
            .find_map(|m| m.first_text())
            .map(str::to_string)
            .ok_or_else(|| OpenAiClientError::NoAssistantReply {
                thread_id: thread_id.to_string(),
            })
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, OpenAiClientError> {
        let resp = self
            .http
            .post(url)
            .timeout(self.config.default_timeout)
            .json(body)
            .send()
            .await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OpenAiClientError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.config.default_timeout)
            .send()
            .await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    async fn parse_json_response<T: DeserializeOwned>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, OpenAiClientError> {
        if resp.status().is_success() {
            let bytes = resp.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> OpenAiClientError {
        let status = resp.status();
        let bytes = match resp.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to read upstream error body");
                return OpenAiClientError::UpstreamBody {
                    status,
                    body: "<failed to read error body>".to_string(),
                };
            }
        };
        if let Ok(parsed) = serde_json::from_slice::<OpenAiErrorEnvelope>(&bytes) {
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| "unknown upstream error".to_string());
            return OpenAiClientError::Upstream { status, message };
        }
        OpenAiClientError::UpstreamBody {
            status,
            body: limited_text(&bytes, max_error_body_bytes),
        }
    }
}

/// Lossy UTF-8 of at most `max_bytes` of `bytes`.
fn limited_text(bytes: &[u8], max_bytes: usize) -> String {
    let end = bytes.len().min(max_bytes);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiErrorObject,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorObject {
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateMessageRequest<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    assistant_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub last_error: Option<RunError>,
}

impl Run {
    /// Human-readable failure reason, if the upstream supplied one.
    pub fn failure_reason(&self) -> Option<String> {
        self.last_error
            .as_ref()
            .map(|e| match (&e.code, &e.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "unknown error".to_string(),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunError {
    pub code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<ThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ThreadMessage {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

impl ThreadMessage {
    fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|c| c.r#type == "text")
            .and_then(|c| c.text.as_ref())
            .map(|t| t.value.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    r#type: String,
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> AssistantClient {
        AssistantClient::new(OpenAiClientConfig {
            base_url: server.uri(),
            api_key: "sk-test".to_string(),
            default_timeout: Duration::from_secs(5),
            max_error_body_bytes: 64,
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn create_thread_sends_auth_and_beta_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("openai-beta", "assistants=v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "thread_abc",
                "object": "thread"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).create_thread().await.unwrap();
        assert_eq!(id, "thread_abc");
    }

    #[tokio::test]
    async fn create_run_posts_assistant_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads/thread_abc/runs"))
            .and(body_json(serde_json::json!({ "assistant_id": "asst_1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "run_1",
                "status": "queued",
                "last_error": null
            })))
            .mount(&server)
            .await;

        let run = client_for(&server)
            .create_run("thread_abc", "asst_1")
            .await
            .unwrap();
        assert_eq!(run.id, "run_1");
        assert_eq!(run.status, "queued");
        assert!(run.failure_reason().is_none());
    }

    #[tokio::test]
    async fn latest_assistant_text_skips_user_messages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_abc/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "role": "user", "content": [{ "type": "text", "text": { "value": "question" } }] },
                    { "role": "assistant", "content": [
                        { "type": "image_file", "image_file": { "file_id": "f1" } },
                        { "type": "text", "text": { "value": "Recommendation:\nNone", "annotations": [] } }
                    ] }
                ]
            })))
            .mount(&server)
            .await;

        let text = client_for(&server)
            .latest_assistant_text("thread_abc")
            .await
            .unwrap();
        assert_eq!(text, "Recommendation:\nNone");
    }

    #[tokio::test]
    async fn missing_assistant_reply_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/thread_abc/messages"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": [] })),
            )
            .mount(&server)
            .await;

        let err = client_for(&server)
            .latest_assistant_text("thread_abc")
            .await
            .unwrap_err();
        assert!(matches!(err, OpenAiClientError::NoAssistantReply { .. }));
    }

    #[tokio::test]
    async fn upstream_error_envelope_is_parsed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/threads/t/runs/r"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "message": "No run found", "type": "invalid_request_error" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).retrieve_run("t", "r").await.unwrap_err();
        match err {
            OpenAiClientError::Upstream { status, message } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(message, "No run found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn long_error_envelope_keeps_its_message() {
        let server = MockServer::start().await;
        let message = format!("Rate limit reached for assistants. {}", "Retry later. ".repeat(20));
        Mock::given(method("POST"))
            .and(path("/threads/t/runs"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": { "message": &message, "type": "requests", "code": "rate_limit_exceeded" }
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).create_run("t", "asst").await.unwrap_err();
        match err {
            OpenAiClientError::Upstream { status, message: got } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(got, message);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn limited_text_cuts_at_byte_limit() {
        assert_eq!(limited_text(b"abcdef", 4), "abcd");
        assert_eq!(limited_text(b"ab", 4), "ab");
    }

    #[tokio::test]
    async fn non_json_error_body_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/threads"))
            .respond_with(ResponseTemplate::new(502).set_body_string("x".repeat(500)))
            .mount(&server)
            .await;

        let err = client_for(&server).create_thread().await.unwrap_err();
        match err {
            OpenAiClientError::UpstreamBody { status, body } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert_eq!(body.len(), 64);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn failure_reason_combines_code_and_message() {
        let run = Run {
            id: "run_1".to_string(),
            status: "failed".to_string(),
            last_error: Some(RunError {
                code: Some("rate_limit_exceeded".to_string()),
                message: Some("slow down".to_string()),
            }),
        };
        assert_eq!(
            run.failure_reason().as_deref(),
            Some("rate_limit_exceeded: slow down")
        );
    }
}
