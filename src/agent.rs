//! Summarization client.
//!
//! Sends text to a local Ollama server or the OpenAI chat completions API, or
//! produces an offline placeholder, and normalizes whatever comes back.

use crate::config::{Config, EndpointsConfig, Provider, SummarizerConfig};
use crate::summary::word_count;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::error::Error as _;
use std::future::Future;
use std::sync::RwLock;
use thiserror::Error;

/// User-Agent string sent to every backend
const USER_AGENT: &str = concat!("recap/", env!("CARGO_PKG_VERSION"));

const OPENAI_MODEL: &str = "gpt-3.5-turbo";
const OPENAI_MAX_TOKENS: u32 = 150;
const TEMPERATURE: f64 = 0.3;
const TOP_P: f64 = 0.9;

const TEST_SENTENCE: &str = "This is a test message to verify the AI service is working correctly.";

/// Preambles models like to open with, matched case-insensitively
const PREAMBLES: &[&str] = &[
    "summary:",
    "here's a summary:",
    "here is a summary:",
    "the text discusses:",
    "this text is about:",
];

#[derive(Error, Debug)]
pub enum SummarizerError {
    #[error("Ollama is not running. Please start Ollama service.")]
    BackendUnavailable(#[source] reqwest::Error),
    #[error("{backend} request failed: {source}")]
    TransportError {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("OpenAI API key not found in environment variables")]
    MissingCredentials,
    #[error("invalid response from {backend}: {detail}")]
    InvalidResponse {
        backend: &'static str,
        detail: String,
    },
    #[error("failed to parse {backend} response: {source}")]
    ResponseParseError {
        backend: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can turn text into a summary
pub trait Summarize {
    fn summarize(&self, text: &str) -> impl Future<Output = Result<String, SummarizerError>>;
}

/// Outcome of [`SummarizerClient::test_connection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f64,
    top_p: f64,
}

#[derive(Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Option<Vec<ChatChoice>>,
    #[serde(default)]
    error: Option<ChatApiError>,
}

#[derive(Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatApiError {
    message: String,
}

/// Provider-dispatching summarizer.
///
/// Settings are snapshotted at the start of every call, so [`reconfigure`]
/// affects the next summary but never one already in flight.
///
/// [`reconfigure`]: SummarizerClient::reconfigure
pub struct SummarizerClient {
    http: Client,
    settings: RwLock<SummarizerConfig>,
    endpoints: EndpointsConfig,
    openai_key: Option<String>,
}

impl SummarizerClient {
    /// Build a client from the loaded configuration
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.endpoints.request_timeout())
            .build()?;

        Ok(Self {
            http,
            settings: RwLock::new(config.summarizer.clone()),
            endpoints: config.endpoints.clone(),
            openai_key: config.api.openai_key.clone(),
        })
    }

    /// Replace the summarizer settings used by subsequent calls
    pub fn reconfigure(&self, settings: SummarizerConfig) {
        let mut current = self.settings.write().unwrap_or_else(|e| e.into_inner());
        *current = settings;
    }

    /// Current settings snapshot
    pub fn settings(&self) -> SummarizerConfig {
        self.settings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Summarize a canned sentence and report whether the backend answered
    pub async fn test_connection(&self) -> ConnectionStatus {
        match self.summarize(TEST_SENTENCE).await {
            Ok(summary) => ConnectionStatus {
                success: true,
                message: format!(
                    "Connection successful. Test summary: {}...",
                    summary.chars().take(50).collect::<String>()
                ),
            },
            Err(e) => ConnectionStatus {
                success: false,
                message: format!("Connection failed: {}", e),
            },
        }
    }

    async fn summarize_with_ollama(
        &self,
        text: &str,
        max_length: u32,
        model: &str,
    ) -> Result<String, SummarizerError> {
        const BACKEND: &str = "Ollama";

        let request = OllamaRequest {
            model,
            prompt: format!(
                "Summarize the following text in exactly {} sentences. Be concise and capture the key points:\n\n{}\n\nSummary:",
                max_length, text
            ),
            stream: false,
            options: OllamaOptions {
                temperature: TEMPERATURE,
                top_p: TOP_P,
            },
        };

        let url = format!("{}/api/generate", self.endpoints.ollama_url.trim_end_matches('/'));
        tracing::debug!(%url, model, "requesting summary from Ollama");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if is_connection_refused(&e) {
                    SummarizerError::BackendUnavailable(e)
                } else {
                    SummarizerError::TransportError {
                        backend: BACKEND,
                        source: e,
                    }
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SummarizerError::TransportError {
                backend: BACKEND,
                source: e,
            })?;

        let parsed: OllamaResponse = serde_json::from_str(&body)
            .map_err(|e| SummarizerError::ResponseParseError {
                backend: BACKEND,
                source: e,
            })?;

        let cleaned = parsed
            .response
            .as_deref()
            .map(clean_summary)
            .filter(|summary| !summary.is_empty());

        match cleaned {
            Some(summary) => Ok(summary),
            None => {
                tracing::warn!(%status, "Ollama answered without a summary");
                let detail = match (parsed.error, parsed.response) {
                    (Some(error), _) => error,
                    (None, Some(_)) => "empty summary".to_string(),
                    (None, None) => "missing `response` field".to_string(),
                };
                Err(SummarizerError::InvalidResponse {
                    backend: BACKEND,
                    detail,
                })
            }
        }
    }

    async fn summarize_with_openai(
        &self,
        text: &str,
        max_length: u32,
    ) -> Result<String, SummarizerError> {
        const BACKEND: &str = "OpenAI";

        let api_key = self
            .openai_key
            .as_deref()
            .ok_or(SummarizerError::MissingCredentials)?;

        let request = ChatRequest {
            model: OPENAI_MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!(
                        "You are a helpful assistant that summarizes text in exactly {} sentences.",
                        max_length
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: format!("Summarize this text: {}", text),
                },
            ],
            max_tokens: OPENAI_MAX_TOKENS,
            temperature: TEMPERATURE,
        };

        let url = format!(
            "{}/v1/chat/completions",
            self.endpoints.openai_url.trim_end_matches('/')
        );
        tracing::debug!(%url, "requesting summary from OpenAI");

        let transport = |e| SummarizerError::TransportError {
            backend: BACKEND,
            source: e,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| SummarizerError::ResponseParseError {
                backend: BACKEND,
                source: e,
            })?;

        let content = parsed
            .choices
            .and_then(|choices| choices.into_iter().next())
            .and_then(|choice| choice.message)
            .and_then(|message| message.content);

        let cleaned = content
            .as_deref()
            .map(clean_summary)
            .filter(|summary| !summary.is_empty());

        match cleaned {
            Some(summary) => Ok(summary),
            None => {
                tracing::warn!(%status, "OpenAI answered without a summary");
                let detail = match (parsed.error, content) {
                    (Some(error), _) => error.message,
                    (None, Some(_)) => "empty summary".to_string(),
                    (None, None) => "missing `choices[0].message.content`".to_string(),
                };
                Err(SummarizerError::InvalidResponse {
                    backend: BACKEND,
                    detail,
                })
            }
        }
    }
}

impl Summarize for SummarizerClient {
    async fn summarize(&self, text: &str) -> Result<String, SummarizerError> {
        let settings = self.settings();
        let max_length = settings.sentence_count();

        tracing::info!(
            provider = %settings.provider,
            max_length,
            words = word_count(text),
            "summarizing"
        );

        match settings.provider {
            Provider::Ollama => {
                self.summarize_with_ollama(text, max_length, &settings.model)
                    .await
            }
            Provider::OpenAi => self.summarize_with_openai(text, max_length).await,
            Provider::Mock => Ok(mock_summary(text, max_length)),
        }
    }
}

/// Deterministic offline placeholder summary
pub fn mock_summary(text: &str, max_length: u32) -> String {
    format!(
        "This is a {}-sentence summary of {} words. The text discusses various topics and concepts. Key points have been identified and condensed for clarity.",
        max_length,
        word_count(text)
    )
}

/// Normalize raw model output: collapse whitespace, drop boilerplate
/// preambles, and make sure the result ends in terminal punctuation.
///
/// Idempotent: cleaning an already clean summary returns it unchanged.
pub fn clean_summary(summary: &str) -> String {
    let collapsed = summary.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut cleaned = collapsed.as_str();
    while let Some(rest) = strip_preamble(cleaned) {
        cleaned = rest;
    }

    let mut cleaned = cleaned.to_string();
    if !cleaned.is_empty() && !cleaned.ends_with(['.', '!', '?']) {
        cleaned.push('.');
    }
    cleaned
}

fn strip_preamble(text: &str) -> Option<&str> {
    PREAMBLES.iter().find_map(|preamble| {
        let head = text.get(..preamble.len())?;
        head.eq_ignore_ascii_case(preamble)
            .then(|| text[preamble.len()..].trim_start())
    })
}

/// Whether a send failure means nothing is listening on the other end
fn is_connection_refused(err: &reqwest::Error) -> bool {
    if !err.is_connect() {
        return false;
    }

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        if cause.to_string().to_ascii_lowercase().contains("refused") {
            return true;
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(provider: Provider, base_url: &str, openai_key: Option<&str>) -> SummarizerClient {
        let mut config = Config::default();
        config.summarizer.provider = provider;
        config.endpoints.ollama_url = base_url.to_string();
        config.endpoints.openai_url = base_url.to_string();
        config.endpoints.request_timeout_secs = 5;
        config.api.openai_key = openai_key.map(str::to_string);
        SummarizerClient::new(&config).unwrap()
    }

    /// Address of a port nothing is listening on
    fn closed_port_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[test]
    fn strips_preambles_and_terminates() {
        assert_eq!(clean_summary("Summary: the cat sat"), "the cat sat.");
        assert_eq!(clean_summary("HERE'S A SUMMARY:  It rained!"), "It rained!");
        assert_eq!(clean_summary("This text is about: dogs?"), "dogs?");
        assert_eq!(clean_summary("Summary: Summary: twice"), "twice.");
    }

    #[test]
    fn collapses_blank_lines_and_spaces() {
        assert_eq!(
            clean_summary("First line.\n\n\nSecond   line\tends"),
            "First line. Second line ends."
        );
        assert_eq!(clean_summary("   \n  "), "");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let samples = [
            "",
            "Summary:",
            "summary:summary: x",
            "Here's  a summary: spaced preamble",
            "  The text discusses: many\n\nthings  ",
            "Already done.",
            "Question?",
            "ümlaut ending",
            "Summary",
        ];
        for sample in samples {
            let once = clean_summary(sample);
            assert_eq!(clean_summary(&once), once, "input: {:?}", sample);
            if !once.is_empty() {
                assert!(once.ends_with(['.', '!', '?']), "output: {:?}", once);
            }
        }
    }

    #[test]
    fn mock_summary_mentions_length_and_word_count() {
        let summary = mock_summary("one two three four five six seven eight nine ten", 3);
        assert!(summary.contains('3'));
        assert!(summary.contains("10"));
        assert_eq!(summary, mock_summary("one two three four five six seven eight nine ten", 3));
    }

    #[tokio::test]
    async fn mock_provider_never_touches_the_network() {
        let client = client_for(Provider::Mock, &closed_port_url(), None);
        let summary = client.summarize("a b c").await.unwrap();
        assert_eq!(summary, mock_summary("a b c", 3));
    }

    #[tokio::test]
    async fn reconfigure_applies_to_next_call() {
        let client = client_for(Provider::Mock, &closed_port_url(), None);
        let mut settings = client.settings();
        settings.max_summary_length = 5;
        client.reconfigure(settings);
        let summary = client.summarize("a b").await.unwrap();
        assert!(summary.starts_with("This is a 5-sentence summary of 2 words."));
    }

    #[tokio::test]
    async fn ollama_success_is_normalized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama2",
                "stream": false,
                "options": { "temperature": 0.3, "top_p": 0.9 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "Summary:\n\nFoxes jump over dogs"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(Provider::Ollama, &server.uri(), None);
        let summary = client.summarize("The quick brown fox jumps.").await.unwrap();
        assert_eq!(summary, "Foxes jump over dogs.");
    }

    #[tokio::test]
    async fn ollama_prompt_requests_configured_sentence_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "ok" })))
            .mount(&server)
            .await;

        let client = client_for(Provider::Ollama, &server.uri(), None);
        client.summarize("some text").await.unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let prompt = body["prompt"].as_str().unwrap();
        assert!(prompt.contains("exactly 3 sentences"));
        assert!(prompt.contains("some text"));
    }

    #[tokio::test]
    async fn ollama_missing_response_field_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "error": "model 'llama2' not found" })),
            )
            .mount(&server)
            .await;

        let client = client_for(Provider::Ollama, &server.uri(), None);
        let err = client.summarize("text").await.unwrap_err();
        match err {
            SummarizerError::InvalidResponse { detail, .. } => assert!(detail.contains("not found")),
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ollama_preamble_only_reply_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "Summary:" })))
            .mount(&server)
            .await;

        let client = client_for(Provider::Ollama, &server.uri(), None);
        let err = client.summarize("text").await.unwrap_err();
        match err {
            SummarizerError::InvalidResponse { backend, detail } => {
                assert_eq!(backend, "Ollama");
                assert_eq!(detail, "empty summary");
            }
            other => panic!("expected InvalidResponse, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ollama_slow_reply_times_out_as_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "response": "too late" }))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let mut config = Config::default();
        config.summarizer.provider = Provider::Ollama;
        config.endpoints.ollama_url = server.uri();
        config.endpoints.request_timeout_secs = 1;
        let client = SummarizerClient::new(&config).unwrap();

        let err = client.summarize("text").await.unwrap_err();
        match err {
            SummarizerError::TransportError { backend, source } => {
                assert_eq!(backend, "Ollama");
                assert!(source.is_timeout(), "got {source:?}");
            }
            other => panic!("expected TransportError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ollama_non_json_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let client = client_for(Provider::Ollama, &server.uri(), None);
        let err = client.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizerError::ResponseParseError { .. }));
        assert!(err.to_string().starts_with("failed to parse Ollama response"));
    }

    #[tokio::test]
    async fn ollama_refused_connection_is_backend_unavailable() {
        let client = client_for(Provider::Ollama, &closed_port_url(), None);
        let err = client.summarize("text").await.unwrap_err();
        assert!(
            matches!(err, SummarizerError::BackendUnavailable(_)),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn openai_without_key_fails_before_any_request() {
        let server = MockServer::start().await;
        let client = client_for(Provider::OpenAi, &server.uri(), None);
        let err = client.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizerError::MissingCredentials));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn openai_success_reads_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 150,
                "temperature": 0.3
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [
                    { "message": { "role": "assistant", "content": "Here is a summary: Short one" } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(Provider::OpenAi, &server.uri(), Some("sk-test"));
        let summary = client.summarize("long text").await.unwrap();
        assert_eq!(summary, "Short one.");
    }

    #[tokio::test]
    async fn openai_error_payload_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": { "message": "Incorrect API key provided" }
            })))
            .mount(&server)
            .await;

        let client = client_for(Provider::OpenAi, &server.uri(), Some("sk-bad"));
        let err = client.summarize("text").await.unwrap_err();
        assert!(err.to_string().contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn openai_empty_content_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [ { "message": { "role": "assistant", "content": "" } } ]
            })))
            .mount(&server)
            .await;

        let client = client_for(Provider::OpenAi, &server.uri(), Some("sk-test"));
        let err = client.summarize("text").await.unwrap_err();
        assert!(
            matches!(err, SummarizerError::InvalidResponse { backend: "OpenAI", ref detail } if detail == "empty summary"),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn openai_transport_failure_is_not_backend_unavailable() {
        let client = client_for(Provider::OpenAi, &closed_port_url(), Some("sk-test"));
        let err = client.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizerError::TransportError { backend: "OpenAI", .. }));
    }

    #[tokio::test]
    async fn test_connection_reports_both_outcomes() {
        let ok = client_for(Provider::Mock, &closed_port_url(), None)
            .test_connection()
            .await;
        assert!(ok.success);
        assert!(ok.message.starts_with("Connection successful. Test summary: This is a 3-sentence"));

        let failed = client_for(Provider::Ollama, &closed_port_url(), None)
            .test_connection()
            .await;
        assert!(!failed.success);
        assert_eq!(
            failed.message,
            "Connection failed: Ollama is not running. Please start Ollama service."
        );
    }
}
