//! Remote model adapter for the Gemini `streamGenerateContent` endpoint.
//!
//! The REST API is stateless, so each dialogue keeps its own history and
//! replays it with every turn. A turn is only added to that history once its
//! response stream has completed without error; a failed turn leaves the
//! history exactly as it was so a retry sees the same context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::settings::ModelSettings;

use super::dialogue::{Dialogue, FragmentStream, RemoteModel};
use super::parts::MessagePart;
use super::sse::{SseBuffer, parse_data_lines};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const ENTITY_NOT_FOUND: &str = "Requested entity was not found";
const API_KEY_ISSUE: &str =
    "API Key configuration issue. Please ensure your project is properly set up.";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl From<MessagePart> for Part {
    fn from(part: MessagePart) -> Self {
        match part {
            MessagePart::Text(text) => Part {
                text: Some(text),
                inline_data: None,
            },
            MessagePart::InlineData { media_type, data } => Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: media_type,
                    data,
                }),
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: i32,
}

impl GenerationConfig {
    fn from_settings(model: &ModelSettings) -> Self {
        Self {
            temperature: model.temperature,
            max_output_tokens: model.max_output_tokens,
            thinking_config: model
                .thinking_budget
                .map(|thinking_budget| ThinkingConfig { thinking_budget }),
        }
    }

    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.max_output_tokens.is_none()
            && self.thinking_config.is_none()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<&'a Content>,
    #[serde(skip_serializing_if = "GenerationConfig::is_empty")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GenerateContentResponse {
    /// Visible answer text carried by this chunk; thought summaries are skipped.
    fn text(&self) -> String {
        self.candidates
            .iter()
            .filter_map(|candidate| candidate.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter(|part| !part.thought)
            .filter_map(|part| part.text.as_deref())
            .collect()
    }
}

/// Turn a raw service error message into the one shown to users.
pub fn describe_remote_error(message: &str) -> String {
    if message.contains(ENTITY_NOT_FOUND) {
        API_KEY_ISSUE.to_string()
    } else {
        message.to_string()
    }
}

fn remote_error(message: &str) -> ChatError {
    ChatError::RemoteCall(describe_remote_error(message))
}

fn transport_error(err: reqwest::Error) -> ChatError {
    if err.is_timeout() {
        ChatError::RemoteCall("The model did not respond in time".to_string())
    } else {
        ChatError::RemoteCall(err.to_string())
    }
}

fn check_model_identifier(model: &ModelSettings) -> Result<(), ChatError> {
    if model.model_identifier.trim().is_empty() {
        return Err(ChatError::Configuration(
            "model identifier is empty".to_string(),
        ));
    }
    Ok(())
}

/// Gemini REST client; creates one [`Dialogue`] per conversation.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    /// Client with the default connect and read timeouts.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ChatError> {
        Self::with_settings(api_key, &ModelSettings::default())
    }

    /// Client whose HTTP timeouts come from `model`.
    ///
    /// The read timeout bounds the wait for response headers and the gap
    /// between two chunks of the stream, so a stalled connection ends the
    /// turn with an error instead of hanging it.
    pub fn with_settings(api_key: impl Into<String>, model: &ModelSettings) -> Result<Self, ChatError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::Configuration(
                "Gemini API key is empty".to_string(),
            ));
        }
        check_model_identifier(model)?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(model.connect_timeout_secs))
            .read_timeout(Duration::from_secs(model.read_timeout_secs))
            .build()
            .map_err(|e| ChatError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url, model
        )
    }
}

impl RemoteModel for GeminiClient {
    fn create_dialogue(
        &self,
        system_instruction: &str,
        model: &ModelSettings,
    ) -> Result<Arc<dyn Dialogue>, ChatError> {
        check_model_identifier(model)?;

        let system_instruction = (!system_instruction.is_empty()).then(|| Content {
            role: None,
            parts: vec![Part::from(MessagePart::Text(system_instruction.to_string()))],
        });

        info!(model = %model.model_identifier, "Creating Gemini dialogue");
        Ok(Arc::new(GeminiDialogue {
            http: self.http.clone(),
            api_key: self.api_key.clone(),
            endpoint: self.endpoint(&model.model_identifier),
            system_instruction,
            generation_config: GenerationConfig::from_settings(model),
            history: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

pub struct GeminiDialogue {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    history: Arc<Mutex<Vec<Content>>>,
}

impl GeminiDialogue {
    /// Number of committed turns (user and model contents).
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl Dialogue for GeminiDialogue {
    async fn send_turn(&self, parts: Vec<MessagePart>) -> Result<FragmentStream, ChatError> {
        let user_turn = Content {
            role: Some("user".to_string()),
            parts: parts.into_iter().map(Part::from).collect(),
        };

        let mut contents = self.history.lock().clone();
        contents.push(user_turn.clone());

        let request = GenerateContentRequest {
            contents,
            system_instruction: self.system_instruction.as_ref(),
            generation_config: self.generation_config.clone(),
        };

        debug!(endpoint = %self.endpoint, turns = request.contents.len(), "Sending Gemini request");
        let response = self
            .http
            .post(&self.endpoint)
            .query(&[("alt", "sse")])
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|envelope| envelope.error.message)
                .unwrap_or_else(|_| format!("Gemini API error ({status})"));
            warn!(status = %status, "Gemini request rejected");
            return Err(remote_error(&message));
        }

        let history = self.history.clone();
        let mut bytes = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = SseBuffer::new();
            let mut answer = String::new();
            let mut finished = false;

            while !finished {
                let blocks = match bytes.next().await {
                    Some(Ok(chunk)) => {
                        buffer.push_chunk(&chunk);
                        std::iter::from_fn(|| buffer.next_event_block()).collect::<Vec<_>>()
                    }
                    Some(Err(e)) => {
                        yield Err(transport_error(e));
                        return;
                    }
                    None => {
                        finished = true;
                        buffer.finish().into_iter().collect()
                    }
                };

                for block in blocks {
                    for data in parse_data_lines(&block) {
                        let chunk = match serde_json::from_str::<GenerateContentResponse>(data) {
                            Ok(chunk) => chunk,
                            Err(e) => {
                                debug!(error = %e, "Skipping unparseable SSE payload");
                                continue;
                            }
                        };

                        if let Some(err) = chunk.error.as_ref() {
                            yield Err(remote_error(&err.message));
                            return;
                        }
                        if let Some(reason) = chunk
                            .prompt_feedback
                            .as_ref()
                            .and_then(|feedback| feedback.block_reason.as_deref())
                        {
                            yield Err(ChatError::RemoteCall(format!(
                                "Request blocked by the model ({reason})"
                            )));
                            return;
                        }

                        let text = chunk.text();
                        if !text.is_empty() {
                            answer.push_str(&text);
                            yield Ok(text);
                        }
                    }
                }
            }

            let mut history = history.lock();
            history.push(user_turn);
            history.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part::from(MessagePart::Text(answer))],
            });
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODEL_PATH: &str = "/v1beta/models/gemini-test:streamGenerateContent";

    fn settings() -> ModelSettings {
        ModelSettings {
            model_identifier: "gemini-test".to_string(),
            system_instruction: "Be precise.".to_string(),
            temperature: None,
            thinking_budget: Some(1024),
            ..ModelSettings::default()
        }
    }

    fn sse_body(fragments: &[&str]) -> String {
        fragments
            .iter()
            .map(|text| {
                let chunk = serde_json::json!({
                    "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }]
                });
                format!("data: {chunk}\r\n\r\n")
            })
            .collect()
    }

    fn sse_response(body: String) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
    }

    fn dialogue_for(server: &MockServer) -> Arc<dyn Dialogue> {
        GeminiClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri())
            .create_dialogue("Be precise.", &settings())
            .unwrap()
    }

    async fn request_bodies(server: &MockServer) -> Vec<serde_json::Value> {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }

    #[test]
    fn test_new_rejects_empty_key() {
        assert!(matches!(
            GeminiClient::new("  "),
            Err(ChatError::Configuration(_))
        ));
    }

    #[test]
    fn test_with_settings_rejects_empty_model() {
        let model = ModelSettings {
            model_identifier: " ".to_string(),
            ..ModelSettings::default()
        };
        assert!(matches!(
            GeminiClient::with_settings("test-key", &model),
            Err(ChatError::Configuration(_))
        ));
    }

    #[test]
    fn test_entity_not_found_maps_to_api_key_issue() {
        assert_eq!(
            describe_remote_error("404: Requested entity was not found."),
            API_KEY_ISSUE
        );
        assert_eq!(describe_remote_error("quota exceeded"), "quota exceeded");
    }

    #[test]
    fn test_part_wire_format() {
        let part = Part::from(MessagePart::InlineData {
            media_type: "application/pdf".to_string(),
            data: "JVBERg==".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&part).unwrap(),
            serde_json::json!({ "inlineData": { "mimeType": "application/pdf", "data": "JVBERg==" } })
        );
    }

    #[tokio::test]
    async fn test_streams_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .and(query_param("alt", "sse"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(sse_response(sse_body(&["H", "e", "llo"])))
            .mount(&server)
            .await;

        let dialogue = dialogue_for(&server);
        let stream = dialogue
            .send_turn(vec![MessagePart::Text("Hello".to_string())])
            .await
            .unwrap();
        let fragments: Vec<String> = stream.map(|r| r.unwrap()).collect().await;

        assert_eq!(fragments, vec!["H", "e", "llo"]);

        let bodies = request_bodies(&server).await;
        assert_eq!(bodies[0]["contents"][0]["role"], "user");
        assert_eq!(bodies[0]["contents"][0]["parts"][0]["text"], "Hello");
        assert_eq!(
            bodies[0]["systemInstruction"]["parts"][0]["text"],
            "Be precise."
        );
        assert_eq!(
            bodies[0]["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
    }

    #[tokio::test]
    async fn test_history_replayed_on_next_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(sse_response(sse_body(&["First answer"])))
            .mount(&server)
            .await;

        let dialogue = dialogue_for(&server);
        for question in ["one", "two"] {
            let stream = dialogue
                .send_turn(vec![MessagePart::Text(question.to_string())])
                .await
                .unwrap();
            let _: Vec<_> = stream.collect().await;
        }

        let bodies = request_bodies(&server).await;
        let contents = bodies[1]["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][0]["text"], "one");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "First answer");
        assert_eq!(contents[2]["parts"][0]["text"], "two");
    }

    #[tokio::test]
    async fn test_error_status_surfaces_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": { "code": 404, "message": "Requested entity was not found.", "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        let dialogue = dialogue_for(&server);
        let result = dialogue
            .send_turn(vec![MessagePart::Text("Hello".to_string())])
            .await;

        assert!(matches!(result, Err(ChatError::RemoteCall(ref m)) if m == API_KEY_ISSUE));
    }

    #[tokio::test]
    async fn test_mid_stream_error_not_committed_to_history() {
        let server = MockServer::start().await;
        let mut body = sse_body(&["Partial"]);
        body.push_str("data: {\"error\":{\"message\":\"backend overloaded\"}}\n\n");
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(sse_response(body))
            .mount(&server)
            .await;

        let client = GeminiClient::new("test-key")
            .unwrap()
            .with_base_url(server.uri());
        let dialogue = GeminiDialogue {
            http: client.http.clone(),
            api_key: client.api_key.clone(),
            endpoint: client.endpoint("gemini-test"),
            system_instruction: None,
            generation_config: GenerationConfig::default(),
            history: Arc::new(Mutex::new(Vec::new())),
        };

        let items: Vec<_> = dialogue
            .send_turn(vec![MessagePart::Text("q".to_string())])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(items[0], Ok("Partial".to_string()));
        assert_eq!(
            items[1],
            Err(ChatError::RemoteCall("backend overloaded".to_string()))
        );
        assert_eq!(dialogue.history_len(), 0);
    }

    #[tokio::test]
    async fn test_stalled_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(sse_response(sse_body(&["too late"])).set_delay(Duration::from_secs(60)))
            .mount(&server)
            .await;

        let model = ModelSettings {
            read_timeout_secs: 1,
            ..settings()
        };
        let dialogue = GeminiClient::with_settings("test-key", &model)
            .unwrap()
            .with_base_url(server.uri())
            .create_dialogue("Be precise.", &model)
            .unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(20),
            dialogue.send_turn(vec![MessagePart::Text("Hello".to_string())]),
        )
        .await
        .expect("read timeout should end the call");

        assert!(matches!(
            result,
            Err(ChatError::RemoteCall(ref m)) if m == "The model did not respond in time"
        ));
    }

    #[tokio::test]
    async fn test_thought_parts_skipped() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"thinking\",\"thought\":true}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Answer\"}]}}]}"
        );
        Mock::given(method("POST"))
            .and(path(MODEL_PATH))
            .respond_with(sse_response(body.to_string()))
            .mount(&server)
            .await;

        let dialogue = dialogue_for(&server);
        let fragments: Vec<_> = dialogue
            .send_turn(vec![MessagePart::Text("q".to_string())])
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(fragments, vec![Ok("Answer".to_string())]);
    }
}
