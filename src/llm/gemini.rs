//! Google Gemini provider implementation
//!
//! Each session keeps its own conversation history, so every turn request
//! carries the prior exchange the way a chat session object does. Replies
//! are streamed from `streamGenerateContent` as SSE.

use super::{
    AssistantConfig, AssistantError, AssistantSession, FragmentStream, RemoteAssistantClient,
};
use crate::profile::BehaviorProfile;
use async_trait::async_trait;
use eventsource_stream::{EventStream, EventStreamError, Eventsource};
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, io::Error>> + Send>>;

/// Gemini client; opening a session is local, only turns hit the network
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    /// Gateway mode authenticates upstream; no key is sent
    implicit_auth: bool,
    base_url: String,
    model: String,
}

impl GeminiClient {
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let base_url = match &config.gateway {
            // exe.dev gateway format
            Some(gw) => format!("{}/gemini/v1beta", gw.trim_end_matches('/')),
            None => DEFAULT_BASE_URL.to_string(),
        };
        Self::with_base_url(config, base_url)
    }

    pub fn with_base_url(
        config: &AssistantConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, AssistantError> {
        // No overall request timeout: a streamed reply may legitimately run long
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AssistantError::configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            implicit_auth: config.gateway.is_some(),
            base_url: base_url.into(),
            model: config.model.clone(),
        })
    }

    fn streaming_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl RemoteAssistantClient for GeminiClient {
    async fn open_session(
        &self,
        profile: &BehaviorProfile,
    ) -> Result<Arc<dyn AssistantSession>, AssistantError> {
        let api_key = if self.implicit_auth {
            None
        } else {
            Some(self.api_key.clone().ok_or_else(|| {
                AssistantError::configuration(
                    "Missing API key for Gemini. Set API_KEY or LLM_GATEWAY.",
                )
            })?)
        };

        Ok(Arc::new(GeminiSession {
            client: self.client.clone(),
            url: self.streaming_url(),
            api_key,
            system_instruction: GeminiContent::system(&profile.instructions),
            history: Arc::new(Mutex::new(Vec::new())),
        }))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// One open conversation with Gemini
struct GeminiSession {
    client: Client,
    url: String,
    api_key: Option<String>,
    system_instruction: GeminiContent,
    /// Completed exchanges, alternating user and model contents
    history: Arc<Mutex<Vec<GeminiContent>>>,
}

#[async_trait]
impl AssistantSession for GeminiSession {
    async fn send_turn(&self, text: &str) -> Result<FragmentStream, AssistantError> {
        let mut contents = self
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        contents.push(GeminiContent::user(text));

        let body = GeminiRequest {
            contents,
            system_instruction: Some(self.system_instruction.clone()),
        };

        let mut request = self
            .client
            .post(&self.url)
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("x-goog-api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AssistantError::network(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                AssistantError::network(format!("Connection failed: {e}"))
            } else {
                AssistantError::unknown(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {e}>"));
            let message = serde_json::from_str::<GeminiErrorResponse>(&body)
                .map(|resp| resp.error.message)
                .unwrap_or(body);
            return Err(AssistantError::from_status(status.as_u16(), &message));
        }

        let bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|b| b.to_vec()).map_err(io::Error::other)),
        );

        Ok(fragment_stream(bytes, Arc::clone(&self.history), text))
    }
}

/// Decode a turn's SSE byte stream into text fragments. The exchange is
/// added to `history` once the stream ends cleanly.
fn fragment_stream(
    bytes: ByteStream,
    history: Arc<Mutex<Vec<GeminiContent>>>,
    user_text: &str,
) -> FragmentStream {
    let state = TurnState {
        events: bytes.eventsource(),
        history,
        user_text: user_text.to_string(),
        reply: String::new(),
        finished: false,
    };
    Box::pin(futures::stream::unfold(state, next_fragment))
}

/// Per-turn decoding state
struct TurnState {
    events: EventStream<ByteStream>,
    history: Arc<Mutex<Vec<GeminiContent>>>,
    user_text: String,
    reply: String,
    finished: bool,
}

impl TurnState {
    /// Record the finished exchange so the next turn sees it
    fn commit(&mut self) {
        // An empty model content would be rejected on the next request
        if self.reply.is_empty() {
            return;
        }
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(GeminiContent::user(&self.user_text));
        history.push(GeminiContent::model(std::mem::take(&mut self.reply)));
    }
}

async fn next_fragment(
    mut state: TurnState,
) -> Option<(Result<String, AssistantError>, TurnState)> {
    if state.finished {
        return None;
    }
    loop {
        match state.events.next().await {
            Some(Ok(event)) => match parse_chunk(&event.data) {
                Ok(text) if text.is_empty() => continue,
                Ok(text) => {
                    state.reply.push_str(&text);
                    return Some((Ok(text), state));
                }
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            },
            Some(Err(e)) => {
                state.finished = true;
                return Some((Err(stream_error(e)), state));
            }
            None => {
                state.finished = true;
                state.commit();
                return None;
            }
        }
    }
}

fn stream_error(err: EventStreamError<io::Error>) -> AssistantError {
    match err {
        EventStreamError::Transport(e) => {
            AssistantError::network(format!("Stream read failed: {e}"))
        }
        EventStreamError::Utf8(e) => {
            AssistantError::malformed(format!("Invalid UTF-8 in event stream: {e}"))
        }
        other => AssistantError::malformed(format!("Invalid event stream: {other}")),
    }
}

/// Extract the text carried by one streamed `GenerateContentResponse`
fn parse_chunk(data: &str) -> Result<String, AssistantError> {
    let chunk: GeminiStreamChunk = serde_json::from_str(data)
        .map_err(|e| AssistantError::malformed(format!("Failed to parse stream chunk: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(match error.code {
            Some(code) => AssistantError::from_status(code, &error.message),
            None => AssistantError::unknown(error.message),
        });
    }

    Ok(chunk
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter(|part| !part.thought)
                .filter_map(|part| part.text)
                .collect::<String>()
        })
        .unwrap_or_default())
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn with_role(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![GeminiPart {
                text: Some(text.into()),
                thought: false,
            }],
        }
    }

    fn user(text: impl Into<String>) -> Self {
        Self::with_role(Some("user"), text)
    }

    fn model(text: impl Into<String>) -> Self {
        Self::with_role(Some("model"), text)
    }

    fn system(text: impl Into<String>) -> Self {
        Self::with_role(None, text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct GeminiStreamChunk {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    code: Option<u16>,
}
