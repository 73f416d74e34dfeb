//! Remote speech synthesis client.
//!
//! The wire call lives behind [`SynthesisTransport`] so the retry policy and
//! payload handling are testable without a network. The production transport
//! talks to a `models/{model}:generateContent` endpoint that returns base64
//! encoded raw PCM (24 kHz, mono, s16le).

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, error, warn};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, Result};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// One synthesis request: a single chunk of text for a voice/model pair.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    pub model: String,
}

/// Failure reported by a transport, classified for retry decisions.
#[derive(Debug, Clone)]
pub struct TransportError {
    /// HTTP status when the transport got far enough to receive one.
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    /// Whether the failure is worth retrying.
    ///
    /// A structured status wins: server-side (5xx) failures are transient,
    /// everything else is permanent. Message markers are consulted only for
    /// failures that carry no status at all (connection-level errors whose
    /// text may still embed a server-side code).
    pub fn is_transient(&self) -> bool {
        match self.status {
            Some(code) => code >= 500,
            None => ["INTERNAL", "500", "503"]
                .iter()
                .any(|marker| self.message.contains(marker)),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "status {}: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Wire-level synthesis call: one request, no retries, base64 payload out.
#[async_trait]
pub trait SynthesisTransport: Send + Sync {
    async fn request(
        &self,
        request: &SpeechRequest,
    ) -> std::result::Result<String, TransportError>;
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
}

/// Production transport for the remote synthesis service.
pub struct HttpTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl HttpTransport {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    /// Points the transport at a different endpoint (local mocks, proxies).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl SynthesisTransport for HttpTransport {
    async fn request(
        &self,
        request: &SpeechRequest,
    ) -> std::result::Result<String, TransportError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&serde_json::json!({
                "contents": [{ "parts": [{ "text": request.text }] }],
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": {
                            "prebuiltVoiceConfig": { "voiceName": request.voice }
                        }
                    }
                }
            }))
            .send()
            .await
            .map_err(|e| TransportError {
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError {
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| TransportError {
                status: None,
                message: format!("failed to parse synthesis response: {}", e),
            })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.inline_data))
            .map(|d| d.data)
            .ok_or_else(|| TransportError {
                status: None,
                message: "synthesis response carried no audio payload".to_string(),
            })
    }
}

/// Synthesis client with retry/backoff around any transport.
pub struct SpeechClient<T: SynthesisTransport> {
    transport: T,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl<T: SynthesisTransport> SpeechClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            max_attempts: MAX_ATTEMPTS,
            initial_backoff: INITIAL_BACKOFF,
        }
    }

    pub(crate) fn transport_ref(&self) -> &T {
        &self.transport
    }

    /// Synthesizes one chunk, returning raw PCM bytes.
    ///
    /// Transient failures are retried with exponential backoff (1 s, then
    /// 2 s) up to three attempts; permanent failures and exhausted retries
    /// surface as [`PipelineError::Synthesis`] carrying the last message.
    pub async fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.transport.request(request).await {
                Ok(payload) => {
                    let bytes = BASE64.decode(payload.as_bytes()).map_err(|e| {
                        PipelineError::Synthesis(format!("invalid audio payload: {}", e))
                    })?;
                    if bytes.is_empty() {
                        return Err(PipelineError::Synthesis(
                            "service returned an empty audio payload".to_string(),
                        ));
                    }
                    debug!(
                        "synthesized {} PCM bytes for a {} char chunk",
                        bytes.len(),
                        request.text.chars().count()
                    );
                    return Ok(bytes);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "transient synthesis failure (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.max_attempts, err, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(err) => {
                    error!(
                        "synthesis failed after {} attempt(s): {}",
                        attempt, err
                    );
                    return Err(PipelineError::Synthesis(err.message));
                }
            }
        }
    }
}
