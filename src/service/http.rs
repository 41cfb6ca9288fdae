//! HTTP client for the translator backend
//!
//! Every reply body is decoded into an explicit type. Anything that does not
//! decode is a protocol error, never a partially filled value.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::SessionError;
use crate::lang::Language;
use crate::session::TranslationRequest;

use super::{Phrase, TranslationService};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct TranslateBody<'a> {
    text: &'a str,
    source_lang: &'static str,
    target_lang: &'static str,
}

#[derive(Deserialize)]
struct TranslateReply {
    translation: String,
}

#[derive(Deserialize)]
struct TranscribeReply {
    transcription: String,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

/// Translator backend reached over HTTP
pub struct HttpService {
    client: Client,
    base_url: String,
}

impl HttpService {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport_error(e: reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::timed_out("request")
    } else {
        SessionError::Network(format!("could not connect to the translation server ({e})"))
    }
}

/// Decode a reply into `T`, or classify it as a failure
///
/// `on_error` builds the error for a well-formed `{error}` body.
async fn decode<T: DeserializeOwned>(
    response: Response,
    what: &str,
    on_error: fn(String) -> SessionError,
) -> Result<T, SessionError> {
    let status = response.status();
    let body = response.bytes().await.map_err(transport_error)?;
    debug!(what, status = status.as_u16(), bytes = body.len(), "reply received");

    if status.is_success() {
        return serde_json::from_slice::<T>(&body).map_err(|e| {
            SessionError::Protocol(format!("malformed {what} reply (status {}): {e}", status.as_u16()))
        });
    }

    if let Ok(reply) = serde_json::from_slice::<ErrorReply>(&body) {
        return Err(on_error(reply.error));
    }
    if serde_json::from_slice::<serde_json::Value>(&body).is_ok() {
        return Err(on_error(format!(
            "{what} failed with status {}",
            status.as_u16()
        )));
    }
    Err(SessionError::Protocol(format!(
        "non-JSON {what} reply (status {})",
        status.as_u16()
    )))
}

#[async_trait]
impl TranslationService for HttpService {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, SessionError> {
        debug!(
            sequence = request.sequence,
            source = %request.source,
            target = %request.target,
            "POST /translate"
        );

        let body = TranslateBody {
            text: &request.text,
            source_lang: request.source.as_str(),
            target_lang: request.target.as_str(),
        };
        let response = self
            .client
            .post(self.url("/translate"))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let reply: TranslateReply = decode(response, "translation", SessionError::Service).await?;
        Ok(reply.translation)
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        language: Language,
    ) -> Result<String, SessionError> {
        debug!(bytes = audio.len(), %language, "POST /stt");

        let audio_part = Part::bytes(audio)
            .file_name("recording.webm")
            .mime_str("audio/webm")
            .map_err(|e| SessionError::Transcription(format!("invalid audio part: {e}")))?;
        let form = Form::new()
            .part("audio_file", audio_part)
            .text("source_language", language.as_str());

        let response = self
            .client
            .post(self.url("/stt"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        let reply: TranscribeReply =
            decode(response, "transcription", SessionError::Transcription).await?;
        Ok(reply.transcription.trim().to_string())
    }

    async fn phrases(&self) -> Result<Vec<Phrase>, SessionError> {
        let response = self
            .client
            .get(self.url("/phrases"))
            .send()
            .await
            .map_err(transport_error)?;

        decode(response, "phrase list", SessionError::Service).await
    }
}
