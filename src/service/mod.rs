//! Remote translation and speech-to-text service boundary

mod http;

pub use http::HttpService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::lang::Language;
use crate::session::TranslationRequest;

/// A phrase triplet from the dictionary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    #[serde(rename = "PhraseID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "SylhetiText")]
    pub sylheti: String,
    #[serde(rename = "BengaliText")]
    pub bengali: String,
    #[serde(rename = "EnglishText")]
    pub english: String,
}

/// Collaborator performing the actual translation and transcription
#[async_trait]
pub trait TranslationService: Send + Sync {
    /// Translate the request's text; returns the translated text
    async fn translate(&self, request: &TranslationRequest) -> Result<String, SessionError>;

    /// Transcribe a webm-encoded recording spoken in `language`
    async fn transcribe(&self, audio: Vec<u8>, language: Language)
        -> Result<String, SessionError>;

    /// Fetch the phrase dictionary; an empty list is a valid answer
    async fn phrases(&self) -> Result<Vec<Phrase>, SessionError>;
}
