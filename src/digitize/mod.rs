//! Remote digitization contract.
//!
//! Defines the [`Digitizer`] trait and the request/result types shared by the
//! workflow and every backend. A backend turns one [`DigitizationRequest`]
//! into either [`RecognizedText`] or a [`DigitizeError`]; transport and
//! application failures land in the same error type.

pub mod edge_function;

use serde::Serialize;

use crate::acquisition::SourceImage;

/// Fallback shown when a failure carries no human-readable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to extract text. Please try again.";

/// Orchestrator epoch a request was issued under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Epoch(pub u64);

/// One submission of one image.
#[derive(Debug, Clone)]
pub struct DigitizationRequest {
    pub epoch: Epoch,
    pub image: SourceImage,
}

/// Text returned by a successful digitization. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedText(String);

impl RecognizedText {
    pub fn new(text: impl Into<String>) -> Result<Self, DigitizeError> {
        let text = text.into();
        if text.is_empty() {
            return Err(DigitizeError::NoText);
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigitizeError {
    #[error("digitization request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("digitization service returned {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Status { status: u16, message: Option<String> },
    #[error("unreadable digitization response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("no text was extracted from the image")]
    NoText,
}

impl DigitizeError {
    /// The most specific message this failure can show the user, if any.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Transport(e) if e.is_timeout() => {
                Some("The digitization request timed out".to_string())
            }
            Self::Transport(e) if e.is_connect() => {
                Some("Could not reach the digitization service".to_string())
            }
            Self::Transport(_) => None,
            Self::Status { message, .. } => message.clone().filter(|m| !m.trim().is_empty()),
            Self::Malformed(_) => None,
            Self::NoText => Some("No text was extracted from the image".to_string()),
        }
    }

    /// [`Self::user_message`] or the generic fallback.
    pub fn display_message(&self) -> String {
        self.user_message()
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string())
    }
}

/// Async trait implemented by each digitization backend.
#[async_trait::async_trait]
pub trait Digitizer: Send + Sync {
    fn name(&self) -> &str;
    async fn digitize(&self, request: &DigitizationRequest)
        -> Result<RecognizedText, DigitizeError>;
}
