//! The record produced by every chat request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{EMPTY_INPUT_RESPONSE, ERROR_RESPONSE};
use crate::error::IntentError;

/// Intent label of an exchange for empty input.
pub const EMPTY_INTENT: &str = "empty";

/// Intent label of an exchange whose inference failed.
pub const ERROR_INTENT: &str = "error";

/// How a reply was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeKind {
    /// Confident prediction with a catalog reply.
    Answered,
    /// Confidence below threshold; a clarification prompt was returned.
    Fallback,
    /// Confident prediction without catalog entry.
    CatalogMiss,
    /// Empty or whitespace-only input.
    Empty,
    /// Inference failed.
    Error,
}

impl ExchangeKind {
    /// Whether the classifier produced this exchange (and it belongs in history).
    pub fn is_classified(self) -> bool {
        matches!(
            self,
            ExchangeKind::Answered | ExchangeKind::Fallback | ExchangeKind::CatalogMiss
        )
    }
}

/// One request and its reply. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub input: String,
    pub intent: String,
    pub kind: ExchangeKind,
    /// Probability of `intent`, in `[0, 1]`; 0 for empty and error exchanges.
    pub confidence: f32,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatExchange {
    pub fn classified<I, S, R>(
        input: I,
        intent: S,
        kind: ExchangeKind,
        confidence: f32,
        response: R,
    ) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        R: Into<String>,
    {
        Self {
            input: input.into(),
            intent: intent.into(),
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            response: response.into(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn empty<I: Into<String>>(input: I) -> Self {
        Self {
            input: input.into(),
            intent: EMPTY_INTENT.to_string(),
            kind: ExchangeKind::Empty,
            confidence: 0.0,
            response: EMPTY_INPUT_RESPONSE.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn failed<I: Into<String>>(input: I, error: &IntentError) -> Self {
        Self {
            input: input.into(),
            intent: ERROR_INTENT.to_string(),
            kind: ExchangeKind::Error,
            confidence: 0.0,
            response: ERROR_RESPONSE.to_string(),
            timestamp: Utc::now(),
            error: Some(error.to_string()),
        }
    }

    /// Timestamp in RFC 3339.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339()
    }
}
