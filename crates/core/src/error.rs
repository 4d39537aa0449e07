use crate::model::{Provider, Track};
use thiserror::Error;

const GENERIC_FAILURE: &str = "Failed to communicate with the AI service";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("Model '{0}' not found")]
    ModelNotFound(String),
    #[error("Provider '{provider}' is not configured for the {track} track")]
    ProviderNotConfigured { provider: Provider, track: Track },
    #[error("Probe failed for {provider}/{track}: {reason}")]
    ProbeFailed {
        provider: Provider,
        track: Track,
        reason: String,
    },
    #[error("{0}")]
    RequestFailed(String),
    #[error("Request cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Text shown in place of the pending assistant message.
    pub fn user_message(&self) -> String {
        match self {
            DispatchError::RequestFailed(msg) if msg.trim().is_empty() => {
                GENERIC_FAILURE.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::RequestFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_request_failed_keeps_original_message() {
        let err: DispatchError = anyhow!("upstream returned 502").into();
        assert_eq!(err, DispatchError::RequestFailed("upstream returned 502".into()));
        assert_eq!(err.user_message(), "upstream returned 502");
    }

    #[test]
    fn test_empty_failure_falls_back_to_generic_text() {
        let err = DispatchError::RequestFailed("  ".into());
        assert_eq!(err.user_message(), GENERIC_FAILURE);
    }

    #[test]
    fn test_not_configured_message_names_provider_and_track() {
        let err = DispatchError::ProviderNotConfigured {
            provider: Provider::Anthropic,
            track: Track::Chat,
        };
        assert_eq!(
            err.to_string(),
            "Provider 'anthropic' is not configured for the chat track"
        );
    }
}
