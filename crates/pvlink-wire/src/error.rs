//! Wire layer errors.
//!
//! # Error Code Convention
//!
//! All wire errors use the `WIRE_` prefix:
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`WireError::ChannelUnavailable`] | `WIRE_CHANNEL_UNAVAILABLE` | Yes |
//! | [`WireError::AlreadyAttached`] | `WIRE_ALREADY_ATTACHED` | No |
//! | [`WireError::ServiceUnavailable`] | `WIRE_SERVICE_UNAVAILABLE` | Yes |
//! | [`WireError::Rejected`] | `WIRE_REJECTED` | No |
//! | [`WireError::Backend`] | `WIRE_BACKEND` | Yes |

use pvlink_types::ErrorCode;
use thiserror::Error;

/// Error from a wire-protocol client or server backend.
#[derive(Debug, Clone, Error)]
pub enum WireError {
    /// The named channel cannot be reached right now.
    #[error("channel unavailable: {channel}")]
    ChannelUnavailable { channel: String },

    /// The channel name already has a live attachment.
    #[error("channel already attached: {channel}")]
    AlreadyAttached { channel: String },

    /// The named RPC endpoint is not served.
    #[error("service unavailable: {service}")]
    ServiceUnavailable { service: String },

    /// The backend refused the request.
    #[error("rejected by backend: {reason}")]
    Rejected { reason: String },

    /// Internal backend failure.
    #[error("backend error: {message}")]
    Backend { message: String },
}

impl ErrorCode for WireError {
    fn code(&self) -> &'static str {
        match self {
            Self::ChannelUnavailable { .. } => "WIRE_CHANNEL_UNAVAILABLE",
            Self::AlreadyAttached { .. } => "WIRE_ALREADY_ATTACHED",
            Self::ServiceUnavailable { .. } => "WIRE_SERVICE_UNAVAILABLE",
            Self::Rejected { .. } => "WIRE_REJECTED",
            Self::Backend { .. } => "WIRE_BACKEND",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Connectivity may come back.
            Self::ChannelUnavailable { .. } => true,
            Self::ServiceUnavailable { .. } => true,
            Self::Backend { .. } => true,
            // Caller-side conditions; retry cannot help.
            Self::AlreadyAttached { .. } => false,
            Self::Rejected { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pvlink_types::assert_error_codes;

    fn all_variants() -> Vec<WireError> {
        vec![
            WireError::ChannelUnavailable { channel: "x".into() },
            WireError::AlreadyAttached { channel: "x".into() },
            WireError::ServiceUnavailable { service: "x".into() },
            WireError::Rejected { reason: "x".into() },
            WireError::Backend { message: "x".into() },
        ]
    }

    #[test]
    fn all_error_codes_valid() {
        assert_error_codes(&all_variants(), "WIRE_");
    }

    #[test]
    fn recoverability() {
        assert!(WireError::ChannelUnavailable { channel: "c".into() }.is_recoverable());
        assert!(!WireError::Rejected { reason: "r".into() }.is_recoverable());
        assert!(!WireError::AlreadyAttached { channel: "c".into() }.is_recoverable());
    }

    #[test]
    fn display_mentions_name() {
        let err = WireError::ChannelUnavailable {
            channel: "temp:water".into(),
        };
        assert!(err.to_string().contains("temp:water"));
    }
}
