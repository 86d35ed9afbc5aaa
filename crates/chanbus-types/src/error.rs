use crate::fingerprint::Fingerprint;

/// Errors that can occur while registering or decoding typed messages.
#[derive(Debug, thiserror::Error)]
pub enum TypeError {
    /// Two different types claim the same fingerprint.
    #[error("fingerprint {fingerprint} already registered to {existing}, cannot register {new}")]
    DuplicateFingerprint {
        fingerprint: Fingerprint,
        existing: String,
        new: String,
    },

    /// No decoder is registered for the payload's fingerprint.
    #[error("no type registered for fingerprint {0}")]
    UnknownFingerprint(Fingerprint),

    /// The payload is too short to carry a fingerprint.
    #[error("payload of {len} bytes is too short to carry a fingerprint")]
    MissingFingerprint { len: usize },

    /// The payload's fingerprint belongs to a different type.
    #[error("expected {type_name} ({expected}), payload carries {found}")]
    FingerprintMismatch {
        type_name: &'static str,
        expected: Fingerprint,
        found: Fingerprint,
    },

    /// The payload body could not be decoded as the registered type.
    #[error("failed to decode {type_name}: {reason}")]
    Decode { type_name: String, reason: String },

    /// JSON conversion of a message body failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TypeError>;
