// Error taxonomy for key generation, signing and verification.

use std::fmt;

/// Errors surfaced by the scheme operations.
///
/// Cache integrity problems never appear here: a bad cache record is treated
/// as a miss and the bottom tree is recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    // Input validation
    /// Activation window does not fit the key lifetime
    InvalidActivationParameters {
        activation_epoch: u64,
        num_active_epochs: u64,
    },
    /// The expanded activation window spans fewer than two bottom trees
    InsufficientBottomTrees { available: u64 },
    /// Epoch outside the activation interval of the secret key
    KeyNotActive { epoch: u32 },
    /// Epoch outside the prepared interval; call advance_preparation first
    EpochNotPrepared { epoch: u32 },
    /// Epoch does not fit the scheme lifetime
    EpochOutOfRange { epoch: u32 },

    // Algorithmic
    /// Message-hash value fell outside the hypercube domain
    InvalidHypercubeIndex,
    /// Layer/offset pair could not be decoded into a vertex
    InvalidHypercubeMapping { layer: usize },
    /// No randomness counter produced a target-sum encoding within the bound
    EncodingAttemptsExceeded { attempts: u64 },

    // Structural
    /// Subtree has no layers or an inconsistent root
    MalformedSubTree,
    /// Signature has the wrong number of path nodes or chain hashes
    MalformedSignature { reason: &'static str },
    /// Byte decoding failed
    Serialization { message: String },
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidActivationParameters {
                activation_epoch,
                num_active_epochs,
            } => write!(
                f,
                "Invalid activation window: epoch {} with {} active epochs",
                activation_epoch, num_active_epochs
            ),
            Self::InsufficientBottomTrees { available } => write!(
                f,
                "Activation window spans {} bottom trees, need at least 2",
                available
            ),
            Self::KeyNotActive { epoch } => {
                write!(f, "Epoch {} is outside the key's activation interval", epoch)
            }
            Self::EpochNotPrepared { epoch } => {
                write!(f, "Epoch {} is outside the prepared interval", epoch)
            }
            Self::EpochOutOfRange { epoch } => {
                write!(f, "Epoch {} exceeds the scheme lifetime", epoch)
            }
            Self::InvalidHypercubeIndex => {
                write!(f, "Message hash value outside the hypercube domain")
            }
            Self::InvalidHypercubeMapping { layer } => {
                write!(f, "Cannot map offset into hypercube layer {}", layer)
            }
            Self::EncodingAttemptsExceeded { attempts } => write!(
                f,
                "No target-sum encoding found after {} attempts",
                attempts
            ),
            Self::MalformedSubTree => write!(f, "Subtree is empty or inconsistent"),
            Self::MalformedSignature { reason } => {
                write!(f, "Malformed signature: {}", reason)
            }
            Self::Serialization { message } => {
                write!(f, "Serialization error: {}", message)
            }
        }
    }
}

impl std::error::Error for SignatureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let error = SignatureError::EpochNotPrepared { epoch: 48 };
        assert_eq!(
            error.to_string(),
            "Epoch 48 is outside the prepared interval"
        );

        let error = SignatureError::InsufficientBottomTrees { available: 1 };
        assert!(error.to_string().contains("at least 2"));
    }

    #[test]
    fn test_error_trait_object() {
        let error: Box<dyn std::error::Error> =
            Box::new(SignatureError::InvalidHypercubeIndex);
        assert!(error.to_string().contains("hypercube"));
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(
            SignatureError::KeyNotActive { epoch: 3 },
            SignatureError::KeyNotActive { epoch: 3 }
        );
        assert_ne!(
            SignatureError::KeyNotActive { epoch: 3 },
            SignatureError::EpochNotPrepared { epoch: 3 }
        );
    }
}
