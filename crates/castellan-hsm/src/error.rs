//! Error types for the HSM-mode controller.

use castellan_core::DisplayError;

/// Errors raised inside the HSM-mode controller.
///
/// Errors during an approval presentation never escape the flow: they are
/// recorded on the flow, downgraded to a refusal, and the flow terminates.
/// Errors inside the lockdown loop are logged and the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum HsmError {
    /// Unexpected failure during an approval presentation step.
    #[error("approval interaction failed: {0}")]
    ApprovalInternal(String),

    /// The display surface rejected a frame.
    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Result type for HSM-mode operations.
pub type HsmResult<T> = Result<T, HsmError>;
