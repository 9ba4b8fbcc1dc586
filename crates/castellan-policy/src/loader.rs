//! Policy discovery and parsing.
//!
//! A proposed policy arrives in exactly one of two ways: a transient
//! transfer buffer pushed over the transport, or the policy file persisted
//! by a previous approval. The loader reads whole contents as text, parses
//! the JSON document and runs structural validation; diagnostics are kept
//! short enough to show on the device display.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{PolicyError, PolicyResult};
use crate::signing::SigningPolicy;

/// Name of the persisted policy file on device flash.
pub const POLICY_FNAME: &str = "hsm-policy.json";

/// Where the policy bytes come from.
#[derive(Debug, Clone, Copy)]
pub enum PolicySource<'a> {
    /// A transfer buffer holding a freshly proposed policy.
    Transfer(&'a [u8]),
    /// The policy file persisted by a previous approval.
    Persisted(&'a Path),
}

/// Load and parse a policy.
///
/// Returns the parsed policy and `is_new`: true when the policy came from
/// a transfer buffer (freshly proposed, never approved), false when it was
/// restored from storage (approved in an earlier session).
///
/// # Errors
///
/// [`PolicyError::NoPolicy`] when reading from storage and no policy file
/// exists. [`PolicyError::Parse`] when the text is not UTF-8, is not a
/// well-formed JSON object, contains unknown or ill-typed fields, or fails
/// structural validation; the detail carries source location + message.
pub fn load(source: PolicySource<'_>) -> PolicyResult<(SigningPolicy, bool)> {
    let (text, is_new) = match source {
        PolicySource::Transfer(buf) => {
            debug!(len = buf.len(), "reading policy from transfer buffer");
            let text = std::str::from_utf8(buf)
                .map_err(|e| PolicyError::parse(format!("policy text is not UTF-8: {e}")))?
                .to_owned();
            (text, true)
        },
        PolicySource::Persisted(path) => {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(PolicyError::NoPolicy);
                },
                Err(e) => {
                    return Err(PolicyError::parse(format!(
                        "read failed: {}: {e}",
                        path.display()
                    )));
                },
            };
            debug!(path = %path.display(), "read persisted policy");
            (text, false)
        },
    };

    let policy: SigningPolicy =
        serde_json::from_str(&text).map_err(|e| PolicyError::parse(e.to_string()))?;

    policy.validate().map_err(PolicyError::parse)?;

    info!(
        rules = policy.rules.len(),
        new = is_new,
        "policy parsed and validated"
    );

    Ok((policy, is_new))
}
