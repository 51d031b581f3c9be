//! # Renewal Policy
//!
//! Pure decision logic for token rotation. No I/O; fully testable with
//! synthetic clocks.

use chrono::{DateTime, Duration, Utc};

use crate::token::BootstrapToken;

/// Decide whether the current token must be replaced
///
/// - no token at all: renew
/// - token without expiration: renew only when the policy enforces
///   expiration (an unexpiring token is invalid under such a policy)
/// - token with expiration: renew when it expires inside the
///   `recreate_before` window
pub fn should_renew(
    token: Option<&BootstrapToken>,
    now: DateTime<Utc>,
    recreate_before: Duration,
    enforce_expiration: bool,
) -> bool {
    let Some(token) = token else {
        return true;
    };

    match token.expiration_time() {
        None => enforce_expiration,
        Some(expiration) => expiration < now + recreate_before,
    }
}
