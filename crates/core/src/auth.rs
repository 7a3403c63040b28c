//! Bearer token resolution.

use crate::error::AuthError;
use crate::record::UserId;

/// Who a request acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    /// False when the token was well-formed but is no longer valid (expired).
    pub token_valid: bool,
}

/// Turns a bearer token into a [`Principal`].
///
/// Malformed or forged tokens are errors; expired ones resolve with
/// `token_valid == false` so callers can tell the two apart.
pub trait AuthResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError>;

    /// Resolve and require a valid token.
    fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let principal = self.resolve(token)?;
        if !principal.token_valid {
            return Err(AuthError::InvalidToken("token expired".into()));
        }
        Ok(principal)
    }
}
