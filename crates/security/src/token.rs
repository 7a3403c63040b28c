//! HS256 bearer tokens.
//!
//! Tokens have the JWT shape `header.claims.signature`, each part base64url
//! without padding. Claims are `{sub, exp}` where `sub` is the user id as a
//! string and `exp` is a Unix timestamp in seconds.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use lingoclaw_core::auth::{AuthResolver, Principal};
use lingoclaw_core::error::AuthError;
use lingoclaw_core::record::UserId;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Issues and verifies bearer tokens with one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"***")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn invalid(reason: &str) -> AuthError {
    AuthError::InvalidToken(reason.to_string())
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl,
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length")
    }

    /// A token for `user_id` valid for the configured TTL.
    pub fn issue(&self, user_id: UserId) -> String {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.sign(&Claims {
            sub: user_id.to_string(),
            exp: Utc::now().timestamp().saturating_add(ttl),
        })
    }

    /// Encode and sign arbitrary claims.
    pub fn sign(&self, claims: &Claims) -> String {
        let payload = serde_json::json!({ "sub": claims.sub, "exp": claims.exp }).to_string();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let mut mac = self.mac();
        mac.update(signing_input.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{signing_input}.{signature}")
    }

    /// Check the signature and decode the claims. Expiry is not checked.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected three segments"));
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| invalid("bad signature encoding"))?;
        let mut mac = self.mac();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| invalid("signature mismatch"))?;

        let header: Header = decode_json(header)?;
        if header.alg != "HS256" {
            return Err(invalid("unsupported algorithm"));
        }
        decode_json(payload)
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, AuthError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| invalid("bad segment encoding"))?;
    serde_json::from_slice(&bytes).map_err(|_| invalid("bad segment json"))
}

impl AuthResolver for TokenSigner {
    fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.verify(token)?;
        let user_id: UserId = claims
            .sub
            .parse()
            .map_err(|_| invalid("subject is not a user id"))?;
        let token_valid = claims.exp > Utc::now().timestamp();
        if !token_valid {
            debug!(user_id, exp = claims.exp, "Expired token");
        }
        Ok(Principal {
            user_id,
            token_valid,
        })
    }
}
