use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

/// Identity and validity window embedded in a bearer token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userID")]
    pub user_id: i64,
    #[serde(rename = "userName")]
    pub user_name: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

// ---------------------------------------------------------------------------
// SessionSigner
// ---------------------------------------------------------------------------

/// Stateless session issuer: HS256 over a single shared secret.
///
/// There is no server-side session table. A token stays valid until its
/// embedded expiry even if the identity behind it is deleted; rotating the
/// secret is the only way to revoke outstanding tokens, and it revokes all
/// of them at once.
#[derive(Debug, Clone)]
pub struct SessionSigner {
    secret: String,
    issuer: String,
    expire_secs: i64,
}

impl SessionSigner {
    pub fn new(secret: impl Into<String>, issuer: impl Into<String>, expire_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            issuer: issuer.into(),
            expire_secs,
        }
    }

    pub fn issue(&self, user_id: i64, user_name: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            user_name: user_name.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.expire_secs,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// Rejects tokens with an unexpected algorithm, a bad signature, or an
    /// expired timestamp. The issuer claim is carried but not enforced.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )?;
        Ok(data.claims)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
