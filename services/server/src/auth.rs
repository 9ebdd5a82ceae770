use std::sync::Arc;

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Bearer tokens issued by this server are valid for 24 hours.
pub const TOKEN_TTL_SECONDS: i64 = 24 * 3600;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Issues and validates HMAC-signed bearer tokens for chat connections.
#[derive(Clone)]
pub struct AuthValidator {
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
}

impl AuthValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
        }
    }

    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let exp = (chrono::Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECONDS)).timestamp();
        let claims = Claims {
            sub: username.to_owned(),
            exp: exp as usize,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Returns the username the token was issued for, or `None` if the token
    /// is malformed, expired, or signed with a different key.
    pub fn validate(&self, token: &str) -> Option<String> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default()).ok()?;
        Some(data.claims.sub)
    }
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}
