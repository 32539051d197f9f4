// Bearer token verification. Tokens are HS256 JWTs whose subject is the user's document id.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::id_generator::DocId;

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    /// Verify a token and return the user id it was issued for.
    #[instrument(skip(self, token))]
    pub fn verify(&self, token: &str) -> AppResult<DocId> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                warn!("Rejected bearer token: {}", e);
                AppError::Unauthorized(format!("Invalid token: {}", e))
            })?;

        DocId::parse(&token_data.claims.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a user id".to_string()))
    }

    /// Sign a token for `user_id`. Registration hands this back to the client.
    pub fn issue(&self, user_id: &DocId) -> AppResult<String> {
        let now = Utc::now().timestamp();
        self.sign(&Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.token_ttl.as_secs() as i64,
        })
    }

    fn sign(&self, claims: &Claims) -> AppResult<String> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }
}
