//! Signed reviewer tokens (HS256 JWT).

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const REVIEW_TOKEN_TYPE: &str = "review_access";

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Review link has expired")]
    Expired,

    #[error("Invalid review link")]
    Invalid,

    #[error("Failed to sign review token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewClaims {
    pub document_id: String,
    pub reviewer_email: String,
    /// Expiry as seconds since the Unix epoch.
    pub exp: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

impl ReviewClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }
}

/// Issues and checks reviewer tokens with one shared secret.
#[derive(Clone)]
pub struct ReviewSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl ReviewSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Uses the configured secret, or a random one that lives as long as the
    /// process. Links signed with a random secret stop verifying on restart.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret {
            Some(secret) => Self::new(secret.as_bytes()),
            None => {
                warn!("REVIEW_SECRET_KEY not set; review links will not survive a restart");
                let mut secret = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                Self::new(&secret)
            }
        }
    }

    pub fn issue(
        &self,
        document_id: &str,
        reviewer_email: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let claims = ReviewClaims {
            document_id: document_id.to_string(),
            reviewer_email: reviewer_email.to_string(),
            exp: expires_at.timestamp(),
            token_type: REVIEW_TOKEN_TYPE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    pub fn verify(&self, token: &str) -> Result<ReviewClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<ReviewClaims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            }
        })?;

        if data.claims.token_type != REVIEW_TOKEN_TYPE {
            return Err(TokenError::Invalid);
        }
        Ok(data.claims)
    }
}
