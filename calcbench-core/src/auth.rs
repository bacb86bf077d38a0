use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

const BEARER_PREFIX: &str = "Bearer ";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("no authorization header provided")]
    MissingCredential,

    #[error("invalid authorization header format")]
    MalformedCredential,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Claims, AuthError>;
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, identity: &str, ttl: Duration) -> Result<String, AuthError>;
}

/// HS256 tokens signed and checked with one shared secret.
#[derive(Clone)]
pub struct JwtAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtAuthority {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }
}

impl TokenIssuer for JwtAuthority {
    fn issue(&self, identity: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = now_epoch_seconds();
        let claims = Claims {
            sub: identity.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding_key,
        )?)
    }
}

impl Authenticator for JwtAuthority {
    fn authenticate(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|err| {
                debug!("Token rejected: {err}");
                err
            })?;
        Ok(data.claims)
    }
}

/// Strip the `Bearer ` scheme off an `authorization` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header = header.ok_or(AuthError::MissingCredential)?;
    header
        .strip_prefix(BEARER_PREFIX)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MalformedCredential)
}

pub fn bearer_header(token: &str) -> String {
    format!("{BEARER_PREFIX}{token}")
}

/// How often the client mints a credential.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    /// Issue one token at start-up and reuse it for every call.
    #[default]
    Once,
    /// Issue a fresh token for every call.
    Every,
}

impl FromStr for TokenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(TokenMode::Once),
            "every" => Ok(TokenMode::Every),
            other => Err(format!(
                "Invalid jwt-gen mode: {other}. Allowed values are 'once' or 'every'."
            )),
        }
    }
}

fn now_epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs() as i64
}
