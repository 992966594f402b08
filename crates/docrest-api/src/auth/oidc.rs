//! OpenID Connect bearer token verification.
//!
//! Provider metadata and signing keys are fetched once at bootstrap and
//! immutable afterwards; per-request work is pure JWT verification.

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use docrest_domain::User;
use docrest_server::ServiceError;

use super::Authenticator;

/// Errors during provider discovery at bootstrap.
#[derive(Debug, Error)]
pub enum OidcError {
    #[error("provider discovery failed: {message}")]
    Discovery { message: String },

    #[error("JWKS retrieval failed: {message}")]
    Jwks { message: String },
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    kty: String,
    #[serde(default)]
    n: String,
    #[serde(default)]
    e: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Verifies RS256 bearer JWTs against a provider's published keys.
pub struct OidcAuthenticator {
    issuer: String,
    keys: Vec<(Option<String>, DecodingKey)>,
}

impl std::fmt::Debug for OidcAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OidcAuthenticator")
            .field("issuer", &self.issuer)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl OidcAuthenticator {
    /// Discovers the provider's configuration and fetches its JWKS.
    pub async fn discover(issuer: &str) -> Result<Self, OidcError> {
        let client = reqwest::Client::new();

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let discovery: DiscoveryDocument = client
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| OidcError::Discovery {
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| OidcError::Discovery {
                message: e.to_string(),
            })?;

        let jwks: JwkSet = client
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| OidcError::Jwks {
                message: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| OidcError::Jwks {
                message: e.to_string(),
            })?;

        let keys: Vec<(Option<String>, DecodingKey)> = jwks
            .keys
            .iter()
            .filter(|key| key.kty == "RSA")
            .filter_map(|key| {
                DecodingKey::from_rsa_components(&key.n, &key.e)
                    .ok()
                    .map(|decoded| (key.kid.clone(), decoded))
            })
            .collect();

        if keys.is_empty() {
            return Err(OidcError::Jwks {
                message: format!("no usable RSA keys at {}", discovery.jwks_uri),
            });
        }

        Ok(Self {
            issuer: issuer.to_string(),
            keys,
        })
    }

    fn key_for(&self, kid: Option<&str>) -> Option<&DecodingKey> {
        match kid {
            Some(kid) => self
                .keys
                .iter()
                .find(|(key_id, _)| key_id.as_deref() == Some(kid))
                .map(|(_, key)| key),
            // Without a key id the token is only verifiable against an
            // unambiguous key set.
            None if self.keys.len() == 1 => Some(&self.keys[0].1),
            None => None,
        }
    }
}

#[async_trait]
impl Authenticator for OidcAuthenticator {
    async fn authenticate(&self, token: Option<&str>) -> Result<User, ServiceError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(User::default());
        };

        let header = decode_header(token).map_err(|e| {
            debug!(error = %e, "rejecting malformed bearer token");
            ServiceError::InvalidCredentials
        })?;

        let key = self
            .key_for(header.kid.as_deref())
            .ok_or(ServiceError::InvalidCredentials)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_aud = false;

        let data = decode::<Claims>(token, key, &validation).map_err(|e| {
            debug!(error = %e, "bearer token verification failed");
            ServiceError::InvalidCredentials
        })?;

        Ok(User {
            id: data.claims.sub,
            name: data.claims.name.unwrap_or_default(),
            email: data.claims.email.unwrap_or_default(),
        })
    }
}
