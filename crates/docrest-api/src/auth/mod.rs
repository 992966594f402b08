//! Request authentication.

mod oidc;

use async_trait::async_trait;
use axum::http::{header, HeaderMap};

use docrest_domain::User;
use docrest_server::ServiceError;

pub use oidc::{OidcAuthenticator, OidcError};

/// Maps a bearer credential to a caller identity.
///
/// A missing or empty credential yields the anonymous user, not an error;
/// only a credential that fails verification is rejected.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: Option<&str>) -> Result<User, ServiceError>;
}

/// Extracts the bearer credential from a request.
///
/// The `Authorization: Bearer <token>` header wins; the `auth` query
/// parameter is accepted as a fallback for clients that cannot set headers.
pub fn bearer_token(headers: &HeaderMap, auth_param: Option<&str>) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    auth_param
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
