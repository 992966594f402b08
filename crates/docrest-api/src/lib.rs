//! docrest-api: the HTTP surface.
//!
//! Exposes the document service over REST. Paths are arbitrary-depth
//! `/c1/d1/c2/d2/...` addresses, so routing happens in a single fallback
//! handler that classifies the parsed path and dispatches on the method.
//! Authentication is pluggable through [`auth::Authenticator`]; the bundled
//! implementation verifies OpenID Connect bearer tokens.

pub mod auth;
pub mod http;

pub use auth::{Authenticator, OidcAuthenticator};
pub use http::{create_router, AppState};
