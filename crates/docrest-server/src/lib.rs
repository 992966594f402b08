//! docrest-server: request orchestration and configuration.
//!
//! [`DocumentService`] implements the per-request pipeline over the
//! repository and rule engine: authorize the path, open a transaction, read
//! or write documents, authorize the content, and commit or roll back. It is
//! transport-agnostic — the HTTP layer authenticates the caller and hands
//! the typed target plus [`docrest_domain::User`] down here.

pub mod config;
pub mod error;
pub mod service;

pub use config::ServerConfig;
pub use error::{ServiceError, ServiceResult};
pub use service::DocumentService;
