//! docrest-domain: path model, document types and rule engine.
//!
//! This crate holds everything the rest of the system agrees on:
//!
//! - the path algebra ([`path::ObjectRef`], [`path::DocumentRef`],
//!   [`path::CollectionRef`]) that interprets URL paths as alternating
//!   collection/document segments,
//! - the wire types ([`document::Document`], [`document::Collection`],
//!   [`document::User`]) and the deep property merge used by patch,
//! - the rule engine ([`rules::RuleChecker`]) that selects a rule for a
//!   target path, binds path variables, resolves `with` auxiliary documents
//!   and evaluates the path/content predicates.
//!
//! It has no storage or HTTP dependencies; those layers plug in through the
//! [`rules::DocumentFetcher`] seam.

pub mod document;
pub mod error;
pub mod path;
pub mod rules;

pub use document::{merge_properties, Collection, Document, Properties, User};
pub use error::{DomainError, DomainResult};
pub use path::{CollectionRef, DocumentRef, ObjectRef, Target};
