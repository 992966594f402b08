//! Declarative access rules and their evaluation.
//!
//! A rule couples a path pattern with a pair of [`Allow`] clauses (read and
//! write). Patterns are `/`-separated strings whose segments are literals or
//! `{variable}` capture holes:
//!
//! ```text
//! rules:
//!   - path: "notes/{userId}"
//!     read:
//!       ifPath: "path.userId == user.id"
//!     write:
//!       ifPath: "path.userId == user.id"
//!       ifContent: "newContent.properties.owner == user.id"
//!       with:
//!         - name: profile
//!           path: "profiles/{userId}"
//! ```
//!
//! Rules are loaded once at bootstrap and immutable afterwards. Selection is
//! by declaration order: the first rule whose pattern matches the target
//! wins, and a target no rule matches is not authorized (never not-found —
//! the rule set must not leak which documents exist).

mod checker;
mod expr;

use serde::Deserialize;

pub use checker::{DocumentFetcher, RuleChecker, RuleMatch};
pub use expr::{Environment, Expression};

/// One access rule: a path pattern and its read/write clauses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Rule {
    /// `/`-separated pattern; `{name}` segments capture path variables.
    pub path: String,
    /// Clause evaluated for read operations.
    #[serde(default)]
    pub read: Allow,
    /// Clause evaluated for write operations.
    #[serde(default)]
    pub write: Allow,
}

/// Predicates and auxiliary lookups for one direction of access.
///
/// Empty expressions evaluate to `true`, so a default `Allow` permits
/// everything the rule's pattern matches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Allow {
    /// Path predicate; sees `path`, `user` and `with`.
    #[serde(rename = "ifPath", default)]
    pub if_path: String,
    /// Content predicate; additionally sees `content` and `newContent`.
    #[serde(rename = "ifContent", default)]
    pub if_content: String,
    /// Auxiliary documents fetched before predicate evaluation.
    #[serde(default)]
    pub with: Vec<With>,
}

/// A named auxiliary document lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct With {
    /// Name the fetched document is bound to in the `with` map.
    pub name: String,
    /// Pattern resolved against path variables and the caller; see
    /// [`RuleMatch::check_path`].
    pub path: String,
}
