//! Rule selection and predicate evaluation.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value as Json};

use crate::document::{Document, User};
use crate::error::DomainResult;
use crate::path::ObjectRef;
use crate::rules::expr::{Environment, Expression};
use crate::rules::{Allow, Rule};

/// Fetches auxiliary documents during `with` resolution.
///
/// The request orchestrator implements this over its own document read path
/// so that `with` lookups are themselves subject to authorization. A fetch
/// error never fails rule evaluation: the `with` name is bound to null.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, target: &ObjectRef) -> DomainResult<Document>;
}

/// The configured rule set.
///
/// Rules are consulted in declaration order; the first whose pattern matches
/// the target is selected. Collection targets are extended with a synthetic
/// `"*"` segment so that rules always address document-shaped paths.
#[derive(Debug, Default)]
pub struct RuleChecker {
    rules: Vec<Rule>,
}

/// Returns the capture name of a `{name}` pattern segment.
fn capture_variable(segment: &str) -> Option<&str> {
    if segment.len() >= 3 && segment.starts_with('{') && segment.ends_with('}') {
        Some(&segment[1..segment.len() - 1])
    } else {
        None
    }
}

/// Evaluates a predicate source against an environment.
///
/// An empty source denotes `true` and is never compiled.
fn check_condition(source: &str, env: &Environment) -> DomainResult<bool> {
    if source.is_empty() {
        return Ok(true);
    }
    Expression::parse(source)?.evaluate_bool(env)
}

impl RuleChecker {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Selects the first rule matching `target`, capturing path variables.
    ///
    /// Returns `None` when no rule matches; callers must treat that as "not
    /// authorized" so the rule set never leaks which documents exist.
    pub fn select(&self, target: &ObjectRef) -> Option<RuleMatch<'_>> {
        let mut doc_target: Vec<&str> = target.segments().iter().map(String::as_str).collect();
        if !target.is_document() {
            doc_target.push("*");
        }

        for rule in &self.rules {
            let pattern: Vec<&str> = rule.path.split('/').collect();
            if pattern.len() != doc_target.len() {
                continue;
            }

            let mut path_variables = BTreeMap::new();
            let mut matched = true;
            for (pattern_segment, target_segment) in pattern.iter().zip(&doc_target) {
                if let Some(name) = capture_variable(pattern_segment) {
                    path_variables.insert(name.to_string(), (*target_segment).to_string());
                } else if pattern_segment != target_segment {
                    matched = false;
                    break;
                }
            }

            if matched {
                return Some(RuleMatch {
                    rule,
                    path_variables,
                });
            }
        }

        None
    }
}

/// A selected rule together with its captured path variables.
#[derive(Debug)]
pub struct RuleMatch<'a> {
    rule: &'a Rule,
    path_variables: BTreeMap<String, String>,
}

impl RuleMatch<'_> {
    fn allow(&self, is_write: bool) -> &Allow {
        if is_write {
            &self.rule.write
        } else {
            &self.rule.read
        }
    }

    /// Resolves a variable name inside a `with` pattern.
    ///
    /// Bare names and `path.<name>` read the captured path variables;
    /// `user.id` / `user.name` / `user.email` read the caller. Anything
    /// unresolved substitutes the literal `"<nil>"`.
    fn resolve_variable(&self, name: &str, user: &User) -> String {
        if let Some(stripped) = name.strip_prefix("path.") {
            return self
                .path_variables
                .get(stripped)
                .cloned()
                .unwrap_or_else(|| "<nil>".to_string());
        }
        match name {
            "user.id" => user.id.clone(),
            "user.name" => user.name.clone(),
            "user.email" => user.email.clone(),
            _ => self
                .path_variables
                .get(name)
                .cloned()
                .unwrap_or_else(|| "<nil>".to_string()),
        }
    }

    /// Fetches the allow clause's `with` documents into a JSON map.
    ///
    /// `with` is best-effort context: a getter error binds the name to null
    /// so that predicates remain expressible when an auxiliary document is
    /// missing.
    async fn resolve_with(
        &self,
        allow: &Allow,
        user: &User,
        fetcher: &dyn DocumentFetcher,
    ) -> Map<String, Json> {
        let mut with_content = Map::new();

        for with in &allow.with {
            let segments: Vec<String> = with
                .path
                .split('/')
                .map(|segment| match capture_variable(segment) {
                    Some(name) => self.resolve_variable(name, user),
                    None => segment.to_string(),
                })
                .collect();

            let target = ObjectRef::new(segments);
            let value = match fetcher.fetch(&target).await {
                Ok(document) => document_json(&document),
                Err(_) => Json::Null,
            };
            with_content.insert(with.name.clone(), value);
        }

        with_content
    }

    fn base_environment(
        &self,
        user: &User,
        with_content: Map<String, Json>,
    ) -> Environment {
        let path: Map<String, Json> = self
            .path_variables
            .iter()
            .map(|(k, v)| (k.clone(), Json::String(v.clone())))
            .collect();

        let mut env = Environment::new();
        env.bind("path", Json::Object(path));
        env.bind(
            "user",
            serde_json::json!({
                "id": user.id,
                "name": user.name,
                "email": user.email,
            }),
        );
        env.bind("with", Json::Object(with_content));
        env
    }

    /// Evaluates the `ifPath` predicate of the read or write clause.
    pub async fn check_path(
        &self,
        user: &User,
        is_write: bool,
        fetcher: &dyn DocumentFetcher,
    ) -> DomainResult<bool> {
        let allow = self.allow(is_write);
        let with_content = self.resolve_with(allow, user, fetcher).await;
        let env = self.base_environment(user, with_content);
        check_condition(&allow.if_path, &env)
    }

    /// Evaluates the `ifContent` predicate of the read or write clause.
    ///
    /// `content` is the existing document and `new_content` the proposed
    /// one; absent documents (including documents with an empty id) bind
    /// null so predicates can distinguish "no prior document" from a
    /// document with empty fields.
    pub async fn check_content(
        &self,
        user: &User,
        is_write: bool,
        content: Option<&Document>,
        new_content: Option<&Document>,
        fetcher: &dyn DocumentFetcher,
    ) -> DomainResult<bool> {
        let allow = self.allow(is_write);
        let with_content = self.resolve_with(allow, user, fetcher).await;
        let mut env = self.base_environment(user, with_content);
        env.bind("content", optional_document_json(content));
        env.bind("newContent", optional_document_json(new_content));
        check_condition(&allow.if_content, &env)
    }
}

fn document_json(document: &Document) -> Json {
    serde_json::to_value(document).unwrap_or(Json::Null)
}

fn optional_document_json(document: Option<&Document>) -> Json {
    match document {
        Some(d) if !d.id.is_empty() => document_json(d),
        _ => Json::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::With;
    use serde_json::json;
    use std::collections::HashMap;

    struct MapFetcher {
        documents: HashMap<String, Document>,
    }

    impl MapFetcher {
        fn empty() -> Self {
            Self {
                documents: HashMap::new(),
            }
        }

        fn with_document(path: &str, document: Document) -> Self {
            let mut documents = HashMap::new();
            documents.insert(path.to_string(), document);
            Self { documents }
        }
    }

    #[async_trait]
    impl DocumentFetcher for MapFetcher {
        async fn fetch(&self, target: &ObjectRef) -> DomainResult<Document> {
            self.documents.get(&target.to_string()).cloned().ok_or(
                crate::error::DomainError::WithFetch {
                    message: format!("no document at '{target}'"),
                },
            )
        }
    }

    fn rule(path: &str) -> Rule {
        Rule {
            path: path.to_string(),
            ..Rule::default()
        }
    }

    fn doc(id: &str, properties: Json) -> Document {
        Document {
            id: id.to_string(),
            properties: match properties {
                Json::Object(map) => map,
                other => panic!("expected object, got {other}"),
            },
            ..Document::default()
        }
    }

    #[test]
    fn test_select_captures_variables() {
        let checker = RuleChecker::new(vec![rule("test/{docId}")]);
        let target = ObjectRef::parse("test/doc1").unwrap();

        let matched = checker.select(&target).expect("rule should match");
        assert_eq!(matched.path_variables.get("docId").unwrap(), "doc1");
    }

    #[test]
    fn test_select_extends_collection_targets() {
        // A document-shaped pattern matches the collection through the
        // synthetic "*" segment, binding it to the variable.
        let checker = RuleChecker::new(vec![rule("test/{docId}")]);
        let target = ObjectRef::parse("test").unwrap();

        let matched = checker.select(&target).expect("rule should match");
        assert_eq!(matched.path_variables.get("docId").unwrap(), "*");
    }

    #[test]
    fn test_select_requires_equal_lengths() {
        let checker = RuleChecker::new(vec![rule("test/{docId}")]);
        assert!(checker
            .select(&ObjectRef::parse("test/doc1/sub").unwrap())
            .is_none());
        assert!(checker
            .select(&ObjectRef::parse("test/doc1/sub/x").unwrap())
            .is_none());
    }

    #[test]
    fn test_select_requires_literal_equality() {
        let checker = RuleChecker::new(vec![rule("test/{docId}")]);
        assert!(checker
            .select(&ObjectRef::parse("other/doc1").unwrap())
            .is_none());
    }

    #[test]
    fn test_select_honours_declaration_order() {
        let mut first = rule("test/{docId}");
        first.read.if_path = "false".to_string();
        let second = rule("test/{docId}");

        let checker = RuleChecker::new(vec![first, second]);
        let target = ObjectRef::parse("test/doc1").unwrap();
        let matched = checker.select(&target).unwrap();
        // First match wins even though the second would allow everything.
        assert_eq!(matched.rule.read.if_path, "false");
    }

    #[tokio::test]
    async fn test_empty_predicates_allow() {
        let checker = RuleChecker::new(vec![rule("test/{docId}")]);
        let target = ObjectRef::parse("test/doc1").unwrap();
        let matched = checker.select(&target).unwrap();
        let fetcher = MapFetcher::empty();

        assert!(matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
        assert!(matched
            .check_content(&User::default(), true, None, None, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_path_binds_user_and_path() {
        let mut r = rule("test/{userId}");
        r.read.if_path = "path.userId == user.id".to_string();
        let checker = RuleChecker::new(vec![r]);
        let target = ObjectRef::parse("test/abcd").unwrap();
        let matched = checker.select(&target).unwrap();
        let fetcher = MapFetcher::empty();

        let alice = User {
            id: "abcd".to_string(),
            ..User::default()
        };
        assert!(matched.check_path(&alice, false, &fetcher).await.unwrap());
        assert!(!matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_path_write_selects_write_clause() {
        let mut r = rule("test/{docId}");
        r.read.if_path = "true".to_string();
        r.write.if_path = "false".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("test/doc1").unwrap())
            .unwrap();
        let fetcher = MapFetcher::empty();

        assert!(matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
        assert!(!matched
            .check_path(&User::default(), true, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_content_binds_documents_and_null() {
        let mut r = rule("test/{docId}");
        r.write.if_content =
            "content == null && newContent.properties.k == 'v'".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("test/doc1").unwrap())
            .unwrap();
        let fetcher = MapFetcher::empty();

        let proposed = doc("doc1", json!({"k": "v"}));
        assert!(matched
            .check_content(&User::default(), true, None, Some(&proposed), &fetcher)
            .await
            .unwrap());

        let existing = doc("doc1", json!({"k": "old"}));
        assert!(!matched
            .check_content(
                &User::default(),
                true,
                Some(&existing),
                Some(&proposed),
                &fetcher
            )
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_content_treats_empty_id_as_null() {
        let mut r = rule("test/{docId}");
        r.read.if_content = "content == null".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("test/doc1").unwrap())
            .unwrap();
        let fetcher = MapFetcher::empty();

        let unpersisted = Document::default();
        assert!(matched
            .check_content(&User::default(), false, Some(&unpersisted), None, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_with_resolution_substitutes_variables() {
        let mut r = rule("notes/{userId}");
        r.read.with = vec![With {
            name: "profile".to_string(),
            path: "profiles/{userId}".to_string(),
        }];
        r.read.if_path = "with.profile.properties.plan == 'pro'".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("notes/abcd").unwrap())
            .unwrap();

        let fetcher =
            MapFetcher::with_document("profiles/abcd", doc("abcd", json!({"plan": "pro"})));
        assert!(matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_with_resolution_supports_user_variables() {
        let mut r = rule("notes/{noteId}");
        r.read.with = vec![With {
            name: "profile".to_string(),
            path: "profiles/{user.id}".to_string(),
        }];
        r.read.if_path = "with.profile != null".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("notes/n1").unwrap())
            .unwrap();

        let fetcher = MapFetcher::with_document("profiles/u1", doc("u1", json!({})));
        let user = User {
            id: "u1".to_string(),
            ..User::default()
        };
        assert!(matched.check_path(&user, false, &fetcher).await.unwrap());
    }

    #[tokio::test]
    async fn test_with_fetch_failure_binds_null() {
        let mut r = rule("notes/{userId}");
        r.read.with = vec![With {
            name: "profile".to_string(),
            path: "profiles/{userId}".to_string(),
        }];
        r.read.if_path = "with.profile == null".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("notes/abcd").unwrap())
            .unwrap();

        let fetcher = MapFetcher::empty();
        assert!(matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unresolvable_variable_substitutes_nil_literal() {
        let mut r = rule("notes/{userId}");
        r.read.with = vec![With {
            name: "other".to_string(),
            path: "profiles/{missing}".to_string(),
        }];
        r.read.if_path = "with.other == null".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("notes/abcd").unwrap())
            .unwrap();

        // The fetcher only knows the "<nil>" path; the lookup succeeds, which
        // proves the literal substitution happened.
        let fetcher =
            MapFetcher::with_document("profiles/<nil>", doc("x", json!({})));
        assert!(!matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_malformed_expression_surfaces_parse_error() {
        let mut r = rule("test/{doc}");
        r.read.if_path = "path.doc > '100".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("test/099").unwrap())
            .unwrap();
        let fetcher = MapFetcher::empty();

        let err = matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap_err();
        assert!(!err.is_bad_request());
    }

    #[tokio::test]
    async fn test_non_boolean_condition_is_an_error() {
        let mut r = rule("test/{doc}");
        r.read.if_path = "path.doc".to_string();
        let checker = RuleChecker::new(vec![r]);
        let matched = checker
            .select(&ObjectRef::parse("test/doc1").unwrap())
            .unwrap();
        let fetcher = MapFetcher::empty();

        let err = matched
            .check_path(&User::default(), false, &fetcher)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::DomainError::NonBooleanCondition { .. }
        ));
    }
}
