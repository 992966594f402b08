//! The request orchestrator.
//!
//! Every operation follows the same pipeline: select the matching rule and
//! check its path predicate, open a transaction, read whatever existing
//! state the operation needs, check the content predicate against existing
//! and proposed documents, apply the write, then commit — or roll back on
//! any error. Auxiliary `with` lookups during rule evaluation go through the
//! service's own document read path, so they are authorized like any other
//! read and run in their own transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use docrest_domain::rules::{DocumentFetcher, Rule, RuleChecker, RuleMatch};
use docrest_domain::{
    Collection, CollectionRef, Document, DocumentRef, DomainError, DomainResult, ObjectRef,
    Properties, Target, User,
};
use docrest_storage::{Repository, RepositoryTransaction};

use crate::error::{ServiceError, ServiceResult};

/// Documents fetched from a cursor per round trip.
const FETCH_PAGE_SIZE: usize = 10;

/// The transactional document service.
pub struct DocumentService {
    repository: Arc<dyn Repository>,
    checker: RuleChecker,
}

/// Resolves `with` lookups through the service's own read path, on behalf of
/// the current caller.
struct WithFetcher<'a> {
    service: &'a DocumentService,
    user: &'a User,
}

#[async_trait]
impl DocumentFetcher for WithFetcher<'_> {
    async fn fetch(&self, target: &ObjectRef) -> DomainResult<Document> {
        match target.clone().classify() {
            Target::Document(document) => self
                .service
                .get_document(&document, self.user)
                .await
                .map_err(|e| DomainError::WithFetch {
                    message: e.to_string(),
                }),
            Target::Collection(collection) => Err(DomainError::WithFetch {
                message: format!("'{collection}' does not address a document"),
            }),
        }
    }
}

/// Commits on success, rolls back on error. Exactly one of the two runs.
async fn finish<T>(
    tx: Box<dyn RepositoryTransaction>,
    result: ServiceResult<T>,
) -> ServiceResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

impl DocumentService {
    pub fn new(repository: Arc<dyn Repository>, rules: Vec<Rule>) -> Self {
        Self {
            repository,
            checker: RuleChecker::new(rules),
        }
    }

    /// Selects the rule for `target` and checks its path predicate.
    ///
    /// No matching rule is not-authorized, never not-found: whether a
    /// document exists outside the rule set must not leak.
    async fn rule_for(
        &self,
        target: &ObjectRef,
        user: &User,
        is_write: bool,
    ) -> ServiceResult<RuleMatch<'_>> {
        let matched = self
            .checker
            .select(target)
            .ok_or_else(|| ServiceError::not_authorized(target.to_string()))?;

        let fetcher = WithFetcher {
            service: self,
            user,
        };
        if !matched.check_path(user, is_write, &fetcher).await? {
            return Err(ServiceError::not_authorized(target.to_string()));
        }

        Ok(matched)
    }

    /// Evaluates the content predicate for filtering decisions.
    async fn content_allowed(
        &self,
        rule: &RuleMatch<'_>,
        user: &User,
        is_write: bool,
        content: Option<&Document>,
        new_content: Option<&Document>,
    ) -> ServiceResult<bool> {
        let fetcher = WithFetcher {
            service: self,
            user,
        };
        Ok(rule
            .check_content(user, is_write, content, new_content, &fetcher)
            .await?)
    }

    /// Evaluates the content predicate and fails not-authorized on denial.
    async fn authorize_content(
        &self,
        rule: &RuleMatch<'_>,
        user: &User,
        is_write: bool,
        content: Option<&Document>,
        new_content: Option<&Document>,
        target: &ObjectRef,
    ) -> ServiceResult<()> {
        if self
            .content_allowed(rule, user, is_write, content, new_content)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::not_authorized(target.to_string()))
        }
    }

    /// Fetches one document.
    pub async fn get_document(
        &self,
        target: &DocumentRef,
        user: &User,
    ) -> ServiceResult<Document> {
        let rule = self.rule_for(target.object_ref(), user, false).await?;
        let mut tx = self.repository.begin().await?;
        let result = async {
            let data = tx.get(target).await?;
            self.authorize_content(&rule, user, false, Some(&data), None, target.object_ref())
                .await?;
            Ok(data)
        }
        .await;
        finish(tx, result).await
    }

    /// Lists a collection: up to `limit` documents the caller may read, in
    /// `order_by` order.
    pub async fn get_collection(
        &self,
        target: &CollectionRef,
        limit: usize,
        order_by: &[String],
        user: &User,
    ) -> ServiceResult<Collection> {
        let rule = self.rule_for(target.object_ref(), user, false).await?;
        let mut tx = self.repository.begin().await?;
        let result = self
            .list_collection_tx(&mut *tx, &rule, target, limit, order_by, user)
            .await;
        finish(tx, result).await
    }

    async fn list_collection_tx(
        &self,
        tx: &mut dyn RepositoryTransaction,
        rule: &RuleMatch<'_>,
        target: &CollectionRef,
        limit: usize,
        order_by: &[String],
        user: &User,
    ) -> ServiceResult<Collection> {
        let mut cursor = tx.get_all(target, order_by).await?;

        let collected = async {
            let mut features: Vec<Document> = Vec::new();
            while features.len() < limit {
                let fetched = cursor.fetch(FETCH_PAGE_SIZE).await?;
                if fetched.is_empty() {
                    break;
                }
                for document in fetched {
                    if self
                        .content_allowed(rule, user, false, Some(&document), None)
                        .await?
                    {
                        features.push(document);
                        if features.len() == limit {
                            break;
                        }
                    }
                }
            }
            Ok::<_, ServiceError>(features)
        }
        .await;

        let closed = cursor.close().await;
        let features = collected?;
        closed?;

        Ok(Collection {
            id: target.id().to_string(),
            features,
        })
    }

    /// Creates a document with a server-chosen id.
    pub async fn add_document(
        &self,
        target: &CollectionRef,
        payload: Properties,
        user: &User,
    ) -> ServiceResult<Document> {
        let rule = self.rule_for(target.object_ref(), user, true).await?;
        let mut tx = self.repository.begin().await?;
        let result = async {
            // The id is not known until the insert; predicates see "*".
            let now = Utc::now();
            let proposed = Document {
                id: "*".to_string(),
                creation_date: Some(now),
                last_modification_date: Some(now),
                properties: payload.clone(),
            };
            self.authorize_content(
                &rule,
                user,
                true,
                None,
                Some(&proposed),
                target.object_ref(),
            )
            .await?;

            Ok(tx.add(target, payload).await?)
        }
        .await;
        finish(tx, result).await
    }

    /// Upserts a document at a caller-chosen address.
    ///
    /// The payload is a typed document whose id must equal the target's last
    /// segment; timestamps in the payload are ignored.
    pub async fn put_document(
        &self,
        target: &DocumentRef,
        payload: Document,
        user: &User,
    ) -> ServiceResult<()> {
        if payload.id != target.id() {
            return Err(ServiceError::bad_request("Invalid ID"));
        }

        let rule = self.rule_for(target.object_ref(), user, true).await?;
        let mut tx = self.repository.begin().await?;
        let result = async {
            let existing = match tx.get(target).await {
                Ok(document) => Some(document),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };

            let now = Utc::now();
            let proposed = Document {
                id: target.id().to_string(),
                // A missing document means creation: the proposed document
                // carries "now", never a zero value.
                creation_date: existing
                    .as_ref()
                    .and_then(|d| d.creation_date)
                    .or(Some(now)),
                last_modification_date: Some(now),
                properties: payload.properties,
            };

            self.authorize_content(
                &rule,
                user,
                true,
                existing.as_ref(),
                Some(&proposed),
                target.object_ref(),
            )
            .await?;

            tx.put(target, proposed.properties).await?;
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    /// Deep-merges properties into an existing document.
    pub async fn patch_document(
        &self,
        target: &DocumentRef,
        payload: Properties,
        user: &User,
    ) -> ServiceResult<()> {
        let rule = self.rule_for(target.object_ref(), user, true).await?;
        let mut tx = self.repository.begin().await?;
        let result = async {
            let existing = tx.get(target).await?;

            let proposed = Document {
                id: target.id().to_string(),
                creation_date: existing.creation_date,
                last_modification_date: Some(Utc::now()),
                properties: docrest_domain::merge_properties(&existing.properties, &payload),
            };

            self.authorize_content(
                &rule,
                user,
                true,
                Some(&existing),
                Some(&proposed),
                target.object_ref(),
            )
            .await?;

            tx.patch(target, payload).await?;
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    /// Removes one document.
    pub async fn delete_document(&self, target: &DocumentRef, user: &User) -> ServiceResult<()> {
        let rule = self.rule_for(target.object_ref(), user, true).await?;
        let mut tx = self.repository.begin().await?;
        let result = async {
            let existing = tx.get(target).await?;
            self.authorize_content(
                &rule,
                user,
                true,
                Some(&existing),
                None,
                target.object_ref(),
            )
            .await?;
            tx.delete(target).await?;
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    /// Removes every document of a collection the caller may write.
    ///
    /// Authorization is per document, so a partial delete is the intended
    /// semantics when the content predicate rejects some of them.
    pub async fn delete_collection(
        &self,
        target: &CollectionRef,
        user: &User,
    ) -> ServiceResult<()> {
        let rule = self.rule_for(target.object_ref(), user, true).await?;
        let mut tx = self.repository.begin().await?;
        let result = self
            .delete_collection_tx(&mut *tx, &rule, target, user)
            .await;
        finish(tx, result).await
    }

    async fn delete_collection_tx(
        &self,
        tx: &mut dyn RepositoryTransaction,
        rule: &RuleMatch<'_>,
        target: &CollectionRef,
        user: &User,
    ) -> ServiceResult<()> {
        let mut cursor = tx.get_all(target, &[]).await?;

        let scanned = async {
            let mut authorized: Vec<String> = Vec::new();
            loop {
                let fetched = cursor.fetch(FETCH_PAGE_SIZE).await?;
                if fetched.is_empty() {
                    break;
                }
                for document in fetched {
                    if self
                        .content_allowed(rule, user, true, Some(&document), None)
                        .await?
                    {
                        authorized.push(document.id);
                    }
                }
            }
            Ok::<_, ServiceError>(authorized)
        }
        .await;

        let closed = cursor.close().await;
        let authorized = scanned?;
        closed?;

        for id in authorized {
            tx.delete(&target.child(id)).await?;
        }
        Ok(())
    }
}
