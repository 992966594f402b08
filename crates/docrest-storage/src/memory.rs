//! In-memory storage implementation for tests and local development.
//!
//! Transactions take a full snapshot of the store at `begin` and publish it
//! back on `commit`, which gives each request the isolation the contract
//! asks for. Concurrent writers are last-commit-wins; that is acceptable for
//! the backend's purpose and documented here so nobody mistakes it for the
//! production backend.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value as Json;
use ulid::Ulid;

use docrest_domain::{merge_properties, CollectionRef, Document, DocumentRef, Properties};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_document_id, DocumentCursor, OrderKey, Repository, RepositoryTransaction,
};

#[derive(Debug, Clone)]
struct StoredDocument {
    properties: Properties,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

/// collection path -> document id -> row
type Collections = BTreeMap<String, BTreeMap<String, StoredDocument>>;

/// A clock the test harness can freeze and advance.
///
/// While unfixed, `now` reads the system clock.
#[derive(Debug, Default)]
pub struct MemoryClock {
    fixed: Mutex<Option<DateTime<Utc>>>,
}

impl MemoryClock {
    pub fn now(&self) -> DateTime<Utc> {
        self.fixed
            .lock()
            .expect("clock mutex poisoned")
            .unwrap_or_else(Utc::now)
    }

    /// Freezes the clock at `instant`.
    pub fn fix(&self, instant: DateTime<Utc>) {
        *self.fixed.lock().expect("clock mutex poisoned") = Some(instant);
    }

    /// Advances a frozen clock. No-op while the clock is unfixed.
    pub fn advance(&self, by: Duration) {
        let mut fixed = self.fixed.lock().expect("clock mutex poisoned");
        if let Some(instant) = *fixed {
            *fixed = Some(instant + by);
        }
    }
}

/// In-memory implementation of [`Repository`].
#[derive(Debug, Default)]
pub struct MemoryRepository {
    data: Arc<RwLock<Collections>>,
    clock: Arc<MemoryClock>,
}

impl MemoryRepository {
    /// Creates an empty in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty repository wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// The clock used for server-assigned timestamps.
    pub fn clock(&self) -> Arc<MemoryClock> {
        Arc::clone(&self.clock)
    }

    /// Seeds a document directly, bypassing transactions. Test helper.
    pub fn seed(
        &self,
        document: &DocumentRef,
        properties: Properties,
        created: DateTime<Utc>,
        updated: DateTime<Utc>,
    ) {
        let mut data = self.data.write().expect("store lock poisoned");
        data.entry(document.collection().to_string())
            .or_default()
            .insert(
                document.id().to_string(),
                StoredDocument {
                    properties,
                    created,
                    updated,
                },
            );
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn init(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn begin(&self) -> StorageResult<Box<dyn RepositoryTransaction>> {
        let working = self.data.read().expect("store lock poisoned").clone();
        Ok(Box::new(MemoryTransaction {
            shared: Arc::clone(&self.data),
            working,
            clock: Arc::clone(&self.clock),
        }))
    }
}

struct MemoryTransaction {
    shared: Arc<RwLock<Collections>>,
    working: Collections,
    clock: Arc<MemoryClock>,
}

fn to_document(id: &str, stored: &StoredDocument) -> Document {
    Document {
        id: id.to_string(),
        creation_date: Some(stored.created),
        last_modification_date: Some(stored.updated),
        properties: stored.properties.clone(),
    }
}

/// Total order over JSON values: null < bool < number < string < array <
/// object, with natural ordering inside each kind where one exists.
fn compare_json(a: Option<&Json>, b: Option<&Json>) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: Option<&Json>) -> u8 {
        match v {
            None | Some(Json::Null) => 0,
            Some(Json::Bool(_)) => 1,
            Some(Json::Number(_)) => 2,
            Some(Json::String(_)) => 3,
            Some(Json::Array(_)) => 4,
            Some(Json::Object(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Json::Bool(x)), Some(Json::Bool(y))) => x.cmp(y),
        (Some(Json::Number(x)), Some(Json::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Json::String(x)), Some(Json::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn compare_documents(a: &Document, b: &Document, keys: &[OrderKey]) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    for key in keys {
        let ordering = match key {
            OrderKey::Id => a.id.cmp(&b.id),
            OrderKey::CreationDate => a.creation_date.cmp(&b.creation_date),
            OrderKey::LastModificationDate => {
                a.last_modification_date.cmp(&b.last_modification_date)
            }
            OrderKey::Property(name) => {
                compare_json(a.properties.get(name), b.properties.get(name))
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    a.id.cmp(&b.id)
}

#[async_trait]
impl RepositoryTransaction for MemoryTransaction {
    async fn get(&mut self, document: &DocumentRef) -> StorageResult<Document> {
        self.working
            .get(&document.collection().to_string())
            .and_then(|collection| collection.get(document.id()))
            .map(|stored| to_document(document.id(), stored))
            .ok_or_else(|| StorageError::DocumentNotFound {
                target: document.to_string(),
            })
    }

    async fn get_all<'a>(
        &'a mut self,
        collection: &CollectionRef,
        order_by: &[String],
    ) -> StorageResult<Box<dyn DocumentCursor + Send + 'a>> {
        let keys = OrderKey::parse_all(order_by)?;

        let mut documents: Vec<Document> = self
            .working
            .get(&collection.to_string())
            .map(|col| col.iter().map(|(id, stored)| to_document(id, stored)).collect())
            .unwrap_or_default();
        documents.sort_by(|a, b| compare_documents(a, b, &keys));

        Ok(Box::new(MemoryCursor {
            remaining: documents.into(),
        }))
    }

    async fn add(
        &mut self,
        collection: &CollectionRef,
        properties: Properties,
    ) -> StorageResult<Document> {
        let id = Ulid::new().to_string();
        let now = self.clock.now();

        self.working
            .entry(collection.to_string())
            .or_default()
            .insert(
                id.clone(),
                StoredDocument {
                    properties: properties.clone(),
                    created: now,
                    updated: now,
                },
            );

        Ok(Document {
            id,
            creation_date: Some(now),
            last_modification_date: Some(now),
            properties,
        })
    }

    async fn put(&mut self, document: &DocumentRef, properties: Properties) -> StorageResult<()> {
        validate_document_id(document.id())?;
        let now = self.clock.now();

        let collection = self
            .working
            .entry(document.collection().to_string())
            .or_default();
        match collection.get_mut(document.id()) {
            Some(stored) => {
                stored.properties = properties;
                stored.updated = now;
            }
            None => {
                collection.insert(
                    document.id().to_string(),
                    StoredDocument {
                        properties,
                        created: now,
                        updated: now,
                    },
                );
            }
        }

        Ok(())
    }

    async fn patch(
        &mut self,
        document: &DocumentRef,
        properties: Properties,
    ) -> StorageResult<()> {
        validate_document_id(document.id())?;
        let now = self.clock.now();

        let stored = self
            .working
            .get_mut(&document.collection().to_string())
            .and_then(|collection| collection.get_mut(document.id()))
            .ok_or_else(|| StorageError::DocumentNotFound {
                target: document.to_string(),
            })?;

        stored.properties = merge_properties(&stored.properties, &properties);
        stored.updated = now;
        Ok(())
    }

    async fn delete(&mut self, document: &DocumentRef) -> StorageResult<()> {
        if let Some(collection) = self.working.get_mut(&document.collection().to_string()) {
            collection.remove(document.id());
        }
        Ok(())
    }

    async fn delete_collection(&mut self, collection: &CollectionRef) -> StorageResult<()> {
        let path = collection.to_string();
        let prefix = format!("{}/", path);
        self.working
            .retain(|key, _| *key != path && !key.starts_with(&prefix));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StorageResult<()> {
        *self.shared.write().expect("store lock poisoned") = self.working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}

struct MemoryCursor {
    remaining: VecDeque<Document>,
}

#[async_trait]
impl DocumentCursor for MemoryCursor {
    async fn fetch(&mut self, count: usize) -> StorageResult<Vec<Document>> {
        let take = count.min(self.remaining.len());
        Ok(self.remaining.drain(..take).collect())
    }

    async fn close(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
