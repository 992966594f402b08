//! Repository trait definitions.

use async_trait::async_trait;

use docrest_domain::{CollectionRef, Document, DocumentRef, Properties};

use crate::error::{StorageError, StorageResult};

/// Maximum length for document identifiers (the `id` column width).
const MAX_ID_LENGTH: usize = 126;

/// Validate a document id before it is written.
///
/// # Errors
/// Returns `StorageError::InvalidInput` if the id is empty or too long.
pub fn validate_document_id(id: &str) -> StorageResult<()> {
    if id.is_empty() {
        return Err(StorageError::InvalidInput {
            message: "document id cannot be empty".to_string(),
        });
    }
    if id.len() > MAX_ID_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!(
                "document id exceeds maximum length of {} characters",
                MAX_ID_LENGTH
            ),
        });
    }
    Ok(())
}

/// A validated ordering key for collection listings.
///
/// The whitelisted keys `id` (alias `$id`), `creationDate` and
/// `lastModificationDate` map to storage columns; any other bare identifier
/// orders by that document property. Dotted or otherwise malformed names are
/// rejected — which also keeps property keys safely embeddable in the
/// cursor declaration the PostgreSQL backend builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderKey {
    Id,
    CreationDate,
    LastModificationDate,
    Property(String),
}

impl OrderKey {
    /// Parses a single order-by field.
    ///
    /// # Errors
    /// Returns `StorageError::InvalidOrderBy` for empty, dotted or
    /// non-identifier fields.
    pub fn parse(field: &str) -> StorageResult<Self> {
        match field {
            "id" | "$id" => return Ok(OrderKey::Id),
            "creationDate" => return Ok(OrderKey::CreationDate),
            "lastModificationDate" => return Ok(OrderKey::LastModificationDate),
            _ => {}
        }
        let is_identifier = !field.is_empty()
            && field
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !is_identifier {
            return Err(StorageError::InvalidOrderBy {
                field: field.to_string(),
            });
        }
        Ok(OrderKey::Property(field.to_string()))
    }

    /// Parses a full order-by clause, in order.
    pub fn parse_all(fields: &[String]) -> StorageResult<Vec<Self>> {
        fields.iter().map(|f| Self::parse(f)).collect()
    }
}

/// A server-side iterator over one collection, bound to its transaction.
///
/// The cursor mutably borrows the transaction it was opened on, so it cannot
/// outlive it and the transaction cannot be used while the cursor is open.
/// Callers own closing; `close` must be invoked on every path.
#[async_trait]
pub trait DocumentCursor: Send {
    /// Fetches up to `count` documents; an empty result means exhaustion.
    async fn fetch(&mut self, count: usize) -> StorageResult<Vec<Document>>;

    /// Releases server-side resources held by the cursor.
    async fn close(self: Box<Self>) -> StorageResult<()>;
}

/// One storage transaction. Spans exactly one request.
///
/// Exactly one of `commit` or `rollback` must be invoked; both consume the
/// transaction, so the type system enforces it. Reads observe the
/// transaction's own prior writes, and cursors observe its snapshot.
#[async_trait]
pub trait RepositoryTransaction: Send {
    /// Reads a document, or fails with not-found.
    async fn get(&mut self, document: &DocumentRef) -> StorageResult<Document>;

    /// Opens a cursor over a collection, ordered by `order_by`.
    ///
    /// Fields are validated via [`OrderKey::parse_all`]; an empty clause
    /// orders by id ascending.
    async fn get_all<'a>(
        &'a mut self,
        collection: &CollectionRef,
        order_by: &[String],
    ) -> StorageResult<Box<dyn DocumentCursor + Send + 'a>>;

    /// Inserts a new document with a fresh server-generated id and
    /// `creationDate = lastModificationDate = now`.
    async fn add(
        &mut self,
        collection: &CollectionRef,
        properties: Properties,
    ) -> StorageResult<Document>;

    /// Upserts a document. An update preserves `creationDate` and refreshes
    /// `lastModificationDate`; an insert sets both to now.
    async fn put(&mut self, document: &DocumentRef, properties: Properties) -> StorageResult<()>;

    /// Deep-merges `properties` into an existing document and refreshes
    /// `lastModificationDate`. Fails with not-found when absent.
    async fn patch(&mut self, document: &DocumentRef, properties: Properties)
        -> StorageResult<()>;

    /// Deletes a document. Deleting an absent document is not an error.
    async fn delete(&mut self, document: &DocumentRef) -> StorageResult<()>;

    /// Deletes every document whose address has `collection` as a prefix.
    /// Idempotent.
    async fn delete_collection(&mut self, collection: &CollectionRef) -> StorageResult<()>;

    /// Commits the transaction.
    async fn commit(self: Box<Self>) -> StorageResult<()>;

    /// Rolls the transaction back.
    async fn rollback(self: Box<Self>) -> StorageResult<()>;
}

/// Abstract handle to a document store.
///
/// Implementations must be thread-safe; one value is shared across all
/// request tasks.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Ensures the persistent schema exists. Idempotent.
    async fn init(&self) -> StorageResult<()>;

    /// Begins a new transaction, acquiring a connection for its duration.
    async fn begin(&self) -> StorageResult<Box<dyn RepositoryTransaction>>;
}
