//! The path model: hierarchical addresses over collections and documents.
//!
//! A path is an ordered sequence of non-empty segments alternating between
//! collection names and document identifiers, starting with a top-level
//! collection. A path of even positive length addresses a document, an odd
//! length addresses a collection:
//!
//! ```text
//! books                     -> collection "books"
//! books/moby-dick           -> document "moby-dick" in "books"
//! books/moby-dick/chapters  -> sub-collection "chapters"
//! ```

use std::fmt;

use crate::error::{DomainError, DomainResult};

/// An untyped reference to a document or a collection.
///
/// Callers classify once via [`ObjectRef::classify`] and work with the typed
/// [`DocumentRef`] / [`CollectionRef`] wrappers from there; the rule engine
/// keeps operating on untyped references because rule patterns address both.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    segments: Vec<String>,
}

/// An [`ObjectRef`] classified by parity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Document(DocumentRef),
    Collection(CollectionRef),
}

impl ObjectRef {
    /// Builds a reference from raw segments, without validation.
    ///
    /// Used by the rule engine when substituting variables into `with`
    /// patterns; a nonsensical result simply fails to resolve later.
    pub fn new(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Parses a URL path into a reference.
    ///
    /// Leading and trailing slashes are stripped before splitting. An empty
    /// result or an empty segment is a bad request.
    pub fn parse(path: &str) -> DomainResult<Self> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(DomainError::InvalidPath {
                message: "empty path".to_string(),
            });
        }
        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(DomainError::InvalidPath {
                message: "empty item in path".to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// True iff this reference addresses a document.
    pub fn is_document(&self) -> bool {
        !self.segments.is_empty() && self.segments.len() % 2 == 0
    }

    /// The last segment: the document id, or the collection name.
    pub fn id(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// The path segments in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Classifies this reference by parity.
    pub fn classify(self) -> Target {
        if self.is_document() {
            Target::Document(DocumentRef(self))
        } else {
            Target::Collection(CollectionRef(self))
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("/"))
    }
}

/// A reference known to address a document (even positive length).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef(ObjectRef);

impl DocumentRef {
    /// The document id (last segment).
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// The collection containing this document.
    pub fn collection(&self) -> CollectionRef {
        let mut segments = self.0.segments.clone();
        segments.pop();
        CollectionRef(ObjectRef::new(segments))
    }

    /// The untyped view of this reference.
    pub fn object_ref(&self) -> &ObjectRef {
        &self.0
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A reference known to address a collection (odd length).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRef(ObjectRef);

impl CollectionRef {
    /// The collection name (last segment).
    pub fn id(&self) -> &str {
        self.0.id()
    }

    /// The document enclosing this collection, or `None` at the top level.
    pub fn parent(&self) -> Option<DocumentRef> {
        if self.0.segments.len() < 2 {
            return None;
        }
        let mut segments = self.0.segments.clone();
        segments.pop();
        Some(DocumentRef(ObjectRef::new(segments)))
    }

    /// The document with the given id inside this collection.
    pub fn child(&self, id: impl Into<String>) -> DocumentRef {
        let mut segments = self.0.segments.clone();
        segments.push(id.into());
        DocumentRef(ObjectRef::new(segments))
    }

    /// The untyped view of this reference.
    pub fn object_ref(&self) -> &ObjectRef {
        &self.0
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
