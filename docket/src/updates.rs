//! Partial updates and the in-memory merge that mirrors a `$set`.

use crate::{Error, Model, Result};
use mongodb::bson::{self, Bson, Document};
use serde::Serialize;

/// Name of the field stamped on every update of a model with
/// [`TRACKS_UPDATED_AT`](Model::TRACKS_UPDATED_AT) set.
pub const UPDATED_AT_FIELD: &str = "updated_at";

/// A partial patch: the fields to change and their new values.
///
/// Keys are document field names (after serde renames), top-level only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates(Document);

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a patch that overwrites every persisted field of `model`.
    pub fn from_model<M: Model>(model: &M) -> Result<Self> {
        Ok(Self(model_to_document(model)?))
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.0.insert(field, value);
        self
    }

    /// Like [`set`](Self::set), for values that go through serde.
    pub fn set_serialized<T: Serialize + ?Sized>(
        mut self,
        field: impl Into<String>,
        value: &T,
    ) -> Result<Self> {
        self.0.insert(field, bson::to_bson(value)?);
        Ok(self)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Bson>) -> Option<Bson> {
        self.0.insert(field, value)
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }

    /// Stamps [`UPDATED_AT_FIELD`] with the current time if `M` tracks it,
    /// replacing any value the caller set. Leaves the patch untouched
    /// otherwise.
    pub fn touch_for<M: Model>(&mut self) {
        if M::TRACKS_UPDATED_AT {
            self.0.insert(UPDATED_AT_FIELD, bson::DateTime::now());
        }
    }

    /// The `$set` modifier document sent to the server.
    pub(crate) fn to_set_document(&self) -> Document {
        bson::doc! { "$set": self.0.clone() }
    }
}

impl From<Document> for Updates {
    fn from(value: Document) -> Self {
        Self(value)
    }
}

impl From<Updates> for Document {
    fn from(value: Updates) -> Self {
        value.0
    }
}

/// Overlays `src` onto `dst`, key by key. Nested documents are replaced, not
/// merged.
pub fn extend_document(dst: &mut Document, src: &Document) {
    for (key, value) in src {
        dst.insert(key.clone(), value.clone());
    }
}

/// Canonical document form of `model`, the same one the driver would write.
pub fn model_to_document<M: Model>(model: &M) -> Result<Document> {
    Ok(bson::to_document(model)?)
}

pub fn document_to_model<M: Model>(document: Document) -> Result<M> {
    bson::from_document(document).map_err(|source| Error::Decode {
        collection: M::COLLECTION_NAME,
        source,
    })
}

/// Applies `updates` to `model` the way `$set` applies them to the stored
/// document. On error `model` is left as it was.
pub fn merge_into<M: Model>(model: &mut M, updates: &Updates) -> Result<()> {
    let mut document = model_to_document(model)?;
    extend_document(&mut document, updates.as_document());
    *model = document_to_model(document)?;

    Ok(())
}
