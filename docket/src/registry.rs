//! Process-wide registry of model types, keyed by collection name.
//!
//! Every `#[derive(Model)]` type registers itself at link time through
//! [`register_model!`](crate::register_model). The registry is read-only once
//! the process starts. It lets code that only knows a collection name (for
//! example [`find_iter_dyn`]) materialize the concrete model type.

use crate::{Error, Model, QueryIter, Result};
use futures_util::{FutureExt, StreamExt, future::BoxFuture};
use mongodb::{
    Database, IndexModel,
    bson::{self, Bson, Document},
    options::FindOptions,
};
use std::{
    any::Any,
    collections::{HashMap, hash_map::Entry},
    sync::LazyLock,
};

/// Object-safe view of a [`Model`].
pub trait AnyModel: Any + Send + Sync {
    fn collection_name(&self) -> &'static str;

    fn identifier(&self) -> Option<Bson>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<M: Model> AnyModel for M {
    fn collection_name(&self) -> &'static str {
        M::COLLECTION_NAME
    }

    fn identifier(&self) -> Option<Bson> {
        Model::identifier(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

impl dyn AnyModel {
    pub fn is<M: Model>(&self) -> bool {
        self.as_any().is::<M>()
    }

    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.as_any().downcast_ref()
    }

    pub fn downcast<M: Model>(self: Box<Self>) -> Option<Box<M>> {
        self.into_any().downcast().ok()
    }
}

impl std::fmt::Debug for dyn AnyModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyModel")
            .field("collection", &self.collection_name())
            .field("id", &self.identifier())
            .finish_non_exhaustive()
    }
}

#[doc(hidden)]
pub struct ModelMetadataWrapper(pub ModelMetadata);

inventory::collect!(ModelMetadataWrapper);

pub struct ModelMetadata {
    collection_name: &'static str,
    decode_ptr: fn(Document) -> std::result::Result<Box<dyn AnyModel>, bson::de::Error>,
    indexes_ptr: fn() -> Vec<IndexModel>,
}

impl ModelMetadata {
    #[doc(hidden)]
    pub const fn of<M: Model>() -> Self {
        Self {
            collection_name: M::COLLECTION_NAME,
            decode_ptr: decode_boxed::<M>,
            indexes_ptr: M::indexes,
        }
    }

    pub fn collection_name(&self) -> &'static str {
        self.collection_name
    }

    pub fn indexes(&self) -> Vec<IndexModel> {
        (self.indexes_ptr)()
    }

    /// Decodes `document` into a new instance of the registered type.
    pub fn decode(
        &self,
        document: Document,
    ) -> std::result::Result<Box<dyn AnyModel>, bson::de::Error> {
        (self.decode_ptr)(document)
    }
}

fn decode_boxed<M: Model>(
    document: Document,
) -> std::result::Result<Box<dyn AnyModel>, bson::de::Error> {
    Ok(Box::new(bson::from_document::<M>(document)?))
}

/// Registers a model type so it can be found by collection name.
#[macro_export]
macro_rules! register_model {
    ($model:ty) => {
        $crate::__private::inventory::submit! {
            $crate::registry::ModelMetadataWrapper(
                $crate::registry::ModelMetadata::of::<$model>()
            )
        }
    };
}

pub fn model_metadata() -> impl Iterator<Item = &'static ModelMetadata> {
    inventory::iter::<ModelMetadataWrapper>
        .into_iter()
        .map(|wrapper| &wrapper.0)
}

enum Slot {
    One(&'static ModelMetadata),
    Duplicate,
}

static BY_COLLECTION: LazyLock<HashMap<&'static str, Slot>> = LazyLock::new(|| {
    let mut slots = HashMap::new();

    for metadata in model_metadata() {
        match slots.entry(metadata.collection_name()) {
            Entry::Vacant(entry) => {
                entry.insert(Slot::One(metadata));
            }
            Entry::Occupied(mut entry) => {
                tracing::error!(
                    collection = metadata.collection_name(),
                    "more than one model registered for collection"
                );
                entry.insert(Slot::Duplicate);
            }
        }
    }

    slots
});

/// Finds the model registered for `collection`.
pub fn lookup(collection: &str) -> Result<&'static ModelMetadata> {
    match BY_COLLECTION.get(collection) {
        Some(Slot::One(metadata)) => Ok(metadata),
        Some(Slot::Duplicate) => Err(Error::DuplicateModel(collection.to_owned())),
        None => Err(Error::UnregisteredModel(collection.to_owned())),
    }
}

/// Streams documents of `collection` as instances of whichever model type is
/// registered for it.
pub fn find_iter_dyn<'a>(
    db: &'a Database,
    collection: &str,
    filter: Document,
    options: impl Into<Option<FindOptions>> + 'a,
) -> BoxFuture<'a, Result<QueryIter<Box<dyn AnyModel>>>> {
    let options = options.into();
    let metadata = lookup(collection);

    async move {
        let metadata = metadata?;

        let cursor = db
            .collection::<Document>(metadata.collection_name())
            .find(filter)
            .with_options(options)
            .await?;

        Ok(QueryIter::from_stream(
            metadata.collection_name(),
            cursor.boxed(),
            metadata.decode_ptr,
        ))
    }
    .boxed()
}
