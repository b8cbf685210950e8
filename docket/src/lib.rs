//! Docket is a `MongoDB` object-document mapper for Rust.
//!
//! ## Example
//!
//! ```ignore
//! // Define a model
//! #[derive(Serialize, Deserialize, Model)]
//! #[model(collection = "users")]
//! struct User {
//!   #[serde(rename = "_id")]
//!   id: ObjectId,
//!   email: String,
//!   username: String,
//!   updated_at: bson::DateTime,
//! }
//!
//! // Insert a model
//! user.insert_one(conn.mongo()).await?;
//!
//! // Select a model by id
//! let user = User::find_by_id(conn.mongo(), user_id).await?;
//!
//! // Select a model by custom fields
//! let kit = User::find_one(conn.mongo(), doc! { "username": "kit" }).await?;
//!
//! // Update some fields; `user` reflects the change without a re-read and
//! // `updated_at` is stamped automatically
//! user.update_one(conn.mongo(), Updates::new().set("email", "new@example.com"), None).await?;
//!
//! // Stream a large result set
//! let mut iter = User::find_iter(conn.database(), doc! {}, None).await?;
//! let mut users = iter.iter(&cancel)?;
//! while let Some(user) = users.recv().await {
//!   // ...
//! }
//!
//! // Run several operations atomically
//! run_in_transaction(&conn, &cancel, |trx| async move {
//!   User::delete_many(trx.mongo(), doc! { "username": "kit" }).await?;
//!   trx.commit().await
//! }.boxed()).await?;
//! ```
//!
//! See [`guides`] module to learn more!

#![warn(clippy::pedantic)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

use futures_util::{FutureExt, TryStreamExt, future::BoxFuture};
use mongodb::{
    ClientSession, Collection, Cursor, Database, IndexModel,
    bson::{Bson, Document, doc},
    options::{FindOptions, UpdateOptions},
    results::{DeleteResult, UpdateResult},
};
use serde::{Serialize, de::DeserializeOwned};

pub use docket_macros::Model;
pub use mongodb;

pub mod connection;
pub mod error;
pub mod guides;
pub mod indexes;
pub mod query;
#[cfg(feature = "registry")]
pub mod registry;
pub mod transaction;
pub mod updates;

pub use connection::{Connection, ConnectionConfig};
pub use error::{Error, IndexFailure, Result};
pub use query::QueryIter;
#[cfg(feature = "registry")]
pub use registry::{AnyModel, find_iter_dyn};
pub use transaction::{Transaction, run_in_transaction};
pub use updates::Updates;

#[doc(hidden)]
pub mod __private {
    #[cfg(feature = "registry")]
    pub use inventory;
}

#[cfg(not(feature = "registry"))]
#[doc(hidden)]
#[macro_export]
macro_rules! register_model {
    ($model:ty) => {};
}

/// A Rust type persisted as documents of one collection.
///
/// Usually derived; see [`guides`].
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION_NAME: &'static str;

    /// Whether updates stamp the [`updated_at`](updates::UPDATED_AT_FIELD)
    /// field.
    const TRACKS_UPDATED_AT: bool = false;

    /// The value stored in `_id`, if the model has one.
    ///
    /// The derived implementation returns `None` when the field is unset
    /// (serializes to `null`) and also when it fails to serialize, so both
    /// cases surface as [`Error::MissingIdentifier`] from
    /// [`update_one`](Self::update_one).
    fn identifier(&self) -> Option<Bson> {
        None
    }

    /// Indexes created by [`indexes::enforce_indexes`].
    fn indexes() -> Vec<IndexModel> {
        Vec::new()
    }

    fn collection(db: &Database) -> Collection<Document> {
        db.collection(Self::COLLECTION_NAME)
    }

    fn typed_collection(db: &Database) -> Collection<Self> {
        db.collection(Self::COLLECTION_NAME)
    }

    fn count<'a>(mongo: Mongo<'a>, filter: Document) -> BoxFuture<'a, Result<u64>> {
        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "counting documents");

            let count = with_session!(collection.count_documents(filter), session).await?;

            Ok(count)
        }
        .boxed()
    }

    fn exists<'a>(mongo: Mongo<'a>, filter: Document) -> BoxFuture<'a, Result<bool>> {
        async move {
            let count = Self::count(mongo, filter).await?;

            Ok(count > 0)
        }
        .boxed()
    }

    /// Inserts the model as a new document.
    ///
    /// An `_id` generated by the server is not written back into the model.
    fn insert_one<'a>(&'a self, mongo: Mongo<'a>) -> BoxFuture<'a, Result<()>> {
        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);
            let document = updates::model_to_document(self)?;

            with_session!(collection.insert_one(document), session).await?;

            tracing::debug!(collection = Self::COLLECTION_NAME, "inserted document");

            Ok(())
        }
        .boxed()
    }

    fn find_by_id<'a>(mongo: Mongo<'a>, id: impl Into<Bson> + 'a) -> BoxFuture<'a, Result<Self>> {
        Self::find_one(mongo, by_id(id))
    }

    /// Reads the first document matching `filter`, failing with
    /// [`Error::NotFound`] when there is none.
    fn find_one<'a>(mongo: Mongo<'a>, filter: Document) -> BoxFuture<'a, Result<Self>> {
        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "finding document");

            let document = with_session!(collection.find_one(filter), session)
                .await?
                .ok_or(Error::NotFound {
                    collection: Self::COLLECTION_NAME,
                })?;

            updates::document_to_model(document)
        }
        .boxed()
    }

    /// Opens a cursor over the documents matching `filter`. The caller owns
    /// the cursor.
    fn find<'a>(
        db: &'a Database,
        filter: Document,
        options: impl Into<Option<FindOptions>> + 'a,
    ) -> BoxFuture<'a, Result<Cursor<Self>>> {
        let options = options.into();

        async move {
            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "opening cursor");

            let cursor = Self::typed_collection(db)
                .find(filter)
                .with_options(options)
                .await?;

            Ok(cursor)
        }
        .boxed()
    }

    /// Like [`find`](Self::find), wrapped in a [`QueryIter`].
    fn find_iter<'a>(
        db: &'a Database,
        filter: Document,
        options: impl Into<Option<FindOptions>> + 'a,
    ) -> BoxFuture<'a, Result<QueryIter<Self>>> {
        let options = options.into();

        async move {
            let cursor = Self::find(db, filter, options).await?;

            Ok(QueryIter::new(cursor))
        }
        .boxed()
    }

    /// Reads every matching document up front. Unlike [`find_iter`](Self::find_iter)
    /// this works inside transactions, and any undecodable document fails the
    /// whole call.
    fn find_all<'a>(
        mongo: Mongo<'a>,
        filter: Document,
        options: impl Into<Option<FindOptions>> + 'a,
    ) -> BoxFuture<'a, Result<Vec<Self>>> {
        let options = options.into();

        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "finding documents");

            let query = collection.find(filter).with_options(options);

            let documents: Vec<Document> = match session {
                Some(session) => {
                    query
                        .session(&mut *session)
                        .await?
                        .stream(&mut *session)
                        .try_collect()
                        .await
                }
                None => query.await?.try_collect().await,
            }?;

            documents
                .into_iter()
                .map(updates::document_to_model)
                .collect()
        }
        .boxed()
    }

    fn delete_one<'a>(mongo: Mongo<'a>, filter: Document) -> BoxFuture<'a, Result<DeleteResult>> {
        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "deleting document");

            let result = with_session!(collection.delete_one(filter), session).await?;

            Ok(result)
        }
        .boxed()
    }

    fn delete_many<'a>(
        mongo: Mongo<'a>,
        filter: Document,
    ) -> BoxFuture<'a, Result<DeleteResult>> {
        async move {
            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            let result = with_session!(collection.delete_many(filter), session).await?;

            tracing::debug!(
                collection = Self::COLLECTION_NAME,
                deleted = result.deleted_count,
                "deleted documents"
            );

            Ok(result)
        }
        .boxed()
    }

    /// Sets the fields in `updates` on this model's document and applies the
    /// same change to `self`.
    ///
    /// If the write succeeds but `self` cannot absorb the change, the error is
    /// returned and the write stays in place.
    fn update_one<'a>(
        &'a mut self,
        mongo: Mongo<'a>,
        mut updates: Updates,
        options: impl Into<Option<UpdateOptions>> + 'a,
    ) -> BoxFuture<'a, Result<()>> {
        let options = options.into();

        async move {
            let id = Model::identifier(self).ok_or(Error::MissingIdentifier {
                collection: Self::COLLECTION_NAME,
            })?;

            updates.touch_for::<Self>();

            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, id = %id, "updating document");

            let result = with_session!(
                collection
                    .update_one(by_id(id), updates.to_set_document())
                    .with_options(options),
                session
            )
            .await?;

            if result.matched_count == 0 {
                tracing::warn!(
                    collection = Self::COLLECTION_NAME,
                    "update matched no document"
                );
            }

            if let Err(err) = updates::merge_into(self, &updates) {
                tracing::error!(
                    collection = Self::COLLECTION_NAME,
                    error = %err,
                    "update was written but could not be applied in memory"
                );
                return Err(err);
            }

            Ok(())
        }
        .boxed()
    }

    /// Sets the fields in `updates` on every document matching `filter`.
    fn update_many<'a>(
        mongo: Mongo<'a>,
        filter: Document,
        mut updates: Updates,
        options: impl Into<Option<UpdateOptions>> + 'a,
    ) -> BoxFuture<'a, Result<UpdateResult>> {
        let options = options.into();

        async move {
            updates.touch_for::<Self>();

            let Mongo { db, session } = mongo;
            let collection = Self::collection(db);

            tracing::debug!(collection = Self::COLLECTION_NAME, %filter, "updating documents");

            let result = with_session!(
                collection
                    .update_many(filter, updates.to_set_document())
                    .with_options(options),
                session
            )
            .await?;

            Ok(result)
        }
        .boxed()
    }
}

#[derive(Debug)]
pub struct Mongo<'a> {
    pub db: &'a Database,
    pub session: Option<&'a mut ClientSession>,
}

impl<'a> Mongo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db, session: None }
    }

    pub fn new_with_session(db: &'a Database, session: &'a mut ClientSession) -> Self {
        Self {
            db,
            session: Some(session),
        }
    }

    pub fn rb(&mut self) -> Mongo<'_> {
        Mongo {
            db: self.db,
            session: self.session.as_deref_mut(),
        }
    }
}

impl<'a> From<&'a Database> for Mongo<'a> {
    fn from(value: &'a Database) -> Self {
        Self::new(value)
    }
}

impl<'a> From<(&'a Database, &'a mut ClientSession)> for Mongo<'a> {
    fn from(value: (&'a Database, &'a mut ClientSession)) -> Self {
        Self::new_with_session(value.0, value.1)
    }
}

/// Attaches a session, when there is one, to a driver action.
#[macro_export]
macro_rules! with_session {
    ($query: expr, $session: expr) => {
        match $session {
            Some(session) => $query.session(session),
            None => $query,
        }
    };
}

/// Filter matching the document whose `_id` is `id`.
pub fn by_id(id: impl Into<Bson>) -> Document {
    doc! { "_id": id.into() }
}
