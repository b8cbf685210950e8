/// ## Getting started
///
/// The [`Model`](crate::Model) trait maps a Rust type to a `MongoDB`
/// collection. A type that derives it must be a struct with named fields and
/// implement [`Serialize`](serde::Serialize) and
/// [`Deserialize`](serde::Deserialize).
///
/// ```ignore
/// use docket::{Model, mongodb::bson::{self, oid::ObjectId}};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Model)]
/// #[model(collection = "cards", indexes = "card_indexes")]
/// struct Card {
///   #[serde(rename = "_id")]
///   id: ObjectId,
///   number: String,
///   balance: i64,
///   updated_at: bson::DateTime,
/// }
///
/// fn card_indexes() -> Vec<IndexModel> {
///   vec![IndexModel::builder().keys(doc! { "number": 1 }).build()]
/// }
/// ```
///
/// The derive reads serde's field names, so `rename` and a container
/// `rename_all` are respected:
///
/// - the field stored as `_id` is the model's identifier, used by
///   [`update_one`](crate::Model::update_one). A `None` identifier counts as
///   missing;
/// - a field stored as `updated_at` is stamped with the current time on
///   every update, replacing any value set in the patch. Under
///   `rename_all = "camelCase"` the field is stored as `updatedAt` and is not
///   stamped;
/// - the collection name defaults to the snake_case struct name (`Card` →
///   `card`).
///
/// ### Connecting
///
/// ```ignore
/// let conn = Connection::connect(&ConnectionConfig::new("mongodb://localhost", "bank")).await?;
///
/// docket::indexes::enforce_indexes(conn.database(), Duration::from_secs(60)).await?;
///
/// let card = Card::find_by_id(conn.mongo(), id).await?;
/// ```
///
/// [`ConnectionConfig`](crate::ConnectionConfig) deserializes with serde, so
/// it can be embedded in an application's own configuration.
///
/// ### `Mongo`
///
/// [`Mongo`](crate::Mongo) is a reference to a
/// [`Database`](mongodb::Database), optionally paired with a
/// [`ClientSession`](mongodb::ClientSession). Every operation that can run
/// inside a transaction accepts one. Use [`Mongo::rb`](crate::Mongo::rb) to
/// pass the same handle to several operations.
pub mod getting_started {}

/// ## Updates
///
/// [`Updates`](crate::Updates) is an ordered set of field assignments, keyed
/// by stored field name.
///
/// ```ignore
/// card.update_one(conn.mongo(), Updates::new().set("balance", 120_i64), None).await?;
///
/// assert_eq!(card.balance, 120);
/// ```
///
/// After a successful write the same assignments are applied to the model in
/// memory, so there is no need to read it back. `updated_at` is stamped
/// before the write and shows up in the model too.
///
/// Only top-level fields are mirrored. Dotted paths such as `"limits.daily"`
/// are written to the database but do not match a top-level field, so the
/// in-memory value keeps its old contents.
///
/// [`update_many`](crate::Model::update_many) applies the same assignments
/// to every document matching a filter. No models are touched.
pub mod updates {}

/// ## Iteration
///
/// [`find_iter`](crate::Model::find_iter) wraps a cursor in a
/// [`QueryIter`](crate::QueryIter) which decodes documents on a background
/// task and hands them over a channel.
///
/// ```ignore
/// let mut iter = Card::find_iter(conn.database(), doc! { "balance": { "$gt": 0 } }, None).await?;
/// let mut cards = iter.iter(&cancel)?;
///
/// while let Some(card) = cards.recv().await {
///   // ...
/// }
///
/// if let Some(err) = iter.err() {
///   tracing::warn!(error = %err, "some cards were skipped");
/// }
/// ```
///
/// - Documents that do not decode are skipped and the last such failure is
///   kept in [`err`](crate::QueryIter::err).
/// - A cursor failure ends the stream and is kept the same way.
/// - The channel holds one item, so the cursor advances only as fast as the
///   consumer reads.
/// - Cancelling the token, dropping the receiver, or calling
///   [`close`](crate::QueryIter::close) stops the worker and releases the
///   cursor.
///
/// Iteration does not take part in transactions. Inside one, use
/// [`find_all`](crate::Model::find_all).
pub mod iteration {}

/// ## Transactions
///
/// [`run_in_transaction`](crate::run_in_transaction) opens a session, starts
/// a transaction and passes a [`Transaction`](crate::Transaction) to a
/// closure:
///
/// ```ignore
/// run_in_transaction(&conn, &cancel, |trx| {
///   async move {
///     from.update_one(trx.mongo(), Updates::new().set("balance", 0_i64), None).await?;
///     to.update_one(trx.mongo(), Updates::new().set("balance", total), None).await?;
///
///     trx.commit().await
///   }
///   .boxed()
/// })
/// .await?;
/// ```
///
/// Nothing is durable until [`Transaction::commit`](crate::Transaction::commit)
/// succeeds. If the closure fails, is cancelled, or returns without
/// committing, the transaction is aborted. A closure error is returned to the
/// caller unchanged.
///
/// Transactions need a replica set or a sharded cluster.
pub mod transactions {}

/// ## Dynamic models
///
/// Every derived model is registered under its collection name. Code that
/// only knows the name at runtime can stream instances of the right type:
///
/// ```ignore
/// let mut iter = docket::find_iter_dyn(conn.database(), "cards", doc! {}, None).await?;
/// let mut models = iter.iter(&cancel)?;
///
/// while let Some(model) = models.recv().await {
///   if let Some(card) = model.downcast_ref::<Card>() {
///     // ...
///   }
/// }
/// ```
///
/// Two models sharing a collection name make lookups of that name fail with
/// [`Error::DuplicateModel`](crate::Error::DuplicateModel).
///
/// The registry is behind the default `registry` feature.
pub mod dynamic_models {}
