//! Startup index provisioning.

use crate::{Error, IndexFailure, Result};
use futures_util::future::join_all;
use mongodb::{Database, IndexModel, bson::Document};
use std::time::Duration;
use tokio::time::{Instant, timeout_at};

/// Creates the indexes of every collection in `plan` concurrently.
///
/// All collections are attempted even when some fail; every failure,
/// including running past `deadline`, is reported in
/// [`Error::IndexProvisioning`].
pub async fn provision_indexes<I, C>(db: &Database, plan: I, deadline: Duration) -> Result<()>
where
    I: IntoIterator<Item = (C, Vec<IndexModel>)>,
    C: Into<String>,
{
    let until = Instant::now() + deadline;

    let jobs = plan
        .into_iter()
        .filter(|(_, indexes)| !indexes.is_empty())
        .map(|(collection, indexes)| {
            let collection = collection.into();

            async move {
                let created = timeout_at(until, async {
                    db.collection::<Document>(&collection)
                        .create_indexes(indexes)
                        .await
                })
                .await;

                let error = match created {
                    Ok(Ok(_)) => {
                        tracing::info!(collection, "indexes created");
                        return None;
                    }
                    Ok(Err(err)) => Error::from(err),
                    Err(_) => Error::DeadlineExceeded(deadline),
                };

                tracing::error!(collection, error = %error, "failed to create indexes");

                Some(IndexFailure { collection, error })
            }
        });

    let failures = join_all(jobs).await.into_iter().flatten().collect::<Vec<_>>();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::IndexProvisioning(failures))
    }
}

/// Provisions the indexes declared by every registered model.
#[cfg(feature = "registry")]
pub async fn enforce_indexes(db: &Database, deadline: Duration) -> Result<()> {
    let plan = crate::registry::model_metadata()
        .map(|metadata| (metadata.collection_name(), metadata.indexes()))
        .collect::<Vec<_>>();

    provision_indexes(db, plan, deadline).await
}
