use mongodb::bson;
use std::{fmt, time::Duration};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for all docket operations.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// A single-result read matched no document.
    #[error("no document in `{collection}` matched the filter")]
    NotFound { collection: &'static str },

    /// A document could not populate the model it was read into.
    #[error("failed to decode a `{collection}` document: {source}")]
    Decode {
        collection: &'static str,
        #[source]
        source: bson::de::Error,
    },

    /// A document was skipped while streaming a query. Only ever recorded in
    /// [`QueryIter::err`](crate::QueryIter::err), never returned.
    #[error("skipped `{collection}` document #{position} while iterating: {source}")]
    IterationDecode {
        collection: &'static str,
        position: u64,
        #[source]
        source: bson::de::Error,
    },

    #[error("failed to encode model: {0}")]
    Encode(#[from] bson::ser::Error),

    #[error("`{collection}` model has no identifier")]
    MissingIdentifier { collection: &'static str },

    #[error("database error: {0}")]
    Persistence(#[from] mongodb::error::Error),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("query iterator for `{collection}` was already consumed")]
    IteratorConsumed { collection: &'static str },

    #[error("no model is registered for collection `{0}`")]
    UnregisteredModel(String),

    #[error("more than one model is registered for collection `{0}`")]
    DuplicateModel(String),

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("index provisioning failed for {}", IndexFailures(.0))]
    IndexProvisioning(Vec<IndexFailure>),
}

impl Error {
    /// Returns true if a single-result read matched nothing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the error came from the driver or the server.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Index creation failure for a single collection.
#[derive(Debug, Clone)]
pub struct IndexFailure {
    pub collection: String,
    pub error: Error,
}

impl fmt::Display for IndexFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` ({})", self.collection, self.error)
    }
}

struct IndexFailures<'a>(&'a [IndexFailure]);

impl fmt::Display for IndexFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound { collection: "user" };
        assert_eq!(err.to_string(), "no document in `user` matched the filter");
        assert!(err.is_not_found());
        assert!(!err.is_persistence());
    }

    #[test]
    fn test_error_display_missing_identifier() {
        let err = Error::MissingIdentifier { collection: "user" };
        assert_eq!(err.to_string(), "`user` model has no identifier");
    }

    #[test]
    fn test_error_display_index_provisioning() {
        let err = Error::IndexProvisioning(vec![
            IndexFailure {
                collection: "user".into(),
                error: Error::DeadlineExceeded(Duration::from_secs(1)),
            },
            IndexFailure {
                collection: "card".into(),
                error: Error::Cancelled,
            },
        ]);

        assert_eq!(
            err.to_string(),
            "index provisioning failed for `user` (deadline of 1s exceeded), \
             `card` (operation was cancelled)"
        );
    }

    #[test]
    fn test_decode_error_keeps_source() {
        let source = bson::from_document::<String>(bson::doc! { "a": 1 }).unwrap_err();
        let err = Error::Decode {
            collection: "user",
            source,
        };

        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("failed to decode a `user` document"));
    }
}
