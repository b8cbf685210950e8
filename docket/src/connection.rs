//! Connection handle and configuration.

use crate::{Mongo, Result};
use mongodb::{
    Client, Collection, Database,
    bson::{Document, doc},
    options::ClientOptions,
};
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_URI: &str = "mongodb://127.0.0.1:27017";

/// Connection settings. Every field has a default, so partial configs
/// deserialize.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub uri: String,
    pub database: String,
    /// Application name reported in server logs
    pub app_name: Option<String>,
    pub max_pool_size: Option<u32>,
    pub connect_timeout: Option<Duration>,
    pub server_selection_timeout: Option<Duration>,
    /// Overall deadline for [`enforce_indexes`](crate::indexes::enforce_indexes)
    pub index_deadline: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_URI.to_owned(),
            database: "docket".to_owned(),
            app_name: Some("docket".to_owned()),
            max_pool_size: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            index_deadline: Duration::from_secs(5 * 60),
        }
    }
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            ..Self::default()
        }
    }

    pub async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.uri).await?;

        if let Some(app_name) = &self.app_name {
            options.app_name = Some(app_name.clone());
        }
        if let Some(max) = self.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(timeout) = self.connect_timeout {
            options.connect_timeout = Some(timeout);
        }
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        Ok(options)
    }
}

/// A connected client and the database every model collection lives in.
///
/// Cheap to clone and safe to share; the driver pools connections.
#[derive(Debug, Clone)]
pub struct Connection {
    client: Client,
    database: Database,
}

impl Connection {
    /// Wraps an already configured client.
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    /// Builds a client from `config` and checks that the server answers.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let client = Client::with_options(config.client_options().await?)?;
        let connection = Self::new(client, &config.database);

        connection.ping().await?;

        tracing::info!(database = %config.database, "connected to MongoDB");

        Ok(connection)
    }

    pub async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }

    pub fn mongo(&self) -> Mongo<'_> {
        Mongo::new(&self.database)
    }
}

impl<'a> From<&'a Connection> for Mongo<'a> {
    fn from(value: &'a Connection) -> Self {
        value.mongo()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ConnectionConfig::default();
        assert_eq!(config.uri, DEFAULT_URI);
        assert_eq!(config.index_deadline, Duration::from_secs(300));
        assert_eq!(config.app_name.as_deref(), Some("docket"));
    }

    #[test]
    fn test_new_config_keeps_defaults() {
        let config = ConnectionConfig::new("mongodb://db.internal:27017", "cards");
        assert_eq!(config.database, "cards");
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_client_options_apply_overrides() {
        let config = ConnectionConfig {
            max_pool_size: Some(50),
            app_name: Some("wallet".into()),
            ..ConnectionConfig::default()
        };

        let options = config.client_options().await.unwrap();

        assert_eq!(options.max_pool_size, Some(50));
        assert_eq!(options.app_name.as_deref(), Some("wallet"));
        assert_eq!(options.server_selection_timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_connection_resolves_database() {
        let client = Client::with_uri_str(DEFAULT_URI).await.unwrap();
        let connection = Connection::new(client, "cards");

        assert_eq!(connection.database().name(), "cards");
        assert_eq!(connection.collection("card").name(), "card");
    }
}
