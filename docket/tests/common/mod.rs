//! Shared setup for tests that need a live server.
//!
//! Set `MONGODB_URI` to run them, e.g. `mongodb://localhost:27017/?replicaSet=rs0`.
//! Every test gets a fresh database which it drops when done. Tests return
//! early when the variable is unset.

#![allow(dead_code)]

use docket::{
    Connection, ConnectionConfig,
    mongodb::bson::{doc, oid::ObjectId},
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

pub async fn connect() -> Option<Connection> {
    let Ok(uri) = std::env::var("MONGODB_URI") else {
        eprintln!("MONGODB_URI is not set, skipping");
        return None;
    };

    init_tracing();

    let database = format!("docket_test_{}", ObjectId::new());
    let connection = Connection::connect(&ConnectionConfig::new(uri, database))
        .await
        .expect("failed to connect to MONGODB_URI");

    Some(connection)
}

/// Whether the server is a replica set member or a mongos.
pub async fn supports_transactions(conn: &Connection) -> bool {
    let hello = conn
        .database()
        .run_command(doc! { "hello": 1 })
        .await
        .expect("hello failed");

    hello.contains_key("setName") || matches!(hello.get_str("msg"), Ok("isdbgrid"))
}

pub async fn teardown(conn: Connection) {
    conn.database().drop().await.expect("failed to drop test database");
}

macro_rules! connect_or_skip {
    () => {
        match common::connect().await {
            Some(conn) => conn,
            None => return,
        }
    };
}

pub(crate) use connect_or_skip;
