use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::NoTls;
use tracing::{debug, error, info};

use crate::sql::{Catalog, StatementKind};

/// Executes one SQL statement against the warehouse
#[async_trait]
pub trait Execute: Send + Sync {
  async fn execute(&self, sql: &str) -> Result<()>;
}

/// Redshift only speaks the simple query protocol reliably, so statements are sent as a batch
#[async_trait]
impl Execute for tokio_postgres::Client {
  async fn execute(&self, sql: &str) -> Result<()> {
    self.batch_execute(sql).await?;
    Ok(())
  }
}

/// Connection details for the cluster database
#[derive(Clone, Debug)]
pub struct Connection {
  pub host: String,
  pub port: u16,
  pub dbname: String,
  pub user: String,
  pub password: String,
}

/// Connect to the database, driving the connection on a background task
pub async fn connect(conn: &Connection) -> Result<tokio_postgres::Client> {
  let mut config = tokio_postgres::Config::new();
  config
    .host(&conn.host)
    .port(conn.port)
    .dbname(&conn.dbname)
    .user(&conn.user)
    .password(&conn.password);

  let (client, connection) = config
    .connect(NoTls)
    .await
    .with_context(|| format!("Unable to connect to {}:{}/{}", conn.host, conn.port, conn.dbname))?;

  tokio::spawn(async move {
    if let Err(err) = connection.await {
      error!("Database connection error: {err}");
    }
  });
  debug!("Connected to {}:{}/{}", conn.host, conn.port, conn.dbname);

  Ok(client)
}

/// Run every statement of the given kinds, kind by kind in catalog order
///
/// Stops at the first failing statement and returns the number of statements executed
pub async fn run(executor: &dyn Execute, catalog: &Catalog, kinds: &[StatementKind]) -> Result<usize> {
  let mut executed = 0;

  for kind in kinds {
    for statement in catalog.statements(*kind) {
      info!("Running {} on {}", statement.kind, statement.target_table);
      executor
        .execute(&statement.sql)
        .await
        .with_context(|| format!("Failed to {} {}", statement.kind, statement.target_table))?;
      executed += 1;
    }
  }

  Ok(executed)
}
