//! Ordered SQL migrations with transaction-mode control
//!
//! The runner keeps its bookkeeping in a `_migrations` table created on demand.
//! A migration is identified by name; pending migrations are applied in the
//! order they were declared in [`DataSourceOptions::migrations`](crate::DataSourceOptions).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::Connection;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info};

use crate::Result;
use crate::config::TransactionMode;
use crate::error::Error;

/// A single schema migration: forward and reverse SQL scripts.
///
/// Scripts may contain multiple statements separated by semicolons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
   /// Unique name identifying the migration in the bookkeeping table
   pub name: String,
   /// SQL applied when running the migration
   pub up: String,
   /// SQL applied when reverting the migration
   pub down: String,
}

impl Migration {
   pub fn new(
      name: impl Into<String>,
      up: impl Into<String>,
      down: impl Into<String>,
   ) -> Self {
      Self {
         name: name.into(),
         up: up.into(),
         down: down.into(),
      }
   }
}

/// Record of an applied migration, read back from the `_migrations` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMigration {
   /// Name of the migration as declared
   pub name: String,
   /// Unix timestamp (seconds) at which the migration was applied
   pub applied_at: i64,
}

const CREATE_MIGRATIONS_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS _migrations (\
   id INTEGER PRIMARY KEY AUTOINCREMENT,\
   name TEXT NOT NULL UNIQUE,\
   applied_at INTEGER NOT NULL\
)";

async fn ensure_migrations_table(conn: &mut SqliteConnection) -> Result<()> {
   sqlx::query(CREATE_MIGRATIONS_TABLE).execute(&mut *conn).await?;
   Ok(())
}

async fn applied_names(conn: &mut SqliteConnection) -> Result<HashSet<String>> {
   let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM _migrations")
      .fetch_all(&mut *conn)
      .await?;
   Ok(rows.into_iter().map(|(name,)| name).collect())
}

/// Run one migration's up script and record it. The caller decides whether
/// `conn` is a plain connection or a transaction.
async fn apply_one(conn: &mut SqliteConnection, migration: &Migration) -> Result<AppliedMigration> {
   sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&migration.up)).await?;

   let (applied_at,): (i64,) = sqlx::query_as(
      "INSERT INTO _migrations (name, applied_at) VALUES (?1, unixepoch()) RETURNING applied_at",
   )
   .bind(&migration.name)
   .fetch_one(&mut *conn)
   .await?;

   info!(name = %migration.name, "applied migration");

   Ok(AppliedMigration {
      name: migration.name.clone(),
      applied_at,
   })
}

async fn revert_one(conn: &mut SqliteConnection, migration: &Migration) -> Result<()> {
   sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&migration.down)).await?;

   sqlx::query("DELETE FROM _migrations WHERE name = ?1")
      .bind(&migration.name)
      .execute(&mut *conn)
      .await?;

   info!(name = %migration.name, "reverted migration");
   Ok(())
}

fn check_unique_names(migrations: &[Migration]) -> Result<()> {
   let mut seen = HashSet::new();
   for migration in migrations {
      if !seen.insert(migration.name.as_str()) {
         return Err(Error::Migration(format!(
            "duplicate migration name '{}'",
            migration.name
         )));
      }
   }
   Ok(())
}

/// Apply every pending migration in declaration order.
///
/// `TransactionMode::All` wraps the whole batch in one transaction, so a
/// failure rolls back every migration of the run. `Each` commits migration by
/// migration, keeping the ones that succeeded before a failure. `None` runs
/// without explicit transactions.
pub(crate) async fn run_pending(
   conn: &mut SqliteConnection,
   migrations: &[Migration],
   mode: TransactionMode,
) -> Result<Vec<AppliedMigration>> {
   check_unique_names(migrations)?;
   ensure_migrations_table(conn).await?;

   let applied = applied_names(conn).await?;
   let pending: Vec<&Migration> = migrations
      .iter()
      .filter(|migration| !applied.contains(&migration.name))
      .collect();

   if pending.is_empty() {
      debug!("no pending migrations");
      return Ok(Vec::new());
   }

   debug!(count = pending.len(), ?mode, "running pending migrations");

   let mut records = Vec::with_capacity(pending.len());

   match mode {
      TransactionMode::All => {
         let mut tx = conn.begin().await?;
         for migration in pending {
            records.push(apply_one(&mut *tx, migration).await?);
         }
         tx.commit().await?;
      }
      TransactionMode::Each => {
         for migration in pending {
            let mut tx = conn.begin().await?;
            records.push(apply_one(&mut *tx, migration).await?);
            tx.commit().await?;
         }
      }
      TransactionMode::None => {
         for migration in pending {
            records.push(apply_one(conn, migration).await?);
         }
      }
   }

   Ok(records)
}

/// Revert the most recently applied migration, if any.
///
/// Reverting with nothing applied is a no-op. A recorded migration whose down
/// script is no longer declared cannot be reverted.
pub(crate) async fn revert_last(
   conn: &mut SqliteConnection,
   migrations: &[Migration],
   mode: TransactionMode,
) -> Result<()> {
   ensure_migrations_table(conn).await?;

   let last: Option<(String,)> =
      sqlx::query_as("SELECT name FROM _migrations ORDER BY id DESC LIMIT 1")
         .fetch_optional(&mut *conn)
         .await?;

   let Some((name,)) = last else {
      debug!("no applied migrations to revert");
      return Ok(());
   };

   let migration = migrations
      .iter()
      .find(|migration| migration.name == name)
      .ok_or_else(|| {
         Error::Migration(format!("no migration named '{name}' is declared; cannot revert"))
      })?;

   match mode {
      TransactionMode::None => revert_one(conn, migration).await,
      TransactionMode::All | TransactionMode::Each => {
         let mut tx = conn.begin().await?;
         revert_one(&mut *tx, migration).await?;
         tx.commit().await?;
         Ok(())
      }
   }
}
