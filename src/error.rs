//! Error types for sqlx-sqlite-datasource-mgr

use std::sync::Arc;
use thiserror::Error;

/// Errors that may occur when working with sqlx-sqlite-datasource-mgr
///
/// The enum is `Clone` so a single failed initialization can be delivered to
/// every caller awaiting the same in-flight operation. Variants wrapping
/// non-cloneable sources (`sqlx::Error`, `std::io::Error`) hold them behind an
/// `Arc` for that reason.
#[derive(Error, Debug, Clone)]
pub enum Error {
   /// IO error when accessing database files. Standard library IO errors
   /// are converted to this variant.
   #[error("IO error: {0}")]
   Io(Arc<std::io::Error>),

   /// Error from the sqlx library. Standard sqlx errors are converted to this variant
   #[error("Sqlx error: {0}")]
   Sqlx(Arc<sqlx::Error>),

   /// A migration could not be applied or reverted for a reason other than a
   /// database failure (duplicate names, unknown recorded migration, ...)
   #[error("Migration error: {0}")]
   Migration(String),

   /// `configure()` was called with an unusable configuration
   #[error("Invalid configuration: {0}")]
   InvalidConfiguration(&'static str),

   /// A custom `data_source_factory` produced a handle that never reports
   /// itself initialized
   #[error("data_source_factory must return a usable data source")]
   InvalidFactoryResult,

   /// Initialization was attempted before `configure()` supplied a plan
   #[error("configure() must be called before initialization")]
   NotConfigured,

   /// Synchronous access was attempted while no initialized data source exists
   #[error("Data source has not been initialized")]
   NotInitialized,
}

impl From<std::io::Error> for Error {
   fn from(error: std::io::Error) -> Self {
      Error::Io(Arc::new(error))
   }
}

impl From<sqlx::Error> for Error {
   fn from(error: sqlx::Error) -> Self {
      Error::Sqlx(Arc::new(error))
   }
}
