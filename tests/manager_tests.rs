//! End-to-end tests of the lifecycle manager over real SQLite files

use sqlx::ConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx_sqlite_datasource_mgr::{
   ConfigureOptions, DataSource, DataSourceConfig, DataSourceManager, DataSourceOptions,
   Migration, MigrationOptions, SqliteDataSource, TransactionMode, create_managed_data_source,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn migrations() -> Vec<Migration> {
   vec![
      Migration::new(
         "0001_users",
         "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
         "DROP TABLE users",
      ),
      Migration::new(
         "0002_posts",
         "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL)",
         "DROP TABLE posts",
      ),
   ]
}

async fn tables_in_file(path: &Path) -> Vec<String> {
   let mut conn = SqliteConnectOptions::new().filename(path).connect().await.unwrap();
   let rows: Vec<(String,)> =
      sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
         .fetch_all(&mut conn)
         .await
         .unwrap();
   rows.into_iter().map(|(name,)| name).collect()
}

#[tokio::test]
async fn test_default_factory_initializes_and_migrates_on_init() {
   let temp_dir = TempDir::new().unwrap();
   let db_path = temp_dir.path().join("managed.db");

   let manager = DataSourceManager::new();
   let options = DataSourceOptions {
      migrations: migrations(),
      ..DataSourceOptions::new(&db_path)
   };
   manager
      .configure(
         DataSourceConfig {
            run_migrations_on_init: true,
            ..DataSourceConfig::new(options)
         },
         ConfigureOptions::default(),
      )
      .unwrap();

   assert!(manager.is_configured());
   assert!(!manager.is_initialized());

   let handle = manager.get_data_source().await.unwrap();
   assert!(handle.is_initialized());
   assert!(manager.is_initialized());

   // Migrations already ran during initialization; nothing is pending.
   let applied = manager.run_migrations(MigrationOptions::default()).await.unwrap();
   assert!(applied.is_empty());

   manager.destroy().await.unwrap();
   assert_eq!(tables_in_file(&db_path).await, vec!["_migrations", "posts", "users"]);
}

#[tokio::test]
async fn test_run_migrations_and_revert_through_the_manager() {
   let temp_dir = TempDir::new().unwrap();
   let db_path = temp_dir.path().join("migrate.db");

   let manager = DataSourceManager::new();
   let options = DataSourceOptions {
      migrations: migrations(),
      ..DataSourceOptions::new(&db_path)
   };
   manager
      .configure(
         DataSourceConfig {
            migrations_transaction: Some(TransactionMode::Each),
            ..DataSourceConfig::new(options)
         },
         ConfigureOptions::default(),
      )
      .unwrap();

   // run_migrations initializes the data source on demand.
   let applied = manager.run_migrations(MigrationOptions::default()).await.unwrap();
   let names: Vec<_> = applied.iter().map(|record| record.name.as_str()).collect();
   assert_eq!(names, vec!["0001_users", "0002_posts"]);

   manager.revert_last_migration(MigrationOptions::default()).await.unwrap();

   manager.destroy().await.unwrap();
   let tables = tables_in_file(&db_path).await;
   assert!(tables.contains(&"users".to_string()));
   assert!(!tables.contains(&"posts".to_string()));
}

#[tokio::test]
async fn test_reconfiguration_moves_to_a_new_database() {
   let temp_dir = TempDir::new().unwrap();
   let first_path = temp_dir.path().join("first.db");
   let second_path = temp_dir.path().join("second.db");

   let manager = DataSourceManager::new();

   // Retain the concrete handle so the background disposal is observable.
   let first = Arc::new(SqliteDataSource::new(DataSourceOptions::new(&first_path)));
   let handed_out = Arc::clone(&first);
   let config = DataSourceConfig::new(DataSourceOptions::new(&first_path)).with_factory(
      move |_options| {
         let first = Arc::clone(&handed_out);
         async move {
            let data_source: Arc<dyn DataSource> = first;
            Ok(data_source)
         }
      },
   );
   manager.configure(config, ConfigureOptions::default()).unwrap();
   let old = manager.get_data_source().await.unwrap();
   assert!(old.is_initialized());

   manager
      .configure(
         DataSourceConfig {
            allow_reconfigure: true,
            ..DataSourceConfig::new(DataSourceOptions::new(&second_path))
         },
         ConfigureOptions::default(),
      )
      .unwrap();

   let new = manager.get_data_source().await.unwrap();
   assert!(new.is_initialized());
   assert!(second_path.exists());

   // The superseded handle is destroyed in the background.
   for _ in 0..100 {
      if !first.is_initialized() {
         break;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
   }
   assert!(!first.is_initialized(), "Superseded data source should be disposed");
}

#[tokio::test]
async fn test_create_managed_data_source_end_to_end() {
   let temp_dir = TempDir::new().unwrap();
   let db_path = temp_dir.path().join("oneshot.db");

   let options = DataSourceOptions {
      migrations: migrations(),
      ..DataSourceOptions::new(&db_path)
   };
   let handle = create_managed_data_source(DataSourceConfig {
      run_migrations_on_init: true,
      migrations_transaction: Some(TransactionMode::Each),
      ..DataSourceConfig::new(options)
   })
   .await
   .unwrap();

   assert!(handle.is_initialized());

   handle.destroy().await.unwrap();
   assert_eq!(tables_in_file(&db_path).await, vec!["_migrations", "posts", "users"]);
}

#[tokio::test]
async fn test_concurrent_first_access_over_a_real_database() {
   let temp_dir = TempDir::new().unwrap();
   let db_path = temp_dir.path().join("contended.db");

   let manager = DataSourceManager::new();
   let options = DataSourceOptions {
      migrations: migrations(),
      ..DataSourceOptions::new(&db_path)
   };
   manager
      .configure(
         DataSourceConfig {
            run_migrations_on_init: true,
            ..DataSourceConfig::new(options)
         },
         ConfigureOptions::default(),
      )
      .unwrap();

   let tasks: Vec<_> = (0..6)
      .map(|_| {
         let manager = manager.clone();
         tokio::spawn(async move { manager.get_data_source().await })
      })
      .collect();

   let mut handles = Vec::new();
   for task in tasks {
      handles.push(task.await.unwrap().unwrap());
   }

   for handle in &handles[1..] {
      assert!(Arc::ptr_eq(&handles[0], handle));
   }

   // One initialization ran migrations exactly once; none are pending now.
   let applied = manager.run_migrations(MigrationOptions::default()).await.unwrap();
   assert!(applied.is_empty());

   manager.destroy().await.unwrap();
}
