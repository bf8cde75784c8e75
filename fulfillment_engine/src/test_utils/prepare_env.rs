use log::*;

use crate::SqliteDatabase;

/// A unique throwaway database path under the system temp directory.
pub fn random_db_path() -> String {
    format!("sqlite://{}/sofra_test_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

/// Creates and migrates a fresh test database at `url`.
pub async fn prepare_test_db(url: &str) -> SqliteDatabase {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.migrate().await.expect("Error running DB migrations");
    info!("🚀️ Test database ready at {url}");
    db
}
