pub mod prepare_env;

pub use prepare_env::{prepare_test_db, random_db_path};
