mod portfolio;
mod sqlite;
mod trades;

pub use sqlite::Database;

#[cfg(test)]
pub use sqlite::init_test_db;
