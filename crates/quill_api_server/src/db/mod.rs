mod repo;
mod schema;

pub use repo::{SqliteLedgerStore, SqliteSessionResolver};
pub use schema::init_database;
