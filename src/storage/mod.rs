pub mod backend;

pub use backend::{SeaOrmStorage, connect_generic, connect_sqlite, run_migrations};
