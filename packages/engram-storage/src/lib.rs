//! Postgres persistence for memory records and index snapshots.

pub mod models;
pub mod schema;

mod error;
mod postgres;
mod store;

pub use error::Error;
pub use postgres::PgStore;
pub use store::RecordStore;

pub type Result<T, E = Error> = std::result::Result<T, E>;
