//! Persistence (§4.7): table definitions and per-entity upsert/query
//! helpers built on `ratings_common::db`.

pub mod albums;
pub mod artists;
pub mod schema;
pub mod scan_history;
pub mod signal_cache;
pub mod tracks;

pub use schema::init_schema;
