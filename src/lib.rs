//! Cottontail DB: a column-oriented engine for mixed boolean/kNN queries
//! over scalar and vector columns.
//!
//! Layered bottom-up: [`storage`] holds pages on disk, [`column`] turns a
//! page file into a tuple-id-keyed log of [`value::Value`]s, [`entity`]
//! groups columns sharing one tuple-id space together with secondary
//! [`index`]es, and [`schema`]/[`catalog`] nest entities into named
//! directories. [`knn`] and [`execution`] implement the vector search path
//! on top of an entity transaction.

pub mod catalog;
pub mod column;
pub mod config;
pub mod entity;
pub mod error;
pub mod execution;
pub mod index;
pub mod knn;
pub mod schema;
pub mod storage;
pub mod value;

pub use catalog::Catalog;
pub use config::Config;
pub use error::{DbError, Result};

/// Installs a `tracing-subscriber` formatter over the spans/events this
/// crate emits at module boundaries (disk manager open/close, transaction
/// commit/rollback/error, index rebuild, parallel scan worker spawn/join).
/// A convenience for binaries embedding this crate; the crate itself never
/// installs a subscriber on its own, since owning process-wide logging setup
/// is a decision for whatever server or CLI wraps it.
pub fn init_tracing() {
    tracing_subscriber::fmt().with_target(false).with_thread_ids(true).with_level(true).init();
}
