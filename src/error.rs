//! Crate-wide error taxonomy.
//!
//! Grouped into database, transaction, query, validation and storage
//! errors. Every public boundary in this crate returns `crate::Result<T>`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    // --- database errors -------------------------------------------------
    #[error("data corruption: {0}")]
    Corruption(String),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("does not exist: {0}")]
    NotFound(String),

    // --- transaction errors ------------------------------------------------
    #[error("database object is closed: {0}")]
    ClosedDbo(String),

    #[error("transaction is closed")]
    ClosedTx,

    #[error("transaction is in the ERROR state and can only be rolled back or closed")]
    TxInError,

    #[error("operation not permitted on a read-only transaction")]
    ReadOnly,

    #[error("could not acquire write lock: {0}")]
    WriteLockDenied(String),

    #[error("invalid tuple id: {0}")]
    InvalidTupleId(u64),

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    // --- query errors --------------------------------------------------
    #[error("unsupported predicate: {0}")]
    UnsupportedPredicate(String),

    #[error("column does not exist: {0}")]
    ColumnDoesNotExist(String),

    #[error("index lookup failed: {0}")]
    IndexLookupFailure(String),

    // --- validation errors -----------------------------------------------
    #[error("null value not allowed for column {0}")]
    NullNotAllowed(String),

    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("vector size mismatch: expected {expected}, found {found}")]
    VectorSizeMismatch { expected: usize, found: usize },

    #[error("index update failed: {0}")]
    IndexUpdateFailure(String),

    // --- storage errors ----------------------------------------------------
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page id {0} out of bounds")]
    PageIdOutOfBounds(u64),

    #[error("file lock timed out after waiting for {0:?}")]
    LockTimeout(std::time::Duration),

    #[error("buffer pool exhausted: no unpinned frame available")]
    BufferPoolExhausted,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DbError>;
