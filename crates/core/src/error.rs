use tessera_schema::{CompileError, SubstituteError};
use tessera_types::codec::CodecError;
use tessera_types::RowValues;
use thiserror::Error;

/// A recorder hook rejected a record-bearing statement at compose time.
#[derive(Error, Debug)]
#[error("record of type `{record_type}` failed validation: {message}")]
pub struct ObjectValidationError {
    pub record_type: String,
    pub message: String,
}

/// Errors raised while lowering a logical statement into physical CQL.
///
/// Lowering never partially executes: a statement that fails to lower has
/// touched nothing.
#[derive(Error, Debug)]
pub enum LowerError {
    #[error("value `{value}` is excluded for keyspace key `{key}`")]
    ExcludedKeyspaceKey { key: String, value: String },
    #[error("keyspace key `{key}` has no value in this statement or its record")]
    MissingKeyspaceKey { key: String },
    #[error("column `{column}` does not exist in table `{table}`")]
    UnknownColumn { column: String, table: String },
    #[error("record type declares no table named `{table}`")]
    UnknownTable { table: String },
    #[error("counter operation on non-counter column `{column}`")]
    CounterOperationOnNonCounter { column: String },
    #[error("counter and non-counter statements cannot share a batch")]
    CounterMixedWithNonCounter,
    #[error("IN over column `{column}` with an empty value list")]
    EmptyInList { column: String },
    #[error("primary-key column `{column}` of table `{table}` is null")]
    NullPrimaryKey { column: String, table: String },
    #[error("table `{table}` cannot be altered to its declared shape: {reason}")]
    AlterIncompatible { table: String, reason: String },
    #[error("CodecError: {0}")]
    Codec(#[from] CodecError),
    #[error("{0}")]
    Substitute(SubstituteError),
}

impl From<SubstituteError> for LowerError {
    fn from(err: SubstituteError) -> Self {
        match err {
            SubstituteError::Missing { key } => LowerError::MissingKeyspaceKey { key },
            SubstituteError::Excluded { key, value } => LowerError::ExcludedKeyspaceKey { key, value },
        }
    }
}

/// Transport-originated failures, already classified at the boundary.
///
/// The transport maps its protocol conditions onto these variants; in
/// particular "keyspace does not exist" arrives as [`UnknownKeyspace`]
/// rather than being fished out of an error message upstream.
///
/// [`UnknownKeyspace`]: ExecutionError::UnknownKeyspace
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("no host could be reached: {0}")]
    NoHostAvailable(String),
    #[error("query execution failed: {message}")]
    QueryExecution { message: String },
    #[error("query was rejected: {message}")]
    QueryValidation { message: String },
    #[error("keyspace `{keyspace}` does not exist")]
    UnknownKeyspace { keyspace: String },
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The top-level error of the execution core.
///
/// In composites the first error wins; later leaf errors are logged and
/// discarded.
#[derive(Error, Debug)]
pub enum Error {
    #[error("CompileError: {0}")]
    Compile(#[from] CompileError),
    #[error("LowerError: {0}")]
    Lower(#[from] LowerError),
    #[error("ObjectValidationError: {0}")]
    Validation(#[from] ObjectValidationError),
    #[error("row of table `{table}` did not decode into a record: {message}")]
    ObjectConversion { table: String, message: String },
    #[error("no row matched where exactly one was required")]
    ObjectMissing,
    #[error("keyspace `{keyspace}` does not exist")]
    ObjectNotFound { keyspace: String },
    #[error("conditional insert found an existing row")]
    ObjectExists,
    #[error("conditional update was not applied")]
    UpdateNotApplied { row: Option<RowValues> },
    #[error("{found} rows matched where at most one was expected")]
    TooManyMatchesFound { found: usize },
    #[error("ExecutionError: {0}")]
    Execution(#[from] ExecutionError),
    #[error("execution was cancelled")]
    Cancelled,
    #[error("deadline elapsed before execution finished")]
    Timeout,
    #[error("the session manager is already initialized")]
    AlreadyInitialized,
    #[error("the session manager is not initialized")]
    NotInitialized,
    #[error("the session has been shut down")]
    Shutdown,
    #[error("keyspace `{keyspace}` is declared with conflicting replication or durable-writes")]
    KeyspaceAgreement { keyspace: String },
    #[error("this result future has already been consumed")]
    ResultConsumed,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Reclassifies an execution failure observed on a read path:
    /// an unknown keyspace on SELECT means the mapped object set simply is
    /// not there.
    pub(crate) fn from_execution_on_read(err: ExecutionError) -> Self {
        match err {
            ExecutionError::UnknownKeyspace { keyspace } => Error::ObjectNotFound { keyspace },
            other => Error::Execution(other),
        }
    }
}
