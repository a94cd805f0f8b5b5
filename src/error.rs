//! Error types for the ORM core.
//!
//! Every fallible operation returns [`OrmError`]. The variants follow the
//! taxonomy the engine cares about:
//!
//! - **Configuration** errors are raised while the schema is registered or
//!   parsed. The model stays unusable until the schema is fixed.
//! - **Usage** errors are programmer errors surfaced at query time.
//! - **NotFound** is kept apart from configuration problems so callers can
//!   branch on it.
//! - **Execution** wraps whatever the execution engine reported.
//!
//! Nothing in the core retries; errors propagate unmodified.

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T, E = OrmError> = std::result::Result<T, E>;

/// Schema-time problems detected by the registry or the metadata resolver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A relation points at a model that is not registered
    #[error("relation {model}.{field} targets unknown model {target}")]
    UnknownRelationModel {
        model: String,
        field: String,
        target: String,
    },
    /// More than one foreign key qualifies and none was specified
    #[error("ambiguous foreign key for {model}.{field}: candidates {candidates:?}")]
    AmbiguousForeignKey {
        model: String,
        field: String,
        candidates: Vec<String>,
    },
    /// No foreign key qualifies
    #[error("no foreign key found for {model}.{field} in model {target}")]
    MissingForeignKey {
        model: String,
        field: String,
        target: String,
    },
    /// A belongs-to towards a localized has-field needs an explicit link model
    #[error("relation {model}.{field} needs a link model: the inverse relation is localized")]
    MissingLinkModel { model: String, field: String },
    /// The link model could not be made unique
    #[error("could not find a unique link model name for {model}.{field} starting from {name}")]
    InvalidLinkModel {
        model: String,
        field: String,
        name: String,
    },
    /// A model definition is malformed
    #[error("invalid model {model}: {reason}")]
    InvalidModel { model: String, reason: String },
    /// The configuration source could not be read
    #[error("configuration could not be loaded: {0}")]
    Load(String),
}

/// Query-time programmer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    #[error("invalid operator {0}: expected AND or OR")]
    InvalidOperator(String),
    #[error("invalid limit {limit} / offset {offset}: both must be positive")]
    InvalidLimit { limit: i64, offset: i64 },
    #[error("invalid recursive depth {0}")]
    InvalidRecursiveDepth(i64),
    #[error("field expression {0} is not part of the field list")]
    FieldNotInList(String),
    #[error("field {field} of model {model} is not a relation field")]
    NotARelationField { model: String, field: String },
    #[error("metadata of model {0} accessed before it was parsed")]
    MetaNotParsed(String),
    #[error("field {field} is not defined in model {model}")]
    UnknownField { model: String, field: String },
    #[error("unsupported field path {0}")]
    UnsupportedPath(String),
    #[error("field expression {0} needs an alias")]
    MissingAlias(String),
    #[error("entry of model {entry_model} handed to model {model}")]
    ModelMismatch { model: String, entry_model: String },
}

/// The error type of the ORM core
#[derive(Debug, Error)]
pub enum OrmError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    /// A requested model or entry does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    /// A row could not be turned into an entry
    #[error("data error: {0}")]
    Data(String),
    /// The execution engine failed
    #[error("execution error: {0}")]
    Execution(String),
    /// A model source could not be read or written
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// An unlinked model still references the entry being deleted
    #[error("cannot delete {model} {id}: still referenced by {referenced_by}")]
    DeleteBlocked {
        model: String,
        id: String,
        referenced_by: String,
    },
}

impl OrmError {
    /// Not-found condition for a model name
    pub fn model_not_found(name: impl Into<String>) -> Self {
        OrmError::NotFound {
            kind: "model",
            name: name.into(),
        }
    }

    /// Whether this error is a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::NotFound { .. })
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(error: serde_json::Error) -> Self {
        OrmError::Data(error.to_string())
    }
}
