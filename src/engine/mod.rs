//! Execution engine abstraction.
//!
//! The ORM core never talks to a database directly: it hands abstract
//! [`Statement`]s to an [`ExecutionEngine`] and reads back [`ResultSet`]s.
//! SQL-backed engines render statements with
//! [`statement::sql::build_statement`](crate::statement::sql::build_statement).
//!
//! [`MemoryEngine`] evaluates statements over in-memory tables and is what the
//! test suite runs against.

#[cfg(any(test, feature = "mock"))]
pub mod memory;

#[cfg(any(test, feature = "mock"))]
pub use memory::MemoryEngine;

use crate::error::Result;
use crate::statement::Statement;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One result row: column aliases and their values, in select order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// First column, for single value results like counts
    pub fn first(&self) -> Option<&Value> {
        self.columns.first().map(|(_, value)| value)
    }
}

/// Rows returned by a SELECT, affected count for writes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub rows: Vec<Row>,
    pub affected: u64,
}

/// Runs statements against storage
///
/// Implementations are externally synchronized by the caller; methods take
/// `&self` so an engine can be shared behind an `Arc`.
pub trait ExecutionEngine: Send + Sync {
    /// Run one statement
    fn execute(&self, statement: &Statement) -> Result<ResultSet>;

    fn begin(&self) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Primary key generated by the last INSERT
    fn last_insert_id(&self) -> Option<Value>;
}

/// Run a statement, logging it with its duration
pub(crate) fn execute_logged(engine: &dyn ExecutionEngine, statement: &Statement) -> Result<ResultSet> {
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!(
        "trellis.execute",
        kind = statement.kind(),
        table = statement.table()
    )
    .entered();

    let start = Instant::now();
    let result = engine.execute(statement);
    let duration = start.elapsed();
    match &result {
        Ok(result_set) => log::debug!(
            "{} on {} took {:?}: {} rows, {} affected",
            statement.kind(),
            statement.table(),
            duration,
            result_set.rows.len(),
            result_set.affected
        ),
        Err(err) => log::warn!("{statement} failed after {duration:?}: {err}"),
    }
    result
}
