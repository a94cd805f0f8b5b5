//! Lifecycle hooks attached to a model.
//!
//! Behaviours (timestamps, slugs, versioning, audit logs, ...) plug into the
//! save/delete lifecycle. Every hook defaults to a no-op; returning an error
//! aborts the operation and rolls back the surrounding transaction.

use crate::entry::Entry;
use crate::error::Result;

/// Hooks called by the save and delete lifecycle
///
/// # Example
///
/// ```
/// use trellis::entry::Entry;
/// use trellis::error::Result;
/// use trellis::schema::Behaviour;
///
/// struct Stamp;
///
/// impl Behaviour for Stamp {
///     fn before_insert(&self, entry: &mut Entry) -> Result<()> {
///         entry.set("created", 1_700_000_000);
///         Ok(())
///     }
/// }
/// ```
pub trait Behaviour: Send + Sync {
    /// Called before the INSERT statement is executed.
    fn before_insert(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }

    /// Called after the INSERT statement; the entry carries its new id.
    fn after_insert(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Called before the UPDATE statement is executed.
    fn before_update(&self, _entry: &mut Entry) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    /// Called before anything is removed, dependants included.
    fn before_delete(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }

    fn after_delete(&self, _entry: &Entry) -> Result<()> {
        Ok(())
    }
}
