//! Model definition sources.

use crate::error::{ConfigError, Result};
use crate::schema::model::Model;
use crate::schema::register::ModelRegister;
use std::fs;
use std::path::{Path, PathBuf};

/// Reads and writes model definitions
pub trait ModelIo {
    fn read_models(&self) -> Result<Vec<Model>>;
    fn write_models(&self, models: &[Model]) -> Result<()>;

    /// Register every model of this source
    fn register_into(&self, register: &mut ModelRegister) -> Result<()> {
        for model in self.read_models()? {
            register.register(model)?;
        }
        Ok(())
    }
}

/// Model definitions stored as a JSON array in one file
#[derive(Debug, Clone)]
pub struct JsonModelIo {
    path: PathBuf,
}

impl JsonModelIo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ModelIo for JsonModelIo {
    fn read_models(&self) -> Result<Vec<Model>> {
        let text = fs::read_to_string(&self.path)?;
        serde_json::from_str(&text).map_err(|err| {
            ConfigError::Load(format!("{}: {err}", self.path.display())).into()
        })
    }

    fn write_models(&self, models: &[Model]) -> Result<()> {
        let text = serde_json::to_string_pretty(models)?;
        fs::write(&self.path, text)?;
        log::debug!("wrote {} models to {}", models.len(), self.path.display());
        Ok(())
    }
}
