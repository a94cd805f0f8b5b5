//! ORM configuration.
//!
//! [`OrmConfig`] can be built in code or loaded from `config/trellis.toml`
//! and `TRELLIS__*` environment variables using [`OrmConfig::load`].

use crate::error::ConfigError as OrmConfigError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "config/trellis.toml";
const ENV_PREFIX: &str = "TRELLIS";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OrmConfig {
    /// Locale used when a query does not set one
    #[serde(default = "default_locale")]
    pub default_locale: String,
    /// Locales in fallback preference order
    #[serde(default = "default_locales")]
    pub locales: Vec<String>,
    /// Depth applied when a query asks for unbounded recursion
    #[serde(default = "default_max_recursive_depth")]
    pub max_recursive_depth: u32,
    /// Lifetime of cached statements and results, 0 keeps them forever
    #[serde(default)]
    pub cache_ttl_seconds: u64,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_locales() -> Vec<String> {
    vec![default_locale()]
}

fn default_max_recursive_depth() -> u32 {
    5
}

impl Default for OrmConfig {
    fn default() -> Self {
        Self {
            default_locale: default_locale(),
            locales: default_locales(),
            max_recursive_depth: default_max_recursive_depth(),
            cache_ttl_seconds: 0,
        }
    }
}

impl OrmConfig {
    /// Configuration with the given locale preference list; the first locale
    /// becomes the default one.
    pub fn with_locales<I, S>(locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let locales: Vec<String> = locales.into_iter().map(Into::into).collect();
        let default_locale = locales.first().cloned().unwrap_or_else(default_locale);
        Self {
            default_locale,
            locales,
            ..Self::default()
        }
    }

    /// Load the configuration from `config/trellis.toml`, falling back to env vars.
    pub fn load() -> Result<Self, OrmConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file should not hide a valid environment
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!("failed to load {CONFIG_FILE}, falling back to env: {err}");
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        OrmConfigError::Load(format!(
                            "file and env failed: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        Self::from_settings(&settings).map_err(|e| OrmConfigError::Load(e.to_string()))
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<OrmConfig>("orm") {
            Ok(config) => Ok(config.normalized()),
            // A missing section means defaults, anything else is a real error
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    /// Make sure the default locale takes part in the fallback list.
    fn normalized(mut self) -> Self {
        if !self.locales.contains(&self.default_locale) {
            self.locales.insert(0, self.default_locale.clone());
        }
        self
    }
}
