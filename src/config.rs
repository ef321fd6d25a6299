//! Runtime settings, read from an optional YAML file and `FEEDS__*`
//! environment variables (the latter win).

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use validator::Validate;

use crate::domain::diff::ReconcileRules;
use crate::import::CatalogBuilder;
use crate::import::builder::DEFAULT_CURRENCY;

/// Prefix of environment overrides, e.g. `FEEDS__BATCH_SIZE=200`.
pub const ENV_PREFIX: &str = "FEEDS";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid settings: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Settings shared by the import, merge and reconcile workflows.
#[derive(Debug, Clone, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Offers processed between two progress reports.
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Currency for offers when neither they nor the shop declare one.
    #[validate(length(min = 1))]
    pub default_currency: String,
    /// Attributes folded together on merge; empty means size and color.
    pub merge_attributes: Vec<String>,
    pub rules: ReconcileRules,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            default_currency: DEFAULT_CURRENCY.to_string(),
            merge_attributes: Vec::new(),
            rules: ReconcileRules::default(),
        }
    }
}

impl Settings {
    /// Loads and validates settings. A missing `path` means environment and
    /// defaults only; a given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }
        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        log::debug!("Loaded settings: {settings:?}");
        Ok(settings)
    }

    /// Catalog builder preconfigured with these settings.
    pub fn catalog_builder(&self, display_name: impl Into<String>) -> CatalogBuilder {
        CatalogBuilder::new(display_name).default_currency(self.default_currency.clone())
    }
}
