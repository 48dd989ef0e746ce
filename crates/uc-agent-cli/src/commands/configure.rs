use anyhow::{bail, Context, Result};
use console::style;
use serde_yaml::{Mapping, Value};
use std::path::Path;

pub const DEFAULT_CATALOG: &str = "fins_genai";
pub const DEFAULT_SCHEMA: &str = "agents";

const DATABRICKS_CONFIGS: &str = "databricks_configs";

/// Catalog and schema recorded in a config file
#[derive(Debug, Default, PartialEq)]
pub struct Location {
    pub catalog: Option<String>,
    pub schema: Option<String>,
}

impl Location {
    fn read(section: &Mapping) -> Self {
        let get = |key: &str| section.get(key).and_then(Value::as_str).map(String::from);
        Self {
            catalog: get("catalog"),
            schema: get("schema"),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "catalog: {}, schema: {}",
            self.catalog.as_deref().unwrap_or("None"),
            self.schema.as_deref().unwrap_or("None")
        )
    }
}

/// Set `databricks_configs.catalog` and `.schema` in the YAML file at `path`,
/// keeping every other key. The file is created when missing.
///
/// Returns the previous and the updated location.
pub fn update_config(path: &Path, catalog: &str, schema: &str) -> Result<(Location, Location)> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        match serde_yaml::from_str(&content)? {
            Value::Null => Value::Mapping(Mapping::new()),
            value => value,
        }
    } else {
        Value::Mapping(Mapping::new())
    };

    let Some(root) = config.as_mapping_mut() else {
        bail!("{} is not a YAML mapping", path.display());
    };
    let section = root
        .entry(Value::from(DATABRICKS_CONFIGS))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if section.is_null() {
        *section = Value::Mapping(Mapping::new());
    }
    let Some(section) = section.as_mapping_mut() else {
        bail!("{} in {} is not a mapping", DATABRICKS_CONFIGS, path.display());
    };

    let previous = Location::read(section);
    section.insert(Value::from("catalog"), Value::from(catalog));
    section.insert(Value::from("schema"), Value::from(schema));
    let updated = Location::read(section);

    std::fs::write(path, serde_yaml::to_string(&config)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((previous, updated))
}

pub fn execute(path: &Path, catalog: &str, schema: &str) -> Result<()> {
    cliclack::intro(style(" configure-uc-agent ").on_cyan().black())?;

    tracing::debug!(path = %path.display(), catalog, schema, "updating configuration");
    let (previous, updated) = update_config(path, catalog, schema)?;
    cliclack::log::info(format!("current {}", previous))?;
    cliclack::log::success(format!("updated {}", updated))?;

    cliclack::outro(format!("Configuration saved to: {}", path.display()))?;
    Ok(())
}
