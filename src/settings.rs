// config lets you read a separate config file, and environment variables on top of it
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::construct::CatalogOptions;
use crate::datatype::Sentinels;
use crate::error::{CatalogError, Result};
use crate::persist::PersistenceMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub sentinels: Vec<String>,
    pub list_separator: String,
    /// The qualifier domain the domain by qualifier views are built with.
    pub qualifier_code: String,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        let options = CatalogOptions::default();
        Self {
            sentinels: options.sentinels.literals().to_vec(),
            list_separator: options.list_separator,
            qualifier_code: String::from("AGECAT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: String,
    pub listen: String,
    pub log: String,
    pub catalog: CatalogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: String::from("studycat.db"),
            listen: String::from("127.0.0.1:8080"),
            log: String::from("info"),
            catalog: CatalogSettings::default(),
        }
    }
}

impl Settings {
    /// Reads the optional settings file at `path` (any format the config crate
    /// knows by extension) and lets `STUDYCAT__*` environment variables override it.
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with(path, environment())
    }
    pub fn load_with(path: &str, environment: Environment) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(environment)
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn persistence_mode(&self) -> PersistenceMode {
        PersistenceMode::from_path(&self.database)
    }
    pub fn catalog_options(&self) -> Result<CatalogOptions> {
        if self.catalog.list_separator.is_empty() {
            return Err(CatalogError::Config("catalog.list_separator must not be empty".into()));
        }
        Ok(CatalogOptions {
            sentinels: Sentinels::new(self.catalog.sentinels.iter().cloned()),
            list_separator: self.catalog.list_separator.clone(),
        })
    }
}

// sentinels arrive as one comma separated variable, e.g. STUDYCAT__CATALOG__SENTINELS=NA,missing
pub fn environment() -> Environment {
    Environment::with_prefix("STUDYCAT")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("catalog.sentinels")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variables(pairs: &[(&str, &str)]) -> Environment {
        let map: config::Map<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        environment().source(Some(map))
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let settings = Settings::load_with("no-such-studycat-settings", variables(&[])).unwrap();
        assert_eq!(settings.listen, "127.0.0.1:8080");
        assert_eq!(settings.catalog.qualifier_code, "AGECAT");
        assert_eq!(settings.catalog_options().unwrap(), CatalogOptions::default());
    }

    #[test]
    fn environment_overrides_scalars_and_lists() {
        let settings = Settings::load_with(
            "no-such-studycat-settings",
            variables(&[
                ("STUDYCAT__CATALOG__SENTINELS", "NA,missing"),
                ("STUDYCAT__CATALOG__QUALIFIER_CODE", "AGEGRP"),
                ("STUDYCAT__LISTEN", "0.0.0.0:9000"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.catalog.sentinels, ["NA", "missing"]);
        assert_eq!(settings.catalog.qualifier_code, "AGEGRP");
        assert_eq!(settings.listen, "0.0.0.0:9000");
        let options = settings.catalog_options().unwrap();
        assert!(options.sentinels.is_missing("NA"));
        assert!(!options.sentinels.is_missing("None"));
    }

    #[test]
    fn empty_list_separator_is_rejected() {
        let mut settings = Settings::default();
        settings.catalog.list_separator = String::new();
        assert!(matches!(settings.catalog_options(), Err(CatalogError::Config(_))));
    }

    #[test]
    fn memory_database_selects_in_memory_mode() {
        let settings = Settings { database: ":memory:".into(), ..Settings::default() };
        assert_eq!(settings.persistence_mode(), PersistenceMode::InMemory);
    }
}
