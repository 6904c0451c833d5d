//! Configuration management
//!
//! Settings live in `settings.json` inside the data directory:
//! ```json
//! {
//!   "database": { "url": "/path/to/spendbook.duckdb", "autoMigrate": true },
//!   "importProfiles": { "swedbank": { "delimiter": ";", ... } }
//! }
//! ```
//! Keys this crate does not manage are preserved on save.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Direction, DirectionFilter};

/// Database file name used when no URL is configured
pub const DEFAULT_DATABASE_FILE: &str = "spendbook.duckdb";

/// Environment variable that overrides `database.url`
pub const DATABASE_URL_ENV: &str = "SPENDBOOK_DB_URL";

/// Environment variable that overrides `database.autoMigrate`
pub const AUTO_MIGRATE_ENV: &str = "SPENDBOOK_AUTO_MIGRATE";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    database: DatabaseSettings,
    #[serde(default)]
    import_profiles: HashMap<String, ImportProfile>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(default = "default_true")]
    auto_migrate: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            auto_migrate: true,
            other: HashMap::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Name of the saved profile used when none is given
pub const DEFAULT_PROFILE: &str = "default";

/// Spendbook configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    /// Connection string handed to the store as-is
    pub database_url: String,
    /// Apply pending migrations when a context is created
    pub auto_migrate: bool,
    pub import_profiles: HashMap<String, ImportProfile>,
    /// Whether `database_url` came from settings.json rather than a default or env override
    url_from_settings: bool,
}

impl Config {
    /// Load config from the data directory
    ///
    /// `SPENDBOOK_DB_URL` and `SPENDBOOK_AUTO_MIGRATE` override the file.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;

        let env_url = std::env::var(DATABASE_URL_ENV)
            .ok()
            .filter(|url| !url.trim().is_empty());

        let auto_migrate = match std::env::var(AUTO_MIGRATE_ENV).ok().as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => false,
            _ => raw.database.auto_migrate,
        };

        let url_from_settings = env_url.is_none() && raw.database.url.is_some();
        let database_url = env_url
            .or_else(|| raw.database.url.clone())
            .unwrap_or_else(|| {
                data_dir
                    .join(DEFAULT_DATABASE_FILE)
                    .to_string_lossy()
                    .into_owned()
            });

        Ok(Self {
            database_url,
            auto_migrate,
            import_profiles: raw.import_profiles,
            url_from_settings,
        })
    }

    /// Save config to the data directory
    /// Preserves other settings that spendbook doesn't manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");
        let mut settings = read_settings(data_dir)?;

        if self.url_from_settings {
            settings.database.url = Some(self.database_url.clone());
        }
        settings.database.auto_migrate = self.auto_migrate;
        settings.import_profiles = self.import_profiles.clone();

        std::fs::create_dir_all(data_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }

    /// Resolve a named profile, or the built-in default when `name` is `None`
    ///
    /// A saved profile called `default` replaces the built-in one.
    pub fn profile(&self, name: Option<&str>) -> Result<ImportProfile> {
        match name {
            Some(name) => self
                .import_profiles
                .get(name)
                .cloned()
                .ok_or_else(|| anyhow!("Import profile '{}' not found", name)),
            None => Ok(self
                .import_profiles
                .get(DEFAULT_PROFILE)
                .cloned()
                .unwrap_or_default()),
        }
    }

    /// Whether a saved profile replaces the built-in default
    pub fn has_saved_default_profile(&self) -> bool {
        self.import_profiles.contains_key(DEFAULT_PROFILE)
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }

    let content = std::fs::read_to_string(&settings_path)?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(
                path = %settings_path.display(),
                error = %e,
                "ignoring unreadable settings file"
            );
            Ok(SettingsFile::default())
        }
    }
}

/// How amounts are written in the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NumberFormat {
    /// `1,234.56`
    Us,
    /// `1.234,56`
    #[default]
    Eu,
    /// `1 234,56`
    EuSpace,
}

impl FromStr for NumberFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "us" => Ok(NumberFormat::Us),
            "eu" => Ok(NumberFormat::Eu),
            "eu-space" | "eu_space" => Ok(NumberFormat::EuSpace),
            other => Err(format!(
                "unknown number format '{}' (expected us, eu or eu-space)",
                other
            )),
        }
    }
}

/// Values of the direction column that mark a debit or a credit
///
/// Matching is case-insensitive and ignores surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionMarkers {
    pub debit: Vec<String>,
    pub credit: Vec<String>,
}

impl Default for DirectionMarkers {
    fn default() -> Self {
        Self {
            debit: vec!["Deebet".to_string(), "D".to_string()],
            credit: vec!["Kreedit".to_string(), "K".to_string()],
        }
    }
}

impl DirectionMarkers {
    /// Returns `None` for a marker that is neither debit nor credit
    pub fn classify(&self, marker: &str) -> Option<Direction> {
        let marker = marker.trim();
        if marker.is_empty() {
            return None;
        }
        let is_listed =
            |candidates: &[String]| candidates.iter().any(|c| c.trim().eq_ignore_ascii_case(marker));
        if is_listed(self.debit.as_slice()) {
            Some(Direction::Debit)
        } else if is_listed(self.credit.as_slice()) {
            Some(Direction::Credit)
        } else {
            None
        }
    }
}

/// Where sender and receiver come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum PartyColumns {
    /// The file names both parties directly
    Explicit { sender: String, receiver: String },
    /// The file has the holder's account and the other party.
    /// Debits flow account → counterparty, credits the other way.
    Counterparty { account: String, counterparty: String },
}

impl Default for PartyColumns {
    fn default() -> Self {
        PartyColumns::Counterparty {
            account: "Kliendi konto".to_string(),
            counterparty: "Saaja/Maksja".to_string(),
        }
    }
}

/// Column mappings for CSV import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMappings {
    pub date: String,
    pub description: String,
    pub amount: String,
    pub direction: String,
    /// Optional: rows fall back to EUR when the column is absent
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub parties: PartyColumns,
}

impl Default for ColumnMappings {
    fn default() -> Self {
        Self {
            date: "Kuupäev".to_string(),
            description: "Selgitus".to_string(),
            amount: "Summa".to_string(),
            direction: "Deebet/Kreedit".to_string(),
            currency: Some("Valuuta".to_string()),
            parties: PartyColumns::default(),
        }
    }
}

impl ColumnMappings {
    /// Columns that must be present in the header row
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.date.as_str(),
            self.description.as_str(),
            self.amount.as_str(),
            self.direction.as_str(),
        ];
        match &self.parties {
            PartyColumns::Explicit { sender, receiver } => {
                columns.push(sender);
                columns.push(receiver);
            }
            PartyColumns::Counterparty { account, counterparty } => {
                columns.push(account);
                columns.push(counterparty);
            }
        }
        columns
    }
}

/// Import profile for CSV imports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportProfile {
    #[serde(default)]
    pub column_mappings: ColumnMappings,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub number_format: NumberFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default)]
    pub direction: DirectionFilter,
    #[serde(default)]
    pub direction_markers: DirectionMarkers,
}

fn default_date_format() -> String {
    "%d.%m.%Y".to_string()
}

fn default_delimiter() -> char {
    ';'
}

impl Default for ImportProfile {
    fn default() -> Self {
        Self {
            column_mappings: ColumnMappings::default(),
            date_format: default_date_format(),
            number_format: NumberFormat::default(),
            delimiter: default_delimiter(),
            direction: DirectionFilter::default(),
            direction_markers: DirectionMarkers::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_settings_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();

        assert!(config.auto_migrate);
        assert!(config.import_profiles.is_empty());
        if std::env::var(DATABASE_URL_ENV).is_err() {
            assert!(config.database_url.ends_with(DEFAULT_DATABASE_FILE));
        }
    }

    #[test]
    fn test_load_reads_profiles_and_database() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{
                "database": { "autoMigrate": false },
                "importProfiles": {
                    "lhv": {
                        "delimiter": ",",
                        "numberFormat": "us",
                        "dateFormat": "%Y-%m-%d",
                        "direction": "all",
                        "columnMappings": {
                            "date": "Date",
                            "description": "Details",
                            "amount": "Amount",
                            "direction": "D/C",
                            "parties": { "mode": "explicit", "sender": "From", "receiver": "To" }
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        if std::env::var(AUTO_MIGRATE_ENV).is_err() {
            assert!(!config.auto_migrate);
        }

        let profile = config.profile(Some("lhv")).unwrap();
        assert_eq!(profile.delimiter, ',');
        assert_eq!(profile.number_format, NumberFormat::Us);
        assert_eq!(profile.direction, DirectionFilter::All);
        assert_eq!(profile.column_mappings.currency, None);
        assert_eq!(
            profile.column_mappings.parties,
            PartyColumns::Explicit {
                sender: "From".to_string(),
                receiver: "To".to_string()
            }
        );
        // Unspecified fields fall back to defaults
        assert_eq!(profile.direction_markers, DirectionMarkers::default());
    }

    #[test]
    fn test_unknown_profile_is_an_error() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.profile(Some("missing")).is_err());
        assert_eq!(config.profile(None).unwrap(), ImportProfile::default());
    }

    #[test]
    fn test_saved_default_profile_replaces_builtin() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::load(dir.path()).unwrap();
        assert!(!config.has_saved_default_profile());

        let mut saved = ImportProfile::default();
        saved.column_mappings.date = "Booking date".to_string();
        config.import_profiles.insert(DEFAULT_PROFILE.to_string(), saved.clone());
        config.save(dir.path()).unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert!(config.has_saved_default_profile());
        assert_eq!(config.profile(None).unwrap(), saved);
    }

    #[test]
    fn test_save_preserves_unmanaged_keys() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{ "theme": "dark", "database": { "poolSize": 4 } }"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        config
            .import_profiles
            .insert("swedbank".to_string(), ImportProfile::default());
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["theme"], "dark");
        assert_eq!(saved["database"]["poolSize"], 4);
        assert!(saved["importProfiles"]["swedbank"].is_object());
    }

    #[test]
    fn test_direction_markers_classify() {
        let markers = DirectionMarkers::default();
        assert_eq!(markers.classify("Deebet"), Some(Direction::Debit));
        assert_eq!(markers.classify(" deebet "), Some(Direction::Debit));
        assert_eq!(markers.classify("K"), Some(Direction::Credit));
        assert_eq!(markers.classify("Kreedit"), Some(Direction::Credit));
        assert_eq!(markers.classify(""), None);
        assert_eq!(markers.classify("Saldo"), None);
    }

    #[test]
    fn test_number_format_from_str() {
        assert_eq!("EU".parse::<NumberFormat>(), Ok(NumberFormat::Eu));
        assert_eq!("eu-space".parse::<NumberFormat>(), Ok(NumberFormat::EuSpace));
        assert!("roman".parse::<NumberFormat>().is_err());
    }

    #[test]
    fn test_required_columns_for_default_mappings() {
        let mappings = ColumnMappings::default();
        let columns = mappings.required_columns();
        assert!(columns.contains(&"Kuupäev"));
        assert!(columns.contains(&"Saaja/Maksja"));
        assert!(!columns.contains(&"Valuuta"));
    }
}
