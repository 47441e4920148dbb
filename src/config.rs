use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, SyncError};
use crate::models::Destination;

/// Upper bound the Gmail list endpoint accepts for a single page
pub const MAX_RESULTS_LIMIT: u32 = 500;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub mailbox: MailboxConfig,
    #[serde(default)]
    pub sheet: SheetConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailboxConfig {
    /// Gmail search query selecting candidate messages
    #[serde(default = "default_query")]
    pub query: String,
    /// Optional subject filter, added to the query as `subject:"..."`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_filter: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Retry marking already-recorded messages as read when they show up unread again
    #[serde(default = "default_remark_read_duplicates")]
    pub remark_read_duplicates: bool,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            query: default_query(),
            subject_filter: None,
            max_results: default_max_results(),
            remark_read_duplicates: default_remark_read_duplicates(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SheetConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_sheet_name")]
    pub sheet_name: String,
}

impl Default for SheetConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            sheet_name: default_sheet_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateConfig {
    #[serde(default = "default_max_tracked_ids")]
    pub max_tracked_ids: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            max_tracked_ids: default_max_tracked_ids(),
        }
    }
}

fn default_query() -> String {
    "is:unread in:inbox".to_string()
}

fn default_max_results() -> u32 {
    50
}

fn default_remark_read_duplicates() -> bool {
    true
}

fn default_sheet_name() -> String {
    "Sheet1".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_secs() -> u64 {
    2
}

fn default_max_delay_secs() -> u64 {
    60
}

fn default_max_tracked_ids() -> usize {
    crate::state::DEFAULT_MAX_TRACKED_IDS
}

impl Config {
    /// Load the config file, apply environment overrides and validate
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path).await?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Read the TOML file alone; a missing file yields defaults
    pub async fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SyncError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| SyncError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                SyncError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| SyncError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| SyncError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Override file values with `SPREADSHEET_ID`, `SHEET_NAME`, `SUBJECT_FILTER` and `MAX_RESULTS`
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(id) = env_value("SPREADSHEET_ID") {
            self.sheet.spreadsheet_id = id;
        }
        if let Some(name) = env_value("SHEET_NAME") {
            self.sheet.sheet_name = name;
        }
        if let Some(filter) = env_value("SUBJECT_FILTER") {
            self.mailbox.subject_filter = Some(filter);
        }
        if let Some(raw) = env_value("MAX_RESULTS") {
            self.mailbox.max_results = raw.trim().parse().map_err(|_| {
                SyncError::ConfigError(format!("MAX_RESULTS must be a number, got '{}'", raw))
            })?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.mailbox.query.trim().is_empty() {
            return Err(SyncError::ConfigError(
                "mailbox.query cannot be empty".to_string(),
            ));
        }

        if self.mailbox.max_results == 0 {
            return Err(SyncError::ConfigError(
                "mailbox.max_results must be at least 1".to_string(),
            ));
        }
        if self.mailbox.max_results > MAX_RESULTS_LIMIT {
            return Err(SyncError::ConfigError(format!(
                "mailbox.max_results cannot exceed {}",
                MAX_RESULTS_LIMIT
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(SyncError::ConfigError(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.initial_delay_secs == 0 || self.retry.max_delay_secs == 0 {
            return Err(SyncError::ConfigError(
                "retry delays must be greater than 0".to_string(),
            ));
        }
        if self.retry.initial_delay_secs > self.retry.max_delay_secs {
            return Err(SyncError::ConfigError(
                "retry.initial_delay_secs cannot exceed retry.max_delay_secs".to_string(),
            ));
        }

        if self.state.max_tracked_ids == 0 {
            return Err(SyncError::ConfigError(
                "state.max_tracked_ids must be at least 1".to_string(),
            ));
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Search query sent to the mailbox, including the subject filter if any
    pub fn build_query(&self) -> String {
        // Gmail search has no escape for a quote inside a quoted phrase
        let subject = self
            .mailbox
            .subject_filter
            .as_deref()
            .map(|s| s.replace('"', " "))
            .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty());

        match subject {
            Some(subject) => format!("{} subject:\"{}\"", self.mailbox.query.trim(), subject),
            None => self.mailbox.query.trim().to_string(),
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::new(&self.sheet.spreadsheet_id, &self.sheet.sheet_name)
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let config = Self::default();
        config.save(path).await
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::{NamedTempFile, TempDir};

    const ENV_KEYS: [&str; 4] = ["SPREADSHEET_ID", "SHEET_NAME", "SUBJECT_FILTER", "MAX_RESULTS"];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.mailbox.query, "is:unread in:inbox");
        assert!(config.mailbox.subject_filter.is_none());
        assert_eq!(config.mailbox.max_results, 50);
        assert!(config.mailbox.remark_read_duplicates);

        assert_eq!(config.sheet.spreadsheet_id, "");
        assert_eq!(config.sheet.sheet_name, "Sheet1");

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay_secs, 2);
        assert_eq!(config.retry.max_delay_secs, 60);

        assert_eq!(config.state.max_tracked_ids, 1000);
    }

    #[test]
    fn test_config_validation_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_validation_max_results_bounds() {
        let mut config = Config::default();
        config.mailbox.max_results = 0;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("at least 1"));

        config.mailbox.max_results = 501;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot exceed 500"));

        config.mailbox.max_results = 1;
        assert!(config.validate().is_ok());
        config.mailbox.max_results = 500;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_retry() {
        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.initial_delay_secs = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retry.initial_delay_secs = 120;
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("cannot exceed retry.max_delay_secs"));
    }

    #[test]
    fn test_config_validation_empty_query_and_capacity() {
        let mut config = Config::default();
        config.mailbox.query = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.state.max_tracked_ids = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_build_query() {
        let mut config = Config::default();
        assert_eq!(config.build_query(), "is:unread in:inbox");

        config.mailbox.subject_filter = Some("Invoice".to_string());
        assert_eq!(config.build_query(), "is:unread in:inbox subject:\"Invoice\"");

        config.mailbox.subject_filter = Some("   ".to_string());
        assert_eq!(config.build_query(), "is:unread in:inbox");
    }

    #[test]
    fn test_build_query_strips_embedded_quotes() {
        let mut config = Config::default();
        config.mailbox.subject_filter = Some("Re: \"Q3\" report".to_string());
        assert_eq!(
            config.build_query(),
            "is:unread in:inbox subject:\"Re: Q3 report\""
        );

        config.mailbox.subject_filter = Some("\"\"".to_string());
        assert_eq!(config.build_query(), "is:unread in:inbox");
    }

    #[test]
    fn test_destination() {
        let mut config = Config::default();
        config.sheet.spreadsheet_id = "abc".to_string();
        let dest = config.destination();
        assert_eq!(dest.spreadsheet_id, "abc");
        assert_eq!(dest.sheet_name, "Sheet1");
    }

    #[tokio::test]
    async fn test_partial_toml_uses_defaults() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(
            temp_file.path(),
            r#"
[sheet]
spreadsheet_id = "sheet-123"

[mailbox]
subject_filter = "Report"
"#,
        )
        .unwrap();

        let config = Config::load_file(temp_file.path()).await.unwrap();
        assert_eq!(config.sheet.spreadsheet_id, "sheet-123");
        assert_eq!(config.sheet.sheet_name, "Sheet1");
        assert_eq!(config.mailbox.subject_filter.as_deref(), Some("Report"));
        assert_eq!(config.mailbox.max_results, 50);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_config_error() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[mailbox\nquery = ").unwrap();

        let result = Config::load_file(temp_file.path()).await;
        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_file_uses_defaults() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(&temp_dir.path().join("missing.toml")).await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf").join("config.toml");

        let mut config = Config::default();
        config.sheet.spreadsheet_id = "xyz".to_string();
        config.mailbox.subject_filter = Some("Weekly".to_string());
        config.save(&path).await.unwrap();

        let loaded = Config::load_file(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_create_example() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("example.toml");
        Config::create_example(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[mailbox]"));
        assert!(content.contains("[sheet]"));
        assert!(content.contains("is:unread in:inbox"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("SPREADSHEET_ID", "env-sheet");
        std::env::set_var("SHEET_NAME", "Mail Log");
        std::env::set_var("SUBJECT_FILTER", "Invoice");
        std::env::set_var("MAX_RESULTS", "25");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.sheet.spreadsheet_id, "env-sheet");
        assert_eq!(config.sheet.sheet_name, "Mail Log");
        assert_eq!(config.mailbox.subject_filter.as_deref(), Some("Invoice"));
        assert_eq!(config.mailbox.max_results, 25);
    }

    #[test]
    #[serial]
    fn test_env_max_results_not_a_number() {
        clear_env();
        std::env::set_var("MAX_RESULTS", "lots");

        let mut config = Config::default();
        let result = config.apply_env_overrides();
        clear_env();

        assert!(matches!(result, Err(SyncError::ConfigError(_))));
    }

    #[test]
    #[serial]
    fn test_blank_env_values_ignored() {
        clear_env();
        std::env::set_var("SHEET_NAME", "   ");

        let mut config = Config::default();
        config.apply_env_overrides().unwrap();
        clear_env();

        assert_eq!(config.sheet.sheet_name, "Sheet1");
    }
}
