use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub api_base_url: String,
    #[serde(default)]
    pub spreadsheet_id: String,
    #[serde(default = "default_store")]
    pub store: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: i64,
    #[serde(default = "default_true")]
    pub advance_on_empty: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store() -> String {
    "csv".to_string()
}

fn default_page_limit() -> u32 {
    500
}

fn default_backfill_days() -> i64 {
    3650
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            api_base_url: String::new(),
            spreadsheet_id: String::new(),
            store: default_store(),
            page_limit: default_page_limit(),
            backfill_days: default_backfill_days(),
            advance_on_empty: default_true(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("finsync")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("finsync")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| SyncError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            api_base_url: "https://api.example.com".to_string(),
            spreadsheet_id: "sheet123".to_string(),
            store: "sheets".to_string(),
            page_limit: 250,
            backfill_days: 30,
            advance_on_empty: false,
            timeout_secs: 10,
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, &json).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: Settings = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.api_base_url, "https://api.example.com");
        assert_eq!(loaded.page_limit, 250);
        assert!(!loaded.advance_on_empty);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.api_base_url.is_empty());
        assert_eq!(s.store, "csv");
        assert_eq!(s.page_limit, 500);
        assert_eq!(s.backfill_days, 3650);
        assert!(s.advance_on_empty);
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "api_base_url": "https://api.example.com"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.page_limit, 500);
        assert_eq!(s.store, "csv");
        assert_eq!(s.timeout_secs, 30);
    }
}
