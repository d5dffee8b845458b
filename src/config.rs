use chrono::NaiveDate;

use crate::error::{Result, SyncError};
use crate::settings::Settings;

/// Per-run sync configuration: settings merged with CLI overrides into
/// one immutable value threaded through the pipeline.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub page_limit: u32,
    pub backfill_days: i64,
    pub force_start_date: Option<NaiveDate>,
    pub force_full_refresh: bool,
    pub advance_on_empty: bool,
    pub debug: bool,
    pub timeout_secs: u64,
}

/// CLI overrides for one sync run; `None`/`false` means "use settings".
#[derive(Debug, Default)]
pub struct SyncOverrides {
    pub debug: bool,
    pub force_full_refresh: bool,
    pub force_start_date: Option<String>,
    pub backfill_days: Option<i64>,
    pub page_limit: Option<u32>,
    pub no_advance_empty: bool,
    pub timeout_secs: Option<u64>,
}

impl SyncConfig {
    pub fn build(settings: &Settings, overrides: &SyncOverrides) -> Result<Self> {
        let force_start_date = overrides
            .force_start_date
            .as_deref()
            .map(|s| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                    SyncError::Settings(format!("invalid --force-start-date '{s}' (want YYYY-MM-DD)"))
                })
            })
            .transpose()?;

        Ok(Self {
            page_limit: overrides.page_limit.unwrap_or(settings.page_limit),
            backfill_days: overrides.backfill_days.unwrap_or(settings.backfill_days),
            force_start_date,
            force_full_refresh: overrides.force_full_refresh,
            advance_on_empty: if overrides.no_advance_empty {
                false
            } else {
                settings.advance_on_empty
            },
            debug: overrides.debug,
            timeout_secs: overrides.timeout_secs.unwrap_or(settings.timeout_secs),
        })
    }
}
