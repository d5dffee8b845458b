pub mod init;
pub mod reset;
pub mod status;
pub mod sync;

use clap::{Parser, Subcommand};

use crate::error::{Result, SyncError};
use crate::settings::Settings;
use crate::sheets::SheetsStore;
use crate::store::{CsvStore, TabularStore};

#[derive(Parser)]
#[command(
    name = "finsync",
    about = "Sync accounts and transactions from a finance aggregator into a spreadsheet."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up finsync: API endpoint, store backend, and data directory.
    Init {
        /// Aggregator API base URL
        #[arg(long = "api-base-url")]
        api_base_url: String,
        /// Path for finsync data (default: ~/Documents/finsync)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Store backend: csv or sheets
        #[arg(long)]
        store: Option<String>,
        /// Spreadsheet ID for the sheets backend
        #[arg(long = "spreadsheet-id")]
        spreadsheet_id: Option<String>,
    },
    /// Pull new accounts and transactions and merge them into the store.
    Sync {
        /// Save the first raw transactions page for troubleshooting
        #[arg(long)]
        debug: bool,
        /// Ignore the stored watermark and reload the full backfill window
        #[arg(long = "force-full-refresh")]
        force_full_refresh: bool,
        /// Force the window start date (YYYY-MM-DD)
        #[arg(long = "force-start-date")]
        force_start_date: Option<String>,
        /// Days of history to backfill when no watermark exists
        #[arg(long = "backfill-days")]
        backfill_days: Option<i64>,
        /// Transactions page size
        #[arg(long = "page-limit")]
        page_limit: Option<u32>,
        /// Leave the watermark untouched when the fetch returns nothing
        #[arg(long = "no-advance-empty")]
        no_advance_empty: bool,
        /// Request timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show settings, watermark, and sheet row counts.
    Status,
    /// Clear the data sheets and the sync watermark.
    Reset {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Open the store backend the settings name.
pub(crate) fn open_store(settings: &Settings) -> Result<Box<dyn TabularStore>> {
    match settings.store.as_str() {
        "csv" => Ok(Box::new(CsvStore::new(std::path::Path::new(
            &settings.data_dir,
        )))),
        "sheets" => Ok(Box::new(SheetsStore::new(
            &settings.spreadsheet_id,
            settings.timeout_secs,
        )?)),
        other => Err(SyncError::Settings(format!(
            "unknown store backend '{other}' (want csv or sheets)"
        ))),
    }
}
