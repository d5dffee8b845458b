use std::path::Path;

use chrono::{Duration, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

use crate::cli::open_store;
use crate::config::{SyncConfig, SyncOverrides};
use crate::error::Result;
use crate::fetch::fetch_window;
use crate::normalize::{
    account_headers_rows, normalize_transaction, process_accounts, transaction_headers_rows,
    AccountIndex,
};
use crate::reconcile::{merge_window, should_advance_watermark};
use crate::settings::load_settings;
use crate::source::{FinanceSource, HttpSource};
use crate::store::{
    read_watermark, write_watermark, TabularStore, ACCOUNTS_SHEET, TXNS_SHEET,
};
use crate::unwrap::Record;

pub fn run(overrides: SyncOverrides) -> Result<()> {
    let settings = load_settings();
    let cfg = SyncConfig::build(&settings, &overrides)?;
    let source = HttpSource::new(&settings.api_base_url, cfg.timeout_secs)?;
    let mut store = open_store(&settings)?;
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    run_pipeline(&source, store.as_mut(), &cfg, &data_dir)
}

/// One full sync: accounts sheet rewrite, window computation from the
/// watermark, paged transaction fetch, normalize, merge, wholesale
/// write, then watermark advance. The watermark only moves after a
/// write has succeeded.
pub fn run_pipeline(
    source: &dyn FinanceSource,
    store: &mut dyn TabularStore,
    cfg: &SyncConfig,
    data_dir: &Path,
) -> Result<()> {
    // Accounts first: the sheet rewrite and the id -> name join index.
    let accounts_raw = source.accounts()?;
    let accounts_list = unwrap_accounts(&accounts_raw);
    println!("Fetched {} accounts.", accounts_list.len());

    let account_records = process_accounts(&accounts_list);
    let (acc_headers, acc_rows) = account_headers_rows(&account_records);
    if acc_rows.is_empty() {
        println!("No accounts returned; Accounts sheet left unchanged.");
    } else {
        let mut out = vec![acc_headers];
        out.extend(acc_rows);
        store.overwrite(ACCOUNTS_SHEET, &out)?;
        println!("Wrote {} rows to '{ACCOUNTS_SHEET}'.", out.len() - 1);
    }
    let index = AccountIndex::from_accounts(&account_records);

    // Window start: forced date > full refresh > watermark > backfill.
    let mut last_run = read_watermark(store)?;
    if let Some(forced) = cfg.force_start_date {
        last_run = Some(Utc.from_utc_datetime(&forced.and_time(NaiveTime::MIN)));
        println!("Overriding window start with forced start date {forced}.");
    }
    if cfg.force_full_refresh {
        last_run = Some(Utc::now() - Duration::days(cfg.backfill_days));
        println!(
            "Force full refresh: reloading the last {} days.",
            cfg.backfill_days
        );
    }
    let last_run = last_run.unwrap_or_else(|| Utc::now() - Duration::days(cfg.backfill_days));
    let mut start_date = last_run.date_naive();

    let existing_values = store.read_all(TXNS_SHEET)?;
    let existing_count = existing_values.len().saturating_sub(1);

    // First run against an empty sheet: a window starting today would
    // sync nothing, so widen to the full backfill span.
    if existing_count == 0
        && start_date == Utc::now().date_naive()
        && cfg.force_start_date.is_none()
    {
        start_date = (Utc::now() - Duration::days(cfg.backfill_days)).date_naive();
        println!(
            "Initial backfill: Transactions sheet is empty; expanding window to the last {} days.",
            cfg.backfill_days
        );
    }

    let end_dt = Utc::now();
    println!(
        "Loading transactions from {start_date} to {}.",
        end_dt.date_naive()
    );

    let debug_dir = cfg.debug.then_some(data_dir);
    let raw_items = fetch_window(
        source,
        cfg.page_limit,
        start_date,
        end_dt.date_naive(),
        debug_dir,
    )?;

    let run_ts = end_dt.to_rfc3339_opts(SecondsFormat::Secs, true);
    let fresh: Vec<Record> = raw_items
        .iter()
        .map(|t| normalize_transaction(t, &index, &run_ts))
        .collect();

    if fresh.is_empty() {
        if should_advance_watermark(0, cfg.advance_on_empty) {
            write_watermark(store, end_dt)?;
            println!("No transactions for the window. Advanced watermark to {run_ts}.");
        } else {
            println!("No transactions for the window. Watermark left unchanged.");
        }
        return Ok(());
    }

    let existing = rows_to_records(&existing_values);
    let outcome = merge_window(existing, fresh, start_date);

    let (headers, rows) = transaction_headers_rows(&outcome.rows);
    let mut out = vec![headers];
    out.extend(rows);
    store.overwrite(TXNS_SHEET, &out)?;
    println!(
        "Wrote {} transaction rows to '{TXNS_SHEET}' (kept {} prior rows).",
        out.len() - 1,
        outcome.kept + outcome.kept_unparsed
    );

    write_watermark(store, end_dt)?;
    println!("Updated watermark last_run_utc = {run_ts}.");
    Ok(())
}

/// Accounts responses are either `{accounts: [...]}` or a bare list.
fn unwrap_accounts(v: &Value) -> Vec<Value> {
    match v {
        Value::Object(m) => m
            .get("accounts")
            .and_then(|a| a.as_array())
            .cloned()
            .unwrap_or_default(),
        Value::Array(a) => a.clone(),
        _ => Vec::new(),
    }
}

/// Rebuild the stored table as records keyed by its header row.
fn rows_to_records(values: &[Vec<String>]) -> Vec<Record> {
    let Some((headers, data)) = values.split_first() else {
        return Vec::new();
    };
    data.iter()
        .map(|row| {
            headers
                .iter()
                .enumerate()
                .map(|(i, h)| {
                    (
                        h.clone(),
                        Value::String(row.get(i).cloned().unwrap_or_default()),
                    )
                })
                .collect()
        })
        .collect()
}
