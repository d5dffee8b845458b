use chrono::NaiveDate;
use colored::Colorize;
use serde_json::Value;

use crate::normalize::{extract_nested_fields, parse_iso_utc};
use crate::unwrap::Record;

/// Date-bearing keys probed, in order, on the first fresh record to
/// pick the partition column.
const DATE_KEY_CANDIDATES: &[&str] = &[
    "date",
    "transDate",
    "transactionDate",
    "postedDate",
    "datePosted",
    "madeOn",
    "createdAt",
    "activityDate",
];

/// Pick the partition date key for a record: first matching known
/// candidate, else the first field whose value looks like an ISO date.
/// `None` disables date-based partitioning (full replace).
pub fn find_date_key(sample: &Record) -> Option<String> {
    for k in DATE_KEY_CANDIDATES {
        if sample.contains_key(*k) {
            return Some(k.to_string());
        }
    }
    for (k, v) in sample {
        if let Value::String(s) = v {
            if s.len() >= 5 && s.as_bytes()[..4].iter().all(|b| b.is_ascii_digit()) && s.contains('-') {
                return Some(k.clone());
            }
        }
    }
    None
}

/// Parse a stored partition-date cell. Handles ISO timestamps, bare
/// ISO dates, and the `=DATE(y,m,d)` formulas we write ourselves.
pub fn parse_partition_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(dt) = parse_iso_utc(s) {
        return Some(dt.date_naive());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Some(inner) = s.strip_prefix("=DATE(").and_then(|v| v.strip_suffix(')')) {
        let parts: Vec<&str> = inner.split(',').collect();
        if parts.len() == 3 {
            let y: i32 = parts[0].trim().parse().ok()?;
            let m: u32 = parts[1].trim().parse().ok()?;
            let d: u32 = parts[2].trim().parse().ok()?;
            return NaiveDate::from_ymd_opt(y, m, d);
        }
    }
    None
}

pub struct MergeOutcome {
    /// Retained prior rows followed by the fresh rows.
    pub rows: Vec<Record>,
    /// Stored rows kept because they fall strictly before the window.
    pub kept: usize,
    /// Stored rows kept despite an unparseable partition date.
    pub kept_unparsed: usize,
}

/// Merge freshly normalized records with the stored table. Stored rows
/// whose partition date falls on/after `window_start` are superseded by
/// the fresh fetch; earlier rows are retained (re-flattened if they
/// predate the breakout columns). Rows whose date cell cannot be
/// parsed at all are retained rather than silently dropped.
pub fn merge_window(
    existing: Vec<Record>,
    fresh: Vec<Record>,
    window_start: NaiveDate,
) -> MergeOutcome {
    let date_key = fresh.first().and_then(find_date_key);

    let mut kept: Vec<Record> = Vec::new();
    let mut kept_unparsed = 0usize;

    if let Some(key) = date_key.as_deref() {
        if existing.first().map(|r| r.contains_key(key)).unwrap_or(false) {
            for mut row in existing {
                let cell = row
                    .get(key)
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let retain = match parse_partition_date(&cell) {
                    Some(d) => d < window_start,
                    None => {
                        kept_unparsed += 1;
                        let id = row.get("id").and_then(|v| v.as_str()).unwrap_or("?");
                        println!(
                            "{} keeping stored row (id {}) with unparseable {} '{}'",
                            "Warning:".yellow(),
                            id,
                            key,
                            cell
                        );
                        true
                    }
                };
                if retain {
                    if !row.contains_key("AccID") {
                        extract_nested_fields(&mut row);
                    }
                    kept.push(row);
                }
            }
        }
    }

    let kept_count = kept.len();
    kept.extend(fresh);
    MergeOutcome {
        rows: kept,
        kept: kept_count,
        kept_unparsed,
    }
}

/// Whether this run may advance the stored watermark. With fresh rows
/// it always advances (after the table write); on an empty fetch the
/// policy bit decides, so an empty window is not re-scanned forever.
pub fn should_advance_watermark(fresh_count: usize, advance_on_empty: bool) -> bool {
    fresh_count > 0 || advance_on_empty
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_find_date_key_candidates_in_order() {
        let r = rec(&[("createdAt", "2024-01-01"), ("date", "2024-01-02")]);
        assert_eq!(find_date_key(&r).as_deref(), Some("date"));
        let r = rec(&[("postedDate", "2024-01-02")]);
        assert_eq!(find_date_key(&r).as_deref(), Some("postedDate"));
    }

    #[test]
    fn test_find_date_key_probes_date_looking_values() {
        let r = rec(&[("whenBooked", "2024-01-02")]);
        assert_eq!(find_date_key(&r).as_deref(), Some("whenBooked"));
        assert_eq!(find_date_key(&rec(&[("note", "hello")])), None);
    }

    #[test]
    fn test_parse_partition_date_forms() {
        assert_eq!(parse_partition_date("2024-03-15"), Some(date("2024-03-15")));
        assert_eq!(
            parse_partition_date("2024-03-15T10:00:00Z"),
            Some(date("2024-03-15"))
        );
        assert_eq!(
            parse_partition_date("=DATE(2024,3,15)"),
            Some(date("2024-03-15"))
        );
        assert_eq!(parse_partition_date("nope"), None);
    }

    #[test]
    fn test_partition_correctness() {
        let existing = vec![
            rec(&[("id", "1"), ("date", "2024-01-01"), ("AccID", "a")]),
            rec(&[("id", "2"), ("date", "2024-03-15"), ("AccID", "a")]),
        ];
        let fresh = vec![rec(&[("id", "3"), ("date", "=DATE(2024,3,10)"), ("AccID", "a")])];
        let out = merge_window(existing, fresh, date("2024-03-01"));

        let ids: Vec<&str> = out
            .rows
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_str()).unwrap())
            .collect();
        // id 2 falls inside the replaced window and is dropped.
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(out.kept, 1);
        assert_eq!(out.kept_unparsed, 0);
    }

    #[test]
    fn test_retained_rows_are_reflattened() {
        let existing = vec![rec(&[
            ("id", "1"),
            ("date", "2024-01-01"),
            ("merchant", "{\"id\":\"m1\",\"name\":\"Acme\"}"),
        ])];
        let out = merge_window(existing, vec![rec(&[("id", "9"), ("date", "2024-06-01")])], date("2024-03-01"));
        assert_eq!(out.rows[0].get("MrchntDispName"), Some(&json!("Acme")));
        assert!(out.rows[0].get("merchant").is_none());
    }

    #[test]
    fn test_unparseable_dates_are_retained_not_dropped() {
        let existing = vec![
            rec(&[("id", "1"), ("date", "garbage"), ("AccID", "a")]),
            rec(&[("id", "2"), ("date", "2024-05-05"), ("AccID", "a")]),
        ];
        let out = merge_window(existing, vec![rec(&[("id", "3"), ("date", "2024-05-06")])], date("2024-03-01"));
        let ids: Vec<&str> = out
            .rows
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_str()).unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(out.kept_unparsed, 1);
    }

    #[test]
    fn test_no_date_key_means_full_replace() {
        let existing = vec![rec(&[("id", "1"), ("date", "2020-01-01")])];
        let fresh = vec![rec(&[("id", "2"), ("note", "no date here")])];
        let out = merge_window(existing, fresh, date("2024-03-01"));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].get("id"), Some(&json!("2")));
        assert_eq!(out.kept, 0);
    }

    #[test]
    fn test_missing_key_in_stored_header_drops_storage() {
        // Stored table predates the date column entirely: nothing to
        // partition on, so the fresh fetch replaces it wholesale.
        let existing = vec![rec(&[("id", "1"), ("when", "2020-01-01")])];
        let fresh = vec![rec(&[("id", "2"), ("date", "2024-05-06")])];
        let out = merge_window(existing, fresh, date("2024-03-01"));
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.kept, 0);
    }

    #[test]
    fn test_watermark_policy() {
        assert!(should_advance_watermark(5, false));
        assert!(should_advance_watermark(5, true));
        assert!(should_advance_watermark(0, true));
        assert!(!should_advance_watermark(0, false));
    }
}
