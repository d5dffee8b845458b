use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use colored::Colorize;
use serde_json::Value;

use crate::unwrap::{scalar, to_record, Record};

/// Preferred transaction column order. Nested sub-objects appear as
/// their extracted breakout columns; timestamps sit at the end with
/// our own load metadata last.
const TXN_BASE_COLUMNS: &[&str] = &[
    "__typename",
    "AccID",
    "AccDispName",
    "AccType",
    "amount",
    "attachments",
    "CatID",
    "CatDispName",
    "CatType",
    "date",
    "hideFromReports",
    "id",
    "isRecurring",
    "isSplitTransaction",
    "MrchntID",
    "MrchntDispName",
    "MrchntTranCount",
    "MrchntType",
    "needsReview",
    "notes",
    "pending",
    "plaidName",
    "reviewStatus",
    "tags",
    "TagsCSL",
    "createdAt",
    "updatedAt",
    "loadedAtUtc",
];

const ACCOUNT_PRIORITY_COLUMNS: &[&str] = &[
    "id",
    "TypeDisplay",
    "AccountType",
    "displayName",
    "InstitutionName",
    "currentBalance",
    "displayBalance",
];

/// Fields that may arrive as currency-formatted text and must land in
/// the sheet as plain numbers.
const CURRENCY_FIELDS: &[&str] = &[
    "amount",
    "balance",
    "availableBalance",
    "currentBalance",
    "clearedBalance",
    "value",
    "price",
    "cost",
    "fee",
    "total",
    "subtotal",
    "tax",
    "interestAmount",
    "principalAmount",
    "minimumPayment",
    "creditLimit",
    "availableCredit",
    "accountBalance",
    "runningBalance",
];

// ---------------------------------------------------------------------------
// Date / timestamp helpers
// ---------------------------------------------------------------------------

/// Parse an ISO-8601 timestamp (Z, explicit offset, or naive) to UTC.
pub fn parse_iso_utc(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Reformat an ISO timestamp into the sheet-friendly
/// `YYYY-MM-DD HH:MM:SS` form. Unparseable values pass through.
pub fn format_timestamp(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    match parse_iso_utc(s) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => s.to_string(),
    }
}

fn date_formula(d: NaiveDate) -> String {
    format!("=DATE({},{},{})", d.year(), d.month(), d.day())
}

/// Render a date value as a `=DATE(y,m,d)` formula so the sheet
/// recognizes it as a real date. Tries ISO datetime, plain ISO date,
/// then a fixed list of fallback patterns; gives the original back if
/// nothing parses (so already-rendered formulas survive unchanged).
pub fn format_date(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    if s.contains('T') {
        if let Some(dt) = parse_iso_utc(s) {
            return date_formula(dt.date_naive());
        }
    } else if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date_formula(d);
    }
    for fmt in ["%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return date_formula(d);
        }
    }
    s.to_string()
}

// ---------------------------------------------------------------------------
// Account index
// ---------------------------------------------------------------------------

const ID_KEYS: &[&str] = &["id", "accountId", "entityId", "uid"];

fn value_to_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Account id -> display name, built once per run from the accounts
/// fetch and joined onto each transaction.
#[derive(Debug, Default)]
pub struct AccountIndex(HashMap<String, String>);

impl AccountIndex {
    pub fn from_accounts(accounts: &[Record]) -> Self {
        let mut map = HashMap::new();
        for a in accounts {
            let id = ID_KEYS.iter().find_map(|k| a.get(*k).and_then(value_to_id));
            let name = ["displayName", "name"]
                .iter()
                .find_map(|k| a.get(*k).and_then(|v| v.as_str()))
                .unwrap_or("")
                .to_string();
            if let Some(id) = id {
                map.insert(id, name);
            }
        }
        Self(map)
    }

    pub fn name(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(|s| s.as_str())
    }
}

// ---------------------------------------------------------------------------
// Record shaping
// ---------------------------------------------------------------------------

/// Fetch a nested sub-object field, tolerating it being pre-serialized
/// as JSON text (which `to_record` does to every nested value).
fn object_field(rec: &Record, key: &str) -> Option<Record> {
    match rec.get(key) {
        Some(Value::Object(m)) => Some(m.clone()),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_object().cloned()),
        _ => None,
    }
}

fn array_field(rec: &Record, key: &str) -> Vec<Value> {
    match rec.get(key) {
        Some(Value::Array(a)) => a.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| v.as_array().cloned())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn nested_value(obj: &Record, key: &str) -> Value {
    obj.get(key).map(scalar).unwrap_or(Value::String(String::new()))
}

/// Resolve the transaction's account id: explicit scalar id field
/// first, then a nested account-object id, else nothing.
pub fn resolve_account_id(rec: &Record) -> Option<String> {
    for key in ["accountId", "account_id", "accountUuid"] {
        match rec.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            _ => {}
        }
        if let Some(obj) = object_field(rec, key) {
            if let Some(id) = ID_KEYS.iter().find_map(|k| obj.get(*k).and_then(value_to_id)) {
                return Some(id);
            }
        }
    }
    if let Some(obj) = object_field(rec, "account") {
        return ID_KEYS.iter().find_map(|k| obj.get(*k).and_then(value_to_id));
    }
    None
}

/// Break the nested account/category/merchant sub-objects out into
/// scalar columns, derive `TagsCSL`, and reformat timestamp, date, and
/// currency fields. Safe to re-run on an already-flattened record: the
/// `AccID` marker skips re-extraction and every reformat step maps its
/// own output to itself.
pub fn extract_nested_fields(rec: &mut Record) {
    if !rec.contains_key("AccID") {
        let account = object_field(rec, "account").unwrap_or_default();
        rec.insert("AccID".to_string(), nested_value(&account, "id"));
        rec.insert("AccDispName".to_string(), nested_value(&account, "displayName"));
        rec.insert("AccType".to_string(), nested_value(&account, "__typename"));
        rec.remove("account");

        let category = object_field(rec, "category").unwrap_or_default();
        rec.insert("CatID".to_string(), nested_value(&category, "id"));
        rec.insert("CatDispName".to_string(), nested_value(&category, "name"));
        rec.insert("CatType".to_string(), nested_value(&category, "__typename"));
        rec.remove("category");

        let merchant = object_field(rec, "merchant").unwrap_or_default();
        rec.insert("MrchntID".to_string(), nested_value(&merchant, "id"));
        rec.insert("MrchntDispName".to_string(), nested_value(&merchant, "name"));
        rec.insert(
            "MrchntTranCount".to_string(),
            nested_value(&merchant, "transactionsCount"),
        );
        rec.insert("MrchntType".to_string(), nested_value(&merchant, "__typename"));
        rec.remove("merchant");

        // Tags stay as-is; TagsCSL is the comma-joined name list.
        let tag_names: Vec<String> = array_field(rec, "tags")
            .iter()
            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        rec.insert("TagsCSL".to_string(), Value::String(tag_names.join(", ")));
    }

    for key in ["createdAt", "updatedAt", "loadedAtUtc"] {
        if let Some(Value::String(s)) = rec.get(key) {
            let formatted = format_timestamp(s);
            rec.insert(key.to_string(), Value::String(formatted));
        }
    }
    if let Some(Value::String(s)) = rec.get("date") {
        let formatted = format_date(s);
        rec.insert("date".to_string(), Value::String(formatted));
    }

    coerce_currency_fields(rec);
}

/// Strip currency formatting from known money fields and parse them as
/// numbers. Parenthesized amounts are negatives. A value that still
/// fails to parse is kept as the cleaned string with a warning; one
/// malformed cell never aborts the run.
fn coerce_currency_fields(rec: &mut Record) {
    for field in CURRENCY_FIELDS {
        let Some(v) = rec.get(*field) else { continue };
        if v.is_number() || v.is_null() {
            continue;
        }
        let raw = match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let cleaned = raw
            .replace('$', "")
            .replace(',', "")
            .replace('(', "-")
            .replace(')', "")
            .trim()
            .to_string();
        let new = if cleaned.is_empty() {
            Value::from(0.0)
        } else if let Ok(n) = cleaned.parse::<f64>() {
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(cleaned.clone()))
        } else {
            println!(
                "{} could not convert {} value '{}' to a number",
                "Warning:".yellow(),
                field,
                raw
            );
            Value::String(cleaned)
        };
        rec.insert(field.to_string(), new);
    }
}

/// Turn one raw transaction into a canonical flat record: resolve and
/// join the account, stamp the load timestamp, then flatten.
pub fn normalize_transaction(raw: &Value, accounts: &AccountIndex, run_ts: &str) -> Record {
    let mut rec = to_record(raw);
    let aid = resolve_account_id(&rec).unwrap_or_default();
    let display = accounts.name(&aid).unwrap_or("").to_string();
    rec.insert("accountId".to_string(), Value::String(aid));
    rec.insert("accountDisplayName".to_string(), Value::String(display));
    rec.insert("loadedAtUtc".to_string(), Value::String(run_ts.to_string()));
    extract_nested_fields(&mut rec);
    rec
}

/// Shape one raw account: pull the subtype/type display values and the
/// institution name up into their own columns.
pub fn process_accounts(raw: &[Value]) -> Vec<Record> {
    raw.iter()
        .map(|a| {
            let mut rec = to_record(a);
            let subtype = object_field(&rec, "subtype").unwrap_or_default();
            rec.insert("AccountType".to_string(), nested_value(&subtype, "display"));
            let type_obj = object_field(&rec, "type").unwrap_or_default();
            rec.insert("TypeDisplay".to_string(), nested_value(&type_obj, "display"));
            let institution = object_field(&rec, "institution").unwrap_or_default();
            rec.insert(
                "InstitutionName".to_string(),
                nested_value(&institution, "name"),
            );
            rec
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Header layout / row rendering
// ---------------------------------------------------------------------------

pub fn render_cell(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

fn field_str(rec: &Record, key: &str) -> String {
    rec.get(key).map(render_cell).unwrap_or_default()
}

fn rows_for_headers(records: &[&Record], headers: &[String]) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|r| {
            headers
                .iter()
                .map(|h| r.get(h).map(render_cell).unwrap_or_default())
                .collect()
        })
        .collect()
}

/// Header set for the Transactions sheet: the preferred column order
/// first, then any extra columns found in the data, sorted. The raw
/// `accountId`/`accountDisplayName` join fields are dropped as columns
/// (the breakout columns carry that data).
pub fn transaction_headers_rows(records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
    if records.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut all_keys: BTreeSet<String> = records.iter().flat_map(|r| r.keys().cloned()).collect();
    all_keys.remove("accountDisplayName");
    all_keys.remove("accountId");

    let mut headers: Vec<String> = Vec::new();
    for col in TXN_BASE_COLUMNS {
        if all_keys.remove(*col) {
            headers.push(col.to_string());
        }
    }
    // BTreeSet iteration leaves the leftover columns sorted.
    headers.extend(all_keys);

    let refs: Vec<&Record> = records.iter().collect();
    let rows = rows_for_headers(&refs, &headers);
    (headers, rows)
}

/// Header set for the Accounts sheet: fixed priority columns, then the
/// rest sorted, with `type` pulled in front of `subtype`. Rows sort by
/// type display, account type, then display name.
pub fn account_headers_rows(records: &[Record]) -> (Vec<String>, Vec<Vec<String>>) {
    if records.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let mut all_keys: BTreeSet<String> = records.iter().flat_map(|r| r.keys().cloned()).collect();

    let mut headers: Vec<String> = Vec::new();
    for col in ACCOUNT_PRIORITY_COLUMNS {
        if all_keys.remove(*col) {
            headers.push(col.to_string());
        }
    }

    let mut remaining: Vec<String> = all_keys.into_iter().collect();
    if remaining.iter().any(|k| k == "type") && remaining.iter().any(|k| k == "subtype") {
        remaining.retain(|k| k != "type" && k != "subtype");
        let pos = remaining
            .iter()
            .position(|k| k.as_str() > "type")
            .unwrap_or(remaining.len());
        remaining.insert(pos, "type".to_string());
        remaining.insert(pos + 1, "subtype".to_string());
    }
    headers.extend(remaining);

    let mut sorted: Vec<&Record> = records.iter().collect();
    sorted.sort_by_key(|r| {
        (
            field_str(r, "TypeDisplay"),
            field_str(r, "AccountType"),
            field_str(r, "displayName"),
        )
    });

    let rows = rows_for_headers(&sorted, &headers);
    (headers, rows)
}
