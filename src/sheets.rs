use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{Result, SyncError};
use crate::store::TabularStore;

const API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const TOKEN_ENV: &str = "FINSYNC_SHEETS_TOKEN";

/// Google Sheets backend for [`TabularStore`], driven through the
/// values API. Worksheets are addressed by title; writes use
/// USER_ENTERED input so `=DATE(...)` cells land as real dates.
pub struct SheetsStore {
    http: reqwest::blocking::Client,
    spreadsheet_id: String,
    token: String,
}

impl SheetsStore {
    pub fn new(spreadsheet_id: &str, timeout_secs: u64) -> Result<Self> {
        if spreadsheet_id.is_empty() {
            return Err(SyncError::Settings(
                "spreadsheet_id is not set; run `finsync init` first".to_string(),
            ));
        }
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| SyncError::Settings(format!("{TOKEN_ENV} is not set")))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            http,
            spreadsheet_id: spreadsheet_id.to_string(),
            token,
        })
    }

    fn values_url(&self, suffix: &str) -> String {
        format!("{API_BASE}/{}/values/{suffix}", self.spreadsheet_id)
    }

    fn check(&self, resp: reqwest::blocking::Response) -> Result<Value> {
        let status = resp.status().as_u16();
        let body: Value = resp.json().unwrap_or(Value::Null);
        if status == 401 || status == 403 {
            return Err(SyncError::Auth {
                status,
                message: sheets_error(&body),
            });
        }
        if !(200..300).contains(&status) {
            return Err(SyncError::Store(format!(
                "Sheets API {status}: {}",
                sheets_error(&body)
            )));
        }
        Ok(body)
    }
}

fn sheets_error(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("unexpected response")
        .to_string()
}

impl TabularStore for SheetsStore {
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>> {
        let resp = self
            .http
            .get(self.values_url(sheet))
            .bearer_auth(&self.token)
            .send()?;
        let body = self.check(resp)?;
        let mut rows = Vec::new();
        if let Some(values) = body.get("values").and_then(|v| v.as_array()) {
            for row in values {
                let cells = row
                    .as_array()
                    .map(|cells| {
                        cells
                            .iter()
                            .map(|c| match c {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                rows.push(cells);
            }
        }
        Ok(rows)
    }

    fn overwrite(&mut self, sheet: &str, rows: &[Vec<String>]) -> Result<()> {
        self.clear(sheet)?;
        let resp = self
            .http
            .put(self.values_url(&format!("{sheet}!A1")))
            .bearer_auth(&self.token)
            .query(&[("valueInputOption", "USER_ENTERED")])
            .json(&json!({ "values": rows }))
            .send()?;
        self.check(resp)?;
        Ok(())
    }

    fn clear(&mut self, sheet: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.values_url(&format!("{sheet}:clear")))
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()?;
        self.check(resp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sheets_error_extraction() {
        let body = json!({"error": {"code": 403, "message": "The caller does not have permission"}});
        assert_eq!(sheets_error(&body), "The caller does not have permission");
        assert_eq!(sheets_error(&Value::Null), "unexpected response");
    }
}
