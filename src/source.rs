use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{Result, SyncError};

const USER_AGENT: &str = concat!("finsync/", env!("CARGO_PKG_VERSION"));
const TOKEN_ENV: &str = "FINSYNC_TOKEN";

/// The aggregator's read surface as the pipeline sees it. Kept narrow
/// so tests can script page sequences without a network.
pub trait FinanceSource {
    fn accounts(&self) -> Result<Value>;

    /// One transactions page. `offset` is `None` only for the
    /// first-page fallback against APIs that reject an explicit zero.
    fn transactions_page(
        &self,
        limit: u32,
        offset: Option<u64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Value>;
}

/// Blocking HTTP client for the aggregator API. Bearer token comes
/// from the environment; interactive login and session persistence are
/// deliberately out of scope.
pub struct HttpSource {
    http: reqwest::blocking::Client,
    base_url: String,
    token: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        if base_url.is_empty() {
            return Err(SyncError::Settings(
                "api_base_url is not set; run `finsync init` first".to_string(),
            ));
        }
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| SyncError::Settings(format!("{TOKEN_ENV} is not set")))?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(query)
            .send()?;
        let status = resp.status().as_u16();
        let body: Value = resp.json().unwrap_or(Value::Null);

        if status == 401 || status == 403 {
            return Err(SyncError::Auth {
                status,
                message: extract_error(&body),
            });
        }
        if status == 400 {
            let message = extract_error(&body);
            // Paging contract mismatch: some API revisions refuse an
            // explicit offset parameter outright.
            if message.to_lowercase().contains("offset") {
                return Err(SyncError::OffsetRejected(message));
            }
            return Err(SyncError::Api { status, message });
        }
        if !(200..300).contains(&status) {
            return Err(SyncError::Api {
                status,
                message: extract_error(&body),
            });
        }
        Ok(body)
    }
}

fn extract_error(body: &Value) -> String {
    for key in ["error", "message", "detail"] {
        if let Some(msg) = body.get(key).and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    if let Some(msg) = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
    {
        return msg.to_string();
    }
    "unexpected response".to_string()
}

impl FinanceSource for HttpSource {
    fn accounts(&self) -> Result<Value> {
        self.get_json("accounts", &[])
    }

    fn transactions_page(
        &self,
        limit: u32,
        offset: Option<u64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Value> {
        let mut query = vec![
            ("limit", limit.to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", end.format("%Y-%m-%d").to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        self.get_json("transactions", &query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_error_shapes() {
        assert_eq!(extract_error(&json!({"error": "bad token"})), "bad token");
        assert_eq!(extract_error(&json!({"message": "nope"})), "nope");
        assert_eq!(
            extract_error(&json!({"error": {"message": "nested"}})),
            "nested"
        );
        assert_eq!(extract_error(&Value::Null), "unexpected response");
    }
}
