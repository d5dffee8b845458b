use std::path::Path;

use chrono::NaiveDate;
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::source::FinanceSource;
use crate::unwrap::unwrap_records;

/// Pull every transaction in `[start, end]` by walking fixed-size
/// pages. A zero-record page is an authoritative end signal; a short
/// page is the last page. If the API rejects the explicit zero offset
/// the first page is retried without one — that fallback never applies
/// past page one.
pub fn fetch_window(
    source: &dyn FinanceSource,
    limit: u32,
    start: NaiveDate,
    end: NaiveDate,
    debug_dir: Option<&Path>,
) -> Result<Vec<Value>> {
    let mut all: Vec<Value> = Vec::new();
    let mut offset: u64 = 0;
    let mut page: u32 = 0;

    loop {
        page += 1;
        let res = match source.transactions_page(limit, Some(offset), start, end) {
            Ok(res) => res,
            Err(SyncError::OffsetRejected(_)) if offset == 0 => {
                source.transactions_page(limit, None, start, end)?
            }
            Err(e) => return Err(e),
        };

        if page == 1 {
            save_debug_page(debug_dir, &res);
        }

        let items = unwrap_records(&res);
        let count = items.len();
        if count == 0 {
            println!("Fetched page {page}: 0 transactions; stopping.");
            break;
        }
        all.extend(items);
        println!("Fetched page {page}: {count} transactions (offset {offset}).");

        if count < limit as usize {
            break;
        }
        offset += u64::from(limit);
    }

    Ok(all)
}

fn save_debug_page(debug_dir: Option<&Path>, res: &Value) {
    let Some(dir) = debug_dir else { return };
    let path = dir.join("tx_first_page.json");
    match std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, res.to_string())) {
        Ok(()) => println!("Saved debug -> {}", path.display()),
        Err(e) => println!("Could not save debug page: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    /// Scripted source: yields pages of the given sizes, recording each
    /// call's offset argument.
    struct ScriptedSource {
        pages: Vec<usize>,
        calls: RefCell<Vec<Option<u64>>>,
        reject_offset: bool,
    }

    impl ScriptedSource {
        fn new(pages: Vec<usize>) -> Self {
            Self {
                pages,
                calls: RefCell::new(Vec::new()),
                reject_offset: false,
            }
        }

        fn page_of(n: usize) -> Value {
            let items: Vec<Value> = (0..n).map(|i| json!({"id": i.to_string()})).collect();
            json!({"allTransactions": {"results": items}})
        }
    }

    impl FinanceSource for ScriptedSource {
        fn accounts(&self) -> Result<Value> {
            Ok(json!({"accounts": []}))
        }

        fn transactions_page(
            &self,
            _limit: u32,
            offset: Option<u64>,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Value> {
            if self.reject_offset && offset.is_some() {
                return Err(SyncError::OffsetRejected("offset not supported".into()));
            }
            self.calls.borrow_mut().push(offset);
            let idx = self.calls.borrow().len() - 1;
            let n = self.pages.get(idx).copied().unwrap_or(0);
            Ok(Self::page_of(n))
        }
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
    }

    #[test]
    fn test_pagination_short_page_terminates() {
        let source = ScriptedSource::new(vec![500, 500, 137]);
        let (start, end) = window();
        let items = fetch_window(&source, 500, start, end, None).unwrap();
        assert_eq!(items.len(), 1137);
        assert_eq!(*source.calls.borrow(), vec![Some(0), Some(500), Some(1000)]);
    }

    #[test]
    fn test_pagination_zero_page_stops_immediately() {
        let source = ScriptedSource::new(vec![500, 0, 500]);
        let (start, end) = window();
        let items = fetch_window(&source, 500, start, end, None).unwrap();
        assert_eq!(items.len(), 500);
        assert_eq!(source.calls.borrow().len(), 2);
    }

    #[test]
    fn test_empty_first_page_yields_no_records() {
        let source = ScriptedSource::new(vec![0]);
        let (start, end) = window();
        let items = fetch_window(&source, 500, start, end, None).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_offset_rejection_falls_back_on_first_page_only() {
        let mut source = ScriptedSource::new(vec![42]);
        source.reject_offset = true;
        let (start, end) = window();
        let items = fetch_window(&source, 500, start, end, None).unwrap();
        assert_eq!(items.len(), 42);
        // The recorded call is the offset-less retry.
        assert_eq!(*source.calls.borrow(), vec![None]);
    }

    /// Rejects the offset only from page two onward; that failure must
    /// propagate instead of being retried.
    struct LateRejectSource;

    impl FinanceSource for LateRejectSource {
        fn accounts(&self) -> Result<Value> {
            Ok(json!({"accounts": []}))
        }

        fn transactions_page(
            &self,
            _limit: u32,
            offset: Option<u64>,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Value> {
            match offset {
                Some(0) => Ok(ScriptedSource::page_of(500)),
                _ => Err(SyncError::OffsetRejected("offset not supported".into())),
            }
        }
    }

    #[test]
    fn test_offset_rejection_on_later_page_propagates() {
        let (start, end) = window();
        let err = fetch_window(&LateRejectSource, 500, start, end, None).unwrap_err();
        assert!(matches!(err, SyncError::OffsetRejected(_)));
    }

    #[test]
    fn test_debug_dump_writes_first_page() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedSource::new(vec![3]);
        let (start, end) = window();
        fetch_window(&source, 500, start, end, Some(dir.path())).unwrap();
        let dumped = std::fs::read_to_string(dir.path().join("tx_first_page.json")).unwrap();
        let v: Value = serde_json::from_str(&dumped).unwrap();
        assert_eq!(unwrap_records(&v).len(), 3);
    }
}
