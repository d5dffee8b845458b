use comfy_table::{Cell, Table};

use crate::cli::open_store;
use crate::error::Result;
use crate::fmt::money;
use crate::settings::load_settings;
use crate::store::{read_watermark, ACCOUNTS_SHEET, TXNS_SHEET};

pub fn run() -> Result<()> {
    let settings = load_settings();

    println!("Data dir:   {}", settings.data_dir);
    println!("Store:      {}", settings.store);
    println!(
        "API:        {}",
        if settings.api_base_url.is_empty() {
            "(not set)"
        } else {
            &settings.api_base_url
        }
    );

    let store = open_store(&settings)?;

    let watermark = read_watermark(store.as_ref())?;
    println!(
        "Last sync:  {}",
        watermark
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "(never)".to_string())
    );

    let mut table = Table::new();
    table.set_header(vec!["Sheet", "Rows"]);
    let mut txn_total = None;
    for sheet in [ACCOUNTS_SHEET, TXNS_SHEET] {
        let rows = store.read_all(sheet)?;
        let count = rows.len().saturating_sub(1);
        table.add_row(vec![Cell::new(sheet), Cell::new(count)]);
        if sheet == TXNS_SHEET {
            txn_total = sum_column(&rows, "amount");
        }
    }
    println!("\n{table}");

    if let Some(total) = txn_total {
        println!("Net transaction amount: {}", money(total));
    }

    Ok(())
}

/// Sum a numeric column from rendered rows, skipping cells that do not
/// parse (formulas, blanks).
fn sum_column(rows: &[Vec<String>], column: &str) -> Option<f64> {
    let (headers, data) = rows.split_first()?;
    let idx = headers.iter().position(|h| h == column)?;
    Some(
        data.iter()
            .filter_map(|row| row.get(idx))
            .filter_map(|cell| cell.parse::<f64>().ok())
            .sum(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_column() {
        let rows = vec![
            vec!["id".to_string(), "amount".to_string()],
            vec!["t1".to_string(), "10.5".to_string()],
            vec!["t2".to_string(), "-3.5".to_string()],
            vec!["t3".to_string(), "n/a".to_string()],
        ];
        assert_eq!(sum_column(&rows, "amount"), Some(7.0));
        assert!(sum_column(&rows, "missing").is_none());
        assert!(sum_column(&[], "amount").is_none());
    }
}
