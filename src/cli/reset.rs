use dialoguer::Confirm;

use crate::cli::open_store;
use crate::error::Result;
use crate::settings::load_settings;
use crate::store::{ACCOUNTS_SHEET, CONTROL_SHEET, TXNS_SHEET};

pub fn run(yes: bool) -> Result<()> {
    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(
                "This clears the Accounts and Transactions sheets and the sync watermark. Continue?",
            )
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Aborted.");
            return Ok(());
        }
    }

    let settings = load_settings();
    let mut store = open_store(&settings)?;
    for sheet in [ACCOUNTS_SHEET, TXNS_SHEET, CONTROL_SHEET] {
        store.clear(sheet)?;
        println!("Cleared '{sheet}'.");
    }
    println!("The next sync will reload the full backfill window.");
    Ok(())
}
