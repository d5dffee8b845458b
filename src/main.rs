mod cli;
mod config;
mod error;
mod fetch;
mod fmt;
mod normalize;
mod reconcile;
mod settings;
mod sheets;
mod source;
mod store;
mod unwrap;

use clap::Parser;

use cli::{Cli, Commands};
use config::SyncOverrides;

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init {
            api_base_url,
            data_dir,
            store,
            spreadsheet_id,
        } => cli::init::run(&api_base_url, data_dir, store, spreadsheet_id),
        Commands::Sync {
            debug,
            force_full_refresh,
            force_start_date,
            backfill_days,
            page_limit,
            no_advance_empty,
            timeout,
        } => cli::sync::run(SyncOverrides {
            debug,
            force_full_refresh,
            force_start_date,
            backfill_days,
            page_limit,
            no_advance_empty,
            timeout_secs: timeout,
        }),
        Commands::Status => cli::status::run(),
        Commands::Reset { yes } => cli::reset::run(yes),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
