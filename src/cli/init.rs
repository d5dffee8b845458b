use crate::error::{Result, SyncError};
use crate::settings::{load_settings, save_settings, settings_file_exists, Settings};

pub fn run(
    api_base_url: &str,
    data_dir: Option<String>,
    store: Option<String>,
    spreadsheet_id: Option<String>,
) -> Result<()> {
    let mut settings = if settings_file_exists() {
        load_settings()
    } else {
        Settings::default()
    };

    settings.api_base_url = api_base_url.trim_end_matches('/').to_string();
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    if let Some(store) = store {
        if store != "csv" && store != "sheets" {
            return Err(SyncError::Settings(format!(
                "unknown store backend '{store}' (want csv or sheets)"
            )));
        }
        settings.store = store;
    }
    if let Some(id) = spreadsheet_id {
        settings.spreadsheet_id = id;
    }

    std::fs::create_dir_all(&settings.data_dir)?;
    save_settings(&settings)?;

    println!("Settings saved.");
    println!("Data dir: {}", settings.data_dir);
    println!("Store:    {}", settings.store);
    println!("API:      {}", settings.api_base_url);
    println!("\nSet FINSYNC_TOKEN and run `finsync sync` to load data.");
    Ok(())
}
