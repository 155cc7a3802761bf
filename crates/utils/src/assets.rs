use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

pub fn asset_dir() -> std::path::PathBuf {
    let path = if cfg!(debug_assertions) {
        std::path::PathBuf::from(PROJECT_ROOT).join("../../dev_assets")
    } else {
        ProjectDirs::from("com", "arnold", "trello-sync")
            .expect("OS didn't give us a home directory")
            .data_dir()
            .to_path_buf()
    };

    // Ensure the directory exists
    if !path.exists() {
        std::fs::create_dir_all(&path).expect("Failed to create asset directory");
    }

    path
}

/// Get the configuration directory path.
///
/// Respects the `SYNC_CONFIG_DIR` environment variable for custom locations.
/// Supports tilde expansion (e.g., `~/trello-sync/config`).
///
/// Default: `{asset_dir}`
pub fn config_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("SYNC_CONFIG_DIR") {
        let expanded = crate::path::expand_tilde(&path);
        if !expanded.exists() {
            std::fs::create_dir_all(&expanded).expect("Failed to create config directory");
        }
        return expanded;
    }
    asset_dir()
}

/// Get the board options file path.
///
/// Respects the `BOARD_OPTIONS_PATH` environment variable for custom locations.
///
/// Default: `{config_dir}/board_options.json`
pub fn board_options_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("BOARD_OPTIONS_PATH") {
        return crate::path::expand_tilde(&path);
    }
    config_dir().join("board_options.json")
}

/// Get the database file path.
///
/// Respects the `SYNC_DATABASE_PATH` environment variable for custom locations.
/// Supports tilde expansion (e.g., `~/trello-sync/db.sqlite`).
///
/// Default: `{asset_dir}/db.sqlite`
pub fn database_path() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("SYNC_DATABASE_PATH") {
        return crate::path::expand_tilde(&path);
    }
    asset_dir().join("db.sqlite")
}
