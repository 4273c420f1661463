use std::path::PathBuf;

use chrono::TimeDelta;

const CONFIG_PATH: &str = "HOSTWATCH_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "./hostwatch.json";

pub fn get_config_path() -> String {
    std::env::var(CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

const STORAGE_PATH: &str = "HOSTWATCH_STORAGE";

/// Snapshot file override; takes precedence over the config file
pub fn get_storage_path() -> Option<PathBuf> {
    std::env::var(STORAGE_PATH)
        .ok()
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
}

/// Render an outage length for a status cell
///
/// `"< 1 min"` below a minute, `"N min"` below an hour, `"HH:MM"` above.
pub fn format_offline_duration(duration: TimeDelta) -> String {
    let minutes = duration.num_minutes().max(0);

    match minutes {
        0 => "< 1 min".to_string(),
        1..=59 => format!("{minutes} min"),
        _ => format!("{:02}:{:02}", minutes / 60, minutes % 60),
    }
}
