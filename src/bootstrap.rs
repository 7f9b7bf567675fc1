//! Bootstrap helpers.
//!
//! Console credentials and endpoint selection live in env vars that must be
//! available before `Config` resolution. They are loaded from the standard
//! `./.env` first, then `~/.telecon/.env`, so the effective priority is:
//!
//!   explicit env vars > `./.env` > `~/.telecon/.env`

use std::path::PathBuf;

/// Path to the console-specific `.env` file: `~/.telecon/.env`.
pub fn telecon_env_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".telecon")
        .join(".env")
}

/// Load env vars from `~/.telecon/.env` (in addition to the standard `.env`).
///
/// Call this **after** `dotenvy::dotenv()` so that the standard `./.env`
/// takes priority. dotenvy never overwrites existing env vars.
pub fn load_telecon_env() {
    let path = telecon_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}

/// Write bootstrap vars to `~/.telecon/.env`, creating the directory.
///
/// Values are double-quoted so that `#` and other shell-special characters
/// are preserved by dotenvy.
pub fn save_bootstrap_env(vars: &[(&str, &str)]) -> std::io::Result<()> {
    let path = telecon_env_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = String::new();
    for (key, value) in vars {
        // Escape backslashes and double quotes to prevent env var injection
        // (a value containing `"\nINJECTED="x` would break out of quotes).
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        content.push_str(&format!("{}=\"{}\"\n", key, escaped));
    }
    std::fs::write(&path, content)
}
