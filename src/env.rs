//! Dotenv support

use std::path::Path;
use tracing::{info, warn};

const DEFAULT_DOTENV: &str = ".env";

/// Load environment variables from a dotenv file.
///
/// An explicit `path` must exist and parse. Without one, `.env` in the
/// working directory is loaded when present. Variables already set in the
/// process environment win. Returns whether a file was loaded.
pub fn load_dotenv(path: Option<&Path>) -> Result<bool, String> {
    if let Some(p) = path {
        if !p.exists() {
            return Err(format!("env file not found: {}", p.display()));
        }
        dotenvy::from_path(p).map_err(|e| format!("failed to load {}: {}", p.display(), e))?;
        info!(path = %p.display(), "loaded env file");
        return Ok(true);
    }

    let p = Path::new(DEFAULT_DOTENV);
    if !p.exists() {
        return Ok(false);
    }
    match dotenvy::from_path(p) {
        Ok(_) => {
            info!(path = %DEFAULT_DOTENV, "loaded env file");
            Ok(true)
        }
        Err(e) => {
            warn!(path = %DEFAULT_DOTENV, error = %e, "failed to load env file");
            Ok(false)
        }
    }
}
