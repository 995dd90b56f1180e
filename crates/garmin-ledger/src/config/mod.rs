mod token_store;

pub use token_store::TokenStore;

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{LedgerError, Result};

/// Directory name under the per-user data dir holding the token files.
const DATA_DIR_NAME: &str = "garmin-ledger";

/// Environment variable overriding the token directory.
const TOKEN_DIR_ENV: &str = "GARMIN_LEDGER_TOKEN_DIR";

const EMAIL_ENV: &str = "GARMIN_EMAIL";
const PASSWORD_ENV: &str = "GARMIN_PASSWORD";

/// Account credentials taken from the environment.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    /// Read `GARMIN_EMAIL` and `GARMIN_PASSWORD`. Either one missing or
    /// empty is a startup failure, before anything is fetched or written.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            email: required_env(EMAIL_ENV)?,
            password: required_env(PASSWORD_ENV)?,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(LedgerError::config(format!(
            "{} is not set. Define it in the environment or in a .env file.",
            name
        ))),
    }
}

/// Directory holding the persisted session tokens.
/// `GARMIN_LEDGER_TOKEN_DIR` overrides the per-user default.
pub fn token_dir() -> Result<PathBuf> {
    if let Ok(dir) = env::var(TOKEN_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    dirs::data_dir()
        .map(|p| p.join(DATA_DIR_NAME))
        .ok_or_else(|| LedgerError::config("Could not determine data directory"))
}

/// Ensure a directory exists, creating it if necessary.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}
