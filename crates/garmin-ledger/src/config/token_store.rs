use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::client::{OAuth1Token, OAuth2Token};
use crate::error::Result;

const OAUTH1_FILENAME: &str = "oauth1_token.json";
const OAUTH2_FILENAME: &str = "oauth2_token.json";

/// File-backed storage for the session tokens, one JSON file per token.
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Store in the configured token directory, creating it if needed.
    pub fn open() -> Result<Self> {
        Self::at(super::token_dir()?)
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: PathBuf) -> Result<Self> {
        super::ensure_dir(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn save_oauth1(&self, token: &OAuth1Token) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        write_private(&self.dir.join(OAUTH1_FILENAME), &json)
    }

    pub fn load_oauth1(&self) -> Result<Option<OAuth1Token>> {
        read_json(&self.dir.join(OAUTH1_FILENAME))
    }

    pub fn save_oauth2(&self, token: &OAuth2Token) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        write_private(&self.dir.join(OAUTH2_FILENAME), &json)
    }

    pub fn load_oauth2(&self) -> Result<Option<OAuth2Token>> {
        read_json(&self.dir.join(OAUTH2_FILENAME))
    }

    pub fn save_pair(&self, oauth1: &OAuth1Token, oauth2: &OAuth2Token) -> Result<()> {
        self.save_oauth1(oauth1)?;
        self.save_oauth2(oauth2)
    }

    /// Both tokens, or `None` when either file is missing.
    pub fn load_pair(&self) -> Result<Option<(OAuth1Token, OAuth2Token)>> {
        match (self.load_oauth1()?, self.load_oauth2()?) {
            (Some(oauth1), Some(oauth2)) => Ok(Some((oauth1, oauth2))),
            _ => Ok(None),
        }
    }

    /// Remove any stored token files.
    pub fn clear(&self) -> Result<()> {
        for name in [OAUTH1_FILENAME, OAUTH2_FILENAME] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

/// Write a token file readable only by the owner.
fn write_private(path: &Path, json: &str) -> Result<()> {
    fs::write(path, json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let json = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&json)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn sample_oauth1() -> OAuth1Token {
        OAuth1Token::new("tok".to_string(), "secret".to_string())
    }

    fn sample_oauth2() -> OAuth2Token {
        OAuth2Token {
            scope: "CONNECT_READ".to_string(),
            jti: "jti".to_string(),
            token_type: "Bearer".to_string(),
            access_token: "access".to_string(),
            refresh_token: "refresh".to_string(),
            expires_in: 3600,
            expires_at: Utc::now().timestamp() + 3600,
            refresh_token_expires_in: 86400,
            refresh_token_expires_at: Utc::now().timestamp() + 86400,
        }
    }

    fn store(temp: &TempDir) -> TokenStore {
        TokenStore::at(temp.path().join("tokens")).unwrap()
    }

    #[test]
    fn test_at_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        assert!(store.dir().is_dir());
    }

    #[test]
    fn test_save_and_load_oauth1() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let token = sample_oauth1();
        store.save_oauth1(&token).unwrap();

        assert_eq!(store.load_oauth1().unwrap(), Some(token));
    }

    #[test]
    fn test_save_and_load_oauth2() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let token = sample_oauth2();
        store.save_oauth2(&token).unwrap();

        assert_eq!(store.load_oauth2().unwrap(), Some(token));
    }

    #[test]
    fn test_load_missing_returns_none() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        assert!(store.load_oauth1().unwrap().is_none());
        assert!(store.load_oauth2().unwrap().is_none());
        assert!(store.load_pair().unwrap().is_none());
    }

    #[test]
    fn test_load_pair_requires_both_files() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.save_oauth1(&sample_oauth1()).unwrap();
        assert!(store.load_pair().unwrap().is_none());

        store.save_oauth2(&sample_oauth2()).unwrap();
        assert!(store.load_pair().unwrap().is_some());
    }

    #[test]
    fn test_clear_removes_tokens() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        store.save_pair(&sample_oauth1(), &sample_oauth2()).unwrap();
        store.clear().unwrap();

        assert!(store.load_pair().unwrap().is_none());
        // Clearing an already-empty store is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_token_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        fs::write(store.dir().join("oauth1_token.json"), "not json").unwrap();
        assert!(store.load_oauth1().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_token_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        store.save_oauth1(&sample_oauth1()).unwrap();

        let mode = fs::metadata(store.dir().join("oauth1_token.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
