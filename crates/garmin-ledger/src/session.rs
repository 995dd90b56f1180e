//! Session acquisition: resume the stored tokens or log in fresh.

use std::io::{self, Write};

use crate::client::api::{fetch_display_name, ApiClient, ApiSession};
use crate::client::{OAuth1Token, OAuth2Token, SsoClient};
use crate::config::{Credentials, TokenStore};
use crate::error::Result;

/// Acquires a ready API session with an explicit lifecycle: resume the
/// persisted token pair when possible (refreshing the bearer if expired),
/// otherwise discard whatever is stored and perform a fresh login.
pub struct SessionProvider {
    store: TokenStore,
}

impl SessionProvider {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    pub async fn acquire(&self, credentials: &Credentials) -> Result<ApiSession> {
        match self.try_resume().await {
            Ok(Some(session)) => Ok(session),
            Ok(None) => {
                println!("No stored session. Logging in...");
                self.login_and_save(credentials).await
            }
            Err(e) => {
                println!("Stored session rejected ({}). Logging in fresh...", e);
                self.store.clear()?;
                self.login_and_save(credentials).await
            }
        }
    }

    /// Resume from the stored token pair and validate it with a profile
    /// fetch. `Ok(None)` means nothing is stored; any error means the
    /// stored session is unusable.
    async fn try_resume(&self) -> Result<Option<ApiSession>> {
        let (oauth1, mut oauth2) = match self.store.load_pair()? {
            Some(pair) => pair,
            None => return Ok(None),
        };

        if oauth2.is_expired() {
            println!("Refreshing access token...");
            let sso = SsoClient::new(Some(&oauth1.domain))?;
            oauth2 = sso.refresh_oauth2(&oauth1).await?;
            self.store.save_oauth2(&oauth2)?;
        }

        let session = self.session_for(&oauth1, oauth2).await?;
        println!("Resumed session as {}.", session.display_name());
        Ok(Some(session))
    }

    async fn login_and_save(&self, credentials: &Credentials) -> Result<ApiSession> {
        let mut sso = SsoClient::new(None)?;
        let (oauth1, oauth2) = sso
            .login(&credentials.email, &credentials.password, Some(prompt_mfa))
            .await?;

        self.store.save_pair(&oauth1, &oauth2)?;

        let session = self.session_for(&oauth1, oauth2).await?;
        println!("Logged in as {}.", session.display_name());
        Ok(session)
    }

    async fn session_for(&self, oauth1: &OAuth1Token, oauth2: OAuth2Token) -> Result<ApiSession> {
        let client = ApiClient::new(&oauth1.domain)?;
        let display_name = fetch_display_name(&client, &oauth2).await?;
        Ok(ApiSession::new(client, oauth2, display_name))
    }
}

/// Prompt for an MFA code on stdin.
fn prompt_mfa() -> String {
    print!("MFA code: ");
    let _ = io::stdout().flush();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return String::new();
    }
    input.trim().to_string()
}
