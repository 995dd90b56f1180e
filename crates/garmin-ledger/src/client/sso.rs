//! Garmin SSO authentication.
//!
//! Drives the embedded sign-in widget to a service ticket, then exchanges
//! the ticket for an OAuth1 token and that for an OAuth2 bearer.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use reqwest::cookie::Jar;
use reqwest::header::{CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::Client;

use crate::client::oauth1::{self, Consumer, TokenSecrets};
use crate::client::tokens::{OAuth1Token, OAuth2Token};
use crate::error::{LedgerError, Result};

/// Default Garmin domain
const DEFAULT_DOMAIN: &str = "garmin.com";

/// User agent mimicking the Garmin mobile app
const MOBILE_USER_AGENT: &str = "com.garmin.android.apps.connectmobile";

/// User agent for the embedded sign-in pages
const WIDGET_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

/// URL serving the shared OAuth consumer credentials
const OAUTH_CONSUMER_URL: &str = "https://thegarth.s3.amazonaws.com/oauth_consumer.json";

/// Outcome of submitting the sign-in form.
enum LoginStep {
    Ticket(String),
    MfaChallenge,
}

/// SSO client holding the sign-in cookie session.
pub struct SsoClient {
    client: Client,
    domain: String,
    last_url: Option<String>,
}

impl SsoClient {
    pub fn new(domain: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .cookie_provider(Arc::new(Jar::default()))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(LedgerError::Http)?;

        Ok(Self {
            client,
            domain: domain.unwrap_or(DEFAULT_DOMAIN).to_string(),
            last_url: None,
        })
    }

    /// Perform the full login flow. `mfa_prompt` is invoked only when the
    /// account challenges with MFA; `None` turns that challenge into
    /// [`LedgerError::MfaRequired`].
    pub async fn login(
        &mut self,
        email: &str,
        password: &str,
        mfa_prompt: Option<impl FnOnce() -> String>,
    ) -> Result<(OAuth1Token, OAuth2Token)> {
        let consumer = self.fetch_consumer().await?;

        let csrf_token = self.init_session_and_get_csrf().await?;

        let ticket = match self.submit_login(email, password, &csrf_token).await? {
            LoginStep::Ticket(ticket) => ticket,
            LoginStep::MfaChallenge => {
                let code = mfa_prompt.ok_or(LedgerError::MfaRequired)?();
                self.submit_mfa(&code, &csrf_token).await?
            }
        };

        let oauth1 = self.fetch_oauth1_token(&consumer, &ticket).await?;
        let oauth2 = exchange_for_oauth2(&consumer, &oauth1).await?;

        Ok((oauth1, oauth2))
    }

    /// Mint a fresh OAuth2 bearer from a stored OAuth1 token.
    pub async fn refresh_oauth2(&self, oauth1: &OAuth1Token) -> Result<OAuth2Token> {
        let consumer = self.fetch_consumer().await?;
        exchange_for_oauth2(&consumer, oauth1).await
    }

    fn sso_base(&self) -> String {
        format!("https://sso.{}/sso", self.domain)
    }

    /// Query parameters every embedded-widget request carries.
    fn widget_params(&self) -> Vec<(&'static str, String)> {
        let sso_embed = format!("{}/embed", self.sso_base());
        vec![
            ("id", "gauth-widget".to_string()),
            ("embedWidget", "true".to_string()),
            ("gauthHost", sso_embed.clone()),
            ("service", sso_embed.clone()),
            ("source", sso_embed.clone()),
            ("redirectAfterAccountLoginUrl", sso_embed.clone()),
            ("redirectAfterAccountCreationUrl", sso_embed),
        ]
    }

    /// Prime the cookie session, then pull the CSRF token off the sign-in page.
    async fn init_session_and_get_csrf(&mut self) -> Result<String> {
        let sso_base = self.sso_base();
        let sso_embed = format!("{}/embed", sso_base);

        // First request sets cookies; gauthHost points at the bare SSO host here.
        let embed_params = [
            ("id", "gauth-widget"),
            ("embedWidget", "true"),
            ("gauthHost", sso_base.as_str()),
        ];
        let resp = self
            .client
            .get(&sso_embed)
            .query(&embed_params)
            .header(USER_AGENT, WIDGET_USER_AGENT)
            .send()
            .await
            .map_err(LedgerError::Http)?;
        resp.text().await.ok();

        let signin_url = format!("{}/signin", sso_base);
        let response = self
            .client
            .get(&signin_url)
            .query(&self.widget_params())
            .header(USER_AGENT, WIDGET_USER_AGENT)
            .send()
            .await
            .map_err(LedgerError::Http)?;

        self.last_url = Some(response.url().to_string());
        let html = response.text().await.map_err(LedgerError::Http)?;

        extract_csrf_token(&html)
    }

    async fn submit_login(
        &mut self,
        email: &str,
        password: &str,
        csrf_token: &str,
    ) -> Result<LoginStep> {
        let signin_url = format!("{}/signin", self.sso_base());
        let form = [
            ("username", email),
            ("password", password),
            ("embed", "true"),
            ("_csrf", csrf_token),
        ];

        let mut request = self
            .client
            .post(&signin_url)
            .query(&self.widget_params())
            .header(USER_AGENT, WIDGET_USER_AGENT)
            .form(&form);
        if let Some(ref referer) = self.last_url {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await.map_err(LedgerError::Http)?;
        self.last_url = Some(response.url().to_string());
        let html = response.text().await.map_err(LedgerError::Http)?;

        let title = extract_title(&html)?;
        if title.contains("MFA") {
            Ok(LoginStep::MfaChallenge)
        } else if title == "Success" {
            Ok(LoginStep::Ticket(extract_ticket(&html)?))
        } else {
            Err(LedgerError::auth(format!(
                "Unexpected login response: {}",
                title
            )))
        }
    }

    async fn submit_mfa(&mut self, mfa_code: &str, csrf_token: &str) -> Result<String> {
        let mfa_url = format!("{}/verifyMFA/loginEnterMfaCode", self.sso_base());
        let form = [
            ("mfa-code", mfa_code),
            ("embed", "true"),
            ("_csrf", csrf_token),
            ("fromPage", "setupEnterMfaCode"),
        ];

        let mut request = self
            .client
            .post(&mfa_url)
            .query(&self.widget_params())
            .header(USER_AGENT, WIDGET_USER_AGENT)
            .form(&form);
        if let Some(ref referer) = self.last_url {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request.send().await.map_err(LedgerError::Http)?;
        let html = response.text().await.map_err(LedgerError::Http)?;

        let title = extract_title(&html)?;
        if title == "Success" {
            extract_ticket(&html)
        } else {
            Err(LedgerError::auth(format!(
                "MFA verification failed: {}",
                title
            )))
        }
    }

    /// Trade the SSO ticket for an OAuth1 token.
    async fn fetch_oauth1_token(&self, consumer: &Consumer, ticket: &str) -> Result<OAuth1Token> {
        let url = format!(
            "https://connectapi.{domain}/oauth-service/oauth/preauthorized\
             ?ticket={ticket}&login-url=https://sso.{domain}/sso/embed&accepts-mfa-tokens=true",
            domain = self.domain,
            ticket = ticket,
        );

        let auth_header = oauth1::authorization_header(consumer, None, "GET", &url, &[])?;

        // The token endpoints run on a bare session, separate from the SSO cookies.
        let response = bare_client()?
            .get(&url)
            .header(USER_AGENT, MOBILE_USER_AGENT)
            .header("Authorization", auth_header)
            .send()
            .await
            .map_err(LedgerError::Http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::auth(format!(
                "Failed to get OAuth1 token: {}",
                status
            )));
        }

        let body = response.text().await.map_err(LedgerError::Http)?;
        let params = oauth1::parse_urlencoded_body(&body);

        let oauth_token = params
            .get("oauth_token")
            .ok_or_else(|| LedgerError::invalid_response("Missing oauth_token"))?
            .clone();
        let oauth_token_secret = params
            .get("oauth_token_secret")
            .ok_or_else(|| LedgerError::invalid_response("Missing oauth_token_secret"))?
            .clone();

        Ok(OAuth1Token {
            oauth_token,
            oauth_token_secret,
            mfa_token: params.get("mfa_token").cloned(),
            domain: self.domain.clone(),
        })
    }

    async fn fetch_consumer(&self) -> Result<Consumer> {
        let response = self
            .client
            .get(OAUTH_CONSUMER_URL)
            .send()
            .await
            .map_err(LedgerError::Http)?;

        response.json().await.map_err(|e| {
            LedgerError::invalid_response(format!("Failed to parse OAuth consumer: {}", e))
        })
    }
}

/// Exchange an OAuth1 token for an OAuth2 bearer against the domain the
/// OAuth1 token was issued for.
async fn exchange_for_oauth2(consumer: &Consumer, oauth1: &OAuth1Token) -> Result<OAuth2Token> {
    let url = format!(
        "https://connectapi.{}/oauth-service/oauth/exchange/user/2.0",
        oauth1.domain
    );

    let form: Vec<(String, String)> = match oauth1.mfa_token {
        Some(ref mfa) => vec![("mfa_token".to_string(), mfa.clone())],
        None => vec![],
    };

    let auth_header = oauth1::authorization_header(
        consumer,
        Some(TokenSecrets {
            token: &oauth1.oauth_token,
            secret: &oauth1.oauth_token_secret,
        }),
        "POST",
        &url,
        &form,
    )?;

    let mut request = bare_client()?
        .post(&url)
        .header(USER_AGENT, MOBILE_USER_AGENT)
        .header("Authorization", auth_header)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if !form.is_empty() {
        request = request.form(&form);
    }

    let response = request.send().await.map_err(LedgerError::Http)?;

    let status = response.status();
    if !status.is_success() {
        return Err(LedgerError::auth(format!(
            "Failed to exchange OAuth1 for OAuth2: {}",
            status
        )));
    }

    let mut token: OAuth2Token = response.json().await.map_err(|e| {
        LedgerError::invalid_response(format!("Failed to parse OAuth2 token: {}", e))
    })?;
    token.stamp_expiry();

    Ok(token)
}

/// Cookieless client for the OAuth token endpoints.
fn bare_client() -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .map_err(LedgerError::Http)
}

fn capture_first(pattern: &str, html: &str) -> Option<String> {
    let re = Regex::new(pattern).unwrap();
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_csrf_token(html: &str) -> Result<String> {
    capture_first(r#"name="_csrf"\s+value="([^"]+)""#, html)
        .ok_or_else(|| LedgerError::invalid_response("Could not find CSRF token"))
}

fn extract_title(html: &str) -> Result<String> {
    capture_first(r"<title>([^<]+)</title>", html)
        .ok_or_else(|| LedgerError::invalid_response("Could not find page title"))
}

fn extract_ticket(html: &str) -> Result<String> {
    capture_first(r#"embed\?ticket=([^"]+)""#, html)
        .ok_or_else(|| LedgerError::invalid_response("Could not find ticket in response"))
}
