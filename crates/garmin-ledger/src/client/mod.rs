pub mod api;
pub mod oauth1;
pub mod sso;
pub mod tokens;

pub use api::{ApiClient, ApiSession};
pub use sso::SsoClient;
pub use tokens::{OAuth1Token, OAuth2Token};
