//! Authentication-token lifecycle: acquire, use, detect expiry, refresh.

mod refresh;
mod token;

pub use refresh::{OAuthRefresher, RefreshError, TokenGrant, TokenRefresher};
pub use token::{Bearer, TokenState, TokenStore};
