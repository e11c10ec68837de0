//! Access token port.

use std::fmt;

use async_trait::async_trait;

use crate::errors::TokenError;

/// Supplies the token sent with every request.
///
/// Session management (login, refresh, revocation) lives behind this trait.
#[async_trait]
pub trait AccessTokenSource: Send + Sync + fmt::Debug {
    /// Returns a currently valid access token.
    async fn access_token(&self) -> Result<String, TokenError>;
}

/// A fixed token, e.g. read once from the environment.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, TokenError> {
        if self.0.is_empty() {
            return Err(TokenError::new("the configured token is empty"));
        }
        Ok(self.0.clone())
    }
}
