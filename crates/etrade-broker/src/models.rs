use broker_trait::{ProviderError, TokenGrant};
use std::collections::HashMap;

/// Decode an `application/x-www-form-urlencoded` body.
pub fn parse_form_body(body: &str) -> HashMap<String, String> {
    body.trim()
        .split('&')
        .filter_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            let k = urlencoding::decode(&k.replace('+', " ")).ok()?.into_owned();
            let v = urlencoding::decode(&v.replace('+', " ")).ok()?.into_owned();
            Some((k, v))
        })
        .collect()
}

/// `oauth_token` / `oauth_token_secret` pair from either handshake step.
#[derive(Debug, Clone, PartialEq)]
pub struct OAuth1Token {
    pub token: String,
    pub secret: String,
}

impl OAuth1Token {
    pub fn from_form(body: &str) -> Result<Self, ProviderError> {
        let mut fields = parse_form_body(body);
        let token = fields
            .remove("oauth_token")
            .ok_or_else(|| ProviderError::Malformed("response has no oauth_token".into()))?;
        let secret = fields
            .remove("oauth_token_secret")
            .ok_or_else(|| ProviderError::Malformed("response has no oauth_token_secret".into()))?;
        Ok(Self { token, secret })
    }
}

impl From<OAuth1Token> for TokenGrant {
    fn from(t: OAuth1Token) -> Self {
        TokenGrant {
            access_token: t.token,
            refresh_token: None,
            token_secret: Some(t.secret),
            expires_in: None,
        }
    }
}
