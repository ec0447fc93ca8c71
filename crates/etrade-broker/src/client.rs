use crate::models::OAuth1Token;
use crate::signing::{OAuth1Signer, TokenPair};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broker_trait::{
    ensure_success, Authorization, CallbackParams, FlowKind, OAuthProvider, PendingAuthorization,
    Provider, ProviderError, TokenGrant,
};
use reqwest::{header::AUTHORIZATION, Client};
use std::time::Duration;

const SANDBOX_BASE: &str = "https://apisb.etrade.com";
const LIVE_BASE: &str = "https://api.etrade.com";
const AUTHORIZE_URL: &str = "https://us.etrade.com/e/t/etws/authorize";

#[derive(Debug, Clone)]
pub struct EtradeConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub sandbox: bool,
}

impl EtradeConfig {
    pub fn from_env() -> Result<Self> {
        let consumer_key = std::env::var("ETRADE_CONSUMER_KEY")
            .map_err(|_| anyhow!("ETRADE_CONSUMER_KEY not set"))?;
        let consumer_secret = std::env::var("ETRADE_CONSUMER_SECRET")
            .map_err(|_| anyhow!("ETRADE_CONSUMER_SECRET not set"))?;
        let sandbox = std::env::var("ETRADE_SANDBOX")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Ok(Self {
            consumer_key,
            consumer_secret,
            sandbox,
        })
    }

    pub fn api_base_url(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_BASE
        } else {
            LIVE_BASE
        }
    }
}

/// E*TRADE client for the three-legged OAuth1 handshake.
pub struct EtradeClient {
    client: Client,
    signer: OAuth1Signer,
    base_url: String,
}

impl EtradeClient {
    pub fn new(config: EtradeConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url().to_string(),
            signer: OAuth1Signer::new(config.consumer_key, config.consumer_secret),
        })
    }

    pub fn from_env() -> Result<Self> {
        let config = EtradeConfig::from_env()?;
        tracing::info!(sandbox = config.sandbox, "E*TRADE client configured");
        Self::new(config)
    }

    /// Where the user approves the request token.
    pub fn authorize_url(&self, request_token: &str) -> String {
        format!(
            "{}?key={}&token={}",
            AUTHORIZE_URL,
            urlencoding::encode(self.signer.consumer_key()),
            urlencoding::encode(request_token)
        )
    }

    /// Step 1: obtain a request token (out-of-band callback).
    pub async fn get_request_token(&self) -> Result<OAuth1Token, ProviderError> {
        let url = format!("{}/oauth/request_token", self.base_url);
        let header = self
            .signer
            .authorization_header("GET", &url, None, &[("oauth_callback", "oob")])?;

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, header)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        OAuth1Token::from_form(&response.text().await?)
    }

    /// Step 3: trade the authorized request token and verifier for an access token.
    pub async fn get_access_token(
        &self,
        request_token: &str,
        request_token_secret: &str,
        verifier: &str,
    ) -> Result<OAuth1Token, ProviderError> {
        let url = format!("{}/oauth/access_token", self.base_url);
        let header = self.signer.authorization_header(
            "GET",
            &url,
            Some(TokenPair {
                token: request_token,
                secret: request_token_secret,
            }),
            &[("oauth_verifier", verifier)],
        )?;

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, header)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        OAuth1Token::from_form(&response.text().await?)
    }
}

#[async_trait]
impl OAuthProvider for EtradeClient {
    fn provider(&self) -> Provider {
        Provider::Etrade
    }

    fn flow(&self) -> FlowKind {
        FlowKind::OAuth1ThreeLegged
    }

    async fn begin(&self, state: &str) -> Result<Authorization, ProviderError> {
        let request = self.get_request_token().await?;
        tracing::info!("Obtained E*TRADE request token");

        Ok(Authorization {
            redirect_url: Some(self.authorize_url(&request.token)),
            pending: PendingAuthorization {
                state: Some(state.to_string()),
                request_token: Some(request.token),
                request_token_secret: Some(request.secret),
            },
        })
    }

    async fn exchange(
        &self,
        params: &CallbackParams,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError> {
        let verifier = params
            .oauth_verifier
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or(ProviderError::MissingParameter("oauth_verifier"))?;

        let (token, secret) = match (&pending.request_token, &pending.request_token_secret) {
            (Some(t), Some(s)) => (t.as_str(), s.as_str()),
            _ => return Err(ProviderError::MissingParameter("request_token")),
        };

        if let Some(returned) = params.oauth_token.as_deref() {
            if returned != token {
                return Err(ProviderError::StateMismatch);
            }
        }

        let access = self.get_access_token(token, secret, verifier).await?;
        Ok(access.into())
    }
}
