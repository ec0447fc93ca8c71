use crate::models::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broker_trait::{
    ensure_success, Authorization, CallbackParams, FlowKind, OAuthProvider, PendingAuthorization,
    Provider, ProviderError, TokenGrant,
};
use reqwest::Client;
use std::time::Duration;

const API_VERSION: &str = "1.1";
const SANDBOX_API_URL: &str = "https://sandbox.api.yodlee.com/ysl";
/// Pre-provisioned sandbox user; FastLink testing only works with these.
const SANDBOX_LOGIN_NAME: &str = "sbMem6v8nce94w58b61";

#[derive(Debug, Clone)]
pub struct YodleeConfig {
    pub api_url: String,
    pub client_id: String,
    pub secret: String,
    pub login_name: String,
}

impl YodleeConfig {
    pub fn from_env() -> Result<Self> {
        let client_id =
            std::env::var("YODLEE_CLIENT_ID").map_err(|_| anyhow!("YODLEE_CLIENT_ID not set"))?;
        let secret = std::env::var("YODLEE_SECRET").map_err(|_| anyhow!("YODLEE_SECRET not set"))?;
        let api_url =
            std::env::var("YODLEE_API_URL").unwrap_or_else(|_| SANDBOX_API_URL.to_string());
        let login_name =
            std::env::var("YODLEE_LOGIN_NAME").unwrap_or_else(|_| SANDBOX_LOGIN_NAME.to_string());

        Ok(Self {
            api_url,
            client_id,
            secret,
            login_name,
        })
    }
}

pub struct YodleeClient {
    client: Client,
    config: YodleeConfig,
}

impl YodleeClient {
    pub fn new(config: YodleeConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(YodleeConfig::from_env()?)
    }

    /// Client-credentials token scoped to the configured login name.
    pub async fn get_fastlink_token(&self) -> Result<TokenGrant, ProviderError> {
        let url = format!("{}/auth/token", self.config.api_url.trim_end_matches('/'));
        tracing::info!(login_name = %self.config.login_name, "Requesting Yodlee FastLink token");

        let response = self
            .client
            .post(&url)
            .header("Api-Version", API_VERSION)
            .header("loginName", &self.config.login_name)
            .form(&[
                ("clientId", self.config.client_id.as_str()),
                ("secret", self.config.secret.as_str()),
            ])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let envelope = response.json::<TokenEnvelope>().await?;
        envelope
            .into_grant()
            .ok_or_else(|| ProviderError::Malformed("token.accessToken missing".into()))
    }

    /// Accounts the user linked through FastLink.
    pub async fn get_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<LinkedAccount>, ProviderError> {
        let url = format!("{}/accounts", self.config.api_url.trim_end_matches('/'));

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .header("Api-Version", API_VERSION)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let envelope = response.json::<AccountsEnvelope>().await?;
        Ok(envelope.account.into_iter().map(LinkedAccount::from).collect())
    }
}

#[async_trait]
impl OAuthProvider for YodleeClient {
    fn provider(&self) -> Provider {
        Provider::Yodlee
    }

    fn flow(&self) -> FlowKind {
        FlowKind::ClientCredentials
    }

    /// No user redirect: the token is minted server-side and handed to FastLink.
    async fn begin(&self, _state: &str) -> Result<Authorization, ProviderError> {
        Ok(Authorization {
            redirect_url: None,
            pending: PendingAuthorization::default(),
        })
    }

    async fn exchange(
        &self,
        _params: &CallbackParams,
        _pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError> {
        self.get_fastlink_token().await
    }
}
