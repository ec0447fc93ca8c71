use crate::models::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use broker_trait::{
    ensure_success, Authorization, BrokerClient, CallbackParams, FlowKind, Holding, Mover,
    MoverSort, OAuthProvider, PendingAuthorization, Provider, ProviderError, TokenGrant,
    Transaction,
};
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.schwabapi.com";
const TRANSACTION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, Clone)]
pub struct SchwabConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub api_base_url: String,
}

impl SchwabConfig {
    /// Read `SCHWAB_CLIENT_ID` / `SCHWAB_CLIENT_SECRET`; the callback URL
    /// defaults to `{public_base_url}/connect/schwab/callback`.
    pub fn from_env(public_base_url: &str) -> Result<Self> {
        let client_id =
            std::env::var("SCHWAB_CLIENT_ID").map_err(|_| anyhow!("SCHWAB_CLIENT_ID not set"))?;
        let client_secret = std::env::var("SCHWAB_CLIENT_SECRET")
            .map_err(|_| anyhow!("SCHWAB_CLIENT_SECRET not set"))?;
        let redirect_uri = std::env::var("SCHWAB_REDIRECT_URI").unwrap_or_else(|_| {
            format!("{}/connect/schwab/callback", public_base_url.trim_end_matches('/'))
        });
        let api_base_url =
            std::env::var("SCHWAB_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            api_base_url,
        })
    }
}

pub struct SchwabClient {
    client: Client,
    config: SchwabConfig,
}

impl SchwabClient {
    pub fn new(config: SchwabConfig) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self { client, config })
    }

    pub fn from_env(public_base_url: &str) -> Result<Self> {
        Self::new(SchwabConfig::from_env(public_base_url)?)
    }

    /// Build the authorization-code redirect URL
    pub fn authorize_url(&self, state: &str) -> Result<String, ProviderError> {
        let url = Url::parse_with_params(
            &format!("{}/v1/oauth/authorize", self.config.api_base_url),
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| ProviderError::NotConfigured(format!("invalid Schwab base URL: {}", e)))?;

        Ok(url.to_string())
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenGrant, ProviderError> {
        let url = format!("{}/v1/oauth/token", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(form)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let token = response.json::<TokenResponse>().await?;
        Ok(token.into())
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, ProviderError> {
        tracing::info!("Exchanging Schwab authorization code");
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    /// Trade a refresh token for a new access token
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenGrant, ProviderError> {
        let mut grant = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        // Schwab may omit the refresh token when it has not rotated
        if grant.refresh_token.is_none() {
            grant.refresh_token = Some(refresh_token.to_string());
        }
        Ok(grant)
    }

    /// Get all accounts with their positions
    pub async fn get_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccountEnvelope>, ProviderError> {
        let url = format!("{}/trader/v1/accounts", self.config.api_base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("fields", "positions")])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<AccountEnvelope>>().await?)
    }

    /// Get the account number / hash pairs
    pub async fn get_account_numbers(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccountNumber>, ProviderError> {
        let url = format!("{}/trader/v1/accounts/accountNumbers", self.config.api_base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<AccountNumber>>().await?)
    }

    /// Get transactions for an account hash in a date window
    pub async fn get_account_transactions(
        &self,
        access_token: &str,
        account_hash: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TransactionRecord>, ProviderError> {
        let url = format!(
            "{}/trader/v1/accounts/{}/transactions",
            self.config.api_base_url, account_hash
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("startDate", start.format(TRANSACTION_TIME_FORMAT).to_string()),
                ("endDate", end.format(TRANSACTION_TIME_FORMAT).to_string()),
            ])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Vec<TransactionRecord>>().await?)
    }

    /// Get market movers for an index symbol such as `$SPX.X`
    pub async fn get_index_movers(
        &self,
        access_token: &str,
        index: &str,
        sort: MoverSort,
    ) -> Result<MoversResponse, ProviderError> {
        let url = format!(
            "{}/marketdata/v1/movers/{}",
            self.config.api_base_url,
            urlencoding::encode(index)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("sort", sort.as_str()), ("frequency", "1")])
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<MoversResponse>().await?)
    }

    pub fn redirect_uri(&self) -> &str {
        &self.config.redirect_uri
    }
}

#[async_trait]
impl OAuthProvider for SchwabClient {
    fn provider(&self) -> Provider {
        Provider::Schwab
    }

    fn flow(&self) -> FlowKind {
        FlowKind::AuthorizationCode
    }

    async fn begin(&self, state: &str) -> Result<Authorization, ProviderError> {
        Ok(Authorization {
            redirect_url: Some(self.authorize_url(state)?),
            pending: PendingAuthorization {
                state: Some(state.to_string()),
                ..Default::default()
            },
        })
    }

    async fn exchange(
        &self,
        params: &CallbackParams,
        pending: &PendingAuthorization,
    ) -> Result<TokenGrant, ProviderError> {
        let code = params
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::MissingParameter("code"))?;

        // A pending state must come back unchanged
        if let Some(expected) = &pending.state {
            if params.state.as_ref() != Some(expected) {
                return Err(ProviderError::StateMismatch);
            }
        }

        self.exchange_code(code).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, ProviderError> {
        self.refresh_access_token(refresh_token).await
    }
}

#[async_trait]
impl BrokerClient for SchwabClient {
    async fn get_holdings(&self, access_token: &str) -> Result<Vec<Holding>, ProviderError> {
        let accounts = self.get_accounts(access_token).await?;
        Ok(first_account_holdings(accounts))
    }

    async fn get_transactions(
        &self,
        access_token: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Transaction>, ProviderError> {
        let numbers = self.get_account_numbers(access_token).await?;
        let account_hash = match numbers.into_iter().next().and_then(|n| n.hash_value) {
            Some(hash) => hash,
            None => return Ok(Vec::new()),
        };

        let records = self
            .get_account_transactions(access_token, &account_hash, start, end)
            .await?;
        Ok(records.into_iter().map(Transaction::from).collect())
    }

    async fn get_movers(
        &self,
        access_token: &str,
        index: &str,
        sort: MoverSort,
    ) -> Result<Vec<Mover>, ProviderError> {
        let response = self.get_index_movers(access_token, index, sort).await?;
        Ok(response.into_movers())
    }

    fn broker_name(&self) -> &str {
        "schwab"
    }
}
