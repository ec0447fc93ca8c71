use broker_trait::TokenGrant;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEnvelope {
    pub token: Option<UserToken>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserToken {
    pub access_token: Option<String>,
    pub issued_at: Option<String>,
    pub expires_in: Option<i64>,
}

impl TokenEnvelope {
    /// The FastLink token, if the response carried one.
    pub fn into_grant(self) -> Option<TokenGrant> {
        let token = self.token?;
        let access_token = token.access_token.filter(|t| !t.is_empty())?;
        Some(TokenGrant {
            access_token,
            refresh_token: None,
            token_secret: None,
            expires_in: token.expires_in,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountsEnvelope {
    #[serde(default)]
    pub account: Vec<YodleeAccount>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YodleeAccount {
    pub id: i64,
    pub account_name: Option<String>,
    pub account_type: Option<String>,
    pub provider_name: Option<String>,
    pub account_status: Option<String>,
    pub balance: Option<Money>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

/// Linked account as shown on the connection page.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LinkedAccount {
    pub id: i64,
    pub name: String,
    pub account_type: Option<String>,
    pub institution: Option<String>,
    pub status: Option<String>,
    pub balance: Option<Money>,
}

impl From<YodleeAccount> for LinkedAccount {
    fn from(a: YodleeAccount) -> Self {
        LinkedAccount {
            id: a.id,
            name: a.account_name.unwrap_or_else(|| format!("Account {}", a.id)),
            account_type: a.account_type,
            institution: a.provider_name,
            status: a.account_status,
            balance: a.balance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_token_envelope() {
        let env: TokenEnvelope = serde_json::from_value(serde_json::json!({
            "token": {"accessToken": "fl-123", "issuedAt": "2025-01-01T00:00:00Z", "expiresIn": 1800}
        }))
        .unwrap();
        let grant = env.into_grant().unwrap();
        assert_eq!(grant.access_token, "fl-123");
        assert_eq!(grant.expires_in, Some(1800));

        let empty: TokenEnvelope = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.into_grant().is_none());
    }

    #[test]
    fn test_accounts_envelope() {
        let env: AccountsEnvelope = serde_json::from_value(serde_json::json!({
            "account": [
                {"id": 10, "accountName": "Checking", "accountType": "CHECKING",
                 "providerName": "Dag Site", "balance": {"amount": 1250.5, "currency": "USD"}},
                {"id": 11}
            ]
        }))
        .unwrap();
        let accounts: Vec<LinkedAccount> = env.account.into_iter().map(Into::into).collect();
        assert_eq!(accounts[0].balance.as_ref().map(|b| b.amount), Some(dec!(1250.5)));
        assert_eq!(accounts[1].name, "Account 11");

        let none: AccountsEnvelope = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(none.account.is_empty());
    }
}
