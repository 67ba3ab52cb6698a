//! Mail client for the aggregated digest.
//!
//! Endpoints:
//! - POST {login}/{tenant}/oauth2/v2.0/token    client-credentials token
//! - POST {graph}/users/{from}/sendMail         HTML mail delivery
//!
//! Auth: OAuth2 client credentials; Graph calls carry a Bearer token.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::MailSettings;

/// Graph mail client
pub struct MailClient {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    login_base_url: String,
    graph_base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl MailClient {
    /// Create a new client
    pub fn new(
        tenant_id: String,
        client_id: String,
        client_secret: String,
        login_base_url: String,
        graph_base_url: String,
    ) -> Self {
        Self {
            tenant_id,
            client_id,
            client_secret,
            login_base_url,
            graph_base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create from resolved settings
    pub fn from_settings(settings: &MailSettings) -> Self {
        Self::new(
            settings.tenant_id.clone(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
            settings.login_base_url.clone(),
            settings.graph_base_url.clone(),
        )
    }

    /// Acquire an app-only access token via client credentials.
    async fn acquire_token(&self) -> Result<String> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url, self.tenant_id
        );
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", "https://graph.microsoft.com/.default"),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to request mail access token")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Mail token error ({}): {}", status, text);
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("Failed to parse token response")?;
        Ok(token.access_token)
    }

    /// Send one HTML message from the given mailbox.
    pub async fn send_html(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()> {
        let token = self.acquire_token().await?;
        let url = format!("{}/users/{}/sendMail", self.graph_base_url, from);
        let payload = serde_json::json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": html },
                "toRecipients": [
                    { "emailAddress": { "address": to } }
                ],
            },
            "saveToSentItems": true,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&payload)
            .send()
            .await
            .context("Failed to send digest mail")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Mail send error ({}): {}", status, text);
        }
        Ok(())
    }
}
