// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Microsoft Graph mailbox client backed by the Outlook token silo.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

use crate::error::{AuthError, Result};
use crate::models::mail::GraphPage;
use crate::models::{MailMessage, MailSummary, Recipient};
use crate::services::auth::AuthService;

const SUMMARY_FIELDS: &str =
    "id,subject,from,bodyPreview,receivedDateTime,isRead,hasAttachments";
const DEFAULT_SUBJECT: &str = "Email from To-do Desktop App";

/// Graph `/me` mail operations.
#[derive(Clone)]
pub struct GraphMailClient {
    http: reqwest::Client,
    base_url: String,
    auth: Arc<AuthService>,
}

impl GraphMailClient {
    pub fn new(auth: Arc<AuthService>) -> Result<Self> {
        let config = auth.config();
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed building HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.graph_api_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    /// Newest-first page of inbox messages.
    pub async fn list_inbox(&self, top: u32, skip: u32) -> Result<Vec<MailSummary>> {
        let url = format!("{}/me/messages", self.base_url);
        let top = top.to_string();
        let skip = skip.to_string();
        let query = [
            ("$top", top.as_str()),
            ("$skip", skip.as_str()),
            ("$select", SUMMARY_FIELDS),
            ("$orderby", "receivedDateTime desc"),
        ];

        let page: GraphPage<MailSummary> = self.get_json(&url, &query).await?;
        Ok(page.value)
    }

    /// Full message, including its body and attachment metadata.
    pub async fn get_message(&self, id: &str) -> Result<MailMessage> {
        let url = self.message_url(id, None);
        self.get_json(&url, &[("$expand", "attachments")]).await
    }

    /// Send an HTML message, keeping a copy in Sent Items.
    pub async fn send_mail(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let subject = if subject.trim().is_empty() {
            DEFAULT_SUBJECT
        } else {
            subject
        };
        let payload = json!({
            "message": {
                "subject": subject,
                "body": { "contentType": "HTML", "content": body },
                "toRecipients": [Recipient::new(to)],
            },
            "saveToSentItems": true,
        });

        let url = format!("{}/me/sendMail", self.base_url);
        self.execute(Method::POST, &url, Some(&payload)).await?;
        tracing::info!("Mail sent");
        Ok(())
    }

    pub async fn reply(&self, id: &str, comment: &str) -> Result<()> {
        let url = self.message_url(id, Some("reply"));
        self.execute(Method::POST, &url, Some(&json!({ "comment": comment })))
            .await?;
        Ok(())
    }

    pub async fn forward(&self, id: &str, to: &[&str], comment: &str) -> Result<()> {
        let recipients: Vec<Recipient> = to.iter().map(|addr| Recipient::new(*addr)).collect();
        let url = self.message_url(id, Some("forward"));
        self.execute(
            Method::POST,
            &url,
            Some(&json!({ "comment": comment, "toRecipients": recipients })),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_message(&self, id: &str) -> Result<()> {
        let url = self.message_url(id, None);
        self.execute(Method::DELETE, &url, None).await?;
        Ok(())
    }

    fn message_url(&self, id: &str, action: Option<&str>) -> String {
        let base = format!("{}/me/messages/{}", self.base_url, urlencoding::encode(id));
        match action {
            Some(action) => format!("{}/{}", base, action),
            None => base,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let token = self.auth.get_valid_access_token().await?;
        let response = self
            .http
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await
            .map_err(AuthError::from_transport)?;

        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("unexpected Graph response: {}", e)))
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response> {
        let token = self.auth.get_valid_access_token().await?;
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(AuthError::from_transport)?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            // Revoked or rotated server-side; force a reload next time.
            self.auth.invalidate_cached_token().await;
        }

        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %body, "Graph API request failed");
        Err(AuthError::GraphApi {
            status: status.as_u16(),
            body,
        })
    }
}
