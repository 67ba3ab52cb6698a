//! Helpdesk REST client for voice tickets.
//!
//! Endpoints:
//! - GET  /search.json                     ticket search with pagination
//! - GET  /tickets/{id}/comments.json      comment stream with call metadata
//! - POST /uploads.json                    attachment upload, yields a token
//! - PUT  /tickets/{id}                    private comment with attachment
//!
//! Auth: HTTP basic with the `{email}/token` username form.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::config::HelpdeskSettings;
use crate::domain::DayWindow;

/// How ticket search reacts to a failed results page.
///
/// Nightly runs keep the `SkipOnError` default, so a truncated window
/// surfaces only as a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationPolicy {
    /// Keep results gathered so far and warn
    #[default]
    SkipOnError,
    /// Fail the whole search
    Strict,
}

/// Helpdesk REST client
pub struct HelpdeskClient {
    base_url: String,
    email: String,
    api_token: String,
    client: reqwest::Client,
}

/// One page of search results
#[derive(Debug, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub next_page: Option<String>,
}

/// One ticket in a search result page
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    pub id: u64,
}

/// Comment stream for one ticket
#[derive(Debug, Default, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Comment {
    /// Call metadata, present on voice comments
    #[serde(default)]
    pub data: Option<CallData>,
    #[serde(default)]
    pub via: Option<Via>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallData {
    #[serde(default)]
    pub recording_url: Option<String>,
    #[serde(default)]
    pub answered_by_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Via {
    #[serde(default)]
    pub source: Option<CallSource>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallSource {
    #[serde(default)]
    pub from: Option<CallParty>,
    #[serde(default)]
    pub to: Option<CallParty>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CallParty {
    #[serde(default)]
    pub name: Option<String>,
}

/// First recording found in a ticket's comment stream
#[derive(Debug, Clone)]
pub struct RecordingComment {
    pub recording_url: String,
    /// Caller name from the voice comment
    pub from_name: Option<String>,
    /// Counterparty name, used when the caller is the account itself
    pub to_name: Option<String>,
    /// Agent who answered the call
    pub answered_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload: UploadToken,
}

#[derive(Debug, Deserialize)]
struct UploadToken {
    token: String,
}

impl HelpdeskClient {
    /// Create a new client
    pub fn new(base_url: String, email: String, api_token: String) -> Self {
        Self {
            base_url,
            email,
            api_token,
            client: reqwest::Client::new(),
        }
    }

    /// Create from resolved settings
    pub fn from_settings(settings: &HelpdeskSettings) -> Self {
        Self::new(
            settings.base_url.clone(),
            settings.email.clone(),
            settings.api_token.clone(),
        )
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// API tokens authenticate with the `{email}/token` username form.
    fn auth_user(&self) -> String {
        format!("{}/token", self.email)
    }

    /// Run a ticket search, following `next_page` links until exhausted.
    ///
    /// Each page is fetched exactly once. A failed page either ends the
    /// search with partial results or fails it, depending on `policy`.
    pub async fn search_tickets(
        &self,
        query: &str,
        sort_by: &str,
        policy: PaginationPolicy,
    ) -> Result<Vec<SearchResult>> {
        let mut results = Vec::new();
        let mut pages = 0usize;
        let mut next: Option<String> = None;

        loop {
            let page = match next {
                None => self.first_search_page(query, sort_by).await,
                Some(ref url) => self.search_page_at(url).await,
            };
            let page = match page {
                Ok(page) => page,
                Err(e) => match policy {
                    PaginationPolicy::Strict => return Err(e),
                    PaginationPolicy::SkipOnError => {
                        warn!(
                            error = %e,
                            pages,
                            "Search pagination stopped early; keeping partial results"
                        );
                        break;
                    }
                },
            };

            pages += 1;
            results.extend(page.results);
            match page.next_page {
                Some(url) => next = Some(url),
                None => break,
            }
        }

        Ok(results)
    }

    async fn first_search_page(&self, query: &str, sort_by: &str) -> Result<SearchPage> {
        let response = self
            .client
            .get(self.api_url("/search.json"))
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .query(&[("query", query), ("sort_by", sort_by)])
            .send()
            .await
            .context("Failed to query helpdesk search")?;
        Self::parse_search_page(response).await
    }

    /// Fetch a `next_page` URL as returned by the API.
    async fn search_page_at(&self, url: &str) -> Result<SearchPage> {
        let response = self
            .client
            .get(url)
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .send()
            .await
            .context("Failed to fetch helpdesk search page")?;
        Self::parse_search_page(response).await
    }

    async fn parse_search_page(response: reqwest::Response) -> Result<SearchPage> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Helpdesk error ({}): {}", status, text);
        }
        response
            .json::<SearchPage>()
            .await
            .context("Failed to parse search results")
    }

    /// Find the first call recording in a ticket's comment stream.
    pub async fn first_recording(&self, ticket_id: u64) -> Result<Option<RecordingComment>> {
        let response = self
            .client
            .get(self.api_url(&format!("/tickets/{}/comments.json", ticket_id)))
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .send()
            .await
            .with_context(|| format!("Failed to fetch comments for ticket {}", ticket_id))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Helpdesk error ({}): {}", status, text);
        }

        let page: CommentPage = response
            .json()
            .await
            .with_context(|| format!("Failed to parse comments for ticket {}", ticket_id))?;
        Ok(extract_first_recording(page))
    }

    /// Stream a recording to disk.
    pub async fn download_recording(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .send()
            .await
            .with_context(|| format!("Failed to fetch recording: {}", url))?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Helpdesk error ({}) downloading recording: {}", status, url);
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Failed to read recording stream")?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))?;
        Ok(())
    }

    /// Upload a transcript as a plain-text attachment, returning the
    /// upload token to reference from a comment.
    pub async fn upload_transcript(&self, filename: &str, body: String) -> Result<String> {
        let response = self
            .client
            .post(self.api_url("/uploads.json"))
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await
            .context("Failed to upload transcript")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Helpdesk error ({}): {}", status, text);
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .context("Failed to parse upload response")?;
        Ok(parsed.upload.token)
    }

    /// Attach a private comment with the uploaded transcript to a ticket.
    pub async fn annotate_ticket(
        &self,
        ticket_id: u64,
        body: &str,
        upload_token: &str,
    ) -> Result<()> {
        let payload = serde_json::json!({
            "ticket": {
                "comment": {
                    "body": body,
                    "public": false,
                    "uploads": [upload_token],
                }
            }
        });

        let response = self
            .client
            .put(self.api_url(&format!("/tickets/{}", ticket_id)))
            .basic_auth(self.auth_user(), Some(&self.api_token))
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to update ticket {}", ticket_id))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Helpdesk error ({}): {}", status, text);
        }
        Ok(())
    }
}

/// Search query for voice tickets created inside a window.
pub fn created_in_window_query(window: &DayWindow) -> String {
    format!(
        "type:ticket created>{} created<{} via:voice",
        format_ts(window.start),
        format_ts(window.end)
    )
}

/// Search query for voice tickets updated inside a window.
pub fn updated_in_window_query(window: &DayWindow) -> String {
    format!(
        "type:ticket updated>{} updated<{} via:voice",
        format_ts(window.start),
        format_ts(window.end)
    )
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn extract_first_recording(page: CommentPage) -> Option<RecordingComment> {
    page.comments.into_iter().find_map(|comment| {
        let data = comment.data?;
        let recording_url = data.recording_url?;
        let (from_name, to_name) = match comment.via.and_then(|v| v.source) {
            Some(source) => (
                source.from.and_then(|p| p.name),
                source.to.and_then(|p| p.name),
            ),
            None => (None, None),
        };
        Some(RecordingComment {
            recording_url,
            from_name,
            to_name,
            answered_by: data.answered_by_name,
        })
    })
}
