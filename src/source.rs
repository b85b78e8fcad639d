//! The message-source seam.
//!
//! Refresh logic talks to a [`MessageSource`] rather than to Gmail
//! directly, so the fetch-extract-merge pipeline can run against an
//! in-memory source in tests. [`GmailSource`] is the production
//! implementation, built per account from that account's token file.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::google::{self, gmail, GoogleApiError};

/// Half-open or closed date window for a search, in calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Whether the range's `end` date itself is searched.
///
/// Gmail's `before:` operator is exclusive, so `Exclusive` passes the end
/// date through unchanged and `Inclusive` widens it by one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndBound {
    #[default]
    Exclusive,
    Inclusive,
}

/// One PDF attachment from a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A fetched message, reduced to what the extractors consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    /// Raw `Date` header when the message carried one.
    pub date_header: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// A queryable mailbox.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Message handles matching a subject filter for one account within a
    /// date window.
    async fn search(
        &self,
        account: &str,
        subject: &str,
        range: DateRange,
    ) -> Result<Vec<String>, GoogleApiError>;

    /// Fetch one message by handle.
    async fn fetch(&self, handle: &str) -> Result<MailMessage, GoogleApiError>;
}

/// Gmail-backed [`MessageSource`] for one account.
pub struct GmailSource {
    token_file: PathBuf,
    end_bound: EndBound,
}

impl GmailSource {
    pub fn new(token_file: PathBuf, end_bound: EndBound) -> Self {
        Self {
            token_file,
            end_bound,
        }
    }

    fn build_query(&self, account: &str, subject: &str, range: DateRange) -> String {
        let end = match self.end_bound {
            EndBound::Exclusive => range.end,
            EndBound::Inclusive => range.end + chrono::Duration::days(1),
        };
        format!(
            "subject:\"{}\" to:{} after:{} before:{}",
            subject,
            account,
            local_midnight_epoch(range.start),
            local_midnight_epoch(end),
        )
    }
}

/// Epoch seconds of local midnight on `date`. Gmail interprets bare
/// `after:`/`before:` epochs in the searcher's local time, so the window
/// edges use the local zone too.
fn local_midnight_epoch(date: NaiveDate) -> i64 {
    let midnight = date.and_hms_opt(0, 0, 0).unwrap_or_default();
    midnight
        .and_local_timezone(chrono::Local)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| midnight.and_utc().timestamp())
}

#[async_trait]
impl MessageSource for GmailSource {
    async fn search(
        &self,
        account: &str,
        subject: &str,
        range: DateRange,
    ) -> Result<Vec<String>, GoogleApiError> {
        let access_token = google::get_valid_access_token(&self.token_file).await?;
        let query = self.build_query(account, subject, range);
        log::debug!("gmail search for {}: {}", account, query);
        gmail::search_messages(&access_token, &query).await
    }

    async fn fetch(&self, handle: &str) -> Result<MailMessage, GoogleApiError> {
        let access_token = google::get_valid_access_token(&self.token_file).await?;
        let email = gmail::fetch_statement(&access_token, handle).await?;
        Ok(MailMessage {
            id: email.id,
            subject: email.subject,
            date_header: email.date,
            html_body: email.html_body,
            attachments: email
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    data: a.data,
                })
                .collect(),
        })
    }
}
