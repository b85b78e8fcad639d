//! Gemini-backed [`DocumentSummarizer`].
//!
//! Uses the plain `generateContent` REST endpoint. The document text is
//! inlined into the prompt ahead of each question; the caller owns pacing
//! and caching.

use async_trait::async_trait;
use serde::Deserialize;

use super::{DocumentSummarizer, SummarizeError};
use crate::google::{send_with_retry, GoogleApiError, RetryPolicy};

const DEFAULT_MODEL: &str = "gemini-1.5-flash";

pub struct GeminiSummarizer {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiSummarizer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        )
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

fn first_text(resp: GenerateContentResponse) -> Option<String> {
    resp.candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .find_map(|part| part.text)
}

#[async_trait]
impl DocumentSummarizer for GeminiSummarizer {
    async fn answer(&self, document: &str, question: &str) -> Result<String, SummarizeError> {
        let prompt = format!(
            "Answer the question using only the statement below. \
             Reply with the value alone.\n\nStatement:\n{document}\n\nQuestion: {question}"
        );
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let resp = send_with_retry(
            self.client
                .post(self.endpoint())
                .query(&[("key", self.api_key.as_str())])
                .json(&body),
            &RetryPolicy::default(),
        )
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(SummarizeError::Api(GoogleApiError::ApiError {
                status: status.as_u16(),
                message,
            }));
        }

        let parsed: GenerateContentResponse =
            resp.json().await.map_err(GoogleApiError::Http)?;
        first_text(parsed)
            .map(|text| text.trim().to_string())
            .ok_or(SummarizeError::EmptyResponse)
    }
}
