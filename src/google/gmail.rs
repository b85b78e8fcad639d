//! Gmail API v1 — query-scoped statement retrieval.
//!
//! Lists messages matching a search query (with pagination), then fetches
//! each message with `format=full` to get the Date/Subject headers, the
//! decoded HTML body and any PDF attachments. Bodies arrive as URL-safe
//! base64; large attachments arrive as a separate `attachmentId` fetch.

use serde::Deserialize;

use super::{send_with_retry, GoogleApiError, RetryPolicy};

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDetail {
    #[serde(default)]
    id: String,
    #[serde(default)]
    payload: Option<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PartBody>,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    attachment_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

// ============================================================================
// Public types
// ============================================================================

/// One PDF attachment, fully fetched and decoded.
#[derive(Debug, Clone)]
pub struct PdfAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// A statement email with everything the extractors need.
#[derive(Debug, Clone)]
pub struct StatementEmail {
    pub id: String,
    pub subject: String,
    /// Raw `Date` header, parsed downstream.
    pub date: Option<String>,
    /// Decoded `text/html` body, if the message has one.
    pub html_body: Option<String>,
    pub attachments: Vec<PdfAttachment>,
}

// ============================================================================
// Gmail API
// ============================================================================

/// List all message ids matching a Gmail search query, following
/// `nextPageToken` until the result set is exhausted.
pub async fn search_messages(
    access_token: &str,
    query: &str,
) -> Result<Vec<String>, GoogleApiError> {
    let client = reqwest::Client::new();
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut params: Vec<(&str, String)> = vec![
            ("q", query.to_string()),
            ("maxResults", "100".to_string()),
        ];
        if let Some(ref token) = page_token {
            params.push(("pageToken", token.clone()));
        }

        let resp = send_with_retry(
            client
                .get("https://gmail.googleapis.com/gmail/v1/users/me/messages")
                .bearer_auth(access_token)
                .query(&params),
            &RetryPolicy::default(),
        )
        .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GoogleApiError::AuthExpired);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GoogleApiError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let list: MessageListResponse = resp.json().await?;
        ids.extend(list.messages.into_iter().map(|stub| stub.id));

        page_token = list.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(ids)
}

/// Fetch one message in full: headers, HTML body and all PDF attachments.
pub async fn fetch_statement(
    access_token: &str,
    message_id: &str,
) -> Result<StatementEmail, GoogleApiError> {
    let client = reqwest::Client::new();
    let url = format!(
        "https://gmail.googleapis.com/gmail/v1/users/me/messages/{}",
        message_id
    );

    let resp = send_with_retry(
        client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")]),
        &RetryPolicy::default(),
    )
    .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    let detail: MessageDetail = resp.json().await?;

    let Some(payload) = detail.payload else {
        return Ok(StatementEmail {
            id: detail.id,
            subject: String::new(),
            date: None,
            html_body: None,
            attachments: Vec::new(),
        });
    };

    let get_header = |name: &str| -> Option<String> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };
    let subject = get_header("Subject").unwrap_or_default();
    let date = get_header("Date");

    let html_body = extract_body_text(&payload, "text/html");

    let mut attachments = Vec::new();
    let mut pdf_parts = Vec::new();
    collect_pdf_parts(&payload, &mut pdf_parts);
    for part in pdf_parts {
        let body = match &part.body {
            Some(body) => body,
            None => continue,
        };
        // Small attachments are inlined; larger ones need a second fetch.
        let data = if let Some(ref inline) = body.data {
            decode_base64(inline)
        } else if let Some(ref attachment_id) = body.attachment_id {
            fetch_attachment_data(&client, access_token, message_id, attachment_id).await?
        } else {
            None
        };
        if let Some(data) = data {
            attachments.push(PdfAttachment {
                filename: part.filename.clone(),
                data,
            });
        } else {
            log::debug!(
                "attachment {} on message {} had no decodable data",
                part.filename,
                message_id
            );
        }
    }

    Ok(StatementEmail {
        id: detail.id,
        subject,
        date,
        html_body,
        attachments,
    })
}

/// Fetch the body of one attachment via the attachments endpoint.
async fn fetch_attachment_data(
    client: &reqwest::Client,
    access_token: &str,
    message_id: &str,
    attachment_id: &str,
) -> Result<Option<Vec<u8>>, GoogleApiError> {
    let url = format!(
        "https://gmail.googleapis.com/gmail/v1/users/me/messages/{}/attachments/{}",
        message_id, attachment_id
    );

    let resp = send_with_retry(
        client.get(&url).bearer_auth(access_token),
        &RetryPolicy::default(),
    )
    .await?;

    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }

    let body: AttachmentBody = resp.json().await?;
    Ok(body.data.as_deref().and_then(decode_base64))
}

/// Recursively walk MIME parts to find body data matching the target MIME
/// type, decoded to text.
fn extract_body_text(payload: &MessagePart, target_mime: &str) -> Option<String> {
    if payload.mime_type == target_mime {
        if let Some(ref body) = payload.body {
            if let Some(ref data) = body.data {
                if let Some(bytes) = decode_base64(data) {
                    return String::from_utf8(bytes).ok();
                }
            }
        }
    }
    for part in &payload.parts {
        if let Some(text) = extract_body_text(part, target_mime) {
            return Some(text);
        }
    }
    None
}

/// Collect every part carrying a `.pdf` filename, at any nesting depth.
fn collect_pdf_parts<'a>(payload: &'a MessagePart, out: &mut Vec<&'a MessagePart>) {
    if payload.filename.to_lowercase().ends_with(".pdf") {
        out.push(payload);
    }
    for part in &payload.parts {
        collect_pdf_parts(part, out);
    }
}

/// Decode URL-safe base64 as used by the Gmail API. Gmail usually omits
/// padding but some bodies carry it, so both variants are tried.
fn decode_base64(data: &str) -> Option<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(data))
        .ok()
}

// ============================================================================
// Tests
// ============================================================================
