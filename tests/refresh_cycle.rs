//! End-to-end pipeline tests against an in-memory mailbox: search,
//! fetch, extract, merge, persist.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use mailfolio::config::{Config, SourceKind};
use mailfolio::google::GoogleApiError;
use mailfolio::refresh::{FetchOutcome, Refresher};
use mailfolio::source::{Attachment, DateRange, MailMessage, MessageSource};

const TABLE_STYLE: &str = "cellspacing:0;color:#000000;font-family:Ubuntu, Helvetica, Arial, sans-serif;font-size:13px;line-height:22px;table-layout:auto;width:100%; min-width: 700px;";
const AMOUNT_STYLE: &str = "font-weight: 300; font-size:28px; font-weight: 600;";
const NAME_STYLE: &str =
    "margin:0px;display:inline-block;color: #141B2F; font-size: 12px; font-weight: 600";

#[derive(Default)]
struct MockMailbox {
    by_account: HashMap<String, Vec<String>>,
    messages: HashMap<String, MailMessage>,
}

impl MockMailbox {
    fn add(&mut self, account: &str, msg: MailMessage) {
        self.by_account
            .entry(account.to_string())
            .or_default()
            .push(msg.id.clone());
        self.messages.insert(msg.id.clone(), msg);
    }
}

#[async_trait]
impl MessageSource for MockMailbox {
    async fn search(
        &self,
        account: &str,
        _subject: &str,
        _range: DateRange,
    ) -> Result<Vec<String>, GoogleApiError> {
        Ok(self.by_account.get(account).cloned().unwrap_or_default())
    }

    async fn fetch(&self, handle: &str) -> Result<MailMessage, GoogleApiError> {
        self.messages
            .get(handle)
            .cloned()
            .ok_or_else(|| GoogleApiError::ApiError {
                status: 404,
                message: format!("no message {handle}"),
            })
    }
}

fn config_rooted_at(data_root: &Path) -> Arc<Config> {
    let json = serde_json::json!({
        "data_root": data_root,
        "sources": {
            "brokerage": {
                "subject": "Coin by Zerodha - Allotment Report",
                "output_dir": "zerodha/{email}",
                "accounts": ["a@example.com", "b@example.com"]
            },
            "order": {
                "subject": "Order Sent to AMC",
                "output_dir": "paytmmoney/{email}",
                "accounts": ["a@example.com"]
            },
            "pension": {
                "subject": "Monthly Transaction Statement of your NPS account for the period",
                "output_dir": "nps/{email}/transactions",
                "accounts": ["a@example.com"]
            },
            "contract_notes": {
                "subject": "Combined Equity Contract Note for",
                "output_dir": "equity/{email}/contract_notes",
                "accounts": []
            }
        }
    });
    Arc::new(serde_json::from_value(json).expect("test config"))
}

fn range() -> DateRange {
    DateRange {
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
    }
}

fn allotment_message(id: &str, rows: &[(&str, &str, &str)]) -> MailMessage {
    let body_rows: String = rows
        .iter()
        .map(|(fund, date, amount)| {
            format!(
                r#"<tr class="fund_list"><td>{fund}</td><td>{date}</td><td>{amount}</td></tr>"#
            )
        })
        .collect();
    let html = format!(
        r#"<html><body><table style="{TABLE_STYLE}">
        <tr><th>Fund</th><th>Date</th><th>Amount</th></tr>
        {body_rows}
        </table></body></html>"#
    );
    MailMessage {
        id: id.to_string(),
        subject: "Coin by Zerodha - Allotment Report".to_string(),
        date_header: Some("Fri, 5 Jan 2024 10:00:00 +0530".to_string()),
        html_body: Some(html),
        attachments: vec![],
    }
}

fn order_message(id: &str, date_header: &str, amount: &str, fund: &str) -> MailMessage {
    let html = format!(
        r#"<html><body>
        <span style="{AMOUNT_STYLE}">{rupee}{amount}</span>
        <p style="{NAME_STYLE}">{fund} SIP</p>
        </body></html>"#,
        rupee = '\u{20b9}',
    );
    MailMessage {
        id: id.to_string(),
        subject: "Order Sent to AMC".to_string(),
        date_header: Some(date_header.to_string()),
        html_body: Some(html),
        attachments: vec![],
    }
}

#[tokio::test]
async fn test_second_cycle_only_adds_new_records() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        allotment_message(
            "m1",
            &[
                ("Axis Bluechip Fund", "2024-01-05", "3000.00"),
                ("HDFC Flexi Cap", "2024-01-05", "2000.00"),
            ],
        ),
    );

    let outcome = refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();
    let store_path = dir
        .path()
        .join("zerodha/a@example.com/transactions.json");
    assert_eq!(outcome, FetchOutcome::Data(store_path.clone()));

    let first: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    assert_eq!(first.as_array().unwrap().len(), 2);

    // A later cycle sees the old message again plus a new one.
    mailbox.add(
        "a@example.com",
        allotment_message("m2", &[("Parag Parikh Flexi Cap", "2024-02-05", "5000.00")]),
    );
    refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();

    let second: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    let records = second.as_array().unwrap();
    assert_eq!(records.len(), 3);
    // The original records survive byte-for-byte.
    for original in first.as_array().unwrap() {
        assert!(records.contains(original));
    }
}

#[tokio::test]
async fn test_repeated_cycle_is_idempotent_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        allotment_message("m1", &[("Fund X", "2024-01-05", "1000.00")]),
    );

    let store_path = dir
        .path()
        .join("zerodha/a@example.com/transactions.json");

    refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();
    let first = std::fs::read(&store_path).unwrap();

    refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();
    let second = std::fs::read(&store_path).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_refresh_never_touches_other_accounts() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        allotment_message("m1", &[("Fund X", "2024-01-05", "1000.00")]),
    );
    mailbox.add(
        "b@example.com",
        allotment_message("m9", &[("Fund Y", "2024-01-06", "2000.00")]),
    );

    refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();

    assert!(dir.path().join("zerodha/a@example.com").exists());
    assert!(!dir.path().join("zerodha/b@example.com").exists());
}

#[tokio::test]
async fn test_order_pipeline_builds_records_from_header_date() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        order_message(
            "o1",
            "Fri, 5 Jan 2024 15:30:00 +0530",
            "5,000",
            "Parag Parikh Flexi Cap",
        ),
    );

    let outcome = refresher
        .refresh_unit_with(&mailbox, SourceKind::Order, "a@example.com", range())
        .await
        .unwrap();
    let store_path = dir
        .path()
        .join("paytmmoney/a@example.com/transactions.json");
    assert_eq!(outcome, FetchOutcome::Data(store_path.clone()));

    let records: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    let record = &records.as_array().unwrap()[0];
    assert_eq!(record["kind"], "order");
    assert_eq!(record["fund_name"], "Parag Parikh Flexi Cap");
    assert_eq!(record["order_value"], "5,000");
    // 15:30 +05:30 is 10:00 UTC; ids always collate in UTC.
    assert_eq!(record["id"], "20240105100000_ParagParikhFlexiCap_OrderSenttoAMC");
}

#[tokio::test]
async fn test_decorated_subject_header_does_not_drift_record_identity() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    // Gmail's subject: operator is a contains-match, so forwarded or
    // date-suffixed headers still come back. Identity must be built from
    // the configured filter, not the header.
    let mut decorated = allotment_message("m1", &[("Axis Bluechip Fund", "2024-01-05", "3000.00")]);
    decorated.subject = "Fwd: Coin by Zerodha - Allotment Report 05-01-2024".to_string();
    let mut mailbox = MockMailbox::default();
    mailbox.add("a@example.com", decorated);

    refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();

    let store_path = dir
        .path()
        .join("zerodha/a@example.com/transactions.json");
    let records: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    let record = &records.as_array().unwrap()[0];
    assert_eq!(record["source_subject"], "Coin by Zerodha - Allotment Report");
    assert_eq!(
        record["id"],
        "20240105000000_AxisBluechipFund_CoinbyZerodhaAllotmentReport"
    );
}

#[tokio::test]
async fn test_messages_without_extractable_data_produce_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        MailMessage {
            id: "plain".to_string(),
            subject: "Coin by Zerodha - Allotment Report".to_string(),
            date_header: Some("Fri, 5 Jan 2024 10:00:00 +0530".to_string()),
            html_body: Some("<html><body><p>marketing</p></body></html>".to_string()),
            attachments: vec![],
        },
    );

    let outcome = refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::NoData);
    assert!(!dir
        .path()
        .join("zerodha/a@example.com/transactions.json")
        .exists());
}

#[tokio::test]
async fn test_attachment_unit_stores_pdfs_with_raw_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        MailMessage {
            id: "n1".to_string(),
            subject: "Monthly Transaction Statement of your NPS account for the period"
                .to_string(),
            date_header: Some("Thu, 1 Feb 2024 08:00:00 +0530".to_string()),
            html_body: None,
            attachments: vec![Attachment {
                filename: "Transaction_Statement_Jan.pdf".to_string(),
                data: b"not really a pdf".to_vec(),
            }],
        },
    );

    let outcome = refresher
        .refresh_unit_with(&mailbox, SourceKind::Pension, "a@example.com", range())
        .await
        .unwrap();
    let vault_dir = dir.path().join("nps/a@example.com/transactions");
    assert_eq!(outcome, FetchOutcome::Data(vault_dir.clone()));

    // Undecryptable bytes degrade to a raw copy at the same destination.
    let stored = std::fs::read(vault_dir.join("Transaction_Statement_Jan.pdf")).unwrap();
    assert_eq!(stored, b"not really a pdf");
}

#[tokio::test]
async fn test_unfetchable_messages_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let refresher = Refresher::new(config_rooted_at(dir.path()));

    let mut mailbox = MockMailbox::default();
    mailbox.add(
        "a@example.com",
        allotment_message("good", &[("Fund X", "2024-01-05", "1000.00")]),
    );
    // A handle the mailbox lists but cannot serve.
    mailbox
        .by_account
        .get_mut("a@example.com")
        .unwrap()
        .push("ghost".to_string());

    let outcome = refresher
        .refresh_unit_with(&mailbox, SourceKind::Brokerage, "a@example.com", range())
        .await
        .unwrap();

    let store_path = dir
        .path()
        .join("zerodha/a@example.com/transactions.json");
    assert_eq!(outcome, FetchOutcome::Data(store_path.clone()));
    let records: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&store_path).unwrap()).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);
}
