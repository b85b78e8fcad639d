//! The fetch-extract-merge pipeline.
//!
//! One refresh unit is a (source, account) pair. A cycle runs every
//! configured unit concurrently; a unit failure is logged and isolated,
//! never aborting sibling units. Within a unit, a message that fails to
//! fetch or parse is skipped, the rest of the unit proceeds.
//!
//! Unit granularity is also the serialization boundary: a per-unit lock
//! keeps an ad-hoc `fetch` from racing a scheduled cycle on the same
//! store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::config::{Config, SourceKind};
use crate::error::UnitError;
use crate::extract;
use crate::normalize::{parse_message_date, record_id, record_id_from_str};
use crate::record::{BrokerageRecord, OrderRecord, Record};
use crate::source::{DateRange, GmailSource, MailMessage, MessageSource};
use crate::store::{MergeOutcome, RecordStore};
use crate::summarize::{self, gemini::GeminiSummarizer, SummaryBattery};
use crate::vault::{store_attachment, PasswordPolicy};

/// What one unit's refresh produced.
#[derive(Debug, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Records were persisted (or attachments stored) at this location.
    Data(PathBuf),
    /// The search window held no extractable data. Nothing was written.
    NoData,
}

pub struct Refresher {
    config: Arc<Config>,
    unit_locks: DashMap<(SourceKind, String), Arc<Mutex<()>>>,
}

impl Refresher {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            unit_locks: DashMap::new(),
        }
    }

    /// The configured lookback window ending today.
    pub fn default_range(&self) -> DateRange {
        let today = Local::now().date_naive();
        DateRange {
            start: today - chrono::Duration::days(self.config.lookback_days),
            end: today,
        }
    }

    /// Refresh one unit against the production mailbox.
    pub async fn refresh_unit(
        &self,
        kind: SourceKind,
        account: &str,
        range: DateRange,
    ) -> Result<FetchOutcome, UnitError> {
        let lock = self
            .unit_locks
            .entry((kind, account.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let token_file = self
            .config
            .accounts
            .get(account)
            .and_then(|a| a.token_for(kind))
            .ok_or_else(|| UnitError::MissingToken {
                account: account.to_string(),
                service: kind.to_string(),
            })?;
        let source = GmailSource::new(token_file.to_path_buf(), self.config.end_bound);
        self.refresh_unit_with(&source, kind, account, range).await
    }

    /// Refresh one unit against an arbitrary source.
    ///
    /// The search itself failing is fatal to the unit; individual message
    /// failures past that point are skipped.
    pub async fn refresh_unit_with(
        &self,
        source: &dyn MessageSource,
        kind: SourceKind,
        account: &str,
        range: DateRange,
    ) -> Result<FetchOutcome, UnitError> {
        let subject = &self.config.source(kind).subject;
        let handles = source.search(account, subject, range).await?;
        log::info!(
            "{}/{}: {} message(s) in window {} to {}",
            kind,
            account,
            handles.len(),
            range.start,
            range.end
        );

        let messages = self.fetch_messages(source, &handles).await;
        match kind {
            SourceKind::Brokerage => self.merge_table_records(kind, account, subject, &messages),
            SourceKind::Order => self.merge_order_records(kind, account, subject, &messages),
            SourceKind::Pension | SourceKind::ContractNotes => {
                self.store_attachments(kind, account, &messages)
            }
        }
    }

    async fn fetch_messages(
        &self,
        source: &dyn MessageSource,
        handles: &[String],
    ) -> Vec<MailMessage> {
        let mut messages = Vec::with_capacity(handles.len());
        for handle in handles {
            match source.fetch(handle).await {
                Ok(msg) => messages.push(msg),
                Err(err) => log::warn!("skipping message {}: {}", handle, err),
            }
        }
        messages
    }

    fn unit_out_dir(&self, kind: SourceKind, account: &str) -> PathBuf {
        self.config
            .source(kind)
            .output_dir_for(account, &self.config.data_root)
    }

    /// `subject` is the configured filter, not the message header: ids and
    /// `source_subject` must stay stable across header decorations
    /// ("Fwd:", date suffixes) that Gmail's contains-match still returns.
    fn merge_table_records(
        &self,
        kind: SourceKind,
        account: &str,
        subject: &str,
        messages: &[MailMessage],
    ) -> Result<FetchOutcome, UnitError> {
        let mut records = Vec::new();
        for msg in messages {
            let Some(html) = msg.html_body.as_deref() else {
                log::debug!("message {} has no html body", msg.id);
                continue;
            };
            let Some(rows) = extract::table::extract_rows(html) else {
                log::debug!("message {} has no transaction table", msg.id);
                continue;
            };
            for row in rows {
                let (Some(date), Some(fund)) = (row.get("Date"), row.get("Fund")) else {
                    log::warn!("message {}: row missing Date/Fund, skipped", msg.id);
                    continue;
                };
                match record_id_from_str(date, fund, subject) {
                    Ok(id) => records.push(Record::Brokerage(BrokerageRecord {
                        id,
                        source_subject: subject.to_string(),
                        fields: row,
                    })),
                    Err(err) => {
                        log::warn!("message {}: undatable row skipped: {}", msg.id, err)
                    }
                }
            }
        }
        self.merge_into_store(kind, account, records)
    }

    fn merge_order_records(
        &self,
        kind: SourceKind,
        account: &str,
        subject: &str,
        messages: &[MailMessage],
    ) -> Result<FetchOutcome, UnitError> {
        let mut records = Vec::new();
        for msg in messages {
            let Some(html) = msg.html_body.as_deref() else {
                log::debug!("message {} has no html body", msg.id);
                continue;
            };
            let Some(details) = extract::order::extract_order(html) else {
                log::debug!("message {} has no order details", msg.id);
                continue;
            };
            let received = match msg.date_header.as_deref().map(parse_message_date) {
                Some(Ok(dt)) => dt.with_timezone(&chrono::Utc),
                Some(Err(err)) => {
                    log::warn!("message {}: unparseable Date header: {}", msg.id, err);
                    continue;
                }
                None => {
                    log::warn!("message {} has no Date header, skipped", msg.id);
                    continue;
                }
            };
            records.push(Record::Order(OrderRecord {
                id: record_id(received, &details.fund_name, subject),
                source_subject: subject.to_string(),
                order_value: details.order_value,
                fund_name: details.fund_name,
                received_datetime: received.to_rfc3339(),
            }));
        }
        self.merge_into_store(kind, account, records)
    }

    fn merge_into_store(
        &self,
        kind: SourceKind,
        account: &str,
        records: Vec<Record>,
    ) -> Result<FetchOutcome, UnitError> {
        let out_dir = self.unit_out_dir(kind, account);
        let mut store = RecordStore::load(&out_dir.join("transactions.json"))?;
        let inserted = store.merge(records);
        let outcome = store.persist()?;
        match outcome {
            MergeOutcome::Persisted(path) => {
                log::info!(
                    "{}/{}: {} new record(s), {} total",
                    kind,
                    account,
                    inserted,
                    store.len()
                );
                Ok(FetchOutcome::Data(path))
            }
            MergeOutcome::NothingToPersist => Ok(FetchOutcome::NoData),
        }
    }

    fn store_attachments(
        &self,
        kind: SourceKind,
        account: &str,
        messages: &[MailMessage],
    ) -> Result<FetchOutcome, UnitError> {
        let out_dir = self.unit_out_dir(kind, account);
        let policy = self.password_policy();

        let mut stored = 0;
        for msg in messages {
            for attachment in &msg.attachments {
                if !attachment.filename.to_lowercase().ends_with(".pdf") {
                    continue;
                }
                store_attachment(&attachment.data, &attachment.filename, &out_dir, &policy)?;
                stored += 1;
            }
        }
        if stored > 0 {
            log::info!("{}/{}: stored {} document(s)", kind, account, stored);
            Ok(FetchOutcome::Data(out_dir))
        } else {
            Ok(FetchOutcome::NoData)
        }
    }

    fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::new(
            self.config
                .accounts
                .iter()
                .filter_map(|(email, account)| {
                    account
                        .pdf_password
                        .clone()
                        .map(|password| (email.clone(), password))
                })
                .collect(),
        )
    }

    /// Run every configured unit concurrently, isolating failures.
    pub async fn refresh_all(self: &Arc<Self>, range: DateRange) {
        let mut units = JoinSet::new();
        for kind in SourceKind::ALL {
            for account in &self.config.source(kind).accounts {
                let this = Arc::clone(self);
                let account = account.clone();
                units.spawn(async move {
                    let outcome = this.refresh_unit(kind, &account, range).await;
                    (kind, account, outcome)
                });
            }
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((kind, account, Ok(FetchOutcome::Data(path)))) => {
                    log::info!("{}/{}: data at {}", kind, account, path.display())
                }
                Ok((kind, account, Ok(FetchOutcome::NoData))) => {
                    log::info!("{}/{}: no data in window", kind, account)
                }
                Ok((kind, account, Err(err))) => {
                    log::warn!(
                        "{}/{} failed ({}): {}",
                        kind,
                        account,
                        if err.is_transient() {
                            "transient"
                        } else {
                            "needs attention"
                        },
                        err
                    )
                }
                Err(err) => log::error!("refresh unit panicked: {}", err),
            }
        }
    }

    /// One full cycle: refresh everything, then summarize stored pension
    /// statements and contract notes when a summarizer key is configured.
    pub async fn run_cycle(self: &Arc<Self>) {
        let range = self.default_range();
        self.refresh_all(range).await;

        let Some(api_key) = self.config.gemini_api_key.clone() else {
            return;
        };
        let summarizer = GeminiSummarizer::new(api_key);
        let batteries = [
            (&self.config.sources.pension, SummaryBattery::Pension),
            (
                &self.config.sources.contract_notes,
                SummaryBattery::ContractNote,
            ),
        ];
        for (source, battery) in batteries {
            for account in &source.accounts {
                let statements = source.output_dir_for(account, &self.config.data_root);
                // Summaries land beside the statement dir, e.g.
                // .../{email}/transactions -> .../{email}/processed.
                let processed = statements
                    .parent()
                    .map(|p| p.join("processed"))
                    .unwrap_or_else(|| statements.join("processed"));
                match summarize::summarize_statements(
                    &summarizer,
                    battery,
                    &statements,
                    &processed,
                )
                .await
                {
                    Ok(count) if count > 0 => {
                        log::info!("summarized {} statement(s) for {}", count, account)
                    }
                    Ok(_) => {}
                    Err(err) => log::warn!("summarization for {} failed: {}", account, err),
                }
            }
        }
    }
}
