//! Statement record types shared by the reconciliation pipeline.
//!
//! Each source produces its own record shape, but every record carries the
//! content-derived `id` used as the dedup key and the `source_subject` that
//! produced it (folded into the id to avoid cross-source collisions).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One logical transaction/statement row extracted from a message.
///
/// Tagged per source so each variant gets its own schema while the store
/// and merger only ever deal in `Record`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    /// A brokerage allotment-table row (column schema defined by the table
    /// header row of the email itself).
    Brokerage(BrokerageRecord),
    /// A payment-platform mutual-fund order confirmation.
    Order(OrderRecord),
}

impl Record {
    /// The dedup key. Unique within a (source, account) store.
    pub fn id(&self) -> &str {
        match self {
            Record::Brokerage(r) => &r.id,
            Record::Order(r) => &r.id,
        }
    }

    /// The subject filter that produced this record, kept for traceability.
    pub fn source_subject(&self) -> &str {
        match self {
            Record::Brokerage(r) => &r.source_subject,
            Record::Order(r) => &r.source_subject,
        }
    }
}

/// One row of the brokerage transaction table.
///
/// `fields` maps header text to trimmed cell text; the `Date` and `Fund`
/// columns feed id derivation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerageRecord {
    pub id: String,
    pub source_subject: String,
    pub fields: BTreeMap<String, String>,
}

/// A single payment-platform order, at most one per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub source_subject: String,
    pub order_value: String,
    pub fund_name: String,
    /// When the confirmation mail was received, ISO 8601 in UTC.
    pub received_datetime: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_json_tagging() {
        let rec = Record::Order(OrderRecord {
            id: "20240105100000_FundA_OrderSenttoAMC".to_string(),
            source_subject: "Order Sent to AMC".to_string(),
            order_value: "5000".to_string(),
            fund_name: "Fund A".to_string(),
            received_datetime: "2024-01-05T10:00:00+00:00".to_string(),
        });

        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["kind"], "order");
        assert_eq!(json["fund_name"], "Fund A");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_brokerage_fields_roundtrip() {
        let mut fields = BTreeMap::new();
        fields.insert("Fund".to_string(), "Axis Bluechip Fund".to_string());
        fields.insert("Date".to_string(), "2024-01-05".to_string());
        fields.insert("Amount".to_string(), "4999.75".to_string());
        let rec = Record::Brokerage(BrokerageRecord {
            id: "20240105000000_AxisBluechipFund_AllotmentReport".to_string(),
            source_subject: "Allotment Report".to_string(),
            fields,
        });

        let json = serde_json::to_string(&rec).unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), rec.id());
        assert_eq!(back, rec);
    }
}
