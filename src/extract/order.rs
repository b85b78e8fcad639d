//! Payment-platform order extraction.
//!
//! Structurally different from the brokerage table: the order value and
//! fund name sit in two style-fingerprinted elements anywhere in the body,
//! and a message yields at most one record.

use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::trim_text;

/// Style of the `<span>` carrying the order amount.
const AMOUNT_STYLE: &str = "font-weight: 300; font-size:28px; font-weight: 600;";
/// Style of the `<p>` carrying the fund name.
const NAME_STYLE: &str =
    "margin:0px;display:inline-block;color: #141B2F; font-size: 12px; font-weight: 600";

fn span_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("span").expect("invalid span selector"))
}

fn p_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("p").expect("invalid p selector"))
}

/// The extracted order details, before id assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDetails {
    /// Amount with the rupee sign and surrounding whitespace stripped.
    pub order_value: String,
    /// Fund name with the "SIP" badge stripped.
    pub fund_name: String,
}

/// Extract the order value and fund name from a confirmation body.
///
/// `None` when either fingerprint is missing — the message carries no
/// order data (an expected condition, not an error).
pub fn extract_order(html: &str) -> Option<OrderDetails> {
    let doc = Html::parse_document(html);

    let amount = doc
        .select(span_selector())
        .find(|el| el.value().attr("style") == Some(AMOUNT_STYLE))?;
    let name = doc
        .select(p_selector())
        .find(|el| el.value().attr("style") == Some(NAME_STYLE))?;

    let order_value = trim_text(
        &amount
            .text()
            .collect::<String>()
            .replace('\u{20b9}', ""),
    );
    let fund_name = trim_text(&name.text().collect::<String>().replace("SIP", ""));

    Some(OrderDetails {
        order_value,
        fund_name,
    })
}
