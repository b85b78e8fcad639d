//! Brokerage allotment-table extraction.
//!
//! The confirmation mail embeds several tables (branding, footers, the
//! actual fund list). The transaction table is identified by its exact
//! inline style string; within it, header cells define the field names and
//! only rows carrying the `fund_list` class are data rows — summary and
//! footer rows in the same table are skipped.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use scraper::{Html, Selector};

use super::trim_text;

/// Structural fingerprint of the transaction table, verbatim from the
/// statement template.
const TABLE_STYLE: &str = "cellspacing:0;color:#000000;font-family:Ubuntu, Helvetica, \
     Arial, sans-serif;font-size:13px;line-height:22px;table-layout:auto;width:100%; \
     min-width: 700px;";

fn table_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("table").expect("invalid table selector"))
}

fn header_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("th").expect("invalid th selector"))
}

fn data_row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("tr.fund_list").expect("invalid row selector"))
}

fn cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("td").expect("invalid td selector"))
}

/// Extract the transaction table as one field→value map per data row, in
/// row order.
///
/// Returns `None` when no table matches the fingerprint — distinct from
/// `Some(vec![])`, a matching table with a header row but zero data rows.
pub fn extract_rows(html: &str) -> Option<Vec<BTreeMap<String, String>>> {
    let doc = Html::parse_document(html);

    let table = doc
        .select(table_selector())
        .find(|t| matches_fingerprint(t.value().attr("style")))?;

    let headers: Vec<String> = table
        .select(header_selector())
        .map(|th| trim_text(&th.text().collect::<Vec<_>>().join(" ")))
        .collect();

    let mut rows = Vec::new();
    for tr in table.select(data_row_selector()) {
        let cells = tr
            .select(cell_selector())
            .map(|td| trim_text(&td.text().collect::<Vec<_>>().join(" ")));
        // Zip truncates at the shorter side, mirroring how ragged rows in
        // these templates have always been handled.
        let row: BTreeMap<String, String> = headers.iter().cloned().zip(cells).collect();
        rows.push(row);
    }
    Some(rows)
}

fn matches_fingerprint(style: Option<&str>) -> bool {
    // The template's style attribute is one long line; ours is wrapped for
    // readability, so compare with whitespace collapsed.
    let Some(style) = style else { return false };
    normalize_style(style) == normalize_style(TABLE_STYLE)
}

fn normalize_style(style: &str) -> String {
    style.split_whitespace().collect::<Vec<_>>().join(" ")
}
