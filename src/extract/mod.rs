//! Per-source extraction of structured data from rendered message bodies.
//!
//! Both extractors fingerprint elements by their inline `style` attribute:
//! statement emails are machine-generated, so the style string is the most
//! stable structural marker the body offers. An extraction miss is not an
//! error — it means "no data in this message" and callers move on.

pub mod order;
pub mod table;

use std::sync::OnceLock;

use regex::Regex;

fn ws_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("invalid ws regex"))
}

/// Collapse runs of whitespace and trim, the way cell text is stored.
pub(crate) fn trim_text(raw: &str) -> String {
    ws_re().replace_all(raw.trim(), " ").trim().to_string()
}
