//! Unit-level failures.
//!
//! A unit is one (source, account) pair in one refresh cycle. Failures
//! here abort that unit only; the scheduler and the rest of the cycle
//! carry on.

use thiserror::Error;

use crate::google::GoogleApiError;
use crate::store::PersistenceError;

#[derive(Debug, Error)]
pub enum UnitError {
    /// The source query itself failed (auth, transport after retries,
    /// non-success API status). Nothing was extracted for the unit.
    #[error("source query failed: {0}")]
    SourceQuery(#[from] GoogleApiError),

    /// Reading or writing the unit's store failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The account has no token file configured for this source.
    #[error("no token configured for account {account} / source {service}")]
    MissingToken { account: String, service: String },
}

impl UnitError {
    /// True when a later cycle could plausibly succeed without operator
    /// intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            UnitError::SourceQuery(err) => !matches!(
                err,
                GoogleApiError::AuthExpired | GoogleApiError::TokenNotFound(_)
            ),
            UnitError::Persistence(_) => true,
            UnitError::MissingToken { .. } => false,
        }
    }
}
