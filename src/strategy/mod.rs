//! Resolution cascades
//!
//! Each resolver consults the cache first, walks its tiers in fixed order of
//! increasing cost, and writes the final result back before returning.

mod nationality;
mod place;

pub use nationality::{NationalityResolver, Tier};
pub use place::{PlaceQuery, PlaceResolver};

use crate::ai::AiError;
use thiserror::Error;

/// Errors that abort the resolution of a single row.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("AI tier failed: {0}")]
    Ai(AiError),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl From<AiError> for ResolveError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::Cancelled => Self::Cancelled,
            other => Self::Ai(other),
        }
    }
}
