use std::fmt;

use crate::stop::StopReason;

/// Failure of a decode, encode, reload or edit.
///
/// Carries the stop reason plus an optional note about what was being
/// attempted, enough for a front end to tell the user which operation
/// failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecError {
    pub reason: StopReason,
    pub detail: Option<String>,
}

impl CodecError {
    pub fn new(reason: StopReason) -> Self {
        Self {
            reason,
            detail: None,
        }
    }

    pub fn with_detail(reason: StopReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: Some(detail.into()),
        }
    }

    pub fn init(detail: impl Into<String>) -> Self {
        Self::with_detail(StopReason::InitError, detail)
    }

    /// Prefix the detail with the operation that was running.
    pub fn context(mut self, what: &str) -> Self {
        self.detail = Some(match self.detail.take() {
            Some(d) => format!("{what}: {d}"),
            None => what.to_string(),
        });
        self
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason.message())?;
        if let Some(d) = &self.detail {
            write!(f, " ({d})")?;
        }
        Ok(())
    }
}

impl std::error::Error for CodecError {}

impl From<StopReason> for CodecError {
    fn from(reason: StopReason) -> Self {
        Self::new(reason)
    }
}
