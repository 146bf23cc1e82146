//! Observability sink for recovered errors.
//!
//! Transport and protocol failures never propagate out of the stores. They
//! are logged, counted and kept in a short history here so a front end can
//! show that something went wrong without the view freezing on an error.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::constants::DIAGNOSTICS_HISTORY;
use crate::error::Error;

/// One recorded failure.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticEntry {
    /// When the failure was reported.
    pub at: DateTime<Utc>,
    /// The failure itself.
    pub error: Error,
}

/// Counters and recent history of recovered errors.
#[derive(Debug, Default)]
pub struct Diagnostics {
    transport_errors: u64,
    protocol_errors: u64,
    other_errors: u64,
    recent: VecDeque<DiagnosticEntry>,
}

impl Diagnostics {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a recovered error.
    pub fn report(&mut self, error: impl Into<Error>) {
        let error = error.into();
        match &error {
            Error::Transport(e) => {
                self.transport_errors += 1;
                log::warn!("[Transport] {}", e);
            }
            Error::Protocol(e) => {
                self.protocol_errors += 1;
                log::warn!("[Protocol] Dropped message: {}", e);
            }
            other => {
                self.other_errors += 1;
                log::warn!("[Client] {}", other);
            }
        }

        if self.recent.len() == DIAGNOSTICS_HISTORY {
            self.recent.pop_front();
        }
        self.recent.push_back(DiagnosticEntry {
            at: Utc::now(),
            error,
        });
    }

    /// Number of transport errors seen.
    #[must_use]
    pub fn transport_errors(&self) -> u64 {
        self.transport_errors
    }

    /// Number of protocol errors seen.
    #[must_use]
    pub fn protocol_errors(&self) -> u64 {
        self.protocol_errors
    }

    /// Total number of reported errors.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.transport_errors + self.protocol_errors + self.other_errors
    }

    /// Most recent entries, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &DiagnosticEntry> {
        self.recent.iter()
    }

    /// The latest entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<&DiagnosticEntry> {
        self.recent.back()
    }
}
