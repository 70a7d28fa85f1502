//! Status transition detection between two snapshots of the quote list.
use std::collections::HashMap;

use crate::model::{Quote, QuoteStatus};

/// Transitions that deserve a user-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noteworthy {
    Signed,
    Accepted,
    Rejected,
}

impl Noteworthy {
    pub fn classify(from: QuoteStatus, to: QuoteStatus) -> Option<Self> {
        use QuoteStatus::*;
        match (from, to) {
            (Sent, Signed) => Some(Noteworthy::Signed),
            (Sent, Accepted) => Some(Noteworthy::Accepted),
            (Sent, Rejected) => Some(Noteworthy::Rejected),
            (Sent, Draft | Sent) => None,
            (Draft | Signed | Accepted | Rejected, _) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub quote: Quote,
    pub from: QuoteStatus,
    pub to: QuoteStatus,
    pub kind: Noteworthy,
}

/// Remembers the last seen statuses and reports noteworthy changes.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<HashMap<String, QuoteStatus>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self) -> bool {
        self.previous.is_some()
    }

    /// Diff `snapshot` against the previous one and replace it.
    /// The first call only seeds and reports nothing.
    pub fn observe(&mut self, snapshot: &[Quote]) -> Vec<Transition> {
        let next: HashMap<String, QuoteStatus> = snapshot
            .iter()
            .map(|q| (q.id.clone(), q.status))
            .collect();
        let Some(previous) = self.previous.replace(next) else {
            return Vec::new();
        };

        snapshot
            .iter()
            .filter_map(|quote| {
                let from = *previous.get(&quote.id)?;
                let to = quote.status;
                if from == to {
                    return None;
                }
                Noteworthy::classify(from, to).map(|kind| Transition {
                    quote: quote.clone(),
                    from,
                    to,
                    kind,
                })
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
