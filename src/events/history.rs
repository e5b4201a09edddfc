//! In-memory message log

use std::sync::Mutex;

use super::Envelope;

/// Append-only log of every delivered and echoed message
#[derive(Debug, Default)]
pub struct MessageLog {
    entries: Mutex<Vec<Envelope>>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, envelope: Envelope) {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(envelope);
    }

    /// Copy of the log ordered by Lamport value, then wall clock
    pub fn ordered(&self) -> Vec<Envelope> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        entries.sort_by(|a, b| a.cmp_causal(b));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatMessage, MessageKind};

    #[test]
    fn test_ordered_by_clock() {
        let log = MessageLog::new();
        for clock in [5, 1, 3] {
            log.push(Envelope::local(
                MessageKind::Chat,
                ChatMessage::new("me", format!("m{}", clock), clock),
            ));
        }
        let clocks: Vec<u64> = log.ordered().iter().map(|e| e.message.lamport_clock).collect();
        assert_eq!(clocks, vec![1, 3, 5]);
        assert_eq!(log.len(), 3);
    }
}
