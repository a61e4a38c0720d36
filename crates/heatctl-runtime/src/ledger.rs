//! [`DecisionLedger`] – append-only history of cycle averages.
//!
//! Diagnostic only: the control loop writes to it but never reads it back.
//! Every complete cycle is recorded, including the first one that only
//! sets the neutral level.  A history that starts at the first real
//! adjustment is therefore `entries()[1..]`.

/// Ordered record of every average the controller has acted on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionLedger {
    averages: Vec<f64>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, average: f64) {
        self.averages.push(average);
    }

    /// All averages, oldest first.
    pub fn entries(&self) -> &[f64] {
        &self.averages
    }

    pub fn last(&self) -> Option<f64> {
        self.averages.last().copied()
    }

    pub fn len(&self) -> usize {
        self.averages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.averages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut ledger = DecisionLedger::new();
        assert!(ledger.is_empty());
        ledger.push(19.5);
        ledger.push(20.0);
        ledger.push(19.5);
        assert_eq!(ledger.entries(), &[19.5, 20.0, 19.5]);
        assert_eq!(ledger.last(), Some(19.5));
        assert_eq!(ledger.len(), 3);
    }
}
