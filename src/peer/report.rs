use crate::peer::error::PeerError;
use std::collections::BTreeMap;

/// Settled outcome of every loop a session ran, keyed by loop name.
///
/// One failing loop never hides what happened to the others, so a caller can
/// tell a keep-alive timeout from a decode error from a handler failure.
#[derive(Debug, Default)]
pub struct SessionReport {
    outcomes: BTreeMap<&'static str, Result<(), PeerError>>,
}

impl SessionReport {
    pub(crate) fn record(&mut self, name: &'static str, outcome: Result<(), PeerError>) {
        self.outcomes.insert(name, outcome);
    }

    pub fn outcome(&self, name: &str) -> Option<&Result<(), PeerError>> {
        self.outcomes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Result<(), PeerError>)> {
        self.outcomes.iter().map(|(name, outcome)| (*name, outcome))
    }

    /// Loops that failed for a reason other than the session being torn down
    pub fn failures(&self) -> impl Iterator<Item = (&'static str, &PeerError)> {
        self.iter().filter_map(|(name, outcome)| match outcome {
            Err(e) if !e.is_cancellation() => Some((name, e)),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueError;

    #[test]
    fn cancellations_are_not_failures() {
        let mut report = SessionReport::default();
        report.record("outgoing", Ok(()));
        report.record("incoming", Err(QueueError::Completed.into()));
        assert!(report.is_clean());

        report.record("bind", Err(PeerError::Timeout("bind response")));
        let failures: Vec<_> = report.failures().map(|(name, _)| name).collect();
        assert_eq!(failures, vec!["bind"]);
        assert_eq!(report.len(), 3);
        assert!(matches!(report.outcome("outgoing"), Some(Ok(()))));
    }
}
