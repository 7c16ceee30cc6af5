//! Preview-limit gate with hysteresis.

use tracing::debug;

use crate::error::ReaderError;
use crate::text_layer::PageNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Open,
    Triggered,
}

/// Fires once when the tracked page reaches the limit and re-arms only after
/// the reader goes back below it. `limit == None` means full access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGate {
    limit: Option<PageNumber>,
    state: GateState,
}

impl AccessGate {
    pub fn new(limit: Option<PageNumber>) -> Self {
        Self {
            limit,
            state: GateState::Open,
        }
    }

    pub fn unrestricted() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<PageNumber> {
        self.limit
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Reports the tracked page. Returns `true` when the limit callback must
    /// fire.
    pub fn observe(&mut self, page: PageNumber) -> bool {
        let Some(limit) = self.limit else {
            return false;
        };
        match self.state {
            GateState::Open if page >= limit => {
                debug!(page, limit, "preview limit reached");
                self.state = GateState::Triggered;
                true
            }
            GateState::Triggered if page < limit => {
                debug!(page, limit, "preview gate re-armed");
                self.state = GateState::Open;
                false
            }
            _ => false,
        }
    }

    /// Rejects explicit navigation strictly past the limit. The caller fires
    /// the limit callback on every rejection.
    pub fn check_navigation(&self, target: PageNumber) -> Result<(), ReaderError> {
        match self.limit {
            Some(limit) if target > limit => Err(ReaderError::NavigationBlocked {
                target,
                allowed: limit,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_dwell_and_rearms_below_limit() {
        let mut gate = AccessGate::new(Some(10));
        let fired: Vec<bool> = [7, 9, 10, 10, 10, 8, 9, 10, 10]
            .into_iter()
            .map(|page| gate.observe(page))
            .collect();
        assert_eq!(
            fired,
            [false, false, true, false, false, false, false, true, false]
        );
        assert_eq!(gate.state(), GateState::Triggered);
    }

    #[test]
    fn unrestricted_gate_never_fires() {
        let mut gate = AccessGate::unrestricted();
        assert!(!gate.observe(1_000));
        assert!(gate.check_navigation(1_000).is_ok());
    }

    #[test]
    fn navigation_past_limit_is_rejected() {
        let gate = AccessGate::new(Some(10));
        assert!(gate.check_navigation(10).is_ok());
        assert!(matches!(
            gate.check_navigation(11),
            Err(ReaderError::NavigationBlocked {
                target: 11,
                allowed: 10
            })
        ));
    }
}
