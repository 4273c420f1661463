use std::time::Duration;

use crate::host::HostStatus;

/// Outcome of judging one probe result against a host's current status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityEvaluation {
    /// Reachable and already online
    StillOnline,
    /// Reachable after being offline or unknown
    CameOnline,
    /// Unreachable, but not for longer than the grace period yet
    Failing,
    /// Unreachable for the whole grace period; the host goes offline now
    WentOffline,
    /// Unreachable and already offline
    StillOffline,
}

impl ReachabilityEvaluation {
    pub fn evaluate(
        current: HostStatus,
        reachable: bool,
        failing_for: Duration,
        grace: Duration,
    ) -> ReachabilityEvaluation {
        if reachable {
            if current == HostStatus::Online {
                return ReachabilityEvaluation::StillOnline;
            }
            return ReachabilityEvaluation::CameOnline;
        }

        if current == HostStatus::Offline {
            return ReachabilityEvaluation::StillOffline;
        }

        // check, if the failure has lasted long enough to count as an outage
        if failing_for >= grace {
            return ReachabilityEvaluation::WentOffline;
        }

        ReachabilityEvaluation::Failing
    }

    /// Status this evaluation moves the host to, if it moves at all
    pub fn transition(&self) -> Option<HostStatus> {
        match self {
            ReachabilityEvaluation::CameOnline => Some(HostStatus::Online),
            ReachabilityEvaluation::WentOffline => Some(HostStatus::Offline),
            _ => None,
        }
    }
}
