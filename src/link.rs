//! Connectivity lifecycle state machine with heartbeat-based liveness.
//!
//! The machine owns only decisions - it never touches the network
//! itself. The connectivity task feeds it clock readings and transport
//! outcomes; it answers with the current state and, once per heartbeat
//! cycle, a liveness verdict that may demand a hard restart.
//!
//! Two independent paths lead out of `Down`: evidence of life (a recent
//! pong observed by [`Connectivity::evaluate`]) and an explicit
//! reconnect (reported via [`Connectivity::resume_running`]). Whichever
//! condition is satisfied first wins; removing either would change the
//! recovery-time characteristics of the device.

use crate::config::{DEGRADE_AFTER_SECS, RECOVER_WITHIN_SECS, RESTART_AFTER_SECS};

/// Session lifecycle state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    /// Waiting for the wireless link and the first broker session.
    Starting,
    /// Subscribed and heartbeating.
    Running,
    /// Broker considered unreachable; reconnecting.
    Down,
}

/// Outcome of one liveness evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Liveness {
    /// No transition this cycle.
    Stable,
    /// `Running` -> `Down`: the pong went stale.
    Degraded,
    /// `Down` -> `Running`: a recent pong proved the link alive.
    Recovered,
    /// Staleness passed the fatal threshold - restart the device now.
    RestartRequired,
}

/// Connectivity state plus heartbeat bookkeeping.
///
/// `last_pong` only moves on inbound pong messages (and the startup
/// baseline), never on publishes or reconnects.
pub struct Connectivity {
    state: LinkState,
    last_pong: u64,
}

impl Connectivity {
    pub const fn new() -> Self {
        Self {
            state: LinkState::Starting,
            last_pong: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LinkState::Running
    }

    pub fn is_down(&self) -> bool {
        self.state == LinkState::Down
    }

    /// First successful subscribe: enter `Running` and take the current
    /// time as the heartbeat baseline.
    pub fn begin_running(&mut self, now: u64) {
        self.state = LinkState::Running;
        self.last_pong = now;
    }

    /// Explicit reconnect succeeded. The baseline is NOT refreshed: if
    /// pongs still fail to arrive, the next evaluation degrades again
    /// and the fatal threshold keeps counting from the last real pong.
    pub fn resume_running(&mut self) {
        self.state = LinkState::Running;
    }

    /// A heartbeat reply arrived carrying its original timestamp.
    pub fn note_pong(&mut self, timestamp: u64) {
        self.last_pong = timestamp;
    }

    pub fn last_pong(&self) -> u64 {
        self.last_pong
    }

    /// Any transport failure while `Running` degrades immediately -
    /// publishes and inbound polls do not get a grace period.
    pub fn note_transport_failure(&mut self) {
        if self.state == LinkState::Running {
            self.state = LinkState::Down;
        }
    }

    /// Evaluate the three liveness thresholds against `now`.
    ///
    /// The rules apply in order within one call, so a `Running` machine
    /// whose pong is already past the fatal threshold degrades and
    /// demands a restart in the same cycle.
    pub fn evaluate(&mut self, now: u64) -> Liveness {
        let mut verdict = Liveness::Stable;
        let stale = now.saturating_sub(self.last_pong);

        if self.state == LinkState::Running && stale > DEGRADE_AFTER_SECS {
            self.state = LinkState::Down;
            verdict = Liveness::Degraded;
        }
        if self.state == LinkState::Down && stale < RECOVER_WITHIN_SECS {
            self.state = LinkState::Running;
            verdict = Liveness::Recovered;
        }
        if self.state == LinkState::Down && stale > RESTART_AFTER_SECS {
            verdict = Liveness::RestartRequired;
        }
        verdict
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_since(now: u64) -> Connectivity {
        let mut conn = Connectivity::new();
        conn.begin_running(now);
        conn
    }

    #[test]
    fn starts_in_starting_state() {
        let conn = Connectivity::new();
        assert_eq!(conn.state(), LinkState::Starting);
    }

    #[test]
    fn stays_running_while_pongs_are_fresh() {
        let mut conn = running_since(1_000);
        assert_eq!(conn.evaluate(1_090), Liveness::Stable);
        assert_eq!(conn.state(), LinkState::Running);
    }

    #[test]
    fn degrades_when_pong_older_than_threshold() {
        let mut conn = running_since(1_000);
        assert_eq!(conn.evaluate(1_091), Liveness::Degraded);
        assert_eq!(conn.state(), LinkState::Down);
    }

    #[test]
    fn recovers_on_recent_pong_without_reconnect() {
        let mut conn = running_since(1_000);
        conn.note_transport_failure();
        assert!(conn.is_down());
        conn.note_pong(2_000);
        assert_eq!(conn.evaluate(2_059), Liveness::Recovered);
        assert_eq!(conn.state(), LinkState::Running);
    }

    #[test]
    fn down_at_recover_boundary_stays_down() {
        let mut conn = running_since(1_000);
        conn.note_transport_failure();
        conn.note_pong(2_000);
        assert_eq!(conn.evaluate(2_060), Liveness::Stable);
        assert!(conn.is_down());
    }

    #[test]
    fn fatal_staleness_demands_restart() {
        let mut conn = running_since(1_000);
        conn.note_transport_failure();
        assert_eq!(conn.evaluate(1_301), Liveness::RestartRequired);
        assert!(conn.is_down());
    }

    #[test]
    fn fatal_staleness_reached_while_running_restarts_same_cycle() {
        let mut conn = running_since(1_000);
        assert_eq!(conn.evaluate(1_301), Liveness::RestartRequired);
    }

    #[test]
    fn publish_failure_degrades_only_running() {
        let mut conn = Connectivity::new();
        conn.note_transport_failure();
        assert_eq!(conn.state(), LinkState::Starting);

        conn.begin_running(0);
        conn.note_transport_failure();
        assert_eq!(conn.state(), LinkState::Down);
    }

    #[test]
    fn reconnect_does_not_refresh_baseline() {
        let mut conn = running_since(1_000);
        conn.note_transport_failure();
        conn.resume_running();
        assert_eq!(conn.last_pong(), 1_000);
        // Without a fresh pong the next cycle degrades again.
        assert_eq!(conn.evaluate(1_200), Liveness::Degraded);
    }

    #[test]
    fn pong_before_baseline_is_shrugged_off() {
        let mut conn = running_since(1_000);
        conn.note_pong(400);
        assert_eq!(conn.evaluate(1_050), Liveness::Degraded);
    }
}
