use std::time::Duration;

use tracing::info;

use crate::{
    clock::Timestamp,
    sink::{Notification, TelemetrySink},
};

/// Blanks the sink once the link has been down for longer than the threshold.
///
/// Fires at most once per disconnection episode; a reconnection re-arms it.
#[derive(Debug, Clone)]
pub struct StalenessMonitor {
    threshold: Option<Duration>,
    connected: bool,
    last_connected: Option<Timestamp>,
    applied: bool,
}

impl StalenessMonitor {
    /// `None` disables staleness forcing entirely.
    pub fn new(threshold: Option<Duration>) -> StalenessMonitor {
        StalenessMonitor {
            threshold,
            connected: false,
            last_connected: None,
            applied: false,
        }
    }

    pub fn on_connected(&mut self, now: Timestamp) {
        self.connected = true;
        self.last_connected = Some(now);
        self.applied = false;
    }

    pub fn on_disconnected(&mut self, now: Timestamp) {
        if self.connected {
            self.last_connected = Some(now);
        }
        self.connected = false;
    }

    /// Returns the "now unknown" notifications if the threshold was crossed on this tick.
    pub fn on_tick(&mut self, now: Timestamp, sink: &mut TelemetrySink) -> Option<Vec<Notification>> {
        if self.connected {
            self.last_connected = Some(now);
            return None;
        }
        if self.applied {
            return None;
        }
        let threshold = self.threshold?;
        let disconnected_for = self.time_disconnected(now)?;
        if disconnected_for < threshold {
            return None;
        }

        self.applied = true;
        let notifications = sink.mark_all_unknown();
        info!(
            "disconnected for {}s, {} sensors now unknown",
            disconnected_for.as_secs(),
            notifications.len()
        );
        Some(notifications)
    }

    /// True once the current disconnection episode has been declared stale.
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    pub fn time_disconnected(&self, now: Timestamp) -> Option<Duration> {
        if self.connected {
            return None;
        }
        self.last_connected
            .map(|at| now.saturating_duration_since(at))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{clock::Timestamp, sink::TelemetrySink, telemetry::Attribute};

    use super::StalenessMonitor;

    fn populated_sink() -> TelemetrySink {
        let mut sink = TelemetrySink::new([Attribute::Asleep, Attribute::BatteryLevel]);
        sink.update(Attribute::Asleep, false.into(), Timestamp::ZERO);
        sink.update(Attribute::BatteryLevel, 72.0.into(), Timestamp::ZERO);
        sink
    }

    fn all_known(sink: &TelemetrySink) -> bool {
        sink.attributes()
            .all(|a| sink.channel(a).is_some_and(|c| c.is_known()))
    }

    #[test]
    fn thirty_second_threshold_scenario() {
        let mut sink = populated_sink();
        let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(30)));
        monitor.on_connected(Timestamp::ZERO);
        monitor.on_disconnected(Timestamp::ZERO);

        assert_eq!(monitor.on_tick(Timestamp::from_secs(29), &mut sink), None);
        assert!(all_known(&sink));

        let fired = monitor.on_tick(Timestamp::from_secs(31), &mut sink).unwrap();
        assert_eq!(fired.len(), 2);
        assert!(!sink.any_known());
    }

    #[test]
    fn fires_once_per_episode() {
        let mut sink = populated_sink();
        let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(30)));
        monitor.on_connected(Timestamp::ZERO);
        monitor.on_disconnected(Timestamp::from_secs(10));
        assert!(monitor.on_tick(Timestamp::from_secs(40), &mut sink).is_some());
        assert!(monitor.is_applied());
        assert_eq!(monitor.on_tick(Timestamp::from_secs(41), &mut sink), None);
        assert_eq!(monitor.on_tick(Timestamp::from_secs(500), &mut sink), None);
    }

    #[test]
    fn reconnection_rearms() {
        let mut sink = populated_sink();
        let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(30)));
        monitor.on_connected(Timestamp::ZERO);
        monitor.on_disconnected(Timestamp::ZERO);
        monitor.on_tick(Timestamp::from_secs(30), &mut sink);

        monitor.on_connected(Timestamp::from_secs(60));
        assert!(!monitor.is_applied());
        sink.update(Attribute::BatteryLevel, 71.0.into(), Timestamp::from_secs(61));
        monitor.on_tick(Timestamp::from_secs(100), &mut sink);
        monitor.on_disconnected(Timestamp::from_secs(120));

        assert_eq!(monitor.on_tick(Timestamp::from_secs(149), &mut sink), None);
        let fired = monitor.on_tick(Timestamp::from_secs(150), &mut sink).unwrap();
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn connected_ticks_refresh_last_contact() {
        let mut sink = populated_sink();
        let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(30)));
        monitor.on_connected(Timestamp::ZERO);
        assert_eq!(monitor.on_tick(Timestamp::from_secs(100), &mut sink), None);
        assert_eq!(monitor.time_disconnected(Timestamp::from_secs(100)), None);
        monitor.on_disconnected(Timestamp::from_secs(100));
        assert_eq!(
            monitor.time_disconnected(Timestamp::from_secs(110)),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn zero_threshold_disables_forcing() {
        let mut sink = populated_sink();
        let mut monitor = StalenessMonitor::new(None);
        monitor.on_connected(Timestamp::ZERO);
        monitor.on_disconnected(Timestamp::ZERO);
        assert_eq!(monitor.on_tick(Timestamp::from_secs(100_000), &mut sink), None);
        assert!(all_known(&sink));
    }

    #[test]
    fn never_connected_has_nothing_to_invalidate() {
        let mut sink = TelemetrySink::with_all_attributes();
        let mut monitor = StalenessMonitor::new(Some(Duration::from_secs(1)));
        assert_eq!(monitor.on_tick(Timestamp::from_secs(3600), &mut sink), None);
    }
}
