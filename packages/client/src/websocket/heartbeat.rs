//! Liveness bookkeeping for a streaming session.
//!
//! The session task drives this from its check timer: every tick it sends a
//! probe (`probe_sent`) and asks `check` whether the peer has gone quiet for
//! longer than the configured timeout. Pongs feed `ack`, which yields the
//! round-trip latency.

use tokio::time::{Duration, Instant};

use crate::error::ClientError;

#[derive(Debug)]
pub struct Heartbeat {
    timeout: Duration,
    last_probe_sent_at: Option<Instant>,
    last_probe_ack_at: Instant,
    latency: Option<Duration>,
    /// Set once the current staleness episode has been reported.
    stale_reported: bool,
}

impl Heartbeat {
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_probe_sent_at: None,
            last_probe_ack_at: now,
            latency: None,
            stale_reported: false,
        }
    }

    /// Start a fresh liveness window, used whenever a transport is (re)opened.
    pub fn reset(&mut self, now: Instant) {
        self.last_probe_sent_at = None;
        self.last_probe_ack_at = now;
        self.stale_reported = false;
    }

    pub fn probe_sent(&mut self, now: Instant) {
        self.last_probe_sent_at = Some(now);
    }

    /// Record a pong. Returns the latency against the last probe, if any.
    pub fn ack(&mut self, now: Instant) -> Option<Duration> {
        self.last_probe_ack_at = now;
        self.stale_reported = false;

        let latency = self
            .last_probe_sent_at
            .map(|sent| now.saturating_duration_since(sent));
        if latency.is_some() {
            self.latency = latency;
        }
        latency
    }

    /// Time since the last acknowledgment.
    pub fn silence(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_probe_ack_at)
    }

    /// Fails with `StaleConnection` once the silence exceeds the timeout.
    pub fn check(&self, now: Instant) -> Result<(), ClientError> {
        let silence = self.silence(now);
        if silence > self.timeout {
            return Err(ClientError::StaleConnection(silence));
        }
        Ok(())
    }

    /// Returns `true` only for the first report of a staleness episode.
    pub fn report_stale(&mut self) -> bool {
        !std::mem::replace(&mut self.stale_reported, true)
    }

    pub fn latency(&self) -> Option<Duration> {
        self.latency
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(100);

    #[test]
    fn fresh_heartbeat_is_healthy() {
        let start = Instant::now();
        let hb = Heartbeat::new(TIMEOUT, start);
        assert!(hb.check(start).is_ok());
        assert!(hb.latency().is_none());
    }

    #[test]
    fn stale_only_strictly_after_timeout() {
        let start = Instant::now();
        let hb = Heartbeat::new(TIMEOUT, start);

        assert!(hb.check(start + TIMEOUT).is_ok());
        let err = hb.check(start + TIMEOUT + Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, ClientError::StaleConnection(d) if d == Duration::from_millis(101)));
    }

    #[test]
    fn ack_measures_latency_from_last_probe() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(TIMEOUT, start);

        hb.probe_sent(start + Duration::from_millis(10));
        let latency = hb.ack(start + Duration::from_millis(42));
        assert_eq!(latency, Some(Duration::from_millis(32)));
        assert_eq!(hb.latency(), Some(Duration::from_millis(32)));
        assert_eq!(hb.silence(start + Duration::from_millis(50)), Duration::from_millis(8));
    }

    #[test]
    fn ack_without_probe_refreshes_liveness_only() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(TIMEOUT, start);

        assert_eq!(hb.ack(start + Duration::from_millis(90)), None);
        assert!(hb.check(start + Duration::from_millis(150)).is_ok());
    }

    #[test]
    fn staleness_is_reported_once_per_episode() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(TIMEOUT, start);

        assert!(hb.report_stale());
        assert!(!hb.report_stale());

        hb.ack(start + Duration::from_millis(200));
        assert!(hb.report_stale());

        hb.reset(start + Duration::from_millis(300));
        assert!(hb.report_stale());
    }

    #[test]
    fn reset_restarts_the_window() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(TIMEOUT, start);
        hb.probe_sent(start);

        let later = start + Duration::from_secs(5);
        assert!(hb.check(later).is_err());
        hb.reset(later);
        assert!(hb.check(later + TIMEOUT).is_ok());
        assert_eq!(hb.ack(later + Duration::from_millis(5)), None);
    }
}
