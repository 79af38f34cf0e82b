use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use crate::codec::Packet;
use crate::config::SessionConfig;
use crate::session::{Shared, State};

/// Keepalive bookkeeping of a connection
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timers {
    /// last time a packet was written
    pub(crate) last_action_at: Instant,
    /// PINGREQ is sent and PINGRESP is not received yet
    pub(crate) ping_pending: bool,
    pub(crate) last_ping_sent_at: Option<Instant>,
    /// CONNECT is sent and CONNACK is not received yet
    pub(crate) connecting_since: Option<Instant>,
}

impl Timers {
    pub(crate) fn new(now: Instant) -> Self {
        Timers {
            last_action_at: now,
            ping_pending: false,
            last_ping_sent_at: None,
            connecting_since: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Action {
    Idle,
    /// send PINGREQ
    Ping,
    /// PINGRESP did not arrive within grace period
    Expired,
    /// CONNACK did not arrive within handshake timeout
    HandshakeTimeout,
}

/// Keepalive policy
#[derive(Debug, Copy, Clone)]
pub(crate) struct KeepAlive {
    /// zero disables pings
    interval: Duration,
    grace: Duration,
    handshake_timeout: Option<Duration>,
}

impl KeepAlive {
    pub(crate) fn new(cfg: &SessionConfig) -> Self {
        KeepAlive {
            interval: cfg.keep_alive_interval(),
            grace: cfg.ping_grace(),
            handshake_timeout: cfg.handshake_timeout_interval(),
        }
    }

    /// Decide what the scheduler does at `now`
    pub(crate) fn poll(&self, state: State, timers: &Timers, now: Instant) -> Action {
        if state == State::Disconnected {
            return Action::Idle;
        }

        if timers.ping_pending {
            let expired = timers
                .last_ping_sent_at
                .map_or(false, |sent| now.saturating_duration_since(sent) > self.grace);
            return if expired { Action::Expired } else { Action::Idle };
        }

        match state {
            State::Connecting => match (self.handshake_timeout, timers.connecting_since) {
                (Some(timeout), Some(since)) if now.saturating_duration_since(since) > timeout => {
                    Action::HandshakeTimeout
                }
                _ => Action::Idle,
            },
            State::Connected
                if !self.interval.is_zero()
                    && now.saturating_duration_since(timers.last_action_at) >= self.interval =>
            {
                Action::Ping
            }
            _ => Action::Idle,
        }
    }
}

/// Keepalive scheduler loop of one connection.
///
/// Never writes to the transport itself, pings are queued to the writer so
/// a stalled write cannot hold back expiry. Exits when `stop` sender is
/// dropped or the session moves to another connection.
pub(crate) fn run(shared: Arc<Shared>, generation: u64, stop: mpsc::Receiver<()>, tick: Duration) {
    log::trace!("Keepalive scheduler started, tick {:?}", tick);

    loop {
        match stop.recv_timeout(tick) {
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }

        let mut inner = shared.lock();
        if !inner.is_current(generation) {
            break;
        }

        let now = Instant::now();
        let keepalive = KeepAlive::new(&inner.config);
        match keepalive.poll(inner.state, &inner.timers, now) {
            Action::Idle => {}
            Action::Ping => {
                log::trace!("Sending PINGREQ");
                // grace period runs from the moment the ping is queued
                if let Err(e) = inner.send_detached(Packet::ping_request()) {
                    log::error!("Cannot send PINGREQ: {}", e);
                    inner.close();
                    break;
                }
                inner.timers.ping_pending = true;
                inner.timers.last_ping_sent_at = Some(now);
                inner.timers.last_action_at = now;
            }
            Action::Expired => {
                drop(inner);
                log::warn!("No PINGRESP within {:?}, closing connection", keepalive.grace);
                shared.shutdown(Some(generation), true);
                break;
            }
            Action::HandshakeTimeout => {
                log::warn!(
                    "No CONNACK within {:?}, closing connection",
                    keepalive.handshake_timeout
                );
                inner.close();
                break;
            }
        }
    }

    log::trace!("Keepalive scheduler stopped");
}

#[cfg(test)]
mod tests {
    use ntex_util::time::{Millis, Seconds};

    use super::*;

    const TICK: Duration = Duration::from_millis(500);

    fn at(start: Instant, secs: u64) -> Instant {
        start + Duration::from_secs(secs)
    }

    fn keepalive(grace: u32) -> KeepAlive {
        // interval of 1s is two ticks
        KeepAlive::new(
            &SessionConfig::new().set_keep_alive(Seconds(1)).set_ping_grace_period(Millis(grace)),
        )
    }

    /// Drive the policy over `ticks` ticks the way the scheduler loop does
    fn simulate(ka: &KeepAlive, ticks: u32, respond: bool) -> (u32, u32) {
        let start = Instant::now();
        let mut state = State::Connected;
        let mut timers = Timers::new(start);
        let (mut pings, mut expired) = (0, 0);

        for n in 1..=ticks {
            let now = start + TICK * n;
            match ka.poll(state, &timers, now) {
                Action::Ping => {
                    pings += 1;
                    timers.last_action_at = now;
                    timers.ping_pending = !respond;
                    timers.last_ping_sent_at = Some(now);
                }
                Action::Expired => {
                    expired += 1;
                    state = State::Disconnected;
                    timers.ping_pending = false;
                }
                Action::Idle => {}
                Action::HandshakeTimeout => panic!("unexpected handshake timeout"),
            }
        }
        (pings, expired)
    }

    #[test]
    fn test_ping_every_interval() {
        assert_eq!(simulate(&keepalive(5_000), 10, true), (5, 0));
        assert_eq!(simulate(&keepalive(5_000), 3, true), (1, 0));
    }

    #[test]
    fn test_grace_period_expires_once() {
        // ping at tick 2, grace of 3 ticks runs out at tick 6
        assert_eq!(simulate(&keepalive(1_500), 5, false), (1, 0));
        assert_eq!(simulate(&keepalive(1_500), 6, false), (1, 1));
        assert_eq!(simulate(&keepalive(1_500), 20, false), (1, 1));
    }

    #[test]
    fn test_no_ping_while_pending() {
        let ka = keepalive(60_000);
        let start = Instant::now();
        let mut timers = Timers::new(start);
        timers.ping_pending = true;
        timers.last_ping_sent_at = Some(start);
        assert_eq!(ka.poll(State::Connected, &timers, at(start, 10)), Action::Idle);
    }

    #[test]
    fn test_disabled_keepalive() {
        let ka = KeepAlive::new(&SessionConfig::new().set_keep_alive(Seconds::ZERO));
        let start = Instant::now();
        let timers = Timers::new(start);
        assert_eq!(ka.poll(State::Connected, &timers, at(start, 3600)), Action::Idle);
    }

    #[test]
    fn test_traffic_postpones_ping() {
        let ka = keepalive(5_000);
        let start = Instant::now();
        let mut timers = Timers::new(start);
        timers.last_action_at = start + TICK;
        assert_eq!(ka.poll(State::Connected, &timers, start + TICK * 2), Action::Idle);
        assert_eq!(ka.poll(State::Connected, &timers, start + TICK * 3), Action::Ping);
    }

    #[test]
    fn test_handshake_timeout() {
        let start = Instant::now();
        let mut timers = Timers::new(start);
        timers.connecting_since = Some(start);

        let ka = KeepAlive::new(&SessionConfig::new().set_handshake_timeout(Seconds(2)));
        assert_eq!(ka.poll(State::Connecting, &timers, at(start, 2)), Action::Idle);
        assert_eq!(
            ka.poll(State::Connecting, &timers, at(start, 3)),
            Action::HandshakeTimeout
        );
        // no pings before CONNACK
        assert_eq!(ka.poll(State::Connecting, &timers, at(start, 1)), Action::Idle);

        let ka = KeepAlive::new(&SessionConfig::new());
        assert_eq!(ka.poll(State::Connecting, &timers, at(start, 600)), Action::Idle);
        assert_eq!(ka.poll(State::Disconnected, &timers, at(start, 600)), Action::Idle);
    }
}
