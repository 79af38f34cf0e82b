use std::time::Duration;

use ntex_util::time::{Millis, Seconds};
use serde::Deserialize;

use crate::types::QoS;

/// Session tunables.
///
/// Can be built with `set_*` methods or deserialized from json,
/// missing fields take default values.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// keep alive interval in seconds, `0` disables pings
    pub keep_alive: u16,
    /// time to wait for PINGRESP, in milliseconds
    pub ping_grace_period: u32,
    /// keepalive scheduler tick, in milliseconds
    pub tick: u32,
    /// time to wait for CONNACK in seconds, `0` disables the check
    pub handshake_timeout: u16,
    /// time given to DISCONNECT to reach the transport on teardown, in milliseconds
    pub disconnect_timeout: u32,
    /// max inbound frame size, `0` is unlimited
    pub max_packet_size: u32,
    pub clean_session: bool,
    /// requested QoS in SUBSCRIBE
    pub subscribe_qos: QoS,
    pub username: Option<String>,
    pub password: Option<String>,
    /// set `TCP_NODELAY` on new connections
    pub nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        SessionConfig {
            keep_alive: 10,
            ping_grace_period: 5_000,
            tick: 250,
            handshake_timeout: 0,
            disconnect_timeout: 1_000,
            max_packet_size: 0,
            clean_session: true,
            subscribe_qos: QoS::ExactlyOnce,
            username: None,
            password: None,
            nodelay: true,
        }
    }

    /// Parse config from json document
    pub fn from_json(src: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(src)
    }

    /// Set keep alive interval.
    ///
    /// Sent to the server in CONNECT. If nothing is written for this period
    /// a PINGREQ is sent. By default keep alive is set to 10 seconds,
    /// `Seconds::ZERO` disables pings.
    pub fn set_keep_alive(mut self, val: Seconds) -> Self {
        self.keep_alive = val.0;
        self
    }

    /// Set time to wait for PINGRESP.
    ///
    /// The connection is closed if the server does not answer a ping
    /// within this period. By default grace period is 5 seconds.
    pub fn set_ping_grace_period(mut self, val: Millis) -> Self {
        self.ping_grace_period = val.0;
        self
    }

    /// Set keepalive scheduler tick.
    ///
    /// By default tick is 250 milliseconds.
    pub fn set_tick(mut self, val: Millis) -> Self {
        self.tick = val.0;
        self
    }

    /// Set handshake timeout.
    ///
    /// Defines a timeout for receiving `ConnectAck` after `Connect` is sent.
    /// By default, handshake timeout is disabled.
    pub fn set_handshake_timeout(mut self, val: Seconds) -> Self {
        self.handshake_timeout = val.0;
        self
    }

    /// Set disconnect timeout.
    ///
    /// Teardown closes the transport if DISCONNECT is not written within
    /// this time, `Millis::ZERO` closes without waiting. By default disconnect
    /// timeout is set to 1 second.
    pub fn set_disconnect_timeout(mut self, val: Millis) -> Self {
        self.disconnect_timeout = val.0;
        self
    }

    /// Set max inbound frame size.
    ///
    /// If max size is set to `0`, size is unlimited.
    /// By default max size is set to `0`
    pub fn set_max_packet_size(mut self, val: u32) -> Self {
        self.max_packet_size = val;
        self
    }

    /// Set clean session flag, by default is `true`
    pub fn set_clean_session(mut self, val: bool) -> Self {
        self.clean_session = val;
        self
    }

    /// Set requested QoS for subscriptions.
    ///
    /// By default `ExactlyOnce`.
    pub fn set_subscribe_qos(mut self, val: QoS) -> Self {
        self.subscribe_qos = val;
        self
    }

    /// Set username
    pub fn set_username<T: Into<String>>(mut self, val: T) -> Self {
        self.username = Some(val.into());
        self
    }

    /// Set password
    pub fn set_password<T: Into<String>>(mut self, val: T) -> Self {
        self.password = Some(val.into());
        self
    }

    /// Set `TCP_NODELAY` for new connections, by default is `true`
    pub fn set_nodelay(mut self, val: bool) -> Self {
        self.nodelay = val;
        self
    }

    pub(crate) fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.keep_alive))
    }

    pub(crate) fn ping_grace(&self) -> Duration {
        Duration::from_millis(u64::from(self.ping_grace_period))
    }

    pub(crate) fn disconnect_timeout_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.disconnect_timeout))
    }

    pub(crate) fn tick_interval(&self) -> Duration {
        // zero tick would spin the scheduler
        Duration::from_millis(u64::from(self.tick.max(1)))
    }

    pub(crate) fn handshake_timeout_interval(&self) -> Option<Duration> {
        if self.handshake_timeout == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.handshake_timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.keep_alive_interval(), Duration::from_secs(10));
        assert_eq!(cfg.ping_grace(), Duration::from_secs(5));
        assert_eq!(cfg.tick_interval(), Duration::from_millis(250));
        assert_eq!(cfg.handshake_timeout_interval(), None);
        assert_eq!(cfg.disconnect_timeout_interval(), Duration::from_secs(1));
        assert_eq!(cfg.subscribe_qos, QoS::ExactlyOnce);
        assert!(cfg.clean_session);
        assert!(cfg.nodelay);
    }

    #[test]
    fn test_builder() {
        let cfg = SessionConfig::new()
            .set_keep_alive(Seconds(30))
            .set_ping_grace_period(Millis(100))
            .set_tick(Millis(0))
            .set_handshake_timeout(Seconds(3))
            .set_disconnect_timeout(Millis::ZERO)
            .set_subscribe_qos(QoS::AtMostOnce)
            .set_username("user")
            .set_password("pass");

        assert_eq!(cfg.keep_alive, 30);
        assert_eq!(cfg.ping_grace(), Duration::from_millis(100));
        assert_eq!(cfg.tick_interval(), Duration::from_millis(1));
        assert_eq!(cfg.handshake_timeout_interval(), Some(Duration::from_secs(3)));
        assert_eq!(cfg.disconnect_timeout_interval(), Duration::ZERO);
        assert_eq!(cfg.subscribe_qos, QoS::AtMostOnce);
        assert_eq!(cfg.username.as_deref(), Some("user"));
        assert_eq!(cfg.password.as_deref(), Some("pass"));
    }

    #[test]
    fn test_from_json() {
        let cfg = SessionConfig::from_json(
            r#"{"keep_alive": 60, "subscribe_qos": 1, "username": "device-7"}"#,
        )
        .unwrap();
        assert_eq!(cfg.keep_alive, 60);
        assert_eq!(cfg.subscribe_qos, QoS::AtLeastOnce);
        assert_eq!(cfg.username.as_deref(), Some("device-7"));
        assert_eq!(cfg.tick, 250);

        assert!(SessionConfig::from_json(r#"{"subscribe_qos": 3}"#).is_err());
        assert_eq!(SessionConfig::from_json("{}").unwrap(), SessionConfig::default());
    }
}
