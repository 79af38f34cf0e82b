use std::sync::Arc;

use ntex_util::HashMap;

use crate::codec::Packet;
use crate::error::{HandlerError, SubscribeError};

/// Publish handler, called from the dispatcher thread for every PUBLISH
/// whose topic matches a subscription.
pub type Handler = Arc<dyn Fn(&Packet) -> Result<(), HandlerError> + Send + Sync>;

/// Characters that cannot appear in a topic used as a handler name
const RESERVED: &[char] = &['!', '-', '(', ')', '<', '>', '/', ';', '*', '%', '$'];

/// Resolves handler names used by `Session::subscribe` and `Session::subscribe_to`
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Handler>;
}

impl<F> HandlerResolver for F
where
    F: Fn(&str) -> Option<Handler> + Send + Sync,
{
    fn resolve(&self, name: &str) -> Option<Handler> {
        (self)(name)
    }
}

#[derive(Default, Clone)]
/// Name to handler table
pub struct HandlerMap {
    handlers: HashMap<String, Handler>,
}

impl HandlerMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register handler under the name, replaces previous handler
    pub fn register<N, F>(mut self, name: N, f: F) -> Self
    where
        N: Into<String>,
        F: Fn(&Packet) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl HandlerResolver for HandlerMap {
    fn resolve(&self, name: &str) -> Option<Handler> {
        self.handlers.get(name).cloned()
    }
}

impl std::fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerMap").field("handlers", &self.handlers.keys()).finish()
    }
}

/// Check that topic can be used as a handler name
pub(crate) fn validate_topic(topic: &str) -> Result<(), SubscribeError> {
    if topic.contains(RESERVED) {
        Err(SubscribeError::InvalidTopic(topic.to_string()))
    } else {
        Ok(())
    }
}

#[derive(Default)]
/// Registered subscriptions of a session, keyed by topic
pub(crate) struct Subscriptions {
    handlers: HashMap<String, Handler>,
}

impl Subscriptions {
    /// Register handler, returns previous handler for the topic
    pub(crate) fn insert(&mut self, topic: &str, handler: Handler) -> Option<Handler> {
        self.handlers.insert(topic.to_string(), handler)
    }

    pub(crate) fn remove(&mut self, topic: &str) -> Option<Handler> {
        self.handlers.remove(topic)
    }

    pub(crate) fn get(&self, topic: &str) -> Option<Handler> {
        self.handlers.get(topic).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use ntex_bytes::{ByteString, Bytes};
    use test_case::test_case;

    use super::*;

    #[test_case("a/b#" ; "slash")]
    #[test_case("sensor-1" ; "dash")]
    #[test_case("alert!" ; "bang")]
    #[test_case("f(x)" ; "parens")]
    #[test_case("<tag>" ; "angles")]
    #[test_case("a;b" ; "semicolon")]
    #[test_case("all*" ; "star")]
    #[test_case("50%" ; "percent")]
    #[test_case("$SYS" ; "dollar")]
    fn test_reserved_topic(topic: &str) {
        assert_eq!(validate_topic(topic), Err(SubscribeError::InvalidTopic(topic.to_string())));
    }

    #[test_case("onAB")]
    #[test_case("temperature")]
    #[test_case("room_1.sensor")]
    #[test_case("a#")]
    fn test_valid_topic(topic: &str) {
        assert_eq!(validate_topic(topic), Ok(()));
    }

    #[test]
    fn test_handler_map() {
        let map = HandlerMap::new()
            .register("onAB", |_: &Packet| Ok(()))
            .register("fail", |_: &Packet| Err("failed".into()));
        assert_eq!(map.len(), 2);
        assert!(map.resolve("missing").is_none());

        let pkt = Packet::publish(ByteString::from_static("a/b"), Bytes::new()).unwrap();
        assert!(map.resolve("onAB").map(|h| h(&pkt)).unwrap().is_ok());
        assert!(map.resolve("fail").map(|h| h(&pkt)).unwrap().is_err());
    }

    #[test]
    fn test_closure_resolver() {
        let resolver = |name: &str| -> Option<Handler> {
            if name == "any" {
                Some(Arc::new(|_: &Packet| Ok(())))
            } else {
                None
            }
        };
        assert!(HandlerResolver::resolve(&resolver, "any").is_some());
        assert!(HandlerResolver::resolve(&resolver, "none").is_none());
    }

    #[test]
    fn test_subscriptions() {
        let mut subs = Subscriptions::default();
        let handler: Handler = Arc::new(|_: &Packet| Ok(()));

        assert!(subs.insert("t", handler.clone()).is_none());
        assert!(subs.insert("t", handler.clone()).is_some());
        assert!(subs.get("t").is_some());
        assert!(subs.get("u").is_none());
        assert_eq!(subs.len(), 1);

        assert!(subs.remove("t").is_some());
        subs.insert("u", handler);
        subs.clear();
        assert_eq!(subs.len(), 0);
    }
}
