use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

use statelink_proto::Envelope;

type ConnectedHandler = Box<dyn Fn(SocketAddr) + Send + Sync>;
type DisconnectedHandler = Box<dyn Fn() + Send + Sync>;
type EnvelopeHandler = Box<dyn Fn(&Envelope) + Send + Sync>;

/// Typed subscriber lists, one per lifecycle event kind.
///
/// Handlers run on the server's network threads and must not block for
/// long; registration is allowed at any time from any thread.
#[derive(Default)]
pub struct EventHandlers {
    connected: RwLock<Vec<ConnectedHandler>>,
    disconnected: RwLock<Vec<DisconnectedHandler>>,
    envelope: RwLock<Vec<EnvelopeHandler>>,
}

impl EventHandlers {
    pub fn on_connected(&self, handler: impl Fn(SocketAddr) + Send + Sync + 'static) {
        self.connected
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.disconnected
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    pub fn on_envelope(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        self.envelope
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    pub fn notify_connected(&self, addr: SocketAddr) {
        for handler in self
            .connected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            handler(addr);
        }
    }

    pub fn notify_disconnected(&self) {
        for handler in self
            .disconnected
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            handler();
        }
    }

    pub fn notify_envelope(&self, envelope: &Envelope) {
        for handler in self
            .envelope
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            handler(envelope);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[test]
    fn all_registered_handlers_fire() {
        let handlers = EventHandlers::default();
        let hits = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            handlers.on_disconnected(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        handlers.notify_disconnected();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn envelope_handlers_see_the_envelope() {
        let handlers = EventHandlers::default();
        let seen_frame = Arc::new(AtomicUsize::new(0));
        {
            let seen_frame = Arc::clone(&seen_frame);
            handlers.on_envelope(move |env| {
                seen_frame.store(env.frame as usize, Ordering::SeqCst);
            });
        }

        let env = Envelope::parse(&json!({"type": "DATA", "frame": 17})).unwrap();
        handlers.notify_envelope(&env);
        assert_eq!(seen_frame.load(Ordering::SeqCst), 17);
    }

    #[test]
    fn notify_without_handlers_is_fine() {
        let handlers = EventHandlers::default();
        handlers.notify_connected("127.0.0.1:9527".parse().unwrap());
        handlers.notify_disconnected();
    }
}
