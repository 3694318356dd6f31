use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use statelink_proto::{CommandOutcome, Envelope, GameEvent};
use statelink_sync::TimingIssue;

type ConnectedHandler = Box<dyn Fn(SocketAddr) + Send + Sync>;
type DisconnectedHandler = Box<dyn Fn() + Send + Sync>;
type FrameHandler = Box<dyn Fn(u64, &HashMap<String, Value>) + Send + Sync>;
type MessageHandler = Box<dyn Fn(&Envelope) + Send + Sync>;
type IssueHandler = Box<dyn Fn(&TimingIssue) + Send + Sync>;
type EventHandler = Box<dyn Fn(&GameEvent) + Send + Sync>;
type CommandResultHandler = Box<dyn Fn(&CommandOutcome) + Send + Sync>;

/// Typed subscriber lists for the facade, one per event kind, plus a
/// per-name registry for game events.
///
/// Handlers run on the network threads; registration is allowed at any
/// time from any thread.
#[derive(Default)]
pub(crate) struct Subscribers {
    connected: RwLock<Vec<ConnectedHandler>>,
    disconnected: RwLock<Vec<DisconnectedHandler>>,
    frame: RwLock<Vec<FrameHandler>>,
    message: RwLock<Vec<MessageHandler>>,
    issue: RwLock<Vec<IssueHandler>>,
    event: RwLock<HashMap<String, Vec<EventHandler>>>,
    command_result: RwLock<Vec<CommandResultHandler>>,
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

impl Subscribers {
    pub fn on_connected(&self, handler: impl Fn(SocketAddr) + Send + Sync + 'static) {
        write(&self.connected).push(Box::new(handler));
    }

    pub fn on_disconnected(&self, handler: impl Fn() + Send + Sync + 'static) {
        write(&self.disconnected).push(Box::new(handler));
    }

    pub fn on_frame(&self, handler: impl Fn(u64, &HashMap<String, Value>) + Send + Sync + 'static) {
        write(&self.frame).push(Box::new(handler));
    }

    pub fn on_message(&self, handler: impl Fn(&Envelope) + Send + Sync + 'static) {
        write(&self.message).push(Box::new(handler));
    }

    pub fn on_issue(&self, handler: impl Fn(&TimingIssue) + Send + Sync + 'static) {
        write(&self.issue).push(Box::new(handler));
    }

    pub fn on_event(&self, name: &str, handler: impl Fn(&GameEvent) + Send + Sync + 'static) {
        write(&self.event)
            .entry(name.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn on_command_result(&self, handler: impl Fn(&CommandOutcome) + Send + Sync + 'static) {
        write(&self.command_result).push(Box::new(handler));
    }

    pub fn notify_connected(&self, addr: SocketAddr) {
        for handler in read(&self.connected).iter() {
            handler(addr);
        }
    }

    pub fn notify_disconnected(&self) {
        for handler in read(&self.disconnected).iter() {
            handler();
        }
    }

    pub fn notify_frame(&self, frame: u64, updated: &HashMap<String, Value>) {
        for handler in read(&self.frame).iter() {
            handler(frame, updated);
        }
    }

    pub fn notify_message(&self, envelope: &Envelope) {
        for handler in read(&self.message).iter() {
            handler(envelope);
        }
    }

    pub fn notify_issue(&self, issue: &TimingIssue) {
        for handler in read(&self.issue).iter() {
            handler(issue);
        }
    }

    pub fn notify_event(&self, event: &GameEvent) {
        let registry = read(&self.event);
        if let Some(handlers) = registry.get(&event.name) {
            for handler in handlers {
                handler(event);
            }
        }
    }

    pub fn notify_command_result(&self, outcome: &CommandOutcome) {
        for handler in read(&self.command_result).iter() {
            handler(outcome);
        }
    }
}
