//! Asynchronous message ports
//!
//! A side channel for control and event signalling, decoupled from the bulk
//! sample stream. Message ports are named, carry opaque payloads, and ride
//! on unbounded crossbeam channels: one channel per message *input* port,
//! with every edge targeting that port cloning the sender. Delivery is
//! FIFO per channel; the executor drains inbound messages and calls
//! `handle_message` before each streaming invocation.

use std::any::Any;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

/// Opaque message value. Receivers downcast to the concrete type they
/// agreed on with the sender.
pub type MessagePayload = Arc<dyn Any + Send + Sync>;

/// A block's outbound message fan-out, one slot per declared message
/// output port.
pub struct MessageHub {
    ports: Vec<MessagePort>,
}

struct MessagePort {
    name: String,
    destinations: Vec<Sender<MessagePayload>>,
}

impl MessageHub {
    pub fn new(ports: Vec<(String, Vec<Sender<MessagePayload>>)>) -> Self {
        Self {
            ports: ports
                .into_iter()
                .map(|(name, destinations)| MessagePort { name, destinations })
                .collect(),
        }
    }

    /// Hub with no ports, for blocks that never post.
    pub fn empty() -> Self {
        Self { ports: Vec::new() }
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    /// Resolve a message output port index by name.
    pub fn port_index(&self, name: &str) -> Option<usize> {
        self.ports.iter().position(|p| p.name == name)
    }

    /// Post a message to every destination of message output `port`.
    /// Returns the number of destinations that accepted it; disconnected
    /// destinations are skipped silently.
    pub fn post(&self, port: usize, msg: MessagePayload) -> usize {
        let Some(p) = self.ports.get(port) else {
            return 0;
        };
        p.destinations
            .iter()
            .filter(|tx| tx.send(Arc::clone(&msg)).is_ok())
            .count()
    }

    /// Post by port name; no-op returning 0 if the port doesn't exist.
    pub fn post_to(&self, name: &str, msg: MessagePayload) -> usize {
        match self.port_index(name) {
            Some(idx) => self.post(idx, msg),
            None => 0,
        }
    }
}

/// Inbound side: one receiver per declared message input port.
pub struct MessageInbox {
    pub(crate) ports: Vec<(String, Receiver<MessagePayload>)>,
}

impl MessageInbox {
    pub fn new(ports: Vec<(String, Receiver<MessagePayload>)>) -> Self {
        Self { ports }
    }

    pub fn empty() -> Self {
        Self { ports: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
