use std::sync::Arc;

use relaychat_frame::{Frame, BROADCAST};
use tracing::{debug, trace};

use crate::connection::{Connection, Identity};
use crate::interceptor;
use crate::registry::Registry;

/// Where a routed frame went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Everyone except the sender.
    Broadcast,
    /// A single registered connection.
    Direct(Identity),
    /// The declared target is not connected; the frame was dropped.
    Unknown(Identity),
}

/// Outcome of routing one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub route: Route,
    /// Destinations the frame was fully written to.
    pub delivered: usize,
    /// Destinations whose write failed.
    pub failed: usize,
    /// Whether a call-status announcement was broadcast as well.
    pub announced: bool,
}

/// Decides where each incoming frame goes and writes it there.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct Router {
    registry: Arc<Registry>,
}

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// The registry this router resolves identities against.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Route a frame received from `source`.
    ///
    /// The frame's routing id is the client-declared target on the way in;
    /// it is replaced by `source` before forwarding so receivers always see
    /// the true sender. Target 0 goes to every other connection, any other
    /// target to that connection alone if it is registered. Call-control
    /// frames are additionally announced to everyone as system text.
    pub fn route(&self, source: Identity, frame: Frame) -> Delivery {
        let target = frame.routing_id;
        let kind = frame.kind;
        let outgoing = frame.with_routing_id(source);

        let (route, delivered, failed) = if target == BROADCAST {
            let (delivered, failed) = fan_out(&self.registry.all_except(source), &outgoing);
            (Route::Broadcast, delivered, failed)
        } else {
            match self.registry.lookup(target) {
                Some(destination) => {
                    let (delivered, failed) = fan_out(&[destination], &outgoing);
                    (Route::Direct(target), delivered, failed)
                }
                None => {
                    debug!(source, target, kind = %kind, "target not connected, dropping frame");
                    (Route::Unknown(target), 0, 0)
                }
            }
        };

        trace!(
            source,
            target,
            kind = %kind,
            size = outgoing.body.len(),
            delivered,
            failed,
            "routed frame"
        );

        let announced = match interceptor::intercept(kind, source, target) {
            Some(notice) => {
                self.broadcast_system(&notice);
                true
            }
            None => false,
        };

        Delivery {
            route,
            delivered,
            failed,
            announced,
        }
    }

    /// Send a relay-originated frame to every registered connection.
    pub fn broadcast_system(&self, frame: &Frame) -> usize {
        let (delivered, _) = fan_out(&self.registry.all(), frame);
        debug!(delivered, text = ?frame.body_text(), "broadcast system message");
        delivered
    }
}

fn fan_out(destinations: &[Arc<Connection>], frame: &Frame) -> (usize, usize) {
    let mut delivered = 0;
    let mut failed = 0;
    for destination in destinations {
        if destination.send(frame) {
            delivered += 1;
        } else {
            failed += 1;
        }
    }
    (delivered, failed)
}
