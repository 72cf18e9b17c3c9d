//! Listeners for unsolicited node events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::trace;

use klf200_protocol::{NodeEvent, VeluxPosition};

/// Receives node position reports not attributable to a running command.
///
/// Called synchronously on the processor task, in registration order.
/// Implementations must return quickly: hand the event to a channel or
/// spawn a task instead of doing work in-line, or the read loop stalls.
pub trait EventListener: Send + Sync {
    fn on_node_event(&self, node_id: u8, position: VeluxPosition);
}

impl<F> EventListener for F
where
    F: Fn(u8, VeluxPosition) + Send + Sync,
{
    fn on_node_event(&self, node_id: u8, position: VeluxPosition) {
        self(node_id, position)
    }
}

/// Handle returned by registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    entries: RwLock<Vec<(ListenerId, Arc<dyn EventListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub(crate) fn register(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Returns `false` when `id` was not registered.
    pub(crate) fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        entries.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Delivers an event to every listener.
    ///
    /// Works on a snapshot so a listener may unregister itself.
    pub(crate) fn notify(&self, event: NodeEvent) {
        let snapshot: Vec<Arc<dyn EventListener>> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        trace!(node = event.node_id, listeners = snapshot.len(), "notifying listeners");
        for listener in snapshot {
            listener.on_node_event(event.node_id, event.position);
        }
    }
}
