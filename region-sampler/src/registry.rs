//! Registry of sampling descriptors keyed by listener identity.
//!
//! The registry itself is not synchronized: the sampler keeps it inside the
//! same mutex-guarded state as its scheduling flags, so every mutation shares
//! one critical section with the worker's wake condition.

use crate::listener::{ListenerHandle, SamplingListener};
use crate::types::{LayerId, ListenerId, Rect};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// One registration
#[derive(Clone)]
pub struct Descriptor {
    /// Screen area to sample
    pub area: Rect,
    /// Layer at which traversal stops including content
    pub stop_layer: Option<LayerId>,
    /// Callback, held weakly
    listener: Weak<dyn SamplingListener>,
}

impl Descriptor {
    pub fn new(area: Rect, stop_layer: Option<LayerId>, listener: &ListenerHandle) -> Self {
        Self {
            area,
            stop_layer,
            listener: listener.downgrade(),
        }
    }

    /// Whether the listener is still alive
    pub fn is_alive(&self) -> bool {
        self.listener.strong_count() > 0
    }
}

/// A descriptor resolved for the duration of one pass
#[derive(Clone)]
pub struct SampledDescriptor {
    pub id: ListenerId,
    pub area: Rect,
    pub stop_layer: Option<LayerId>,
    pub listener: Arc<dyn SamplingListener>,
}

impl std::fmt::Debug for SampledDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampledDescriptor")
            .field("id", &self.id)
            .field("area", &self.area)
            .field("stop_layer", &self.stop_layer)
            .finish()
    }
}

/// Mapping from listener identity to its descriptor
#[derive(Default)]
pub struct DescriptorRegistry {
    descriptors: HashMap<ListenerId, Descriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the descriptor for `listener`
    pub fn insert(&mut self, listener: &ListenerHandle, area: Rect, stop_layer: Option<LayerId>) {
        let previous = self
            .descriptors
            .insert(listener.id(), Descriptor::new(area, stop_layer, listener));
        if previous.is_some() {
            trace!("Replaced descriptor for {}", listener.id());
        }
    }

    /// Erase the descriptor for `id`, returning whether one existed
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.descriptors.remove(&id).is_some()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.descriptors.contains_key(&id)
    }

    pub fn get(&self, id: ListenerId) -> Option<&Descriptor> {
        self.descriptors.get(&id)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Stable list of live descriptors
    ///
    /// Entries whose listener has been dropped are erased on the way.
    pub fn snapshot(&mut self) -> Vec<SampledDescriptor> {
        let mut snapshot = Vec::with_capacity(self.descriptors.len());

        self.descriptors.retain(|id, descriptor| match descriptor.listener.upgrade() {
            Some(listener) => {
                snapshot.push(SampledDescriptor {
                    id: *id,
                    area: descriptor.area,
                    stop_layer: descriptor.stop_layer,
                    listener,
                });
                true
            }
            None => {
                debug!("Dropping descriptor for released {}", id);
                false
            }
        });

        snapshot
    }
}

/// Bounding rectangle of every descriptor's area
pub fn sampled_area(descriptors: &[SampledDescriptor]) -> Rect {
    descriptors
        .iter()
        .fold(Rect::EMPTY, |bounds, descriptor| bounds.union(&descriptor.area))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;

    #[test]
    fn test_insert_and_remove() {
        let mut registry = DescriptorRegistry::new();
        let a = FnListener::handle(|_| {});
        let b = FnListener::handle(|_| {});

        registry.insert(&a, Rect::new(0, 0, 10, 10), None);
        registry.insert(&b, Rect::new(5, 5, 15, 15), None);
        assert_eq!(registry.len(), 2);

        assert!(registry.remove(a.id()));
        assert!(!registry.remove(a.id()));
        assert!(!registry.contains(a.id()));
        assert!(registry.contains(b.id()));
    }

    #[test]
    fn test_reinsert_replaces() {
        let mut registry = DescriptorRegistry::new();
        let listener = FnListener::handle(|_| {});
        let stop = LayerId::next();

        registry.insert(&listener, Rect::new(0, 0, 10, 10), None);
        registry.insert(&listener.clone(), Rect::new(20, 20, 30, 30), Some(stop));

        assert_eq!(registry.len(), 1);
        let descriptor = registry.get(listener.id()).unwrap();
        assert_eq!(descriptor.area, Rect::new(20, 20, 30, 30));
        assert_eq!(descriptor.stop_layer, Some(stop));
    }

    #[test]
    fn test_snapshot_prunes_dropped_listeners() {
        let mut registry = DescriptorRegistry::new();
        let kept = FnListener::handle(|_| {});
        let dropped = FnListener::handle(|_| {});

        registry.insert(&kept, Rect::new(0, 0, 10, 10), None);
        registry.insert(&dropped, Rect::new(0, 0, 10, 10), None);
        let dropped_id = dropped.id();
        drop(dropped);

        assert!(!registry.get(dropped_id).unwrap().is_alive());
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, kept.id());
        assert!(!registry.contains(dropped_id));
    }

    #[test]
    fn test_sampled_area_is_union() {
        let mut registry = DescriptorRegistry::new();
        let a = FnListener::handle(|_| {});
        let b = FnListener::handle(|_| {});
        registry.insert(&a, Rect::new(0, 0, 10, 10), None);
        registry.insert(&b, Rect::new(5, 5, 15, 15), None);

        assert_eq!(sampled_area(&registry.snapshot()), Rect::new(0, 0, 15, 15));
        assert_eq!(sampled_area(&[]), Rect::EMPTY);
    }
}
