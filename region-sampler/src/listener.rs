//! Listener capabilities and death notification.
//!
//! A listener is whatever wants brightness results. The sampler only ever
//! holds listeners weakly and refers to them by [`ListenerId`], so a listener
//! that goes away simply drops out of the registry.

use crate::types::{ListenerId, SamplingError};
use std::sync::{Arc, Weak};

/// Receives luma samples for a registered region
pub trait SamplingListener: Send + Sync {
    /// Called on the sampling thread with a luma in `[0, 1]`
    fn on_sample_collected(&self, luma: f32);

    /// Subscribe `recipient` to this listener's death notification
    ///
    /// In-process listeners never die behind the sampler's back, so the
    /// default does nothing.
    fn link_to_death(
        &self,
        _id: ListenerId,
        _recipient: Weak<dyn DeathRecipient>,
    ) -> Result<(), SamplingError> {
        Ok(())
    }
}

/// Observer of listener channel deaths; may be invoked on any thread
pub trait DeathRecipient: Send + Sync {
    fn binder_died(&self, id: ListenerId);
}

/// A listener paired with its stable identity
///
/// Clones share the identity, so registering a clone replaces the earlier
/// registration.
#[derive(Clone)]
pub struct ListenerHandle {
    id: ListenerId,
    listener: Arc<dyn SamplingListener>,
}

impl ListenerHandle {
    pub fn new(listener: Arc<dyn SamplingListener>) -> Self {
        Self {
            id: ListenerId::next(),
            listener,
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn listener(&self) -> &Arc<dyn SamplingListener> {
        &self.listener
    }

    pub(crate) fn downgrade(&self) -> Weak<dyn SamplingListener> {
        Arc::downgrade(&self.listener)
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

/// Wrap a closure as a listener
pub struct FnListener<F>(F);

impl<F> FnListener<F>
where
    F: Fn(f32) + Send + Sync + 'static,
{
    pub fn new(callback: F) -> Self {
        Self(callback)
    }

    /// Build a handle around the closure in one step
    pub fn handle(callback: F) -> ListenerHandle {
        ListenerHandle::new(Arc::new(Self(callback)))
    }
}

impl<F> SamplingListener for FnListener<F>
where
    F: Fn(f32) + Send + Sync + 'static,
{
    fn on_sample_collected(&self, luma: f32) {
        (self.0)(luma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_clone_shares_identity() {
        let handle = FnListener::handle(|_| {});
        let clone = handle.clone();
        assert_eq!(handle.id(), clone.id());
        assert_ne!(handle.id(), FnListener::handle(|_| {}).id());
    }

    #[test]
    fn test_fn_listener_forwards() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = FnListener::handle(move |luma| sink.lock().unwrap().push(luma));

        handle.listener().on_sample_collected(0.25);
        handle.listener().on_sample_collected(0.75);

        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.75]);
    }

    #[test]
    fn test_downgrade_does_not_keep_alive() {
        let handle = FnListener::handle(|_| {});
        let weak = handle.downgrade();
        assert!(weak.upgrade().is_some());
        drop(handle);
        assert!(weak.upgrade().is_none());
    }
}
