//! The sampling engine: registry, scheduler and delivery.
//!
//! A single worker thread waits for sample requests and runs one pass per
//! (coalesced) request: snapshot the registry, capture, compute lumas and call
//! the listeners back. The registry and the scheduler flags live behind one
//! mutex so that "should a pass start" and "what is registered" are decided
//! atomically.

use crate::capture::{self, ActiveRegion, Compositor};
use crate::config::SamplingConfig;
use crate::listener::{DeathRecipient, ListenerHandle};
use crate::registry::{DescriptorRegistry, SampledDescriptor};
use crate::types::{LayerId, ListenerId, Rect, SamplingError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, info_span, trace, warn};

/// State shared between callers and the worker
struct State {
    registry: DescriptorRegistry,
    sample_requested: bool,
    running: bool,
    passes: u64,
    deliveries: u64,
}

struct Shared {
    state: Mutex<State>,
    condition: Condvar,
    compositor: Arc<dyn Compositor>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The one removal path, shared by explicit removal and death notices
    fn remove(&self, id: ListenerId) {
        if self.lock().registry.remove(id) {
            debug!("Removed descriptor for {}", id);
        }
    }

    /// Run one pass and return the number of callbacks made
    fn capture_sample(&self, descriptors: &[SampledDescriptor]) -> u64 {
        let _span = info_span!("capture_sample", descriptors = descriptors.len()).entered();

        match self.run_pass(descriptors) {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!("Sampling pass aborted: {}", e);
                0
            }
        }
    }

    fn run_pass(&self, descriptors: &[SampledDescriptor]) -> Result<u64, SamplingError> {
        let compositor = self.compositor.as_ref();

        let frame = match capture::capture_frame(compositor, descriptors)? {
            Some(frame) => frame,
            None => return Ok(0),
        };

        debug!("Sampling {} descriptors", frame.active.len());
        let lumas = capture::sample_frame(compositor, &frame)?;

        Ok(deliver(&frame.active, &lumas))
    }
}

impl DeathRecipient for Shared {
    fn binder_died(&self, id: ListenerId) {
        debug!("{} died", id);
        self.remove(id);
    }
}

/// Hand each active region its luma, returning the number of callbacks
/// that completed
///
/// Nothing is delivered unless there is exactly one luma per region. A
/// listener that panics is skipped; the others still get their sample.
fn deliver(active: &[ActiveRegion], lumas: &[f32]) -> u64 {
    if lumas.len() != active.len() {
        warn!(
            "Got {} lumas for {} regions, skipping delivery",
            lumas.len(),
            active.len()
        );
        return 0;
    }

    let mut delivered = 0;
    for (region, &luma) in active.iter().zip(lumas) {
        trace!("Delivering {:.3} to {}", luma, region.id);
        let listener = &region.listener;
        match panic::catch_unwind(AssertUnwindSafe(|| listener.on_sample_collected(luma))) {
            Ok(()) => delivered += 1,
            Err(_) => error!("{} panicked in on_sample_collected", region.id),
        }
    }
    delivered
}

/// Marks the sampler stopped if the worker unwinds, so callers can see it
struct WorkerGuard {
    shared: Arc<Shared>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Region sampling thread died, no further samples will be taken");
            self.shared.lock().running = false;
        }
    }
}

fn thread_main(shared: Arc<Shared>) {
    info!("Region sampling thread started");
    let _guard = WorkerGuard {
        shared: Arc::clone(&shared),
    };

    let mut state = shared.lock();
    while state.running {
        if state.sample_requested {
            state.sample_requested = false;
            let descriptors = state.registry.snapshot();

            // The compositor may run a refresh cycle before servicing the
            // capture and request another sample from its own thread. That
            // request needs this mutex, so it can't be held across the pass.
            drop(state);
            let delivered = shared.capture_sample(&descriptors);
            drop(descriptors);
            state = shared.lock();

            state.passes += 1;
            state.deliveries += delivered;
        }

        state = shared
            .condition
            .wait_while(state, |state| state.running && !state.sample_requested)
            .unwrap_or_else(PoisonError::into_inner);
    }

    info!("Region sampling thread stopped");
}

/// Sampler status information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerStatus {
    pub running: bool,
    pub listeners: usize,
    /// Completed passes, including those with nothing to sample
    pub passes: u64,
    /// Listener callbacks made
    pub deliveries: u64,
}

/// Background sampler measuring the brightness of registered screen regions
pub struct RegionSampler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RegionSampler {
    /// Start the sampling thread
    pub fn new(
        compositor: Arc<dyn Compositor>,
        config: &SamplingConfig,
    ) -> Result<Self, SamplingError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                registry: DescriptorRegistry::new(),
                sample_requested: false,
                running: true,
                passes: 0,
                deliveries: 0,
            }),
            condition: Condvar::new(),
            compositor,
        });

        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || thread_main(worker))
            .map_err(SamplingError::ThreadSpawn)?;

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Register interest in `area`, replacing any earlier registration of
    /// the same listener
    ///
    /// With a `stop_layer`, that layer and everything drawn after it are left
    /// out of the capture.
    pub fn add_listener(&self, area: Rect, stop_layer: Option<LayerId>, listener: &ListenerHandle) {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let recipient: Weak<dyn DeathRecipient> = shared;
        if let Err(e) = listener.listener().link_to_death(listener.id(), recipient) {
            warn!("Failed to watch {}: {}", listener.id(), e);
        }

        let mut state = self.shared.lock();
        state.registry.insert(listener, area, stop_layer);
        debug!(
            "Added {} for {:?} ({} registered)",
            listener.id(),
            area,
            state.registry.len()
        );
    }

    /// Stop sampling for `listener`; no-op if it isn't registered
    pub fn remove_listener(&self, listener: &ListenerHandle) {
        self.shared.remove(listener.id());
    }

    /// Death notification for a listener channel
    pub fn on_listener_died(&self, id: ListenerId) {
        self.shared.binder_died(id);
    }

    /// Ask for a pass; requests made before the worker wakes share one pass
    pub fn request_sample(&self) {
        let mut state = self.shared.lock();
        state.sample_requested = true;
        self.shared.condition.notify_one();
    }

    pub fn is_registered(&self, listener: &ListenerHandle) -> bool {
        self.shared.lock().registry.contains(listener.id())
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock().registry.len()
    }

    pub fn status(&self) -> SamplerStatus {
        let state = self.shared.lock();
        SamplerStatus {
            running: state.running,
            listeners: state.registry.len(),
            passes: state.passes,
            deliveries: state.deliveries,
        }
    }

    /// Stop the worker and wait for it; an in-flight pass runs to completion
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.running = false;
            self.shared.condition.notify_one();
        }

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a listener callback; the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                error!("Region sampling thread panicked");
            }
        }
    }
}

impl Drop for RegionSampler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
