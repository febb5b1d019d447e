//! Region Sampler - Background luma sampling for display compositors
//!
//! This crate measures the brightness of caller-defined screen regions on a
//! dedicated thread so a compositor can adapt backlight or contrast without
//! stalling its rendering pipeline:
//!
//! - **Registry**: Listeners register a region and an optional stop layer
//! - **Capture**: One capture per pass covers every registered region
//! - **Histogram**: Each region is reduced to one representative luma
//!
//! # Architecture
//!
//! The [`RegionSampler`] owns a worker thread woken by [`RegionSampler::request_sample`].
//! Each pass asks the [`Compositor`] for a synchronous capture of the union of
//! all regions, filtering the layer traversal so that regions hidden behind a
//! stop layer are excluded, then delivers one luma per served region.

pub mod capture;
pub mod config;
pub mod histogram;
pub mod listener;
pub mod registry;
pub mod sampler;
pub mod scene;
pub mod types;

// Re-export commonly used types
pub use capture::{
    BufferUsage, Compositor, LayerFilter, LayerSnapshot, LayerVisitor, PixelBuffer, RenderRequest,
};
pub use config::{Config, SamplingConfig};
pub use histogram::{luma, sample_area};
pub use listener::{DeathRecipient, FnListener, ListenerHandle, SamplingListener};
pub use registry::{Descriptor, DescriptorRegistry};
pub use sampler::{RegionSampler, SamplerStatus};
pub use scene::{SceneLayer, SyntheticCompositor};
pub use types::{DisplayId, LayerId, ListenerId, Rect, SamplingError, Transform};
