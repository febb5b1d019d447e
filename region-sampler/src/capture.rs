//! Screen capture orchestration for a sampling pass.
//!
//! This module decides what to render for a set of descriptors and which of
//! those descriptors the render actually served. The rendering itself belongs
//! to the [`Compositor`] collaborator, which walks its layers and asks our
//! [`LayerFilter`] whether each one should be drawn.

use crate::histogram;
use crate::listener::SamplingListener;
use crate::registry::{sampled_area, SampledDescriptor};
use crate::types::{Dataspace, DisplayId, LayerId, ListenerId, Rect, Rotation, SamplingError, Transform};
use image::RgbaImage;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// What the compositor should render into the sampling buffer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    /// Display to capture
    pub display: DisplayId,
    /// Screen area to capture
    pub source_crop: Rect,
    /// Output size; equal to the crop, so no scaling happens
    pub width: u32,
    pub height: u32,
    pub dataspace: Dataspace,
    pub rotation: Rotation,
}

impl RenderRequest {
    /// Unscaled sRGB capture of `area` on `display`
    pub fn for_area(display: DisplayId, area: Rect) -> Self {
        Self {
            display,
            source_crop: area,
            width: area.width().max(0) as u32,
            height: area.height().max(0) as u32,
            dataspace: Dataspace::Srgb,
            rotation: Rotation::Rot0,
        }
    }
}

/// A layer as seen by the traversal filter
#[derive(Debug, Clone, Copy)]
pub struct LayerSnapshot<'a> {
    pub id: LayerId,
    pub name: &'a str,
    /// Bounds in layer space
    pub bounds: Rect,
    pub transform: Transform,
}

impl LayerSnapshot<'_> {
    /// Bounds in screen space, rounded outwards
    pub fn screen_bounds(&self) -> Rect {
        self.transform.map_rect(&self.bounds, true)
    }
}

/// How the sampler intends to access locked pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    SoftwareReadOften,
}

/// RGBA8888 destination buffer for a capture
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Transparent black buffer of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row pitch in pixels
    pub fn stride(&self) -> usize {
        self.image.width() as usize
    }

    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }
}

/// Layer filter handed to the compositor for one capture
pub type LayerVisitor<'a> = dyn FnMut(&LayerSnapshot<'_>) -> bool + Send + 'a;

/// The compositor services the sampler depends on
pub trait Compositor: Send + Sync {
    /// Display sampled when no other is specified
    fn default_display(&self) -> DisplayId;

    /// Screen-space extent of `display`, `None` if it doesn't exist
    fn display_bounds(&self, display: DisplayId) -> Option<Rect>;

    /// Render the layers accepted by `filter` into `buffer`
    ///
    /// Blocks until the frame is rendered. The traversal runs on the
    /// compositor's own thread, which may call back into the sampler.
    fn capture_screen(
        &self,
        request: &RenderRequest,
        filter: &mut LayerVisitor<'_>,
        buffer: &mut PixelBuffer,
    ) -> Result<(), SamplingError>;

    /// Map the buffer for CPU access
    fn lock_pixels<'a>(&self, buffer: &'a PixelBuffer, _usage: BufferUsage) -> Option<&'a [u8]> {
        Some(buffer.as_raw())
    }

    fn unlock_pixels(&self, _buffer: &PixelBuffer) {}
}

/// Locked view of a buffer's pixels, unlocked when dropped
pub struct PixelLock<'a> {
    compositor: &'a dyn Compositor,
    buffer: &'a PixelBuffer,
    data: &'a [u8],
}

impl<'a> PixelLock<'a> {
    pub fn acquire(
        compositor: &'a dyn Compositor,
        buffer: &'a PixelBuffer,
        usage: BufferUsage,
    ) -> Result<Self, SamplingError> {
        let data = compositor
            .lock_pixels(buffer, usage)
            .ok_or(SamplingError::BufferLock)?;
        Ok(Self {
            compositor,
            buffer,
            data,
        })
    }

    pub fn data(&self) -> &[u8] {
        self.data
    }

    pub fn stride(&self) -> usize {
        self.buffer.stride()
    }
}

impl Drop for PixelLock<'_> {
    fn drop(&mut self) {
        self.compositor.unlock_pixels(self.buffer);
    }
}

/// Traversal filter deciding which layers reach the renderer
///
/// One traversal serves every descriptor, so a single stop flag is shared:
/// once any descriptor's stop layer is met, nothing after it is captured.
pub struct LayerFilter<'a> {
    descriptors: &'a [SampledDescriptor],
    sampled_area: Rect,
    stop_layer_found: bool,
    active: HashSet<ListenerId>,
}

impl<'a> LayerFilter<'a> {
    pub fn new(descriptors: &'a [SampledDescriptor], sampled_area: Rect) -> Self {
        Self {
            descriptors,
            sampled_area,
            stop_layer_found: false,
            active: HashSet::new(),
        }
    }

    /// Returns `true` if the layer should be rendered
    pub fn visit(&mut self, layer: &LayerSnapshot<'_>) -> bool {
        if self.stop_layer_found {
            return false;
        }

        if self
            .descriptors
            .iter()
            .any(|descriptor| descriptor.stop_layer == Some(layer.id))
        {
            trace!("Reached stop layer [{}] {}", layer.name, layer.id);
            self.stop_layer_found = true;
            return false;
        }

        let transformed = layer.screen_bounds();
        if !transformed.intersects(&self.sampled_area) {
            return false;
        }

        let mut intersects_any_area = false;
        for descriptor in self.descriptors {
            if transformed.intersects(&descriptor.area) {
                intersects_any_area = true;
                self.active.insert(descriptor.id);
            }
        }
        if !intersects_any_area {
            return false;
        }

        trace!(
            "Traversing [{}] [{}, {}, {}, {}]",
            layer.name,
            layer.bounds.left,
            layer.bounds.top,
            layer.bounds.right,
            layer.bounds.bottom
        );
        true
    }

    pub fn stop_layer_found(&self) -> bool {
        self.stop_layer_found
    }

    pub fn is_active(&self, id: ListenerId) -> bool {
        self.active.contains(&id)
    }

    pub fn into_active(self) -> HashSet<ListenerId> {
        self.active
    }
}

/// A descriptor that received content this pass
#[derive(Clone)]
pub struct ActiveRegion {
    pub id: ListenerId,
    /// Screen-space area, as registered
    pub area: Rect,
    pub listener: Arc<dyn SamplingListener>,
}

/// Result of a successful capture
pub struct CapturedFrame {
    /// Screen area the buffer covers
    pub sampled_area: Rect,
    pub buffer: PixelBuffer,
    pub active: Vec<ActiveRegion>,
}

/// Render the union of `descriptors` and work out which of them it served
///
/// The capture is clipped to the display, so regions reaching off screen
/// only contribute their visible part. Returns `Ok(None)` when there is
/// nothing to sample.
pub fn capture_frame(
    compositor: &dyn Compositor,
    descriptors: &[SampledDescriptor],
) -> Result<Option<CapturedFrame>, SamplingError> {
    if descriptors.is_empty() {
        return Ok(None);
    }

    let display = compositor.default_display();
    let display_bounds = compositor
        .display_bounds(display)
        .ok_or_else(|| SamplingError::Capture(format!("unknown display {}", display)))?;

    let sampled_area = match sampled_area(descriptors).intersect(&display_bounds) {
        Some(area) => area,
        None => {
            debug!("No sampling area is on screen, skipping capture");
            return Ok(None);
        }
    };

    let request = RenderRequest::for_area(display, sampled_area);
    let mut buffer = PixelBuffer::new(request.width, request.height);

    let mut filter = LayerFilter::new(descriptors, sampled_area);
    compositor.capture_screen(&request, &mut |layer| filter.visit(layer), &mut buffer)?;
    let listeners = filter.into_active();

    let active: Vec<ActiveRegion> = descriptors
        .iter()
        .filter(|descriptor| listeners.contains(&descriptor.id))
        .map(|descriptor| ActiveRegion {
            id: descriptor.id,
            area: descriptor.area,
            listener: Arc::clone(&descriptor.listener),
        })
        .collect();

    Ok(Some(CapturedFrame {
        sampled_area,
        buffer,
        active,
    }))
}

/// Compute one luma per active region of a captured frame
pub fn sample_frame(
    compositor: &dyn Compositor,
    frame: &CapturedFrame,
) -> Result<Vec<f32>, SamplingError> {
    let pixels = PixelLock::acquire(compositor, &frame.buffer, BufferUsage::SoftwareReadOften)?;

    let areas: Vec<Rect> = frame.active.iter().map(|region| region.area).collect();
    Ok(histogram::sample_buffer(
        pixels.data(),
        pixels.stride(),
        frame.sampled_area.left_top(),
        &areas,
    ))
}
