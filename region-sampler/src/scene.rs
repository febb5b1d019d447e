//! In-process compositor used by the demo binary and the tests.
//!
//! Layers are kept in draw order (back to front) and rendered as solid,
//! alpha-blended rectangles. Captures run on a separate `compositor-main`
//! thread while the caller blocks, mirroring how a real compositor services
//! screenshots on its own thread.

use crate::capture::{BufferUsage, Compositor, LayerSnapshot, LayerVisitor, PixelBuffer, RenderRequest};
use crate::types::{DisplayId, LayerId, Rect, SamplingError, Transform};
use image::{Pixel, Rgba};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tracing::trace;

type RefreshHook = Arc<dyn Fn() + Send + Sync>;

/// Portrait phone-sized display
const DEFAULT_WIDTH: u32 = 1080;
const DEFAULT_HEIGHT: u32 = 1920;

/// A solid-color layer
#[derive(Debug, Clone)]
pub struct SceneLayer {
    pub id: LayerId,
    pub name: String,
    /// Bounds in layer space
    pub bounds: Rect,
    pub transform: Transform,
    pub color: Rgba<u8>,
}

impl SceneLayer {
    pub fn new(name: impl Into<String>, bounds: Rect, color: Rgba<u8>) -> Self {
        Self {
            id: LayerId::next(),
            name: name.into(),
            bounds,
            transform: Transform::identity(),
            color,
        }
    }

    /// Opaque gray layer
    pub fn gray(name: impl Into<String>, bounds: Rect, level: u8) -> Self {
        Self::new(name, bounds, Rgba([level, level, level, 255]))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    fn snapshot(&self) -> LayerSnapshot<'_> {
        LayerSnapshot {
            id: self.id,
            name: &self.name,
            bounds: self.bounds,
            transform: self.transform,
        }
    }
}

/// Compositor with a software scene
pub struct SyntheticCompositor {
    display: DisplayId,
    bounds: Rect,
    layers: Mutex<Vec<SceneLayer>>,
    refresh_hook: Mutex<Option<RefreshHook>>,
    fail_lock: AtomicBool,
    captures: AtomicUsize,
    locks: AtomicUsize,
    unlocks: AtomicUsize,
}

impl SyntheticCompositor {
    pub fn new(display: DisplayId) -> Self {
        Self {
            display,
            bounds: Rect::from_size(DEFAULT_WIDTH, DEFAULT_HEIGHT),
            layers: Mutex::new(Vec::new()),
            refresh_hook: Mutex::new(None),
            fail_lock: AtomicBool::new(false),
            captures: AtomicUsize::new(0),
            locks: AtomicUsize::new(0),
            unlocks: AtomicUsize::new(0),
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.bounds = Rect::from_size(width, height);
        self
    }

    /// Push a layer on top of the scene
    pub fn add_layer(&self, layer: SceneLayer) -> LayerId {
        let id = layer.id;
        self.lock_layers().push(layer);
        id
    }

    pub fn remove_layer(&self, id: LayerId) -> bool {
        let mut layers = self.lock_layers();
        let before = layers.len();
        layers.retain(|layer| layer.id != id);
        layers.len() != before
    }

    /// Repaint a layer with a new color, as an app drawing a new frame would
    pub fn animate(&self, id: LayerId, color: Rgba<u8>) -> bool {
        match self.lock_layers().iter_mut().find(|layer| layer.id == id) {
            Some(layer) => {
                layer.color = color;
                true
            }
            None => false,
        }
    }

    pub fn layer_count(&self) -> usize {
        self.lock_layers().len()
    }

    /// Run `hook` on the compositor thread at the start of every capture
    ///
    /// This stands in for the refresh cycle a real compositor may run before
    /// servicing a screenshot.
    pub fn set_refresh_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .refresh_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    pub fn clear_refresh_hook(&self) {
        *self
            .refresh_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Make every subsequent pixel lock fail
    pub fn set_lock_failure(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn lock_count(&self) -> usize {
        self.locks.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    fn lock_layers(&self) -> std::sync::MutexGuard<'_, Vec<SceneLayer>> {
        self.layers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Traverse `layers` back to front, painting the ones `filter` accepts
fn render(
    layers: &[SceneLayer],
    request: &RenderRequest,
    filter: &mut LayerVisitor<'_>,
    buffer: &mut PixelBuffer,
) {
    let crop = request.source_crop;
    let (left, top) = crop.left_top();

    for layer in layers {
        if !filter(&layer.snapshot()) {
            continue;
        }

        let visible = match layer.snapshot().screen_bounds().intersect(&crop) {
            Some(visible) => visible.offset_by(left, top),
            None => continue,
        };
        trace!("Painting {} over {:?}", layer.name, visible);

        let image = buffer.image_mut();
        let (width, height) = (image.width() as i32, image.height() as i32);
        for y in visible.top.max(0)..visible.bottom.min(height) {
            for x in visible.left.max(0)..visible.right.min(width) {
                image.get_pixel_mut(x as u32, y as u32).blend(&layer.color);
            }
        }
    }
}

impl Compositor for SyntheticCompositor {
    fn default_display(&self) -> DisplayId {
        self.display
    }

    fn display_bounds(&self, display: DisplayId) -> Option<Rect> {
        (display == self.display).then_some(self.bounds)
    }

    fn capture_screen(
        &self,
        request: &RenderRequest,
        filter: &mut LayerVisitor<'_>,
        buffer: &mut PixelBuffer,
    ) -> Result<(), SamplingError> {
        if request.display != self.display {
            return Err(SamplingError::Capture(format!(
                "unknown display {}",
                request.display
            )));
        }

        self.captures.fetch_add(1, Ordering::SeqCst);
        let layers = self.lock_layers().clone();
        let hook = self
            .refresh_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        thread::scope(|scope| {
            let main = thread::Builder::new()
                .name("compositor-main".to_string())
                .spawn_scoped(scope, move || {
                    if let Some(hook) = hook {
                        hook();
                    }
                    render(&layers, request, filter, buffer);
                })?;

            main.join()
                .map_err(|_| SamplingError::Capture("compositor thread panicked".to_string()))
        })
    }

    fn lock_pixels<'a>(&self, buffer: &'a PixelBuffer, _usage: BufferUsage) -> Option<&'a [u8]> {
        if self.fail_lock.load(Ordering::SeqCst) {
            return None;
        }
        self.locks.fetch_add(1, Ordering::SeqCst);
        Some(buffer.as_raw())
    }

    fn unlock_pixels(&self, _buffer: &PixelBuffer) {
        self.unlocks.fetch_add(1, Ordering::SeqCst);
    }
}
