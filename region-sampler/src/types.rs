//! Core types used throughout the region sampler.
//!
//! This module defines the screen geometry, the stable identities used to
//! refer to layers and listeners without owning them, and the error type.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a display
pub type DisplayId = u32;

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_LAYER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a registered listener channel.
///
/// Ids come from a process-wide counter and are never reused, so a stale id
/// can only ever resolve to "absent".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

/// Stable identity of a compositor layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u64);

impl LayerId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_LAYER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// Screen rectangle with exclusive right/bottom edges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const EMPTY: Rect = Rect {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };

    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle anchored at the origin with the given size
    pub fn from_size(width: u32, height: u32) -> Self {
        Self::new(
            0,
            0,
            i32::try_from(width).unwrap_or(i32::MAX),
            i32::try_from(height).unwrap_or(i32::MAX),
        )
    }

    /// Horizontal extent, saturating at the `i32` range
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Number of pixels covered, zero for empty rectangles
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width() as u64 * self.height() as u64
        }
    }

    /// Top-left corner
    pub fn left_top(&self) -> (i32, i32) {
        (self.left, self.top)
    }

    /// Overlap of two rectangles, `None` when they do not overlap
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let result = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if result.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Bounding rectangle of both; empty operands are ignored
    pub fn union(&self, other: &Rect) -> Rect {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Rect::new(
            self.left.min(other.left),
            self.top.min(other.top),
            self.right.max(other.right),
            self.bottom.max(other.bottom),
        )
    }

    /// Translate by `(-dx, -dy)`, i.e. express in a frame whose origin is `(dx, dy)`
    pub fn offset_by(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(
            self.left.saturating_sub(dx),
            self.top.saturating_sub(dy),
            self.right.saturating_sub(dx),
            self.bottom.saturating_sub(dy),
        )
    }

    /// Check if a point is inside this rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Axis-aligned layer transform (scale, then translate)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale_x: f32,
    pub scale_y: f32,
    pub translate_x: f32,
    pub translate_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            scale_x: 1.0,
            scale_y: 1.0,
            translate_x: 0.0,
            translate_y: 0.0,
        }
    }

    pub fn translate(x: f32, y: f32) -> Self {
        Self {
            translate_x: x,
            translate_y: y,
            ..Self::identity()
        }
    }

    pub fn with_scale(mut self, scale_x: f32, scale_y: f32) -> Self {
        self.scale_x = scale_x;
        self.scale_y = scale_y;
        self
    }

    /// Map a local rectangle to screen space
    pub fn map_rect(&self, rect: &Rect, round_outwards: bool) -> Rect {
        let x0 = rect.left as f32 * self.scale_x + self.translate_x;
        let x1 = rect.right as f32 * self.scale_x + self.translate_x;
        let y0 = rect.top as f32 * self.scale_y + self.translate_y;
        let y1 = rect.bottom as f32 * self.scale_y + self.translate_y;

        let (left, right) = (x0.min(x1), x0.max(x1));
        let (top, bottom) = (y0.min(y1), y0.max(y1));

        if round_outwards {
            Rect::new(
                left.floor() as i32,
                top.floor() as i32,
                right.ceil() as i32,
                bottom.ceil() as i32,
            )
        } else {
            Rect::new(
                left.round() as i32,
                top.round() as i32,
                right.round() as i32,
                bottom.round() as i32,
            )
        }
    }
}

/// Color space requested for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dataspace {
    Srgb,
}

/// Output rotation requested for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rot0,
}

/// Errors that can occur while sampling
#[derive(Debug, thiserror::Error)]
pub enum SamplingError {
    #[error("Failed to lock pixel buffer for reading")]
    BufferLock,

    #[error("Screen capture failed: {0}")]
    Capture(String),

    #[error("Failed to link to listener death notification: {0}")]
    DeathLink(String),

    #[error("Failed to spawn sampling thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    #[error("Failed to encode configuration: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_size() {
        let rect = Rect::new(5, 5, 15, 25);
        assert_eq!(rect.width(), 10);
        assert_eq!(rect.height(), 20);
        assert_eq!(rect.area(), 200);
        assert!(!rect.is_empty());
        assert_eq!(Rect::new(3, 3, 3, 10).area(), 0);
    }

    #[test]
    fn test_rect_extents_saturate() {
        let wide = Rect::new(-2_000_000_000, 0, 2_000_000_000, 1);
        assert_eq!(wide.width(), i32::MAX);
        assert!(!wide.is_empty());
        assert_eq!(wide.area(), i32::MAX as u64);

        let inverted = Rect::new(2_000_000_000, 0, -2_000_000_000, 1);
        assert_eq!(inverted.width(), i32::MIN);
        assert!(inverted.is_empty());

        let shifted = Rect::new(0, 0, 10, 10).offset_by(-2_000_000_000, i32::MIN);
        assert_eq!(shifted.left, 2_000_000_000);
        assert_eq!(shifted.bottom, i32::MAX);
        assert_eq!(Rect::from_size(u32::MAX, 4).right, i32::MAX);
    }

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 15, 15);
        assert_eq!(a.intersect(&b), Some(Rect::new(5, 5, 10, 10)));

        // Touching edges do not overlap
        let c = Rect::new(10, 0, 20, 10);
        assert_eq!(a.intersect(&c), None);
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_rect_union_ignores_empty() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, 5, 15, 15);
        assert_eq!(a.union(&b), Rect::new(0, 0, 15, 15));
        assert_eq!(Rect::EMPTY.union(&b), b);
        assert_eq!(a.union(&Rect::EMPTY), a);
    }

    #[test]
    fn test_rect_offset_and_contains() {
        let rect = Rect::new(5, 5, 15, 15).offset_by(5, 5);
        assert_eq!(rect, Rect::new(0, 0, 10, 10));
        assert!(rect.contains(0, 0));
        assert!(!rect.contains(10, 10));
        assert!(!rect.contains(-1, 5));
    }

    #[test]
    fn test_transform_rounds_outwards() {
        let transform = Transform::translate(0.5, 0.5);
        let mapped = transform.map_rect(&Rect::new(0, 0, 10, 10), true);
        assert_eq!(mapped, Rect::new(0, 0, 11, 11));

        let scaled = Transform::translate(100.0, 0.0).with_scale(2.0, 0.5);
        assert_eq!(
            scaled.map_rect(&Rect::new(0, 0, 10, 10), true),
            Rect::new(100, 0, 120, 5)
        );
    }

    #[test]
    fn test_ids_are_unique() {
        let a = ListenerId::next();
        let b = ListenerId::next();
        assert_ne!(a, b);
        assert_ne!(LayerId::next(), LayerId::next());
        assert!(a.to_string().starts_with("listener#"));
    }
}
