//! Luma estimation using a brightness histogram.
//!
//! A region's brightness is the luma level shared by an absolute majority of
//! its pixels, or failing that the approximate median level. Both come out of
//! a single 256-bucket histogram built over the region's pixels.

use crate::types::Rect;

/// Bytes per RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// One bucket per 8-bit luma level
const BUCKET_COUNT: usize = 256;

const MAX_LEVEL: f32 = 255.0;

// Rec. 709 primaries
const REC709_RED: f32 = 0.2126;
const REC709_GREEN: f32 = 0.7152;
const REC709_BLUE: f32 = 0.0722;

/// Relative luminance of normalized RGB under Rec. 709 weighting
pub fn luma(r: f32, g: f32, b: f32) -> f32 {
    REC709_RED * r + REC709_GREEN * g + REC709_BLUE * b
}

/// Discretize an 8-bit RGB pixel to a luma level in `0..=255`
pub fn luma_level(r: u8, g: u8, b: u8) -> u8 {
    let value = luma(
        r as f32 / MAX_LEVEL,
        g as f32 / MAX_LEVEL,
        b as f32 / MAX_LEVEL,
    );
    (value * MAX_LEVEL).round().clamp(0.0, MAX_LEVEL) as u8
}

/// Compute the representative luma of `area` within an RGBA pixel buffer
///
/// `stride` is the row pitch in pixels. The rectangle is buffer-relative and is
/// clipped to the rows and columns actually present in `data`.
///
/// Algorithm:
/// 1. Count pixels per luma level, row by row
/// 2. Return as soon as one level holds more than half the pixels
/// 3. Otherwise return the smallest level whose cumulative count passes half
///
/// Returns 0 for an empty region.
pub fn sample_area(data: &[u8], stride: usize, area: &Rect) -> f32 {
    if stride == 0 {
        return 0.0;
    }

    let rows = data.len() / (stride * BYTES_PER_PIXEL);
    let bounds = Rect::new(
        0,
        0,
        i32::try_from(stride).unwrap_or(i32::MAX),
        i32::try_from(rows).unwrap_or(i32::MAX),
    );
    let area = match area.intersect(&bounds) {
        Some(area) => area,
        None => return 0.0,
    };

    let majority = area.area() / 2;
    let mut buckets = [0u64; BUCKET_COUNT];

    for row in area.top..area.bottom {
        let row_start = row as usize * stride * BYTES_PER_PIXEL;
        let start = row_start + area.left as usize * BYTES_PER_PIXEL;
        let end = row_start + area.right as usize * BYTES_PER_PIXEL;

        for pixel in data[start..end].chunks_exact(BYTES_PER_PIXEL) {
            let level = luma_level(pixel[0], pixel[1], pixel[2]);
            let count = &mut buckets[level as usize];
            *count += 1;
            // A majority can't be overtaken by the remaining pixels
            if *count > majority {
                return level as f32 / MAX_LEVEL;
            }
        }
    }

    let mut accumulated = 0u64;
    for (level, count) in buckets.iter().enumerate() {
        accumulated += count;
        if accumulated > majority {
            return level as f32 / MAX_LEVEL;
        }
    }

    // Unreachable for a non-empty area: the total always exceeds half of it
    1.0
}

/// Sample several screen-space areas out of a buffer whose top-left corner
/// sits at `origin` on screen
pub fn sample_buffer(data: &[u8], stride: usize, origin: (i32, i32), areas: &[Rect]) -> Vec<f32> {
    areas
        .iter()
        .map(|area| sample_area(data, stride, &area.offset_by(origin.0, origin.1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn uniform(width: u32, height: u32, level: u8) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([level, level, level, 255]))
    }

    #[test]
    fn test_luma_weights_sum_to_one() {
        assert!((luma(1.0, 1.0, 1.0) - 1.0).abs() < 1e-6);
        assert_eq!(luma(0.0, 0.0, 0.0), 0.0);
        assert!(luma(0.0, 1.0, 0.0) > luma(1.0, 0.0, 0.0));
        assert!(luma(1.0, 0.0, 0.0) > luma(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_luma_level_gray_round_trips() {
        for level in [0u8, 1, 64, 128, 200, 254, 255] {
            assert_eq!(luma_level(level, level, level), level);
        }
    }

    #[test]
    fn test_uniform_regions() {
        for level in [0u8, 128, 255] {
            let image = uniform(8, 8, level);
            let value = sample_area(image.as_raw(), 8, &Rect::from_size(8, 8));
            assert_eq!(value, level as f32 / 255.0);
        }
    }

    #[test]
    fn test_majority_level_wins() {
        // 60% white, 40% black
        let mut image = uniform(10, 10, 255);
        for y in 0..4 {
            for x in 0..10 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let value = sample_area(image.as_raw(), 10, &Rect::from_size(10, 10));
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_no_majority_falls_back_to_median() {
        // Three equal thirds: dark, mid, bright
        let mut image = RgbaImage::new(3, 3);
        for y in 0..3 {
            image.put_pixel(0, y, Rgba([10, 10, 10, 255]));
            image.put_pixel(1, y, Rgba([100, 100, 100, 255]));
            image.put_pixel(2, y, Rgba([250, 250, 250, 255]));
        }
        let value = sample_area(image.as_raw(), 3, &Rect::from_size(3, 3));
        assert_eq!(value, 100.0 / 255.0);
    }

    #[test]
    fn test_fallback_near_top_of_range() {
        // Two halves: the cumulative threshold is crossed by the last bucket
        let mut image = uniform(2, 1, 254);
        image.put_pixel(1, 0, Rgba([255, 255, 255, 255]));
        let value = sample_area(image.as_raw(), 2, &Rect::from_size(2, 1));
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_zero_area_returns_zero() {
        let image = uniform(4, 4, 200);
        assert_eq!(sample_area(image.as_raw(), 4, &Rect::new(2, 2, 2, 4)), 0.0);
        assert_eq!(sample_area(image.as_raw(), 4, &Rect::new(3, 3, 1, 1)), 0.0);
        assert_eq!(sample_area(&[], 4, &Rect::from_size(4, 4)), 0.0);
        assert_eq!(sample_area(image.as_raw(), 0, &Rect::from_size(4, 4)), 0.0);
    }

    #[test]
    fn test_area_clipped_to_buffer() {
        let image = uniform(4, 4, 64);
        let value = sample_area(image.as_raw(), 4, &Rect::new(-10, -10, 100, 100));
        assert_eq!(value, 64.0 / 255.0);
        assert_eq!(sample_area(image.as_raw(), 4, &Rect::new(10, 10, 20, 20)), 0.0);
    }

    #[test]
    fn test_stride_wider_than_area() {
        // Columns beyond the sampled rect are ignored
        let mut image = uniform(8, 2, 0);
        for y in 0..2 {
            for x in 0..2 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let value = sample_area(image.as_raw(), 8, &Rect::from_size(2, 2));
        assert_eq!(value, 1.0);
    }

    #[test]
    fn test_sample_buffer_translates_areas() {
        let mut image = uniform(10, 10, 0);
        for y in 0..5 {
            for x in 5..10 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        // Buffer's top-left sits at (100, 100) on screen
        let lumas = sample_buffer(
            image.as_raw(),
            10,
            (100, 100),
            &[Rect::new(105, 100, 110, 105), Rect::new(100, 105, 105, 110)],
        );
        assert_eq!(lumas, vec![1.0, 0.0]);
    }
}
