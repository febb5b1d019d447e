//! Region Sampler - Demo entry point
//!
//! Runs the sampler against a synthetic compositor. A timer stands in for the
//! display refresh signal: every tick animates the scene and requests a
//! sample, and each registered region logs the luma it receives.
//!
//! # Usage
//!
//! ```bash
//! region-sampler                      # default config path
//! region-sampler /path/to/config.toml
//! ```

use image::Rgba;
use region_sampler::{
    Compositor, Config, FnListener, ListenerHandle, Rect, RegionSampler, SceneLayer,
    SyntheticCompositor,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Brightness of the animated content layer for a frame (triangle wave)
fn content_level(frame: u64) -> u8 {
    let phase = (frame * 4 % 510) as u16;
    if phase > 255 {
        (510 - phase) as u8
    } else {
        phase as u8
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);
    let config = Config::load_from_path(&config_path);

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();

    info!("Starting Region Sampler");
    info!("Configuration loaded from {:?}", config_path);

    if !config.general.enabled {
        info!("Sampler is disabled in configuration, exiting");
        return Ok(());
    }

    let demo = &config.demo;
    let display = Rect::from_size(demo.width, demo.height);

    // Build the scene, back to front
    let compositor = Arc::new(SyntheticCompositor::new(0).with_size(demo.width, demo.height));
    compositor.add_layer(SceneLayer::gray("wallpaper", display, 40));
    let content = compositor.add_layer(SceneLayer::gray(
        "content",
        Rect::new(0, 48, demo.width as i32, demo.height as i32 - 72),
        0,
    ));
    compositor.add_layer(SceneLayer::new(
        "status-bar-scrim",
        Rect::new(0, 0, demo.width as i32, 96),
        Rgba([0, 0, 0, 96]),
    ));
    // The sampled UI's own overlay; regions registered with it as stop layer
    // ignore it and everything drawn above it
    let overlay = compositor.add_layer(SceneLayer::new(
        "navigation-overlay",
        Rect::new(0, demo.height as i32 - 144, demo.width as i32, demo.height as i32),
        Rgba([255, 255, 255, 128]),
    ));

    let sampler = RegionSampler::new(
        Arc::clone(&compositor) as Arc<dyn Compositor>,
        &config.sampling,
    )?;

    let listeners: Vec<ListenerHandle> = demo
        .regions
        .iter()
        .enumerate()
        .map(|(index, area)| {
            let listener = FnListener::handle(move |luma| {
                info!(region = index, luma = %format!("{:.3}", luma), "Sample collected");
            });
            let stop_layer = if index == 0 { None } else { Some(overlay) };
            sampler.add_listener(*area, stop_layer, &listener);
            listener
        })
        .collect();

    info!(
        "Sampling {} regions every {}ms for {} frames",
        listeners.len(),
        demo.frame_interval_ms,
        demo.frames
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(demo.frame_interval_ms.max(1)));
    let mut frame = 0;
    while frame < demo.frames {
        tokio::select! {
            _ = ticker.tick() => {
                let level = content_level(frame);
                compositor.animate(content, Rgba([level, level, level, 255]));
                sampler.request_sample();
                frame += 1;
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted");
                break;
            }
        }
    }

    // Let the last requested pass finish before reporting
    tokio::time::sleep(Duration::from_millis(demo.frame_interval_ms.max(1))).await;
    let status = sampler.status();
    info!(
        "Done: {} passes, {} deliveries, {} listeners",
        status.passes, status.deliveries, status.listeners
    );

    sampler.shutdown();
    Ok(())
}
