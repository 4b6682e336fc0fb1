//! Color-coded renderings of per-stage pixel state, for external display.
//!
//! Purely diagnostic: the only contract is a valid RGBA buffer of the
//! sensor's resolution.

use image::{Rgba, RgbaImage};

use crate::background_model::SharedBackground;
use crate::edges::{EdgeDetector, EdgeFlags};
use crate::segmentation::{ClaimLevel, SegmentationEngine};
use crate::zones::{Zone, ZoneMap};

/// Zones in the blue channel, difference magnitude split over green/red.
pub fn zone_image(zones: &ZoneMap) -> RgbaImage {
    let mut im = RgbaImage::new(zones.width(), zones.height());
    for (out, px) in im.pixels_mut().zip(zones.px()) {
        let diff = px.diff.clamp(0.0, 65535.0) as u32;
        let (b, a) = match px.zone {
            Zone::Error => (0x00, 0),
            Zone::Noise => (0x00, 255),
            Zone::Low => (0x40, 255),
            Zone::Mid => (0x80, 255),
            Zone::High => (0xc0, 255),
        };
        *out = Rgba([(diff & 0xff) as u8, ((diff >> 8) & 0xff) as u8, b, a]);
    }
    im
}

/// One channel per edge map: red = infrared, green = smoothness,
/// blue = height.
pub fn edge_image(edges: &EdgeDetector) -> RgbaImage {
    let mut im = RgbaImage::new(edges.width(), edges.height());
    for (out, flags) in im.pixels_mut().zip(edges.flags()) {
        let r = if flags.contains(EdgeFlags::IR) { 255 } else { 0 };
        let g = if flags.contains(EdgeFlags::DEPTH_REL) {
            255
        } else {
            0
        };
        let b = if flags.contains(EdgeFlags::DEPTH_ABS) {
            255
        } else {
            0
        };
        let a = if flags.is_empty() { 0 } else { 255 };
        *out = Rgba([r, g, b, a]);
    }
    im
}

/// Claim level in blue, blob color in green, flood distance in red;
/// rejected blobs at half opacity.
pub fn blob_image(engine: &SegmentationEngine) -> RgbaImage {
    let mut im = RgbaImage::new(engine.width(), engine.height());
    for (out, px) in im.pixels_mut().zip(engine.blob_px()) {
        let b = match px.claimed {
            None => 0x00,
            Some(ClaimLevel::Tip) => 0x20,
            Some(ClaimLevel::Finger) => 0x40,
            Some(ClaimLevel::Hand) => 0x80,
            Some(ClaimLevel::Arm) => 0xc0,
        };
        let a = if px.claimed.is_none() && px.rejected.is_none() {
            0
        } else if px.rejected.is_some() {
            128
        } else {
            255
        };
        *out = Rgba([px.dist.min(255) as u8, px.color, b, a]);
    }
    im
}

/// Latched mean in green, scaled stdev in red; pixels with no valid
/// background dimmed.
pub fn background_image(background: &SharedBackground) -> RgbaImage {
    let mut im = RgbaImage::new(background.width(), background.height());
    for (i, out) in im.pixels_mut().enumerate() {
        let mean = background.mean(i);
        let stdev = background.stdev(i);
        let a = if mean > 0.0 { 255 } else { 64 };
        *out = Rgba([
            (stdev * 5.0).clamp(0.0, 255.0) as u8,
            (mean as u32 & 0xff) as u8,
            0,
            a,
        ]);
    }
    im
}
