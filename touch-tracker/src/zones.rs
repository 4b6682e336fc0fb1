//! Per-pixel classification of a depth frame against the background model.

use touch_tracker_types::ZoneCfg;

use crate::background_model::SharedBackground;

/// Ordered confidence zones. Larger positive background differences (object
/// closer to the sensor than the resting surface) rank higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Zone {
    /// No background known, or an implausible depression into the surface.
    Error,
    /// Difference indistinguishable from sensor noise.
    Noise,
    Low,
    Mid,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZonePixel {
    pub zone: Zone,
    /// Background-minus-depth difference, in depth units. Noise pixels store
    /// the absolute difference; error pixels store 0.
    pub diff: f32,
}

/// A transient per-pixel zone classification, rebuilt every frame.
pub struct ZoneMap {
    width: u32,
    height: u32,
    px: Vec<ZonePixel>,
}

impl ZoneMap {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            px: vec![
                ZonePixel {
                    zone: Zone::Error,
                    diff: 0.0,
                };
                n
            ],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn px(&self) -> &[ZonePixel] {
        &self.px
    }

    #[inline]
    pub fn zone(&self, idx: usize) -> Zone {
        self.px[idx].zone
    }

    #[inline]
    pub fn diff(&self, idx: usize) -> f32 {
        self.px[idx].diff
    }

    /// Classify every pixel of `depth` against `background`, in place.
    ///
    /// A zero depth sample carries no information and classifies as noise
    /// with zero difference.
    pub fn classify(&mut self, depth: &[u16], background: &SharedBackground, cfg: &ZoneCfg) {
        assert_eq!(depth.len(), self.px.len());
        for (i, (out, &d)) in self.px.iter_mut().zip(depth).enumerate() {
            let mean = background.mean(i);
            let (diff, z) = if d != 0 {
                let diff = mean - d as f32;
                (diff, diff / background.stdev(i))
            } else {
                (0.0, 0.0)
            };

            *out = if mean == 0.0 || diff < cfg.error_diff {
                ZonePixel {
                    zone: Zone::Error,
                    diff: 0.0,
                }
            } else if z < cfg.noise_z {
                ZonePixel {
                    zone: Zone::Noise,
                    diff: diff.abs(),
                }
            } else if diff < cfg.low_diff {
                ZonePixel {
                    zone: Zone::Low,
                    diff,
                }
            } else if diff < cfg.mid_diff {
                ZonePixel {
                    zone: Zone::Mid,
                    diff,
                }
            } else {
                ZonePixel {
                    zone: Zone::High,
                    diff,
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ZoneCfg {
        ZoneCfg {
            error_diff: -10.0,
            noise_z: 0.7,
            low_diff: 12.0,
            mid_diff: 60.0,
        }
    }

    fn background(n: usize, mean: f32, stdev: f32) -> SharedBackground {
        let bg = SharedBackground::new(n as u32, 1);
        for i in 0..n {
            bg.set(i, mean, stdev);
        }
        bg
    }

    #[test]
    fn zones_form_a_ladder() {
        let bg = background(6, 1000.0, 2.0);
        let mut zones = ZoneMap::new(6, 1);
        // diffs: -20 (error), 0 via missing sample (noise), 1 (noise z=0.5),
        // 10 (low), 40 (mid), 200 (high)
        let depth = [1020u16, 0, 999, 990, 960, 800];
        zones.classify(&depth, &bg, &cfg());
        assert_eq!(zones.zone(0), Zone::Error);
        assert_eq!(zones.zone(1), Zone::Noise);
        assert_eq!(zones.zone(2), Zone::Noise);
        assert_eq!(zones.zone(3), Zone::Low);
        assert_eq!(zones.zone(4), Zone::Mid);
        assert_eq!(zones.zone(5), Zone::High);
        assert_eq!(zones.diff(5), 200.0);
        assert!(Zone::Error < Zone::Noise && Zone::Noise < Zone::Low);
        assert!(Zone::Low < Zone::Mid && Zone::Mid < Zone::High);
    }

    #[test]
    fn no_background_is_error() {
        let bg = SharedBackground::new(1, 1);
        let mut zones = ZoneMap::new(1, 1);
        zones.classify(&[500], &bg, &cfg());
        assert_eq!(zones.zone(0), Zone::Error);
    }
}
