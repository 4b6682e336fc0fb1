//! Background-subtraction touch detection after Wilson's depth-camera touch
//! sensor, in three background flavors: a single captured frame, a per-pixel
//! maximum hold, and the live statistical background model.
//!
//! The pipeline is deliberately simple: band-threshold the depth difference,
//! low-pass the resulting mask with a separable boxcar filter, and take the
//! centroids of the surviving connected components as touch candidates.

use nalgebra::Point2;
use touch_tracker_types::{DepthIrFrame, TouchCandidate, WilsonBackground, WilsonTrackerCfg};

use crate::background_model::SharedBackground;
use crate::tracker::TouchStrategy;

pub struct WilsonStrategy {
    cfg: WilsonTrackerCfg,
    name: &'static str,
    width: usize,
    height: usize,
    bg: Vec<u16>,
    frame_count: usize,
    /// Band-threshold selection mask, 255 = selected.
    mask: Vec<u8>,
    /// Blob membership after filtering.
    picked: Vec<bool>,
    visited: Vec<bool>,
}

impl WilsonStrategy {
    pub fn new(width: u32, height: u32, cfg: WilsonTrackerCfg) -> Self {
        let n = width as usize * height as usize;
        let name = match cfg.background {
            WilsonBackground::SingleFrame { .. } => "wilson-single-tracker",
            WilsonBackground::MaxHold { .. } => "wilson-max-tracker",
            WilsonBackground::Statistical { .. } => "wilson-stat-tracker",
        };
        Self {
            cfg,
            name,
            width: width as usize,
            height: height as usize,
            bg: vec![0; n],
            frame_count: 0,
            mask: vec![0; n],
            picked: vec![false; n],
            visited: vec![false; n],
        }
    }

    /// Select pixels whose `background - depth` difference falls in the
    /// accepted band.
    fn depth_thresh_band(&mut self, depth: &[u16]) {
        for ((out, &bg), &d) in self.mask.iter_mut().zip(&self.bg).zip(depth) {
            let diff = bg as i32 - d as i32;
            *out = if diff >= self.cfg.thresh_low && diff <= self.cfg.thresh_high {
                255
            } else {
                0
            };
        }
    }

    /// Select pixels by z-score against the statistical background model.
    fn depth_thresh_statistical(
        &mut self,
        depth: &[u16],
        background: &SharedBackground,
        z_low: f32,
        diff_high: f32,
    ) {
        for (i, (out, &d)) in self.mask.iter_mut().zip(depth).enumerate() {
            let diff = background.mean(i) - d as f32;
            let z = diff / background.stdev(i);
            *out = if z >= z_low && diff < diff_high { 255 } else { 0 };
        }
    }

    fn boxcar_h(pixels: &mut [u8], w: usize, h: usize, filtersz: usize) {
        let mut rowsum = vec![0i32; w];
        for row in pixels.chunks_exact_mut(w).take(h) {
            rowsum[0] = 0;
            for x in 1..w {
                rowsum[x] = rowsum[x - 1] + row[x] as i32;
            }
            let div = (filtersz * 2 + 1) as i32;
            for x in 0..(filtersz + 1).min(w) {
                row[x] = 0;
            }
            for x in (filtersz + 1)..w.saturating_sub(filtersz) {
                row[x] = ((rowsum[x + filtersz] - rowsum[x - filtersz - 1]) / div) as u8;
            }
            for x in w.saturating_sub(filtersz)..w {
                row[x] = 0;
            }
        }
    }

    fn boxcar_v(pixels: &mut [u8], w: usize, h: usize, filtersz: usize) {
        let mut colsum = vec![0i32; h];
        for x in 0..w {
            colsum[0] = 0;
            for y in 1..h {
                colsum[y] = colsum[y - 1] + pixels[y * w + x] as i32;
            }
            let div = (filtersz * 2 + 1) as i32;
            for y in 0..(filtersz + 1).min(h) {
                pixels[y * w + x] = 0;
            }
            for y in (filtersz + 1)..h.saturating_sub(filtersz) {
                pixels[y * w + x] = ((colsum[y + filtersz] - colsum[y - filtersz - 1]) / div) as u8;
            }
            for y in h.saturating_sub(filtersz)..h {
                pixels[y * w + x] = 0;
            }
        }
    }

    /// Boxcar-smooth the selection mask and keep pixels above the filter
    /// threshold. Smoothing suppresses isolated band-pass noise while thin
    /// finger contacts survive.
    fn lowpass_filter(&mut self) {
        Self::boxcar_h(&mut self.mask, self.width, self.height, self.cfg.filter_size);
        Self::boxcar_v(&mut self.mask, self.width, self.height, self.cfg.filter_size);
        for (picked, &v) in self.picked.iter_mut().zip(&self.mask) {
            *picked = v > self.cfg.filter_thresh;
        }
    }

    /// Connected components of the filtered mask, 4-connected; components
    /// at or above the minimum size yield their centroid.
    fn find_blobs(&mut self) -> Vec<Point2<f32>> {
        let (w, h) = (self.width, self.height);
        let mut blobs = Vec::new();
        self.visited.fill(false);

        let mut q: Vec<usize> = Vec::new();
        for idx in 0..self.picked.len() {
            if !self.picked[idx] || self.visited[idx] {
                continue;
            }

            q.clear();
            q.push(idx);
            self.visited[idx] = true;
            let mut qtail = 0;
            while qtail < q.len() {
                let curidx = q[qtail];
                qtail += 1;
                let y = curidx / w;
                let x = curidx % w;
                if x > 0 && self.picked[curidx - 1] && !self.visited[curidx - 1] {
                    self.visited[curidx - 1] = true;
                    q.push(curidx - 1);
                }
                if x + 1 < w && self.picked[curidx + 1] && !self.visited[curidx + 1] {
                    self.visited[curidx + 1] = true;
                    q.push(curidx + 1);
                }
                if y > 0 && self.picked[curidx - w] && !self.visited[curidx - w] {
                    self.visited[curidx - w] = true;
                    q.push(curidx - w);
                }
                if y + 1 < h && self.picked[curidx + w] && !self.visited[curidx + w] {
                    self.visited[curidx + w] = true;
                    q.push(curidx + w);
                }
            }

            if q.len() < self.cfg.blob_min_size {
                continue;
            }

            let mut pos = nalgebra::Vector2::new(0.0f32, 0.0f32);
            for &i in &q {
                pos += nalgebra::Vector2::new((i % w) as f32, (i / w) as f32);
            }
            pos /= q.len() as f32;
            blobs.push(Point2::from(pos));
        }
        blobs
    }
}

impl TouchStrategy for WilsonStrategy {
    fn name(&self) -> &'static str {
        self.name
    }

    fn detect(
        &mut self,
        frame: &DepthIrFrame,
        background: &SharedBackground,
    ) -> Vec<TouchCandidate> {
        self.frame_count += 1;

        match self.cfg.background.clone() {
            WilsonBackground::SingleFrame { capture_frame } => {
                if self.frame_count == capture_frame {
                    self.bg.copy_from_slice(&frame.depth);
                }
                self.depth_thresh_band(&frame.depth);
            }
            WilsonBackground::MaxHold { frames } => {
                if self.frame_count <= frames {
                    for (bg, &d) in self.bg.iter_mut().zip(&frame.depth) {
                        if *bg < d {
                            *bg = d;
                        }
                    }
                }
                self.depth_thresh_band(&frame.depth);
            }
            WilsonBackground::Statistical {
                z_noise: _,
                z_low,
                diff_high,
            } => {
                self.depth_thresh_statistical(&frame.depth, background, z_low, diff_high);
            }
        }

        self.lowpass_filter();

        self.find_blobs()
            .into_iter()
            .map(|pt| TouchCandidate {
                tip: pt,
                base: None,
                touch_z: 0.0,
                touched: true,
            })
            .collect()
    }
}
