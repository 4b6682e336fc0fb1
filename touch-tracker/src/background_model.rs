//! Adaptive per-pixel background model with stability classification.
//!
//! Every pixel keeps a bounded history of recent valid depth samples plus
//! running sums enabling O(1) mean/stdev recomputation. Ingestion (the fast
//! path) runs on every pixel of every frame; the statistics decision (the
//! slow path) runs on a rotating subset of pixels to bound CPU cost.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use touch_tracker_types::BackgroundCfg;

use crate::errors::{Error, Result};
use crate::fixedqueue::FixedQueue;
use crate::source::DepthIrSource;

/// Depth value history length, in frames.
pub(crate) const HIST_SIZE: usize = 100;
/// Ring buffer capacity; a power of two keeps the fast path cheap.
const HIST_QUEUE_SIZE: usize = 128;
/// Minimum number of samples required for stability.
const HIST_MIN: usize = 30;

pub(crate) const INVALID_MEAN: f32 = 0.0;
pub(crate) const INVALID_STDEV: f32 = 1e6;

/// Latched per-pixel background statistics, shared across threads.
///
/// Written by the background worker only; read concurrently by any number of
/// tracker workers. Each element is an independently valid relaxed atomic:
/// there is no cross-element atomicity, so a reader may observe a mixture of
/// old and new pixels within one frame. Consumers tolerate that one-frame
/// inconsistency. The arrays are sized at construction and never reallocated.
pub struct SharedBackground {
    width: u32,
    height: u32,
    mean: Vec<AtomicU32>,
    stdev: Vec<AtomicU32>,
}

impl SharedBackground {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        let mean = (0..n)
            .map(|_| AtomicU32::new(INVALID_MEAN.to_bits()))
            .collect();
        let stdev = (0..n)
            .map(|_| AtomicU32::new(INVALID_STDEV.to_bits()))
            .collect();
        Self {
            width,
            height,
            mean,
            stdev,
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
    pub fn num_pixels(&self) -> usize {
        self.mean.len()
    }

    /// Latched mean of one pixel. `INVALID_MEAN` (0.0) means no background
    /// is known for this pixel.
    #[inline]
    pub fn mean(&self, idx: usize) -> f32 {
        f32::from_bits(self.mean[idx].load(Ordering::Relaxed))
    }

    /// Latched standard deviation of one pixel.
    #[inline]
    pub fn stdev(&self, idx: usize) -> f32 {
        f32::from_bits(self.stdev[idx].load(Ordering::Relaxed))
    }

    #[inline]
    pub(crate) fn set(&self, idx: usize, mean: f32, stdev: f32) {
        self.mean[idx].store(mean.to_bits(), Ordering::Relaxed);
        self.stdev[idx].store(stdev.to_bits(), Ordering::Relaxed);
    }
}

/// History window of one pixel.
///
/// The window state determines whether the pixel is "stable", and when it
/// is, the mean and standard deviation used for background subtraction.
pub(crate) struct PixelHistory {
    window: FixedQueue<u16, HIST_QUEUE_SIZE>,
    sum: u64,
    sum_sq: u64,
    mean: f32,
    stdev: f32,
    stable: bool,
}

impl PixelHistory {
    pub(crate) fn new() -> Self {
        Self {
            window: FixedQueue::new(),
            sum: 0,
            sum_sq: 0,
            mean: INVALID_MEAN,
            stdev: INVALID_STDEV,
            stable: false,
        }
    }

    fn remove_one(&mut self) {
        if self.window.is_empty() {
            return;
        }
        let ival = self.window.pop() as u64;
        self.sum -= ival;
        self.sum_sq -= ival * ival;
    }

    fn add_one(&mut self, val: u16) {
        let ival = val as u64;
        self.window.push(val);
        self.sum += ival;
        self.sum_sq += ival * ival;
    }

    /// Fast path: ingest one sample. Samples outside the valid depth range
    /// count as absent and only age the window.
    pub(crate) fn update(&mut self, val: u16, cfg: &BackgroundCfg) {
        if val < cfg.min_depth || val > cfg.max_depth {
            self.remove_one();
            return;
        }
        if self.window.len() == HIST_SIZE {
            self.remove_one();
        }
        self.add_one(val);
    }

    /// Slow path: recompute window statistics and decide stability,
    /// updating the latched values in `shared` at `idx` as warranted.
    pub(crate) fn update_stats(
        &mut self,
        shared: &SharedBackground,
        idx: usize,
        cfg: &BackgroundCfg,
    ) -> bool {
        let n = self.window.len();
        if n == 0 {
            self.mean = INVALID_MEAN;
            self.stdev = INVALID_STDEV;
            self.stable = false;
            return self.stable;
        }

        let nf = n as f32;
        self.mean = self.sum as f32 / nf;
        // n^2 * var = n * sum_sq - sum^2; exact in u64 for valid depths.
        let var_nn = self.sum_sq * n as u64 - self.sum * self.sum;
        self.stdev = (var_nn as f32).sqrt() / nf;

        let latched_mean = shared.mean(idx);
        let latched_stdev = shared.stdev(idx);

        if self.mean > latched_mean + latched_stdev * cfg.z_increase_threshold {
            // The window has moved well above the stable value: something
            // new covers this pixel, and the old background is gone.
            self.stable = false;
            shared.set(idx, INVALID_MEAN, INVALID_STDEV);
        } else if self.stdev > cfg.stable_factor * (self.mean / 1000.0).powi(2) || n < HIST_MIN {
            self.stable = false;
        } else {
            self.stable = true;
            // Accept a lower mean (occluder moved away, revealing the true
            // surface) or a genuine rise; reject small upward drifts, which
            // are multipath halos around hovering objects.
            if self.mean > latched_mean + cfg.halo_threshold || self.mean < latched_mean {
                shared.set(idx, self.mean, self.stdev);
            }
        }
        self.stable
    }

    #[cfg(test)]
    fn stable(&self) -> bool {
        self.stable
    }
}

/// The full background model: one [PixelHistory] per pixel plus the shared
/// latched statistics arrays.
pub struct BackgroundModel {
    cfg: BackgroundCfg,
    pixels: Vec<PixelHistory>,
    shared: Arc<SharedBackground>,
    /// -1 while updating dynamically; >= 0 counts frames of a manual
    /// capture, freezing the model once a full window has been captured.
    capture_frame: i64,
}

impl BackgroundModel {
    pub fn new(width: u32, height: u32, cfg: BackgroundCfg) -> Self {
        let n = width as usize * height as usize;
        Self {
            cfg,
            pixels: (0..n).map(|_| PixelHistory::new()).collect(),
            shared: Arc::new(SharedBackground::new(width, height)),
            capture_frame: -1,
        }
    }

    pub fn shared(&self) -> Arc<SharedBackground> {
        self.shared.clone()
    }

    /// Switch between continuous updating and frozen-after-capture mode.
    pub fn set_dynamic_update(&mut self, dynamic: bool) {
        self.capture_frame = if dynamic { -1 } else { 0 };
    }

    /// Restart a manual background capture: ingest one more full window,
    /// then freeze.
    pub fn capture_background(&mut self) {
        self.capture_frame = 0;
    }

    /// Ingest one depth frame: fast path on every pixel, slow path on the
    /// rotating `1/pixel_stride` subset.
    pub fn ingest_frame(&mut self, depth: &[u16], frame_number: usize) -> Result<()> {
        if depth.len() != self.pixels.len() {
            return Err(Error::ImageSizeChanged);
        }
        if self.capture_frame >= HIST_SIZE as i64 {
            return Ok(());
        }
        if self.capture_frame >= 0 {
            self.capture_frame += 1;
        }

        let stride = self.cfg.pixel_stride.max(1);
        for (i, (px, &val)) in self.pixels.iter_mut().zip(depth).enumerate() {
            px.update(val, &self.cfg);
            if (i + frame_number) % stride == 0 {
                px.update_stats(&self.shared, i, &self.cfg);
            }
        }
        Ok(())
    }
}

enum BackgroundCommand {
    SetDynamicUpdate(bool),
    CaptureBackground,
}

/// Worker thread continuously folding new depth frames into a
/// [BackgroundModel].
///
/// Shutdown is cooperative: dropping the updater clears the running flag and
/// joins the thread before the shared arrays can go away.
pub struct BackgroundUpdater {
    shared: Arc<SharedBackground>,
    cmd_tx: crossbeam_channel::Sender<BackgroundCommand>,
    control: thread_control::Control,
    join: Option<std::thread::JoinHandle<()>>,
}

impl BackgroundUpdater {
    pub fn spawn(source: Arc<dyn DepthIrSource>, cfg: BackgroundCfg) -> Result<Self> {
        let shared = Arc::new(SharedBackground::new(source.width(), source.height()));
        let worker_shared = shared.clone();
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (flag, control) = thread_control::make_pair();

        let join = std::thread::Builder::new()
            .name("bg-updater".to_string())
            .spawn(move || {
                let mut model = BackgroundModel {
                    cfg,
                    pixels: (0..worker_shared.num_pixels())
                        .map(|_| PixelHistory::new())
                        .collect(),
                    shared: worker_shared,
                    capture_frame: -1,
                };
                let mut last_timestamp = 0u64;
                let mut cur_frame = 0usize;
                while flag.alive() {
                    for cmd in cmd_rx.try_iter() {
                        match cmd {
                            BackgroundCommand::SetDynamicUpdate(dynamic) => {
                                debug!("background dynamic update: {}", dynamic);
                                model.set_dynamic_update(dynamic);
                            }
                            BackgroundCommand::CaptureBackground => {
                                debug!("capturing new background");
                                model.capture_background();
                            }
                        }
                    }

                    let timestamp = source.frame_timestamp();
                    if timestamp == last_timestamp {
                        std::thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    last_timestamp = timestamp;
                    cur_frame += 1;

                    let frame = source.latest();
                    if let Err(e) = model.ingest_frame(&frame.depth, cur_frame) {
                        error!("background update failed: {} ({}:{})", e, file!(), line!());
                    }
                }
            })?;

        Ok(Self {
            shared,
            cmd_tx,
            control,
            join: Some(join),
        })
    }

    /// The latched statistics arrays read by tracker workers.
    pub fn background(&self) -> Arc<SharedBackground> {
        self.shared.clone()
    }

    pub fn set_dynamic_update(&self, dynamic: bool) {
        if let Err(e) = self
            .cmd_tx
            .send(BackgroundCommand::SetDynamicUpdate(dynamic))
        {
            warn!("ignoring {}", e);
        }
    }

    pub fn capture_background(&self) {
        if let Err(e) = self.cmd_tx.send(BackgroundCommand::CaptureBackground) {
            warn!("ignoring {}", e);
        }
    }
}

impl Drop for BackgroundUpdater {
    fn drop(&mut self) {
        self.control.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("background updater panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> BackgroundCfg {
        BackgroundCfg {
            min_depth: 100,
            max_depth: 50000,
            z_increase_threshold: 10.0,
            stable_factor: 1.0,
            halo_threshold: 5.0,
            pixel_stride: 2,
        }
    }

    fn feed(px: &mut PixelHistory, shared: &SharedBackground, cfg: &BackgroundCfg, vals: &[u16]) {
        for &v in vals {
            px.update(v, cfg);
            px.update_stats(shared, 0, cfg);
        }
    }

    #[test]
    fn ring_buffer_matches_brute_force() {
        let cfg = test_cfg();
        let mut px = PixelHistory::new();
        let vals: Vec<u16> = (0..150u16).map(|i| 1000 + (i * 7) % 40).collect();
        for &v in &vals {
            px.update(v, &cfg);
        }
        let last100 = &vals[50..];
        let sum: u64 = last100.iter().map(|&v| v as u64).sum();
        let sum_sq: u64 = last100.iter().map(|&v| v as u64 * v as u64).sum();
        assert_eq!(px.window.len(), HIST_SIZE);
        assert_eq!(px.sum, sum);
        assert_eq!(px.sum_sq, sum_sq);
    }

    #[test]
    fn invalid_samples_only_age_the_window() {
        let cfg = test_cfg();
        let mut px = PixelHistory::new();
        for _ in 0..10 {
            px.update(1000, &cfg);
        }
        assert_eq!(px.window.len(), 10);
        // Out-of-range samples evict without pushing.
        px.update(0, &cfg);
        px.update(60000, &cfg);
        assert_eq!(px.window.len(), 8);
        assert_eq!(px.sum, 8 * 1000);
    }

    #[test]
    fn constant_input_becomes_stable_and_latches() {
        let cfg = test_cfg();
        let shared = SharedBackground::new(1, 1);
        let mut px = PixelHistory::new();
        feed(&mut px, &shared, &cfg, &vec![1500u16; HIST_MIN]);
        assert!(px.stable());
        assert!((shared.mean(0) - 1500.0).abs() < 1e-3);
        // Stays stable as long as the input stays constant.
        feed(&mut px, &shared, &cfg, &vec![1500u16; 100]);
        assert!(px.stable());
        assert!((shared.mean(0) - 1500.0).abs() < 1e-3);
    }

    #[test]
    fn large_rise_destabilizes_to_sentinels() {
        let cfg = test_cfg();
        let shared = SharedBackground::new(1, 1);
        let mut px = PixelHistory::new();
        feed(&mut px, &shared, &cfg, &vec![1500u16; HIST_SIZE]);
        assert!(px.stable());

        feed(&mut px, &shared, &cfg, &vec![2000u16; 10]);
        assert!(!px.stable());
        assert_eq!(shared.mean(0), INVALID_MEAN);
        assert_eq!(shared.stdev(0), INVALID_STDEV);
    }

    #[test]
    fn halo_rise_is_rejected_but_real_rise_latches() {
        let cfg = test_cfg();
        let shared = SharedBackground::new(1, 1);
        let mut px = PixelHistory::new();
        // Alternate +-1 so the latched stdev is about 1, giving the
        // destabilization test headroom of ~10 units.
        let wobble: Vec<u16> = (0..HIST_SIZE as u16)
            .map(|i| if i % 2 == 0 { 7999 } else { 8001 })
            .collect();
        feed(&mut px, &shared, &cfg, &wobble);
        assert!(px.stable());
        let latched = shared.mean(0);
        assert!((latched - 8000.0).abs() < 0.5);

        // Within the halo threshold: the latched mean must not move.
        feed(&mut px, &shared, &cfg, &vec![8003u16; 2 * HIST_SIZE]);
        assert!((shared.mean(0) - latched).abs() < 0.5);

        // Beyond the halo threshold: the latched mean must move. (It ratchets
        // in halo-threshold steps: the latch fires as soon as the window mean
        // clears latched + halo, then rejects the remaining drift.)
        feed(&mut px, &shared, &cfg, &vec![8007u16; 2 * HIST_SIZE]);
        assert!(shared.mean(0) > latched + 4.9);
    }

    #[test]
    fn insufficient_history_is_unstable_not_an_error() {
        let cfg = test_cfg();
        let shared = SharedBackground::new(1, 1);
        let mut px = PixelHistory::new();
        feed(&mut px, &shared, &cfg, &vec![1500u16; HIST_MIN - 1]);
        assert!(!px.stable());
        assert_eq!(shared.mean(0), INVALID_MEAN);
    }

    #[test]
    fn model_rejects_wrong_frame_size() {
        let mut model = BackgroundModel::new(4, 4, test_cfg());
        let bad = vec![1000u16; 15];
        assert!(model.ingest_frame(&bad, 0).is_err());
    }

    #[test]
    fn manual_capture_freezes_after_one_window() {
        let cfg = test_cfg();
        let mut model = BackgroundModel::new(2, 2, cfg);
        model.capture_background();
        let frame = vec![1200u16; 4];
        for fno in 0..HIST_SIZE + 10 {
            model.ingest_frame(&frame, fno).unwrap();
        }
        let mean_after_capture = model.shared.mean(0);
        assert!((mean_after_capture - 1200.0).abs() < 1e-3);
        // Frozen: further frames at a new depth change nothing.
        let moved = vec![900u16; 4];
        for fno in 0..50 {
            model.ingest_frame(&moved, fno).unwrap();
        }
        assert_eq!(model.shared.mean(0), mean_after_capture);
    }
}
