//! The generic tracker driver.
//!
//! One driver implementation runs every detection strategy: poll the frame
//! source, run detect -> match, publish through a mutex-guarded double
//! buffer. Consumers poll [TouchTracker::update] at their own cadence and
//! are never blocked on frame arrival.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use touch_tracker_types::{DepthIrFrame, FingerTouch, MatchCfg, TouchCandidate};

use crate::background_model::SharedBackground;
use crate::errors::{Error, Result};
use crate::matcher::TouchMatcher;
use crate::source::DepthIrSource;

/// A per-frame touch detection algorithm.
///
/// Implementations own all their working buffers; the only shared inputs are
/// the read-only frame and the background statistics.
pub trait TouchStrategy: Send {
    /// Short name used for the worker thread and log messages.
    fn name(&self) -> &'static str;

    /// Detect touch candidates in one frame.
    fn detect(
        &mut self,
        frame: &DepthIrFrame,
        background: &SharedBackground,
    ) -> Vec<TouchCandidate>;
}

struct Published {
    touches: Vec<FingerTouch>,
    dirty: bool,
}

const NUM_MSEC_BINS: usize = 100;
const WARN_THRESH_MSEC: usize = 60;

/// Histogram of per-frame processing durations, logged periodically.
struct ProcessingHistogram {
    name: &'static str,
    start: Instant,
    msec_bins: Vec<u32>,
    longest_frame: usize,
    longest_time: f64,
}

impl ProcessingHistogram {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
            msec_bins: vec![0; NUM_MSEC_BINS],
            longest_frame: 0,
            longest_time: 0.0,
        }
    }

    fn push_new_sample(&mut self, duration: Duration, frameno: usize) {
        let secs = duration.as_secs_f64();
        let msecs = secs * 1000.0;
        let bin_num = if msecs >= NUM_MSEC_BINS as f64 {
            NUM_MSEC_BINS - 1
        } else {
            msecs as usize
        };
        self.msec_bins[bin_num] += 1;
        if secs > self.longest_time {
            self.longest_time = secs;
            self.longest_frame = frameno;
        }
    }

    fn is_old(&self) -> bool {
        self.start.elapsed() > Duration::from_secs(10)
    }

    fn show_stats(&self) {
        if self.msec_bins.iter().sum::<u32>() == 0 {
            return;
        }
        let (argmax, _) = self
            .msec_bins
            .iter()
            .enumerate()
            .fold((0, 0u32), |acc, (idx, &count)| {
                if count > acc.1 {
                    (idx, count)
                } else {
                    acc
                }
            });
        let mut max = 0;
        for (msec, &count) in self.msec_bins.iter().enumerate() {
            if count > 0 {
                max = msec;
            }
        }
        let max_str = if max == NUM_MSEC_BINS - 1 {
            format!("{}+", max)
        } else {
            format!("{}", max)
        };
        let msg = format!(
            "{} processing duration statistics: mode: {} msec, max: {} msec (longest: frame {})",
            self.name, argmax, max_str, self.longest_frame
        );
        if max > WARN_THRESH_MSEC {
            warn!("{}", msg);
        } else {
            debug!("{}", msg);
        }
    }
}

/// Runs one detection strategy continuously against a frame source and
/// publishes identity-tracked touches.
///
/// Shutdown is cooperative and happens in [Drop]: the running flag is
/// cleared and the worker joined before any shared state is released.
pub struct TouchTracker {
    published: Arc<Mutex<Published>>,
    control: thread_control::Control,
    join: Option<std::thread::JoinHandle<()>>,
}

impl TouchTracker {
    pub fn spawn(
        source: Arc<dyn DepthIrSource>,
        background: Arc<SharedBackground>,
        mut strategy: Box<dyn TouchStrategy>,
        match_cfg: MatchCfg,
    ) -> Result<Self> {
        if source.width() != background.width() || source.height() != background.height() {
            return Err(Error::ImageSizeChanged);
        }
        let mut matcher = TouchMatcher::new(match_cfg)?;

        let published = Arc::new(Mutex::new(Published {
            touches: Vec::new(),
            dirty: false,
        }));
        let worker_published = published.clone();
        let (flag, control) = thread_control::make_pair();

        let join = std::thread::Builder::new()
            .name(strategy.name().to_string())
            .spawn(move || {
                let mut touches: Vec<FingerTouch> = Vec::new();
                let mut last_timestamp = 0u64;
                let mut histogram = ProcessingHistogram::new(strategy.name());
                info!("{} tracking loop running", strategy.name());

                while flag.alive() {
                    let timestamp = source.frame_timestamp();
                    if timestamp == last_timestamp {
                        std::thread::sleep(Duration::from_millis(5));
                        continue;
                    }
                    last_timestamp = timestamp;

                    let frame = source.latest();
                    let start = Instant::now();
                    let candidates = strategy.detect(&frame, &background);
                    touches = matcher.merge(&touches, candidates);

                    {
                        let mut published = worker_published.lock().unwrap();
                        published.touches = touches.clone();
                        published.dirty = true;
                    }

                    histogram.push_new_sample(start.elapsed(), frame.extra.host_framenumber);
                    if histogram.is_old() {
                        histogram.show_stats();
                        histogram = ProcessingHistogram::new(strategy.name());
                    }
                }
                info!("{} tracking loop done", strategy.name());
            })?;

        Ok(Self {
            published,
            control,
            join: Some(join),
        })
    }

    /// Copy out the published touch set if it changed since the last poll.
    ///
    /// Never waits for a new frame: returns false when nothing new has been
    /// published.
    pub fn update(&self, ret_touches: &mut Vec<FingerTouch>) -> bool {
        let mut published = self.published.lock().unwrap();
        if published.dirty {
            ret_touches.clear();
            ret_touches.extend_from_slice(&published.touches);
            published.dirty = false;
            true
        } else {
            false
        }
    }
}

impl Drop for TouchTracker {
    fn drop(&mut self) {
        self.control.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("tracker worker panicked");
            }
        }
    }
}
