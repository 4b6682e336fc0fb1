//! Sensor frame input.
//!
//! The sensor exposes only a timestamp-and-copy interface: workers poll
//! [DepthIrSource::frame_timestamp] and copy the frame out when it changes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use touch_tracker_types::{DepthIrFrame, FrameExtra};

use crate::errors::{Error, Result};

/// A source of synchronized depth + infrared frames.
pub trait DepthIrSource: Send + Sync {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Identifier of the most recent frame. Strictly increases with every
    /// new frame; 0 means no frame has arrived yet.
    fn frame_timestamp(&self) -> u64;
    /// Copy out the most recent frame.
    fn latest(&self) -> DepthIrFrame;
}

/// Block until the source has produced its first frame.
///
/// This is the startup path: a sensor that never delivers within `timeout`
/// is a fatal failure requiring restart.
pub fn wait_for_first_frame(source: &dyn DepthIrSource, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    while source.frame_timestamp() == 0 {
        if start.elapsed() > timeout {
            return Err(Error::FirstFrameTimeout(timeout));
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

/// Shared single-slot frame store: the acquisition side calls
/// [SharedFrameSource::publish], any number of workers poll and copy.
pub struct SharedFrameSource {
    width: u32,
    height: u32,
    stamp: AtomicU64,
    slot: Mutex<DepthIrFrame>,
}

impl SharedFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        let empty = DepthIrFrame {
            width,
            height,
            depth: vec![0; n],
            ir: vec![0; n],
            extra: FrameExtra {
                host_timestamp: chrono::Utc::now(),
                host_framenumber: 0,
            },
        };
        Self {
            width,
            height,
            stamp: AtomicU64::new(0),
            slot: Mutex::new(empty),
        }
    }

    /// Replace the current frame and advance the timestamp.
    pub fn publish(&self, frame: DepthIrFrame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::ImageSizeChanged);
        }
        let expected = frame.num_pixels();
        if frame.depth.len() != expected || frame.ir.len() != expected {
            return Err(Error::ImageSizeChanged);
        }
        {
            let mut slot = self.slot.lock().unwrap();
            *slot = frame;
        }
        self.stamp.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

impl DepthIrSource for SharedFrameSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn frame_timestamp(&self) -> u64 {
        self.stamp.load(Ordering::Acquire)
    }

    fn latest(&self) -> DepthIrFrame {
        self.slot.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_rejects_wrong_size() {
        let source = SharedFrameSource::new(4, 4);
        let bad = DepthIrFrame {
            width: 4,
            height: 4,
            depth: vec![0; 15],
            ir: vec![0; 16],
            extra: FrameExtra {
                host_timestamp: chrono::Utc::now(),
                host_framenumber: 0,
            },
        };
        assert!(source.publish(bad).is_err());
    }

    #[test]
    fn timestamp_advances_per_publish() {
        let source = SharedFrameSource::new(2, 2);
        assert_eq!(source.frame_timestamp(), 0);
        let frame = DepthIrFrame {
            width: 2,
            height: 2,
            depth: vec![7; 4],
            ir: vec![9; 4],
            extra: FrameExtra {
                host_timestamp: chrono::Utc::now(),
                host_framenumber: 1,
            },
        };
        source.publish(frame.clone()).unwrap();
        assert_eq!(source.frame_timestamp(), 1);
        assert_eq!(source.latest().depth, vec![7; 4]);
        source.publish(frame).unwrap();
        assert_eq!(source.frame_timestamp(), 2);
    }

    #[test]
    fn first_frame_timeout_is_fatal() {
        let source = SharedFrameSource::new(2, 2);
        let err = wait_for_first_frame(&source, Duration::from_millis(20));
        assert!(matches!(err, Err(Error::FirstFrameTimeout(_))));
    }
}
