//! Real-time multi-touch detection on arbitrary physical surfaces.
//!
//! A depth + infrared sensor is aimed at a tabletop or wall, an adaptive
//! per-pixel background model learns the resting surface, and objects
//! breaking the surface plane are segmented into fingertip contacts and
//! tracked with stable identities across frames.
//!
//! The moving parts:
//!
//! - [BackgroundUpdater] maintains the per-pixel [background
//!   model](BackgroundModel) on its own worker thread.
//! - [TouchTracker] runs one detection strategy continuously against a
//!   [frame source](DepthIrSource) and publishes identity-tracked
//!   [FingerTouch] sets through a non-blocking [update](TouchTracker::update)
//!   call.
//! - Detection strategies implement [TouchStrategy]; five variants live in
//!   [trackers]. All variants share one correspondence
//!   [matcher](matcher::TouchMatcher).

#[macro_use]
extern crate log;

mod errors;
pub use crate::errors::{Error, Result};

mod fixedqueue;

pub mod background_model;
pub use crate::background_model::{BackgroundModel, BackgroundUpdater, SharedBackground};

pub mod source;
pub use crate::source::{wait_for_first_frame, DepthIrSource, SharedFrameSource};

pub mod zones;
pub use crate::zones::{Zone, ZoneMap};

pub mod edges;
pub use crate::edges::{EdgeDetector, EdgeFlags};

pub mod segmentation;
pub use crate::segmentation::{ArmBlob, FingerBlob, HandBlob, RejectReason, SegmentationEngine};

pub mod matcher;
pub use crate::matcher::TouchMatcher;

pub mod tracker;
pub use crate::tracker::{TouchStrategy, TouchTracker};

pub mod trackers;
pub use crate::trackers::{IrDepthStrategy, SausageStrategy, WilsonStrategy};

#[cfg(feature = "debug-images")]
pub mod debug_images;

pub use touch_tracker_types::{
    DepthIrFrame, FingerTouch, FrameExtra, IrDepthTrackerCfg, MatchCfg, SausageTrackerCfg,
    TouchCandidate, WilsonTrackerCfg,
};
