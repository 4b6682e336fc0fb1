//! Data and configuration types for surface touch tracking.
//!
//! This crate provides the frame, touch-point and configuration types shared
//! between the touch detection core and its consumers (sensor acquisition,
//! rendering, experiment code).

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Host-side bookkeeping attached to every sensor frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameExtra {
    /// Timestamp assigned by the host when the frame was received.
    pub host_timestamp: chrono::DateTime<chrono::Utc>,
    /// Monotonically increasing frame count assigned by the host.
    pub host_framenumber: usize,
}

/// One synchronized depth + infrared frame pair.
///
/// Both grids are row-major `width * height` buffers of raw 16-bit sensor
/// samples: depth in millimeter-scale distance units, infrared in intensity
/// units. A depth sample of zero means the sensor produced no reading for
/// that pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthIrFrame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Raw depth samples, row major.
    pub depth: Vec<u16>,
    /// Raw infrared samples, row major.
    pub ir: Vec<u16>,
    /// Host bookkeeping.
    pub extra: FrameExtra,
}

impl DepthIrFrame {
    pub fn num_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A freshly segmented touch candidate, before identity assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchCandidate {
    /// Fingertip position, in sensor pixel coordinates.
    pub tip: Point2<f32>,
    /// Approximate finger base position, if the detector computes one.
    pub base: Option<Point2<f32>>,
    /// Height of the tip above the surface, in depth units.
    pub touch_z: f32,
    /// Whether the detector considers this candidate already in contact.
    ///
    /// Detectors without a usable height estimate set this directly; the
    /// matcher then skips hysteresis for such candidates.
    pub touched: bool,
}

/// A published, identity-tracked touch point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerTouch {
    /// Identity of the touch. Assigned monotonically; never reused while the
    /// touch is live.
    pub id: i32,
    /// Coordinates of the fingertip, in sensor pixel coordinates.
    pub tip: Point2<f32>,
    /// Coordinates of the finger base (approximate), when known.
    pub base: Option<Point2<f32>>,
    /// Is this touch currently contacting the surface?
    pub touched: bool,
    /// Number of frames since `touched` last changed.
    pub status_age: u32,
    /// Number of frames since the touch first appeared.
    pub touch_age: u32,
    /// Smoothed height of the tip above the surface, in depth units.
    pub touch_z: f32,
    /// Did this touch go unmatched recently?
    pub missing: bool,
    /// Number of consecutive frames this touch has been unmatched.
    pub missing_age: u32,
}

/// Configuration of the adaptive per-pixel background model.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackgroundCfg {
    /// Minimum raw depth value considered valid. Samples below this are
    /// treated as absent.
    pub min_depth: u16,
    /// Maximum raw depth value considered valid.
    pub max_depth: u16,
    /// Number of standard deviations the window mean must move above the
    /// latched mean before the pixel is destabilized.
    ///
    /// When exceeded, the previously stable object must have been covered by
    /// something new; the latched statistics are reset to sentinels.
    pub z_increase_threshold: f32,
    /// Scale factor of the stability test. A window standard deviation below
    /// `stable_factor * (mean / 1000)^2` is considered stable.
    pub stable_factor: f32,
    /// Increases of the latched mean smaller than this threshold are
    /// rejected, suppressing multipath halos around hovering objects.
    pub halo_threshold: f32,
    /// 1/N pixels get their statistics refreshed each frame. Raise to reduce
    /// CPU cost at the price of per-pixel staleness.
    pub pixel_stride: usize,
}

/// Thresholds mapping background-subtracted depth to confidence zones.
///
/// The zones form a monotone confidence ladder: larger positive differences
/// (object closer to the sensor than the background) are more confidently
/// "real object" pixels.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZoneCfg {
    /// Differences below this (an implausible depression into the surface)
    /// classify as error.
    pub error_diff: f32,
    /// Z-scores below this classify as noise.
    pub noise_z: f32,
    /// Differences below this classify as low confidence.
    pub low_diff: f32,
    /// Differences below this classify as mid confidence; everything above
    /// is high confidence.
    pub mid_diff: f32,
}

/// Edge-map construction parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeCfg {
    /// Low hysteresis threshold of the infrared edge operator.
    pub ir_low: f32,
    /// High hysteresis threshold of the infrared edge operator.
    pub ir_high: f32,
    /// Pixel offset at which relative-depth (smoothness) neighbors are
    /// sampled.
    pub depthrel_dist: usize,
    /// Maximum difference between a pixel and its sampled neighbors before a
    /// relative-depth edge is marked, in depth units.
    pub depthrel_thresh: f32,
    /// Pixel offset at which absolute-depth (height) neighbors are sampled.
    pub depthabs_dist: usize,
    /// Background difference above which a sampled neighbor marks an
    /// absolute-depth edge, in depth units.
    pub depthabs_thresh: f32,
}

/// Hierarchical flood-fill segmentation parameters.
///
/// The sizes are in pixels rather than physical units, so they should be set
/// liberally to avoid rejecting genuine objects.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentationCfg {
    /// Minimum pixel count of an arm blob.
    pub arm_min_size: usize,
    /// Minimum pixel count of a hand blob.
    pub hand_min_size: usize,
    /// Minimum pixel count of a finger blob (tip pixels included).
    pub finger_min_size: usize,
    /// Minimum flood distance from root to tip; shorter fingers are pruned.
    pub finger_min_dist: u32,
    /// Maximum flood distance of a tip fill. Exceeding it rolls the whole
    /// tip sub-blob back.
    pub tip_max_dist: u32,
    /// Number of highest-distance pixels averaged for the tip position.
    pub tip_window: usize,
    /// Number of highest-distance pixels averaged for the touch height.
    pub touchz_window: usize,
}

/// Touch hysteresis thresholds.
///
/// `exit` must be above `enter`; the gap prevents rapid flicker of the
/// touched state at the boundary.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HysteresisCfg {
    /// Below this smoothed height a touch becomes active.
    pub enter: f32,
    /// Above this smoothed height a touch becomes inactive.
    pub exit: f32,
}

/// Correspondence matching parameters, shared by every tracker variant.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchCfg {
    /// Maximum tip-to-tip distance for a previous touch and a new candidate
    /// to be considered a match, in pixel units.
    pub gate_distance: f32,
    /// EWMA factor of tip position smoothing. 1.0 disables smoothing.
    pub tip_alpha: f32,
    /// EWMA factor of touch height smoothing. 1.0 disables smoothing.
    pub touch_z_alpha: f32,
    /// Touched-state hysteresis on the smoothed height. `None` for detectors
    /// whose candidates carry the touched state directly.
    pub hysteresis: Option<HysteresisCfg>,
    /// Number of consecutive unmatched frames a touch survives as "missing"
    /// before it is dropped.
    pub missing_grace: u32,
}

/// Full configuration of the infrared + depth flood-fill tracker.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IrDepthTrackerCfg {
    pub zones: ZoneCfg,
    pub edges: EdgeCfg,
    pub segmentation: SegmentationCfg,
    pub matching: MatchCfg,
}

/// How a background-subtraction tracker obtains its background.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub enum WilsonBackground {
    /// Copy a single depth frame, captured at the given frame number.
    SingleFrame { capture_frame: usize },
    /// Per-pixel maximum depth over the first `frames` frames.
    MaxHold { frames: usize },
    /// Threshold against the live statistical background model.
    Statistical {
        /// Z-scores below this are noise.
        z_noise: f32,
        /// Z-scores at or above this are candidate pixels.
        z_low: f32,
        /// Differences at or above this are too far off the surface.
        diff_high: f32,
    },
}

/// Configuration of the background-subtraction (Wilson-style) trackers.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WilsonTrackerCfg {
    /// Background acquisition mode.
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub background: WilsonBackground,
    /// Band of accepted `background - depth` differences, in depth units.
    /// Ignored by the statistical mode.
    pub thresh_low: i32,
    pub thresh_high: i32,
    /// Radius of the separable boxcar low-pass filter.
    pub filter_size: usize,
    /// Smoothed values above this survive filtering.
    pub filter_thresh: u8,
    /// Minimum pixel count of a touch blob.
    pub blob_min_size: usize,
    pub matching: MatchCfg,
}

/// Configuration of the slice-tracing (sausage) tracker.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SausageTrackerCfg {
    /// Pixel offset between the samples of the depth gradient.
    pub gradient_dist: usize,
    /// Depth values beyond this are ignored when computing gradients.
    pub depth_cutoff: u16,
    /// Accepted gradient range entering a slice (negative side).
    pub enter_min: i32,
    pub enter_max: i32,
    /// Accepted gradient range exiting a slice (positive side).
    pub exit_min: i32,
    pub exit_max: i32,
    /// Accepted slice widths, in pixels.
    pub width_min: usize,
    pub width_max: usize,
    /// Maximum gap between consecutive slices of one finger.
    pub search_gap: usize,
    /// Minimum number of slices in a finger.
    pub min_slices: usize,
    /// Maximum height of the tip above the background for the finger to
    /// count as touching, in depth units.
    pub touch_max_height: f32,
    /// How far the tip is projected forward along the finger axis, in
    /// pixels.
    pub tip_projection: f32,
    pub matching: MatchCfg,
}
