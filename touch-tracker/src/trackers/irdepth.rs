//! Infrared + depth sensor-fusion touch detection.
//!
//! The most capable variant: confidence-zone classification, three edge
//! maps, and the hierarchical arm/hand/finger/tip flood fill. Tip positions
//! come out stable enough that the matcher runs without tip smoothing.

use touch_tracker_types::{DepthIrFrame, IrDepthTrackerCfg, TouchCandidate};

use crate::background_model::SharedBackground;
use crate::edges::EdgeDetector;
use crate::segmentation::SegmentationEngine;
use crate::tracker::TouchStrategy;
use crate::zones::ZoneMap;

pub struct IrDepthStrategy {
    cfg: IrDepthTrackerCfg,
    zones: ZoneMap,
    edges: EdgeDetector,
    engine: SegmentationEngine,
}

impl IrDepthStrategy {
    pub fn new(width: u32, height: u32, cfg: IrDepthTrackerCfg) -> Self {
        Self {
            zones: ZoneMap::new(width, height),
            edges: EdgeDetector::new(width, height, cfg.edges.clone()),
            engine: SegmentationEngine::new(width, height, cfg.segmentation.clone()),
            cfg,
        }
    }

    /// The zone map of the most recent frame, for diagnostics.
    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    /// The edge maps of the most recent frame, for diagnostics.
    pub fn edges(&self) -> &EdgeDetector {
        &self.edges
    }

    /// The segmentation state of the most recent frame, for diagnostics.
    pub fn segmentation(&self) -> &SegmentationEngine {
        &self.engine
    }
}

impl TouchStrategy for IrDepthStrategy {
    fn name(&self) -> &'static str {
        "irdepth-tracker"
    }

    fn detect(
        &mut self,
        frame: &DepthIrFrame,
        background: &SharedBackground,
    ) -> Vec<TouchCandidate> {
        self.zones
            .classify(&frame.depth, background, &self.cfg.zones);
        // The edge maps consume the zone diffs, so they build second.
        self.edges.build(&frame.ir, &self.zones);

        let arms = self
            .engine
            .segment(&self.zones, &self.edges, &frame.depth, background);

        let mut candidates = Vec::new();
        for arm in &arms {
            for hand in &arm.hands {
                for finger in &hand.fingers {
                    candidates.push(TouchCandidate {
                        tip: nalgebra::Point2::new(finger.x, finger.y),
                        base: None,
                        touch_z: finger.z,
                        touched: false,
                    });
                }
            }
        }
        candidates
    }
}
