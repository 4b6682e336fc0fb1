//! Canonical default configurations for each tracker variant.
//!
//! The thresholds are hand-tuned against a ceiling-mounted time-of-flight
//! sensor looking at a tabletop; treat them as starting points, not truths.

use touch_tracker_types::{
    BackgroundCfg, EdgeCfg, HysteresisCfg, IrDepthTrackerCfg, MatchCfg, SausageTrackerCfg,
    SegmentationCfg, WilsonBackground, WilsonTrackerCfg, ZoneCfg,
};

pub fn default_background() -> BackgroundCfg {
    BackgroundCfg {
        min_depth: 100,
        max_depth: 50000,
        z_increase_threshold: 10.0,
        stable_factor: 1.0,
        halo_threshold: 5.0,
        pixel_stride: 2,
    }
}

pub fn default_irdepth() -> IrDepthTrackerCfg {
    IrDepthTrackerCfg {
        zones: ZoneCfg {
            error_diff: -10.0,
            noise_z: 0.7,
            low_diff: 12.0,
            mid_diff: 60.0,
        },
        edges: EdgeCfg {
            ir_low: 20.0,
            ir_high: 50.0,
            depthrel_dist: 2,
            depthrel_thresh: 50.0,
            depthabs_dist: 3,
            depthabs_thresh: 100.0,
        },
        segmentation: SegmentationCfg {
            arm_min_size: 100,
            hand_min_size: 10,
            finger_min_size: 10,
            finger_min_dist: 5,
            tip_max_dist: 30,
            tip_window: 1,
            touchz_window: 8,
        },
        matching: MatchCfg {
            // Tighter gate: infrared-derived tips are stable.
            gate_distance: 50.0,
            tip_alpha: 1.0,
            touch_z_alpha: 0.5,
            hysteresis: Some(HysteresisCfg {
                enter: 0.5,
                exit: 2.5,
            }),
            missing_grace: 3,
        },
    }
}

fn wilson_matching() -> MatchCfg {
    MatchCfg {
        // Looser gate: blob centroids wander more than fused tips.
        gate_distance: 100.0,
        tip_alpha: 1.0,
        touch_z_alpha: 1.0,
        hysteresis: None,
        missing_grace: 3,
    }
}

pub fn default_wilson_single() -> WilsonTrackerCfg {
    WilsonTrackerCfg {
        background: WilsonBackground::SingleFrame { capture_frame: 30 },
        thresh_low: 6,
        thresh_high: 12,
        filter_size: 3,
        filter_thresh: 50,
        blob_min_size: 5,
        matching: wilson_matching(),
    }
}

pub fn default_wilson_max() -> WilsonTrackerCfg {
    WilsonTrackerCfg {
        background: WilsonBackground::MaxHold { frames: 16 },
        thresh_low: 8,
        thresh_high: 16,
        filter_size: 3,
        filter_thresh: 50,
        blob_min_size: 5,
        matching: wilson_matching(),
    }
}

pub fn default_wilson_stat() -> WilsonTrackerCfg {
    WilsonTrackerCfg {
        background: WilsonBackground::Statistical {
            z_noise: 2.0,
            z_low: 4.0,
            diff_high: 20.0,
        },
        // The band thresholds are unused in statistical mode.
        thresh_low: 0,
        thresh_high: 0,
        filter_size: 3,
        filter_thresh: 100,
        blob_min_size: 5,
        matching: wilson_matching(),
    }
}

pub fn default_sausage() -> SausageTrackerCfg {
    SausageTrackerCfg {
        gradient_dist: 3,
        depth_cutoff: 1800,
        enter_min: -57,
        enter_max: -5,
        exit_min: 5,
        exit_max: 57,
        width_min: 3,
        width_max: 6,
        search_gap: 3,
        min_slices: 8,
        touch_max_height: 7.0,
        tip_projection: 4.0,
        matching: wilson_matching(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irdepth_yaml_roundtrip() {
        let cfg = default_irdepth();
        let buf = serde_yaml::to_string(&cfg).unwrap();
        let cfg2: IrDepthTrackerCfg = serde_yaml::from_str(&buf).unwrap();
        assert_eq!(cfg, cfg2);
    }

    #[test]
    fn wilson_yaml_roundtrip() {
        for cfg in [
            default_wilson_single(),
            default_wilson_max(),
            default_wilson_stat(),
        ] {
            let buf = serde_yaml::to_string(&cfg).unwrap();
            let cfg2: WilsonTrackerCfg = serde_yaml::from_str(&buf).unwrap();
            assert_eq!(cfg, cfg2);
        }
    }

    #[test]
    fn hysteresis_gap_is_positive() {
        let h = default_irdepth().matching.hysteresis.unwrap();
        assert!(h.exit > h.enter);
    }
}
