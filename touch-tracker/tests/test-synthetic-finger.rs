//! End-to-end pipeline test on a synthetic arm/hand/finger scene.

use touch_tracker::{
    BackgroundModel, DepthIrFrame, FrameExtra, IrDepthStrategy, TouchMatcher, TouchStrategy,
};

const W: u32 = 64;
const H: u32 = 48;
const N: usize = (W * H) as usize;

const SURFACE: u16 = 1000;

/// Warm-up frame with +-1 sensor wobble so the per-pixel stdev settles near
/// 1 instead of 0.
fn warmup_depth(frame_number: usize) -> Vec<u16> {
    (0..N)
        .map(|i| {
            if (i + frame_number) % 2 == 0 {
                SURFACE + 1
            } else {
                SURFACE - 1
            }
        })
        .collect()
}

fn put_rect(depth: &mut [u16], x0: usize, y0: usize, x1: usize, y1: usize, diff: u16) {
    for y in y0..y1 {
        for x in x0..x1 {
            depth[y * W as usize + x] = SURFACE - diff;
        }
    }
}

fn put_ir(ir: &mut [u16], x0: usize, y0: usize, x1: usize, y1: usize) {
    for y in y0..y1 {
        for x in x0..x1 {
            ir[y * W as usize + x] = 16000;
        }
    }
}

/// An arm reaching in from the left, tapering through a hand into a 25 px
/// finger whose tip height above the surface is `tip_diff`.
fn scene(tip_diff: u16, frame_number: usize) -> DepthIrFrame {
    let mut depth = vec![SURFACE; N];
    // Arm, far above the surface.
    put_rect(&mut depth, 2, 18, 14, 30, 200);
    // Smooth ramp down from the arm so the hand is not fenced off by
    // smoothness edges.
    for (x, diff) in (14..20).zip([160u16, 140, 120, 100, 80, 60]) {
        put_rect(&mut depth, x, 21, x + 1, 29, diff);
    }
    // Hand.
    put_rect(&mut depth, 20, 21, 28, 29, 40);
    // Finger, low over the surface.
    put_rect(&mut depth, 28, 24, 48, 29, 8);
    // Fingertip.
    put_rect(&mut depth, 48, 24, 53, 29, tip_diff);

    // The infrared silhouette covers the whole object; its contour is what
    // fences the tip flood.
    let mut ir = vec![0u16; N];
    put_ir(&mut ir, 2, 18, 14, 30);
    put_ir(&mut ir, 14, 21, 28, 29);
    put_ir(&mut ir, 28, 24, 53, 29);

    DepthIrFrame {
        width: W,
        height: H,
        depth,
        ir,
        extra: FrameExtra {
            host_timestamp: chrono::Utc::now(),
            host_framenumber: frame_number,
        },
    }
}

#[test]
fn finger_press_is_tracked_end_to_end() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // Learn the background from 40 flat warm-up frames.
    let mut model = BackgroundModel::new(W, H, touch_detect_cfg::default_background());
    for fno in 0..40 {
        model.ingest_frame(&warmup_depth(fno), fno)?;
    }
    let background = model.shared();
    let center = (24 * W + 32) as usize;
    assert!(
        (background.mean(center) - SURFACE as f32).abs() < 1.5,
        "background should be learned, got {}",
        background.mean(center)
    );

    let cfg = touch_detect_cfg::default_irdepth();
    let mut strategy = IrDepthStrategy::new(W, H, cfg.clone());
    let mut matcher = TouchMatcher::new(cfg.matching)?;

    // Hovering: the finger is segmented but too high to touch.
    let hover = scene(4, 40);
    let candidates = strategy.detect(&hover, &background);
    assert_eq!(candidates.len(), 1, "expected exactly one finger candidate");
    // The tip sits at the narrow far end of the finger.
    assert!(candidates[0].tip.x > 44.0, "tip x = {}", candidates[0].tip.x);
    assert!(
        (24.0..29.0).contains(&candidates[0].tip.y),
        "tip y = {}",
        candidates[0].tip.y
    );

    // Re-running the identical frame against the identical background gives
    // identical candidates: the pipeline holds no hidden per-frame state.
    let candidates2 = strategy.detect(&hover, &background);
    assert_eq!(candidates, candidates2);

    let mut touches = matcher.merge(&[], candidates);
    assert_eq!(touches.len(), 1);
    let id = touches[0].id;
    assert!(!touches[0].touched, "hovering finger must not touch yet");

    // Press: the tip drops to the surface and the smoothed height falls
    // through the enter threshold within a few frames.
    let mut became_touched = false;
    for fno in 41..49 {
        let frame = scene(0, fno);
        let candidates = strategy.detect(&frame, &background);
        assert_eq!(candidates.len(), 1);
        touches = matcher.merge(&touches, candidates);
        assert_eq!(touches.len(), 1);
        assert_eq!(touches[0].id, id, "identity must survive the press");
        if touches[0].touched {
            became_touched = true;
            break;
        }
    }
    assert!(became_touched, "touch never registered: {:?}", touches[0]);
    assert!(touches[0].tip.x > 44.0);

    Ok(())
}
