//! Threaded driver test: background worker + tracker worker against a live
//! frame source, with cooperative shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use touch_tracker::{
    wait_for_first_frame, BackgroundUpdater, DepthIrFrame, FingerTouch, FrameExtra,
    SharedFrameSource, TouchTracker, WilsonStrategy,
};

const W: u32 = 32;
const H: u32 = 32;
const N: usize = (W * H) as usize;

fn frame(depth: Vec<u16>, fno: usize) -> DepthIrFrame {
    DepthIrFrame {
        width: W,
        height: H,
        ir: vec![0; N],
        depth,
        extra: FrameExtra {
            host_timestamp: chrono::Utc::now(),
            host_framenumber: fno,
        },
    }
}

fn pressed() -> Vec<u16> {
    let mut depth = vec![1000u16; N];
    for y in 16..24usize {
        for x in 16..24usize {
            depth[y * W as usize + x] = 988; // inside the max-hold band [8, 16]
        }
    }
    depth
}

#[test]
fn tracker_worker_publishes_touches() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    let source = Arc::new(SharedFrameSource::new(W, H));
    source.publish(frame(vec![1000; N], 0))?;
    wait_for_first_frame(&*source, Duration::from_secs(1))?;

    let updater = BackgroundUpdater::spawn(source.clone(), touch_detect_cfg::default_background())?;

    let cfg = touch_detect_cfg::default_wilson_max();
    let matching = cfg.matching.clone();
    let strategy = Box::new(WilsonStrategy::new(W, H, cfg));
    let tracker = TouchTracker::spawn(source.clone(), updater.background(), strategy, matching)?;

    // Flat warm-up so the max-hold background settles at the surface.
    for fno in 1..40usize {
        source.publish(frame(vec![1000; N], fno))?;
        std::thread::sleep(Duration::from_millis(10));
    }

    // Press a patch and poll until the tracker publishes it.
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut touches: Vec<FingerTouch> = Vec::new();
    let mut found = false;
    let mut fno = 40usize;
    while Instant::now() < deadline {
        source.publish(frame(pressed(), fno))?;
        fno += 1;
        if tracker.update(&mut touches) && !touches.is_empty() {
            found = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(found, "tracker never published a touch");
    assert!(touches[0].touched);
    assert!((touches[0].tip.x - 19.5).abs() < 2.0, "{:?}", touches[0]);
    assert!((touches[0].tip.y - 19.5).abs() < 2.0, "{:?}", touches[0]);

    // A second poll without a new publish may or may not carry fresh data,
    // but it must never block.
    let _ = tracker.update(&mut touches);

    // Dropping joins the workers before the shared buffers go away.
    drop(tracker);
    drop(updater);
    Ok(())
}

#[test]
fn update_is_quiet_without_frames() -> anyhow::Result<()> {
    let source = Arc::new(SharedFrameSource::new(W, H));
    let updater = BackgroundUpdater::spawn(source.clone(), touch_detect_cfg::default_background())?;
    let cfg = touch_detect_cfg::default_wilson_single();
    let matching = cfg.matching.clone();
    let tracker = TouchTracker::spawn(
        source.clone(),
        updater.background(),
        Box::new(WilsonStrategy::new(W, H, cfg)),
        matching,
    )?;

    std::thread::sleep(Duration::from_millis(50));
    let mut touches = Vec::new();
    assert!(!tracker.update(&mut touches));
    assert!(touches.is_empty());
    Ok(())
}
