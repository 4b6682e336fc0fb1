//! Benchmark the IR+depth detection pipeline on a synthetic scene.

use touch_tracker::{
    BackgroundModel, DepthIrFrame, FrameExtra, IrDepthStrategy, TouchMatcher, TouchStrategy,
};

const W: u32 = 512;
const H: u32 = 424;
const N: usize = (W * H) as usize;
const SURFACE: u16 = 1000;

fn put_rect(buf: &mut [u16], x0: usize, y0: usize, x1: usize, y1: usize, val: u16) {
    for y in y0..y1 {
        for x in x0..x1 {
            buf[y * W as usize + x] = val;
        }
    }
}

/// An arm/hand/finger scene with the fingertip pressed to the surface.
fn scene(frame_number: usize) -> DepthIrFrame {
    let mut depth = vec![SURFACE; N];
    put_rect(&mut depth, 20, 180, 140, 300, SURFACE - 200);
    for (x, diff) in (140..200).step_by(10).zip([160u16, 140, 120, 100, 80, 60]) {
        put_rect(&mut depth, x, 210, x + 10, 290, SURFACE - diff);
    }
    put_rect(&mut depth, 200, 210, 280, 290, SURFACE - 40);
    put_rect(&mut depth, 280, 248, 292, 254, SURFACE - 8);
    put_rect(&mut depth, 292, 248, 298, 254, SURFACE);

    let mut ir = vec![0u16; N];
    put_rect(&mut ir, 20, 180, 140, 300, 16000);
    put_rect(&mut ir, 140, 210, 280, 290, 16000);
    put_rect(&mut ir, 280, 248, 298, 254, 16000);

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

fn main() -> anyhow::Result<()> {
    let _ = env_logger::builder().is_test(true).try_init();

    // Learn the background from wobbly flat frames.
    let mut model = BackgroundModel::new(W, H, touch_detect_cfg::default_background());
    for fno in 0..40usize {
        let depth: Vec<u16> = (0..N)
            .map(|i| {
                if (i + fno) % 2 == 0 {
                    SURFACE + 1
                } else {
                    SURFACE - 1
                }
            })
            .collect();
        model.ingest_frame(&depth, fno)?;
    }
    let background = model.shared();

    let cfg = touch_detect_cfg::default_irdepth();
    let mut strategy = IrDepthStrategy::new(W, H, cfg.clone());
    let mut matcher = TouchMatcher::new(cfg.matching)?;

    const N_CYCLES: usize = 100;
    let mut touches = Vec::new();
    let mut n_touched = 0usize;
    let start = std::time::Instant::now();
    for fno in 0..N_CYCLES {
        let frame = scene(fno);
        let candidates = strategy.detect(&frame, &background);
        touches = matcher.merge(&touches, candidates);
        n_touched += touches.iter().filter(|t| t.touched).count();
    }
    let dur = start.elapsed();
    let fps = N_CYCLES as f64 / dur.as_secs_f64();
    println!(
        "processed {N_CYCLES} frames in {:.2} seconds ({fps:.1} fps); {} touches live, {n_touched} touched-frames total",
        dur.as_secs_f32(),
        touches.len(),
    );
    Ok(())
}
