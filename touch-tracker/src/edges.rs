//! Edge maps gating flood-fill growth.
//!
//! Three independent maps are built per frame: infrared intensity edges
//! (standard edge operator plus contour hole filling), relative-depth
//! (smoothness) edges, and absolute-depth (height) edges. Different
//! segmentation stages are gated by different combinations of these flags.

use image::GrayImage;
use touch_tracker_types::EdgeCfg;

use crate::zones::ZoneMap;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EdgeFlags: u8 {
        /// Infrared intensity edge.
        const IR = 0x01;
        /// Local depth discontinuity.
        const DEPTH_REL = 0x02;
        /// Near a pixel far off the surface.
        const DEPTH_ABS = 0x04;
    }
}

/// Contour hole-filling state of one infrared edge pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FillState {
    #[default]
    Blank,
    /// Unvisited edge pixel.
    Significant,
    /// Edge pixel queued for visiting.
    Seen,
    /// Visited edge pixel.
    Visited,
    /// Blank pixel queued as a gap-fill candidate.
    Candidate,
    /// Gap-fill candidate accepted into the contour.
    Filled,
}

pub struct EdgeDetector {
    width: usize,
    height: usize,
    cfg: EdgeCfg,
    flags: Vec<EdgeFlags>,
    fill: Vec<FillState>,
    ir_scaled: GrayImage,
    queue: Vec<usize>,
}

impl EdgeDetector {
    pub fn new(width: u32, height: u32, cfg: EdgeCfg) -> Self {
        let n = width as usize * height as usize;
        Self {
            width: width as usize,
            height: height as usize,
            cfg,
            flags: vec![EdgeFlags::empty(); n],
            fill: vec![FillState::Blank; n],
            ir_scaled: GrayImage::new(width, height),
            queue: Vec::new(),
        }
    }

    #[inline]
    pub fn flags(&self) -> &[EdgeFlags] {
        &self.flags
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height as u32
    }

    #[inline]
    pub fn is_edge(&self, idx: usize, mask: EdgeFlags) -> bool {
        self.flags[idx].intersects(mask)
    }

    /// Rebuild all three edge maps for the current frame. The zone map must
    /// already be classified (the depth edges consume its diff values).
    pub fn build(&mut self, ir: &[u16], zones: &ZoneMap) {
        let n = self.width * self.height;
        assert_eq!(ir.len(), n);
        assert_eq!(zones.px().len(), n);
        self.flags.fill(EdgeFlags::empty());

        self.build_ir_edges(ir);
        self.build_depth_relative_edges(zones);
        self.build_depth_absolute_edges(zones);
    }

    fn build_ir_edges(&mut self, ir: &[u16]) {
        for (out, &v) in self.ir_scaled.iter_mut().zip(ir) {
            *out = (v / 64).min(255) as u8;
        }
        let canny = imageproc::edges::canny(&self.ir_scaled, self.cfg.ir_low, self.cfg.ir_high);

        // All detected edge pixels count as significant seeds for the
        // hole fill.
        for (state, &edge) in self.fill.iter_mut().zip(canny.as_raw()) {
            *state = if edge == 255 {
                FillState::Significant
            } else {
                FillState::Blank
            };
        }

        self.fill_ir_holes();

        for (flags, &state) in self.flags.iter_mut().zip(&self.fill) {
            if matches!(state, FillState::Visited | FillState::Filled) {
                *flags |= EdgeFlags::IR;
            }
        }
    }

    /// Close small gaps in the infrared edge contours: blank pixels next to
    /// a contour end are kept only when they connect onward to further edge
    /// pixels, so the fill never grows into open areas.
    fn fill_ir_holes(&mut self) {
        let (w, h) = (self.width, self.height);
        let fill = &mut self.fill;
        let queue = &mut self.queue;

        for idx in 0..fill.len() {
            if fill[idx] != FillState::Significant {
                continue;
            }

            queue.clear();
            queue.push(idx);
            fill[idx] = FillState::Seen;

            let mut qtail = 0;
            while qtail < queue.len() {
                let curidx = queue[qtail];
                qtail += 1;
                let curstate = fill[curidx];

                if curstate == FillState::Seen {
                    fill[curidx] = FillState::Visited;
                }

                let y = curidx / w;
                let x = curidx % w;
                let mut found = 0;

                // Eight-way neighbours, to cross diagonals.
                for dy in -1i64..=1 {
                    for dx in -1i64..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let (xx, yy) = (x as i64 + dx, y as i64 + dy);
                        if xx < 0 || xx >= w as i64 || yy < 0 || yy >= h as i64 {
                            continue;
                        }
                        let otheridx = (yy * w as i64 + xx) as usize;
                        match fill[otheridx] {
                            FillState::Significant => {
                                found += 1;
                                queue.push(otheridx);
                                fill[otheridx] = FillState::Seen;
                            }
                            FillState::Seen => {
                                found += 1;
                            }
                            _ => {}
                        }
                    }
                }

                if curstate == FillState::Candidate {
                    fill[curidx] = if found > 0 {
                        FillState::Filled
                    } else {
                        FillState::Blank
                    };
                } else if found == 0 {
                    // Contour end: mark blank neighbours as fill candidates.
                    for dy in -1i64..=1 {
                        for dx in -1i64..=1 {
                            if dx == 0 && dy == 0 {
                                continue;
                            }
                            let (xx, yy) = (x as i64 + dx, y as i64 + dy);
                            if xx < 0 || xx >= w as i64 || yy < 0 || yy >= h as i64 {
                                continue;
                            }
                            let otheridx = (yy * w as i64 + xx) as usize;
                            if fill[otheridx] == FillState::Blank {
                                queue.push(otheridx);
                                fill[otheridx] = FillState::Candidate;
                            }
                        }
                    }
                }
            }
        }
    }

    /// A pixel whose diff deviates from any neighbour sampled at the window
    /// radius by more than the threshold is a smoothness edge.
    fn build_depth_relative_edges(&mut self, zones: &ZoneMap) {
        let w = self.width as i64;
        let win = self.cfg.depthrel_dist as i64;
        let n = self.flags.len() as i64;
        let px = zones.px();

        for i in (w * win)..(n - w * win) {
            let myval = px[i as usize].diff;
            'neighbors: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let otheridx = i + dx * win + dy * win * w;
                    if !(0..n).contains(&otheridx) {
                        continue;
                    }
                    if (myval - px[otheridx as usize].diff).abs() > self.cfg.depthrel_thresh {
                        self.flags[i as usize] |= EdgeFlags::DEPTH_REL;
                        break 'neighbors;
                    }
                }
            }
        }
    }

    /// A pixel near any neighbour that is far off the surface is a height
    /// edge. This eliminates gradiated pixels on the rounded edges of arms
    /// and knuckles.
    fn build_depth_absolute_edges(&mut self, zones: &ZoneMap) {
        let w = self.width as i64;
        let win = self.cfg.depthabs_dist as i64;
        let n = self.flags.len() as i64;
        let px = zones.px();

        for i in (w * win)..(n - w * win) {
            'neighbors: for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let otheridx = i + dx * win + dy * win * w;
                    if !(0..n).contains(&otheridx) {
                        continue;
                    }
                    if px[otheridx as usize].diff > self.cfg.depthabs_thresh {
                        self.flags[i as usize] |= EdgeFlags::DEPTH_ABS;
                        break 'neighbors;
                    }
                }
            }
        }
    }
}
