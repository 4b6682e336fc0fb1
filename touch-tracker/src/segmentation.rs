//! Hierarchical flood-fill segmentation: arm -> hand -> finger -> tip.
//!
//! Each level flood-fills 4-connected neighbours under its own combination
//! of zone and edge constraints, mirroring anatomy: arms are large and
//! obviously real, hands and fingers are traced with edge gating, and tips
//! extend through noise-zone pixels under a hard distance cap. Rejected
//! blobs keep a reason tag for diagnostics and never disturb accepted
//! neighbours.

use std::collections::HashSet;

use touch_tracker_types::SegmentationCfg;

use crate::background_model::SharedBackground;
use crate::edges::{EdgeDetector, EdgeFlags};
use crate::zones::{Zone, ZoneMap};

/// Which hierarchy level claimed a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum ClaimLevel {
    Tip,
    Finger,
    Hand,
    Arm,
}

/// Why a candidate blob was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ArmTooSmall,
    ArmNoHands,
    HandTooSmall,
    HandNoFingers,
    FingerTooSmall,
    FingerTooShort,
}

/// Per-pixel segmentation scratch state, rebuilt every frame.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BlobPixel {
    pub(crate) claimed: Option<ClaimLevel>,
    /// Frontier marker: the pixel has been queued by some flood.
    visited: bool,
    pub(crate) rejected: Option<RejectReason>,
    /// Flood distance from the seed (fingers/tips), corrected to
    /// distance-from-root after the re-flood pass.
    pub(crate) dist: u32,
    /// Display color of the owning blob, from the bit-reversed blob id.
    pub(crate) color: u8,
}

impl BlobPixel {
    #[inline]
    fn is_clear(&self) -> bool {
        self.claimed.is_none() && !self.visited && self.rejected.is_none()
    }
}

/// An accepted arm blob and the hierarchy hanging off it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArmBlob {
    pub hands: Vec<HandBlob>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandBlob {
    pub fingers: Vec<FingerBlob>,
}

/// A fingertip candidate: tip position and height above the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerBlob {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

struct TipBlob {
    pixels: Vec<(usize, u32)>,
    roots: Vec<usize>,
}

/// Spread adjacent blob ids apart for display by reversing the bits of the
/// id byte.
fn color_for_blob_index(blob_id: u32) -> u8 {
    let b = blob_id as u8 as u64;
    (((b * 0x80200802) & 0x0884422110) as u128 * 0x0101010101 >> 32) as u8
}

pub struct SegmentationEngine {
    width: usize,
    height: usize,
    cfg: SegmentationCfg,
    blob_px: Vec<BlobPixel>,
    next_blob_id: u32,
}

impl SegmentationEngine {
    pub fn new(width: u32, height: u32, cfg: SegmentationCfg) -> Self {
        let n = width as usize * height as usize;
        Self {
            width: width as usize,
            height: height as usize,
            cfg,
            blob_px: vec![BlobPixel::default(); n],
            next_blob_id: 1,
        }
    }

    #[inline]
    pub(crate) fn blob_px(&self) -> &[BlobPixel] {
        &self.blob_px
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width as u32
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height as u32
    }

    /// The reject tag of a pixel, for diagnostics.
    pub fn reject_reason(&self, idx: usize) -> Option<RejectReason> {
        self.blob_px[idx].rejected
    }

    /// Segment one classified frame into accepted arm/hand/finger blobs.
    ///
    /// All scratch state is reset first, so segmenting the same frozen frame
    /// twice yields identical results.
    pub fn segment(
        &mut self,
        zones: &ZoneMap,
        edges: &EdgeDetector,
        depth: &[u16],
        background: &SharedBackground,
    ) -> Vec<ArmBlob> {
        assert_eq!(zones.px().len(), self.blob_px.len());
        self.blob_px.fill(BlobPixel::default());
        self.next_blob_id = 1;

        let mut arms = Vec::new();
        for i in 0..self.blob_px.len() {
            if zones.zone(i) != Zone::High {
                continue;
            }
            if !self.blob_px[i].is_clear() {
                continue;
            }
            if let Some(arm) = self.flood_arm(zones, edges, depth, background, i) {
                arms.push(arm);
            }
        }
        arms
    }

    /// 4-connected neighbours of `idx`, in-bounds only.
    #[inline]
    fn neighbors(&self, idx: usize) -> [Option<usize>; 4] {
        let (w, h) = (self.width, self.height);
        let y = idx / w;
        let x = idx % w;
        [
            (x > 0).then(|| idx - 1),
            (y > 0).then(|| idx - w),
            (y + 1 < h).then(|| idx + w),
            (x + 1 < w).then(|| idx + 1),
        ]
    }

    fn reject_blob_plain(&mut self, blob: &[usize], reason: RejectReason) {
        for &i in blob {
            self.blob_px[i].rejected = Some(reason);
        }
    }

    fn reject_blob(&mut self, blob: &[(usize, u32)], reason: RejectReason) {
        for &(i, _) in blob {
            self.blob_px[i].rejected = Some(reason);
        }
    }

    fn color_blob_plain(&mut self, blob: &[usize]) {
        let color = color_for_blob_index(self.next_blob_id);
        self.next_blob_id += 1;
        for &i in blob {
            self.blob_px[i].color = color;
        }
    }

    /// Arms grow through high-zone pixels with no edge gating, collecting
    /// adjacent mid-zone pixels as hand seeds.
    fn flood_arm(
        &mut self,
        zones: &ZoneMap,
        edges: &EdgeDetector,
        depth: &[u16],
        background: &SharedBackground,
        seed: usize,
    ) -> Option<ArmBlob> {
        let mut q: Vec<usize> = vec![seed];
        let mut q2: Vec<usize> = Vec::new();
        let mut qtail = 0;

        while qtail < q.len() {
            let curidx = q[qtail];
            qtail += 1;
            self.blob_px[curidx].claimed = Some(ClaimLevel::Arm);

            for other in self.neighbors(curidx).into_iter().flatten() {
                if !self.blob_px[other].is_clear() {
                    continue;
                }
                match zones.zone(other) {
                    Zone::High => q.push(other),
                    Zone::Mid => q2.push(other),
                    _ => {}
                }
                self.blob_px[other].visited = true;
            }
        }

        if q.len() < self.cfg.arm_min_size {
            self.reject_blob_plain(&q, RejectReason::ArmTooSmall);
            return None;
        }

        // Enough pixels for the arm: release the frontier for the next stage.
        for &i in &q2 {
            self.blob_px[i].visited = false;
        }

        let mut arm = ArmBlob { hands: Vec::new() };
        for &i in &q2 {
            if !self.blob_px[i].is_clear() {
                continue;
            }
            if let Some(hand) = self.flood_hand(zones, edges, depth, background, i) {
                arm.hands.push(hand);
            }
        }

        if arm.hands.is_empty() {
            self.reject_blob_plain(&q, RejectReason::ArmNoHands);
            return None;
        }

        self.color_blob_plain(&q);
        Some(arm)
    }

    /// Hands grow through mid-or-higher pixels, refusing to cross infrared
    /// or smoothness edges, collecting adjacent low-zone pixels as finger
    /// seeds.
    fn flood_hand(
        &mut self,
        zones: &ZoneMap,
        edges: &EdgeDetector,
        depth: &[u16],
        background: &SharedBackground,
        seed: usize,
    ) -> Option<HandBlob> {
        let mut q: Vec<usize> = vec![seed];
        let mut q2: Vec<usize> = Vec::new();
        let mut qtail = 0;

        while qtail < q.len() {
            let curidx = q[qtail];
            qtail += 1;
            self.blob_px[curidx].claimed = Some(ClaimLevel::Hand);

            for other in self.neighbors(curidx).into_iter().flatten() {
                if !self.blob_px[other].is_clear() {
                    continue;
                }
                if edges.is_edge(other, EdgeFlags::IR | EdgeFlags::DEPTH_REL) {
                    continue;
                }
                match zones.zone(other) {
                    z if z >= Zone::Mid => q.push(other),
                    Zone::Low => q2.push(other),
                    _ => {}
                }
                self.blob_px[other].visited = true;
            }
        }

        if q.len() < self.cfg.hand_min_size {
            self.reject_blob_plain(&q, RejectReason::HandTooSmall);
            return None;
        }

        for &i in &q2 {
            self.blob_px[i].visited = false;
        }

        let mut hand = HandBlob {
            fingers: Vec::new(),
        };
        for &i in &q2 {
            if !self.blob_px[i].is_clear() {
                continue;
            }
            if let Some(finger) = self.flood_finger(zones, edges, depth, background, i) {
                hand.fingers.push(finger);
            }
        }

        if hand.fingers.is_empty() {
            self.reject_blob_plain(&q, RejectReason::HandNoFingers);
            return None;
        }

        self.color_blob_plain(&q);
        Some(hand)
    }

    /// Fingers grow through low-or-higher pixels gated by infrared and
    /// height edges, tracking flood distance from the seed. Pixels adjacent
    /// to a hand or arm claim become roots (base-of-finger anchors). Noise
    /// pixels spawn distance-capped tip sub-floods whose pixels are absorbed
    /// on success.
    fn flood_finger(
        &mut self,
        zones: &ZoneMap,
        edges: &EdgeDetector,
        depth: &[u16],
        background: &SharedBackground,
        seed: usize,
    ) -> Option<FingerBlob> {
        let mut q: Vec<(usize, u32)> = vec![(seed, 0)];
        let mut q2: Vec<(usize, u32)> = Vec::new();
        // Pixels adjacent to a mid/high-confidence claim.
        let mut roots: Vec<usize> = Vec::new();
        let mut qtail = 0;

        while qtail < q.len() {
            let (curidx, dist) = q[qtail];
            qtail += 1;

            self.blob_px[curidx].claimed = Some(ClaimLevel::Finger);
            self.blob_px[curidx].dist = dist;

            let mut is_root = false;
            for other in self.neighbors(curidx).into_iter().flatten() {
                if self.blob_px[other].claimed >= Some(ClaimLevel::Hand) {
                    is_root = true;
                }
                if !self.blob_px[other].is_clear() {
                    continue;
                }
                if edges.is_edge(other, EdgeFlags::IR | EdgeFlags::DEPTH_ABS) {
                    continue;
                }
                match zones.zone(other) {
                    z if z >= Zone::Low => q.push((other, dist + 1)),
                    Zone::Noise => q2.push((other, dist + 1)),
                    _ => {}
                }
                self.blob_px[other].visited = true;
            }
            if is_root {
                roots.push(curidx);
            }
        }

        for &(i, _) in &q2 {
            self.blob_px[i].visited = false;
        }

        let mut tipq: Vec<(usize, u32)> = Vec::new();
        for &(i, dist) in &q2 {
            if !self.blob_px[i].is_clear() {
                continue;
            }
            if let Some(tip) = self.flood_tip(edges, (i, dist)) {
                for &p in &tip.pixels {
                    q.push(p);
                    tipq.push(p);
                }
                roots.extend_from_slice(&tip.roots);
            }
        }

        if q.len() < self.cfg.finger_min_size {
            self.reject_blob(&q, RejectReason::FingerTooSmall);
            for &(i, _) in &tipq {
                self.blob_px[i] = BlobPixel::default();
            }
            return None;
        }

        self.reflood_finger(&q, &roots);

        match self.compute_finger_metrics(&mut q, depth, background) {
            Some(finger) => {
                self.color_blob(&q);
                Some(finger)
            }
            None => {
                // Too short to be a finger.
                self.reject_blob(&q, RejectReason::FingerTooShort);
                for &(i, _) in &tipq {
                    self.blob_px[i] = BlobPixel::default();
                }
                None
            }
        }
    }

    fn color_blob(&mut self, blob: &[(usize, u32)]) {
        let color = color_for_blob_index(self.next_blob_id);
        self.next_blob_id += 1;
        for &(i, _) in blob {
            self.blob_px[i].color = color;
        }
    }

    /// Tips flood through any clear pixel not behind an infrared edge,
    /// continuing the finger's distance count. Exceeding the distance cap
    /// rolls the whole sub-blob back as if it never happened.
    fn flood_tip(&mut self, edges: &EdgeDetector, seed: (usize, u32)) -> Option<TipBlob> {
        let mut q: Vec<(usize, u32)> = vec![seed];
        let mut roots: Vec<usize> = Vec::new();
        let mut qtail = 0;

        while qtail < q.len() {
            let (curidx, dist) = q[qtail];
            qtail += 1;

            if dist > self.cfg.tip_max_dist {
                // Runaway fill: pretend this blob never happened.
                for &(i, _) in &q {
                    self.blob_px[i] = BlobPixel::default();
                }
                return None;
            }

            self.blob_px[curidx].claimed = Some(ClaimLevel::Tip);
            self.blob_px[curidx].dist = dist;

            let mut is_root = false;
            for other in self.neighbors(curidx).into_iter().flatten() {
                if self.blob_px[other].claimed >= Some(ClaimLevel::Hand) {
                    is_root = true;
                }
                if !self.blob_px[other].is_clear() {
                    continue;
                }
                if edges.is_edge(other, EdgeFlags::IR) {
                    continue;
                }
                q.push((other, dist + 1));
                self.blob_px[other].visited = true;
            }
            if is_root {
                roots.push(curidx);
            }
        }

        Some(TipBlob { pixels: q, roots })
    }

    /// Recompute per-pixel distances using the root pixels as seeds, so the
    /// tip-selection step measures distance from the hand rather than from
    /// the arbitrary seed pixel.
    fn reflood_finger(&mut self, blob: &[(usize, u32)], roots: &[usize]) {
        let mut unseen: HashSet<usize> = blob.iter().map(|&(i, _)| i).collect();
        for r in roots {
            unseen.remove(r);
        }

        let mut q: Vec<(usize, u32)> = roots.iter().map(|&r| (r, 0)).collect();
        let mut qtail = 0;
        while qtail < q.len() {
            let (curidx, dist) = q[qtail];
            qtail += 1;

            self.blob_px[curidx].dist = dist;

            for other in self.neighbors(curidx).into_iter().flatten() {
                if unseen.remove(&other) {
                    q.push((other, dist + 1));
                }
            }
        }
    }

    /// Rank pixels by corrected distance; prune stubby fingers; average the
    /// farthest pixels into the touch height (smoothing sensor noise) and
    /// the tip position (kept sharp: infrared-derived positions are already
    /// stable).
    fn compute_finger_metrics(
        &self,
        px: &mut [(usize, u32)],
        depth: &[u16],
        background: &SharedBackground,
    ) -> Option<FingerBlob> {
        px.sort_by_key(|&(i, _)| self.blob_px[i].dist);

        let (maxidx, _) = px[px.len() - 1];
        let maxdist = self.blob_px[maxidx].dist;
        if maxdist < self.cfg.finger_min_dist {
            return None;
        }

        let start = px.len().saturating_sub(self.cfg.touchz_window.max(1));
        let mut avgdiff = 0.0f32;
        for &(i, _) in &px[start..] {
            avgdiff += background.mean(i) - depth[i] as f32;
        }
        let z = avgdiff / (px.len() - start) as f32;

        let start = px.len().saturating_sub(self.cfg.tip_window.max(1));
        let (mut avgx, mut avgy) = (0.0f32, 0.0f32);
        for &(i, _) in &px[start..] {
            avgx += (i % self.width) as f32;
            avgy += (i / self.width) as f32;
        }
        let count = (px.len() - start) as f32;

        Some(FingerBlob {
            x: avgx / count,
            y: avgy / count,
            z,
        })
    }
}
