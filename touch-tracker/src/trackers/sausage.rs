//! Slice-tracing touch detection after OmniTouch.
//!
//! Fingers appear in the depth gradient as "sausages": short runs that enter
//! (negative gradient) and exit (positive gradient) within a finger-like
//! width. Slices found along both axes are chained into finger paths, whose
//! endpoint midpoints give the tip and base.

use nalgebra::Point2;
use touch_tracker_types::{DepthIrFrame, SausageTrackerCfg, TouchCandidate};

use crate::background_model::SharedBackground;
use crate::tracker::TouchStrategy;

/// Membership of a pixel in a detected slice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum SlicePx {
    #[default]
    None,
    /// First pixel of a slice of the given length.
    Start(u8),
    /// Interior pixel, with its backward offset to the slice start.
    Within(u8),
}

pub struct SausageStrategy {
    cfg: SausageTrackerCfg,
    width: usize,
    height: usize,
    /// Horizontal/vertical depth gradients; `None` where depth is invalid.
    dx: Vec<Option<i32>>,
    dy: Vec<Option<i32>>,
    x_slices: Vec<SlicePx>,
    y_slices: Vec<SlicePx>,
    visited_x: Vec<bool>,
    visited_y: Vec<bool>,
}

impl SausageStrategy {
    pub fn new(width: u32, height: u32, cfg: SausageTrackerCfg) -> Self {
        let n = width as usize * height as usize;
        Self {
            cfg,
            width: width as usize,
            height: height as usize,
            dx: vec![None; n],
            dy: vec![None; n],
            x_slices: vec![SlicePx::None; n],
            y_slices: vec![SlicePx::None; n],
            visited_x: vec![false; n],
            visited_y: vec![false; n],
        }
    }

    #[inline]
    fn grad_from(&self, front: i32, back: i32, prevfront: i32, prevback: i32) -> Option<i32> {
        let cutoff = self.cfg.depth_cutoff as i32;
        let back_invalid = back == 0 || back > cutoff;
        let front_invalid = front == 0 || front > cutoff;
        if back_invalid && front_invalid {
            return None;
        }
        let back = if back_invalid { prevback } else { back };
        let front = if front_invalid { prevfront } else { front };
        if back == 0 || front == 0 {
            return None;
        }
        let clamped = (front - back + 127).clamp(0, 255);
        if clamped == 0 {
            None
        } else {
            Some(clamped - 127)
        }
    }

    fn calc_depth_dx(&mut self, depth: &[u16]) {
        let (w, h, dist) = (self.width, self.height, self.cfg.gradient_dist);
        for y in 0..h {
            let row = y * w;
            for x in 0..dist.min(w) {
                self.dx[row + x] = Some(0);
            }
            let (mut prevback, mut prevfront) = (0i32, 0i32);
            for x in dist..w {
                let back = depth[row + x - dist] as i32;
                let front = depth[row + x] as i32;
                self.dx[row + x] = self.grad_from(front, back, prevfront, prevback);
                prevback = back;
                prevfront = front;
            }
        }
    }

    fn calc_depth_dy(&mut self, depth: &[u16]) {
        let (w, h, dist) = (self.width, self.height, self.cfg.gradient_dist);
        for y in 0..dist.min(h) {
            for x in 0..w {
                self.dy[y * w + x] = Some(0);
            }
        }
        for y in dist..h {
            let row = y * w;
            let (mut prevback, mut prevfront) = (0i32, 0i32);
            for x in 0..w {
                let back = depth[row + x - dist * w] as i32;
                let front = depth[row + x] as i32;
                self.dy[row + x] = self.grad_from(front, back, prevfront, prevback);
                prevback = back;
                prevfront = front;
            }
        }
    }

    /// Scan each row for enter/exit gradient pairs within finger width.
    fn find_x_slices(&mut self) {
        let (w, h) = (self.width, self.height);
        let cfg = &self.cfg;
        for y in 0..h {
            let row = y * w;
            let mut x = 0;
            while x < w {
                let i = row + x;
                match self.dx[i] {
                    Some(v) if (cfg.enter_min..=cfg.enter_max).contains(&v) => {}
                    _ => {
                        x += 1;
                        continue;
                    }
                }

                let mut advance = 1;
                for d in cfg.width_min..cfg.width_max {
                    if x + d >= w {
                        break;
                    }
                    let (exit, mid) = (self.dx[i + d], self.dx[i + d / 2]);
                    if exit.is_none() || mid.is_none() {
                        break;
                    }
                    let exit = exit.unwrap();
                    if !(cfg.exit_min..=cfg.exit_max).contains(&exit) {
                        continue;
                    }

                    self.x_slices[i] = SlicePx::Start(d as u8);
                    for k in 1..d {
                        self.x_slices[i + k] = SlicePx::Within(k as u8);
                    }
                    advance = d + 1;
                    break;
                }
                x += advance;
            }
        }
    }

    /// Scan each column for enter/exit gradient pairs within finger width.
    fn find_y_slices(&mut self) {
        let (w, h) = (self.width, self.height);
        let cfg = &self.cfg;
        for x in 0..w {
            let mut y = 0;
            while y < h {
                let i = y * w + x;
                match self.dy[i] {
                    Some(v) if (cfg.enter_min..=cfg.enter_max).contains(&v) => {}
                    _ => {
                        y += 1;
                        continue;
                    }
                }

                let mut advance = 1;
                for d in cfg.width_min..cfg.width_max {
                    if y + d >= h {
                        break;
                    }
                    let (exit, mid) = (self.dy[i + d * w], self.dy[i + (d / 2) * w]);
                    if exit.is_none() || mid.is_none() {
                        break;
                    }
                    let exit = exit.unwrap();
                    if !(cfg.exit_min..=cfg.exit_max).contains(&exit) {
                        continue;
                    }

                    self.y_slices[i] = SlicePx::Start(d as u8);
                    for k in 1..d {
                        self.y_slices[i + k * w] = SlicePx::Within(k as u8);
                    }
                    advance = d + 1;
                    break;
                }
                y += advance;
            }
        }
    }

    fn midpt_x(&self, idx: usize) -> usize {
        match self.x_slices[idx] {
            SlicePx::Start(len) => idx + len as usize / 2,
            SlicePx::Within(back) => {
                let start = idx - back as usize;
                match self.x_slices[start] {
                    SlicePx::Start(len) => start + len as usize / 2,
                    _ => idx,
                }
            }
            SlicePx::None => idx,
        }
    }

    fn midpt_y(&self, idx: usize) -> usize {
        match self.y_slices[idx] {
            SlicePx::Start(len) => idx + (len as usize / 2) * self.width,
            SlicePx::Within(back) => {
                let start = idx - back as usize * self.width;
                match self.y_slices[start] {
                    SlicePx::Start(len) => start + (len as usize / 2) * self.width,
                    _ => idx,
                }
            }
            SlicePx::None => idx,
        }
    }

    /// Walk a chain of x-slices starting from a midpoint, optionally
    /// switching to y-slices when the chain runs out.
    fn find_x_finger(&mut self, start: usize, points: &mut Vec<usize>, can_switch: bool, reverse: bool) {
        let (w, n) = (self.width, self.x_slices.len());
        let mut cur = start;
        loop {
            if can_switch {
                self.visited_x[cur] = true;
            }

            let mut found: i64 = 0;
            if reverse {
                for i in 1..self.cfg.search_gap {
                    match cur.checked_sub(i * w) {
                        Some(cand) => {
                            if self.x_slices[cand] != SlicePx::None {
                                found = -(i as i64);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            } else {
                for i in 1..self.cfg.search_gap {
                    let cand = cur + i * w;
                    if cand >= n {
                        break;
                    }
                    if self.x_slices[cand] != SlicePx::None {
                        found = i as i64;
                        break;
                    }
                }
            }

            if found != 0 {
                let cand = (cur as i64 + found * w as i64) as usize;
                cur = self.midpt_x(cand);
                points.push(cur);
            } else if can_switch {
                let initial_x = start % w;
                let current_x = cur % w;
                self.find_y_finger(cur, points, false, initial_x > current_x);
                break;
            } else {
                break;
            }
        }
    }

    /// Walk a chain of y-slices starting from a midpoint, optionally
    /// switching to x-slices when the chain runs out.
    fn find_y_finger(&mut self, start: usize, points: &mut Vec<usize>, can_switch: bool, reverse: bool) {
        let (w, n) = (self.width, self.y_slices.len());
        let mut cur = start;
        loop {
            if can_switch {
                self.visited_y[cur] = true;
            }

            let mut found: i64 = 0;
            if reverse {
                for i in 1..self.cfg.search_gap {
                    match cur.checked_sub(i) {
                        Some(cand) => {
                            if self.y_slices[cand] != SlicePx::None {
                                found = -(i as i64);
                                break;
                            }
                        }
                        None => break,
                    }
                }
            } else {
                for i in 1..self.cfg.search_gap {
                    let cand = cur + i;
                    if cand >= n {
                        break;
                    }
                    if self.y_slices[cand] != SlicePx::None {
                        found = i as i64;
                        break;
                    }
                }
            }

            if found != 0 {
                let cand = (cur as i64 + found) as usize;
                cur = self.midpt_y(cand);
                points.push(cur);
            } else if can_switch {
                let initial_y = start / w;
                let current_y = cur / w;
                self.find_x_finger(cur, points, false, initial_y > current_y);
                break;
            } else {
                break;
            }
        }
    }

    fn find_fingers(&mut self) -> Vec<Vec<usize>> {
        let (w, h) = (self.width, self.height);
        let mut fingers = Vec::new();

        // Fingers seeded from x-slices.
        for y in 0..h {
            let row = y * w;
            let mut x = 0;
            while x < w {
                match self.x_slices[row + x] {
                    SlicePx::Start(len) => {
                        let midpt = self.midpt_x(row + x);
                        x += len as usize;
                        if self.visited_x[midpt] {
                            continue;
                        }
                        let mut points = vec![midpt];
                        self.find_x_finger(midpt, &mut points, true, false);
                        if points.len() >= self.cfg.min_slices {
                            fingers.push(points);
                        }
                    }
                    _ => {
                        x += 1;
                    }
                }
            }
        }

        // Fingers seeded from y-slices.
        for x in 0..w {
            let mut y = 0;
            while y < h {
                match self.y_slices[y * w + x] {
                    SlicePx::Start(len) => {
                        let midpt = self.midpt_y(y * w + x);
                        y += len as usize;
                        if self.visited_y[midpt] {
                            continue;
                        }
                        let mut points = vec![midpt];
                        self.find_y_finger(midpt, &mut points, true, false);
                        if points.len() >= self.cfg.min_slices {
                            fingers.push(points);
                        }
                    }
                    _ => {
                        y += 1;
                    }
                }
            }
        }

        fingers
    }

    /// Suppress redundant detections: a tip inside another finger's personal
    /// space loses to the longer finger. Survivors get their tip projected
    /// forward a few pixels along the finger axis.
    fn filter_touches(&self, touches: Vec<TouchCandidate>) -> Vec<TouchCandidate> {
        let mut filtered = Vec::new();
        for (i, ft) in touches.iter().enumerate() {
            let ft_base = match ft.base {
                Some(b) => b,
                None => continue,
            };
            let mut should_add = true;

            for (j, other) in touches.iter().enumerate() {
                if !should_add {
                    break;
                }
                if i == j {
                    continue;
                }
                let other_base = match other.base {
                    Some(b) => b,
                    None => continue,
                };

                let pv = ft.tip - other_base;
                let tv = other.tip - other_base;
                let tvlen = tv.norm();
                if tvlen == 0.0 {
                    continue;
                }
                let tvn = tv / tvlen;
                let r = pv.dot(&tvn);
                if r < -10.0 || r >= tvlen + 10.0 {
                    // The tip lies outside the segment joining the other
                    // finger's tip and base.
                    continue;
                }
                if (pv - tvn * r).norm() > 9.0 {
                    // Perpendicular clearance is enough.
                    continue;
                }

                // Inside the other finger's personal space: keep the longer.
                let mylen = (ft.tip - ft_base).norm();
                let otherlen = tvlen;
                if mylen < otherlen || (mylen == otherlen && i > j) {
                    should_add = false;
                }
            }

            if should_add {
                let mut t = ft.clone();
                let dir = t.tip - ft_base;
                let norm = dir.norm();
                if norm > 0.0 {
                    t.tip += dir / norm * self.cfg.tip_projection;
                }
                filtered.push(t);
            }
        }
        filtered
    }
}

impl TouchStrategy for SausageStrategy {
    fn name(&self) -> &'static str {
        "sausage-tracker"
    }

    fn detect(
        &mut self,
        frame: &DepthIrFrame,
        background: &SharedBackground,
    ) -> Vec<TouchCandidate> {
        let w = self.width;
        self.calc_depth_dx(&frame.depth);
        self.calc_depth_dy(&frame.depth);
        self.x_slices.fill(SlicePx::None);
        self.y_slices.fill(SlicePx::None);
        self.visited_x.fill(false);
        self.visited_y.fill(false);
        self.find_x_slices();
        self.find_y_slices();

        let fingers = self.find_fingers();

        let mut touches = Vec::new();
        for finger in &fingers {
            let mut idx_tip = finger[2];
            let mut idx_base = finger[finger.len() - 2];
            if frame.depth[idx_tip] < frame.depth[idx_base] {
                std::mem::swap(&mut idx_tip, &mut idx_base);
            }
            let tip = Point2::new((idx_tip % w) as f32, (idx_tip / w) as f32);
            let base = Point2::new((idx_base % w) as f32, (idx_base / w) as f32);

            if background.mean(idx_tip) - (frame.depth[idx_tip] as f32) < self.cfg.touch_max_height {
                touches.push(TouchCandidate {
                    tip,
                    base: Some(base),
                    touch_z: 0.0,
                    touched: true,
                });
            }
        }

        self.filter_touches(touches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use touch_tracker_types::{FrameExtra, MatchCfg};

    const W: u32 = 48;
    const H: u32 = 48;

    fn cfg() -> SausageTrackerCfg {
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
            matching: MatchCfg {
                gate_distance: 100.0,
                tip_alpha: 1.0,
                touch_z_alpha: 1.0,
                hysteresis: None,
                missing_grace: 3,
            },
        }
    }

    fn frame(depth: Vec<u16>) -> DepthIrFrame {
        DepthIrFrame {
            width: W,
            height: H,
            ir: vec![0; depth.len()],
            depth,
            extra: FrameExtra {
                host_timestamp: chrono::Utc::now(),
                host_framenumber: 0,
            },
        }
    }

    /// A vertical finger-width bar hovering 5 units over the surface forms a
    /// chain of x-slices and one touch near the bar's top end, projected
    /// forward along the finger axis.
    #[test]
    fn vertical_bar_yields_one_touch() {
        let n = (W * H) as usize;
        let background = SharedBackground::new(W, H);
        for i in 0..n {
            background.set(i, 1000.0, 1.0);
        }
        let mut depth = vec![1000u16; n];
        for y in 5..25usize {
            for x in 14..18usize {
                depth[y * W as usize + x] = 995;
            }
        }

        let mut strat = SausageStrategy::new(W, H, cfg());
        let found = strat.detect(&frame(depth), &background);
        assert_eq!(found.len(), 1);
        let t = &found[0];
        assert!(t.touched);
        // Slice midpoints sit at x = 16; the tip is the early chain end
        // (y near 7), pushed 4 px further up by the forward projection.
        assert!((t.tip.x - 16.0).abs() < 1.0, "tip x = {}", t.tip.x);
        assert!(t.tip.y < 7.0, "tip y = {}", t.tip.y);
        assert!(t.base.is_some());
    }

    /// The same bar lifted far off the surface chains fine but fails the
    /// touch height test.
    #[test]
    fn hovering_bar_is_not_a_touch() {
        let n = (W * H) as usize;
        let background = SharedBackground::new(W, H);
        for i in 0..n {
            background.set(i, 1000.0, 1.0);
        }
        let mut depth = vec![1000u16; n];
        for y in 5..25usize {
            for x in 14..18usize {
                depth[y * W as usize + x] = 970;
            }
        }

        let mut strat = SausageStrategy::new(W, H, cfg());
        let found = strat.detect(&frame(depth), &background);
        assert!(found.is_empty());
    }

    #[test]
    fn flat_surface_yields_nothing() {
        let n = (W * H) as usize;
        let background = SharedBackground::new(W, H);
        let depth = vec![1000u16; n];
        let mut strat = SausageStrategy::new(W, H, cfg());
        assert!(strat.detect(&frame(depth), &background).is_empty());
    }
}
