//! Temporal correspondence between published touches and fresh candidates.
//!
//! One parameterized implementation is shared by every tracker variant; only
//! the gating distance, smoothing factors and hysteresis thresholds differ.

use touch_tracker_types::{FingerTouch, MatchCfg, TouchCandidate};

use crate::errors::{Error, Result};

pub struct TouchMatcher {
    cfg: MatchCfg,
    next_touch_id: i32,
}

impl TouchMatcher {
    pub fn new(cfg: MatchCfg) -> Result<Self> {
        if let Some(h) = &cfg.hysteresis {
            if h.exit <= h.enter {
                return Err(Error::BadHysteresis);
            }
        }
        Ok(Self {
            cfg,
            next_touch_id: 1,
        })
    }

    /// Merge the previous frame's touch set with this frame's candidates,
    /// producing the new published set with identities and continuity state.
    ///
    /// Greedy nearest-neighbour assignment: all gated pairs sorted ascending
    /// by tip distance, assigned first-come, skipping pairs where either
    /// side is taken. Not globally optimal, but sufficient under gating and
    /// low per-frame touch counts.
    pub fn merge(&mut self, cur: &[FingerTouch], candidates: Vec<TouchCandidate>) -> Vec<FingerTouch> {
        let mut cur: Vec<FingerTouch> = cur.to_vec();
        let mut new_touches: Vec<FingerTouch> = candidates
            .into_iter()
            .map(|c| FingerTouch {
                id: -1,
                tip: c.tip,
                base: c.base,
                touched: c.touched,
                status_age: 0,
                touch_age: 0,
                touch_z: c.touch_z,
                missing: false,
                missing_age: 0,
            })
            .collect();

        let mut distances: Vec<(usize, usize, f32)> = Vec::new();
        for (i, c) in cur.iter().enumerate() {
            for (j, n) in new_touches.iter().enumerate() {
                let d = nalgebra::distance(&c.tip, &n.tip);
                if d > self.cfg.gate_distance {
                    continue;
                }
                distances.push((i, j, d));
            }
        }
        distances.sort_by(|a, b| a.2.total_cmp(&b.2));

        for &(i, j, _) in &distances {
            if cur[i].id < 0 || new_touches[j].id >= 0 {
                continue;
            }
            let prev = cur[i].clone();
            let new_touch = &mut new_touches[j];

            // Move the old identity onto the new touch.
            new_touch.id = prev.id;
            cur[i].id = -1;

            new_touch.touch_age = prev.touch_age + 1;
            new_touch.tip = prev.tip + (new_touch.tip - prev.tip) * self.cfg.tip_alpha;
            new_touch.touch_z =
                prev.touch_z + (new_touch.touch_z - prev.touch_z) * self.cfg.touch_z_alpha;

            match &self.cfg.hysteresis {
                Some(h) => {
                    if prev.touched && new_touch.touch_z > h.exit {
                        new_touch.touched = false;
                        new_touch.status_age = 0;
                    } else if !prev.touched && new_touch.touch_z < h.enter {
                        new_touch.touched = true;
                        new_touch.status_age = 0;
                    } else {
                        new_touch.touched = prev.touched;
                        new_touch.status_age = prev.status_age + 1;
                    }
                }
                None => {
                    // This detector decides contact itself; a matched
                    // candidate is simply touching.
                    new_touch.touched = true;
                }
            }
        }

        for t in new_touches.iter_mut() {
            t.missing = false;
            t.missing_age = 0;
        }

        // Retain unmatched touches as missing through the grace period.
        for t in &cur {
            if t.id < 0 {
                continue;
            }
            if t.missing && t.missing_age >= self.cfg.missing_grace {
                continue;
            }
            let mut t = t.clone();
            t.missing_age = if t.missing { t.missing_age + 1 } else { 1 };
            t.missing = true;
            t.status_age += 1;
            t.touch_age += 1;
            new_touches.push(t);
        }

        // Unmatched candidates become brand-new touches.
        for t in new_touches.iter_mut() {
            if t.id < 0 {
                t.id = self.next_touch_id;
                self.next_touch_id += 1;
                t.status_age = 0;
                t.touch_age = 0;
            }
        }

        new_touches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use touch_tracker_types::HysteresisCfg;

    fn cfg() -> MatchCfg {
        MatchCfg {
            gate_distance: 50.0,
            tip_alpha: 1.0,
            touch_z_alpha: 0.5,
            hysteresis: Some(HysteresisCfg {
                enter: 0.5,
                exit: 2.5,
            }),
            missing_grace: 3,
        }
    }

    fn touch(id: i32, x: f32, y: f32) -> FingerTouch {
        FingerTouch {
            id,
            tip: Point2::new(x, y),
            base: None,
            touched: false,
            status_age: 4,
            touch_age: 7,
            touch_z: 1.0,
            missing: false,
            missing_age: 0,
        }
    }

    fn candidate(x: f32, y: f32, z: f32) -> TouchCandidate {
        TouchCandidate {
            tip: Point2::new(x, y),
            base: None,
            touch_z: z,
            touched: false,
        }
    }

    #[test]
    fn nearby_candidate_inherits_identity() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let cur = vec![touch(5, 10.0, 10.0)];
        let out = m.merge(&cur, vec![candidate(10.5, 10.2, 1.0)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].id, 5);
        assert_eq!(out[0].touch_age, 8);
        // z stayed between the hysteresis thresholds: state unchanged, age
        // incremented.
        assert!(!out[0].touched);
        assert_eq!(out[0].status_age, 5);
        assert!(!out[0].missing);
    }

    #[test]
    fn hysteresis_enter_and_exit() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        // Low candidate height pulls the smoothed z below the enter
        // threshold: the touch activates and the status age resets.
        let cur = vec![touch(3, 10.0, 10.0)];
        let out = m.merge(&cur, vec![candidate(10.0, 10.0, -0.5)]);
        assert!(out[0].touched);
        assert_eq!(out[0].status_age, 0);

        // From touched, a small rise stays touched (below exit)...
        let out2 = m.merge(&out, vec![candidate(10.0, 10.0, 2.0)]);
        assert!(out2[0].touched);
        assert_eq!(out2[0].status_age, 1);

        // ...but a large rise crosses the exit threshold and releases.
        let out3 = m.merge(&out2, vec![candidate(10.0, 10.0, 8.0)]);
        assert!(!out3[0].touched);
        assert_eq!(out3[0].status_age, 0);
    }

    #[test]
    fn smoothing_applies_to_touch_z() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let mut cur = touch(1, 0.0, 0.0);
        cur.touch_z = 2.0;
        let out = m.merge(&[cur], vec![candidate(0.0, 0.0, 4.0)]);
        // alpha 0.5: halfway between old and new.
        assert!((out[0].touch_z - 3.0).abs() < 1e-6);
    }

    #[test]
    fn distant_candidate_gets_a_fresh_id() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let cur = vec![touch(5, 10.0, 10.0)];
        let out = m.merge(&cur, vec![candidate(200.0, 200.0, 0.0)]);
        // The old touch is retained as missing; the candidate is new.
        let fresh: Vec<_> = out.iter().filter(|t| t.id != 5).collect();
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].touch_age, 0);
        assert_eq!(fresh[0].status_age, 0);
        assert!(out.iter().any(|t| t.id == 5 && t.missing));
    }

    #[test]
    fn greedy_assignment_prefers_nearest() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let cur = vec![touch(1, 0.0, 0.0), touch(2, 20.0, 0.0)];
        let out = m.merge(
            &cur,
            vec![candidate(19.0, 0.0, 1.0), candidate(1.0, 0.0, 1.0)],
        );
        let by_id = |id: i32| out.iter().find(|t| t.id == id).unwrap();
        assert_eq!(by_id(1).tip.x, 1.0);
        assert_eq!(by_id(2).tip.x, 19.0);
    }

    #[test]
    fn missing_grace_period() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let mut set = m.merge(&[touch(9, 10.0, 10.0)], vec![]);
        for expected_age in 1..=3u32 {
            assert_eq!(set.len(), 1, "frame {}", expected_age);
            assert!(set[0].missing);
            assert_eq!(set[0].missing_age, expected_age);
            set = m.merge(&set, vec![]);
        }
        // Fourth consecutive unmatched frame: gone.
        assert!(set.is_empty());
    }

    #[test]
    fn reappearing_touch_resets_missing_state() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let set = m.merge(&[touch(9, 10.0, 10.0)], vec![]);
        assert!(set[0].missing);
        let set = m.merge(&set, vec![candidate(10.0, 10.0, 1.0)]);
        assert_eq!(set[0].id, 9);
        assert!(!set[0].missing);
        assert_eq!(set[0].missing_age, 0);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut m = TouchMatcher::new(cfg()).unwrap();
        let a = m.merge(&[], vec![candidate(0.0, 0.0, 0.0)]);
        let first_id = a[0].id;
        // Drop it and create another; the new touch gets a fresh id.
        let b = m.merge(&[], vec![candidate(100.0, 100.0, 0.0)]);
        assert_ne!(b[0].id, first_id);
    }

    #[test]
    fn bad_hysteresis_is_rejected() {
        let mut cfg = cfg();
        cfg.hysteresis = Some(HysteresisCfg {
            enter: 2.5,
            exit: 0.5,
        });
        assert!(TouchMatcher::new(cfg).is_err());
    }
}
