use rand::Rng;

/// One item of the visual timeline: an index into the downloaded clip pool
/// plus how long that shot runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ShotAssignment {
    pub clip: usize,
    pub duration: f64,
}

/// Snap a duration to a whole frame count (2-frame floor) and back.
pub fn quantize_to_frames(seconds: f64, fps: u32) -> (u32, f64) {
    let frames = ((seconds * fps as f64).round() as i64).max(2) as u32;
    (frames, frames as f64 / fps as f64)
}

fn pick_clip<R: Rng>(
    usage: &[u32],
    max_uses: u32,
    last: Option<usize>,
    no_back_to_back: bool,
    rng: &mut R,
) -> usize {
    // Sort order: least used first, seeded-random tiebreak.
    let mut order: Vec<(u32, u64, usize)> = usage
        .iter()
        .enumerate()
        .map(|(i, &u)| (u, rng.gen_range(0..u64::MAX), i))
        .collect();
    order.sort();

    // Usage cap is the harder constraint: relax adjacency first.
    for &(u, _, idx) in &order {
        if u >= max_uses {
            continue;
        }
        if no_back_to_back && Some(idx) == last && usage.len() > 1 {
            continue;
        }
        return idx;
    }
    for &(u, _, idx) in &order {
        if u < max_uses {
            return idx;
        }
    }
    // Pool smaller than the slot count: exceed the cap as evenly as possible.
    order[0].2
}

/// Fixed-cadence carousel: slice `total_duration` into ~`cadence`-second
/// shots, the final slot absorbing the remainder. Never panics for a
/// non-empty pool and positive duration; the usage cap is exceeded only when
/// the pool has fewer distinct clips than slots.
pub fn build_carousel<R: Rng>(
    n_clips: usize,
    total_duration: f64,
    cadence: f64,
    max_uses: u32,
    no_back_to_back: bool,
    rng: &mut R,
) -> Vec<ShotAssignment> {
    if n_clips == 0 || total_duration <= 0.0 {
        return Vec::new();
    }
    let cadence = if cadence > 0.0 { cadence } else { 5.0 };

    let mut usage = vec![0u32; n_clips];
    let mut out: Vec<ShotAssignment> = Vec::new();
    let mut covered = 0.0f64;
    let mut last: Option<usize> = None;

    while covered + 1e-3 < total_duration {
        let remaining = total_duration - covered;
        // Final slot absorbs the remainder instead of leaving a sliver.
        let dur = if remaining < cadence * 1.5 { remaining } else { cadence };
        let idx = pick_clip(&usage, max_uses, last, no_back_to_back, rng);
        usage[idx] += 1;
        covered += dur;
        last = Some(idx);
        out.push(ShotAssignment { clip: idx, duration: dur });
    }
    out
}

/// Scene-locked mode: one shot per scene, shot length = narration length
/// (plus the inter-scene gap for all but the last). Least-used-first; when
/// reuse is off, distinct clips are preferred until the pool is exhausted.
pub fn build_scene_locked<R: Rng>(
    n_clips: usize,
    scene_durations: &[f64],
    gap: f64,
    allow_reuse: bool,
    max_uses: u32,
    rng: &mut R,
) -> Vec<ShotAssignment> {
    if n_clips == 0 || scene_durations.is_empty() {
        return Vec::new();
    }
    let cap = if allow_reuse { max_uses } else { 1 };
    let mut usage = vec![0u32; n_clips];
    let mut out: Vec<ShotAssignment> = Vec::new();
    for (i, &d) in scene_durations.iter().enumerate() {
        let idx = pick_clip(&usage, cap, None, false, rng);
        usage[idx] += 1;
        let dur = if i + 1 < scene_durations.len() { d + gap } else { d };
        out.push(ShotAssignment { clip: idx, duration: dur.max(0.5) });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn usage_counts(shots: &[ShotAssignment]) -> HashMap<usize, u32> {
        let mut m = HashMap::new();
        for s in shots {
            *m.entry(s.clip).or_insert(0) += 1;
        }
        m
    }

    #[test]
    fn carousel_covers_total_duration_exactly() {
        let fps = 30u32;
        for &total in &[1.0, 4.9, 5.0, 17.3, 60.0, 301.7] {
            let shots = build_carousel(6, total, 5.0, 3, true, &mut rng());
            assert!(!shots.is_empty(), "non-empty for total={}", total);
            let sum: f64 = shots.iter().map(|s| s.duration).sum();
            assert!(
                (sum - total).abs() <= 1.0 / fps as f64,
                "sum {} vs total {}",
                sum,
                total
            );
        }
    }

    #[test]
    fn carousel_respects_usage_cap_within_capacity() {
        // 4 clips x 3 uses = 12 slots of capacity; request exactly that.
        let shots = build_carousel(4, 12.0 * 5.0, 5.0, 3, true, &mut rng());
        assert_eq!(shots.len(), 12);
        for (_, count) in usage_counts(&shots) {
            assert!(count <= 3);
        }
    }

    #[test]
    fn carousel_never_repeats_adjacent_clips() {
        let shots = build_carousel(2, 6.0 * 5.0, 5.0, 3, true, &mut rng());
        for pair in shots.windows(2) {
            assert_ne!(pair[0].clip, pair[1].clip);
        }
    }

    #[test]
    fn carousel_single_clip_exceeds_cap_without_hanging() {
        let shots = build_carousel(1, 5.0 * 5.0, 5.0, 3, true, &mut rng());
        assert_eq!(shots.len(), 5);
        assert!(shots.iter().all(|s| s.clip == 0));
    }

    #[test]
    fn carousel_spreads_usage_evenly_past_capacity() {
        // 2 clips, cap 1, 6 slots: each clip used 3 times.
        let shots = build_carousel(2, 6.0 * 5.0, 5.0, 1, true, &mut rng());
        let counts = usage_counts(&shots);
        assert_eq!(counts[&0], 3);
        assert_eq!(counts[&1], 3);
    }

    #[test]
    fn carousel_empty_inputs_yield_empty_timeline() {
        assert!(build_carousel(0, 10.0, 5.0, 3, true, &mut rng()).is_empty());
        assert!(build_carousel(3, 0.0, 5.0, 3, true, &mut rng()).is_empty());
    }

    #[test]
    fn carousel_final_slot_absorbs_remainder() {
        let shots = build_carousel(5, 12.0, 5.0, 3, true, &mut rng());
        // 5 + 7: the 2-second sliver folds into the final shot.
        assert_eq!(shots.len(), 2);
        assert!((shots[0].duration - 5.0).abs() < 1e-9);
        assert!((shots[1].duration - 7.0).abs() < 1e-9);
    }

    #[test]
    fn scene_locked_assigns_one_shot_per_scene() {
        let durs = [3.2, 4.1, 2.8];
        let shots = build_scene_locked(5, &durs, 0.45, false, 3, &mut rng());
        assert_eq!(shots.len(), 3);
        // Distinct clips while the pool lasts.
        let counts = usage_counts(&shots);
        assert!(counts.values().all(|&c| c == 1));
        // Gap applies to all but the final scene.
        assert!((shots[0].duration - 3.65).abs() < 1e-9);
        assert!((shots[2].duration - 2.8).abs() < 1e-9);
    }

    #[test]
    fn scene_locked_reuses_only_after_pool_exhausted() {
        let durs = [1.0, 1.0, 1.0, 1.0, 1.0];
        let shots = build_scene_locked(2, &durs, 0.0, false, 3, &mut rng());
        assert_eq!(shots.len(), 5);
        let counts = usage_counts(&shots);
        // 5 scenes over 2 clips: closest-to-even split.
        let mut sizes: Vec<u32> = counts.values().copied().collect();
        sizes.sort();
        assert_eq!(sizes, vec![2, 3]);
    }

    #[test]
    fn quantize_rounds_and_floors() {
        let (frames, q) = quantize_to_frames(1.0, 30);
        assert_eq!(frames, 30);
        assert!((q - 1.0).abs() < 1e-9);
        let (frames, _) = quantize_to_frames(0.01, 30);
        assert_eq!(frames, 2);
    }
}
