/// Frame-exact plan for locking the visual track to the narration. The
/// narration is the master clock: the target frame count comes from the
/// audio duration, the video is tail-padded (last-frame clone) when it runs
/// short and trimmed on the frame counter either way, and the audio is
/// trimmed to exactly frames/fps.
///
/// Computed once from probed durations; the ffmpeg layer only executes it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockPlan {
    pub frames: u64,
    pub target_secs: f64,
    /// Seconds of last-frame clone to append before the frame trim. Zero
    /// when the video already covers the narration (slack under 20 ms is
    /// left to the trim).
    pub pad_video_secs: f64,
}

impl LockPlan {
    pub fn compute(video_secs: f64, audio_secs: f64, fps: u32) -> LockPlan {
        let fps = fps.max(1) as f64;
        let video_secs = video_secs.max(0.0);
        let audio_secs = audio_secs.max(0.0);

        let frames = ((audio_secs * fps).round() as u64).max(2);
        let target_secs = frames as f64 / fps;

        let pad_video_secs = if video_secs + 0.02 < audio_secs {
            audio_secs - video_secs
        } else {
            0.0
        };

        LockPlan { frames, target_secs, pad_video_secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    #[test]
    fn short_video_is_padded_to_the_narration() {
        let p = LockPlan::compute(10.0, 12.5, 30);
        assert_eq!(p.frames, 375);
        assert!((p.target_secs - 12.5).abs() < EPS);
        assert!((p.pad_video_secs - 2.5).abs() < EPS);
    }

    #[test]
    fn long_video_is_trimmed_not_padded() {
        let p = LockPlan::compute(15.0, 10.0, 30);
        assert_eq!(p.frames, 300);
        assert!(p.pad_video_secs.abs() < EPS);
    }

    #[test]
    fn sub_epsilon_shortfall_is_left_to_the_trim() {
        let p = LockPlan::compute(9.99, 10.0, 30);
        assert!(p.pad_video_secs.abs() < EPS);
        assert_eq!(p.frames, 300);
    }

    #[test]
    fn plan_is_idempotent() {
        // Executing the plan yields two streams of target_secs; replanning
        // those must change nothing.
        let p1 = LockPlan::compute(33.37, 34.02, 30);
        let p2 = LockPlan::compute(p1.target_secs, p1.target_secs, 30);
        assert_eq!(p1.frames, p2.frames);
        assert!(p2.pad_video_secs.abs() < EPS);
    }

    #[test]
    fn degenerate_inputs_floor_at_two_frames() {
        let p = LockPlan::compute(0.0, 0.0, 30);
        assert_eq!(p.frames, 2);
        assert!(p.target_secs > 0.0);
        let p = LockPlan::compute(-3.0, 0.01, 30);
        assert_eq!(p.frames, 2);
    }
}
