//! Pure progress queries over a built timeline. Time is always supplied by the caller.

use crate::types::{ExpandedStage, StageKind};

/// Everything the UI needs for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub index: Option<usize>,
    pub progress_percent: f64,
    pub is_waiting: bool,
    pub water_g: f64,
}

/// Index of the sub-stage containing `elapsed`, clamped to the last one past the end.
/// `None` only for an empty timeline.
pub fn current_stage_index(elapsed: f64, stages: &[ExpandedStage]) -> Option<usize> {
    if stages.is_empty() {
        return None;
    }
    let elapsed = elapsed.max(0.0);

    stages
        .iter()
        .position(|stage| elapsed >= stage.start_time && elapsed <= stage.end_time)
        .or(Some(stages.len() - 1))
}

/// Percentage of sub-stage `index` completed at `elapsed`.
pub fn stage_progress(index: usize, elapsed: f64, stages: &[ExpandedStage]) -> f64 {
    let Some(stage) = stages.get(index) else {
        return 0.0;
    };

    if elapsed < stage.start_time {
        return 0.0;
    }
    if elapsed >= stage.end_time {
        return 100.0;
    }

    let span = stage.end_time - stage.start_time;
    if span <= 0.0 {
        return 100.0;
    }
    (elapsed - stage.start_time) / span * 100.0
}

/// Water that should be in the brewer at `elapsed`.
///
/// Pours interpolate linearly from the previous sub-stage's target; waits hold
/// their target. `None` means the timeline has been fully reached.
pub fn current_water(elapsed: f64, index: Option<usize>, stages: &[ExpandedStage]) -> f64 {
    if elapsed <= 0.0 || stages.is_empty() {
        return 0.0;
    }

    let last_target = stages[stages.len() - 1].water_grams();
    let Some(index) = index else {
        return last_target;
    };
    let Some(stage) = stages.get(index) else {
        return last_target;
    };

    let target = stage.water_grams();
    match stage.kind {
        StageKind::Wait => target,
        StageKind::Pour => {
            let prev_water = match index {
                0 => 0.0,
                _ => stages[index - 1].water_grams(),
            };
            if stage.time <= 0.0 {
                return target;
            }
            let fraction = ((elapsed - stage.start_time) / stage.time).clamp(0.0, 1.0);
            prev_water + (target - prev_water) * fraction
        }
    }
}

pub fn snapshot(elapsed: f64, stages: &[ExpandedStage]) -> ProgressSnapshot {
    let index = current_stage_index(elapsed, stages);
    ProgressSnapshot {
        index,
        progress_percent: index
            .map(|i| stage_progress(i, elapsed, stages))
            .unwrap_or(0.0),
        is_waiting: index
            .and_then(|i| stages.get(i))
            .map(ExpandedStage::is_waiting)
            .unwrap_or(false),
        water_g: current_water(elapsed, index, stages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brewing::timeline::build_timeline;
    use crate::types::Stage;

    fn scenario_a() -> Vec<ExpandedStage> {
        build_timeline(&[
            Stage::new(25.0, "Bloom", "30g").with_pour_time(10.0),
            Stage::new(120.0, "Main pour", "225g").with_pour_time(65.0),
        ])
    }

    fn water_at(elapsed: f64, stages: &[ExpandedStage]) -> f64 {
        current_water(elapsed, current_stage_index(elapsed, stages), stages)
    }

    #[test]
    fn test_empty_timeline() {
        assert_eq!(current_stage_index(10.0, &[]), None);
        assert_eq!(stage_progress(0, 10.0, &[]), 0.0);
        assert_eq!(current_water(10.0, None, &[]), 0.0);
    }

    #[test]
    fn test_scenario_a() {
        let stages = scenario_a();

        assert_eq!(current_stage_index(5.0, &stages), Some(0));
        assert!((water_at(5.0, &stages) - 15.0).abs() < 1e-9);

        assert_eq!(water_at(25.0, &stages), 30.0);
        let at_25 = snapshot(25.0, &stages);
        assert!(at_25.is_waiting);
        assert_eq!(at_25.index, Some(1));

        assert_eq!(current_stage_index(90.0, &stages), Some(2));
        let expected = 30.0 + (225.0 - 30.0) * (90.0 - 25.0) / 65.0;
        assert!((water_at(90.0, &stages) - expected).abs() < 1e-9);

        assert_eq!(water_at(120.0, &stages), 225.0);
        assert_eq!(current_stage_index(120.0, &stages), Some(3));
    }

    #[test]
    fn test_index_clamps_past_end() {
        let stages = scenario_a();
        assert_eq!(current_stage_index(500.0, &stages), Some(3));
        assert_eq!(current_stage_index(-3.0, &stages), Some(0));
    }

    #[test]
    fn test_stage_progress() {
        let stages = scenario_a();
        assert_eq!(stage_progress(0, 5.0, &stages), 50.0);
        assert_eq!(stage_progress(2, 10.0, &stages), 0.0);
        assert_eq!(stage_progress(0, 11.0, &stages), 100.0);
        assert_eq!(stage_progress(9, 11.0, &stages), 0.0);
    }

    #[test]
    fn test_index_and_water_monotonic() {
        let stages = build_timeline(&[
            Stage::new(30.0, "Bloom", "45g"),
            Stage::new(75.0, "Second", "150g").with_pour_time(20.0),
            Stage::new(120.0, "Third", "250g"),
            Stage::new(170.0, "Drawdown", "250g").with_pour_time(0.0),
        ]);

        let mut last_index = 0;
        let mut last_water = 0.0;
        for step in 0..=400 {
            let t = step as f64 * 0.5;
            let index = current_stage_index(t, &stages).unwrap();
            let water = current_water(t, Some(index), &stages);
            assert!(index >= last_index, "index went backwards at t={}", t);
            assert!(water >= last_water - 1e-9, "water went backwards at t={}", t);
            last_index = index;
            last_water = water;
        }
    }

    #[test]
    fn test_water_hits_target_at_stage_end() {
        let stages = scenario_a();
        for stage in &stages {
            assert_eq!(water_at(stage.end_time, &stages), stage.water_grams());
        }
    }

    #[test]
    fn test_fully_reached() {
        let stages = scenario_a();
        assert_eq!(current_water(10.0, None, &stages), 225.0);
        assert_eq!(current_water(0.0, None, &stages), 0.0);
    }
}
