//! Expands coarse recipe checkpoints into a contiguous pour/wait timeline.

use crate::types::{EngineConfig, ExpandedStage, Stage, StageKind, TimingRole};
use log::debug;

/// Builds the timeline with default configuration.
pub fn build_timeline(stages: &[Stage]) -> Vec<ExpandedStage> {
    build_timeline_with(stages, &EngineConfig::default())
}

pub fn build_timeline_with(stages: &[Stage], config: &EngineConfig) -> Vec<ExpandedStage> {
    if stages.is_empty() {
        return Vec::new();
    }

    let timeline = if is_espresso(stages) {
        build_espresso(stages, config)
    } else {
        build_standard(stages, config)
    };

    debug!(
        "Timeline built: {} stages -> {} sub-stages, {:.0}s total",
        stages.len(),
        timeline.len(),
        total_duration(&timeline)
    );
    timeline
}

/// End of the last sub-stage, 0 for an empty timeline.
pub fn total_duration(timeline: &[ExpandedStage]) -> f64 {
    timeline.last().map(|stage| stage.end_time).unwrap_or(0.0)
}

pub fn is_espresso(stages: &[Stage]) -> bool {
    stages.iter().any(|stage| stage.effective_role().is_some())
}

fn build_espresso(stages: &[Stage], config: &EngineConfig) -> Vec<ExpandedStage> {
    let timeline: Vec<ExpandedStage> = stages
        .iter()
        .enumerate()
        .filter(|(_, stage)| stage.effective_role() == Some(TimingRole::Extraction))
        .map(|(index, stage)| pour_slice(stage, index, 0.0, stage.time))
        .collect();

    if !timeline.is_empty() {
        return timeline;
    }

    // Only beverage stages: time a default shot off the first stage.
    debug!(
        "No extraction stage, using {:.0}s default extraction",
        config.espresso_fallback_extraction_s
    );
    let first = &stages[0];
    vec![pour_slice(first, 0, 0.0, config.espresso_fallback_extraction_s)]
}

fn build_standard(stages: &[Stage], config: &EngineConfig) -> Vec<ExpandedStage> {
    let divisor = f64::from(config.pour_time_divisor.max(1));
    let mut timeline = Vec::with_capacity(stages.len() * 2);
    let mut prev = 0.0;

    for (index, stage) in stages.iter().enumerate() {
        let pour_duration = match stage.pour_time {
            Some(pour_time) => pour_time,
            None => ((stage.time - prev) / divisor).floor(),
        };

        if pour_duration > 0.0 {
            let pour_end = prev + pour_duration;
            timeline.push(pour_slice(stage, index, prev, pour_end));
            timeline.push(wait_slice(stage, index, pour_end, stage.time));
        } else {
            timeline.push(wait_slice(stage, index, prev, stage.time));
        }

        prev = stage.time;
    }

    timeline
}

fn pour_slice(stage: &Stage, index: usize, start: f64, end: f64) -> ExpandedStage {
    ExpandedStage {
        kind: StageKind::Pour,
        label: stage.label.clone(),
        start_time: start,
        end_time: end,
        time: end - start,
        pour_time: stage.pour_time,
        water: stage.water.clone(),
        detail: stage.detail.clone(),
        pour_type: stage.pour_type,
        valve_status: stage.valve_status,
        original_index: index,
    }
}

fn wait_slice(stage: &Stage, index: usize, start: f64, end: f64) -> ExpandedStage {
    ExpandedStage {
        kind: StageKind::Wait,
        label: stage.label.clone(),
        start_time: start,
        end_time: end,
        time: end - start,
        pour_time: None,
        water: stage.water.clone(),
        detail: stage.detail.clone(),
        pour_type: None,
        valve_status: stage.valve_status,
        original_index: index,
    }
}
