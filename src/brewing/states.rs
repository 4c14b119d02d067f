//! Brewing workflow state machine
//! Steps: CoffeeBean -> Equipment -> Method -> Brewing -> Notes

use crate::brewing::progress::{self, ProgressSnapshot};
use crate::brewing::rescale::{EditableParams, ParamEdit, ParameterRescaler};
use crate::brewing::timeline::{build_timeline_with, total_duration};
use crate::system::events::EngineEvent;
use crate::types::{
    CoffeeBean, EngineConfig, Equipment, ExpandedStage, Method, Step, WorkflowState,
};
use log::{debug, info, warn};
use statig::prelude::*;

pub const MAX_EVENTS_PER_INPUT: usize = 8;

pub type EngineEvents = heapless::Vec<EngineEvent, MAX_EVENTS_PER_INPUT>;

/// Identifies one timer run. Ticks carrying an older token are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerToken {
    epoch: u32,
}

impl TimerToken {
    pub fn epoch(&self) -> u32 {
        self.epoch
    }
}

// Input events to the state machine
#[derive(Debug, Clone)]
pub enum WorkflowInput {
    // Selection
    SelectCoffeeBean(Option<CoffeeBean>),
    SelectEquipment(Equipment),
    SelectMethod(Method),

    // Navigation between steps
    NavigateTo(Step),

    // Timer, driven by an external clock
    StartTimer,
    PauseTimer,
    ResetTimer,
    Tick { token: TimerToken, elapsed: f64 },

    // Live recipe edits
    EditParam(ParamEdit),

    // Tear the session down
    Reset,
}

// Shared context for the state machine
#[derive(Debug)]
pub struct WorkflowContext {
    state: WorkflowState,
    timeline: Vec<ExpandedStage>,
    rescaler: Option<ParameterRescaler>,
    config: EngineConfig,
    outputs: EngineEvents, // Collect outputs during state transitions
}

impl WorkflowContext {
    fn new(config: EngineConfig) -> Self {
        Self {
            state: WorkflowState::default(),
            timeline: Vec::new(),
            rescaler: None,
            config,
            outputs: heapless::Vec::new(),
        }
    }

    fn emit(&mut self, event: EngineEvent) {
        if let Err(event) = self.outputs.push(event) {
            warn!("Output buffer full, dropping {:?}", event);
        }
    }

    /// A running, unfinished brew pins the user to the brewing step.
    fn is_locked(&self) -> bool {
        self.state.is_timer_running && !self.state.is_complete
    }

    fn can_enter(&self, step: Step) -> bool {
        let state = &self.state;
        match step {
            Step::CoffeeBean | Step::Equipment => true,
            Step::Method => state.selected_equipment.is_some(),
            Step::Brewing => state.selected_equipment.is_some() && state.selected_method.is_some(),
            Step::Notes => state.selected_method.is_some() && state.is_complete,
        }
    }

    fn select_method(&mut self, method: &Method) {
        info!("☕ Method selected: {}", method.name);
        self.state.selected_method = Some(method.clone());
        self.state.current_brewing_method = Some(method.clone());
        self.rescaler = Some(ParameterRescaler::new(method, self.config.ratio_decimal_places));
        self.reset_timer();
        self.rebuild_timeline();
    }

    fn clear_method(&mut self) {
        self.state.selected_method = None;
        self.state.current_brewing_method = None;
        self.rescaler = None;
        self.timeline.clear();
        self.reset_timer();
    }

    /// Replaces the timeline from the working method and re-locates the
    /// current stage at the unchanged elapsed time.
    fn rebuild_timeline(&mut self) {
        self.timeline = match &self.state.current_brewing_method {
            Some(method) => build_timeline_with(&method.params.stages, &self.config),
            None => Vec::new(),
        };
        self.state.current_stage_index =
            progress::current_stage_index(self.state.elapsed_time, &self.timeline).unwrap_or(0);

        let total_duration_s = total_duration(&self.timeline);
        self.emit(EngineEvent::TimelineRebuilt {
            stage_count: self.timeline.len(),
            total_duration_s,
        });
    }

    /// Zeroes progress in one update and invalidates outstanding tokens.
    fn reset_timer(&mut self) {
        self.state.elapsed_time = 0.0;
        self.state.current_stage_index = 0;
        self.state.is_timer_running = false;
        self.state.is_complete = false;
        self.state.coffee_deducted = false;
        self.state.epoch = self.state.epoch.wrapping_add(1);
    }

    fn start_timer(&mut self) {
        if self.state.is_timer_running || self.state.is_complete || self.timeline.is_empty() {
            debug!("Timer start ignored (running={}, complete={}, stages={})",
                   self.state.is_timer_running, self.state.is_complete, self.timeline.len());
            return;
        }
        self.state.is_timer_running = true;
        info!("⏱️ Timer started at {:.1}s", self.state.elapsed_time);
        self.emit(EngineEvent::TimerStarted {
            epoch: self.state.epoch,
        });
    }

    fn pause_timer(&mut self) {
        if !self.state.is_timer_running {
            return;
        }
        self.state.is_timer_running = false;
        let elapsed_s = self.state.elapsed_time;
        self.emit(EngineEvent::TimerPaused { elapsed_s });
    }

    fn tick(&mut self, token: TimerToken, elapsed: f64) {
        if !self.state.is_timer_running || token.epoch != self.state.epoch {
            debug!("Dropping stale tick (epoch {} vs {})", token.epoch, self.state.epoch);
            return;
        }

        let elapsed = elapsed.max(0.0);
        self.state.elapsed_time = elapsed;

        let ProgressSnapshot {
            index,
            progress_percent,
            is_waiting,
            water_g,
        } = progress::snapshot(elapsed, &self.timeline);
        let index = index.unwrap_or(0);
        if index != self.state.current_stage_index {
            debug!("Stage {} -> {} at {:.1}s", self.state.current_stage_index, index, elapsed);
        }
        self.state.current_stage_index = index;
        self.emit(EngineEvent::StageChange {
            index,
            progress_percent,
            is_waiting,
            current_water_g: water_g,
            elapsed_s: elapsed,
        });

        if !self.timeline.is_empty() && elapsed >= total_duration(&self.timeline) {
            self.state.is_complete = true;
            self.state.is_timer_running = false;
            info!("✅ Brew complete after {:.1}s", elapsed);
            self.emit(EngineEvent::Completion {
                total_elapsed_seconds: elapsed,
            });
        }
    }

    fn edit_param(&mut self, edit: ParamEdit) {
        let Some(rescaler) = self.rescaler.as_mut() else {
            debug!("Parameter edit without a method, ignoring");
            return;
        };
        let Some(method) = rescaler.apply(edit) else {
            return;
        };

        self.state.current_brewing_method = Some(method.clone());
        self.rebuild_timeline();
        self.emit(EngineEvent::ParameterUpdate {
            equipment_name: self
                .state
                .selected_equipment
                .as_ref()
                .map(|equipment| equipment.name.clone())
                .unwrap_or_default(),
            method_name: method.name,
            params: method.params,
        });
    }

    fn reset(&mut self) {
        info!("🔄 Resetting brewing session");
        let epoch = self.state.epoch.wrapping_add(1);
        self.state = WorkflowState {
            epoch,
            ..WorkflowState::default()
        };
        self.timeline.clear();
        self.rescaler = None;
        self.emit(EngineEvent::SessionReset);
    }
}

#[derive(Debug, Default)]
pub struct WorkflowStateMachine;

#[state_machine(
    initial = "State::coffee_bean()",
    state(derive(Debug)),
    on_transition = "Self::on_transition"
)]
impl WorkflowStateMachine {
    /// Optional bean pick; any choice moves on to equipment.
    #[state]
    fn coffee_bean(context: &mut WorkflowContext, event: &WorkflowInput) -> Response<State> {
        match event {
            WorkflowInput::SelectCoffeeBean(bean) => {
                context.state.selected_coffee_bean = bean.clone();
                Response::Transition(State::equipment())
            }
            _ => Self::handle_common(context, Step::CoffeeBean, event),
        }
    }

    #[state]
    fn equipment(context: &mut WorkflowContext, event: &WorkflowInput) -> Response<State> {
        Self::handle_common(context, Step::Equipment, event)
    }

    #[state]
    fn method(context: &mut WorkflowContext, event: &WorkflowInput) -> Response<State> {
        match event {
            WorkflowInput::SelectMethod(method) => {
                if context.state.selected_equipment.is_none() {
                    debug!("Method selected without equipment, ignoring");
                    return Response::Handled;
                }
                context.select_method(method);
                Response::Transition(State::brewing())
            }
            _ => Self::handle_common(context, Step::Method, event),
        }
    }

    #[state]
    fn brewing(context: &mut WorkflowContext, event: &WorkflowInput) -> Response<State> {
        match event {
            WorkflowInput::SelectMethod(method) => {
                if context.is_locked() {
                    debug!("Timer running, method change rejected");
                } else {
                    context.select_method(method);
                }
                Response::Handled
            }
            WorkflowInput::StartTimer => {
                context.start_timer();
                Response::Handled
            }
            WorkflowInput::PauseTimer => {
                context.pause_timer();
                Response::Handled
            }
            WorkflowInput::ResetTimer => {
                context.reset_timer();
                context.emit(EngineEvent::TimerReset);
                Response::Handled
            }
            WorkflowInput::Tick { token, elapsed } => {
                context.tick(*token, *elapsed);
                Response::Handled
            }
            WorkflowInput::EditParam(edit) => {
                context.edit_param(*edit);
                Response::Handled
            }
            _ => Self::handle_common(context, Step::Brewing, event),
        }
    }

    #[state]
    fn notes(context: &mut WorkflowContext, event: &WorkflowInput) -> Response<State> {
        Self::handle_common(context, Step::Notes, event)
    }

    fn on_transition(&mut self, source: &State, target: &State) {
        let from = Self::step_of(source);
        let to = Self::step_of(target);

        if from != to {
            info!("🔄 Workflow step transition: {:?} -> {:?}", from, to);
        }
    }
}

// Navigation helpers shared by every step
impl WorkflowStateMachine {
    fn handle_common(context: &mut WorkflowContext, from: Step, event: &WorkflowInput) -> Response<State> {
        match event {
            WorkflowInput::SelectCoffeeBean(bean) => {
                context.state.selected_coffee_bean = bean.clone();
                Response::Handled
            }
            WorkflowInput::SelectEquipment(equipment) => {
                if context.is_locked() {
                    debug!("Timer running, equipment change rejected");
                    return Response::Handled;
                }
                info!("🫖 Equipment selected: {}", equipment.name);
                context.state.selected_equipment = Some(equipment.clone());
                context.clear_method();
                Response::Transition(State::method())
            }
            WorkflowInput::NavigateTo(to) => Self::navigate(context, from, *to),
            WorkflowInput::Reset => {
                context.reset();
                Response::Transition(State::coffee_bean())
            }
            _ => {
                debug!("Input {:?} ignored in step {:?}", event, from);
                Response::Handled
            }
        }
    }

    fn navigate(context: &mut WorkflowContext, from: Step, to: Step) -> Response<State> {
        if context.is_locked() {
            debug!("Timer running, navigation to {:?} rejected", to);
            return Response::Handled;
        }
        if from == to {
            return Response::Handled;
        }
        if !context.can_enter(to) {
            debug!("Guard rejected navigation {:?} -> {:?}", from, to);
            return Response::Handled;
        }

        if to < from {
            match (from, to) {
                // Keep the method and every edit, only rewind the timer.
                (Step::Notes, Step::Brewing) => {
                    context.reset_timer();
                    context.emit(EngineEvent::TimerReset);
                }
                (_, Step::Equipment) | (_, Step::Method) => context.clear_method(),
                _ => context.state.is_timer_running = false,
            }
        }

        Response::Transition(Self::state_for(to))
    }

    fn state_for(step: Step) -> State {
        match step {
            Step::CoffeeBean => State::coffee_bean(),
            Step::Equipment => State::equipment(),
            Step::Method => State::method(),
            Step::Brewing => State::brewing(),
            Step::Notes => State::notes(),
        }
    }

    fn step_of(state: &State) -> Step {
        match state {
            State::CoffeeBean {} => Step::CoffeeBean,
            State::Equipment {} => Step::Equipment,
            State::Method {} => Step::Method,
            State::Brewing {} => Step::Brewing,
            State::Notes {} => Step::Notes,
        }
    }
}

/// Owns one brewing session: the step machine plus its timeline and rescaler.
pub struct BrewingSession {
    machine: StateMachine<WorkflowStateMachine>,
    context: WorkflowContext,
}

impl BrewingSession {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            machine: WorkflowStateMachine::default().state_machine(),
            context: WorkflowContext::new(config),
        }
    }

    /// Process an input and return the events it produced
    pub fn handle_input(&mut self, input: WorkflowInput) -> EngineEvents {
        self.context.outputs.clear();

        let previous = self.active_step();
        self.machine.handle_with_context(&input, &mut self.context);
        let current = self.active_step();
        self.context.state.active_step = current;

        if previous != current {
            self.context.emit(EngineEvent::StepChanged {
                from: previous,
                to: current,
            });
        }

        std::mem::take(&mut self.context.outputs)
    }

    pub fn active_step(&self) -> Step {
        WorkflowStateMachine::step_of(self.machine.state())
    }

    pub fn state(&self) -> &WorkflowState {
        &self.context.state
    }

    pub fn timeline(&self) -> &[ExpandedStage] {
        &self.context.timeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.context.config
    }

    pub fn editable_params(&self) -> Option<EditableParams> {
        self.context.rescaler.as_ref().map(ParameterRescaler::params)
    }

    /// Token for the current run, `None` while the timer is stopped.
    pub fn timer_token(&self) -> Option<TimerToken> {
        self.context.state.is_timer_running.then_some(TimerToken {
            epoch: self.context.state.epoch,
        })
    }

    /// Progress at the last accepted elapsed time.
    pub fn progress(&self) -> ProgressSnapshot {
        progress::snapshot(self.context.state.elapsed_time, &self.context.timeline)
    }

    pub(crate) fn mark_coffee_deducted(&mut self) {
        self.context.state.coffee_deducted = true;
    }

    pub fn select_coffee_bean(&mut self, bean: Option<CoffeeBean>) -> EngineEvents {
        self.handle_input(WorkflowInput::SelectCoffeeBean(bean))
    }

    pub fn select_equipment(&mut self, equipment: Equipment) -> EngineEvents {
        self.handle_input(WorkflowInput::SelectEquipment(equipment))
    }

    pub fn select_method(&mut self, method: Method) -> EngineEvents {
        self.handle_input(WorkflowInput::SelectMethod(method))
    }

    pub fn navigate_to(&mut self, step: Step) -> EngineEvents {
        self.handle_input(WorkflowInput::NavigateTo(step))
    }

    pub fn tick(&mut self, token: TimerToken, elapsed: f64) -> EngineEvents {
        self.handle_input(WorkflowInput::Tick { token, elapsed })
    }

    pub fn rescale(&mut self, edit: ParamEdit) -> EngineEvents {
        self.handle_input(WorkflowInput::EditParam(edit))
    }

    pub fn reset(&mut self) -> EngineEvents {
        self.handle_input(WorkflowInput::Reset)
    }
}
