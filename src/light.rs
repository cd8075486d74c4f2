use crate::error::{CommandError, NetworkError};
use crate::link::LinkState;
use crate::util::Interval;
use crate::LinkId;
use itertools::Itertools;
use log::debug;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;

/// A traffic light program: a cyclic sequence of phases, each giving every
/// controlled signal a state for some duration.
#[derive(Clone, Debug)]
pub struct TrafficLightLogic {
    /// The external name.
    name: String,
    /// How phase durations are decided.
    kind: LogicKind,
    /// The phases of the cycle.
    phases: Vec<Phase>,
    /// The index of the current phase.
    current: usize,
    /// The time spent in the current phase in s.
    elapsed: f64,
    /// A phase switch requested from outside, applied at the next step.
    staged_phase: Option<usize>,
    /// A remaining duration requested from outside, applied at the next step.
    staged_duration: Option<f64>,
    /// An externally imposed duration of the current phase.
    fixed_duration: Option<f64>,
    /// The elapsed time at which a vehicle was last detected on a green signal.
    last_detection: f64,
    /// Recent maximum queue lengths, per phase, newest first.
    queues: Vec<VecDeque<f64>>,
    /// Completed cycles since the last duration decision.
    cycles_since_decision: u32,
    /// The phase at which the last decision was taken.
    decision_phase: usize,
    /// The links controlled by each signal.
    controlled: Vec<SmallVec<[LinkId; 2]>>,
}

/// One interval of a traffic light cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Phase {
    /// The duration in s.
    duration: f64,
    /// The range an adaptive program may move the duration in.
    bounds: Interval<f64>,
    /// The state of each signal.
    state: Vec<LinkState>,
}

/// How a traffic light decides its phase durations.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "snake_case"))]
pub enum LogicKind {
    /// Fixed durations.
    Static,
    /// Green phases are extended while vehicles keep arriving.
    Actuated {
        /// Green ends once no vehicle was detected for this long, in s.
        max_gap: f64,
        /// Vehicles this close to the stop line count as detected, in m.
        detector_range: f64,
    },
    /// Green time is shifted between phases according to measured queues.
    AgentBased(AgentParams),
}

/// Parameters of the [LogicKind::AgentBased] program.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AgentParams {
    /// Cycles between two duration decisions.
    pub decision_horizon: u32,
    /// The number of queue samples kept per phase.
    pub learn_horizon: usize,
    /// The desired cycle time in s.
    pub cycle: f64,
    /// The relative queue difference which triggers a change.
    pub min_diff: f64,
}

/// The measurements a traffic light may act on, per signal index.
#[derive(Clone, Debug, Default)]
pub(crate) struct SignalMeasures {
    /// Whether a vehicle is close to the stop line.
    pub detected: Vec<bool>,
    /// The number of halting vehicles.
    pub queue: Vec<usize>,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            decision_horizon: 1,
            learn_horizon: 3,
            cycle: 90.0,
            min_diff: 0.1,
        }
    }
}

impl Phase {
    /// Creates a phase with a fixed duration from a state string such as `"GGrr"`.
    pub fn new(duration: f64, state: &str) -> Result<Self, NetworkError> {
        let state = state.chars().map(LinkState::from_char).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            duration,
            bounds: Interval::new(duration, duration),
            state,
        })
    }

    /// Sets the range adaptive programs may move the duration in.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Interval::new(min, max);
        self
    }

    /// The current duration in s.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The minimum duration in s.
    pub fn min_duration(&self) -> f64 {
        self.bounds.min
    }

    /// The maximum duration in s.
    pub fn max_duration(&self) -> f64 {
        self.bounds.max
    }

    /// The state of each signal.
    pub fn state(&self) -> &[LinkState] {
        &self.state
    }

    /// The state as a string of state characters.
    pub fn state_string(&self) -> String {
        self.state.iter().map(|s| s.to_char()).collect()
    }

    /// Whether any signal is green in this phase.
    pub fn is_green(&self) -> bool {
        self.state.iter().any(|s| s.is_green())
    }

    /// The signal indices which are green in this phase.
    fn green_signals(&self) -> impl Iterator<Item = usize> + '_ {
        self.state.iter().positions(|s| s.is_green())
    }
}

impl TrafficLightLogic {
    /// Creates a traffic light program, validating its phases.
    pub fn new(name: &str, kind: LogicKind, phases: Vec<Phase>) -> Result<Self, NetworkError> {
        let signals = phases
            .first()
            .map(|p| p.state.len())
            .ok_or_else(|| NetworkError::EmptyProgram(name.to_string()))?;
        for (idx, phase) in phases.iter().enumerate() {
            if phase.state.len() != signals {
                return Err(NetworkError::StateLength {
                    light: name.to_string(),
                    phase: idx,
                    expected: signals,
                    found: phase.state.len(),
                });
            }
            let valid = phase.duration.is_finite()
                && phase.duration > 0.0
                && phase.bounds.min > 0.0
                && phase.bounds.contains(phase.duration);
            if !valid {
                return Err(NetworkError::InvalidDuration {
                    light: name.to_string(),
                    phase: idx,
                });
            }
        }

        let mut logic = Self {
            name: name.to_string(),
            kind,
            queues: vec![VecDeque::new(); phases.len()],
            phases,
            current: 0,
            elapsed: 0.0,
            staged_phase: None,
            staged_duration: None,
            fixed_duration: None,
            last_detection: 0.0,
            cycles_since_decision: 0,
            decision_phase: 0,
            controlled: vec![SmallVec::new(); signals],
        };
        if let LogicKind::AgentBased(params) = &logic.kind {
            let cycle = params.cycle;
            logic.fit_cycle(cycle);
        }
        Ok(logic)
    }

    /// Gets the external name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets how phase durations are decided.
    pub fn kind(&self) -> &LogicKind {
        &self.kind
    }

    /// Gets the phases of the cycle.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// The number of signals controlled.
    pub fn signal_count(&self) -> usize {
        self.controlled.len()
    }

    /// The index of the current phase.
    pub fn current_phase(&self) -> usize {
        self.current
    }

    /// The time spent in the current phase.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The sum of all phase durations.
    pub fn cycle_time(&self) -> f64 {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// The current state of the given signal.
    pub fn state(&self, signal: usize) -> LinkState {
        self.phases[self.current].state[signal]
    }

    /// The current state string.
    pub fn state_string(&self) -> String {
        self.phases[self.current].state_string()
    }

    /// The time until the current phase ends, in s.
    pub fn time_to_switch(&self) -> f64 {
        (self.current_duration() - self.elapsed).max(0.0)
    }

    /// The links controlled by each signal.
    pub fn controlled_links(&self) -> &[SmallVec<[LinkId; 2]>] {
        &self.controlled
    }

    /// Requests a switch to the given phase at the next step.
    pub fn set_phase(&mut self, phase: usize) -> Result<(), CommandError> {
        if phase >= self.phases.len() {
            return Err(CommandError::InvalidPhase {
                light: self.name.clone(),
                phase,
            });
        }
        self.staged_phase = Some(phase);
        Ok(())
    }

    /// Requests the current phase to last for `duration` more seconds,
    /// counted from the next step.
    pub fn set_phase_duration(&mut self, duration: f64) -> Result<(), CommandError> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(CommandError::InvalidValue(duration));
        }
        self.staged_duration = Some(duration);
        Ok(())
    }

    pub(crate) fn add_controlled_link(&mut self, signal: usize, link: LinkId) -> Result<(), NetworkError> {
        let links = self.controlled.get_mut(signal).ok_or_else(|| NetworkError::InvalidSignal {
            light: self.name.clone(),
            index: signal,
        })?;
        links.push(link);
        Ok(())
    }

    /// Advances the program by `dt` seconds. Returns true if the phase changed.
    pub(crate) fn step(&mut self, dt: f64, measures: &SignalMeasures) -> bool {
        let start = self.current;
        if let Some(phase) = self.staged_phase.take() {
            self.enter_phase(phase);
            self.elapsed = 0.0;
        }
        if let Some(duration) = self.staged_duration.take() {
            self.fixed_duration = Some(self.elapsed + duration);
        }

        self.elapsed += dt;
        self.detect(measures);
        loop {
            let duration = self.current_duration();
            if self.elapsed < duration {
                break;
            }
            self.elapsed -= duration;
            self.end_phase(measures);
        }
        self.current != start
    }

    /// The duration of the current phase, as decided by the program.
    fn current_duration(&self) -> f64 {
        if let Some(duration) = self.fixed_duration {
            return duration;
        }
        let phase = &self.phases[self.current];
        match self.kind {
            LogicKind::Actuated { max_gap, .. } if phase.is_green() && phase.bounds.is_open() => {
                phase.bounds.clamp(self.last_detection + max_gap)
            }
            _ => phase.duration,
        }
    }

    /// Records detections on the current green signals.
    fn detect(&mut self, measures: &SignalMeasures) {
        if !matches!(self.kind, LogicKind::Actuated { .. }) {
            return;
        }
        let phase = &self.phases[self.current];
        if phase.green_signals().any(|i| measures.detected.get(i).copied().unwrap_or(false)) {
            self.last_detection = self.elapsed;
        }
    }

    /// Finishes the current phase and moves to the next one.
    fn end_phase(&mut self, measures: &SignalMeasures) {
        if let LogicKind::AgentBased(params) = &self.kind {
            let params = params.clone();
            if self.phases[self.current].is_green() {
                self.collect_queue(&params, measures);
                if self.cycles_since_decision >= params.decision_horizon {
                    self.decide_durations(&params);
                }
            }
        }
        let next = (self.current + 1) % self.phases.len();
        self.enter_phase(next);
        if self.current == self.decision_phase {
            self.cycles_since_decision += 1;
        }
    }

    fn enter_phase(&mut self, phase: usize) {
        self.current = phase;
        self.fixed_duration = None;
        self.last_detection = 0.0;
    }

    /// Stores the longest queue on the current phase's green signals.
    fn collect_queue(&mut self, params: &AgentParams, measures: &SignalMeasures) {
        let queue = self.phases[self.current]
            .green_signals()
            .filter_map(|i| measures.queue.get(i))
            .max()
            .copied()
            .unwrap_or(0);
        let samples = &mut self.queues[self.current];
        samples.push_front(queue as f64);
        samples.truncate(params.learn_horizon.max(1));
    }

    /// Moves one second of green time from the least to the most demanded phase.
    fn decide_durations(&mut self, params: &AgentParams) {
        let means = self
            .queues
            .iter()
            .enumerate()
            .filter(|(idx, samples)| self.phases[*idx].is_green() && !samples.is_empty())
            .map(|(idx, samples)| (idx, samples.iter().sum::<f64>() / samples.len() as f64))
            .collect::<Vec<_>>();

        let most = means
            .iter()
            .filter(|(idx, _)| self.phases[*idx].duration + 1.0 <= self.phases[*idx].bounds.max)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let least = means
            .iter()
            .filter(|(idx, _)| self.phases[*idx].duration - 1.0 >= self.phases[*idx].bounds.min)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        if let (Some(&(most, high)), Some(&(least, low))) = (most, least) {
            if most == least || high <= 0.0 {
                return;
            }
            if (high - low) / high > params.min_diff {
                self.phases[most].duration += 1.0;
                self.phases[least].duration -= 1.0;
                self.cycles_since_decision = 0;
                self.decision_phase = self.current;
                debug!(
                    "traffic light {}: moved green time from phase {} to phase {}",
                    self.name, least, most
                );
            }
        }
    }

    /// Scales the green phases so that the cycle lasts `cycle` seconds where
    /// their bounds allow it.
    fn fit_cycle(&mut self, cycle: f64) {
        let fixed: f64 = self.phases.iter().filter(|p| !p.is_green()).map(|p| p.duration).sum();
        let min_cycle = fixed
            + self
                .phases
                .iter()
                .filter(|p| p.is_green())
                .map(|p| p.bounds.min)
                .sum::<f64>();
        let cycle = cycle.max(min_cycle);
        let current = self.cycle_time();
        if current < cycle {
            self.distribute(cycle - current, |p| p.bounds.max - p.duration, 1.0);
        } else if current > cycle {
            self.distribute(current - cycle, |p| p.duration - p.bounds.min, -1.0);
        }
    }

    /// Spreads `amount` seconds over the green phases in proportion to their
    /// durations, starting with the phases that have the least room.
    fn distribute(&mut self, amount: f64, room: impl Fn(&Phase) -> f64, sign: f64) {
        let order = self
            .phases
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_green())
            .sorted_by(|a, b| room(a.1).total_cmp(&room(b.1)))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        let mut remaining = amount;
        let mut green: f64 = order.iter().map(|idx| self.phases[*idx].duration).sum();
        for idx in order {
            if remaining <= 0.0 || green <= 0.0 {
                break;
            }
            let phase = &mut self.phases[idx];
            let share = (remaining * phase.duration / green + 0.5).floor();
            let change = share.min(room(phase)).max(0.0);
            green -= phase.duration;
            phase.duration += sign * change;
            remaining -= change;
        }
    }
}
