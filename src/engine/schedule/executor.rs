//! Executors: run a built [`SystemSchedule`] against a world.
//!
//! ## Design
//! Both executors walk the executable in topological order and evaluate
//! run conditions lazily: a set's conditions run once per pass, when the
//! first member is reached, and a system's own conditions run right before
//! it. Conditions short-circuit; once one returns `false` the rest of the
//! list is not evaluated.
//!
//! Deferred buffers are applied at [`ApplyDeferred`] sync points and once
//! more at the end of the pass. When a system fails, buffers of systems that
//! already ran are applied before the error is returned.
//!
//! [`ApplyDeferred`]: crate::engine::system::ApplyDeferred

use crate::engine::access::FilteredAccessSet;
use crate::engine::error::RunError;
use crate::engine::schedule::graph::NodeId;
use crate::engine::system::{is_apply_deferred, BoxedCondition, ScheduleSystem, System};
use crate::engine::types::Signature;
use crate::engine::world::World;

#[cfg(feature = "multi_threaded")]
use rayon::prelude::*;


/// Which executor a [`Schedule`](super::Schedule) uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExecutorKind {
    /// Runs systems one at a time in topological order.
    #[default]
    SingleThreaded,
    /// Runs unordered systems with compatible access in parallel stages.
    MultiThreaded,
}

/// The flattened, topologically sorted form of a schedule.
///
/// Systems and conditions are moved here from the graph on every build and
/// moved back before the next one.
#[derive(Default)]
pub struct SystemSchedule {
    pub(crate) system_ids: Vec<NodeId>,
    pub(crate) systems: Vec<ScheduleSystem>,
    pub(crate) system_conditions: Vec<Vec<BoxedCondition>>,
    pub(crate) set_ids: Vec<NodeId>,
    pub(crate) set_conditions: Vec<Vec<BoxedCondition>>,
    /// Per system: indices into `set_ids` of ancestor sets with conditions.
    pub(crate) sets_with_conditions_of_systems: Vec<Signature>,
    /// Per conditioned set: indices into `systems` of its members.
    pub(crate) systems_in_sets_with_conditions: Vec<Signature>,
    /// Per system: indices into `systems` of its direct dependents.
    pub(crate) system_dependents: Vec<Vec<usize>>,
}

impl SystemSchedule {
    /// Number of systems, sync points included.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// Returns `true` if there is nothing to run.
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Graph ids of the systems, in run order.
    pub fn system_ids(&self) -> &[NodeId] {
        &self.system_ids
    }

    /// Systems in run order.
    pub fn systems(&self) -> &[ScheduleSystem] {
        &self.systems
    }

    /// Each system's own run conditions, parallel to [`SystemSchedule::systems`].
    pub fn system_conditions(&self) -> &[Vec<BoxedCondition>] {
        &self.system_conditions
    }

    /// Graph ids of the sets that carry conditions.
    pub fn set_ids(&self) -> &[NodeId] {
        &self.set_ids
    }

    /// Conditions of each set, parallel to [`SystemSchedule::set_ids`].
    pub fn set_conditions(&self) -> &[Vec<BoxedCondition>] {
        &self.set_conditions
    }
}

/// Strategy for running a [`SystemSchedule`].
pub(crate) trait SystemExecutor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    /// Prepares for `schedule`. Called after every rebuild.
    fn init(&mut self, schedule: &SystemSchedule);

    fn run(&mut self, schedule: &mut SystemSchedule, world: &mut World) -> Result<(), RunError>;
}

pub(crate) fn make_executor(kind: ExecutorKind) -> Box<dyn SystemExecutor> {
    match kind {
        ExecutorKind::SingleThreaded => Box::<SingleThreadedExecutor>::default(),
        ExecutorKind::MultiThreaded => Box::<MultiThreadedExecutor>::default(),
    }
}

/// Per-pass bookkeeping shared by both executors.
#[derive(Default)]
struct PassState {
    evaluated_sets: Signature,
    /// Systems ruled out by a set condition.
    skipped_systems: Signature,
    /// Systems that ran and still hold deferred buffers.
    unapplied_systems: Signature,
}

impl PassState {
    /// Evaluates the conditions gating system `index`.
    fn should_run(&mut self, schedule: &mut SystemSchedule, index: usize, world: &World) -> bool {
        if self.skipped_systems.has(index) {
            return false;
        }
        let SystemSchedule {
            set_conditions,
            system_conditions,
            sets_with_conditions_of_systems,
            systems_in_sets_with_conditions,
            ..
        } = schedule;

        for set_index in sets_with_conditions_of_systems[index].ones() {
            if self.evaluated_sets.has(set_index) {
                continue;
            }
            self.evaluated_sets.set(set_index);
            if !evaluate_conditions(&mut set_conditions[set_index], world) {
                self.skipped_systems.union_with(&systems_in_sets_with_conditions[set_index]);
                return false;
            }
        }
        evaluate_conditions(&mut system_conditions[index], world)
    }

    fn apply_deferred(&mut self, systems: &mut [ScheduleSystem], world: &mut World) {
        for index in self.unapplied_systems.ones() {
            systems[index].apply_deferred(world);
        }
        self.unapplied_systems.clear_all();
    }

    fn finish(&mut self, schedule: &mut SystemSchedule, world: &mut World) {
        self.apply_deferred(&mut schedule.systems, world);
        self.evaluated_sets.clear_all();
        self.skipped_systems.clear_all();
    }
}

fn evaluate_conditions(conditions: &mut [BoxedCondition], world: &World) -> bool {
    conditions.iter_mut().all(|condition| {
        #[cfg(feature = "trace")]
        let _span = tracing::info_span!("system", name = %condition.name()).entered();
        condition.run_readonly(world)
    })
}

fn system_error(system: &ScheduleSystem, source: crate::engine::error::BoxedError) -> RunError {
    RunError::System { system: system.name(), source }
}

/// Runs a system that needs `&mut World`, or a sync point.
fn run_exclusive(
    state: &mut PassState,
    schedule: &mut SystemSchedule,
    index: usize,
    world: &mut World,
) -> Result<(), RunError> {
    if is_apply_deferred(&*schedule.systems[index]) {
        state.apply_deferred(&mut schedule.systems, world);
        return Ok(());
    }
    let system = &mut schedule.systems[index];
    #[cfg(feature = "trace")]
    let _span = tracing::info_span!("system", name = %system.name()).entered();
    system.run(world).map_err(|source| system_error(system, source))
}

/// Runs systems one at a time in topological order.
#[derive(Default)]
pub(crate) struct SingleThreadedExecutor {
    state: PassState,
}

impl SingleThreadedExecutor {
    fn run_systems(&mut self, schedule: &mut SystemSchedule, world: &mut World) -> Result<(), RunError> {
        for index in 0..schedule.systems.len() {
            if !self.state.should_run(schedule, index, world) {
                continue;
            }
            if schedule.systems[index].is_exclusive() {
                run_exclusive(&mut self.state, schedule, index, world)?;
                continue;
            }

            let system = &mut schedule.systems[index];
            let result = {
                #[cfg(feature = "trace")]
                let _span = tracing::info_span!("system", name = %system.name()).entered();
                // SAFETY: nothing else runs while `world` is borrowed exclusively.
                unsafe { system.run_unsafe(world.as_unsafe_world_cell()) }
            };
            if system.has_deferred() {
                self.state.unapplied_systems.set(index);
            }
            result.map_err(|source| system_error(system, source))?;
        }
        Ok(())
    }
}

impl SystemExecutor for SingleThreadedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::SingleThreaded
    }

    fn init(&mut self, _schedule: &SystemSchedule) {
        self.state = PassState::default();
    }

    fn run(&mut self, schedule: &mut SystemSchedule, world: &mut World) -> Result<(), RunError> {
        let result = self.run_systems(schedule, world);
        self.state.finish(schedule, world);
        result
    }
}

/// Runs the schedule as a sequence of stages; the systems of one stage run
/// in parallel on the rayon pool.
///
/// A system's stage is one past the latest stage of any earlier system it
/// must not overlap: a direct dependency, an exclusive system, or a system
/// whose access (run conditions included) is incompatible with its own.
/// Exclusive systems and sync points always get a stage to themselves.
#[derive(Default)]
pub(crate) struct MultiThreadedExecutor {
    stages: Vec<Vec<usize>>,
    state: PassState,
}

impl MultiThreadedExecutor {
    /// Access of system `index` together with every condition gating it.
    fn gated_access(schedule: &SystemSchedule, index: usize) -> FilteredAccessSet {
        let mut access = schedule.systems[index].component_access_set().clone();
        for condition in &schedule.system_conditions[index] {
            access.extend(condition.component_access_set().clone());
        }
        for set_index in schedule.sets_with_conditions_of_systems[index].ones() {
            for condition in &schedule.set_conditions[set_index] {
                access.extend(condition.component_access_set().clone());
            }
        }
        access
    }

    fn compute_stages(schedule: &SystemSchedule) -> Vec<Vec<usize>> {
        let n = schedule.systems.len();
        let mut dependencies = vec![Vec::new(); n];
        for (index, dependents) in schedule.system_dependents.iter().enumerate() {
            for &dependent in dependents {
                dependencies[dependent].push(index);
            }
        }
        let access: Vec<FilteredAccessSet> = (0..n).map(|index| Self::gated_access(schedule, index)).collect();
        let exclusive: Vec<bool> = schedule.systems.iter().map(|system| system.is_exclusive()).collect();

        let mut stage_of = vec![0usize; n];
        for i in 0..n {
            let stage = (0..i)
                .filter(|&p| {
                    exclusive[i] || exclusive[p] || dependencies[i].contains(&p) || !access[p].is_compatible(&access[i])
                })
                .map(|p| stage_of[p] + 1)
                .max()
                .unwrap_or(0);
            stage_of[i] = stage;
        }

        let stage_count = stage_of.iter().map(|stage| stage + 1).max().unwrap_or(0);
        let mut stages = vec![Vec::new(); stage_count];
        for (index, &stage) in stage_of.iter().enumerate() {
            stages[stage].push(index);
        }
        stages
    }

    fn run_stages(&mut self, schedule: &mut SystemSchedule, world: &mut World) -> Result<(), RunError> {
        for stage in &self.stages {
            let mut runnable = Signature::with_capacity(schedule.systems.len());
            for &index in stage {
                if self.state.should_run(schedule, index, world) {
                    runnable.set(index);
                }
            }
            if runnable.is_empty() {
                continue;
            }

            if let [index] = stage[..] {
                if schedule.systems[index].is_exclusive() {
                    run_exclusive(&mut self.state, schedule, index, world)?;
                    continue;
                }
            }

            let world_cell = world.as_unsafe_world_cell();
            let run = |(index, system): (usize, &mut ScheduleSystem)| {
                #[cfg(feature = "trace")]
                let _span = tracing::info_span!("system", name = %system.name()).entered();
                // SAFETY: systems of one stage have pairwise compatible access
                // and none is exclusive.
                (index, unsafe { system.run_unsafe(world_cell) })
            };

            #[cfg(feature = "multi_threaded")]
            let results: Vec<_> = schedule
                .systems
                .par_iter_mut()
                .enumerate()
                .filter(|(index, _)| runnable.has(*index))
                .map(run)
                .collect();
            #[cfg(not(feature = "multi_threaded"))]
            let results: Vec<_> = schedule
                .systems
                .iter_mut()
                .enumerate()
                .filter(|(index, _)| runnable.has(*index))
                .map(run)
                .collect();

            let mut first_error = None;
            for (index, result) in results {
                if schedule.systems[index].has_deferred() {
                    self.state.unapplied_systems.set(index);
                }
                match result {
                    Err(source) if first_error.is_none() => {
                        first_error = Some(system_error(&schedule.systems[index], source));
                    }
                    _ => {}
                }
            }
            if let Some(error) = first_error {
                return Err(error);
            }
        }
        Ok(())
    }
}

impl SystemExecutor for MultiThreadedExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::MultiThreaded
    }

    fn init(&mut self, schedule: &SystemSchedule) {
        self.stages = Self::compute_stages(schedule);
        self.state = PassState::default();
        tracing::debug!(stages = self.stages.len(), systems = schedule.systems.len(), "parallel stages computed");
    }

    fn run(&mut self, schedule: &mut SystemSchedule, world: &mut World) -> Result<(), RunError> {
        let result = self.run_stages(schedule, world);
        self.state.finish(schedule, world);
        result
    }
}
