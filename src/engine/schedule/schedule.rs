//! [`Schedule`] and the [`ScheduleGraph`] it builds from.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::mem;

use crate::engine::access::AccessConflicts;
use crate::engine::change::Tick;
use crate::engine::component::Components;
use crate::engine::error::{RunError, ScheduleBuildError};
use crate::engine::schedule::config::{
    Ambiguity, Chain, Dependency, DependencyKind, GraphInfo, IntoSystemConfigs, IntoSystemSetConfigs, NodeConfig,
    NodeConfigs, SystemConfig, SystemSetConfig,
};
use crate::engine::schedule::executor::{make_executor, ExecutorKind, SystemExecutor, SystemSchedule};
use crate::engine::schedule::graph::{check_graph, CheckGraphResults, DiGraph, Direction, NodeId};
use crate::engine::schedule::set::{AnonymousSet, InternedSystemSet, SystemSet};
use crate::engine::system::{
    is_apply_deferred, ApplyDeferred, BoxedCondition, ResultSystem, ScheduleSystem, System,
};
use crate::engine::types::Signature;
use crate::engine::world::World;


/// How a build-time finding is reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Not reported.
    #[default]
    Ignore,
    /// Logged with `tracing::warn!`.
    Warn,
    /// Fails the build.
    Error,
}

/// Options for [`Schedule`] builds.
#[derive(Clone, Debug)]
pub struct ScheduleBuildSettings {
    /// Reporting of systems with conflicting access and no ordering.
    pub ambiguity_detection: LogLevel,
    /// Reporting of set memberships implied by other memberships.
    pub hierarchy_detection: LogLevel,
    /// Inserts [`ApplyDeferred`] between a system with commands and the
    /// systems ordered after it.
    pub auto_insert_apply_deferred: bool,
}

impl Default for ScheduleBuildSettings {
    fn default() -> Self {
        Self {
            ambiguity_detection: LogLevel::Ignore,
            hierarchy_detection: LogLevel::Warn,
            auto_insert_apply_deferred: true,
        }
    }
}

struct SystemNode {
    name: Cow<'static, str>,
    /// `None` while the system is owned by the executable.
    inner: Option<ScheduleSystem>,
}

/// Graph and directed acyclic topological order.
#[derive(Default)]
struct Dag {
    graph: DiGraph,
    topsort: Vec<NodeId>,
}

enum CycleKind {
    Hierarchy,
    Dependency,
}

struct ProcessConfigsResult {
    nodes: Vec<NodeId>,
    /// Every node of the group is ordered after every node before it.
    densely_chained: bool,
}

/// Adds one configured node to a [`ScheduleGraph`].
trait ProcessNodeConfig: Sized {
    fn process_config(graph: &mut ScheduleGraph, config: NodeConfig<Self>) -> NodeId;
}

impl ProcessNodeConfig for ScheduleSystem {
    fn process_config(graph: &mut ScheduleGraph, config: SystemConfig) -> NodeId {
        graph.add_system_inner(config)
    }
}

impl ProcessNodeConfig for InternedSystemSet {
    fn process_config(graph: &mut ScheduleGraph, config: SystemSetConfig) -> NodeId {
        graph.configure_set_inner(config)
    }
}

/// Systems, sets and the relationships declared between them.
///
/// ## Build
/// 1. Topologically sort the set hierarchy and check it for redundant
///    memberships.
/// 2. Topologically sort the dependency graph over systems and sets, and
///    reject nodes that are both inside a set and ordered against it.
/// 3. Flatten: every edge touching a set is redirected to the set's
///    systems, and the sets are removed.
/// 4. Insert sync points after systems with deferred buffers.
/// 5. Sort the flattened graph and collect systems with conflicting access
///    and no path between them.
/// 6. Emit the [`SystemSchedule`].
#[derive(Default)]
pub struct ScheduleGraph {
    systems: Vec<SystemNode>,
    system_conditions: Vec<Vec<BoxedCondition>>,
    system_sets: Vec<InternedSystemSet>,
    system_set_conditions: Vec<Vec<BoxedCondition>>,
    system_set_ids: HashMap<InternedSystemSet, NodeId>,
    /// Nodes whose state is not initialized yet, with the index of the first
    /// uninitialized condition.
    uninit: Vec<(NodeId, usize)>,
    hierarchy: Dag,
    dependency: Dag,
    ambiguous_with: Vec<(NodeId, NodeId)>,
    ambiguous_with_all: HashSet<NodeId>,
    conflicting_systems: Vec<(NodeId, NodeId, AccessConflicts)>,
    anonymous_sets: usize,
    changed: bool,
    settings: ScheduleBuildSettings,
    no_sync_edges: HashSet<(NodeId, NodeId)>,
    auto_sync_node_ids: HashMap<u32, NodeId>,
    /// Problems found while adding configs, reported by the next build.
    pending_errors: Vec<ScheduleBuildError>,
}

impl ScheduleGraph {
    /// Systems in the graph that are not owned by an executable.
    pub fn systems(&self) -> impl Iterator<Item = (NodeId, &ScheduleSystem)> {
        self.systems
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.inner.as_ref().map(|system| (NodeId::System(index), system)))
    }

    /// Sets in the graph.
    pub fn system_sets(&self) -> impl Iterator<Item = (NodeId, &InternedSystemSet)> {
        self.system_sets.iter().enumerate().map(|(index, set)| (NodeId::Set(index), set))
    }

    /// Conflicting, unordered system pairs found by the last build.
    pub fn conflicting_systems(&self) -> &[(NodeId, NodeId, AccessConflicts)] {
        &self.conflicting_systems
    }

    /// Display name of a node.
    pub fn get_node_name(&self, id: NodeId) -> String {
        match id {
            NodeId::System(index) => self.systems.get(index).map_or_else(|| "<unknown>".into(), |node| node.name.to_string()),
            NodeId::Set(index) => self
                .system_sets
                .get(index)
                .map_or_else(|| "<unknown>".into(), |set| format!("{set:?}")),
        }
    }

    /// The hierarchy graph: an edge `set -> member` per membership.
    pub fn hierarchy(&self) -> &DiGraph {
        &self.hierarchy.graph
    }

    /// The dependency graph: an edge `a -> b` when `a` runs before `b`.
    pub fn dependency(&self) -> &DiGraph {
        &self.dependency.graph
    }

    /// Current build settings.
    pub fn settings(&self) -> &ScheduleBuildSettings {
        &self.settings
    }

    fn system(&self, index: usize) -> &ScheduleSystem {
        match &self.systems[index].inner {
            Some(system) => system,
            None => unreachable!("system `{}` is owned by the executable during a build", self.systems[index].name),
        }
    }

    fn create_anonymous_set(&mut self) -> AnonymousSet {
        let id = self.anonymous_sets;
        self.anonymous_sets += 1;
        AnonymousSet::new(id)
    }

    fn add_set(&mut self, set: InternedSystemSet) -> NodeId {
        let id = NodeId::Set(self.system_sets.len());
        self.system_sets.push(set.clone());
        self.system_set_conditions.push(Vec::new());
        self.system_set_ids.insert(set, id);
        id
    }

    fn set_id_or_insert(&mut self, set: &InternedSystemSet) -> NodeId {
        match self.system_set_ids.get(set) {
            Some(&id) => id,
            None => self.add_set(set.clone()),
        }
    }

    fn add_system_inner(&mut self, config: SystemConfig) -> NodeId {
        let NodeConfig { node: system, graph_info, conditions } = config;
        let id = NodeId::System(self.systems.len());
        self.systems.push(SystemNode { name: system.name(), inner: Some(system) });
        self.system_conditions.push(conditions);
        self.uninit.push((id, 0));
        self.update_graphs(id, graph_info);
        id
    }

    fn configure_set_inner(&mut self, config: SystemSetConfig) -> NodeId {
        let NodeConfig { node: set, graph_info, mut conditions } = config;
        let id = self.set_id_or_insert(&set);
        let set_conditions = &mut self.system_set_conditions[id.index()];
        self.uninit.push((id, set_conditions.len()));
        set_conditions.append(&mut conditions);
        self.update_graphs(id, graph_info);
        id
    }

    /// Records the relationships of node `id`.
    fn update_graphs(&mut self, id: NodeId, graph_info: GraphInfo) {
        self.changed = true;
        let GraphInfo { hierarchy, dependencies, ambiguous_with } = graph_info;

        self.hierarchy.graph.add_node(id);
        self.dependency.graph.add_node(id);

        for set in &hierarchy {
            let set_id = self.set_id_or_insert(set);
            if set_id == id {
                self.pending_errors.push(ScheduleBuildError::HierarchyLoop(self.get_node_name(id)));
                continue;
            }
            self.hierarchy.graph.add_edge(set_id, id);
            self.dependency.graph.add_node(set_id);
        }

        for Dependency { kind, set } in &dependencies {
            let set_id = self.set_id_or_insert(set);
            if set_id == id {
                self.pending_errors.push(ScheduleBuildError::DependencyLoop(self.get_node_name(id)));
                continue;
            }
            let (before, after) = match kind {
                DependencyKind::Before | DependencyKind::BeforeNoSync => (id, set_id),
                DependencyKind::After | DependencyKind::AfterNoSync => (set_id, id),
            };
            if matches!(kind, DependencyKind::BeforeNoSync | DependencyKind::AfterNoSync) {
                self.no_sync_edges.insert((before, after));
            }
            self.dependency.graph.add_edge(before, after);
            self.hierarchy.graph.add_node(set_id);
        }

        match ambiguous_with {
            Ambiguity::Check => {}
            Ambiguity::IgnoreWithSet(sets) => {
                for set in &sets {
                    let set_id = self.set_id_or_insert(set);
                    self.ambiguous_with.push((id, set_id));
                }
            }
            Ambiguity::IgnoreAll => {
                self.ambiguous_with_all.insert(id);
            }
        }
    }

    fn process_configs<T: ProcessNodeConfig>(&mut self, configs: NodeConfigs<T>, collect_nodes: bool) -> ProcessConfigsResult {
        let (mut configs, collective_conditions, chained) = match configs {
            NodeConfigs::NodeConfig(config) => {
                let id = T::process_config(self, config);
                let nodes = if collect_nodes { vec![id] } else { Vec::new() };
                return ProcessConfigsResult { nodes, densely_chained: true };
            }
            NodeConfigs::Configs { configs, collective_conditions, chained } => (configs, collective_conditions, chained),
        };

        let more_than_one_entry = configs.len() > 1;
        if !collective_conditions.is_empty() {
            if more_than_one_entry {
                let set = self.create_anonymous_set().intern();
                for config in &mut configs {
                    config.in_set_inner(set.clone());
                }
                let mut set_config = SystemSetConfig::new(set);
                set_config.conditions.extend(collective_conditions);
                self.configure_set_inner(set_config);
            } else if let Some(config) = configs.first_mut() {
                for condition in collective_conditions {
                    config.run_if_dyn(condition);
                }
            }
        }

        let mut nodes_in_scope = Vec::new();
        let mut densely_chained = true;
        let ignore_deferred = chained == Chain::ChainedIgnoreDeferred;

        if chained == Chain::Unchained {
            for config in configs {
                let result = self.process_configs(config, collect_nodes);
                densely_chained = densely_chained && result.densely_chained;
                nodes_in_scope.extend(result.nodes);
            }
            if more_than_one_entry {
                densely_chained = false;
            }
            return ProcessConfigsResult { nodes: nodes_in_scope, densely_chained };
        }

        let mut config_iter = configs.into_iter();
        let Some(first) = config_iter.next() else {
            return ProcessConfigsResult { nodes: Vec::new(), densely_chained: true };
        };
        let mut previous = self.process_configs(first, true);
        densely_chained = previous.densely_chained;

        for config in config_iter {
            let current = self.process_configs(config, true);
            densely_chained = densely_chained && current.densely_chained;

            // A densely chained group is entered through its first node and
            // left through its last; any other group is joined node by node.
            let from: &[NodeId] = match (previous.densely_chained, previous.nodes.last()) {
                (true, Some(last)) => std::slice::from_ref(last),
                _ => &previous.nodes,
            };
            let to: &[NodeId] = match (current.densely_chained, current.nodes.first()) {
                (true, Some(first)) => std::slice::from_ref(first),
                _ => &current.nodes,
            };
            for &a in from {
                for &b in to {
                    self.dependency.graph.add_edge(a, b);
                    if ignore_deferred {
                        self.no_sync_edges.insert((a, b));
                    }
                }
            }

            if collect_nodes {
                nodes_in_scope.append(&mut previous.nodes);
            }
            previous = current;
        }
        if collect_nodes {
            nodes_in_scope.append(&mut previous.nodes);
        }
        ProcessConfigsResult { nodes: nodes_in_scope, densely_chained }
    }

    /// Initializes every system and condition added since the last call.
    pub fn initialize(&mut self, world: &mut World) {
        for (id, first_condition) in mem::take(&mut self.uninit) {
            match id {
                NodeId::System(index) => {
                    if let Some(system) = self.systems[index].inner.as_mut() {
                        system.initialize(world);
                    }
                    for condition in &mut self.system_conditions[index] {
                        condition.initialize(world);
                    }
                }
                NodeId::Set(index) => {
                    for condition in self.system_set_conditions[index].iter_mut().skip(first_condition) {
                        condition.initialize(world);
                    }
                }
            }
        }
    }

    fn describe_cycles(&self, graph: &DiGraph, cycles: &[Vec<NodeId>]) -> String {
        let mut report = String::new();
        for (i, component) in cycles.iter().enumerate() {
            let cycle = graph.simple_cycle(component);
            let names: Vec<String> =
                cycle.iter().chain(cycle.first()).map(|&id| format!("`{}`", self.get_node_name(id))).collect();
            if i > 0 {
                report.push('\n');
            }
            let _ = write!(report, "cycle {}: {}", i + 1, names.join(" -> "));
        }
        report
    }

    fn topsort_graph(&self, graph: &DiGraph, kind: CycleKind) -> Result<Vec<NodeId>, ScheduleBuildError> {
        graph.topsort().map_err(|cycles| {
            let report = self.describe_cycles(graph, &cycles);
            match kind {
                CycleKind::Hierarchy => ScheduleBuildError::HierarchyCycle(report),
                CycleKind::Dependency => ScheduleBuildError::DependencyCycle(report),
            }
        })
    }

    fn check_hierarchy_redundancy(&self, transitive_edges: &[(NodeId, NodeId)]) -> Result<(), ScheduleBuildError> {
        if self.settings.hierarchy_detection == LogLevel::Ignore || transitive_edges.is_empty() {
            return Ok(());
        }
        let report = transitive_edges
            .iter()
            .map(|&(parent, child)| {
                format!(
                    "`{}` is in `{}` both directly and through another set",
                    self.get_node_name(child),
                    self.get_node_name(parent),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        if self.settings.hierarchy_detection == LogLevel::Error {
            return Err(ScheduleBuildError::HierarchyRedundancy(report));
        }
        tracing::warn!("system set hierarchy contains redundant edges:\n{report}");
        Ok(())
    }

    fn check_cross_dependencies(
        &self,
        dependency_results: &CheckGraphResults,
        hierarchy_connected: &HashSet<(NodeId, NodeId)>,
    ) -> Result<(), ScheduleBuildError> {
        let mut pairs: Vec<_> = dependency_results.connected.iter().copied().collect();
        pairs.sort_unstable();
        for (a, b) in pairs {
            if hierarchy_connected.contains(&(a, b)) || hierarchy_connected.contains(&(b, a)) {
                return Err(ScheduleBuildError::CrossDependency(self.get_node_name(a), self.get_node_name(b)));
            }
        }
        Ok(())
    }

    /// Systems of every set, children before parents.
    fn map_sets_to_systems(&self) -> HashMap<NodeId, Vec<NodeId>> {
        let mut set_systems: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &id in self.hierarchy.topsort.iter().rev().filter(|id| id.is_set()) {
            let mut systems = Vec::new();
            let mut seen = Signature::default();
            for child in self.hierarchy.graph.neighbors_directed(id, Direction::Outgoing) {
                let children = match child {
                    NodeId::System(_) => std::slice::from_ref(&child),
                    NodeId::Set(_) => set_systems.get(&child).map_or(&[][..], Vec::as_slice),
                };
                for &system in children {
                    if !seen.has(system.index()) {
                        seen.set(system.index());
                        systems.push(system);
                    }
                }
            }
            set_systems.insert(id, systems);
        }
        set_systems
    }

    fn check_system_type_set_ambiguity(
        &self,
        set_systems: &HashMap<NodeId, Vec<NodeId>>,
    ) -> Result<(), ScheduleBuildError> {
        for &id in self.hierarchy.topsort.iter().filter(|id| id.is_set()) {
            if self.system_sets[id.index()].system_type().is_none() {
                continue;
            }
            let instances = set_systems.get(&id).map_or(0, Vec::len);
            let relations = self.dependency.graph.neighbors_directed(id, Direction::Incoming).count()
                + self.dependency.graph.neighbors_directed(id, Direction::Outgoing).count()
                + self.ambiguous_with.iter().filter(|&&(a, b)| a == id || b == id).count();
            if instances > 1 && relations > 0 {
                return Err(ScheduleBuildError::SystemTypeSetAmbiguity(self.get_node_name(id)));
            }
        }
        Ok(())
    }

    /// The dependency graph with sets replaced by their systems.
    fn get_dependency_flattened(&mut self, set_systems: &HashMap<NodeId, Vec<NodeId>>) -> DiGraph {
        let mut flattened = self.dependency.graph.clone();
        let sets: Vec<NodeId> = self.hierarchy.topsort.iter().copied().filter(|id| id.is_set()).collect();
        let mut edges = Vec::new();

        for set in sets {
            let systems = set_systems.get(&set).map_or(&[][..], Vec::as_slice);
            let incoming: Vec<NodeId> = flattened.neighbors_directed(set, Direction::Incoming).collect();
            let outgoing: Vec<NodeId> = flattened.neighbors_directed(set, Direction::Outgoing).collect();

            if systems.is_empty() {
                for &a in &incoming {
                    for &b in &outgoing {
                        if self.no_sync_edges.contains(&(a, set)) && self.no_sync_edges.contains(&(set, b)) {
                            self.no_sync_edges.insert((a, b));
                        }
                        edges.push((a, b));
                    }
                }
            } else {
                for &a in &incoming {
                    for &system in systems {
                        if self.no_sync_edges.contains(&(a, set)) {
                            self.no_sync_edges.insert((a, system));
                        }
                        edges.push((a, system));
                    }
                }
                for &b in &outgoing {
                    for &system in systems {
                        if self.no_sync_edges.contains(&(set, b)) {
                            self.no_sync_edges.insert((system, b));
                        }
                        edges.push((system, b));
                    }
                }
            }

            flattened.remove_node(set);
            for (a, b) in edges.drain(..) {
                flattened.add_edge(a, b);
            }
        }
        flattened
    }

    /// Systems that sit inside a set with run conditions.
    fn conditionally_run_systems(&self, set_systems: &HashMap<NodeId, Vec<NodeId>>) -> HashSet<NodeId> {
        set_systems
            .iter()
            .filter(|(set, _)| !self.system_set_conditions[set.index()].is_empty())
            .flat_map(|(_, systems)| systems.iter().copied())
            .collect()
    }

    /// An [`ApplyDeferred`] that runs whenever the schedule runs.
    fn is_unconditional_sync_point(&self, id: NodeId, conditionally_run: &HashSet<NodeId>) -> bool {
        is_apply_deferred(&**self.system(id.index()))
            && self.system_conditions[id.index()].is_empty()
            && !conditionally_run.contains(&id)
    }

    fn add_auto_sync(&mut self) -> NodeId {
        let id = NodeId::System(self.systems.len());
        let system: ScheduleSystem = Box::new(ResultSystem::new(ApplyDeferred));
        self.systems.push(SystemNode { name: system.name(), inner: Some(system) });
        self.system_conditions.push(Vec::new());
        self.ambiguous_with_all.insert(id);
        id
    }

    /// The shared sync point for `distance`, created on first use.
    fn get_sync_point(&mut self, distance: u32) -> NodeId {
        if let Some(&id) = self.auto_sync_node_ids.get(&distance) {
            return id;
        }
        let id = self.add_auto_sync();
        self.auto_sync_node_ids.insert(distance, id);
        id
    }

    /// Inserts sync points after systems with deferred buffers.
    ///
    /// Each system gets the number of sync points that must precede it; edges
    /// leaving a system with deferred buffers count one more, unless they
    /// lead to an unconditional [`ApplyDeferred`] or were declared
    /// `*_ignore_deferred`. Systems at the same distance share one sync point.
    fn auto_insert_apply_deferred(
        &mut self,
        flattened: &DiGraph,
        conditionally_run: &HashSet<NodeId>,
    ) -> Result<DiGraph, ScheduleBuildError> {
        let mut sync_point_graph = flattened.clone();
        let topo = self.topsort_graph(flattened, CycleKind::Dependency)?;
        let mut distances: HashMap<usize, u32> = HashMap::with_capacity(topo.len());

        for node in topo {
            let add_sync_after = self.system(node.index()).has_deferred();
            let node_distance = distances.get(&node.index()).copied().unwrap_or(0);
            let targets: Vec<NodeId> = flattened.neighbors_directed(node, Direction::Outgoing).collect();

            for target in targets {
                let add_sync_on_edge = add_sync_after
                    && !self.is_unconditional_sync_point(target, conditionally_run)
                    && !self.no_sync_edges.contains(&(node, target));
                let weight = u32::from(add_sync_on_edge);
                let distance = distances.entry(target.index()).or_insert(0);
                *distance = (*distance).max(node_distance + weight);
                let distance = *distance;

                if add_sync_on_edge {
                    let sync_point = self.get_sync_point(distance);
                    sync_point_graph.add_edge(node, sync_point);
                    sync_point_graph.add_edge(sync_point, target);
                    sync_point_graph.remove_edge(node, target);
                }
            }
        }
        Ok(sync_point_graph)
    }

    /// Ambiguity exemptions expanded to system pairs, smaller id first.
    fn get_ambiguous_with_flattened(&self, set_systems: &HashMap<NodeId, Vec<NodeId>>) -> HashSet<(NodeId, NodeId)> {
        let expand = |id: NodeId| -> Vec<NodeId> {
            match id {
                NodeId::System(_) => vec![id],
                NodeId::Set(_) => set_systems.get(&id).cloned().unwrap_or_default(),
            }
        };
        let mut flattened = HashSet::new();
        for &(lhs, rhs) in &self.ambiguous_with {
            for a in expand(lhs) {
                for b in expand(rhs) {
                    flattened.insert((a.min(b), a.max(b)));
                }
            }
        }
        flattened
    }

    fn get_conflicting_systems(
        &self,
        disconnected: &[(NodeId, NodeId)],
        ambiguous_with: &HashSet<(NodeId, NodeId)>,
    ) -> Vec<(NodeId, NodeId, AccessConflicts)> {
        let mut conflicting_systems = Vec::new();
        for &(a, b) in disconnected {
            if ambiguous_with.contains(&(a.min(b), a.max(b)))
                || self.ambiguous_with_all.contains(&a)
                || self.ambiguous_with_all.contains(&b)
            {
                continue;
            }
            let system_a = self.system(a.index());
            let system_b = self.system(b.index());
            if is_apply_deferred(&**system_a) || is_apply_deferred(&**system_b) {
                continue;
            }
            if system_a.is_exclusive() || system_b.is_exclusive() {
                conflicting_systems.push((a, b, AccessConflicts::All));
                continue;
            }
            let access_a = system_a.component_access_set();
            let access_b = system_b.component_access_set();
            if !access_a.is_compatible(access_b) {
                let conflicts = access_a.get_conflicts(access_b);
                if !conflicts.is_empty() {
                    conflicting_systems.push((a, b, conflicts));
                }
            }
        }
        conflicting_systems
    }

    fn report_conflicts(
        &self,
        conflicting_systems: &[(NodeId, NodeId, AccessConflicts)],
        components: &Components,
    ) -> Result<(), ScheduleBuildError> {
        if self.settings.ambiguity_detection == LogLevel::Ignore || conflicting_systems.is_empty() {
            return Ok(());
        }
        let lines: Vec<String> = conflicting_systems
            .iter()
            .map(|(a, b, conflicts)| {
                format!(
                    "`{}` and `{}` conflict on: {}",
                    self.get_node_name(*a),
                    self.get_node_name(*b),
                    conflicts.describe(components),
                )
            })
            .collect();
        if self.settings.ambiguity_detection == LogLevel::Error {
            return Err(ScheduleBuildError::Ambiguity(lines.join("\n")));
        }
        for line in &lines {
            tracing::warn!("ambiguous system order: {line}");
        }
        Ok(())
    }

    fn build_schedule(&mut self, components: &Components) -> Result<SystemSchedule, ScheduleBuildError> {
        // Rejected edges were never added, so each report is made once.
        if let Some(error) = mem::take(&mut self.pending_errors).into_iter().next() {
            return Err(error);
        }

        let hierarchy_topsort = self.topsort_graph(&self.hierarchy.graph, CycleKind::Hierarchy)?;
        let hierarchy_results = check_graph(&self.hierarchy.graph, &hierarchy_topsort);
        self.check_hierarchy_redundancy(&hierarchy_results.transitive_edges)?;
        self.hierarchy.topsort = hierarchy_topsort;

        let dependency_topsort = self.topsort_graph(&self.dependency.graph, CycleKind::Dependency)?;
        let dependency_results = check_graph(&self.dependency.graph, &dependency_topsort);
        self.check_cross_dependencies(&dependency_results, &hierarchy_results.connected)?;
        self.dependency.topsort = dependency_topsort;

        let set_systems = self.map_sets_to_systems();
        self.check_system_type_set_ambiguity(&set_systems)?;

        let mut flattened = self.get_dependency_flattened(&set_systems);
        if let Some(id) = flattened.nodes().find(|&id| flattened.contains_edge(id, id)) {
            return Err(ScheduleBuildError::DependencyLoop(self.get_node_name(id)));
        }

        if self.settings.auto_insert_apply_deferred {
            let conditionally_run = self.conditionally_run_systems(&set_systems);
            flattened = self.auto_insert_apply_deferred(&flattened, &conditionally_run)?;
        }

        let flattened_topsort = self.topsort_graph(&flattened, CycleKind::Dependency)?;
        let flattened_results = check_graph(&flattened, &flattened_topsort);

        let ambiguous_with = self.get_ambiguous_with_flattened(&set_systems);
        let conflicting_systems = self.get_conflicting_systems(&flattened_results.disconnected, &ambiguous_with);
        self.report_conflicts(&conflicting_systems, components)?;
        self.conflicting_systems = conflicting_systems;

        let schedule = self.build_schedule_inner(
            flattened_topsort,
            &flattened_results.transitive_reduction,
            &hierarchy_results.reachable,
        );
        tracing::debug!(
            systems = schedule.system_ids.len(),
            sync_points = self.auto_sync_node_ids.len(),
            conflicts = self.conflicting_systems.len(),
            "schedule built",
        );
        Ok(schedule)
    }

    fn build_schedule_inner(
        &self,
        system_ids: Vec<NodeId>,
        dependency_reduced: &DiGraph,
        hierarchy_reachable: &[Signature],
    ) -> SystemSchedule {
        let system_index: HashMap<NodeId, usize> =
            system_ids.iter().enumerate().map(|(index, &id)| (id, index)).collect();

        let system_dependents: Vec<Vec<usize>> = system_ids
            .iter()
            .map(|&id| {
                dependency_reduced
                    .neighbors_directed(id, Direction::Outgoing)
                    .filter_map(|dependent| system_index.get(&dependent).copied())
                    .collect()
            })
            .collect();

        // Positions in the hierarchy topsort.
        let hierarchy_systems: Vec<(usize, usize)> = self
            .hierarchy
            .topsort
            .iter()
            .enumerate()
            .filter_map(|(position, id)| system_index.get(id).map(|&index| (position, index)))
            .collect();
        let (conditioned_set_positions, set_ids): (Vec<usize>, Vec<NodeId>) = self
            .hierarchy
            .topsort
            .iter()
            .enumerate()
            .filter(|&(_, id)| id.is_set() && !self.system_set_conditions[id.index()].is_empty())
            .map(|(position, &id)| (position, id))
            .unzip();

        let mut systems_in_sets_with_conditions = vec![Signature::default(); set_ids.len()];
        let mut sets_with_conditions_of_systems = vec![Signature::default(); system_ids.len()];
        for (set_index, &set_position) in conditioned_set_positions.iter().enumerate() {
            for &(system_position, system) in &hierarchy_systems {
                if hierarchy_reachable[set_position].has(system_position) {
                    systems_in_sets_with_conditions[set_index].set(system);
                    sets_with_conditions_of_systems[system].set(set_index);
                }
            }
        }

        SystemSchedule {
            systems: Vec::with_capacity(system_ids.len()),
            system_conditions: Vec::with_capacity(system_ids.len()),
            set_conditions: Vec::with_capacity(set_ids.len()),
            system_ids,
            set_ids,
            sets_with_conditions_of_systems,
            systems_in_sets_with_conditions,
            system_dependents,
        }
    }

    /// Rebuilds `schedule`, moving systems and conditions between it and the graph.
    fn update_schedule(&mut self, schedule: &mut SystemSchedule, components: &Components) -> Result<(), ScheduleBuildError> {
        let old_ids = mem::take(&mut schedule.system_ids);
        let old_systems = mem::take(&mut schedule.systems);
        let old_conditions = mem::take(&mut schedule.system_conditions);
        for ((id, system), conditions) in old_ids.into_iter().zip(old_systems).zip(old_conditions) {
            self.systems[id.index()].inner = Some(system);
            self.system_conditions[id.index()] = conditions;
        }
        let old_set_ids = mem::take(&mut schedule.set_ids);
        let old_set_conditions = mem::take(&mut schedule.set_conditions);
        for (id, conditions) in old_set_ids.into_iter().zip(old_set_conditions) {
            self.system_set_conditions[id.index()] = conditions;
        }

        *schedule = self.build_schedule(components)?;

        for &id in &schedule.system_ids {
            let Some(system) = self.systems[id.index()].inner.take() else {
                unreachable!("system `{}` appears twice in the executable", self.systems[id.index()].name);
            };
            schedule.systems.push(system);
            schedule.system_conditions.push(mem::take(&mut self.system_conditions[id.index()]));
        }
        for &id in &schedule.set_ids {
            schedule.set_conditions.push(mem::take(&mut self.system_set_conditions[id.index()]));
        }
        Ok(())
    }
}

/// A collection of systems, the order between them and the conditions
/// gating them.
///
/// ```ignore
/// let mut schedule = Schedule::default();
/// schedule.add_systems((spawn_agents, move_agents, count_agents).chain());
/// schedule.run(&mut world)?;
/// ```
pub struct Schedule {
    graph: ScheduleGraph,
    executable: SystemSchedule,
    executor: Box<dyn SystemExecutor>,
    executor_initialized: bool,
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Schedule {
    /// An empty schedule with the single-threaded executor.
    pub fn new() -> Self {
        Self {
            graph: ScheduleGraph::default(),
            executable: SystemSchedule::default(),
            executor: make_executor(ExecutorKind::default()),
            executor_initialized: false,
        }
    }

    /// Adds systems with their configuration.
    pub fn add_systems<M>(&mut self, systems: impl IntoSystemConfigs<M>) -> &mut Self {
        self.graph.process_configs(systems.into_configs(), false);
        self
    }

    /// Configures sets: membership, ordering and run conditions.
    pub fn configure_sets<M>(&mut self, sets: impl IntoSystemSetConfigs<M>) -> &mut Self {
        self.graph.process_configs(sets.into_configs(), false);
        self
    }

    /// Replaces the build settings. Takes effect on the next build.
    pub fn set_build_settings(&mut self, settings: ScheduleBuildSettings) -> &mut Self {
        self.graph.settings = settings;
        self.graph.changed = true;
        self
    }

    /// Current executor.
    pub fn executor_kind(&self) -> ExecutorKind {
        self.executor.kind()
    }

    /// Switches executors.
    pub fn set_executor_kind(&mut self, kind: ExecutorKind) -> &mut Self {
        if kind != self.executor.kind() {
            self.executor = make_executor(kind);
            self.executor_initialized = false;
        }
        self
    }

    /// Initializes new systems and rebuilds the executable if anything changed.
    pub fn initialize(&mut self, world: &mut World) -> Result<(), ScheduleBuildError> {
        if self.graph.changed {
            self.graph.initialize(world);
            self.graph.update_schedule(&mut self.executable, world.components())?;
            self.graph.changed = false;
            self.executor_initialized = false;
        }
        if !self.executor_initialized {
            self.executor.init(&self.executable);
            self.executor_initialized = true;
        }
        Ok(())
    }

    /// Runs every system once, in order, honoring run conditions.
    ///
    /// Builds first if systems or sets were added. A system error stops the
    /// pass; commands of systems that already ran are still applied.
    pub fn run(&mut self, world: &mut World) -> Result<(), RunError> {
        if let Some(change_tick) = world.check_change_ticks() {
            self.check_change_ticks(change_tick);
        }
        self.initialize(world)?;
        #[cfg(feature = "trace")]
        let _span = tracing::info_span!("schedule", systems = self.executable.len()).entered();
        self.executor.run(&mut self.executable, world)
    }

    /// The graph the schedule is built from.
    pub fn graph(&self) -> &ScheduleGraph {
        &self.graph
    }

    /// The current executable. Empty until the first build.
    pub fn executable(&self) -> &SystemSchedule {
        &self.executable
    }

    /// Systems of the executable in run order.
    pub fn systems(&self) -> impl Iterator<Item = (NodeId, &ScheduleSystem)> {
        self.executable.system_ids.iter().copied().zip(self.executable.systems.iter())
    }

    /// Own run conditions of each system of the executable, in run order.
    pub fn system_conditions(&self) -> impl Iterator<Item = (NodeId, &[BoxedCondition])> {
        self.executable
            .system_ids
            .iter()
            .copied()
            .zip(self.executable.system_conditions.iter().map(Vec::as_slice))
    }

    /// Number of systems in the executable, sync points included.
    pub fn systems_len(&self) -> usize {
        self.executable.len()
    }

    /// Clamps every stored last-run tick against `change_tick`.
    pub fn check_change_ticks(&mut self, change_tick: Tick) {
        let executable_conditions = self.executable.system_conditions.iter_mut().chain(&mut self.executable.set_conditions);
        let graph_conditions =
            self.graph.system_conditions.iter_mut().chain(&mut self.graph.system_set_conditions);
        for condition in executable_conditions.chain(graph_conditions).flatten() {
            condition.check_change_tick(change_tick);
        }
        for system in &mut self.executable.systems {
            system.check_change_tick(change_tick);
        }
        for system in self.graph.systems.iter_mut().filter_map(|node| node.inner.as_mut()) {
            system.check_change_tick(change_tick);
        }
    }
}
