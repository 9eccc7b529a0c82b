//! Builders that attach ordering, set membership and run conditions to
//! systems and sets before they are added to a schedule.

use crate::engine::schedule::condition::{new_condition, Condition};
use crate::engine::schedule::set::{InternedSystemSet, IntoSystemSet, SystemSet};
use crate::engine::system::{
    BoxedCondition, IntoSystem, IntoSystemResult, ResultSystem, ScheduleSystem,
};


/// Direction of an ordering constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DependencyKind {
    /// The node runs before the set.
    Before,
    /// The node runs after the set.
    After,
    /// Like [`DependencyKind::Before`], without requesting a sync point.
    BeforeNoSync,
    /// Like [`DependencyKind::After`], without requesting a sync point.
    AfterNoSync,
}

/// An ordering constraint against a set.
#[derive(Clone, Debug)]
pub struct Dependency {
    /// Direction of the constraint.
    pub kind: DependencyKind,
    /// The other side.
    pub set: InternedSystemSet,
}

impl Dependency {
    /// Constraint of `kind` against `set`.
    pub fn new(kind: DependencyKind, set: InternedSystemSet) -> Self {
        Self { kind, set }
    }
}

/// Ambiguity reporting policy for one node.
#[derive(Clone, Debug, Default)]
pub enum Ambiguity {
    /// Report conflicts with unordered nodes.
    #[default]
    Check,
    /// Ignore conflicts with members of these sets.
    IgnoreWithSet(Vec<InternedSystemSet>),
    /// Ignore every conflict.
    IgnoreAll,
}

/// Graph relationships declared for one node.
#[derive(Clone, Debug, Default)]
pub struct GraphInfo {
    /// Sets the node belongs to.
    pub hierarchy: Vec<InternedSystemSet>,
    /// Ordering constraints.
    pub dependencies: Vec<Dependency>,
    /// Ambiguity policy.
    pub ambiguous_with: Ambiguity,
}

/// How the members of a group are ordered among themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Chain {
    /// No ordering.
    #[default]
    Unchained,
    /// Each member runs after the previous one.
    Chained,
    /// Like [`Chain::Chained`], without requesting sync points.
    ChainedIgnoreDeferred,
}

/// One system or set together with its configuration.
pub struct NodeConfig<T> {
    pub(crate) node: T,
    pub(crate) graph_info: GraphInfo,
    pub(crate) conditions: Vec<BoxedCondition>,
}

/// Configuration of one system.
pub type SystemConfig = NodeConfig<ScheduleSystem>;

/// Configuration of one set.
pub type SystemSetConfig = NodeConfig<InternedSystemSet>;

impl SystemSetConfig {
    pub(crate) fn new(set: InternedSystemSet) -> Self {
        assert!(set.system_type().is_none(), "configuring system type sets is not allowed");
        Self { node: set, graph_info: GraphInfo::default(), conditions: Vec::new() }
    }
}

/// A single node configuration or a group of them.
pub enum NodeConfigs<T> {
    /// One node.
    NodeConfig(NodeConfig<T>),
    /// A group with shared conditions and optional chaining.
    Configs {
        /// Members of the group.
        configs: Vec<NodeConfigs<T>>,
        /// Conditions gating the whole group.
        collective_conditions: Vec<BoxedCondition>,
        /// Ordering among the members.
        chained: Chain,
    },
}

/// Configuration of a group of systems.
pub type SystemConfigs = NodeConfigs<ScheduleSystem>;

/// Configuration of a group of sets.
pub type SystemSetConfigs = NodeConfigs<InternedSystemSet>;

impl SystemConfigs {
    fn new_system(system: ScheduleSystem) -> Self {
        let sets = system.default_system_sets();
        Self::NodeConfig(NodeConfig {
            node: system,
            graph_info: GraphInfo { hierarchy: sets, ..Default::default() },
            conditions: Vec::new(),
        })
    }
}

impl<T> NodeConfigs<T> {
    pub(crate) fn in_set_inner(&mut self, set: InternedSystemSet) {
        match self {
            Self::NodeConfig(config) => config.graph_info.hierarchy.push(set),
            Self::Configs { configs, .. } => {
                for config in configs {
                    config.in_set_inner(set.clone());
                }
            }
        }
    }

    fn dependency_inner(&mut self, kind: DependencyKind, set: InternedSystemSet) {
        match self {
            Self::NodeConfig(config) => config.graph_info.dependencies.push(Dependency::new(kind, set)),
            Self::Configs { configs, .. } => {
                for config in configs {
                    config.dependency_inner(kind, set.clone());
                }
            }
        }
    }

    fn distributive_run_if_inner<M>(&mut self, condition: impl Condition<M> + Clone) {
        match self {
            Self::NodeConfig(config) => config.conditions.push(new_condition(condition)),
            Self::Configs { configs, .. } => {
                for config in configs {
                    config.distributive_run_if_inner(condition.clone());
                }
            }
        }
    }

    fn ambiguous_with_inner(&mut self, set: InternedSystemSet) {
        match self {
            Self::NodeConfig(config) => match &mut config.graph_info.ambiguous_with {
                ambiguous_with @ Ambiguity::Check => *ambiguous_with = Ambiguity::IgnoreWithSet(vec![set]),
                Ambiguity::IgnoreWithSet(sets) => sets.push(set),
                Ambiguity::IgnoreAll => {}
            },
            Self::Configs { configs, .. } => {
                for config in configs {
                    config.ambiguous_with_inner(set.clone());
                }
            }
        }
    }

    fn ambiguous_with_all_inner(&mut self) {
        match self {
            Self::NodeConfig(config) => config.graph_info.ambiguous_with = Ambiguity::IgnoreAll,
            Self::Configs { configs, .. } => {
                for config in configs {
                    config.ambiguous_with_all_inner();
                }
            }
        }
    }

    /// Adds a condition to the node, or to the whole group.
    pub(crate) fn run_if_dyn(&mut self, condition: BoxedCondition) {
        match self {
            Self::NodeConfig(config) => config.conditions.push(condition),
            Self::Configs { collective_conditions, .. } => collective_conditions.push(condition),
        }
    }

    fn chain_inner(mut self, chain: Chain) -> Self {
        if let Self::Configs { chained, .. } = &mut self {
            *chained = chain;
        }
        self
    }
}

/// Types that can be converted into [`SystemConfigs`]: systems, functions,
/// existing configs and tuples of them.
///
/// ```ignore
/// schedule.add_systems((sense, decide, act).chain().run_if(resource_exists::<Running>));
/// ```
pub trait IntoSystemConfigs<Marker>: Sized {
    /// Converts into configs.
    fn into_configs(self) -> SystemConfigs;

    /// Adds the systems to `set`.
    #[track_caller]
    fn in_set(self, set: impl SystemSet) -> SystemConfigs {
        self.into_configs().in_set(set)
    }

    /// Runs the systems before `set`.
    fn before<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().before(set)
    }

    /// Runs the systems after `set`.
    fn after<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().after(set)
    }

    /// Runs the systems before `set`, without a sync point in between.
    fn before_ignore_deferred<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().before_ignore_deferred(set)
    }

    /// Runs the systems after `set`, without a sync point in between.
    fn after_ignore_deferred<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().after_ignore_deferred(set)
    }

    /// Gates each system separately with a copy of `condition`.
    fn distributive_run_if<M>(self, condition: impl Condition<M> + Clone) -> SystemConfigs {
        self.into_configs().distributive_run_if(condition)
    }

    /// Gates the systems with `condition`, evaluated once for the group.
    fn run_if<M>(self, condition: impl Condition<M>) -> SystemConfigs {
        self.into_configs().run_if(condition)
    }

    /// Suppresses ambiguity reports against members of `set`.
    fn ambiguous_with<M>(self, set: impl IntoSystemSet<M>) -> SystemConfigs {
        self.into_configs().ambiguous_with(set)
    }

    /// Suppresses every ambiguity report for the systems.
    fn ambiguous_with_all(self) -> SystemConfigs {
        self.into_configs().ambiguous_with_all()
    }

    /// Runs the systems one after the other, in tuple order.
    fn chain(self) -> SystemConfigs {
        self.into_configs().chain()
    }

    /// Like [`IntoSystemConfigs::chain`], without sync points in between.
    fn chain_ignore_deferred(self) -> SystemConfigs {
        self.into_configs().chain_ignore_deferred()
    }
}

impl IntoSystemConfigs<()> for SystemConfigs {
    fn into_configs(self) -> Self {
        self
    }

    #[track_caller]
    fn in_set(mut self, set: impl SystemSet) -> Self {
        assert!(set.system_type().is_none(), "adding arbitrary systems to a system type set is not allowed");
        self.in_set_inner(set.intern());
        self
    }

    fn before<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::Before, set.into_system_set().intern());
        self
    }

    fn after<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::After, set.into_system_set().intern());
        self
    }

    fn before_ignore_deferred<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::BeforeNoSync, set.into_system_set().intern());
        self
    }

    fn after_ignore_deferred<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::AfterNoSync, set.into_system_set().intern());
        self
    }

    fn distributive_run_if<M>(mut self, condition: impl Condition<M> + Clone) -> Self {
        self.distributive_run_if_inner(condition);
        self
    }

    fn run_if<M>(mut self, condition: impl Condition<M>) -> Self {
        self.run_if_dyn(new_condition(condition));
        self
    }

    fn ambiguous_with<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.ambiguous_with_inner(set.into_system_set().intern());
        self
    }

    fn ambiguous_with_all(mut self) -> Self {
        self.ambiguous_with_all_inner();
        self
    }

    fn chain(self) -> Self {
        self.chain_inner(Chain::Chained)
    }

    fn chain_ignore_deferred(self) -> Self {
        self.chain_inner(Chain::ChainedIgnoreDeferred)
    }
}

#[doc(hidden)]
pub struct IsSystemConfig;

impl<Out, Marker, F> IntoSystemConfigs<(IsSystemConfig, Out, Marker)> for F
where
    F: IntoSystem<Out, Marker>,
    Out: IntoSystemResult,
{
    fn into_configs(self) -> SystemConfigs {
        SystemConfigs::new_system(Box::new(ResultSystem::new(IntoSystem::into_system(self))))
    }
}

#[doc(hidden)]
pub struct SystemConfigTupleMarker;

macro_rules! impl_system_collection {
    ($(($param:ident, $sys:ident)),*) => {
        #[allow(non_snake_case)]
        impl<$($param, $sys),*> IntoSystemConfigs<(SystemConfigTupleMarker, $($param,)*)> for ($($sys,)*)
        where
            $($sys: IntoSystemConfigs<$param>),*
        {
            fn into_configs(self) -> SystemConfigs {
                let ($($sys,)*) = self;
                SystemConfigs::Configs {
                    configs: vec![$($sys.into_configs(),)*],
                    collective_conditions: Vec::new(),
                    chained: Chain::Unchained,
                }
            }
        }
    };
}

impl_system_collection!((P0, S0));
impl_system_collection!((P0, S0), (P1, S1));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6));
impl_system_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7));
impl_system_collection!(
    (P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7), (P8, S8)
);
impl_system_collection!(
    (P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7), (P8, S8), (P9, S9)
);
impl_system_collection!(
    (P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7), (P8, S8), (P9, S9),
    (P10, S10)
);
impl_system_collection!(
    (P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7), (P8, S8), (P9, S9),
    (P10, S10), (P11, S11)
);

/// Types that can be converted into [`SystemSetConfigs`]: sets, existing
/// configs and tuples of them.
pub trait IntoSystemSetConfigs<Marker>: Sized {
    /// Converts into configs.
    fn into_configs(self) -> SystemSetConfigs;

    /// Nests the sets in `set`.
    #[track_caller]
    fn in_set(self, set: impl SystemSet) -> SystemSetConfigs {
        self.into_configs().in_set(set)
    }

    /// Runs the sets before `set`.
    fn before<M>(self, set: impl IntoSystemSet<M>) -> SystemSetConfigs {
        self.into_configs().before(set)
    }

    /// Runs the sets after `set`.
    fn after<M>(self, set: impl IntoSystemSet<M>) -> SystemSetConfigs {
        self.into_configs().after(set)
    }

    /// Runs the sets before `set`, without a sync point in between.
    fn before_ignore_deferred<M>(self, set: impl IntoSystemSet<M>) -> SystemSetConfigs {
        self.into_configs().before_ignore_deferred(set)
    }

    /// Runs the sets after `set`, without a sync point in between.
    fn after_ignore_deferred<M>(self, set: impl IntoSystemSet<M>) -> SystemSetConfigs {
        self.into_configs().after_ignore_deferred(set)
    }

    /// Gates every member of the sets with `condition`, evaluated once per set.
    fn run_if<M>(self, condition: impl Condition<M>) -> SystemSetConfigs {
        self.into_configs().run_if(condition)
    }

    /// Suppresses ambiguity reports between the sets' members and `set`.
    fn ambiguous_with<M>(self, set: impl IntoSystemSet<M>) -> SystemSetConfigs {
        self.into_configs().ambiguous_with(set)
    }

    /// Suppresses every ambiguity report for the sets' members.
    fn ambiguous_with_all(self) -> SystemSetConfigs {
        self.into_configs().ambiguous_with_all()
    }

    /// Runs the sets one after the other, in tuple order.
    fn chain(self) -> SystemSetConfigs {
        self.into_configs().chain()
    }

    /// Like [`IntoSystemSetConfigs::chain`], without sync points in between.
    fn chain_ignore_deferred(self) -> SystemSetConfigs {
        self.into_configs().chain_ignore_deferred()
    }
}

impl IntoSystemSetConfigs<()> for SystemSetConfigs {
    fn into_configs(self) -> Self {
        self
    }

    #[track_caller]
    fn in_set(mut self, set: impl SystemSet) -> Self {
        assert!(set.system_type().is_none(), "adding arbitrary systems to a system type set is not allowed");
        self.in_set_inner(set.intern());
        self
    }

    fn before<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::Before, set.into_system_set().intern());
        self
    }

    fn after<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::After, set.into_system_set().intern());
        self
    }

    fn before_ignore_deferred<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::BeforeNoSync, set.into_system_set().intern());
        self
    }

    fn after_ignore_deferred<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.dependency_inner(DependencyKind::AfterNoSync, set.into_system_set().intern());
        self
    }

    fn run_if<M>(mut self, condition: impl Condition<M>) -> Self {
        self.run_if_dyn(new_condition(condition));
        self
    }

    fn ambiguous_with<M>(mut self, set: impl IntoSystemSet<M>) -> Self {
        self.ambiguous_with_inner(set.into_system_set().intern());
        self
    }

    fn ambiguous_with_all(mut self) -> Self {
        self.ambiguous_with_all_inner();
        self
    }

    fn chain(self) -> Self {
        self.chain_inner(Chain::Chained)
    }

    fn chain_ignore_deferred(self) -> Self {
        self.chain_inner(Chain::ChainedIgnoreDeferred)
    }
}

#[doc(hidden)]
pub struct IsSystemSetConfig;

impl<S: SystemSet> IntoSystemSetConfigs<IsSystemSetConfig> for S {
    fn into_configs(self) -> SystemSetConfigs {
        SystemSetConfigs::NodeConfig(SystemSetConfig::new(self.intern()))
    }
}

#[doc(hidden)]
pub struct SystemSetConfigTupleMarker;

macro_rules! impl_system_set_collection {
    ($(($param:ident, $set:ident)),*) => {
        #[allow(non_snake_case)]
        impl<$($param, $set),*> IntoSystemSetConfigs<(SystemSetConfigTupleMarker, $($param,)*)> for ($($set,)*)
        where
            $($set: IntoSystemSetConfigs<$param>),*
        {
            fn into_configs(self) -> SystemSetConfigs {
                let ($($set,)*) = self;
                SystemSetConfigs::Configs {
                    configs: vec![$($set.into_configs(),)*],
                    collective_conditions: Vec::new(),
                    chained: Chain::Unchained,
                }
            }
        }
    };
}

impl_system_set_collection!((P0, S0));
impl_system_set_collection!((P0, S0), (P1, S1));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6));
impl_system_set_collection!((P0, S0), (P1, S1), (P2, S2), (P3, S3), (P4, S4), (P5, S5), (P6, S6), (P7, S7));
