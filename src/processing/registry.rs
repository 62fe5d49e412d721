//! Processor lookup by class name, used to rebuild graphs from their JSON description.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::{EventstreamError, EventstreamResult};
use crate::params::{FunctionRegistry, ParamModel, WidgetDescriptor};

use super::{
    AddNegativeEvents, AddPositiveEvents, AddStartEndEvents, AddStartEndEventsParams,
    CollapseLoops, CollapseLoopsParams, DataProcessor, DropPaths, DropPathsParams, FilterEvents,
    FilterEventsParams, GroupEvents, GroupEventsParams, LabelCroppedPaths,
    LabelCroppedPathsParams, LabelLostUsers, LabelLostUsersParams, LabelNewUsers,
    LabelNewUsersParams, Negative, Pipe, PipeParams, Positive, RenameProcessor,
    RenameProcessorParams, SplitSessions, SplitSessionsParams, TargetEventsParams, TruncatePaths,
    TruncatePathsParams,
};

type BuildFn = fn(&Json, &FunctionRegistry) -> EventstreamResult<Arc<dyn DataProcessor>>;

#[derive(Clone, Copy)]
struct Entry {
    build: BuildFn,
    widgets: fn() -> Vec<WidgetDescriptor>,
}

fn build<M, D>(params: &Json, functions: &FunctionRegistry) -> EventstreamResult<Arc<dyn DataProcessor>>
where
    M: ParamModel,
    D: From<M> + DataProcessor + 'static,
{
    Ok(Arc::new(D::from(M::from_json(params, functions)?)))
}

/// Maps processor class names to constructors.
///
/// [`Default`] registers every built-in processor; [`ProcessorRegistry::new`] starts empty.
#[derive(Clone)]
pub struct ProcessorRegistry {
    entries: BTreeMap<&'static str, Entry>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register processor `D`, built from parameter model `M` under `M::PROCESSOR`.
    pub fn register<M, D>(&mut self) -> &mut Self
    where
        M: ParamModel,
        D: From<M> + DataProcessor + 'static,
    {
        self.entries.insert(
            M::PROCESSOR,
            Entry {
                build: build::<M, D>,
                widgets: M::widgets,
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered class names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    /// Instantiate `name` from its JSON parameters.
    ///
    /// # Errors
    ///
    /// [`EventstreamError::GraphStructure`] for unknown names, and the parameter model's
    /// [`EventstreamError::Parameter`] for invalid parameters.
    pub fn build(
        &self,
        name: &str,
        params: &Json,
        functions: &FunctionRegistry,
    ) -> EventstreamResult<Arc<dyn DataProcessor>> {
        let entry = self.entry(name)?;
        (entry.build)(params, functions)
    }

    /// Widget descriptors of `name`'s parameter model.
    pub fn widgets(&self, name: &str) -> EventstreamResult<Vec<WidgetDescriptor>> {
        Ok((self.entry(name)?.widgets)())
    }

    fn entry(&self, name: &str) -> EventstreamResult<&Entry> {
        self.entries
            .get(name)
            .ok_or_else(|| EventstreamError::graph(None, format!("unknown processor '{name}'")))
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register::<AddStartEndEventsParams, AddStartEndEvents>()
            .register::<TargetEventsParams<Positive>, AddPositiveEvents>()
            .register::<TargetEventsParams<Negative>, AddNegativeEvents>()
            .register::<CollapseLoopsParams, CollapseLoops>()
            .register::<DropPathsParams, DropPaths>()
            .register::<FilterEventsParams, FilterEvents>()
            .register::<GroupEventsParams, GroupEvents>()
            .register::<LabelCroppedPathsParams, LabelCroppedPaths>()
            .register::<LabelLostUsersParams, LabelLostUsers>()
            .register::<LabelNewUsersParams, LabelNewUsers>()
            .register::<PipeParams, Pipe>()
            .register::<RenameProcessorParams, RenameProcessor>()
            .register::<SplitSessionsParams, SplitSessions>()
            .register::<TruncatePathsParams, TruncatePaths>();
        registry
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .finish()
    }
}
