//! Named callables used as processor parameters.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::eventstream::Eventstream;
use crate::schema::EventstreamSchema;
use crate::types::DataSet;

/// Row predicate over an eventstream frame: one flag per row.
pub type MaskFn = dyn Fn(&DataSet, &EventstreamSchema) -> Vec<bool> + Send + Sync;

/// Target selector: returns a frame with an `event_id` column naming the rows to label.
pub type TargetsFn = dyn Fn(&Eventstream, &[String]) -> DataSet + Send + Sync;

/// Whole-frame rewrite.
pub type FrameFn = dyn Fn(DataSet) -> DataSet + Send + Sync;

/// A callable with a stable handle name.
///
/// The name is what gets serialized; [`FunctionRegistry`] maps it back to the callable.
pub struct NamedFn<F: ?Sized> {
    name: String,
    func: Arc<F>,
}

impl<F: ?Sized> NamedFn<F> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Borrow the callable.
    pub fn get(&self) -> &F {
        &self.func
    }
}

impl NamedFn<MaskFn> {
    pub fn mask<G>(name: impl Into<String>, func: G) -> Self
    where
        G: Fn(&DataSet, &EventstreamSchema) -> Vec<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl NamedFn<TargetsFn> {
    pub fn targets<G>(name: impl Into<String>, func: G) -> Self
    where
        G: Fn(&Eventstream, &[String]) -> DataSet + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl NamedFn<FrameFn> {
    pub fn frame<G>(name: impl Into<String>, func: G) -> Self
    where
        G: Fn(DataSet) -> DataSet + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl<F: ?Sized> Clone for NamedFn<F> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            func: Arc::clone(&self.func),
        }
    }
}

impl<F: ?Sized> fmt::Debug for NamedFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamedFn({})", self.name)
    }
}

impl<F: ?Sized> Serialize for NamedFn<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

/// Resolves function handle names back to callables when rebuilding parameters from JSON.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    masks: HashMap<String, NamedFn<MaskFn>>,
    targets: HashMap<String, NamedFn<TargetsFn>>,
    frames: HashMap<String, NamedFn<FrameFn>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_mask(&mut self, func: NamedFn<MaskFn>) -> &mut Self {
        self.masks.insert(func.name.clone(), func);
        self
    }

    pub fn register_targets(&mut self, func: NamedFn<TargetsFn>) -> &mut Self {
        self.targets.insert(func.name.clone(), func);
        self
    }

    pub fn register_frame(&mut self, func: NamedFn<FrameFn>) -> &mut Self {
        self.frames.insert(func.name.clone(), func);
        self
    }

    pub fn mask(&self, name: &str) -> Option<NamedFn<MaskFn>> {
        self.masks.get(name).cloned()
    }

    pub fn targets(&self, name: &str) -> Option<NamedFn<TargetsFn>> {
        self.targets.get(name).cloned()
    }

    pub fn frame(&self, name: &str) -> Option<NamedFn<FrameFn>> {
        self.frames.get(name).cloned()
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self
            .masks
            .keys()
            .chain(self.targets.keys())
            .chain(self.frames.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}
