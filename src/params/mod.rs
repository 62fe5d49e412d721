//! Typed, validated processor parameters.
//!
//! Every processor owns a parameter struct implementing [`ParamModel`]. The model declares its
//! fields as [`ParamSpec`]s, builds itself from a JSON object (validating every field and naming
//! the offending one on failure), serializes back to JSON, and derives the
//! [`WidgetDescriptor`] list consumed by external editors.
//!
//! Function-valued fields are carried as [`NamedFn`] handles: they serialize as their name and
//! are resolved through a [`FunctionRegistry`] on the way back in.

pub mod functions;
mod reader;

use serde::{Deserialize, Serialize};
use serde_json::{Value as Json, json};

use crate::error::EventstreamResult;
use crate::time::TimeUnit;

pub use functions::{FrameFn, FunctionRegistry, MaskFn, NamedFn, TargetsFn};
pub use reader::ParamReader;

/// Semantic type of a parameter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Float,
    Boolean,
    /// One of a fixed set of strings.
    Enum(&'static [&'static str]),
    ListOfString,
    /// List of user ids (integers or strings).
    ListOfIds,
    /// `[value, unit]` time tuple.
    Time,
    /// Opaque function handle.
    Function,
    /// List of `{group_name, child_events}` objects.
    RenameRules,
}

impl ParamKind {
    /// Widget kind name used in descriptors.
    pub fn widget(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Float => "float",
            ParamKind::Boolean => "boolean",
            ParamKind::Enum(_) => "enum",
            ParamKind::ListOfString => "list_of_string",
            ParamKind::ListOfIds => "list_of_ids",
            ParamKind::Time => "time_widget",
            ParamKind::Function => "function",
            ParamKind::RenameRules => "rename_rules",
        }
    }

    fn widget_params(&self) -> Json {
        match self {
            ParamKind::Enum(values) => json!(values),
            ParamKind::Time => {
                let units: Vec<&str> = TimeUnit::ALL.iter().map(|u| u.code()).collect();
                json!([{ "widget": "float" }, { "widget": "enum", "params": units }])
            }
            _ => Json::Null,
        }
    }
}

/// Declaration of one parameter field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub optional: bool,
    pub default: Option<Json>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Json) -> Self {
        self.default = Some(default);
        self
    }
}

/// Editor-facing description of one parameter field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetDescriptor {
    pub name: String,
    pub widget: String,
    pub optional: bool,
    pub default: Json,
    pub params: Json,
}

impl From<&ParamSpec> for WidgetDescriptor {
    fn from(spec: &ParamSpec) -> Self {
        Self {
            name: spec.name.to_string(),
            widget: spec.kind.widget().to_string(),
            optional: spec.optional,
            default: spec.default.clone().unwrap_or(Json::Null),
            params: spec.kind.widget_params(),
        }
    }
}

/// A processor's parameter container.
pub trait ParamModel: Sized {
    /// Processor name reported in parameter errors.
    const PROCESSOR: &'static str;

    /// Field declarations, in display order.
    fn specs() -> Vec<ParamSpec>;

    /// Build and validate from a JSON object.
    ///
    /// # Errors
    ///
    /// [`crate::EventstreamError::Parameter`] naming the first invalid or missing field.
    fn from_json(value: &Json, functions: &FunctionRegistry) -> EventstreamResult<Self>;

    /// JSON form; function fields are written as their handle name.
    fn to_json(&self) -> Json;

    fn widgets() -> Vec<WidgetDescriptor> {
        Self::specs().iter().map(WidgetDescriptor::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ParamKind, ParamSpec, WidgetDescriptor};

    #[test]
    fn enum_widget_lists_allowed_values() {
        let spec = ParamSpec::optional("time_agg", ParamKind::Enum(&["min", "max", "mean"]))
            .with_default(json!("min"));
        let w = WidgetDescriptor::from(&spec);
        assert_eq!(
            serde_json::to_value(&w).unwrap(),
            json!({
                "name": "time_agg",
                "widget": "enum",
                "optional": true,
                "default": "min",
                "params": ["min", "max", "mean"]
            })
        );
    }

    #[test]
    fn time_widget_is_a_float_and_unit_pair() {
        let w = WidgetDescriptor::from(&ParamSpec::required("timeout", ParamKind::Time));
        assert_eq!(w.widget, "time_widget");
        assert_eq!(w.params[1]["params"][4], json!("s"));
        assert_eq!(w.default, serde_json::Value::Null);
        assert!(!w.optional);
    }
}
