use serde_json::{Map, Value as Json};

use crate::error::{EventstreamError, EventstreamResult};
use crate::eventstream::UserId;
use crate::time::TimeSpan;

use super::functions::{FrameFn, FunctionRegistry, MaskFn, NamedFn, TargetsFn};
use super::ParamSpec;

/// Field-by-field access to a JSON parameter object.
///
/// Every accessor returns `Ok(None)` for absent or null fields and a
/// [`EventstreamError::Parameter`] naming the field when the value has the wrong shape.
pub struct ParamReader<'a> {
    processor: &'static str,
    fields: Option<&'a Map<String, Json>>,
    functions: &'a FunctionRegistry,
}

impl<'a> ParamReader<'a> {
    /// Fails on non-object input and on keys `specs` does not declare.
    pub fn new(
        processor: &'static str,
        value: &'a Json,
        specs: &[ParamSpec],
        functions: &'a FunctionRegistry,
    ) -> EventstreamResult<Self> {
        let fields = match value {
            Json::Object(map) => Some(map),
            Json::Null => None,
            other => {
                return Err(EventstreamError::parameter(
                    processor,
                    "params",
                    format!("expected an object, got {other}"),
                ));
            }
        };
        if let Some(map) = fields {
            if let Some(key) = map.keys().find(|k| !specs.iter().any(|s| s.name == k.as_str())) {
                return Err(EventstreamError::parameter(processor, key, "unknown parameter"));
            }
        }
        Ok(Self {
            processor,
            fields,
            functions,
        })
    }

    /// Parameter error for `field`.
    pub fn fail(&self, field: &str, message: impl Into<String>) -> EventstreamError {
        EventstreamError::parameter(self.processor, field, message)
    }

    /// Unwrap a required field.
    pub fn require<T>(&self, field: &str, value: Option<T>) -> EventstreamResult<T> {
        value.ok_or_else(|| self.fail(field, "missing required field"))
    }

    /// The raw JSON of a present, non-null field.
    pub fn raw(&self, field: &str) -> Option<&'a Json> {
        self.fields?.get(field).filter(|v| !v.is_null())
    }

    pub fn string(&self, field: &str) -> EventstreamResult<Option<String>> {
        self.raw(field)
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.fail(field, format!("expected a string, got {v}")))
            })
            .transpose()
    }

    pub fn integer(&self, field: &str) -> EventstreamResult<Option<i64>> {
        self.raw(field)
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| self.fail(field, format!("expected an integer, got {v}")))
            })
            .transpose()
    }

    pub fn count(&self, field: &str) -> EventstreamResult<Option<usize>> {
        match self.integer(field)? {
            Some(n) if n < 0 => Err(self.fail(field, format!("must not be negative, got {n}"))),
            Some(n) => Ok(Some(n as usize)),
            None => Ok(None),
        }
    }

    pub fn float(&self, field: &str) -> EventstreamResult<Option<f64>> {
        self.raw(field)
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| self.fail(field, format!("expected a number, got {v}")))
            })
            .transpose()
    }

    pub fn boolean(&self, field: &str) -> EventstreamResult<Option<bool>> {
        self.raw(field)
            .map(|v| {
                v.as_bool()
                    .ok_or_else(|| self.fail(field, format!("expected a boolean, got {v}")))
            })
            .transpose()
    }

    /// A string restricted to `allowed`.
    pub fn one_of(&self, field: &str, allowed: &[&str]) -> EventstreamResult<Option<String>> {
        match self.string(field)? {
            Some(s) if !allowed.contains(&s.as_str()) => Err(self.fail(
                field,
                format!("unknown value '{s}', expected one of {allowed:?}"),
            )),
            other => Ok(other),
        }
    }

    pub fn strings(&self, field: &str) -> EventstreamResult<Option<Vec<String>>> {
        self.raw(field)
            .map(|v| -> EventstreamResult<Vec<String>> {
                let items = v
                    .as_array()
                    .ok_or_else(|| self.fail(field, format!("expected a list of strings, got {v}")))?;
                items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_string).ok_or_else(|| {
                            self.fail(field, format!("expected a string item, got {item}"))
                        })
                    })
                    .collect()
            })
            .transpose()
    }

    pub fn user_ids(&self, field: &str) -> EventstreamResult<Option<Vec<UserId>>> {
        self.raw(field)
            .map(|v| {
                serde_json::from_value::<Vec<UserId>>(v.clone())
                    .map_err(|e| self.fail(field, format!("expected a list of user ids: {e}")))
            })
            .transpose()
    }

    /// A `[value, unit]` pair with a non-negative value.
    pub fn time(&self, field: &str) -> EventstreamResult<Option<TimeSpan>> {
        let Some(v) = self.raw(field) else {
            return Ok(None);
        };
        let span = serde_json::from_value::<TimeSpan>(v.clone())
            .map_err(|e| self.fail(field, format!("expected [value, unit]: {e}")))?;
        if !span.value.is_finite() || span.value < 0.0 {
            return Err(self.fail(field, format!("time value must be non-negative, got {}", span.value)));
        }
        Ok(Some(span))
    }

    pub fn mask(&self, field: &str) -> EventstreamResult<Option<NamedFn<MaskFn>>> {
        self.function(field, |r, name| r.mask(name))
    }

    pub fn targets(&self, field: &str) -> EventstreamResult<Option<NamedFn<TargetsFn>>> {
        self.function(field, |r, name| r.targets(name))
    }

    pub fn frame(&self, field: &str) -> EventstreamResult<Option<NamedFn<FrameFn>>> {
        self.function(field, |r, name| r.frame(name))
    }

    fn function<F: ?Sized>(
        &self,
        field: &str,
        lookup: impl Fn(&FunctionRegistry, &str) -> Option<NamedFn<F>>,
    ) -> EventstreamResult<Option<NamedFn<F>>> {
        let Some(name) = self.string(field)? else {
            return Ok(None);
        };
        lookup(self.functions, &name)
            .map(Some)
            .ok_or_else(|| self.fail(field, format!("unknown function handle '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::ParamReader;
    use crate::params::{FunctionRegistry, ParamKind, ParamSpec};
    use crate::time::{TimeSpan, TimeUnit};

    fn specs() -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("timeout", ParamKind::Time),
            ParamSpec::optional("suffix", ParamKind::Enum(&["loop", "count"])),
            ParamSpec::optional("targets", ParamKind::ListOfString),
            ParamSpec::optional("func", ParamKind::Function),
        ]
    }

    #[test]
    fn reads_typed_fields() {
        let functions = FunctionRegistry::new();
        let value = json!({"timeout": [30, "m"], "suffix": "loop", "targets": ["a", "b"]});
        let r = ParamReader::new("Test", &value, &specs(), &functions).unwrap();
        assert_eq!(
            r.time("timeout").unwrap(),
            Some(TimeSpan::new(30.0, TimeUnit::Minutes))
        );
        assert_eq!(r.one_of("suffix", &["loop", "count"]).unwrap().as_deref(), Some("loop"));
        assert_eq!(r.strings("targets").unwrap().unwrap().len(), 2);
        assert!(r.mask("func").unwrap().is_none());
    }

    #[test]
    fn errors_name_the_field() {
        let functions = FunctionRegistry::new();
        let value = json!({"timeout": [1, "fortnight"], "suffix": "spiral", "func": "nope"});
        let r = ParamReader::new("Test", &value, &specs(), &functions).unwrap();
        let err = r.time("timeout").unwrap_err().to_string();
        assert!(err.contains("Test.timeout"), "{err}");
        let err = r.one_of("suffix", &["loop", "count"]).unwrap_err().to_string();
        assert!(err.contains("Test.suffix"), "{err}");
        let err = r.mask("func").unwrap_err().to_string();
        assert!(err.contains("unknown function handle 'nope'"), "{err}");
    }

    #[test]
    fn unknown_keys_and_missing_required_fields_fail() {
        let functions = FunctionRegistry::new();
        let value = json!({"timeot": [1, "s"]});
        let err = ParamReader::new("Test", &value, &specs(), &functions)
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("Test.timeot"), "{err}");

        let empty = json!({});
        let r = ParamReader::new("Test", &empty, &specs(), &functions).unwrap();
        let missing = r.time("timeout").unwrap();
        assert!(r.require("timeout", missing).is_err());
    }
}
