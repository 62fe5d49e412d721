//! Column roles of an eventstream and the mapping from raw input columns onto them.

use serde::{Deserialize, Serialize};

use crate::error::{EventstreamError, EventstreamResult};
use crate::types::Schema;

/// Declares which columns of an eventstream carry which semantic role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventstreamSchema {
    pub event_id: String,
    pub event_type: String,
    pub event_index: String,
    pub event_name: String,
    pub event_timestamp: String,
    pub user_id: String,
    #[serde(default)]
    pub custom_cols: Vec<String>,
}

impl Default for EventstreamSchema {
    fn default() -> Self {
        Self {
            event_id: "event_id".to_string(),
            event_type: "event_type".to_string(),
            event_index: "event_index".to_string(),
            event_name: "event".to_string(),
            event_timestamp: "timestamp".to_string(),
            user_id: "user_id".to_string(),
            custom_cols: Vec::new(),
        }
    }
}

impl EventstreamSchema {
    /// All recognized column names, role columns first, then custom columns in declaration order.
    pub fn get_cols(&self) -> Vec<String> {
        let mut cols = vec![
            self.event_id.clone(),
            self.event_type.clone(),
            self.event_index.clone(),
            self.event_name.clone(),
            self.event_timestamp.clone(),
            self.user_id.clone(),
        ];
        cols.extend(self.custom_cols.iter().cloned());
        cols
    }

    /// A raw-data schema that reads a frame produced by this schema back as raw input.
    pub fn to_raw_data_schema(&self) -> RawDataSchema {
        RawDataSchema {
            event_name: self.event_name.clone(),
            event_timestamp: self.event_timestamp.clone(),
            user_id: self.user_id.clone(),
            event_type: Some(self.event_type.clone()),
            custom_cols: self
                .custom_cols
                .iter()
                .map(|c| RawDataCustomCol::new(c.clone(), c.clone()))
                .collect(),
        }
    }

    /// Deep copy; the custom column list is duplicated.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// `true` when both schemas assign the same names to every role.
    pub fn same_roles(&self, other: &EventstreamSchema) -> bool {
        self.event_id == other.event_id
            && self.event_type == other.event_type
            && self.event_index == other.event_index
            && self.event_name == other.event_name
            && self.event_timestamp == other.event_timestamp
            && self.user_id == other.user_id
    }

    /// Fail unless `other` assigns the same names to every role.
    pub fn ensure_compatible(&self, other: &EventstreamSchema) -> EventstreamResult<()> {
        if self.same_roles(other) {
            Ok(())
        } else {
            Err(EventstreamError::schema(format!(
                "incompatible schemas: {:?} vs {:?}",
                self.get_cols(),
                other.get_cols()
            )))
        }
    }

    /// Add custom columns of `other` that this schema lacks, preserving order.
    pub fn union_custom_cols(&mut self, other: &EventstreamSchema) {
        for col in &other.custom_cols {
            if !self.custom_cols.contains(col) {
                self.custom_cols.push(col.clone());
            }
        }
    }

    /// `true` when `name` is one of the role columns.
    pub fn is_role_col(&self, name: &str) -> bool {
        name == self.event_id
            || name == self.event_type
            || name == self.event_index
            || name == self.event_name
            || name == self.event_timestamp
            || name == self.user_id
    }
}

/// Maps one raw input column onto a custom eventstream column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataCustomCol {
    pub raw_data_col: String,
    pub custom_col: String,
}

impl RawDataCustomCol {
    pub fn new(raw_data_col: impl Into<String>, custom_col: impl Into<String>) -> Self {
        Self {
            raw_data_col: raw_data_col.into(),
            custom_col: custom_col.into(),
        }
    }
}

/// Declares how columns of raw input map onto eventstream roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDataSchema {
    pub event_name: String,
    pub event_timestamp: String,
    pub user_id: String,
    /// When absent every raw row is typed `raw`.
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub custom_cols: Vec<RawDataCustomCol>,
}

impl Default for RawDataSchema {
    fn default() -> Self {
        Self {
            event_name: "event".to_string(),
            event_timestamp: "timestamp".to_string(),
            user_id: "user_id".to_string(),
            event_type: None,
            custom_cols: Vec::new(),
        }
    }
}

impl RawDataSchema {
    pub fn new(
        event_name: impl Into<String>,
        event_timestamp: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            event_timestamp: event_timestamp.into(),
            user_id: user_id.into(),
            event_type: None,
            custom_cols: Vec::new(),
        }
    }

    pub fn with_event_type(mut self, col: impl Into<String>) -> Self {
        self.event_type = Some(col.into());
        self
    }

    pub fn with_custom_col(
        mut self,
        raw_data_col: impl Into<String>,
        custom_col: impl Into<String>,
    ) -> Self {
        self.custom_cols
            .push(RawDataCustomCol::new(raw_data_col, custom_col));
        self
    }

    /// Canonical processing schema for this raw description.
    ///
    /// Role columns take their default names; custom columns take their semantic names. The
    /// `event_id` and `event_index` columns are always part of the result.
    pub fn to_schema(&self) -> EventstreamSchema {
        EventstreamSchema {
            custom_cols: self
                .custom_cols
                .iter()
                .map(|c| c.custom_col.clone())
                .collect(),
            ..EventstreamSchema::default()
        }
    }

    /// Raw columns this description reads, in role order.
    pub fn required_cols(&self) -> Vec<&str> {
        let mut cols = vec![
            self.event_name.as_str(),
            self.event_timestamp.as_str(),
            self.user_id.as_str(),
        ];
        if let Some(t) = &self.event_type {
            cols.push(t.as_str());
        }
        cols.extend(self.custom_cols.iter().map(|c| c.raw_data_col.as_str()));
        cols
    }

    /// Fail with a [`EventstreamError::Schema`] naming the first declared column absent from `input`.
    pub fn validate(&self, input: &Schema) -> EventstreamResult<()> {
        for col in self.required_cols() {
            if input.index_of(col).is_none() {
                return Err(EventstreamError::schema(format!(
                    "missing required column '{col}'. columns={:?}",
                    input.field_names().collect::<Vec<_>>()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{EventstreamSchema, RawDataSchema};
    use crate::types::{DataType, Field, Schema};

    #[test]
    fn get_cols_lists_roles_then_custom() {
        let schema = EventstreamSchema {
            custom_cols: vec!["price".to_string()],
            ..Default::default()
        };
        assert_eq!(
            schema.get_cols(),
            vec![
                "event_id",
                "event_type",
                "event_index",
                "event",
                "timestamp",
                "user_id",
                "price"
            ]
        );
    }

    #[test]
    fn raw_schema_maps_custom_cols_to_semantic_names() {
        let raw = RawDataSchema::new("action", "ts", "client")
            .with_custom_col("raw_price", "price");
        let schema = raw.to_schema();
        assert_eq!(schema.custom_cols, vec!["price".to_string()]);
        assert_eq!(schema.event_name, "event");
    }

    #[test]
    fn to_raw_data_schema_is_identity_mapping() {
        let schema = EventstreamSchema {
            custom_cols: vec!["session_id".to_string()],
            ..Default::default()
        };
        let raw = schema.to_raw_data_schema();
        assert_eq!(raw.event_name, "event");
        assert_eq!(raw.event_type.as_deref(), Some("event_type"));
        assert_eq!(raw.custom_cols[0].raw_data_col, "session_id");
        assert_eq!(raw.to_schema(), schema);
    }

    #[test]
    fn copy_duplicates_custom_cols() {
        let schema = EventstreamSchema {
            custom_cols: vec!["a".to_string()],
            ..Default::default()
        };
        let mut copy = schema.copy();
        copy.custom_cols.push("b".to_string());
        assert_eq!(schema.custom_cols.len(), 1);
    }

    #[test]
    fn validate_reports_missing_column() {
        let raw = RawDataSchema::default().with_event_type("kind");
        let input = Schema::new(vec![
            Field::new("event", DataType::Utf8),
            Field::new("timestamp", DataType::Int64),
            Field::new("user_id", DataType::Int64),
        ]);
        let err = raw.validate(&input).unwrap_err();
        assert!(err.to_string().contains("missing required column 'kind'"));
    }
}
