//! Selection and projection rules applied to a raw dataset.
//!
//! Rules are plain data so alternative datasets can swap them in from a
//! config file without touching the pipeline.

use std::collections::BTreeSet;

use csv::StringRecord;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// A single check against one named field. Values are trimmed before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum FieldCheck {
    Equals { field: String, value: String },
    NonEmpty { field: String },
}

impl FieldCheck {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        FieldCheck::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn non_empty(field: impl Into<String>) -> Self {
        FieldCheck::NonEmpty {
            field: field.into(),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            FieldCheck::Equals { field, .. } | FieldCheck::NonEmpty { field } => field,
        }
    }

    fn holds(&self, raw: &str) -> bool {
        let trimmed = raw.trim();
        match self {
            FieldCheck::Equals { value, .. } => trimmed == value.as_str(),
            FieldCheck::NonEmpty { .. } => !trimmed.is_empty(),
        }
    }
}

/// Conjunction of field checks. An empty rule keeps every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectionRule {
    pub checks: Vec<FieldCheck>,
}

impl SelectionRule {
    pub fn new(checks: Vec<FieldCheck>) -> Self {
        Self { checks }
    }

    /// Resolve field names against `header`. Every referenced field must exist.
    pub fn compile(&self, header: &StringRecord) -> Result<CompiledSelection, SchemaError> {
        let mut resolved = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let index = header
                .iter()
                .position(|name| name == check.field())
                .ok_or_else(|| SchemaError::MissingField {
                    field: check.field().to_string(),
                })?;
            resolved.push((index, check.clone()));
        }
        Ok(CompiledSelection { checks: resolved })
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSelection {
    checks: Vec<(usize, FieldCheck)>,
}

impl CompiledSelection {
    pub fn matches(&self, record: &StringRecord) -> bool {
        self.checks
            .iter()
            .all(|(index, check)| check.holds(record.get(*index).unwrap_or("")))
    }
}

/// Names of fields dropped from the output. Everything else passes through in
/// original order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectionRule {
    pub excluded: BTreeSet<String>,
}

impl ProjectionRule {
    pub fn excluding<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn compile(&self, header: &StringRecord) -> CompiledProjection {
        let keep: Vec<usize> = header
            .iter()
            .enumerate()
            .filter(|(_, name)| !self.excluded.contains(*name))
            .map(|(index, _)| index)
            .collect();
        let header = keep
            .iter()
            .filter_map(|&index| header.get(index))
            .collect::<StringRecord>();
        CompiledProjection { keep, header }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledProjection {
    keep: Vec<usize>,
    header: StringRecord,
}

impl CompiledProjection {
    pub fn header(&self) -> &StringRecord {
        &self.header
    }

    pub fn project(&self, record: &StringRecord) -> StringRecord {
        self.keep
            .iter()
            .map(|&index| record.get(index).unwrap_or(""))
            .collect()
    }
}

/// Missing keys fall back to the airports rules, not to empty rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetRules {
    pub excluded_fields: ProjectionRule,
    pub selection: SelectionRule,
}

static AIRPORTS: Lazy<DatasetRules> = Lazy::new(|| DatasetRules {
    excluded_fields: ProjectionRule::excluding(["id", "home_link", "wikipedia_link", "keywords"]),
    selection: SelectionRule::new(vec![
        FieldCheck::equals("iso_country", "US"),
        FieldCheck::non_empty("icao_code"),
    ]),
});

impl DatasetRules {
    /// US airports with an ICAO code, minus identifier, link and keyword columns.
    pub fn airports() -> Self {
        AIRPORTS.clone()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(check) = self.selection.checks.iter().find(|c| c.field().is_empty()) {
            return Err(format!("selection check has an empty field name: {check:?}"));
        }
        if self.excluded_fields.excluded.iter().any(String::is_empty) {
            return Err("excluded_fields contains an empty field name".to_string());
        }
        Ok(())
    }
}

impl Default for DatasetRules {
    fn default() -> Self {
        Self::airports()
    }
}
