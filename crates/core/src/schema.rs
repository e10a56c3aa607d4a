// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Table schemas inferred from JSON records

use serde::{Deserialize, Serialize};
pub use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One record: a JSON object keyed by column name
pub type Record = serde_json::Map<String, Value>;

/// Column value type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    String,
}

impl ColumnType {
    /// Type of a non-null scalar, or None for nulls and nested values
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Float),
            Value::String(_) => Some(ColumnType::String),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Whether a value of type `other` can be stored in a column of this type
    pub fn accepts(self, other: ColumnType) -> bool {
        self == other || (self == ColumnType::Float && other == ColumnType::Integer)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Ordered list of columns
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Infer a schema from records
    ///
    /// Columns appear in first-seen order and are always nullable. Integer
    /// and float values in one column widen to float. Columns that are only
    /// ever null are typed as string.
    pub fn infer(records: &[Record]) -> Result<Self, String> {
        let mut order: Vec<String> = Vec::new();
        let mut types: BTreeMap<String, Option<ColumnType>> = BTreeMap::new();

        for record in records {
            for (name, value) in record {
                if !types.contains_key(name) {
                    order.push(name.clone());
                    types.insert(name.clone(), None);
                }
                if value.is_null() {
                    continue;
                }
                let found = ColumnType::of(value)
                    .ok_or_else(|| format!("column {:?} holds a nested value", name))?;
                let slot = types.entry(name.clone()).or_insert(None);
                *slot = Some(match *slot {
                    None => found,
                    Some(current) if current == found => current,
                    Some(current) if current.accepts(found) => current,
                    Some(current) if found.accepts(current) => found,
                    Some(current) => {
                        return Err(format!(
                            "column {:?} mixes {} and {} values",
                            name, current, found
                        ))
                    }
                });
            }
        }

        let columns = order
            .into_iter()
            .map(|name| Column {
                data_type: types
                    .get(&name)
                    .copied()
                    .flatten()
                    .unwrap_or(ColumnType::String),
                nullable: true,
                name,
            })
            .collect();
        Ok(Self { columns })
    }

    /// Check that every record fits this schema
    pub fn validate(&self, records: &[Record]) -> Result<(), String> {
        for (row, record) in records.iter().enumerate() {
            for (name, value) in record {
                let column = self
                    .column(name)
                    .ok_or_else(|| format!("row {}: unknown column {:?}", row, name))?;
                if value.is_null() {
                    if !column.nullable {
                        return Err(format!("row {}: column {:?} is not nullable", row, name));
                    }
                    continue;
                }
                let found = ColumnType::of(value)
                    .ok_or_else(|| format!("row {}: column {:?} holds a nested value", row, name))?;
                if !column.data_type.accepts(found) {
                    return Err(format!(
                        "row {}: column {:?} expects {}, got {}",
                        row, name, column.data_type, found
                    ));
                }
            }
            for column in &self.columns {
                if !column.nullable && !record.contains_key(&column.name) {
                    return Err(format!("row {}: missing column {:?}", row, column.name));
                }
            }
        }
        Ok(())
    }

    /// Whether data declared with `other` can be stored under this schema
    ///
    /// Every column of `other` must exist here with an accepted type, and
    /// every required column here must appear in `other`.
    pub fn is_compatible_with(&self, other: &Schema) -> Result<(), String> {
        for column in &other.columns {
            match self.column(&column.name) {
                None => return Err(format!("unexpected column {:?}", column.name)),
                Some(existing) if !existing.data_type.accepts(column.data_type) => {
                    return Err(format!(
                        "column {:?} is {}, got {}",
                        column.name, existing.data_type, column.data_type
                    ))
                }
                Some(existing) if !existing.nullable && column.nullable => {
                    return Err(format!("column {:?} is not nullable", column.name))
                }
                Some(_) => {}
            }
        }
        for column in &self.columns {
            if !column.nullable && !other.contains(&column.name) {
                return Err(format!("missing column {:?}", column.name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
