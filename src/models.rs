use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::error::{DataError, Result};

/// A single typed cell.
///
/// `Value` is totally ordered and hashable (floats compare with
/// `f64::total_cmp`), so it doubles as a group-by and pivot key.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Value {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Date,
    DateTime,
    Int,
    Float,
    Text,
}

impl FieldType {
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Text => "text",
        };
        f.write_str(name)
    }
}

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Date(_) => FieldType::Date,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Int(_) => FieldType::Int,
            Value::Float(_) => FieldType::Float,
            Value::Text(_) => FieldType::Text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(v) => Some(*v),
            Value::DateTime(v) => Some(v.date()),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(v) => Some(*v),
            Value::Date(v) => v.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Date(_) => 0,
            Value::DateTime(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Text(_) => 4,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => signless(*a).total_cmp(&signless(*b)),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// `-0.0` and `0.0` are one key.
fn signless(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Value::Date(v) => v.hash(state),
            Value::DateTime(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => signless(*v).to_bits().hash(state),
            Value::Text(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Value::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(DataError::Schema(format!(
                    "duplicate field `{}`",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Result<(usize, &Field)> {
        self.index_of(name)
            .map(|idx| (idx, &self.fields[idx]))
            .ok_or_else(|| DataError::missing_field(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }
}

/// Immutable, ordered sequence of same-schema records.
///
/// The schema sits behind an `Arc` so derived tables that keep the column
/// layout (filters, sorts, top-N) share it instead of cloning.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    schema: Arc<Schema>,
    rows: Vec<Record>,
}

impl Table {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Result<Self> {
        let mut records = Vec::with_capacity(rows.len());
        for (row_idx, values) in rows.into_iter().enumerate() {
            if values.len() != schema.len() {
                return Err(DataError::Schema(format!(
                    "row {row_idx} has {} values, schema has {} fields",
                    values.len(),
                    schema.len()
                )));
            }
            for (value, field) in values.iter().zip(schema.fields()) {
                if value.field_type() != field.field_type {
                    return Err(DataError::Schema(format!(
                        "row {row_idx}: field `{}` expects {}, got {}",
                        field.name,
                        field.field_type,
                        value.field_type()
                    )));
                }
            }
            records.push(Record { values });
        }

        Ok(Self {
            schema: Arc::new(schema),
            rows: records,
        })
    }

    pub(crate) fn with_rows(&self, rows: Vec<Record>) -> Self {
        Self {
            schema: Arc::clone(&self.schema),
            rows,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn value(&self, row: usize, field: &str) -> Option<&Value> {
        let idx = self.schema.index_of(field)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    pub fn column(&self, field: &str) -> Result<Vec<&Value>> {
        let (idx, _) = self.schema.field(field)?;
        Ok(self.rows.iter().map(|r| &r.values[idx]).collect())
    }

    pub fn numeric_index(&self, field: &str) -> Result<usize> {
        let (idx, f) = self.schema.field(field)?;
        if !f.field_type.is_numeric() {
            return Err(DataError::not_numeric(field));
        }
        Ok(idx)
    }

    pub fn numbers(&self, field: &str) -> Result<Vec<f64>> {
        let idx = self.numeric_index(field)?;
        Ok(self
            .rows
            .iter()
            .filter_map(|r| r.values[idx].as_f64())
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Matrix {
    row_keys: Vec<Value>,
    col_keys: Vec<Value>,
    cells: Vec<Vec<Option<f64>>>,
}

impl Matrix {
    pub(crate) fn new(
        row_keys: Vec<Value>,
        col_keys: Vec<Value>,
        cells: Vec<Vec<Option<f64>>>,
    ) -> Self {
        Self {
            row_keys,
            col_keys,
            cells,
        }
    }

    pub fn row_keys(&self) -> &[Value] {
        &self.row_keys
    }

    pub fn col_keys(&self) -> &[Value] {
        &self.col_keys
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.cells
    }

    /// Cell lookup by key. Unknown keys and empty cells are both `None`.
    pub fn get(&self, row: &Value, col: &Value) -> Option<f64> {
        let r = self.row_keys.iter().position(|k| k == row)?;
        let c = self.col_keys.iter().position(|k| k == col)?;
        self.cells[r][c]
    }

    /// Reorder columns to `order`, dropping keys the matrix does not have.
    pub fn reindex_columns(&self, order: &[Value]) -> Matrix {
        let picks: Vec<usize> = order
            .iter()
            .filter_map(|key| self.col_keys.iter().position(|k| k == key))
            .collect();

        Matrix {
            row_keys: self.row_keys.clone(),
            col_keys: picks.iter().map(|&c| self.col_keys[c].clone()).collect(),
            cells: self
                .cells
                .iter()
                .map(|row| picks.iter().map(|&c| row[c]).collect())
                .collect(),
        }
    }
}
