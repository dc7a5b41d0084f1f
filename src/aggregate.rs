use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDateTime, Weekday};
use tracing::debug;

use crate::error::{DataError, Result};
use crate::models::{Field, FieldType, Matrix, Record, Schema, Table, Value};

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    fn apply(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let result = match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Sum => values.iter().sum(),
            Aggregation::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Count => values.len() as f64,
        };
        Some(result)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    Aggregation::Mean.apply(values)
}

fn buckets<'a>(
    table: &'a Table,
    key_field: &str,
    value_field: &str,
) -> Result<(Field, BTreeMap<Value, Vec<&'a Value>>)> {
    let (key_idx, key) = table.schema().field(key_field)?;
    let key = key.clone();
    let value_idx = table.numeric_index(value_field)?;

    let mut groups: BTreeMap<Value, Vec<&Value>> = BTreeMap::new();
    for row in table.rows() {
        let values = row.values();
        groups
            .entry(values[key_idx].clone())
            .or_default()
            .push(&values[value_idx]);
    }
    Ok((key, groups))
}

pub fn group_by_mean(table: &Table, key_field: &str, value_field: &str) -> Result<Table> {
    let (key, groups) = buckets(table, key_field, value_field)?;
    let schema = Schema::new(vec![key, Field::new(value_field, FieldType::Float)])?;

    let rows = groups
        .into_iter()
        .map(|(k, values)| {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
            vec![k, Value::Float(mean(&numbers).unwrap_or(0.0))]
        })
        .collect();

    debug!(key_field, value_field, "grouped by mean");
    Table::new(schema, rows)
}

/// Sum of `value_field` per distinct `key_field`, keys ascending. Integer
/// columns sum to integers.
pub fn group_by_sum(table: &Table, key_field: &str, value_field: &str) -> Result<Table> {
    let (key, groups) = buckets(table, key_field, value_field)?;
    let value_type = table.schema().field(value_field)?.1.field_type;
    let schema = Schema::new(vec![key, Field::new(value_field, value_type)])?;

    let rows = groups
        .into_iter()
        .map(|(k, values)| {
            let total = match value_type {
                FieldType::Int => Value::Int(values.iter().filter_map(|v| v.as_i64()).sum()),
                _ => Value::Float(values.iter().filter_map(|v| v.as_f64()).sum()),
            };
            vec![k, total]
        })
        .collect();

    debug!(key_field, value_field, "grouped by sum");
    Table::new(schema, rows)
}

/// Trailing mean over `window` rows. Positions without a full window are
/// `None`.
pub fn rolling_mean(table: &Table, value_field: &str, window: usize) -> Result<Vec<Option<f64>>> {
    if window == 0 {
        return Err(DataError::Schema(
            "rolling window must be at least 1".to_string(),
        ));
    }
    let values = table.numbers(value_field)?;

    Ok((0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                mean(&values[i + 1 - window..=i])
            }
        })
        .collect())
}

/// Cross-tabulate `value_field` by two key fields. Axes are sorted
/// ascending; combinations absent from the input are `None`.
pub fn pivot(
    table: &Table,
    value_field: &str,
    row_key_field: &str,
    col_key_field: &str,
    agg: Aggregation,
) -> Result<Matrix> {
    let (row_idx, _) = table.schema().field(row_key_field)?;
    let (col_idx, _) = table.schema().field(col_key_field)?;
    let value_idx = table.numeric_index(value_field)?;

    let mut cells: BTreeMap<(Value, Value), Vec<f64>> = BTreeMap::new();
    let mut row_keys = BTreeSet::new();
    let mut col_keys = BTreeSet::new();
    for row in table.rows() {
        let values = row.values();
        let (r, c) = (values[row_idx].clone(), values[col_idx].clone());
        row_keys.insert(r.clone());
        col_keys.insert(c.clone());
        if let Some(v) = values[value_idx].as_f64() {
            cells.entry((r, c)).or_default().push(v);
        }
    }

    let row_keys: Vec<Value> = row_keys.into_iter().collect();
    let col_keys: Vec<Value> = col_keys.into_iter().collect();
    let grid = row_keys
        .iter()
        .map(|r| {
            col_keys
                .iter()
                .map(|c| {
                    cells
                        .get(&(r.clone(), c.clone()))
                        .and_then(|values| agg.apply(values))
                })
                .collect()
        })
        .collect();

    debug!(
        value_field,
        rows = row_keys.len(),
        cols = col_keys.len(),
        "pivoted table"
    );
    Ok(Matrix::new(row_keys, col_keys, grid))
}

/// Stable sort on `field`. Ties keep their original relative order in both
/// directions.
pub fn sort_by(table: &Table, field: &str, descending: bool) -> Result<Table> {
    let (idx, _) = table.schema().field(field)?;
    let mut rows: Vec<Record> = table.rows().to_vec();
    rows.sort_by(|a, b| {
        let ord = a.values()[idx].cmp(&b.values()[idx]);
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
    Ok(table.with_rows(rows))
}

/// The `n` rows with the largest (or smallest) `sort_field`. `n` larger
/// than the table returns every row.
pub fn top_n(table: &Table, n: usize, sort_field: &str, descending: bool) -> Result<Table> {
    let sorted = sort_by(table, sort_field, descending)?;
    let rows = sorted.rows().iter().take(n).cloned().collect();
    Ok(table.with_rows(rows))
}

pub fn filter_threshold(table: &Table, field: &str, min_value: f64) -> Result<Table> {
    let idx = table.numeric_index(field)?;
    let rows = table
        .rows()
        .iter()
        .filter(|row| row.values()[idx].as_f64().is_some_and(|v| v >= min_value))
        .cloned()
        .collect();
    Ok(table.with_rows(rows))
}

pub fn filter_since(table: &Table, field: &str, cutoff: NaiveDateTime) -> Result<Table> {
    let (idx, f) = table.schema().field(field)?;
    if !matches!(f.field_type, FieldType::Date | FieldType::DateTime) {
        return Err(DataError::Schema(format!("field `{field}` is not a date")));
    }
    let rows = table
        .rows()
        .iter()
        .filter(|row| {
            row.values()[idx]
                .as_datetime()
                .is_some_and(|at| at >= cutoff)
        })
        .cloned()
        .collect();
    Ok(table.with_rows(rows))
}

pub fn tail(table: &Table, n: usize) -> Table {
    let start = table.len().saturating_sub(n);
    table.with_rows(table.rows()[start..].to_vec())
}

pub fn select(table: &Table, fields: &[&str]) -> Result<Table> {
    let mut picks = Vec::with_capacity(fields.len());
    let mut schema = Vec::with_capacity(fields.len());
    for name in fields {
        let (idx, field) = table.schema().field(name)?;
        picks.push(idx);
        schema.push(field.clone());
    }

    let rows = table
        .rows()
        .iter()
        .map(|row| picks.iter().map(|&i| row.values()[i].clone()).collect())
        .collect();
    Table::new(Schema::new(schema)?, rows)
}

/// Append a computed column. `f` must return values of `field_type`.
pub fn derive<F>(table: &Table, name: &str, field_type: FieldType, f: F) -> Result<Table>
where
    F: Fn(&Record) -> Value,
{
    let mut fields = table.schema().fields().to_vec();
    fields.push(Field::new(name, field_type));

    let rows = table
        .rows()
        .iter()
        .map(|row| {
            let mut values = row.values().to_vec();
            values.push(f(row));
            values
        })
        .collect();
    Table::new(Schema::new(fields)?, rows)
}

pub fn column_sum(table: &Table, field: &str) -> Result<f64> {
    Ok(table.numbers(field)?.iter().sum())
}

pub fn column_mean(table: &Table, field: &str) -> Result<Option<f64>> {
    Ok(mean(&table.numbers(field)?))
}

/// Share of `goal` reached, capped at 1. A non-positive goal counts as met.
pub fn goal_progress(value: f64, goal: f64) -> f64 {
    if goal <= 0.0 {
        return 1.0;
    }
    (value / goal).clamp(0.0, 1.0)
}

fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[day.num_days_from_monday() as usize]
}

/// Mean traffic by hour of day (rows) and weekday (columns, Monday first).
pub fn weekday_heatmap(traffic: &Table, value_field: &str) -> Result<Matrix> {
    let (at_idx, at) = traffic.schema().field("datetime")?;
    if at.field_type != FieldType::DateTime {
        return Err(DataError::Schema("field `datetime` is not a datetime".to_string()));
    }

    let with_day = derive(traffic, "weekday", FieldType::Text, |row| {
        let day = row.values()[at_idx]
            .as_datetime()
            .map(|at| weekday_name(at.weekday()))
            .unwrap_or_default();
        Value::from(day)
    })?;
    let matrix = pivot(&with_day, value_field, "hour", "weekday", Aggregation::Mean)?;

    let order: Vec<Value> = WEEKDAYS.iter().map(|d| Value::from(*d)).collect();
    Ok(matrix.reindex_columns(&order))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn revenue_table(values: &[f64]) -> Table {
        let schema = Schema::new(vec![
            Field::new("country", FieldType::Text),
            Field::new("revenue", FieldType::Float),
        ])
        .unwrap();
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| vec![Value::from(format!("c{i}")), Value::Float(*v)])
            .collect();
        Table::new(schema, rows).unwrap()
    }

    fn cells(rows: &[(&str, i64, f64)]) -> Table {
        let schema = Schema::new(vec![
            Field::new("day", FieldType::Text),
            Field::new("hour", FieldType::Int),
            Field::new("traffic", FieldType::Float),
        ])
        .unwrap();
        let rows = rows
            .iter()
            .map(|(d, h, v)| vec![Value::from(*d), Value::Int(*h), Value::Float(*v)])
            .collect();
        Table::new(schema, rows).unwrap()
    }

    #[test]
    fn signed_zero_keys_share_a_group() {
        let schema = Schema::new(vec![
            Field::new("delta", FieldType::Float),
            Field::new("visitors", FieldType::Int),
        ])
        .unwrap();
        let rows = [(-0.0, 3), (0.0, 4), (1.5, 10)]
            .iter()
            .map(|(k, v)| vec![Value::Float(*k), Value::Int(*v)])
            .collect();
        let table = Table::new(schema, rows).unwrap();

        let sums = group_by_sum(&table, "delta", "visitors").unwrap();
        assert_eq!(sums.len(), 2);
        assert_eq!(sums.value(0, "visitors"), Some(&Value::Int(7)));
    }

    #[test]
    fn rolling_mean_waits_for_a_full_window() {
        let table = revenue_table(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let means = rolling_mean(&table, "revenue", 3).unwrap();
        assert_eq!(
            means,
            vec![
                None,
                None,
                Some(2.0),
                Some(3.0),
                Some(4.0),
                Some(5.0),
                Some(6.0),
                Some(7.0)
            ]
        );

        let weekly = rolling_mean(&table, "revenue", 7).unwrap();
        assert!(weekly[..6].iter().all(Option::is_none));
        assert_eq!(weekly[6], Some(4.0));
        assert_eq!(weekly[7], Some(5.0));
    }

    #[test]
    fn rolling_mean_rejects_empty_window() {
        let table = revenue_table(&[1.0]);
        assert!(matches!(
            rolling_mean(&table, "revenue", 0),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn top_n_is_stable_on_ties() {
        let table = revenue_table(&[10.0, 50.0, 30.0, 50.0, 5.0]);
        let top = top_n(&table, 3, "revenue", true).unwrap();
        let countries: Vec<String> = top
            .column("country")
            .unwrap()
            .into_iter()
            .map(|v| v.to_string())
            .collect();
        assert_eq!(countries, vec!["c1", "c3", "c2"]);
    }

    #[test]
    fn top_n_clamps_to_row_count() {
        let table = revenue_table(&[1.0, 2.0]);
        let top = top_n(&table, 10, "revenue", false).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top.value(0, "revenue"), Some(&Value::Float(1.0)));
    }

    #[test]
    fn filter_threshold_keeps_order_and_is_idempotent() {
        let table = revenue_table(&[10.0, 50.0, 30.0, 50.0, 5.0]);
        let once = filter_threshold(&table, "revenue", 30.0).unwrap();
        assert_eq!(once.numbers("revenue").unwrap(), vec![50.0, 30.0, 50.0]);
        let twice = filter_threshold(&once, "revenue", 30.0).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn group_by_sums_and_means() {
        let table = cells(&[
            ("Mon", 1, 10.0),
            ("Tue", 1, 20.0),
            ("Mon", 2, 30.0),
            ("Mon", 1, 50.0),
        ]);

        let sums = group_by_sum(&table, "day", "traffic").unwrap();
        assert_eq!(sums.len(), 2);
        assert_eq!(sums.value(0, "day"), Some(&Value::from("Mon")));
        assert_eq!(sums.value(0, "traffic"), Some(&Value::Float(90.0)));

        let means = group_by_mean(&table, "hour", "traffic").unwrap();
        assert_eq!(means.value(0, "hour"), Some(&Value::Int(1)));
        assert_eq!(means.value(0, "traffic"), Some(&Value::Float(80.0 / 3.0)));
        assert_eq!(means.value(1, "traffic"), Some(&Value::Float(30.0)));

        let counts = group_by_sum(&table, "day", "hour").unwrap();
        assert_eq!(counts.value(0, "hour"), Some(&Value::Int(4)));
    }

    #[test]
    fn group_by_rejects_unknown_or_text_fields() {
        let table = cells(&[("Mon", 1, 10.0)]);
        assert!(matches!(
            group_by_mean(&table, "week", "traffic"),
            Err(DataError::Schema(_))
        ));
        assert!(matches!(
            group_by_sum(&table, "hour", "day"),
            Err(DataError::Schema(_))
        ));
        assert!(matches!(
            pivot(&table, "traffic", "hour", "month", Aggregation::Mean),
            Err(DataError::Schema(_))
        ));
    }

    #[test]
    fn pivot_leaves_missing_cells_empty() {
        let table = cells(&[("Mon", 1, 10.0), ("Tue", 2, 20.0), ("Mon", 2, 5.0)]);
        let matrix = pivot(&table, "traffic", "hour", "day", Aggregation::Sum).unwrap();

        assert_eq!(matrix.get(&Value::Int(1), &Value::from("Mon")), Some(10.0));
        assert_eq!(matrix.get(&Value::Int(2), &Value::from("Tue")), Some(20.0));
        assert_eq!(matrix.get(&Value::Int(2), &Value::from("Mon")), Some(5.0));
        assert_eq!(matrix.get(&Value::Int(1), &Value::from("Tue")), None);
        assert_eq!(matrix.get(&Value::Int(9), &Value::from("Mon")), None);
    }

    #[test]
    fn pivot_counts_duplicates() {
        let table = cells(&[("Mon", 1, 10.0), ("Mon", 1, 20.0)]);
        let counted = pivot(&table, "traffic", "hour", "day", Aggregation::Count).unwrap();
        assert_eq!(counted.get(&Value::Int(1), &Value::from("Mon")), Some(2.0));
        let max = pivot(&table, "traffic", "hour", "day", Aggregation::Max).unwrap();
        assert_eq!(max.get(&Value::Int(1), &Value::from("Mon")), Some(20.0));
    }

    #[test]
    fn tail_and_select_reshape() {
        let table = revenue_table(&[1.0, 2.0, 3.0]);
        let last = tail(&table, 2);
        assert_eq!(last.numbers("revenue").unwrap(), vec![2.0, 3.0]);
        assert_eq!(tail(&table, 10).len(), 3);

        let only = select(&table, &["revenue"]).unwrap();
        assert_eq!(only.schema().len(), 1);
        assert!(select(&table, &["visitors"]).is_err());
    }

    #[test]
    fn filter_since_cuts_on_dates() {
        let schema = Schema::new(vec![Field::new("date", FieldType::Date)]).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let rows = start.iter_days().take(10).map(|d| vec![Value::Date(d)]).collect();
        let table = Table::new(schema, rows).unwrap();

        let cutoff = NaiveDate::from_ymd_opt(2026, 1, 8)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(filter_since(&table, "date", cutoff).unwrap().len(), 3);
    }

    #[test]
    fn goal_progress_caps_at_one() {
        assert_eq!(goal_progress(1000.0, 2000.0), 0.5);
        assert_eq!(goal_progress(5000.0, 2000.0), 1.0);
        assert_eq!(goal_progress(10.0, 0.0), 1.0);
    }

    #[test]
    fn heatmap_orders_weekdays_from_monday() {
        let schema = Schema::new(vec![
            Field::new("datetime", FieldType::DateTime),
            Field::new("hour", FieldType::Int),
            Field::new("traffic", FieldType::Int),
        ])
        .unwrap();
        // 2026-10-11 is a Sunday, 2026-10-12 a Monday.
        let sunday = NaiveDate::from_ymd_opt(2026, 10, 11)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let monday = sunday + chrono::Duration::days(1);
        let table = Table::new(
            schema,
            vec![
                vec![Value::DateTime(sunday), Value::Int(6), Value::Int(40)],
                vec![Value::DateTime(monday), Value::Int(6), Value::Int(80)],
            ],
        )
        .unwrap();

        let heatmap = weekday_heatmap(&table, "traffic").unwrap();
        assert_eq!(
            heatmap.col_keys(),
            &[Value::from("Monday"), Value::from("Sunday")]
        );
        assert_eq!(heatmap.rows()[0], vec![Some(80.0), Some(40.0)]);
    }
}
