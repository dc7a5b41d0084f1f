use std::collections::HashSet;
use std::f64::consts::PI;

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike, Weekday};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::debug;

use crate::catalog::TRAFFIC_FIELDS;
use crate::error::{DataError, Result};
use crate::models::{Field, FieldType, Schema, Table, Value};

/// Multiplier applied to the centre of weekend-boosted fields on Saturdays
/// and Sundays.
pub const WEEKEND_BOOST: f64 = 1.2;

/// Gaussian noise is clamped to this many standard deviations.
const NOISE_LIMIT: f64 = 3.0;

/// Diurnal traffic curve: `BASE + AMPLITUDE * sin(hour * pi / 12)`, peaking
/// at 06:00.
const TRAFFIC_BASE: f64 = 100.0;
const TRAFFIC_AMPLITUDE: f64 = 50.0;
const TRAFFIC_NOISE: f64 = 20.0;
pub const TRAFFIC_FLOOR: i64 = 10;

/// How one generated field draws its value.
///
/// Variants that name another field read it from the same row; that field
/// must appear earlier in the row and be numeric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Sampler {
    UniformInt { min: i64, max: i64 },
    Uniform { min: f64, max: f64 },
    /// `mean + noise`, clamped to `[min, max]`.
    Gaussian {
        mean: f64,
        std_dev: f64,
        min: f64,
        max: Option<f64>,
    },
    /// `trunc(mean + noise)`, clamped to `[min, max]`.
    GaussianInt {
        mean: f64,
        std_dev: f64,
        min: i64,
        max: Option<i64>,
    },
    Choice(&'static [&'static str]),
    /// `source * U(min, max)`.
    Scaled {
        source: &'static str,
        min: f64,
        max: f64,
    },
    /// `max(floor, trunc(source * U(min, max)))`.
    ScaledInt {
        source: &'static str,
        min: f64,
        max: f64,
        floor: i64,
    },
    /// `source * randint(min, max)` for an integer source.
    ScaledByInt {
        source: &'static str,
        min: i64,
        max: i64,
    },
    /// `max(0, minuend - subtrahend)` over integer fields.
    Difference {
        minuend: &'static str,
        subtrahend: &'static str,
    },
    /// `numerator / denominator`, or exactly 0 when the denominator is 0.
    Ratio {
        numerator: &'static str,
        denominator: &'static str,
    },
}

impl Sampler {
    pub fn output_type(&self) -> FieldType {
        match self {
            Sampler::UniformInt { .. }
            | Sampler::GaussianInt { .. }
            | Sampler::ScaledInt { .. }
            | Sampler::ScaledByInt { .. }
            | Sampler::Difference { .. } => FieldType::Int,
            Sampler::Uniform { .. }
            | Sampler::Gaussian { .. }
            | Sampler::Scaled { .. }
            | Sampler::Ratio { .. } => FieldType::Float,
            Sampler::Choice(_) => FieldType::Text,
        }
    }

    fn references(&self) -> Vec<&'static str> {
        match *self {
            Sampler::Scaled { source, .. }
            | Sampler::ScaledInt { source, .. }
            | Sampler::ScaledByInt { source, .. } => vec![source],
            Sampler::Difference {
                minuend,
                subtrahend,
            } => vec![minuend, subtrahend],
            Sampler::Ratio {
                numerator,
                denominator,
            } => vec![numerator, denominator],
            _ => Vec::new(),
        }
    }

    fn check_bounds(&self, field: &str) -> Result<()> {
        let ok = match *self {
            Sampler::UniformInt { min, max } | Sampler::ScaledByInt { min, max, .. } => min <= max,
            Sampler::Uniform { min, max }
            | Sampler::Scaled { min, max, .. }
            | Sampler::ScaledInt { min, max, .. } => {
                min.is_finite() && max.is_finite() && min <= max
            }
            Sampler::Gaussian {
                mean,
                std_dev,
                min,
                max,
            } => {
                mean.is_finite()
                    && std_dev.is_finite()
                    && std_dev >= 0.0
                    && max.map_or(true, |max| min <= max)
            }
            Sampler::GaussianInt {
                mean,
                std_dev,
                min,
                max,
            } => {
                mean.is_finite()
                    && std_dev.is_finite()
                    && std_dev >= 0.0
                    && max.map_or(true, |max| min <= max)
            }
            Sampler::Choice(labels) => !labels.is_empty(),
            Sampler::Difference { .. } | Sampler::Ratio { .. } => true,
        };

        if ok {
            Ok(())
        } else {
            Err(DataError::InvalidParameter(format!(
                "field `{field}` has invalid bounds: {self:?}"
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub sampler: Sampler,
    pub decimals: Option<u32>,
    pub weekend_boosted: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, sampler: Sampler) -> Self {
        Self {
            name,
            sampler,
            decimals: None,
            weekend_boosted: false,
        }
    }

    pub const fn rounded(self, decimals: u32) -> Self {
        Self {
            decimals: Some(decimals),
            ..self
        }
    }

    /// Multiply the gaussian centre by [`WEEKEND_BOOST`] on weekend rows.
    /// Other samplers ignore the flag.
    pub const fn weekend_boosted(self) -> Self {
        Self {
            weekend_boosted: true,
            ..self
        }
    }
}

/// A fixed category row: its identity columns plus optional per-category
/// sampler overrides.
pub trait Category {
    fn identity(&self) -> Vec<(&'static str, Value)>;

    /// Must be unique within one category list.
    fn key(&self) -> Value;

    fn sampler_for(&self, _field: &str) -> Option<Sampler> {
        None
    }
}

struct Planned {
    spec: FieldSpec,
    refs: Vec<usize>,
}

struct RowPlan {
    schema: Schema,
    fields: Vec<Planned>,
}

fn plan(leading: Vec<Field>, specs: &[FieldSpec]) -> Result<RowPlan> {
    let mut fields = leading;
    let mut planned = Vec::with_capacity(specs.len());

    for spec in specs {
        spec.sampler.check_bounds(spec.name)?;

        let mut refs = Vec::new();
        for source in spec.sampler.references() {
            let idx = fields
                .iter()
                .position(|f| f.name == source)
                .ok_or_else(|| {
                    DataError::InvalidParameter(format!(
                        "field `{}` references `{source}`, which is not an earlier field",
                        spec.name
                    ))
                })?;
            let source_type = fields[idx].field_type;
            let wants_int = matches!(
                spec.sampler,
                Sampler::Difference { .. } | Sampler::ScaledByInt { .. }
            );
            if !source_type.is_numeric() || (wants_int && source_type != FieldType::Int) {
                return Err(DataError::InvalidParameter(format!(
                    "field `{}` cannot derive from `{source}` of type {source_type}",
                    spec.name
                )));
            }
            refs.push(idx);
        }

        fields.push(Field::new(spec.name, spec.sampler.output_type()));
        planned.push(Planned { spec: *spec, refs });
    }

    let schema = Schema::new(fields).map_err(|e| DataError::InvalidParameter(e.to_string()))?;
    Ok(RowPlan {
        schema,
        fields: planned,
    })
}

fn round_to(value: f64, decimals: Option<u32>) -> f64 {
    match decimals {
        Some(d) => {
            let factor = 10f64.powi(d as i32);
            (value * factor).round() / factor
        }
        None => value,
    }
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn check_days(days: i64) -> Result<usize> {
    usize::try_from(days)
        .map_err(|_| DataError::InvalidParameter(format!("day count must be >= 0, got {days}")))
}

pub struct Generator<R = SmallRng> {
    rng: R,
    now: NaiveDateTime,
}

impl Generator<SmallRng> {
    pub fn from_entropy() -> Self {
        Self::new(SmallRng::from_entropy(), Local::now().naive_local())
    }
}

impl<R: Rng> Generator<R> {
    pub fn new(rng: R, now: NaiveDateTime) -> Self {
        Self { rng, now }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    /// Standard normal draw clamped to +/- [`NOISE_LIMIT`].
    fn noise(&mut self) -> f64 {
        let z: f64 = self.rng.sample(StandardNormal);
        z.clamp(-NOISE_LIMIT, NOISE_LIMIT)
    }

    fn sample(&mut self, sampler: &Sampler, refs: &[usize], row: &[Value], boost: f64) -> Value {
        let num = |i: usize| row[refs[i]].as_f64().unwrap_or(0.0);
        let int = |i: usize| row[refs[i]].as_i64().unwrap_or(0);

        match *sampler {
            Sampler::UniformInt { min, max } => Value::Int(self.rng.gen_range(min..=max)),
            Sampler::Uniform { min, max } => Value::Float(self.rng.gen_range(min..=max)),
            Sampler::Gaussian {
                mean,
                std_dev,
                min,
                max,
            } => {
                let v = (mean * boost + std_dev * self.noise()).max(min);
                Value::Float(max.map_or(v, |max| v.min(max)))
            }
            Sampler::GaussianInt {
                mean,
                std_dev,
                min,
                max,
            } => {
                let v = ((mean * boost + std_dev * self.noise()).trunc() as i64).max(min);
                Value::Int(max.map_or(v, |max| v.min(max)))
            }
            Sampler::Choice(labels) => {
                Value::from(labels[self.rng.gen_range(0..labels.len())])
            }
            Sampler::Scaled { min, max, .. } => {
                Value::Float(num(0) * self.rng.gen_range(min..=max))
            }
            Sampler::ScaledInt {
                min, max, floor, ..
            } => {
                let v = (num(0) * self.rng.gen_range(min..=max)).trunc() as i64;
                Value::Int(v.max(floor))
            }
            Sampler::ScaledByInt { min, max, .. } => {
                Value::Int(int(0) * self.rng.gen_range(min..=max))
            }
            Sampler::Difference { .. } => Value::Int((int(0) - int(1)).max(0)),
            Sampler::Ratio { .. } => {
                let denominator = num(1);
                if denominator == 0.0 {
                    Value::Float(0.0)
                } else {
                    Value::Float(num(0) / denominator)
                }
            }
        }
    }

    fn fill(&mut self, plan: &RowPlan, row: &mut Vec<Value>, weekend: bool) {
        for field in &plan.fields {
            let boost = if weekend && field.spec.weekend_boosted {
                WEEKEND_BOOST
            } else {
                1.0
            };
            let value = match self.sample(&field.spec.sampler, &field.refs, row, boost) {
                Value::Float(v) => Value::Float(round_to(v, field.spec.decimals)),
                other => other,
            };
            row.push(value);
        }
    }

    fn date_range(&self, days: i64) -> Result<Vec<NaiveDate>> {
        let count = check_days(days)?;
        let start = Duration::try_days(days)
            .and_then(|span| self.today().checked_sub_signed(span))
            .ok_or_else(|| {
                DataError::InvalidParameter(format!("day count {days} is out of range"))
            })?;
        Ok(start.iter_days().take(count + 1).collect())
    }

    /// One row per calendar day from `today - days` to `today` inclusive.
    pub fn daily(&mut self, days: i64, fields: &[FieldSpec]) -> Result<Table> {
        let dates = self.date_range(days)?;
        let plan = plan(vec![Field::new("date", FieldType::Date)], fields)?;

        let mut rows = Vec::with_capacity(dates.len());
        for date in dates {
            let mut row = Vec::with_capacity(plan.schema.len());
            row.push(Value::Date(date));
            self.fill(&plan, &mut row, is_weekend(date));
            rows.push(row);
        }

        debug!(days, rows = rows.len(), "generated daily table");
        Table::new(plan.schema, rows)
    }

    /// One row per day per label, days outermost.
    pub fn daily_by_category(
        &mut self,
        days: i64,
        key_field: &'static str,
        labels: &[&str],
        fields: &[FieldSpec],
    ) -> Result<Table> {
        if labels.is_empty() {
            return Err(DataError::InvalidParameter(format!(
                "`{key_field}` category list is empty"
            )));
        }
        let dates = self.date_range(days)?;
        let plan = plan(
            vec![
                Field::new("date", FieldType::Date),
                Field::new(key_field, FieldType::Text),
            ],
            fields,
        )?;

        let mut rows = Vec::with_capacity(dates.len() * labels.len());
        for date in dates {
            for label in labels {
                let mut row = Vec::with_capacity(plan.schema.len());
                row.push(Value::Date(date));
                row.push(Value::from(*label));
                self.fill(&plan, &mut row, is_weekend(date));
                rows.push(row);
            }
        }

        debug!(days, key_field, rows = rows.len(), "generated daily category table");
        Table::new(plan.schema, rows)
    }

    pub fn hourly(&mut self, days: i64) -> Result<Table> {
        self.hourly_with(days, TRAFFIC_FIELDS)
    }

    /// One row per hour from `now - days` to `now`, with a diurnal `traffic`
    /// column followed by `fields`.
    pub fn hourly_with(&mut self, days: i64, fields: &[FieldSpec]) -> Result<Table> {
        let count = check_days(days)?
            .checked_mul(24)
            .ok_or_else(|| {
                DataError::InvalidParameter(format!("day count {days} is out of range"))
            })?;
        let end = self
            .now
            .date()
            .and_hms_opt(self.now.hour(), 0, 0)
            .unwrap_or(self.now);
        let start = Duration::try_days(days)
            .and_then(|span| end.checked_sub_signed(span))
            .ok_or_else(|| {
                DataError::InvalidParameter(format!("day count {days} is out of range"))
            })?;

        let plan = plan(
            vec![
                Field::new("datetime", FieldType::DateTime),
                Field::new("date", FieldType::Date),
                Field::new("hour", FieldType::Int),
                Field::new("traffic", FieldType::Int),
            ],
            fields,
        )?;

        let mut rows = Vec::with_capacity(count + 1);
        for offset in 0..=count as i64 {
            let at = start + Duration::hours(offset);
            let hour = at.hour();
            let traffic = self.diurnal_traffic(hour);

            let mut row = Vec::with_capacity(plan.schema.len());
            row.push(Value::DateTime(at));
            row.push(Value::Date(at.date()));
            row.push(Value::Int(i64::from(hour)));
            row.push(Value::Int(traffic));
            self.fill(&plan, &mut row, is_weekend(at.date()));
            rows.push(row);
        }

        debug!(days, rows = rows.len(), "generated hourly table");
        Table::new(plan.schema, rows)
    }

    fn diurnal_traffic(&mut self, hour: u32) -> i64 {
        let base = TRAFFIC_BASE + TRAFFIC_AMPLITUDE * (f64::from(hour) * PI / 12.0).sin();
        ((base + TRAFFIC_NOISE * self.noise()).trunc() as i64).max(TRAFFIC_FLOOR)
    }

    /// One row per category: identity columns, then `metrics`.
    pub fn categorical<C: Category>(
        &mut self,
        categories: &[C],
        metrics: &[FieldSpec],
    ) -> Result<Table> {
        let first = categories
            .first()
            .ok_or_else(|| DataError::InvalidParameter("category list is empty".to_string()))?
            .identity();
        let leading: Vec<Field> = first
            .iter()
            .map(|(name, value)| Field::new(*name, value.field_type()))
            .collect();
        let plan = plan(leading, metrics)?;

        // Resolve every category's identity and overrides before drawing.
        let mut resolved = Vec::with_capacity(categories.len());
        let mut seen = HashSet::new();
        for category in categories {
            let identity = category.identity();
            let same_layout = identity.len() == first.len()
                && identity
                    .iter()
                    .zip(&first)
                    .all(|((n, v), (fn_, fv))| n == fn_ && v.field_type() == fv.field_type());
            if !same_layout {
                return Err(DataError::InvalidParameter(
                    "categories do not share one identity layout".to_string(),
                ));
            }

            let mut overrides = Vec::with_capacity(plan.fields.len());
            for field in &plan.fields {
                let sampler = category.sampler_for(field.spec.name);
                if let Some(sampler) = &sampler {
                    sampler.check_bounds(field.spec.name)?;
                    if sampler.output_type() != field.spec.sampler.output_type()
                        || !sampler.references().is_empty()
                    {
                        return Err(DataError::InvalidParameter(format!(
                            "override for `{}` must be a standalone {} sampler",
                            field.spec.name,
                            field.spec.sampler.output_type()
                        )));
                    }
                }
                overrides.push(sampler);
            }
            let key = category.key();
            if !seen.insert(key.clone()) {
                return Err(DataError::InvalidParameter(format!(
                    "duplicate category `{key}` in list"
                )));
            }
            resolved.push((identity, overrides));
        }

        let mut rows = Vec::with_capacity(resolved.len());
        for (identity, overrides) in resolved {

            let mut row: Vec<Value> = identity.into_iter().map(|(_, v)| v).collect();
            for (field, sampler) in plan.fields.iter().zip(overrides) {
                let sampler = sampler.unwrap_or(field.spec.sampler);
                let value = match self.sample(&sampler, &field.refs, &row, 1.0) {
                    Value::Float(v) => Value::Float(round_to(v, field.spec.decimals)),
                    other => other,
                };
                row.push(value);
            }
            rows.push(row);
        }

        debug!(rows = rows.len(), "generated categorical table");
        Table::new(plan.schema, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 15)
            .unwrap()
            .and_hms_opt(14, 37, 12)
            .unwrap()
    }

    fn seeded(seed: u64) -> Generator {
        Generator::new(SmallRng::seed_from_u64(seed), anchor())
    }

    const RATE_FIELDS: &[FieldSpec] = &[
        FieldSpec::new(
            "spend",
            Sampler::Uniform {
                min: 100.0,
                max: 1000.0,
            },
        ),
        FieldSpec::new(
            "clicks",
            Sampler::ScaledInt {
                source: "spend",
                min: 0.0,
                max: 0.0,
                floor: 0,
            },
        ),
        FieldSpec::new(
            "cpc",
            Sampler::Ratio {
                numerator: "spend",
                denominator: "clicks",
            },
        ),
    ];

    #[test]
    fn daily_covers_every_day_inclusive() {
        let table = seeded(1).daily(30, RATE_FIELDS).unwrap();
        assert_eq!(table.len(), 31);

        let dates: Vec<NaiveDate> = table
            .column("date")
            .unwrap()
            .into_iter()
            .filter_map(Value::as_date)
            .collect();
        assert_eq!(dates.first().copied(), NaiveDate::from_ymd_opt(2026, 9, 15));
        assert_eq!(dates.last().copied(), Some(anchor().date()));
        for pair in dates.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::days(1));
        }
    }

    #[test]
    fn zero_days_yields_today_only() {
        let table = seeded(2).daily(0, RATE_FIELDS).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn negative_days_is_invalid() {
        let err = seeded(3).daily(-1, RATE_FIELDS).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
        assert!(matches!(
            seeded(3).hourly(-5),
            Err(DataError::InvalidParameter(_))
        ));
    }

    #[test]
    fn ratio_is_zero_when_denominator_is_zero() {
        let table = seeded(4).daily(10, RATE_FIELDS).unwrap();
        for value in table.column("cpc").unwrap() {
            assert_eq!(value, &Value::Float(0.0));
        }
    }

    #[test]
    fn references_must_point_backwards() {
        let specs = [FieldSpec::new(
            "revenue",
            Sampler::Scaled {
                source: "sales",
                min: 1.0,
                max: 2.0,
            },
        )];
        let err = seeded(5).daily(3, &specs).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let specs = [FieldSpec::new("sales", Sampler::UniformInt { min: 10, max: 1 })];
        assert!(matches!(
            seeded(6).daily(3, &specs),
            Err(DataError::InvalidParameter(_))
        ));
    }

    #[test]
    fn rounding_applies_to_floats() {
        let specs = [FieldSpec::new(
            "revenue",
            Sampler::Uniform {
                min: 1.0,
                max: 2.0,
            },
        )
        .rounded(2)];
        let table = seeded(7).daily(20, &specs).unwrap();
        for v in table.numbers("revenue").unwrap() {
            assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn hourly_has_one_row_per_hour() {
        let table = seeded(8).hourly(2).unwrap();
        assert_eq!(table.len(), 2 * 24 + 1);

        let first = table.value(0, "datetime").and_then(Value::as_datetime).unwrap();
        let last = table
            .value(table.len() - 1, "datetime")
            .and_then(Value::as_datetime)
            .unwrap();
        assert_eq!(last - first, Duration::days(2));
        assert_eq!(last.minute(), 0);
        assert_eq!(last.hour(), 14);
    }

    #[test]
    fn hourly_traffic_peaks_in_the_morning() {
        let table = seeded(9).hourly(30).unwrap();
        let mut sums = [0.0; 24];
        let mut counts = [0.0; 24];
        for row in 0..table.len() {
            let hour = table.value(row, "hour").and_then(Value::as_i64).unwrap() as usize;
            let traffic = table.value(row, "traffic").and_then(Value::as_f64).unwrap();
            assert!(traffic >= TRAFFIC_FLOOR as f64);
            sums[hour] += traffic;
            counts[hour] += 1.0;
        }
        let at = |h: usize| sums[h] / counts[h];
        assert!(at(6) > at(0));
        assert!(at(6) > at(18));
        assert!(at(12) > at(18));
    }

    struct Label(&'static str);

    impl Category for Label {
        fn identity(&self) -> Vec<(&'static str, Value)> {
            vec![("label", Value::from(self.0))]
        }

        fn key(&self) -> Value {
            Value::from(self.0)
        }
    }

    #[test]
    fn categorical_rejects_empty_list() {
        let categories: [Label; 0] = [];
        let err = seeded(10).categorical(&categories, RATE_FIELDS).unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
    }

    #[test]
    fn categorical_rejects_duplicates() {
        let err = seeded(11)
            .categorical(&[Label("a"), Label("a")], RATE_FIELDS)
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidParameter(_)));
    }

    #[test]
    fn daily_by_category_crosses_days_and_labels() {
        let table = seeded(12)
            .daily_by_category(6, "channel", &["Email", "SEO", "Direct"], RATE_FIELDS)
            .unwrap();
        assert_eq!(table.len(), 7 * 3);
        assert_eq!(table.value(4, "channel"), Some(&Value::from("SEO")));
    }
}
