//! The closed set of statistical reducers.
//!
//! Both [`AggregateOperator`] and [`AnalyticOperator`] run on the same
//! [`Accumulator`]: values are folded in with [`Accumulator::accumulate`],
//! partial states from independent slices are merged with
//! [`Accumulator::combine`], and the operator turns the final state into a
//! value. Nulls are skipped by every reducer except COUNT.
//!
//! Every combine is associative, so a sequence split at any point and
//! reduced on the rayon pool gives the same result as a sequential pass.
//! The order-sensitive reducers (FIRST_VALUE, LAST_VALUE) rely on rayon
//! combining adjacent slices in order.

use std::cmp::Ordering;
use std::fmt;

use rayon::prelude::*;

use crate::config;
use crate::dataset::DataPoint;
use crate::domain::Domain;
use crate::error::{Result, VtlError};
use crate::lineage::LineageGroup;
use crate::structure::DataStructureComponent;
use crate::value::ScalarValue;

// ------------- VarianceState -------------
/// Running count, mean and sum of squared deviations (Welford).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VarianceState {
    count: f64,
    mean: f64,
    m2: f64,
}

impl VarianceState {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn of(values: &[f64]) -> Self {
        values.iter().fold(Self::new(), |mut state, &x| {
            state.push(x);
            state
        })
    }
    pub fn push(&mut self, x: f64) {
        self.count += 1.0;
        let delta = x - self.mean;
        self.mean += delta / self.count;
        self.m2 += delta * (x - self.mean);
    }
    /// Chan's parallel formula for merging two partial states.
    pub fn merge(self, other: VarianceState) -> VarianceState {
        if other.count == 0.0 {
            return self;
        }
        if self.count == 0.0 {
            return other;
        }
        let delta = other.mean - self.mean;
        let count = self.count + other.count;
        VarianceState {
            count,
            mean: self.mean + delta * other.count / count,
            m2: self.m2 + other.m2 + delta * delta * self.count * other.count / count,
        }
    }
    pub fn count(&self) -> f64 {
        self.count
    }
    pub fn mean(&self) -> f64 {
        self.mean
    }
    pub fn population(&self) -> f64 {
        self.m2 / self.count
    }
    /// Sum of squared deviations over `count + 1`.
    pub fn sample(&self) -> f64 {
        self.m2 / (self.count + 1.0)
    }
}

// ------------- Accumulator -------------
#[derive(Clone, Debug)]
enum State {
    Count(u64),
    Sum(f64),
    Avg(f64, u64),
    Median(Vec<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Variance(VarianceState),
    First(Option<ScalarValue>),
    Last(Option<ScalarValue>),
}

/// Partial state of a reduction.
///
/// Besides the reducer state it tracks whether every value seen so far
/// belonged to a domain assignable to integer, which decides whether SUM
/// and AVG narrow their result.
#[derive(Clone, Debug)]
pub struct Accumulator {
    state: State,
    integer_only: bool,
}

impl Accumulator {
    fn new(state: State) -> Self {
        Self {
            state,
            integer_only: true,
        }
    }
    /// Folds one extracted value in. `None` is what COUNT's extractor yields.
    pub fn accumulate(&mut self, value: Option<&ScalarValue>) {
        if let State::Count(n) = &mut self.state {
            *n += 1;
            return;
        }
        let Some(value) = value else { return };
        if !Domain::Integer.is_assignable_from(value.domain()) {
            self.integer_only = false;
        }
        if value.is_null() {
            return;
        }
        // non-numeric input is rejected when metadata is computed
        let number = || value.as_f64().unwrap_or(f64::NAN);
        match &mut self.state {
            State::Count(_) => {}
            State::Sum(sum) => *sum += number(),
            State::Avg(sum, count) => {
                *sum += number();
                *count += 1;
            }
            State::Median(values) => values.push(number()),
            State::Min(min) => {
                if min.as_ref().is_none_or(|m| value < m) {
                    *min = Some(value.clone());
                }
            }
            State::Max(max) => {
                if max.as_ref().is_none_or(|m| value > m) {
                    *max = Some(value.clone());
                }
            }
            State::Variance(state) => state.push(number()),
            State::First(first) => {
                if first.is_none() {
                    *first = Some(value.clone());
                }
            }
            State::Last(last) => *last = Some(value.clone()),
        }
    }
    /// Merges the state of a slice following this one.
    pub fn combine(self, other: Accumulator) -> Accumulator {
        let integer_only = self.integer_only && other.integer_only;
        let state = match (self.state, other.state) {
            (State::Count(a), State::Count(b)) => State::Count(a + b),
            (State::Sum(a), State::Sum(b)) => State::Sum(a + b),
            (State::Avg(sa, ca), State::Avg(sb, cb)) => State::Avg(sa + sb, ca + cb),
            (State::Median(mut a), State::Median(mut b)) => {
                a.append(&mut b);
                State::Median(a)
            }
            (State::Min(a), State::Min(b)) => State::Min(pick(a, b, Ordering::Less)),
            (State::Max(a), State::Max(b)) => State::Max(pick(a, b, Ordering::Greater)),
            (State::Variance(a), State::Variance(b)) => State::Variance(a.merge(b)),
            (State::First(a), State::First(b)) => State::First(a.or(b)),
            (State::Last(a), State::Last(b)) => State::Last(b.or(a)),
            (state, _) => state,
        };
        Accumulator { state, integer_only }
    }
}

fn pick(a: Option<ScalarValue>, b: Option<ScalarValue>, wanted: Ordering) -> Option<ScalarValue> {
    match (a, b) {
        (Some(a), Some(b)) => Some(if b.cmp(&a) == wanted { b } else { a }),
        (a, b) => a.or(b),
    }
}

// odd counts take the middle element, even counts average the two central ones
fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

fn narrowed(value: f64, integer_only: bool) -> ScalarValue {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if integer_only && value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        ScalarValue::Integer(value as i64)
    } else {
        ScalarValue::Number(value)
    }
}

// ------------- Reduction -------------
// the reducers common to both operator families
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Reduction {
    Count,
    Sum,
    Avg,
    Median,
    Min,
    Max,
    VarPop,
    VarSamp,
    StddevPop,
    StddevSamp,
    FirstValue,
    LastValue,
}

impl Reduction {
    fn name(&self) -> &'static str {
        match self {
            Reduction::Count => "count",
            Reduction::Sum => "sum",
            Reduction::Avg => "avg",
            Reduction::Median => "median",
            Reduction::Min => "min",
            Reduction::Max => "max",
            Reduction::VarPop => "var_pop",
            Reduction::VarSamp => "var_samp",
            Reduction::StddevPop => "stddev_pop",
            Reduction::StddevSamp => "stddev_samp",
            Reduction::FirstValue => "first_value",
            Reduction::LastValue => "last_value",
        }
    }
    fn accumulator(&self) -> Accumulator {
        Accumulator::new(match self {
            Reduction::Count => State::Count(0),
            Reduction::Sum => State::Sum(0.0),
            Reduction::Avg => State::Avg(0.0, 0),
            Reduction::Median => State::Median(Vec::new()),
            Reduction::Min => State::Min(None),
            Reduction::Max => State::Max(None),
            Reduction::VarPop | Reduction::VarSamp | Reduction::StddevPop | Reduction::StddevSamp => {
                State::Variance(VarianceState::new())
            }
            Reduction::FirstValue => State::First(None),
            Reduction::LastValue => State::Last(None),
        })
    }
    fn extract(&self, dp: &DataPoint, measure: &DataStructureComponent) -> Option<ScalarValue> {
        match self {
            Reduction::Count => None,
            _ => Some(dp.get(measure).cloned().unwrap_or(ScalarValue::Null(measure.domain()))),
        }
    }
    fn finish(&self, acc: Accumulator, empty_extreme: ScalarValue) -> ScalarValue {
        let integer_only = acc.integer_only;
        match (self, acc.state) {
            (_, State::Count(n)) => ScalarValue::Integer(n as i64),
            (_, State::Sum(sum)) => narrowed(sum, integer_only),
            (_, State::Avg(_, 0)) => narrowed(0.0, integer_only),
            (_, State::Avg(sum, count)) => narrowed(sum / count as f64, integer_only),
            (_, State::Median(values)) => ScalarValue::Number(median(values)),
            (_, State::Min(extreme)) | (_, State::Max(extreme)) => extreme.unwrap_or(empty_extreme),
            (Reduction::VarPop, State::Variance(v)) => ScalarValue::Number(v.population()),
            (Reduction::VarSamp, State::Variance(v)) => ScalarValue::Number(v.sample()),
            (Reduction::StddevPop, State::Variance(v)) => ScalarValue::Number(v.population().sqrt()),
            (_, State::Variance(v)) => ScalarValue::Number(v.sample().sqrt()),
            (_, State::First(value)) | (_, State::Last(value)) => {
                value.unwrap_or(ScalarValue::Null(Domain::Number))
            }
        }
    }
    /// Domain of the result for a measure of domain `input`.
    fn output_domain(&self, input: Domain) -> Result<Domain> {
        let numeric = matches!(input, Domain::Integer | Domain::Number | Domain::Null | Domain::Unknown);
        match self {
            Reduction::Count => Ok(Domain::Integer),
            Reduction::Min | Reduction::Max | Reduction::FirstValue | Reduction::LastValue => Ok(input),
            _ if !numeric => Err(VtlError::IncompatibleDomain {
                context: format!("operand of {}", self.name()),
                expected: Domain::Number,
                found: input,
            }),
            Reduction::Sum if input == Domain::Integer => Ok(Domain::Integer),
            _ => Ok(Domain::Number),
        }
    }
    fn reduce<'a>(&self, values: impl IntoIterator<Item = &'a ScalarValue>) -> Accumulator {
        values.into_iter().fold(self.accumulator(), |mut acc, v| {
            acc.accumulate(Some(v));
            acc
        })
    }
    fn par_reduce(&self, values: &[ScalarValue]) -> Accumulator {
        values
            .par_iter()
            .fold(
                || self.accumulator(),
                |mut acc, v| {
                    acc.accumulate(Some(v));
                    acc
                },
            )
            .reduce(|| self.accumulator(), Accumulator::combine)
    }
    fn reduce_rows(&self, rows: &[DataPoint], measure: &DataStructureComponent) -> (LineageGroup, Accumulator) {
        let step = |(mut lineage, mut acc): (LineageGroup, Accumulator), dp: &DataPoint| {
            lineage.add(dp.lineage());
            acc.accumulate(self.extract(dp, measure).as_ref());
            (lineage, acc)
        };
        let empty = || (LineageGroup::new(), self.accumulator());
        if rows.len() >= config::settings().parallel_threshold {
            rows.par_iter()
                .fold(empty, step)
                .reduce(empty, |(la, aa), (lb, ab)| (la.merge(lb), aa.combine(ab)))
        } else {
            rows.iter().fold(empty(), step)
        }
    }
}

// ------------- AggregateOperator -------------
/// Reducers collapsing a whole group of rows into one value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggregateOperator {
    Count,
    Sum,
    Avg,
    Median,
    Min,
    Max,
    VarPop,
    VarSamp,
    StddevPop,
    StddevSamp,
}

impl AggregateOperator {
    fn reduction(&self) -> Reduction {
        match self {
            AggregateOperator::Count => Reduction::Count,
            AggregateOperator::Sum => Reduction::Sum,
            AggregateOperator::Avg => Reduction::Avg,
            AggregateOperator::Median => Reduction::Median,
            AggregateOperator::Min => Reduction::Min,
            AggregateOperator::Max => Reduction::Max,
            AggregateOperator::VarPop => Reduction::VarPop,
            AggregateOperator::VarSamp => Reduction::VarSamp,
            AggregateOperator::StddevPop => Reduction::StddevPop,
            AggregateOperator::StddevSamp => Reduction::StddevSamp,
        }
    }
    pub fn name(&self) -> &'static str {
        self.reduction().name()
    }
    pub fn accumulator(&self) -> Accumulator {
        self.reduction().accumulator()
    }
    /// The value this reducer reads from `dp`; COUNT reads nothing.
    pub fn extract(&self, dp: &DataPoint, measure: &DataStructureComponent) -> Option<ScalarValue> {
        self.reduction().extract(dp, measure)
    }
    /// Empty MIN and MAX give an untyped null.
    pub fn finish(&self, acc: Accumulator) -> ScalarValue {
        self.reduction().finish(acc, ScalarValue::Null(Domain::Null))
    }
    pub fn output_domain(&self, input: Domain) -> Result<Domain> {
        self.reduction().output_domain(input)
    }
    pub fn reduce<'a>(&self, values: impl IntoIterator<Item = &'a ScalarValue>) -> ScalarValue {
        self.finish(self.reduction().reduce(values))
    }
    pub fn par_reduce(&self, values: &[ScalarValue]) -> ScalarValue {
        self.finish(self.reduction().par_reduce(values))
    }
    /// Reduces `measure` over `rows`, counting the lineages that contributed.
    pub fn reduce_rows(&self, rows: &[DataPoint], measure: &DataStructureComponent) -> (LineageGroup, ScalarValue) {
        let (lineage, acc) = self.reduction().reduce_rows(rows, measure);
        (lineage, self.finish(acc))
    }
}

impl fmt::Display for AggregateOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- AnalyticOperator -------------
/// Reducers evaluated over the window of every row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnalyticOperator {
    Count,
    Sum,
    Avg,
    Median,
    Min,
    Max,
    VarPop,
    VarSamp,
    StddevPop,
    StddevSamp,
    FirstValue,
    LastValue,
}

impl AnalyticOperator {
    fn reduction(&self) -> Reduction {
        match self {
            AnalyticOperator::Count => Reduction::Count,
            AnalyticOperator::Sum => Reduction::Sum,
            AnalyticOperator::Avg => Reduction::Avg,
            AnalyticOperator::Median => Reduction::Median,
            AnalyticOperator::Min => Reduction::Min,
            AnalyticOperator::Max => Reduction::Max,
            AnalyticOperator::VarPop => Reduction::VarPop,
            AnalyticOperator::VarSamp => Reduction::VarSamp,
            AnalyticOperator::StddevPop => Reduction::StddevPop,
            AnalyticOperator::StddevSamp => Reduction::StddevSamp,
            AnalyticOperator::FirstValue => Reduction::FirstValue,
            AnalyticOperator::LastValue => Reduction::LastValue,
        }
    }
    pub fn name(&self) -> &'static str {
        self.reduction().name()
    }
    pub fn accumulator(&self) -> Accumulator {
        self.reduction().accumulator()
    }
    pub fn extract(&self, dp: &DataPoint, measure: &DataStructureComponent) -> Option<ScalarValue> {
        self.reduction().extract(dp, measure)
    }
    /// Empty MIN and MAX give a NaN number, unlike their aggregate form.
    pub fn finish(&self, acc: Accumulator) -> ScalarValue {
        self.reduction().finish(acc, ScalarValue::Number(f64::NAN))
    }
    pub fn output_domain(&self, input: Domain) -> Result<Domain> {
        match self {
            // an empty window yields NaN, so numeric extremes are numbers
            AnalyticOperator::Min | AnalyticOperator::Max if input.is_numeric() => Ok(Domain::Number),
            _ => self.reduction().output_domain(input),
        }
    }
    pub fn reduce<'a>(&self, values: impl IntoIterator<Item = &'a ScalarValue>) -> ScalarValue {
        self.finish(self.reduction().reduce(values))
    }
    pub fn par_reduce(&self, values: &[ScalarValue]) -> ScalarValue {
        self.finish(self.reduction().par_reduce(values))
    }
    pub fn reduce_rows(&self, rows: &[DataPoint], measure: &DataStructureComponent) -> ScalarValue {
        self.finish(self.reduction().reduce_rows(rows, measure).1)
    }
}

impl fmt::Display for AnalyticOperator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
