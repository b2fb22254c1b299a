//! Hash aggregation
//!
//! Groups rows by the encoded bytes of their key columns. Groups are emitted
//! in first-seen order. A global aggregate (no keys) over empty input still
//! emits one row: counts are 0 and every other aggregate is NULL.

use std::collections::HashMap;

use super::context::CancelSignal;
use super::errors::{ExecutorError, ExecutorResult};
use super::eval::BoundExpr;
use super::exec::PhysicalExec;
use crate::logical::{AggFunc, AggregateExpr};
use crate::tuple::{encode_tuple, Datum, Schema, Tuple};

#[derive(Debug, Clone)]
enum Accumulator {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Min(Option<Datum>),
    Max(Option<Datum>),
    Avg { sum: f64, count: u64 },
}

impl Accumulator {
    fn update(&mut self, value: Option<Datum>) -> ExecutorResult<()> {
        let value = match value {
            // count(*)
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                }
                return Ok(());
            }
            Some(Datum::Null) => return Ok(()),
            Some(v) => v,
        };

        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumInt(acc) => {
                let v = value
                    .as_i64()
                    .ok_or_else(|| ExecutorError::eval(format!("sum over non-integer {}", value)))?;
                let next = acc.unwrap_or(0).checked_add(v);
                *acc = Some(next.ok_or_else(|| ExecutorError::eval("sum overflow"))?);
            }
            Accumulator::SumFloat(acc) => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| ExecutorError::eval(format!("sum over non-number {}", value)))?;
                *acc = Some(acc.unwrap_or(0.0) + v);
            }
            Accumulator::Min(acc) => {
                if acc.as_ref().map_or(true, |cur| value.total_cmp(cur).is_lt()) {
                    *acc = Some(value);
                }
            }
            Accumulator::Max(acc) => {
                if acc.as_ref().map_or(true, |cur| value.total_cmp(cur).is_gt()) {
                    *acc = Some(value);
                }
            }
            Accumulator::Avg { sum, count } => {
                let v = value
                    .as_f64()
                    .ok_or_else(|| ExecutorError::eval(format!("avg over non-number {}", value)))?;
                *sum += v;
                *count += 1;
            }
        }
        Ok(())
    }

    fn finish(&self) -> Datum {
        match self {
            Accumulator::Count(n) => Datum::Int8(*n),
            Accumulator::SumInt(v) => v.map_or(Datum::Null, Datum::Int8),
            Accumulator::SumFloat(v) => v.map_or(Datum::Null, Datum::Float8),
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(Datum::Null),
            Accumulator::Avg { count: 0, .. } => Datum::Null,
            Accumulator::Avg { sum, count } => Datum::Float8(sum / *count as f64),
        }
    }
}

struct BoundAggregate {
    func: AggFunc,
    arg: Option<BoundExpr>,
    float_sum: bool,
}

impl BoundAggregate {
    fn accumulator(&self) -> Accumulator {
        match self.func {
            AggFunc::Count => Accumulator::Count(0),
            AggFunc::Sum if self.float_sum => Accumulator::SumFloat(None),
            AggFunc::Sum => Accumulator::SumInt(None),
            AggFunc::Min => Accumulator::Min(None),
            AggFunc::Max => Accumulator::Max(None),
            AggFunc::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
        }
    }
}

pub struct HashAggregateExec {
    child: Box<dyn PhysicalExec>,
    key_positions: Vec<usize>,
    aggregates: Vec<BoundAggregate>,
    schema: Schema,
    output: Option<Vec<Tuple>>,
    position: usize,
    cancel: CancelSignal,
}

impl HashAggregateExec {
    /// `schema` is the output schema: key columns, then one column per aggregate
    pub fn new(
        child: Box<dyn PhysicalExec>,
        keys: &[String],
        aggregates: &[AggregateExpr],
        schema: Schema,
    ) -> ExecutorResult<Self> {
        let input = child.schema();
        let key_positions = keys
            .iter()
            .map(|k| {
                input
                    .index_of(k)
                    .map_err(|e| ExecutorError::invalid_plan(e.to_string()))
            })
            .collect::<ExecutorResult<Vec<_>>>()?;

        let aggregates = aggregates
            .iter()
            .map(|agg| {
                let out_type = agg
                    .data_type(input)
                    .map_err(|e| ExecutorError::invalid_plan(e.to_string()))?;
                Ok(BoundAggregate {
                    func: agg.func,
                    arg: agg.arg.as_ref().map(|a| BoundExpr::bind(a, input)).transpose()?,
                    float_sum: out_type == crate::tuple::DataType::Float8,
                })
            })
            .collect::<ExecutorResult<Vec<_>>>()?;

        if schema.len() != key_positions.len() + aggregates.len() {
            return Err(ExecutorError::invalid_plan(format!(
                "Aggregate output {} does not match {} keys and {} aggregates",
                schema,
                key_positions.len(),
                aggregates.len()
            )));
        }

        Ok(Self {
            child,
            key_positions,
            aggregates,
            schema,
            output: None,
            position: 0,
            cancel: CancelSignal::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    fn build(&mut self) -> ExecutorResult<Vec<Tuple>> {
        let mut slots: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut groups: Vec<(Tuple, Vec<Accumulator>)> = Vec::new();
        let mut buf = Vec::new();

        while let Some(row) = self.child.next()? {
            let key = row.project(&self.key_positions);
            buf.clear();
            encode_tuple(&key, &mut buf);

            let slot = match slots.get(&buf) {
                Some(slot) => *slot,
                None => {
                    let accs = self.aggregates.iter().map(BoundAggregate::accumulator).collect();
                    groups.push((key, accs));
                    slots.insert(buf.clone(), groups.len() - 1);
                    groups.len() - 1
                }
            };

            let accs = &mut groups[slot].1;
            for (agg, acc) in self.aggregates.iter().zip(accs.iter_mut()) {
                let value = agg.arg.as_ref().map(|a| a.eval(&row)).transpose()?;
                acc.update(value)?;
            }
        }

        if groups.is_empty() && self.key_positions.is_empty() {
            let accs = self.aggregates.iter().map(BoundAggregate::accumulator).collect();
            groups.push((Tuple::new(Vec::new()), accs));
        }

        Ok(groups
            .into_iter()
            .map(|(key, accs)| {
                let mut values = key.into_values();
                values.extend(accs.iter().map(Accumulator::finish));
                Tuple::new(values)
            })
            .collect())
    }
}

impl PhysicalExec for HashAggregateExec {
    fn name(&self) -> &'static str {
        "HashAggregate"
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn init(&mut self) -> ExecutorResult<()> {
        self.output = None;
        self.position = 0;
        self.child.init()
    }

    fn next(&mut self) -> ExecutorResult<Option<Tuple>> {
        self.cancel.check()?;
        if self.output.is_none() {
            self.output = Some(self.build()?);
        }
        let row = self
            .output
            .as_ref()
            .and_then(|rows| rows.get(self.position))
            .cloned();
        if row.is_some() {
            self.position += 1;
        }
        Ok(row)
    }

    fn reset(&mut self) -> ExecutorResult<()> {
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> ExecutorResult<()> {
        self.output = None;
        self.child.close()
    }
}
