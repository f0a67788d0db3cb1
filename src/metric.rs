//! Metric: one typed numeric column of a [`Matrix`](crate::Matrix)
//!
//! Values are stored in a primitive-typed column next to a parallel `record`
//! array. A cell is only meaningful when its record flag is set; arithmetic
//! records a result cell only when every operand cell was recorded.

use crate::error::{MatrixError, Result};
use crate::instance::Instance;
use crate::value::{DataType, Property, Value};
use log::{debug, trace};
use std::collections::HashMap;

/// Anything that addresses a cell of a metric column
pub trait CellIndex {
    fn cell_index(&self) -> usize;
}

impl CellIndex for usize {
    fn cell_index(&self) -> usize {
        *self
    }
}

impl CellIndex for &Instance {
    fn cell_index(&self) -> usize {
        self.index()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Column {
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_column {
    ($col:expr, $v:ident => $body:expr) => {
        match $col {
            Column::I32($v) => $body,
            Column::I64($v) => $body,
            Column::U8($v) => $body,
            Column::U32($v) => $body,
            Column::U64($v) => $body,
            Column::F32($v) => $body,
            Column::F64($v) => $body,
        }
    };
}

impl Column {
    fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Int32 => Column::I32(vec![0; len]),
            DataType::Int64 => Column::I64(vec![0; len]),
            DataType::Uint8 => Column::U8(vec![0; len]),
            DataType::Uint32 => Column::U32(vec![0; len]),
            DataType::Uint64 => Column::U64(vec![0; len]),
            DataType::Float32 => Column::F32(vec![0.0; len]),
            DataType::Float64 => Column::F64(vec![0.0; len]),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Column::I32(_) => DataType::Int32,
            Column::I64(_) => DataType::Int64,
            Column::U8(_) => DataType::Uint8,
            Column::U32(_) => DataType::Uint32,
            Column::U64(_) => DataType::Uint64,
            Column::F32(_) => DataType::Float32,
            Column::F64(_) => DataType::Float64,
        }
    }

    fn push_zero(&mut self) {
        each_column!(self, v => v.push(Default::default()))
    }

    fn remove(&mut self, index: usize) {
        each_column!(self, v => {
            v.remove(index);
        })
    }

    fn zero_fill(&mut self, len: usize) {
        each_column!(self, v => {
            v.clear();
            v.resize(len, Default::default());
        })
    }

    fn get_f64(&self, i: usize) -> f64 {
        each_column!(self, v => v[i] as f64)
    }

    fn set_f64(&mut self, i: usize, x: f64) {
        each_column!(self, v => v[i] = x as _)
    }

    fn is_integer(&self) -> bool {
        !matches!(self, Column::F32(_) | Column::F64(_))
    }

    fn is_unsigned(&self) -> bool {
        matches!(self, Column::U8(_) | Column::U32(_) | Column::U64(_))
    }

    /// Exact value of an integer cell; floats are truncated
    fn get_i128(&self, i: usize) -> i128 {
        each_column!(self, v => v[i] as i128)
    }

    /// Store an integer result, clamped to the column type
    fn set_i128(&mut self, i: usize, x: i128) {
        match self {
            Column::I32(v) => v[i] = x.clamp(i32::MIN.into(), i32::MAX.into()) as i32,
            Column::I64(v) => v[i] = x.clamp(i64::MIN.into(), i64::MAX.into()) as i64,
            Column::U8(v) => v[i] = x.clamp(0, u8::MAX.into()) as u8,
            Column::U32(v) => v[i] = x.clamp(0, u32::MAX.into()) as u32,
            Column::U64(v) => v[i] = x.clamp(0, u64::MAX.into()) as u64,
            Column::F32(v) => v[i] = x as f32,
            Column::F64(v) => v[i] = x as f64,
        }
    }

    /// Turn an unsigned column into Int64 so it can hold negative values
    fn widen_signed(&mut self) {
        let widened: Vec<i64> = match self {
            Column::U8(v) => v.iter().map(|&x| i64::from(x)).collect(),
            Column::U32(v) => v.iter().map(|&x| i64::from(x)).collect(),
            Column::U64(v) => v
                .iter()
                .map(|&x| i64::try_from(x).unwrap_or(i64::MAX))
                .collect(),
            _ => return,
        };
        *self = Column::I64(widened);
    }

    fn get(&self, i: usize) -> Value {
        match self {
            Column::I32(v) => Value::I32(v[i]),
            Column::I64(v) => Value::I64(v[i]),
            Column::U8(v) => Value::U8(v[i]),
            Column::U32(v) => Value::U32(v[i]),
            Column::U64(v) => Value::U64(v[i]),
            Column::F32(v) => Value::F32(v[i]),
            Column::F64(v) => Value::F64(v[i]),
        }
    }

    fn set(&mut self, i: usize, value: Value) {
        match self {
            Column::I32(v) => v[i] = value.to_i64() as i32,
            Column::I64(v) => v[i] = value.to_i64(),
            Column::U8(v) => v[i] = value.to_u64() as u8,
            Column::U32(v) => v[i] = value.to_u64() as u32,
            Column::U64(v) => v[i] = value.to_u64(),
            Column::F32(v) => v[i] = value.to_f64() as f32,
            Column::F64(v) => v[i] = value.to_f64(),
        }
    }
}

/// Typed numeric column with per-cell record flags
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    property: Option<Property>,
    comment: String,
    labels: HashMap<String, String>,
    exportable: bool,
    array: bool,
    histogram: bool,
    buckets: Vec<String>,
    values: Column,
    record: Vec<bool>,
}

impl Metric {
    /// Create an exportable metric with `len` unrecorded cells
    pub fn new(name: impl Into<String>, data_type: DataType, len: usize) -> Self {
        Self {
            name: name.into(),
            property: None,
            comment: String::new(),
            labels: HashMap::new(),
            exportable: true,
            array: false,
            histogram: false,
            buckets: Vec::new(),
            values: Column::zeroed(data_type, len),
            record: vec![false; len],
        }
    }

    /// Copy of this metric; without `with_data` the column is zeroed to `len` cells
    pub fn clone_with(&self, with_data: bool, len: usize) -> Self {
        if with_data && self.len() == len {
            return self.clone();
        }
        Self {
            name: self.name.clone(),
            property: self.property,
            comment: self.comment.clone(),
            labels: self.labels.clone(),
            exportable: self.exportable,
            array: self.array,
            histogram: self.histogram,
            buckets: self.buckets.clone(),
            values: Column::zeroed(self.data_type(), len),
            record: vec![false; len],
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn data_type(&self) -> DataType {
        self.values.data_type()
    }

    pub fn property(&self) -> Option<Property> {
        self.property
    }

    pub fn set_property(&mut self, property: Property) {
        self.property = Some(property);
    }

    /// Base counter name for `average` and `percent` metrics
    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = comment.into();
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn set_labels(&mut self, labels: HashMap<String, String>) {
        self.labels = labels;
    }

    pub fn has_labels(&self) -> bool {
        !self.labels.is_empty()
    }

    pub fn is_exportable(&self) -> bool {
        self.exportable
    }

    pub fn set_exportable(&mut self, exportable: bool) {
        self.exportable = exportable;
    }

    /// Marks a column derived from a vector sub-field
    pub fn is_array(&self) -> bool {
        self.array
    }

    pub fn set_array(&mut self, array: bool) {
        self.array = array;
    }

    pub fn is_histogram(&self) -> bool {
        self.histogram
    }

    pub fn set_histogram(&mut self, histogram: bool) {
        self.histogram = histogram;
    }

    pub fn buckets(&self) -> &[String] {
        &self.buckets
    }

    pub fn set_buckets(&mut self, buckets: Vec<String>) {
        self.buckets = buckets;
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.record.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }

    pub fn records(&self) -> &[bool] {
        &self.record
    }

    pub fn is_recorded(&self, cell: impl CellIndex) -> bool {
        self.record.get(cell.cell_index()).copied().unwrap_or(false)
    }

    fn check(&self, index: usize) -> Result<()> {
        if index < self.len() {
            Ok(())
        } else {
            Err(MatrixError::IndexOutOfRange {
                index,
                len: self.len(),
            })
        }
    }

    /// Store `value` converted to this metric's type and record the cell
    pub fn set_value(&mut self, cell: impl CellIndex, value: impl Into<Value>) -> Result<()> {
        let i = cell.cell_index();
        self.check(i)?;
        self.values.set(i, value.into());
        self.record[i] = true;
        Ok(())
    }

    pub fn set_value_f64(&mut self, cell: impl CellIndex, value: f64) -> Result<()> {
        self.set_value(cell, value)
    }

    pub fn set_value_i64(&mut self, cell: impl CellIndex, value: i64) -> Result<()> {
        self.set_value(cell, value)
    }

    pub fn set_value_u64(&mut self, cell: impl CellIndex, value: u64) -> Result<()> {
        self.set_value(cell, value)
    }

    pub fn set_value_u8(&mut self, cell: impl CellIndex, value: u8) -> Result<()> {
        self.set_value(cell, value)
    }

    /// Parse `value` according to this metric's type and store it
    pub fn set_value_str(&mut self, cell: impl CellIndex, value: &str) -> Result<()> {
        let parsed = Value::parse(value, self.data_type())?;
        self.set_value(cell, parsed)
    }

    /// Add `value` to the cell; an unrecorded cell counts as zero
    pub fn add_value(&mut self, cell: impl CellIndex, value: impl Into<Value>) -> Result<()> {
        let i = cell.cell_index();
        self.check(i)?;
        let base = if self.record[i] {
            self.values.get_f64(i)
        } else {
            0.0
        };
        self.values.set_f64(i, base + value.into().to_f64());
        self.record[i] = true;
        Ok(())
    }

    /// Unrecord the cell; nothing is stored
    pub fn set_value_nan(&mut self, cell: impl CellIndex) {
        if let Some(r) = self.record.get_mut(cell.cell_index()) {
            *r = false;
        }
    }

    /// Cell value, `None` when unrecorded
    pub fn value(&self, cell: impl CellIndex) -> Option<Value> {
        let i = cell.cell_index();
        if self.is_recorded(i) {
            Some(self.values.get(i))
        } else {
            None
        }
    }

    pub fn value_f64(&self, cell: impl CellIndex) -> Option<f64> {
        self.value(cell).map(Value::to_f64)
    }

    pub fn value_i64(&self, cell: impl CellIndex) -> Option<i64> {
        self.value(cell).map(Value::to_i64)
    }

    pub fn value_u64(&self, cell: impl CellIndex) -> Option<u64> {
        self.value(cell).map(Value::to_u64)
    }

    pub fn value_i32(&self, cell: impl CellIndex) -> Option<i32> {
        self.value(cell).map(|v| v.to_i64() as i32)
    }

    pub fn value_u32(&self, cell: impl CellIndex) -> Option<u32> {
        self.value(cell).map(|v| v.to_u64() as u32)
    }

    pub fn value_u8(&self, cell: impl CellIndex) -> Option<u8> {
        self.value(cell).map(|v| v.to_u64() as u8)
    }

    pub fn value_f32(&self, cell: impl CellIndex) -> Option<f32> {
        self.value(cell).map(|v| v.to_f64() as f32)
    }

    /// Stored value regardless of the record flag
    pub fn raw_f64(&self, cell: impl CellIndex) -> Option<f64> {
        let i = cell.cell_index();
        (i < self.len()).then(|| self.values.get_f64(i))
    }

    /// Zero and unrecord `len` cells
    pub(crate) fn reset(&mut self, len: usize) {
        self.values.zero_fill(len);
        self.record.clear();
        self.record.resize(len, false);
    }

    /// Append one unrecorded cell
    pub(crate) fn append(&mut self) {
        self.values.push_zero();
        self.record.push(false);
    }

    /// Remove the cell at `index`, shifting later cells down
    pub(crate) fn remove(&mut self, index: usize) {
        if index < self.len() {
            self.values.remove(index);
            self.record.remove(index);
        }
    }

    /// `self[i] -= prev[prev_index[i]]`
    ///
    /// `prev_index` maps each cell of this column to the matching cell of the
    /// previous column, `None` when the row did not exist. Cells without a
    /// recorded counterpart become unrecorded. Returns the number of skipped cells.
    ///
    /// Integer columns are subtracted exactly. An unsigned column with a cell
    /// going backwards becomes Int64, so counter resets stay negative.
    pub fn delta(&mut self, prev: &Metric, prev_index: &[Option<usize>]) -> Result<usize> {
        if prev_index.len() != self.len() {
            return Err(MatrixError::UnequalVectors {
                left: self.len(),
                right: prev_index.len(),
            });
        }
        let exact = self.values.is_integer() && prev.values.is_integer();
        if exact && self.values.is_unsigned() {
            let reset = prev_index.iter().enumerate().any(|(i, p)| match *p {
                Some(j) if self.record[i] && prev.is_recorded(j) => {
                    self.values.get_i128(i) < prev.values.get_i128(j)
                }
                _ => false,
            });
            if reset {
                debug!("metric {}: counter went backwards, widened to int64", self.name);
                self.values.widen_signed();
            }
        }

        let mut skips = 0;
        for (i, p) in prev_index.iter().enumerate() {
            match *p {
                Some(j) if self.record[i] && prev.is_recorded(j) => {
                    if exact {
                        let v = self.values.get_i128(i) - prev.values.get_i128(j);
                        self.values.set_i128(i, v);
                    } else {
                        let v = self.values.get_f64(i) - prev.values.get_f64(j);
                        self.values.set_f64(i, v);
                    }
                }
                _ => {
                    self.record[i] = false;
                    skips += 1;
                    trace!("metric {}: delta skipped for cell {}", self.name, i);
                }
            }
        }
        Ok(skips)
    }

    /// `self[i] /= base[i]`; a zero denominator yields a recorded zero
    pub fn divide(&mut self, base: &Metric) -> Result<usize> {
        self.same_len(base)?;
        let mut skips = 0;
        for i in 0..self.len() {
            if self.record[i] && base.record[i] {
                let d = base.values.get_f64(i);
                let v = if d != 0.0 {
                    self.values.get_f64(i) / d
                } else {
                    0.0
                };
                self.values.set_f64(i, v);
            } else {
                self.record[i] = false;
                skips += 1;
                trace!("metric {}: divide skipped for cell {}", self.name, i);
            }
        }
        Ok(skips)
    }

    /// `self[i] /= base[i]` only where `base[i] >= threshold`
    ///
    /// Cells whose denominator is below the threshold, or zero, become unrecorded.
    pub fn divide_with_threshold(&mut self, base: &Metric, threshold: f64) -> Result<usize> {
        self.same_len(base)?;
        let mut skips = 0;
        for i in 0..self.len() {
            let d = base.values.get_f64(i);
            if self.record[i] && base.record[i] && d >= threshold && d != 0.0 {
                let v = self.values.get_f64(i) / d;
                self.values.set_f64(i, v);
            } else {
                self.record[i] = false;
                skips += 1;
                trace!(
                    "metric {}: below threshold {} for cell {} (base={})",
                    self.name,
                    threshold,
                    i,
                    d
                );
            }
        }
        Ok(skips)
    }

    /// Multiply every recorded cell by `scalar`
    pub fn multiply_by_scalar(&mut self, scalar: f64) -> usize {
        let mut skips = 0;
        for i in 0..self.len() {
            if self.record[i] {
                let v = self.values.get_f64(i) * scalar;
                self.values.set_f64(i, v);
            } else {
                skips += 1;
            }
        }
        skips
    }

    fn same_len(&self, other: &Metric) -> Result<()> {
        if self.len() != other.len() {
            return Err(MatrixError::UnequalVectors {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f64_metric(values: &[Option<f64>]) -> Metric {
        let mut m = Metric::new("m", DataType::Float64, values.len());
        for (i, v) in values.iter().enumerate() {
            if let Some(v) = v {
                m.set_value_f64(i, *v).unwrap();
            }
        }
        m
    }

    #[test]
    fn test_set_get_symmetry() {
        let mut m = Metric::new("m", DataType::Uint8, 2);
        m.set_value(0usize, 200u8).unwrap();
        assert_eq!(m.value_u8(0usize), Some(200));
        assert!(m.value(1usize).is_none());

        let mut m = Metric::new("m", DataType::Int32, 1);
        m.set_value(0usize, -7i32).unwrap();
        assert_eq!(m.value_i32(0usize), Some(-7));

        let mut m = Metric::new("m", DataType::Uint64, 1);
        m.set_value_u64(0usize, u64::MAX).unwrap();
        assert_eq!(m.value_u64(0usize), Some(u64::MAX));

        let mut m = Metric::new("m", DataType::Float32, 1);
        m.set_value(0usize, 1.5f32).unwrap();
        assert_eq!(m.value_f32(0usize), Some(1.5));
    }

    #[test]
    fn test_set_out_of_range() {
        let mut m = Metric::new("m", DataType::Int64, 1);
        assert!(m.set_value_i64(3usize, 1).is_err());
        assert!(m.value(3usize).is_none());
    }

    #[test]
    fn test_set_value_str() {
        let mut m = Metric::new("m", DataType::Int64, 1);
        m.set_value_str(0usize, "42").unwrap();
        assert_eq!(m.value_i64(0usize), Some(42));
        assert!(m.set_value_str(0usize, "x").is_err());
    }

    #[test]
    fn test_add_value_and_nan() {
        let mut m = Metric::new("m", DataType::Float64, 1);
        m.add_value(0usize, 2.0).unwrap();
        m.add_value(0usize, 3.0).unwrap();
        assert_eq!(m.value_f64(0usize), Some(5.0));

        m.set_value_nan(0usize);
        assert!(!m.is_recorded(0usize));
        m.add_value(0usize, 1.0).unwrap();
        assert_eq!(m.value_f64(0usize), Some(1.0));
    }

    #[test]
    fn test_remove_and_append() {
        let mut m = f64_metric(&[Some(1.0), Some(2.0), Some(3.0)]);
        m.remove(1);
        assert_eq!(m.len(), 2);
        assert_eq!(m.value_f64(1usize), Some(3.0));
        m.append();
        assert_eq!(m.len(), 3);
        assert!(!m.is_recorded(2usize));
    }

    #[test]
    fn test_delta() {
        let mut cur = f64_metric(&[Some(1500.0), Some(10.0), None]);
        let prev = f64_metric(&[Some(1000.0), None, Some(1.0)]);
        let skips = cur.delta(&prev, &[Some(0), Some(1), Some(2)]).unwrap();
        assert_eq!(skips, 2);
        assert_eq!(cur.value_f64(0usize), Some(500.0));
        assert!(!cur.is_recorded(1usize));
        assert!(!cur.is_recorded(2usize));
    }

    #[test]
    fn test_delta_negative_is_published() {
        let mut cur = f64_metric(&[Some(5.0)]);
        let prev = f64_metric(&[Some(8.0)]);
        cur.delta(&prev, &[Some(0)]).unwrap();
        assert_eq!(cur.value_f64(0usize), Some(-3.0));
    }

    #[test]
    fn test_delta_missing_previous_row() {
        let mut cur = f64_metric(&[Some(5.0), Some(6.0)]);
        let prev = f64_metric(&[Some(1.0)]);
        cur.delta(&prev, &[None, Some(0)]).unwrap();
        assert!(!cur.is_recorded(0usize));
        assert_eq!(cur.value_f64(1usize), Some(5.0));
    }

    #[test]
    fn test_divide() {
        let mut num = f64_metric(&[Some(10.0), Some(3.0), Some(1.0)]);
        let den = f64_metric(&[Some(4.0), Some(0.0), None]);
        let skips = num.divide(&den).unwrap();
        assert_eq!(skips, 1);
        assert_eq!(num.value_f64(0usize), Some(2.5));
        assert_eq!(num.value_f64(1usize), Some(0.0));
        assert!(!num.is_recorded(2usize));
    }

    #[test]
    fn test_divide_unequal() {
        let mut num = f64_metric(&[Some(1.0)]);
        let den = f64_metric(&[Some(1.0), Some(1.0)]);
        assert!(matches!(
            num.divide(&den),
            Err(MatrixError::UnequalVectors { left: 1, right: 2 })
        ));
    }

    #[test]
    fn test_divide_with_threshold() {
        let mut lat = f64_metric(&[Some(200.0), Some(200.0), Some(5.0)]);
        let ops = f64_metric(&[Some(4.0), Some(40.0), Some(0.0)]);
        lat.divide_with_threshold(&ops, 10.0).unwrap();
        assert!(!lat.is_recorded(0usize));
        assert_eq!(lat.value_f64(1usize), Some(5.0));
        assert!(!lat.is_recorded(2usize));
    }

    #[test]
    fn test_multiply_by_scalar() {
        let mut m = f64_metric(&[Some(0.25), None]);
        assert_eq!(m.multiply_by_scalar(100.0), 1);
        assert_eq!(m.value_f64(0usize), Some(25.0));
    }

    #[test]
    fn test_clone_without_data() {
        let mut m = f64_metric(&[Some(1.0), Some(2.0)]);
        m.set_property(Property::Average);
        m.set_comment("ops");
        let c = m.clone_with(false, 3);
        assert_eq!(c.len(), 3);
        assert_eq!(c.property(), Some(Property::Average));
        assert_eq!(c.comment(), "ops");
        assert!(c.records().iter().all(|r| !r));
    }
}
