//! Tabular results and execution statistics.

use std::sync::Arc;
use std::time::Duration;

use arrow::array::{
    Array, ArrayRef, AsArray, BooleanArray, Date32Array, Float64Array, Int64Array, ListArray,
    StringArray, UInt8Array, UInt16Array, UInt32Array, UInt64Array,
};
use arrow::datatypes::{
    DataType, Date32Type, Field, Float64Type, Int64Type, Schema, UInt8Type, UInt16Type,
    UInt32Type, UInt64Type,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use serde::{Deserialize, Serialize};

use common_error::{LensError, LensResult};
use hyperlens_core::{Value, ValueType};

/// Column types a store returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Int64,
    Float64,
    Utf8,
    Boolean,
    Date,
    /// `Array(UInt32)`: row lists and composite keys.
    UInt32List,
}

impl ColumnType {
    /// Arrow data type of the column.
    pub fn data_type(&self) -> DataType {
        match self {
            Self::UInt8 => DataType::UInt8,
            Self::UInt16 => DataType::UInt16,
            Self::UInt32 => DataType::UInt32,
            Self::UInt64 => DataType::UInt64,
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::Utf8 => DataType::Utf8,
            Self::Boolean => DataType::Boolean,
            Self::Date => DataType::Date32,
            Self::UInt32List => {
                DataType::List(Arc::new(Field::new("item", DataType::UInt32, true)))
            }
        }
    }

    /// Column type of a dictionary's `val` column.
    pub const fn for_value_type(value_type: ValueType) -> Self {
        match value_type {
            ValueType::String => Self::Utf8,
            ValueType::Float32 => Self::Float64,
            ValueType::UInt8 | ValueType::Bool => Self::UInt8,
            ValueType::UInt16 => Self::UInt16,
            ValueType::UInt32 => Self::UInt32,
            ValueType::Date => Self::Date,
        }
    }

    /// Map a ClickHouse type name, unwrapping `Nullable(..)` and
    /// `LowCardinality(..)`.
    pub fn from_clickhouse(name: &str) -> LensResult<Self> {
        let name = name.trim();
        for wrapper in ["Nullable(", "LowCardinality("] {
            if let Some(inner) = name.strip_prefix(wrapper).and_then(|s| s.strip_suffix(')')) {
                return Self::from_clickhouse(inner);
            }
        }
        match name {
            "UInt8" => Ok(Self::UInt8),
            "UInt16" => Ok(Self::UInt16),
            "UInt32" => Ok(Self::UInt32),
            "UInt64" => Ok(Self::UInt64),
            "Int8" | "Int16" | "Int32" | "Int64" => Ok(Self::Int64),
            "Float32" | "Float64" => Ok(Self::Float64),
            "String" => Ok(Self::Utf8),
            "Bool" => Ok(Self::Boolean),
            "Date" | "Date32" => Ok(Self::Date),
            "Array(UInt8)" | "Array(UInt16)" | "Array(UInt32)" => Ok(Self::UInt32List),
            other => Err(LensError::not_implemented(format!(
                "result column type `{other}`"
            ))),
        }
    }
}

/// Statistics of one query or statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Label of the query.
    pub query_id: String,
    pub elapsed: Duration,
    /// Result rows.
    pub rows: u64,
    /// Rows processed by the store.
    pub rows_read: u64,
    /// Bytes processed by the store.
    pub bytes_read: u64,
}

impl QueryStats {
    /// Empty statistics for a labelled query.
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            ..Self::default()
        }
    }

    /// Add another query's counters to these.
    pub fn absorb(&mut self, other: &QueryStats) {
        self.elapsed += other.elapsed;
        self.rows += other.rows;
        self.rows_read += other.rows_read;
        self.bytes_read += other.bytes_read;
    }
}

/// A result set: one Arrow batch plus statistics.
#[derive(Debug, Clone)]
pub struct ResultSet {
    batch: RecordBatch,
    stats: QueryStats,
}

impl ResultSet {
    /// Wrap a batch.
    pub fn new(batch: RecordBatch, stats: QueryStats) -> Self {
        Self { batch, stats }
    }

    /// The underlying batch.
    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Execution statistics.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.batch.num_rows() == 0
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    fn column(&self, name: &str) -> LensResult<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| LensError::internal(format!("result has no column `{name}`")))
    }

    /// Value of one cell.
    pub fn value(&self, row: usize, column: &str) -> LensResult<Value> {
        value_at(self.column(column)?, row)
    }

    /// Every value of one column.
    pub fn column_values(&self, column: &str) -> LensResult<Vec<Value>> {
        let array = self.column(column)?;
        (0..array.len()).map(|row| value_at(array, row)).collect()
    }

    /// Every row as values.
    pub fn rows(&self) -> LensResult<Vec<Vec<Value>>> {
        (0..self.batch.num_rows())
            .map(|row| {
                self.batch
                    .columns()
                    .iter()
                    .map(|array| value_at(array, row))
                    .collect()
            })
            .collect()
    }

    /// First cell of the first column.
    pub fn scalar(&self) -> LensResult<Value> {
        if self.batch.num_rows() == 0 || self.batch.num_columns() == 0 {
            return Err(LensError::internal(format!(
                "query `{}` returned no scalar",
                self.stats.query_id
            )));
        }
        value_at(self.batch.column(0), 0)
    }

    /// First cell as a count. Nulls count as zero.
    pub fn scalar_u64(&self) -> LensResult<u64> {
        match self.scalar()? {
            Value::Null => Ok(0),
            Value::Float64(f) if f >= 0.0 => Ok(f as u64),
            v => v.as_u64().ok_or_else(|| {
                LensError::internal(format!("expected a count, got {}", v.type_name()))
            }),
        }
    }

    /// First cell as a float.
    pub fn scalar_f64(&self) -> LensResult<Option<f64>> {
        Ok(self.scalar()?.as_float64().filter(|f| !f.is_nan()))
    }

    /// A column of ids.
    pub fn u32_column(&self, column: &str) -> LensResult<Vec<u32>> {
        self.column_values(column)?
            .into_iter()
            .map(|v| {
                v.as_u32().ok_or_else(|| {
                    LensError::internal(format!("column `{column}` holds a non-id {v}"))
                })
            })
            .collect()
    }

    /// Render as an aligned text table.
    pub fn pretty(&self) -> LensResult<String> {
        Ok(arrow::util::pretty::pretty_format_batches(std::slice::from_ref(&self.batch))?
            .to_string())
    }
}

fn value_at(array: &ArrayRef, row: usize) -> LensResult<Value> {
    if row >= array.len() {
        return Err(LensError::internal(format!(
            "row {row} out of bounds for column of {} rows",
            array.len()
        )));
    }
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::UInt8 => Value::Int64(i64::from(array.as_primitive::<UInt8Type>().value(row))),
        DataType::UInt16 => Value::Int64(i64::from(array.as_primitive::<UInt16Type>().value(row))),
        DataType::UInt32 => Value::Int64(i64::from(array.as_primitive::<UInt32Type>().value(row))),
        DataType::UInt64 => {
            let v = array.as_primitive::<UInt64Type>().value(row);
            Value::Int64(i64::try_from(v).map_err(|_| {
                LensError::internal(format!("count {v} does not fit in Int64"))
            })?)
        }
        DataType::Int64 => Value::Int64(array.as_primitive::<Int64Type>().value(row)),
        DataType::Float64 => Value::Float64(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => Value::String(array.as_string::<i32>().value(row).to_string()),
        DataType::Boolean => Value::Bool(array.as_boolean().value(row)),
        DataType::Date32 => Value::Date(array.as_primitive::<Date32Type>().value(row)),
        DataType::List(_) => {
            let inner = array.as_list::<i32>().value(row);
            let values = (0..inner.len())
                .map(|i| value_at(&inner, i))
                .collect::<LensResult<Vec<_>>>()?;
            Value::Array(values)
        }
        other => {
            return Err(LensError::not_implemented(format!(
                "reading {other} result columns"
            )));
        }
    };
    Ok(value)
}

/// Row-oriented builder of result batches.
#[derive(Debug, Default)]
pub struct ResultBuilder {
    names: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Vec<Value>>,
}

impl ResultBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.names.push(name.into());
        self.types.push(column_type);
        self
    }

    /// Append a row.
    pub fn push_row(&mut self, row: Vec<Value>) -> LensResult<()> {
        if row.len() != self.names.len() {
            return Err(LensError::internal(format!(
                "row of {} values for {} columns",
                row.len(),
                self.names.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Number of rows appended so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row was appended.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Build the batch.
    pub fn build(self) -> LensResult<RecordBatch> {
        let fields: Vec<Field> = self
            .names
            .iter()
            .zip(&self.types)
            .map(|(name, ty)| Field::new(name, ty.data_type(), true))
            .collect();
        let columns = self
            .types
            .iter()
            .enumerate()
            .map(|(i, ty)| build_array(*ty, self.rows.iter().map(|r| &r[i])))
            .collect::<LensResult<Vec<_>>>()?;
        let options = RecordBatchOptions::new().with_row_count(Some(self.rows.len()));
        Ok(RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            columns,
            &options,
        )?)
    }

    /// Build a result set labelled with `query_id`.
    pub fn finish(self, stats: QueryStats) -> LensResult<ResultSet> {
        let batch = self.build()?;
        let stats = QueryStats {
            rows: batch.num_rows() as u64,
            ..stats
        };
        Ok(ResultSet::new(batch, stats))
    }
}

fn convert<'a, T>(
    values: impl Iterator<Item = &'a Value>,
    column_type: ColumnType,
    f: impl Fn(&Value) -> Option<T>,
) -> LensResult<Vec<Option<T>>> {
    values
        .map(|v| {
            if v.is_null() {
                return Ok(None);
            }
            f(v).map(Some).ok_or_else(|| {
                LensError::internal(format!("cannot store {v} in a {column_type:?} column"))
            })
        })
        .collect()
}

fn build_array<'a>(
    column_type: ColumnType,
    values: impl Iterator<Item = &'a Value>,
) -> LensResult<ArrayRef> {
    let array: ArrayRef = match column_type {
        ColumnType::UInt8 => Arc::new(UInt8Array::from(convert(values, column_type, |v| {
            v.as_int64().and_then(|i| u8::try_from(i).ok())
        })?)),
        ColumnType::UInt16 => Arc::new(UInt16Array::from(convert(values, column_type, |v| {
            v.as_int64().and_then(|i| u16::try_from(i).ok())
        })?)),
        ColumnType::UInt32 => Arc::new(UInt32Array::from(convert(
            values,
            column_type,
            Value::as_u32,
        )?)),
        ColumnType::UInt64 => Arc::new(UInt64Array::from(convert(
            values,
            column_type,
            Value::as_u64,
        )?)),
        ColumnType::Int64 => Arc::new(Int64Array::from(convert(
            values,
            column_type,
            Value::as_int64,
        )?)),
        ColumnType::Float64 => Arc::new(Float64Array::from(convert(
            values,
            column_type,
            Value::as_float64,
        )?)),
        ColumnType::Utf8 => Arc::new(StringArray::from(convert(values, column_type, |v| {
            Some(v.to_string())
        })?)),
        ColumnType::Boolean => Arc::new(BooleanArray::from(convert(
            values,
            column_type,
            Value::as_bool,
        )?)),
        ColumnType::Date => Arc::new(Date32Array::from(convert(
            values,
            column_type,
            Value::as_date,
        )?)),
        ColumnType::UInt32List => {
            let lists = convert(values, column_type, |v| {
                v.as_array()?
                    .iter()
                    .map(|item| item.as_u32().map(Some))
                    .collect::<Option<Vec<Option<u32>>>>()
            })?;
            Arc::new(ListArray::from_iter_primitive::<UInt32Type, _, _>(lists))
        }
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        let mut builder = ResultBuilder::new()
            .column("val", ColumnType::Utf8)
            .column("cnt", ColumnType::UInt32)
            .column("hb1arr", ColumnType::UInt32List);
        builder
            .push_row(vec![
                Value::from("Brazil"),
                Value::Int64(2),
                Value::Array(vec![Value::Int64(1), Value::Int64(4)]),
            ])
            .unwrap();
        builder
            .push_row(vec![Value::from("USA"), Value::Null, Value::Array(vec![])])
            .unwrap();
        builder.finish(QueryStats::new("Projection")).unwrap()
    }

    #[test]
    fn test_builder_roundtrip() {
        let result = sample();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.stats().rows, 2);
        assert_eq!(result.column_names(), vec!["val", "cnt", "hb1arr"]);
        assert_eq!(result.value(0, "val").unwrap(), Value::from("Brazil"));
        assert_eq!(result.value(1, "cnt").unwrap(), Value::Null);
        assert_eq!(
            result.value(0, "hb1arr").unwrap(),
            Value::Array(vec![Value::Int64(1), Value::Int64(4)])
        );
        assert!(result.value(0, "missing").is_err());
    }

    #[test]
    fn test_scalar_helpers() {
        let mut builder = ResultBuilder::new().column("cnt", ColumnType::UInt64);
        builder.push_row(vec![Value::Int64(7)]).unwrap();
        let result = builder.finish(QueryStats::new("Counting")).unwrap();
        assert_eq!(result.scalar_u64().unwrap(), 7);

        let empty = ResultBuilder::new()
            .column("cnt", ColumnType::UInt64)
            .finish(QueryStats::new("Counting"))
            .unwrap();
        assert!(empty.scalar().is_err());
    }

    #[test]
    fn test_row_width_checked() {
        let mut builder = ResultBuilder::new().column("hb1", ColumnType::UInt32);
        assert!(builder.push_row(vec![Value::Int64(1), Value::Int64(2)]).is_err());
    }

    #[test]
    fn test_unconvertible_value_rejected() {
        let mut builder = ResultBuilder::new().column("hb1", ColumnType::UInt32);
        builder.push_row(vec![Value::from("x")]).unwrap();
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_clickhouse_type_names() {
        assert_eq!(
            ColumnType::from_clickhouse("Nullable(UInt32)").unwrap(),
            ColumnType::UInt32
        );
        assert_eq!(
            ColumnType::from_clickhouse("Array(UInt32)").unwrap(),
            ColumnType::UInt32List
        );
        assert_eq!(
            ColumnType::from_clickhouse("LowCardinality(String)").unwrap(),
            ColumnType::Utf8
        );
        assert!(ColumnType::from_clickhouse("Decimal(9, 2)").is_err());
    }

    #[test]
    fn test_pretty_contains_values() {
        let text = sample().pretty().unwrap();
        assert!(text.contains("Brazil"));
        assert!(text.contains("hb1arr"));
    }
}
