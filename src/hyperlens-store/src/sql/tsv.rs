//! `TabSeparatedWithNamesAndTypes` response parsing.

use common_error::{LensError, LensResult};
use hyperlens_core::{Value, parse_date};

use crate::result::{ColumnType, QueryStats, ResultBuilder, ResultSet};

/// Parse a response body into a result set.
///
/// The first line holds column names, the second their ClickHouse types,
/// every following line one row.
pub fn parse_tsv(body: &str, stats: QueryStats) -> LensResult<ResultSet> {
    let mut lines = body.lines();
    let (Some(names), Some(types)) = (lines.next(), lines.next()) else {
        return ResultBuilder::new().finish(stats);
    };
    let names: Vec<String> = names.split('\t').map(unescape).collect::<LensResult<_>>()?;
    let types = types
        .split('\t')
        .map(ColumnType::from_clickhouse)
        .collect::<LensResult<Vec<_>>>()?;
    if names.len() != types.len() {
        return Err(LensError::internal(format!(
            "response has {} column names and {} types",
            names.len(),
            types.len()
        )));
    }

    let mut builder = names
        .iter()
        .zip(&types)
        .fold(ResultBuilder::new(), |b, (name, ty)| b.column(name, *ty));
    for (n, line) in lines.enumerate() {
        if line.is_empty() && names.len() > 1 {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != types.len() {
            return Err(LensError::internal(format!(
                "row {n} has {} fields for {} columns",
                fields.len(),
                types.len()
            )));
        }
        let row = fields
            .iter()
            .zip(&types)
            .map(|(field, ty)| parse_field(field, *ty))
            .collect::<LensResult<Vec<_>>>()?;
        builder.push_row(row)?;
    }
    builder.finish(stats)
}

/// Decode the escape sequences of one field.
fn unescape(field: &str) -> LensResult<String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => return Err(LensError::internal("dangling escape in response field")),
        }
    }
    Ok(out)
}

fn parse_number(text: &str, ty: ColumnType) -> LensResult<Value> {
    let bad = || LensError::internal(format!("cannot read `{text}` as {ty:?}"));
    match ty {
        ColumnType::Float64 => match text {
            "nan" | "-nan" => Ok(Value::Float64(f64::NAN)),
            "inf" | "+inf" => Ok(Value::Float64(f64::INFINITY)),
            "-inf" => Ok(Value::Float64(f64::NEG_INFINITY)),
            _ => text.parse().map(Value::Float64).map_err(|_| bad()),
        },
        _ => text.parse().map(Value::Int64).map_err(|_| bad()),
    }
}

fn parse_field(field: &str, ty: ColumnType) -> LensResult<Value> {
    if field == "\\N" {
        return Ok(Value::Null);
    }
    match ty {
        ColumnType::Utf8 => Ok(Value::String(unescape(field)?)),
        ColumnType::Boolean => match field {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            other => Err(LensError::internal(format!("cannot read `{other}` as Bool"))),
        },
        ColumnType::Date => parse_date(field)
            .map(Value::Date)
            .ok_or_else(|| LensError::internal(format!("cannot read `{field}` as Date"))),
        ColumnType::UInt32List => {
            let inner = field
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .ok_or_else(|| LensError::internal(format!("cannot read `{field}` as Array")))?;
            if inner.trim().is_empty() {
                return Ok(Value::Array(Vec::new()));
            }
            inner
                .split(',')
                .map(|item| parse_number(item.trim(), ColumnType::UInt32))
                .collect::<LensResult<Vec<_>>>()
                .map(Value::Array)
        }
        ColumnType::UInt8
        | ColumnType::UInt16
        | ColumnType::UInt32
        | ColumnType::UInt64
        | ColumnType::Int64
        | ColumnType::Float64 => parse_number(field, ty),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_rows() {
        let body = "val\tcnt\thb1arr\td\n\
                    String\tUInt32\tArray(UInt32)\tDate\n\
                    Br\\tazil\t2\t[1,4]\t2021-03-04\n\
                    \\N\t0\t[]\t1970-01-01\n";
        let result = parse_tsv(body, QueryStats::new("Projection")).unwrap();
        assert_eq!(result.num_rows(), 2);
        assert_eq!(result.value(0, "val").unwrap(), Value::from("Br\tazil"));
        assert_eq!(
            result.value(0, "hb1arr").unwrap(),
            Value::Array(vec![Value::Int64(1), Value::Int64(4)])
        );
        assert_eq!(result.value(1, "val").unwrap(), Value::Null);
        assert_eq!(result.value(1, "d").unwrap(), Value::Date(0));
    }

    #[test]
    fn test_parse_scalar_with_nullable_type() {
        let body = "avg\nNullable(Float64)\nnan\n";
        let result = parse_tsv(body, QueryStats::new("Average")).unwrap();
        assert_eq!(result.scalar_f64().unwrap(), None);
    }

    #[test]
    fn test_empty_body_is_empty_result() {
        let result = parse_tsv("", QueryStats::new("Drop")).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_field_count_mismatch() {
        let body = "a\tb\nUInt8\tUInt8\n1\n";
        assert!(parse_tsv(body, QueryStats::new("Broken")).is_err());
    }
}
