//! ClickHouse SQL rendering of the store IR.

use common_error::{LensError, LensResult};
use hyperlens_core::{EntityKey, TableNames, Value, ValueType, format_date};

use crate::predicate::{Operand, Predicate};
use crate::query::{
    AggregateFn, AtomSource, AttributeScope, CollectionKind, Column, Projection, Query,
    RowSelection, RowSource, Selection, Statement,
};

/// States columns reset when an entity's filter state is cleared.
const STATE_COLUMNS: [&str; 4] = ["hb1arr", "cnt", "pos", "sel"];

/// Render a read query.
pub fn render_query(query: &Query) -> LensResult<String> {
    match query {
        Query::CollectionCount {
            scope,
            kind,
            filtered,
            total,
            predicate,
            rows_table,
        } => render_collection_count(
            scope,
            *kind,
            *filtered,
            *total,
            predicate.as_ref(),
            rows_table.as_deref(),
        ),
        Query::AttributeCounts {
            entity,
            kind,
            filtered,
            rows_table,
        } => render_attribute_counts(*entity, *kind, *filtered, rows_table.as_deref()),
        Query::RowCount { entity, source } => {
            let names = TableNames::new(entity.model);
            Ok(match source {
                RowSource::Table(table) => format!("SELECT count() AS cnt FROM {table}"),
                RowSource::Links { exact } => format!(
                    "SELECT {}(hb1) AS cnt\nFROM {}\nWHERE hb2={}",
                    if *exact { "uniqExact" } else { "uniq" },
                    names.hlink(),
                    entity.entity
                ),
            })
        }
        Query::Aggregate {
            scope,
            func,
            predicate,
        } => {
            let names = TableNames::new(scope.model);
            let mut conditions = dictionary_conditions(scope);
            if let Some(p) = predicate {
                conditions.push(render_predicate(p, scope.value_type));
            }
            Ok(format!(
                "SELECT {}(val) AS {}\nFROM {}{}",
                match func {
                    AggregateFn::Sum => "sum",
                    AggregateFn::Avg => "avg",
                },
                func.name(),
                names.dictionary(scope.value_type),
                where_clause(&conditions)
            ))
        }
        Query::Project(projection) => render_projection(projection),
        Query::SelectRows(selection) => render_row_selection(selection),
        Query::TableExists { name } => Ok(format!("EXISTS TABLE {name}")),
    }
}

/// Render a write statement. One statement may need several SQL statements.
pub fn render_statement(statement: &Statement) -> LensResult<Vec<String>> {
    match statement {
        Statement::DropTable { name } => Ok(vec![format!("DROP TABLE IF EXISTS {name}")]),
        Statement::CreateMemoryTable { name, column } => Ok(vec![format!(
            "CREATE TABLE {name} ( {column} UInt32 ) ENGINE = Memory"
        )]),
        Statement::InsertInto { table, source } => {
            Ok(vec![format!("INSERT INTO {table}\n{}", render_query(source)?)])
        }
        Statement::ClearStates { entity, attributes } => {
            let states = TableNames::new(entity.model).hatom_states();
            Ok(attributes
                .iter()
                .map(|attribute| {
                    let clauses: Vec<String> = STATE_COLUMNS
                        .iter()
                        .map(|col| {
                            format!("CLEAR COLUMN {col} IN PARTITION ({}, {attribute})", entity.entity)
                        })
                        .collect();
                    format!("ALTER TABLE {states} {}", clauses.join(", "))
                })
                .collect())
        }
        Statement::RefreshPositions {
            entity,
            rows_table,
            view,
        } => {
            let names = TableNames::new(entity.model);
            let states = names.hatom_states();
            Ok(vec![
                format!("DROP TABLE IF EXISTS {view}"),
                format!(
                    "CREATE VIEW {view} AS\n\
                     SELECT any(hb2) AS hb2, groupArray(hb1) AS hb1arr, count() AS cnt, ha2, ha1, 1 AS pos, 0 AS sel\n\
                     FROM {}\n\
                     WHERE hb2={} AND hb1 IN {rows_table}\n\
                     GROUP BY ha2, ha1\n\
                     ORDER BY ha2, ha1",
                    names.hlink(),
                    entity.entity
                ),
                format!("INSERT INTO {states}\nSELECT * FROM {view}"),
                format!("OPTIMIZE TABLE {states} FINAL"),
            ])
        }
        Statement::MarkSelected {
            entity,
            view,
            selections,
        } => {
            if selections.is_empty() {
                return Ok(Vec::new());
            }
            let states = TableNames::new(entity.model).hatom_states();
            let union = selections
                .iter()
                .map(|s| render_selected_values(*entity, s))
                .collect::<Vec<_>>()
                .join("\nUNION ALL\n");
            Ok(vec![
                format!("DROP TABLE IF EXISTS {view}"),
                format!("CREATE VIEW {view} AS\n{union}"),
                format!("INSERT INTO {states}\nSELECT * FROM {view}"),
                format!("OPTIMIZE TABLE {states} FINAL"),
            ])
        }
        Statement::ResetStates { model } => {
            let states = TableNames::new(*model).hatom_states();
            let columns = [
                ("hb1arr", "Array(UInt32) DEFAULT [] AFTER hb2"),
                ("cnt", "UInt32 DEFAULT 0 AFTER hb1arr"),
                ("pos", "UInt8 DEFAULT 0 AFTER ha1"),
                ("sel", "UInt8 DEFAULT 0 AFTER pos"),
            ];
            Ok(columns
                .iter()
                .flat_map(|(col, definition)| {
                    [
                        format!("ALTER TABLE {states} DROP COLUMN {col}"),
                        format!("ALTER TABLE {states} ADD COLUMN {col} {definition}"),
                    ]
                })
                .collect())
        }
    }
}

/// Render a predicate over the dictionary columns `val` and `ha1`.
pub fn render_predicate(predicate: &Predicate, value_type: ValueType) -> String {
    let column = |operand: &Operand| operand.column();
    let not = |negated: bool| if negated { "NOT " } else { "" };
    match predicate {
        Predicate::Compare { operand, op, value } => {
            format!("{} {} {}", column(operand), op.symbol(), literal(value))
        }
        Predicate::Between {
            operand,
            low,
            high,
            negated,
        } => format!(
            "{} {}BETWEEN {} AND {}",
            column(operand),
            not(*negated),
            literal(low),
            literal(high)
        ),
        Predicate::In {
            operand,
            values,
            negated,
        } => {
            let items: Vec<String> = values.iter().map(literal).collect();
            format!("{} {}IN ({})", column(operand), not(*negated), items.join(", "))
        }
        Predicate::Like {
            operand,
            pattern,
            negated,
        } => {
            let target = match (operand, value_type) {
                (Operand::Value, ValueType::String) => "val".to_string(),
                (operand, _) => format!("toString({})", operand.column()),
            };
            format!("{target} {}LIKE {}", not(*negated), quote(pattern))
        }
        Predicate::InTable {
            operand,
            table,
            negated,
        } => format!("{} {}IN {table}", column(operand), not(*negated)),
        Predicate::IsTrue { operand } => column(operand).to_string(),
        Predicate::And(l, r) => format!(
            "({} AND {})",
            render_predicate(l, value_type),
            render_predicate(r, value_type)
        ),
        Predicate::Or(l, r) => format!(
            "({} OR {})",
            render_predicate(l, value_type),
            render_predicate(r, value_type)
        ),
        Predicate::Not(inner) => format!("NOT ({})", render_predicate(inner, value_type)),
    }
}

/// Render a literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => u8::from(*b).to_string(),
        Value::Int64(i) => i.to_string(),
        Value::Float64(f) if f.is_nan() => "nan".to_string(),
        Value::Float64(f) if f.is_infinite() => {
            if *f > 0.0 { "inf" } else { "-inf" }.to_string()
        }
        Value::Float64(f) => format!("{f:?}"),
        Value::String(s) => quote(s),
        Value::Date(days) => format!("toDate('{}')", format_date(*days)),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// Quote a string literal.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        match c {
            '\'' => quoted.push_str("\\'"),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\t' => quoted.push_str("\\t"),
            other => quoted.push(other),
        }
    }
    quoted.push('\'');
    quoted
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("\nWHERE {}", conditions.join(" AND "))
    }
}

/// `ha2` restriction plus the owner restriction of junction scopes.
fn dictionary_conditions(scope: &AttributeScope) -> Vec<String> {
    let mut conditions = vec![format!("ha2={}", scope.attribute)];
    if let Some(owner) = scope.owner_filter() {
        conditions.push(format!("hb2={owner}"));
    }
    conditions
}

fn render_collection_count(
    scope: &AttributeScope,
    kind: CollectionKind,
    filtered: bool,
    total: bool,
    predicate: Option<&Predicate>,
    rows_table: Option<&str>,
) -> LensResult<String> {
    let names = TableNames::new(scope.model);
    let matching = match predicate {
        Some(p) if !total => {
            let mut conditions = dictionary_conditions(scope);
            conditions.push(render_predicate(p, scope.value_type));
            Some(format!(
                "ha1 IN (SELECT ha1 FROM {}{})",
                names.dictionary(scope.value_type),
                where_clause(&conditions).replace('\n', " ")
            ))
        }
        _ => None,
    };
    let mut conditions = if total {
        Vec::new()
    } else {
        dictionary_conditions(scope)
    };
    conditions.extend(matching.clone());
    let (select, from) = match kind {
        CollectionKind::Set => ("count()", names.hatom_states()),
        CollectionKind::Bag if filtered => ("sum(cnt)", names.hatom_states()),
        CollectionKind::Bag => ("count()", names.hlink()),
        CollectionKind::Val => {
            let mut conditions = vec![format!("hb2={}", scope.owner)];
            if !total {
                conditions.push(format!("ha2={}", scope.attribute));
                conditions.extend(matching);
            }
            if filtered {
                let table = rows_table.ok_or_else(|| {
                    LensError::invalid_parameter("filtered row count needs the current row set")
                })?;
                conditions.push(format!("hb1 IN {table}"));
            }
            return Ok(format!(
                "SELECT uniqExact(hb1) AS cnt\nFROM {}{}",
                names.hlink(),
                where_clause(&conditions)
            ));
        }
    };
    if filtered {
        conditions.push("pos=1".to_string());
    }
    Ok(format!(
        "SELECT {select} AS cnt\nFROM {from}{}",
        where_clause(&conditions)
    ))
}

fn render_attribute_counts(
    entity: EntityKey,
    kind: CollectionKind,
    filtered: bool,
    rows_table: Option<&str>,
) -> LensResult<String> {
    let names = TableNames::new(entity.model);
    let mut conditions = vec![format!("hb2={}", entity.entity)];
    let from = match (kind, filtered) {
        (CollectionKind::Set, true) => {
            conditions.push("pos=1".to_string());
            names.hatom_states()
        }
        (CollectionKind::Set, false) => names.hatom(),
        (CollectionKind::Bag, true) => {
            let table = rows_table.ok_or_else(|| {
                LensError::invalid_parameter("filtered bag counts need the current row set")
            })?;
            conditions.push(format!("hb1 IN {table}"));
            names.hlink()
        }
        (CollectionKind::Bag, false) => names.hlink(),
        (CollectionKind::Val, _) => {
            return Err(LensError::invalid_parameter(
                "per-attribute counts are defined for set and bag collections",
            ));
        }
    };
    Ok(format!(
        "SELECT ha2, count() AS cnt\nFROM {from}{}\nGROUP BY ha2\nORDER BY ha2",
        where_clause(&conditions)
    ))
}

fn column_expr(column: Column, scope: &AttributeScope) -> String {
    match column {
        Column::Key => "[toUInt32(ha2), ha1] AS hatom".to_string(),
        Column::FullKey => format!("[toUInt32({}), toUInt32(ha2), ha1] AS hatom", scope.model),
        other => other.name().to_string(),
    }
}

fn render_projection(projection: &Projection) -> LensResult<String> {
    let scope = &projection.scope;
    let names = TableNames::new(scope.model);
    if projection.source == AtomSource::Atoms
        && (projection.excluded.is_some() || projection.columns.iter().any(Column::needs_states))
    {
        return Err(LensError::operation(
            "selection flags are only available on the states table",
        ));
    }
    let (left, flags) = match projection.source {
        AtomSource::Atoms => (names.hatom(), ""),
        AtomSource::States => (names.hatom_states(), ", pos, sel"),
    };
    let mut right = dictionary_conditions(scope);
    if let Some(p) = &projection.predicate {
        right.push(render_predicate(p, scope.value_type));
    }
    let using = if scope.junction {
        "ha2, ha1, hb2"
    } else {
        "ha2, ha1"
    };
    let columns: Vec<String> = projection
        .columns
        .iter()
        .map(|c| column_expr(*c, scope))
        .collect();

    let mut sql = format!(
        "SELECT {}\nFROM\n(\nSELECT ha2, ha1, hb2, cnt, hb1arr{flags}\nFROM {left}{}\n)\n\
         ANY INNER JOIN\n(\nSELECT ha2, ha1, val{}\nFROM {}{}\n) USING {using}",
        columns.join(", "),
        where_clause(&dictionary_conditions(scope)),
        if scope.junction { ", hb2" } else { "" },
        names.dictionary(scope.value_type),
        where_clause(&right),
    );
    match projection.excluded {
        Some(true) => sql.push_str("\nWHERE pos=0"),
        Some(false) => sql.push_str("\nWHERE pos=1"),
        None => {}
    }
    if !projection.order.is_empty() {
        let keys: Vec<String> = projection
            .order
            .iter()
            .map(|k| {
                format!(
                    "{} {}",
                    k.column.name(),
                    if k.descending { "DESC" } else { "ASC" }
                )
            })
            .collect();
        sql.push_str(&format!("\nORDER BY {}", keys.join(", ")));
    }
    if let Some((limit, offset)) = projection.limit {
        sql.push_str(&format!("\nLIMIT {offset}, {limit}"));
    }
    Ok(sql)
}

fn render_selection(selection: &Selection) -> String {
    let scope = &selection.scope;
    let mut conditions = dictionary_conditions(scope);
    if let Some(p) = &selection.predicate {
        conditions.push(render_predicate(p, scope.value_type));
    }
    format!(
        "SELECT arrayJoin(hb1arr) AS hb1\nFROM {}{}",
        TableNames::new(scope.model).dictionary(scope.value_type),
        where_clause(&conditions)
    )
}

fn render_row_selection(selection: &RowSelection) -> LensResult<String> {
    if selection.selections.is_empty() {
        return Err(LensError::operation("row selection without selections"));
    }
    let union = selection
        .selections
        .iter()
        .map(render_selection)
        .collect::<Vec<_>>()
        .join("\nUNION ALL\n");
    let within = selection
        .within
        .as_ref()
        .map(|table| format!("\nWHERE hb1 IN {table}"))
        .unwrap_or_default();
    Ok(format!(
        "SELECT DISTINCT hb1\nFROM\n(\n{union}\n){within}\nORDER BY hb1"
    ))
}

fn render_selected_values(entity: EntityKey, selection: &Selection) -> String {
    let scope = &selection.scope;
    let mut conditions = dictionary_conditions(scope);
    if let Some(p) = &selection.predicate {
        conditions.push(render_predicate(p, scope.value_type));
    }
    format!(
        "SELECT hb2, hb1arr, cnt, ha2, ha1, pos, if(pos=1, 1, 0) AS sel\n\
         FROM {}\n\
         WHERE hb2={} AND ha2={} AND ha1 IN\n\
         (SELECT ha1\nFROM {}{})",
        TableNames::new(entity.model).hatom_states(),
        entity.entity,
        scope.attribute,
        TableNames::new(scope.model).dictionary(scope.value_type),
        where_clause(&conditions)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::CmpOp;

    fn scope(junction: bool) -> AttributeScope {
        AttributeScope {
            model: 1,
            attribute: 4,
            value_type: ValueType::String,
            owner: 2,
            junction,
        }
    }

    #[test]
    fn test_literals_are_escaped() {
        assert_eq!(literal(&Value::from("O'Hara")), "'O\\'Hara'");
        assert_eq!(literal(&Value::Float64(2.0)), "2.0");
        assert_eq!(literal(&Value::Bool(true)), "1");
        assert_eq!(literal(&Value::Date(0)), "toDate('1970-01-01')");
    }

    #[test]
    fn test_predicate_rendering() {
        let p = Predicate::Compare {
            operand: Operand::Value,
            op: CmpOp::GtEq,
            value: Value::Int64(10),
        }
        .and(Predicate::InTable {
            operand: Operand::ValueId,
            table: "FLT_1_2_MEM_ha1".to_string(),
            negated: true,
        });
        assert_eq!(
            render_predicate(&p, ValueType::UInt32),
            "(val >= 10 AND ha1 NOT IN FLT_1_2_MEM_ha1)"
        );
        let like = Predicate::Like {
            operand: Operand::Value,
            pattern: "B%".to_string(),
            negated: false,
        };
        assert_eq!(render_predicate(&like, ValueType::UInt32), "toString(val) LIKE 'B%'");
    }

    #[test]
    fn test_junction_scope_restricts_owner() {
        let sql = render_selection(&Selection {
            scope: scope(true),
            predicate: None,
        });
        assert!(sql.ends_with("WHERE ha2=4 AND hb2=2"));
        let sql = render_selection(&Selection {
            scope: scope(false),
            predicate: None,
        });
        assert!(sql.ends_with("WHERE ha2=4"));
    }

    #[test]
    fn test_clear_states_one_statement_per_attribute() {
        let sql = render_statement(&Statement::ClearStates {
            entity: EntityKey::new(1, 2),
            attributes: vec![3, 4],
        })
        .unwrap();
        assert_eq!(sql.len(), 2);
        assert!(sql[1].starts_with("ALTER TABLE HAtom_1States CLEAR COLUMN hb1arr IN PARTITION (2, 4)"));
    }

    #[test]
    fn test_flags_need_states_source() {
        let projection = Projection {
            scope: scope(false),
            columns: vec![Column::Value, Column::Selected],
            source: AtomSource::Atoms,
            excluded: None,
            predicate: None,
            order: Vec::new(),
            limit: None,
        };
        assert!(matches!(
            render_projection(&projection),
            Err(LensError::Operation(_))
        ));
    }
}
