//! In-memory execution engine.
//!
//! Tables are created on first insert and hold rows as column maps. SELECTs
//! are evaluated with nested-loop joins, grouping, aggregates, distinct,
//! ordering and limit/offset. Every executed statement is recorded so tests
//! can assert how many round trips an operation took.

use super::{ExecutionEngine, ResultSet, Row};
use crate::error::{OrmError, Result, UsageError};
use crate::expr::{BinaryOperator, Expression, Function, Order};
use crate::schema::PRIMARY_KEY;
use crate::statement::{Delete, Insert, JoinType, Select, Statement, Update};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// One stored row
pub type Record = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    rows: Vec<Record>,
    last_id: i64,
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    snapshots: Vec<BTreeMap<String, MemoryTable>>,
    log: Vec<Statement>,
    last_insert_id: Option<Value>,
}

/// Table alias to the row currently bound to it; a missing alias is the
/// null side of a LEFT JOIN.
type Scope<'a> = BTreeMap<&'a str, &'a Record>;

enum Context<'s, 'a> {
    Row(&'s Scope<'a>),
    Group(&'s [Scope<'a>]),
}

/// Execution engine over in-memory tables
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| OrmError::Execution("memory engine state poisoned".to_string()))
    }

    /// Every statement executed so far
    pub fn statements(&self) -> Vec<Statement> {
        self.state().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Number of statements executed so far
    pub fn statement_count(&self) -> usize {
        self.state().map(|state| state.log.len()).unwrap_or_default()
    }

    pub fn clear_log(&self) {
        if let Ok(mut state) = self.state() {
            state.log.clear();
        }
    }

    /// Insert rows without logging them; ids are assigned as for INSERT
    pub fn seed<I, R, K, V>(&self, table: &str, rows: I)
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let Ok(mut state) = self.state() else {
            return;
        };
        for row in rows {
            let insert = Insert {
                table: table.to_string(),
                values: row.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            };
            if let Err(err) = run_insert(&mut state, &insert) {
                log::warn!("seeding {table} failed: {err}");
            }
        }
    }

    /// Stored rows of a table, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.state()
            .ok()
            .and_then(|state| state.tables.get(table).map(|table| table.rows.clone()))
            .unwrap_or_default()
    }
}

impl ExecutionEngine for MemoryEngine {
    fn execute(&self, statement: &Statement) -> Result<ResultSet> {
        let mut state = self.state()?;
        state.log.push(statement.clone());
        match statement {
            Statement::Select(select) => Ok(ResultSet {
                rows: run_select(&state.tables, select)?,
                affected: 0,
            }),
            Statement::Insert(insert) => run_insert(&mut state, insert),
            Statement::Update(update) => run_update(&mut state.tables, update),
            Statement::Delete(delete) => run_delete(&mut state.tables, delete),
        }
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state()?;
        let snapshot = state.tables.clone();
        state.snapshots.push(snapshot);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.state()?
            .snapshots
            .pop()
            .map(|_| ())
            .ok_or_else(|| OrmError::Execution("commit without transaction".to_string()))
    }

    fn rollback(&self) -> Result<()> {
        let mut state = self.state()?;
        let snapshot = state
            .snapshots
            .pop()
            .ok_or_else(|| OrmError::Execution("rollback without transaction".to_string()))?;
        state.tables = snapshot;
        Ok(())
    }

    fn last_insert_id(&self) -> Option<Value> {
        self.state().ok().and_then(|state| state.last_insert_id.clone())
    }
}

fn run_insert(state: &mut State, insert: &Insert) -> Result<ResultSet> {
    let table = state.tables.entry(insert.table.clone()).or_default();
    let mut record: Record = insert.values.iter().cloned().collect();
    let id = match record.get(PRIMARY_KEY).and_then(Value::as_i64) {
        Some(id) => {
            table.last_id = table.last_id.max(id);
            Value::Int(id)
        }
        None => {
            table.last_id += 1;
            Value::Int(table.last_id)
        }
    };
    record.insert(PRIMARY_KEY.to_string(), id.clone());
    table.rows.push(record);
    state.last_insert_id = Some(id);
    Ok(ResultSet {
        rows: Vec::new(),
        affected: 1,
    })
}

fn matching_rows(table: &str, rows: &[Record], condition: Option<&Expression>) -> Result<Vec<usize>> {
    let mut matching = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let matches = match condition {
            Some(condition) => {
                let scope: Scope = BTreeMap::from([(table, row)]);
                eval(condition, &Context::Row(&scope))?.is_truthy()
            }
            None => true,
        };
        if matches {
            matching.push(index);
        }
    }
    Ok(matching)
}

fn run_update(tables: &mut BTreeMap<String, MemoryTable>, update: &Update) -> Result<ResultSet> {
    let Some(table) = tables.get_mut(&update.table) else {
        return Ok(ResultSet::default());
    };
    let matching = matching_rows(&update.table, &table.rows, update.condition.as_ref())?;
    for &index in &matching {
        if let Some(row) = table.rows.get_mut(index) {
            for (column, value) in &update.values {
                row.insert(column.clone(), value.clone());
            }
        }
    }
    Ok(ResultSet {
        rows: Vec::new(),
        affected: matching.len() as u64,
    })
}

fn run_delete(tables: &mut BTreeMap<String, MemoryTable>, delete: &Delete) -> Result<ResultSet> {
    let Some(table) = tables.get_mut(&delete.table) else {
        return Ok(ResultSet::default());
    };
    let matching: BTreeSet<usize> = matching_rows(&delete.table, &table.rows, delete.condition.as_ref())?
        .into_iter()
        .collect();
    let mut index = 0;
    table.rows.retain(|_| {
        let keep = !matching.contains(&index);
        index += 1;
        keep
    });
    Ok(ResultSet {
        rows: Vec::new(),
        affected: matching.len() as u64,
    })
}

fn run_select(tables: &BTreeMap<String, MemoryTable>, select: &Select) -> Result<Vec<Row>> {
    let rows_of = |table: &str| tables.get(table).map_or(&[][..], |table| table.rows.as_slice());

    let mut scopes: Vec<Scope> = rows_of(&select.table)
        .iter()
        .map(|row| BTreeMap::from([(select.alias.as_str(), row)]))
        .collect();

    for join in &select.joins {
        let candidates = rows_of(&join.table);
        let mut joined = Vec::new();
        for scope in scopes {
            let mut matched = false;
            for row in candidates {
                let mut candidate = scope.clone();
                candidate.insert(join.alias.as_str(), row);
                if eval(&join.on, &Context::Row(&candidate))?.is_truthy() {
                    joined.push(candidate);
                    matched = true;
                }
            }
            if !matched && join.join_type == JoinType::Left {
                joined.push(scope);
            }
        }
        scopes = joined;
    }

    if let Some(condition) = &select.condition {
        let mut kept = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if eval(condition, &Context::Row(&scope))?.is_truthy() {
                kept.push(scope);
            }
        }
        scopes = kept;
    }

    let grouped = !select.group_by.is_empty()
        || select.fields.iter().any(|field| field.expression.has_aggregate());
    let mut groups: Vec<Vec<Scope>> = if grouped {
        let mut keys: Vec<Vec<String>> = Vec::new();
        let mut groups: Vec<Vec<Scope>> = Vec::new();
        for scope in scopes {
            let key = select
                .group_by
                .iter()
                .map(|expression| eval(expression, &Context::Row(&scope)).map(|value| value.key()))
                .collect::<Result<Vec<_>>>()?;
            match keys.iter().position(|existing| existing == &key) {
                Some(position) => groups[position].push(scope),
                None => {
                    keys.push(key);
                    groups.push(vec![scope]);
                }
            }
        }
        if groups.is_empty() && select.group_by.is_empty() {
            groups.push(Vec::new());
        }
        groups
    } else {
        scopes.into_iter().map(|scope| vec![scope]).collect()
    };

    if let Some(having) = &select.having {
        let mut kept = Vec::with_capacity(groups.len());
        for group in groups {
            if eval(having, &Context::Group(&group))?.is_truthy() {
                kept.push(group);
            }
        }
        groups = kept;
    }

    if !select.order_by.is_empty() {
        let mut keyed = Vec::with_capacity(groups.len());
        for group in groups {
            let key = select
                .order_by
                .iter()
                .map(|order_by| eval(&order_by.expression, &Context::Group(&group)))
                .collect::<Result<Vec<_>>>()?;
            keyed.push((key, group));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            select
                .order_by
                .iter()
                .zip(a.iter().zip(b.iter()))
                .map(|(order_by, (a, b))| match order_by.order {
                    Order::Asc => a.sort_cmp(b),
                    Order::Desc => b.sort_cmp(a),
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        groups = keyed.into_iter().map(|(_, group)| group).collect();
    }

    let mut rows = Vec::with_capacity(groups.len());
    let mut seen = BTreeSet::new();
    for group in &groups {
        let mut columns = Vec::with_capacity(select.fields.len());
        for field in &select.fields {
            columns.push((field.alias.clone(), eval(&field.expression, &Context::Group(group))?));
        }
        if select.distinct {
            let key: Vec<String> = columns.iter().map(|(_, value)| value.key()).collect();
            if !seen.insert(key) {
                continue;
            }
        }
        rows.push(Row { columns });
    }

    let offset = usize::try_from(select.offset.unwrap_or(0)).unwrap_or(usize::MAX);
    let limit = select
        .limit
        .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

fn eval(expression: &Expression, context: &Context<'_, '_>) -> Result<Value> {
    Ok(match expression {
        Expression::Field(path) => return Err(UsageError::UnsupportedPath(path.clone()).into()),
        Expression::Column { table, column } => {
            let scope = match context {
                Context::Row(scope) => Some(*scope),
                Context::Group(group) => group.first(),
            };
            scope
                .and_then(|scope| scope.get(table.as_str()))
                .and_then(|row| row.get(column))
                .cloned()
                .unwrap_or(Value::Null)
        }
        Expression::Value(value) => value.clone(),
        Expression::List(_) => {
            return Err(OrmError::Execution("value list outside of IN".to_string()))
        }
        Expression::Asterisk => Value::Null,
        Expression::Binary(left, op, right) => binary(left, *op, right, context)?,
        Expression::Not(inner) => Value::Bool(!eval(inner, context)?.is_truthy()),
        Expression::IsNull(inner) => Value::Bool(eval(inner, context)?.is_null()),
        Expression::IsNotNull(inner) => Value::Bool(!eval(inner, context)?.is_null()),
        Expression::Function(function, args) if function.is_aggregate() => {
            let Context::Group(group) = context else {
                return Err(OrmError::Execution(format!(
                    "aggregate {function:?} outside of a group"
                )));
            };
            aggregate(*function, args, group)?
        }
        Expression::Function(function, args) => {
            let value = match args.first() {
                Some(arg) => eval(arg, context)?,
                None => Value::Null,
            };
            match (function, value) {
                (Function::Lower, Value::Text(text)) => Value::Text(text.to_lowercase()),
                (Function::Upper, Value::Text(text)) => Value::Text(text.to_uppercase()),
                (_, other) => other,
            }
        }
    })
}

fn binary(
    left: &Expression,
    op: BinaryOperator,
    right: &Expression,
    context: &Context<'_, '_>,
) -> Result<Value> {
    let left_value = eval(left, context)?;
    Ok(Value::Bool(match op {
        BinaryOperator::And => left_value.is_truthy() && eval(right, context)?.is_truthy(),
        BinaryOperator::Or => left_value.is_truthy() || eval(right, context)?.is_truthy(),
        BinaryOperator::In | BinaryOperator::NotIn => {
            let candidates = match right {
                Expression::List(values) => values.clone(),
                other => vec![eval(other, context)?],
            };
            if left_value.is_null() {
                false
            } else {
                let found = candidates
                    .iter()
                    .any(|candidate| left_value.compare(candidate) == Some(Ordering::Equal));
                found == (op == BinaryOperator::In)
            }
        }
        BinaryOperator::Like => {
            let right_value = eval(right, context)?;
            match (left_value.as_str(), right_value.as_str()) {
                (Some(text), Some(pattern)) => like(text, pattern),
                _ => false,
            }
        }
        comparison => {
            let ordering = left_value.compare(&eval(right, context)?);
            match comparison {
                BinaryOperator::Equal => ordering == Some(Ordering::Equal),
                BinaryOperator::NotEqual => ordering.is_some_and(|o| o != Ordering::Equal),
                BinaryOperator::LessThan => ordering == Some(Ordering::Less),
                BinaryOperator::LessThanOrEqual => {
                    matches!(ordering, Some(Ordering::Less | Ordering::Equal))
                }
                BinaryOperator::GreaterThan => ordering == Some(Ordering::Greater),
                _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            }
        }
    }))
}

fn aggregate(function: Function, args: &[Expression], group: &[Scope<'_>]) -> Result<Value> {
    let mut values = Vec::with_capacity(group.len());
    match args {
        [] | [Expression::Asterisk] => {
            if function == Function::Count {
                return Ok(Value::Int(group.len() as i64));
            }
        }
        [arg] => {
            for scope in group {
                let value = eval(arg, &Context::Row(scope))?;
                if !value.is_null() {
                    values.push(value);
                }
            }
        }
        // Tuples: rows with a NULL member do not count
        args => {
            for scope in group {
                let members = args
                    .iter()
                    .map(|arg| eval(arg, &Context::Row(scope)))
                    .collect::<Result<Vec<_>>>()?;
                if members.iter().all(|member| !member.is_null()) {
                    let key: Vec<String> = members.iter().map(Value::key).collect();
                    values.push(Value::Text(key.join("\u{1f}")));
                }
            }
        }
    }
    Ok(match function {
        Function::Count => Value::Int(values.len() as i64),
        Function::CountDistinct => {
            let distinct: BTreeSet<String> = values.iter().map(Value::key).collect();
            Value::Int(distinct.len() as i64)
        }
        Function::Max => values
            .into_iter()
            .reduce(|a, b| if b.sort_cmp(&a) == Ordering::Greater { b } else { a })
            .unwrap_or(Value::Null),
        Function::Min => values
            .into_iter()
            .reduce(|a, b| if b.sort_cmp(&a) == Ordering::Less { b } else { a })
            .unwrap_or(Value::Null),
        Function::Sum if values.iter().all(|value| matches!(value, Value::Int(_))) => {
            Value::Int(values.iter().filter_map(Value::as_i64).sum())
        }
        Function::Sum => Value::Float(values.iter().filter_map(Value::as_f64).sum()),
        Function::Avg if values.is_empty() => Value::Null,
        Function::Avg => {
            Value::Float(values.iter().filter_map(Value::as_f64).sum::<f64>() / values.len() as f64)
        }
        Function::Lower | Function::Upper => Value::Null,
    })
}

/// SQL `LIKE` with `%` and `_` wildcards
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    // matches[j]: pattern[..i] matches text[..j]
    let mut matches = vec![false; text.len() + 1];
    matches[0] = true;
    for &p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if p == '%' {
            let mut any = false;
            for j in 0..=text.len() {
                any |= matches[j];
                next[j] = any;
            }
        } else {
            for j in 1..=text.len() {
                next[j] = matches[j - 1] && (p == '_' || p == text[j - 1]);
            }
        }
        matches = next;
    }
    matches[text.len()]
}
