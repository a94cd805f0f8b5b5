//! Rendering of abstract statements with `sea-query`.
//!
//! ```
//! use trellis::expr::column;
//! use trellis::statement::{sql, Select, Statement};
//!
//! let mut select = Select::new("Post", "self");
//! select
//!     .field(column("self", "title"), "title")
//!     .and_where(column("self", "id").eq(1));
//! let text = sql::to_sql_string(&Statement::Select(select)).unwrap();
//! assert!(text.contains(r#"FROM "Post" AS "self""#));
//! ```

use crate::error::{OrmError, Result, UsageError};
use crate::expr::{BinaryOperator, Expression, Function, Order};
use crate::statement::{Delete, Insert, JoinType, Select, Statement, Update};
use sea_query::{
    Asterisk, BinOper, DeleteStatement, Expr, ExprTrait, Func, FunctionCall, Iden,
    InsertStatement, PostgresQueryBuilder, Query, QueryBuilder, SelectStatement,
    UpdateStatement, Values,
};

/// Owned identifier for tables, aliases and columns
struct Name(String);

impl Name {
    fn new(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl Iden for Name {
    fn unquoted(&self) -> &str {
        &self.0
    }
}

fn value(value: &crate::value::Value) -> Expr {
    Expr::val(sea_query::Value::from(value))
}

fn bin_oper(op: BinaryOperator) -> BinOper {
    match op {
        BinaryOperator::Equal => BinOper::Equal,
        BinaryOperator::NotEqual => BinOper::NotEqual,
        BinaryOperator::LessThan => BinOper::SmallerThan,
        BinaryOperator::LessThanOrEqual => BinOper::SmallerThanOrEqual,
        BinaryOperator::GreaterThan => BinOper::GreaterThan,
        BinaryOperator::GreaterThanOrEqual => BinOper::GreaterThanOrEqual,
        BinaryOperator::Like => BinOper::Like,
        BinaryOperator::In => BinOper::In,
        BinaryOperator::NotIn => BinOper::NotIn,
        BinaryOperator::And => BinOper::And,
        BinaryOperator::Or => BinOper::Or,
    }
}

/// Lower a resolved expression into a `sea-query` expression
pub fn lower_expression(expression: &Expression) -> Result<Expr> {
    Ok(match expression {
        Expression::Field(path) => return Err(UsageError::UnsupportedPath(path.clone()).into()),
        Expression::Column { table, column } => Expr::col((Name::new(table), Name::new(column))),
        Expression::Value(v) => value(v),
        Expression::List(values) => Expr::tuple(values.iter().map(value)),
        Expression::Asterisk => Expr::col(Asterisk),
        Expression::Binary(left, op, right) => {
            let left = lower_expression(left)?;
            match (op, right.as_ref()) {
                (BinaryOperator::In, Expression::List(values)) => left.is_in(values.iter().map(value)),
                (BinaryOperator::NotIn, Expression::List(values)) => {
                    left.is_not_in(values.iter().map(value))
                }
                _ => left.binary(bin_oper(*op), lower_expression(right)?),
            }
        }
        Expression::Not(inner) => lower_expression(inner)?.not(),
        Expression::IsNull(inner) => lower_expression(inner)?.is_null(),
        Expression::IsNotNull(inner) => lower_expression(inner)?.is_not_null(),
        Expression::Function(function, args) => {
            let arg = match args.as_slice() {
                [] => Expr::col(Asterisk),
                [arg] => lower_expression(arg)?,
                args => Expr::tuple(args.iter().map(lower_expression).collect::<Result<Vec<_>>>()?),
            };
            let call: FunctionCall = match function {
                Function::Count => Func::count(arg),
                Function::CountDistinct => Func::count_distinct(arg),
                Function::Max => Func::max(arg),
                Function::Min => Func::min(arg),
                Function::Sum => Func::sum(arg),
                Function::Avg => Func::avg(arg),
                Function::Lower => Func::lower(arg),
                Function::Upper => Func::upper(arg),
            };
            call.into()
        }
    })
}

fn lower_select(select: &Select) -> Result<SelectStatement> {
    let mut query = Query::select();
    query.from_as(Name::new(&select.table), Name::new(&select.alias));
    if select.distinct {
        query.distinct();
    }
    for field in &select.fields {
        query.expr_as(lower_expression(&field.expression)?, Name::new(&field.alias));
    }
    for join in &select.joins {
        let join_type = match join.join_type {
            JoinType::Inner => sea_query::JoinType::InnerJoin,
            JoinType::Left => sea_query::JoinType::LeftJoin,
        };
        query.join_as(
            join_type,
            Name::new(&join.table),
            Name::new(&join.alias),
            lower_expression(&join.on)?,
        );
    }
    if let Some(condition) = &select.condition {
        query.and_where(lower_expression(condition)?);
    }
    if !select.group_by.is_empty() {
        let group_by = select
            .group_by
            .iter()
            .map(lower_expression)
            .collect::<Result<Vec<_>>>()?;
        query.add_group_by(group_by);
    }
    if let Some(having) = &select.having {
        query.and_having(lower_expression(having)?);
    }
    for order_by in &select.order_by {
        let order = match order_by.order {
            Order::Asc => sea_query::Order::Asc,
            Order::Desc => sea_query::Order::Desc,
        };
        query.order_by_expr(lower_expression(&order_by.expression)?, order);
    }
    if let Some(limit) = select.limit {
        query.limit(limit);
    }
    if let Some(offset) = select.offset {
        query.offset(offset);
    }
    Ok(query)
}

fn lower_insert(insert: &Insert) -> Result<InsertStatement> {
    let mut query = Query::insert();
    query.into_table(Name::new(&insert.table));
    if insert.values.is_empty() {
        query.or_default_values();
        return Ok(query);
    }
    query.columns(insert.values.iter().map(|(column, _)| Name::new(column)));
    query
        .values(insert.values.iter().map(|(_, v)| value(v)))
        .map_err(|err| OrmError::Execution(err.to_string()))?;
    Ok(query)
}

fn lower_update(update: &Update) -> Result<UpdateStatement> {
    let mut query = Query::update();
    query.table(Name::new(&update.table));
    for (column, v) in &update.values {
        query.value(Name::new(column), value(v));
    }
    if let Some(condition) = &update.condition {
        query.and_where(lower_expression(condition)?);
    }
    Ok(query)
}

fn lower_delete(delete: &Delete) -> Result<DeleteStatement> {
    let mut query = Query::delete();
    query.from_table(Name::new(&delete.table));
    if let Some(condition) = &delete.condition {
        query.and_where(lower_expression(condition)?);
    }
    Ok(query)
}

/// Render a statement into SQL text plus bound values
pub fn build_statement<B: QueryBuilder>(statement: &Statement, builder: B) -> Result<(String, Values)> {
    Ok(match statement {
        Statement::Select(select) => lower_select(select)?.build(builder),
        Statement::Insert(insert) => lower_insert(insert)?.build(builder),
        Statement::Update(update) => lower_update(update)?.build(builder),
        Statement::Delete(delete) => lower_delete(delete)?.build(builder),
    })
}

/// Render a statement as PostgreSQL text with values inlined, for logs
pub fn to_sql_string(statement: &Statement) -> Result<String> {
    Ok(match statement {
        Statement::Select(select) => lower_select(select)?.to_string(PostgresQueryBuilder),
        Statement::Insert(insert) => lower_insert(insert)?.to_string(PostgresQueryBuilder),
        Statement::Update(update) => lower_update(update)?.to_string(PostgresQueryBuilder),
        Statement::Delete(delete) => lower_delete(delete)?.to_string(PostgresQueryBuilder),
    })
}
