//! Abstract relational statements.
//!
//! The query compiler and the persistence layer produce [`Statement`]s; an
//! [`ExecutionEngine`](crate::engine::ExecutionEngine) runs them. Statements
//! only contain resolved [`Expression::Column`] references, never field paths.
//! [`sql`] renders them with `sea-query` for engines backed by a real
//! database.

pub mod sql;

use crate::expr::{Expression, Order};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
}

/// A joined table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: String,
    pub on: Expression,
}

/// One selected expression and the column alias it is returned under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectField {
    pub expression: Expression,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expression: Expression,
    pub order: Order,
}

/// A SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Select {
    pub table: String,
    pub alias: String,
    pub distinct: bool,
    pub fields: Vec<SelectField>,
    pub joins: Vec<Join>,
    pub condition: Option<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Option<Expression>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// Select from `table` under `alias`, nothing selected yet
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
            distinct: false,
            fields: Vec::new(),
            joins: Vec::new(),
            condition: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn field(&mut self, expression: Expression, alias: impl Into<String>) -> &mut Self {
        self.fields.push(SelectField {
            expression,
            alias: alias.into(),
        });
        self
    }

    /// Add a join unless one with the same alias exists
    pub fn join(&mut self, join: Join) -> &mut Self {
        if !self.has_join(&join.alias) {
            self.joins.push(join);
        }
        self
    }

    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|join| join.alias == alias)
    }

    /// AND a condition onto the existing one
    pub fn and_where(&mut self, condition: Expression) -> &mut Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    /// Rewrite every bound variable of the statement with `f`
    pub fn map_values<F>(&mut self, f: &mut F)
    where
        F: FnMut(&Value) -> Value,
    {
        for field in &mut self.fields {
            field.expression = field.expression.map_values(f);
        }
        for join in &mut self.joins {
            join.on = join.on.map_values(f);
        }
        if let Some(condition) = &self.condition {
            self.condition = Some(condition.map_values(f));
        }
        for expression in &mut self.group_by {
            *expression = expression.map_values(f);
        }
        if let Some(having) = &self.having {
            self.having = Some(having.map_values(f));
        }
        for order_by in &mut self.order_by {
            order_by.expression = order_by.expression.map_values(f);
        }
    }
}

/// An INSERT of one row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insert {
    pub table: String,
    pub values: Vec<(String, Value)>,
}

/// An UPDATE; conditions refer to columns of `table` by its own name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub table: String,
    pub values: Vec<(String, Value)>,
    pub condition: Option<Expression>,
}

/// A DELETE; conditions refer to columns of `table` by its own name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delete {
    pub table: String,
    pub condition: Option<Expression>,
}

/// Any statement the core sends to the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Select(_) => "select",
            Statement::Insert(_) => "insert",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
        }
    }

    pub fn table(&self) -> &str {
        match self {
            Statement::Select(select) => &select.table,
            Statement::Insert(insert) => &insert.table,
            Statement::Update(update) => &update.table,
            Statement::Delete(delete) => &delete.table,
        }
    }

    pub fn as_select(&self) -> Option<&Select> {
        match self {
            Statement::Select(select) => Some(select),
            _ => None,
        }
    }
}

impl From<Select> for Statement {
    fn from(select: Select) -> Self {
        Statement::Select(select)
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match sql::to_sql_string(self) {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<{} on {}>", self.kind(), self.table()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::column;

    #[test]
    fn test_join_is_added_once() {
        let mut select = Select::new("Post", "self");
        let join = Join {
            join_type: JoinType::Left,
            table: "Author".into(),
            alias: "author".into(),
            on: column("self", "author").eq(column("author", "id")),
        };
        select.join(join.clone()).join(join);
        assert_eq!(select.joins.len(), 1);
    }

    #[test]
    fn test_and_where_accumulates() {
        let mut select = Select::new("Post", "self");
        select
            .and_where(column("self", "id").eq(1))
            .and_where(column("self", "title").eq("x"));
        assert_eq!(
            select.condition,
            Some(column("self", "id").eq(1).and(column("self", "title").eq("x")))
        );
    }

    #[test]
    fn test_map_values_covers_every_clause() {
        let mut select = Select::new("Post", "self");
        select
            .and_where(column("self", "id").eq(1))
            .order_by
            .push(OrderBy {
                expression: column("self", "rank").eq(1),
                order: Order::Asc,
            });
        select.map_values(&mut |_| Value::Int(7));
        assert_eq!(select.condition, Some(column("self", "id").eq(7)));
        assert_eq!(select.order_by[0].expression, column("self", "rank").eq(7));
    }
}
