//! Typed expressions for fields, conditions, grouping and ordering.
//!
//! Queries refer to model fields by *path*: `"title"` is a field of the queried
//! model, `"author.name"` is the `name` field of the model the `author`
//! relation points at. The statement compiler resolves paths into table
//! aliases and adds the joins they need; after compilation every path has been
//! replaced by an [`Expression::Column`].
//!
//! # Example
//!
//! ```
//! use trellis::expr::{field, val};
//!
//! let condition = field("author.name").eq("Jane").and(field("published").eq(true));
//! let in_list = field("id").is_in([1, 2, 3]);
//! assert_ne!(condition, in_list);
//! ```

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    In,
    NotIn,
    And,
    Or,
}

impl BinaryOperator {
    fn as_sql(self) -> &'static str {
        match self {
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::In => "IN",
            BinaryOperator::NotIn => "NOT IN",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
        }
    }
}

/// Functions, aggregates included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Function {
    Count,
    CountDistinct,
    Max,
    Min,
    Sum,
    Avg,
    Lower,
    Upper,
}

impl Function {
    /// Whether the function folds a group of rows into one value
    pub fn is_aggregate(self) -> bool {
        !matches!(self, Function::Lower | Function::Upper)
    }

    fn name(self) -> &'static str {
        match self {
            Function::Count | Function::CountDistinct => "COUNT",
            Function::Max => "MAX",
            Function::Min => "MIN",
            Function::Sum => "SUM",
            Function::Avg => "AVG",
            Function::Lower => "LOWER",
            Function::Upper => "UPPER",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// An expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Unresolved field path (`title`, `author.name`)
    Field(String),
    /// Resolved column of a table alias
    Column { table: String, column: String },
    /// Bound variable
    Value(Value),
    /// List of bound variables, right-hand side of `IN`
    List(Vec<Value>),
    /// `*`
    Asterisk,
    Binary(Box<Expression>, BinaryOperator, Box<Expression>),
    Not(Box<Expression>),
    IsNull(Box<Expression>),
    IsNotNull(Box<Expression>),
    Function(Function, Vec<Expression>),
}

/// Reference a field by path
pub fn field(path: impl Into<String>) -> Expression {
    Expression::Field(path.into())
}

/// Bind a variable
pub fn val(value: impl Into<Value>) -> Expression {
    Expression::Value(value.into())
}

/// Resolved column reference
pub fn column(table: impl Into<String>, column: impl Into<String>) -> Expression {
    Expression::Column {
        table: table.into(),
        column: column.into(),
    }
}

/// `COUNT(*)`
pub fn count_all() -> Expression {
    Expression::Function(Function::Count, vec![Expression::Asterisk])
}

impl From<Value> for Expression {
    fn from(value: Value) -> Self {
        Expression::Value(value)
    }
}

macro_rules! impl_expression_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expression {
                fn from(value: $ty) -> Self {
                    Expression::Value(value.into())
                }
            }
        )*
    };
}

impl_expression_from_scalar!(bool, i32, i64, u32, f64, &str, String);

impl Expression {
    fn binary(self, op: BinaryOperator, right: impl Into<Expression>) -> Expression {
        Expression::Binary(Box::new(self), op, Box::new(right.into()))
    }

    pub fn eq(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::Equal, right)
    }

    pub fn ne(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::NotEqual, right)
    }

    pub fn lt(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::LessThan, right)
    }

    pub fn lte(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::LessThanOrEqual, right)
    }

    pub fn gt(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::GreaterThan, right)
    }

    pub fn gte(self, right: impl Into<Expression>) -> Expression {
        self.binary(BinaryOperator::GreaterThanOrEqual, right)
    }

    /// `LIKE` with `%` and `_` wildcards
    pub fn like(self, pattern: impl Into<String>) -> Expression {
        self.binary(BinaryOperator::Like, Expression::Value(Value::Text(pattern.into())))
    }

    pub fn is_in<V, I>(self, values: I) -> Expression
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.binary(BinaryOperator::In, Expression::List(list))
    }

    pub fn not_in<V, I>(self, values: I) -> Expression
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.binary(BinaryOperator::NotIn, Expression::List(list))
    }

    pub fn and(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(self, right: Expression) -> Expression {
        self.binary(BinaryOperator::Or, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expression {
        Expression::Not(Box::new(self))
    }

    pub fn is_null(self) -> Expression {
        Expression::IsNull(Box::new(self))
    }

    pub fn is_not_null(self) -> Expression {
        Expression::IsNotNull(Box::new(self))
    }

    pub fn count(self) -> Expression {
        Expression::Function(Function::Count, vec![self])
    }

    pub fn count_distinct(self) -> Expression {
        Expression::Function(Function::CountDistinct, vec![self])
    }

    pub fn max(self) -> Expression {
        Expression::Function(Function::Max, vec![self])
    }

    pub fn min(self) -> Expression {
        Expression::Function(Function::Min, vec![self])
    }

    pub fn sum(self) -> Expression {
        Expression::Function(Function::Sum, vec![self])
    }

    pub fn avg(self) -> Expression {
        Expression::Function(Function::Avg, vec![self])
    }

    pub fn lower(self) -> Expression {
        Expression::Function(Function::Lower, vec![self])
    }

    pub fn upper(self) -> Expression {
        Expression::Function(Function::Upper, vec![self])
    }

    /// Fold a list of conditions with AND or OR; `None` when the list is empty.
    pub fn fold<I>(conditions: I, op: BinaryOperator) -> Option<Expression>
    where
        I: IntoIterator<Item = Expression>,
    {
        conditions
            .into_iter()
            .reduce(|acc, next| Expression::Binary(Box::new(acc), op, Box::new(next)))
    }

    /// Whether any aggregate function appears in this expression
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expression::Function(function, args) => {
                function.is_aggregate() || args.iter().any(Expression::has_aggregate)
            }
            Expression::Binary(left, _, right) => left.has_aggregate() || right.has_aggregate(),
            Expression::Not(inner) | Expression::IsNull(inner) | Expression::IsNotNull(inner) => {
                inner.has_aggregate()
            }
            _ => false,
        }
    }

    /// Every field path referenced by this expression
    pub fn field_paths(&self) -> Vec<&str> {
        let mut paths = Vec::new();
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a str>) {
        match self {
            Expression::Field(path) => paths.push(path),
            Expression::Binary(left, _, right) => {
                left.collect_paths(paths);
                right.collect_paths(paths);
            }
            Expression::Not(inner) | Expression::IsNull(inner) | Expression::IsNotNull(inner) => {
                inner.collect_paths(paths);
            }
            Expression::Function(_, args) => args.iter().for_each(|arg| arg.collect_paths(paths)),
            _ => {}
        }
    }

    /// Rewrite every field path with `f`, leaving everything else untouched.
    pub fn try_map_fields<F, E>(&self, f: &mut F) -> Result<Expression, E>
    where
        F: FnMut(&str) -> Result<Expression, E>,
    {
        Ok(match self {
            Expression::Field(path) => f(path)?,
            Expression::Binary(left, op, right) => Expression::Binary(
                Box::new(left.try_map_fields(f)?),
                *op,
                Box::new(right.try_map_fields(f)?),
            ),
            Expression::Not(inner) => Expression::Not(Box::new(inner.try_map_fields(f)?)),
            Expression::IsNull(inner) => Expression::IsNull(Box::new(inner.try_map_fields(f)?)),
            Expression::IsNotNull(inner) => {
                Expression::IsNotNull(Box::new(inner.try_map_fields(f)?))
            }
            Expression::Function(function, args) => Expression::Function(
                *function,
                args.iter()
                    .map(|arg| arg.try_map_fields(f))
                    .collect::<Result<_, _>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Rewrite every bound variable with `f`, list items included.
    pub fn map_values<F>(&self, f: &mut F) -> Expression
    where
        F: FnMut(&Value) -> Value,
    {
        match self {
            Expression::Value(value) => Expression::Value(f(value)),
            Expression::List(values) => Expression::List(values.iter().map(|value| f(value)).collect()),
            Expression::Binary(left, op, right) => Expression::Binary(
                Box::new(left.map_values(f)),
                *op,
                Box::new(right.map_values(f)),
            ),
            Expression::Not(inner) => Expression::Not(Box::new(inner.map_values(f))),
            Expression::IsNull(inner) => Expression::IsNull(Box::new(inner.map_values(f))),
            Expression::IsNotNull(inner) => Expression::IsNotNull(Box::new(inner.map_values(f))),
            Expression::Function(function, args) => {
                Expression::Function(*function, args.iter().map(|arg| arg.map_values(f)).collect())
            }
            other => other.clone(),
        }
    }

    /// Write this expression with every bound variable replaced by a
    /// placeholder `%n%`, numbering from the current length of `variables`.
    ///
    /// Two expressions with the same shape produce the same text no matter
    /// which values they bind; the values end up in `variables` in order.
    pub fn write_template(&self, out: &mut String, variables: &mut Vec<Value>) {
        match self {
            Expression::Field(path) => {
                let _ = write!(out, "{{{path}}}");
            }
            Expression::Column { table, column } => {
                let _ = write!(out, "{table}.{column}");
            }
            Expression::Value(value) => {
                variables.push(value.clone());
                let _ = write!(out, "%{}%", variables.len());
            }
            Expression::List(values) => {
                out.push('(');
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    variables.push(value.clone());
                    let _ = write!(out, "%{}%", variables.len());
                }
                out.push(')');
            }
            Expression::Asterisk => out.push('*'),
            Expression::Binary(left, op, right) => {
                out.push('(');
                left.write_template(out, variables);
                let _ = write!(out, " {} ", op.as_sql());
                right.write_template(out, variables);
                out.push(')');
            }
            Expression::Not(inner) => {
                out.push_str("NOT ");
                inner.write_template(out, variables);
            }
            Expression::IsNull(inner) => {
                inner.write_template(out, variables);
                out.push_str(" IS NULL");
            }
            Expression::IsNotNull(inner) => {
                inner.write_template(out, variables);
                out.push_str(" IS NOT NULL");
            }
            Expression::Function(function, args) => {
                out.push_str(function.name());
                out.push('(');
                if *function == Function::CountDistinct {
                    out.push_str("DISTINCT ");
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write_template(out, variables);
                }
                out.push(')');
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut text = String::new();
        let mut variables = Vec::new();
        self.write_template(&mut text, &mut variables);
        // Inline the bound values for human readable output
        for (i, value) in variables.iter().enumerate().rev() {
            text = text.replace(&format!("%{}%", i + 1), &value.to_string());
        }
        f.write_str(&text)
    }
}
