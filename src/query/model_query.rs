//! The query builder and relation fetch orchestrator.
//!
//! A [`ModelQuery`] describes one query against one model. Running it compiles
//! a single SELECT with [`QueryParser`], executes it, turns every row into an
//! [`Entry`] and then expands the relations the compiled statement could not
//! join inline, recursing until the requested depth is used up.

use super::fetch;
use super::locale;
use super::parser::{parse_order, CompiledQuery, QueryParser};
use super::result::ResultParser;
use crate::config::OrmConfig;
use crate::engine::{execute_logged, ExecutionEngine};
use crate::entry::{Entry, FromEntry};
use crate::error::{OrmError, Result, UsageError};
use crate::expr::{field, BinaryOperator, Expression, Order};
use crate::schema::{ModelMeta, ModelRegister};
use crate::statement::{JoinType, OrderBy, Statement};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// One entry of the field list
///
/// Plain entries name a field of the queried model (or a one hop path like
/// `author.name`); custom expressions carry the alias their value is returned
/// under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryField {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl QueryField {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            expression: field(name),
            alias: None,
        }
    }

    /// Name of a plain field entry
    pub fn name(&self) -> Option<&str> {
        match (&self.expression, &self.alias) {
            (Expression::Field(name), None) => Some(name),
            _ => None,
        }
    }
}

/// A user join, addressable by its alias in field paths
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryJoin {
    pub join_type: JoinType,
    pub model: String,
    pub alias: String,
    pub on: Expression,
}

/// Fluent description of a query on one model
///
/// # Example
///
/// ```
/// use trellis::engine::MemoryEngine;
/// use trellis::expr::field;
/// use trellis::query::ModelQuery;
/// use trellis::schema::{Model, ModelRegister, PropertyType};
/// use trellis::OrmConfig;
///
/// let mut registry = ModelRegister::new();
/// registry
///     .register(Model::new("Tag").with_property("name", PropertyType::String))
///     .unwrap();
/// let engine = MemoryEngine::new();
/// let config = OrmConfig::default();
///
/// let mut query = ModelQuery::new(&registry, &engine, &config, "Tag").unwrap();
/// query.add_condition(field("name").like("r%"));
/// query.set_limit(10, 0).unwrap();
/// assert!(query.query().unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct ModelQuery<'a> {
    pub(crate) registry: &'a ModelRegister,
    pub(crate) engine: &'a dyn ExecutionEngine,
    pub(crate) config: &'a OrmConfig,
    pub(crate) meta: Arc<ModelMeta>,
    pub(crate) operator: BinaryOperator,
    pub(crate) distinct: bool,
    pub(crate) recursive_depth: Option<u32>,
    pub(crate) locale: String,
    pub(crate) include_unlocalized: bool,
    pub(crate) fetch_unlocalized: bool,
    pub(crate) localized_first: bool,
    pub(crate) fields: Option<Vec<QueryField>>,
    pub(crate) joins: Vec<QueryJoin>,
    pub(crate) conditions: Vec<Expression>,
    pub(crate) group_by: Vec<Expression>,
    pub(crate) having: Vec<Expression>,
    pub(crate) order_by: Vec<OrderBy>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: u64,
}

impl fmt::Debug for ModelQuery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelQuery")
            .field("model", &self.model())
            .field("operator", &self.operator)
            .field("distinct", &self.distinct)
            .field("recursive_depth", &self.recursive_depth)
            .field("locale", &self.locale)
            .field("fields", &self.fields)
            .field("conditions", &self.conditions)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl<'a> ModelQuery<'a> {
    /// A query selecting every field of `model` in the default locale
    pub fn new(
        registry: &'a ModelRegister,
        engine: &'a dyn ExecutionEngine,
        config: &'a OrmConfig,
        model: &str,
    ) -> Result<Self> {
        let meta = registry.meta(model)?;
        Ok(Self {
            registry,
            engine,
            config,
            meta,
            operator: BinaryOperator::And,
            distinct: false,
            recursive_depth: None,
            locale: config.default_locale.clone(),
            include_unlocalized: false,
            fetch_unlocalized: false,
            localized_first: false,
            fields: None,
            joins: Vec::new(),
            conditions: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        })
    }

    pub fn model(&self) -> &str {
        self.meta.model()
    }

    pub fn meta(&self) -> &ModelMeta {
        &self.meta
    }

    /// Operator joining the conditions: `AND` or `OR`
    pub fn set_operator(&mut self, operator: &str) -> Result<&mut Self> {
        self.operator = match operator.trim().to_ascii_uppercase().as_str() {
            "AND" => BinaryOperator::And,
            "OR" => BinaryOperator::Or,
            _ => return Err(UsageError::InvalidOperator(operator.to_string()).into()),
        };
        Ok(self)
    }

    pub fn operator(&self) -> BinaryOperator {
        self.operator
    }

    pub fn set_distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Number of relation hops to fetch.
    ///
    /// `None` is capped at [`OrmConfig::max_recursive_depth`] hops. Negative
    /// depths are rejected.
    pub fn set_recursive_depth(&mut self, depth: Option<i64>) -> Result<&mut Self> {
        self.recursive_depth = match depth {
            None => None,
            Some(depth) => Some(
                u32::try_from(depth).map_err(|_| UsageError::InvalidRecursiveDepth(depth))?,
            ),
        };
        Ok(self)
    }

    pub fn recursive_depth(&self) -> Option<u32> {
        self.recursive_depth
    }

    /// Depth the query runs with
    pub fn resolved_depth(&self) -> u32 {
        self.recursive_depth
            .unwrap_or(self.config.max_recursive_depth)
    }

    pub fn set_locale(&mut self, locale: impl Into<String>) -> &mut Self {
        self.locale = locale.into();
        self
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Also return entries without values in the requested locale
    pub fn set_include_unlocalized(&mut self, include: bool) -> &mut Self {
        self.include_unlocalized = include;
        if !include {
            self.fetch_unlocalized = false;
        }
        self
    }

    pub fn includes_unlocalized(&self) -> bool {
        self.include_unlocalized
    }

    /// Fill entries missing the requested locale from the other configured
    /// locales; implies including unlocalized entries.
    pub fn set_fetch_unlocalized(&mut self, fetch: bool) -> &mut Self {
        self.fetch_unlocalized = fetch;
        if fetch {
            self.include_unlocalized = true;
        }
        self
    }

    pub fn fetches_unlocalized(&self) -> bool {
        self.fetch_unlocalized
    }

    /// Order entries with values in the requested locale before the others
    pub fn set_localized_first(&mut self, localized_first: bool) -> &mut Self {
        self.localized_first = localized_first;
        self
    }

    /// Current field list, every model field until it is changed
    pub fn fields(&self) -> Result<Vec<QueryField>> {
        match &self.fields {
            Some(fields) => Ok(fields.clone()),
            None => Ok(self
                .meta
                .fields()?
                .iter()
                .map(|name| QueryField::named(name.as_str()))
                .collect()),
        }
    }

    fn fields_mut(&mut self) -> Result<&mut Vec<QueryField>> {
        if self.fields.is_none() {
            self.fields = Some(self.fields()?);
        }
        Ok(self.fields.get_or_insert_with(Vec::new))
    }

    /// Replace the field list
    pub fn set_fields<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(QueryField::named).collect());
        self
    }

    /// Add a field (or a one hop path) to the list
    pub fn add_field(&mut self, name: &str) -> Result<&mut Self> {
        let fields = self.fields_mut()?;
        if !fields.iter().any(|field| field.name() == Some(name)) {
            fields.push(QueryField::named(name));
        }
        Ok(self)
    }

    /// Add a computed expression returned under `alias`
    pub fn add_field_as(&mut self, expression: Expression, alias: &str) -> Result<&mut Self> {
        if alias.trim().is_empty() {
            return Err(UsageError::MissingAlias(expression.to_string()).into());
        }
        self.fields_mut()?.push(QueryField {
            expression,
            alias: Some(alias.to_string()),
        });
        Ok(self)
    }

    /// Remove a plain field or a custom field by alias
    pub fn remove_field(&mut self, name: &str) -> Result<&mut Self> {
        let fields = self.fields_mut()?;
        let position = fields
            .iter()
            .position(|field| field.name() == Some(name) || field.alias.as_deref() == Some(name))
            .ok_or_else(|| UsageError::FieldNotInList(name.to_string()))?;
        fields.remove(position);
        Ok(self)
    }

    /// Join another model under `alias`; `on` may use paths of both sides
    pub fn add_join(
        &mut self,
        join_type: JoinType,
        model: &str,
        alias: &str,
        on: Expression,
    ) -> Result<&mut Self> {
        self.registry.get(model)?;
        self.joins.push(QueryJoin {
            join_type,
            model: model.to_string(),
            alias: alias.to_string(),
            on,
        });
        Ok(self)
    }

    pub fn add_condition(&mut self, condition: Expression) -> &mut Self {
        self.conditions.push(condition);
        self
    }

    pub fn add_group_by(&mut self, expression: Expression) -> &mut Self {
        self.group_by.push(expression);
        self
    }

    pub fn add_having(&mut self, condition: Expression) -> &mut Self {
        self.having.push(condition);
        self
    }

    pub fn add_order_by(&mut self, expression: Expression, order: Order) -> &mut Self {
        self.order_by.push(OrderBy { expression, order });
        self
    }

    /// Add orderings written as text, `"name ASC, id DESC"`
    pub fn add_order(&mut self, order: &str) -> Result<&mut Self> {
        for (expression, order) in parse_order(order)? {
            self.add_order_by(expression, order);
        }
        Ok(self)
    }

    /// Limit the result; a limit of 0 removes it
    pub fn set_limit(&mut self, limit: i64, offset: i64) -> Result<&mut Self> {
        let (Ok(limit), Ok(offset)) = (u64::try_from(limit), u64::try_from(offset)) else {
            return Err(UsageError::InvalidLimit { limit, offset }.into());
        };
        self.limit = (limit > 0).then_some(limit);
        self.offset = offset;
        Ok(self)
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Compile the SELECT statement of this query
    pub fn compile(&self) -> Result<CompiledQuery> {
        QueryParser::new(self).parse_select()
    }

    /// Run the query and materialize every row with its relations
    pub fn query(&self) -> Result<Vec<Entry>> {
        let compiled = self.compile()?;
        self.run(&compiled)
    }

    /// First entry of the result
    pub fn query_first(&self) -> Result<Option<Entry>> {
        let mut first = self.clone();
        first.limit = Some(1);
        first.offset = 0;
        Ok(first.query()?.into_iter().next())
    }

    /// Run the query and convert every entry
    pub fn query_as<T: FromEntry>(&self) -> Result<Vec<T>> {
        self.query()?.into_iter().map(Entry::into_typed).collect()
    }

    /// Number of entries the query matches, ignoring limit and offset
    pub fn count(&self) -> Result<u64> {
        if !self.having.is_empty() {
            // Filtered groups cannot be counted in one statement
            let mut grouped = self.clone();
            grouped.limit = None;
            grouped.offset = 0;
            let compiled = grouped.compile()?;
            let result = execute_logged(self.engine, &Statement::Select(compiled.select))?;
            return Ok(result.rows.len() as u64);
        }
        let select = QueryParser::new(self).parse_count()?;
        let result = execute_logged(self.engine, &Statement::Select(select))?;
        let count = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .ok_or_else(|| OrmError::Data(format!("count of {} returned no number", self.model())))?;
        u64::try_from(count).map_err(|_| OrmError::Data(format!("negative count {count}")))
    }

    /// Execute a compiled statement and materialize the result
    pub(crate) fn run(&self, compiled: &CompiledQuery) -> Result<Vec<Entry>> {
        let result = execute_logged(self.engine, &Statement::Select(compiled.select.clone()))?;
        let parser = ResultParser::new(self.registry, &self.meta, &self.locale);
        let mut entries = result
            .rows
            .iter()
            .map(|row| parser.parse_row(row))
            .collect::<Result<Vec<_>>>()?;
        if compiled.depth > 0 {
            fetch::expand(self, compiled, &mut entries)?;
        }
        if self.fetch_unlocalized && self.meta.is_localized()? {
            locale::fetch_unlocalized(self, &mut entries)?;
        }
        Ok(entries)
    }

    /// A query on a related model inheriting the localization settings
    pub(crate) fn sub_query(&self, model: &str, depth: u32) -> Result<ModelQuery<'a>> {
        let mut query = ModelQuery::new(self.registry, self.engine, self.config, model)?;
        query.recursive_depth = Some(depth);
        query.locale = self.locale.clone();
        query.include_unlocalized = self.include_unlocalized;
        query.fetch_unlocalized = self.fetch_unlocalized;
        Ok(query)
    }

    /// Structural text of the query with every bound variable replaced by a
    /// placeholder, plus the variables in placeholder order.
    ///
    /// Queries differing only in their bound values share the text.
    pub fn template(&self) -> Result<(String, Vec<Value>)> {
        let mut out = String::new();
        let mut variables = Vec::new();
        let _ = write!(
            out,
            "{}|{:?}|{}|{:?}|{}|{}|{}|{}",
            self.model(),
            self.operator,
            self.distinct,
            self.recursive_depth,
            self.locale,
            self.include_unlocalized,
            self.fetch_unlocalized,
            self.localized_first
        );
        for field in self.fields()? {
            out.push_str("|f:");
            field.expression.write_template(&mut out, &mut variables);
            if let Some(alias) = &field.alias {
                let _ = write!(out, " AS {alias}");
            }
        }
        for join in &self.joins {
            let _ = write!(out, "|j:{:?} {} {} ON ", join.join_type, join.model, join.alias);
            join.on.write_template(&mut out, &mut variables);
        }
        let sections = [
            ("c", &self.conditions),
            ("g", &self.group_by),
            ("h", &self.having),
        ];
        for (tag, expressions) in sections {
            for expression in expressions {
                let _ = write!(out, "|{tag}:");
                expression.write_template(&mut out, &mut variables);
            }
        }
        for order_by in &self.order_by {
            out.push_str("|o:");
            order_by.expression.write_template(&mut out, &mut variables);
            let _ = write!(out, " {:?}", order_by.order);
        }
        Ok((out, variables))
    }

    /// Copy of the query with every bound variable replaced by its
    /// placeholder, in the order [`template`](Self::template) numbers them.
    pub(crate) fn templated(&self) -> Result<(ModelQuery<'a>, Vec<Value>)> {
        let mut templated = self.clone();
        let mut variables = Vec::new();
        let mut placeholder = |value: &Value| {
            variables.push(value.clone());
            Value::Text(format!("%{}%", variables.len()))
        };
        let fields = self
            .fields()?
            .into_iter()
            .map(|field| QueryField {
                expression: field.expression.map_values(&mut placeholder),
                alias: field.alias,
            })
            .collect();
        templated.fields = Some(fields);
        for join in &mut templated.joins {
            join.on = join.on.map_values(&mut placeholder);
        }
        for expressions in [
            &mut templated.conditions,
            &mut templated.group_by,
            &mut templated.having,
        ] {
            for expression in expressions.iter_mut() {
                *expression = expression.map_values(&mut placeholder);
            }
        }
        for order_by in &mut templated.order_by {
            order_by.expression = order_by.expression.map_values(&mut placeholder);
        }
        Ok((templated, variables))
    }
}

/// Put bound variables back into a statement compiled from a
/// [`templated`](ModelQuery::templated) query.
pub(crate) fn bind_placeholders(compiled: &mut CompiledQuery, variables: &[Value]) {
    compiled.select.map_values(&mut |value: &Value| {
        value
            .as_str()
            .and_then(|text| text.strip_prefix('%'))
            .and_then(|text| text.strip_suffix('%'))
            .and_then(|index| index.parse::<usize>().ok())
            .and_then(|index| index.checked_sub(1))
            .and_then(|index| variables.get(index))
            .cloned()
            .unwrap_or_else(|| value.clone())
    });
}
