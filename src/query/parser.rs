//! Compilation of a [`ModelQuery`] into one SELECT statement.
//!
//! Aliases follow one convention: the queried model is `self`, its localized
//! shadow `self_localized`, a relation joined for a field is aliased by the
//! field name (its shadow by `<field>_localized`, its link model by
//! `<field>_link`). Columns of joined relations come back as
//! `<field>__<column>`; columns of the queried model keep their plain names.
//! Path fields such as `author.name` are read under the path itself. The
//! localized shadow is only joined when a localized value is read or
//! unlocalized entries are included.

use super::model_query::ModelQuery;
use crate::error::{OrmError, Result, UsageError};
use crate::expr::{column, count_all, field, val, BinaryOperator, Expression, Function, Order};
use crate::schema::meta::{ForeignKey, ModelMeta, RelationMeta};
use crate::schema::register::{LOCALE_FIELD, LOCALIZED_ENTRY_FIELD};
use crate::schema::{Model, RelationKind, PRIMARY_KEY};
use crate::statement::{Join, JoinType, OrderBy, Select, SelectField};
use serde::{Deserialize, Serialize};

/// Alias of the queried model
pub const SELF_ALIAS: &str = "self";
/// Alias of the localized shadow of the queried model
pub const LOCALIZED_ALIAS: &str = "self_localized";
/// Separator between relation field and column in column aliases
pub const ALIAS_SEPARATOR: &str = "__";
/// Reserved column telling whether the requested locale was found
pub const IS_LOCALIZED_COLUMN: &str = "_is_localized";
/// Reserved column holding the id of the localized shadow row
pub const LOCALIZED_ID_COLUMN: &str = "_localized_id";

const COUNT_COLUMN: &str = "count";

/// A compiled SELECT plus what is left for the relation fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub select: Select,
    /// Belongs-to fields joined into the statement
    pub joined: Vec<String>,
    /// Belongs-to fields selected as raw foreign keys, fetched afterwards
    pub deferred: Vec<String>,
    /// Has-one and has-many fields, always fetched afterwards
    pub has: Vec<String>,
    /// Recursion depth the statement was compiled for
    pub depth: u32,
}

/// Compiles one [`ModelQuery`]
pub struct QueryParser<'q, 'a> {
    query: &'q ModelQuery<'a>,
}

impl<'q, 'a> QueryParser<'q, 'a> {
    pub fn new(query: &'q ModelQuery<'a>) -> Self {
        Self { query }
    }

    fn meta(&self) -> &ModelMeta {
        self.query.meta()
    }

    fn model(&self) -> Result<&'a Model> {
        self.query.registry.get(self.query.model())
    }

    fn unknown_field(model: &str, field: &str) -> OrmError {
        UsageError::UnknownField {
            model: model.to_string(),
            field: field.to_string(),
        }
        .into()
    }

    /// Compile the SELECT statement
    pub fn parse_select(&self) -> Result<CompiledQuery> {
        let depth = self.query.resolved_depth();
        let model = self.model()?;
        let mut select = self.parse_base()?;
        let mut joined = Vec::new();
        let mut deferred = Vec::new();
        let mut has = Vec::new();

        let fields = self.query.fields()?;
        let aggregated = !self.query.group_by.is_empty()
            || fields.iter().any(|field| field.expression.has_aggregate());

        for query_field in &fields {
            if let Some(alias) = &query_field.alias {
                let expression = self.resolve(&query_field.expression, &mut select)?;
                select.field(expression, alias.as_str());
                continue;
            }
            let Expression::Field(name) = &query_field.expression else {
                return Err(UsageError::MissingAlias(query_field.expression.to_string()).into());
            };
            if name.contains('.') {
                // `__` aliases are reserved for inline relation columns
                let expression = self.resolve_path(name, &mut select)?;
                let alias = name.strip_prefix("self.").unwrap_or(name);
                select.field(expression, alias);
                continue;
            }

            let field = model
                .field(name)
                .ok_or_else(|| Self::unknown_field(model.name(), name))?;
            if field.is_has() {
                if depth > 0 {
                    has.push(name.clone());
                }
            } else if field.is_belongs_to() {
                if depth == 0 {
                    continue;
                }
                let relation = self.meta().relation_meta(name)?;
                let target = self.query.registry.meta(&relation.model)?;
                if depth == 1 || !target.has_relation_fields()? {
                    self.join_relation(relation, &mut select)?;
                    select_target_fields(name, &target, &mut select)?;
                    joined.push(name.clone());
                } else {
                    let expression = self.local_column(name, field.localized, &mut select)?;
                    select.field(expression, name.as_str());
                    deferred.push(name.clone());
                }
            } else {
                let expression = self.local_column(name, field.localized, &mut select)?;
                select.field(expression, name.as_str());
            }
        }

        let localized = select.has_join(LOCALIZED_ALIAS);
        if localized && self.query.include_unlocalized && self.query.localized_first {
            select.order_by.push(OrderBy {
                expression: column(LOCALIZED_ALIAS, PRIMARY_KEY).is_not_null(),
                order: Order::Desc,
            });
        }
        for order_by in &self.query.order_by {
            let expression = self.resolve(&order_by.expression, &mut select)?;
            select.order_by.push(OrderBy {
                expression,
                order: order_by.order,
            });
        }

        if !aggregated {
            let primary_key = model.primary_key();
            if !select.fields.iter().any(|field| field.alias == primary_key) {
                select.fields.insert(
                    0,
                    SelectField {
                        expression: column(SELF_ALIAS, primary_key),
                        alias: primary_key.to_string(),
                    },
                );
            }
            if select.has_join(LOCALIZED_ALIAS) {
                select
                    .field(column(LOCALIZED_ALIAS, PRIMARY_KEY), LOCALIZED_ID_COLUMN)
                    .field(
                        column(LOCALIZED_ALIAS, PRIMARY_KEY).is_not_null(),
                        IS_LOCALIZED_COLUMN,
                    );
            }
        }

        select.distinct |= self.query.distinct;
        select.limit = self.query.limit;
        select.offset = (self.query.offset > 0).then_some(self.query.offset);

        Ok(CompiledQuery {
            select,
            joined,
            deferred,
            has,
            depth,
        })
    }

    /// Compile the COUNT statement: fields, ordering and limits stripped
    pub fn parse_count(&self) -> Result<Select> {
        let model = self.model()?;
        let mut select = self.parse_base()?;
        let expression = if self.query.distinct || select.distinct {
            column(SELF_ALIAS, model.primary_key()).count_distinct()
        } else if !select.group_by.is_empty() {
            Expression::Function(Function::CountDistinct, std::mem::take(&mut select.group_by))
        } else {
            count_all()
        };
        select.distinct = false;
        select.group_by.clear();
        select.having = None;
        select.field(expression, COUNT_COLUMN);
        Ok(select)
    }

    /// Table, joins, conditions and grouping shared by SELECT and COUNT
    fn parse_base(&self) -> Result<Select> {
        let mut select = Select::new(self.query.model(), SELF_ALIAS);
        if self.needs_localization()? {
            self.join_localization(&mut select)?;
        }

        for join in &self.query.joins {
            let on = self.resolve(&join.on, &mut select)?;
            select.join(Join {
                join_type: join.join_type,
                table: join.model.clone(),
                alias: join.alias.clone(),
                on,
            });
        }

        let conditions = self
            .query
            .conditions
            .iter()
            .map(|condition| self.resolve(condition, &mut select))
            .collect::<Result<Vec<_>>>()?;
        if let Some(condition) = Expression::fold(conditions, self.query.operator) {
            select.and_where(condition);
        }

        for expression in &self.query.group_by {
            let expression = self.resolve(expression, &mut select)?;
            select.group_by.push(expression);
        }
        let having = self
            .query
            .having
            .iter()
            .map(|condition| self.resolve(condition, &mut select))
            .collect::<Result<Vec<_>>>()?;
        select.having = Expression::fold(having, BinaryOperator::And);

        Ok(select)
    }

    /// Whether the selected fields or the ordering read localized values.
    ///
    /// Conditions and groupings add the join while they are resolved, for
    /// the SELECT and the COUNT alike.
    fn needs_localization(&self) -> Result<bool> {
        if !self.meta().is_localized()? {
            return Ok(false);
        }
        if self.query.include_unlocalized {
            return Ok(true);
        }
        let depth = self.query.resolved_depth();
        let model = self.model()?;
        for query_field in self.query.fields()? {
            if let (None, Expression::Field(name)) = (&query_field.alias, &query_field.expression) {
                if !name.contains('.') {
                    let reads_shadow = model.field(name).is_some_and(|field| {
                        field.localized && (depth > 0 || !(field.is_has() || field.is_belongs_to()))
                    });
                    if reads_shadow {
                        return Ok(true);
                    }
                    continue;
                }
            }
            if self.reads_localized(&query_field.expression)? {
                return Ok(true);
            }
        }
        for order_by in &self.query.order_by {
            if self.reads_localized(&order_by.expression)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether any path of the expression resolves through the localized shadow
    fn reads_localized(&self, expression: &Expression) -> Result<bool> {
        let model = self.model()?;
        for path in expression.field_paths() {
            let first = match path.split('.').collect::<Vec<_>>().as_slice() {
                [name] => *name,
                [alias, name] if *alias == SELF_ALIAS => *name,
                [alias, _] if self.query.joins.iter().any(|join| join.alias == *alias) => continue,
                [alias, _] => *alias,
                _ => continue,
            };
            if model.field(first).is_some_and(|field| field.localized) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Column of a field of the queried model, joining the localized shadow
    /// for localized fields
    fn local_column(&self, name: &str, localized: bool, select: &mut Select) -> Result<Expression> {
        if localized {
            self.join_localization(select)?;
        }
        Ok(local_column(name, localized))
    }

    /// Join the localized shadow once, ahead of every other join
    fn join_localization(&self, select: &mut Select) -> Result<()> {
        if select.has_join(LOCALIZED_ALIAS) {
            return Ok(());
        }
        let shadow = self
            .meta()
            .localized_model()?
            .ok_or_else(|| OrmError::model_not_found(format!("localized {}", self.query.model())))?;
        let join_type = if self.query.include_unlocalized {
            JoinType::Left
        } else {
            JoinType::Inner
        };
        select.joins.insert(
            0,
            Join {
                join_type,
                table: shadow.to_string(),
                alias: LOCALIZED_ALIAS.to_string(),
                on: column(LOCALIZED_ALIAS, LOCALIZED_ENTRY_FIELD)
                    .eq(column(SELF_ALIAS, self.model()?.primary_key()))
                    .and(column(LOCALIZED_ALIAS, LOCALE_FIELD).eq(val(self.query.locale.as_str()))),
            },
        );
        Ok(())
    }

    /// Join the target of a relation field under the field name
    fn join_relation(&self, relation: &RelationMeta, select: &mut Select) -> Result<()> {
        let alias = relation.field.as_str();
        if select.has_join(alias) {
            return Ok(());
        }
        let target = self.query.registry.get(&relation.model)?;
        let target_key = column(alias, target.primary_key());
        let owner_key = if relation.localized {
            self.join_localization(select)?;
            column(LOCALIZED_ALIAS, PRIMARY_KEY)
        } else {
            column(SELF_ALIAS, self.model()?.primary_key())
        };

        let on = match (&relation.foreign_key, &relation.link_model) {
            (ForeignKey::Single { field }, _) if relation.kind == RelationKind::BelongsTo => {
                target_key.eq(self.local_column(field, self.meta().is_localized_field(field)?, select)?)
            }
            (ForeignKey::Single { field }, _) => {
                select.distinct = true;
                column(alias, field.as_str()).eq(owner_key)
            }
            (ForeignKey::Link { to_self, to_target }, Some(link_model)) => {
                let link = format!("{alias}_link");
                select.join(Join {
                    join_type: JoinType::Left,
                    table: link_model.clone(),
                    alias: link.clone(),
                    on: column(link.as_str(), to_self.as_str()).eq(owner_key),
                });
                select.distinct = true;
                target_key.eq(column(link, to_target.as_str()))
            }
            (ForeignKey::SelfLink { first, second }, Some(link_model)) => {
                let link = format!("{alias}_link");
                let first = column(link.as_str(), first.as_str());
                let second = column(link.as_str(), second.as_str());
                select.join(Join {
                    join_type: JoinType::Left,
                    table: link_model.clone(),
                    alias: link,
                    on: first.clone().eq(owner_key.clone()).or(second.clone().eq(owner_key.clone())),
                });
                select.distinct = true;
                target_key
                    .clone()
                    .eq(second.clone())
                    .and(first.clone().eq(owner_key.clone()))
                    .or(target_key.eq(first).and(second.eq(owner_key)))
            }
            (_, None) => {
                return Err(OrmError::Data(format!(
                    "relation {}.{} has a link key but no link model",
                    self.query.model(),
                    relation.field
                )))
            }
        };
        select.join(Join {
            join_type: JoinType::Left,
            table: relation.model.clone(),
            alias: alias.to_string(),
            on,
        });

        let target_meta = self.query.registry.meta(&relation.model)?;
        if let Some(shadow) = target_meta.localized_model()? {
            let shadow_alias = format!("{alias}_localized");
            select.join(Join {
                join_type: JoinType::Left,
                table: shadow.to_string(),
                alias: shadow_alias.clone(),
                on: column(shadow_alias.as_str(), LOCALIZED_ENTRY_FIELD)
                    .eq(column(alias, target.primary_key()))
                    .and(column(shadow_alias, LOCALE_FIELD).eq(val(self.query.locale.as_str()))),
            });
        }
        Ok(())
    }

    /// Replace every field path of an expression by its column
    fn resolve(&self, expression: &Expression, select: &mut Select) -> Result<Expression> {
        expression.try_map_fields(&mut |path: &str| self.resolve_path(path, select))
    }

    fn resolve_path(&self, path: &str, select: &mut Select) -> Result<Expression> {
        let parts: Vec<&str> = path.split('.').collect();
        match parts.as_slice() {
            [name] => self.resolve_field(name, select),
            [alias, name] if *alias == SELF_ALIAS => self.resolve_field(name, select),
            [alias, name] => {
                if let Some(join) = self.query.joins.iter().find(|join| join.alias == *alias) {
                    let joined = self.query.registry.get(&join.model)?;
                    if joined.field(name).is_none() {
                        return Err(Self::unknown_field(&join.model, name));
                    }
                    return Ok(column(*alias, *name));
                }
                let model = self.model()?;
                if model.field(alias).is_none() {
                    return Err(Self::unknown_field(model.name(), alias));
                }
                let relation = self.meta().relation_meta(alias)?;
                self.join_relation(relation, select)?;
                let target = self.query.registry.get(&relation.model)?;
                if target.field(name).is_none() {
                    return Err(Self::unknown_field(target.name(), name));
                }
                let target_meta = self.query.registry.meta(&relation.model)?;
                if target_meta.is_localized_field(name)? {
                    Ok(column(format!("{alias}_localized"), *name))
                } else {
                    Ok(column(*alias, *name))
                }
            }
            _ => Err(UsageError::UnsupportedPath(path.to_string()).into()),
        }
    }

    fn resolve_field(&self, name: &str, select: &mut Select) -> Result<Expression> {
        let model = self.model()?;
        let field = model
            .field(name)
            .ok_or_else(|| Self::unknown_field(model.name(), name))?;
        if field.is_has() {
            let relation = self.meta().relation_meta(name)?;
            self.join_relation(relation, select)?;
            let target = self.query.registry.get(&relation.model)?;
            return Ok(column(name, target.primary_key()));
        }
        self.local_column(name, field.localized, select)
    }
}

fn local_column(name: &str, localized: bool) -> Expression {
    if localized {
        column(LOCALIZED_ALIAS, name)
    } else {
        column(SELF_ALIAS, name)
    }
}

/// Select the non-relation fields of a joined belongs-to target
fn select_target_fields(relation_field: &str, target: &ModelMeta, select: &mut Select) -> Result<()> {
    for property in target.properties()? {
        let source = if target.is_localized_field(property)? {
            format!("{relation_field}_localized")
        } else {
            relation_field.to_string()
        };
        select.field(
            column(source, property.as_str()),
            format!("{relation_field}{ALIAS_SEPARATOR}{property}"),
        );
    }
    Ok(())
}

/// Parse orderings written as text: `"name ASC, author.name DESC"`
pub fn parse_order(text: &str) -> Result<Vec<(Expression, Order)>> {
    text.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut words = part.split_whitespace();
            let Some(path) = words.next() else {
                return Err(UsageError::UnsupportedPath(part.to_string()).into());
            };
            let order = match words.next().map(str::to_ascii_uppercase).as_deref() {
                None | Some("ASC") => Order::Asc,
                Some("DESC") => Order::Desc,
                Some(_) => return Err(UsageError::UnsupportedPath(part.to_string()).into()),
            };
            if words.next().is_some() {
                return Err(UsageError::UnsupportedPath(part.to_string()).into());
            }
            Ok((field(path), order))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrmConfig;
    use crate::engine::MemoryEngine;
    use crate::schema::{Field, ModelRegister, PropertyType};

    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn blog() -> ModelRegister {
        let mut registry = ModelRegister::new();
        registry
            .register(
                Model::new("Author")
                    .with_property("name", PropertyType::String)
                    .with_field(Field::has_many("posts", "Post")),
            )
            .expect("author");
        registry
            .register(
                Model::new("Post")
                    .with_property("title", PropertyType::String)
                    .with_field(Field::property("body", PropertyType::Text).localized())
                    .with_field(Field::belongs_to("author", "Author"))
                    .with_field(Field::has_many("tags", "Tag")),
            )
            .expect("post");
        registry
            .register(
                Model::new("Tag")
                    .with_property("name", PropertyType::String)
                    .with_field(Field::has_many("posts", "Post")),
            )
            .expect("tag");
        registry
    }

    fn aliases(select: &Select) -> Vec<&str> {
        select.fields.iter().map(|field| field.alias.as_str()).collect()
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_depth_one_joins_belongs_to_inline() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query.set_recursive_depth(Some(1)).expect("depth");

        let compiled = query.compile().expect("compile");
        assert_eq!(
            aliases(&compiled.select),
            vec![
                "id",
                "title",
                "body",
                "author__id",
                "author__name",
                "_localized_id",
                "_is_localized"
            ]
        );
        assert_eq!(compiled.joined, vec!["author"]);
        assert!(compiled.deferred.is_empty());
        assert_eq!(compiled.has, vec!["tags"]);

        let joins: Vec<(&str, JoinType)> = compiled
            .select
            .joins
            .iter()
            .map(|join| (join.alias.as_str(), join.join_type))
            .collect();
        assert_eq!(
            joins,
            vec![(LOCALIZED_ALIAS, JoinType::Inner), ("author", JoinType::Left)]
        );
        assert_eq!(
            compiled.select.fields[2].expression,
            column(LOCALIZED_ALIAS, "body")
        );
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_deeper_queries_defer_belongs_to() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query.set_recursive_depth(Some(2)).expect("depth");
        let compiled = query.compile().expect("compile");
        assert_eq!(compiled.deferred, vec!["author"]);
        assert!(aliases(&compiled.select).contains(&"author"));
        assert_eq!(compiled.select.joins.len(), 1);

        query.set_recursive_depth(Some(0)).expect("depth");
        let compiled = query.compile().expect("compile");
        assert!(compiled.joined.is_empty() && compiled.deferred.is_empty() && compiled.has.is_empty());
        assert!(!aliases(&compiled.select).contains(&"author"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_has_field_condition_joins_link_model() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query
            .set_recursive_depth(Some(0))
            .expect("depth")
            .add_condition(field("tags.name").eq("rust"));
        let compiled = query.compile().expect("compile");
        assert!(compiled.select.distinct);
        let link = compiled
            .select
            .joins
            .iter()
            .find(|join| join.alias == "tags_link")
            .expect("link join");
        assert_eq!(link.table, "PostTag");
        assert_eq!(link.on, column("tags_link", "post").eq(column(SELF_ALIAS, "id")));
        assert!(compiled.select.has_join("tags"));
        assert_eq!(
            compiled.select.condition,
            Some(column("tags", "name").eq("rust"))
        );
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_count_statements() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Tag").expect("query");
        query.add_order_by(field("name"), Order::Asc);
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert_eq!(count.fields[0].expression, count_all());
        assert!(count.order_by.is_empty());

        query.set_distinct(true);
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert_eq!(count.fields[0].expression, column(SELF_ALIAS, "id").count_distinct());

        query.set_distinct(false).add_group_by(field("name"));
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert_eq!(
            count.fields[0].expression,
            Expression::Function(Function::CountDistinct, vec![column(SELF_ALIAS, "name")])
        );
        assert!(count.group_by.is_empty());
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_include_unlocalized_uses_left_join() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query
            .set_recursive_depth(Some(0))
            .expect("depth")
            .set_include_unlocalized(true)
            .set_localized_first(true)
            .set_locale("fr");
        let compiled = query.compile().expect("compile");
        let join = &compiled.select.joins[0];
        assert_eq!(join.join_type, JoinType::Left);
        assert_eq!(
            join.on,
            column(LOCALIZED_ALIAS, "entry")
                .eq(column(SELF_ALIAS, "id"))
                .and(column(LOCALIZED_ALIAS, "locale").eq("fr"))
        );
        assert_eq!(compiled.select.order_by[0].order, Order::Desc);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_plain_fields_skip_localization_join() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query
            .set_recursive_depth(Some(0))
            .expect("depth")
            .set_fields(["id", "title"]);

        let compiled = query.compile().expect("compile");
        assert_eq!(aliases(&compiled.select), vec!["id", "title"]);
        assert!(compiled.select.joins.is_empty());
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert!(count.joins.is_empty());

        // Reading a localized value, even only in a condition, brings it back
        query.add_condition(field("body").eq("Hi"));
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert_eq!(count.joins[0].alias, LOCALIZED_ALIAS);
        let compiled = query.compile().expect("compile");
        assert_eq!(
            aliases(&compiled.select),
            vec!["id", "title", "_localized_id", "_is_localized"]
        );
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_localized_ordering_joins_shadow_first() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query
            .set_recursive_depth(Some(0))
            .expect("depth")
            .set_fields(["id"])
            .add_condition(field("author.name").eq("Ann"))
            .add_order_by(field("body"), Order::Asc);

        let compiled = query.compile().expect("compile");
        let joins: Vec<&str> = compiled.select.joins.iter().map(|join| join.alias.as_str()).collect();
        assert_eq!(joins, vec![LOCALIZED_ALIAS, "author"]);
        let count = QueryParser::new(&query).parse_count().expect("count");
        assert_eq!(count.joins.len(), 2);
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_path_fields_keep_their_path_as_alias() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query
            .set_recursive_depth(Some(2))
            .expect("depth")
            .set_fields(["title", "author", "author.name"]);

        let compiled = query.compile().expect("compile");
        assert_eq!(compiled.deferred, vec!["author"]);
        let selected = aliases(&compiled.select);
        assert!(selected.contains(&"author.name"));
        assert!(!selected.iter().any(|alias| alias.contains(ALIAS_SEPARATOR)));
        let path = compiled
            .select
            .fields
            .iter()
            .find(|field| field.alias == "author.name")
            .expect("path field");
        assert_eq!(path.expression, column("author", "name"));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_path_errors() {
        let registry = blog();
        let engine = MemoryEngine::new();
        let config = OrmConfig::default();
        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query.add_condition(field("title.name").eq("x"));
        assert!(matches!(
            query.compile(),
            Err(OrmError::Usage(UsageError::NotARelationField { .. }))
        ));

        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query.add_condition(field("author.posts.title").eq("x"));
        assert!(matches!(
            query.compile(),
            Err(OrmError::Usage(UsageError::UnsupportedPath(_)))
        ));

        let mut query = ModelQuery::new(&registry, &engine, &config, "Post").expect("query");
        query.add_condition(field("author.age").eq(3));
        assert!(matches!(
            query.compile(),
            Err(OrmError::Usage(UsageError::UnknownField { .. }))
        ));
    }

    #[test]
    #[allow(clippy::expect_used)] // Test code - expect is acceptable
    fn test_parse_order() {
        let orders = parse_order("name, author.name DESC").expect("order");
        assert_eq!(
            orders,
            vec![(field("name"), Order::Asc), (field("author.name"), Order::Desc)]
        );
        assert!(parse_order("name SIDEWAYS").is_err());
    }
}
