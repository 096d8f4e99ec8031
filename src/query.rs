//! Query tree and SQL emitter
//!
//! A [`Query`] describes one relation: its schema fields, filters, projection,
//! ordering, limit and joined child queries. Builder calls consume the query
//! and return a new one, so a half-built query can always be inspected with
//! [`Query::map_fields`] without side effects. Terminal calls render a single
//! SQL string; nothing here touches a database.
//!
//! Column references are always emitted qualified, `<alias>.<column>`, and the
//! same qualified keys name the columns of fetched rows, so the cache layer
//! can address row values without re-parsing SQL.

use crate::db::DbType;
use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::{BTreeSet, HashSet};

/// Filter comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Equality; NULL operands render as IS NULL
    Exact,
    /// Inequality; NULL operands render as IS NOT NULL
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Inclusive range, takes a low/high pair
    Between,
    /// Membership, takes a value list
    In,
    /// SQL LIKE; the pattern supplies its own percent signs
    Like,
}

/// Operand shape for a predicate
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Single(Value),
    Range(Value, Value),
    List(Vec<Value>),
}

/// One column predicate, AND-conjoined with its siblings
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
    pub value: FilterValue,
}

impl Predicate {
    fn single(column: impl Into<String>, op: Op, value: impl Into<Value>) -> Self {
        Predicate {
            column: column.into(),
            op,
            value: FilterValue::Single(value.into()),
        }
    }

    /// `column = value`
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Exact, value)
    }

    /// `column != value`
    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Ne, value)
    }

    /// `column > value`
    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Gt, value)
    }

    /// `column >= value`
    pub fn gte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Gte, value)
    }

    /// `column < value`
    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Lt, value)
    }

    /// `column <= value`
    pub fn lte(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::single(column, Op::Lte, value)
    }

    /// `column BETWEEN low AND high`
    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Predicate {
            column: column.into(),
            op: Op::Between,
            value: FilterValue::Range(low.into(), high.into()),
        }
    }

    /// `column IN (values…)`
    pub fn is_in<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Predicate {
            column: column.into(),
            op: Op::In,
            value: FilterValue::List(values.into_iter().map(Into::into).collect()),
        }
    }

    /// `column LIKE pattern`
    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::single(column, Op::Like, Value::Text(pattern.into()))
    }

    /// Render as `<alias>.<column> <op> <literal>`
    fn render(&self, alias: &str, db_type: DbType) -> Result<String> {
        let col = format!("{alias}.{}", self.column);
        match (&self.op, &self.value) {
            (Op::Exact, FilterValue::Single(v)) if v.is_null() => Ok(format!("{col} IS NULL")),
            (Op::Ne, FilterValue::Single(v)) if v.is_null() => Ok(format!("{col} IS NOT NULL")),
            (Op::Exact, FilterValue::Single(v)) => {
                Ok(format!("{col} = {}", v.to_sql_literal(db_type)?))
            }
            (Op::Ne, FilterValue::Single(v)) => {
                Ok(format!("{col} != {}", v.to_sql_literal(db_type)?))
            }
            (Op::Gt, FilterValue::Single(v)) => {
                Ok(format!("{col} > {}", v.to_sql_literal(db_type)?))
            }
            (Op::Gte, FilterValue::Single(v)) => {
                Ok(format!("{col} >= {}", v.to_sql_literal(db_type)?))
            }
            (Op::Lt, FilterValue::Single(v)) => {
                Ok(format!("{col} < {}", v.to_sql_literal(db_type)?))
            }
            (Op::Lte, FilterValue::Single(v)) => {
                Ok(format!("{col} <= {}", v.to_sql_literal(db_type)?))
            }
            (Op::Like, FilterValue::Single(v)) => {
                Ok(format!("{col} LIKE {}", v.to_sql_literal(db_type)?))
            }
            (Op::Between, FilterValue::Range(lo, hi)) => Ok(format!(
                "{col} BETWEEN {} AND {}",
                lo.to_sql_literal(db_type)?,
                hi.to_sql_literal(db_type)?
            )),
            (Op::In, FilterValue::List(values)) => {
                if values.is_empty() {
                    return Err(Error::QueryBuild(format!(
                        "IN filter on {} requires at least one value",
                        self.column
                    )));
                }
                let literals: Result<Vec<String>> =
                    values.iter().map(|v| v.to_sql_literal(db_type)).collect();
                Ok(format!("{col} IN ({})", literals?.join(", ")))
            }
            (op, value) => Err(Error::QueryBuild(format!(
                "operator {op:?} cannot take operand {value:?} on column {}",
                self.column
            ))),
        }
    }
}

/// Sort direction for `order_by`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Join kind for a child query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

/// Link between a parent query and a joined child query.
///
/// `left_key` names the join column in the child, `right_key` the column in
/// the parent it matches. An alias override disambiguates a table joined more
/// than once in the same tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub query: Query,
    pub left_key: String,
    pub right_key: String,
    pub alias: Option<String>,
}

impl Join {
    /// INNER JOIN descriptor
    pub fn inner(
        query: impl Into<Query>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Join {
            kind: JoinKind::Inner,
            query: query.into(),
            left_key: left_key.into(),
            right_key: right_key.into(),
            alias: None,
        }
    }

    /// LEFT JOIN descriptor
    pub fn left(
        query: impl Into<Query>,
        left_key: impl Into<String>,
        right_key: impl Into<String>,
    ) -> Self {
        Join {
            kind: JoinKind::Left,
            query: query.into(),
            left_key: left_key.into(),
            right_key: right_key.into(),
            alias: None,
        }
    }

    /// Override the joined table's alias
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Build one `(column, value)` assignment for `update`/`insert`
pub fn assign(column: &str, value: impl Into<Value>) -> (String, Value) {
    (column.to_string(), value.into())
}

/// One relation in a query tree; terminal calls emit SQL
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    table: String,
    fields: Vec<String>,
    alias: Option<String>,
    projection: Option<Vec<String>>,
    filters: Vec<Predicate>,
    order: Option<(String, Direction)>,
    limit: Option<u64>,
    joins: Vec<Join>,
    db_type: DbType,
}

impl Query {
    /// Create a query over `table` with its schema column list.
    ///
    /// Literals render for SQLite by default; [`Query::dialect`] switches.
    pub fn new<I>(table: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Query {
            table: table.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            alias: None,
            projection: None,
            filters: Vec::new(),
            order: None,
            limit: None,
            joins: Vec::new(),
            db_type: DbType::Sqlite,
        }
    }

    /// Set the dialect used for literal rendering
    pub fn dialect(mut self, db_type: DbType) -> Self {
        self.db_type = db_type;
        self
    }

    /// Set an alias for this relation (defaults to the table name)
    pub fn aliased(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Append AND-conjoined predicates
    pub fn filter<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        self.filters.extend(predicates);
        self
    }

    /// Replace the projection with an ordered subset of the fields
    pub fn select<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Order by a single column of this relation
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order = Some((column.into(), direction));
        self
    }

    /// Cap the number of returned rows
    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Attach a joined child query
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Table this query selects from
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Schema fields of this relation
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Ordered qualified column keys a SELECT over this tree produces.
    ///
    /// Root columns come first, then each joined child depth-first in
    /// declaration order. Rows fetched through the façade carry exactly these
    /// keys, and cache entries validate inserted rows against them.
    pub fn map_fields(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_fields(None, &mut out);
        out
    }

    /// Sorted set of table names contributing to this tree
    pub fn tables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_tables(&mut out);
        out
    }

    /// Emit the SELECT statement for this tree
    pub fn get(&self) -> Result<String> {
        self.validate()?;
        let mut fields = Vec::new();
        self.collect_fields(None, &mut fields);
        let mut sql = format!("SELECT {} FROM {}", fields.join(", "), self.from_target());
        self.push_joins_where(&mut sql)?;
        if let Some((col, dir)) = &self.order {
            sql.push_str(&format!(
                " ORDER BY {}.{col} {}",
                self.node_alias(),
                dir.as_sql()
            ));
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        Ok(sql)
    }

    /// Emit a COUNT(*) over the same FROM/JOIN/WHERE shape
    pub fn count(&self) -> Result<String> {
        self.validate()?;
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.from_target());
        self.push_joins_where(&mut sql)?;
        Ok(sql)
    }

    /// Emit an UPDATE over this single table.
    ///
    /// Assignments keep their given order. Fails if any join is attached.
    pub fn update<I>(&self, assigns: I) -> Result<String>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        self.require_single_table("UPDATE")?;
        self.validate()?;
        let assigns: Vec<(String, Value)> = assigns.into_iter().collect();
        if assigns.is_empty() {
            return Err(Error::QueryBuild(format!(
                "UPDATE on {} requires at least one assignment",
                self.table
            )));
        }
        let mut sets = Vec::with_capacity(assigns.len());
        for (col, value) in &assigns {
            self.require_field(col)?;
            sets.push(format!("{col} = {}", value.to_sql_literal(self.db_type)?));
        }
        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        self.push_where(&mut sql)?;
        Ok(sql)
    }

    /// Emit a multi-row INSERT over this single table.
    ///
    /// The column list comes from the first row; every row must assign the
    /// same columns. Fails if any join is attached.
    pub fn insert(&self, rows: Vec<Vec<(String, Value)>>) -> Result<String> {
        self.require_single_table("INSERT")?;
        let first = rows.first().ok_or_else(|| {
            Error::QueryBuild(format!("INSERT into {} requires at least one row", self.table))
        })?;
        let columns: Vec<String> = first.iter().map(|(c, _)| c.clone()).collect();
        for col in &columns {
            self.require_field(col)?;
        }
        let mut tuples = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut literals = Vec::with_capacity(columns.len());
            for col in &columns {
                let value = row
                    .iter()
                    .find(|(c, _)| c == col)
                    .map(|(_, v)| v)
                    .ok_or_else(|| {
                        Error::QueryBuild(format!(
                            "INSERT row is missing column {col} of table {}",
                            self.table
                        ))
                    })?;
                literals.push(value.to_sql_literal(self.db_type)?);
            }
            if row.len() != columns.len() {
                return Err(Error::QueryBuild(format!(
                    "INSERT rows assign different column sets for table {}",
                    self.table
                )));
            }
            tuples.push(format!("({})", literals.join(", ")));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.table,
            columns.join(", "),
            tuples.join(", ")
        ))
    }

    /// Emit a DELETE over this single table. Fails if any join is attached.
    pub fn delete(&self) -> Result<String> {
        self.require_single_table("DELETE")?;
        self.validate()?;
        let mut sql = format!("DELETE FROM {}", self.table);
        self.push_where(&mut sql)?;
        Ok(sql)
    }

    fn node_alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    /// `table` or `table AS alias`; the AS clause only appears when needed
    fn from_target(&self) -> String {
        let alias = self.node_alias();
        if alias == self.table {
            self.table.clone()
        } else {
            format!("{} AS {alias}", self.table)
        }
    }

    fn require_single_table(&self, statement: &str) -> Result<()> {
        if self.joins.is_empty() {
            Ok(())
        } else {
            Err(Error::JoinExecute(format!("{statement} on {}", self.table)))
        }
    }

    fn require_field(&self, column: &str) -> Result<()> {
        if self.fields.iter().any(|f| f == column) {
            Ok(())
        } else {
            Err(Error::QueryBuild(format!(
                "column {column} does not belong to table {}",
                self.table
            )))
        }
    }

    /// Append JOIN chain and WHERE clause for SELECT/COUNT emission
    fn push_joins_where(&self, sql: &mut String) -> Result<()> {
        let mut joins = Vec::new();
        self.collect_joins(None, &mut joins);
        for clause in joins {
            sql.push(' ');
            sql.push_str(&clause);
        }
        let mut predicates = Vec::new();
        self.collect_predicates(None, &mut predicates)?;
        if !predicates.is_empty() {
            sql.push_str(&format!(" WHERE {}", predicates.join(" AND ")));
        }
        Ok(())
    }

    /// WHERE clause for single-table UPDATE/DELETE emission
    fn push_where(&self, sql: &mut String) -> Result<()> {
        let mut predicates = Vec::new();
        for p in &self.filters {
            predicates.push(p.render(&self.table, self.db_type)?);
        }
        if !predicates.is_empty() {
            sql.push_str(&format!(" WHERE {}", predicates.join(" AND ")));
        }
        Ok(())
    }

    fn collect_fields(&self, alias_override: Option<&str>, out: &mut Vec<String>) {
        let alias = alias_override.unwrap_or_else(|| self.node_alias());
        let columns = self.projection.as_ref().unwrap_or(&self.fields);
        for col in columns {
            out.push(format!("{alias}.{col}"));
        }
        for join in &self.joins {
            join.query.collect_fields(join.alias.as_deref(), out);
        }
    }

    fn collect_tables(&self, out: &mut BTreeSet<String>) {
        out.insert(self.table.clone());
        for join in &self.joins {
            join.query.collect_tables(out);
        }
    }

    fn collect_joins(&self, alias_override: Option<&str>, out: &mut Vec<String>) {
        let parent = alias_override.unwrap_or_else(|| self.node_alias());
        for join in &self.joins {
            let child = join
                .alias
                .as_deref()
                .unwrap_or_else(|| join.query.node_alias());
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            let target = if child == join.query.table {
                join.query.table.clone()
            } else {
                format!("{} AS {child}", join.query.table)
            };
            out.push(format!(
                "{keyword} {target} ON {child}.{} = {parent}.{}",
                join.left_key, join.right_key
            ));
            join.query.collect_joins(join.alias.as_deref(), out);
        }
    }

    fn collect_predicates(
        &self,
        alias_override: Option<&str>,
        out: &mut Vec<String>,
    ) -> Result<()> {
        let alias = alias_override.unwrap_or_else(|| self.node_alias());
        for predicate in &self.filters {
            out.push(predicate.render(alias, self.db_type)?);
        }
        for join in &self.joins {
            join.query.collect_predicates(join.alias.as_deref(), out)?;
        }
        Ok(())
    }

    /// Check alias uniqueness and column membership across the whole tree
    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        self.validate_node(None, &mut seen)
    }

    fn validate_node(
        &self,
        alias_override: Option<&str>,
        seen: &mut HashSet<String>,
    ) -> Result<()> {
        let alias = alias_override.unwrap_or_else(|| self.node_alias());
        if !seen.insert(alias.to_string()) {
            return Err(Error::QueryBuild(format!(
                "alias {alias} appears more than once; give the repeated table an explicit alias"
            )));
        }
        if let Some(projection) = &self.projection {
            for col in projection {
                self.require_field(col)?;
            }
        }
        for predicate in &self.filters {
            self.require_field(&predicate.column)?;
        }
        if let Some((col, _)) = &self.order {
            self.require_field(col)?;
        }
        for join in &self.joins {
            if !join.query.fields.iter().any(|f| f == &join.left_key) {
                return Err(Error::QueryBuild(format!(
                    "join key {} does not belong to table {}",
                    join.left_key, join.query.table
                )));
            }
            self.require_field(&join.right_key)?;
            join.query.validate_node(join.alias.as_deref(), seen)?;
        }
        Ok(())
    }
}
