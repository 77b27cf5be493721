//! Statement builder: descriptors + criteria in, parameterized SQL out.
//!
//! The builder is dialect-neutral text assembly with two parameter styles
//! and a naming policy applied to every property-derived identifier. Clause
//! order is fixed: WHERE, GROUP BY, HAVING, ORDER BY, LIMIT. An UPDATE or
//! DELETE without a WHERE predicate is refused unless the caller passes the
//! explicit always-true condition.
//!
//! Statements whose values depend on a record (INSERT, UPDATE SET lists,
//! by-id lookups) are produced as a [`StatementPlan`]: text plus the ordered
//! property list, resolved once at registration and bound per call.

use crate::condition::{ComparisonOp, ConditionNode, Criteria, JunctionOp, SortDir};
use crate::descriptor::{ColumnSpec, EntityDescriptor, Record};
use crate::error::GantryError;
use crate::naming::NamingPolicy;
use crate::sql::statement::{ParameterStyle, SqlStatement};
use crate::value::Value;

/// A statement shape resolved ahead of time: text plus the ordered property
/// list its parameters come from. Binding a record against the plan yields
/// an executable [`SqlStatement`].
#[derive(Debug, Clone)]
pub struct StatementPlan {
    text: String,
    style: ParameterStyle,
    properties: Vec<String>,
}

impl StatementPlan {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Property names in bind order.
    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    /// Bind the plan against a record, reading each property in order.
    pub fn bind<R: Record>(&self, record: &R) -> Result<SqlStatement, GantryError> {
        let descriptor = R::descriptor();
        let mut values = Vec::with_capacity(self.properties.len());
        for property in &self.properties {
            let value = record
                .get(property)
                .ok_or_else(|| GantryError::UnknownProperty {
                    entity: descriptor.entity().to_string(),
                    property: property.clone(),
                })?;
            values.push(value);
        }
        Ok(self.bind_values(values))
    }

    /// Bind the plan against explicit values aligned with
    /// [`properties`](Self::properties).
    pub fn bind_values(&self, values: Vec<Value>) -> SqlStatement {
        match self.style {
            ParameterStyle::Positional => SqlStatement::positional(self.text.clone(), values),
            ParameterStyle::Named => {
                SqlStatement::named_bound(self.text.clone(), self.properties.clone(), values)
            }
        }
    }
}

/// Growing statement text plus its parameters.
#[derive(Default)]
struct Fragment {
    sql: String,
    values: Vec<Value>,
    names: Vec<String>,
}

/// Builds SELECT/INSERT/UPDATE/DELETE statements from entity descriptors and
/// condition trees.
#[derive(Debug, Clone, Copy)]
pub struct SqlBuilder {
    naming: NamingPolicy,
    style: ParameterStyle,
}

impl SqlBuilder {
    pub fn new(naming: NamingPolicy, style: ParameterStyle) -> Self {
        Self { naming, style }
    }

    pub fn naming(&self) -> NamingPolicy {
        self.naming
    }

    pub fn style(&self) -> ParameterStyle {
        self.style
    }

    // ------------------------------------------------------------------
    // SELECT
    // ------------------------------------------------------------------

    /// Build a SELECT over the descriptor's columns (or the criteria's
    /// explicit projection), with WHERE/GROUP BY/HAVING/ORDER BY/LIMIT from
    /// the criteria.
    pub fn select(
        &self,
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
    ) -> Result<SqlStatement, GantryError> {
        let mut frag = Fragment::default();
        frag.sql.push_str("SELECT ");
        if criteria.is_distinct() {
            frag.sql.push_str("DISTINCT ");
        }
        frag.sql.push_str(&self.projection(descriptor, criteria)?);
        frag.sql.push_str(" FROM ");
        frag.sql.push_str(descriptor.table());
        self.append_clauses(descriptor, criteria, &mut frag, true)?;
        Ok(self.finish(frag))
    }

    /// Build a `SELECT COUNT(*)` over the criteria's predicates. Ordering
    /// and paging nodes are ignored; grouping still applies.
    pub fn count(
        &self,
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
    ) -> Result<SqlStatement, GantryError> {
        let mut frag = Fragment::default();
        frag.sql.push_str("SELECT COUNT(*) FROM ");
        frag.sql.push_str(descriptor.table());
        self.append_clauses(descriptor, criteria, &mut frag, false)?;
        Ok(self.finish(frag))
    }

    // ------------------------------------------------------------------
    // INSERT
    // ------------------------------------------------------------------

    /// Resolve the INSERT shape for an entity: all non-read-only columns in
    /// declaration order.
    pub fn insert_plan(&self, descriptor: &EntityDescriptor) -> Result<StatementPlan, GantryError> {
        let columns = descriptor.insert_columns();
        if columns.is_empty() {
            return Err(GantryError::Configuration(format!(
                "entity `{}` has no insertable columns",
                descriptor.entity()
            )));
        }
        let column_list = self.column_list(&columns);
        let markers = self.marker_list(&columns);
        let text = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            descriptor.table(),
            column_list,
            markers
        );
        Ok(StatementPlan {
            text,
            style: self.style,
            properties: columns.iter().map(|c| c.property().to_string()).collect(),
        })
    }

    // ------------------------------------------------------------------
    // UPDATE
    // ------------------------------------------------------------------

    /// Resolve the update-by-id shape: SET over the updatable columns,
    /// WHERE over the id columns. Parameter order is SET values first, key
    /// values last.
    pub fn update_by_id_plan(
        &self,
        descriptor: &EntityDescriptor,
    ) -> Result<StatementPlan, GantryError> {
        let set_columns = descriptor.update_columns();
        if set_columns.is_empty() {
            return Err(GantryError::Configuration(format!(
                "entity `{}` has no updatable columns",
                descriptor.entity()
            )));
        }
        let id_columns = self.require_id_columns(descriptor)?;
        let assignments = self.assignment_list(&set_columns);
        let key_predicate = self.key_predicate(&id_columns);
        let text = format!(
            "UPDATE {} SET {} WHERE {}",
            descriptor.table(),
            assignments,
            key_predicate
        );
        let mut properties: Vec<String> =
            set_columns.iter().map(|c| c.property().to_string()).collect();
        properties.extend(id_columns.iter().map(|c| c.property().to_string()));
        Ok(StatementPlan {
            text,
            style: self.style,
            properties,
        })
    }

    /// Build an UPDATE of the named properties scoped by `criteria`.
    ///
    /// `set_values` aligns with `set_properties`. Fails with
    /// [`GantryError::UnsafeStatement`] when the criteria carry no WHERE
    /// predicate and no explicit always-true opt-in.
    pub fn update_where(
        &self,
        descriptor: &EntityDescriptor,
        set_properties: &[&str],
        set_values: Vec<Value>,
        criteria: &Criteria,
    ) -> Result<SqlStatement, GantryError> {
        if set_properties.is_empty() || set_properties.len() != set_values.len() {
            return Err(GantryError::Configuration(format!(
                "update of `{}` needs aligned set properties and values",
                descriptor.entity()
            )));
        }
        self.require_scoped(criteria, descriptor, "UPDATE")?;

        let mut frag = Fragment::default();
        frag.sql.push_str("UPDATE ");
        frag.sql.push_str(descriptor.table());
        frag.sql.push_str(" SET ");
        for (idx, (property, value)) in set_properties.iter().zip(set_values).enumerate() {
            let column = descriptor.require(property)?;
            if idx > 0 {
                frag.sql.push_str(", ");
            }
            frag.sql.push_str(&column.column_name(self.naming));
            frag.sql.push_str(" = ");
            self.push_param(&mut frag, property, value);
        }
        self.append_clauses(descriptor, criteria, &mut frag, false)?;
        Ok(self.finish(frag))
    }

    // ------------------------------------------------------------------
    // DELETE
    // ------------------------------------------------------------------

    /// Resolve the delete-by-id shape.
    pub fn delete_by_id_plan(
        &self,
        descriptor: &EntityDescriptor,
    ) -> Result<StatementPlan, GantryError> {
        let id_columns = self.require_id_columns(descriptor)?;
        let text = format!(
            "DELETE FROM {} WHERE {}",
            descriptor.table(),
            self.key_predicate(&id_columns)
        );
        Ok(StatementPlan {
            text,
            style: self.style,
            properties: id_columns.iter().map(|c| c.property().to_string()).collect(),
        })
    }

    /// Build a DELETE scoped by `criteria`; same unsafe-statement rule as
    /// [`update_where`](Self::update_where).
    pub fn delete_where(
        &self,
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
    ) -> Result<SqlStatement, GantryError> {
        self.require_scoped(criteria, descriptor, "DELETE")?;
        let mut frag = Fragment::default();
        frag.sql.push_str("DELETE FROM ");
        frag.sql.push_str(descriptor.table());
        self.append_clauses(descriptor, criteria, &mut frag, false)?;
        Ok(self.finish(frag))
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Resolve the find-by-id shape: full projection, WHERE over the id
    /// columns.
    pub fn select_by_id_plan(
        &self,
        descriptor: &EntityDescriptor,
    ) -> Result<StatementPlan, GantryError> {
        let id_columns = self.require_id_columns(descriptor)?;
        let all: Vec<&ColumnSpec> = descriptor.columns().iter().collect();
        let text = format!(
            "SELECT {} FROM {} WHERE {}",
            self.column_list(&all),
            descriptor.table(),
            self.key_predicate(&id_columns)
        );
        Ok(StatementPlan {
            text,
            style: self.style,
            properties: id_columns.iter().map(|c| c.property().to_string()).collect(),
        })
    }

    // ------------------------------------------------------------------
    // Rendering helpers
    // ------------------------------------------------------------------

    fn projection(
        &self,
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
    ) -> Result<String, GantryError> {
        match criteria.projection() {
            Some(properties) => {
                let mut parts = Vec::with_capacity(properties.len());
                for property in properties {
                    let column = descriptor.require(property)?;
                    parts.push(column.column_name(self.naming));
                }
                Ok(parts.join(", "))
            }
            None => {
                let all: Vec<&ColumnSpec> = descriptor.columns().iter().collect();
                Ok(self.column_list(&all))
            }
        }
    }

    fn column_list(&self, columns: &[&ColumnSpec]) -> String {
        columns
            .iter()
            .map(|c| c.column_name(self.naming))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn marker_list(&self, columns: &[&ColumnSpec]) -> String {
        columns
            .iter()
            .map(|c| self.marker(c.property()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn assignment_list(&self, columns: &[&ColumnSpec]) -> String {
        columns
            .iter()
            .map(|c| format!("{} = {}", c.column_name(self.naming), self.marker(c.property())))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn key_predicate(&self, id_columns: &[&ColumnSpec]) -> String {
        id_columns
            .iter()
            .map(|c| format!("{} = {}", c.column_name(self.naming), self.marker(c.property())))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    fn marker(&self, property: &str) -> String {
        match self.style {
            ParameterStyle::Positional => "?".to_string(),
            ParameterStyle::Named => format!(":{property}"),
        }
    }

    fn push_param(&self, frag: &mut Fragment, property: &str, value: Value) {
        frag.sql.push_str(&self.marker(property));
        frag.names.push(property.to_string());
        frag.values.push(value);
    }

    fn require_id_columns<'d>(
        &self,
        descriptor: &'d EntityDescriptor,
    ) -> Result<Vec<&'d ColumnSpec>, GantryError> {
        let ids = descriptor.id_columns();
        if ids.is_empty() {
            return Err(GantryError::Configuration(format!(
                "entity `{}` has no id column",
                descriptor.entity()
            )));
        }
        Ok(ids)
    }

    fn require_scoped(
        &self,
        criteria: &Criteria,
        descriptor: &EntityDescriptor,
        verb: &str,
    ) -> Result<(), GantryError> {
        if !criteria.has_predicate() {
            return Err(GantryError::UnsafeStatement {
                operation: format!("{verb} on {}", descriptor.table()),
            });
        }
        Ok(())
    }

    /// Append WHERE/GROUP BY/HAVING/ORDER BY/LIMIT from the criteria, in
    /// that fixed order. `with_ordering` is off for COUNT and mutations.
    fn append_clauses(
        &self,
        descriptor: &EntityDescriptor,
        criteria: &Criteria,
        frag: &mut Fragment,
        with_ordering: bool,
    ) -> Result<(), GantryError> {
        let mut predicates = Vec::new();
        let mut group_by: Vec<String> = Vec::new();
        let mut having: Vec<&ConditionNode> = Vec::new();
        let mut order_by: Vec<(String, SortDir)> = Vec::new();
        let mut limit: Option<(u64, u64)> = None;

        for node in criteria.nodes() {
            match node {
                ConditionNode::Comparison { .. }
                | ConditionNode::Junction { .. }
                | ConditionNode::AlwaysTrue => predicates.push(node),
                ConditionNode::GroupBy(props) => group_by.extend(props.iter().cloned()),
                ConditionNode::Having(inner) => having.push(inner),
                ConditionNode::OrderBy(entries) => order_by.extend(entries.iter().cloned()),
                ConditionNode::Limit { offset, count } => limit = Some((*offset, *count)),
            }
        }

        if !predicates.is_empty() {
            frag.sql.push_str(" WHERE ");
            for (idx, node) in predicates.iter().enumerate() {
                if idx > 0 {
                    frag.sql.push_str(" AND ");
                }
                self.render_predicate(descriptor, node, frag)?;
            }
        }

        if !group_by.is_empty() {
            frag.sql.push_str(" GROUP BY ");
            let mut parts = Vec::with_capacity(group_by.len());
            for property in &group_by {
                parts.push(descriptor.require(property)?.column_name(self.naming));
            }
            frag.sql.push_str(&parts.join(", "));
        }

        if !having.is_empty() {
            frag.sql.push_str(" HAVING ");
            for (idx, node) in having.iter().enumerate() {
                if idx > 0 {
                    frag.sql.push_str(" AND ");
                }
                self.render_predicate(descriptor, node, frag)?;
            }
        }

        if with_ordering {
            if !order_by.is_empty() {
                frag.sql.push_str(" ORDER BY ");
                let mut parts = Vec::with_capacity(order_by.len());
                for (property, dir) in &order_by {
                    let column = descriptor.require(property)?.column_name(self.naming);
                    parts.push(format!("{column} {}", dir.sql()));
                }
                frag.sql.push_str(&parts.join(", "));
            }

            if let Some((offset, count)) = limit {
                frag.sql.push_str(&format!(" LIMIT {count}"));
                if offset > 0 {
                    frag.sql.push_str(&format!(" OFFSET {offset}"));
                }
            }
        }

        Ok(())
    }

    fn render_predicate(
        &self,
        descriptor: &EntityDescriptor,
        node: &ConditionNode,
        frag: &mut Fragment,
    ) -> Result<(), GantryError> {
        match node {
            ConditionNode::AlwaysTrue => {
                frag.sql.push_str("1 = 1");
                Ok(())
            }
            ConditionNode::Junction { op, children } => {
                if children.is_empty() {
                    frag.sql.push_str("1 = 1");
                    return Ok(());
                }
                let glue = match op {
                    JunctionOp::And => " AND ",
                    JunctionOp::Or => " OR ",
                };
                frag.sql.push('(');
                for (idx, child) in children.iter().enumerate() {
                    if idx > 0 {
                        frag.sql.push_str(glue);
                    }
                    self.render_predicate(descriptor, child, frag)?;
                }
                frag.sql.push(')');
                Ok(())
            }
            ConditionNode::Comparison {
                property,
                op,
                values,
            } => self.render_comparison(descriptor, property, *op, values, frag),
            other => Err(GantryError::Configuration(format!(
                "node {other:?} is not a predicate"
            ))),
        }
    }

    fn render_comparison(
        &self,
        descriptor: &EntityDescriptor,
        property: &str,
        op: ComparisonOp,
        values: &[Value],
        frag: &mut Fragment,
    ) -> Result<(), GantryError> {
        let column = descriptor.require(property)?.column_name(self.naming);
        match op {
            ComparisonOp::Eq
            | ComparisonOp::Ne
            | ComparisonOp::Gt
            | ComparisonOp::Ge
            | ComparisonOp::Lt
            | ComparisonOp::Le
            | ComparisonOp::Like
            | ComparisonOp::NotLike => {
                let value = values.first().cloned().ok_or_else(|| {
                    GantryError::Configuration(format!(
                        "comparison on `{property}` is missing its value"
                    ))
                })?;
                let symbol = match op {
                    ComparisonOp::Eq => "=",
                    ComparisonOp::Ne => "<>",
                    ComparisonOp::Gt => ">",
                    ComparisonOp::Ge => ">=",
                    ComparisonOp::Lt => "<",
                    ComparisonOp::Le => "<=",
                    ComparisonOp::Like => "LIKE",
                    ComparisonOp::NotLike => "NOT LIKE",
                    _ => unreachable!(),
                };
                frag.sql.push_str(&column);
                frag.sql.push(' ');
                frag.sql.push_str(symbol);
                frag.sql.push(' ');
                self.push_param(frag, property, value);
                Ok(())
            }
            ComparisonOp::In | ComparisonOp::NotIn => {
                if values.is_empty() {
                    // An empty list matches nothing (or everything for NOT IN).
                    frag.sql.push_str(match op {
                        ComparisonOp::In => "1 = 0",
                        _ => "1 = 1",
                    });
                    return Ok(());
                }
                frag.sql.push_str(&column);
                frag.sql.push_str(match op {
                    ComparisonOp::In => " IN (",
                    _ => " NOT IN (",
                });
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        frag.sql.push_str(", ");
                    }
                    self.push_param(frag, property, value.clone());
                }
                frag.sql.push(')');
                Ok(())
            }
            ComparisonOp::Between => {
                if values.len() != 2 {
                    return Err(GantryError::Configuration(format!(
                        "BETWEEN on `{property}` needs exactly two values"
                    )));
                }
                frag.sql.push_str(&column);
                frag.sql.push_str(" BETWEEN ");
                self.push_param(frag, property, values[0].clone());
                frag.sql.push_str(" AND ");
                self.push_param(frag, property, values[1].clone());
                Ok(())
            }
            ComparisonOp::IsNull => {
                frag.sql.push_str(&column);
                frag.sql.push_str(" IS NULL");
                Ok(())
            }
            ComparisonOp::IsNotNull => {
                frag.sql.push_str(&column);
                frag.sql.push_str(" IS NOT NULL");
                Ok(())
            }
        }
    }

    fn finish(&self, frag: Fragment) -> SqlStatement {
        match self.style {
            ParameterStyle::Positional => SqlStatement::positional(frag.sql, frag.values),
            ParameterStyle::Named => SqlStatement::named_bound(frag.sql, frag.names, frag.values),
        }
    }
}
