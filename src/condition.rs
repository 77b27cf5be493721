//! Composable predicate, ordering, grouping and paging model.
//!
//! A [`ConditionNode`] tree describes everything a statement needs beyond its
//! projection: WHERE predicates, GROUP BY, HAVING, ORDER BY and LIMIT. Trees
//! are acyclic and read-only once built; [`Criteria`] and [`Col`] build new
//! trees by value instead of mutating shared ones.
//!
//! ## Example
//!
//! ```
//! use gantry::condition::{Col, Criteria, SortDir};
//!
//! let criteria = Criteria::new()
//!     .filter(Col::new("lastName").like("Smi%"))
//!     .filter(Col::new("age").ge(18))
//!     .order_by("id", SortDir::Asc)
//!     .limit(10);
//! ```

use crate::value::Value;

/// Comparison operators usable in a [`ConditionNode::Comparison`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    NotLike,
    In,
    NotIn,
    Between,
    IsNull,
    IsNotNull,
}

/// Sort direction for ORDER BY entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// AND/OR combinator for junction nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JunctionOp {
    And,
    Or,
}

/// One node of a condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    /// `property OP value(s)`. `In`/`NotIn` carry any number of values,
    /// `Between` exactly two, `IsNull`/`IsNotNull` none.
    Comparison {
        property: String,
        op: ComparisonOp,
        values: Vec<Value>,
    },
    /// AND/OR over child predicates.
    Junction {
        op: JunctionOp,
        children: Vec<ConditionNode>,
    },
    /// ORDER BY entries, applied in sequence.
    OrderBy(Vec<(String, SortDir)>),
    /// GROUP BY properties.
    GroupBy(Vec<String>),
    /// HAVING predicate over the grouped result.
    Having(Box<ConditionNode>),
    /// LIMIT/OFFSET window.
    Limit { offset: u64, count: u64 },
    /// The explicit opt-in for an unscoped UPDATE/DELETE.
    AlwaysTrue,
}

impl ConditionNode {
    /// AND junction over children.
    pub fn and(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Junction {
            op: JunctionOp::And,
            children,
        }
    }

    /// OR junction over children.
    pub fn or(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Junction {
            op: JunctionOp::Or,
            children,
        }
    }

    /// True for nodes that contribute to the WHERE clause.
    pub(crate) fn is_predicate(&self) -> bool {
        matches!(
            self,
            ConditionNode::Comparison { .. }
                | ConditionNode::Junction { .. }
                | ConditionNode::AlwaysTrue
        )
    }
}

/// Column expression starting point, in the spirit of `Expr::col`.
///
/// `Col::new("age").ge(18)` produces a comparison node for the `age`
/// property; the builder converts property names to column identifiers.
#[derive(Debug, Clone)]
pub struct Col {
    property: String,
}

impl Col {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }

    fn cmp(self, op: ComparisonOp, values: Vec<Value>) -> ConditionNode {
        ConditionNode::Comparison {
            property: self.property,
            op,
            values,
        }
    }

    pub fn eq(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Eq, vec![value.into()])
    }

    pub fn ne(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Ne, vec![value.into()])
    }

    pub fn gt(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Gt, vec![value.into()])
    }

    pub fn ge(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Ge, vec![value.into()])
    }

    pub fn lt(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Lt, vec![value.into()])
    }

    pub fn le(self, value: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Le, vec![value.into()])
    }

    pub fn like(self, pattern: impl Into<String>) -> ConditionNode {
        self.cmp(ComparisonOp::Like, vec![Value::from(pattern.into())])
    }

    pub fn not_like(self, pattern: impl Into<String>) -> ConditionNode {
        self.cmp(ComparisonOp::NotLike, vec![Value::from(pattern.into())])
    }

    pub fn is_in(self, values: Vec<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::In, values)
    }

    pub fn not_in(self, values: Vec<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::NotIn, values)
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> ConditionNode {
        self.cmp(ComparisonOp::Between, vec![low.into(), high.into()])
    }

    pub fn is_null(self) -> ConditionNode {
        self.cmp(ComparisonOp::IsNull, vec![])
    }

    pub fn is_not_null(self) -> ConditionNode {
        self.cmp(ComparisonOp::IsNotNull, vec![])
    }
}

/// Immutable query criteria: predicates plus projection, ordering, grouping
/// and paging. Each builder call consumes and returns the criteria, so a
/// shared tree is never mutated in place.
#[derive(Debug, Clone, Default)]
pub struct Criteria {
    nodes: Vec<ConditionNode>,
    distinct: bool,
    projection: Option<Vec<String>>,
}

impl Criteria {
    /// Empty criteria: no predicates, full projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// The explicit always-true condition, opting in to an unscoped
    /// UPDATE/DELETE.
    pub fn always() -> Self {
        Self::new().filter(ConditionNode::AlwaysTrue)
    }

    /// Append a predicate; top-level predicates are AND-joined.
    pub fn filter(mut self, node: ConditionNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Append an ORDER BY entry.
    pub fn order_by(mut self, property: impl Into<String>, dir: SortDir) -> Self {
        self.nodes
            .push(ConditionNode::OrderBy(vec![(property.into(), dir)]));
        self
    }

    /// Append GROUP BY properties.
    pub fn group_by(mut self, properties: Vec<String>) -> Self {
        self.nodes.push(ConditionNode::GroupBy(properties));
        self
    }

    /// Set the HAVING predicate.
    pub fn having(mut self, node: ConditionNode) -> Self {
        self.nodes.push(ConditionNode::Having(Box::new(node)));
        self
    }

    /// Limit the result to `count` rows.
    pub fn limit(self, count: u64) -> Self {
        self.limit_offset(0, count)
    }

    /// Limit the result to `count` rows starting at `offset`.
    pub fn limit_offset(mut self, offset: u64, count: u64) -> Self {
        self.nodes.push(ConditionNode::Limit { offset, count });
        self
    }

    /// Apply DISTINCT to the projection.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Project only the given properties instead of all descriptor columns.
    pub fn select_only(mut self, properties: Vec<String>) -> Self {
        self.projection = Some(properties);
        self
    }

    pub fn nodes(&self) -> &[ConditionNode] {
        &self.nodes
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn projection(&self) -> Option<&[String]> {
        self.projection.as_deref()
    }

    /// True when at least one WHERE predicate is present.
    pub fn has_predicate(&self) -> bool {
        self.nodes.iter().any(ConditionNode::is_predicate)
    }
}
