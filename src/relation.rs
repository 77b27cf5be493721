//! Join-entity declarations and the attach seam for related-entity loading.
//!
//! A [`JoinSpec`] names the relation property on the root entity, the key
//! properties on both sides, the cardinality and the secondary query's
//! ordering. Loading itself happens in
//! [`DaoEngine::load_related`](crate::engine::DaoEngine::load_related): all
//! root keys are collected into one `IN (...)`-style condition (or its
//! composite-key equivalent), one secondary query runs per related type, and
//! the result rows are partitioned by key and attached to each root. One
//! query for many roots, never one query per root.
//!
//! To-one joins can match several rows; the first row under the declared
//! ordering wins, so [`Cardinality::One`] requires a non-empty `order_by`.

use crate::condition::SortDir;
use crate::descriptor::{EntityDescriptor, Record};
use crate::error::GantryError;

/// How many related entities a root attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// A single related entity; first match under the declared ordering.
    One,
    /// All matches, in query order.
    ManyList,
    /// All distinct matches.
    ManySet,
}

/// Declaration of one root-to-related association.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    root_property: String,
    root_keys: Vec<String>,
    related_keys: Vec<String>,
    cardinality: Cardinality,
    order_by: Vec<(String, SortDir)>,
}

impl JoinSpec {
    /// A join attached at `root_property` with the given cardinality. Key
    /// pairs and ordering are added with the builder methods.
    pub fn new(root_property: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            root_property: root_property.into(),
            root_keys: Vec::new(),
            related_keys: Vec::new(),
            cardinality,
            order_by: Vec::new(),
        }
    }

    /// Pair a root-side key property with its related-side counterpart.
    pub fn key(mut self, root: impl Into<String>, related: impl Into<String>) -> Self {
        self.root_keys.push(root.into());
        self.related_keys.push(related.into());
        self
    }

    /// Order the secondary query. Mandatory for [`Cardinality::One`].
    pub fn order_by(mut self, property: impl Into<String>, dir: SortDir) -> Self {
        self.order_by.push((property.into(), dir));
        self
    }

    pub fn root_property(&self) -> &str {
        &self.root_property
    }

    pub fn root_keys(&self) -> &[String] {
        &self.root_keys
    }

    pub fn related_keys(&self) -> &[String] {
        &self.related_keys
    }

    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }

    pub fn ordering(&self) -> &[(String, SortDir)] {
        &self.order_by
    }

    /// Validate the declaration against both descriptors. Runs before any
    /// query is issued.
    pub fn validate(
        &self,
        root: &EntityDescriptor,
        related: &EntityDescriptor,
    ) -> Result<(), GantryError> {
        if self.root_keys.is_empty() {
            return Err(GantryError::JoinConfiguration(format!(
                "join `{}` declares no key columns",
                self.root_property
            )));
        }
        if self.root_keys.len() != self.related_keys.len() {
            return Err(GantryError::JoinConfiguration(format!(
                "join `{}` pairs {} root key(s) with {} related key(s)",
                self.root_property,
                self.root_keys.len(),
                self.related_keys.len()
            )));
        }
        for property in &self.root_keys {
            if root.column(property).is_none() {
                return Err(GantryError::JoinConfiguration(format!(
                    "join `{}` references unknown root property `{property}` on `{}`",
                    self.root_property,
                    root.entity()
                )));
            }
        }
        for property in &self.related_keys {
            if related.column(property).is_none() {
                return Err(GantryError::JoinConfiguration(format!(
                    "join `{}` references unknown related property `{property}` on `{}`",
                    self.root_property,
                    related.entity()
                )));
            }
        }
        for (property, _) in &self.order_by {
            if related.column(property).is_none() {
                return Err(GantryError::JoinConfiguration(format!(
                    "join `{}` orders by unknown property `{property}` on `{}`",
                    self.root_property,
                    related.entity()
                )));
            }
        }
        if self.cardinality == Cardinality::One && self.order_by.is_empty() {
            return Err(GantryError::JoinConfiguration(format!(
                "to-one join `{}` must declare an ordering so the winning row is deterministic",
                self.root_property
            )));
        }
        Ok(())
    }
}

/// Root-side attach seam for the join loader.
///
/// `relation_loaded` backs the `only_if_null` mode: roots whose relation is
/// already populated are skipped, making repeated loads idempotent on
/// partially hydrated graphs.
pub trait JoinTarget<R: Record>: Record {
    /// True when the relation property already holds a value.
    fn relation_loaded(&self, property: &str) -> bool;

    /// Attach loaded related entities to the relation property.
    fn attach(&mut self, property: &str, related: Vec<R>);
}
