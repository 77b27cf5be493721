//! Entity metadata: descriptors, column specs and the descriptor registry.
//!
//! An [`EntityDescriptor`] is the static description of how one entity type
//! maps to a table: the table name plus an ordered list of [`ColumnSpec`]s.
//! Descriptors are built once per entity type (application code typically
//! holds them in a `once_cell::sync::Lazy` static), are immutable after
//! construction, and are safe for unsynchronized concurrent reads.
//!
//! The [`Record`] trait connects a typed entity struct to its descriptor and
//! gives the engine dynamic access to property values for binding, join
//! partitioning and result mapping.
//!
//! Registries are explicit objects handed to the engine at construction;
//! there is no process-global descriptor state.

use crate::error::GantryError;
use crate::executor::RowDecoder;
use crate::naming::NamingPolicy;
use crate::value::{Value, ValueKind, ValueTuple};
use std::collections::HashMap;

/// Column behavior flags.
///
/// `read_only` columns are excluded from generated INSERT and UPDATE value
/// lists (database-generated ids, timestamps maintained by triggers).
/// `non_updatable` columns are written on INSERT but never on UPDATE
/// (creation timestamps, tenant discriminators).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub id: bool,
    pub read_only: bool,
    pub non_updatable: bool,
}

/// One property-to-column mapping.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    property: String,
    /// Explicit column name; `None` means the naming policy derives it.
    column: Option<String>,
    kind: ValueKind,
    flags: ColumnFlags,
}

impl ColumnSpec {
    /// A plain column for `property` holding values of `kind`.
    pub fn new(property: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            property: property.into(),
            column: None,
            kind,
            flags: ColumnFlags::default(),
        }
    }

    /// Mark this column as (part of) the primary key.
    pub fn id(mut self) -> Self {
        self.flags.id = true;
        self
    }

    /// Exclude this column from generated INSERT and UPDATE value lists.
    pub fn read_only(mut self) -> Self {
        self.flags.read_only = true;
        self
    }

    /// Exclude this column from generated UPDATE value lists only.
    pub fn non_updatable(mut self) -> Self {
        self.flags.non_updatable = true;
        self
    }

    /// Override the column name, bypassing the naming policy.
    pub fn column(mut self, name: impl Into<String>) -> Self {
        self.column = Some(name.into());
        self
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn flags(&self) -> ColumnFlags {
        self.flags
    }

    /// The column identifier this spec emits under `policy`.
    pub fn column_name(&self, policy: NamingPolicy) -> String {
        match &self.column {
            Some(explicit) => explicit.clone(),
            None => policy.column(&self.property),
        }
    }
}

/// Static, per-entity-type metadata.
#[derive(Debug)]
pub struct EntityDescriptor {
    entity: String,
    table: String,
    columns: Vec<ColumnSpec>,
}

impl EntityDescriptor {
    /// Build a descriptor, validating the column list.
    ///
    /// Fails when the column list is empty or declares the same property
    /// twice.
    pub fn new(
        entity: impl Into<String>,
        table: impl Into<String>,
        columns: Vec<ColumnSpec>,
    ) -> Result<Self, GantryError> {
        let entity = entity.into();
        let table = table.into();
        if columns.is_empty() {
            return Err(GantryError::Configuration(format!(
                "entity `{entity}` declares no columns"
            )));
        }
        let mut seen = HashMap::new();
        for (idx, col) in columns.iter().enumerate() {
            if seen.insert(col.property.clone(), idx).is_some() {
                return Err(GantryError::Configuration(format!(
                    "entity `{entity}` declares property `{}` twice",
                    col.property
                )));
            }
        }
        Ok(Self {
            entity,
            table,
            columns,
        })
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Table name, emitted verbatim (never run through the naming policy).
    pub fn table(&self) -> &str {
        &self.table
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// Look up a column by property name.
    pub fn column(&self, property: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.property == property)
    }

    /// Look up a column by property name, failing with
    /// [`GantryError::UnknownProperty`] when absent.
    pub fn require(&self, property: &str) -> Result<&ColumnSpec, GantryError> {
        self.column(property)
            .ok_or_else(|| GantryError::UnknownProperty {
                entity: self.entity.clone(),
                property: property.to_string(),
            })
    }

    /// The primary key columns, in declaration order. One entry for a simple
    /// key, several for a composite key.
    pub fn id_columns(&self) -> Vec<&ColumnSpec> {
        self.columns.iter().filter(|c| c.flags.id).collect()
    }

    /// Columns included in a generated INSERT (declaration order, minus
    /// `read_only`).
    pub fn insert_columns(&self) -> Vec<&ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| !c.flags.read_only)
            .collect()
    }

    /// Columns included in a generated UPDATE SET list (declaration order,
    /// minus `read_only`, `non_updatable` and the key itself).
    pub fn update_columns(&self) -> Vec<&ColumnSpec> {
        self.columns
            .iter()
            .filter(|c| !c.flags.read_only && !c.flags.non_updatable && !c.flags.id)
            .collect()
    }
}

/// Typed entity tied to its static descriptor.
///
/// `get`/`set` give the engine dynamic access to property values; `from_row`
/// maps a result row back into the typed struct.
///
/// ## Example
///
/// ```
/// use gantry::descriptor::{ColumnSpec, EntityDescriptor, Record};
/// use gantry::executor::RowDecoder;
/// use gantry::value::{Value, ValueKind, ValueType};
/// use gantry::GantryError;
/// use once_cell::sync::Lazy;
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct User {
///     id: i32,
///     first_name: String,
/// }
///
/// static USER: Lazy<EntityDescriptor> = Lazy::new(|| {
///     EntityDescriptor::new(
///         "User",
///         "user1",
///         vec![
///             ColumnSpec::new("id", ValueKind::Int).id().read_only(),
///             ColumnSpec::new("firstName", ValueKind::String),
///         ],
///     )
///     .expect("valid descriptor")
/// });
///
/// impl Record for User {
///     fn descriptor() -> &'static EntityDescriptor {
///         &USER
///     }
///
///     fn get(&self, property: &str) -> Option<Value> {
///         match property {
///             "id" => Some(self.id.into_value()),
///             "firstName" => Some(self.first_name.clone().into_value()),
///             _ => None,
///         }
///     }
///
///     fn set(&mut self, property: &str, value: Value) -> Result<(), GantryError> {
///         match property {
///             "id" => self.id = ValueType::from_value(value).unwrap_or(self.id),
///             "firstName" => {
///                 if let Some(v) = ValueType::from_value(value) {
///                     self.first_name = v;
///                 }
///             }
///             _ => {
///                 return Err(GantryError::UnknownProperty {
///                     entity: "User".to_string(),
///                     property: property.to_string(),
///                 })
///             }
///         }
///         Ok(())
///     }
///
///     fn from_row(row: &RowDecoder<'_>) -> Result<Self, GantryError> {
///         Ok(User {
///             id: row.get("id")?,
///             first_name: row.get("firstName")?,
///         })
///     }
/// }
/// ```
pub trait Record: Clone + Sized {
    /// The static descriptor for this entity type.
    fn descriptor() -> &'static EntityDescriptor;

    /// Current value of a property; `None` when the property is unknown.
    fn get(&self, property: &str) -> Option<Value>;

    /// Overwrite a property value.
    fn set(&mut self, property: &str, value: Value) -> Result<(), GantryError>;

    /// Map a result row into a typed entity. A conversion failure aborts the
    /// whole call that produced the row.
    fn from_row(row: &RowDecoder<'_>) -> Result<Self, GantryError>;

    /// The primary key value(s) of this instance, in id-column order.
    fn primary_key(&self) -> Result<ValueTuple, GantryError> {
        let descriptor = Self::descriptor();
        let ids = descriptor.id_columns();
        if ids.is_empty() {
            return Err(GantryError::Configuration(format!(
                "entity `{}` has no id column",
                descriptor.entity()
            )));
        }
        let mut values = Vec::with_capacity(ids.len());
        for col in ids {
            let value = self.get(col.property()).ok_or_else(|| {
                GantryError::UnknownProperty {
                    entity: descriptor.entity().to_string(),
                    property: col.property().to_string(),
                }
            })?;
            values.push(value);
        }
        Ok(ValueTuple::from_values(values))
    }
}

/// Explicit descriptor registry, injected into the engine at construction.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    by_entity: HashMap<String, &'static EntityDescriptor>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor. Fails on a duplicate entity name.
    pub fn register(&mut self, descriptor: &'static EntityDescriptor) -> Result<(), GantryError> {
        let name = descriptor.entity().to_string();
        if self.by_entity.contains_key(&name) {
            return Err(GantryError::Configuration(format!(
                "entity `{name}` is already registered"
            )));
        }
        self.by_entity.insert(name, descriptor);
        Ok(())
    }

    pub fn get(&self, entity: &str) -> Option<&'static EntityDescriptor> {
        self.by_entity.get(entity).copied()
    }

    pub fn require(&self, entity: &str) -> Result<&'static EntityDescriptor, GantryError> {
        self.get(entity).ok_or_else(|| {
            GantryError::Configuration(format!("entity `{entity}` is not registered"))
        })
    }

    /// Registered entity names, unordered.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.by_entity.keys().map(String::as_str)
    }
}
