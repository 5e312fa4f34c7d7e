//! Relation definitions and the registry that serves them.
//!
//! Definitions are loaded once from YAML keyed by parent table:
//!
//! ```yaml
//! ci_runners:
//!   - table: ci_builds
//!     column: runner_id
//!     on_delete: async_nullify
//! ```
//!
//! Parent tables without a schema are qualified with `public.` so they line up
//! with `fully_qualified_table_name` in the deleted-records log.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::LfkError;
use crate::types::ModificationKind;

pub const DEFAULT_SCHEMA: &str = "public";

// Lowercase only: names are emitted quoted, and quoted mixed case would not
// match tables created with unquoted DDL.
static IDENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)?$").unwrap());

static COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

/// What happens to child rows once their parent is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    AsyncDelete,
    AsyncNullify,
}

impl Strategy {
    pub fn modification_kind(&self) -> ModificationKind {
        match self {
            Self::AsyncDelete => ModificationKind::Deletion,
            Self::AsyncNullify => ModificationKind::Update,
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AsyncDelete => write!(f, "async_delete"),
            Self::AsyncNullify => write!(f, "async_nullify"),
        }
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    table: String,
    column: String,
    on_delete: Strategy,
    #[serde(default = "default_primary_key")]
    primary_key: String,
}

/// A declared parent -> child loose foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    /// Fully qualified parent table.
    pub parent_table: String,
    pub child_table: String,
    /// Column on the child table holding the parent id.
    pub column: String,
    pub strategy: Strategy,
    /// Primary key of the child table, used to bound each pass.
    pub primary_key: String,
}

impl RelationDefinition {
    pub fn new(
        parent_table: impl Into<String>,
        child_table: impl Into<String>,
        column: impl Into<String>,
        strategy: Strategy,
    ) -> Self {
        Self {
            parent_table: qualify(&parent_table.into()),
            child_table: child_table.into(),
            column: column.into(),
            strategy,
            primary_key: default_primary_key(),
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    fn validate(&self) -> Result<(), LfkError> {
        let invalid = |reason: String| LfkError::InvalidDefinition {
            parent_table: self.parent_table.clone(),
            child_table: self.child_table.clone(),
            reason,
        };

        if !IDENT_RE.is_match(&self.parent_table) {
            return Err(invalid(format!(
                "parent table {:?} is not a valid identifier",
                self.parent_table
            )));
        }
        if !IDENT_RE.is_match(&self.child_table) {
            return Err(invalid(format!(
                "child table {:?} is not a valid identifier",
                self.child_table
            )));
        }
        if !COLUMN_RE.is_match(&self.column) {
            return Err(invalid(format!(
                "column {:?} is not a valid identifier",
                self.column
            )));
        }
        if !COLUMN_RE.is_match(&self.primary_key) {
            return Err(invalid(format!(
                "primary key {:?} is not a valid identifier",
                self.primary_key
            )));
        }
        if self.strategy == Strategy::AsyncNullify && self.column == self.primary_key {
            return Err(invalid("cannot nullify the primary key".to_string()));
        }
        Ok(())
    }
}

/// Qualify a table name with the default schema when it has none.
pub fn qualify(table: &str) -> String {
    if table.contains('.') {
        table.to_string()
    } else {
        format!("{DEFAULT_SCHEMA}.{table}")
    }
}

/// Immutable set of relation definitions, grouped by parent table.
#[derive(Debug, Clone, Default)]
pub struct RelationRegistry {
    by_parent: BTreeMap<String, Vec<RelationDefinition>>,
}

impl RelationRegistry {
    /// Build a registry from definitions, preserving declaration order per parent.
    pub fn new(definitions: Vec<RelationDefinition>) -> Result<Self, LfkError> {
        let mut by_parent: BTreeMap<String, Vec<RelationDefinition>> = BTreeMap::new();

        for mut definition in definitions {
            definition.parent_table = qualify(&definition.parent_table);
            definition.validate()?;

            let siblings = by_parent
                .entry(definition.parent_table.clone())
                .or_default();

            if siblings
                .iter()
                .any(|d| d.child_table == definition.child_table && d.column == definition.column)
            {
                return Err(LfkError::InvalidDefinition {
                    parent_table: definition.parent_table.clone(),
                    child_table: definition.child_table.clone(),
                    reason: format!("duplicate column {}", definition.column),
                });
            }

            siblings.push(definition);
        }

        Ok(Self { by_parent })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, LfkError> {
        let raw: BTreeMap<String, Vec<RawDefinition>> = serde_yaml::from_str(yaml)
            .map_err(|e| LfkError::Config(format!("invalid relation definitions: {e}")))?;

        let mut definitions = Vec::new();
        for (parent, entries) in raw {
            if entries.is_empty() {
                return Err(LfkError::Config(format!(
                    "parent table {parent} declares no relations"
                )));
            }
            for entry in entries {
                definitions.push(
                    RelationDefinition::new(&parent, entry.table, entry.column, entry.on_delete)
                        .with_primary_key(entry.primary_key),
                );
            }
        }

        Self::new(definitions)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LfkError> {
        let path = path.as_ref();
        info!("Loading relation definitions from {}", path.display());

        let content = std::fs::read_to_string(path)
            .map_err(|e| LfkError::Config(format!("failed to read {}: {e}", path.display())))?;
        let registry = Self::from_yaml_str(&content)?;

        info!(
            "Loaded {} relations across {} parent tables",
            registry.len(),
            registry.by_parent.len()
        );
        Ok(registry)
    }

    /// Relations declared for a parent table, in declaration order.
    pub fn definitions_for(&self, parent_table: &str) -> &[RelationDefinition] {
        self.by_parent
            .get(&qualify(parent_table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn parent_tables(&self) -> impl Iterator<Item = &str> {
        self.by_parent.keys().map(String::as_str)
    }

    /// Every distinct child table referenced by any relation.
    pub fn child_tables(&self) -> BTreeSet<&str> {
        self.definitions().map(|d| d.child_table.as_str()).collect()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &RelationDefinition> {
        self.by_parent.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_parent.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_parent.is_empty()
    }
}
