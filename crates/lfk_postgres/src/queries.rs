//! SQL builders for the cleanup statements.
//!
//! Table and column names come from validated relation definitions and are
//! always emitted quoted. Values are bound as parameters:
//! `$1` = parent ids (`bigint[]`), `$2` = batch limit.

use lfk_core::{LockMode, RelationDefinition};

pub const DELETED_RECORDS_TABLE: &str = "loose_foreign_keys_deleted_records";

/// Quote a possibly schema-qualified identifier.
pub fn quote_ident(name: &str) -> String {
    name.split('.')
        .map(|part| format!("\"{}\"", part.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(".")
}

fn lock_clause(lock_mode: LockMode) -> &'static str {
    match lock_mode {
        LockMode::Blocking => "FOR UPDATE",
        LockMode::SkipLocked => "FOR UPDATE SKIP LOCKED",
    }
}

fn bounded_selection(relation: &RelationDefinition, lock_mode: LockMode) -> String {
    format!(
        "SELECT {pk} FROM {table} WHERE {column} = ANY($1) LIMIT $2 {lock}",
        pk = quote_ident(&relation.primary_key),
        table = quote_ident(&relation.child_table),
        column = quote_ident(&relation.column),
        lock = lock_clause(lock_mode),
    )
}

pub fn delete_children(relation: &RelationDefinition, lock_mode: LockMode) -> String {
    format!(
        "DELETE FROM {table} WHERE {pk} IN ({selection})",
        table = quote_ident(&relation.child_table),
        pk = quote_ident(&relation.primary_key),
        selection = bounded_selection(relation, lock_mode),
    )
}

pub fn nullify_children(relation: &RelationDefinition, lock_mode: LockMode) -> String {
    format!(
        "UPDATE {table} SET {column} = NULL WHERE {pk} IN ({selection})",
        table = quote_ident(&relation.child_table),
        column = quote_ident(&relation.column),
        pk = quote_ident(&relation.primary_key),
        selection = bounded_selection(relation, lock_mode),
    )
}
