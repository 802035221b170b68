//! Template version store: append-only snapshots of a document's template and mappings.
//!
//! Version numbers are `max + 1` per document, computed inside the transaction that
//! inserts the snapshot. Restoring a version rewrites the live template and mapping set
//! and records a new `restore` snapshot in the same transaction, so history is never
//! rewritten.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::models::{ChangeType, DbId, DocumentDefinition, DocumentVersion, MappingRule, TemplateFile};
use crate::store::queries::{self, NewVersion};
use crate::store::{Store, StoreError};
use crate::workbook::CellRef;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("unknown document: {0}")]
    UnknownDocument(DbId),
    #[error("unknown document version: {0}")]
    UnknownVersion(DbId),
    #[error("duplicate mapping for {worksheet}!{cell}")]
    DuplicateMapping { worksheet: String, cell: String },
    #[error("invalid cell reference {worksheet}!{cell}")]
    InvalidCell { worksheet: String, cell: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for VersionError {
    fn from(e: rusqlite::Error) -> Self {
        VersionError::Store(StoreError::Sqlite(e))
    }
}

/// A change to a document's template and/or its full mapping set.
#[derive(Debug, Clone, Default)]
pub struct DocumentEdit {
    /// `Some(None)` clears the template; `None` leaves it untouched.
    pub template: Option<Option<TemplateFile>>,
    /// Replaces the whole live mapping set when present.
    pub mappings: Option<Vec<MappingRule>>,
}

/// `{pack}__{doc_type}__{variant|default}__v{n}.xlsx`
pub fn snapshot_filename(document: &DocumentDefinition, version: u32) -> String {
    let variant = match document.variant.trim() {
        "" => "default",
        v => v,
    };
    format!(
        "{}__{}__{}__v{}.xlsx",
        document.pack_code.trim(),
        document.doc_type.trim(),
        variant,
        version
    )
}

pub fn save_snapshot(
    store: &Store,
    document_id: DbId,
    user: Option<&str>,
    change_type: ChangeType,
    note: &str,
) -> Result<DocumentVersion, VersionError> {
    store.transaction(|tx| snapshot_in(tx, document_id, user, change_type, note))
}

pub fn restore_version(
    store: &Store,
    version_id: DbId,
    user: Option<&str>,
    note: &str,
) -> Result<DocumentVersion, VersionError> {
    store.transaction(|tx| {
        let version =
            queries::get_version(tx, version_id)?.ok_or(VersionError::UnknownVersion(version_id))?;
        queries::set_document_template(tx, version.document_id, version.template.as_ref())?;
        replace_mappings(tx, version.document_id, &version.mappings)?;
        let restored = snapshot_in(tx, version.document_id, user, ChangeType::Restore, note)?;
        info!(
            document_id = version.document_id,
            from_version = version.version,
            new_version = restored.version,
            "[VERSION] restored"
        );
        Ok(restored)
    })
}

/// Applies an edit and snapshots the result as a `save` version, atomically.
pub fn save_document_edit(
    store: &Store,
    document_id: DbId,
    edit: &DocumentEdit,
    user: Option<&str>,
    note: &str,
) -> Result<DocumentVersion, VersionError> {
    if let Some(rules) = &edit.mappings {
        validate_rules(rules)?;
    }
    store.transaction(|tx| {
        queries::get_document(tx, document_id)?.ok_or(VersionError::UnknownDocument(document_id))?;
        if let Some(template) = &edit.template {
            queries::set_document_template(tx, document_id, template.as_ref())?;
        }
        if let Some(rules) = &edit.mappings {
            replace_mappings(tx, document_id, rules)?;
        }
        snapshot_in(tx, document_id, user, ChangeType::Save, note)
    })
}

/// Versions of a document, newest first.
pub fn list_versions(store: &Store, document_id: DbId) -> Result<Vec<DocumentVersion>, VersionError> {
    Ok(store.with_conn(|conn| queries::list_versions(conn, document_id))?)
}

fn snapshot_in(
    conn: &Connection,
    document_id: DbId,
    user: Option<&str>,
    change_type: ChangeType,
    note: &str,
) -> Result<DocumentVersion, VersionError> {
    let document =
        queries::get_document(conn, document_id)?.ok_or(VersionError::UnknownDocument(document_id))?;
    let number = queries::next_version_number(conn, document_id)?;
    let mappings: Vec<MappingRule> = queries::list_mappings(conn, document_id)?
        .into_iter()
        .map(|m| m.rule)
        .collect();
    let template = document.template.as_ref().map(|t| TemplateFile {
        name: snapshot_filename(&document, number),
        bytes: t.bytes.clone(),
    });
    let version = queries::insert_version(
        conn,
        &NewVersion {
            document_id,
            version: number,
            template: template.as_ref(),
            mappings: &mappings,
            change_type,
            change_note: note.trim(),
            created_by: user,
            created_at: Utc::now(),
        },
    )?;
    info!(
        document_id,
        version = version.version,
        change_type = change_type.as_str(),
        mappings = mappings.len(),
        "[VERSION] snapshot saved"
    );
    Ok(version)
}

/// Trims fields; a zero sequence becomes the 1-based position.
pub fn normalize_rules(rules: &[MappingRule]) -> Vec<MappingRule> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| MappingRule {
            worksheet_name: rule.worksheet_name.trim().to_string(),
            cell_ref: rule.cell_ref.trim().to_string(),
            source_key: rule.source_key.trim().to_string(),
            transform: rule.transform.trim().to_string(),
            required: rule.required,
            sequence: if rule.sequence == 0 {
                index as u32 + 1
            } else {
                rule.sequence
            },
        })
        .collect()
}

fn validate_rules(rules: &[MappingRule]) -> Result<(), VersionError> {
    let mut seen = HashSet::new();
    for rule in normalize_rules(rules) {
        let cell: CellRef = rule.cell_ref.parse().map_err(|_| VersionError::InvalidCell {
            worksheet: rule.worksheet_name.clone(),
            cell: rule.cell_ref.clone(),
        })?;
        if !seen.insert((rule.worksheet_name.clone(), cell)) {
            return Err(VersionError::DuplicateMapping {
                worksheet: rule.worksheet_name,
                cell: cell.to_string(),
            });
        }
    }
    Ok(())
}

fn replace_mappings(conn: &Connection, document_id: DbId, rules: &[MappingRule]) -> Result<(), VersionError> {
    queries::delete_mappings(conn, document_id)?;
    for rule in normalize_rules(rules) {
        queries::insert_mapping(conn, document_id, &rule)?;
    }
    Ok(())
}
