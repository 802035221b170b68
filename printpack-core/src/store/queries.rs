use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Result, StoreError};
use crate::models::{
    ArtifactStatus, CellMapping, ChangeType, DbId, DocumentDefinition, DocumentVersion,
    GeneratedArtifact, GeneratedArtifactItem, MappingRule, PackDefinition, PageFormat,
    TemplateFile, UnknownVariant,
};

fn text_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: UnknownVariant| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Like [`text_enum`] for a nullable column; NULL and blank text read as `None`.
fn optional_text_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: Option<String> = row.get(idx)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|e: UnknownVariant| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
    }
}

fn template_columns(name: Option<String>, bytes: Option<Vec<u8>>) -> Option<TemplateFile> {
    match (name, bytes) {
        (Some(name), Some(bytes)) if !bytes.is_empty() => Some(TemplateFile { name, bytes }),
        _ => None,
    }
}

// ---- packs ----

const PACK_COLUMNS: &str =
    "id, code, name, active, default_page_format, fallback_page_format";

fn pack_from_row(row: &Row<'_>) -> rusqlite::Result<PackDefinition> {
    Ok(PackDefinition {
        id: row.get(0)?,
        code: row.get(1)?,
        name: row.get(2)?,
        active: row.get(3)?,
        default_page_format: text_enum(row, 4)?,
        fallback_page_format: optional_text_enum(row, 5)?,
    })
}

pub struct NewPack<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub active: bool,
    pub default_page_format: PageFormat,
    pub fallback_page_format: Option<PageFormat>,
}

/// Inserts the pack or updates the existing row with the same code.
pub fn upsert_pack(conn: &Connection, pack: &NewPack<'_>) -> Result<PackDefinition> {
    conn.execute(
        "INSERT INTO packs (code, name, active, default_page_format, fallback_page_format)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (code) DO UPDATE SET
            name = excluded.name,
            active = excluded.active,
            default_page_format = excluded.default_page_format,
            fallback_page_format = excluded.fallback_page_format",
        params![
            pack.code,
            pack.name,
            pack.active,
            pack.default_page_format.as_str(),
            pack.fallback_page_format.map(|f| f.as_str()),
        ],
    )?;
    get_pack_by_code(conn, pack.code)?.ok_or(StoreError::NotFound {
        entity: "pack",
        id: conn.last_insert_rowid(),
    })
}

pub fn get_pack_by_code(conn: &Connection, code: &str) -> Result<Option<PackDefinition>> {
    let sql = format!("SELECT {PACK_COLUMNS} FROM packs WHERE code = ?1");
    Ok(conn.query_row(&sql, params![code], pack_from_row).optional()?)
}

pub fn find_active_pack(conn: &Connection, code: &str) -> Result<Option<PackDefinition>> {
    let sql = format!("SELECT {PACK_COLUMNS} FROM packs WHERE code = ?1 AND active = 1");
    Ok(conn.query_row(&sql, params![code], pack_from_row).optional()?)
}

// ---- documents ----

const DOCUMENT_COLUMNS: &str = "d.id, d.pack_id, p.code, d.doc_type, d.variant, d.sequence, \
     d.enabled, d.template_name, d.template_bytes";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<DocumentDefinition> {
    Ok(DocumentDefinition {
        id: row.get(0)?,
        pack_id: row.get(1)?,
        pack_code: row.get(2)?,
        doc_type: row.get(3)?,
        variant: row.get(4)?,
        sequence: row.get(5)?,
        enabled: row.get(6)?,
        template: template_columns(row.get(7)?, row.get(8)?),
    })
}

pub struct NewDocument<'a> {
    pub pack_id: DbId,
    pub doc_type: &'a str,
    pub variant: &'a str,
    pub sequence: u32,
    pub enabled: bool,
}

/// Inserts or updates a document keyed by `(pack, doc_type, variant)`. The template is
/// left untouched.
pub fn upsert_document(conn: &Connection, doc: &NewDocument<'_>) -> Result<DocumentDefinition> {
    conn.execute(
        "INSERT INTO pack_documents (pack_id, doc_type, variant, sequence, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (pack_id, doc_type, variant) DO UPDATE SET
            sequence = excluded.sequence,
            enabled = excluded.enabled",
        params![doc.pack_id, doc.doc_type, doc.variant, doc.sequence, doc.enabled],
    )?;
    let id: DbId = conn.query_row(
        "SELECT id FROM pack_documents WHERE pack_id = ?1 AND doc_type = ?2 AND variant = ?3",
        params![doc.pack_id, doc.doc_type, doc.variant],
        |row| row.get(0),
    )?;
    get_document(conn, id)?.ok_or(StoreError::NotFound {
        entity: "document",
        id,
    })
}

pub fn get_document(conn: &Connection, id: DbId) -> Result<Option<DocumentDefinition>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM pack_documents d JOIN packs p ON p.id = d.pack_id
         WHERE d.id = ?1"
    );
    Ok(conn.query_row(&sql, params![id], document_from_row).optional()?)
}

/// Enabled documents of a pack ordered by `(sequence, id)`, optionally filtered by variant.
pub fn list_enabled_documents(
    conn: &Connection,
    pack_id: DbId,
    variant: Option<&str>,
) -> Result<Vec<DocumentDefinition>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM pack_documents d JOIN packs p ON p.id = d.pack_id
         WHERE d.pack_id = ?1 AND d.enabled = 1 AND (?2 IS NULL OR d.variant = ?2)
         ORDER BY d.sequence, d.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pack_id, variant], document_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Every document of a pack, enabled or not, ordered by `(sequence, id)`.
pub fn list_pack_documents(conn: &Connection, pack_id: DbId) -> Result<Vec<DocumentDefinition>> {
    let sql = format!(
        "SELECT {DOCUMENT_COLUMNS} FROM pack_documents d JOIN packs p ON p.id = d.pack_id
         WHERE d.pack_id = ?1 ORDER BY d.sequence, d.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pack_id], document_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn set_document_enabled(conn: &Connection, id: DbId, enabled: bool) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pack_documents SET enabled = ?2 WHERE id = ?1",
        params![id, enabled],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "document",
            id,
        });
    }
    Ok(())
}

pub fn set_document_template(
    conn: &Connection,
    document_id: DbId,
    template: Option<&TemplateFile>,
) -> Result<()> {
    let changed = conn.execute(
        "UPDATE pack_documents SET template_name = ?2, template_bytes = ?3 WHERE id = ?1",
        params![
            document_id,
            template.map(|t| t.name.as_str()),
            template.map(|t| t.bytes.as_slice()),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "document",
            id: document_id,
        });
    }
    Ok(())
}

// ---- mappings ----

fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<CellMapping> {
    Ok(CellMapping {
        id: row.get(0)?,
        document_id: row.get(1)?,
        rule: MappingRule {
            worksheet_name: row.get(2)?,
            cell_ref: row.get(3)?,
            source_key: row.get(4)?,
            transform: row.get(5)?,
            required: row.get(6)?,
            sequence: row.get(7)?,
        },
    })
}

/// Live mappings of a document ordered by `(sequence, id)`.
pub fn list_mappings(conn: &Connection, document_id: DbId) -> Result<Vec<CellMapping>> {
    let mut stmt = conn.prepare(
        "SELECT id, document_id, worksheet_name, cell_ref, source_key, transform, required, sequence
         FROM cell_mappings WHERE document_id = ?1 ORDER BY sequence, id",
    )?;
    let rows = stmt.query_map(params![document_id], mapping_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn insert_mapping(conn: &Connection, document_id: DbId, rule: &MappingRule) -> Result<DbId> {
    conn.execute(
        "INSERT INTO cell_mappings
            (document_id, worksheet_name, cell_ref, source_key, transform, required, sequence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            document_id,
            rule.worksheet_name,
            rule.cell_ref,
            rule.source_key,
            rule.transform,
            rule.required,
            rule.sequence,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn delete_mappings(conn: &Connection, document_id: DbId) -> Result<usize> {
    Ok(conn.execute(
        "DELETE FROM cell_mappings WHERE document_id = ?1",
        params![document_id],
    )?)
}

// ---- artifacts ----

const ARTIFACT_COLUMNS: &str = "id, pack_code, shipment_reference, carton_code, status, \
     pdf_filename, pdf, checksum, created_by, created_at, remote_path, sync_attempts, last_error";

fn artifact_from_row(row: &Row<'_>) -> rusqlite::Result<GeneratedArtifact> {
    Ok(GeneratedArtifact {
        id: row.get(0)?,
        pack_code: row.get(1)?,
        shipment_reference: row.get(2)?,
        carton_code: row.get(3)?,
        status: text_enum(row, 4)?,
        pdf_filename: row.get(5)?,
        pdf: row.get(6)?,
        checksum: row.get(7)?,
        created_by: row.get(8)?,
        created_at: row.get(9)?,
        remote_path: row.get(10)?,
        sync_attempts: row.get(11)?,
        last_error: row.get(12)?,
    })
}

pub struct NewArtifact<'a> {
    pub pack_code: &'a str,
    pub shipment_reference: Option<&'a str>,
    pub carton_code: Option<&'a str>,
    pub created_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

/// Creates an artifact in `generated` status.
pub fn insert_artifact(conn: &Connection, new: &NewArtifact<'_>) -> Result<GeneratedArtifact> {
    conn.execute(
        "INSERT INTO artifacts (pack_code, shipment_reference, carton_code, status, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            new.pack_code,
            new.shipment_reference,
            new.carton_code,
            ArtifactStatus::Generated.as_str(),
            new.created_by,
            new.created_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    require_artifact(conn, id)
}

pub fn get_artifact(conn: &Connection, id: DbId) -> Result<Option<GeneratedArtifact>> {
    let sql = format!("SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE id = ?1");
    Ok(conn.query_row(&sql, params![id], artifact_from_row).optional()?)
}

pub fn require_artifact(conn: &Connection, id: DbId) -> Result<GeneratedArtifact> {
    get_artifact(conn, id)?.ok_or(StoreError::NotFound {
        entity: "artifact",
        id,
    })
}

/// Artifacts in any of `statuses`, oldest first, at most `limit`.
pub fn select_artifacts_by_status(
    conn: &Connection,
    statuses: &[ArtifactStatus],
    limit: usize,
) -> Result<Vec<GeneratedArtifact>> {
    if statuses.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = (0..statuses.len())
        .map(|i| format!("?{}", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE status IN ({placeholders})
         ORDER BY created_at, id LIMIT ?1"
    );
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(limit as i64)];
    values.extend(
        statuses
            .iter()
            .map(|s| Box::new(s.as_str()) as Box<dyn rusqlite::ToSql>),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())),
        artifact_from_row,
    )?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Stores the final PDF and moves the artifact to `sync_pending`.
pub fn finalize_artifact(
    conn: &Connection,
    id: DbId,
    pdf_filename: &str,
    pdf: &[u8],
    checksum: &str,
) -> Result<GeneratedArtifact> {
    conn.execute(
        "UPDATE artifacts SET pdf_filename = ?2, pdf = ?3, checksum = ?4, status = ?5
         WHERE id = ?1",
        params![
            id,
            pdf_filename,
            pdf,
            checksum,
            ArtifactStatus::SyncPending.as_str()
        ],
    )?;
    require_artifact(conn, id)
}

pub fn mark_generation_failed(conn: &Connection, id: DbId, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE artifacts SET status = ?2, last_error = ?3 WHERE id = ?1",
        params![id, ArtifactStatus::GenerationFailed.as_str(), error],
    )?;
    Ok(())
}

/// Persists the outcome of one sync attempt.
pub fn record_sync_outcome(conn: &Connection, artifact: &GeneratedArtifact) -> Result<()> {
    conn.execute(
        "UPDATE artifacts SET status = ?2, sync_attempts = ?3, remote_path = ?4, last_error = ?5
         WHERE id = ?1",
        params![
            artifact.id,
            artifact.status.as_str(),
            artifact.sync_attempts,
            artifact.remote_path,
            artifact.last_error,
        ],
    )?;
    Ok(())
}

// ---- artifact items ----

pub fn insert_artifact_item(conn: &Connection, item: &GeneratedArtifactItem) -> Result<DbId> {
    conn.execute(
        "INSERT INTO artifact_items
            (artifact_id, doc_type, variant, sequence, xlsx_filename, xlsx, pdf_filename, pdf)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            item.artifact_id,
            item.doc_type,
            item.variant,
            item.sequence,
            item.xlsx_filename,
            item.xlsx,
            item.pdf_filename,
            item.pdf,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_artifact_items(conn: &Connection, artifact_id: DbId) -> Result<Vec<GeneratedArtifactItem>> {
    let mut stmt = conn.prepare(
        "SELECT id, artifact_id, doc_type, variant, sequence, xlsx_filename, xlsx, pdf_filename, pdf
         FROM artifact_items WHERE artifact_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![artifact_id], |row| {
        Ok(GeneratedArtifactItem {
            id: row.get(0)?,
            artifact_id: row.get(1)?,
            doc_type: row.get(2)?,
            variant: row.get(3)?,
            sequence: row.get(4)?,
            xlsx_filename: row.get(5)?,
            xlsx: row.get(6)?,
            pdf_filename: row.get(7)?,
            pdf: row.get(8)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn count_artifacts(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM artifacts", [], |row| row.get(0))?;
    Ok(n as u64)
}

// ---- versions ----

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<(DocumentVersion, String)> {
    Ok((
        DocumentVersion {
            id: row.get(0)?,
            document_id: row.get(1)?,
            version: row.get(2)?,
            template: template_columns(row.get(3)?, row.get(4)?),
            mappings: Vec::new(),
            change_type: text_enum::<ChangeType>(row, 6)?,
            change_note: row.get(7)?,
            created_by: row.get(8)?,
            created_at: row.get(9)?,
        },
        row.get(5)?,
    ))
}

fn decode_version((mut version, snapshot): (DocumentVersion, String)) -> Result<DocumentVersion> {
    version.mappings = serde_json::from_str(&snapshot)?;
    Ok(version)
}

const VERSION_COLUMNS: &str = "id, document_id, version, template_name, template_bytes, \
     mappings_snapshot, change_type, change_note, created_by, created_at";

/// `max(version) + 1` for the document, starting at 1.
pub fn next_version_number(conn: &Connection, document_id: DbId) -> Result<u32> {
    let current: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM document_versions WHERE document_id = ?1",
        params![document_id],
        |row| row.get(0),
    )?;
    Ok(current.unwrap_or(0) + 1)
}

pub struct NewVersion<'a> {
    pub document_id: DbId,
    pub version: u32,
    pub template: Option<&'a TemplateFile>,
    pub mappings: &'a [MappingRule],
    pub change_type: ChangeType,
    pub change_note: &'a str,
    pub created_by: Option<&'a str>,
    pub created_at: DateTime<Utc>,
}

pub fn insert_version(conn: &Connection, new: &NewVersion<'_>) -> Result<DocumentVersion> {
    let snapshot = serde_json::to_string(new.mappings)?;
    conn.execute(
        "INSERT INTO document_versions
            (document_id, version, template_name, template_bytes, mappings_snapshot,
             change_type, change_note, created_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new.document_id,
            new.version,
            new.template.map(|t| t.name.as_str()),
            new.template.map(|t| t.bytes.as_slice()),
            snapshot,
            new.change_type.as_str(),
            new.change_note,
            new.created_by,
            new.created_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_version(conn, id)?.ok_or(StoreError::NotFound {
        entity: "document version",
        id,
    })
}

pub fn get_version(conn: &Connection, id: DbId) -> Result<Option<DocumentVersion>> {
    let sql = format!("SELECT {VERSION_COLUMNS} FROM document_versions WHERE id = ?1");
    conn.query_row(&sql, params![id], version_from_row)
        .optional()?
        .map(decode_version)
        .transpose()
}

/// Versions of a document, newest first.
pub fn list_versions(conn: &Connection, document_id: DbId) -> Result<Vec<DocumentVersion>> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS} FROM document_versions WHERE document_id = ?1
         ORDER BY version DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![document_id], version_from_row)?;
    rows.map(|row| decode_version(row?)).collect()
}
