use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS packs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            default_page_format TEXT NOT NULL DEFAULT 'A4',
            fallback_page_format TEXT
        );

        CREATE TABLE IF NOT EXISTS pack_documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pack_id INTEGER NOT NULL REFERENCES packs(id) ON DELETE CASCADE,
            doc_type TEXT NOT NULL,
            variant TEXT NOT NULL DEFAULT '',
            sequence INTEGER NOT NULL DEFAULT 1,
            enabled INTEGER NOT NULL DEFAULT 1,
            template_name TEXT,
            template_bytes BLOB,
            UNIQUE (pack_id, doc_type, variant)
        );

        CREATE TABLE IF NOT EXISTS cell_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES pack_documents(id) ON DELETE CASCADE,
            worksheet_name TEXT NOT NULL,
            cell_ref TEXT NOT NULL,
            source_key TEXT NOT NULL,
            transform TEXT NOT NULL DEFAULT '',
            required INTEGER NOT NULL DEFAULT 0,
            sequence INTEGER NOT NULL DEFAULT 1,
            UNIQUE (document_id, worksheet_name, cell_ref)
        );

        CREATE TABLE IF NOT EXISTS document_versions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            document_id INTEGER NOT NULL REFERENCES pack_documents(id) ON DELETE CASCADE,
            version INTEGER NOT NULL,
            template_name TEXT,
            template_bytes BLOB,
            mappings_snapshot TEXT NOT NULL DEFAULT '[]',
            change_type TEXT NOT NULL,
            change_note TEXT NOT NULL DEFAULT '',
            created_by TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (document_id, version)
        );

        CREATE TABLE IF NOT EXISTS artifacts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pack_code TEXT NOT NULL,
            shipment_reference TEXT,
            carton_code TEXT,
            status TEXT NOT NULL,
            pdf_filename TEXT,
            pdf BLOB,
            checksum TEXT NOT NULL DEFAULT '',
            created_by TEXT,
            created_at TEXT NOT NULL,
            remote_path TEXT NOT NULL DEFAULT '',
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT NOT NULL DEFAULT ''
        );

        CREATE INDEX IF NOT EXISTS artifacts_status_created
            ON artifacts (status, created_at, id);

        CREATE TABLE IF NOT EXISTS artifact_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artifact_id INTEGER NOT NULL REFERENCES artifacts(id) ON DELETE CASCADE,
            doc_type TEXT NOT NULL,
            variant TEXT NOT NULL DEFAULT '',
            sequence INTEGER NOT NULL DEFAULT 1,
            xlsx_filename TEXT NOT NULL,
            xlsx BLOB NOT NULL,
            pdf_filename TEXT NOT NULL,
            pdf BLOB NOT NULL
        );
        "#,
    )
}
