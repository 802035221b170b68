#![allow(dead_code)]

use printpack_core::models::{DocumentDefinition, MappingRule, PackDefinition, PageFormat, TemplateFile};
use printpack_core::payload::Value;
use printpack_core::store::queries::{self, NewDocument, NewPack};
use printpack_core::store::Store;
use printpack_core::workbook::memory::MemoryWorkbook;

pub fn store() -> Store {
    Store::open_in_memory().expect("in-memory store")
}

/// Memory-format template bytes with the given worksheets.
pub fn template(sheets: &[&str]) -> Vec<u8> {
    sheets
        .iter()
        .fold(MemoryWorkbook::new(), |book, name| book.with_sheet(name))
        .encode()
}

pub fn fake_pdf(tag: &str) -> Vec<u8> {
    format!("%PDF-1.4 {tag}").into_bytes()
}

pub fn seed_pack(store: &Store, code: &str) -> PackDefinition {
    store
        .with_conn(|conn| {
            queries::upsert_pack(
                conn,
                &NewPack {
                    code,
                    name: code,
                    active: true,
                    default_page_format: PageFormat::A4,
                    fallback_page_format: None,
                },
            )
        })
        .expect("seed pack")
}

pub fn seed_document(
    store: &Store,
    pack: &PackDefinition,
    doc_type: &str,
    variant: &str,
    sequence: u32,
    template: Option<Vec<u8>>,
    rules: &[MappingRule],
) -> DocumentDefinition {
    store
        .with_conn(|conn| {
            let doc = queries::upsert_document(
                conn,
                &NewDocument {
                    pack_id: pack.id,
                    doc_type,
                    variant,
                    sequence,
                    enabled: true,
                },
            )?;
            if let Some(bytes) = template {
                let file = TemplateFile {
                    name: format!("{doc_type}.json"),
                    bytes,
                };
                queries::set_document_template(conn, doc.id, Some(&file))?;
            }
            for rule in rules {
                queries::insert_mapping(conn, doc.id, rule)?;
            }
            Ok::<_, printpack_core::store::StoreError>(queries::get_document(conn, doc.id)?.expect("document"))
        })
        .expect("seed document")
}

pub fn shipment_payload(reference: &str, items: &[&str]) -> Value {
    Value::from_json(serde_json::json!({
        "reference": reference,
        "destination_city": "Bamako",
        "items": items
            .iter()
            .map(|name| serde_json::json!({ "product_name": name, "quantity": 2 }))
            .collect::<Vec<_>>(),
    }))
}

pub fn carton_payload(code: &str, position: i64) -> Value {
    Value::from_json(serde_json::json!({ "code": code, "position": position }))
}
