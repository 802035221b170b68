//! Page concatenation of converted documents into one pack PDF.

use lopdf::{Dictionary, Document, Object, ObjectId};
use thiserror::Error;
use tracing::debug;

use crate::contract::PdfMerger;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("no PDF documents to merge")]
    Empty,
    #[error("PDF input {index} is not readable: {reason}")]
    Parse { index: usize, reason: String },
    #[error("failed to write merged PDF: {0}")]
    Write(String),
}

/// [`PdfMerger`] over `lopdf`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfMerger;

impl PdfMerger for LopdfMerger {
    fn merge(&self, pdfs: &[Vec<u8>]) -> Result<Vec<u8>, PdfError> {
        merge_pdf_documents(pdfs)
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()
        .and_then(|dict| dict.get(b"Type").ok())
        .and_then(|t| t.as_name().ok())
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Upper bound on the Parent chain walk; guards against cyclic page trees.
const MAX_TREE_DEPTH: usize = 64;

/// Copies the attributes `page` inherits from its Pages ancestors onto the page itself.
/// Values set on the page, or on a nearer ancestor, win.
fn with_inherited(doc: &Document, page: &Dictionary) -> Dictionary {
    let mut page = page.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(node_id) = parent {
        if depth == MAX_TREE_DEPTH {
            break;
        }
        depth += 1;
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    page
}

/// Appends every page of every input, in input order, under a single page tree.
pub fn merge_pdf_documents(pdfs: &[Vec<u8>]) -> Result<Vec<u8>, PdfError> {
    match pdfs {
        [] => return Err(PdfError::Empty),
        [single] => {
            Document::load_mem(single).map_err(|e| PdfError::Parse {
                index: 0,
                reason: e.to_string(),
            })?;
            return Ok(single.clone());
        }
        _ => {}
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects = std::collections::BTreeMap::new();

    for (index, bytes) in pdfs.iter().enumerate() {
        let mut doc = Document::load_mem(bytes).map_err(|e| PdfError::Parse {
            index,
            reason: e.to_string(),
        })?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;
        for (_, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).map_err(|e| PdfError::Parse {
                index,
                reason: e.to_string(),
            })?;
            pages.push((page_id, with_inherited(&doc, page)));
        }
        debug!(index, pages = pages.len(), "[PDF] loaded input");
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut root_pages: Option<(ObjectId, Dictionary)> = None;

    for (object_id, object) in objects {
        match type_name(&object) {
            Some(b"Catalog") => {
                if catalog.is_none() {
                    if let Ok(dict) = object.as_dict() {
                        catalog = Some((object_id, dict.clone()));
                    }
                }
            }
            // Every page already carries its inherited attributes, so the old
            // tree nodes are dropped and only one id is reused as the new root.
            Some(b"Pages") => {
                if root_pages.is_none() {
                    if let Ok(dict) = object.as_dict() {
                        let mut dict = dict.clone();
                        dict.remove(b"Parent");
                        for key in INHERITABLE {
                            dict.remove(key);
                        }
                        root_pages = Some((object_id, dict));
                    }
                }
            }
            Some(b"Page") | Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                merged.objects.insert(object_id, object);
            }
        }
    }

    let (catalog_id, mut catalog_dict) = catalog.ok_or_else(|| PdfError::Parse {
        index: 0,
        reason: "catalog root not found".to_string(),
    })?;
    let (pages_id, mut pages_dict) = root_pages.ok_or_else(|| PdfError::Parse {
        index: 0,
        reason: "page tree root not found".to_string(),
    })?;

    for (page_id, page) in &pages {
        let mut page = page.clone();
        page.set("Parent", pages_id);
        merged.objects.insert(*page_id, Object::Dictionary(page));
    }

    pages_dict.set("Count", pages.len() as i64);
    pages_dict.set(
        "Kids",
        pages
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    merged
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    merged
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    merged.trailer.set("Root", catalog_id);

    merged.max_id = merged.objects.keys().map(|(id, _)| *id).max().unwrap_or(0);
    merged.renumber_objects();
    merged.compress();

    let mut out = Vec::new();
    merged
        .save_to(&mut out)
        .map_err(|e| PdfError::Write(e.to_string()))?;
    debug!(inputs = pdfs.len(), pages = pages.len(), bytes = out.len(), "[PDF] merged");
    Ok(out)
}
