//! PDF merge
//!
//! Every input is renumbered into its own id range, its pages are copied with
//! inherited attributes flattened onto them, and a fresh page tree is built over
//! the collected pages in input order.

use super::document::{install_page_tree, load_document, save_document, type_name};
use super::types::ProcessingError;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

const MAX_TREE_DEPTH: usize = 64;

pub(crate) fn merge_documents(
    inputs: &[Vec<u8>],
    max_pages: usize,
) -> Result<Vec<u8>, ProcessingError> {
    if inputs.is_empty() {
        return Err(ProcessingError::InvalidInput("No documents to merge".into()));
    }

    let mut next_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (index, bytes) in inputs.iter().enumerate() {
        let mut doc = load_document(bytes, max_pages).map_err(|e| match e {
            ProcessingError::DocumentFormat(msg) => {
                ProcessingError::DocumentFormat(format!("Input {}: {}", index + 1, msg))
            }
            other => other,
        })?;

        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        // get_pages is ordered by page number
        for page_id in doc.get_pages().into_values() {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| {
                    ProcessingError::DocumentFormat(format!(
                        "Input {}: broken page object: {}",
                        index + 1,
                        e
                    ))
                })?
                .clone();
            inherit_attributes(&doc, &mut page);
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            if matches!(type_name(&object), Some(b"Catalog" | b"Pages" | b"Page")) {
                continue;
            }
            objects.insert(id, object);
        }
    }

    if pages.len() > max_pages {
        return Err(ProcessingError::TooManyPages {
            pages: pages.len(),
            max: max_pages,
        });
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.max_id = next_id;
    let pages_id = merged.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, page) in pages {
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(page_id);
    }

    install_page_tree(&mut merged, pages_id, &kids);
    merged.compress();

    save_document(&mut merged)
}

fn inherit_attributes(doc: &Document, page: &mut Dictionary) {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        if depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
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
        depth += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pdf(num_pages: u32, label: &str, inherit_media_box: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let media_box = Object::Array(vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(300),
            Object::Integer(400),
        ]);

        let mut kids = Vec::new();
        for i in 0..num_pages {
            let content = format!("BT /F1 12 Tf 50 300 Td ({}-{}) Tj ET", label, i + 1);
            let content_id = doc.add_object(lopdf::Stream::new(
                Dictionary::new(),
                content.into_bytes(),
            ));
            let mut page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
            ]);
            if !inherit_media_box {
                page.set("MediaBox", media_box.clone());
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            ("Kids", Object::Array(kids)),
        ]);
        if inherit_media_box {
            pages.set("MediaBox", media_box);
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .into_values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).to_string())
            .collect()
    }

    #[test]
    fn test_merge_empty_fails() {
        assert!(matches!(
            merge_documents(&[], 10),
            Err(ProcessingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_merge_preserves_order() {
        let merged = merge_documents(
            &[create_test_pdf(3, "A", false), create_test_pdf(2, "B", false)],
            100,
        )
        .unwrap();

        let texts = page_texts(&merged);
        assert_eq!(texts.len(), 5);
        for (text, expected) in texts.iter().zip(["A-1", "A-2", "A-3", "B-1", "B-2"]) {
            assert!(text.contains(expected), "{} not in {}", expected, text);
        }
    }

    #[test]
    fn test_merge_flattens_inherited_media_box() {
        let merged = merge_documents(
            &[create_test_pdf(1, "A", true), create_test_pdf(1, "B", false)],
            100,
        )
        .unwrap();

        let doc = Document::load_mem(&merged).unwrap();
        for page_id in doc.get_pages().into_values() {
            let page = doc.get_dictionary(page_id).unwrap();
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn test_merge_rejects_invalid_input() {
        let err = merge_documents(&[create_test_pdf(1, "A", false), b"%PDF-junk".to_vec()], 100)
            .unwrap_err();
        assert!(err.to_string().contains("Input 2"));
    }

    #[test]
    fn test_merge_enforces_total_page_limit() {
        let err = merge_documents(
            &[create_test_pdf(3, "A", false), create_test_pdf(3, "B", false)],
            5,
        )
        .unwrap_err();
        assert!(matches!(err, ProcessingError::TooManyPages { pages: 6, max: 5 }));
    }
}
