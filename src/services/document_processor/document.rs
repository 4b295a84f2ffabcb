//! lopdf helpers shared by the document operations

use super::types::ProcessingError;
use lopdf::{Dictionary, Document, Object, ObjectId, SaveOptions};

/// Parses a PDF and enforces the page limit
pub(crate) fn load_document(bytes: &[u8], max_pages: usize) -> Result<Document, ProcessingError> {
    let doc = Document::load_mem(bytes)
        .map_err(|e| ProcessingError::DocumentFormat(format!("Failed to parse PDF: {}", e)))?;

    let pages = doc.get_pages().len();
    if pages == 0 {
        return Err(ProcessingError::DocumentFormat(
            "Document has no pages".into(),
        ));
    }
    if pages > max_pages {
        return Err(ProcessingError::TooManyPages {
            pages,
            max: max_pages,
        });
    }

    Ok(doc)
}

pub(crate) fn save_document(doc: &mut Document) -> Result<Vec<u8>, ProcessingError> {
    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| ProcessingError::DocumentFormat(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}

/// Saves with explicit writer options (object streams, xref streams)
pub(crate) fn save_document_with(
    doc: &mut Document,
    options: SaveOptions,
) -> Result<Vec<u8>, ProcessingError> {
    let mut buffer = Vec::new();
    doc.save_with_options(&mut buffer, options)
        .map_err(|e| ProcessingError::DocumentFormat(format!("Failed to save PDF: {}", e)))?;
    Ok(buffer)
}

/// Builds a page tree and catalog over `kids`, pointing every page at the new root
pub(crate) fn install_page_tree(doc: &mut Document, pages_id: ObjectId, kids: &[ObjectId]) {
    for kid in kids {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(kid) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        (
            "Kids",
            Object::Array(kids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));
}

/// `/Type` of a dictionary or stream object
pub(crate) fn type_name(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

/// File stem used to derive output names
pub(crate) fn output_stem(original_name: &str) -> String {
    let stem = std::path::Path::new(original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rejects_garbage() {
        let err = load_document(b"%PDF-1.4\nnot really", 10).unwrap_err();
        assert!(matches!(err, ProcessingError::DocumentFormat(_)));
    }

    #[test]
    fn test_output_stem() {
        assert_eq!(output_stem("report.final.pdf"), "report.final");
        assert_eq!(output_stem("scan"), "scan");
        assert_eq!(output_stem(""), "document");
    }
}
