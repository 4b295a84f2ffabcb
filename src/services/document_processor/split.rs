//! PDF split: one output document per page group

use super::document::{load_document, save_document};
use super::types::ProcessingError;
use crate::utils::page_range::{group_label, parse_page_groups};
use lopdf::Document;

/// Pages of one split output plus its 1-based label (`3` or `1-4`)
pub(crate) struct SplitPart {
    pub label: String,
    pub bytes: Vec<u8>,
}

pub(crate) fn split_document(
    bytes: &[u8],
    range_spec: &str,
    max_pages: usize,
) -> Result<Vec<SplitPart>, ProcessingError> {
    let doc = load_document(bytes, max_pages)?;
    let page_count = doc.get_pages().len();

    let groups = parse_page_groups(range_spec, page_count);
    if groups.is_empty() {
        return Err(ProcessingError::InvalidInput(format!(
            "Range '{}' selects no pages (document has {} pages)",
            range_spec, page_count
        )));
    }

    groups
        .iter()
        .map(|group| {
            Ok(SplitPart {
                label: group_label(group),
                bytes: extract_pages(&doc, group, page_count)?,
            })
        })
        .collect()
}

/// Copies `doc` keeping only the 0-based `pages`, in document order
fn extract_pages(
    doc: &Document,
    pages: &[usize],
    page_count: usize,
) -> Result<Vec<u8>, ProcessingError> {
    let mut part = doc.clone();

    // delete_pages takes 1-based page numbers
    let to_delete: Vec<u32> = (0..page_count)
        .filter(|page| pages.binary_search(page).is_err())
        .map(|page| page as u32 + 1)
        .collect();
    if !to_delete.is_empty() {
        part.delete_pages(&to_delete);
    }

    part.prune_objects();
    part.compress();

    save_document(&mut part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Dictionary, Object, Stream};

    fn create_test_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            format!("Page {}", i + 1).into_bytes(),
                            lopdf::StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page = Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
            ]);
            page_ids.push(doc.add_object(page));
        }

        let pages = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(num_pages as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ]);
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
    fn test_split_groups_in_token_order() {
        let parts = split_document(&create_test_pdf(5), "3,1-2,2", 100).unwrap();
        assert_eq!(parts.len(), 2);

        assert_eq!(parts[0].label, "3");
        let first = page_texts(&parts[0].bytes);
        assert_eq!(first.len(), 1);
        assert!(first[0].contains("Page 3"));

        assert_eq!(parts[1].label, "1-2");
        let second = page_texts(&parts[1].bytes);
        assert_eq!(second.len(), 2);
        assert!(second[0].contains("Page 1"));
        assert!(second[1].contains("Page 2"));
    }

    #[test]
    fn test_split_reversed_span_is_ascending() {
        let parts = split_document(&create_test_pdf(5), "4-2", 100).unwrap();
        let texts = page_texts(&parts[0].bytes);
        assert_eq!(texts.len(), 3);
        assert!(texts[0].contains("Page 2"));
        assert!(texts[2].contains("Page 4"));
    }

    #[test]
    fn test_split_whole_document() {
        let parts = split_document(&create_test_pdf(3), "1-3", 100).unwrap();
        assert_eq!(page_texts(&parts[0].bytes).len(), 3);
    }

    #[test]
    fn test_split_without_valid_pages_fails() {
        assert!(matches!(
            split_document(&create_test_pdf(3), "7-9, x", 100),
            Err(ProcessingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_split_enforces_page_limit() {
        assert!(matches!(
            split_document(&create_test_pdf(4), "1", 3),
            Err(ProcessingError::TooManyPages { pages: 4, max: 3 })
        ));
    }
}
