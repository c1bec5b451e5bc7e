//! Page-set operations: selection parsing, keep/drop and merge
//!
//! Like rendering, every operation reads immutable input bytes and produces
//! a new document; inputs are never modified.

use crate::document::{
    load_document, materialize_inherited, page_ids, save_document, SaveOptions, INHERITABLE_KEYS,
};
use crate::error::{Result, StampError};
use crate::export::{ExportArtifact, ExportKind};
use lopdf::{Document, Object, ObjectId};
use std::num::IntErrorKind;
use std::collections::{BTreeSet, HashSet};

/// ASCII comma and the full-width comma are both separators
const SEPARATORS: [char; 2] = [',', '\u{FF0C}'];

/// A page number too large for `usize` is past any document, not malformed
fn parse_number(part: &str, token: &str) -> Result<usize> {
    match part.trim().parse::<usize>() {
        Ok(n) => Ok(n),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(usize::MAX),
        Err(_) => Err(StampError::MalformedSelection(format!(
            "'{}' is not a page number",
            token
        ))),
    }
}

/// Parse a selection such as `"1, 3-5"` into sorted, deduplicated 0-based
/// page indices
///
/// Range bounds are clamped into `1..=page_count`; a range that is empty after
/// clamping contributes nothing. A single page number outside the document
/// is ignored. Any malformed token fails the whole parse.
pub fn try_parse_selection(selection: &str, page_count: usize) -> Result<Vec<usize>> {
    let mut pages = BTreeSet::new();

    for token in selection.split(SEPARATORS).map(str::trim) {
        if token.is_empty() {
            continue;
        }

        if token.contains('-') {
            let parts: Vec<&str> = token.split('-').collect();
            let [start, end] = parts.as_slice() else {
                return Err(StampError::MalformedSelection(format!(
                    "'{}' is not a range",
                    token
                )));
            };
            let start = parse_number(start, token)?.max(1);
            let end = parse_number(end, token)?.min(page_count);
            pages.extend(start..=end);
        } else {
            let page = parse_number(token, token)?;
            if (1..=page_count).contains(&page) {
                pages.insert(page);
            }
        }
    }

    Ok(pages.into_iter().map(|page| page - 1).collect())
}

/// [`try_parse_selection`], treating malformed input as "nothing selected"
pub fn parse_selection(selection: &str, page_count: usize) -> Vec<usize> {
    match try_parse_selection(selection, page_count) {
        Ok(pages) => pages,
        Err(e) => {
            tracing::warn!(selection, "Ignoring selection: {}", e);
            Vec::new()
        }
    }
}

/// 1-based page numbers for display
pub fn human_readable(indices: &[usize]) -> Vec<usize> {
    indices.iter().map(|i| i + 1).collect()
}

/// Keep only the pages in `indices`
pub fn select_keep(
    bytes: &[u8],
    indices: &[usize],
    options: SaveOptions,
) -> Result<ExportArtifact> {
    if indices.is_empty() {
        return Err(StampError::EmptyResult("No pages selected".into()));
    }
    let doc = load_document(bytes)?;
    let page_count = doc.get_pages().len();
    let keep: HashSet<usize> = indices.iter().copied().collect();
    if let Some(&index) = indices.iter().find(|&&i| i >= page_count) {
        return Err(StampError::PageIndex { index, page_count });
    }

    let artifact = retain_pages(doc, page_count, |i| keep.contains(&i), options)?;
    tracing::info!(remaining = artifact.page_count(), "Kept selected pages");
    Ok(artifact)
}

/// Remove the pages in `indices`. Refuses when no page would remain.
pub fn select_drop(
    bytes: &[u8],
    indices: &[usize],
    options: SaveOptions,
) -> Result<ExportArtifact> {
    let doc = load_document(bytes)?;
    let page_count = doc.get_pages().len();
    let drop: HashSet<usize> = indices.iter().copied().collect();
    if (0..page_count).all(|i| drop.contains(&i)) {
        return Err(StampError::EmptyResult("Cannot delete every page".into()));
    }

    let artifact = retain_pages(doc, page_count, |i| !drop.contains(&i), options)?;
    tracing::info!(remaining = artifact.page_count(), "Deleted selected pages");
    Ok(artifact)
}

fn retain_pages(
    mut doc: Document,
    page_count: usize,
    keep: impl Fn(usize) -> bool,
    options: SaveOptions,
) -> Result<ExportArtifact> {
    let to_delete: Vec<u32> = (0..page_count)
        .filter(|&i| !keep(i))
        .map(|i| i as u32 + 1)
        .collect();
    doc.delete_pages(&to_delete);

    let remaining = doc.get_pages().len();
    let bytes = save_document(&mut doc, options)?;
    Ok(ExportArtifact::new(ExportKind::PageSubset, bytes, remaining))
}

/// Concatenate the pages of `documents`, in input order
///
/// Each source's objects are imported with their ids shifted past the
/// destination's highest id, then every page is hung directly under the
/// destination's root Pages node. Pages carry their own inherited
/// attributes by then, so the root's are removed and cannot leak onto
/// imported pages.
pub fn merge_documents(documents: &[Vec<u8>], options: SaveOptions) -> Result<ExportArtifact> {
    if documents.len() < 2 {
        return Err(StampError::EmptyResult(format!(
            "Merging needs at least 2 documents, got {}",
            documents.len()
        )));
    }

    let mut loaded = Vec::with_capacity(documents.len());
    for (i, bytes) in documents.iter().enumerate() {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| StampError::Parse(format!("Failed to load document {}: {}", i, e)))?;
        for page_id in page_ids(&doc) {
            materialize_inherited(&mut doc, page_id)?;
        }
        loaded.push(doc);
    }

    let mut sources = loaded.into_iter();
    let Some(mut dest) = sources.next() else {
        return Err(StampError::EmptyResult("No documents to merge".into()));
    };
    let mut dest_pages = page_ids(&dest);

    for source in sources {
        let source_pages = page_ids(&source);
        let offset = dest.max_id;

        for (id, object) in source.objects {
            dest.objects
                .insert((id.0 + offset, id.1), remap_references(object, offset));
        }
        dest_pages.extend(source_pages.into_iter().map(|id| (id.0 + offset, id.1)));
        dest.max_id = dest.max_id.max(source.max_id + offset);
    }

    rebuild_page_tree(&mut dest, &dest_pages)?;

    let bytes = save_document(&mut dest, options)?;
    tracing::info!(
        inputs = documents.len(),
        pages = dest_pages.len(),
        "Merged documents"
    );
    Ok(ExportArtifact::new(ExportKind::Merged, bytes, dest_pages.len()))
}

/// Shift every indirect reference inside `obj` by `offset`
fn remap_references(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(items) => Object::Array(
            items
                .into_iter()
                .map(|o| remap_references(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_references(std::mem::replace(value, Object::Null), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_references(std::mem::replace(value, Object::Null), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

fn root_pages_id(doc: &Document) -> Result<ObjectId> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| StampError::Operation("No Root in trailer".into()))?;
    doc.get_dictionary(catalog_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| StampError::Operation("No Pages in catalog".into()))
}

/// Make `pages` the flat, ordered kids of the root Pages node, which no
/// longer supplies inherited attributes
fn rebuild_page_tree(doc: &mut Document, pages: &[ObjectId]) -> Result<()> {
    let pages_id = root_pages_id(doc)?;

    for &page_id in pages {
        doc.get_dictionary_mut(page_id)
            .map_err(|e| StampError::Operation(format!("Page {:?}: {}", page_id, e)))?
            .set("Parent", Object::Reference(pages_id));
    }

    let pages_dict = doc
        .get_dictionary_mut(pages_id)
        .map_err(|_| StampError::Operation("Invalid pages dictionary".into()))?;
    pages_dict.set(
        "Kids",
        Object::Array(pages.iter().map(|&id| Object::Reference(id)).collect()),
    );
    pages_dict.set("Count", Object::Integer(pages.len() as i64));
    for key in INHERITABLE_KEYS {
        pages_dict.remove(key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::test_support::{create_test_pdf, page_texts};
    use crate::document::{get_page_count, inherited_attribute, page_dimensions};

    #[test]
    fn test_parse_single_and_range() {
        assert_eq!(try_parse_selection("1, 3-5", 10).unwrap(), vec![0, 2, 3, 4]);
    }

    #[test]
    fn test_parse_deduplicates_and_sorts() {
        assert_eq!(parse_selection("1,1,2", 5), vec![0, 1]);
        assert_eq!(parse_selection("4, 2-3, 1", 5), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_parse_full_width_comma() {
        assert_eq!(parse_selection("1\u{FF0C}3", 5), vec![0, 2]);
    }

    #[test]
    fn test_parse_clamps_range_bounds() {
        assert_eq!(parse_selection("0-2", 5), vec![0, 1]);
        assert_eq!(parse_selection("4-99", 5), vec![3, 4]);
        assert_eq!(parse_selection("1, 3-5", 2), vec![0]);
    }

    #[test]
    fn test_parse_reversed_range_is_empty() {
        assert_eq!(parse_selection("5-3", 10), Vec::<usize>::new());
        assert_eq!(parse_selection("5-3, 1", 10), vec![0]);
    }

    #[test]
    fn test_parse_single_out_of_range_is_ignored() {
        assert_eq!(parse_selection("0, 2, 9", 5), vec![1]);
    }

    #[test]
    fn test_parse_malformed_is_empty() {
        assert!(matches!(
            try_parse_selection("abc", 5),
            Err(StampError::MalformedSelection(_))
        ));
        assert!(parse_selection("abc", 5).is_empty());
        assert!(parse_selection("1, x", 5).is_empty());
        assert!(parse_selection("1-2-3", 5).is_empty());
        assert!(parse_selection("-3", 5).is_empty());
        assert!(parse_selection("2-", 5).is_empty());
    }

    #[test]
    fn test_parse_overflowing_number_is_out_of_range() {
        assert_eq!(
            try_parse_selection("1, 99999999999999999999", 5).unwrap(),
            vec![0]
        );
        assert_eq!(parse_selection("4-99999999999999999999", 5), vec![3, 4]);
        assert!(parse_selection("99999999999999999999-2", 5).is_empty());
    }

    #[test]
    fn test_parse_blank_tokens_skipped() {
        assert_eq!(parse_selection(" , 2 ,, ", 5), vec![1]);
        assert!(parse_selection("", 5).is_empty());
    }

    #[test]
    fn test_human_readable() {
        assert_eq!(human_readable(&[0, 2, 3]), vec![1, 3, 4]);
    }

    #[test]
    fn test_select_keep() {
        let pdf = create_test_pdf(5, "Doc");
        let result = select_keep(&pdf, &[1, 3], SaveOptions::COMPACT).unwrap();
        assert_eq!(result.kind(), ExportKind::PageSubset);
        assert_eq!(result.page_count(), 2);
        assert_eq!(
            page_texts(result.bytes()),
            vec!["Doc Page 2".to_string(), "Doc Page 4".to_string()]
        );
    }

    #[test]
    fn test_select_keep_empty_selection() {
        let pdf = create_test_pdf(2, "Doc");
        assert!(matches!(
            select_keep(&pdf, &[], SaveOptions::PLAIN),
            Err(StampError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_select_keep_out_of_range() {
        let pdf = create_test_pdf(2, "Doc");
        assert!(matches!(
            select_keep(&pdf, &[0, 2], SaveOptions::PLAIN),
            Err(StampError::PageIndex {
                index: 2,
                page_count: 2
            })
        ));
    }

    #[test]
    fn test_select_drop() {
        let pdf = create_test_pdf(4, "Doc");
        let result = select_drop(&pdf, &[0, 2], SaveOptions::PLAIN).unwrap();
        assert_eq!(result.page_count(), 2);
        assert_eq!(
            page_texts(result.bytes()),
            vec!["Doc Page 2".to_string(), "Doc Page 4".to_string()]
        );
        // Input untouched
        assert_eq!(get_page_count(&pdf).unwrap(), 4);
    }

    #[test]
    fn test_select_drop_all_refused() {
        let pdf = create_test_pdf(3, "Doc");
        assert!(matches!(
            select_drop(&pdf, &[0, 1, 2], SaveOptions::PLAIN),
            Err(StampError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_select_drop_ignores_unknown_indices() {
        let pdf = create_test_pdf(2, "Doc");
        let result = select_drop(&pdf, &[1, 7], SaveOptions::PLAIN).unwrap();
        assert_eq!(result.page_count(), 1);
    }

    #[test]
    fn test_merge_preserves_order() {
        let a = create_test_pdf(2, "A");
        let b = create_test_pdf(1, "B");
        let c = create_test_pdf(2, "C");
        let merged = merge_documents(&[a, b, c], SaveOptions::PLAIN).unwrap();

        assert_eq!(merged.kind(), ExportKind::Merged);
        assert_eq!(merged.page_count(), 5);
        assert_eq!(
            page_texts(merged.bytes()),
            vec!["A Page 1", "A Page 2", "B Page 1", "C Page 1", "C Page 2"]
        );
    }

    #[test]
    fn test_merge_keeps_inherited_geometry() {
        let merged = merge_documents(
            &[create_test_pdf(1, "A"), create_test_pdf(1, "B")],
            SaveOptions::COMPACT,
        )
        .unwrap();
        assert_eq!(page_dimensions(merged.bytes(), 1).unwrap(), (612.0, 792.0));
    }

    #[test]
    fn test_merge_does_not_leak_destination_root_attributes() {
        let mut first = Document::load_mem(&create_test_pdf(1, "A")).unwrap();
        let root_id = root_pages_id(&first).unwrap();
        first
            .get_dictionary_mut(root_id)
            .unwrap()
            .set("Rotate", Object::Integer(90));
        let mut first_bytes = Vec::new();
        first.save_to(&mut first_bytes).unwrap();

        let merged = merge_documents(
            &[first_bytes, create_test_pdf(1, "B")],
            SaveOptions::PLAIN,
        )
        .unwrap();
        let doc = Document::load_mem(merged.bytes()).unwrap();
        let pages = page_ids(&doc);
        let rotate = |page_id| {
            inherited_attribute(&doc, page_id, b"Rotate").map(|r| r.as_i64().unwrap())
        };

        assert_eq!(rotate(pages[0]), Some(90));
        assert_eq!(rotate(pages[1]), None);
        let root = doc.get_dictionary(root_pages_id(&doc).unwrap()).unwrap();
        for key in INHERITABLE_KEYS {
            assert!(!root.has(key));
        }
        for &page_id in &pages {
            assert!(inherited_attribute(&doc, page_id, b"MediaBox").is_some());
            assert!(inherited_attribute(&doc, page_id, b"Resources").is_some());
        }
    }

    #[test]
    fn test_merge_needs_two_documents() {
        assert!(matches!(
            merge_documents(&[], SaveOptions::PLAIN),
            Err(StampError::EmptyResult(_))
        ));
        assert!(matches!(
            merge_documents(&[create_test_pdf(1, "A")], SaveOptions::PLAIN),
            Err(StampError::EmptyResult(_))
        ));
    }

    #[test]
    fn test_merge_rejects_garbage() {
        let result = merge_documents(
            &[create_test_pdf(1, "A"), b"junk".to_vec()],
            SaveOptions::PLAIN,
        );
        assert!(matches!(result, Err(StampError::Parse(_))));
    }

    #[test]
    fn test_remap_references() {
        let obj = Object::Array(vec![Object::Reference((3, 0)), Object::Integer(3)]);
        let remapped = remap_references(obj, 10);
        let items = remapped.as_array().unwrap();
        assert_eq!(items[0].as_reference().unwrap(), (13, 0));
        assert_eq!(items[1].as_i64().unwrap(), 3);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: parsing never panics, and any result is sorted,
        /// deduplicated and in range
        #[test]
        fn selection_is_sorted_unique_in_range(
            selection in "[0-9, \\-\u{FF0C}a]{0,20}",
            page_count in 0usize..30,
        ) {
            let pages = parse_selection(&selection, page_count);
            prop_assert!(pages.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(pages.iter().all(|&p| p < page_count));
        }

        /// Property: a well-formed range selects exactly its clamped span
        #[test]
        fn range_selects_clamped_span(
            start in 0usize..40,
            end in 0usize..40,
            page_count in 1usize..30,
        ) {
            let pages = parse_selection(&format!("{}-{}", start, end), page_count);
            let expected: Vec<usize> =
                (start.max(1)..=end.min(page_count)).map(|p| p - 1).collect();
            prop_assert_eq!(pages, expected);
        }
    }
}
