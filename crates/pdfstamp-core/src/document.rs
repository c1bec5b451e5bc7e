//! Loading, saving and page-tree helpers shared by rendering and page-set
//! operations

use crate::error::{Result, StampError};
use lopdf::{Dictionary, Document, Object, ObjectId};

/// Page attributes a page may inherit from its ancestors in the page tree
pub(crate) const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

const MAX_TREE_DEPTH: usize = 32;

/// Serialization settings for exports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Drop unreferenced objects and compress streams. Never changes what a
    /// page looks like.
    pub compact: bool,
}

impl SaveOptions {
    pub const PLAIN: SaveOptions = SaveOptions { compact: false };
    pub const COMPACT: SaveOptions = SaveOptions { compact: true };
}

pub(crate) fn load_document(bytes: &[u8]) -> Result<Document> {
    Document::load_mem(bytes).map_err(|e| StampError::Parse(e.to_string()))
}

pub(crate) fn save_document(doc: &mut Document, options: SaveOptions) -> Result<Vec<u8>> {
    if options.compact {
        doc.prune_objects();
        doc.compress();
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| StampError::Operation(format!("Save failed: {}", e)))?;
    Ok(buffer)
}

/// Parse PDF bytes and return the page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize> {
    Ok(load_document(bytes)?.get_pages().len())
}

/// Page object ids in page order
pub(crate) fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Follow one level of indirection
pub(crate) fn deref<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        other => other,
    }
}

/// Look up `key` on the page or, failing that, on its ancestors
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(value.clone());
        }
        let parent = current.get(b"Parent").and_then(Object::as_reference).ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

/// Copy inherited attributes onto the page itself so it no longer depends
/// on its ancestors
pub(crate) fn materialize_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let mut inherited = Vec::new();
    {
        let page = doc
            .get_dictionary(page_id)
            .map_err(|e| StampError::Operation(e.to_string()))?;
        for key in INHERITABLE_KEYS {
            if !page.has(key) {
                if let Some(value) = inherited_attribute(doc, page_id, key) {
                    inherited.push((key.to_vec(), value));
                }
            }
        }
    }

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| StampError::Operation(e.to_string()))?;
    for (key, value) in inherited {
        page.set(key, value);
    }
    Ok(())
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

/// Visible page area in PDF user space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBox {
    pub left: f64,
    pub bottom: f64,
    pub width: f64,
    pub height: f64,
}

impl PageBox {
    /// US Letter, used when a page declares no usable box
    pub const LETTER: PageBox = PageBox {
        left: 0.0,
        bottom: 0.0,
        width: 612.0,
        height: 792.0,
    };

    pub fn top(&self) -> f64 {
        self.bottom + self.height
    }

    /// Convert a top-left, y-down page point to PDF user space
    pub fn to_user_space(&self, x: f64, y: f64) -> (f64, f64) {
        (self.left + x, self.top() - y)
    }

    fn from_array(doc: &Document, obj: &Object) -> Option<PageBox> {
        let values: Vec<f64> = deref(doc, obj)
            .as_array()
            .ok()?
            .iter()
            .filter_map(|o| number(deref(doc, o)))
            .collect();
        if values.len() != 4 {
            return None;
        }
        let (x0, x1) = (values[0].min(values[2]), values[0].max(values[2]));
        let (y0, y1) = (values[1].min(values[3]), values[1].max(values[3]));
        Some(PageBox {
            left: x0,
            bottom: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }

    /// CropBox when present, otherwise MediaBox, both possibly inherited
    pub(crate) fn for_page(doc: &Document, page_id: ObjectId) -> PageBox {
        [b"CropBox".as_slice(), b"MediaBox".as_slice()]
            .iter()
            .filter_map(|key| inherited_attribute(doc, page_id, key))
            .find_map(|obj| PageBox::from_array(doc, &obj))
            .unwrap_or(PageBox::LETTER)
    }
}

fn nth_page(doc: &Document, page_index: usize) -> Result<ObjectId> {
    let pages = page_ids(doc);
    pages.get(page_index).copied().ok_or(StampError::PageIndex {
        index: page_index,
        page_count: pages.len(),
    })
}

/// The unrotated visible box of a page; text origins are measured in it
pub fn page_box(bytes: &[u8], page_index: usize) -> Result<PageBox> {
    let doc = load_document(bytes)?;
    let page_id = nth_page(&doc, page_index)?;
    Ok(PageBox::for_page(&doc, page_id))
}

/// Width and height of the visible box of a page, in points, as displayed
/// (swapped for pages rotated a quarter turn)
pub fn page_dimensions(bytes: &[u8], page_index: usize) -> Result<(f64, f64)> {
    let doc = load_document(bytes)?;
    let page_id = nth_page(&doc, page_index)?;
    let page_box = PageBox::for_page(&doc, page_id);
    let rotate = inherited_attribute(&doc, page_id, b"Rotate")
        .and_then(|r| r.as_i64().ok())
        .unwrap_or(0);
    if rotate.rem_euclid(180) == 90 {
        Ok((page_box.height, page_box.width))
    } else {
        Ok((page_box.width, page_box.height))
    }
}

/// Resolve a dictionary entry that may be inline or referenced, returning an
/// owned copy
pub(crate) fn owned_dictionary(doc: &Document, obj: Option<Object>) -> Dictionary {
    match obj {
        Some(Object::Dictionary(dict)) => dict,
        Some(Object::Reference(id)) => doc.get_dictionary(id).cloned().unwrap_or_default(),
        _ => Dictionary::new(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use lopdf::content::{Content, Operation};
    use crate::fonts::{FontCatalog, FontSource};
    use lopdf::{dictionary, Dictionary, Document, Object, Stream};
    use std::sync::Arc;

    /// Minimal TrueType font: 'A'-'Z' are glyphs 1-26, 'a'-'z' are 27-52 and
    /// U+4E2D is glyph 53
    pub const TEST_FONT: &[u8] = include_bytes!("../tests/fixtures/stamp-test.ttf");

    /// Catalog holding [`TEST_FONT`] as "StampTest"
    pub fn test_font_catalog() -> FontCatalog {
        let mut catalog = FontCatalog::new();
        catalog.insert("StampTest", FontSource::Memory(Arc::new(TEST_FONT.to_vec())));
        catalog
    }

    /// A PDF with `num_pages` Letter pages, each showing "<prefix> Page N"
    /// through a shared Helvetica resource dictionary
    pub fn create_test_pdf(num_pages: u32, prefix: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut page_ids = Vec::new();
        for i in 0..num_pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![100.into(), 700.into()]),
                    Operation::new(
                        "Tj",
                        vec![Object::string_literal(format!("{} Page {}", prefix, i + 1))],
                    ),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            page_ids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => page_ids,
                "Count" => num_pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Text shown on each page, in page order
    pub fn page_texts(bytes: &[u8]) -> Vec<String> {
        let doc = Document::load_mem(bytes).unwrap();
        doc.get_pages()
            .into_values()
            .map(|page_id| {
                let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
                content
                    .operations
                    .iter()
                    .filter(|op| op.operator == "Tj")
                    .filter_map(|op| op.operands.first())
                    .filter_map(|o| o.as_str().ok())
                    .map(|s| String::from_utf8_lossy(s).into_owned())
                    .collect::<Vec<_>>()
                    .join("|")
            })
            .collect()
    }
}
