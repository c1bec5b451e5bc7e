//! Replays text operations onto a fresh copy of a base document
//!
//! The algorithm:
//! 1. Load a new document instance from the base bytes
//! 2. Validate every op (page in range, font resolvable) before touching it
//! 3. Register each distinct font once on the new instance
//! 4. For each touched page, wrap the existing content in `q … Q`, copy its
//!    resources onto the page and append one content stream with the text.
//!    Font names already on the page (from an earlier export) are never
//!    rebound; a suffixed name is used instead.
//! 5. Hand back the document for serialization or rasterization
//!
//! Any failure aborts the whole render; the partially built instance is
//! dropped and nothing is returned.

use crate::document::{
    inherited_attribute, load_document, owned_dictionary, page_ids, save_document, PageBox,
    SaveOptions,
};
use crate::error::{Result, StampError};
use crate::fonts::{resource_name, text_string, FontCatalog, ResolvedFont};
use crate::operations::{FontReference, PositionedTextOp};
use crate::raster::{PageRasterizer, RenderedPage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A document with all requested ops applied
#[derive(Debug)]
pub struct RenderedDocument {
    doc: Document,
}

impl RenderedDocument {
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Serialize the full vector document
    pub fn save(mut self, options: SaveOptions) -> Result<Vec<u8>> {
        save_document(&mut self.doc, options)
    }

    /// Rasterize a single page for display
    pub fn rasterize(
        self,
        page_index: usize,
        dpi: f32,
        rasterizer: &dyn PageRasterizer,
    ) -> Result<RenderedPage> {
        let page_count = self.page_count();
        if page_index >= page_count {
            return Err(StampError::PageIndex {
                index: page_index,
                page_count,
            });
        }
        let bytes = self.save(SaveOptions::PLAIN)?;
        rasterizer.rasterize(&bytes, page_index, dpi)
    }
}

/// A font resolved for this render, with the strings it has to show
struct FontUse {
    reference: FontReference,
    resolved: ResolvedFont,
    object_id: Option<ObjectId>,
}

pub struct RenderEngine<'a> {
    fonts: &'a FontCatalog,
}

impl<'a> RenderEngine<'a> {
    pub fn new(fonts: &'a FontCatalog) -> Self {
        Self { fonts }
    }

    /// Apply `ops` in order, then `extra_preview_op` on top, to a fresh copy
    /// of `base_bytes`
    pub fn apply(
        &self,
        base_bytes: &[u8],
        ops: &[PositionedTextOp],
        extra_preview_op: Option<&PositionedTextOp>,
    ) -> Result<RenderedDocument> {
        let mut doc = load_document(base_bytes)?;
        let pages = page_ids(&doc);
        let all_ops: Vec<&PositionedTextOp> = ops.iter().chain(extra_preview_op).collect();

        let mut font_uses: Vec<FontUse> = Vec::new();
        let mut font_slots: HashMap<&FontReference, usize> = HashMap::new();
        for op in &all_ops {
            op.validate()?;
            if op.page_index >= pages.len() {
                return Err(StampError::PageIndex {
                    index: op.page_index,
                    page_count: pages.len(),
                });
            }
            if !font_slots.contains_key(&op.font) {
                let resolved = self.fonts.resolve(&op.font)?;
                font_slots.insert(&op.font, font_uses.len());
                font_uses.push(FontUse {
                    reference: op.font.clone(),
                    resolved,
                    object_id: None,
                });
            }
        }

        for (slot, font_use) in font_uses.iter_mut().enumerate() {
            let texts: Vec<&str> = all_ops
                .iter()
                .filter(|op| font_slots.get(&op.font) == Some(&slot))
                .map(|op| op.text.as_str())
                .collect();
            font_use.object_id = Some(font_use.resolved.register(&mut doc, texts)?);
        }

        let mut by_page: BTreeMap<usize, Vec<&PositionedTextOp>> = BTreeMap::new();
        for op in &all_ops {
            by_page.entry(op.page_index).or_default().push(*op);
        }

        for (page_index, page_ops) in by_page {
            let page_id = pages[page_index];
            let page_box = PageBox::for_page(&doc, page_id);
            let mut taken = page_font_names(&doc, page_id);

            // font slot -> name on this page, in first-use order
            let mut names: Vec<(usize, String)> = Vec::new();
            let mut operations = Vec::new();
            for op in page_ops {
                let slot = font_slots[&op.font];
                let name = match names.iter().find(|(s, _)| *s == slot) {
                    Some((_, name)) => name.clone(),
                    None => {
                        let name = free_resource_name(&font_uses[slot].reference, &taken);
                        taken.insert(name.as_bytes().to_vec());
                        names.push((slot, name.clone()));
                        name
                    }
                };
                text_operations(op, &font_uses[slot], &name, page_box, &mut operations)?;
                tracing::debug!(
                    page_index,
                    lines = op.line_layout().len(),
                    font = op.font.display_name(),
                    resource = name.as_str(),
                    "Placed text"
                );
            }

            let fonts: Vec<(String, ObjectId)> = names
                .into_iter()
                .filter_map(|(slot, name)| font_uses[slot].object_id.map(|id| (name, id)))
                .collect();
            let content = Content { operations }
                .encode()
                .map_err(|e| StampError::Operation(e.to_string()))?;
            install_page_content(&mut doc, page_id, &fonts, content)?;
        }

        tracing::info!(
            committed = ops.len(),
            preview = extra_preview_op.is_some(),
            pages = pages.len(),
            "Rendered annotation history"
        );
        Ok(RenderedDocument { doc })
    }
}

fn real(value: f64) -> Object {
    Object::Real(value as f32)
}

/// Font resource names already present on a page
fn page_font_names(doc: &Document, page_id: ObjectId) -> BTreeSet<Vec<u8>> {
    let resources = owned_dictionary(doc, inherited_attribute(doc, page_id, b"Resources"));
    owned_dictionary(doc, resources.get(b"Font").ok().cloned())
        .iter()
        .map(|(name, _)| name.clone())
        .collect()
}

/// The reference's resource name, suffixed `_1`, `_2`, ... when the page
/// already uses it (e.g. a previously annotated export)
fn free_resource_name(reference: &FontReference, taken: &BTreeSet<Vec<u8>>) -> String {
    let base = resource_name(reference);
    if !taken.contains(base.as_bytes()) {
        return base;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{}_{}", base, n);
        if !taken.contains(candidate.as_bytes()) {
            return candidate;
        }
        n += 1;
    }
}

/// Content operators drawing one op, line by line
fn text_operations(
    op: &PositionedTextOp,
    font_use: &FontUse,
    font_name: &str,
    page_box: PageBox,
    operations: &mut Vec<Operation>,
) -> Result<()> {
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new(
        "rg",
        vec![
            real(op.color.r as f64),
            real(op.color.g as f64),
            real(op.color.b as f64),
        ],
    ));
    operations.push(Operation::new("BT", vec![]));
    operations.push(Operation::new(
        "Tf",
        vec![Object::Name(font_name.as_bytes().to_vec()), real(op.font_size)],
    ));

    for (y, line) in op.line_layout() {
        if line.is_empty() {
            continue;
        }
        let (pdf_x, pdf_y) = page_box.to_user_space(op.origin.x, y);
        operations.push(Operation::new(
            "Tm",
            vec![
                1.into(),
                0.into(),
                0.into(),
                1.into(),
                real(pdf_x),
                real(pdf_y),
            ],
        ));
        let encoded = font_use.resolved.encode(line)?;
        operations.push(Operation::new(
            "Tj",
            vec![text_string(encoded, &font_use.resolved)],
        ));
    }

    operations.push(Operation::new("ET", vec![]));
    operations.push(Operation::new("Q", vec![]));
    Ok(())
}

/// Attach `content` to the page, isolating the existing content in a saved
/// graphics state and registering `fonts` in page-local resources
fn install_page_content(
    doc: &mut Document,
    page_id: ObjectId,
    fonts: &[(String, ObjectId)],
    content: Vec<u8>,
) -> Result<()> {
    // resources may be shared with other pages; work on a page-local copy
    let mut resources = owned_dictionary(doc, inherited_attribute(doc, page_id, b"Resources"));
    let mut font_dict = owned_dictionary(doc, resources.get(b"Font").ok().cloned());
    for (name, id) in fonts {
        font_dict.set(name.as_bytes().to_vec(), Object::Reference(*id));
    }
    resources.set("Font", Object::Dictionary(font_dict));

    let existing: Vec<Object> = match doc
        .get_dictionary(page_id)
        .map_err(|e| StampError::Operation(e.to_string()))?
        .get(b"Contents")
    {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let text_id = doc.add_object(Stream::new(Dictionary::new(), content));
    let contents = if existing.is_empty() {
        vec![Object::Reference(text_id)]
    } else {
        let save_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        let restore_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
        let mut contents = Vec::with_capacity(existing.len() + 3);
        contents.push(Object::Reference(save_id));
        contents.extend(existing);
        contents.push(Object::Reference(restore_id));
        contents.push(Object::Reference(text_id));
        contents
    };

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|e| StampError::Operation(e.to_string()))?;
    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    Ok(())
}
