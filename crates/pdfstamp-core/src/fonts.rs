//! Font provisioning and font resource construction
//!
//! The [`FontCatalog`] maps human-readable font names to font files. Resolving
//! a [`FontReference`] either yields a standard font (always available) or an
//! [`EmbeddedFont`] loaded from the catalog. Every render registers its fonts
//! on its own fresh document instance; nothing is shared between instances.

use crate::error::{Result, StampError};
use crate::operations::{FontReference, StandardFont};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Font table of the desktop tool: display name and path under `fonts/`
pub const DEFAULT_FONT_TABLE: [(&str, &str); 4] = [
    ("默认黑体", "fonts/simhei.ttf"),
    ("标准楷体", "fonts/simkai.ttf"),
    ("标准宋体", "fonts/simsun.ttc"),
    ("Times New Roman", "fonts/times.ttf"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum FontSource {
    File(PathBuf),
    Memory(Arc<Vec<u8>>),
}

impl FontSource {
    fn is_available(&self) -> bool {
        match self {
            FontSource::File(path) => path.is_file(),
            FontSource::Memory(data) => !data.is_empty(),
        }
    }

    fn load(&self) -> std::result::Result<Arc<Vec<u8>>, String> {
        match self {
            FontSource::File(path) => std::fs::read(path)
                .map(Arc::new)
                .map_err(|e| format!("{}: {}", path.display(), e)),
            FontSource::Memory(data) => Ok(Arc::clone(data)),
        }
    }
}

/// Name → font file mapping supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct FontCatalog {
    entries: BTreeMap<String, FontSource>,
}

impl FontCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The default font table, with paths relative to `root`
    pub fn with_defaults(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let mut catalog = Self::new();
        for (name, path) in DEFAULT_FONT_TABLE {
            catalog.insert(name, FontSource::File(root.join(path)));
        }
        catalog
    }

    pub fn insert(&mut self, name: impl Into<String>, source: FontSource) {
        self.entries.insert(name.into(), source);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn source(&self, name: &str) -> Option<&FontSource> {
        self.entries.get(name)
    }

    /// Names whose font data can actually be found
    pub fn available(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, source)| source.is_available())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// First available named font, or Helvetica when nothing is installed
    pub fn default_reference(&self) -> FontReference {
        self.available()
            .first()
            .map(|name| FontReference::named(*name))
            .unwrap_or_default()
    }

    /// Resolve a reference to a usable font. Unknown or unreadable named fonts
    /// are an error; there is no silent fallback.
    pub fn resolve(&self, reference: &FontReference) -> Result<ResolvedFont> {
        match reference {
            FontReference::Builtin(font) => Ok(ResolvedFont::Standard(*font)),
            FontReference::Named(name) => {
                let source = self
                    .entries
                    .get(name)
                    .ok_or_else(|| StampError::FontResolution {
                        name: name.clone(),
                        reason: "not in font catalog".to_string(),
                    })?;
                let data = source.load().map_err(|reason| StampError::FontResolution {
                    name: name.clone(),
                    reason,
                })?;
                let font = EmbeddedFont::from_data(name, data)?;
                Ok(ResolvedFont::Embedded(Arc::new(font)))
            }
        }
    }
}

/// A TrueType/OpenType font loaded for embedding
#[derive(Debug)]
pub struct EmbeddedFont {
    name: String,
    postscript_name: String,
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    cap_height: i16,
    bbox: [i16; 4],
}

impl EmbeddedFont {
    /// Parse font data. Collections (.ttc) use their first face.
    pub fn from_data(name: &str, data: Arc<Vec<u8>>) -> Result<Self> {
        let face_index = 0;
        let face = ttf_parser::Face::parse(&data, face_index).map_err(|e| {
            StampError::FontResolution {
                name: name.to_string(),
                reason: format!("unparseable font data: {}", e),
            }
        })?;

        let postscript_name = face
            .names()
            .into_iter()
            .filter(|n| n.name_id == ttf_parser::name_id::POST_SCRIPT_NAME)
            .find_map(|n| n.to_string())
            .map(|n| sanitize_pdf_name(&n))
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "EmbeddedFont".to_string());

        let bbox = face.global_bounding_box();
        let ascender = face.ascender();
        Ok(Self {
            name: name.to_string(),
            postscript_name,
            units_per_em: face.units_per_em().max(1),
            ascender,
            descender: face.descender(),
            cap_height: face.capital_height().unwrap_or(ascender),
            bbox: [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max],
            face_index,
            data,
        })
    }

    pub fn postscript_name(&self) -> &str {
        &self.postscript_name
    }

    fn face(&self) -> Result<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, self.face_index).map_err(|e| {
            StampError::FontResolution {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    fn to_pdf_units(&self, value: i32) -> i64 {
        (value as i64 * 1000) / self.units_per_em as i64
    }

    /// Map text to glyph ids. Characters without a glyph map to .notdef.
    pub fn glyph_ids(&self, text: &str) -> Result<Vec<(char, u16)>> {
        let face = self.face()?;
        let mut missing = 0usize;
        let glyphs: Vec<(char, u16)> = text
            .chars()
            .map(|ch| {
                let gid = face.glyph_index(ch).map(|g| g.0).unwrap_or_else(|| {
                    missing += 1;
                    0
                });
                (ch, gid)
            })
            .collect();
        if missing > 0 {
            tracing::warn!(
                "Font '{}' has no glyph for {} character(s) in {:?}",
                self.name,
                missing,
                text
            );
        }
        Ok(glyphs)
    }

    /// Text encoded as 2-byte glyph ids for Identity-H
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        Ok(self
            .glyph_ids(text)?
            .into_iter()
            .flat_map(|(_, gid)| gid.to_be_bytes())
            .collect())
    }

    fn widths_array(&self, used: &BTreeMap<u16, char>) -> Result<Vec<Object>> {
        let face = self.face()?;
        let mut array = Vec::with_capacity(used.len() * 2);
        for &gid in used.keys() {
            let advance = face
                .glyph_hor_advance(ttf_parser::GlyphId(gid))
                .unwrap_or(self.units_per_em / 2);
            array.push(Object::Integer(gid as i64));
            array.push(Object::Array(vec![Object::Integer(
                self.to_pdf_units(advance as i32),
            )]));
        }
        Ok(array)
    }

    /// Add the Type0 font and its descendants to `doc`, covering the glyphs
    /// in `used`. Returns the id of the Type0 font dictionary.
    fn register(&self, doc: &mut Document, used: &BTreeMap<u16, char>) -> Result<ObjectId> {
        let font_file = Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.as_ref().clone(),
        );
        let font_file_id = doc.add_object(font_file);

        let bbox: Vec<Object> = self
            .bbox
            .iter()
            .map(|v| Object::Integer(self.to_pdf_units(*v as i32)))
            .collect();
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.postscript_name.as_bytes().to_vec()),
            "Flags" => 4,
            "FontBBox" => bbox,
            "ItalicAngle" => 0,
            "Ascent" => self.to_pdf_units(self.ascender as i32),
            "Descent" => self.to_pdf_units(self.descender as i32),
            "CapHeight" => self.to_pdf_units(self.cap_height as i32),
            "StemV" => 80,
            "FontFile2" => font_file_id,
        });

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => Object::Name(self.postscript_name.as_bytes().to_vec()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => self.widths_array(used)?,
            "CIDToGIDMap" => "Identity",
        });

        let to_unicode_id = doc.add_object(Stream::new(
            Dictionary::new(),
            to_unicode_cmap(used).into_bytes(),
        ));

        Ok(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.postscript_name.as_bytes().to_vec()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }))
    }
}

/// A font reference after resolution
#[derive(Debug, Clone)]
pub enum ResolvedFont {
    Standard(StandardFont),
    Embedded(Arc<EmbeddedFont>),
}

impl ResolvedFont {
    /// Bytes for a text-showing operator
    pub fn encode(&self, text: &str) -> Result<Vec<u8>> {
        match self {
            ResolvedFont::Standard(_) => Ok(encode_win_ansi(text)),
            ResolvedFont::Embedded(font) => font.encode(text),
        }
    }

    /// Register the font on `doc` for every string in `texts`
    pub(crate) fn register<'a>(
        &self,
        doc: &mut Document,
        texts: impl IntoIterator<Item = &'a str>,
    ) -> Result<ObjectId> {
        match self {
            ResolvedFont::Standard(font) => Ok(doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            })),
            ResolvedFont::Embedded(font) => {
                let mut used = BTreeMap::new();
                for text in texts {
                    for (ch, gid) in font.glyph_ids(text)? {
                        used.entry(gid).or_insert(ch);
                    }
                }
                font.register(doc, &used)
            }
        }
    }
}

/// Standard fonts only carry WinAnsi; anything outside Latin-1 becomes '?'
fn encode_win_ansi(text: &str) -> Vec<u8> {
    let mut replaced = BTreeSet::new();
    let bytes = text
        .chars()
        .map(|ch| match ch as u32 {
            code @ (0x20..=0x7E | 0xA0..=0xFF) => code as u8,
            0x20AC => 0x80,
            0x2018 => 0x91,
            0x2019 => 0x92,
            0x201C => 0x93,
            0x201D => 0x94,
            0x2013 => 0x96,
            0x2014 => 0x97,
            _ => {
                replaced.insert(ch);
                b'?'
            }
        })
        .collect();
    if !replaced.is_empty() {
        tracing::warn!(
            "Standard font cannot show {:?}; install a font that covers them",
            replaced
        );
    }
    bytes
}

fn sanitize_pdf_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_graphic() && !"()<>[]{}/%#".contains(*c))
        .collect()
}

fn to_unicode_cmap(used: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n\
         12 dict begin\n\
         begincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n\
         /CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );

    let mappings: Vec<(u16, char)> = used
        .iter()
        .filter(|(gid, _)| **gid != 0)
        .map(|(gid, ch)| (*gid, *ch))
        .collect();

    // at most 100 entries per bfchar block
    for chunk in mappings.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (gid, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{:04X}", u))
                .collect();
            cmap.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
        }
        cmap.push_str("endbfchar\n");
    }

    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// Resource name for a font on a page, derived from the reference only so
/// that re-rendering the same history yields identical output
pub fn resource_name(reference: &FontReference) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(reference.key().as_bytes());
    format!("FStamp{}", hex::encode_upper(&digest[..4]))
}

/// Literal PDF string for `text` in the given encoding bytes
pub(crate) fn text_string(bytes: Vec<u8>, font: &ResolvedFont) -> Object {
    match font {
        ResolvedFont::Standard(_) => Object::String(bytes, StringFormat::Literal),
        ResolvedFont::Embedded(_) => Object::String(bytes, StringFormat::Hexadecimal),
    }
}
