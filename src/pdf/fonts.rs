use anyhow::{anyhow, Context, Result};
use fontdb::Database;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeSet;
use tracing::debug;
use ttf_parser::Face;

use super::content::{encode_cid_text, escape_pdf_bytes};
use crate::fit::MeasureText;

/// Standard PDF Type1 font with its AFM advance widths
#[derive(Debug, Clone, Copy)]
pub struct StandardFont {
    base_font: &'static str,
    /// Advance widths in 1/1000 em, indexed by WinAnsiEncoding code
    widths: &'static [u16; 256],
}

pub const HELVETICA: StandardFont = StandardFont {
    base_font: "Helvetica",
    widths: &HELVETICA_WIDTHS,
};

impl StandardFont {
    /// Get the PDF BaseFont name for this font
    pub fn base_font_name(&self) -> &'static str {
        self.base_font
    }

    /// Width of a single WinAnsi code in 1/1000 em
    pub fn code_width(&self, code: u8) -> u16 {
        self.widths[code as usize]
    }
}

impl MeasureText for StandardFont {
    fn width_of_text_at_size(&self, text: &str, size: u32) -> f64 {
        let units: u32 = text
            .chars()
            .map(|c| self.code_width(winansi_code(c).unwrap_or(b'?')) as u32)
            .sum();
        units as f64 * size as f64 / 1000.0
    }
}

/// Map a character to its WinAnsiEncoding code, if it has one
pub fn winansi_code(c: char) -> Option<u8> {
    let code = c as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => match c {
            '€' => Some(0x80),
            '‚' => Some(0x82),
            'ƒ' => Some(0x83),
            '„' => Some(0x84),
            '…' => Some(0x85),
            '†' => Some(0x86),
            '‡' => Some(0x87),
            'ˆ' => Some(0x88),
            '‰' => Some(0x89),
            'Š' => Some(0x8A),
            '‹' => Some(0x8B),
            'Œ' => Some(0x8C),
            'Ž' => Some(0x8E),
            '‘' => Some(0x91),
            '’' => Some(0x92),
            '“' => Some(0x93),
            '”' => Some(0x94),
            '•' => Some(0x95),
            '–' => Some(0x96),
            '—' => Some(0x97),
            '˜' => Some(0x98),
            '™' => Some(0x99),
            'š' => Some(0x9A),
            '›' => Some(0x9B),
            'œ' => Some(0x9C),
            'ž' => Some(0x9E),
            'Ÿ' => Some(0x9F),
            _ => None,
        },
    }
}

pub fn is_winansi_encodable(text: &str) -> bool {
    text.chars().all(|c| winansi_code(c).is_some())
}

/// Encode text in WinAnsi, replacing characters outside the code page with `?`
pub fn encode_winansi_lossy(text: &str) -> Vec<u8> {
    text.chars().map(|c| winansi_code(c).unwrap_or(b'?')).collect()
}

/// Create a standard Type1 font object using WinAnsiEncoding
pub fn create_standard_font(doc: &mut Document, font: StandardFont) -> ObjectId {
    let mut font_dict = Dictionary::new();
    font_dict.set("Type", "Font");
    font_dict.set("Subtype", "Type1");
    font_dict.set("BaseFont", font.base_font_name());
    font_dict.set("Encoding", "WinAnsiEncoding");
    doc.add_object(Object::Dictionary(font_dict))
}

/// A TrueType face loaded from disk, used when a label holds characters
/// the standard fonts cannot encode
#[derive(Clone)]
pub struct TrueTypeFont {
    data: Vec<u8>,
    index: u32,
    family: String,
    units_per_em: f64,
}

impl std::fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("family", &self.family)
            .field("index", &self.index)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl TrueTypeFont {
    pub fn from_data(data: Vec<u8>, index: u32, family: &str) -> Result<Self> {
        let units_per_em = {
            let face = Face::parse(&data, index)
                .with_context(|| format!("Failed to parse font {}", family))?;
            face.units_per_em().max(1) as f64
        };
        Ok(Self {
            data,
            index,
            family: family.to_string(),
            units_per_em,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, self.index).ok()
    }

    /// True when every character of `text` has a glyph in this face and a CID
    pub fn covers(&self, text: &str) -> bool {
        match self.face() {
            Some(face) => text
                .chars()
                .all(|c| c.is_control() || (is_cid_encodable(c) && face.glyph_index(c).is_some())),
            None => false,
        }
    }

    /// Advance width of a character in 1/1000 em (0 for missing glyphs)
    pub fn char_width(&self, c: char) -> u32 {
        let Some(face) = self.face() else {
            return 0;
        };
        let advance = face
            .glyph_index(c)
            .and_then(|gid| face.glyph_hor_advance(gid))
            .unwrap_or(0);
        (advance as f64 * 1000.0 / self.units_per_em).round() as u32
    }
}

impl MeasureText for TrueTypeFont {
    fn width_of_text_at_size(&self, text: &str, size: u32) -> f64 {
        let units: u32 = text.chars().map(|c| self.char_width(c)).sum();
        units as f64 * size as f64 / 1000.0
    }
}

/// Highest CID reachable with Identity-H and one UTF-16 code unit per glyph
const MAX_CID: u32 = 0xFFFF;

/// Characters outside the BMP would be written as surrogate pairs, which
/// have no entry in the CIDToGIDMap
fn is_cid_encodable(c: char) -> bool {
    c as u32 <= MAX_CID
}

/// Build a CIDToGIDMap stream from the font's cmap
///
/// With Identity-H the CID is the UTF-16 code unit, so each BMP code point
/// maps to its glyph ID as a 2-byte big-endian entry.
fn build_cidtogid_map(face: &Face<'_>) -> Vec<u8> {
    let mut gid_map: Vec<u8> = Vec::with_capacity((MAX_CID as usize + 1) * 2);

    for cid in 0..=MAX_CID {
        let gid = char::from_u32(cid)
            .and_then(|ch| face.glyph_index(ch))
            .map(|g| g.0)
            .unwrap_or(0);
        gid_map.extend_from_slice(&gid.to_be_bytes());
    }

    gid_map
}

/// `W` array entries for the characters actually stamped on the page
fn build_widths(font: &TrueTypeFont, used: &BTreeSet<char>) -> Vec<Object> {
    let mut widths = Vec::new();
    for &c in used.iter().filter(|&&c| is_cid_encodable(c)) {
        widths.push(Object::Integer(c as i64));
        widths.push(Object::Array(vec![Object::Integer(font.char_width(c) as i64)]));
    }
    widths
}

/// Embed a Type0 font with a CIDFontType2 descendant, Identity-H encoded
pub fn embed_cid_font(
    doc: &mut Document,
    font: &TrueTypeFont,
    used: &BTreeSet<char>,
) -> Result<ObjectId> {
    let face = font
        .face()
        .ok_or_else(|| anyhow!("Failed to parse font {}", font.family))?;
    let scale = |v: i16| (v as f64 * 1000.0 / font.units_per_em).round() as i64;
    let base_font = font.family.replace(' ', "-");

    let mut cid_font = Dictionary::new();
    cid_font.set("Type", "Font");
    cid_font.set("Subtype", "CIDFontType2");
    cid_font.set("BaseFont", base_font.clone());
    cid_font.set("CIDSystemInfo", {
        let mut cid_system = Dictionary::new();
        cid_system.set("Registry", Object::String("Adobe".into(), StringFormat::Literal));
        cid_system.set("Ordering", Object::String("Identity".into(), StringFormat::Literal));
        cid_system.set("Supplement", 0i64);
        Object::Dictionary(cid_system)
    });
    cid_font.set("DW", 1000i64);
    cid_font.set("W", build_widths(font, used));

    let cidtogid_stream = Stream::new(Dictionary::new(), build_cidtogid_map(&face));
    let cidtogid_id = doc.add_object(cidtogid_stream);
    cid_font.set("CIDToGIDMap", Object::Reference(cidtogid_id));

    let bbox = face.global_bounding_box();
    let mut font_descriptor = Dictionary::new();
    font_descriptor.set("Type", "FontDescriptor");
    font_descriptor.set("FontName", base_font.clone());
    font_descriptor.set("Flags", 4i64); // Symbolic
    font_descriptor.set(
        "FontBBox",
        vec![
            Object::Integer(scale(bbox.x_min)),
            Object::Integer(scale(bbox.y_min)),
            Object::Integer(scale(bbox.x_max)),
            Object::Integer(scale(bbox.y_max)),
        ],
    );
    font_descriptor.set("ItalicAngle", 0i64);
    font_descriptor.set("Ascent", scale(face.ascender()));
    font_descriptor.set("Descent", scale(face.descender()));
    font_descriptor.set("CapHeight", scale(face.capital_height().unwrap_or(face.ascender())));
    font_descriptor.set("StemV", 80i64);

    let mut font_stream_dict = Dictionary::new();
    font_stream_dict.set("Length1", font.data.len() as i64);
    let font_stream_id = doc.add_object(Stream::new(font_stream_dict, font.data.clone()));
    font_descriptor.set("FontFile2", Object::Reference(font_stream_id));

    let descriptor_id = doc.add_object(Object::Dictionary(font_descriptor));
    cid_font.set("FontDescriptor", Object::Reference(descriptor_id));
    let cid_font_id = doc.add_object(Object::Dictionary(cid_font));

    let mut type0_font = Dictionary::new();
    type0_font.set("Type", "Font");
    type0_font.set("Subtype", "Type0");
    type0_font.set("BaseFont", base_font);
    type0_font.set("Encoding", "Identity-H");
    type0_font.set("DescendantFonts", vec![Object::Reference(cid_font_id)]);

    Ok(doc.add_object(Object::Dictionary(type0_font)))
}

/// Families tried, in order, when a label needs more than WinAnsi
const UNICODE_FONT_FAMILIES: [&str; 12] = [
    "Noto Sans",
    "DejaVu Sans",
    "Liberation Sans",
    "Arial Unicode MS",
    "Arial",
    "Noto Sans CJK JP",
    "Noto Sans JP",
    "Source Han Sans",
    "Hiragino Sans",
    "Hiragino Kaku Gothic ProN",
    "Yu Gothic",
    "Meiryo",
];

/// Find a system font that has glyphs for all of `text`
pub fn find_unicode_font(text: &str) -> Option<TrueTypeFont> {
    let mut db = Database::new();
    db.load_system_fonts();

    for family in UNICODE_FONT_FAMILIES {
        let query = fontdb::Query {
            families: &[fontdb::Family::Name(family)],
            ..Default::default()
        };

        let Some(id) = db.query(&query) else {
            continue;
        };
        let Some((data, index)) = db.with_face_data(id, |data, index| (data.to_vec(), index)) else {
            continue;
        };

        match TrueTypeFont::from_data(data, index, family) {
            Ok(font) if font.covers(text) => {
                debug!(family, "Using system font for non-WinAnsi text");
                return Some(font);
            }
            Ok(_) => debug!(family, "System font lacks glyphs, trying next"),
            Err(e) => debug!(family, error = %e, "Skipping unreadable system font"),
        }
    }

    None
}

/// Font used to stamp every label of one attestation
#[derive(Debug, Clone)]
pub enum LabelFont {
    Standard(StandardFont),
    Unicode(TrueTypeFont),
}

impl LabelFont {
    /// Name of the font in the page's `/Font` resources
    pub fn resource_name(&self) -> &'static str {
        match self {
            LabelFont::Standard(_) => "FAtt",
            LabelFont::Unicode(_) => "FAttU",
        }
    }

    /// PDF string operand for `Tj`
    pub fn text_operand(&self, text: &str) -> String {
        match self {
            LabelFont::Standard(_) => format!("({})", escape_pdf_bytes(&encode_winansi_lossy(text))),
            LabelFont::Unicode(_) => format!("<{}>", encode_cid_text(text)),
        }
    }

    /// Add the font objects to the document and return the font reference
    pub fn embed(&self, doc: &mut Document, used: &BTreeSet<char>) -> Result<ObjectId> {
        match self {
            LabelFont::Standard(font) => Ok(create_standard_font(doc, *font)),
            LabelFont::Unicode(font) => embed_cid_font(doc, font, used),
        }
    }
}

impl MeasureText for LabelFont {
    fn width_of_text_at_size(&self, text: &str, size: u32) -> f64 {
        match self {
            LabelFont::Standard(font) => font.width_of_text_at_size(text, size),
            LabelFont::Unicode(font) => font.width_of_text_at_size(text, size),
        }
    }
}

// Helvetica AFM widths mapped through WinAnsiEncoding.
#[rustfmt::skip]
static HELVETICA_WIDTHS: [u16; 256] = [
    // 0-31: control characters
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    // 32-47: space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 48-63: 0-9 : ; < = > ?
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    // 64-79: @ A-O
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    // 80-95: P-Z [ \ ] ^ _
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    // 96-111: ` a-o
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    // 112-127: p-z { | } ~ DEL
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0,
    // 128-143
    556, 0, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0,
    // 144-159
    0, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 0, 500, 667,
    // 160-175
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333,
    // 176-191
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611,
    // 192-207: Agrave .. Idieresis
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278,
    // 208-223: Eth .. germandbls (215 = multiply)
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611,
    // 224-239: agrave .. idieresis
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278,
    // 240-255: eth .. ydieresis
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500,
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::ideal_font_size;

    #[test]
    fn test_helvetica_widths() {
        // P a r i s = 667 + 556 + 333 + 222 + 500
        let width = HELVETICA.width_of_text_at_size("Paris", 10);
        assert!((width - 22.78).abs() < 1e-9);
        assert_eq!(HELVETICA.code_width(b' '), 278);
        assert_eq!(HELVETICA.code_width(0xD7), 584);
    }

    #[test]
    fn test_helvetica_accented_widths() {
        // é is 0xE9 and shares the width of e
        assert_eq!(
            HELVETICA.width_of_text_at_size("é", 11),
            HELVETICA.width_of_text_at_size("e", 11)
        );
    }

    #[test]
    fn test_winansi_codes() {
        assert_eq!(winansi_code('A'), Some(0x41));
        assert_eq!(winansi_code('×'), Some(0xD7));
        assert_eq!(winansi_code('à'), Some(0xE0));
        assert_eq!(winansi_code('€'), Some(0x80));
        assert_eq!(winansi_code('œ'), Some(0x9C));
        assert_eq!(winansi_code('\n'), None);
        assert_eq!(winansi_code('東'), None);
        assert!(is_winansi_encodable("Saint-Étienne"));
        assert!(!is_winansi_encodable("Łódź"));
    }

    #[test]
    fn test_cid_encodable_stops_at_bmp() {
        assert!(is_cid_encodable('東'));
        assert!(is_cid_encodable('\u{FFFD}'));
        assert!(!is_cid_encodable('𠮷'));
        assert!(!is_cid_encodable('😀'));
    }

    #[test]
    fn test_encode_winansi_lossy() {
        assert_eq!(encode_winansi_lossy("é×"), vec![0xE9, 0xD7]);
        assert_eq!(encode_winansi_lossy("a東b"), b"a?b".to_vec());
    }

    #[test]
    fn test_standard_label_operand() {
        let font = LabelFont::Standard(HELVETICA);
        assert_eq!(font.text_operand("×"), r"(\327)");
        assert_eq!(font.text_operand("(Paris)"), r"(\(Paris\))");
        assert_eq!(font.resource_name(), "FAtt");
    }

    #[test]
    fn test_city_fits_with_helvetica() {
        // Short names keep the default size
        assert_eq!(ideal_font_size(&HELVETICA, "Paris", 83.0, 7, 11), Some(11));
        // 16 wide letters need shrinking
        let city = "Villefranche-sur-Saône";
        let size = ideal_font_size(&HELVETICA, city, 83.0, 7, 11).unwrap();
        assert!(size < 11);
        assert!(HELVETICA.width_of_text_at_size(city, size) <= 83.0);
        assert!(HELVETICA.width_of_text_at_size(city, size + 1) > 83.0);
    }

    #[test]
    fn test_city_too_long_for_helvetica() {
        let city = "Saint-Remy-en-Bouzemont-Saint-Genest-et-Isson";
        assert_eq!(ideal_font_size(&HELVETICA, city, 83.0, 7, 11), None);
    }

    #[test]
    fn test_create_standard_font() {
        let mut doc = Document::with_version("1.5");
        let id = create_standard_font(&mut doc, HELVETICA);
        let dict = doc.get_dictionary(id).unwrap();
        assert_eq!(dict.get(b"BaseFont").unwrap().as_name().unwrap(), b"Helvetica");
        assert_eq!(dict.get(b"Encoding").unwrap().as_name().unwrap(), b"WinAnsiEncoding");
    }

    #[test]
    fn test_true_type_font_rejects_garbage() {
        assert!(TrueTypeFont::from_data(vec![0, 1, 2, 3], 0, "Broken").is_err());
    }
}
