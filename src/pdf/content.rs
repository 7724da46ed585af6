//! PDF content stream generation for labels and QR codes.
//!
//! This module provides:
//! - Text stamping at fixed page coordinates
//! - QR code generation and embedding as an image XObject
//! - String encoding for PDF (WinAnsi literals and UTF-16BE hex)

use anyhow::{Context, Result};
use image::{ImageBuffer, Luma};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use qrcode::{EcLevel, QrCode};
use std::io::Write;

use super::fonts::LabelFont;

/// Pixel size of the QR bitmap before it is scaled onto the page
pub const QR_SIZE: u32 = 300;

/// Builder for one page's overlay content stream and its XObjects
pub struct ContentBuilder<'a> {
    pub content_parts: Vec<String>,
    pub xobjects: Dictionary,
    font: &'a LabelFont,
}

impl<'a> ContentBuilder<'a> {
    /// Create a new ContentBuilder stamping text with `font`
    pub fn new(font: &'a LabelFont) -> Self {
        Self {
            content_parts: Vec::new(),
            xobjects: Dictionary::new(),
            font,
        }
    }

    /// Draw `text` with its baseline starting at (`x`, `y`)
    pub fn draw_text(&mut self, text: &str, x: f64, y: f64, size: u32) {
        self.content_parts.push(format!(
            "q BT 0 g /{} {} Tf {} {} Td {} Tj ET Q\n",
            self.font.resource_name(),
            size,
            x,
            y,
            self.font.text_operand(text)
        ));
    }

    /// Draw an image XObject scaled to `width` x `height` at (`x`, `y`)
    pub fn draw_image(&mut self, image_id: ObjectId, x: f64, y: f64, width: f64, height: f64) {
        let img_name = format!("Im{}", image_id.0);
        self.xobjects.set(img_name.clone(), Object::Reference(image_id));
        self.content_parts.push(format!(
            "q {} 0 0 {} {} {} cm /{} Do Q\n",
            width, height, x, y, img_name
        ));
    }

    /// Build the final content bytes
    pub fn build_content_bytes(&self) -> Vec<u8> {
        self.content_parts.concat().into_bytes()
    }
}

/// Render `value` as a QR code and add it to `doc` as a grayscale image
pub fn add_qr_image(doc: &mut Document, value: &str) -> Result<ObjectId> {
    let qr_img = generate_qr_code(value, QR_SIZE, QR_SIZE)?;

    // 8-bit gray, one byte per pixel
    let raw_bytes: Vec<u8> = qr_img.pixels().map(|pixel| pixel[0]).collect();
    let compressed_bytes = compress_data(&raw_bytes)?;

    let mut img_dict = Dictionary::new();
    img_dict.set("Type", "XObject");
    img_dict.set("Subtype", "Image");
    img_dict.set("Width", QR_SIZE as i64);
    img_dict.set("Height", QR_SIZE as i64);
    img_dict.set("ColorSpace", "DeviceGray");
    img_dict.set("BitsPerComponent", 8_i64);
    img_dict.set("Filter", "FlateDecode");

    Ok(doc.add_object(Stream::new(img_dict, compressed_bytes)))
}

/// Escape bytes for a PDF literal string, octal-escaping anything non-ASCII
pub fn escape_pdf_bytes(bytes: &[u8]) -> String {
    let mut result = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'(' => result.push_str(r"\("),
            b')' => result.push_str(r"\)"),
            b'\\' => result.push_str(r"\\"),
            b'\n' => result.push_str(r"\n"),
            b'\r' => result.push_str(r"\r"),
            b'\t' => result.push_str(r"\t"),
            0x20..=0x7E => result.push(b as char),
            _ => result.push_str(&format!("\\{:03o}", b)),
        }
    }
    result
}

/// Encode text for an Identity-H CID font as UTF-16BE hex
pub fn encode_cid_text(s: &str) -> String {
    s.encode_utf16()
        .map(|unit| format!("{:04X}", unit))
        .collect()
}

/// Compress data using zlib/flate2
pub fn compress_data(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Generate a QR code (error correction level M) as an image buffer
pub fn generate_qr_code(data: &str, width: u32, height: u32) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>> {
    let qr_code = QrCode::with_error_correction_level(data, EcLevel::M)
        .with_context(|| format!("Failed to generate QR code for {} bytes of data", data.len()))?;

    let img = qr_code
        .render::<Luma<u8>>()
        .light_color(Luma([255u8]))
        .dark_color(Luma([0u8]))
        .build();

    let scaled = image::imageops::resize(
        &img,
        width,
        height,
        image::imageops::FilterType::Nearest,
    );
    Ok(scaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fonts::HELVETICA;
    use std::io::Read;

    #[test]
    fn test_escape_pdf_bytes() {
        assert_eq!(escape_pdf_bytes(b"hello"), "hello");
        assert_eq!(escape_pdf_bytes(b"(hello)"), r"\(hello\)");
        assert_eq!(escape_pdf_bytes(b"hello\\world"), r"hello\\world");
        assert_eq!(escape_pdf_bytes(b"line1\nline2"), r"line1\nline2");
        assert_eq!(escape_pdf_bytes(&[0xE9]), r"\351");
    }

    #[test]
    fn test_encode_cid_text() {
        assert_eq!(encode_cid_text("A"), "0041");
        assert_eq!(encode_cid_text("東京"), "67714EAC");
        // Supplementary plane characters become surrogate pairs
        assert_eq!(encode_cid_text("😀"), "D83DDE00");
    }

    #[test]
    fn test_draw_text() {
        let font = LabelFont::Standard(HELVETICA);
        let mut builder = ContentBuilder::new(&font);
        builder.draw_text("Jean Dupont", 135.0, 696.0, 11);

        assert_eq!(builder.content_parts.len(), 1);
        assert_eq!(
            builder.content_parts[0],
            "q BT 0 g /FAtt 11 Tf 135 696 Td (Jean Dupont) Tj ET Q\n"
        );
        assert!(builder.xobjects.is_empty());
    }

    #[test]
    fn test_draw_image_registers_xobject() {
        let font = LabelFont::Standard(HELVETICA);
        let mut builder = ContentBuilder::new(&font);
        builder.draw_image((12, 0), 435.0, 125.0, 80.0, 80.0);

        assert_eq!(builder.content_parts[0], "q 80 0 0 80 435 125 cm /Im12 Do Q\n");
        assert!(builder.xobjects.has(b"Im12"));
    }

    #[test]
    fn test_generate_qr_code_size() {
        let img = generate_qr_code("Nom: Dupont", 120, 120).unwrap();
        assert_eq!(img.dimensions(), (120, 120));
        // Quiet zone is light
        assert_eq!(img.get_pixel(0, 0)[0], 255);
        assert!(img.pixels().any(|p| p[0] == 0));
    }

    #[test]
    fn test_add_qr_image() {
        let mut doc = Document::with_version("1.5");
        let id = add_qr_image(&mut doc, "Motifs: travail").unwrap();
        let stream = doc.get_object(id).unwrap().as_stream().unwrap();
        assert_eq!(stream.dict.get(b"Width").unwrap().as_i64().unwrap(), QR_SIZE as i64);
        assert_eq!(stream.dict.get(b"Filter").unwrap().as_name().unwrap(), b"FlateDecode");

        let mut raw = Vec::new();
        flate2::read::ZlibDecoder::new(stream.content.as_slice())
            .read_to_end(&mut raw)
            .unwrap();
        assert_eq!(raw.len(), (QR_SIZE * QR_SIZE) as usize);
    }
}
