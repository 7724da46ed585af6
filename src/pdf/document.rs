use anyhow::{anyhow, Context, Result};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};

use super::resources::inherited_attribute;

/// Page size in points, read from the MediaBox
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
}

/// First page of the template, with its geometry
pub fn first_page(doc: &Document) -> Result<(ObjectId, PageGeometry)> {
    let page_id = *doc.get_pages().values().next()
        .ok_or_else(|| anyhow!("No pages in template PDF"))?;
    let geometry = page_geometry(doc, page_id)?;
    Ok((page_id, geometry))
}

pub fn page_geometry(doc: &Document, page_id: ObjectId) -> Result<PageGeometry> {
    let media_box = inherited_attribute(doc, page_id, b"MediaBox")
        .ok_or_else(|| anyhow!("Page {:?} has no MediaBox", page_id))?;
    let media_box = media_box.as_array()
        .with_context(|| "MediaBox is not an array")?;
    if media_box.len() != 4 {
        return Err(anyhow!("MediaBox has {} entries, expected 4", media_box.len()));
    }

    let coord = |i: usize| -> Result<f64> {
        Ok(media_box[i].as_float()
            .with_context(|| format!("MediaBox entry {} is not a number", i))? as f64)
    };
    Ok(PageGeometry {
        width: coord(2)? - coord(0)?,
        height: coord(3)? - coord(1)?,
    })
}

/// Append an empty page with the same MediaBox as `like_page` and return its id
pub fn append_blank_page(doc: &mut Document, like_page: ObjectId) -> Result<ObjectId> {
    let media_box = inherited_attribute(doc, like_page, b"MediaBox")
        .ok_or_else(|| anyhow!("Page {:?} has no MediaBox", like_page))?;

    let pages_id = doc.catalog()?.get(b"Pages")
        .with_context(|| "Failed to get Pages from catalog")?
        .as_reference()
        .with_context(|| "Pages is not a reference")?;

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => media_box,
        "Resources" => Dictionary::new(),
    });

    let pages = doc.get_dictionary_mut(pages_id)
        .with_context(|| "Pages is not a dictionary")?;
    let mut kids = pages.get(b"Kids")
        .and_then(|k| k.as_array())
        .cloned()
        .unwrap_or_default();
    kids.push(Object::Reference(page_id));
    let count = kids.len();
    pages.set("Kids", kids);
    pages.set("Count", count as i64);

    Ok(page_id)
}

/// Serialize the document to bytes
pub fn save_to_bytes(doc: &mut Document) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .with_context(|| "Failed to serialize PDF")?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_page_doc() -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1_i64,
                "MediaBox" => vec![Object::Integer(0), Object::Integer(0), Object::Real(595.28), Object::Real(841.89)],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    #[test]
    fn test_first_page_geometry() {
        let doc = one_page_doc();
        let (_, geometry) = first_page(&doc).unwrap();
        assert!((geometry.width - 595.28).abs() < 0.01);
        assert!((geometry.height - 841.89).abs() < 0.01);
    }

    #[test]
    fn test_first_page_of_empty_document() {
        let doc = Document::with_version("1.5");
        assert!(first_page(&doc).is_err());
    }

    #[test]
    fn test_append_blank_page() {
        let mut doc = one_page_doc();
        let (first, _) = first_page(&doc).unwrap();
        let second = append_blank_page(&mut doc, first).unwrap();

        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages.get(&2), Some(&second));
        let geometry = page_geometry(&doc, second).unwrap();
        assert!((geometry.height - 841.89).abs() < 0.01);
    }

    #[test]
    fn test_save_and_reload() {
        let mut doc = one_page_doc();
        let bytes = save_to_bytes(&mut doc).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
    }
}
