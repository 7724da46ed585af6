use lopdf::{Dictionary, Document, Object, ObjectId};

/// Look up a page attribute, following `/Parent` for inheritable keys
pub fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = doc.get_dictionary(page_id).ok();
    while let Some(dict) = current {
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict
            .get(b"Parent")
            .and_then(|p| p.as_reference())
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    None
}

/// Resolve a dictionary that may be stored inline or behind a reference
fn resolve_dictionary(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(d) => Some(d.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// Merge a font and XObjects into a page's resources
///
/// The page gets its own copy of the (possibly inherited or shared)
/// resources dictionary, so other pages of the template are not affected:
/// 1. Resolve the current resources, fonts and XObjects
/// 2. Add `font_name` pointing at `font_id`
/// 3. Add every entry of `xobject_dict`
pub fn update_page_resources(
    doc: &mut Document,
    page_id: ObjectId,
    font_name: &str,
    font_id: ObjectId,
    xobject_dict: &Dictionary,
) {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve_dictionary(doc, &r))
        .unwrap_or_else(Dictionary::new);

    let mut font_resources = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dictionary(doc, f))
        .unwrap_or_else(Dictionary::new);
    font_resources.set(font_name, Object::Reference(font_id));
    resources.set("Font", Object::Dictionary(font_resources));

    if !xobject_dict.is_empty() {
        let mut xobject_resources = resources
            .get(b"XObject")
            .ok()
            .and_then(|x| resolve_dictionary(doc, x))
            .unwrap_or_else(Dictionary::new);
        for (key, value) in xobject_dict.iter() {
            xobject_resources.set(key.clone(), value.clone());
        }
        resources.set("XObject", Object::Dictionary(xobject_resources));
    }

    if let Ok(page) = doc.get_dictionary_mut(page_id) {
        page.set("Resources", Object::Dictionary(resources));
    }
}
