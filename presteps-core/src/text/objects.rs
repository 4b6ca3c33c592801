//! Small accessors over the PDF object graph

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

/// Longest reference chain followed before giving up
const MAX_REFERENCE_DEPTH: usize = 16;

/// Follow references until a direct object is reached. Dangling references
/// resolve to themselves.
pub fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(target) => current = target,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

/// Dictionary entry with references resolved
pub fn dict_get<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|object| resolve(doc, object))
}

/// Dictionary of a dictionary or stream object
pub fn as_dict(object: &Object) -> Option<&Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict),
        Object::Stream(stream) => Some(&stream.dict),
        _ => None,
    }
}

pub fn name(object: &Object) -> Option<&[u8]> {
    match object {
        Object::Name(name) => Some(name),
        _ => None,
    }
}

pub fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Decoded stream bytes; unfiltered or undecodable streams yield their raw
/// content
pub fn stream_data(stream: &Stream) -> Vec<u8> {
    stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone())
}

/// Resource dictionary of a page, inherited through the page tree
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_object(page_id).ok().and_then(as_dict)?;
    for _ in 0..MAX_REFERENCE_DEPTH {
        if let Some(resources) = dict_get(doc, current, b"Resources").and_then(as_dict) {
            return Some(resources);
        }
        current = dict_get(doc, current, b"Parent").and_then(as_dict)?;
    }
    None
}

/// Named entry of a resource category such as `/Font` or `/XObject`
pub fn resource<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    category: &[u8],
    key: &[u8],
) -> Option<&'a Object> {
    let category = dict_get(doc, resources, category).and_then(as_dict)?;
    category.get(key).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number() {
        assert_eq!(number(&Object::Integer(3)), Some(3.0));
        assert_eq!(number(&Object::Real(1.5)), Some(1.5));
        assert_eq!(number(&Object::Null), None);
    }

    #[test]
    fn test_resolve_follows_references() {
        let mut doc = Document::new();
        let id = doc.add_object(Object::Integer(42));
        let reference = Object::Reference(id);
        assert!(matches!(resolve(&doc, &reference), Object::Integer(42)));

        let dangling = Object::Reference((999, 0));
        assert!(matches!(
            resolve(&doc, &dangling),
            Object::Reference((999, 0))
        ));
    }

    #[test]
    fn test_page_resources_inherited_from_parent() {
        let mut doc = Document::new();
        let mut fonts = Dictionary::new();
        fonts.set("F1", Object::Integer(1));
        let mut resources = Dictionary::new();
        resources.set("Font", Object::Dictionary(fonts));

        let mut parent = Dictionary::new();
        parent.set("Resources", Object::Dictionary(resources));
        let parent_id = doc.add_object(Object::Dictionary(parent));

        let mut page = Dictionary::new();
        page.set("Parent", Object::Reference(parent_id));
        let page_id = doc.add_object(Object::Dictionary(page));

        let resources = page_resources(&doc, page_id).unwrap();
        assert!(matches!(
            resource(&doc, resources, b"Font", b"F1"),
            Some(Object::Integer(1))
        ));
        assert!(resource(&doc, resources, b"Font", b"F9").is_none());
    }
}
