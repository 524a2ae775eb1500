//! The thin facade external drawing code builds pages through: object
//! registration, the page-tree walk, and per-page resource registrars that
//! dedupe by object identity (§4.8).

use crate::errors::{PdfError, PdfResult};
use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Borrows a registry for the duration of a build or edit session.
pub struct Document<'a> {
    registry: &'a mut Registry,
}

impl<'a> Document<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Document { registry }
    }

    pub fn register(&mut self, object: Object) -> ObjectId {
        self.registry.register(object)
    }

    pub fn allocate_ref(&mut self) -> ObjectId {
        self.registry.allocate_ref()
    }

    pub fn resolve<'b>(&'b mut self, value: &'b Object) -> &'b Object {
        self.registry.resolve(value)
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        self.registry
    }

    /// Walks the page tree rooted at the catalog's `/Pages` entry,
    /// depth-first, and returns the leaf `/Type /Page` objects in document
    /// order. Cyclic `/Kids` references are broken with a warning rather
    /// than looping forever.
    pub fn pages(&mut self, catalog: ObjectId) -> PdfResult<Vec<ObjectId>> {
        let catalog_dict = self
            .registry
            .get(catalog)
            .and_then(Object::as_dict)
            .ok_or_else(|| PdfError::MalformedFile("catalog object is missing or not a dictionary".into()))?;
        let root = catalog_dict
            .get("Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| PdfError::MalformedFile("catalog has no /Pages entry".into()))?;

        let mut pages = Vec::new();
        let mut visited = HashSet::new();
        self.walk_page_tree(root, &mut visited, &mut pages);
        Ok(pages)
    }

    fn walk_page_tree(&mut self, node: ObjectId, visited: &mut HashSet<ObjectId>, out: &mut Vec<ObjectId>) {
        if !visited.insert(node) {
            self.registry.add_warning(format!("page tree cycle detected at {:?}, skipping", node));
            return;
        }
        let Some(dict) = self.registry.get(node).and_then(Object::as_dict) else { return };
        if dict.type_is("Page") {
            out.push(node);
            return;
        }
        let kids: Vec<ObjectId> =
            dict.get("Kids").and_then(Object::as_array).unwrap_or(&[]).iter().filter_map(Object::as_reference).collect();
        for kid in kids {
            self.walk_page_tree(kid, visited, out);
        }
    }

    /// Merges a page's accumulated resources into its `/Resources` dict,
    /// creating the dict (and any missing sub-dictionaries) as needed.
    pub fn apply_resources(&mut self, page: ObjectId, resources: PageResources) -> PdfResult<()> {
        let Some(page_dict) = self.registry.get_mut(page).and_then(Object::as_dict_mut) else {
            return Err(PdfError::MalformedFile(format!("{:?} is not a dictionary", page)));
        };
        let existing = match page_dict.get_mut("Resources").and_then(Object::as_dict_mut) {
            Some(d) => std::mem::take(d),
            None => Dictionary::new(),
        };
        let merged = resources.merge_into(existing);
        page_dict.set("Resources", merged);
        Ok(())
    }
}

/// One page's worth of named resources, accumulated as drawing code
/// registers fonts, XObjects, graphics states, patterns and shadings. Each
/// category dedupes by the registered object's id and hands back a stable
/// per-page name on repeat registration, the same way the teacher's
/// `InProgressDoc::add_font` caches by font identity.
#[derive(Debug, Default)]
pub struct PageResources {
    fonts: IndexMap<ObjectId, String>,
    ext_gstates: IndexMap<ObjectId, String>,
    patterns: IndexMap<ObjectId, String>,
    shadings: IndexMap<ObjectId, String>,
    xobjects: IndexMap<ObjectId, String>,
    form_xobject_count: usize,
    image_count: usize,
}

impl PageResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_font(&mut self, font: ObjectId) -> String {
        register(&mut self.fonts, font, "F")
    }

    pub fn register_ext_gstate(&mut self, ext_gstate: ObjectId) -> String {
        register(&mut self.ext_gstates, ext_gstate, "GS")
    }

    pub fn register_pattern(&mut self, pattern: ObjectId) -> String {
        register(&mut self.patterns, pattern, "P")
    }

    pub fn register_shading(&mut self, shading: ObjectId) -> String {
        register(&mut self.shadings, shading, "Sh")
    }

    /// Registers a form XObject. Shares the `/XObject` resource dict with
    /// images, but is named from its own counter (`Fm0`, `Fm1`, ...).
    pub fn register_xobject(&mut self, xobject: ObjectId) -> String {
        if let Some(name) = self.xobjects.get(&xobject) {
            return name.clone();
        }
        let name = format!("Fm{}", self.form_xobject_count);
        self.form_xobject_count += 1;
        self.xobjects.insert(xobject, name.clone());
        name
    }

    /// Registers an image XObject (named `Im0`, `Im1`, ...).
    pub fn register_image(&mut self, image: ObjectId) -> String {
        if let Some(name) = self.xobjects.get(&image) {
            return name.clone();
        }
        let name = format!("Im{}", self.image_count);
        self.image_count += 1;
        self.xobjects.insert(image, name.clone());
        name
    }

    fn merge_into(self, mut into: Dictionary) -> Dictionary {
        merge_subdict(&mut into, "Font", self.fonts);
        merge_subdict(&mut into, "ExtGState", self.ext_gstates);
        merge_subdict(&mut into, "Pattern", self.patterns);
        merge_subdict(&mut into, "Shading", self.shadings);
        merge_subdict(&mut into, "XObject", self.xobjects);
        into
    }
}

fn register(map: &mut IndexMap<ObjectId, String>, id: ObjectId, prefix: &str) -> String {
    if let Some(name) = map.get(&id) {
        return name.clone();
    }
    let name = format!("{}{}", prefix, map.len());
    map.insert(id, name.clone());
    name
}

fn merge_subdict(into: &mut Dictionary, key: &str, entries: IndexMap<ObjectId, String>) {
    if entries.is_empty() {
        return;
    }
    let mut sub = match into.remove(key) {
        Some(Object::Dictionary(d)) => d,
        _ => Dictionary::new(),
    };
    for (id, name) in entries {
        sub.set(name, Object::Reference(id));
    }
    into.set(key, sub);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(pairs: &[(&str, Object)]) -> Dictionary {
        let mut d = Dictionary::new();
        for (k, v) in pairs {
            d.set(*k, v.clone());
        }
        d
    }

    #[test]
    fn pages_walks_a_nested_tree_in_order() {
        let mut registry = Registry::new();
        let page1 = registry.register(Object::Dictionary(dict(&[("Type", "Page".into())])));
        let page2 = registry.register(Object::Dictionary(dict(&[("Type", "Page".into())])));
        let kid_tree = registry.register(Object::Dictionary(dict(&[
            ("Type", "Pages".into()),
            ("Kids", Object::Array(vec![Object::Reference(page2)])),
        ])));
        let root = registry.register(Object::Dictionary(dict(&[
            ("Type", "Pages".into()),
            ("Kids", Object::Array(vec![Object::Reference(page1), Object::Reference(kid_tree)])),
        ])));
        let catalog =
            registry.register(Object::Dictionary(dict(&[("Type", "Catalog".into()), ("Pages", Object::Reference(root))])));

        let mut doc = Document::new(&mut registry);
        let pages = doc.pages(catalog).unwrap();
        assert_eq!(pages, vec![page1, page2]);
    }

    #[test]
    fn resource_registrars_dedupe_by_identity_and_number_sequentially() {
        let mut resources = PageResources::new();
        let font_a = (10, 0);
        let font_b = (11, 0);
        assert_eq!(resources.register_font(font_a), "F0");
        assert_eq!(resources.register_font(font_b), "F1");
        assert_eq!(resources.register_font(font_a), "F0");

        let form = (20, 0);
        let image = (21, 0);
        assert_eq!(resources.register_xobject(form), "Fm0");
        assert_eq!(resources.register_image(image), "Im0");
    }

    #[test]
    fn apply_resources_merges_into_an_existing_resources_dict() {
        let mut registry = Registry::new();
        let existing_font = registry.register(Object::Dictionary(Dictionary::new()));
        let page = registry.register(Object::Dictionary(dict(&[
            ("Type", "Page".into()),
            (
                "Resources",
                Object::Dictionary(dict(&[(
                    "Font",
                    Object::Dictionary(dict(&[("Fpreexisting", Object::Reference(existing_font))])),
                )])),
            ),
        ])));

        let new_font = registry.register(Object::Dictionary(Dictionary::new()));
        let mut resources = PageResources::new();
        let name = resources.register_font(new_font);

        let mut doc = Document::new(&mut registry);
        doc.apply_resources(page, resources).unwrap();

        let page_dict = registry.get(page).and_then(Object::as_dict).unwrap();
        let font_dict = page_dict.get("Resources").and_then(Object::as_dict).unwrap().get("Font").and_then(Object::as_dict).unwrap();
        assert!(font_dict.contains_key("Fpreexisting"));
        assert!(font_dict.contains_key(&name));
    }
}
