//! The AcroForm subsystem: field tree construction, typed field access, bulk
//! fill, and flattening (§4.7).

mod appearance;
mod field;
mod flags;

pub use field::{FieldKind, FieldNode, FieldValue, Widget};

use crate::errors::{PdfError, PdfResult};
use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId, PdfString};
use indexmap::IndexMap;
use std::collections::{HashSet, VecDeque};

/// A loaded form: the flattened list of terminal fields plus the id of the
/// catalog's `/AcroForm` dict, addressable by fully-qualified name.
pub struct Form {
    acroform_id: ObjectId,
    fields: Vec<FieldNode>,
    by_name: IndexMap<String, usize>,
    /// Fully-qualified names of non-terminal nodes, kept only so `fill()` can
    /// tell "no such field" apart from "that name is a branch, not a leaf".
    non_terminal_names: HashSet<String>,
}

struct QueueEntry {
    id: ObjectId,
    parent_name: String,
    inherited_ft: Option<String>,
}

impl Form {
    /// Builds the field tree breadth-first from `AcroForm./Fields`, with
    /// cycle detection on visited ref identities. Returns `None` if the
    /// catalog has no `/AcroForm`.
    pub fn load(registry: &mut Registry, catalog: ObjectId) -> Option<Form> {
        let acroform_ref = registry.get(catalog).and_then(Object::as_dict)?.get("AcroForm")?.clone();
        let acroform_id = acroform_ref.as_reference().unwrap_or(catalog);
        let acroform = registry.resolve(&acroform_ref).as_dict()?.clone();
        let roots = acroform.get("Fields").and_then(Object::as_array).unwrap_or(&[]);

        let mut fields = Vec::new();
        let mut by_name = IndexMap::new();
        let mut non_terminal_names = HashSet::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<QueueEntry> = roots
            .iter()
            .filter_map(Object::as_reference)
            .map(|id| QueueEntry { id, parent_name: String::new(), inherited_ft: None })
            .collect();

        while let Some(entry) = queue.pop_front() {
            if !visited.insert(entry.id) {
                continue;
            }
            let Some(dict) = registry.get(entry.id).and_then(Object::as_dict) else { continue };

            let partial = dict.get("T").and_then(Object::as_string).map(|s| s.as_utf8_lossy().into_owned());
            let qualified = match (&entry.parent_name[..], &partial) {
                ("", Some(p)) => p.clone(),
                (parent, Some(p)) => format!("{}.{}", parent, p),
                (parent, None) => parent.to_string(),
            };

            let kid_refs: Vec<ObjectId> =
                dict.get("Kids").and_then(Object::as_array).unwrap_or(&[]).iter().filter_map(Object::as_reference).collect();
            let (child_fields, widget_ids): (Vec<ObjectId>, Vec<ObjectId>) =
                kid_refs.into_iter().partition(|&kid| has_partial_name(registry, kid));

            let ft = dict
                .get("FT")
                .and_then(Object::as_name)
                .map(|n| n.as_str().into_owned())
                .or_else(|| entry.inherited_ft.clone());

            if !child_fields.is_empty() {
                for child in child_fields {
                    queue.push_back(QueueEntry {
                        id: child,
                        parent_name: qualified.clone(),
                        inherited_ft: ft.clone(),
                    });
                }
                if widget_ids.is_empty() {
                    non_terminal_names.insert(qualified);
                    continue;
                }
            }

            let Some(ft) = ft else { continue };
            let widgets = if widget_ids.is_empty() { vec![entry.id] } else { widget_ids };
            let ff = inherited_i64(registry, entry.id, "Ff").unwrap_or(0);
            let options = dict
                .get("Opt")
                .and_then(Object::as_array)
                .map(|arr| arr.iter().filter_map(field::opt_label).collect())
                .unwrap_or_else(|| radio_options_from_widgets(registry, &widgets));
            let on_value = radio_options_from_widgets(registry, &widgets).into_iter().next().unwrap_or_default();
            let kind = FieldKind::classify(&ft, ff, options, on_value);
            let kind = match kind {
                FieldKind::Text { multiline, comb, .. } => FieldKind::Text {
                    max_len: inherited_i64(registry, entry.id, "MaxLen"),
                    multiline,
                    comb,
                },
                other => other,
            };

            let node_index = fields.len();
            by_name.insert(qualified.clone(), node_index);
            fields.push(FieldNode {
                id: entry.id,
                name: qualified,
                kind,
                widgets: widgets.into_iter().map(|id| Widget { id }).collect(),
                appearance_dirty: false,
            });
        }

        Some(Form { acroform_id, fields, by_name, non_terminal_names })
    }

    pub fn field(&self, name: &str) -> Option<&FieldNode> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldNode> {
        self.by_name.get(name).copied().map(move |i| &mut self.fields[i])
    }

    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }

    /// Sets every named field's value, validating the whole batch against
    /// each field's expected shape before mutating anything. A name that
    /// resolves to nothing in this form, or to a non-terminal field, is
    /// skipped with a warning rather than treated as an error.
    pub fn fill(&mut self, registry: &mut Registry, values: &IndexMap<String, FieldValue>) -> PdfResult<()> {
        let mut to_apply = Vec::new();
        for (name, value) in values {
            let Some(&index) = self.by_name.get(name) else {
                if self.non_terminal_names.contains(name) {
                    registry.add_warning(format!("fill: {:?} is not a terminal field, skipping", name));
                } else {
                    registry.add_warning(format!("fill: no such field {:?}", name));
                }
                continue;
            };
            let node = &self.fields[index];
            node.validate(value)?;
            to_apply.push((index, value.clone()));
        }
        for (index, value) in to_apply {
            self.fields[index].set_value(registry, value)?;
        }
        Ok(())
    }

    /// Draws each widget's current normal appearance onto its page and
    /// removes the widget and (unless `skip_signatures`) the `/AcroForm`
    /// entry itself. Signature-field widgets are always left alone when
    /// `skip_signatures` is set.
    pub fn flatten(&mut self, registry: &mut Registry, catalog: ObjectId, skip_signatures: bool) -> PdfResult<()> {
        let mut remaining_signature_refs = Vec::new();
        for node in &self.fields {
            let is_signature = matches!(node.kind, FieldKind::Signature);
            if is_signature && skip_signatures {
                remaining_signature_refs.push(node.id);
                continue;
            }
            for widget in &node.widgets {
                appearance::flatten_widget(registry, widget.id)?;
            }
        }

        if remaining_signature_refs.is_empty() {
            if let Some(Object::Dictionary(catalog_dict)) = registry.get_mut(catalog) {
                catalog_dict.remove("AcroForm");
            }
        } else if let Some(Object::Dictionary(acro)) = registry.get_mut(self.acroform_id) {
            acro.set("Fields", Object::Array(remaining_signature_refs.into_iter().map(Object::Reference).collect()));
        }
        Ok(())
    }

    /// Regenerates the normal appearance stream for every field marked dirty
    /// since load or the last call to this method.
    pub fn regenerate_appearances(&mut self, registry: &mut Registry) -> PdfResult<()> {
        for node in &mut self.fields {
            if !node.appearance_dirty {
                continue;
            }
            appearance::rebuild_appearances(registry, node)?;
            node.appearance_dirty = false;
        }
        Ok(())
    }
}

fn has_partial_name(registry: &Registry, id: ObjectId) -> bool {
    registry.get(id).and_then(Object::as_dict).and_then(|d| d.get("T")).is_some()
}

fn inherited_i64(registry: &Registry, mut id: ObjectId, key: &str) -> Option<i64> {
    let mut guard = 0;
    loop {
        guard += 1;
        if guard > 64 {
            return None;
        }
        let dict = registry.get(id).and_then(Object::as_dict)?;
        if let Some(v) = dict.get(key).and_then(Object::as_integer) {
            return Some(v);
        }
        id = dict.get("Parent").and_then(Object::as_reference)?;
    }
}

fn radio_options_from_widgets(registry: &Registry, widgets: &[ObjectId]) -> Vec<String> {
    let mut options = Vec::new();
    for &w in widgets {
        let Some(dict) = registry.get(w).and_then(Object::as_dict) else { continue };
        let Some(ap) = dict.get("AP").and_then(Object::as_dict) else { continue };
        let Some(n) = ap.get("N").and_then(Object::as_dict) else { continue };
        for (key, _) in n.iter() {
            if key.as_slice() != b"Off" {
                let label = String::from_utf8_lossy(key).into_owned();
                if !options.contains(&label) {
                    options.push(label);
                }
            }
        }
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, Stream};

    fn dict(pairs: &[(&str, Object)]) -> Dictionary {
        let mut d = Dictionary::new();
        for (k, v) in pairs {
            d.set(*k, v.clone());
        }
        d
    }

    fn text_string(s: &str) -> Object {
        Object::String(PdfString::literal(s.to_string()))
    }

    fn build_basic_form(registry: &mut Registry) -> ObjectId {
        let text_field = registry.register(Object::Dictionary(dict(&[
            ("FT", "Tx".into()),
            ("T", text_string("name")),
            ("V", text_string("Ada")),
            ("Rect", Object::Array(vec![0.into(), 0.into(), 100.into(), 20.into()])),
        ])));
        let checkbox = registry.register(Object::Dictionary(dict(&[
            ("FT", "Btn".into()),
            ("T", text_string("agree")),
            ("V", Object::Name("Off".into())),
            ("AP", Object::Dictionary(dict(&[(
                "N",
                Object::Dictionary(dict(&[
                    ("Yes", Object::Stream(Stream::new(Dictionary::new(), vec![]))),
                    ("Off", Object::Stream(Stream::new(Dictionary::new(), vec![]))),
                ])),
            )]))),
        ])));
        let acroform = registry.register(Object::Dictionary(dict(&[(
            "Fields",
            Object::Array(vec![Object::Reference(text_field), Object::Reference(checkbox)]),
        )])));
        registry.register(Object::Dictionary(dict(&[("Type", "Catalog".into()), ("AcroForm", Object::Reference(acroform))])))
    }

    #[test]
    fn loads_text_and_checkbox_fields_by_fully_qualified_name() {
        let mut registry = Registry::new();
        let catalog = build_basic_form(&mut registry);
        let form = Form::load(&mut registry, catalog).unwrap();
        assert!(form.field("name").is_some());
        assert!(form.field("agree").is_some());
        assert!(matches!(form.field("name").unwrap().kind, FieldKind::Text { .. }));
        assert!(matches!(form.field("agree").unwrap().kind, FieldKind::Checkbox { .. }));
    }

    #[test]
    fn get_value_reads_the_current_v_entry() {
        let mut registry = Registry::new();
        let catalog = build_basic_form(&mut registry);
        let form = Form::load(&mut registry, catalog).unwrap();
        assert_eq!(form.field("name").unwrap().get_value(&registry), FieldValue::Text("Ada".into()));
    }

    #[test]
    fn fill_aborts_the_whole_batch_on_a_type_mismatch() {
        let mut registry = Registry::new();
        let catalog = build_basic_form(&mut registry);
        let mut form = Form::load(&mut registry, catalog).unwrap();
        let mut values = IndexMap::new();
        values.insert("name".to_string(), FieldValue::Text("Bob".into()));
        values.insert("agree".to_string(), FieldValue::Text("nope".into()));
        let err = form.fill(&mut registry, &values).unwrap_err();
        assert!(matches!(err, PdfError::TypeMismatch { .. }));
        assert_eq!(form.field("name").unwrap().get_value(&registry), FieldValue::Text("Ada".into()));
    }

    #[test]
    fn fill_skips_unknown_field_names_with_a_warning() {
        let mut registry = Registry::new();
        let catalog = build_basic_form(&mut registry);
        let mut form = Form::load(&mut registry, catalog).unwrap();
        let mut values = IndexMap::new();
        values.insert("nonexistent".to_string(), FieldValue::Text("x".into()));
        form.fill(&mut registry, &values).unwrap();
        assert_eq!(registry.warnings().len(), 1);
    }

    #[test]
    fn fill_skips_a_non_terminal_branch_name_with_a_distinct_warning() {
        let mut registry = Registry::new();
        let leaf = registry.register(Object::Dictionary(dict(&[
            ("FT", "Tx".into()),
            ("T", text_string("first")),
            ("V", text_string("x")),
        ])));
        let branch = registry.register(Object::Dictionary(dict(&[
            ("T", text_string("address")),
            ("Kids", Object::Array(vec![Object::Reference(leaf)])),
        ])));
        let acroform = registry
            .register(Object::Dictionary(dict(&[("Fields", Object::Array(vec![Object::Reference(branch)]))])));
        let catalog = registry.register(Object::Dictionary(dict(&[
            ("Type", "Catalog".into()),
            ("AcroForm", Object::Reference(acroform)),
        ])));
        let mut form = Form::load(&mut registry, catalog).unwrap();
        assert!(form.field("address").is_none());
        assert!(form.field("address.first").is_some());

        let mut values = IndexMap::new();
        values.insert("address".to_string(), FieldValue::Text("nope".into()));
        form.fill(&mut registry, &values).unwrap();
        assert_eq!(registry.warnings().len(), 1);
        assert!(registry.warnings()[0].contains("not a terminal field"));
    }

    #[test]
    fn checkbox_set_value_updates_v_and_every_widget_as() {
        let mut registry = Registry::new();
        let catalog = build_basic_form(&mut registry);
        let mut form = Form::load(&mut registry, catalog).unwrap();
        form.field_mut("agree").unwrap().set_value(&mut registry, FieldValue::Bool(true)).unwrap();
        assert_eq!(form.field("agree").unwrap().get_value(&registry), FieldValue::Single("Yes".into()));
    }
}
