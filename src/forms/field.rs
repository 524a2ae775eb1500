//! Typed field variants and their read/write contract (§4.7).

use super::flags::{self, *};
use crate::errors::{PdfError, PdfResult};
use crate::object::registry::Registry;
use crate::object::{Dictionary, Object, ObjectId, PdfString};

/// A widget annotation: one of a terminal field's visual anchors on a page.
#[derive(Debug, Clone)]
pub struct Widget {
    pub id: ObjectId,
}

#[derive(Debug, Clone)]
pub enum FieldKind {
    Text { max_len: Option<i64>, multiline: bool, comb: bool },
    Checkbox { on_value: String },
    Radio { options: Vec<String> },
    Dropdown { options: Vec<String>, editable: bool },
    ListBox { options: Vec<String>, multi_select: bool },
    Signature,
}

impl FieldKind {
    fn type_name(&self) -> &'static str {
        match self {
            FieldKind::Text { .. } => "text",
            FieldKind::Checkbox { .. } => "checkbox",
            FieldKind::Radio { .. } => "radio",
            FieldKind::Dropdown { .. } => "dropdown",
            FieldKind::ListBox { .. } => "listbox",
            FieldKind::Signature => "signature",
        }
    }

    pub(super) fn classify(ft: &str, ff: i64, options: Vec<String>, on_value: String) -> FieldKind {
        match ft {
            "Btn" if flags::has(ff, BTN_RADIO) => FieldKind::Radio { options },
            "Btn" => FieldKind::Checkbox { on_value },
            "Ch" if flags::has(ff, CH_COMBO) => {
                FieldKind::Dropdown { options, editable: flags::has(ff, CH_EDIT) }
            }
            "Ch" => FieldKind::ListBox { options, multi_select: flags::has(ff, CH_MULTI_SELECT) },
            "Sig" => FieldKind::Signature,
            _ /* "Tx" and anything unrecognized */ => FieldKind::Text {
                max_len: None,
                multiline: flags::has(ff, TX_MULTILINE),
                comb: flags::has(ff, TX_COMB),
            },
        }
    }
}

/// The value a caller reads from or writes to a field, independent of its
/// on-disk `/V` representation.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Bool(bool),
    Single(String),
    Multi(Vec<String>),
    None,
}

#[derive(Debug, Clone)]
pub struct FieldNode {
    pub id: ObjectId,
    pub name: String,
    pub kind: FieldKind,
    pub widgets: Vec<Widget>,
    pub appearance_dirty: bool,
}

impl FieldNode {
    pub fn get_value(&self, registry: &Registry) -> FieldValue {
        let dict = match registry.get(self.id).and_then(Object::as_dict) {
            Some(d) => d,
            None => return FieldValue::None,
        };
        match &self.kind {
            FieldKind::Text { .. } => match dict.get("V") {
                Some(Object::String(s)) => FieldValue::Text(s.as_utf8_lossy().into_owned()),
                _ => FieldValue::None,
            },
            FieldKind::Checkbox { .. } => match dict.get("V") {
                Some(Object::Name(n)) => FieldValue::Single(n.as_str().into_owned()),
                _ => FieldValue::Single("Off".to_string()),
            },
            FieldKind::Radio { .. } => match dict.get("V") {
                Some(Object::Name(n)) if n.as_bytes() != b"Off" => {
                    FieldValue::Single(n.as_str().into_owned())
                }
                _ => FieldValue::None,
            },
            FieldKind::Dropdown { .. } => match dict.get("V") {
                Some(Object::String(s)) => FieldValue::Single(s.as_utf8_lossy().into_owned()),
                Some(Object::Name(n)) => FieldValue::Single(n.as_str().into_owned()),
                _ => FieldValue::None,
            },
            FieldKind::ListBox { .. } => match dict.get("V") {
                Some(Object::String(s)) => FieldValue::Multi(vec![s.as_utf8_lossy().into_owned()]),
                Some(Object::Array(items)) => FieldValue::Multi(
                    items
                        .iter()
                        .filter_map(|o| o.as_string())
                        .map(|s| s.as_utf8_lossy().into_owned())
                        .collect(),
                ),
                _ => FieldValue::Multi(Vec::new()),
            },
            FieldKind::Signature => FieldValue::None,
        }
    }

    /// Checks that `value` has the shape this field's variant expects,
    /// without mutating anything. Used both standalone and as the first pass
    /// of a batch [`super::Form::fill`].
    pub fn validate(&self, value: &FieldValue) -> PdfResult<()> {
        let expected = match (&self.kind, value) {
            (FieldKind::Text { .. }, FieldValue::Text(_)) => return Ok(()),
            (FieldKind::Checkbox { .. }, FieldValue::Bool(_)) => return Ok(()),
            (FieldKind::Radio { options }, FieldValue::Single(v)) => {
                if options.iter().any(|o| o == v) {
                    return Ok(());
                }
                return Err(PdfError::InvalidFieldOption { field: self.name.clone(), value: v.clone() });
            }
            (FieldKind::Dropdown { options, editable }, FieldValue::Single(v)) => {
                if *editable || options.iter().any(|o| o == v) {
                    return Ok(());
                }
                return Err(PdfError::InvalidFieldOption { field: self.name.clone(), value: v.clone() });
            }
            (FieldKind::ListBox { options, .. }, FieldValue::Multi(vs)) => {
                for v in vs {
                    if !options.iter().any(|o| o == v) {
                        return Err(PdfError::InvalidFieldOption {
                            field: self.name.clone(),
                            value: v.clone(),
                        });
                    }
                }
                return Ok(());
            }
            (FieldKind::Text { .. }, _) => "text",
            (FieldKind::Checkbox { .. }, _) => "boolean",
            (FieldKind::Radio { .. }, _) | (FieldKind::Dropdown { .. }, _) => "string",
            (FieldKind::ListBox { .. }, _) => "string array",
            (FieldKind::Signature, _) => {
                return Err(PdfError::Unsupported("signature fields are read-only".to_string()))
            }
        };
        Err(PdfError::TypeMismatch { field: self.name.clone(), expected, actual: value_kind(value) })
    }

    pub fn set_value(&mut self, registry: &mut Registry, value: FieldValue) -> PdfResult<()> {
        self.validate(&value)?;
        match (&self.kind, value) {
            (FieldKind::Text { max_len, .. }, FieldValue::Text(mut text)) => {
                if let Some(max) = max_len {
                    if text.chars().count() as i64 > *max {
                        text = text.chars().take(*max as usize).collect();
                    }
                }
                self.with_dict_mut(registry, |d| d.set("V", Object::String(PdfString::literal(text))));
            }
            (FieldKind::Checkbox { on_value }, FieldValue::Bool(on)) => {
                let state = if on { on_value.clone() } else { "Off".to_string() };
                self.with_dict_mut(registry, |d| d.set("V", Object::Name(state.as_str().into())));
                let widgets = self.widgets.clone();
                for w in &widgets {
                    set_widget_as(registry, w.id, &state);
                }
            }
            (FieldKind::Radio { .. }, FieldValue::Single(chosen)) => {
                self.with_dict_mut(registry, |d| d.set("V", Object::Name(chosen.as_str().into())));
                let widgets = self.widgets.clone();
                for w in &widgets {
                    let on_value = widget_on_value(registry, w.id);
                    let state = if on_value.as_deref() == Some(chosen.as_str()) {
                        chosen.clone()
                    } else {
                        "Off".to_string()
                    };
                    set_widget_as(registry, w.id, &state);
                }
            }
            (FieldKind::Dropdown { .. }, FieldValue::Single(chosen)) => {
                self.with_dict_mut(registry, |d| d.set("V", Object::String(PdfString::literal(chosen))));
            }
            (FieldKind::ListBox { .. }, FieldValue::Multi(chosen)) => {
                let (value_obj, indices) = self.listbox_value(&chosen);
                self.with_dict_mut(registry, |d| {
                    d.set("V", value_obj.clone());
                    d.set("I", Object::Array(indices.iter().map(|&i| Object::Integer(i)).collect()));
                });
            }
            (FieldKind::Signature, _) => {
                return Err(PdfError::Unsupported("signature fields are read-only".to_string()))
            }
            _ => unreachable!("validate() already rejected mismatched shapes"),
        }
        self.appearance_dirty = true;
        Ok(())
    }

    fn listbox_value(&self, chosen: &[String]) -> (Object, Vec<i64>) {
        let options = match &self.kind {
            FieldKind::ListBox { options, .. } => options,
            _ => unreachable!(),
        };
        let mut indices: Vec<i64> = chosen
            .iter()
            .filter_map(|c| options.iter().position(|o| o == c).map(|i| i as i64))
            .collect();
        indices.sort_unstable();
        let value = if chosen.len() == 1 {
            Object::String(PdfString::literal(chosen[0].clone()))
        } else {
            Object::Array(chosen.iter().map(|s| Object::String(PdfString::literal(s.clone()))).collect())
        };
        (value, indices)
    }

    fn with_dict_mut(&self, registry: &mut Registry, f: impl FnOnce(&mut Dictionary)) {
        if let Some(Object::Dictionary(d)) = registry.get_mut(self.id) {
            f(d);
        }
    }
}

pub(super) fn widget_on_value(registry: &Registry, widget: ObjectId) -> Option<String> {
    let dict = registry.get(widget).and_then(Object::as_dict)?;
    let ap = dict.get("AP").and_then(Object::as_dict)?;
    let n = ap.get("N").and_then(Object::as_dict)?;
    n.iter().map(|(k, _)| k).find(|k| k.as_slice() != b"Off").map(|k| String::from_utf8_lossy(k).into_owned())
}

fn set_widget_as(registry: &mut Registry, widget: ObjectId, state: &str) {
    if let Some(Object::Dictionary(d)) = registry.get_mut(widget) {
        d.set("AS", Object::Name(state.into()));
    }
}

fn value_kind(value: &FieldValue) -> &'static str {
    match value {
        FieldValue::Text(_) => "text",
        FieldValue::Bool(_) => "boolean",
        FieldValue::Single(_) => "string",
        FieldValue::Multi(_) => "string array",
        FieldValue::None => "none",
    }
}

pub(super) fn opt_label(object: &Object) -> Option<String> {
    match object {
        Object::String(s) => Some(s.as_utf8_lossy().into_owned()),
        Object::Name(n) => Some(n.as_str().into_owned()),
        Object::Array(items) => items.last().and_then(opt_label),
        _ => None,
    }
}

#[allow(dead_code)]
pub fn type_name_of(kind: &FieldKind) -> &'static str {
    kind.type_name()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_checkbox_vs_radio_by_flag_bit_16() {
        let plain = FieldKind::classify("Btn", 0, vec![], "Yes".into());
        assert!(matches!(plain, FieldKind::Checkbox { .. }));
        let radio = FieldKind::classify("Btn", BTN_RADIO, vec!["A".into(), "B".into()], String::new());
        assert!(matches!(radio, FieldKind::Radio { .. }));
    }

    #[test]
    fn classifies_dropdown_vs_listbox_by_flag_bit_18() {
        let listbox = FieldKind::classify("Ch", 0, vec![], String::new());
        assert!(matches!(listbox, FieldKind::ListBox { .. }));
        let dropdown = FieldKind::classify("Ch", CH_COMBO, vec![], String::new());
        assert!(matches!(dropdown, FieldKind::Dropdown { .. }));
    }

    #[test]
    fn radio_rejects_a_value_outside_its_options() {
        let node = FieldNode {
            id: (1, 0),
            name: "choice".into(),
            kind: FieldKind::Radio { options: vec!["A".into(), "B".into()] },
            widgets: vec![],
            appearance_dirty: false,
        };
        let err = node.validate(&FieldValue::Single("C".into())).unwrap_err();
        assert!(matches!(err, PdfError::InvalidFieldOption { .. }));
    }

    #[test]
    fn text_field_rejects_a_boolean_value() {
        let node = FieldNode {
            id: (1, 0),
            name: "name".into(),
            kind: FieldKind::Text { max_len: None, multiline: false, comb: false },
            widgets: vec![],
            appearance_dirty: false,
        };
        let err = node.validate(&FieldValue::Bool(true)).unwrap_err();
        assert!(matches!(err, PdfError::TypeMismatch { .. }));
    }
}
