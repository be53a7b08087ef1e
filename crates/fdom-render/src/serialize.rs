#![forbid(unsafe_code)]

//! Serialization of virtual-node trees (feature `serde`).
//!
//! Elements serialize as `{ "tag": .., "props": {..}, "children": [..] }`,
//! text as a JSON scalar, fragments as arrays, and empty slots as `null`.
//! Components are rendered first; a panicking component serializes as
//! `null`. Handlers and refs have no serialized form and are skipped.
//! Integral numbers serialize as integers, so `text(2)` becomes `2`.

use std::panic::{self, AssertUnwindSafe};

use fdom_reactive::panic_message;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tracing::error;

use crate::vnode::{ElementNode, Primitive, PropValue, Props, VNode};

impl Serialize for Primitive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Str(s) => serializer.serialize_str(s),
            Self::Number(n) => SerNumber(*n).serialize(serializer),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// Largest magnitude an `f64` holds without losing integer precision.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

struct SerNumber(f64);

impl Serialize for SerNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let n = self.0;
        if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
            serializer.serialize_i64(n as i64)
        } else {
            serializer.serialize_f64(n)
        }
    }
}

impl Serialize for VNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(value) => value.serialize(serializer),
            Self::Empty => serializer.serialize_none(),
            Self::Fragment(children) => {
                let mut seq = serializer.serialize_seq(Some(children.len()))?;
                for child in children.iter() {
                    seq.serialize_element(child)?;
                }
                seq.end()
            }
            Self::Element(element) => SerElement(element).serialize(serializer),
            Self::Component(component) => {
                match panic::catch_unwind(AssertUnwindSafe(|| component.render())) {
                    Ok(output) => output.serialize(serializer),
                    Err(payload) => {
                        error!(
                            component = %component.name,
                            message = %panic_message(payload.as_ref()),
                            "component panicked during serialization"
                        );
                        serializer.serialize_none()
                    }
                }
            }
        }
    }
}

struct SerElement<'a>(&'a ElementNode);

impl Serialize for SerElement<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("tag", &self.0.tag)?;
        map.serialize_entry("props", &SerProps(&self.0.props))?;
        map.serialize_entry("children", &self.0.children)?;
        map.end()
    }
}

struct SerProps<'a>(&'a Props);

impl Serialize for SerProps<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        for (key, value) in self.0 {
            match value {
                PropValue::Handler(_) | PropValue::Ref(_) => {}
                PropValue::Str(s) => map.serialize_entry(key, s)?,
                PropValue::Number(n) => map.serialize_entry(key, &SerNumber(*n))?,
                PropValue::Bool(b) => map.serialize_entry(key, b)?,
                PropValue::Map(fields) => map.serialize_entry(key, fields)?,
                PropValue::Null => map.serialize_entry(key, &())?,
            }
        }
        map.end()
    }
}

/// Convert a tree into a JSON value.
pub fn to_json(vnode: &VNode) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(vnode)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::vnode::{component, fragment, h, text};

    #[test]
    fn element_shape() {
        let tree = h("button")
            .class_name("btn")
            .on("click", |_| {})
            .style("color", "red")
            .child("Click")
            .build();
        assert_eq!(
            to_json(&tree).ok(),
            Some(json!({
                "tag": "button",
                "props": { "className": "btn", "style": { "color": "red" } },
                "children": ["Click"],
            }))
        );
    }

    #[test]
    fn components_fragments_and_empty() {
        let tree = fragment([
            component("Hi", |_, _| text("hi")).build(),
            VNode::Empty,
            text(2),
            component("Bad", |_, _| panic!("nope")).build(),
        ]);
        assert_eq!(to_json(&tree).ok(), Some(json!(["hi", null, 2, null])));
    }

    #[test]
    fn integral_numbers_serialize_as_integers() {
        let tree = h("meter")
            .prop("value", 3)
            .prop("max", 2.5)
            .child(text(-4))
            .child(text(0.5))
            .build();
        assert_eq!(
            to_json(&tree).ok(),
            Some(json!({
                "tag": "meter",
                "props": { "value": 3, "max": 2.5 },
                "children": [-4, 0.5],
            }))
        );
    }
}
