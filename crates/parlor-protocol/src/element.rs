//! The wire tree: a tagged element with string attributes, nested
//! children and optional text content.
//!
//! Every message on the wire is exactly one [`Element`]. The typed message
//! layer (`message.rs`) converts to and from this shape; the byte codec
//! (`codec.rs`) converts this shape to and from bytes.
//!
//! ```text
//! <sit-down table="4" seat="2"/>
//! <chat-table table="4" username="ann">good game</chat-table>
//! <game username="ann"><user .../><table ...><player .../></table></game>
//! ```

use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{DecodeError, WireValue};

/// One node of the wire tree.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    /// The tag name. For top-level elements this selects the message type.
    pub tag: String,

    /// Attribute map. Ordered so that encoding is deterministic.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,

    /// Nested elements, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,

    /// Raw text content (chat bodies, error descriptions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    /// Creates an element with no attributes, children or text.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    // -- builders -----------------------------------------------------------

    /// Sets an attribute.
    #[must_use]
    pub fn with_attr(mut self, name: &str, value: impl Display) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Sets an attribute only when `value` is present.
    #[must_use]
    pub fn with_opt_attr<V: Display>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.with_attr(name, v),
            None => self,
        }
    }

    /// Sets an enumerated attribute using its wire spelling.
    #[must_use]
    pub fn with_value<V: WireValue>(self, name: &str, value: V) -> Self {
        self.with_attr(name, value.as_str())
    }

    /// Appends a child element.
    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Appends several child elements.
    #[must_use]
    pub fn with_children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children.extend(children);
        self
    }

    /// Sets the text content.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    // -- readers ------------------------------------------------------------

    /// Returns an attribute value if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Returns an attribute value or a [`DecodeError::MissingAttribute`].
    pub fn required(&self, name: &'static str) -> Result<&str, DecodeError> {
        self.attr(name).ok_or_else(|| DecodeError::MissingAttribute {
            tag: self.tag.clone(),
            attr: name,
        })
    }

    /// Parses a numeric attribute, falling back to `sentinel` when the
    /// attribute is absent or does not parse.
    pub fn number_or<N: FromStr>(&self, name: &str, sentinel: N) -> N {
        self.attr(name)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(sentinel)
    }

    /// Like [`number_or`](Self::number_or) but the attribute must exist.
    pub fn required_number_or<N: FromStr>(
        &self,
        name: &'static str,
        sentinel: N,
    ) -> Result<N, DecodeError> {
        Ok(self.required(name)?.trim().parse().unwrap_or(sentinel))
    }

    /// Parses an optional numeric attribute; unparseable values read as
    /// `Some(sentinel)` so that "present but garbage" stays distinguishable
    /// from "absent".
    pub fn opt_number_or<N: FromStr>(&self, name: &str, sentinel: N) -> Option<N> {
        self.attr(name)
            .map(|v| v.trim().parse().unwrap_or(sentinel))
    }

    /// Parses a required enumerated attribute.
    pub fn value<V: WireValue>(&self, name: &'static str) -> Result<V, DecodeError> {
        let raw = self.required(name)?;
        V::parse(raw).ok_or_else(|| DecodeError::InvalidValue {
            tag: self.tag.clone(),
            attr: name,
            value: raw.to_string(),
        })
    }

    /// Parses an enumerated attribute, using `default` when absent.
    pub fn value_or<V: WireValue>(
        &self,
        name: &'static str,
        default: V,
    ) -> Result<V, DecodeError> {
        match self.attr(name) {
            Some(_) => self.value(name),
            None => Ok(default),
        }
    }

    /// Reads a `"true"`/`"false"` attribute; anything else is `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.attr(name) == Some("true")
    }

    /// Iterates over direct children with the given tag.
    pub fn children_named<'a>(
        &'a self,
        tag: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    /// Returns the first child with the given tag.
    pub fn child(&self, tag: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Returns the text content, or `""`.
    pub fn text_or_empty(&self) -> String {
        self.text.clone().unwrap_or_default()
    }
}
