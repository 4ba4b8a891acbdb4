// The environment the loaders run against: a document that can be probed
// for existing elements, grown with new ones, and asked for layout boxes.

mod fetch;
mod headless;
mod metrics;

#[cfg(test)]
pub(crate) mod scripted;

use std::{collections::BTreeMap, future::Future, pin::Pin};

pub use fetch::{Fetcher, ResourcePath};
pub use headless::HeadlessDocument;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Single-shot completion of an element that materializes asynchronously
/// (a script being fetched, a stylesheet being parsed, ...).
pub type LoadSignal = BoxFuture<anyhow::Result<()>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub(crate) u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    Head,
    Body,
    Element(ElementId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    pub const ZERO: Dimensions = Dimensions {
        width: 0.0,
        height: 0.0,
    };

    /// Whether either side moved by more than `tolerance` pixels.
    pub fn differs_from(&self, other: &Dimensions, tolerance: f64) -> bool {
        (self.width - other.width).abs() > tolerance
            || (self.height - other.height).abs() > tolerance
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub style: BTreeMap<String, String>,
    pub text: String,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Element {
            tag: tag.to_string(),
            ..Element::default()
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.style.insert(property.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

pub trait Document: Send + Sync + 'static {
    /// Whether an element `tag` whose `attribute` equals `value` is present.
    fn query(&self, tag: &str, attribute: &str, value: &str) -> bool;

    fn append(&self, parent: Parent, element: Element) -> ElementId;

    /// Append an element whose content has to be fetched. The returned
    /// signal completes once, when the element has loaded or failed.
    fn append_resource(&self, parent: Parent, element: Element) -> (ElementId, LoadSignal);

    /// Detach an element together with its descendants.
    fn remove(&self, id: ElementId);

    fn set_attribute(&self, id: ElementId, name: &str, value: &str);

    /// An empty `value` clears the property.
    fn set_style(&self, id: ElementId, property: &str, value: &str);

    fn clear_style(&self, id: ElementId);

    fn set_text(&self, id: ElementId, text: &str);

    /// Layout box of a rendered element, zero when it is not rendered.
    fn measure(&self, id: ElementId) -> Dimensions;
}
