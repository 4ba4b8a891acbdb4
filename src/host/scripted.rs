// Test double: a document whose loads and font metrics are driven by the test.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::oneshot;

use super::{Dimensions, Document, Element, ElementId, LoadSignal, Parent};

pub const SANS_SERIF_BOX: Dimensions = Dimensions {
    width: 100.0,
    height: 20.0,
};
pub const SERIF_BOX: Dimensions = Dimensions {
    width: 90.0,
    height: 20.0,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Succeed,
    Fail,
    Hold,
}

#[derive(Default)]
struct State {
    next_id: u64,
    nodes: BTreeMap<ElementId, (Parent, Element)>,
    outcomes: HashMap<String, Outcome>,
    held: HashMap<String, Vec<oneshot::Sender<anyhow::Result<()>>>>,
    history: Vec<String>,
    created: usize,
    fonts: HashMap<String, Dimensions>,
}

#[derive(Default)]
pub struct ScriptedDocument {
    state: Mutex<State>,
}

fn reference_of(element: &Element) -> Option<&str> {
    element
        .attribute("src")
        .or_else(|| element.attribute("href"))
}

fn ready(result: anyhow::Result<()>) -> LoadSignal {
    Box::pin(async move { result })
}

impl ScriptedDocument {
    pub fn new() -> Arc<Self> {
        Arc::new(ScriptedDocument::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_outcome(&self, reference: &str, outcome: Outcome) {
        self.state().outcomes.insert(reference.to_string(), outcome);
    }

    /// Complete every held load of `reference`.
    pub fn finish(&self, reference: &str, succeed: bool) {
        let held = self.state().held.remove(reference).unwrap_or_default();
        for sender in held {
            let result = if succeed {
                Ok(())
            } else {
                Err(anyhow::anyhow!("network error for {reference}"))
            };
            let _ = sender.send(result);
        }
    }

    /// How many elements were ever appended for `reference`.
    pub fn appends(&self, reference: &str) -> usize {
        self.state()
            .history
            .iter()
            .filter(|seen| seen.as_str() == reference)
            .count()
    }

    pub fn present(&self, reference: &str) -> bool {
        self.state()
            .nodes
            .values()
            .any(|(_, element)| reference_of(element) == Some(reference))
    }

    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.state()
            .nodes
            .get(&id)
            .map(|(_, element)| element.clone())
    }

    /// Elements ever appended, of any kind.
    pub fn created(&self) -> usize {
        self.state().created
    }

    pub fn node_count(&self) -> usize {
        self.state().nodes.len()
    }

    pub fn make_available(&self, family: &str, size: Dimensions) {
        self.state().fonts.insert(family.to_string(), size);
    }
}

impl Document for ScriptedDocument {
    fn query(&self, tag: &str, attribute: &str, value: &str) -> bool {
        self.state()
            .nodes
            .values()
            .any(|(_, element)| element.tag == tag && element.attribute(attribute) == Some(value))
    }

    fn append(&self, parent: Parent, element: Element) -> ElementId {
        let mut state = self.state();
        state.next_id += 1;
        state.created += 1;
        let id = ElementId(state.next_id);
        state.nodes.insert(id, (parent, element));
        id
    }

    fn append_resource(&self, parent: Parent, element: Element) -> (ElementId, LoadSignal) {
        let reference = reference_of(&element).unwrap_or_default().to_string();
        let id = self.append(parent, element);

        let mut state = self.state();
        state.history.push(reference.clone());
        let outcome = state
            .outcomes
            .get(&reference)
            .copied()
            .unwrap_or(Outcome::Succeed);

        let signal: LoadSignal = match outcome {
            Outcome::Succeed => ready(Ok(())),
            Outcome::Fail => ready(Err(anyhow::anyhow!("404 for {reference}"))),
            Outcome::Hold => {
                let (send, recv) = oneshot::channel();
                state.held.entry(reference).or_default().push(send);
                Box::pin(async move {
                    recv.await
                        .unwrap_or_else(|_| Err(anyhow::anyhow!("load dropped")))
                })
            }
        };

        (id, signal)
    }

    fn remove(&self, id: ElementId) {
        let mut state = self.state();
        let mut doomed = vec![id];
        let mut idx = 0;
        while idx < doomed.len() {
            let current = doomed[idx];
            doomed.extend(
                state
                    .nodes
                    .iter()
                    .filter(|(_, (parent, _))| *parent == Parent::Element(current))
                    .map(|(child, _)| *child),
            );
            idx += 1;
        }
        for node in doomed {
            state.nodes.remove(&node);
        }
    }

    fn set_attribute(&self, id: ElementId, name: &str, value: &str) {
        if let Some((_, element)) = self.state().nodes.get_mut(&id) {
            element
                .attributes
                .insert(name.to_string(), value.to_string());
        }
    }

    fn set_style(&self, id: ElementId, property: &str, value: &str) {
        if let Some((_, element)) = self.state().nodes.get_mut(&id) {
            if value.is_empty() {
                element.style.remove(property);
            } else {
                element.style.insert(property.to_string(), value.to_string());
            }
        }
    }

    fn clear_style(&self, id: ElementId) {
        if let Some((_, element)) = self.state().nodes.get_mut(&id) {
            element.style.clear();
        }
    }

    fn set_text(&self, id: ElementId, text: &str) {
        if let Some((_, element)) = self.state().nodes.get_mut(&id) {
            element.text = text.to_string();
        }
    }

    /// Width is the box of the first known family, scaled by text length
    /// relative to ten characters.
    fn measure(&self, id: ElementId) -> Dimensions {
        let state = self.state();
        let Some((_, element)) = state.nodes.get(&id) else {
            return Dimensions::ZERO;
        };
        if element.style.get("display").map(String::as_str) == Some("none") {
            return Dimensions::ZERO;
        }

        let families = element
            .style
            .get("font-family")
            .map(String::as_str)
            .unwrap_or("serif");

        let base = families
            .split(',')
            .map(str::trim)
            .find_map(|family| match family {
                "sans-serif" => Some(SANS_SERIF_BOX),
                "serif" => Some(SERIF_BOX),
                other => state.fonts.get(other).copied(),
            })
            .unwrap_or(SERIF_BOX);

        let scale = element.text.chars().count() as f64 / 10.0;
        Dimensions {
            width: base.width * scale,
            height: base.height,
        }
    }
}
