use std::{
    collections::{BTreeMap, HashMap},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::{
    fetch::{resolve_reference, Fetcher},
    metrics::{self, FaceMetrics},
    Dimensions, Document, Element, ElementId, LoadSignal, Parent,
};
use crate::measure::get_pixel;

const DEFAULT_FONT_SIZE: &str = "16px";

struct Node {
    parent: Parent,
    element: Element,
}

struct Face {
    // the <style>/<link> element that declared it
    owner: ElementId,
    metrics: FaceMetrics,
}

/// Lowercased family and whether the cut is bold.
type FaceKey = (String, bool);

#[derive(Default)]
struct Dom {
    next_id: u64,
    nodes: BTreeMap<ElementId, Node>,
    faces: HashMap<FaceKey, Face>,
}

impl Dom {
    fn insert(&mut self, parent: Parent, element: Element) -> ElementId {
        self.next_id += 1;
        let id = ElementId(self.next_id);
        self.nodes.insert(id, Node { parent, element });
        id
    }

    fn ancestors(&self, id: ElementId) -> impl Iterator<Item = &Node> + '_ {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let node = self.nodes.get(&next?)?;
            next = match node.parent {
                Parent::Element(parent) => Some(parent),
                Parent::Head | Parent::Body => None,
            };
            Some(node)
        })
    }

    fn computed(&self, id: ElementId, property: &str) -> Option<&str> {
        self.ancestors(id)
            .find_map(|node| node.element.style.get(property))
            .map(String::as_str)
    }

    /// The declared cut closest to `bold`, and whether it must be
    /// emboldened synthetically.
    fn face(&self, family: &str, bold: bool) -> Option<(&Face, bool)> {
        let family = family.to_lowercase();
        let (cut, synthetic) = pick_cut(bold, |cut| {
            self.faces.contains_key(&(family.clone(), cut))
        })?;
        self.faces
            .get(&(family, cut))
            .map(|face| (face, synthetic))
    }

    fn root_of(&self, id: ElementId) -> Option<Parent> {
        self.ancestors(id).last().map(|node| node.parent)
    }

    fn descendants_of(&self, id: ElementId) -> Vec<ElementId> {
        let mut found = vec![id];
        let mut idx = 0;
        while idx < found.len() {
            let current = found[idx];
            found.extend(
                self.nodes
                    .iter()
                    .filter(|(_, node)| node.parent == Parent::Element(current))
                    .map(|(child, _)| *child),
            );
            idx += 1;
        }
        found
    }
}

/// In-memory document. Scripts and stylesheets are fetched through a
/// [`Fetcher`], `@font-face` rules are honoured for text measurement.
#[derive(Clone)]
pub struct HeadlessDocument {
    dom: Arc<Mutex<Dom>>,
    fetcher: Fetcher,
}

impl HeadlessDocument {
    pub fn new(root: PathBuf) -> Self {
        HeadlessDocument {
            dom: Arc::new(Mutex::new(Dom::default())),
            fetcher: Fetcher::new(root),
        }
    }

    fn dom(&self) -> MutexGuard<'_, Dom> {
        self.dom.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn children(&self, parent: Parent) -> Vec<Element> {
        self.dom()
            .nodes
            .values()
            .filter(|node| node.parent == parent)
            .map(|node| node.element.clone())
            .collect()
    }

    pub fn has_face(&self, family: &str) -> bool {
        let family = family.to_lowercase();
        self.dom().faces.keys().any(|(declared, _)| *declared == family)
    }

    /// Start fetching every face declared in `css`, on behalf of `owner`.
    /// Sources are relative to `base`, the stylesheet's own reference, or to
    /// the root for inline styles.
    fn register_faces(&self, owner: ElementId, css: &str, base: Option<&str>) {
        let declared = declared_faces(css, base);
        if declared.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, ignoring {} font face(s)", declared.len());
            return;
        };

        for DeclaredFace { family, url, bold } in declared {
            let document = self.clone();
            runtime.spawn(async move {
                let metrics = document
                    .fetcher
                    .fetch(&url)
                    .await
                    .and_then(FaceMetrics::parse)
                    .context(format!("Failed to load font face `{family}` from {url}"));

                match metrics {
                    Ok(metrics) => {
                        let mut dom = document.dom();
                        // the declaring element may have gone away meanwhile
                        if dom.nodes.contains_key(&owner) {
                            info!("Font face `{}` (bold: {}) is available", family, bold);
                            dom.faces
                                .insert((family.to_lowercase(), bold), Face { owner, metrics });
                        }
                    }
                    Err(err) => warn!("{:#}", err),
                }
            });
        }
    }

    async fn materialize(
        self,
        id: ElementId,
        tag: String,
        reference: Option<String>,
    ) -> anyhow::Result<()> {
        let Some(reference) = reference else {
            anyhow::bail!("<{tag}> has nothing to load");
        };

        let bytes = self.fetcher.fetch(&reference).await?;

        if tag == "link" {
            let css = String::from_utf8_lossy(&bytes);
            self.register_faces(id, &css, Some(reference.as_str()));
        }
        Ok(())
    }

    fn drop_faces_of(dom: &mut Dom, owners: &[ElementId]) {
        dom.faces.retain(|_, face| !owners.contains(&face.owner));
    }
}

impl Document for HeadlessDocument {
    fn query(&self, tag: &str, attribute: &str, value: &str) -> bool {
        self.dom()
            .nodes
            .values()
            .any(|node| node.element.tag == tag && node.element.attribute(attribute) == Some(value))
    }

    fn append(&self, parent: Parent, element: Element) -> ElementId {
        let style_text = (element.tag == "style").then(|| element.text.clone());
        let id = self.dom().insert(parent, element);

        if let Some(css) = style_text {
            self.register_faces(id, &css, None);
        }
        id
    }

    fn append_resource(&self, parent: Parent, element: Element) -> (ElementId, LoadSignal) {
        let tag = element.tag.clone();
        let reference = match tag.as_str() {
            "script" => element.attribute("src"),
            "link" => element.attribute("href"),
            _ => None,
        }
        .map(str::to_string);

        let id = self.dom().insert(parent, element);
        debug!("Appended <{}> {:?}", tag, reference);

        let signal: LoadSignal = Box::pin(self.clone().materialize(id, tag, reference));

        (id, signal)
    }

    fn remove(&self, id: ElementId) {
        let mut dom = self.dom();
        let doomed = dom.descendants_of(id);
        for node in &doomed {
            dom.nodes.remove(node);
        }
        Self::drop_faces_of(&mut dom, &doomed);
    }

    fn set_attribute(&self, id: ElementId, name: &str, value: &str) {
        if let Some(node) = self.dom().nodes.get_mut(&id) {
            node.element
                .attributes
                .insert(name.to_string(), value.to_string());
        }
    }

    fn set_style(&self, id: ElementId, property: &str, value: &str) {
        if let Some(node) = self.dom().nodes.get_mut(&id) {
            if value.is_empty() {
                node.element.style.remove(property);
            } else {
                node.element
                    .style
                    .insert(property.to_string(), value.to_string());
            }
        }
    }

    fn clear_style(&self, id: ElementId) {
        if let Some(node) = self.dom().nodes.get_mut(&id) {
            node.element.style.clear();
        }
    }

    fn set_text(&self, id: ElementId, text: &str) {
        let is_style = {
            let mut dom = self.dom();
            let Some(node) = dom.nodes.get_mut(&id) else {
                return;
            };
            node.element.text = text.to_string();
            let is_style = node.element.tag == "style";
            if is_style {
                Self::drop_faces_of(&mut dom, &[id]);
            }
            is_style
        };

        if is_style {
            self.register_faces(id, text, None);
        }
    }

    fn measure(&self, id: ElementId) -> Dimensions {
        let dom = self.dom();

        let Some(node) = dom.nodes.get(&id) else {
            return Dimensions::ZERO;
        };
        let hidden = dom
            .ancestors(id)
            .any(|node| node.element.style.get("display").map(String::as_str) == Some("none"));
        if hidden || dom.root_of(id) != Some(Parent::Body) {
            return Dimensions::ZERO;
        }

        let size = get_pixel(dom.computed(id, "font-size"), 0.0, Some(DEFAULT_FONT_SIZE))
            .unwrap_or(16.0);
        let bold = is_bold(dom.computed(id, "font-weight"));
        let text = &node.element.text;

        for family in font_families(dom.computed(id, "font-family").unwrap_or_default()) {
            if let Some((face, synthetic)) = dom.face(&family, bold) {
                return face.metrics.measure(text, size, synthetic);
            }
            if let Some(generic) = metrics::generic(&family) {
                return generic.measure(text, size, bold);
            }
        }

        metrics::generic(metrics::DEFAULT_FAMILY)
            .map(|generic| generic.measure(text, size, bold))
            .unwrap_or_default()
    }
}

fn font_families(list: &str) -> impl Iterator<Item = String> + '_ {
    list.split(',')
        .map(|family| family.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
        .filter(|family| !family.is_empty())
}

fn pick_cut(bold: bool, declared: impl Fn(bool) -> bool) -> Option<(bool, bool)> {
    if declared(bold) {
        Some((bold, false))
    } else if declared(!bold) {
        Some((!bold, bold))
    } else {
        None
    }
}

fn is_bold(weight: Option<&str>) -> bool {
    match weight {
        Some("bold") | Some("bolder") => true,
        Some(numeric) => numeric.parse::<u16>().is_ok_and(|weight| weight >= 600),
        None => false,
    }
}

// @font-face { font-family: "X"; src: url("a.woff") format("woff"), ...; }
const FONT_FACE_PATTERN: &str = r"@font-face\s*\{([^}]*)\}";
const FAMILY_PATTERN: &str = r#"font-family\s*:\s*["']?([^;"']+)["']?"#;
const SRC_URL_PATTERN: &str = r#"url\(\s*["']?([^)"']+)["']?\s*\)"#;
const WEIGHT_PATTERN: &str = r"font-weight\s*:\s*([^;\s]+)";

#[derive(Debug, PartialEq)]
struct DeclaredFace {
    family: String,
    url: String,
    bold: bool,
}

fn declared_faces(css: &str, base: Option<&str>) -> Vec<DeclaredFace> {
    let mut faces = parse_font_faces(css);
    if let Some(base) = base {
        for face in &mut faces {
            face.url = resolve_reference(base, &face.url);
        }
    }
    faces
}

/// Family, first source URL and cut of each `@font-face` rule in `css`.
fn parse_font_faces(css: &str) -> Vec<DeclaredFace> {
    static FONT_FACE_REGEX: Lazy<Option<Regex>> =
        Lazy::new(|| Regex::new(FONT_FACE_PATTERN).ok());
    static FAMILY_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(FAMILY_PATTERN).ok());
    static SRC_URL_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(SRC_URL_PATTERN).ok());
    static WEIGHT_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(WEIGHT_PATTERN).ok());

    let (Some(rules), Some(family), Some(src), Some(weight)) = (
        FONT_FACE_REGEX.as_ref(),
        FAMILY_REGEX.as_ref(),
        SRC_URL_REGEX.as_ref(),
        WEIGHT_REGEX.as_ref(),
    ) else {
        return vec![];
    };

    rules
        .captures_iter(css)
        .filter_map(|rule| {
            let body = rule.get(1)?.as_str();
            let name = family.captures(body)?.get(1)?.as_str().trim().to_string();
            let url = src.captures(body)?.get(1)?.as_str().trim().to_string();
            let bold = is_bold(
                weight
                    .captures(body)
                    .and_then(|cut| cut.get(1))
                    .map(|cut| cut.as_str()),
            );
            Some(DeclaredFace {
                family: name,
                url,
                bold,
            })
        })
        .collect()
}
