use std::sync::Arc;

use once_cell::sync::OnceCell;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::{
    config::FontOptions,
    error::{LoadError, LoadResult},
    host::{Dimensions, Document, Element, ElementId, Parent},
};

const SANS_SERIF: &str = "sans-serif";
const SERIF: &str = "serif";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }
}

/// Removes the probe nodes however the check ends.
struct ProbeGuard {
    document: Arc<dyn Document>,
    id: ElementId,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.document.remove(self.id);
    }
}

/// Tells when a web font starts to affect layout, by comparing probe text in
/// the font against the same text in the generic fallbacks.
pub struct FontChecker {
    document: Arc<dyn Document>,
    options: FontOptions,
    container: OnceCell<ElementId>,
}

impl FontChecker {
    pub fn new(document: Arc<dyn Document>, options: FontOptions) -> Self {
        FontChecker {
            document,
            options,
            container: OnceCell::new(),
        }
    }

    fn container(&self) -> ElementId {
        *self.container.get_or_init(|| {
            self.document.append(
                Parent::Body,
                Element::new("div")
                    .style("display", "block")
                    .style("position", "absolute")
                    .style("top", "-99999px")
                    .style("left", "-99999px"),
            )
        })
    }

    fn probe(&self, family: &str, weight: FontWeight) -> Element {
        // https://github.com/typekit/webfontloader/blob/master/src/core/fontruler.js
        Element::new("div")
            .attr("aria-hidden", "true")
            .text(&self.options.probe_text)
            .style("display", "block")
            .style("position", "absolute")
            .style("top", "-999px")
            .style("left", "-999px")
            .style("font-size", &format!("{}px", self.options.size_px))
            .style("width", "auto")
            .style("height", "auto")
            .style("line-height", "normal")
            .style("margin", "0")
            .style("padding", "0")
            .style("font-variant", "normal")
            .style("white-space", "nowrap")
            .style("font-weight", weight.as_str())
            .style("font-style", "normal")
            .style("font-family", family)
    }

    /// Resolve once `family` renders differently from both fallbacks, fail
    /// with [`LoadError::FontTimeout`] when the deadline passes first.
    pub async fn check(&self, family: &str, weight: FontWeight) -> LoadResult {
        let document = &self.document;
        let timeout = self.options.timeout();
        let deadline = Instant::now() + timeout;

        let wrapper = document.append(Parent::Element(self.container()), Element::new("div"));
        let _guard = ProbeGuard {
            document: Arc::clone(document),
            id: wrapper,
        };

        let sans_serif = document.append(Parent::Element(wrapper), self.probe(SANS_SERIF, weight));
        let serif = document.append(Parent::Element(wrapper), self.probe(SERIF, weight));

        let baseline = (document.measure(sans_serif), document.measure(serif));

        document.set_style(sans_serif, "font-family", &format!("{family}, {SANS_SERIF}"));
        document.set_style(serif, "font-family", &format!("{family}, {SERIF}"));

        let changed = |probe: ElementId, initial: &Dimensions| {
            document
                .measure(probe)
                .differs_from(initial, self.options.tolerance)
        };

        let polling = async {
            let mut ticker = time::interval(self.options.delay());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if changed(sans_serif, &baseline.0) || changed(serif, &baseline.1) {
                    return;
                }
                trace!("Font `{}` ({}) not rendered yet", family, weight.as_str());
            }
        };

        match time::timeout_at(deadline, polling).await {
            Ok(()) => {
                debug!("Font `{}` ({}) is rendering", family, weight.as_str());
                Ok(())
            }
            Err(_) => {
                warn!("Timed out waiting for font `{}` ({})", family, weight.as_str());
                Err(LoadError::FontTimeout {
                    family: family.to_string(),
                    timeout,
                })
            }
        }
    }
}
