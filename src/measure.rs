use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use tracing::trace;

use crate::host::{Dimensions, Document, Element, ElementId, Parent};

const MEASURE_SPAN_ID: &str = "tagload-measure-string-size";

// A single wide CJK glyph approximates the full line height of a font.
const HEIGHT_PROBE: &str = "国";

const NUMBER_PATTERN: &str = r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?";

/// Leading number of `text`, `"12.5px"` gives `12.5`.
fn leading_number(text: &str) -> Option<f64> {
    static NUMBER_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(NUMBER_PATTERN).ok());

    let found = NUMBER_REGEX.as_ref()?.find(text.trim_start())?;
    found.as_str().parse().ok()
}

/// Convert a CSS length into pixels.
///
/// Percentages are taken of `size`, anything else contributes its leading
/// number. An absent or empty `value` falls back to `default`.
pub fn get_pixel(value: Option<&str>, size: f64, default: Option<&str>) -> Option<f64> {
    let value = match value.filter(|value| !value.is_empty()) {
        Some(value) => value,
        None => default.filter(|default| !default.is_empty())?,
    };

    let (sign, magnitude) = match value.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, value),
    };

    let number = leading_number(magnitude)?;
    if magnitude.contains('%') {
        Some(sign * size * number / 100.0)
    } else {
        Some(sign * number)
    }
}

/// Dictionary that forgets its oldest entry once full.
struct LimitedCache<V> {
    capacity: usize,
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> LimitedCache<V> {
    fn new(capacity: usize) -> Self {
        LimitedCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: String, value: V) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Measures strings by rendering them into a hidden, reusable span.
pub struct TextMeasurer {
    document: Arc<dyn Document>,
    span: OnceCell<ElementId>,
    cache: Mutex<LimitedCache<Dimensions>>,
}

impl TextMeasurer {
    pub fn new(document: Arc<dyn Document>, cache_capacity: usize) -> Self {
        TextMeasurer {
            document,
            span: OnceCell::new(),
            cache: Mutex::new(LimitedCache::new(cache_capacity)),
        }
    }

    fn span(&self) -> ElementId {
        *self.span.get_or_init(|| {
            self.document.append(
                Parent::Body,
                Element::new("span").attr("id", MEASURE_SPAN_ID),
            )
        })
    }

    pub fn measure(
        &self,
        text: &str,
        declarations: &[(&str, &str)],
        class: Option<&str>,
    ) -> Dimensions {
        if text.is_empty() {
            return Dimensions::ZERO;
        }

        let css: String = declarations
            .iter()
            .map(|(property, value)| format!("{property}:{value};"))
            .collect();
        let key = format!("{}_{}_{}", text, css, class.unwrap_or_default());

        if let Some(hit) = self.cached(&key) {
            trace!("Measure cache hit for `{}`", key);
            return hit;
        }

        let span = self.span();
        let document = &self.document;

        document.set_text(span, text);
        document.clear_style(span);
        for (property, value) in declarations {
            document.set_style(span, property, value);
        }
        document.set_style(span, "visibility", "hidden");
        document.set_style(span, "white-space", "nowrap");
        if let Some(class) = class {
            document.set_attribute(span, "class", class);
        }

        let size = document.measure(span);

        document.set_style(span, "display", "none");
        document.set_attribute(span, "class", "");

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, size);
        size
    }

    /// Rough line height for a font, cheaper to cache than full text runs.
    pub fn measure_text_height(
        &self,
        family: &str,
        size: &str,
        weight: &str,
        style: &str,
    ) -> f64 {
        self.measure(
            HEIGHT_PROBE,
            &[
                ("font-family", family),
                ("font-size", size),
                ("font-weight", weight),
                ("font-style", style),
            ],
            None,
        )
        .height
    }

    fn cached(&self, key: &str) -> Option<Dimensions> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
