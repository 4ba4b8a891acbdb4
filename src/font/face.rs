use std::sync::Arc;

use anyhow::Context;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::FontLoader;
use crate::host::{Document, Element, ElementId, Parent};

const FONT_FACE_TEMPLATE_NAME: &str = "font-face";

const FONT_FACE_TEMPLATE: &str = r#"
@font-face {
    font-family: "{{family}}";
    src: {{#each sources}}url("{{url}}"){{#if format}} format("{{format}}"){{/if}}{{#unless @last}},
         {{/unless}}{{/each}};
    font-weight: {{weight}};
}
"#;

const DEFAULT_WEIGHT: &str = "normal";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FontSource {
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct FontFaceData {
    pub family: String,
    #[serde(default)]
    pub sources: Vec<FontSource>,
    #[serde(default)]
    pub weight: Option<String>,
}

#[derive(Serialize)]
struct RuleContext<'a> {
    family: &'a str,
    sources: &'a [FontSource],
    weight: &'a str,
}

fn templates() -> anyhow::Result<Handlebars<'static>> {
    let mut hb = Handlebars::new();
    // CSS, not HTML
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_template_string(FONT_FACE_TEMPLATE_NAME, FONT_FACE_TEMPLATE)
        .context("Failed to register @font-face template!")?;
    Ok(hb)
}

/// One `@font-face` rule, kept in its own `<style>` element.
pub struct FontFaceItem {
    document: Arc<dyn Document>,
    templates: Arc<Handlebars<'static>>,
    element: ElementId,
    data: FontFaceData,
}

impl FontFaceItem {
    fn new(
        document: Arc<dyn Document>,
        templates: Arc<Handlebars<'static>>,
        data: FontFaceData,
    ) -> anyhow::Result<Self> {
        let element = document.append(
            Parent::Head,
            Element::new("style").attr("type", "text/css"),
        );

        let item = FontFaceItem {
            document,
            templates,
            element,
            data,
        };

        if let Err(err) = item.update() {
            item.document.remove(item.element);
            return Err(err);
        }
        Ok(item)
    }

    pub fn family(&self) -> &str {
        &self.data.family
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn set_family(&mut self, family: &str) -> anyhow::Result<()> {
        if self.data.family == family {
            return Ok(());
        }
        self.data.family = family.to_string();
        self.update()
    }

    pub fn set_sources(&mut self, sources: Vec<FontSource>) -> anyhow::Result<()> {
        if self.data.sources == sources {
            return Ok(());
        }
        self.data.sources = sources;
        self.update()
    }

    pub fn set_weight(&mut self, weight: &str) -> anyhow::Result<()> {
        if self.data.weight.as_deref() == Some(weight) {
            return Ok(());
        }
        self.data.weight = Some(weight.to_string());
        self.update()
    }

    fn render(&self) -> anyhow::Result<String> {
        let FontFaceData {
            family,
            sources,
            weight,
        } = &self.data;

        if family.is_empty() || sources.is_empty() {
            return Ok(String::new());
        }

        let context = RuleContext {
            family,
            sources,
            weight: weight.as_deref().unwrap_or(DEFAULT_WEIGHT),
        };

        self.templates
            .render(FONT_FACE_TEMPLATE_NAME, &context)
            .context(format!("Failed to render @font-face for `{}`", family))
    }

    fn update(&self) -> anyhow::Result<()> {
        let css = self.render()?;
        self.document.set_text(self.element, &css);
        Ok(())
    }

    pub fn destroy(self) {
        self.document.set_text(self.element, "");
        self.document.remove(self.element);
    }
}

/// Owns a set of `@font-face` rules and waits for their families.
pub struct FontFaceManager {
    document: Arc<dyn Document>,
    templates: Arc<Handlebars<'static>>,
    loader: FontLoader,
    faces: Vec<FontFaceItem>,
}

impl FontFaceManager {
    pub fn new(document: Arc<dyn Document>, loader: FontLoader) -> anyhow::Result<Self> {
        Ok(FontFaceManager {
            document,
            templates: Arc::new(templates()?),
            loader,
            faces: vec![],
        })
    }

    pub fn faces(&self) -> &[FontFaceItem] {
        &self.faces
    }

    /// Distinct families, in the order they were first declared.
    pub fn families(&self) -> Vec<String> {
        let mut families: Vec<String> = vec![];
        for face in &self.faces {
            if !families.iter().any(|seen| seen == face.family()) {
                families.push(face.family().to_string());
            }
        }
        families
    }

    /// Wait for every declared family. Fonts that never show up are logged
    /// and otherwise ignored.
    pub async fn load_fonts(&self) {
        let families = self.families();
        if families.is_empty() {
            return;
        }

        match self.loader.load_fonts(&families).await {
            Ok(()) => info!("Fonts ready: {}", families.join(", ")),
            Err(err) => warn!("Continuing without all fonts: {}", err),
        }
    }

    /// Replace every rule with `faces` without waiting for the families.
    pub fn declare(&mut self, faces: Vec<FontFaceData>) -> anyhow::Result<()> {
        self.clear();
        for data in faces {
            let item = FontFaceItem::new(
                Arc::clone(&self.document),
                Arc::clone(&self.templates),
                data,
            )?;
            self.faces.push(item);
        }
        Ok(())
    }

    pub async fn reset(&mut self, faces: Vec<FontFaceData>) -> anyhow::Result<()> {
        self.declare(faces)?;
        self.load_fonts().await;
        Ok(())
    }

    pub fn clear(&mut self) {
        for face in self.faces.drain(..) {
            face.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FontOptions,
        host::{scripted::ScriptedDocument, Dimensions},
    };

    fn fira() -> FontFaceData {
        FontFaceData {
            family: "Fira Sans".to_string(),
            sources: vec![
                FontSource {
                    url: "fonts/fira.woff2".to_string(),
                    format: Some("woff2".to_string()),
                },
                FontSource {
                    url: "fonts/fira.ttf".to_string(),
                    format: None,
                },
            ],
            weight: None,
        }
    }

    fn manager(document: &Arc<ScriptedDocument>) -> FontFaceManager {
        let loader = FontLoader::new(document.clone(), FontOptions::default());
        FontFaceManager::new(document.clone(), loader).unwrap()
    }

    fn sheet(document: &ScriptedDocument, item: &FontFaceItem) -> String {
        document.element(item.element()).unwrap().text
    }

    #[tokio::test]
    async fn renders_font_face_rules() {
        let document = ScriptedDocument::new();
        let mut manager = manager(&document);
        document.make_available(
            "Fira Sans",
            Dimensions {
                width: 80.0,
                height: 22.0,
            },
        );

        manager.reset(vec![fira()]).await.unwrap();

        let expected = r#"
@font-face {
    font-family: "Fira Sans";
    src: url("fonts/fira.woff2") format("woff2"),
         url("fonts/fira.ttf");
    font-weight: normal;
}
"#;
        assert_eq!(sheet(&document, &manager.faces()[0]), expected);
        assert_eq!(
            document.element(manager.faces()[0].element()).unwrap().attribute("type"),
            Some("text/css")
        );
    }

    #[tokio::test]
    async fn updates_only_on_change() {
        let document = ScriptedDocument::new();
        let templates = Arc::new(templates().unwrap());
        let mut item = FontFaceItem::new(document.clone(), templates, fira()).unwrap();

        // bypass the item to see whether it rewrites the sheet
        document.set_text(item.element(), "stale");
        item.set_family("Fira Sans").unwrap();
        item.set_sources(fira().sources).unwrap();
        assert_eq!(sheet(&document, &item), "stale");

        item.set_weight("bold").unwrap();
        assert!(sheet(&document, &item).contains("font-weight: bold;"));

        item.set_sources(vec![]).unwrap();
        assert_eq!(sheet(&document, &item), "");

        let element = item.element();
        item.destroy();
        assert!(document.element(element).is_none());
    }

    #[tokio::test]
    async fn families_are_distinct_and_ordered() {
        let document = ScriptedDocument::new();
        let templates = Arc::new(templates().unwrap());
        let mut manager = manager(&document);

        let bold = FontFaceData {
            weight: Some("bold".to_string()),
            ..fira()
        };
        let mono = FontFaceData {
            family: "Mono".to_string(),
            ..fira()
        };
        for data in [fira(), mono, bold] {
            let item = FontFaceItem::new(document.clone(), Arc::clone(&templates), data).unwrap();
            manager.faces.push(item);
        }

        assert_eq!(manager.families(), vec!["Fira Sans", "Mono"]);

        manager.clear();
        assert!(manager.families().is_empty());
        assert_eq!(document.node_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_fonts_do_not_fail_a_reset() {
        let document = ScriptedDocument::new();
        let mut manager = manager(&document);

        manager.reset(vec![fira()]).await.unwrap();
        assert_eq!(manager.faces().len(), 1);

        manager.reset(vec![]).await.unwrap();
        assert!(manager.faces().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn declared_faces_are_checked_once_by_a_strict_load() {
        let document = ScriptedDocument::new();
        let loader = FontLoader::new(document.clone(), FontOptions::default());
        let mut manager = FontFaceManager::new(document.clone(), loader.clone()).unwrap();
        let start = tokio::time::Instant::now();

        manager.declare(vec![fira()]).unwrap();
        assert_eq!(start.elapsed(), std::time::Duration::ZERO);
        assert_eq!(manager.faces().len(), 1);

        assert!(loader.load_fonts(manager.families()).await.is_err());
        let elapsed = start.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(5000), "{elapsed:?}");
        assert!(elapsed < std::time::Duration::from_millis(5100), "{elapsed:?}");
    }
}
