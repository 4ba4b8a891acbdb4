pub mod config;
pub mod error;
pub mod font;
pub mod host;
pub mod loader;
pub mod measure;
pub mod registry;

use std::sync::Arc;

use config::FontOptions;
use error::LoadResult;
use font::FontLoader;
use host::Document;
use loader::{ResourceLoader, Script, Stylesheet};

/// Script, stylesheet and font loaders sharing one document. Each kind keeps
/// its own registry.
#[derive(Clone)]
pub struct Loaders {
    pub scripts: ResourceLoader<Script>,
    pub styles: ResourceLoader<Stylesheet>,
    pub fonts: FontLoader,
}

impl Loaders {
    pub fn new(document: Arc<dyn Document>, font_options: FontOptions) -> Self {
        Loaders {
            scripts: ResourceLoader::new(Arc::clone(&document)),
            styles: ResourceLoader::new(Arc::clone(&document)),
            fonts: FontLoader::new(document, font_options),
        }
    }

    pub async fn load_script(&self, url: &str) -> LoadResult {
        self.scripts.load(url).await
    }

    pub async fn load_css(&self, url: &str) -> LoadResult {
        self.styles.load(url).await
    }

    pub async fn load_fonts<I, S>(&self, families: I) -> LoadResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.fonts.load_fonts(families).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::scripted::ScriptedDocument;

    #[tokio::test]
    async fn kinds_are_tracked_separately() {
        let document = ScriptedDocument::new();
        let loaders = Loaders::new(document.clone(), FontOptions::default());

        loaders.load_script("shared").await.unwrap();
        loaders.load_css("shared").await.unwrap();
        loaders.load_script("shared").await.unwrap();

        assert!(document.query("script", "src", "shared"));
        assert!(document.query("link", "href", "shared"));
        assert_eq!(document.appends("shared"), 2);
    }
}
