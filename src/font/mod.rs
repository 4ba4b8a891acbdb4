mod checker;
mod face;

use std::sync::Arc;

use tracing::info;

pub use checker::{FontChecker, FontWeight};
pub use face::{FontFaceData, FontFaceItem, FontFaceManager, FontSource};

use crate::{config::FontOptions, error::LoadResult, host::Document, registry::Registry};

/// Waits for web fonts to become usable, one check per family no matter how
/// many callers ask for it.
#[derive(Clone)]
pub struct FontLoader {
    checker: Arc<FontChecker>,
    registry: Arc<Registry>,
}

impl FontLoader {
    pub fn new(document: Arc<dyn Document>, options: FontOptions) -> Self {
        FontLoader {
            checker: Arc::new(FontChecker::new(document, options)),
            registry: Arc::new(Registry::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A family counts as loaded once both its regular and bold renderings
    /// are distinguishable from the fallbacks.
    pub async fn load(&self, family: &str) -> LoadResult {
        if family.is_empty() {
            return Ok(());
        }

        info!("Queueing font `{}`", family);

        let checker = Arc::clone(&self.checker);
        let family_ = family.to_string();
        self.registry
            .coalesce(family, move || async move {
                futures::future::try_join(
                    checker.check(&family_, FontWeight::Normal),
                    checker.check(&family_, FontWeight::Bold),
                )
                .await
                .map(|_| ())
            })
            .await
    }

    /// Load every family, failing if any of them fails.
    pub async fn load_fonts<I, S>(&self, families: I) -> LoadResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let families: Vec<String> = families
            .into_iter()
            .map(|family| family.as_ref().to_string())
            .collect();

        futures::future::try_join_all(families.iter().map(|family| self.load(family)))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        error::LoadError,
        host::{scripted::ScriptedDocument, Dimensions},
        registry::KeyState,
    };

    const ROBOTO_BOX: Dimensions = Dimensions {
        width: 120.0,
        height: 24.0,
    };

    fn loader(document: &Arc<ScriptedDocument>) -> FontLoader {
        FontLoader::new(document.clone(), FontOptions::default())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_loads_share_one_check() {
        let document = ScriptedDocument::new();
        document.make_available("Roboto", ROBOTO_BOX);
        let fonts = loader(&document);

        let (first, second) = tokio::join!(fonts.load("Roboto"), fonts.load("Roboto"));
        first.unwrap();
        second.unwrap();

        // container, then wrapper and two probes for each weight
        assert_eq!(document.created(), 1 + 2 * 3);
        assert_eq!(fonts.registry().state("Roboto").await, KeyState::Loaded);

        fonts.load("Roboto").await.unwrap();
        assert_eq!(document.created(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_reach_every_caller_and_allow_retry() {
        let document = ScriptedDocument::new();
        let fonts = loader(&document);

        let (first, second) = tokio::join!(fonts.load("Lato"), fonts.load("Lato"));
        for result in [first, second] {
            assert!(matches!(
                result,
                Err(LoadError::FontTimeout { timeout, .. }) if timeout == Duration::from_millis(5000)
            ));
        }
        assert_eq!(fonts.registry().state("Lato").await, KeyState::Unloaded);

        document.make_available("Lato", ROBOTO_BOX);
        fonts.load("Lato").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn load_fonts_is_all_or_nothing() {
        let document = ScriptedDocument::new();
        document.make_available("Roboto", ROBOTO_BOX);
        document.make_available("Lato", ROBOTO_BOX);
        let fonts = loader(&document);

        fonts.load_fonts(["Roboto", "Lato"]).await.unwrap();

        let err = fonts.load_fonts(["Roboto", "Ghost"]).await.unwrap_err();
        assert_eq!(err.key(), "Ghost");

        fonts.load_fonts(Vec::<String>::new()).await.unwrap();
    }
}
