use tracing::debug;

use super::{ResourceKind, ResourceLoader};
use crate::error::LoadResult;

impl<K: ResourceKind> ResourceLoader<K> {
    /// Load `urls` one after another, stopping at the first failure.
    /// Empty entries are skipped.
    pub async fn load_all<I, S>(&self, urls: I) -> LoadResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            let url = url.as_ref();
            if url.is_empty() {
                continue;
            }
            self.load(url).await?;
        }

        debug!("Batch of {}s finished", K::NAME);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::LoadError,
        host::scripted::{Outcome, ScriptedDocument},
        loader::{ResourceLoader, Script},
    };

    #[tokio::test]
    async fn stops_at_the_first_failure() {
        let document = ScriptedDocument::new();
        document.set_outcome("b.js", Outcome::Fail);
        let loader = ResourceLoader::<Script>::new(document.clone());

        let err = loader.load_all(["a.js", "b.js", "c.js"]).await.unwrap_err();

        assert!(matches!(err, LoadError::Resource { ref key, .. } if key == "b.js"));
        assert!(document.present("a.js"));
        assert_eq!(document.appends("b.js"), 1);
        assert_eq!(document.appends("c.js"), 0);
    }

    #[tokio::test]
    async fn skips_empty_entries() {
        let document = ScriptedDocument::new();
        let loader = ResourceLoader::<Script>::new(document.clone());

        loader
            .load_all(vec!["a.js".to_string(), String::new(), "b.js".to_string()])
            .await
            .unwrap();

        assert_eq!(document.appends("a.js"), 1);
        assert_eq!(document.appends("b.js"), 1);
        assert_eq!(document.appends(""), 0);
        assert_eq!(document.node_count(), 2);
    }

    #[tokio::test]
    async fn empty_batch_does_nothing() {
        let document = ScriptedDocument::new();
        let loader = ResourceLoader::<Script>::new(document.clone());

        loader.load_all(Vec::<&str>::new()).await.unwrap();

        assert_eq!(document.node_count(), 0);
    }
}
