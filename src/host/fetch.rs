use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, warn};

#[derive(Hash, Eq, PartialEq, Clone, Debug)]
pub enum ResourcePath {
    Local(PathBuf),
    Url(String),
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ResourcePath::*;
        match self {
            Local(path) => f.write_fmt(format_args!("[Local resource: {}]", path.display())),
            Url(url) => f.write_fmt(format_args!("[URL: {url}]")),
        }
    }
}

const URL_PATTERN: &str = r"^(http|https)://(.+)$";
const FILE_SCHEME: &str = "file://";

impl From<&str> for ResourcePath {
    fn from(value: &str) -> Self {
        static URL_REGEX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(URL_PATTERN).ok());

        use ResourcePath::*;

        let is_url = URL_REGEX
            .as_ref()
            .is_some_and(|regex| regex.is_match(value));

        if is_url {
            Url(value.to_string())
        } else {
            Local(value.trim_start_matches(FILE_SCHEME).into())
        }
    }
}

/// Resolve `reference` as it appears inside the resource at `base`, the way
/// a `url(...)` in a stylesheet is relative to the stylesheet itself.
pub fn resolve_reference(base: &str, reference: &str) -> String {
    use ResourcePath::*;

    match (ResourcePath::from(base), ResourcePath::from(reference)) {
        (_, Url(url)) => url,
        (Url(base), Local(path)) => {
            let relative = path.to_string_lossy();
            reqwest::Url::parse(&base)
                .and_then(|base| base.join(&relative))
                .map(String::from)
                .unwrap_or_else(|_| relative.into_owned())
        }
        (Local(_), Local(path)) if path.is_absolute() => path.to_string_lossy().into_owned(),
        (Local(base), Local(path)) => base
            .parent()
            .unwrap_or(Path::new(""))
            .join(path)
            .to_string_lossy()
            .into_owned(),
    }
}

/// Reads the bytes behind a `src` / `href`, from disk below `root` or over
/// HTTP(S).
#[derive(Clone, Debug)]
pub struct Fetcher {
    root: PathBuf,
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(root: PathBuf) -> Self {
        Fetcher {
            root,
            client: reqwest::Client::new(),
        }
    }

    pub async fn fetch(&self, reference: &str) -> anyhow::Result<Vec<u8>> {
        let path = ResourcePath::from(reference);
        debug!("Fetching {}", path);

        use ResourcePath::*;
        let result = match &path {
            Local(local) => self.load_local(local).await,
            Url(url) => self.load_url(url).await,
        };

        if let Err(err) = &result {
            warn!("Failed to fetch {}: {:#}", path, err);
        }
        result
    }

    async fn load_local(&self, path: &PathBuf) -> anyhow::Result<Vec<u8>> {
        let full = self.root.join(path);
        tokio::fs::read(&full)
            .await
            .context(format!("Failed to load file {}", full.display()))
    }

    async fn load_url(&self, url: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context(format!("Failed to get resource {url}"))?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("Status code for {} is {}, not OK.", url, response.status())
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read body from response")?;
        Ok(bytes.to_vec())
    }
}
