use crate::host::Element;

/// How a resource of one kind is keyed, probed for and materialized.
pub trait ResourceKind: Send + Sync + 'static {
    /// Used in log lines.
    const NAME: &'static str;

    const TAG: &'static str;

    /// Attribute carrying the URL, used by the probe.
    const URL_ATTRIBUTE: &'static str;

    fn normalize(url: &str) -> String {
        url.to_string()
    }

    fn element(url: &str) -> Element;
}

pub struct Script;

impl ResourceKind for Script {
    const NAME: &'static str = "script";
    const TAG: &'static str = "script";
    const URL_ATTRIBUTE: &'static str = "src";

    fn element(url: &str) -> Element {
        Element::new(Self::TAG)
            .attr("charset", "utf-8")
            .attr(Self::URL_ATTRIBUTE, url)
    }
}

pub struct Stylesheet;

impl ResourceKind for Stylesheet {
    const NAME: &'static str = "stylesheet";
    const TAG: &'static str = "link";
    const URL_ATTRIBUTE: &'static str = "href";

    fn element(url: &str) -> Element {
        Element::new(Self::TAG)
            .attr("rel", "stylesheet")
            .attr("type", "text/css")
            .attr(Self::URL_ATTRIBUTE, url)
    }
}
