//! Web search over DuckDuckGo's HTML endpoint (no API key required).

use std::time::Duration;

use tracing::debug;

use crate::{
    application::services::WebSearchProvider,
    domain::{DomainError, WebSnippet},
};

use super::{build_agent, describe_http_error};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) kcc-chat";

pub struct DuckDuckGoSearch {
    endpoint: String,
    agent: ureq::Agent,
}

impl DuckDuckGoSearch {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: build_agent(timeout, USER_AGENT),
        }
    }

    fn search_url(&self, query: &str) -> String {
        format!("{}?q={}", self.endpoint, urlencoding::encode(query))
    }
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new(DEFAULT_SEARCH_ENDPOINT, Duration::from_secs(10))
    }
}

impl WebSearchProvider for DuckDuckGoSearch {
    fn search(&self, query: &str, max_results: usize) -> Result<Vec<WebSnippet>, DomainError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let url = self.search_url(query);
        debug!(target: "kcc::http", %url, max_results, "web search");

        let html = self
            .agent
            .get(&url)
            .call()
            .map_err(|err| DomainError::search(describe_http_error(err)))?
            .into_string()
            .map_err(|err| DomainError::search(format!("failed to read search page: {err}")))?;

        Ok(parse_results(&html, max_results))
    }
}

/// Extract result blocks in page order. Results without a snippet are skipped
/// since only the snippet text is useful as context.
pub(crate) fn parse_results(html: &str, max: usize) -> Vec<WebSnippet> {
    let mut results = Vec::new();

    for segment in html.split("class=\"result__a\"").skip(1) {
        if results.len() >= max {
            break;
        }

        let title = extract_between(segment, ">", "</a>")
            .map(|raw| clean_text(&raw))
            .unwrap_or_default();
        let url = extract_between(segment, "href=\"", "\"").map(|raw| resolve_link(&raw));
        let body = segment
            .split("class=\"result__snippet\"")
            .nth(1)
            .and_then(|snippet| extract_between(snippet, ">", "</a>"))
            .map(|raw| clean_text(&raw))
            .unwrap_or_default();

        if body.is_empty() {
            continue;
        }

        results.push(WebSnippet { title, body, url });
    }

    results
}

fn extract_between(text: &str, start: &str, end: &str) -> Option<String> {
    let start_idx = text.find(start)? + start.len();
    let remaining = &text[start_idx..];
    let end_idx = remaining.find(end)?;
    Some(remaining[..end_idx].to_string())
}

/// Drop inline tags, decode the entities DuckDuckGo emits and collapse whitespace.
fn clean_text(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    let decoded = stripped
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&");

    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Result links are redirects of the form `//duckduckgo.com/l/?uddg=<target>&...`.
fn resolve_link(raw: &str) -> String {
    let href = raw.replace("&amp;", "&");
    href.split("uddg=")
        .nth(1)
        .map(|rest| rest.split('&').next().unwrap_or(rest))
        .and_then(|encoded| urlencoding::decode(encoded).ok())
        .map(|decoded| decoded.into_owned())
        .unwrap_or(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fmausam.imd.gov.in%2Fmonsoon&amp;rut=abc">Monsoon <b>Maharashtra</b> 2025</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=x">The <b>monsoon</b> is expected to reach Maharashtra by 10&nbsp;June &amp; cover the state.</a>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://example.org/no-snippet">No snippet here</a>
  </h2>
</div>
<div class="result results_links">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://krishi.maharashtra.gov.in/">Krishi Vibhag</a>
  </h2>
  <a class="result__snippet" href="https://krishi.maharashtra.gov.in/">Farmers&#x27; advisories for kharif sowing.</a>
</div>
<div class="result results_links">
  <a class="result__a" href="https://third.example/">Third</a>
  <a class="result__snippet" href="https://third.example/">Third snippet.</a>
</div>
"#;

    #[test]
    fn parses_snippets_in_page_order() {
        let results = parse_results(PAGE, 5);
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].title, "Monsoon Maharashtra 2025");
        assert_eq!(
            results[0].body,
            "The monsoon is expected to reach Maharashtra by 10 June & cover the state."
        );
        assert_eq!(
            results[0].url.as_deref(),
            Some("https://mausam.imd.gov.in/monsoon")
        );
        assert_eq!(results[1].body, "Farmers' advisories for kharif sowing.");
        assert_eq!(results[2].body, "Third snippet.");
    }

    #[test]
    fn respects_result_cap() {
        let results = parse_results(PAGE, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].title, "Krishi Vibhag");
    }

    #[test]
    fn empty_page_yields_nothing() {
        assert!(parse_results("<html><body>No results.</body></html>", 2).is_empty());
    }

    #[test]
    fn query_is_url_encoded() {
        let search = DuckDuckGoSearch::default();
        assert_eq!(
            search.search_url("rain in Maharashtra?"),
            "https://html.duckduckgo.com/html/?q=rain%20in%20Maharashtra%3F"
        );
    }
}
