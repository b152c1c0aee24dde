use super::*;

use async_trait::async_trait;
use scraper::{Html, Selector};

/// Looks up the title and description of a page. Failures come back as errors for the
/// caller to report; implementations must not panic on bad pages.
#[async_trait]
pub(super) trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<LinkMetadata>;
}

pub(super) struct HttpMetadataFetcher {
    client: reqwest::Client,
}

impl HttpMetadataFetcher {
    pub(super) fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent.to_string())
            .build()
            .context("build http client")?;
        Ok(HttpMetadataFetcher { client })
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, url: &str) -> Result<LinkMetadata> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request {}", url))?
            .error_for_status()
            .with_context(|| format!("fetch {}", url))?;
        let body = response.text().await.context("read response body")?;
        parse_metadata(&body)
    }
}

/// Pulls `<title>` and the description meta tag out of a page, falling back to the
/// Open Graph tags. Missing values come back empty.
pub(super) fn parse_metadata(html: &str) -> Result<LinkMetadata> {
    let document = Html::parse_document(html);

    let title = match select_text(&document, "title")? {
        Some(title) => Some(title),
        None => select_content(&document, r#"meta[property="og:title"]"#)?,
    };
    let description = match select_content(&document, r#"meta[name="description"]"#)? {
        Some(description) => Some(description),
        None => select_content(&document, r#"meta[property="og:description"]"#)?,
    };

    Ok(LinkMetadata {
        title: title.unwrap_or_default(),
        description: description.unwrap_or_default(),
    })
}

fn select_text(document: &Html, css: &str) -> Result<Option<String>> {
    let selector = parse_selector(css)?;
    Ok(document
        .select(&selector)
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .find(|text| !text.is_empty()))
}

fn select_content(document: &Html, css: &str) -> Result<Option<String>> {
    let selector = parse_selector(css)?;
    Ok(document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .find(|text| !text.is_empty()))
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow!("invalid selector {}: {:?}", css, err))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
