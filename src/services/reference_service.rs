use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::config::Config;
use crate::error::{Error, Result};

/// Second-stage retrieval that grounds theory answers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceLookup: Send + Sync {
    async fn lookup(&self, query: &str, max_docs: usize) -> Result<Vec<String>>;
}

/// Searches the arXiv Atom API and returns entry abstracts.
#[derive(Clone)]
pub struct ArxivLookup {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct Feed {
    #[serde(rename = "entry", default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
}

impl ArxivLookup {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &Config, client: Client) -> Self {
        Self::new(&config.arxiv_base_url, client).with_timeout(config.http_timeout())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub(crate) fn parse_feed(xml: &str, max_docs: usize) -> Result<Vec<String>> {
    let feed: Feed = quick_xml::de::from_str(xml)
        .map_err(|e| Error::malformed(format!("arXiv feed: {}", e)))?;

    Ok(feed
        .entries
        .into_iter()
        .filter(|e| !e.summary.trim().is_empty())
        .take(max_docs)
        .map(|e| {
            let title = collapse_whitespace(&e.title);
            let summary = collapse_whitespace(&e.summary);
            if title.is_empty() {
                summary
            } else {
                format!("{}\n{}", title, summary)
            }
        })
        .collect())
}

#[async_trait]
impl ReferenceLookup for ArxivLookup {
    async fn lookup(&self, query: &str, max_docs: usize) -> Result<Vec<String>> {
        if max_docs == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let search = format!("all:{}", collapse_whitespace(query));
        let max_results = max_docs.to_string();

        let res = self
            .client
            .get(format!("{}/query", self.base_url))
            .query(&[
                ("search_query", search.as_str()),
                ("max_results", max_results.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(Error::upstream("arxiv", status.as_u16(), body));
        }

        let docs = parse_feed(&body, max_docs)?;
        tracing::debug!(found = docs.len(), "arXiv lookup finished");
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/1234.5678v1</id>
    <title>Gradient Boosting
      Machines</title>
    <summary>  Gradient boosting builds an ensemble
      of weak learners.  </summary>
    <author><name>J. Friedman</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2345.6789v2</id>
    <title>Random Forests</title>
    <summary>Bagging of decision trees.</summary>
  </entry>
</feed>"#;

    #[test]
    fn parses_entry_abstracts() {
        let docs = parse_feed(FEED, 2).unwrap();
        assert_eq!(
            docs,
            vec![
                "Gradient Boosting Machines\nGradient boosting builds an ensemble of weak learners."
                    .to_string(),
                "Random Forests\nBagging of decision trees.".to_string(),
            ]
        );
    }

    #[test]
    fn caps_at_max_docs_and_tolerates_empty_feeds() {
        assert_eq!(parse_feed(FEED, 1).unwrap().len(), 1);

        let empty = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>ArXiv Query</title></feed>"#;
        assert!(parse_feed(empty, 2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn queries_the_search_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("search_query", "all:gradient boosting"))
            .and(query_param("max_results", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED))
            .expect(1)
            .mount(&server)
            .await;

        let lookup = ArxivLookup::new(&server.uri(), Client::new());
        let docs = lookup.lookup("gradient   boosting", 2).await.unwrap();
        assert_eq!(docs.len(), 2);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = ArxivLookup::new(&server.uri(), Client::new())
            .lookup("svm", 2)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
