use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration;

use crate::ingest::normalize::clean_summary;
use crate::ingest::types::{FeedEntry, FeedSource};

const SEARCH_BASE: &str = "https://news.google.com/rss/search";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Google News RSS search. Each query becomes one feed request; a fixture
/// mode answers every query with the same XML document.
pub struct GoogleNewsRss {
    mode: Mode,
    max_entries: usize,
}

enum Mode {
    Fixture(String),
    Http {
        client: reqwest::Client,
        base: String,
    },
}

impl GoogleNewsRss {
    pub fn new(timeout: Duration, max_entries: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("bubble-watch/0.1")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http {
                client,
                base: SEARCH_BASE.to_string(),
            },
            max_entries,
        })
    }

    pub fn from_fixture_str(xml: &str, max_entries: usize) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
            max_entries,
        }
    }

    /// `q` is form-encoded; `when:14d` style operators pass through untouched.
    pub fn search_url(base: &str, query: &str) -> Result<String> {
        let url = url::Url::parse_with_params(
            base,
            &[("q", query), ("hl", "en"), ("gl", "US"), ("ceid", "US:en")],
        )
        .context("building search url")?;
        Ok(url.into())
    }

    pub fn parse_items_from_str(s: &str, max_entries: usize) -> Result<Vec<FeedEntry>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing news rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len().min(max_entries));
        for it in rss.channel.item.into_iter().take(max_entries) {
            let title = it.title.unwrap_or_default().trim().to_string();
            let link = it.link.unwrap_or_default().trim().to_string();
            if title.is_empty() && link.is_empty() {
                continue;
            }
            out.push(FeedEntry {
                title,
                link,
                published: it.pub_date.unwrap_or_default().trim().to_string(),
                summary: clean_summary(it.description.as_deref().unwrap_or_default()),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("collector_feed_parse_ms").record(ms);
        counter!("collector_feed_entries_total").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl FeedSource for GoogleNewsRss {
    async fn fetch(&self, query: &str) -> Result<Vec<FeedEntry>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_items_from_str(s, self.max_entries),
            Mode::Http { client, base } => {
                let url = Self::search_url(base, query)?;
                tracing::debug!(%url, "feed fetch");
                let body = client
                    .get(&url)
                    .send()
                    .await
                    .context("feed http get()")?
                    .error_for_status()
                    .context("feed http status")?
                    .text()
                    .await
                    .context("feed http .text()")?;
                Self::parse_items_from_str(&body, self.max_entries)
            }
        }
    }

    fn name(&self) -> &'static str {
        "google-news"
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
