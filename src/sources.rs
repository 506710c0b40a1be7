//! External news providers and the mapping of their payloads onto [`NewArticle`].

use std::fmt;

use chrono::{DateTime, NaiveDateTime};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::{Config, ProviderConfig};
use crate::db::NewArticle;

pub const NEWSAPI_LABEL: &str = "NewsAPI";
pub const GUARDIAN_LABEL: &str = "The Guardian";
pub const BBC_LABEL: &str = "BBC News";
pub const BBC_OUTLET: &str = "bbc-news";

#[derive(Debug, Clone, PartialEq)]
pub enum Provider {
    /// NewsAPI top headlines, optionally restricted to one outlet id
    NewsApi { outlet: Option<String> },
    Guardian,
}

/// One configured provider call and the display label its articles are stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub label: String,
    pub provider: Provider,
    pub settings: ProviderConfig,
}

/// Why a single payload item could not become an article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAnObject,
    MissingUrl,
    MissingTitle,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotAnObject => write!(f, "expected an object"),
            SkipReason::MissingUrl => write!(f, "missing 'url'"),
            SkipReason::MissingTitle => write!(f, "missing title"),
        }
    }
}

/// The three sources ingested by default: general headlines, The Guardian and BBC News.
pub fn default_sources(config: &Config) -> Vec<Source> {
    vec![
        Source {
            label: NEWSAPI_LABEL.to_string(),
            provider: Provider::NewsApi { outlet: None },
            settings: config.newsapi.clone(),
        },
        Source {
            label: GUARDIAN_LABEL.to_string(),
            provider: Provider::Guardian,
            settings: config.guardian.clone(),
        },
        Source {
            label: BBC_LABEL.to_string(),
            provider: Provider::NewsApi {
                outlet: Some(BBC_OUTLET.to_string()),
            },
            settings: config.newsapi.clone(),
        },
    ]
}

impl Source {
    /// The provider request, or `None` when no API key is configured.
    pub fn request(&self, client: &Client) -> Option<RequestBuilder> {
        let api_key = self.settings.api_key()?;
        let base_url = self.settings.base_url.trim_end_matches('/');
        let page_size = self.settings.page_size.to_string();

        let request = match &self.provider {
            Provider::NewsApi { outlet } => {
                let mut query = vec![
                    ("apiKey", api_key.to_string()),
                    ("language", "en".to_string()),
                    ("pageSize", page_size),
                ];
                if let Some(outlet) = outlet {
                    query.push(("sources", outlet.clone()));
                }
                client
                    .get(format!("{}/top-headlines", base_url))
                    .query(&query)
            }
            Provider::Guardian => client.get(format!("{}/search", base_url)).query(&[
                ("api-key", api_key),
                ("show-fields", "all"),
                ("page-size", page_size.as_str()),
            ]),
        };

        Some(request)
    }

    /// The article list inside a provider response body.
    pub fn items<'a>(&self, body: &'a Value) -> Option<&'a Vec<Value>> {
        let items = match self.provider {
            Provider::NewsApi { .. } => body.get("articles"),
            Provider::Guardian => body.pointer("/response/results"),
        };
        items.and_then(Value::as_array)
    }

    pub fn map_item(&self, item: &Value, now: NaiveDateTime) -> Result<NewArticle, SkipReason> {
        if !item.is_object() {
            return Err(SkipReason::NotAnObject);
        }
        match self.provider {
            Provider::NewsApi { .. } => map_newsapi(item, &self.label, now),
            Provider::Guardian => map_guardian(item, &self.label, now),
        }
    }
}

fn map_newsapi(item: &Value, label: &str, now: NaiveDateTime) -> Result<NewArticle, SkipReason> {
    let url = text(item, "/url").ok_or(SkipReason::MissingUrl)?;
    let title = text(item, "/title").ok_or(SkipReason::MissingTitle)?;

    Ok(NewArticle {
        title,
        author: text(item, "/author"),
        description: text(item, "/description"),
        content: text(item, "/content"),
        published_at: timestamp(item, "/publishedAt").unwrap_or(now),
        source: label.to_string(),
        category: None,
        url,
        url_to_image: text(item, "/urlToImage"),
    })
}

fn map_guardian(item: &Value, label: &str, now: NaiveDateTime) -> Result<NewArticle, SkipReason> {
    let url = text(item, "/webUrl").ok_or(SkipReason::MissingUrl)?;
    let title = text(item, "/webTitle").ok_or(SkipReason::MissingTitle)?;

    Ok(NewArticle {
        title,
        author: text(item, "/fields/byline"),
        description: text(item, "/fields/trailText"),
        content: text(item, "/fields/bodyText"),
        published_at: timestamp(item, "/webPublicationDate").unwrap_or(now),
        source: label.to_string(),
        category: text(item, "/sectionName"),
        url,
        url_to_image: text(item, "/fields/thumbnail"),
    })
}

fn text(item: &Value, pointer: &str) -> Option<String> {
    item.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// An RFC 3339 timestamp as the provider's wall-clock time; the offset is
/// dropped so the stored calendar day is the one the provider reported.
fn timestamp(item: &Value, pointer: &str) -> Option<NaiveDateTime> {
    let raw = item.pointer(pointer)?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.naive_local())
}
