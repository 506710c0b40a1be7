use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::Database;
use crate::sources::Source;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no API key configured")]
    MissingApiKey,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider responded with status {0}")]
    Status(StatusCode),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub stored: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub sources: Vec<SourceReport>,
}

impl FetchReport {
    pub fn total(&self) -> usize {
        self.sources.iter().map(|s| s.stored).sum()
    }

    pub fn stored_for(&self, source: &str) -> Option<usize> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| s.stored)
    }
}

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
    sources: Vec<Source>,
}

impl Fetcher {
    pub fn new(db: Arc<Database>, sources: Vec<Source>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Newsdesk/1.0 (News Aggregator)")
            .build()?;

        Ok(Self {
            client,
            db,
            sources,
        })
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Ingest every source once. A failing source contributes zero articles
    /// and never stops the others.
    pub async fn fetch_all(&self) -> FetchReport {
        info!("Fetching {} sources", self.sources.len());

        let mut report = FetchReport::default();
        for source in &self.sources {
            let items = self.fetch_source(source).await;
            let stored = self.store_items(source, &items).await;
            info!("Stored {} articles for source '{}'", stored, source.label);
            report.sources.push(SourceReport {
                source: source.label.clone(),
                stored,
            });
        }

        info!("Fetch complete, {} articles stored", report.total());
        report
    }

    /// The raw items of one source, or an empty list if the call failed.
    pub async fn fetch_source(&self, source: &Source) -> Vec<Value> {
        match self.fetch_items(source).await {
            Ok(items) => items,
            Err(e) => {
                warn!("Failed to fetch source '{}': {}", source.label, e);
                Vec::new()
            }
        }
    }

    async fn fetch_items(&self, source: &Source) -> Result<Vec<Value>, FetchError> {
        let request = source
            .request(&self.client)
            .ok_or(FetchError::MissingApiKey)?;

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::MalformedPayload(e.to_string()))?;

        source
            .items(&body)
            .cloned()
            .ok_or_else(|| FetchError::MalformedPayload("article list not found".to_string()))
    }

    async fn store_items(&self, source: &Source, items: &[Value]) -> usize {
        if items.is_empty() {
            info!("No articles to save for source: {}", source.label);
            return 0;
        }

        let now = Utc::now().naive_utc();
        let mut stored = 0;
        for (index, item) in items.iter().enumerate() {
            let article = match source.map_item(item, now) {
                Ok(article) => article,
                Err(reason) => {
                    warn!(
                        "Skipping article {} from '{}': {}",
                        index, source.label, reason
                    );
                    continue;
                }
            };

            if let Err(e) = self.db.upsert_article(&article).await {
                warn!(
                    "Failed to store article '{}' from '{}': {}",
                    article.url, source.label, e
                );
                continue;
            }
            stored += 1;
        }

        stored
    }
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = Duration::from_secs(interval_minutes * 60);

    loop {
        info!("Starting scheduled news fetch");
        let report = fetcher.fetch_all().await;
        if report.total() == 0 {
            warn!("Scheduled news fetch stored no articles");
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::create_test_db;
    use crate::sources::{default_sources, BBC_LABEL, GUARDIAN_LABEL, NEWSAPI_LABEL};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.newsapi.api_key = Some("news-key".to_string());
        config.newsapi.base_url = format!("{}/v2", server.uri());
        config.guardian.api_key = Some("guardian-key".to_string());
        config.guardian.base_url = server.uri();
        config
    }

    async fn fetcher_for(config: &Config) -> (Fetcher, Arc<Database>) {
        let db = Arc::new(create_test_db().await);
        let fetcher =
            Fetcher::new(db.clone(), default_sources(config), Duration::from_secs(5)).unwrap();
        (fetcher, db)
    }

    fn newsapi_body(prefix: &str, count: usize) -> Value {
        let articles: Vec<Value> = (1..=count)
            .map(|i| {
                json!({
                    "source": { "id": null, "name": "Wire" },
                    "author": "Reporter",
                    "title": format!("{} headline {}", prefix, i),
                    "description": "desc",
                    "url": format!("https://{}.example.com/{}", prefix, i),
                    "publishedAt": "2024-03-05T10:00:00Z"
                })
            })
            .collect();
        json!({ "status": "ok", "totalResults": count, "articles": articles })
    }

    fn guardian_body() -> Value {
        json!({
            "response": {
                "status": "ok",
                "results": [{
                    "sectionName": "Politics",
                    "webPublicationDate": "2024-03-05T09:00:00Z",
                    "webTitle": "Guardian story",
                    "webUrl": "https://theguardian.com/story",
                    "fields": { "byline": "John Smith" }
                }]
            }
        })
    }

    async fn mount_all(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .and(query_param("sources", "bbc-news"))
            .respond_with(ResponseTemplate::new(200).set_body_json(newsapi_body("bbc", 2)))
            .with_priority(1)
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(newsapi_body("wire", 3)))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("api-key", "guardian-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body()))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_all_stores_every_source() {
        let server = MockServer::start().await;
        mount_all(&server).await;
        let (fetcher, db) = fetcher_for(&config_for(&server)).await;

        let report = fetcher.fetch_all().await;

        assert_eq!(report.stored_for(NEWSAPI_LABEL), Some(3));
        assert_eq!(report.stored_for(GUARDIAN_LABEL), Some(1));
        assert_eq!(report.stored_for(BBC_LABEL), Some(2));
        assert_eq!(report.total(), 6);
        assert_eq!(db.count_articles().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_refetch_does_not_duplicate() {
        let server = MockServer::start().await;
        mount_all(&server).await;
        let (fetcher, db) = fetcher_for(&config_for(&server)).await;

        fetcher.fetch_all().await;
        fetcher.fetch_all().await;

        assert_eq!(db.count_articles().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_abort_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(guardian_body()))
            .mount(&server)
            .await;
        let (fetcher, db) = fetcher_for(&config_for(&server)).await;

        let report = fetcher.fetch_all().await;

        assert_eq!(report.stored_for(NEWSAPI_LABEL), Some(0));
        assert_eq!(report.stored_for(BBC_LABEL), Some(0));
        assert_eq!(report.stored_for(GUARDIAN_LABEL), Some(1));
        assert_eq!(db.count_articles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_all_sources_failing_leaves_store_unchanged() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;
        let (fetcher, db) = fetcher_for(&config_for(&server)).await;
        for i in 1..=4 {
            db.upsert_article(&crate::db::NewArticle {
                title: format!("Existing {}", i),
                author: None,
                description: None,
                content: None,
                published_at: Utc::now().naive_utc(),
                source: GUARDIAN_LABEL.to_string(),
                category: None,
                url: format!("https://example.com/existing/{}", i),
                url_to_image: None,
            })
            .await
            .unwrap();
        }

        let report = fetcher.fetch_all().await;

        assert_eq!(report.sources.len(), 3);
        assert_eq!(report.total(), 0);
        assert_eq!(db.count_articles().await.unwrap(), 4);
        assert_eq!(db.get_article(1).await.unwrap().unwrap().title, "Existing 1");
    }

    #[tokio::test]
    async fn test_missing_api_keys_yield_nothing() {
        let server = MockServer::start().await;
        mount_all(&server).await;
        let mut config = config_for(&server);
        config.newsapi.api_key = None;
        let (fetcher, db) = fetcher_for(&config).await;

        let report = fetcher.fetch_all().await;

        assert_eq!(report.stored_for(NEWSAPI_LABEL), Some(0));
        assert_eq!(report.stored_for(BBC_LABEL), Some(0));
        assert_eq!(report.stored_for(GUARDIAN_LABEL), Some(1));
        assert_eq!(db.count_articles().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_malformed_records_are_skipped() {
        let server = MockServer::start().await;
        let body = json!({
            "articles": [
                "not an object",
                { "title": "No url" },
                { "title": "Good", "url": "https://example.com/good" }
            ]
        });
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let (fetcher, _db) = fetcher_for(&config_for(&server)).await;

        let report = fetcher.fetch_all().await;
        assert_eq!(report.stored_for(NEWSAPI_LABEL), Some(1));
    }

    #[tokio::test]
    async fn test_offset_timestamp_is_filed_under_provider_day() {
        let server = MockServer::start().await;
        let body = json!({
            "articles": [{
                "title": "Late edition",
                "url": "https://example.com/late",
                "publishedAt": "2024-03-05T23:30:00-02:00"
            }]
        });
        Mock::given(method("GET"))
            .and(path("/v2/top-headlines"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let (fetcher, db) = fetcher_for(&config_for(&server)).await;

        fetcher.fetch_all().await;

        let on = |day: &str| {
            let query: crate::filter::ArticleQuery =
                serde_urlencoded::from_str(&format!("date={}", day)).unwrap();
            crate::filter::ArticleFilter::from_query(&query).unwrap()
        };
        let request = crate::pagination::PageRequest::new(1, 10);
        let page = db.query_articles(&on("2024-03-05"), request).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].published_at, "2024-03-05 23:30:00");
        let page = db.query_articles(&on("2024-03-06"), request).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_article_list_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": "error" })),
            )
            .mount(&server)
            .await;
        let config = config_for(&server);
        let (fetcher, _db) = fetcher_for(&config).await;

        let newsapi = &fetcher.sources()[0];
        assert!(matches!(
            fetcher.fetch_items(newsapi).await,
            Err(FetchError::MalformedPayload(_))
        ));
        assert!(fetcher.fetch_source(newsapi).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_a_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(newsapi_body("slow", 1))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let db = Arc::new(create_test_db().await);
        let fetcher = Fetcher::new(
            db.clone(),
            default_sources(&config_for(&server)),
            Duration::from_millis(200),
        )
        .unwrap();

        let report = fetcher.fetch_all().await;
        assert_eq!(report.total(), 0);
        assert_eq!(db.count_articles().await.unwrap(), 0);
    }
}
