//! Faceted template search.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::ApiClient;
use crate::error::TransportFailure;

/// A search request. Compares by value, so it can key a
/// [`Resource`](crate::Resource) directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    pub query: String,
    pub page: u32,
    pub page_size: u32,
    /// Facet name to selected values, in selection order.
    pub facets: IndexMap<String, Vec<String>>,
    pub sort: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: 1,
            page_size: 20,
            facets: IndexMap::new(),
            sort: None,
        }
    }
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_facet(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.facets.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Query-string pairs in request order.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("q".to_string(), self.query.clone()),
            ("page".to_string(), self.page.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];
        if let Some(sort) = &self.sort {
            pairs.push(("sort".to_string(), sort.clone()));
        }
        for (name, values) in &self.facets {
            for value in values {
                pairs.push(("facet".to_string(), format!("{name}:{value}")));
            }
        }
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage<H> {
    pub hits: Vec<H>,
    pub total: u64,
    pub total_pages: u32,
}

impl<H> Default for SearchPage<H> {
    fn default() -> Self {
        Self {
            hits: Vec::new(),
            total: 0,
            total_pages: 0,
        }
    }
}

impl ApiClient {
    pub async fn search<H>(&self, query: &SearchQuery) -> Result<SearchPage<H>, TransportFailure>
    where
        H: DeserializeOwned,
    {
        trace!(query = %query.query, page = query.page, "search");
        let url = self.url("search");
        let pairs = query.to_pairs();
        let response = self.execute(|http| http.get(&url).query(&pairs)).await?;
        let status = response.status().as_u16();
        response.json().await.map_err(|e| {
            TransportFailure::new(
                Some(status),
                serde_json::Value::String(format!("invalid search response: {e}")),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::model::TemplateSummary;
    use crate::session::Session;
    use axum::extract::RawQuery;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    #[test]
    fn pairs_keep_facet_order() {
        let query = SearchQuery::new("climate")
            .with_facet("topic", "science")
            .with_facet("lang", "en")
            .with_facet("topic", "policy")
            .with_sort("likes");

        let owned = query.to_pairs();
        let pairs: Vec<(&str, &str)> = owned
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("q", "climate"),
                ("page", "1"),
                ("pageSize", "20"),
                ("sort", "likes"),
                ("facet", "topic:science"),
                ("facet", "topic:policy"),
                ("facet", "lang:en"),
            ]
        );
    }

    #[test]
    fn queries_compare_by_value() {
        let a = SearchQuery::new("x").with_facet("tag", "a");
        let b = SearchQuery::new("x").with_facet("tag", "a");
        assert_eq!(a, b);
        assert_ne!(a, b.with_page(2));
    }

    #[tokio::test]
    async fn search_sends_query_string() {
        std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/api/search",
            get(|RawQuery(raw): RawQuery| async move {
                Json(json!({
                    "hits": [{"id": 1, "title": raw.unwrap_or_default()}],
                    "total": 1,
                    "totalPages": 1
                }))
            }),
        );
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let config = ClientConfig {
            base_url: format!("http://{addr}"),
            ..ClientConfig::default()
        };
        let client = ApiClient::new(&config, Session::default()).unwrap();
        let page: SearchPage<TemplateSummary> = client
            .search(&SearchQuery::new("tax").with_facet("tag", "money"))
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].title, "q=tax&page=1&pageSize=20&facet=tag%3Amoney");
    }
}
