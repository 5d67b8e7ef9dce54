//! Expansion of prefixed values (`cont:1234`) to full URIs through a
//! JSON-LD `@context`
//!
//! Remote context documents are cached per URL. The cache holds at most
//! `max_entries` documents, each for at most `ttl`; when full, the least
//! recently used entry is dropped.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

pub type TermMap = Map<String, Value>;

#[derive(Debug, Error)]
pub enum UriError {
    #[error("failed to fetch context {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("context {url} is not valid JSON: {reason}")]
    InvalidContext { url: String, reason: String },
}

impl UriError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

struct CacheEntry {
    document: Value,
    fetched_at: Instant,
    last_used: u64,
}

struct ContextCache {
    entries: HashMap<String, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
    clock: u64,
}

impl ContextCache {
    fn get(&mut self, url: &str) -> Option<Value> {
        self.clock += 1;
        let clock = self.clock;
        let ttl = self.ttl;

        let expired = match self.entries.get_mut(url) {
            Some(entry) if entry.fetched_at.elapsed() < ttl => {
                entry.last_used = clock;
                return Some(entry.document.clone());
            },
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(url);
        }
        None
    }

    fn insert(&mut self, url: String, document: Value) {
        self.clock += 1;
        if !self.entries.contains_key(&url) && self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Evicting context {}", oldest);
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            url,
            CacheEntry {
                document,
                fetched_at: Instant::now(),
                last_used: self.clock,
            },
        );
    }
}

/// Resolves `@context` values, fetching remote ones through the cache
pub struct ContextResolver {
    http: reqwest::Client,
    cache: Mutex<ContextCache>,
}

impl ContextResolver {
    pub fn new(max_entries: usize, ttl: Duration, timeout: Duration) -> Result<Self, UriError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| UriError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            http,
            cache: Mutex::new(ContextCache {
                entries: HashMap::new(),
                max_entries: max_entries.max(1),
                ttl,
                clock: 0,
            }),
        })
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn invalidate(&self, url: &str) -> bool {
        self.cache.lock().entries.remove(url).is_some()
    }

    pub fn clear(&self) {
        self.cache.lock().entries.clear();
    }

    /// Expand `value` against the `@context` of `document`.
    ///
    /// Absolute `http(s)://` values come back unchanged. `None` when the
    /// value has no usable `prefix:suffix` shape or the prefix is unknown.
    pub async fn full_uri(&self, value: &str, document: &Value) -> Result<Option<String>, UriError> {
        if value.is_empty() {
            return Ok(None);
        }
        if value.starts_with("http://") || value.starts_with("https://") {
            return Ok(Some(value.to_string()));
        }
        let Some(context) = document.get("@context") else {
            return Ok(None);
        };
        let Some((prefix, suffix)) = value.split_once(':') else {
            return Ok(None);
        };
        if prefix.is_empty() || suffix.is_empty() {
            return Ok(None);
        }

        let Some(terms) = self.resolve_context(context).await? else {
            return Ok(None);
        };
        Ok(term_base(&terms, prefix).map(|base| join(base, suffix)))
    }

    /// Flatten a `@context` (object, URL or array of both) into one term map
    pub async fn resolve_context(&self, context: &Value) -> Result<Option<TermMap>, UriError> {
        match context {
            Value::Object(terms) => Ok(Some(terms.clone())),
            Value::String(url) => Ok(self.fetch(url).await?.and_then(|doc| into_terms(&doc))),
            Value::Array(items) => {
                let mut merged = TermMap::new();
                for item in items {
                    let terms = match item {
                        Value::Object(terms) => Some(terms.clone()),
                        Value::String(url) => self.fetch(url).await?.and_then(|doc| into_terms(&doc)),
                        _ => None,
                    };
                    merged.extend(terms.unwrap_or_default());
                }
                Ok(Some(merged))
            },
            _ => Ok(None),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Option<Value>, UriError> {
        let cached = self.cache.lock().get(url);
        if let Some(document) = cached {
            return Ok(Some(document));
        }

        debug!("Fetching context {}", url);
        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/ld+json, application/json")
            .send()
            .await
            .map_err(|e| UriError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            warn!("Context {} returned HTTP {}", url, response.status());
            return Ok(None);
        }

        let document: Value = response.json().await.map_err(|e| UriError::InvalidContext {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        self.cache.lock().insert(url.to_string(), document.clone());
        Ok(Some(document))
    }
}

/// A fetched context document either is the term map or wraps it in `@context`
fn into_terms(document: &Value) -> Option<TermMap> {
    match document.get("@context").unwrap_or(document) {
        Value::Object(terms) => Some(terms.clone()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(Value::as_object)
                .flat_map(|m| m.clone())
                .collect(),
        ),
        _ => None,
    }
}

/// A term maps to an IRI string or to `{"@id": IRI}`
fn term_base<'a>(terms: &'a TermMap, prefix: &str) -> Option<&'a str> {
    let base = match terms.get(prefix)? {
        Value::String(base) => Some(base.as_str()),
        Value::Object(def) => def.get("@id").and_then(Value::as_str),
        _ => None,
    };
    base.filter(|base| !base.is_empty())
}

fn join(base: &str, suffix: &str) -> String {
    if base.ends_with('/') || base.ends_with('#') {
        format!("{}{}", base, suffix)
    } else {
        format!("{}/{}", base, suffix)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver() -> ContextResolver {
        ContextResolver::new(2, Duration::from_secs(60), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_inline_context() {
        let doc = json!({"@context": {
            "cont": "http://data.lblod.info/id/contact-points/",
            "adres": {"@id": "https://data.vlaanderen.be/ns/adres#"},
            "org": "http://www.w3.org/ns/org"
        }});
        let r = resolver();

        assert_eq!(
            r.full_uri("cont:1234", &doc).await.unwrap().as_deref(),
            Some("http://data.lblod.info/id/contact-points/1234")
        );
        assert_eq!(
            r.full_uri("adres:Adres", &doc).await.unwrap().as_deref(),
            Some("https://data.vlaanderen.be/ns/adres#Adres")
        );
        assert_eq!(
            r.full_uri("org:Site", &doc).await.unwrap().as_deref(),
            Some("http://www.w3.org/ns/org/Site")
        );
    }

    #[tokio::test]
    async fn test_unresolvable_values() {
        let doc = json!({"@context": {"cont": "http://x/"}});
        let r = resolver();

        assert_eq!(r.full_uri("", &doc).await.unwrap(), None);
        assert_eq!(r.full_uri("nocolon", &doc).await.unwrap(), None);
        assert_eq!(r.full_uri("cont:", &doc).await.unwrap(), None);
        assert_eq!(r.full_uri("unknown:1", &doc).await.unwrap(), None);
        assert_eq!(r.full_uri("cont:1", &json!({})).await.unwrap(), None);
        assert_eq!(
            r.full_uri("https://already/full", &json!({})).await.unwrap().as_deref(),
            Some("https://already/full")
        );
    }

    #[tokio::test]
    async fn test_remote_context_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/context.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "@context": {"cont": "http://data.lblod.info/id/contact-points/"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let r = resolver();
        let doc = json!({"@context": format!("{}/context.json", server.uri())});

        for _ in 0..3 {
            assert_eq!(
                r.full_uri("cont:9", &doc).await.unwrap().as_deref(),
                Some("http://data.lblod.info/id/contact-points/9")
            );
        }
        assert_eq!(r.cached_len(), 1);
    }

    #[tokio::test]
    async fn test_array_context_merges_inline_and_remote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"a": "http://a/"})))
            .mount(&server)
            .await;

        let r = resolver();
        let doc = json!({"@context": [format!("{}/a.json", server.uri()), {"b": "http://b#"}, 7]});

        assert_eq!(r.full_uri("a:1", &doc).await.unwrap().as_deref(), Some("http://a/1"));
        assert_eq!(r.full_uri("b:2", &doc).await.unwrap().as_deref(), Some("http://b#2"));
    }

    #[tokio::test]
    async fn test_failed_context_fetch_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.json"))
            .respond_with(ResponseTemplate::new(404))
            .expect(2)
            .mount(&server)
            .await;

        let r = resolver();
        let doc = json!({"@context": format!("{}/missing.json", server.uri())});

        assert_eq!(r.full_uri("x:1", &doc).await.unwrap(), None);
        assert_eq!(r.full_uri("x:1", &doc).await.unwrap(), None);
        assert_eq!(r.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_context_is_an_error() {
        let r = resolver();
        let doc = json!({"@context": "http://127.0.0.1:1/context.json"});
        assert!(matches!(
            r.full_uri("x:1", &doc).await,
            Err(UriError::Fetch { .. })
        ));
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let mut cache = ContextCache {
            entries: HashMap::new(),
            max_entries: 2,
            ttl: Duration::from_secs(60),
            clock: 0,
        };
        cache.insert("a".into(), json!(1));
        cache.insert("b".into(), json!(2));
        assert!(cache.get("a").is_some());

        cache.insert("c".into(), json!(3));

        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_cache_expires_entries() {
        let mut cache = ContextCache {
            entries: HashMap::new(),
            max_entries: 4,
            ttl: Duration::ZERO,
            clock: 0,
        };
        cache.insert("a".into(), json!(1));
        assert!(cache.get("a").is_none());
        assert!(cache.entries.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ctx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"p": "http://p/"})))
            .expect(2)
            .mount(&server)
            .await;

        let r = resolver();
        let url = format!("{}/ctx", server.uri());
        let doc = json!({"@context": url.clone()});

        r.full_uri("p:1", &doc).await.unwrap();
        assert!(r.invalidate(&url));
        assert!(!r.invalidate(&url));
        r.full_uri("p:1", &doc).await.unwrap();
        assert_eq!(r.cached_len(), 1);

        r.clear();
        assert_eq!(r.cached_len(), 0);
    }
}
