//! Document retrieval over an OpenSearch index of embedded chunks.
//!
//! The index holds parent documents (file metadata and a summary) joined to
//! child `chunk` documents carrying text and an embedding. A query is
//! embedded once, then matched against chunks by text and cosine
//! similarity; the best chunk score ranks each parent.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::{DocumentConfig, LlmConfig};
use crate::error::{Error, Result};
use crate::protocol::{
    ReadResourceResult, ResourceCapabilities, ResourceContents, ServerCapabilities, ServerInfo,
};
use crate::search::validate_query;
use crate::server::McpHandler;

/// URI prefix of document index searches.
pub const DOCUMENT_SEARCH_PREFIX: &str = "documents://search/";

const JSON_MIME: &str = "application/json";

/// URI of a document index search.
pub fn document_search_uri(query: &str) -> String {
    format!("{}{}", DOCUMENT_SEARCH_PREFIX, urlencoding::encode(query))
}

/// Parent document metadata returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub summary: Option<String>,
    pub timestamp: Option<String>,
}

/// Something that can find indexed documents for a query.
#[async_trait::async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Document>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// OpenSearch hybrid search with OpenAI query embeddings.
pub struct OpenSearchDocuments {
    client: reqwest::Client,
    api_key: Option<String>,
    embeddings_url: String,
    embeddings_model: String,
    search_url: String,
    credentials: Option<(String, String)>,
}

impl OpenSearchDocuments {
    pub fn new(documents: &DocumentConfig, llm: &LlmConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: llm.api_key.clone(),
            embeddings_url: format!("{}/embeddings", llm.base_url.trim_end_matches('/')),
            embeddings_model: documents.embeddings_model.clone(),
            search_url: format!("{}/{}/_search", documents.base_url(), documents.index),
            credentials: documents
                .credentials()
                .map(|(user, password)| (user.to_string(), password.to_string())),
        }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("missing OpenAI API key (OPENAI_API_KEY)".into()))?;

        let response = self
            .client
            .post(&self.embeddings_url)
            .bearer_auth(api_key)
            .json(&EmbeddingRequest {
                model: &self.embeddings_model,
                input: query,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("[OpenAI] Embeddings error: {} - {}", status, body);
            return Err(Error::Upstream(format!(
                "OpenAI embeddings error ({}): {}",
                status, body
            )));
        }

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Upstream(format!("invalid embeddings response: {}", e)))?;
        parse_embedding(&data)
    }
}

#[async_trait::async_trait]
impl DocumentBackend for OpenSearchDocuments {
    async fn search(&self, query: &str) -> Result<Vec<Document>> {
        let query = validate_query(query)?;

        let vector = self.embed(query).await?;
        debug!(dims = vector.len(), "Query vectorization complete");

        let mut request = self
            .client
            .post(&self.search_url)
            .json(&hybrid_query(query, &vector));
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }

        info!(query, url = %self.search_url, "Searching document index");
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!("OpenSearch error: {} - {}", status, body);
            return Err(Error::Upstream(format!(
                "OpenSearch error ({}): {}",
                status, body
            )));
        }

        let data: Value = serde_json::from_str(&body)
            .map_err(|e| Error::Upstream(format!("invalid OpenSearch response: {}", e)))?;
        let documents = parse_hits(&data);
        info!(documents = documents.len(), "Document search complete");
        Ok(documents)
    }
}

/// Pull the first embedding out of an OpenAI embeddings response.
pub fn parse_embedding(data: &Value) -> Result<Vec<f32>> {
    data.get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("embedding"))
        .and_then(Value::as_array)
        .and_then(|values| {
            values
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<_>>>()
        })
        .filter(|vector| !vector.is_empty())
        .ok_or_else(|| Error::Upstream("embeddings response carried no vector".into()))
}

/// Parent-document query: chunks matching the text, scored by cosine
/// similarity to `vector`, each parent ranked by its best chunk.
pub fn hybrid_query(query: &str, vector: &[f32]) -> Value {
    json!({
        "query": {
            "has_child": {
                "type": "chunk",
                "query": {
                    "script_score": {
                        "query": {
                            "bool": {
                                "should": [
                                    { "match": { "chunk_text": query } }
                                ]
                            }
                        },
                        "script": {
                            "source": "cosineSimilarity(params.query_vector, 'embedding') + 1.0",
                            "params": { "query_vector": vector }
                        }
                    }
                },
                "score_mode": "max"
            }
        }
    })
}

/// Parent documents from an OpenSearch `_search` response, in hit order.
pub fn parse_hits(data: &Value) -> Vec<Document> {
    let Some(hits) = data
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    let text = |source: Option<&Value>, key: &str| {
        source
            .and_then(|s| s.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    };

    hits.iter()
        .map(|hit| {
            let source = hit.get("_source");
            Document {
                doc_id: hit
                    .get("_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                file_name: text(source, "file_name"),
                file_path: text(source, "file_path"),
                summary: text(source, "summary"),
                timestamp: text(source, "timestamp"),
            }
        })
        .collect()
}

/// Document retrieval server role, read-only.
pub struct DocumentServer {
    backend: Arc<dyn DocumentBackend>,
}

impl DocumentServer {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self { backend }
    }

    async fn read_uri(&self, uri: &str) -> Result<ResourceContents> {
        let encoded = uri
            .strip_prefix(DOCUMENT_SEARCH_PREFIX)
            .ok_or_else(|| Error::NotFound(format!("resource: {}", uri)))?;
        let query = urlencoding::decode(encoded)
            .map_err(|e| Error::InvalidParams(format!("bad document query: {}", e)))?;

        let results = self.backend.search(&query).await?;
        Ok(ResourceContents {
            uri: uri.to_string(),
            mime_type: JSON_MIME.into(),
            text: json!({ "results": results, "count": results.len() }).to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
}

#[async_trait::async_trait]
impl McpHandler for DocumentServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::named("opensearch-document-server")
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            resources: Some(ResourceCapabilities::default()),
            ..Default::default()
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &["resources/list", "resources/read"]
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            // Documents are only reachable through a query URI.
            "resources/list" => Ok(json!({ "resources": [] })),
            "resources/read" => {
                let params: ReadParams = serde_json::from_value(params)
                    .map_err(|e| Error::InvalidParams(e.to_string()))?;
                let contents = self.read_uri(&params.uri).await?;
                Ok(serde_json::to_value(ReadResourceResult {
                    contents: vec![contents],
                })?)
            }
            other => Err(Error::Protocol(format!("unsupported method: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDocuments;

    #[async_trait::async_trait]
    impl DocumentBackend for FixedDocuments {
        async fn search(&self, query: &str) -> Result<Vec<Document>> {
            Ok(vec![Document {
                doc_id: "doc-1".into(),
                file_name: Some(format!("{}.pdf", query)),
                file_path: None,
                summary: Some("A summary.".into()),
                timestamp: None,
            }])
        }
    }

    #[test]
    fn test_hybrid_query_shape() {
        let body = hybrid_query("attention", &[0.5, -0.25]);
        let has_child = &body["query"]["has_child"];
        assert_eq!(has_child["type"], "chunk");
        assert_eq!(has_child["score_mode"], "max");

        let script_score = &has_child["query"]["script_score"];
        assert_eq!(
            script_score["query"]["bool"]["should"][0]["match"]["chunk_text"],
            "attention"
        );
        assert_eq!(
            script_score["script"]["params"]["query_vector"],
            json!([0.5, -0.25])
        );
    }

    #[test]
    fn test_parse_hits_keeps_order_and_tolerates_gaps() {
        let data = json!({
            "hits": { "hits": [
                { "_id": "a", "_source": {
                    "file_name": "a.pdf", "file_path": "/pdfs/a.pdf",
                    "summary": "first", "timestamp": "2024-01-01T00:00:00"
                } },
                { "_id": "b", "_source": { "file_name": "b.pdf" } }
            ] }
        });

        let docs = parse_hits(&data);
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].doc_id, "a");
        assert_eq!(docs[0].summary.as_deref(), Some("first"));
        assert_eq!(docs[1].doc_id, "b");
        assert!(docs[1].summary.is_none());

        assert!(parse_hits(&json!({})).is_empty());
    }

    #[test]
    fn test_parse_embedding() {
        let data = json!({ "data": [ { "embedding": [0.1, 0.2, 0.3] } ] });
        assert_eq!(parse_embedding(&data).unwrap().len(), 3);

        let err = parse_embedding(&json!({ "data": [] })).unwrap_err();
        assert!(err.is_upstream());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let backend = OpenSearchDocuments::new(
            &DocumentConfig::default(),
            &LlmConfig::default(),
            reqwest::Client::new(),
        );
        let err = backend.search("attention").await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_server_reads_search_uri() {
        let server = DocumentServer::new(Arc::new(FixedDocuments));
        let read = server
            .handle(
                "resources/read",
                json!({ "uri": document_search_uri("neural nets") }),
            )
            .await
            .unwrap();

        let text = read["contents"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["results"][0]["file_name"], "neural nets.pdf");
    }

    #[tokio::test]
    async fn test_server_rejects_other_uris() {
        let server = DocumentServer::new(Arc::new(FixedDocuments));
        let err = server
            .handle("resources/read", json!({ "uri": "store://x.md" }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
