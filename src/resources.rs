//! File-backed resource store and the resource server.
//!
//! Resources are plain files under one directory. Writes are not atomic and
//! nothing is locked: two writers to the same name race and the last write
//! wins.

use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::catalog::PaperCatalog;
use crate::error::{Error, Result};
use crate::protocol::{
    ReadResourceResult, ResourceCapabilities, ResourceContents, ResourceDefinition,
    ServerCapabilities, ServerInfo,
};
use crate::server::McpHandler;

/// URI scheme of stored resources.
pub const STORE_SCHEME: &str = "store://";
/// URI prefix of paper catalog searches.
pub const PAPER_SEARCH_PREFIX: &str = "papers://search/";

const TEXT_MIME: &str = "text/plain";
const JSON_MIME: &str = "application/json";

/// URI of a stored resource.
pub fn store_uri(name: &str) -> String {
    format!("{}{}", STORE_SCHEME, name)
}

/// URI of a paper catalog search.
pub fn paper_search_uri(query: &str) -> String {
    format!("{}{}", PAPER_SEARCH_PREFIX, urlencoding::encode(query))
}

/// Named text artifacts on local disk.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    root: PathBuf,
}

impl ResourceStore {
    /// Store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }

    /// Write `content` under `name`, replacing any previous content.
    pub async fn create(&self, name: &str, content: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, content).await?;
        info!(resource = name, bytes = content.len(), "Stored resource");
        Ok(())
    }

    /// Read the content stored under `name`.
    pub async fn read(&self, name: &str) -> Result<String> {
        let path = self.path_for(name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| not_found_or_io(e, name))
    }

    /// Remove the resource stored under `name`.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(e, name))?;
        info!(resource = name, "Deleted resource");
        Ok(())
    }

    /// Names of all stored resources, sorted.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Resource names are single path components.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(Error::InvalidParams(format!(
            "invalid resource name: {:?}",
            name
        )));
    }
    Ok(())
}

fn not_found_or_io(e: std::io::Error, name: &str) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound(format!("resource: {}", name))
    } else {
        Error::Io(e)
    }
}

/// Resource server role: the store plus the paper catalog.
pub struct ResourceServer {
    store: ResourceStore,
    catalog: PaperCatalog,
}

impl ResourceServer {
    pub fn new(store: ResourceStore, catalog: PaperCatalog) -> Self {
        Self { store, catalog }
    }

    async fn read_uri(&self, uri: &str) -> Result<ResourceContents> {
        if let Some(name) = uri.strip_prefix(STORE_SCHEME) {
            return Ok(ResourceContents {
                uri: uri.to_string(),
                mime_type: TEXT_MIME.into(),
                text: self.store.read(name).await?,
            });
        }

        if let Some(encoded) = uri.strip_prefix(PAPER_SEARCH_PREFIX) {
            let query = urlencoding::decode(encoded)
                .map_err(|e| Error::InvalidParams(format!("bad paper query: {}", e)))?;
            let results = self.catalog.search(&query)?;
            debug!(query = %query, matches = results.len(), "Paper catalog search");
            return Ok(ResourceContents {
                uri: uri.to_string(),
                mime_type: JSON_MIME.into(),
                text: json!({ "results": results, "count": results.len() }).to_string(),
            });
        }

        Err(Error::NotFound(format!("resource: {}", uri)))
    }
}

#[derive(Debug, Deserialize)]
struct ReadParams {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct CreateParams {
    name: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    name: String,
}

fn parse<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))
}

#[async_trait::async_trait]
impl McpHandler for ResourceServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo::named("file-resource-server")
    }

    fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            resources: Some(ResourceCapabilities::default()),
            ..Default::default()
        }
    }

    fn methods(&self) -> &'static [&'static str] {
        &[
            "resources/list",
            "resources/read",
            "resources/create",
            "resources/delete",
        ]
    }

    async fn handle(&self, method: &str, params: Value) -> Result<Value> {
        match method {
            "resources/list" => {
                let resources: Vec<_> = self
                    .store
                    .list()
                    .await?
                    .into_iter()
                    .map(|name| ResourceDefinition {
                        uri: store_uri(&name),
                        name,
                        mime_type: TEXT_MIME.into(),
                    })
                    .collect();
                Ok(json!({ "resources": resources }))
            }
            "resources/read" => {
                let params: ReadParams = parse(params)?;
                let contents = self.read_uri(&params.uri).await?;
                Ok(serde_json::to_value(ReadResourceResult {
                    contents: vec![contents],
                })?)
            }
            "resources/create" => {
                let params: CreateParams = parse(params)?;
                self.store.create(&params.name, &params.text).await?;
                Ok(json!({ "uri": store_uri(&params.name) }))
            }
            "resources/delete" => {
                let params: DeleteParams = parse(params)?;
                self.store.delete(&params.name).await?;
                Ok(json!({ "uri": store_uri(&params.name) }))
            }
            other => Err(Error::Protocol(format!("unsupported method: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, ResourceStore) {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::new(dir.path().join("resources"));
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_then_read() {
        let (_dir, store) = store();
        store.create("note.md", "hello\nworld").await.unwrap();
        assert_eq!(store.read("note.md").await.unwrap(), "hello\nworld");
    }

    #[tokio::test]
    async fn test_delete_then_read_is_not_found() {
        let (_dir, store) = store();
        store.create("note.md", "x").await.unwrap();
        store.delete("note.md").await.unwrap();

        let err = store.read("note.md").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (_dir, store) = store();
        let err = store.delete("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (_dir, store) = store();
        store.create("n", "first").await.unwrap();
        store.create("n", "second").await.unwrap();
        assert_eq!(store.read("n").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().await.unwrap().is_empty());

        store.create("b", "2").await.unwrap();
        store.create("a", "1").await.unwrap();
        assert_eq!(store.list().await.unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_names_stay_inside_root() {
        for bad in ["", " ", ".", "..", "../x", "a/b", "a\\b"] {
            assert!(validate_name(bad).is_err(), "{bad:?} accepted");
        }
        assert!(validate_name("summary-weather.md").is_ok());
    }

    #[tokio::test]
    async fn test_server_store_round_trip() {
        let (_dir, store) = store();
        let server = ResourceServer::new(store, PaperCatalog::seeded());

        let created = server
            .handle("resources/create", json!({"name": "s.md", "text": "sum"}))
            .await
            .unwrap();
        assert_eq!(created["uri"], "store://s.md");

        let read = server
            .handle("resources/read", json!({"uri": "store://s.md"}))
            .await
            .unwrap();
        assert_eq!(read["contents"][0]["text"], "sum");

        let listed = server.handle("resources/list", json!({})).await.unwrap();
        assert_eq!(listed["resources"][0]["name"], "s.md");
    }

    #[tokio::test]
    async fn test_server_paper_search() {
        let (_dir, store) = store();
        let server = ResourceServer::new(store, PaperCatalog::seeded());

        let read = server
            .handle(
                "resources/read",
                json!({"uri": paper_search_uri("language model")}),
            )
            .await
            .unwrap();
        let text = read["contents"][0]["text"].as_str().unwrap();
        let body: Value = serde_json::from_str(text).unwrap();
        assert!(body["count"].as_u64().unwrap() >= 2);
        assert_eq!(read["contents"][0]["mimeType"], JSON_MIME);
    }

    #[tokio::test]
    async fn test_unknown_scheme_is_not_found() {
        let (_dir, store) = store();
        let server = ResourceServer::new(store, PaperCatalog::seeded());
        let err = server
            .handle("resources/read", json!({"uri": "ftp://x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
