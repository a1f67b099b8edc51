use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};

use super::QdrantError;

/// Shape of the collections this application writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub dense_name: String,
    pub sparse_name: String,
    pub dimension: u64,
}

/// Result of an idempotent create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

pub struct QdrantClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantClient {
    pub fn new(client: Client, url: &str, api_key: &str) -> Result<Self, QdrantError> {
        let base_url = normalize_base_url(url).map_err(QdrantError::InvalidUrl)?;
        let api_key = (!api_key.is_empty()).then(|| api_key.to_string());
        tracing::debug!(
            url = %base_url,
            has_api_key = api_key.is_some(),
            "Initialized Qdrant HTTP client"
        );
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub async fn collection_exists(&self, collection_name: &str) -> Result<bool, QdrantError> {
        let response = self
            .request(Method::GET, &format!("collections/{collection_name}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = QdrantError::UnexpectedStatus { status, body };
                tracing::error!(collection = collection_name, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    /// Create a collection with one named dense and one named sparse vector.
    ///
    /// A conflict (another writer created it first) is reported as `AlreadyExists`.
    pub async fn create_collection(
        &self,
        collection_name: &str,
        spec: &CollectionSpec,
    ) -> Result<CreateOutcome, QdrantError> {
        let body = json!({
            "vectors": {
                spec.dense_name.as_str(): {
                    "size": spec.dimension,
                    "distance": "Cosine",
                    "on_disk": true
                }
            },
            "sparse_vectors": {
                spec.sparse_name.as_str(): { "modifier": "idf" }
            },
            "hnsw_config": { "on_disk": true }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{collection_name}"))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(collection = collection_name, "Collection created");
            return Ok(CreateOutcome::Created);
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::CONFLICT
            || (status == StatusCode::BAD_REQUEST && body.contains("already exists"))
        {
            tracing::debug!(collection = collection_name, "Collection already exists");
            return Ok(CreateOutcome::AlreadyExists);
        }
        let error = QdrantError::UnexpectedStatus { status, body };
        tracing::error!(collection = collection_name, error = %error, "Failed to create collection");
        Err(error)
    }

    /// Upsert serialized points and wait until they are applied.
    pub async fn upsert_points(
        &self,
        collection_name: &str,
        points: Vec<Value>,
    ) -> Result<usize, QdrantError> {
        if points.is_empty() {
            return Ok(0);
        }
        let point_count = points.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{collection_name}/points"),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        ensure_success(response).await?;
        tracing::debug!(
            collection = collection_name,
            points = point_count,
            "Points upserted"
        );
        Ok(point_count)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            req = req.header("api-key", api_key);
        }
        req
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), QdrantError> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let error = QdrantError::UnexpectedStatus { status, body };
    tracing::error!(error = %error, "Qdrant request failed");
    Err(error)
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url.trim()).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_join_without_double_slashes() {
        let base = normalize_base_url("http://localhost:6333/").unwrap();
        assert_eq!(
            format_endpoint(&base, "/collections/x"),
            "http://localhost:6333/collections/x"
        );
    }

    #[test]
    fn invalid_urls_are_rejected() {
        let err = QdrantClient::new(Client::new(), "not a url", "")
            .err()
            .expect("invalid url");
        assert!(matches!(err, QdrantError::InvalidUrl(_)));
    }
}
