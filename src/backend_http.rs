//! JSON-over-HTTP backend.
//!
//! Forwards each [`NativeQuery`] to a remote query service and decodes the
//! [`NativePage`] it answers with:
//!
//! | Contract | Request |
//! |----------|---------|
//! | submissions | `POST {base_url}/submissions/query` |
//! | collections | `POST {base_url}/collections/{id}/query` |
//! | collection listing | `GET {base_url}/collections` |
//!
//! The request body is the serialized `NativeQuery`; collection ids are
//! percent-encoded as a single path segment. Non-2xx answers become
//! [`BackendError::Status`]; `404` becomes [`BackendError::Unavailable`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;

use crate::backend::{
    CollectionBackend, CollectionMeta, NativePage, NativeQuery, SubmissionBackend,
};
use crate::error::BackendError;

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| BackendError::QueryBuild(format!("invalid base url '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::QueryBuild(format!(
                "base url '{}' cannot carry a path",
                base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    /// `base_url` with `segments` appended, each one percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn decode<T: DeserializeOwned>(url: &Url, response: Response) -> Result<T, BackendError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::Unavailable(format!("{} returned 404", url)));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn post_query(&self, url: Url, query: &NativeQuery) -> Result<NativePage, BackendError> {
        tracing::debug!(%url, limit = query.limit, "Posting native query");

        let response = self
            .client
            .post(url.clone())
            .json(query)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(&url, response).await
    }
}

#[async_trait]
impl SubmissionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn find(&self, query: &NativeQuery) -> Result<NativePage, BackendError> {
        let url = self.endpoint(&["submissions", "query"]);
        self.post_query(url, query).await
    }
}

#[async_trait]
impl CollectionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn find(
        &self,
        collection_id: &str,
        query: &NativeQuery,
    ) -> Result<NativePage, BackendError> {
        let url = self.endpoint(&["collections", collection_id, "query"]);
        self.post_query(url, query).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionMeta>, BackendError> {
        let url = self.endpoint(&["collections"]);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Self::decode(&url, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_id_is_one_encoded_segment() {
        let backend = HttpBackend::new("http://localhost:8080/api/", 5).unwrap();
        let url = backend.endpoint(&["collections", "a/b?c#d", "query"]);
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/collections/a%2Fb%3Fc%23d/query"
        );

        let bare = HttpBackend::new("http://localhost:8080", 5).unwrap();
        assert_eq!(
            bare.endpoint(&["submissions", "query"]).as_str(),
            "http://localhost:8080/submissions/query"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpBackend::new("not a url", 5),
            Err(BackendError::QueryBuild(_))
        ));
        assert!(matches!(
            HttpBackend::new("mailto:ops@example.com", 5),
            Err(BackendError::QueryBuild(_))
        ));
    }
}
