use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::Instance;
use crate::types::DaemonError;

/// Issues authenticated calls against one daemon's management API.
///
/// Every request carries the instance's API key and races against the shared
/// batch deadline token; losing that race yields `DaemonError::Timeout`
/// regardless of how far the underlying transfer progressed.
#[derive(Clone)]
pub struct DaemonClient {
    http: Client,
    base_url: String,
    api_key: String,
    cancel: CancellationToken,
}

impl DaemonClient {
    pub fn new(http: Client, instance: &Instance, cancel: CancellationToken) -> Self {
        Self {
            http,
            base_url: instance.base_url.clone(),
            api_key: instance.api_key.clone(),
            cancel,
        }
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, DaemonError>
    where
        T: DeserializeOwned,
    {
        self.get_json_with_query(path, &()).await
    }

    pub async fn get_json_with_query<T, Q>(&self, path: &str, query: &Q) -> Result<T, DaemonError>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let request = self.http.get(self.url(path)).query(query);
        let response = self.send(request).await?;
        self.read_json(response).await
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Result<(), DaemonError> {
        let request = self.http.put(self.url(path)).json(body);
        self.send(request).await.map(|_| ())
    }

    pub async fn post_with_query<Q>(&self, path: &str, query: &Q) -> Result<(), DaemonError>
    where
        Q: Serialize + ?Sized,
    {
        let request = self.http.post(self.url(path)).query(query);
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, DaemonError> {
        let request = request.header("X-API-Key", &self.api_key);
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DaemonError::Timeout),
            result = request.send() => result?,
        };
        if !response.status().is_success() {
            return Err(DaemonError::Status(response.status()));
        }
        Ok(response)
    }

    async fn read_json<T>(&self, response: Response) -> Result<T, DaemonError>
    where
        T: DeserializeOwned,
    {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DaemonError::Timeout),
            body = response.json::<T>() => Ok(body?),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
