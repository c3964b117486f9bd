use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result, TransportFailure};
use crate::model::TokenPair;
use crate::session::Session;

/// Response header the server sets when the access token has expired.
const TOKEN_EXPIRED: &str = "Token-Expired";

/// HTTP client for the REST API.
///
/// Attaches the session's bearer token to each request. When the server
/// answers with `Token-Expired`, the token pair is refreshed once and the
/// request replayed once. Clones share one refresh at a time, so requests
/// that expire together rotate the refresh token only once.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    session: Session,
    refreshing: Arc<Mutex<()>>,
}

#[derive(Debug, Deserialize)]
struct UploadedImage {
    url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, session: Session) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base: config.api_base(),
            session,
            refreshing: Arc::new(Mutex::new(())),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, TransportFailure>
    where
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.execute(|http| http.get(&url)).await?;
        decode(response).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, TransportFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.execute(|http| http.post(&url).json(body)).await?;
        decode(response).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, TransportFailure>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let response = self.execute(|http| http.put(&url).json(body)).await?;
        decode(response).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), TransportFailure> {
        let url = self.url(path);
        self.execute(|http| http.delete(&url)).await?;
        Ok(())
    }

    /// Upload raw image bytes and return the URL the server stored them at.
    pub async fn upload_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, TransportFailure> {
        let url = self.url("images");
        let size = bytes.len();
        let response = self
            .execute(|http| {
                http.post(&url)
                    .header(CONTENT_TYPE, content_type)
                    .body(bytes.clone())
            })
            .await?;
        let uploaded: UploadedImage = decode(response).await?;
        debug!(size, url = %uploaded.url, "image uploaded");
        Ok(uploaded.url)
    }

    /// Send a request built by `build`, refreshing the token and replaying
    /// it once if the server reports the access token expired.
    pub(crate) async fn execute<F>(&self, build: F) -> Result<Response, TransportFailure>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let used = self.session.tokens();
        let response = self.send(build(&self.http), used.as_ref()).await?;
        if !response.headers().contains_key(TOKEN_EXPIRED) {
            return check(response).await;
        }

        let Some(expired) = used else {
            return check(response).await;
        };
        self.refresh_once(&expired).await?;
        let retried = self
            .send(build(&self.http), self.session.tokens().as_ref())
            .await?;
        check(retried).await
    }

    async fn send(
        &self,
        request: RequestBuilder,
        tokens: Option<&TokenPair>,
    ) -> Result<Response, TransportFailure> {
        let request = match tokens {
            Some(tokens) => request.header(AUTHORIZATION, format!("Bearer {}", tokens.access_token)),
            None => request,
        };
        request.send().await.map_err(TransportFailure::network)
    }

    /// Refresh unless another request already replaced `expired` while this
    /// one waited for its turn.
    async fn refresh_once(&self, expired: &TokenPair) -> Result<(), TransportFailure> {
        let _turn = self.refreshing.lock().await;
        match self.session.tokens() {
            Some(current) if current.access_token == expired.access_token => {
                self.refresh(current).await
            }
            Some(_) => {
                debug!("token already refreshed by a concurrent request");
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn refresh(&self, tokens: TokenPair) -> Result<(), TransportFailure> {
        debug!("access token expired, refreshing");
        let response = self
            .http
            .post(self.url("auth/refresh"))
            .json(&tokens)
            .send()
            .await
            .map_err(TransportFailure::network)?;
        let response = check(response).await.inspect_err(|failure| {
            warn!(status = ?failure.status, "token refresh rejected");
        })?;
        let fresh: TokenPair = decode(response).await?;
        self.session.set_tokens(fresh);
        Ok(())
    }
}

async fn check(response: Response) -> Result<Response, TransportFailure> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "request rejected");
    Err(TransportFailure::from_body(status.as_u16(), &text))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportFailure> {
    let status = response.status().as_u16();
    let text = response.text().await.map_err(TransportFailure::network)?;
    // Empty bodies decode as JSON null so `()` and `Option<_>` work.
    let text = if text.trim().is_empty() { "null" } else { text.as_str() };
    serde_json::from_str(text).map_err(|e| {
        TransportFailure::new(
            Some(status),
            serde_json::Value::String(format!("invalid response body: {e}")),
        )
    })
}
