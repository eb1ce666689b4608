//! Authorized request client for the Miguafi REST API.
//!
//! Every call is exactly one round-trip: no retries, no timeouts, no caching.
//! The credential is passed per call rather than captured, so the client
//! never holds session state of its own.
//!
//! ERROR HANDLING
//! ==============
//! Non-2xx responses become [`ApiError::RequestRejected`] carrying the raw
//! body text; transport failures become [`ApiError::NetworkUnavailable`]; a
//! 2xx body that does not fit the caller's type becomes [`ApiError::Decode`].

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;

use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{ClientConfig, normalize_base_url};
use crate::error::ApiError;

pub const LOGIN_PATH: &str = "/auth/login";

const LOGIN_DECODE_MESSAGE: &str = "login response missing access_token";

#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Shared HTTP client bound to one server base URL.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::HttpClientBuild`] if the TLS backend cannot be initialized.
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: normalize_base_url(base_url) })
    }

    /// Build a client from resolved configuration.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::new`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        Self::new(&config.base_url)
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str, credential: Option<&str>) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match credential.filter(|c| !c.is_empty()) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // =========================================================================
    // TYPED VERBS
    // =========================================================================

    /// `GET {path}` decoded as `T`.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, credential: Option<&str>) -> Result<T, ApiError> {
        let resp = send(self.request(Method::GET, path, credential), path).await?;
        decode(resp).await
    }

    /// `POST {path}` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn post<B, T>(&self, path: &str, body: &B, credential: Option<&str>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = send(self.request(Method::POST, path, credential).json(body), path).await?;
        decode(resp).await
    }

    /// `PUT {path}` with a JSON body, decoded as `T`.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn put<B, T>(&self, path: &str, body: &B, credential: Option<&str>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = send(self.request(Method::PUT, path, credential).json(body), path).await?;
        decode(resp).await
    }

    /// Multipart `POST {path}`, decoded as `T`.
    ///
    /// The content type and boundary come from the transport; setting them by
    /// hand breaks server-side parsing.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn upload<T: DeserializeOwned>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
        credential: Option<&str>,
    ) -> Result<T, ApiError> {
        let resp = send(self.request(Method::POST, path, credential).multipart(form), path).await?;
        decode(resp).await
    }

    // =========================================================================
    // VOID VERBS
    // =========================================================================

    /// Body-less `POST {path}`; only the status is checked.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn post_void(&self, path: &str, credential: Option<&str>) -> Result<(), ApiError> {
        send(self.request(Method::POST, path, credential), path).await.map(drop)
    }

    /// Body-less `PUT {path}`; only the status is checked.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn put_void(&self, path: &str, credential: Option<&str>) -> Result<(), ApiError> {
        send(self.request(Method::PUT, path, credential), path).await.map(drop)
    }

    /// `DELETE {path}`; only the status is checked.
    ///
    /// # Errors
    ///
    /// See the module-level error contract.
    pub async fn delete_void(&self, path: &str, credential: Option<&str>) -> Result<(), ApiError> {
        send(self.request(Method::DELETE, path, credential), path).await.map(drop)
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Exchange an identifier/secret pair for a credential at `POST /auth/login`.
    ///
    /// The pair is sent form-encoded as `username`/`password`, which is what
    /// the server's password-form dependency parses.
    ///
    /// # Errors
    ///
    /// Any rejection or transport failure collapses to
    /// [`ApiError::InvalidCredentials`] so the login body never reaches the
    /// caller. A 2xx without a usable `access_token` is [`ApiError::Decode`].
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> Result<String, ApiError> {
        let form = [("username", identifier), ("password", secret)];
        let resp = match self.http.post(self.url(LOGIN_PATH)).form(&form).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(error = %e, "login request failed before a response");
                return Err(ApiError::InvalidCredentials);
            }
        };
        let status = resp.status();
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "login rejected");
            return Err(ApiError::InvalidCredentials);
        }
        // The serde message can quote body fragments, so it is replaced.
        let body: TokenResponse = decode(resp).await.map_err(|e| match e {
            ApiError::Decode(_) => ApiError::Decode(LOGIN_DECODE_MESSAGE.to_owned()),
            other => other,
        })?;
        if body.access_token.is_empty() {
            return Err(ApiError::Decode(LOGIN_DECODE_MESSAGE.to_owned()));
        }
        Ok(body.access_token)
    }
}

async fn send(builder: RequestBuilder, path: &str) -> Result<Response, ApiError> {
    let resp = builder.send().await.map_err(|e| {
        tracing::debug!(%path, error = %e, "request failed before a response");
        ApiError::NetworkUnavailable(e)
    })?;
    let status = resp.status();
    tracing::debug!(%path, status = status.as_u16(), "response received");
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::RequestRejected { status: status.as_u16(), body })
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let bytes = resp.bytes().await.map_err(ApiError::NetworkUnavailable)?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
}
