//! HTTP API client for the remote feed service
//!
//! Wraps [`RetryingTransport`] with base-URL resolution, credentials and the
//! integration headers every call carries.

use reqwest::{Certificate, Client, Method, Proxy, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Result, SyncError};
use crate::transport::{RetryPolicy, RetryingTransport, TransportResponse};

// ============================================================================
// API Client Constants
// ============================================================================

/// Default primary API URL.
pub const DEFAULT_API_URL: &str = "https://api.safetyculture.io";

/// Default secondary (SHEQSY) API URL.
pub const DEFAULT_SHEQSY_URL: &str = "https://app.sheqsy.com";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Identifies this integration to the server.
pub const INTEGRATION_ID: &str = "feedsync";

pub const INTEGRATION_ID_HEADER: &str = "sc-integration-id";
pub const INTEGRATION_VERSION_HEADER: &str = "sc-integration-version";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const WHOAMI_PATH: &str = "accounts/user/v1/user:WhoAmI";

/// How a client authenticates
#[derive(Clone)]
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Bearer(_) => write!(f, "Bearer(***)"),
            Credentials::Basic { username, .. } => write!(f, "Basic({}:***)", username),
        }
    }
}

/// Transport-level options shared by both API scopes
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub proxy_url: Option<String>,
    pub tls_skip_verify: bool,
    /// Extra PEM root certificate
    pub tls_cert: Option<PathBuf>,
    pub retry: RetryPolicy,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            proxy_url: None,
            tls_skip_verify: false,
            tls_cert: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl HttpOptions {
    fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.tls_skip_verify);

        if let Some(ref proxy) = self.proxy_url {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        if let Some(ref path) = self.tls_cert {
            let pem = std::fs::read(path)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        Ok(builder.build()?)
    }
}

/// Response from the WhoAmI endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct WhoAmI {
    pub user_id: String,
    pub organisation_id: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
}

/// Company details from the SHEQSY API
#[derive(Debug, Clone, Deserialize)]
pub struct SheqsyCompany {
    #[serde(rename = "companyUId")]
    pub company_uid: String,
    #[serde(rename = "companyName", default)]
    pub company_name: Option<String>,
}

/// Authenticated client for one API scope
#[derive(Debug, Clone)]
pub struct ApiClient {
    transport: RetryingTransport,
    base_url: Url,
    credentials: Credentials,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, credentials: Credentials, options: &HttpOptions) -> Result<Self> {
        // Url::join drops the last path segment unless the base ends in '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|e| SyncError::config(format!("invalid API url '{}': {}", base_url, e)))?;

        Ok(Self {
            transport: RetryingTransport::new(options.build_client()?, options.retry),
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn transport(&self) -> &RetryingTransport {
        &self.transport
    }

    /// Resolve a path, a root-relative cursor, or an absolute URL
    pub fn resolve(&self, path_or_url: &str) -> Result<Url> {
        self.base_url
            .join(path_or_url)
            .map_err(|e| SyncError::data_integrity(format!("invalid url '{}': {}", path_or_url, e)))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .transport
            .client()
            .request(method, url)
            .header(INTEGRATION_ID_HEADER, INTEGRATION_ID)
            .header(INTEGRATION_VERSION_HEADER, env!("CARGO_PKG_VERSION"))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());

        match &self.credentials {
            Credentials::Bearer(token) => builder.bearer_auth(token),
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            },
        }
    }

    /// GET with query parameters, retried by the transport
    pub async fn get(&self, path_or_url: &str, query: &[(String, String)]) -> Result<TransportResponse> {
        let url = self.resolve(path_or_url)?;
        let mut builder = self.request(Method::GET, url);
        if !query.is_empty() {
            builder = builder.query(query);
        }
        self.transport.execute(builder.build()?).await
    }

    /// POST a JSON body, retried by the transport
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<TransportResponse> {
        let url = self.resolve(path)?;
        let request = self.request(Method::POST, url).json(body).build()?;
        self.transport.execute(request).await
    }

    /// GET and decode a JSON body, failing on any non-success status
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = ensure_success(self.get(path, &[]).await?)?;
        decode_json(response).await
    }

    /// Details of the user that owns the bearer token
    pub async fn whoami(&self) -> Result<WhoAmI> {
        self.get_json(WHOAMI_PATH).await
    }

    /// Resolve a SHEQSY company id to its UID
    pub async fn sheqsy_company(&self, company_id: &str) -> Result<SheqsyCompany> {
        self.get_json(&format!("SheqsyIntegrationApi/api/v3/companies/{}", company_id))
            .await
    }
}

/// Map 403/404 to their non-blocking errors and anything else non-2xx to
/// [`SyncError::UnexpectedStatus`].
pub fn ensure_success(outcome: TransportResponse) -> Result<Response> {
    let response = outcome.response;
    let status = response.status();
    let url = response.url().to_string();

    match status {
        s if s.is_success() => Ok(response),
        StatusCode::FORBIDDEN => Err(SyncError::Forbidden { url }),
        StatusCode::NOT_FOUND => Err(SyncError::NotFound { url }),
        s => Err(SyncError::UnexpectedStatus {
            status: s.as_u16(),
            url,
        }),
    }
}

/// Read a body and decode it, reporting shape mismatches as data-integrity errors
pub async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let url = response.url().to_string();
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| SyncError::data_integrity(format!("{}: {}", url, e)))
}
