//! HTTP access to the cluster
//!
//! The client only knows how to send JSON requests and how to turn error responses into
//! [`Error::RequestFailed`]. Which API paths are used depends on the [`flavor::ClusterFlavor`].

use std::{path::PathBuf, time::Duration};

use percent_encoding::percent_decode_str;
use reqwest::{Certificate, Identity, Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};
use url::Url;

use crate::provider::ProviderConfig;

pub mod flavor;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to parse the cluster URL {url:?}"))]
    ParseUrl {
        source: url::ParseError,
        url: String,
    },

    #[snafu(display("the cluster URL {url} cannot be used as a base URL"))]
    UrlCannotBeABase { url: Url },

    #[snafu(display("failed to read the CA certificate file {path:?}"))]
    ReadCaCert {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse the CA certificate file {path:?}"))]
    ParseCaCert {
        source: reqwest::Error,
        path: PathBuf,
    },

    #[snafu(display("client certificate and client key must be given together"))]
    IncompleteClientIdentity,

    #[snafu(display("failed to read the client identity file {path:?}"))]
    ReadClientIdentity {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse the client certificate and key"))]
    ParseClientIdentity { source: reqwest::Error },

    #[snafu(display("failed to build the HTTP client"))]
    BuildHttpClient { source: reqwest::Error },

    #[snafu(display("failed to send {method} request to {url}"))]
    SendRequest {
        source: reqwest::Error,
        method: Method,
        url: Url,
    },

    #[snafu(display("failed to read the response of {method} {url}"))]
    ReadResponse {
        source: reqwest::Error,
        method: Method,
        url: Url,
    },

    #[snafu(display("failed to decode the response of {method} {url}"))]
    DecodeResponse {
        source: serde_json::Error,
        method: Method,
        url: Url,
    },

    #[snafu(display("{method} {url} failed with status {status}: {reason}"))]
    RequestFailed {
        method: Method,
        url: Url,
        status: StatusCode,
        reason: String,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Returns `true` if the cluster answered with `404 Not Found`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::RequestFailed { status, .. } if *status == StatusCode::NOT_FOUND)
    }
}

/// Status message returned by the security plugin for write requests
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// JSON-over-HTTP client for one cluster
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl Client {
    pub fn new(config: &ProviderConfig) -> Result<Client> {
        let mut base_url = Url::parse(&config.url).context(ParseUrlSnafu { url: &config.url })?;
        if base_url.cannot_be_a_base() {
            return UrlCannotBeABaseSnafu { url: base_url }.fail();
        }
        // Userinfo must not end up in URLs which are logged or part of error messages.
        let url_credentials = take_userinfo(&mut base_url);

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .danger_accept_invalid_certs(config.insecure);

        if let Some(path) = &config.cacert_file {
            let pem = std::fs::read(path).context(ReadCaCertSnafu { path })?;
            let certificate = Certificate::from_pem(&pem).context(ParseCaCertSnafu { path })?;
            builder = builder.add_root_certificate(certificate);
        }

        match (&config.client_cert_path, &config.client_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let mut pem = std::fs::read(cert_path)
                    .context(ReadClientIdentitySnafu { path: cert_path })?;
                pem.push(b'\n');
                pem.extend(
                    std::fs::read(key_path).context(ReadClientIdentitySnafu { path: key_path })?,
                );
                let identity = Identity::from_pem(&pem).context(ParseClientIdentitySnafu)?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => return IncompleteClientIdentitySnafu.fail(),
        }

        let http = builder.build().context(BuildHttpClientSnafu)?;

        let credentials = config
            .username
            .as_ref()
            .map(|username| Credentials {
                username: username.clone(),
                password: config.password.clone(),
            })
            .or(url_credentials);

        Ok(Client {
            http,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends a request to the given path and decodes the JSON response.
    ///
    /// The path segments are percent-encoded, so a segment may contain any character.
    pub async fn perform_request<B, R>(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path)?;

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(credentials) = &self.credentials {
            request = request.basic_auth(&credentials.username, credentials.password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(%method, %url, "Sending request");

        let response = request.send().await.context(SendRequestSnafu {
            method: method.clone(),
            url: url.clone(),
        })?;
        let status = response.status();
        let text = response.text().await.context(ReadResponseSnafu {
            method: method.clone(),
            url: url.clone(),
        })?;

        tracing::debug!(%method, %url, %status, "Received response");

        if !status.is_success() {
            return RequestFailedSnafu {
                method,
                url,
                status,
                reason: error_reason(&text),
            }
            .fail();
        }

        serde_json::from_str(&text).context(DecodeResponseSnafu { method, url })
    }

    fn url(&self, path: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .ok()
            .context(UrlCannotBeABaseSnafu {
                url: self.base_url.clone(),
            })?
            .pop_if_empty()
            .extend(path);
        Ok(url)
    }
}

/// Removes the username and password from the URL and returns them as credentials.
fn take_userinfo(url: &mut Url) -> Option<Credentials> {
    let decode = |value: &str| percent_decode_str(value).decode_utf8_lossy().into_owned();

    let credentials = if url.username().is_empty() {
        None
    } else {
        Some(Credentials {
            username: decode(url.username()),
            password: url.password().map(decode),
        })
    };

    // Both only fail for URLs without a host, which carry no userinfo.
    let _ = url.set_username("");
    let _ = url.set_password(None);

    credentials
}

/// Extracts a human readable reason from an error response.
///
/// The security plugin answers with `{"status": ..., "message": ...}` whereas the cluster itself
/// answers with `{"error": {"reason": ...}, "status": ...}`.
fn error_reason(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ErrorDetail {
        Structured { reason: Option<String> },
        Plain(String),
    }

    let reason = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|error_body| match (error_body.message, error_body.error) {
            (Some(message), _) => Some(message),
            (None, Some(ErrorDetail::Structured { reason })) => reason,
            (None, Some(ErrorDetail::Plain(reason))) => Some(reason),
            (None, None) => None,
        });

    reason.unwrap_or_else(|| body.trim().to_owned())
}
