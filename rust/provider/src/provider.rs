//! Provider configuration and the configured provider which is handed to every resource operation

use std::{path::PathBuf, str::FromStr};

use snafu::{ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    client::{
        Client,
        flavor::{ClusterFlavor, Distribution},
    },
    framework::types::common::Version,
};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to create the HTTP client"))]
    CreateClient { source: crate::client::Error },

    #[snafu(display("failed to parse the configured cluster version"))]
    ParseConfiguredVersion {
        source: crate::framework::types::common::Error,
    },

    #[snafu(display("failed to determine the cluster flavor"))]
    DetermineFlavor {
        source: crate::client::flavor::Error,
    },
}

type Result<T, E = Error> = std::result::Result<T, E>;

const DEFAULT_URL: &str = "http://localhost:9200";
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Connection settings of the provider
#[derive(clap::Args, Clone, Debug, Eq, PartialEq)]
pub struct ProviderConfig {
    /// URL of the OpenSearch or Elasticsearch cluster
    #[arg(long, env = "OPENSEARCH_URL", default_value = DEFAULT_URL)]
    pub url: String,

    /// Username for basic authentication
    #[arg(long, env = "OPENSEARCH_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "OPENSEARCH_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Disable the verification of the server certificate
    #[arg(long, env = "OPENSEARCH_INSECURE")]
    pub insecure: bool,

    /// PEM file with additional trusted CA certificates
    #[arg(long, env = "OPENSEARCH_CACERT_FILE")]
    pub cacert_file: Option<PathBuf>,

    /// PEM file with the client certificate for mutual TLS
    #[arg(long, env = "OPENSEARCH_CLIENT_CERT_PATH", requires = "client_key_path")]
    pub client_cert_path: Option<PathBuf>,

    /// PEM file with the key of the client certificate
    #[arg(long, env = "OPENSEARCH_CLIENT_KEY_PATH", requires = "client_cert_path")]
    pub client_key_path: Option<PathBuf>,

    /// Version of the cluster; if set, the version is not detected
    #[arg(long, env = "OPENSEARCH_VERSION")]
    pub opensearch_version: Option<String>,

    /// Distribution of the cluster; only used together with the configured version
    #[arg(long, env = "OPENSEARCH_DISTRIBUTION", value_enum)]
    pub distribution: Option<Distribution>,

    /// Timeout for a single request
    #[arg(
        long,
        env = "OPENSEARCH_REQUEST_TIMEOUT_SECONDS",
        default_value_t = DEFAULT_REQUEST_TIMEOUT_SECONDS
    )]
    pub request_timeout_seconds: u64,
}

#[cfg(test)]
impl ProviderConfig {
    /// Configuration with default values for the given URL
    pub fn for_url(url: &str) -> Self {
        ProviderConfig {
            url: url.to_owned(),
            username: None,
            password: None,
            insecure: false,
            cacert_file: None,
            client_cert_path: None,
            client_key_path: None,
            opensearch_version: None,
            distribution: None,
            request_timeout_seconds: 5,
        }
    }
}

/// A configured provider
///
/// Every resource operation uses the contained client and dispatches on the flavor.
#[derive(Clone, Debug)]
pub struct Provider {
    client: Client,
    flavor: ClusterFlavor,
}

impl Provider {
    pub fn new(client: Client, flavor: ClusterFlavor) -> Self {
        Provider { client, flavor }
    }

    /// Creates the client and determines the flavor, either from the configured version or by
    /// asking the cluster.
    pub async fn configure(config: &ProviderConfig) -> Result<Provider> {
        let client = Client::new(config).context(CreateClientSnafu)?;

        let flavor = match &config.opensearch_version {
            Some(raw_version) => {
                let version = Version::from_str(raw_version).context(ParseConfiguredVersionSnafu)?;
                let distribution = config.distribution.unwrap_or(Distribution::OpenSearch);
                tracing::info!(
                    %version,
                    %distribution,
                    "Skipping the version detection because the version is configured"
                );
                ClusterFlavor::resolve(distribution, version).context(DetermineFlavorSnafu)?
            }
            None => ClusterFlavor::detect(&client)
                .await
                .context(DetermineFlavorSnafu)?,
        };

        tracing::debug!(url = %client.base_url(), %flavor, "Provider configured");

        Ok(Provider::new(client, flavor))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn flavor(&self) -> ClusterFlavor {
        self.flavor
    }
}
