//! Selection of the API flavor depending on the distribution and version of the cluster

use std::str::FromStr;

use reqwest::Method;
use serde::Deserialize;
use snafu::{ResultExt, Snafu, ensure};
use strum::{Display, EnumDiscriminants, IntoStaticStr};

use super::Client;
use crate::framework::types::common::Version;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("failed to fetch the cluster information"))]
    FetchServerInfo { source: super::Error },

    #[snafu(display("failed to parse the cluster version"))]
    ParseVersion {
        source: crate::framework::types::common::Error,
    },

    #[snafu(display("Elasticsearch {version} is older than 6.0.0"))]
    ClusterTooOld { version: Version },

    #[snafu(display("roles are only supported on Elasticsearch >= 7 and OpenSearch"))]
    RolesNotSupported { flavor: ClusterFlavor },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Response of `GET /`
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ServerInfo {
    pub version: ServerVersion,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct ServerVersion {
    pub number: String,

    // Only set by OpenSearch
    #[serde(default)]
    pub distribution: Option<String>,
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, clap::ValueEnum)]
#[strum(serialize_all = "lowercase")]
pub enum Distribution {
    #[value(name = "opensearch")]
    OpenSearch,
    Elasticsearch,
}

/// The API dialect spoken by the cluster
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ClusterFlavor {
    /// OpenSearch with the security plugin under `_plugins`
    OpenSearch,

    /// Elasticsearch 7 or newer with the Open Distro security plugin
    OpenDistro,

    /// Elasticsearch 6 which does not offer the roles API
    Elasticsearch6,
}

impl ClusterFlavor {
    pub fn resolve(distribution: Distribution, version: Version) -> Result<ClusterFlavor> {
        match distribution {
            Distribution::OpenSearch => Ok(ClusterFlavor::OpenSearch),
            Distribution::Elasticsearch => {
                ensure!(version.major >= 6, ClusterTooOldSnafu { version });
                if version.major == 6 {
                    Ok(ClusterFlavor::Elasticsearch6)
                } else {
                    Ok(ClusterFlavor::OpenDistro)
                }
            }
        }
    }

    pub fn from_server_info(server_info: &ServerInfo) -> Result<ClusterFlavor> {
        let version = Version::from_str(&server_info.version.number).context(ParseVersionSnafu)?;

        let distribution = match server_info.version.distribution.as_deref() {
            Some(distribution) if distribution.eq_ignore_ascii_case("opensearch") => {
                Distribution::OpenSearch
            }
            _ => Distribution::Elasticsearch,
        };

        ClusterFlavor::resolve(distribution, version)
    }

    /// Asks the cluster for its distribution and version.
    pub async fn detect(client: &Client) -> Result<ClusterFlavor> {
        let server_info: ServerInfo = client
            .perform_request::<(), _>(Method::GET, &[], None)
            .await
            .context(FetchServerInfoSnafu)?;

        let flavor = ClusterFlavor::from_server_info(&server_info)?;

        tracing::info!(
            cluster.version = %server_info.version.number,
            cluster.distribution = ?server_info.version.distribution,
            %flavor,
            "Detected cluster flavor"
        );

        Ok(flavor)
    }

    /// Path of the REST API of the security plugin
    pub fn security_api_path(&self) -> Result<[&'static str; 3]> {
        match self {
            ClusterFlavor::OpenSearch => Ok(["_plugins", "_security", "api"]),
            ClusterFlavor::OpenDistro => Ok(["_opendistro", "_security", "api"]),
            ClusterFlavor::Elasticsearch6 => RolesNotSupportedSnafu { flavor: *self }.fail(),
        }
    }
}
