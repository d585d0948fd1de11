//! The `opensearch_role` resource
//!
//! A role is a named bundle of cluster, index and tenant permissions managed by the security
//! plugin. The cluster is the source of truth: every operation reads the role back after writing
//! it, and the state always reflects what the cluster returned.

use std::collections::BTreeMap;

use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use strum::{EnumDiscriminants, IntoStaticStr};

use super::ApplyOutcome;
use crate::{client::StatusResponse, framework::types::security::RoleName, provider::Provider};

pub mod diff;
pub mod document;
pub mod validate;

use document::RoleDocument;
use validate::ValidatedRole;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("the role declaration is invalid"))]
    ValidateRole { source: validate::Error },

    #[snafu(display("the cluster does not support roles"))]
    UnsupportedCluster {
        source: crate::client::flavor::Error,
    },

    #[snafu(display("failed to get role {role_name:?}"))]
    GetRole {
        source: crate::client::Error,
        role_name: RoleName,
    },

    #[snafu(display("failed to put role {role_name:?}"))]
    PutRole {
        source: crate::client::Error,
        role_name: RoleName,
    },

    #[snafu(display("failed to delete role {role_name:?}"))]
    DeleteRole {
        source: crate::client::Error,
        role_name: RoleName,
    },

    #[snafu(display("role {role_name:?} is missing in the response"))]
    MissingRoleInResponse { role_name: RoleName },

    #[snafu(display("role {role_name:?} does not exist"))]
    RoleNotFound { role_name: RoleName },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Declaration of a role
#[derive(Clone, Debug, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
#[schemars(title = "opensearch_role")]
pub struct RoleSpec {
    /// The name of the role. Changing the name replaces the role.
    pub role_name: RoleName,

    /// Description of the role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Cluster-wide permissions, e.g. action groups like `cluster_monitor`
    #[serde(default)]
    pub cluster_permissions: Vec<String>,

    #[serde(default)]
    pub index_permissions: Vec<IndexPermission>,

    #[serde(default)]
    pub tenant_permissions: Vec<TenantPermission>,
}

/// Permissions on indices
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexPermission {
    /// Index patterns the permissions apply to, e.g. `logs-*`
    pub index_patterns: Vec<String>,

    #[serde(default)]
    pub allowed_actions: Vec<String>,

    /// Fields which are visible; fields prefixed with `~` are hidden instead
    #[serde(default)]
    pub field_level_security: Vec<String>,

    /// Query in JSON which restricts the visible documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_level_security: Option<String>,

    /// Fields whose values are replaced with a hash
    #[serde(default)]
    pub masked_fields: Vec<String>,
}

/// Permissions on tenants of OpenSearch Dashboards
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TenantPermission {
    /// Tenant patterns the permissions apply to
    pub tenant_patterns: Vec<String>,

    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

/// State of a role as reflected from the cluster
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RoleState {
    /// Equals the role name
    pub id: RoleName,
    pub attributes: RoleSpec,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, rename = "static")]
    pub is_static: bool,
}

/// Creates the role and reads it back.
pub async fn create(provider: &Provider, role: &ValidatedRole) -> Result<RoleState> {
    put_role(provider, role).await?;

    tracing::info!(role.name = %role.name(), "Role created");

    read_back(provider, role.name()).await
}

/// Reads the role with the given ID.
///
/// Returns `None` if the role does not exist (anymore).
pub async fn read(provider: &Provider, id: &RoleName) -> Result<Option<RoleState>> {
    let path = role_path(provider, id)?;

    let response = provider
        .client()
        .perform_request::<(), BTreeMap<String, RoleDocument>>(Method::GET, &path, None)
        .await;

    let mut roles = match response {
        Ok(roles) => roles,
        Err(err) if err.is_not_found() => {
            tracing::debug!(role.name = %id, "Role not found");
            return Ok(None);
        }
        Err(err) => return Err(err).context(GetRoleSnafu { role_name: id.clone() }),
    };

    let document = roles
        .remove(id.as_ref())
        .context(MissingRoleInResponseSnafu { role_name: id.clone() })?;

    Ok(Some(document.into_state(id.clone())))
}

/// Replaces the whole document of the role.
///
/// If the role name differs from the prior ID, then the role is replaced, i.e. the role with the
/// prior ID is deleted and the new one is created.
pub async fn update(
    provider: &Provider,
    prior_id: &RoleName,
    role: &ValidatedRole,
) -> Result<RoleState> {
    if prior_id != role.name() {
        tracing::info!(
            role.prior_name = %prior_id,
            role.name = %role.name(),
            "Role name changed, replacing the role"
        );
        delete(provider, prior_id).await?;
        return create(provider, role).await;
    }

    put_role(provider, role).await?;

    tracing::info!(role.name = %role.name(), "Role updated");

    read_back(provider, role.name()).await
}

/// Deletes the role.
///
/// A role which does not exist is considered to be deleted.
pub async fn delete(provider: &Provider, id: &RoleName) -> Result<()> {
    let path = role_path(provider, id)?;

    let response = provider
        .client()
        .perform_request::<(), StatusResponse>(Method::DELETE, &path, None)
        .await;

    match response {
        Ok(status) => {
            tracing::info!(role.name = %id, message = %status.message, "Role deleted");
            Ok(())
        }
        Err(err) if err.is_not_found() => {
            tracing::warn!(role.name = %id, "Role was already deleted");
            Ok(())
        }
        Err(err) => Err(err).context(DeleteRoleSnafu { role_name: id.clone() }),
    }
}

/// Imports an existing role by its ID.
pub async fn import(provider: &Provider, id: &RoleName) -> Result<RoleState> {
    let state = read(provider, id)
        .await?
        .context(RoleNotFoundSnafu { role_name: id.clone() })?;

    tracing::info!(role.name = %id, "Role imported");

    Ok(state)
}

/// Returns `true` if the role exists.
pub async fn exists(provider: &Provider, id: &RoleName) -> Result<bool> {
    Ok(read(provider, id).await?.is_some())
}

/// Reconciles the cluster with the given declaration.
///
/// The role is created if it does not exist and updated if it is not equivalent to the
/// declaration. `prior_id` is the ID of the role which was managed for this declaration before.
pub async fn apply(
    provider: &Provider,
    spec: &RoleSpec,
    prior_id: Option<&RoleName>,
) -> Result<(ApplyOutcome, RoleState)> {
    let role = validate::validate(spec).context(ValidateRoleSnafu)?;

    if let Some(prior_id) = prior_id.filter(|prior_id| *prior_id != role.name()) {
        let state = update(provider, prior_id, &role).await?;
        return Ok((ApplyOutcome::Replaced, state));
    }

    match read(provider, role.name()).await? {
        None => {
            let state = create(provider, &role).await?;
            Ok((ApplyOutcome::Created, state))
        }
        Some(state) if diff::is_equivalent(&state.attributes, &role.spec) => {
            tracing::info!(role.name = %role.name(), "Role is up to date");
            Ok((ApplyOutcome::Unchanged, state))
        }
        Some(_) => {
            let state = update(provider, role.name(), &role).await?;
            Ok((ApplyOutcome::Updated, state))
        }
    }
}

async fn put_role(provider: &Provider, role: &ValidatedRole) -> Result<()> {
    let path = role_path(provider, role.name())?;

    let status: StatusResponse = provider
        .client()
        .perform_request(Method::PUT, &path, Some(&role.document))
        .await
        .context(PutRoleSnafu {
            role_name: role.name().clone(),
        })?;

    tracing::debug!(
        role.name = %role.name(),
        status = %status.status,
        message = %status.message,
        "Role document written"
    );

    Ok(())
}

async fn read_back(provider: &Provider, id: &RoleName) -> Result<RoleState> {
    read(provider, id)
        .await?
        .context(RoleNotFoundSnafu { role_name: id.clone() })
}

fn role_path<'a>(provider: &Provider, id: &'a RoleName) -> Result<Vec<&'a str>> {
    let security_api_path = provider
        .flavor()
        .security_api_path()
        .context(UnsupportedClusterSnafu)?;

    let mut path: Vec<&str> = security_api_path.to_vec();
    path.extend(["roles", id.as_ref()]);
    Ok(path)
}
