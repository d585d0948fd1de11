//! The role document as it is sent to and received from the security plugin

use serde::{Deserialize, Serialize};

use super::{IndexPermission, RoleSpec, RoleState, TenantPermission};
use crate::framework::types::security::RoleName;

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoleDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub cluster_permissions: Vec<String>,

    #[serde(default)]
    pub index_permissions: Vec<IndexPermissionDocument>,

    #[serde(default)]
    pub tenant_permissions: Vec<TenantPermissionDocument>,

    // Flags managed by the security plugin; they are rejected if sent back.
    #[serde(default, skip_serializing)]
    pub reserved: bool,

    #[serde(default, skip_serializing)]
    pub hidden: bool,

    #[serde(default, rename = "static", skip_serializing)]
    pub is_static: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct IndexPermissionDocument {
    #[serde(default)]
    pub index_patterns: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dls: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fls: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub masked_fields: Vec<String>,

    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct TenantPermissionDocument {
    #[serde(default)]
    pub tenant_patterns: Vec<String>,

    #[serde(default)]
    pub allowed_actions: Vec<String>,
}

impl From<&RoleSpec> for RoleDocument {
    fn from(spec: &RoleSpec) -> Self {
        RoleDocument {
            description: spec
                .description
                .clone()
                .filter(|description| !description.is_empty()),
            cluster_permissions: spec.cluster_permissions.clone(),
            index_permissions: spec
                .index_permissions
                .iter()
                .map(IndexPermissionDocument::from)
                .collect(),
            tenant_permissions: spec
                .tenant_permissions
                .iter()
                .map(TenantPermissionDocument::from)
                .collect(),
            reserved: false,
            hidden: false,
            is_static: false,
        }
    }
}

impl From<&IndexPermission> for IndexPermissionDocument {
    fn from(permission: &IndexPermission) -> Self {
        IndexPermissionDocument {
            index_patterns: permission.index_patterns.clone(),
            dls: permission
                .document_level_security
                .clone()
                .filter(|dls| !dls.trim().is_empty()),
            fls: permission.field_level_security.clone(),
            masked_fields: permission.masked_fields.clone(),
            allowed_actions: permission.allowed_actions.clone(),
        }
    }
}

impl From<&TenantPermission> for TenantPermissionDocument {
    fn from(permission: &TenantPermission) -> Self {
        TenantPermissionDocument {
            tenant_patterns: permission.tenant_patterns.clone(),
            allowed_actions: permission.allowed_actions.clone(),
        }
    }
}

impl RoleDocument {
    /// Reflects the document received for the given role into the resource state.
    pub fn into_state(self, id: RoleName) -> RoleState {
        let attributes = RoleSpec {
            role_name: id.clone(),
            description: self.description.filter(|description| !description.is_empty()),
            cluster_permissions: self.cluster_permissions,
            index_permissions: self
                .index_permissions
                .into_iter()
                .map(|permission| IndexPermission {
                    index_patterns: permission.index_patterns,
                    allowed_actions: permission.allowed_actions,
                    field_level_security: permission.fls,
                    document_level_security: permission.dls.filter(|dls| !dls.trim().is_empty()),
                    masked_fields: permission.masked_fields,
                })
                .collect(),
            tenant_permissions: self
                .tenant_permissions
                .into_iter()
                .map(|permission| TenantPermission {
                    tenant_patterns: permission.tenant_patterns,
                    allowed_actions: permission.allowed_actions,
                })
                .collect(),
        };

        RoleState {
            id,
            attributes,
            reserved: self.reserved,
            hidden: self.hidden,
            is_static: self.is_static,
        }
    }
}
