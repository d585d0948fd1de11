//! Equivalence of role declarations
//!
//! All collections of a role are sets: neither the order nor duplicates are significant. The
//! security plugin may return the document with a different order than it was sent, which must
//! not lead to an update.

use std::collections::BTreeSet;

use super::{IndexPermission, RoleSpec, TenantPermission};

#[derive(Debug, Eq, Ord, PartialEq, PartialOrd)]
struct NormalizedIndexPermission {
    index_patterns: BTreeSet<String>,
    allowed_actions: BTreeSet<String>,
    field_level_security: BTreeSet<String>,
    document_level_security: Option<String>,
    masked_fields: BTreeSet<String>,
}

#[derive(Debug, Eq, Ord, PartialEq, PartialOrd)]
struct NormalizedTenantPermission {
    tenant_patterns: BTreeSet<String>,
    allowed_actions: BTreeSet<String>,
}

#[derive(Debug, Eq, PartialEq)]
struct NormalizedRole<'a> {
    role_name: &'a str,
    description: &'a str,
    cluster_permissions: BTreeSet<String>,
    index_permissions: BTreeSet<NormalizedIndexPermission>,
    tenant_permissions: BTreeSet<NormalizedTenantPermission>,
}

/// Returns `true` if both declarations result in the same role.
pub fn is_equivalent(left: &RoleSpec, right: &RoleSpec) -> bool {
    normalize(left) == normalize(right)
}

fn normalize(spec: &RoleSpec) -> NormalizedRole<'_> {
    NormalizedRole {
        role_name: spec.role_name.as_ref(),
        description: spec.description.as_deref().unwrap_or_default(),
        cluster_permissions: to_set(&spec.cluster_permissions),
        index_permissions: spec
            .index_permissions
            .iter()
            .map(normalize_index_permission)
            .collect(),
        tenant_permissions: spec
            .tenant_permissions
            .iter()
            .map(normalize_tenant_permission)
            .collect(),
    }
}

fn normalize_index_permission(permission: &IndexPermission) -> NormalizedIndexPermission {
    NormalizedIndexPermission {
        index_patterns: to_set(&permission.index_patterns),
        allowed_actions: to_set(&permission.allowed_actions),
        field_level_security: to_set(&permission.field_level_security),
        document_level_security: permission
            .document_level_security
            .as_deref()
            .map(normalize_dls)
            .filter(|dls| !dls.is_empty()),
        masked_fields: to_set(&permission.masked_fields),
    }
}

fn normalize_tenant_permission(permission: &TenantPermission) -> NormalizedTenantPermission {
    NormalizedTenantPermission {
        tenant_patterns: to_set(&permission.tenant_patterns),
        allowed_actions: to_set(&permission.allowed_actions),
    }
}

/// Canonical form of a document-level security query
///
/// Queries which are not valid JSON are kept verbatim, apart from surrounding whitespace.
fn normalize_dls(dls: &str) -> String {
    // serde_json::Map is ordered by key, so the serialization is canonical.
    serde_json::from_str::<serde_json::Value>(dls)
        .ok()
        .and_then(|value| serde_json::to_string(&value).ok())
        .unwrap_or_else(|| dls.trim().to_owned())
}

fn to_set(values: &[String]) -> BTreeSet<String> {
    values.iter().cloned().collect()
}
