//! The validate step for role declarations

use snafu::{ResultExt, Snafu, ensure};
use strum::{EnumDiscriminants, IntoStaticStr};

use super::{RoleSpec, document::RoleDocument};
use crate::framework::types::security::RoleName;

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
pub enum Error {
    #[snafu(display("{attribute} must not contain empty values"))]
    EmptyValue { attribute: String },

    #[snafu(display("index_permissions[{index}] must contain at least one index pattern"))]
    MissingIndexPatterns { index: usize },

    #[snafu(display("tenant_permissions[{index}] must contain at least one tenant pattern"))]
    MissingTenantPatterns { index: usize },

    #[snafu(display(
        "index_permissions[{index}].document_level_security is not a valid JSON document"
    ))]
    ParseDocumentLevelSecurity {
        source: serde_json::Error,
        index: usize,
    },

    #[snafu(display("index_permissions[{index}].document_level_security must be a JSON object"))]
    DocumentLevelSecurityNotAnObject { index: usize },

    #[snafu(display(
        "index_permissions[{index}].field_level_security must either only include or only \
        exclude (\"~\" prefix) fields"
    ))]
    MixedFieldLevelSecurity { index: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Prefix of fields which are excluded by field-level security
const FLS_EXCLUDE_PREFIX: char = '~';

/// A role declaration which passed validation, together with the document to send
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRole {
    pub spec: RoleSpec,
    pub document: RoleDocument,
}

impl ValidatedRole {
    pub fn name(&self) -> &RoleName {
        &self.spec.role_name
    }
}

/// Validates the [`RoleSpec`] and returns a [`ValidatedRole`]
///
/// The role name is already validated during deserialization because it is a [`RoleName`].
pub fn validate(spec: &RoleSpec) -> Result<ValidatedRole> {
    validate_values("cluster_permissions", &spec.cluster_permissions)?;

    for (index, permission) in spec.index_permissions.iter().enumerate() {
        ensure!(
            !permission.index_patterns.is_empty(),
            MissingIndexPatternsSnafu { index }
        );
        validate_values(
            &format!("index_permissions[{index}].index_patterns"),
            &permission.index_patterns,
        )?;
        validate_values(
            &format!("index_permissions[{index}].allowed_actions"),
            &permission.allowed_actions,
        )?;
        validate_values(
            &format!("index_permissions[{index}].field_level_security"),
            &permission.field_level_security,
        )?;
        validate_values(
            &format!("index_permissions[{index}].masked_fields"),
            &permission.masked_fields,
        )?;

        let excluded_fields = permission
            .field_level_security
            .iter()
            .filter(|field| field.starts_with(FLS_EXCLUDE_PREFIX))
            .count();
        ensure!(
            excluded_fields == 0 || excluded_fields == permission.field_level_security.len(),
            MixedFieldLevelSecuritySnafu { index }
        );

        if let Some(dls) = permission
            .document_level_security
            .as_deref()
            .filter(|dls| !dls.trim().is_empty())
        {
            let query: serde_json::Value =
                serde_json::from_str(dls).context(ParseDocumentLevelSecuritySnafu { index })?;
            ensure!(
                query.is_object(),
                DocumentLevelSecurityNotAnObjectSnafu { index }
            );
        }
    }

    for (index, permission) in spec.tenant_permissions.iter().enumerate() {
        ensure!(
            !permission.tenant_patterns.is_empty(),
            MissingTenantPatternsSnafu { index }
        );
        validate_values(
            &format!("tenant_permissions[{index}].tenant_patterns"),
            &permission.tenant_patterns,
        )?;
        validate_values(
            &format!("tenant_permissions[{index}].allowed_actions"),
            &permission.allowed_actions,
        )?;
    }

    Ok(ValidatedRole {
        spec: spec.clone(),
        document: RoleDocument::from(spec),
    })
}

fn validate_values(attribute: &str, values: &[String]) -> Result<()> {
    ensure!(
        values.iter().all(|value| !value.trim().is_empty()),
        EmptyValueSnafu { attribute }
    );
    Ok(())
}
