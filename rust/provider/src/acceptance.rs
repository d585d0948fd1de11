//! Acceptance tests of the role resource
//!
//! Runs against the cluster at `OPENSEARCH_ACC_URL` if set, otherwise against the fake cluster.
//! Credentials for a live cluster are taken from `OPENSEARCH_USERNAME` and `OPENSEARCH_PASSWORD`.

use pretty_assertions::assert_eq;
use uuid::Uuid;

use crate::{
    client::flavor::ClusterFlavor,
    framework::types::security::RoleName,
    provider::{Provider, ProviderConfig},
    resource::{
        ApplyOutcome,
        role::{self, IndexPermission, RoleSpec, RoleState, TenantPermission},
    },
    test_support::FakeCluster,
};

const ACCEPTANCE_URL_ENV: &str = "OPENSEARCH_ACC_URL";

enum TestCluster {
    Live(String),
    Fake(FakeCluster),
}

impl TestCluster {
    async fn start() -> Self {
        match std::env::var(ACCEPTANCE_URL_ENV) {
            Ok(url) => TestCluster::Live(url),
            Err(_) => TestCluster::Fake(FakeCluster::opensearch("2.19.1").await),
        }
    }

    fn config(&self) -> ProviderConfig {
        match self {
            TestCluster::Live(url) => ProviderConfig {
                username: std::env::var("OPENSEARCH_USERNAME").ok(),
                password: std::env::var("OPENSEARCH_PASSWORD").ok(),
                insecure: true,
                ..ProviderConfig::for_url(url)
            },
            TestCluster::Fake(cluster) => ProviderConfig::for_url(&cluster.url()),
        }
    }
}

fn random_role_name() -> RoleName {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .bytes()
        .take(10)
        .map(|digit| match digit {
            b'0'..=b'9' => char::from(b'g' + digit - b'0'),
            _ => char::from(digit),
        })
        .collect();
    RoleName::from_str_unsafe(&format!("test{suffix}"))
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn index_permission(index_patterns: &[&str], allowed_actions: &[&str]) -> IndexPermission {
    IndexPermission {
        index_patterns: strings(index_patterns),
        allowed_actions: strings(allowed_actions),
        ..IndexPermission::default()
    }
}

fn tenant_permission(tenant_patterns: &[&str], allowed_actions: &[&str]) -> TenantPermission {
    TenantPermission {
        tenant_patterns: strings(tenant_patterns),
        allowed_actions: strings(allowed_actions),
    }
}

fn basic_role(role_name: &RoleName) -> RoleSpec {
    RoleSpec {
        role_name: role_name.clone(),
        description: Some("test".to_owned()),
        cluster_permissions: strings(&["*"]),
        index_permissions: vec![index_permission(&["*"], &["*"])],
        tenant_permissions: vec![tenant_permission(&["*"], &["kibana_all_write"])],
    }
}

fn updated_role(role_name: &RoleName) -> RoleSpec {
    RoleSpec {
        index_permissions: vec![
            index_permission(&["test*"], &["read"]),
            index_permission(&["?kibana"], &["indices_all"]),
        ],
        tenant_permissions: vec![
            tenant_permission(&["*"], &["kibana_all_write"]),
            tenant_permission(&["test*"], &["kibana_all_write"]),
        ],
        ..basic_role(role_name)
    }
}

fn role_without_tenant_permissions(role_name: &RoleName) -> RoleSpec {
    RoleSpec {
        tenant_permissions: vec![],
        ..updated_role(role_name)
    }
}

fn role_with_field_level_security(role_name: &RoleName) -> RoleSpec {
    RoleSpec {
        index_permissions: vec![IndexPermission {
            field_level_security: strings(&["fielda", "myfieldb"]),
            ..index_permission(&["pub*"], &["read"])
        }],
        tenant_permissions: vec![],
        ..basic_role(role_name)
    }
}

/// Configures a provider, or returns `None` if the cluster does not support roles
async fn configure_provider(cluster: &TestCluster) -> Option<Provider> {
    let provider = Provider::configure(&cluster.config())
        .await
        .expect("the provider should be configured");

    if provider.flavor() == ClusterFlavor::Elasticsearch6 {
        eprintln!("Roles only supported on ES >= 7");
        return None;
    }
    Some(provider)
}

async fn apply(provider: &Provider, spec: &RoleSpec) -> (ApplyOutcome, RoleState) {
    role::apply(provider, spec, Some(&spec.role_name))
        .await
        .expect("the role should be applied")
}

async fn destroy_and_check(provider: &Provider, role_name: &RoleName) {
    role::delete(provider, role_name)
        .await
        .expect("the role should be deleted");
    assert_eq!(
        None,
        role::read(provider, role_name)
            .await
            .expect("the role should be readable")
    );
}

#[tokio::test]
async fn test_role_lifecycle() {
    let cluster = TestCluster::start().await;
    let Some(provider) = configure_provider(&cluster).await else {
        return;
    };
    let role_name = random_role_name();

    let (outcome, state) = apply(&provider, &basic_role(&role_name)).await;
    assert_eq!(ApplyOutcome::Created, outcome);
    assert_eq!(role_name, state.id);
    assert_eq!(Some("test"), state.attributes.description.as_deref());
    assert_eq!(1, state.attributes.cluster_permissions.len());
    assert_eq!(1, state.attributes.index_permissions.len());
    assert_eq!(1, state.attributes.tenant_permissions.len());

    let (outcome, state) = apply(&provider, &updated_role(&role_name)).await;
    assert_eq!(ApplyOutcome::Updated, outcome);
    assert_eq!(role_name, state.id);
    assert_eq!(Some("test"), state.attributes.description.as_deref());
    assert_eq!(2, state.attributes.index_permissions.len());
    assert_eq!(2, state.attributes.tenant_permissions.len());

    let (outcome, state) = apply(&provider, &role_without_tenant_permissions(&role_name)).await;
    assert_eq!(ApplyOutcome::Updated, outcome);
    assert_eq!(2, state.attributes.index_permissions.len());
    assert_eq!(0, state.attributes.tenant_permissions.len());

    let (outcome, state) = apply(&provider, &role_with_field_level_security(&role_name)).await;
    assert_eq!(ApplyOutcome::Updated, outcome);
    assert_eq!(1, state.attributes.cluster_permissions.len());
    assert_eq!(1, state.attributes.index_permissions.len());
    assert_eq!(
        strings(&["fielda", "myfieldb"]),
        state.attributes.index_permissions[0].field_level_security
    );

    let (outcome, _) = apply(&provider, &role_with_field_level_security(&role_name)).await;
    assert_eq!(ApplyOutcome::Unchanged, outcome);

    destroy_and_check(&provider, &role_name).await;
}

#[tokio::test]
async fn test_role_import() {
    let cluster = TestCluster::start().await;
    let Some(provider) = configure_provider(&cluster).await else {
        return;
    };
    let role_name = random_role_name();

    let (outcome, applied) = apply(&provider, &basic_role(&role_name)).await;
    assert_eq!(ApplyOutcome::Created, outcome);

    let imported = role::import(&provider, &role_name)
        .await
        .expect("the role should be importable");
    assert_eq!(applied, imported);

    destroy_and_check(&provider, &role_name).await;
}
