//! HTTP-level tests for the Consul ACL client against a mock Consul server

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consul_acl_operator::config::ConsulConfig;
use consul_acl_operator::consul::{
    AclAuthMethod, AclBindingRule, AclClient, AclRole, ConsulClient, ConsulError, PolicyLink,
};

async fn client_for(server: &MockServer) -> ConsulClient {
    ConsulClient::new(&ConsulConfig {
        address: server.uri(),
        token: Some("root-token".to_string()),
        datacenter: Some("dc1".to_string()),
        ..Default::default()
    })
    .expect("client")
}

// =============================================================================
// Roles
// =============================================================================

#[tokio::test]
async fn role_read_by_name_sends_token_and_datacenter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/role/name/team-a_web"))
        .and(header("X-Consul-Token", "root-token"))
        .and(query_param("dc", "dc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "r-1",
            "Name": "team-a_web",
            "Description": "web tier",
            "Policies": [{"ID": "p-1", "Name": "web-read"}],
            "CreateIndex": 12,
            "ModifyIndex": 14
        })))
        .expect(1)
        .mount(&server)
        .await;

    let role = client_for(&server)
        .await
        .role_read_by_name("team-a_web")
        .await
        .expect("read")
        .expect("role present");
    assert_eq!(role.id, "r-1");
    assert_eq!(role.description, "web tier");
    assert_eq!(role.policies[0].key(), "p-1");
}

#[tokio::test]
async fn missing_role_reads_as_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/role/name/team-a_web"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/role/r-gone"))
        .respond_with(ResponseTemplate::new(403).set_body_string("ACL not found"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client
        .role_read_by_name("team-a_web")
        .await
        .expect("read")
        .is_none());
    assert!(client.role_read("r-gone").await.expect("read").is_none());
}

#[tokio::test]
async fn role_with_null_policies_decodes_as_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/role/r-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "r-1",
            "Name": "team-a_web",
            "Policies": null
        })))
        .mount(&server)
        .await;

    let role = client_for(&server)
        .await
        .role_read("r-1")
        .await
        .expect("read")
        .expect("role present");
    assert!(role.policies.is_empty());
}

#[tokio::test]
async fn role_create_puts_pascal_case_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/acl/role"))
        .and(body_partial_json(json!({
            "Name": "team-a_web",
            "Description": "web tier",
            "Policies": [{"ID": "p-1", "Name": "web-read"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "r-new",
            "Name": "team-a_web",
            "Description": "web tier",
            "Policies": [{"ID": "p-1", "Name": "web-read"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client_for(&server)
        .await
        .role_create(&AclRole {
            id: String::new(),
            name: "team-a_web".to_string(),
            description: "web tier".to_string(),
            policies: vec![PolicyLink {
                id: "p-1".to_string(),
                name: "web-read".to_string(),
            }],
        })
        .await
        .expect("create");
    assert_eq!(created.id, "r-new");
}

#[tokio::test]
async fn role_update_targets_id_and_carries_it_in_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/acl/role/r-1"))
        .and(body_partial_json(json!({"ID": "r-1", "Name": "team-a_web"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "r-1",
            "Name": "team-a_web"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let updated = client_for(&server)
        .await
        .role_update(
            "r-1",
            &AclRole {
                name: "team-a_web".to_string(),
                ..Default::default()
            },
        )
        .await
        .expect("update");
    assert_eq!(updated.id, "r-1");
}

#[tokio::test]
async fn deleting_absent_role_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/acl/role/r-1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server)
        .await
        .role_delete("r-1")
        .await
        .expect("delete");
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn server_errors_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/policy/name/web-read"))
        .respond_with(ResponseTemplate::new(500).set_body_string("rpc error: No cluster leader"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .policy_read_by_name("web-read")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsulError::Api { status: 500, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn invalid_requests_are_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/acl/role"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string("Invalid Role: A Role with Name \"team-a_web\" already exists"),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .role_create(&AclRole {
            name: "team-a_web".to_string(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(!err.is_retryable());
    assert!(err.is_conflict());
}

#[tokio::test]
async fn permission_denied_is_not_absence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/auth-method/team-a_k8s"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Permission denied"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .await
        .auth_method_read("team-a_k8s")
        .await
        .unwrap_err();
    assert!(matches!(err, ConsulError::Api { status: 403, .. }));
}

#[tokio::test]
async fn unreachable_consul_is_a_connectivity_error() {
    let server = MockServer::start().await;
    let address = server.uri();
    drop(server);

    let client = ConsulClient::new(&ConsulConfig {
        address,
        ..Default::default()
    })
    .expect("client");
    let err = client.role_read("r-1").await.unwrap_err();
    assert!(matches!(err, ConsulError::Connectivity(_)));
    assert!(err.is_retryable());
}

// =============================================================================
// Auth methods and binding rules
// =============================================================================

#[tokio::test]
async fn auth_method_update_targets_name() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/acl/auth-method/team-a_k8s"))
        .and(body_partial_json(json!({
            "Name": "team-a_k8s",
            "Type": "kubernetes",
            "MaxTokenTTL": "1h",
            "Config": {"Host": "https://kubernetes.default.svc"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Name": "team-a_k8s",
            "Type": "kubernetes",
            "MaxTokenTTL": "1h0m0s",
            "Config": {"Host": "https://kubernetes.default.svc"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut method_spec = AclAuthMethod {
        name: "team-a_k8s".to_string(),
        type_: "kubernetes".to_string(),
        max_token_ttl: Some("1h".to_string()),
        ..Default::default()
    };
    method_spec.config.insert(
        "Host".to_string(),
        json!("https://kubernetes.default.svc"),
    );

    let updated = client_for(&server)
        .await
        .auth_method_update(&method_spec)
        .await
        .expect("update");
    assert_eq!(updated.max_token_ttl.as_deref(), Some("1h0m0s"));
}

#[tokio::test]
async fn binding_rule_list_spans_all_auth_methods() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/binding-rules"))
        .and(query_param("dc", "dc1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ID": "b-1",
                "Description": "team-a_web",
                "AuthMethod": "team-a_k8s",
                "Selector": "",
                "BindType": "service",
                "BindName": "web"
            },
            {
                "ID": "b-2",
                "Description": "team-b_api",
                "AuthMethod": "team-b_jwt",
                "Selector": "value.role==api",
                "BindType": "role",
                "BindName": "api"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rules = client_for(&server)
        .await
        .binding_rule_list()
        .await
        .expect("list");
    assert_eq!(rules.len(), 2);
    assert_eq!(
        rules[0],
        AclBindingRule {
            id: "b-1".to_string(),
            description: "team-a_web".to_string(),
            auth_method: "team-a_k8s".to_string(),
            selector: String::new(),
            bind_type: "service".to_string(),
            bind_name: "web".to_string(),
        }
    );
    assert_eq!(rules[1].auth_method, "team-b_jwt");
}

#[tokio::test]
async fn binding_rule_list_handles_null_and_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/binding-rules"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/binding-rules"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.binding_rule_list().await.expect("list").is_empty());
    assert!(client.binding_rule_list().await.expect("list").is_empty());
}

// =============================================================================
// Path escaping
// =============================================================================

#[tokio::test]
async fn policy_name_cannot_smuggle_a_query_string() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/policy/name/global-management"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "00000000-0000-0000-0000-000000000001",
            "Name": "global-management"
        })))
        .expect(0)
        .mount(&server)
        .await;

    let policy = client_for(&server)
        .await
        .policy_read_by_name("global-management?x=web-read")
        .await
        .expect("read");
    assert!(policy.is_none());
}

#[tokio::test]
async fn names_are_sent_as_single_path_segments() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/acl/role/name/team-a%2Fweb"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "r-1",
            "Name": "team-a/web"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let role = client_for(&server)
        .await
        .role_read_by_name("team-a/web")
        .await
        .expect("read")
        .expect("role present");
    assert_eq!(role.id, "r-1");
}
