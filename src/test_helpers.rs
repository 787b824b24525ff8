//! Test helper factories
//!
//! A small but complete realm: two clients (one with a service account), realm and client roles
//! with composites (one pointing at a role that does not exist), a three-level group tree, one
//! user, two client scopes with mappers, a browser flow with two executions, an identity
//! provider with one mapper and an LDAP federation component with a sub-component.
#![allow(dead_code)]

use crate::source::mock::FixtureSource;
use crate::source::{Collection, RealmSnapshot};
use serde_json::{json, Value};

const SERVICE_ACCOUNT_USER: &str = "u-sa-api";

fn realm_repr(realm: &str) -> Value {
    json!({
        "id": format!("{}-id", realm),
        "realm": realm,
        "displayName": format!("{} corp", realm),
        "enabled": true,
        "sslRequired": "external",
        "accessTokenLifespan": 300
    })
}

fn clients() -> Vec<Value> {
    vec![
        json!({
            "id": "c-web",
            "clientId": "web",
            "protocol": "openid-connect",
            "publicClient": true,
            "redirectUris": ["https://app.example.com/*"],
            "protocolMappers": [{
                "id": "pm-aud",
                "name": "audience",
                "protocol": "openid-connect",
                "protocolMapper": "oidc-audience-mapper",
                "config": {"included.client.audience": "api"}
            }]
        }),
        json!({
            "id": "c-api",
            "clientId": "api",
            "protocol": "openid-connect",
            "serviceAccountsEnabled": true
        }),
    ]
}

fn realm_roles(realm: &str) -> Vec<Value> {
    let container = format!("{}-id", realm);
    vec![
        json!({"id": "r-admin", "name": "admin", "composite": true, "clientRole": false, "containerId": container}),
        json!({"id": "r-user", "name": "user", "composite": true, "clientRole": false, "containerId": container}),
        json!({"id": "r-offline", "name": "offline_access", "composite": false, "clientRole": false, "containerId": container}),
    ]
}

fn client_roles() -> Vec<Value> {
    vec![json!({
        "id": "cr-read",
        "name": "read",
        "composite": false,
        "clientRole": true,
        "containerId": "c-api"
    })]
}

fn composites(realm: &str) -> Vec<(String, Vec<Value>)> {
    let container = format!("{}-id", realm);
    vec![
        (
            "r-admin".to_string(),
            vec![
                json!({"id": "r-user", "name": "user", "clientRole": false, "containerId": container}),
                json!({"id": "cr-read", "name": "read", "clientRole": true, "containerId": "c-api"}),
                json!({"id": "gone", "name": "ghost-role", "clientRole": false, "containerId": container}),
            ],
        ),
        (
            "r-user".to_string(),
            vec![json!({"id": "r-offline", "name": "offline_access", "clientRole": false, "containerId": container})],
        ),
    ]
}

fn flat_groups() -> Vec<Value> {
    vec![
        json!({"id": "g-eng", "name": "eng", "path": "/eng", "attributes": {"cost-center": ["42"]}}),
        json!({"id": "g-plat", "name": "platform", "path": "/eng/platform"}),
        json!({"id": "g-core", "name": "core", "path": "/eng/platform/core"}),
    ]
}

fn group_role_mappings() -> Vec<(String, Value)> {
    vec![(
        "g-eng".to_string(),
        json!({"realmMappings": [{"id": "r-user", "name": "user"}]}),
    )]
}

fn users() -> Vec<Value> {
    vec![json!({
        "id": "u-alice",
        "username": "alice",
        "email": "alice@example.com",
        "enabled": true,
        "attributes": {"locale": ["en"]}
    })]
}

fn user_role_mappings() -> Vec<(String, Value)> {
    vec![(
        "u-alice".to_string(),
        json!({"realmMappings": [{"id": "r-admin", "name": "admin"}]}),
    )]
}

fn service_account_mappings() -> Value {
    json!({
        "clientMappings": {
            "api": {"id": "c-api", "client": "api", "mappings": [{"id": "cr-read", "name": "read"}]}
        }
    })
}

fn client_scopes() -> Vec<Value> {
    vec![
        json!({
            "id": "cs-profile",
            "name": "profile",
            "protocol": "openid-connect",
            "attributes": {"include.in.token.scope": "true"},
            "protocolMappers": [{
                "id": "pm-email",
                "name": "email",
                "protocol": "openid-connect",
                "protocolMapper": "oidc-usermodel-property-mapper",
                "config": {"user.attribute": "email", "claim.name": "email"}
            }]
        }),
        json!({"id": "cs-email", "name": "email", "protocol": "openid-connect"}),
    ]
}

fn flows() -> Vec<Value> {
    vec![json!({
        "id": "f-browser",
        "alias": "browser",
        "providerId": "basic-flow",
        "topLevel": true,
        "builtIn": true
    })]
}

fn executions() -> Vec<Value> {
    vec![
        json!({"id": "ex-cookie", "displayName": "Cookie", "providerId": "auth-cookie", "requirement": "ALTERNATIVE", "level": 0, "index": 0}),
        json!({"id": "ex-forms", "displayName": "forms", "requirement": "ALTERNATIVE", "authenticationFlow": true, "level": 0, "index": 1}),
    ]
}

fn identity_providers() -> Vec<Value> {
    vec![json!({
        "internalId": "idp-corp",
        "alias": "corp",
        "providerId": "oidc",
        "enabled": true,
        "config": {"clientId": "kc-broker", "clientSecret": "**********"}
    })]
}

fn idp_mappers() -> Vec<Value> {
    vec![json!({
        "id": "im-dept",
        "name": "department",
        "identityProviderAlias": "corp",
        "identityProviderMapper": "oidc-user-attribute-idp-mapper",
        "config": {"claim": "dept", "user.attribute": "department"}
    })]
}

fn components(realm: &str) -> Vec<Value> {
    vec![
        json!({
            "id": "cmp-ldap",
            "name": "corp-ldap",
            "providerId": "ldap",
            "providerType": "org.keycloak.storage.UserStorageProvider",
            "parentId": format!("{}-id", realm),
            "config": {"connectionUrl": ["ldap://ldap.example.com"], "bindCredential": ["**********"]}
        }),
        json!({
            "id": "cmp-ldap-email",
            "name": "email",
            "providerId": "user-attribute-ldap-mapper",
            "providerType": "org.keycloak.storage.ldap.mappers.LDAPStorageMapper",
            "parentId": "cmp-ldap"
        }),
    ]
}

/// Snapshot of the sample realm, as the fetching stage would produce it.
pub fn sample_snapshot(realm: &str) -> RealmSnapshot {
    let scopes = client_scopes();
    RealmSnapshot {
        realm: realm_repr(realm),
        clients: clients(),
        realm_roles: realm_roles(realm),
        client_roles: client_roles(),
        composites: composites(realm),
        groups: flat_groups(),
        group_role_mappings: group_role_mappings(),
        users: users(),
        user_groups: vec![(
            "u-alice".to_string(),
            vec![json!({"id": "g-plat", "path": "/eng/platform"})],
        )],
        user_role_mappings: user_role_mappings(),
        service_account_role_mappings: vec![("c-api".to_string(), service_account_mappings())],
        realm_default_scopes: vec![scopes[0].clone()],
        realm_optional_scopes: vec![scopes[1].clone()],
        client_default_scopes: vec![
            ("c-web".to_string(), vec![scopes[0].clone()]),
            ("c-api".to_string(), Vec::new()),
        ],
        client_optional_scopes: vec![
            ("c-web".to_string(), vec![scopes[1].clone()]),
            ("c-api".to_string(), Vec::new()),
        ],
        client_scopes: scopes,
        flows: flows(),
        flow_executions: vec![("f-browser".to_string(), executions())],
        identity_providers: identity_providers(),
        idp_mappers: vec![("idp-corp".to_string(), idp_mappers())],
        components: components(realm),
    }
}

/// Register the sample realm under `realm` in a fixture source.
pub fn sample_fixture(source: FixtureSource, realm: &str) -> FixtureSource {
    let scopes = client_scopes();
    let mut groups = flat_groups();
    let core = groups.pop().unwrap_or_default();
    let mut plat = groups.pop().unwrap_or_default();
    let mut eng = groups.pop().unwrap_or_default();
    plat["subGroups"] = json!([core]);
    eng["subGroups"] = json!([plat]);

    let mut source = source
        .with_realm(realm_repr(realm))
        .with_collection(realm, Collection::Clients, clients())
        .with_collection(realm, Collection::RealmRoles, realm_roles(realm))
        .with_collection(
            realm,
            Collection::ClientRoles {
                client: "c-api".into(),
            },
            client_roles(),
        )
        .with_collection(
            realm,
            Collection::ServiceAccountUser {
                client: "c-api".into(),
            },
            vec![json!({"id": SERVICE_ACCOUNT_USER, "username": "service-account-api"})],
        )
        .with_collection(
            realm,
            Collection::UserRoleMappings {
                user: SERVICE_ACCOUNT_USER.into(),
            },
            vec![service_account_mappings()],
        )
        .with_collection(
            realm,
            Collection::ClientDefaultScopes {
                client: "c-web".into(),
            },
            vec![scopes[0].clone()],
        )
        .with_collection(
            realm,
            Collection::ClientOptionalScopes {
                client: "c-web".into(),
            },
            vec![scopes[1].clone()],
        )
        .with_collection(realm, Collection::Groups, vec![eng])
        .with_collection(realm, Collection::Users, users())
        .with_collection(
            realm,
            Collection::UserGroups {
                user: "u-alice".into(),
            },
            vec![json!({"id": "g-plat", "path": "/eng/platform"})],
        )
        .with_collection(realm, Collection::RealmDefaultScopes, vec![scopes[0].clone()])
        .with_collection(realm, Collection::RealmOptionalScopes, vec![scopes[1].clone()])
        .with_collection(realm, Collection::ClientScopes, scopes)
        .with_collection(realm, Collection::AuthenticationFlows, flows())
        .with_collection(
            realm,
            Collection::FlowExecutions {
                alias: "browser".into(),
            },
            executions(),
        )
        .with_collection(realm, Collection::IdentityProviders, identity_providers())
        .with_collection(
            realm,
            Collection::IdpMappers {
                alias: "corp".into(),
            },
            idp_mappers(),
        )
        .with_collection(realm, Collection::Components, components(realm));

    for (role, children) in composites(realm) {
        source = source.with_collection(realm, Collection::RoleComposites { role }, children);
    }
    for (group, doc) in group_role_mappings() {
        source = source.with_collection(realm, Collection::GroupRoleMappings { group }, vec![doc]);
    }
    for (user, doc) in user_role_mappings() {
        source = source.with_collection(realm, Collection::UserRoleMappings { user }, vec![doc]);
    }
    source
}

/// A fixture source serving the sample realm under each of `realms`.
pub fn fixture_source(realms: &[&str]) -> FixtureSource {
    realms
        .iter()
        .fold(FixtureSource::new(), |source, realm| sample_fixture(source, realm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{fetch_realm, RunControl};

    #[tokio::test]
    async fn test_fixture_fetches_into_sample_snapshot() {
        let source = fixture_source(&["acme"]);
        let fetched = fetch_realm(&source, realm_repr("acme"), 100, &RunControl::new())
            .await
            .unwrap();
        let expected = sample_snapshot("acme");

        assert_eq!(fetched.clients, expected.clients);
        assert_eq!(fetched.groups, expected.groups);
        assert_eq!(fetched.composites, expected.composites);
        assert_eq!(fetched.user_role_mappings, expected.user_role_mappings);
        assert_eq!(
            fetched.service_account_role_mappings,
            expected.service_account_role_mappings
        );
        assert_eq!(fetched.flow_executions, expected.flow_executions);
        assert_eq!(fetched.identity_providers, expected.identity_providers);
        assert_eq!(fetched.idp_mappers, expected.idp_mappers);
        assert_eq!(fetched.components, expected.components);
    }
}
