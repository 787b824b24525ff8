//! Fetching stage: walk every collection of one realm into a [`RealmSnapshot`].

use crate::error::ExportError;
use crate::pipeline::RunControl;
use crate::source::{drain, Collection, RealmSnapshot, SourceClient};
use serde_json::Value;
use std::collections::HashSet;

fn id_of(record: &Value) -> Option<String> {
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn flag(record: &Value, field: &str) -> bool {
    record.get(field).and_then(Value::as_bool).unwrap_or(false)
}

struct Fetcher<'a> {
    source: &'a dyn SourceClient,
    realm: String,
    max_pages: usize,
    control: &'a RunControl,
}

impl Fetcher<'_> {
    async fn all(&self, collection: Collection) -> Result<Vec<Value>, ExportError> {
        self.control.check()?;
        drain(self.source, &self.realm, &collection, self.max_pages).await
    }

    /// A collection that answers with a single document (role mappings, service account).
    async fn one(&self, collection: Collection) -> Result<Value, ExportError> {
        Ok(self
            .all(collection)
            .await?
            .into_iter()
            .next()
            .unwrap_or(Value::Null))
    }

    /// Top-level groups plus every descendant, with nested `subGroups` removed.
    ///
    /// Children are taken from the embedded `subGroups` when present and fetched otherwise.
    async fn groups(&self) -> Result<Vec<Value>, ExportError> {
        let mut stack: Vec<Value> = self.all(Collection::Groups).await?;
        stack.reverse();
        let mut seen = HashSet::new();
        let mut flat = Vec::new();

        while let Some(mut group) = stack.pop() {
            let Some(id) = id_of(&group) else {
                // Kept so normalization reports it as malformed.
                flat.push(group);
                continue;
            };
            if !seen.insert(id.clone()) {
                continue;
            }

            let mut children = group
                .as_object_mut()
                .and_then(|g| g.remove("subGroups"))
                .and_then(|c| match c {
                    Value::Array(items) => Some(items),
                    _ => None,
                })
                .unwrap_or_default();

            let declared = group
                .get("subGroupCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if children.is_empty() && declared > 0 {
                children = self.all(Collection::GroupChildren { group: id }).await?;
            }

            flat.push(group);
            stack.extend(children.into_iter().rev());
        }
        Ok(flat)
    }
}

/// Fetch a full snapshot of one realm.
pub async fn fetch_realm(
    source: &dyn SourceClient,
    realm: Value,
    max_pages: usize,
    control: &RunControl,
) -> Result<RealmSnapshot, ExportError> {
    let name = realm
        .get("realm")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let f = Fetcher {
        source,
        realm: name,
        max_pages,
        control,
    };
    let mut snap = RealmSnapshot {
        realm,
        ..Default::default()
    };

    snap.clients = f.all(Collection::Clients).await?;
    snap.realm_roles = f.all(Collection::RealmRoles).await?;

    for client in &snap.clients {
        let Some(id) = id_of(client) else { continue };
        snap.client_roles
            .extend(f.all(Collection::ClientRoles { client: id.clone() }).await?);

        if flag(client, "serviceAccountsEnabled") {
            let account = f
                .one(Collection::ServiceAccountUser { client: id.clone() })
                .await?;
            if let Some(user) = id_of(&account) {
                let mappings = f.one(Collection::UserRoleMappings { user }).await?;
                snap.service_account_role_mappings.push((id.clone(), mappings));
            }
        }

        let defaults = f
            .all(Collection::ClientDefaultScopes { client: id.clone() })
            .await?;
        snap.client_default_scopes.push((id.clone(), defaults));
        let optionals = f
            .all(Collection::ClientOptionalScopes { client: id.clone() })
            .await?;
        snap.client_optional_scopes.push((id, optionals));
    }

    let composite_roles: Vec<String> = snap
        .realm_roles
        .iter()
        .chain(&snap.client_roles)
        .filter(|r| flag(r, "composite"))
        .filter_map(id_of)
        .collect();
    for role in composite_roles {
        let children = f
            .all(Collection::RoleComposites { role: role.clone() })
            .await?;
        snap.composites.push((role, children));
    }

    snap.groups = f.groups().await?;
    for group in snap.groups.iter().filter_map(id_of) {
        let mappings = f
            .one(Collection::GroupRoleMappings {
                group: group.clone(),
            })
            .await?;
        snap.group_role_mappings.push((group, mappings));
    }

    snap.users = f.all(Collection::Users).await?;
    for user in snap.users.iter().filter_map(id_of) {
        let groups = f.all(Collection::UserGroups { user: user.clone() }).await?;
        snap.user_groups.push((user.clone(), groups));
        let mappings = f.one(Collection::UserRoleMappings { user: user.clone() }).await?;
        snap.user_role_mappings.push((user, mappings));
    }

    snap.client_scopes = f.all(Collection::ClientScopes).await?;
    snap.realm_default_scopes = f.all(Collection::RealmDefaultScopes).await?;
    snap.realm_optional_scopes = f.all(Collection::RealmOptionalScopes).await?;

    snap.flows = f.all(Collection::AuthenticationFlows).await?;
    for flow in &snap.flows {
        // Sub-flows are reached through their parent's flattened execution list.
        let top_level = flow.get("topLevel").and_then(Value::as_bool).unwrap_or(true);
        let alias = flow.get("alias").and_then(Value::as_str);
        if let (true, Some(id), Some(alias)) = (top_level, id_of(flow), alias) {
            let executions = f
                .all(Collection::FlowExecutions {
                    alias: alias.to_string(),
                })
                .await?;
            snap.flow_executions.push((id, executions));
        }
    }

    snap.identity_providers = f.all(Collection::IdentityProviders).await?;
    for idp in &snap.identity_providers {
        let internal_id = idp
            .get("internalId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());
        let alias = idp.get("alias").and_then(Value::as_str);
        if let (Some(internal_id), Some(alias)) = (internal_id, alias) {
            let mappers = f
                .all(Collection::IdpMappers {
                    alias: alias.to_string(),
                })
                .await?;
            snap.idp_mappers.push((internal_id.to_string(), mappers));
        }
    }

    snap.components = f.all(Collection::Components).await?;

    tracing::info!(
        realm = %snap.realm_name(),
        clients = snap.clients.len(),
        roles = snap.realm_roles.len() + snap.client_roles.len(),
        groups = snap.groups.len(),
        users = snap.users.len(),
        scopes = snap.client_scopes.len(),
        flows = snap.flows.len(),
        identity_providers = snap.identity_providers.len(),
        components = snap.components.len(),
        "Fetched realm"
    );

    Ok(snap)
}
