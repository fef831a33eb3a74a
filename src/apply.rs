//! Apply driver
//!
//! Walks a manifest against local state and calls the reconcilers one at a
//! time. Entries that left the manifest are deleted first (newest first),
//! then entries are created, updated or replaced in manifest order. State is
//! saved after every step.

use crate::error::ProviderError;
use crate::ibm::client::IbmClient;
use crate::manifest::{resolve, Manifest, ManifestEntry};
use crate::resource::dispatch::{self, Change};
use crate::state::{address, StateFile, StoredResource};
use anyhow::{Context, Result};
use serde_json::Value;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Update,
    Replace,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub action: Action,
    pub type_name: String,
    pub name: String,
}

impl fmt::Display for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self.action {
            Action::Create => "+ create",
            Action::Update => "~ update",
            Action::Replace => "-/+ replace",
            Action::Delete => "- delete",
        };
        write!(f, "{:<11} {}", marker, address(&self.type_name, &self.name))
    }
}

/// Counts reported at the end of an apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub replaced: usize,
    pub deleted: usize,
    pub unchanged: usize,
}

impl fmt::Display for ApplySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} replaced, {} deleted, {} unchanged",
            self.created, self.updated, self.replaced, self.deleted, self.unchanged
        )
    }
}

/// Stored resources no longer in the manifest, newest first
fn orphans<'a>(manifest: &Manifest, state: &'a StateFile) -> Vec<&'a StoredResource> {
    state
        .resources
        .iter()
        .rev()
        .filter(|r| manifest.find(&r.type_name, &r.name).is_none())
        .collect()
}

fn validate_all(manifest: &Manifest, state: &StateFile) -> Result<()> {
    for entry in &manifest.resources {
        let config = resolve(&entry.config, state, false)?;
        dispatch::validate(&entry.type_name, &config)
            .with_context(|| format!("{} failed validation", entry.address()))?;
    }
    Ok(())
}

/// Actions an apply would take, computed from local state only
pub fn plan(manifest: &Manifest, state: &StateFile) -> Result<Vec<PlannedStep>> {
    validate_all(manifest, state)?;

    let mut steps: Vec<PlannedStep> = orphans(manifest, state)
        .into_iter()
        .map(|r| PlannedStep {
            action: Action::Delete,
            type_name: r.type_name.clone(),
            name: r.name.clone(),
        })
        .collect();

    for entry in &manifest.resources {
        let action = match state.find(&entry.type_name, &entry.name) {
            None => Some(Action::Create),
            Some(stored) => {
                let config = resolve(&entry.config, state, false)?;
                match dispatch::plan_change(&entry.type_name, &stored.attributes, &config)? {
                    Change::None => None,
                    Change::Update => Some(Action::Update),
                    Change::Replace => Some(Action::Replace),
                }
            }
        };
        if let Some(action) = action {
            steps.push(PlannedStep {
                action,
                type_name: entry.type_name.clone(),
                name: entry.name.clone(),
            });
        }
    }
    Ok(steps)
}

fn stored(entry: &ManifestEntry, attributes: Value) -> Result<StoredResource> {
    let id = dispatch::state_id(&entry.type_name, &attributes)?;
    Ok(StoredResource {
        type_name: entry.type_name.clone(),
        name: entry.name.clone(),
        id,
        attributes,
        pending: false,
    })
}

/// Create one entry; when the object exists but never became readable its
/// ID is kept in state before the error is returned
async fn create_entry(
    client: &IbmClient,
    entry: &ManifestEntry,
    config: &Value,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<()> {
    match dispatch::create(&entry.type_name, client, config).await {
        Ok(attributes) => {
            state.upsert(stored(entry, attributes)?);
            state.save(state_path)?;
            println!("{}: created", entry.address());
            Ok(())
        }
        Err(ProviderError::Settle { id, source }) => {
            let attributes = dispatch::placeholder(&entry.type_name, &id, config)?;
            state.upsert(StoredResource {
                pending: true,
                ..stored(entry, attributes)?
            });
            state.save(state_path)?;
            tracing::warn!("{} created as {} but not yet readable", entry.address(), id);
            Err(ProviderError::Settle { id, source })
                .with_context(|| format!("{} was created but not confirmed", entry.address()))
        }
        Err(e) => Err(e).with_context(|| format!("failed to create {}", entry.address())),
    }
}

/// Wait for an unconfirmed create to show up; its ID is never dropped
async fn confirm_pending(
    client: &IbmClient,
    resource: &StoredResource,
) -> Result<Value, ProviderError> {
    let result = dispatch::confirm(&resource.type_name, client, &resource.attributes).await;
    if let Err(ProviderError::Settle { id, .. }) = &result {
        tracing::warn!("{} ({}) is still not readable", resource.address(), id);
    }
    result
}

async fn delete_stored(
    client: &IbmClient,
    resource: &StoredResource,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<()> {
    dispatch::delete(&resource.type_name, client, &resource.attributes)
        .await
        .with_context(|| format!("failed to delete {}", resource.address()))?;
    state.remove(&resource.type_name, &resource.name);
    state.save(state_path)?;
    println!("{}: deleted", resource.address());
    Ok(())
}

/// Bring remote objects in line with the manifest
pub async fn apply(
    client: &IbmClient,
    manifest: &Manifest,
    state: &mut StateFile,
    state_path: &Path,
) -> Result<ApplySummary> {
    validate_all(manifest, state)?;
    let mut summary = ApplySummary::default();

    let doomed: Vec<StoredResource> = orphans(manifest, state).into_iter().cloned().collect();
    for resource in &doomed {
        delete_stored(client, resource, state, state_path).await?;
        summary.deleted += 1;
    }

    for entry in &manifest.resources {
        let config = resolve(&entry.config, state, true)
            .with_context(|| format!("in {}", entry.address()))?;

        let Some(existing) = state.find(&entry.type_name, &entry.name).cloned() else {
            create_entry(client, entry, &config, state, state_path).await?;
            summary.created += 1;
            continue;
        };

        // Refresh first so drift and half-created objects are seen
        let current = if existing.pending {
            confirm_pending(client, &existing).await.map(Some)
        } else {
            dispatch::read(&entry.type_name, client, &existing.attributes).await
        }
        .with_context(|| format!("failed to refresh {}", entry.address()))?;
        let Some(current) = current else {
            tracing::info!("{} disappeared remotely, recreating", entry.address());
            state.remove(&entry.type_name, &entry.name);
            create_entry(client, entry, &config, state, state_path).await?;
            summary.created += 1;
            continue;
        };
        let refreshed = stored(entry, current)?;
        state.upsert(refreshed.clone());

        match dispatch::plan_change(&entry.type_name, &refreshed.attributes, &config)? {
            Change::None => {
                state.save(state_path)?;
                summary.unchanged += 1;
            }
            Change::Update => {
                match dispatch::update(&entry.type_name, client, &refreshed.attributes, &config).await
                {
                    Ok(attributes) => {
                        state.upsert(stored(entry, attributes)?);
                        state.save(state_path)?;
                        println!("{}: updated", entry.address());
                        summary.updated += 1;
                    }
                    Err(e) if e.is_not_found() => {
                        tracing::info!("{} vanished during update, recreating", entry.address());
                        state.remove(&entry.type_name, &entry.name);
                        create_entry(client, entry, &config, state, state_path).await?;
                        summary.created += 1;
                    }
                    Err(e) => {
                        return Err(e).with_context(|| format!("failed to update {}", entry.address()))
                    }
                }
            }
            Change::Replace => {
                delete_stored(client, &refreshed, state, state_path).await?;
                create_entry(client, entry, &config, state, state_path).await?;
                summary.replaced += 1;
            }
        }
    }

    Ok(summary)
}

/// Re-read everything in state, dropping objects that are gone
pub async fn refresh(client: &IbmClient, state: &mut StateFile, state_path: &Path) -> Result<()> {
    let stored_resources = state.resources.clone();
    for resource in stored_resources {
        let current = if resource.pending {
            match confirm_pending(client, &resource).await {
                Ok(attributes) => Some(attributes),
                Err(ProviderError::Settle { .. }) => {
                    println!("{}: not yet readable, kept", resource.address());
                    continue;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to refresh {}", resource.address()))
                }
            }
        } else {
            dispatch::read(&resource.type_name, client, &resource.attributes)
                .await
                .with_context(|| format!("failed to refresh {}", resource.address()))?
        };
        match current {
            Some(attributes) => {
                let id = dispatch::state_id(&resource.type_name, &attributes)?;
                state.upsert(StoredResource {
                    id,
                    attributes,
                    pending: false,
                    ..resource
                });
            }
            None => {
                println!("{}: gone, removed from state", resource.address());
                state.remove(&resource.type_name, &resource.name);
            }
        }
    }
    state.save(state_path)
}

/// Delete everything in state, newest first
pub async fn destroy(client: &IbmClient, state: &mut StateFile, state_path: &Path) -> Result<usize> {
    let doomed: Vec<StoredResource> = state.resources.iter().rev().cloned().collect();
    for resource in &doomed {
        delete_stored(client, resource, state, state_path).await?;
    }
    Ok(doomed.len())
}

/// Adopt an existing remote object under `type.name`
pub async fn import(
    client: &IbmClient,
    state: &mut StateFile,
    state_path: &Path,
    type_name: &str,
    name: &str,
    id: &str,
) -> Result<()> {
    if state.find(type_name, name).is_some() {
        anyhow::bail!("{} is already managed", address(type_name, name));
    }

    let attributes = dispatch::import(type_name, client, id)
        .await
        .with_context(|| format!("failed to import {id} as {}", address(type_name, name)))?;
    let id = dispatch::state_id(type_name, &attributes)?;
    state.upsert(StoredResource {
        type_name: type_name.to_string(),
        name: name.to_string(),
        id,
        attributes,
        pending: false,
    });
    state.save(state_path)
}
