//! Binds every reference of the desired set to a target.
//!
//! A target that is itself desired becomes a [`Binding::Pending`] edge: its
//! handle is only known once it has been created. A target found only in
//! observed state binds to the existing handle. Anything else is an
//! unresolved reference and fails the owning object.

use std::collections::{HashMap, HashSet};

use super::error::SyncError;
use crate::model::{Identity, RemoteHandle};
use crate::store::ObjectStore;

/// Handle used when references are checked without a backend.
pub const UNVERIFIED_HANDLE: &str = "unverified";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Pending(Identity),
    Remote(RemoteHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRef {
    pub field: String,
    pub target: Identity,
    pub binding: Binding,
}

/// Lookup into observed state.
pub trait ObservedLookup {
    fn handle_of(&self, identity: &Identity) -> Option<RemoteHandle>;
}

impl ObservedLookup for ObjectStore {
    fn handle_of(&self, identity: &Identity) -> Option<RemoteHandle> {
        self.get(identity).and_then(|o| o.handle()).cloned()
    }
}

/// Treats every reference outside the desired set as existing remotely.
/// Used for offline validation.
pub struct AssumeRemote;

impl ObservedLookup for AssumeRemote {
    fn handle_of(&self, _identity: &Identity) -> Option<RemoteHandle> {
        Some(RemoteHandle::new(UNVERIFIED_HANDLE))
    }
}

#[derive(Debug, Default)]
pub struct ResolutionTable {
    bindings: HashMap<Identity, Vec<ResolvedRef>>,
    failures: HashMap<Identity, Vec<SyncError>>,
}

impl ResolutionTable {
    /// Resolves all references of `desired`, in desired order.
    pub fn resolve(desired: &ObjectStore, observed: &dyn ObservedLookup) -> Self {
        Self::resolve_holding(desired, observed, &HashSet::new())
    }

    /// Like [`ResolutionTable::resolve`], with `held` objects treated as
    /// desired: they are planned but cannot be applied, so references to
    /// them wait on them instead of binding to the remote copy.
    pub fn resolve_holding(
        desired: &ObjectStore,
        observed: &dyn ObservedLookup,
        held: &HashSet<Identity>,
    ) -> Self {
        let mut table = Self::default();

        for object in desired.iter() {
            let identity = object.identity();
            let mut resolved = Vec::with_capacity(object.references().len());
            let mut failures = Vec::new();

            for reference in object.references() {
                let binding = if &reference.target == identity {
                    failures.push(SyncError::DependencyCycle {
                        identities: vec![identity.clone()],
                    });
                    continue;
                } else if desired.contains(&reference.target) || held.contains(&reference.target) {
                    Binding::Pending(reference.target.clone())
                } else if let Some(handle) = observed.handle_of(&reference.target) {
                    Binding::Remote(handle)
                } else {
                    log::debug!(
                        "{}: {} -> {} not found",
                        identity,
                        reference.field,
                        reference.target
                    );
                    failures.push(SyncError::UnresolvedReference {
                        field: reference.field.clone(),
                        target_name: reference.target.name.clone(),
                        target: reference.target.clone(),
                    });
                    continue;
                };
                resolved.push(ResolvedRef {
                    field: reference.field.clone(),
                    target: reference.target.clone(),
                    binding,
                });
            }

            table.bindings.insert(identity.clone(), resolved);
            if !failures.is_empty() {
                table.failures.insert(identity.clone(), failures);
            }
        }

        table
    }

    /// Successfully bound references of an object, in field order.
    pub fn references(&self, identity: &Identity) -> &[ResolvedRef] {
        self.bindings.get(identity).map_or(&[], Vec::as_slice)
    }

    /// Desired objects this object must wait for.
    pub fn pending_dependencies<'a>(
        &'a self,
        identity: &Identity,
    ) -> impl Iterator<Item = &'a Identity> + 'a {
        self.references(identity).iter().filter_map(|r| match &r.binding {
            Binding::Pending(target) => Some(target),
            Binding::Remote(_) => None,
        })
    }

    pub fn failures(&self, identity: &Identity) -> &[SyncError] {
        self.failures.get(identity).map_or(&[], Vec::as_slice)
    }

    /// Objects with at least one failed reference.
    pub fn failed(&self) -> impl Iterator<Item = (&Identity, &[SyncError])> {
        self.failures.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
