//! Content-addressed diffing of unordered block collections.
//!
//! Blocks are partitioned by [`BlockKey`]:
//!
//! | Desired | Observed | Outcome |
//! |---------|----------|---------|
//! | key present | same key, same form | unchanged |
//! | key present | same key, different form | update |
//! | key present | absent | create |
//! | absent | key present | delete |
//!
//! With a sound hasher an update only happens on a fingerprint collision.
//! Identical blocks on either side collapse into one entry. Distinct blocks
//! that share a key on the same side are all kept: matching forms pair up as
//! unchanged, the leftovers pair up as updates, and any surplus becomes a
//! create or a delete. Output vectors are ordered by key, so the plan never
//! depends on declaration order.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::canonical::{BlockHasher, BlockKey, Canonical, CanonicalForm, Sha256BlockHasher};

/// A block together with its fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyedBlock<T> {
    /// Fingerprint of the block's canonical form.
    pub key: BlockKey,
    /// The block.
    pub block: T,
}

/// A block whose fingerprint matches on both sides but whose content differs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChange<T> {
    /// Shared fingerprint.
    pub key: BlockKey,
    /// The observed block.
    pub observed: T,
    /// The desired block.
    pub desired: T,
}

/// The result of diffing two block collections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPlan<T> {
    /// Blocks only in desired.
    pub to_create: Vec<KeyedBlock<T>>,
    /// Blocks whose keys match but whose content differs.
    pub to_update: Vec<BlockChange<T>>,
    /// Blocks only in observed.
    pub to_delete: Vec<KeyedBlock<T>>,
    /// Blocks identical on both sides.
    pub unchanged: Vec<KeyedBlock<T>>,
}

impl<T> Default for SetPlan<T> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_update: Vec::new(),
            to_delete: Vec::new(),
            unchanged: Vec::new(),
        }
    }
}

impl<T: Clone> SetPlan<T> {
    /// Whether applying the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    /// The complete collection after applying the plan, ordered by key.
    #[must_use]
    pub fn target(&self) -> Vec<T> {
        let mut members: Vec<(BlockKey, T)> = self
            .to_create
            .iter()
            .chain(&self.unchanged)
            .map(|kb| (kb.key, kb.block.clone()))
            .chain(self.to_update.iter().map(|c| (c.key, c.desired.clone())))
            .collect();
        members.sort_by_key(|(key, _)| *key);
        members.into_iter().map(|(_, block)| block).collect()
    }
}

/// Diffs block collections by content.
#[derive(Debug, Clone)]
pub struct SetReconciler {
    hasher: Arc<dyn BlockHasher>,
}

impl Default for SetReconciler {
    fn default() -> Self {
        Self::new(Arc::new(Sha256BlockHasher))
    }
}

impl SetReconciler {
    /// Create a reconciler with the given hasher.
    #[must_use]
    pub fn new(hasher: Arc<dyn BlockHasher>) -> Self {
        Self { hasher }
    }

    /// The hasher in use.
    #[must_use]
    pub fn hasher(&self) -> &dyn BlockHasher {
        self.hasher.as_ref()
    }

    /// Partition `desired` and `observed` into create/update/delete/unchanged.
    pub fn diff<T: Canonical + Clone>(&self, desired: &[T], observed: &[T]) -> SetPlan<T> {
        let mut desired = self.index(desired);
        let observed = self.index(observed);
        let mut plan = SetPlan::default();

        for (key, observed_group) in observed {
            let mut wanted = desired.remove(&key).unwrap_or_default();
            let mut stale = Vec::new();
            for (form, block) in observed_group {
                match wanted.iter().position(|(f, _)| *f == form) {
                    Some(i) => {
                        wanted.remove(i);
                        plan.unchanged.push(KeyedBlock { key, block });
                    }
                    None => stale.push(block),
                }
            }

            let mut wanted = wanted.into_iter().map(|(_, block)| block);
            for observed_block in stale {
                match wanted.next() {
                    Some(block) => plan.to_update.push(BlockChange {
                        key,
                        observed: observed_block,
                        desired: block,
                    }),
                    None => plan.to_delete.push(KeyedBlock {
                        key,
                        block: observed_block,
                    }),
                }
            }
            plan.to_create.extend(wanted.map(|block| KeyedBlock { key, block }));
        }
        for (key, group) in desired {
            plan.to_create.extend(group.into_iter().map(|(_, block)| KeyedBlock { key, block }));
        }
        plan.to_create.sort_by_key(|kb| kb.key);

        plan
    }

    /// Group blocks by key. Identical forms are kept once; distinct forms
    /// under one key are ordered by their encoding.
    fn index<T: Canonical + Clone>(
        &self,
        blocks: &[T],
    ) -> BTreeMap<BlockKey, Vec<(CanonicalForm, T)>> {
        let mut index: BTreeMap<BlockKey, Vec<(CanonicalForm, T)>> = BTreeMap::new();
        for block in blocks {
            let form = block.canonical_form();
            let group = index.entry(self.hasher.key(&form)).or_default();
            if !group.iter().any(|(f, _)| *f == form) {
                group.push((form, block.clone()));
            }
        }
        for group in index.values_mut() {
            group.sort_by_cached_key(|(form, _)| form.to_bytes());
        }
        index
    }
}
