//! Per-loader type table
//!
//! Maps reflected ids to their single `Arc<Type>` instance. Owned by one
//! loader; nothing here is process-wide.

use super::types::Type;
use dashmap::DashMap;
use std::sync::Arc;

/// Interned types of one loaded module. Entries are never evicted.
#[derive(Default)]
pub struct TypeTable {
    types: DashMap<u32, Arc<Type>>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self {
            types: DashMap::with_capacity(64),
        }
    }

    /// Look up an already interned type
    #[inline]
    pub fn get(&self, id: u32) -> Option<Arc<Type>> {
        self.types.get(&id).map(|ty| Arc::clone(ty.value()))
    }

    /// Intern a freshly decoded type.
    ///
    /// If the id was interned in the meantime the existing instance wins, so
    /// every caller observes one instance per id.
    pub fn intern(&self, ty: Type) -> Arc<Type> {
        let entry = self.types.entry(ty.id).or_insert_with(|| Arc::new(ty));
        Arc::clone(entry.value())
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.types.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
