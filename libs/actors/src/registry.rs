//! Actor Registry
//!
//! Built once when the dispatcher starts and read-only afterwards, so
//! lookups take no lock. Small ids index a dense table; larger ids fall back
//! to a map.

use crate::cell::ActorCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use types::ActorId;

/// Ids below this resolve through the dense table
pub const FAST_SLOTS: usize = 4096;

pub(crate) struct ActorRegistry {
    fast: Vec<Option<Arc<dyn ActorCell>>>,
    overflow: HashMap<ActorId, Arc<dyn ActorCell>>,
    /// Ascending, proxy included
    ids: Vec<ActorId>,
}

impl ActorRegistry {
    pub(crate) fn from_cells(cells: BTreeMap<ActorId, Arc<dyn ActorCell>>) -> Self {
        let mut fast = vec![None; FAST_SLOTS];
        let mut overflow = HashMap::new();
        let mut ids = Vec::with_capacity(cells.len());

        for (id, cell) in cells {
            ids.push(id);
            if id.index() < FAST_SLOTS {
                fast[id.index()] = Some(cell);
            } else {
                overflow.insert(id, cell);
            }
        }

        tracing::debug!(
            actors = ids.len(),
            overflow = overflow.len(),
            "Actor registry built"
        );
        Self {
            fast,
            overflow,
            ids,
        }
    }

    pub(crate) fn get(&self, id: ActorId) -> Option<&Arc<dyn ActorCell>> {
        match self.fast.get(id.index()) {
            Some(slot) => slot.as_ref(),
            None => self.overflow.get(&id),
        }
    }

    pub(crate) fn contains(&self, id: ActorId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn ids(&self) -> &[ActorId] {
        &self.ids
    }

    /// Cells in ascending id order
    pub(crate) fn cells(&self) -> impl Iterator<Item = &Arc<dyn ActorCell>> + '_ {
        self.ids.iter().filter_map(move |id| self.get(*id))
    }
}
