//! Batches of graphics ordered by draw key.

use std::collections::BTreeMap;

use sprocket_core::{alloc::HashMap, profiling::profile_function};

use crate::{graphic::GraphicId, texture::TextureId};

/// Sort key of a batch. Batches draw in ascending key order.
///
/// Graphics sharing a key are drawn by one instanced call. The writing mask is part of
/// the key so the mask pass can refresh its read target between masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchKey {
    pub z_index: i32,
    pub opaque: bool,
    pub texture_id: TextureId,
    pub writing_mask: u32,
    pub reading_mask: u32,
}

/// One instanced draw: `count` instances starting at `first` in the order index array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawBatch {
    pub texture_id: TextureId,
    pub writing_mask: u32,
    pub first: u32,
    pub count: u32,
}

/// Every graphic of one pass, grouped into batches.
#[derive(Debug, Default)]
pub struct RenderList {
    batches: BTreeMap<BatchKey, Vec<GraphicId>>,
    keys: HashMap<GraphicId, BatchKey>,
    reordered: bool,
}

impl RenderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to the batch for `key`. Returns false if it was already listed.
    pub fn insert(&mut self, id: GraphicId, key: BatchKey) -> bool {
        if self.keys.contains_key(&id) {
            return false;
        }
        self.keys.insert(id, key);
        self.batches.entry(key).or_default().push(id);
        self.reordered = true;
        true
    }

    /// Removes `id`, dropping its batch if it was the last member.
    pub fn remove(&mut self, id: GraphicId) -> Option<BatchKey> {
        let key = self.keys.remove(&id)?;
        if let Some(batch) = self.batches.get_mut(&key) {
            batch.retain(|member| *member != id);
            if batch.is_empty() {
                self.batches.remove(&key);
            }
        }
        self.reordered = true;
        Some(key)
    }

    /// Moves `id` to the batch for `key`. Returns true if it moved.
    pub fn rekey(&mut self, id: GraphicId, key: BatchKey) -> bool {
        match self.keys.get(&id) {
            Some(current) if *current == key => false,
            Some(_) => {
                self.remove(id);
                self.insert(id, key)
            }
            None => false,
        }
    }

    pub fn key_of(&self, id: GraphicId) -> Option<BatchKey> {
        self.keys.get(&id).copied()
    }

    pub fn contains(&self, id: GraphicId) -> bool {
        self.keys.contains_key(&id)
    }

    /// Number of listed graphics.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Batches in draw order.
    pub fn batches(&self) -> impl Iterator<Item = (&BatchKey, &[GraphicId])> {
        self.batches.iter().map(|(key, members)| (key, members.as_slice()))
    }

    /// Graphics in draw order.
    pub fn iter(&self) -> impl Iterator<Item = GraphicId> + '_ {
        self.batches.values().flatten().copied()
    }

    /// Membership or ordering changed since the order indices were last uploaded.
    pub fn was_reordered(&self) -> bool {
        self.reordered
    }

    pub fn set_reordered(&mut self) {
        self.reordered = true;
    }

    pub fn clear_reordered(&mut self) {
        self.reordered = false;
    }

    /// Builds the order index array and the draw ranges over it.
    ///
    /// `static_cursor` maps a graphic to its static record; graphics without one are
    /// left out.
    pub fn build_order(&self, mut static_cursor: impl FnMut(GraphicId) -> Option<u32>) -> (Vec<u32>, Vec<DrawBatch>) {
        profile_function!();
        let mut order = Vec::with_capacity(self.len());
        let mut draws = Vec::with_capacity(self.batch_count());

        for (key, members) in &self.batches {
            let first = order.len() as u32;
            order.extend(members.iter().filter_map(|id| static_cursor(*id)));
            let count = order.len() as u32 - first;
            if count > 0 {
                draws.push(DrawBatch {
                    texture_id: key.texture_id,
                    writing_mask: key.writing_mask,
                    first,
                    count,
                });
            }
        }
        (order, draws)
    }
}
