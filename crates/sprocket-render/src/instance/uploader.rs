use sprocket_core::{alloc::RegionBuffer, profiling::profile_function};
use sprocket_test_utils::RenderContext;

use super::{
    data::{DYNAMIC_ELEMENT_SIZE, InstanceData, STATIC_RECORD_SIZE},
    storage::InstanceStorage,
};

/// Transfer calls issued by one [`InstanceUploader::upload`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadStats {
    pub static_writes: usize,
    pub dynamic_writes: usize,
    pub bytes: usize,
}

/// Tracks which parts of the instance store changed since the last upload.
///
/// Dirty ranges are kept in element units (records for static data, floats for
/// dynamic data) and converted to byte offsets only when transferred. Overlapping
/// and adjacent marks merge, so every dirty byte is sent once per upload.
#[derive(Debug, Default)]
pub struct InstanceUploader {
    static_dirty: RegionBuffer,
    dynamic_dirty: RegionBuffer,
}

impl InstanceUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `count` static records starting at `offset` for upload.
    pub fn mark_static_data_dirty(&mut self, offset: usize, count: usize) {
        self.static_dirty.push(offset, offset + count);
    }

    /// Marks `count` payload floats starting at `offset` for upload.
    pub fn mark_dynamic_data_dirty(&mut self, offset: usize, count: usize) {
        self.dynamic_dirty.push(offset, offset + count);
    }

    pub fn dirty_static(&self) -> &RegionBuffer {
        &self.static_dirty
    }

    pub fn dirty_dynamic(&self) -> &RegionBuffer {
        &self.dynamic_dirty
    }

    pub fn is_clean(&self) -> bool {
        self.static_dirty.is_empty() && self.dynamic_dirty.is_empty()
    }

    /// Sends every dirty range to `storage`, then clears both dirty sets.
    ///
    /// `storage` must already be large enough for `data`; see
    /// [`InstanceStorage::sync`].
    pub fn upload(
        &mut self,
        ctx: &dyn RenderContext,
        data: &InstanceData,
        storage: &InstanceStorage,
    ) -> UploadStats {
        profile_function!();
        let mut stats = UploadStats::default();

        let static_bytes = data.static_bytes();
        for region in &self.static_dirty {
            let range = region.begin * STATIC_RECORD_SIZE..region.end * STATIC_RECORD_SIZE;
            stats.bytes += range.len();
            stats.static_writes += storage.statics().write(ctx, static_bytes, range);
        }

        let dynamic_bytes = data.dynamic_bytes();
        for region in &self.dynamic_dirty {
            let range = region.begin * DYNAMIC_ELEMENT_SIZE..region.end * DYNAMIC_ELEMENT_SIZE;
            stats.bytes += range.len();
            stats.dynamic_writes += storage.dynamics().write(ctx, dynamic_bytes, range);
        }

        if stats.static_writes + stats.dynamic_writes > 0 {
            tracing::trace!(?stats, "uploaded instance data");
        }

        self.static_dirty.clear();
        self.dynamic_dirty.clear();
        stats
    }
}
