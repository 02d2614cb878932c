use sprocket_core::{alloc::RegionAllocator, profiling::profile_function};

use super::data::{InstanceData, StaticInstanceRecord};

/// Slots owned by one drawable in the instance store.
///
/// Created by [`InstanceAllocator::allocate`] and handed back to
/// [`InstanceAllocator::free`] when the drawable leaves the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicBatchHandler {
    /// Index of the static record.
    pub static_cursor: usize,
    /// Offset of the dynamic payload, in floats.
    pub dynamic_cursor: usize,
    /// Length of the dynamic payload, in floats.
    pub dynamic_size: usize,
}

/// Hands out static and dynamic slots in an [`InstanceData`] store.
///
/// Exhaustion grows the backing arrays at their tail and retries, so allocation
/// never fails.
#[derive(Debug, Default)]
pub struct InstanceAllocator {
    data: InstanceData,
    static_slots: RegionAllocator,
    dynamic_slots: RegionAllocator,
}

impl InstanceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-sizes the store for `statics` records and `dynamics` payload floats.
    pub fn with_capacity(statics: usize, dynamics: usize) -> Self {
        let mut data = InstanceData::new();
        data.ensure_static_len(statics);
        data.ensure_dynamic_len(dynamics);
        Self {
            data,
            static_slots: RegionAllocator::with_capacity(statics),
            dynamic_slots: RegionAllocator::with_capacity(dynamics),
        }
    }

    /// Reserves one static record and `dynamic_size` contiguous payload floats.
    pub fn allocate(&mut self, dynamic_size: usize) -> GraphicBatchHandler {
        profile_function!();
        let static_cursor = self.static_slots.allocate_or_grow(1);
        let dynamic_cursor = self.dynamic_slots.allocate_or_grow(dynamic_size);

        self.data.ensure_static_len(self.static_slots.capacity());
        self.data.ensure_dynamic_len(self.dynamic_slots.capacity());

        tracing::trace!(
            static_cursor,
            dynamic_cursor,
            dynamic_size,
            "allocated instance slots"
        );

        GraphicBatchHandler {
            static_cursor,
            dynamic_cursor,
            dynamic_size,
        }
    }

    /// Returns both slots of `handler` to their free lists.
    pub fn free(&mut self, handler: &GraphicBatchHandler) {
        profile_function!();
        self.static_slots.free(handler.static_cursor, handler.static_cursor + 1);
        if handler.dynamic_size > 0 {
            self.dynamic_slots.free(
                handler.dynamic_cursor,
                handler.dynamic_cursor + handler.dynamic_size,
            );
        }
        // Freed records must never be drawn if an index to them goes stale.
        *self.data.static_record_mut(handler.static_cursor) = StaticInstanceRecord::default();
    }

    pub fn static_instance_data(&self, cursor: usize) -> &StaticInstanceRecord {
        self.data.static_record(cursor)
    }

    pub fn static_instance_data_mut(&mut self, cursor: usize) -> &mut StaticInstanceRecord {
        self.data.static_record_mut(cursor)
    }

    pub fn dynamic_instance_data(&self, handler: &GraphicBatchHandler) -> &[f32] {
        self.data.dynamic(handler.dynamic_cursor, handler.dynamic_size)
    }

    pub fn dynamic_instance_data_mut(&mut self, handler: &GraphicBatchHandler) -> &mut [f32] {
        self.data.dynamic_mut(handler.dynamic_cursor, handler.dynamic_size)
    }

    /// Both the record and the payload of `handler`, borrowed together.
    pub fn instance_data_mut(
        &mut self,
        handler: &GraphicBatchHandler,
    ) -> (&mut StaticInstanceRecord, &mut [f32]) {
        self.data.instance_mut(
            handler.static_cursor,
            handler.dynamic_cursor,
            handler.dynamic_size,
        )
    }

    pub fn data(&self) -> &InstanceData {
        &self.data
    }

    /// Number of live static records.
    pub fn live_statics(&self) -> usize {
        self.static_slots.capacity() - self.static_slots.free_capacity()
    }

    /// Number of live payload floats.
    pub fn live_dynamics(&self) -> usize {
        self.dynamic_slots.capacity() - self.dynamic_slots.free_capacity()
    }
}
