//! Instance data: CPU store, slot allocation, dirty tracking and GPU transport.

mod allocator;
mod data;
mod storage;
mod texel;
mod uploader;

pub use allocator::{GraphicBatchHandler, InstanceAllocator};
pub use data::{DYNAMIC_ELEMENT_SIZE, InstanceData, InstanceKind, STATIC_RECORD_SIZE, StaticInstanceRecord};
pub use storage::{InstanceStorage, InstanceTarget, InstanceTransport, TexelLayout};
pub use texel::{TexelWrite, rows_for, texel_writes};
pub use uploader::{InstanceUploader, UploadStats};
