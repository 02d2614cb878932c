use std::sync::Arc;

/// Errors creating the adapter, device or a window surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// No adapter matched the requested backend and power preference.
    NoAdapter,
    DeviceCreation(String),
    SurfaceCreation(String),
    /// The surface reported no configuration for this adapter.
    SurfaceConfiguration,
}

impl std::fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "Failed to find a suitable GPU adapter"),
            Self::DeviceCreation(msg) => write!(f, "Failed to create device: {}", msg),
            Self::SurfaceCreation(msg) => write!(f, "Failed to create surface: {}", msg),
            Self::SurfaceConfiguration => write!(f, "Surface is not supported by the adapter"),
        }
    }
}

impl std::error::Error for GraphicsError {}

/// GPU API the context is created on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GraphicsBackend {
    /// Whatever the platform prefers.
    #[default]
    Auto,
    /// OpenGL (GLES / WebGL2).
    Gl,
    Vulkan,
}

impl GraphicsBackend {
    pub fn to_wgpu(self) -> wgpu::Backends {
        match self {
            Self::Auto => wgpu::Backends::all(),
            Self::Gl => wgpu::Backends::GL,
            Self::Vulkan => wgpu::Backends::VULKAN,
        }
    }
}

/// A globally shared graphics context.
///
/// # Ownership Pattern
///
/// This type uses Arc for shared ownership:
///
/// ```rust,no_run
/// use sprocket_render::GraphicsContext;
///
/// let ctx = GraphicsContext::new_owned_sync().expect("no GPU"); // Arc<Self>
/// let ctx2 = ctx.clone(); // Cheap clone (Arc)
/// ```
///
/// Windows, the backend and every instance upload share the same device and queue.
pub struct GraphicsContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GraphicsContext {
    /// Creates a context with the default descriptor.
    pub async fn new_owned() -> Result<Arc<Self>, GraphicsError> {
        Self::new_owned_with_descriptor(GraphicsContextDescriptor::default()).await
    }

    /// Blocks the current thread until the context is created.
    pub fn new_owned_sync() -> Result<Arc<Self>, GraphicsError> {
        pollster::block_on(Self::new_owned())
    }

    pub fn new_owned_sync_with_descriptor(descriptor: GraphicsContextDescriptor) -> Result<Arc<Self>, GraphicsError> {
        pollster::block_on(Self::new_owned_with_descriptor(descriptor))
    }

    pub async fn new_owned_with_descriptor(descriptor: GraphicsContextDescriptor) -> Result<Arc<Self>, GraphicsError> {
        Self::create_context_internal(descriptor).await.map(Arc::new)
    }

    async fn create_context_internal(descriptor: GraphicsContextDescriptor) -> Result<Self, GraphicsError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: descriptor.backend.to_wgpu(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: descriptor.power_preference,
                compatible_surface: None,
                force_fallback_adapter: descriptor.force_fallback_adapter,
            })
            .await
            .map_err(|_| GraphicsError::NoAdapter)?;

        let info = adapter.get_info();
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "Selected GPU adapter"
        );

        // Keep whatever the adapter offers so data textures and storage buffers can be as
        // large as the hardware allows.
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                label: descriptor.label,
                ..Default::default()
            })
            .await
            .map_err(|err| GraphicsError::DeviceCreation(err.to_string()))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get device info
    pub fn info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Get device limits
    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Whether vertex shaders can read three read-only storage buffers.
    ///
    /// WebGL2 and some GLES drivers cannot; instance data then travels in data textures.
    pub fn supports_vertex_storage_buffers(&self) -> bool {
        let downlevel = self.adapter.get_downlevel_capabilities();
        downlevel.flags.contains(wgpu::DownlevelFlags::VERTEX_STORAGE)
            && self.device.limits().max_storage_buffers_per_shader_stage >= 3
    }

    /// Get the maximum 2D texture dimension.
    #[inline]
    pub fn max_texture_dimension_2d(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

/// Descriptor for configuring graphics context creation.
#[derive(Debug, Clone)]
pub struct GraphicsContextDescriptor {
    pub backend: GraphicsBackend,
    /// Power preference for adapter selection
    pub power_preference: wgpu::PowerPreference,
    /// Whether to force fallback adapter
    pub force_fallback_adapter: bool,
    /// Optional label for debugging
    pub label: Option<&'static str>,
}

impl Default for GraphicsContextDescriptor {
    fn default() -> Self {
        Self {
            backend: GraphicsBackend::Auto,
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            label: None,
        }
    }
}

impl GraphicsContextDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: GraphicsBackend) -> Self {
        self.backend = backend;
        self
    }

    /// Set the power preference.
    pub fn power_preference(mut self, preference: wgpu::PowerPreference) -> Self {
        self.power_preference = preference;
        self
    }

    pub fn force_fallback_adapter(mut self, force: bool) -> Self {
        self.force_fallback_adapter = force;
        self
    }

    /// Set the debug label.
    pub fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection() {
        assert_eq!(GraphicsBackend::default(), GraphicsBackend::Auto);
        assert_eq!(GraphicsBackend::Gl.to_wgpu(), wgpu::Backends::GL);
        assert_eq!(GraphicsBackend::Vulkan.to_wgpu(), wgpu::Backends::VULKAN);
    }

    #[test]
    fn test_descriptor_builder() {
        let desc = GraphicsContextDescriptor::new()
            .backend(GraphicsBackend::Vulkan)
            .power_preference(wgpu::PowerPreference::LowPower)
            .label("test");
        assert_eq!(desc.backend, GraphicsBackend::Vulkan);
        assert_eq!(desc.power_preference, wgpu::PowerPreference::LowPower);
        assert_eq!(desc.label, Some("test"));
        assert!(!desc.force_fallback_adapter);
    }
}
