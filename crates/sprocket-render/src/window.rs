use std::sync::Arc;

use sprocket_core::profiling::profile_function;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    backend::BackendError,
    context::{GraphicsContext, GraphicsError},
};

/// Descriptor for configuring a window's rendering context.
#[derive(Debug, Clone, Default)]
pub struct WindowContextDescriptor {
    /// The surface texture format. If None, uses the default format for the surface.
    pub format: Option<wgpu::TextureFormat>,
    /// Present mode for the surface.
    pub present_mode: Option<wgpu::PresentMode>,
    /// Alpha mode for the surface.
    pub alpha_mode: Option<wgpu::CompositeAlphaMode>,
}

impl WindowContextDescriptor {
    pub fn with_format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_present_mode(mut self, present_mode: wgpu::PresentMode) -> Self {
        self.present_mode = Some(present_mode);
        self
    }

    pub fn with_alpha_mode(mut self, alpha_mode: wgpu::CompositeAlphaMode) -> Self {
        self.alpha_mode = Some(alpha_mode);
        self
    }
}

/// Window rendering context that manages a surface and its configuration.
pub struct WindowContext {
    window: Arc<Window>,
    context: Arc<GraphicsContext>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    pending_resize: Option<PhysicalSize<u32>>,
}

impl WindowContext {
    pub fn new(
        context: Arc<GraphicsContext>,
        window: Arc<Window>,
        descriptor: WindowContextDescriptor,
    ) -> Result<Self, GraphicsError> {
        let PhysicalSize { width, height } = window.inner_size();
        let surface = context
            .instance
            .create_surface(window.clone())
            .map_err(|err| GraphicsError::SurfaceCreation(err.to_string()))?;

        let mut config = surface
            .get_default_config(&context.adapter, width.max(1), height.max(1))
            .ok_or(GraphicsError::SurfaceConfiguration)?;

        if let Some(format) = descriptor.format {
            config.format = format;
        }
        if let Some(present_mode) = descriptor.present_mode {
            config.present_mode = present_mode;
        }
        if let Some(alpha_mode) = descriptor.alpha_mode {
            config.alpha_mode = alpha_mode;
        }

        surface.configure(&context.device, &config);
        tracing::debug!(width, height, format = ?config.format, "Configured window surface");

        Ok(Self {
            window,
            context,
            surface,
            config,
            pending_resize: None,
        })
    }

    /// Handle window resize event. Applied when the next frame is acquired.
    pub fn resized(&mut self, new_size: PhysicalSize<u32>) {
        self.pending_resize = Some(new_size);
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    pub fn graphics_context(&self) -> &Arc<GraphicsContext> {
        &self.context
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Size of the surface in physical pixels, including a pending resize.
    pub fn size(&self) -> (u32, u32) {
        match self.pending_resize {
            Some(size) => (size.width, size.height),
            None => (self.config.width, self.config.height),
        }
    }

    pub fn surface_config(&self) -> &wgpu::SurfaceConfiguration {
        &self.config
    }

    /// Reconfigure the surface with a new configuration.
    pub fn reconfigure_surface(&mut self, config: wgpu::SurfaceConfiguration) {
        self.config = config;
        self.surface.configure(&self.context.device, &self.config);
    }

    /// Acquires the next surface texture, applying any pending resize first.
    ///
    /// A lost or outdated surface is reconfigured before the error is returned, so the
    /// next call can succeed.
    pub fn acquire(&mut self) -> Result<wgpu::SurfaceTexture, BackendError> {
        profile_function!();
        if let Some(size) = self.pending_resize.take()
            && size.width > 0
            && size.height > 0
        {
            self.config.width = size.width;
            self.config.height = size.height;
            self.surface.configure(&self.context.device, &self.config);
        }

        match self.surface.get_current_texture() {
            Ok(frame) => Ok(frame),
            Err(wgpu::SurfaceError::Lost) => {
                tracing::warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.context.device, &self.config);
                Err(BackendError::Lost)
            }
            Err(wgpu::SurfaceError::Outdated) => {
                tracing::debug!("Surface outdated, reconfiguring");
                self.surface.configure(&self.context.device, &self.config);
                Err(BackendError::Outdated)
            }
            Err(wgpu::SurfaceError::Timeout) => Err(BackendError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => Err(BackendError::OutOfMemory),
            Err(err) => Err(BackendError::Other(err.to_string())),
        }
    }
}
