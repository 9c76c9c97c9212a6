// =============================================================================
// VULKAN TRIANGLE RENDERER
// =============================================================================
//
// A single fixed-size window, a single frame in flight, one pre-recorded
// triangle. The interesting part is the ordering: every Vulkan object below
// is created in dependency order and destroyed in exactly the reverse order.
//
// INITIALIZATION ORDER:
// 1. Instance (+ optional validation)        backend::device::create_instance
// 2. Surface                                 ash-window
// 3. Physical device, queue families, device backend::device::VulkanContext
// 4. Swapchain + image views                 backend::swapchain
// 5. Render pass + graphics pipeline         backend::pipeline
// 6. Framebuffers                            backend::pipeline
// 7. Command pool + vertex buffer upload     backend::commands / buffer
// 8. Pre-recorded draw command buffers       backend::commands
// 9. Semaphore pair                          backend::sync
//
// FRAME FLOW: acquire -> submit -> present, ordered purely by the two
// semaphores. No per-frame fence: the host never waits for a frame to finish,
// which is safe only because nothing it submits is ever mutated again.
//
// =============================================================================

mod backend;
mod config;
mod error;

use anyhow::{Context, Result};
use ash::extensions::khr;
use ash::vk;
use backend::buffer::GpuBuffer;
use backend::device::FirstAdapter;
use backend::pipeline::PipelineState;
use backend::sync::FrameSync;
use backend::{Swapchain, VulkanContext};
use config::Config;
use error::VkResultExt;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

fn main() -> Result<()> {
    let config = Config::load();

    init_logging();
    log::info!("Starting Vulkan triangle renderer");
    log::info!("Window: {}x{}", config.window.width, config.window.height);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;
    Ok(())
}

fn init_logging() {
    use env_logger::Builder;
    use log::LevelFilter;

    let mut builder = Builder::from_default_env();
    builder.filter_level(LevelFilter::Info);
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Holds every long-lived Vulkan handle, by ownership.
///
/// IMPORTANT: teardown happens in `Drop`, strictly reverse of the creation
/// order documented at the top of this file.
struct App {
    config: Config,

    window: Option<Arc<Window>>,
    surface: Option<vk::SurfaceKHR>,
    surface_loader: Option<khr::Surface>,

    context: Option<Arc<VulkanContext>>,
    swapchain: Option<Swapchain>,
    pipeline: Option<PipelineState>,
    framebuffers: Vec<vk::Framebuffer>,

    command_pool: Option<vk::CommandPool>,
    /// One pre-recorded command buffer per swapchain image
    command_buffers: Vec<vk::CommandBuffer>,

    vertex_buffer: Option<GpuBuffer>,
    sync: Option<FrameSync>,

    // Pre-allocated to keep the hot path allocation-free
    wait_stages: [vk::PipelineStageFlags; 1],

    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let now = Instant::now();
        Self {
            config,
            window: None,
            surface: None,
            surface_loader: None,
            context: None,
            swapchain: None,
            pipeline: None,
            framebuffers: Vec::new(),
            command_pool: None,
            command_buffers: Vec::new(),
            vertex_buffer: None,
            sync: None,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_vulkan(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan");

        // 1. Instance
        let entry = unsafe { ash::Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;
        let enable_validation = self.config.debug.validation_layers;
        let (instance, debug_utils) = backend::device::create_instance(
            &entry,
            &self.config.window.title,
            window.raw_display_handle(),
            enable_validation,
        )?;
        log::info!("Created instance");

        // 2. Surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        }
        .stage("create surface")?;
        log::info!("Created surface");

        // 3. Physical device, queue families, logical device
        let context = VulkanContext::new(
            entry,
            instance,
            debug_utils,
            &surface_loader,
            surface,
            &FirstAdapter,
        )?;
        log::info!("Created logical device");

        // 4. Swapchain + image views
        let size = window.inner_size();
        let swapchain = Swapchain::new(
            context.clone(),
            surface,
            &surface_loader,
            size.width,
            size.height,
        )?;
        log::info!("Created swapchain");

        // 5. Render pass + graphics pipeline (shader blobs are inputs only)
        let vert_spirv = backend::shader::load_spirv(&self.config.shaders.vertex)?;
        let frag_spirv = backend::shader::load_spirv(&self.config.shaders.fragment)?;
        let pipeline = PipelineState::new(
            &context,
            swapchain.format,
            swapchain.extent,
            &vert_spirv,
            &frag_spirv,
        )?;
        log::info!("Created graphics pipeline");

        // 6. Framebuffers, one per image view
        let framebuffers = backend::pipeline::create_framebuffers(
            &context,
            &swapchain.image_views,
            pipeline.render_pass,
            swapchain.extent,
        )?;
        log::info!("Created {} framebuffers", framebuffers.len());

        // 7. Command pool, then the staging upload of the vertex data
        let command_pool = backend::commands::create_command_pool(&context)?;
        let vertex_buffer = GpuBuffer::device_local_with_data(
            &context,
            command_pool,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &backend::vertex::TRIANGLE,
        )?;
        log::info!("Uploaded vertex buffer ({} bytes)", vertex_buffer.size);

        // 8. Pre-recorded draw commands, one buffer per framebuffer
        let command_buffers = backend::commands::record_draw_commands(
            &context,
            command_pool,
            &pipeline,
            &framebuffers,
            swapchain.extent,
            vertex_buffer.buffer,
            backend::vertex::TRIANGLE.len() as u32,
            self.config.graphics.clear_color,
        )?;
        log::info!("Recorded {} command buffers", command_buffers.len());

        // One of everything per swapchain image, indexed by acquire result
        debug_assert_eq!(swapchain.images.len(), swapchain.image_views.len());
        debug_assert_eq!(framebuffers.len(), swapchain.image_views.len());
        debug_assert_eq!(command_buffers.len(), framebuffers.len());

        // 9. The semaphore pair driving the frame loop
        let sync = FrameSync::new(&context)?;
        log::info!("Created synchronization primitives");

        self.surface = Some(surface);
        self.surface_loader = Some(surface_loader);
        self.context = Some(context);
        self.swapchain = Some(swapchain);
        self.pipeline = Some(pipeline);
        self.framebuffers = framebuffers;
        self.command_pool = Some(command_pool);
        self.command_buffers = command_buffers;
        self.vertex_buffer = Some(vertex_buffer);
        self.sync = Some(sync);

        log::info!("Vulkan initialized");
        Ok(())
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    /// One tick of the acquire -> submit -> present cycle.
    fn render_frame(&mut self) -> Result<()> {
        let context = self.context.as_ref().context("Device not initialized")?;
        let swapchain = self
            .swapchain
            .as_ref()
            .context("Swapchain not initialized")?;
        let sync = self.sync.as_ref().context("Sync not initialized")?;

        // Acquire: unbounded wait for the next presentable image
        let image_index = swapchain.acquire_next_image(sync.image_available)?;

        // Submit: replay the pre-recorded buffer for that image. The GPU
        // waits for image-available at the color-output stage and signals
        // render-finished when the frame is done. No fence.
        let wait_semaphores = [sync.image_available];
        let signal_semaphores = [sync.render_finished];
        let command_buffers = [self.command_buffers[image_index as usize]];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            context
                .device
                .queue_submit(
                    context.graphics_queue,
                    &[submit_info.build()],
                    vk::Fence::null(),
                )
                .stage("queue submit")?;
        }

        // Present: the engine reads the image once render-finished signals
        swapchain.present(context.present_queue, image_index, &signal_semaphores)?;

        Ok(())
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        if now.duration_since(self.last_fps_update).as_secs_f32() >= 1.0 {
            let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        // Fixed-size, non-resizable window; there is no swapchain recreation
        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.init_vulkan(&window) {
            log::error!("Failed to initialize Vulkan: {:?}", e);
            event_loop.exit();
            return;
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down");
                event_loop.exit();
            }

            WindowEvent::RedrawRequested => {
                match self.render_frame() {
                    Ok(()) => self.update_fps(),
                    Err(e) => {
                        // Every GPU failure past init is fatal by design
                        log::error!("Render error: {:?}", e);
                        event_loop.exit();
                        return;
                    }
                }

                // Fixed per-tick delay, matching the single-threaded
                // poll -> draw -> delay loop shape
                let delay = self.config.graphics.frame_delay_ms;
                if delay > 0 {
                    std::thread::sleep(Duration::from_millis(delay));
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() {
                    if let PhysicalKey::Code(KeyCode::Escape) = event.physical_key {
                        log::info!("ESC pressed, exiting");
                        event_loop.exit();
                    }
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

// =============================================================================
// CLEANUP
// =============================================================================

impl Drop for App {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources");

        if let Some(ref context) = self.context {
            // Drain all in-flight GPU work before destroying anything
            let _ = context.wait_idle();

            unsafe {
                // Reverse order of creation

                // 9. Semaphores
                if let Some(sync) = self.sync.take() {
                    sync.destroy(&context.device);
                }

                // 8./7. Command buffers, pool, vertex buffer
                if let Some(pool) = self.command_pool.take() {
                    if !self.command_buffers.is_empty() {
                        context
                            .device
                            .free_command_buffers(pool, &self.command_buffers);
                    }
                    context.device.destroy_command_pool(pool, None);
                }
                if let Some(vertex_buffer) = self.vertex_buffer.take() {
                    vertex_buffer.destroy(&context.device);
                }

                // 6. Framebuffers
                for framebuffer in self.framebuffers.drain(..) {
                    context.device.destroy_framebuffer(framebuffer, None);
                }

                // 5. Pipeline, layout, render pass
                if let Some(pipeline) = self.pipeline.take() {
                    pipeline.destroy(&context.device);
                }

                // 4. Swapchain + image views
                self.swapchain = None;

                // 2. Surface
                if let (Some(surface), Some(ref loader)) = (self.surface.take(), &self.surface_loader)
                {
                    loader.destroy_surface(surface, None);
                }

                // 3./1. Device, debug messenger, instance drop with the context
            }
        }

        log::info!("Cleanup complete");
    }
}
