// Synchronization primitives
//
// Two binary GPU-side semaphores and nothing else: acquire signals
// image-available, the submit waits on it and signals render-finished, and
// presentation waits on that. There is deliberately no fence; the host never
// observes frame completion. That is safe only while command buffers are
// replayed unmodified and vertex data stays immutable after upload.

use crate::error::{Result, VkResultExt};
use ash::vk;

use super::VulkanContext;

/// The single in-flight frame's semaphore pair.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

impl FrameSync {
    pub fn new(context: &VulkanContext) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let image_available =
            unsafe { context.device.create_semaphore(&semaphore_info, None) }
                .stage("create image-available semaphore")?;
        let render_finished =
            match unsafe { context.device.create_semaphore(&semaphore_info, None) }
                .stage("create render-finished semaphore")
            {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    unsafe { context.device.destroy_semaphore(image_available, None) };
                    return Err(e);
                }
            };

        Ok(Self {
            image_available,
            render_finished,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
        }
    }
}
