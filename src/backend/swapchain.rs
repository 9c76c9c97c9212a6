// Swapchain - window presentation
//
// Negotiates format, present mode, image count and extent against what the
// driver reports, then owns the image-view chain. Double buffered: we ask for
// two images and take whatever the driver clamps that to.

use crate::error::{Result, RendererError, VkResultExt};
use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;

use super::VulkanContext;

/// Target image count. The driver may force more (or fewer never: minimum
/// wins), and may hand back more images than requested.
const DESIRED_IMAGE_COUNT: u32 = 2;

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub present_mode: vk::PresentModeKHR,
    context: Arc<VulkanContext>,
}

impl Swapchain {
    pub fn new(
        context: Arc<VulkanContext>,
        surface: vk::SurfaceKHR,
        surface_loader: &khr::Surface,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(context.physical_device, surface)
        }
        .stage("query surface capabilities")?;

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(context.physical_device, surface)
        }
        .stage("query surface formats")?;

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(context.physical_device, surface)
        }
        .stage("query present modes")?;

        let surface_format = choose_surface_format(&formats)?;
        let present_mode = choose_present_mode(&present_modes);
        let image_count = choose_image_count(&capabilities);
        let extent = choose_extent(&capabilities, vk::Extent2D { width, height });

        log::info!(
            "Swapchain: {:?} {:?}, {:?}, {} images, {}x{}",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count,
            extent.width,
            extent.height,
        );

        // Images are shared across both families only when they differ;
        // a combined family keeps exclusive ownership.
        let family_indices = [context.graphics_family, context.present_family];
        let (sharing_mode, family_indices): (_, &[u32]) =
            if context.graphics_family != context.present_family {
                (vk::SharingMode::CONCURRENT, &family_indices)
            } else {
                (vk::SharingMode::EXCLUSIVE, &[])
            };

        let swapchain_loader = khr::Swapchain::new(&context.instance, &context.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .stage("create swapchain")?;

        // Actual count may exceed the requested minimum
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .stage("get swapchain images")?;
        log::info!("Driver handed back {} swapchain images", images.len());

        let image_views = images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { context.device.create_image_view(&create_info, None) }
                    .stage("create image view")
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
            context,
        })
    }

    /// Block until the presentation engine hands out the next image index,
    /// signalling `semaphore` once the image is actually writable. Unbounded
    /// wait: out-of-date/suboptimal swapchains are not handled here.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, _suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
        .stage("acquire swapchain image")?;
        Ok(index)
    }

    /// Queue the acquired image for presentation once `wait_semaphores` have
    /// signalled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .stage("queue present")?;
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.context.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

// =============================================================================
// NEGOTIATION
// =============================================================================

/// Prefer 8-bit BGRA with nonlinear sRGB encoding, else the first reported
/// format. An empty list is a driver bug we cannot negotiate around.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
        .ok_or(RendererError::Unsupported("surface reports no formats"))
}

/// Prefer MAILBOX (low latency, no tearing), else FIFO which every driver
/// must support.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Double buffering, clamped into the driver's [min, max] window.
/// A reported max of zero means unbounded.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let max = if capabilities.max_image_count == 0 {
        u32::MAX
    } else {
        capabilities.max_image_count
    };
    DESIRED_IMAGE_COUNT.clamp(capabilities.min_image_count, max)
}

/// The driver either fixes the extent (current_extent != u32::MAX) or lets us
/// pick within its reported bounds.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn image_count_targets_double_buffering() {
        assert_eq!(choose_image_count(&caps(1, 8)), 2);
    }

    #[test]
    fn image_count_clamps_to_driver_minimum() {
        // min=3, max=3: requesting 2 must yield exactly 3
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn image_count_treats_zero_max_as_unbounded() {
        assert_eq!(choose_image_count(&caps(2, 0)), 2);
    }

    #[test]
    fn extent_clamps_into_reported_bounds() {
        let mut capabilities = caps(2, 3);
        capabilities.max_image_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 1024,
                height: 720,
            },
        );
        assert_eq!(extent.width, 800);
        assert_eq!(extent.height, 600);
    }

    #[test]
    fn extent_respects_driver_fixed_size() {
        let mut capabilities = caps(2, 3);
        capabilities.current_extent = vk::Extent2D {
            width: 640,
            height: 480,
        };

        let extent = choose_extent(
            &capabilities,
            vk::Extent2D {
                width: 1024,
                height: 720,
            },
        );
        assert_eq!(extent.width, 640);
        assert_eq!(extent.height, 480);
    }

    #[test]
    fn format_prefers_bgra_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn format_falls_back_to_first_reported() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let chosen = choose_surface_format(&formats).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn format_negotiation_fails_on_empty_list() {
        assert!(choose_surface_format(&[]).is_err());
    }

    #[test]
    fn present_mode_prefers_mailbox_else_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }
}
