// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Each piece owns exactly the handles it creates;
// the application wires them together and tears them down in reverse order.

pub mod buffer;
pub mod commands;
pub mod device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use device::VulkanContext;
pub use swapchain::Swapchain;
