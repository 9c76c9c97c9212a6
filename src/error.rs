// Renderer error kinds
//
// Every Vulkan call that can fail reports which init stage it was in.
// The binary decides whether that aborts the process; library code only
// propagates.

use ash::vk;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RendererError>;

#[derive(Error, Debug)]
pub enum RendererError {
    /// A Vulkan entry point returned non-success.
    #[error("{stage}: {source}")]
    Vulkan {
        stage: &'static str,
        source: vk::Result,
    },

    /// The loader could not be opened at all.
    #[error("failed to load Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    /// Instance enumerated zero physical devices.
    #[error("no Vulkan-capable GPU found")]
    NoAdapter,

    /// No queue family supports both graphics and presentation.
    #[error("no queue family supports both graphics and presentation")]
    IncompleteQueueFamilies,

    /// Hardware capability mismatch, distinct from a generic failure:
    /// the device simply has no memory type with the requested properties.
    #[error("no suitable memory type (filter {type_filter:#034b}, flags {flags:?})")]
    NoSuitableMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    /// The driver reported an empty capability list we cannot negotiate over.
    #[error("unsupported configuration: {0}")]
    Unsupported(&'static str),

    /// A SPIR-V blob could not be read from disk.
    #[error("failed to read shader {path}: {source}")]
    ShaderIo {
        path: String,
        source: std::io::Error,
    },
}

/// Attaches the init-stage name to a raw `VkResult`.
pub(crate) trait VkResultExt<T> {
    fn stage(self, stage: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    fn stage(self, stage: &'static str) -> Result<T> {
        self.map_err(|source| RendererError::Vulkan { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_errors_carry_the_stage_name() {
        let err: Result<()> =
            Err(vk::Result::ERROR_INITIALIZATION_FAILED).stage("create instance");
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("create instance:"), "got: {msg}");
    }

    #[test]
    fn memory_type_failure_is_its_own_kind() {
        let err = RendererError::NoSuitableMemoryType {
            type_filter: 0b101,
            flags: vk::MemoryPropertyFlags::DEVICE_LOCAL,
        };
        assert!(err.to_string().contains("no suitable memory type"));
    }
}
