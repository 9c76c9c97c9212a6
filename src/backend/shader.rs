// SPIR-V loading
//
// Shaders arrive as precompiled bytecode blobs; compilation itself happens
// outside this crate (glslc, see build.rs).

use crate::error::{Result, RendererError, VkResultExt};
use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanContext;

/// Read a SPIR-V blob from disk into properly aligned words.
pub fn load_spirv<P: AsRef<Path>>(path: P) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| RendererError::ShaderIo {
        path: path.display().to_string(),
        source,
    })?;
    read_spv(&mut Cursor::new(bytes)).map_err(|source| RendererError::ShaderIo {
        path: path.display().to_string(),
        source,
    })
}

pub fn create_shader_module(context: &VulkanContext, code: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
    unsafe { context.device.create_shader_module(&create_info, None) }
        .stage("create shader module")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_shader_reports_its_path() {
        let err = load_spirv("shaders/does-not-exist.spv").unwrap_err();
        assert!(err.to_string().contains("does-not-exist.spv"));
    }
}
