// GPU buffer allocation
//
// Manual memory-type selection (no allocator crate): first type whose bit is
// set in the requirement mask and whose flags are a superset of the request.
// Device-local buffers are filled through a host-visible staging buffer and a
// synchronously waited one-shot copy.

use crate::error::{Result, RendererError, VkResultExt};
use ash::vk;
use bytemuck::Pod;

use super::VulkanContext;

/// A device buffer, its backing allocation and its size.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    /// Upload `data` into a device-local buffer via the staging pattern:
    /// map + copy + unmap a host-visible buffer, then a one-shot command
    /// buffer copies it device-side and the graphics queue is drained before
    /// the staging buffer is freed. Simple, non-pipelined, blocking.
    pub fn device_local_with_data<T: Pod>(
        context: &VulkanContext,
        command_pool: vk::CommandPool,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len() as vk::DeviceSize;

        let (staging_buffer, staging_memory) = create_buffer(
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        unsafe {
            let ptr = context
                .device
                .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())
                .stage("map staging memory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            context.device.unmap_memory(staging_memory);
        }

        let device_local = create_buffer(
            context,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );

        let (buffer, memory) = match device_local {
            Ok(handles) => handles,
            Err(e) => {
                destroy_raw(context, staging_buffer, staging_memory);
                return Err(e);
            }
        };

        let copied = copy_buffer(context, command_pool, staging_buffer, buffer, size);
        destroy_raw(context, staging_buffer, staging_memory);
        if let Err(e) = copied {
            destroy_raw(context, buffer, memory);
            return Err(e);
        }

        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// Create a buffer, pick a memory type, allocate and bind at offset 0.
pub fn create_buffer(
    context: &VulkanContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    properties: vk::MemoryPropertyFlags,
) -> Result<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { context.device.create_buffer(&buffer_info, None) }
        .stage("create buffer")?;

    let requirements = unsafe { context.device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = match find_memory_type(
        &context.memory_properties,
        requirements.memory_type_bits,
        properties,
    ) {
        Ok(index) => index,
        Err(e) => {
            unsafe { context.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = match unsafe { context.device.allocate_memory(&alloc_info, None) }
        .stage("allocate buffer memory")
    {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { context.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    unsafe { context.device.bind_buffer_memory(buffer, memory, 0) }
        .stage("bind buffer memory")?;

    Ok((buffer, memory))
}

/// First memory type whose bit is set in `type_filter` and whose property
/// flags contain everything requested. No match is a hardware-capability
/// mismatch, reported as its own error kind.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32> {
    for i in 0..memory_properties.memory_type_count {
        let bit_set = type_filter & (1 << i) != 0;
        let flags_superset = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);
        if bit_set && flags_superset {
            return Ok(i);
        }
    }

    Err(RendererError::NoSuitableMemoryType {
        type_filter,
        flags: properties,
    })
}

/// One-shot transfer: record a single copy, submit, drain the queue.
fn copy_buffer(
    context: &VulkanContext,
    command_pool: vk::CommandPool,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> Result<()> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let command_buffers = unsafe { context.device.allocate_command_buffers(&alloc_info) }
        .stage("allocate transfer command buffer")?;
    let cmd = command_buffers[0];

    let result: Result<()> = (|| {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            context
                .device
                .begin_command_buffer(cmd, &begin_info)
                .stage("begin transfer command buffer")?;

            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            context.device.cmd_copy_buffer(cmd, src, dst, &[region]);

            context
                .device
                .end_command_buffer(cmd)
                .stage("end transfer command buffer")?;

            let submit_info = vk::SubmitInfo::builder()
                .command_buffers(&command_buffers)
                .build();
            context
                .device
                .queue_submit(context.graphics_queue, &[submit_info], vk::Fence::null())
                .stage("submit transfer")?;
            context
                .device
                .queue_wait_idle(context.graphics_queue)
                .stage("wait for transfer")?;
        }
        Ok(())
    })();

    unsafe {
        context
            .device
            .free_command_buffers(command_pool, &command_buffers);
    }

    result
}

fn destroy_raw(context: &VulkanContext, buffer: vk::Buffer, memory: vk::DeviceMemory) {
    unsafe {
        context.device.destroy_buffer(buffer, None);
        context.device.free_memory(memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, &flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = flags;
        }
        props
    }

    #[test]
    fn selection_requires_filter_bit_and_property_superset() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        // Type 1 is host-visible but lacks coherence; type 2 qualifies.
        let index = find_memory_type(
            &props,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn selection_skips_types_excluded_by_the_filter() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Filter allows only type 1 even though type 0 matches on flags.
        let index =
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn first_match_wins() {
        let all = vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        let props = memory_properties(&[all, all]);

        let index = find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 0);
    }

    #[test]
    fn no_match_is_a_distinct_fatal_kind() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let err = find_memory_type(&props, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE).unwrap_err();
        assert!(matches!(err, RendererError::NoSuitableMemoryType { .. }));
    }
}
