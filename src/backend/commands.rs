// Command pool and pre-recorded draw commands
//
// One primary command buffer per framebuffer, recorded once at startup and
// replayed unmodified every frame. SIMULTANEOUS_USE because the same buffer
// may be resubmitted while a previous submission is still executing (there is
// no per-frame fence holding the host back).

use crate::error::{Result, VkResultExt};
use ash::vk;

use super::pipeline::PipelineState;
use super::VulkanContext;

pub fn create_command_pool(context: &VulkanContext) -> Result<vk::CommandPool> {
    let pool_info =
        vk::CommandPoolCreateInfo::builder().queue_family_index(context.graphics_family);
    unsafe { context.device.create_command_pool(&pool_info, None) }
        .stage("create command pool")
}

/// Allocate and record one draw command buffer per framebuffer.
pub fn record_draw_commands(
    context: &VulkanContext,
    command_pool: vk::CommandPool,
    pipeline: &PipelineState,
    framebuffers: &[vk::Framebuffer],
    extent: vk::Extent2D,
    vertex_buffer: vk::Buffer,
    vertex_count: u32,
    clear_color: [f32; 4],
) -> Result<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(framebuffers.len() as u32);

    let command_buffers = unsafe { context.device.allocate_command_buffers(&alloc_info) }
        .stage("allocate command buffers")?;

    let clear_value = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: clear_color,
        },
    };
    let clear_values = [clear_value];

    for (&cmd, &framebuffer) in command_buffers.iter().zip(framebuffers) {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

        unsafe {
            context
                .device
                .begin_command_buffer(cmd, &begin_info)
                .stage("begin command buffer")?;

            let render_pass_begin = vk::RenderPassBeginInfo::builder()
                .render_pass(pipeline.render_pass)
                .framebuffer(framebuffer)
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                })
                .clear_values(&clear_values);

            context.device.cmd_begin_render_pass(
                cmd,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );

            context.device.cmd_bind_pipeline(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline.pipeline,
            );

            context
                .device
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);

            // Single non-indexed draw of the static geometry
            context.device.cmd_draw(cmd, vertex_count, 1, 0, 0);

            context.device.cmd_end_render_pass(cmd);

            context
                .device
                .end_command_buffer(cmd)
                .stage("end command buffer")?;
        }
    }

    Ok(command_buffers)
}
