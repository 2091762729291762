//! Recording GPU backend for testing.
//!
//! Performs no GPU work. Every resource is tracked with its descriptor and every command is
//! appended to a log, so tests can inspect what a renderer component asked the GPU to do.
//! Texture creation and buffer readback failures can be injected.

use std::collections::{HashMap, VecDeque};
use std::ops::Range;

use crate::backend::traits::*;
use crate::backend::types::*;

/// A recorded backend command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    BeginFrame,
    EndFrame,
    BeginRenderPass {
        label: Option<String>,
        color_views: Vec<TextureViewHandle>,
        depth_view: Option<TextureViewHandle>,
    },
    EndRenderPass,
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    SetViewport { width: f32, height: f32 },
    Draw { vertices: Range<u32> },
    DrawIndexed { indices: Range<u32> },
    WriteBuffer { buffer: BufferHandle, offset: u64, size: u64 },
    WriteTexture { texture: TextureHandle, width: u32, height: u32 },
    CopyTextureToTexture {
        src: TextureCopyLocation,
        dst: TextureCopyLocation,
        width: u32,
        height: u32,
    },
    CopyTextureToBuffer {
        src: TextureCopyLocation,
        buffer: BufferHandle,
        bytes_per_row: u32,
        width: u32,
        height: u32,
    },
    GenerateMipmaps(TextureHandle),
    Submit,
    ReadBuffer { buffer: BufferHandle, size: u64 },
}

/// Summary of one recorded render pass.
#[derive(Debug, Clone, Default)]
pub struct RecordedPass {
    pub label: Option<String>,
    pub color_views: Vec<TextureViewHandle>,
    /// Textures written as color or depth attachments.
    pub targets: Vec<TextureHandle>,
    /// Textures readable through bind groups set during the pass.
    pub sampled: Vec<TextureHandle>,
    pub pipelines: Vec<RenderPipelineHandle>,
    pub bind_groups: Vec<(u32, BindGroupHandle)>,
    pub draw_count: usize,
}

impl RecordedPass {
    /// Whether some texture is both an attachment and a shader input of this pass.
    pub fn has_feedback_loop(&self) -> bool {
        self.targets.iter().any(|t| self.sampled.contains(t))
    }
}

/// Texture view bookkeeping.
#[derive(Debug, Clone, Copy)]
pub struct RecordedView {
    pub texture: TextureHandle,
    pub desc: TextureViewDescriptor,
}

/// Backend that records commands instead of executing them.
#[derive(Debug)]
pub struct RecordingBackend {
    surface_size: (u32, u32),
    swapchain_format: TextureFormat,
    swapchain_view: TextureViewHandle,
    next_id: u64,

    buffers: HashMap<u64, (BufferDescriptor, Vec<u8>)>,
    retired_buffers: HashMap<u64, Vec<u8>>,
    retired_views: HashMap<u64, RecordedView>,
    retired_bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    textures: HashMap<u64, TextureDescriptor>,
    views: HashMap<u64, RecordedView>,
    samplers: HashMap<u64, SamplerDescriptor>,
    layouts: HashMap<u64, Vec<BindGroupLayoutEntry>>,
    bind_groups: HashMap<u64, Vec<(u32, BindGroupEntry)>>,
    pipelines: HashMap<u64, RenderPipelineDescriptor>,

    destroyed_textures: Vec<TextureHandle>,
    textures_created: usize,
    fail_textures_after: Option<usize>,
    readback_script: VecDeque<Result<Vec<u8>, String>>,
    in_render_pass: bool,

    commands: Vec<Command>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            surface_size: (width, height),
            swapchain_format: TextureFormat::Bgra8UnormSrgb,
            swapchain_view: TextureViewHandle(0),
            next_id: 1,
            buffers: HashMap::new(),
            retired_buffers: HashMap::new(),
            retired_views: HashMap::new(),
            retired_bind_groups: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            samplers: HashMap::new(),
            layouts: HashMap::new(),
            bind_groups: HashMap::new(),
            pipelines: HashMap::new(),
            destroyed_textures: Vec::new(),
            textures_created: 0,
            fail_textures_after: None,
            readback_script: VecDeque::new(),
            in_render_pass: false,
            commands: Vec::new(),
        }
    }

    /// Report a non-sRGB swapchain, as some platforms do.
    pub fn with_swapchain_format(mut self, format: TextureFormat) -> Self {
        self.swapchain_format = format;
        self
    }

    /// Let the next `count` texture creations succeed and fail every one after that.
    pub fn fail_texture_creation_after(&mut self, count: usize) {
        self.fail_textures_after = Some(self.textures_created + count);
    }

    /// Queue the bytes returned by the next unscripted `read_buffer`.
    pub fn push_readback(&mut self, bytes: Vec<u8>) {
        self.readback_script.push_back(Ok(bytes));
    }

    pub fn push_readback_f32(&mut self, value: f32) {
        self.push_readback(value.to_le_bytes().to_vec());
    }

    pub fn push_readback_failure(&mut self, reason: &str) {
        self.readback_script.push_back(Err(reason.to_string()));
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    /// A view, live or destroyed, so recorded passes stay resolvable.
    pub fn view(&self, view: TextureViewHandle) -> Option<&RecordedView> {
        self.views
            .get(&view.0)
            .or_else(|| self.retired_views.get(&view.0))
    }

    pub fn is_view_live(&self, view: TextureViewHandle) -> bool {
        self.views.contains_key(&view.0)
    }

    pub fn pipeline_desc(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline.0)
    }

    pub fn sampler_desc(&self, sampler: SamplerHandle) -> Option<&SamplerDescriptor> {
        self.samplers.get(&sampler.0)
    }

    /// Entries of a bind group, live or destroyed.
    pub fn bind_group_entries(&self, bind_group: BindGroupHandle) -> Option<&[(u32, BindGroupEntry)]> {
        self.bind_groups
            .get(&bind_group.0)
            .or_else(|| self.retired_bind_groups.get(&bind_group.0))
            .map(Vec::as_slice)
    }

    /// Current contents of a buffer, or the last contents of a destroyed one.
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers
            .get(&buffer.0)
            .map(|(_, data)| data.as_slice())
            .or_else(|| self.retired_buffers.get(&buffer.0).map(Vec::as_slice))
    }

    pub fn is_buffer_live(&self, buffer: BufferHandle) -> bool {
        self.buffers.contains_key(&buffer.0)
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_desc(&self, buffer: BufferHandle) -> Option<&BufferDescriptor> {
        self.buffers.get(&buffer.0).map(|(desc, _)| desc)
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn destroyed_textures(&self) -> &[TextureHandle] {
        &self.destroyed_textures
    }

    pub fn live_bind_group_count(&self) -> usize {
        self.bind_groups.len()
    }

    pub fn is_bind_group_live(&self, bind_group: BindGroupHandle) -> bool {
        self.bind_groups.contains_key(&bind_group.0)
    }

    pub fn is_texture_live(&self, texture: TextureHandle) -> bool {
        self.textures.contains_key(&texture.0)
    }

    /// Textures a bind group exposes to shaders.
    pub fn bind_group_textures(&self, bind_group: BindGroupHandle) -> Vec<TextureHandle> {
        self.bind_group_entries(bind_group)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(_, entry)| match entry {
                        BindGroupEntry::Texture(view) => self.view(*view).map(|v| v.texture),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Group the command log into render passes.
    pub fn passes(&self) -> Vec<RecordedPass> {
        let mut passes = Vec::new();
        let mut current: Option<RecordedPass> = None;

        for command in &self.commands {
            match command {
                Command::BeginRenderPass { label, color_views, depth_view } => {
                    let targets = color_views
                        .iter()
                        .chain(depth_view.iter())
                        .filter_map(|v| self.view(*v).map(|rv| rv.texture))
                        .collect();
                    current = Some(RecordedPass {
                        label: label.clone(),
                        color_views: color_views.clone(),
                        targets,
                        ..Default::default()
                    });
                }
                Command::EndRenderPass => {
                    if let Some(pass) = current.take() {
                        passes.push(pass);
                    }
                }
                Command::SetPipeline(pipeline) => {
                    if let Some(pass) = current.as_mut() {
                        pass.pipelines.push(*pipeline);
                    }
                }
                Command::SetBindGroup { index, bind_group } => {
                    if let Some(pass) = current.as_mut() {
                        pass.bind_groups.push((*index, *bind_group));
                        for texture in self.bind_group_textures(*bind_group) {
                            if !pass.sampled.contains(&texture) {
                                pass.sampled.push(texture);
                            }
                        }
                    }
                }
                Command::Draw { .. } | Command::DrawIndexed { .. } => {
                    if let Some(pass) = current.as_mut() {
                        pass.draw_count += 1;
                    }
                }
                _ => {}
            }
        }

        passes
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: Command) {
        log::trace!("RecordingBackend: {:?}", command);
        self.commands.push(command);
    }

    fn record_in_pass(&mut self, command: Command) {
        if self.in_render_pass {
            self.record(command);
        } else {
            log::warn!("RecordingBackend: {:?} outside a render pass ignored", command);
        }
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.surface_size = (width, height);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        self.surface_size
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        let id = self.next_handle();
        self.swapchain_view = TextureViewHandle(id);
        self.record(Command::BeginFrame);
        Ok(FrameContext {
            swapchain_view: self.swapchain_view,
            width: self.surface_size.0,
            height: self.surface_size.1,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        self.record(Command::Submit);
        self.record(Command::EndFrame);
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        self.swapchain_format
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!("RecordingBackend: creating buffer {:?} (size: {})", desc.label, desc.size);
        let id = self.next_handle();
        self.buffers
            .insert(id, (desc.clone(), vec![0; desc.size as usize]));
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        log::trace!("RecordingBackend: creating buffer {:?} (size: {})", desc.label, data.len());
        let id = self.next_handle();
        let mut desc = desc.clone();
        desc.size = data.len() as u64;
        self.buffers.insert(id, (desc, data.to_vec()));
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        if let Some((_, contents)) = self.buffers.get_mut(&buffer.0) {
            let start = offset as usize;
            let end = start + data.len();
            if contents.len() < end {
                contents.resize(end, 0);
            }
            contents[start..end].copy_from_slice(data);
        }
        self.record(Command::WriteBuffer {
            buffer,
            offset,
            size: data.len() as u64,
        });
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if self
            .fail_textures_after
            .is_some_and(|limit| self.textures_created >= limit)
        {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: injected failure",
                desc.label
            )));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?}: zero-sized texture",
                desc.label
            )));
        }

        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{}x{}, {} mips)",
            desc.label,
            desc.width,
            desc.height,
            desc.array_layers,
            desc.mip_levels
        );
        self.textures_created += 1;
        let id = self.next_handle();
        self.textures.insert(id, desc.clone());
        Ok(TextureHandle(id))
    }

    fn create_texture_view(
        &mut self,
        texture: TextureHandle,
        desc: &TextureViewDescriptor,
    ) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::ResourceNotFound(format!("texture {}", texture.0)));
        }
        let id = self.next_handle();
        self.views.insert(id, RecordedView { texture, desc: *desc });
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, _data: &[u8], width: u32, height: u32) {
        self.record(Command::WriteTexture { texture, width, height });
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        let id = self.next_handle();
        self.samplers.insert(id, desc.clone());
        Ok(SamplerHandle(id))
    }

    fn create_bind_group_layout(
        &mut self,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        let id = self.next_handle();
        self.layouts.insert(id, entries.to_vec());
        Ok(BindGroupLayoutHandle(id))
    }

    fn create_bind_group(
        &mut self,
        layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        let Some(layout_entries) = self.layouts.get(&layout.0) else {
            return Err(BackendError::ResourceNotFound(format!("bind group layout {}", layout.0)));
        };
        if layout_entries.len() != entries.len() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "bind group has {} entries, layout expects {}",
                entries.len(),
                layout_entries.len()
            )));
        }
        let id = self.next_handle();
        self.bind_groups.insert(id, entries.to_vec());
        Ok(BindGroupHandle(id))
    }

    fn create_render_pipeline(
        &mut self,
        desc: &RenderPipelineDescriptor,
    ) -> BackendResult<RenderPipelineHandle> {
        log::trace!("RecordingBackend: creating pipeline {:?}", desc.label);
        desc.validate()?;
        let id = self.next_handle();
        self.pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        self.in_render_pass = true;
        self.record(Command::BeginRenderPass {
            label: desc.label.clone(),
            color_views: desc.color_attachments.iter().map(|a| a.view).collect(),
            depth_view: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
        });
    }

    fn end_render_pass(&mut self) {
        self.in_render_pass = false;
        self.record(Command::EndRenderPass);
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record_in_pass(Command::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record_in_pass(Command::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record_in_pass(Command::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record_in_pass(Command::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&mut self, _x: f32, _y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record_in_pass(Command::SetViewport { width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, _instances: Range<u32>) {
        self.record_in_pass(Command::Draw { vertices });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, _base_vertex: i32, _instances: Range<u32>) {
        self.record_in_pass(Command::DrawIndexed { indices });
    }

    fn copy_texture_to_texture(
        &mut self,
        src: TextureCopyLocation,
        dst: TextureCopyLocation,
        width: u32,
        height: u32,
    ) {
        self.record(Command::CopyTextureToTexture { src, dst, width, height });
    }

    fn copy_texture_to_buffer(
        &mut self,
        src: TextureCopyLocation,
        buffer: BufferHandle,
        bytes_per_row: u32,
        width: u32,
        height: u32,
    ) {
        self.record(Command::CopyTextureToBuffer {
            src,
            buffer,
            bytes_per_row,
            width,
            height,
        });
    }

    fn generate_mipmaps(&mut self, texture: TextureHandle) -> BackendResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::ResourceNotFound(format!("texture {}", texture.0)));
        }
        self.record(Command::GenerateMipmaps(texture));
        Ok(())
    }

    fn submit(&mut self) {
        self.record(Command::Submit);
    }

    fn read_buffer(&mut self, buffer: BufferHandle, offset: u64, size: u64) -> BackendResult<Vec<u8>> {
        self.record(Command::Submit);
        self.record(Command::ReadBuffer { buffer, size });

        if let Some(scripted) = self.readback_script.pop_front() {
            return scripted.map_err(BackendError::ReadbackFailed);
        }

        let (_, contents) = self
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| BackendError::ResourceNotFound(format!("buffer {}", buffer.0)))?;
        let start = offset as usize;
        let end = start + size as usize;
        contents
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| BackendError::ReadbackFailed("range outside buffer".into()))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some((_, data)) = self.buffers.remove(&buffer.0) {
            self.retired_buffers.insert(buffer.0, data);
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.destroyed_textures.push(texture);
        }
    }

    fn destroy_texture_view(&mut self, view: TextureViewHandle) {
        if let Some(recorded) = self.views.remove(&view.0) {
            self.retired_views.insert(view.0, recorded);
        }
    }

    fn destroy_bind_group(&mut self, bind_group: BindGroupHandle) {
        if let Some(entries) = self.bind_groups.remove(&bind_group.0) {
            self.retired_bind_groups.insert(bind_group.0, entries);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render_target(backend: &mut RecordingBackend) -> (TextureHandle, TextureViewHandle) {
        let texture = backend
            .create_texture(&TextureDescriptor {
                width: 4,
                height: 4,
                usage: TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING,
                ..Default::default()
            })
            .unwrap();
        let view = backend
            .create_texture_view(texture, &TextureViewDescriptor::default())
            .unwrap();
        (texture, view)
    }

    #[test]
    fn test_injected_texture_failure() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.fail_texture_creation_after(1);
        assert!(backend.create_texture(&TextureDescriptor::default()).is_ok());
        assert!(matches!(
            backend.create_texture(&TextureDescriptor::default()),
            Err(BackendError::TextureCreationFailed(_))
        ));
    }

    #[test]
    fn test_scripted_readback_then_buffer_contents() {
        let mut backend = RecordingBackend::new(8, 8);
        let buffer = backend
            .create_buffer_init(
                &BufferDescriptor::uniform("test", 4),
                &2.5f32.to_le_bytes(),
            )
            .unwrap();

        backend.push_readback_f32(7.0);
        assert_eq!(backend.read_buffer(buffer, 0, 4).unwrap(), 7.0f32.to_le_bytes());
        assert_eq!(backend.read_buffer(buffer, 0, 4).unwrap(), 2.5f32.to_le_bytes());

        backend.push_readback_failure("device lost");
        assert!(matches!(
            backend.read_buffer(buffer, 0, 4),
            Err(BackendError::ReadbackFailed(_))
        ));
    }

    #[test]
    fn test_passes_detect_feedback_loop() {
        let mut backend = RecordingBackend::new(8, 8);
        let (texture, view) = render_target(&mut backend);
        let layout = backend
            .create_bind_group_layout(&[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStageFlags::FRAGMENT,
                ty: BindingType::texture_2d(),
            }])
            .unwrap();
        let bind_group = backend
            .create_bind_group(layout, &[(0, BindGroupEntry::Texture(view))])
            .unwrap();

        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("loop".into()),
            color_attachments: vec![ColorAttachment::clear(view, [0.0; 4])],
            depth_stencil_attachment: None,
        });
        backend.set_bind_group(0, bind_group);
        backend.draw(0..3, 0..1);
        backend.end_render_pass();

        let passes = backend.passes();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].targets, vec![texture]);
        assert_eq!(passes[0].draw_count, 1);
        assert!(passes[0].has_feedback_loop());

        backend.destroy_bind_group(bind_group);
        assert!(!backend.is_bind_group_live(bind_group));
        assert_eq!(backend.live_bind_group_count(), 0);
        assert!(backend.passes()[0].has_feedback_loop());
    }

    fn fullscreen_pipeline(fragment_shader: Option<String>) -> RenderPipelineDescriptor {
        RenderPipelineDescriptor {
            label: Some("fullscreen".into()),
            vertex_shader: crate::postprocess::fullscreen_shader("fn fs_main() {}"),
            fragment_shader,
            vertex_layouts: vec![],
            bind_group_layouts: vec![],
            primitive_topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: CullMode::None,
            depth_stencil: None,
            color_targets: vec![ColorTargetState::opaque(TextureFormat::Rgba16Float)],
        }
    }

    #[test]
    fn test_colour_targets_need_a_fragment_stage() {
        let mut backend = RecordingBackend::new(8, 8);
        assert!(matches!(
            backend.create_render_pipeline(&fullscreen_pipeline(None)),
            Err(BackendError::PipelineCreationFailed(_))
        ));
        assert!(matches!(
            backend.create_render_pipeline(&fullscreen_pipeline(Some("fn main() {}".into()))),
            Err(BackendError::ShaderCreationFailed(_))
        ));

        let shader = fullscreen_pipeline(None).vertex_shader;
        assert!(backend
            .create_render_pipeline(&fullscreen_pipeline(Some(shader)))
            .is_ok());
    }

    #[test]
    fn test_draw_outside_pass_is_not_recorded() {
        let mut backend = RecordingBackend::new(8, 8);
        backend.draw(0..3, 0..1);
        assert!(backend.commands().is_empty());
    }
}
