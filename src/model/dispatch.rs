//! GPU upload of imported models and the per-frame draw dispatch

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use glam::Vec3;

use crate::backend::*;
use crate::ibl::IblMaps;
use crate::renderer::{DEPTH_FORMAT, SCENE_COLOR_FORMAT};
use crate::scene::Camera;

use super::loader::{ImageData, ModelData};
use super::material::{Material, MaterialData, MaterialFeatures};
use super::primitive::{Geometry, GeometryData, Primitive};
use super::shaders::{self, pbr_shader};
use super::ModelError;

/// Everything that selects a distinct render pipeline for a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub features: MaterialFeatures,
    pub blend: bool,
    pub cull_mode: CullMode,
    pub topology: PrimitiveTopology,
    pub strip_index_format: Option<IndexFormat>,
}

impl PipelineKey {
    pub fn new(material: &MaterialData, geometry: &GeometryData) -> Self {
        Self {
            features: material.features(),
            blend: material.is_transparent(),
            cull_mode: if material.double_sided {
                CullMode::None
            } else {
                CullMode::Back
            },
            topology: geometry.topology,
            strip_index_format: geometry.strip_index_format,
        }
    }
}

/// Draw order for transparent primitives: farthest along the view direction first.
pub fn back_to_front(centers: &[Vec3], camera_position: Vec3, camera_forward: Vec3) -> Vec<usize> {
    let mut keyed: Vec<(f32, usize)> = centers
        .iter()
        .enumerate()
        .map(|(i, c)| ((*c - camera_position).dot(camera_forward), i))
        .collect();
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
    keyed.into_iter().rev().map(|(_, i)| i).collect()
}

/// An uploaded model
#[derive(Debug, Default)]
pub struct Model {
    pub geometries: Vec<Geometry>,
    pub materials: Vec<Material>,
    pub primitives: Vec<Primitive>,
    opaque: Vec<usize>,
    transparent: Vec<usize>,
    textures: HashMap<(usize, bool), (TextureHandle, TextureViewHandle)>,
    material_sampler: Option<SamplerHandle>,
}

impl Model {
    /// Opaque primitives, in load order
    pub fn opaque(&self) -> &[usize] {
        &self.opaque
    }

    pub fn transparent(&self) -> &[usize] {
        &self.transparent
    }

    /// Primitive indices in the order they are drawn from this viewpoint.
    pub fn draw_order(&self, camera_position: Vec3, camera_forward: Vec3) -> Vec<usize> {
        let centers: Vec<Vec3> = self
            .transparent
            .iter()
            .map(|&i| self.primitives[i].world_bounds.center())
            .collect();
        let sorted = back_to_front(&centers, camera_position, camera_forward);
        self.opaque
            .iter()
            .copied()
            .chain(sorted.into_iter().map(|i| self.transparent[i]))
            .collect()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for geometry in self.geometries {
            backend.destroy_buffer(geometry.positions);
            backend.destroy_buffer(geometry.normals);
            backend.destroy_buffer(geometry.texcoords);
            backend.destroy_buffer(geometry.indices);
        }
        for material in self.materials {
            backend.destroy_bind_group(material.texture_group);
            backend.destroy_bind_group(material.uniform_group);
            backend.destroy_buffer(material.uniform);
        }
        for primitive in self.primitives {
            backend.destroy_bind_group(primitive.object_group);
            backend.destroy_buffer(primitive.object_uniform);
        }
        for (_, (texture, view)) in self.textures {
            backend.destroy_texture_view(view);
            backend.destroy_texture(texture);
        }
    }
}

/// Layouts, samplers and the pipeline cache shared by every uploaded model
pub struct ModelRenderer {
    frame_layout: BindGroupLayoutHandle,
    object_layout: BindGroupLayoutHandle,
    material_layout: BindGroupLayoutHandle,
    texture_layouts: HashMap<MaterialFeatures, BindGroupLayoutHandle>,
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
    ibl_sampler: SamplerHandle,
    default_sampler: SamplerHandle,
}

impl ModelRenderer {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        frame_layout: BindGroupLayoutHandle,
    ) -> BackendResult<Self> {
        let object_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::VERTEX,
            ty: BindingType::UniformBuffer,
        }])?;
        let material_layout = backend.create_bind_group_layout(&[BindGroupLayoutEntry {
            binding: 0,
            visibility: ShaderStageFlags::FRAGMENT,
            ty: BindingType::UniformBuffer,
        }])?;
        let ibl_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("IBL Sampler".into()),
            ..Default::default()
        })?;
        let default_sampler = backend.create_sampler(&SamplerDescriptor {
            label: Some("Default Material Sampler".into()),
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            ..Default::default()
        })?;

        Ok(Self {
            frame_layout,
            object_layout,
            material_layout,
            texture_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            ibl_sampler,
            default_sampler,
        })
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn texture_layout(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        features: MaterialFeatures,
    ) -> BackendResult<BindGroupLayoutHandle> {
        if let Some(&layout) = self.texture_layouts.get(&features) {
            return Ok(layout);
        }

        let fragment = |binding, ty| BindGroupLayoutEntry {
            binding,
            visibility: ShaderStageFlags::FRAGMENT,
            ty,
        };
        let mut entries = vec![
            fragment(shaders::IRRADIANCE_BINDING, BindingType::texture_cube()),
            fragment(shaders::PREFILTERED_BINDING, BindingType::texture_cube()),
            fragment(shaders::BRDF_LUT_BINDING, BindingType::texture_2d()),
        ];
        for flag in MaterialFeatures::ALL {
            if features.contains(flag) {
                entries.push(fragment(
                    shaders::material_texture_binding(flag),
                    BindingType::texture_2d(),
                ));
            }
        }
        entries.push(fragment(
            shaders::IBL_SAMPLER_BINDING,
            BindingType::Sampler { comparison: false },
        ));
        entries.push(fragment(
            shaders::MATERIAL_SAMPLER_BINDING,
            BindingType::Sampler { comparison: false },
        ));

        let layout = backend.create_bind_group_layout(&entries)?;
        self.texture_layouts.insert(features, layout);
        Ok(layout)
    }

    /// Pipeline for `key`, compiled on first use.
    pub fn pipeline(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        key: PipelineKey,
    ) -> BackendResult<RenderPipelineHandle> {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Ok(pipeline);
        }

        let texture_layout = self.texture_layout(backend, key.features)?;
        log::debug!("Creating PBR pipeline variant {:?}", key);

        let shader = pbr_shader(key.features);
        let pipeline = backend.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(format!("PBR features={:#x}", key.features.bits())),
            vertex_shader: shader.clone(),
            fragment_shader: Some(shader),
            vertex_layouts: vec![
                VertexBufferLayout::single(0, VertexFormat::Float32x3),
                VertexBufferLayout::single(1, VertexFormat::Float32x3),
                VertexBufferLayout::single(2, VertexFormat::Float32x2),
            ],
            bind_group_layouts: vec![
                self.frame_layout,
                texture_layout,
                self.object_layout,
                self.material_layout,
            ],
            primitive_topology: key.topology,
            strip_index_format: key.strip_index_format,
            front_face: FrontFace::Ccw,
            cull_mode: key.cull_mode,
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: CompareFunction::Less,
            }),
            color_targets: vec![ColorTargetState {
                format: SCENE_COLOR_FORMAT,
                blend: key.blend.then(BlendState::alpha_blending),
                write_mask: ColorWrites::ALL,
            }],
        })?;

        self.pipelines.insert(key, pipeline);
        Ok(pipeline)
    }

    /// Upload `data`. On failure everything created so far is released.
    pub fn upload(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        data: &ModelData,
        maps: &IblMaps,
    ) -> Result<Model, ModelError> {
        let mut model = Model::default();
        match self.upload_into(backend, data, maps, &mut model) {
            Ok(()) => {
                log::info!(
                    "Uploaded model: {} opaque and {} transparent primitives, {} textures",
                    model.opaque.len(),
                    model.transparent.len(),
                    model.textures.len()
                );
                Ok(model)
            }
            Err(e) => {
                model.destroy(backend);
                Err(e)
            }
        }
    }

    fn upload_into(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        data: &ModelData,
        maps: &IblMaps,
        model: &mut Model,
    ) -> Result<(), ModelError> {
        for geometry in &data.geometries {
            model.geometries.push(upload_geometry(backend, geometry)?);
        }

        if let Some(desc) = &data.sampler {
            model.material_sampler = Some(backend.create_sampler(desc)?);
        }

        for material in &data.materials {
            let mut images = Vec::new();
            for (flag, image) in material.textures() {
                let srgb = flag == MaterialFeatures::BASE_COLOR;
                if let Entry::Vacant(entry) = model.textures.entry((image, srgb)) {
                    let source = data.images.get(image).ok_or_else(|| {
                        BackendError::ResourceNotFound(format!("image {image}"))
                    })?;
                    entry.insert(upload_image(backend, source, srgb)?);
                }
                images.push((image, srgb));
            }

            let uniform = backend.create_buffer_init(
                &BufferDescriptor::uniform("Material Uniforms", 0),
                bytemuck::bytes_of(&material.uniform()),
            )?;
            let uniform_group = match uniform_bind_group(backend, self.material_layout, uniform) {
                Ok(group) => group,
                Err(e) => {
                    backend.destroy_buffer(uniform);
                    return Err(e.into());
                }
            };
            let mut uploaded = Material {
                features: material.features(),
                transparent: material.is_transparent(),
                double_sided: material.double_sided,
                uniform,
                uniform_group,
                texture_group: uniform_group,
                images,
            };
            match self.texture_group(backend, model, &uploaded, maps) {
                Ok(group) => uploaded.texture_group = group,
                Err(e) => {
                    backend.destroy_bind_group(uniform_group);
                    backend.destroy_buffer(uniform);
                    return Err(e.into());
                }
            }
            model.materials.push(uploaded);
        }

        for (index, primitive) in data.primitives.iter().enumerate() {
            let geometry = &data.geometries[primitive.geometry];
            let material = &data.materials[primitive.material];
            let pipeline = self.pipeline(backend, PipelineKey::new(material, geometry))?;

            let object = ObjectUniform::from_model(data.world_matrices[primitive.matrix]);
            let object_uniform = backend.create_buffer_init(
                &BufferDescriptor::uniform("Object Uniforms", 0),
                bytemuck::bytes_of(&object),
            )?;
            let object_group = match uniform_bind_group(backend, self.object_layout, object_uniform) {
                Ok(group) => group,
                Err(e) => {
                    backend.destroy_buffer(object_uniform);
                    return Err(e.into());
                }
            };

            model.primitives.push(Primitive {
                geometry: primitive.geometry,
                material: primitive.material,
                object_uniform,
                object_group,
                world_bounds: primitive.world_bounds,
                pipeline,
            });
            if material.is_transparent() {
                model.transparent.push(index);
            } else {
                model.opaque.push(index);
            }
        }
        Ok(())
    }

    fn texture_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        model: &Model,
        material: &Material,
        maps: &IblMaps,
    ) -> BackendResult<BindGroupHandle> {
        let layout = self.texture_layout(backend, material.features)?;

        let mut entries = vec![
            (shaders::IRRADIANCE_BINDING, BindGroupEntry::Texture(maps.irradiance.view)),
            (shaders::PREFILTERED_BINDING, BindGroupEntry::Texture(maps.prefiltered.view)),
            (shaders::BRDF_LUT_BINDING, BindGroupEntry::Texture(maps.brdf_lut_view)),
        ];
        let flags = MaterialFeatures::ALL
            .into_iter()
            .filter(|flag| material.features.contains(*flag));
        for (flag, key) in flags.zip(&material.images) {
            let (_, view) = model
                .textures
                .get(key)
                .ok_or_else(|| BackendError::ResourceNotFound(format!("image {}", key.0)))?;
            entries.push((
                shaders::material_texture_binding(flag),
                BindGroupEntry::Texture(*view),
            ));
        }
        entries.push((shaders::IBL_SAMPLER_BINDING, BindGroupEntry::Sampler(self.ibl_sampler)));
        entries.push((
            shaders::MATERIAL_SAMPLER_BINDING,
            BindGroupEntry::Sampler(model.material_sampler.unwrap_or(self.default_sampler)),
        ));

        backend.create_bind_group(layout, &entries)
    }

    /// Point every material at freshly generated IBL maps.
    pub fn rebind_environment(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        model: &mut Model,
        maps: &IblMaps,
    ) -> BackendResult<()> {
        let mut groups = Vec::with_capacity(model.materials.len());
        for material in &model.materials {
            match self.texture_group(backend, model, material, maps) {
                Ok(group) => groups.push(group),
                Err(e) => {
                    for group in groups {
                        backend.destroy_bind_group(group);
                    }
                    return Err(e);
                }
            }
        }
        for (material, group) in model.materials.iter_mut().zip(groups) {
            backend.destroy_bind_group(std::mem::replace(&mut material.texture_group, group));
        }
        Ok(())
    }

    /// Record every primitive into the current scene pass.
    pub fn draw(
        &self,
        backend: &mut dyn GraphicsBackend,
        model: &Model,
        frame_group: BindGroupHandle,
        camera: &Camera,
    ) {
        for index in model.draw_order(camera.position(), camera.forward()) {
            let primitive = &model.primitives[index];
            let geometry = &model.geometries[primitive.geometry];
            let material = &model.materials[primitive.material];

            backend.set_render_pipeline(primitive.pipeline);
            backend.set_bind_group(0, frame_group);
            backend.set_bind_group(1, material.texture_group);
            backend.set_bind_group(2, primitive.object_group);
            backend.set_bind_group(3, material.uniform_group);
            backend.set_vertex_buffer(0, geometry.positions, 0);
            backend.set_vertex_buffer(1, geometry.normals, 0);
            backend.set_vertex_buffer(2, geometry.texcoords, 0);
            backend.set_index_buffer(geometry.indices, 0, geometry.index_format);
            backend.draw_indexed(0..geometry.index_count, 0, 0..1);
        }
    }
}

fn uniform_bind_group(
    backend: &mut dyn GraphicsBackend,
    layout: BindGroupLayoutHandle,
    buffer: BufferHandle,
) -> BackendResult<BindGroupHandle> {
    backend.create_bind_group(
        layout,
        &[(
            0,
            BindGroupEntry::Buffer {
                buffer,
                offset: 0,
                size: None,
            },
        )],
    )
}

fn upload_geometry(
    backend: &mut dyn GraphicsBackend,
    geometry: &GeometryData,
) -> BackendResult<Geometry> {
    let vertex = |label: &str| BufferDescriptor {
        label: Some(label.to_string()),
        size: 0,
        usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
        mapped_at_creation: false,
    };
    let positions =
        backend.create_buffer_init(&vertex("Positions"), bytemuck::cast_slice(&geometry.positions))?;
    let normals =
        backend.create_buffer_init(&vertex("Normals"), bytemuck::cast_slice(&geometry.normals))?;
    let texcoords =
        backend.create_buffer_init(&vertex("Texcoords"), bytemuck::cast_slice(&geometry.texcoords))?;
    let indices = backend.create_buffer_init(
        &BufferDescriptor {
            label: Some("Indices".into()),
            size: 0,
            usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            mapped_at_creation: false,
        },
        &geometry.indices.to_bytes(),
    )?;

    Ok(Geometry {
        positions,
        normals,
        texcoords,
        indices,
        index_format: geometry.indices.format(),
        index_count: geometry.indices.len() as u32,
    })
}

fn upload_image(
    backend: &mut dyn GraphicsBackend,
    image: &ImageData,
    srgb: bool,
) -> BackendResult<(TextureHandle, TextureViewHandle)> {
    let texture = backend.create_texture(&TextureDescriptor {
        label: Some("Material Texture".into()),
        width: image.width,
        height: image.height,
        array_layers: 1,
        mip_levels: full_mip_count(image.width.max(image.height)),
        format: if srgb {
            TextureFormat::Rgba8UnormSrgb
        } else {
            TextureFormat::Rgba8Unorm
        },
        usage: TextureUsage::TEXTURE_BINDING
            | TextureUsage::COPY_DST
            | TextureUsage::RENDER_ATTACHMENT,
    })?;
    backend.write_texture(texture, &image.rgba, image.width, image.height);
    if let Err(e) = backend.generate_mipmaps(texture) {
        backend.destroy_texture(texture);
        return Err(e);
    }
    match backend.create_texture_view(texture, &TextureViewDescriptor::default()) {
        Ok(view) => Ok((texture, view)),
        Err(e) => {
            backend.destroy_texture(texture);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec4};

    use crate::backend::recording::{Command, RecordingBackend};
    use crate::model::{Aabb, AlphaMode, IndexData, PrimitiveData};

    #[test]
    fn test_back_to_front_is_descending_by_view_depth() {
        let centers = [Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, -3.0)];
        let order = back_to_front(&centers, Vec3::ZERO, Vec3::NEG_Z);
        assert_eq!(order, vec![1, 2, 0]);
    }

    #[test]
    fn test_reversing_the_camera_reverses_the_order() {
        let centers = [Vec3::new(2.0, 0.0, 0.0), Vec3::new(-4.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let forward = back_to_front(&centers, Vec3::ZERO, Vec3::X);
        let mut backward = back_to_front(&centers, Vec3::ZERO, Vec3::NEG_X);
        backward.reverse();
        assert_eq!(forward, backward);
    }

    fn triangle() -> GeometryData {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        GeometryData {
            bounds: Aabb::from_points(&positions),
            normals: vec![[0.0, 0.0, 1.0]; 3],
            texcoords: vec![[0.0, 0.0]; 3],
            positions,
            indices: IndexData::U16(vec![0, 1, 2]),
            topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            material: 0,
        }
    }

    fn maps(backend: &mut RecordingBackend) -> IblMaps {
        let mut cube = || {
            let texture = backend.create_texture(&TextureDescriptor::default()).unwrap();
            let view = backend
                .create_texture_view(texture, &TextureViewDescriptor::cube())
                .unwrap();
            crate::ibl::CubeMap {
                texture,
                view,
                size: 1,
                mip_levels: 1,
            }
        };
        let environment = cube();
        let irradiance = cube();
        let prefiltered = cube();
        let brdf_lut = backend.create_texture(&TextureDescriptor::default()).unwrap();
        let brdf_lut_view = backend
            .create_texture_view(brdf_lut, &TextureViewDescriptor::default())
            .unwrap();
        IblMaps {
            environment,
            irradiance,
            prefiltered,
            brdf_lut,
            brdf_lut_view,
        }
    }

    fn two_material_model() -> ModelData {
        let at = |x: f32| Mat4::from_translation(Vec3::new(x, 0.0, 0.0));
        let geometry = triangle();
        let primitive = |material, matrix: usize, x: f32| PrimitiveData {
            geometry: 0,
            material,
            matrix,
            world_bounds: geometry.bounds.transformed(&at(x)),
        };
        ModelData {
            primitives: vec![primitive(0, 0, 0.0), primitive(1, 1, 5.0), primitive(0, 2, 10.0)],
            geometries: vec![geometry.clone()],
            materials: vec![
                MaterialData::default(),
                MaterialData {
                    alpha_mode: AlphaMode::Blend,
                    albedo: Vec4::new(1.0, 1.0, 1.0, 0.5),
                    double_sided: true,
                    ..Default::default()
                },
            ],
            world_matrices: vec![at(0.0), at(5.0), at(10.0)],
            images: vec![],
            sampler: None,
        }
    }

    #[test]
    fn test_upload_partitions_and_picks_pipelines() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame_layout = backend.create_bind_group_layout(&[]).unwrap();
        let maps = maps(&mut backend);
        let mut renderer = ModelRenderer::new(&mut backend, frame_layout).unwrap();

        let model = renderer.upload(&mut backend, &two_material_model(), &maps).unwrap();
        assert_eq!(model.opaque(), &[0, 2]);
        assert_eq!(model.transparent(), &[1]);
        assert_eq!(renderer.pipeline_count(), 2);

        let opaque = backend.pipeline_desc(model.primitives[0].pipeline).unwrap();
        assert!(opaque.color_targets[0].blend.is_none());
        assert_eq!(opaque.cull_mode, CullMode::Back);

        let blended = backend.pipeline_desc(model.primitives[1].pipeline).unwrap();
        assert_eq!(blended.color_targets[0].blend, Some(BlendState::alpha_blending()));
        assert_eq!(blended.cull_mode, CullMode::None);
        assert_eq!(model.primitives[0].pipeline, model.primitives[2].pipeline);
    }

    #[test]
    fn test_object_uniform_uses_world_matrix() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame_layout = backend.create_bind_group_layout(&[]).unwrap();
        let maps = maps(&mut backend);
        let mut renderer = ModelRenderer::new(&mut backend, frame_layout).unwrap();
        let data = two_material_model();
        let model = renderer.upload(&mut backend, &data, &maps).unwrap();

        let uniform: ObjectUniform =
            bytemuck::pod_read_unaligned(backend.buffer_contents(model.primitives[2].object_uniform).unwrap());
        assert_eq!(uniform.model, data.world_matrices[2]);
    }

    #[test]
    fn test_draw_sets_full_state_per_primitive() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame_layout = backend.create_bind_group_layout(&[]).unwrap();
        let frame_group = backend.create_bind_group(frame_layout, &[]).unwrap();
        let maps = maps(&mut backend);
        let mut renderer = ModelRenderer::new(&mut backend, frame_layout).unwrap();
        let model = renderer.upload(&mut backend, &two_material_model(), &maps).unwrap();

        backend.clear_commands();
        backend.begin_render_pass(&RenderPassDescriptor {
            label: Some("Scene".into()),
            color_attachments: vec![],
            depth_stencil_attachment: None,
        });
        renderer.draw(&mut backend, &model, frame_group, &Camera::default());
        backend.end_render_pass();

        let pass = &backend.passes()[0];
        assert_eq!(pass.draw_count, 3);
        assert_eq!(pass.pipelines.len(), 3);
        assert_eq!(pass.bind_groups.len(), 12);
        assert!(backend
            .commands()
            .iter()
            .any(|c| matches!(c, Command::SetIndexBuffer { format: IndexFormat::Uint16, .. })));
    }

    #[test]
    fn test_failed_upload_releases_buffers() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame_layout = backend.create_bind_group_layout(&[]).unwrap();
        let maps = maps(&mut backend);
        let mut renderer = ModelRenderer::new(&mut backend, frame_layout).unwrap();

        let mut data = two_material_model();
        data.materials[0].base_color_texture = Some(0);
        data.images.push(ImageData {
            width: 2,
            height: 2,
            rgba: vec![255; 16],
        });
        let textures_before = backend.live_texture_count();
        let buffers_before = backend.live_buffer_count();
        backend.fail_texture_creation_after(0);

        assert!(matches!(
            renderer.upload(&mut backend, &data, &maps),
            Err(ModelError::Backend(BackendError::TextureCreationFailed(_)))
        ));
        assert_eq!(backend.live_texture_count(), textures_before);
        assert_eq!(backend.live_buffer_count(), buffers_before);
        assert_eq!(backend.live_bind_group_count(), 0);
    }

    #[test]
    fn test_rebind_environment_replaces_texture_groups() {
        let mut backend = RecordingBackend::new(8, 8);
        let frame_layout = backend.create_bind_group_layout(&[]).unwrap();
        let old_maps = maps(&mut backend);
        let mut renderer = ModelRenderer::new(&mut backend, frame_layout).unwrap();
        let mut model = renderer.upload(&mut backend, &two_material_model(), &old_maps).unwrap();

        let groups = backend.live_bind_group_count();
        let old_group = model.materials[0].texture_group;
        let new_maps = maps(&mut backend);
        renderer.rebind_environment(&mut backend, &mut model, &new_maps).unwrap();

        assert_eq!(backend.live_bind_group_count(), groups);
        assert!(!backend.is_bind_group_live(old_group));
        let textures = backend.bind_group_textures(model.materials[0].texture_group);
        assert!(textures.contains(&new_maps.irradiance.texture));
        assert!(!textures.contains(&old_maps.irradiance.texture));

        model.destroy(&mut backend);
        assert_eq!(backend.live_bind_group_count(), 0);
    }
}
