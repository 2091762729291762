//! glTF import into CPU-side model data

use std::collections::HashMap;
use std::path::Path;

use glam::{Mat4, Vec4};
use gltf::image::Format;
use gltf::mesh::util::ReadIndices;
use gltf::mesh::Mode;
use gltf::texture::{MagFilter, MinFilter, WrappingMode};

use crate::backend::{AddressMode, FilterMode, PrimitiveTopology, SamplerDescriptor};

use super::material::{AlphaMode, MaterialData};
use super::primitive::{compute_normals, Aabb, GeometryData, IndexData, PrimitiveData};
use super::scene_graph;
use super::ModelError;

/// Decoded image, always four channels
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Everything a model needs before GPU upload
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub geometries: Vec<GeometryData>,
    pub materials: Vec<MaterialData>,
    pub world_matrices: Vec<Mat4>,
    pub primitives: Vec<PrimitiveData>,
    pub images: Vec<ImageData>,
    /// Sampler shared by every material texture
    pub sampler: Option<SamplerDescriptor>,
}

impl ModelData {
    pub fn import(path: &Path) -> Result<Self, ModelError> {
        let (document, buffers, images) = gltf::import(path)?;
        let model = Self::from_document(&document, &buffers, &images)?;
        log::info!(
            "Loaded {}: {} primitives, {} materials, {} images",
            path.display(),
            model.primitives.len(),
            model.materials.len(),
            model.images.len()
        );
        Ok(model)
    }

    /// Import a self-contained glTF or GLB held in memory.
    pub fn import_slice(bytes: &[u8]) -> Result<Self, ModelError> {
        let (document, buffers, images) = gltf::import_slice(bytes)?;
        Self::from_document(&document, &buffers, &images)
    }

    pub fn from_document(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> Result<Self, ModelError> {
        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or(ModelError::MissingScene)?;

        let table = scene_graph::flatten(&scene);

        let mut geometries = Vec::new();
        let mut geometry_index: HashMap<(usize, usize), usize> = HashMap::new();
        let mut primitives = Vec::new();

        for instance in &table.instances {
            let Some(mesh) = document.meshes().nth(instance.mesh) else {
                continue;
            };
            let matrix = table.matrices[instance.matrix];

            for primitive in mesh.primitives() {
                let key = (mesh.index(), primitive.index());
                let geometry = match geometry_index.get(&key) {
                    Some(&index) => index,
                    None => {
                        let data = load_geometry(&primitive, mesh.index(), buffers)?;
                        geometries.push(data);
                        geometry_index.insert(key, geometries.len() - 1);
                        geometries.len() - 1
                    }
                };

                let data = &geometries[geometry];
                primitives.push(PrimitiveData {
                    geometry,
                    material: data.material,
                    matrix: instance.matrix,
                    world_bounds: data.bounds.transformed(&matrix),
                });
            }
        }

        let materials: Vec<MaterialData> = document.materials().map(|m| load_material(&m)).collect();

        let images = images
            .iter()
            .enumerate()
            .map(|(index, image)| convert_image(index, image))
            .collect::<Result<Vec<_>, _>>()?;

        let uses_textures = materials.iter().any(|m| !m.features().is_empty());
        let sampler = document.samplers().next().map(|s| map_sampler(&s));
        if uses_textures && sampler.is_none() {
            return Err(ModelError::MissingSampler);
        }

        log::debug!(
            "Scene {}: {} nodes, {} geometries",
            scene.index(),
            table.matrices.len(),
            geometries.len()
        );

        Ok(Self {
            geometries,
            materials,
            world_matrices: table.matrices,
            primitives,
            images,
            sampler,
        })
    }

    /// Indices of alpha-blended primitives.
    pub fn transparent_primitives(&self) -> Vec<usize> {
        self.primitives
            .iter()
            .enumerate()
            .filter(|(_, p)| self.materials[p.material].is_transparent())
            .map(|(i, _)| i)
            .collect()
    }
}

fn map_topology(mode: Mode, mesh: usize, primitive: usize) -> Result<PrimitiveTopology, ModelError> {
    match mode {
        Mode::Points => Ok(PrimitiveTopology::PointList),
        Mode::Lines => Ok(PrimitiveTopology::LineList),
        Mode::LineStrip => Ok(PrimitiveTopology::LineStrip),
        Mode::Triangles => Ok(PrimitiveTopology::TriangleList),
        Mode::TriangleStrip => Ok(PrimitiveTopology::TriangleStrip),
        other => Err(ModelError::UnsupportedTopology {
            mode: format!("{other:?}"),
            mesh,
            primitive,
        }),
    }
}

fn load_geometry(
    primitive: &gltf::Primitive<'_>,
    mesh: usize,
    buffers: &[gltf::buffer::Data],
) -> Result<GeometryData, ModelError> {
    let index = primitive.index();
    let topology = map_topology(primitive.mode(), mesh, index)?;
    let material = primitive
        .material()
        .index()
        .ok_or(ModelError::MissingMaterial { mesh, primitive: index })?;

    let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| &d.0[..]));

    let positions: Vec<[f32; 3]> = reader
        .read_positions()
        .ok_or(ModelError::MissingPositions { mesh, primitive: index })?
        .collect();

    let indices = match reader.read_indices() {
        Some(ReadIndices::U8(iter)) => IndexData::U16(iter.map(u16::from).collect()),
        Some(ReadIndices::U16(iter)) => IndexData::U16(iter.collect()),
        Some(ReadIndices::U32(iter)) => IndexData::U32(iter.collect()),
        None => IndexData::sequential(positions.len()),
    };

    let normals = match reader.read_normals() {
        Some(iter) => iter.collect(),
        None if topology == PrimitiveTopology::TriangleList => compute_normals(&positions, &indices),
        None => {
            log::warn!("Mesh {mesh} primitive {index} has no normals, using +Y");
            vec![[0.0, 1.0, 0.0]; positions.len()]
        }
    };

    let texcoords = match reader.read_tex_coords(0) {
        Some(iter) => iter.into_f32().collect(),
        None => {
            log::warn!("Mesh {mesh} primitive {index} has no TEXCOORD_0");
            vec![[0.0, 0.0]; positions.len()]
        }
    };

    let strip_index_format = topology.is_strip().then(|| indices.format());
    let bounds = Aabb::from_points(&positions);

    Ok(GeometryData {
        positions,
        normals,
        texcoords,
        indices,
        topology,
        strip_index_format,
        material,
        bounds,
    })
}

fn load_material(material: &gltf::Material<'_>) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    MaterialData {
        name: material.name().map(String::from),
        albedo: Vec4::from_array(pbr.base_color_factor()),
        roughness: pbr.roughness_factor(),
        metalness: pbr.metallic_factor(),
        alpha_mode: match material.alpha_mode() {
            gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
            gltf::material::AlphaMode::Mask => AlphaMode::Mask,
            gltf::material::AlphaMode::Blend => AlphaMode::Blend,
        },
        alpha_cutoff: material.alpha_cutoff().unwrap_or(0.5),
        double_sided: material.double_sided(),
        base_color_texture: pbr.base_color_texture().map(|t| t.texture().source().index()),
        metallic_roughness_texture: pbr
            .metallic_roughness_texture()
            .map(|t| t.texture().source().index()),
        normal_texture: material.normal_texture().map(|t| t.texture().source().index()),
        occlusion_texture: material.occlusion_texture().map(|t| t.texture().source().index()),
    }
}

/// Expand 8-bit images to RGBA8.
fn convert_image(index: usize, image: &gltf::image::Data) -> Result<ImageData, ModelError> {
    let pixels = &image.pixels;
    let rgba = match image.format {
        Format::R8 => pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        Format::R8G8 => pixels.chunks_exact(2).flat_map(|p| [p[0], p[1], 0, 255]).collect(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8B8A8 => pixels.clone(),
        other => {
            return Err(ModelError::UnsupportedImageFormat {
                index,
                format: format!("{other:?}"),
            })
        }
    };
    Ok(ImageData {
        width: image.width,
        height: image.height,
        rgba,
    })
}

fn map_mag_filter(filter: Option<MagFilter>) -> FilterMode {
    match filter {
        Some(MagFilter::Nearest) => FilterMode::Nearest,
        Some(MagFilter::Linear) | None => FilterMode::Linear,
    }
}

/// Split a glTF minification filter into the min filter and the mipmap filter.
fn map_min_filter(filter: Option<MinFilter>) -> (FilterMode, FilterMode) {
    match filter {
        Some(MinFilter::Nearest) | Some(MinFilter::NearestMipmapNearest) => {
            (FilterMode::Nearest, FilterMode::Nearest)
        }
        Some(MinFilter::NearestMipmapLinear) => (FilterMode::Nearest, FilterMode::Linear),
        Some(MinFilter::Linear) | Some(MinFilter::LinearMipmapNearest) => {
            (FilterMode::Linear, FilterMode::Nearest)
        }
        Some(MinFilter::LinearMipmapLinear) | None => (FilterMode::Linear, FilterMode::Linear),
    }
}

fn map_wrapping(wrap: WrappingMode) -> AddressMode {
    match wrap {
        WrappingMode::ClampToEdge => AddressMode::ClampToEdge,
        WrappingMode::MirroredRepeat => AddressMode::MirrorRepeat,
        WrappingMode::Repeat => AddressMode::Repeat,
    }
}

fn map_sampler(sampler: &gltf::texture::Sampler<'_>) -> SamplerDescriptor {
    let (min_filter, mipmap_filter) = map_min_filter(sampler.min_filter());
    SamplerDescriptor {
        label: Some("Material Sampler".into()),
        mag_filter: map_mag_filter(sampler.mag_filter()),
        min_filter,
        mipmap_filter,
        address_mode_u: map_wrapping(sampler.wrap_s()),
        address_mode_v: map_wrapping(sampler.wrap_t()),
        address_mode_w: AddressMode::Repeat,
        compare: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Mode::Points, PrimitiveTopology::PointList)]
    #[case(Mode::Lines, PrimitiveTopology::LineList)]
    #[case(Mode::LineStrip, PrimitiveTopology::LineStrip)]
    #[case(Mode::Triangles, PrimitiveTopology::TriangleList)]
    #[case(Mode::TriangleStrip, PrimitiveTopology::TriangleStrip)]
    fn test_map_topology(#[case] mode: Mode, #[case] expected: PrimitiveTopology) {
        assert_eq!(map_topology(mode, 0, 0).unwrap(), expected);
    }

    #[rstest]
    #[case(Mode::TriangleFan)]
    #[case(Mode::LineLoop)]
    fn test_unsupported_topology(#[case] mode: Mode) {
        let err = map_topology(mode, 3, 1).unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnsupportedTopology { mesh: 3, primitive: 1, .. }
        ));
    }

    #[rstest]
    #[case(Some(MinFilter::NearestMipmapLinear), FilterMode::Nearest, FilterMode::Linear)]
    #[case(Some(MinFilter::LinearMipmapNearest), FilterMode::Linear, FilterMode::Nearest)]
    #[case(None, FilterMode::Linear, FilterMode::Linear)]
    fn test_map_min_filter(
        #[case] filter: Option<MinFilter>,
        #[case] min: FilterMode,
        #[case] mip: FilterMode,
    ) {
        assert_eq!(map_min_filter(filter), (min, mip));
    }

    #[test]
    fn test_convert_single_channel_image() {
        let image = gltf::image::Data {
            pixels: vec![10, 20],
            format: Format::R8,
            width: 2,
            height: 1,
        };
        let converted = convert_image(0, &image).unwrap();
        assert_eq!(converted.rgba, vec![10, 10, 10, 255, 20, 20, 20, 255]);
    }

    #[test]
    fn test_convert_rgb_image_adds_alpha() {
        let image = gltf::image::Data {
            pixels: vec![1, 2, 3],
            format: Format::R8G8B8,
            width: 1,
            height: 1,
        };
        assert_eq!(convert_image(0, &image).unwrap().rgba, vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_sixteen_bit_images_are_rejected() {
        let image = gltf::image::Data {
            pixels: vec![0; 8],
            format: Format::R16G16B16A16,
            width: 1,
            height: 1,
        };
        assert!(matches!(
            convert_image(4, &image),
            Err(ModelError::UnsupportedImageFormat { index: 4, .. })
        ));
    }
}
