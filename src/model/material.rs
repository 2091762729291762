//! Materials: CPU description, constant block and texture-presence flags

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::{BindGroupHandle, BufferHandle};

/// Which optional material textures are bound. Each distinct value maps to one shader variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MaterialFeatures(u32);

impl MaterialFeatures {
    pub const NONE: Self = Self(0);
    pub const BASE_COLOR: Self = Self(1 << 0);
    pub const METALLIC_ROUGHNESS: Self = Self(1 << 1);
    pub const NORMAL: Self = Self(1 << 2);
    pub const OCCLUSION: Self = Self(1 << 3);

    /// Every flag, in binding order
    pub const ALL: [Self; 4] = [
        Self::BASE_COLOR,
        Self::METALLIC_ROUGHNESS,
        Self::NORMAL,
        Self::OCCLUSION,
    ];

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn with(self, other: Self, enabled: bool) -> Self {
        if enabled {
            self | other
        } else {
            self
        }
    }
}

impl std::ops::BitOr for MaterialFeatures {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

/// Material as imported, with textures referring to [`ImageData`](super::ImageData) indices
#[derive(Debug, Clone)]
pub struct MaterialData {
    pub name: Option<String>,
    pub albedo: Vec4,
    pub roughness: f32,
    pub metalness: f32,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub double_sided: bool,
    pub base_color_texture: Option<usize>,
    pub metallic_roughness_texture: Option<usize>,
    pub normal_texture: Option<usize>,
    pub occlusion_texture: Option<usize>,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: None,
            albedo: Vec4::ONE,
            roughness: 1.0,
            metalness: 1.0,
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            double_sided: false,
            base_color_texture: None,
            metallic_roughness_texture: None,
            normal_texture: None,
            occlusion_texture: None,
        }
    }
}

impl MaterialData {
    pub fn features(&self) -> MaterialFeatures {
        MaterialFeatures::NONE
            .with(MaterialFeatures::BASE_COLOR, self.base_color_texture.is_some())
            .with(
                MaterialFeatures::METALLIC_ROUGHNESS,
                self.metallic_roughness_texture.is_some(),
            )
            .with(MaterialFeatures::NORMAL, self.normal_texture.is_some())
            .with(MaterialFeatures::OCCLUSION, self.occlusion_texture.is_some())
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }

    /// Image indices paired with the flag they enable, in binding order.
    pub fn textures(&self) -> Vec<(MaterialFeatures, usize)> {
        [
            (MaterialFeatures::BASE_COLOR, self.base_color_texture),
            (
                MaterialFeatures::METALLIC_ROUGHNESS,
                self.metallic_roughness_texture,
            ),
            (MaterialFeatures::NORMAL, self.normal_texture),
            (MaterialFeatures::OCCLUSION, self.occlusion_texture),
        ]
        .into_iter()
        .filter_map(|(flag, image)| image.map(|image| (flag, image)))
        .collect()
    }

    pub fn uniform(&self) -> MaterialUniform {
        let mask = if self.alpha_mode == AlphaMode::Mask { 1.0 } else { 0.0 };
        MaterialUniform {
            albedo: self.albedo,
            params: Vec4::new(self.roughness, self.metalness, self.alpha_cutoff, mask),
        }
    }
}

/// Material constant block: albedo, then roughness, metalness, alpha cutoff and mask flag
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    pub albedo: Vec4,
    pub params: Vec4,
}

/// Uploaded material
#[derive(Debug)]
pub struct Material {
    pub features: MaterialFeatures,
    pub transparent: bool,
    pub double_sided: bool,
    pub uniform: BufferHandle,
    /// Group 3: the constant block
    pub uniform_group: BindGroupHandle,
    /// Group 1: IBL maps plus the material's own textures
    pub texture_group: BindGroupHandle,
    /// Image indices behind the texture group, with whether each was loaded as sRGB
    pub images: Vec<(usize, bool)>,
}
