//! PBR shader variants
//!
//! Every [`MaterialFeatures`] value selects one variant. Optional textures add their bindings
//! and sampling code; the rest of the shader is shared.

use crate::frame::FRAME_BINDINGS_WGSL;

use super::material::MaterialFeatures;

pub const IRRADIANCE_BINDING: u32 = 0;
pub const PREFILTERED_BINDING: u32 = 1;
pub const BRDF_LUT_BINDING: u32 = 2;
pub const IBL_SAMPLER_BINDING: u32 = 7;
pub const MATERIAL_SAMPLER_BINDING: u32 = 8;

/// Group 1 binding of an optional material texture.
pub fn material_texture_binding(flag: MaterialFeatures) -> u32 {
    match flag {
        MaterialFeatures::BASE_COLOR => 3,
        MaterialFeatures::METALLIC_ROUGHNESS => 4,
        MaterialFeatures::NORMAL => 5,
        _ => 6,
    }
}

fn texture_variable(flag: MaterialFeatures) -> &'static str {
    match flag {
        MaterialFeatures::BASE_COLOR => "base_color_texture",
        MaterialFeatures::METALLIC_ROUGHNESS => "metallic_roughness_texture",
        MaterialFeatures::NORMAL => "normal_texture",
        _ => "occlusion_texture",
    }
}

const DECLARATIONS: &str = r#"
const PI: f32 = 3.14159265359;

struct Object {
    model: mat4x4<f32>,
    normal_matrix: mat4x4<f32>,
}

struct MaterialParams {
    albedo: vec4<f32>,
    // roughness, metalness, alpha cutoff, mask flag
    params: vec4<f32>,
}

@group(1) @binding(0) var irradiance_map: texture_cube<f32>;
@group(1) @binding(1) var prefiltered_map: texture_cube<f32>;
@group(1) @binding(2) var brdf_lut: texture_2d<f32>;
@group(1) @binding(7) var ibl_sampler: sampler;
@group(1) @binding(8) var material_sampler: sampler;
@group(2) @binding(0) var<uniform> object: Object;
@group(3) @binding(0) var<uniform> material: MaterialParams;
"#;

const VERTEX_STAGE: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    let world = object.model * vec4<f32>(input.position, 1.0);
    var out: VertexOutput;
    out.clip_position = camera.view_proj * world;
    out.world_position = world.xyz / world.w;
    out.normal = (object.normal_matrix * vec4<f32>(input.normal, 0.0)).xyz;
    out.uv = input.uv;
    return out;
}
"#;

const BRDF_FUNCTIONS: &str = r#"
fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let d = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * d * d);
}

fn geometry_schlick_ggx(n_dot_x: f32, roughness: f32) -> f32 {
    let r = roughness + 1.0;
    let k = r * r / 8.0;
    return n_dot_x / (n_dot_x * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn fresnel_schlick(cos_theta: f32, f0: vec3<f32>) -> vec3<f32> {
    return f0 + (1.0 - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}

fn fresnel_schlick_roughness(cos_theta: f32, f0: vec3<f32>, roughness: f32) -> vec3<f32> {
    let grazing = max(vec3<f32>(1.0 - roughness), f0);
    return f0 + (grazing - f0) * pow(clamp(1.0 - cos_theta, 0.0, 1.0), 5.0);
}
"#;

const PERTURB_NORMAL: &str = r#"
// Tangent frame from screen-space derivatives, no tangent attribute needed
fn perturb_normal(n: vec3<f32>, position: vec3<f32>, uv: vec2<f32>, sampled: vec3<f32>) -> vec3<f32> {
    let dp1 = dpdx(position);
    let dp2 = dpdy(position);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);
    let dp2perp = cross(dp2, n);
    let dp1perp = cross(n, dp1);
    let t = dp2perp * duv1.x + dp1perp * duv2.x;
    let b = dp2perp * duv1.y + dp1perp * duv2.y;
    let inv_max = inverseSqrt(max(max(dot(t, t), dot(b, b)), 1e-12));
    let tbn = mat3x3<f32>(t * inv_max, b * inv_max, n);
    return normalize(tbn * (sampled * 2.0 - 1.0));
}
"#;

const FRAGMENT_HEAD: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var albedo = material.albedo;
    var roughness = material.params.x;
    var metalness = material.params.y;
    var occlusion = 1.0;
    var n = normalize(input.normal);
"#;

const FRAGMENT_TAIL: &str = r#"
    let r = clamp(roughness, 0.04, 1.0);
    let v = normalize(camera.position.xyz - input.world_position);
    let n_dot_v = max(dot(n, v), 1e-4);
    let f0 = mix(vec3<f32>(0.04), albedo.rgb, metalness);

    var direct = vec3<f32>(0.0);
    var debug_d = 0.0;
    var debug_g = 0.0;
    var debug_f = vec3<f32>(0.0);
    for (var i = 0u; i < 3u; i = i + 1u) {
        let to_light = lights.positions[i].xyz - input.world_position;
        let dist = max(length(to_light), 1e-4);
        let l = to_light / dist;
        let h = normalize(v + l);
        let radiance = lights.colors[i].rgb * lights.colors[i].w / (dist * dist);
        let n_dot_l = max(dot(n, l), 0.0);

        let d = distribution_ggx(max(dot(n, h), 0.0), r);
        let g = geometry_smith(n_dot_v, n_dot_l, r);
        let f = fresnel_schlick(max(dot(h, v), 0.0), f0);
        if i == 0u {
            debug_d = d;
            debug_g = g;
            debug_f = f;
        }

        let specular = d * g * f / (4.0 * n_dot_v * n_dot_l + 1e-4);
        let kd = (vec3<f32>(1.0) - f) * (1.0 - metalness);
        direct = direct + (kd * albedo.rgb / PI + specular) * radiance * n_dot_l;
    }

    let f = fresnel_schlick_roughness(n_dot_v, f0, r);
    let kd = (vec3<f32>(1.0) - f) * (1.0 - metalness);
    let irradiance = textureSample(irradiance_map, ibl_sampler, n).rgb;
    let max_lod = f32(textureNumLevels(prefiltered_map) - 1u);
    let prefiltered = textureSampleLevel(prefiltered_map, ibl_sampler, reflect(-v, n), r * max_lod).rgb;
    let brdf = textureSample(brdf_lut, ibl_sampler, vec2<f32>(n_dot_v, r)).rg;
    let ambient = (kd * irradiance * albedo.rgb + prefiltered * (f * brdf.x + brdf.y)) * occlusion;

    if material.params.w > 0.5 && albedo.a < material.params.z {
        discard;
    }

    var color = vec4<f32>(ambient + direct, albedo.a);
    switch general.shader_mode {
        case 1u: { color = vec4<f32>(vec3<f32>(debug_d), 1.0); }
        case 2u: { color = vec4<f32>(vec3<f32>(debug_g), 1.0); }
        case 3u: { color = vec4<f32>(debug_f, 1.0); }
        default: {}
    }
    return color;
}
"#;

fn sampling_code(flag: MaterialFeatures) -> &'static str {
    match flag {
        MaterialFeatures::BASE_COLOR => {
            "    albedo = albedo * textureSample(base_color_texture, material_sampler, input.uv);\n"
        }
        MaterialFeatures::METALLIC_ROUGHNESS => {
            "    let metallic_roughness = textureSample(metallic_roughness_texture, material_sampler, input.uv);\n    roughness = roughness * metallic_roughness.g;\n    metalness = metalness * metallic_roughness.b;\n"
        }
        MaterialFeatures::NORMAL => {
            "    n = perturb_normal(n, input.world_position, input.uv, textureSample(normal_texture, material_sampler, input.uv).rgb);\n"
        }
        _ => "    occlusion = textureSample(occlusion_texture, material_sampler, input.uv).r;\n",
    }
}

/// Full WGSL source of the variant for `features`.
pub fn pbr_shader(features: MaterialFeatures) -> String {
    let mut source = String::from(FRAME_BINDINGS_WGSL);
    source.push_str(DECLARATIONS);

    for flag in MaterialFeatures::ALL {
        if features.contains(flag) {
            source.push_str(&format!(
                "@group(1) @binding({}) var {}: texture_2d<f32>;\n",
                material_texture_binding(flag),
                texture_variable(flag)
            ));
        }
    }

    source.push_str(VERTEX_STAGE);
    source.push_str(BRDF_FUNCTIONS);
    if features.contains(MaterialFeatures::NORMAL) {
        source.push_str(PERTURB_NORMAL);
    }

    source.push_str(FRAGMENT_HEAD);
    for flag in MaterialFeatures::ALL {
        if features.contains(flag) {
            source.push_str(sampling_code(flag));
        }
    }
    source.push_str(FRAGMENT_TAIL);
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_variant_declares_only_ibl_textures() {
        let source = pbr_shader(MaterialFeatures::NONE);
        assert!(source.contains("fn vs_main"));
        assert!(source.contains("fn fs_main"));
        assert!(source.contains("irradiance_map"));
        assert!(!source.contains("base_color_texture"));
        assert!(!source.contains("perturb_normal"));
    }

    #[test]
    fn test_each_flag_adds_its_binding_and_sampling() {
        for flag in MaterialFeatures::ALL {
            let source = pbr_shader(flag);
            let declaration = format!(
                "@group(1) @binding({}) var {}",
                material_texture_binding(flag),
                texture_variable(flag)
            );
            assert!(source.contains(&declaration), "{flag:?}");
            assert!(source.contains(&format!("textureSample({}", texture_variable(flag))));
        }
    }

    #[test]
    fn test_bindings_are_distinct() {
        let mut bindings: Vec<u32> = MaterialFeatures::ALL
            .iter()
            .map(|&f| material_texture_binding(f))
            .chain([
                IRRADIANCE_BINDING,
                PREFILTERED_BINDING,
                BRDF_LUT_BINDING,
                IBL_SAMPLER_BINDING,
                MATERIAL_SAMPLER_BINDING,
            ])
            .collect();
        bindings.sort();
        bindings.dedup();
        assert_eq!(bindings, (0..9).collect::<Vec<_>>());
    }
}
