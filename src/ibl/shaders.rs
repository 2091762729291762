//! WGSL sources for image based lighting precomputation

use crate::postprocess::FULLSCREEN_VERTEX_SHADER;

/// Per-face parameters. `params` is (roughness, sample count, source face resolution, unused).
const FACE_PARAMS: &str = r#"
struct FaceParams {
    inv_view_proj: mat4x4<f32>,
    params: vec4<f32>,
}

@group(0) @binding(0) var<uniform> face: FaceParams;

fn face_direction(ndc: vec2<f32>) -> vec3<f32> {
    let p = face.inv_view_proj * vec4<f32>(ndc, 0.5, 1.0);
    return normalize(p.xyz / p.w);
}

const PI: f32 = 3.14159265359;
"#;

const GGX_SAMPLING: &str = r#"
fn hammersley(i: u32, n: u32) -> vec2<f32> {
    return vec2<f32>(f32(i) / f32(n), f32(reverseBits(i)) * 2.3283064365386963e-10);
}

fn importance_sample_ggx(xi: vec2<f32>, n: vec3<f32>, roughness: f32) -> vec3<f32> {
    let a = roughness * roughness;
    let phi = 2.0 * PI * xi.x;
    let cos_theta = sqrt((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y));
    let sin_theta = sqrt(1.0 - cos_theta * cos_theta);
    let h = vec3<f32>(cos(phi) * sin_theta, sin(phi) * sin_theta, cos_theta);

    var up = vec3<f32>(0.0, 0.0, 1.0);
    if abs(n.z) > 0.999 {
        up = vec3<f32>(1.0, 0.0, 0.0);
    }
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);
    return normalize(tangent * h.x + bitangent * h.y + n * h.z);
}
"#;

const EQUIRECT_FRAGMENT: &str = r#"
@group(0) @binding(1) var panorama: texture_2d<f32>;
@group(0) @binding(2) var panorama_sampler: sampler;

const INV_ATAN: vec2<f32> = vec2<f32>(0.1591, 0.3183);

fn equirect_uv(dir: vec3<f32>) -> vec2<f32> {
    var uv = vec2<f32>(atan2(dir.z, dir.x), asin(clamp(dir.y, -1.0, 1.0))) * INV_ATAN + 0.5;
    // Row 0 of the panorama is the zenith
    uv.y = 1.0 - uv.y;
    return uv;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let dir = face_direction(input.ndc);
    let color = textureSampleLevel(panorama, panorama_sampler, equirect_uv(dir), 0.0).rgb;
    return vec4<f32>(color, 1.0);
}
"#;

const IRRADIANCE_FRAGMENT: &str = r#"
@group(0) @binding(1) var environment: texture_cube<f32>;
@group(0) @binding(2) var environment_sampler: sampler;

const SAMPLE_DELTA: f32 = 0.025;
const PHI_STEPS: u32 = 252u;
const THETA_STEPS: u32 = 63u;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = face_direction(input.ndc);

    var up = vec3<f32>(0.0, 1.0, 0.0);
    if abs(n.y) > 0.999 {
        up = vec3<f32>(1.0, 0.0, 0.0);
    }
    let right = normalize(cross(up, n));
    up = normalize(cross(n, right));

    var irradiance = vec3<f32>(0.0);
    for (var i = 0u; i < PHI_STEPS; i = i + 1u) {
        let phi = f32(i) * SAMPLE_DELTA;
        for (var j = 0u; j < THETA_STEPS; j = j + 1u) {
            let theta = f32(j) * SAMPLE_DELTA;
            let tangent = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let dir = tangent.x * right + tangent.y * up + tangent.z * n;
            let radiance = textureSampleLevel(environment, environment_sampler, dir, 0.0).rgb;
            irradiance += radiance * cos(theta) * sin(theta);
        }
    }
    irradiance = PI * irradiance / f32(PHI_STEPS * THETA_STEPS);

    return vec4<f32>(irradiance, 1.0);
}
"#;

const PREFILTER_FRAGMENT: &str = r#"
@group(0) @binding(1) var environment: texture_cube<f32>;
@group(0) @binding(2) var environment_sampler: sampler;

fn distribution_ggx(n_dot_h: f32, roughness: f32) -> f32 {
    let a = roughness * roughness;
    let a2 = a * a;
    let denom = n_dot_h * n_dot_h * (a2 - 1.0) + 1.0;
    return a2 / (PI * denom * denom);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = face_direction(input.ndc);
    let v = n;
    let roughness = face.params.x;
    let sample_count = u32(face.params.y);
    let resolution = face.params.z;
    let texel_solid_angle = 4.0 * PI / (6.0 * resolution * resolution);

    var color = vec3<f32>(0.0);
    var total_weight = 0.0;
    for (var i = 0u; i < sample_count; i = i + 1u) {
        let xi = hammersley(i, sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);

        let n_dot_l = max(dot(n, l), 0.0);
        if n_dot_l > 0.0 {
            // Pick the source mip whose texel footprint matches the sample's solid angle
            let n_dot_h = max(dot(n, h), 0.0);
            let h_dot_v = max(dot(h, v), 0.0);
            let pdf = distribution_ggx(n_dot_h, roughness) * n_dot_h / (4.0 * h_dot_v) + 0.0001;
            let sample_solid_angle = 1.0 / (f32(sample_count) * pdf + 0.0001);
            let mip = select(max(0.5 * log2(sample_solid_angle / texel_solid_angle), 0.0), 0.0, roughness == 0.0);

            color += textureSampleLevel(environment, environment_sampler, l, mip).rgb * n_dot_l;
            total_weight += n_dot_l;
        }
    }

    return vec4<f32>(color / max(total_weight, 0.0001), 1.0);
}
"#;

const BRDF_FRAGMENT: &str = r#"
struct BrdfParams {
    sample_count: u32,
    _pad0: u32,
    _pad1: u32,
    _pad2: u32,
}

@group(0) @binding(0) var<uniform> brdf: BrdfParams;

const PI: f32 = 3.14159265359;

fn geometry_schlick_ggx(n_dot_v: f32, roughness: f32) -> f32 {
    let k = (roughness * roughness) / 2.0;
    return n_dot_v / (n_dot_v * (1.0 - k) + k);
}

fn geometry_smith(n_dot_v: f32, n_dot_l: f32, roughness: f32) -> f32 {
    return geometry_schlick_ggx(n_dot_v, roughness) * geometry_schlick_ggx(n_dot_l, roughness);
}

fn integrate_brdf(n_dot_v: f32, roughness: f32) -> vec2<f32> {
    let v = vec3<f32>(sqrt(1.0 - n_dot_v * n_dot_v), 0.0, n_dot_v);
    let n = vec3<f32>(0.0, 0.0, 1.0);

    var scale = 0.0;
    var bias = 0.0;
    for (var i = 0u; i < brdf.sample_count; i = i + 1u) {
        let xi = hammersley(i, brdf.sample_count);
        let h = importance_sample_ggx(xi, n, roughness);
        let l = normalize(2.0 * dot(v, h) * h - v);

        let n_dot_l = max(l.z, 0.0);
        let n_dot_h = max(h.z, 0.0);
        let v_dot_h = max(dot(v, h), 0.0);
        if n_dot_l > 0.0 {
            let g = geometry_smith(n_dot_v, n_dot_l, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v);
            let fc = pow(1.0 - v_dot_h, 5.0);
            scale += (1.0 - fc) * g_vis;
            bias += fc * g_vis;
        }
    }
    return vec2<f32>(scale, bias) / f32(brdf.sample_count);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    // x: cos(theta_v), y: roughness
    let lut = integrate_brdf(max(input.uv.x, 0.0001), input.uv.y);
    return vec4<f32>(lut, 0.0, 1.0);
}
"#;

fn face_shader(parts: &[&str]) -> String {
    let mut source = String::from(FULLSCREEN_VERTEX_SHADER);
    source.push_str(FACE_PARAMS);
    for part in parts {
        source.push_str(part);
    }
    source
}

pub fn equirect_to_cube() -> String {
    face_shader(&[EQUIRECT_FRAGMENT])
}

pub fn irradiance_convolution() -> String {
    face_shader(&[IRRADIANCE_FRAGMENT])
}

pub fn specular_prefilter() -> String {
    face_shader(&[GGX_SAMPLING, PREFILTER_FRAGMENT])
}

pub fn brdf_integration() -> String {
    [FULLSCREEN_VERTEX_SHADER, BRDF_FRAGMENT, GGX_SAMPLING].concat()
}
