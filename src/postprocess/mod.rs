//! Post-processing: scene luminance, eye adaptation and tonemapping

mod adaptation;
mod luminance;
mod tonemapping;

pub use adaptation::*;
pub use luminance::*;
pub use tonemapping::*;

/// Fullscreen triangle vertex stage shared by every screen-space pass.
///
/// `uv` has its origin at the top-left of the target, `ndc` is the clip-space position.
pub const FULLSCREEN_VERTEX_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
    @location(1) ndc: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var output: VertexOutput;

    // Generate fullscreen triangle
    let x = f32((vertex_index << 1u) & 2u);
    let y = f32(vertex_index & 2u);

    output.position = vec4<f32>(x * 2.0 - 1.0, y * 2.0 - 1.0, 0.0, 1.0);
    output.uv = vec2<f32>(x, 1.0 - y);
    output.ndc = output.position.xy;

    return output;
}
"#;

/// Prepend the fullscreen vertex stage to a fragment shader body.
pub fn fullscreen_shader(fragment: &str) -> String {
    [FULLSCREEN_VERTEX_SHADER, fragment].concat()
}
