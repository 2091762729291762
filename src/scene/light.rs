//! Point light rig

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

pub const LIGHT_COUNT: usize = 3;

/// Strength steps a light cycles through, starting from off.
pub const LIGHT_STRENGTHS: [f32; 5] = [0.0, 10.0, 100.0, 300.0, 1000.0];

const LIGHT_POSITIONS: [Vec3; LIGHT_COUNT] = [
    Vec3::new(5.0, 5.0, 5.0),
    Vec3::new(-5.0, 3.0, 5.0),
    Vec3::new(0.0, -5.0, -5.0),
];

const LIGHT_COLORS: [Vec3; LIGHT_COUNT] = [
    Vec3::new(1.0, 1.0, 1.0),
    Vec3::new(1.0, 0.85, 0.6),
    Vec3::new(0.6, 0.75, 1.0),
];

/// Light uniform data for GPU. Color `w` holds the strength.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LightUniform {
    pub positions: [Vec4; LIGHT_COUNT],
    pub colors: [Vec4; LIGHT_COUNT],
}

/// Three fixed point lights whose strengths are stepped by the user.
#[derive(Debug, Clone, Default)]
pub struct LightRig {
    states: [usize; LIGHT_COUNT],
}

impl LightRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance a light to its next strength, wrapping back to off. Unknown ids are ignored.
    pub fn cycle(&mut self, light: usize) {
        if let Some(state) = self.states.get_mut(light) {
            *state = (*state + 1) % LIGHT_STRENGTHS.len();
            log::debug!("Light {} strength {}", light, LIGHT_STRENGTHS[*state]);
        }
    }

    pub fn strength(&self, light: usize) -> f32 {
        self.states
            .get(light)
            .map(|&state| LIGHT_STRENGTHS[state])
            .unwrap_or(0.0)
    }

    pub fn uniform_data(&self) -> LightUniform {
        let mut uniform = LightUniform::zeroed();
        for i in 0..LIGHT_COUNT {
            uniform.positions[i] = LIGHT_POSITIONS[i].extend(1.0);
            uniform.colors[i] = LIGHT_COLORS[i].extend(self.strength(i));
        }
        uniform
    }
}
