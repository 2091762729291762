//! Cube face orientation for wgpu's cube sampling convention.
//!
//! Face `i` of a cube texture is array layer `i`, in the order +X, -X, +Y, -Y, +Z, -Z.
//! Within a face, texel coordinates `(u, v)` in `[-1, 1]` grow rightwards and downwards, and
//! the sampled direction is `forward + u * right + v * down`.

use glam::{Mat4, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face in a cube texture.
    pub fn layer(self) -> u32 {
        self as u32
    }

    /// (forward, right, down) basis of the face
    pub fn basis(self) -> (Vec3, Vec3, Vec3) {
        match self {
            CubeFace::PositiveX => (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
            CubeFace::NegativeX => (Vec3::NEG_X, Vec3::Z, Vec3::NEG_Y),
            CubeFace::PositiveY => (Vec3::Y, Vec3::X, Vec3::Z),
            CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
            CubeFace::PositiveZ => (Vec3::Z, Vec3::X, Vec3::NEG_Y),
            CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::NEG_Y),
        }
    }

    pub fn forward(self) -> Vec3 {
        self.basis().0
    }

    /// Unnormalized direction through face coordinates `(u, v)`.
    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        let (forward, right, down) = self.basis();
        forward + u * right + v * down
    }

    /// View matrix of a camera at the origin looking through this face.
    ///
    /// The face bases are left-handed, so this is built row by row rather than with
    /// `look_at_rh`, which would mirror the image.
    pub fn view_matrix(self) -> Mat4 {
        let (forward, right, down) = self.basis();
        let up = -down;
        Mat4::from_cols(
            Vec4::new(right.x, up.x, -forward.x, 0.0),
            Vec4::new(right.y, up.y, -forward.y, 0.0),
            Vec4::new(right.z, up.z, -forward.z, 0.0),
            Vec4::W,
        )
    }

    /// 90 degree, aspect 1 projection covering exactly one face.
    pub fn projection_matrix() -> Mat4 {
        Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 10.0)
    }

    pub fn view_projection(self) -> Mat4 {
        Self::projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn unproject(face: CubeFace, ndc_x: f32, ndc_y: f32) -> Vec3 {
        let p = face.view_projection().inverse() * Vec4::new(ndc_x, ndc_y, 0.5, 1.0);
        (p.truncate() / p.w).normalize()
    }

    #[test]
    fn test_faces_form_orthogonal_basis() {
        for (i, a) in CubeFace::ALL.iter().enumerate() {
            assert_eq!(a.layer(), i as u32);
            for b in &CubeFace::ALL[i + 1..] {
                let dot = a.forward().dot(b.forward());
                assert!(dot == 0.0 || dot == -1.0, "{a:?} vs {b:?}");
            }
        }
        let sum: Vec3 = CubeFace::ALL.iter().map(|f| f.forward()).sum();
        assert_eq!(sum, Vec3::ZERO);
    }

    #[rstest]
    #[case(CubeFace::PositiveX, 0.5, -0.25, Vec3::new(1.0, 0.25, -0.5))]
    #[case(CubeFace::NegativeX, 0.5, -0.25, Vec3::new(-1.0, 0.25, 0.5))]
    #[case(CubeFace::PositiveY, 0.5, -0.25, Vec3::new(0.5, 1.0, -0.25))]
    #[case(CubeFace::NegativeY, 0.5, -0.25, Vec3::new(0.5, -1.0, 0.25))]
    #[case(CubeFace::PositiveZ, 0.5, -0.25, Vec3::new(0.5, 0.25, 1.0))]
    #[case(CubeFace::NegativeZ, 0.5, -0.25, Vec3::new(-0.5, 0.25, -1.0))]
    fn test_face_direction_table(
        #[case] face: CubeFace,
        #[case] u: f32,
        #[case] v: f32,
        #[case] expected: Vec3,
    ) {
        assert_eq!(face.direction(u, v), expected);
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.8, 0.3)]
    #[case(-0.6, -0.9)]
    fn test_unprojected_ndc_matches_face_direction(#[case] ndc_x: f32, #[case] ndc_y: f32) {
        for face in CubeFace::ALL {
            // Render targets store row 0 at the top, so v runs against NDC y
            let expected = face.direction(ndc_x, -ndc_y).normalize();
            let actual = unproject(face, ndc_x, ndc_y);
            assert!(actual.abs_diff_eq(expected, 1e-4), "{face:?}: {actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_adjacent_faces_share_edges() {
        // Right edge of +Z and left edge of +X sample the same directions
        for v in [-0.5f32, 0.0, 0.7] {
            let pz = CubeFace::PositiveZ.direction(1.0, v);
            let px = CubeFace::PositiveX.direction(-1.0, v);
            assert!(pz.abs_diff_eq(px, 1e-6));
        }
    }
}
