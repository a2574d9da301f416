//! Texture-coordinate transforms for the streamed source.
//!
//! Matrices are column-major, the layout frame producers hand out and the
//! layout WGSL expects for `mat4x4<f32>`.

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};

pub type TexMatrix = Matrix4<f32>;

pub fn identity() -> TexMatrix {
    Matrix4::identity()
}

/// `translate(0, 1, 0) * scale(1, -1, 1)`: maps `v` to `1 - v` and leaves `u`
/// alone, so the source is not mirrored horizontally.
pub fn vertical_flip() -> TexMatrix {
    Matrix4::from_translation(Vector3::new(0.0, 1.0, 0.0))
        * Matrix4::from_nonuniform_scale(1.0, -1.0, 1.0)
}

/// Transform sampled by the kernels: the producer's per-frame crop/rotation
/// with the fixed vertical-flip correction applied first.
pub fn texture_transform(source: &TexMatrix) -> TexMatrix {
    *source * vertical_flip()
}

pub fn apply(matrix: &TexMatrix, uv: [f32; 2]) -> [f32; 2] {
    let out = *matrix * Vector4::new(uv[0], uv[1], 0.0, 1.0);
    [out.x, out.y]
}

pub fn from_column_major(values: [f32; 16]) -> TexMatrix {
    Matrix4::new(
        values[0], values[1], values[2], values[3], values[4], values[5], values[6], values[7],
        values[8], values[9], values[10], values[11], values[12], values[13], values[14],
        values[15],
    )
}

pub fn to_columns(matrix: &TexMatrix) -> [[f32; 4]; 4] {
    (*matrix).into()
}
