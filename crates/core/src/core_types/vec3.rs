//! Vector type alias for 3D positions and wind vectors.

use nalgebra::Vector3;

/// 3D vector type for particle positions and interpolated winds.
///
/// Alias for `nalgebra::Vector3<f32>`; `x` points east, `y` north and `z`
/// up, in metres or metres per second.
pub type Vec3 = Vector3<f32>;
