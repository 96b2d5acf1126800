//! Grid geometry, terrain-following storage and staggered flow fields

pub mod error;
pub mod flow_field;
pub mod geometry;
pub mod terrain_column;
pub mod vertical;
pub mod wind_field;

// Re-export main types
pub use error::GridError;
pub use flow_field::FlowFieldState;
pub use geometry::{friction_helper, FlowGrid, ObstacleGrid, RoughnessConfig, VON_KARMAN};
pub use terrain_column::{ColumnGrid, TerrainColumn};
pub use vertical::{
    vertical_index, StretchingConfig, TransientGridConfig, VerticalGrid, PROBE_FRACTION,
};
pub use wind_field::{
    power_law_exponent, InterpolatedWind, Topography, WindFieldInterpolator, WindProfile,
    WindQuery,
};
