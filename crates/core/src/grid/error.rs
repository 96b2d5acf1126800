//! Validation errors for externally supplied grid geometry
//!
//! The numeric kernels never fail; everything that can be wrong with the
//! input (array shapes, height tables, obstacle floors) is rejected here,
//! once, when the grid objects are built.

/// Errors raised while building or validating grid geometry
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// An input array does not have the expected number of entries
    DimensionMismatch {
        /// Name of the offending array
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },
    /// Height table is not strictly increasing at the given index
    NonMonotonicHeights {
        /// First index `k` with `heights[k] <= heights[k - 1]`
        index: usize,
    },
    /// A layer has zero (or negative, or non-finite) thickness
    ZeroLayerThickness {
        /// Layer index
        layer: usize,
    },
    /// Grid has no cells in at least one direction
    EmptyGrid,
    /// Horizontal cell size is not a positive finite number
    InvalidCellSize(f32),
    /// Obstacle floor is not below the column ceiling inside the advection domain
    ColumnCeiling {
        /// Cell index i
        i: usize,
        /// Cell index j
        j: usize,
        /// Obstacle floor `KKART[i][j]`
        floor: usize,
        /// Column ceiling `VerticalIndex[i][j]`
        ceiling: usize,
    },
    /// Stretching parameters cannot produce a valid table
    InvalidStretching(String),
    /// Concentration grid needs at least one source group
    InvalidSourceGroups,
    /// A scalar parameter is outside its valid range
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f32,
    },
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::DimensionMismatch {
                what,
                expected,
                actual,
            } => write!(f, "{what}: expected {expected} entries, got {actual}"),
            GridError::NonMonotonicHeights { index } => {
                write!(f, "height table is not strictly increasing at index {index}")
            }
            GridError::ZeroLayerThickness { layer } => {
                write!(f, "layer {layer} has non-positive thickness")
            }
            GridError::EmptyGrid => write!(f, "grid has no cells"),
            GridError::InvalidCellSize(size) => write!(f, "invalid cell size: {size}"),
            GridError::ColumnCeiling {
                i,
                j,
                floor,
                ceiling,
            } => write!(
                f,
                "cell ({i}, {j}): obstacle floor {floor} is not below column ceiling {ceiling}"
            ),
            GridError::InvalidStretching(msg) => write!(f, "invalid stretching: {msg}"),
            GridError::InvalidSourceGroups => write!(f, "at least one source group is required"),
            GridError::InvalidParameter { name, value } => {
                write!(f, "parameter {name} out of range: {value}")
            }
        }
    }
}

impl std::error::Error for GridError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = GridError::DimensionMismatch {
            what: "kkart",
            expected: 25,
            actual: 24,
        };
        assert_eq!(err.to_string(), "kkart: expected 25 entries, got 24");

        let err = GridError::ColumnCeiling {
            i: 3,
            j: 4,
            floor: 5,
            ceiling: 5,
        };
        assert!(err.to_string().contains("(3, 4)"));
    }
}
