mod builder;
mod matrix_row;
mod writer;

pub use builder::{FeatureBuilder, SweepConfig};
pub use matrix_row::MatrixRow;
pub use writer::{upload_matrix, write_matrix};
