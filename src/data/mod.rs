//! Data structures for the ranking pipeline

mod count_matrix;
mod dataset;
mod library;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::DmsDataSet;
pub use library::VariantLibrary;
pub use metadata::{parse_sample_name, SampleMetadata};
