//! Row filters applied before and after testing

mod independent;
mod low_counts;

pub use independent::independent_filtering;
pub use low_counts::filter_low_counts;
