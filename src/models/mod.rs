pub mod diagnosis;
pub mod prescription;

pub use diagnosis::*;
pub use prescription::*;
