//! Input validation utilities

pub mod numeric;
pub mod region;

pub use numeric::NumericValidator;
pub use region::RegionValidator;
