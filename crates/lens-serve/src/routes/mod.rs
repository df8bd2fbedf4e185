pub mod analyze;
pub mod error;
pub mod files;
pub mod repos;
