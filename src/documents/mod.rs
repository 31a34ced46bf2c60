pub mod admission;
pub mod dtos;
pub mod handlers;

pub use admission::AdmissionController;
