//! Ad-hoc summarize and extract runs, plus run progress and cancellation.

pub mod dtos;
pub mod handlers;
