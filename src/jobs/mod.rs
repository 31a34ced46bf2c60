pub mod backoff;
pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod queue;
pub mod registry;
pub mod repository;
pub mod worker;

pub use backoff::*;
pub use dispatcher::*;
pub use handler::*;
pub use handlers::*;
pub use queue::*;
pub use registry::*;
pub use repository::*;
pub use worker::*;
