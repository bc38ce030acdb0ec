pub mod error;
pub mod extract;
pub mod fetch;
pub mod scheduler;
