pub mod gallery;
pub mod listing;
pub mod surface;
