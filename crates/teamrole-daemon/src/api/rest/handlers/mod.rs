//! API request handlers

mod status;

pub use status::*;
