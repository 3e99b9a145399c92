pub mod json;
pub mod pretty;
