pub mod edge;
pub mod frontend;
