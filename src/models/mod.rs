pub mod state;
pub mod universe;
