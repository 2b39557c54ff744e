pub mod builder;
pub mod constraints;
pub mod variants;
