pub mod deploy;
pub mod parse;
pub mod render;
