//! Core stack logic: types, parsing, resolution, user data, program rendering.

pub mod bootstrap;
pub mod manifest;
pub mod parser;
pub mod resolver;
pub mod sequence;
pub mod types;
