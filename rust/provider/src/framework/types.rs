pub mod common;
pub mod security;
