pub mod dag;
pub mod types;
