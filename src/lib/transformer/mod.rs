pub mod api;
pub mod auth;
pub mod client;
pub mod transformer;
pub mod types;

#[cfg(test)]
pub(crate) mod testkit;
