pub mod config;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;
