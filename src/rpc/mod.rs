pub mod client;
pub mod https;
