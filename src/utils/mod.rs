pub mod num;
pub mod serde;
pub mod time;
