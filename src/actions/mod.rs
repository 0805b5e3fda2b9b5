pub mod farming;
pub mod simulate;
pub mod transfer;
