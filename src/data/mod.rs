pub mod history;
pub mod tx;
