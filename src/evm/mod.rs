pub mod abi;
pub mod chains;
pub mod contract;
pub mod token;
