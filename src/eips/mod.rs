pub mod eip1193;
