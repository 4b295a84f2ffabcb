pub mod processing;
pub mod storage;
