pub mod device;
pub mod storage;
