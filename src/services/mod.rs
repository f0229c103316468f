pub mod object_service;
pub mod staging;
pub mod storage;
pub mod transcoder;
pub mod worker;
