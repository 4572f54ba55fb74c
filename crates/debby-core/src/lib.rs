pub mod config;
pub mod execution;
pub mod managers;
pub mod models;
pub mod orchestration;
pub mod report;
pub mod version;
