pub mod capture;
pub mod config;
pub mod detection;
pub mod pipeline;
pub mod recognition;
pub mod shared;
