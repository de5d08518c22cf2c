pub mod backend;
pub mod cancellation;
pub mod constants;
pub mod frame;
pub mod log_sink;
pub mod region;
