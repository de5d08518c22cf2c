pub mod cascade;
pub mod controller;
pub mod detection_result;
