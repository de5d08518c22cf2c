pub mod controller_registry;
pub mod feature_detector;
pub mod onnx_cascade;
