pub mod alarm;
pub mod chroma_detector;
pub mod classifier;
pub mod debounce;
pub mod detection;
pub mod frame_source;
pub mod history;
