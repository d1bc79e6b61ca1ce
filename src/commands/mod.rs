pub mod apply;
pub mod calibrate;
pub mod summary;
pub mod synth;

pub use apply::apply_calibration;
pub use calibrate::run_calibration;
pub use summary::summarize;
pub use synth::generate_synthetic;
