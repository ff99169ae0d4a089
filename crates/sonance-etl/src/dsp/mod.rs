//! Signal processing primitives: window functions, the real FFT and
//! down-mix/resampling helpers.

pub mod fft;
pub mod resample;
pub mod window;

pub use fft::{magnitude, FftScratch, SpectralTransform};
pub use resample::{prepare, resample, to_mono};
pub use window::{apply as apply_window, WindowKind};
