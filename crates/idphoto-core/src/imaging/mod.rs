//! Pixel statistics and recovery transforms shared by the engines.

mod enhance;
mod filters;
mod histogram;

pub use enhance::{downscale, enhance_contrast};
pub use filters::{
    block_noise_sigma, bright_ratio, edge_density, laplacian_variance, mean_rgb, rgb_to_hsv,
    sobel_magnitude, RegionStats,
};
pub use histogram::{ExposureProfile, Histogram};
