/// Speed of light in km/s, matching the radial-velocity units used across
/// the subsystem.
pub const SPEED_OF_LIGHT_KMS: f64 = 299_792.458;

/// An order is flagged as contaminated when the number of masked pixels
/// exceeds `pixels_per_order - ORDER_MASK_MARGIN`.
pub const ORDER_MASK_MARGIN: usize = 100;

/// Default flux threshold below which template pixels are masked. Kept at
/// one to sidestep numerical issues with near-zero flux values.
pub const DEFAULT_FLUX_THRESHOLD: f64 = 1.0;

/// Default minimum number of valid observations needed to build a template.
pub const DEFAULT_MINIMUM_OBSERVATIONS: usize = 3;
