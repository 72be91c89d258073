//! Deterministic synthetic observation set used by the `synth` command.
//!
//! A smooth continuum with periodic absorption lines is sampled in the
//! stellar rest frame and Doppler-shifted per observation, so the build
//! pipeline sees realistic per-observation wavelength grids while the
//! expected template stays analytic.

use ndarray::Array2;
use sidera_core::common::constants::SPEED_OF_LIGHT_KMS;
use sidera_core::numerics::interp::linear_interpolate;
use sidera_core::shift::{DopplerShift, RadialVelocityShift};
use sidera_core::{AccessError, GridShape, ObservationId, OrderData, SpectralSource};

pub const SYNTH_SUB_INSTRUMENT: &str = "SYNTH";

const EDGE_TRIM_PIXELS: usize = 3;

struct SyntheticObservation {
    id: ObservationId,
    rv_kms: f64,
    berv_kms: f64,
}

pub struct SyntheticSet {
    shape: GridShape,
    observations: Vec<SyntheticObservation>,
}

impl SyntheticSet {
    /// Observations spread symmetrically in velocity around zero; the
    /// middle one carries the smallest barycentric correction and anchors
    /// the template grid.
    pub fn generate(count: usize, shape: GridShape) -> Self {
        let half_span = (count as f64 - 1.0) / 2.0;
        let observations = (0..count)
            .map(|index| {
                let step = index as f64 - half_span;
                SyntheticObservation {
                    id: ObservationId(index as u32),
                    rv_kms: 0.4 * step,
                    berv_kms: 3.0 * step,
                }
            })
            .collect();
        Self {
            shape,
            observations,
        }
    }

    fn rest_wavelength(order: usize, pixel: usize) -> f64 {
        4800.0 + order as f64 * 60.0 + pixel as f64 * 0.02
    }

    fn flux_at(rest_wavelength: f64) -> f64 {
        let continuum = 1200.0 + 150.0 * (rest_wavelength / 3.0).sin();
        let line_center = (rest_wavelength / 7.0).round() * 7.0;
        let delta = (rest_wavelength - line_center) / 0.15;
        continuum - 600.0 * (-delta * delta).exp()
    }

    fn uncertainty_at(flux: f64) -> f64 {
        flux.max(1.0).sqrt()
    }

    fn observation(&self, id: ObservationId) -> Result<&SyntheticObservation, AccessError> {
        self.observations
            .iter()
            .find(|observation| observation.id == id)
            .ok_or_else(|| AccessError::Corrupt {
                observation: id,
                detail: "unknown synthetic observation".into(),
            })
    }

    fn order_data(&self, id: ObservationId, order: usize) -> Result<OrderData, AccessError> {
        let observation = self.observation(id)?;
        let pixels = self.shape.pixels;
        let doppler = 1.0 + observation.rv_kms / SPEED_OF_LIGHT_KMS;

        let mut wavelengths = Vec::with_capacity(pixels);
        let mut flux = Vec::with_capacity(pixels);
        let mut uncertainties = Vec::with_capacity(pixels);
        let mut masked = Vec::with_capacity(pixels);
        for pixel in 0..pixels {
            let rest = Self::rest_wavelength(order, pixel);
            let value = Self::flux_at(rest);
            wavelengths.push(rest * doppler);
            flux.push(value);
            uncertainties.push(Self::uncertainty_at(value));
            masked.push(pixel < EDGE_TRIM_PIXELS || pixel >= pixels.saturating_sub(EDGE_TRIM_PIXELS));
        }

        Ok(OrderData {
            wavelengths,
            flux,
            uncertainties,
            masked,
        })
    }
}

impl SpectralSource for SyntheticSet {
    fn grid_shape(&self) -> GridShape {
        self.shape
    }

    fn observations(&self, sub_instrument: &str) -> Vec<ObservationId> {
        if sub_instrument == SYNTH_SUB_INSTRUMENT {
            self.observations
                .iter()
                .map(|observation| observation.id)
                .collect()
        } else {
            Vec::new()
        }
    }

    fn load(&self, _id: ObservationId) -> Result<(), AccessError> {
        Ok(())
    }

    fn get_order(&self, id: ObservationId, order: usize) -> Result<OrderData, AccessError> {
        self.order_data(id, order)
    }

    fn interpolate(
        &self,
        id: ObservationId,
        order: usize,
        target_wavelengths: &[f64],
        rv_shift_kms: f64,
    ) -> Result<(Vec<f64>, Vec<f64>), AccessError> {
        let data = self.order_data(id, order)?;
        let shift = RadialVelocityShift;

        let mut xs = Vec::new();
        let mut flux = Vec::new();
        let mut uncertainties = Vec::new();
        for (pixel, &is_masked) in data.masked.iter().enumerate() {
            if !is_masked {
                xs.push(shift.remove_scalar(data.wavelengths[pixel], rv_shift_kms));
                flux.push(data.flux[pixel]);
                uncertainties.push(data.uncertainties[pixel]);
            }
        }

        let to_access_error = |detail: String| AccessError::Interpolation {
            observation: id,
            order,
            detail,
        };
        let interpolated_flux = linear_interpolate(&xs, &flux, target_wavelengths)
            .map_err(|err| to_access_error(err.to_string()))?;
        let interpolated_uncertainties = linear_interpolate(&xs, &uncertainties, target_wavelengths)
            .map_err(|err| to_access_error(err.to_string()))?;
        Ok((interpolated_flux, interpolated_uncertainties))
    }

    fn get_rv(&self, id: ObservationId) -> f64 {
        self.observation(id).map_or(0.0, |observation| observation.rv_kms)
    }

    fn get_berv(&self, id: ObservationId) -> f64 {
        self.observation(id)
            .map_or(0.0, |observation| observation.berv_kms)
    }

    fn wavelengths(&self, id: ObservationId) -> Result<Array2<f64>, AccessError> {
        let observation = self.observation(id)?;
        let doppler = 1.0 + observation.rv_kms / SPEED_OF_LIGHT_KMS;
        Ok(Array2::from_shape_fn(
            (self.shape.orders, self.shape.pixels),
            |(order, pixel)| Self::rest_wavelength(order, pixel) * doppler,
        ))
    }

    fn release(&self, _id: ObservationId) {}
}
