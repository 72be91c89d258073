//! Shared fake data-access collaborator for the integration tests.

#![allow(dead_code)]

use ndarray::Array2;
use sidera_core::numerics::interp::linear_interpolate;
use sidera_core::{
    AccessError, DopplerShift, GridShape, ObservationId, OrderData, RadialVelocityShift,
    SpectralSource,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

pub const SUB_INSTRUMENT: &str = "BLUE";

/// Lifecycle calls recorded by the fake, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Load(ObservationId),
    Release(ObservationId),
}

pub struct FakeObservation {
    pub rv_kms: f64,
    pub berv_kms: f64,
    pub orders: Vec<OrderData>,
    pub unusable_orders: HashSet<usize>,
}

pub struct FakeSet {
    pub shape: GridShape,
    pub observations: BTreeMap<ObservationId, FakeObservation>,
    pub fail_load: HashSet<ObservationId>,
    pub events: Mutex<Vec<Event>>,
}

impl FakeSet {
    pub fn new(shape: GridShape) -> Self {
        Self {
            shape,
            observations: BTreeMap::new(),
            fail_load: HashSet::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn insert(&mut self, id: u32, observation: FakeObservation) {
        self.observations.insert(ObservationId(id), observation);
    }

    pub fn recorded_events(&self) -> Vec<Event> {
        self.events.lock().expect("event log lock").clone()
    }

    fn order_data(
        &self,
        id: ObservationId,
        order: usize,
    ) -> Result<&OrderData, AccessError> {
        let observation = self.observations.get(&id).ok_or_else(|| AccessError::Corrupt {
            observation: id,
            detail: "unknown observation".into(),
        })?;
        if observation.unusable_orders.contains(&order) {
            return Err(AccessError::UnusableOrder {
                observation: id,
                order,
            });
        }
        observation
            .orders
            .get(order)
            .ok_or_else(|| AccessError::Corrupt {
                observation: id,
                detail: format!("order {order} out of range"),
            })
    }
}

impl SpectralSource for FakeSet {
    fn grid_shape(&self) -> GridShape {
        self.shape
    }

    fn observations(&self, sub_instrument: &str) -> Vec<ObservationId> {
        if sub_instrument == SUB_INSTRUMENT {
            self.observations.keys().copied().collect()
        } else {
            Vec::new()
        }
    }

    fn load(&self, id: ObservationId) -> Result<(), AccessError> {
        if self.fail_load.contains(&id) {
            return Err(AccessError::FrameLoad {
                observation: id,
                detail: "simulated read failure".into(),
            });
        }
        self.events
            .lock()
            .expect("event log lock")
            .push(Event::Load(id));
        Ok(())
    }

    fn get_order(&self, id: ObservationId, order: usize) -> Result<OrderData, AccessError> {
        self.order_data(id, order).map(|data| data.clone())
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

        // only valid source pixels participate in the interpolation
        let mut xs = Vec::new();
        let mut flux = Vec::new();
        let mut uncertainties = Vec::new();
        for (pixel, &masked) in data.masked.iter().enumerate() {
            if !masked {
                xs.push(shift.remove_scalar(data.wavelengths[pixel], rv_shift_kms));
                flux.push(data.flux[pixel]);
                uncertainties.push(data.uncertainties[pixel]);
            }
        }

        let interpolation_error = |detail: String| AccessError::Interpolation {
            observation: id,
            order,
            detail,
        };
        let interpolated_flux = linear_interpolate(&xs, &flux, target_wavelengths)
            .map_err(|err| interpolation_error(err.to_string()))?;
        let interpolated_uncertainties =
            linear_interpolate(&xs, &uncertainties, target_wavelengths)
                .map_err(|err| interpolation_error(err.to_string()))?;
        Ok((interpolated_flux, interpolated_uncertainties))
    }

    fn get_rv(&self, id: ObservationId) -> f64 {
        self.observations.get(&id).map_or(0.0, |obs| obs.rv_kms)
    }

    fn get_berv(&self, id: ObservationId) -> f64 {
        self.observations.get(&id).map_or(0.0, |obs| obs.berv_kms)
    }

    fn wavelengths(&self, id: ObservationId) -> Result<Array2<f64>, AccessError> {
        let observation = self.observations.get(&id).ok_or_else(|| AccessError::Corrupt {
            observation: id,
            detail: "unknown observation".into(),
        })?;
        let pixels = self.shape.pixels;
        Ok(Array2::from_shape_fn(
            (self.shape.orders, pixels),
            |(order, pixel)| observation.orders[order].wavelengths[pixel],
        ))
    }

    fn release(&self, id: ObservationId) {
        self.events
            .lock()
            .expect("event log lock")
            .push(Event::Release(id));
    }
}

/// Strictly increasing wavelength grid of one order, in the rest frame.
pub fn rest_wavelengths(order: usize, pixels: usize) -> Vec<f64> {
    (0..pixels)
        .map(|pixel| 5000.0 + order as f64 * 50.0 + pixel as f64 * 0.1)
        .collect()
}

/// Linear flux law used by the alignment tests; linearity makes 1-D
/// interpolation exact, so expected template values can be computed in
/// closed form.
pub fn flux_law(rest_wavelength: f64) -> f64 {
    2.0 * (rest_wavelength - 5000.0) + 10.0
}

/// An observation sampling `flux_law` at rest positions offset by
/// `rest_offset`, with its wavelength grid Doppler-shifted into the
/// observer frame by `rv_kms`.
pub fn linear_observation(
    shape: GridShape,
    rv_kms: f64,
    berv_kms: f64,
    rest_offset: f64,
    uncertainty: f64,
) -> FakeObservation {
    let doppler = 1.0 + rv_kms / 299_792.458;
    let orders = (0..shape.orders)
        .map(|order| {
            let rest: Vec<f64> = rest_wavelengths(order, shape.pixels)
                .iter()
                .map(|&wavelength| wavelength + rest_offset)
                .collect();
            OrderData {
                wavelengths: rest.iter().map(|&wavelength| wavelength * doppler).collect(),
                flux: rest.iter().map(|&wavelength| flux_law(wavelength)).collect(),
                uncertainties: vec![uncertainty; shape.pixels],
                masked: vec![false; shape.pixels],
            }
        })
        .collect();
    FakeObservation {
        rv_kms,
        berv_kms,
        orders,
        unusable_orders: HashSet::new(),
    }
}

/// An observation whose grid is the rest grid Doppler-shifted by `rv_kms`,
/// with constant flux and uncertainty everywhere.
pub fn constant_observation(
    shape: GridShape,
    rv_kms: f64,
    berv_kms: f64,
    flux_value: f64,
    uncertainty: f64,
) -> FakeObservation {
    let orders = (0..shape.orders)
        .map(|order| {
            let rest = rest_wavelengths(order, shape.pixels);
            let doppler = 1.0 + rv_kms / 299_792.458;
            OrderData {
                wavelengths: rest.iter().map(|&wavelength| wavelength * doppler).collect(),
                flux: vec![flux_value; shape.pixels],
                uncertainties: vec![uncertainty; shape.pixels],
                masked: vec![false; shape.pixels],
            }
        })
        .collect();
    FakeObservation {
        rv_kms,
        berv_kms,
        orders,
        unusable_orders: HashSet::new(),
    }
}
