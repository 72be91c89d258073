use crate::domain::{GridShape, ObservationId, RejectedObservation};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Per-order quality verdict of the finished template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderQuality {
    Usable,
    /// Too few unmasked pixels survive for this order to feed later stages.
    HighContamination,
}

/// The combined reference spectrum plus its build bookkeeping.
///
/// Either fully built or never published: a failed build surfaces a typed
/// error and leaves no partial template behind. Persistence of this entity
/// is owned by an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StellarTemplate {
    pub sub_instrument: String,
    /// Observation whose wavelength grid anchors the template.
    pub reference: ObservationId,
    pub wavelengths: Array2<f64>,
    pub flux: Array2<f64>,
    pub uncertainties: Array2<f64>,
    /// `true` marks pixels that must not feed later stages.
    pub mask: Array2<bool>,
    pub used: Vec<ObservationId>,
    pub rejected: Vec<RejectedObservation>,
    /// `[frames_used][orders]` fraction of reference pixels each used
    /// observation could not contribute to.
    pub rejection_matrix: Array2<f64>,
    pub order_quality: Vec<OrderQuality>,
}

impl StellarTemplate {
    pub fn grid_shape(&self) -> GridShape {
        let (orders, pixels) = self.flux.dim();
        GridShape { orders, pixels }
    }

    /// Whether the observation contributed to the template.
    pub fn used_observation(&self, id: ObservationId) -> bool {
        self.used.contains(&id)
    }

    /// Orders that survived the contamination check.
    pub fn usable_orders(&self) -> impl Iterator<Item = usize> + '_ {
        self.order_quality
            .iter()
            .enumerate()
            .filter(|(_, quality)| **quality == OrderQuality::Usable)
            .map(|(order, _)| order)
    }

    /// Fraction of masked pixels in one order.
    pub fn masked_fraction(&self, order: usize) -> f64 {
        let row = self.mask.row(order);
        let masked = row.iter().filter(|&&flag| flag).count();
        masked as f64 / row.len() as f64
    }
}
