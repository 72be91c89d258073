//! Per-order interpolation worker.

use super::buffers::BufferView;
use super::channels::{OrderAck, ResultMessage, WorkItem, WorkMessage, WorkerFailure};
use crate::access::SpectralSource;
use crate::domain::{AccessError, ObservationId};
use crate::numerics::contiguous_blocks;
use crate::shift::DopplerShift;
use crossbeam_channel::{Receiver, Sender};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

pub(crate) struct WorkerContext<S> {
    pub id: usize,
    pub work: Receiver<WorkMessage>,
    pub results: Sender<ResultMessage>,
    pub buffers: BufferView,
    pub source: Arc<S>,
    pub shift: Arc<dyn DopplerShift>,
    /// Alignment RV per observation, km/s. Zeroed in constant-RV mode.
    pub alignment_rv_kms: HashMap<ObservationId, f64>,
}

#[derive(Debug, thiserror::Error)]
enum TaskError {
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error("no alignment RV registered for observation {0}")]
    MissingRv(ObservationId),
    #[error("order data arrays disagree in length")]
    RaggedOrder,
    #[error(
        "interpolation returned {flux} flux and {uncertainty} uncertainty values \
         for {expected} selected pixels"
    )]
    LengthMismatch {
        expected: usize,
        flux: usize,
        uncertainty: usize,
    },
}

/// Worker loop: pull tasks until the shutdown sentinel arrives. Any
/// unrecoverable error posts the fatal sentinel and exits the loop; a work
/// item is never silently dropped.
pub(crate) fn run_worker<S: SpectralSource>(ctx: WorkerContext<S>) {
    while let Ok(message) = ctx.work.recv() {
        let item = match message {
            WorkMessage::Shutdown => {
                debug!(worker = ctx.id, "worker received shutdown sentinel");
                return;
            }
            WorkMessage::Task(item) => item,
        };

        match process_item(&ctx, item) {
            Ok(rejection_fraction) => {
                let ack = ResultMessage::Ack(OrderAck {
                    observation: item.observation,
                    order: item.order,
                    rejection_fraction,
                });
                if ctx.results.send(ack).is_err() {
                    return;
                }
            }
            Err(task_error) => {
                error!(
                    worker = ctx.id,
                    observation = %item.observation,
                    order = item.order,
                    "worker aborting: {task_error}"
                );
                let _ = ctx.results.send(ResultMessage::Fatal(WorkerFailure {
                    worker: ctx.id,
                    detail: task_error.to_string(),
                }));
                return;
            }
        }
    }
}

/// Interpolate one observation order onto the reference grid and accumulate
/// it. Returns the rejection fraction for the acknowledgement.
fn process_item<S: SpectralSource>(
    ctx: &WorkerContext<S>,
    item: WorkItem,
) -> Result<f64, TaskError> {
    let pixels = ctx.buffers.pixels_per_order();

    let data = match ctx.source.get_order(item.observation, item.order) {
        Ok(data) => data,
        // the collaborator flagged the order: nothing to contribute
        Err(AccessError::UnusableOrder { .. }) => return Ok(1.0),
        Err(other) => return Err(other.into()),
    };
    let length = data.wavelengths.len();
    if data.flux.len() != length || data.uncertainties.len() != length || data.masked.len() != length
    {
        return Err(TaskError::RaggedOrder);
    }

    let rv_kms = *ctx
        .alignment_rv_kms
        .get(&item.observation)
        .ok_or(TaskError::MissingRv(item.observation))?;
    let reference = ctx.buffers.reference_wavelengths(item.order);

    // mark every reference pixel falling inside a valid block's shifted span
    let mut selected = vec![false; pixels];
    for block in contiguous_blocks(&data.masked) {
        let span_start = ctx.shift.remove_scalar(data.wavelengths[block.start], rv_kms);
        let span_end = ctx.shift.remove_scalar(data.wavelengths[block.end - 1], rv_kms);
        for (pixel, &wavelength) in reference.iter().enumerate() {
            if wavelength >= span_start && wavelength <= span_end {
                selected[pixel] = true;
            }
        }
    }

    let positions: Vec<usize> = selected
        .iter()
        .enumerate()
        .filter_map(|(pixel, &keep)| keep.then_some(pixel))
        .collect();
    if positions.is_empty() {
        return Ok(1.0);
    }

    let targets: Vec<f64> = positions.iter().map(|&pixel| reference[pixel]).collect();
    let (flux, uncertainties) =
        ctx.source
            .interpolate(item.observation, item.order, &targets, rv_kms)?;
    if flux.len() != positions.len() || uncertainties.len() != positions.len() {
        return Err(TaskError::LengthMismatch {
            expected: positions.len(),
            flux: flux.len(),
            uncertainty: uncertainties.len(),
        });
    }

    ctx.buffers
        .deposit(item.order, item.frame_slot, &positions, &flux, &uncertainties);
    Ok(1.0 - positions.len() as f64 / pixels as f64)
}
