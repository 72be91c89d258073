//! Template build coordinator.
//!
//! Drives the `SELECTING -> DISPATCHING -> REDUCING -> DONE` state machine
//! (`FAILED` from any state). Observations are processed frame-sequentially
//! with order-level fan-out: the coordinator never has more than one
//! observation's worth of order tasks in flight, which bounds memory while
//! the workers interpolate orders in parallel.

use super::buffers::{BufferSnapshot, CubeShape, SharedBufferSet};
use super::channels::{self, ResultMessage, WorkItem, WorkMessage};
use super::worker::{run_worker, WorkerContext};
use crate::access::{ObservationPredicate, SpectralSource, Verdict};
use crate::common::config::TemplateConfig;
use crate::common::constants::ORDER_MASK_MARGIN;
use crate::domain::{
    BuildPhase, ObservationId, ObservationSummary, RejectedObservation, RejectionReason,
    TemplateError, TemplateResult,
};
use crate::numerics::{median_in_place, strictness_violations};
use crate::shift::{DopplerShift, RadialVelocityShift};
use crate::template::{OrderQuality, StellarTemplate};
use crossbeam_channel::{Receiver, Sender};
use ndarray::Array2;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Builds one median stellar template per invocation of [`build`].
///
/// [`build`]: TemplateBuilder::build
pub struct TemplateBuilder {
    config: TemplateConfig,
    shift: Arc<dyn DopplerShift>,
}

struct Selection {
    eligible: Vec<ObservationSummary>,
    rejected: Vec<RejectedObservation>,
    reference: ObservationId,
    reference_wavelengths: Array2<f64>,
}

struct DispatchOutcome {
    used: Vec<ObservationId>,
    runtime_rejected: Vec<RejectedObservation>,
    /// Rejection fractions indexed `[eligible_row][order]`; rows of
    /// observations that failed to load stay zero and are dropped later.
    rejection_rows: Array2<f64>,
}

struct OrderReduction {
    flux: Vec<f64>,
    uncertainty: Vec<f64>,
    mask: Vec<bool>,
}

impl TemplateBuilder {
    pub fn new(config: TemplateConfig) -> Self {
        Self {
            config,
            shift: Arc::new(RadialVelocityShift),
        }
    }

    /// Swap in a different shift-correction collaborator.
    pub fn with_shift(config: TemplateConfig, shift: Arc<dyn DopplerShift>) -> Self {
        Self { config, shift }
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Build the template for one sub-instrument. Either a fully reduced
    /// template comes back or a typed error after complete cleanup; there is
    /// no partial-result path.
    pub fn build<S: SpectralSource>(
        &self,
        source: Arc<S>,
        sub_instrument: &str,
        conditions: Option<&dyn ObservationPredicate>,
    ) -> TemplateResult<StellarTemplate> {
        self.config.validate()?;
        if self.config.memory_save {
            warn!(
                "memory-saving mode releases observation data after use; later \
                 consumers will re-open it"
            );
        }

        let selection = self.select(source.as_ref(), sub_instrument, conditions)?;
        self.dispatch_and_reduce(source, sub_instrument, selection)
    }

    fn select<S: SpectralSource>(
        &self,
        source: &S,
        sub_instrument: &str,
        conditions: Option<&dyn ObservationPredicate>,
    ) -> TemplateResult<Selection> {
        info!(phase = %BuildPhase::Selecting, sub_instrument, "selecting observations");
        let required = self.config.minimum_observations;

        let mut ids = source.observations(sub_instrument);
        ids.sort_unstable();
        if ids.is_empty() {
            return Err(TemplateError::InsufficientData {
                available: 0,
                required,
            });
        }

        let mut eligible = Vec::with_capacity(ids.len());
        let mut rejected = Vec::new();
        for id in ids {
            let summary = ObservationSummary {
                id,
                rv_kms: source.get_rv(id),
                berv_kms: source.get_berv(id),
            };
            match conditions.map_or(Verdict::Keep, |condition| condition.evaluate(&summary)) {
                Verdict::Keep => eligible.push(summary),
                Verdict::Reject { reason } => {
                    info!(observation = %id, reason = %reason, "observation rejected by conditions");
                    rejected.push(RejectedObservation {
                        id,
                        reason: RejectionReason::Condition(reason),
                    });
                }
            }
        }
        if eligible.len() < required {
            return Err(TemplateError::InsufficientData {
                available: eligible.len(),
                required,
            });
        }

        // the observation needing the smallest barycentric correction
        // anchors the wavelength grid
        let reference_index = eligible
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.berv_kms.abs().total_cmp(&b.berv_kms.abs()))
            .map(|(index, _)| index)
            .unwrap_or(0);
        let reference = eligible[reference_index].id;
        let reference_rv = if self.config.constant_rv_guess {
            0.0
        } else {
            eligible[reference_index].rv_kms
        };

        info!(
            observation = %reference,
            rv_kms = reference_rv,
            "using observation as wavelength basis for the template"
        );
        let raw_grid = source.wavelengths(reference)?;
        let reference_wavelengths =
            raw_grid.mapv(|wavelength| self.shift.remove_scalar(wavelength, reference_rv));

        Ok(Selection {
            eligible,
            rejected,
            reference,
            reference_wavelengths,
        })
    }

    fn dispatch_and_reduce<S: SpectralSource>(
        &self,
        source: Arc<S>,
        sub_instrument: &str,
        selection: Selection,
    ) -> TemplateResult<StellarTemplate> {
        let grid = source.grid_shape();
        let shape = CubeShape::from_grid(grid, selection.eligible.len());
        let mut buffers = SharedBufferSet::allocate(shape, &selection.reference_wavelengths)?;

        let alignment_rv_kms: HashMap<ObservationId, f64> = selection
            .eligible
            .iter()
            .map(|summary| {
                let rv = if self.config.constant_rv_guess {
                    0.0
                } else {
                    summary.rv_kms
                };
                (summary.id, rv)
            })
            .collect();

        let (work_tx, work_rx) = channels::work_channel();
        let (result_tx, result_rx) = channels::result_channel();

        info!(
            phase = %BuildPhase::Dispatching,
            workers = self.config.workers,
            frames = selection.eligible.len(),
            "launching template workers"
        );
        let mut handles = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            let context = WorkerContext {
                id: worker_id,
                work: work_rx.clone(),
                results: result_tx.clone(),
                buffers: buffers.attach()?,
                source: Arc::clone(&source),
                shift: Arc::clone(&self.shift),
                alignment_rv_kms: alignment_rv_kms.clone(),
            };
            let handle = thread::Builder::new()
                .name(format!("template-worker-{worker_id}"))
                .spawn(move || run_worker(context))
                .map_err(|spawn_error| {
                    TemplateError::Internal(format!(
                        "failed to spawn worker thread: {spawn_error}"
                    ))
                })?;
            handles.push(handle);
        }
        // the coordinator keeps no result sender: the channel disconnects
        // once every worker is gone
        drop(result_tx);

        let outcome = self.run_dispatch(
            source.as_ref(),
            &selection,
            &work_tx,
            &result_rx,
            grid.orders,
        );

        // workers must be fully terminated before the buffers are released,
        // on the success and the failure path alike
        for _ in 0..handles.len() {
            let _ = work_tx.send(WorkMessage::Shutdown);
        }
        for handle in handles {
            let _ = handle.join();
        }

        let dispatch = match outcome {
            Ok(dispatch) => dispatch,
            Err(error) => {
                warn!(phase = %BuildPhase::Failed, "template build failed: {error}");
                buffers.release();
                return Err(error);
            }
        };

        let snapshot = buffers.snapshot()?;
        buffers.release();
        self.reduce(sub_instrument, selection, dispatch, snapshot)
    }

    fn run_dispatch<S: SpectralSource>(
        &self,
        source: &S,
        selection: &Selection,
        work_tx: &Sender<WorkMessage>,
        result_rx: &Receiver<ResultMessage>,
        orders: usize,
    ) -> TemplateResult<DispatchOutcome> {
        let row_of: HashMap<ObservationId, usize> = selection
            .eligible
            .iter()
            .enumerate()
            .map(|(row, summary)| (summary.id, row))
            .collect();

        let mut rejection_rows = Array2::<f64>::zeros((selection.eligible.len(), orders));
        let mut used = Vec::with_capacity(selection.eligible.len());
        let mut runtime_rejected = Vec::new();
        let mut frame_slot = 0usize;

        for summary in &selection.eligible {
            let id = summary.id;
            info!(observation = %id, frame_slot, "starting observation");
            if let Err(load_error) = source.load(id) {
                warn!(observation = %id, "run-time rejection: {load_error}");
                runtime_rejected.push(RejectedObservation {
                    id,
                    reason: RejectionReason::LoadFailure(load_error.to_string()),
                });
                continue;
            }

            for order in 0..orders {
                let item = WorkItem {
                    observation: id,
                    order,
                    frame_slot,
                };
                if work_tx.send(WorkMessage::Task(item)).is_err() {
                    return Err(TemplateError::Internal(
                        "work channel closed while dispatching".into(),
                    ));
                }
            }

            // per-observation barrier: exactly one acknowledgement per
            // dispatched order, or the fatal sentinel
            let barrier_start = Instant::now();
            let mut received = 0usize;
            while received < orders {
                match result_rx.recv() {
                    Ok(ResultMessage::Ack(ack)) => {
                        if let Some(&row) = row_of.get(&ack.observation) {
                            rejection_rows[[row, ack.order]] = ack.rejection_fraction;
                        }
                        received += 1;
                    }
                    Ok(ResultMessage::Fatal(failure)) => {
                        return Err(TemplateError::WorkerFatal {
                            worker: failure.worker,
                            detail: failure.detail,
                        });
                    }
                    Err(_) => {
                        return Err(TemplateError::Internal(
                            "result channel closed before the barrier completed".into(),
                        ));
                    }
                }
            }
            debug!(
                observation = %id,
                elapsed_ms = barrier_start.elapsed().as_millis() as u64,
                "observation barrier complete"
            );

            used.push(id);
            if self.config.memory_save {
                source.release(id);
            }
            frame_slot += 1;
        }

        if used.is_empty() {
            return Err(TemplateError::InsufficientData {
                available: 0,
                required: self.config.minimum_observations,
            });
        }

        Ok(DispatchOutcome {
            used,
            runtime_rejected,
            rejection_rows,
        })
    }

    fn reduce(
        &self,
        sub_instrument: &str,
        selection: Selection,
        dispatch: DispatchOutcome,
        snapshot: BufferSnapshot,
    ) -> TemplateResult<StellarTemplate> {
        let DispatchOutcome {
            used,
            runtime_rejected,
            rejection_rows,
        } = dispatch;
        let frames_used = used.len();
        let (orders, _frames, pixels) = snapshot.flux.dim();
        info!(
            phase = %BuildPhase::Reducing,
            frames_used,
            "updating template mask and combining frames"
        );

        // drop rejection rows of observations that never loaded
        let mut rejection_matrix = Array2::<f64>::zeros((frames_used, orders));
        let kept_rows = selection
            .eligible
            .iter()
            .enumerate()
            .filter(|(_, summary)| used.contains(&summary.id))
            .map(|(row, _)| row);
        for (new_row, old_row) in kept_rows.enumerate() {
            rejection_matrix
                .row_mut(new_row)
                .assign(&rejection_rows.row(old_row));
        }

        let threshold = self.config.flux_threshold;
        let reductions: Vec<OrderReduction> = (0..orders)
            .into_par_iter()
            .map(|order| {
                let mut flux_row = vec![0.0; pixels];
                let mut uncertainty_row = vec![0.0; pixels];
                let mut mask_row = vec![false; pixels];
                let mut scratch = vec![0.0; frames_used];

                for pixel in 0..pixels {
                    for (slot, value) in scratch.iter_mut().enumerate() {
                        *value = snapshot.flux[[order, slot, pixel]];
                    }
                    let median = median_in_place(&mut scratch);
                    flux_row[pixel] = median;

                    let variance_sum: f64 = (0..frames_used)
                        .map(|slot| snapshot.variance[[order, slot, pixel]])
                        .sum();
                    uncertainty_row[pixel] = variance_sum.sqrt() / frames_used as f64;

                    let count = snapshot.counts[[order, pixel]] as usize;
                    if count != frames_used || median < threshold {
                        mask_row[pixel] = true;
                    }
                }

                // the reference grid must grow strictly; violations are
                // masked, never left unmasked
                let wavelength_row: Vec<f64> =
                    (0..pixels).map(|pixel| snapshot.wavelengths[[order, pixel]]).collect();
                for violation in strictness_violations(&wavelength_row) {
                    mask_row[violation] = true;
                }

                OrderReduction {
                    flux: flux_row,
                    uncertainty: uncertainty_row,
                    mask: mask_row,
                }
            })
            .collect();

        let mut flux = Array2::<f64>::zeros((orders, pixels));
        let mut uncertainties = Array2::<f64>::zeros((orders, pixels));
        let mut mask = Array2::<bool>::from_elem((orders, pixels), false);
        let order_cutoff = pixels.saturating_sub(ORDER_MASK_MARGIN);
        let mut order_quality = Vec::with_capacity(orders);

        for (order, reduction) in reductions.iter().enumerate() {
            for pixel in 0..pixels {
                flux[[order, pixel]] = reduction.flux[pixel];
                uncertainties[[order, pixel]] = reduction.uncertainty[pixel];
                mask[[order, pixel]] = reduction.mask[pixel];
            }
            let masked_pixels = reduction.mask.iter().filter(|&&masked| masked).count();
            if masked_pixels > order_cutoff {
                warn!(
                    order,
                    masked_pixels, pixels, "rejecting order with excessive masking"
                );
                order_quality.push(OrderQuality::HighContamination);
            } else {
                order_quality.push(OrderQuality::Usable);
            }
        }

        let mut rejected = selection.rejected;
        rejected.extend(runtime_rejected);

        info!(phase = %BuildPhase::Done, "stellar template complete");
        Ok(StellarTemplate {
            sub_instrument: sub_instrument.to_string(),
            reference: selection.reference,
            wavelengths: snapshot.wavelengths,
            flux,
            uncertainties,
            mask,
            used,
            rejected,
            rejection_matrix,
            order_quality,
        })
    }
}
