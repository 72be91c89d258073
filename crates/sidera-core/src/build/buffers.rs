//! Accumulation buffers shared between the coordinator and its workers.
//!
//! The coordinator holds the only owning handle (`SharedBufferSet`); workers
//! receive non-owning `BufferView`s. Write regions are disjoint per work
//! item, so the numeric planes carry no lock; only the contribution
//! counters are atomic.

use crate::domain::{GridShape, TemplateError, TemplateResult};
use ndarray::{Array2, Array3};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

static LIVE_BUFFER_SETS: AtomicUsize = AtomicUsize::new(0);

/// Number of buffer sets currently allocated and not yet released.
pub fn live_buffer_sets() -> usize {
    LIVE_BUFFER_SETS.load(Ordering::SeqCst)
}

/// Dimensions of the accumulation cubes: `[orders][frames][pixels]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CubeShape {
    pub orders: usize,
    pub frames: usize,
    pub pixels: usize,
}

impl CubeShape {
    pub const fn from_grid(grid: GridShape, frames: usize) -> Self {
        Self {
            orders: grid.orders,
            frames,
            pixels: grid.pixels,
        }
    }

    const fn cube_len(&self) -> usize {
        self.orders * self.frames * self.pixels
    }

    const fn plane_len(&self) -> usize {
        self.orders * self.pixels
    }
}

struct Planes {
    shape: CubeShape,
    flux: Box<[UnsafeCell<f64>]>,
    variance: Box<[UnsafeCell<f64>]>,
    counts: Box<[AtomicU32]>,
    wavelengths: Box<[f64]>,
}

// SAFETY: every flux/variance write lands in the (order, frame_slot) row
// owned by exactly one in-flight work item (see the dispatch barrier in
// `build::coordinator`); counters are atomic; wavelengths are immutable
// after allocation.
unsafe impl Send for Planes {}
unsafe impl Sync for Planes {}

/// Owning handle over one build's accumulation planes. Allocate, hand out
/// views, snapshot after the workers are gone, release exactly once.
pub struct SharedBufferSet {
    planes: Option<Arc<Planes>>,
}

/// Non-owning view handed to a worker. Dropping a view never frees the
/// planes; the owning `SharedBufferSet` does.
pub struct BufferView {
    planes: Arc<Planes>,
}

/// Plain copies of the planes, taken by the owner for the reduction stage.
pub struct BufferSnapshot {
    pub flux: Array3<f64>,
    pub variance: Array3<f64>,
    pub counts: Array2<u32>,
    pub wavelengths: Array2<f64>,
}

fn released_error() -> TemplateError {
    TemplateError::Internal("buffer set already released".into())
}

impl SharedBufferSet {
    /// Zero-initialized planes plus the immutable reference wavelength grid.
    pub fn allocate(
        shape: CubeShape,
        reference_wavelengths: &Array2<f64>,
    ) -> TemplateResult<Self> {
        if shape.orders == 0 || shape.frames == 0 || shape.pixels == 0 {
            return Err(TemplateError::Internal(format!(
                "degenerate buffer shape: {} orders, {} frames, {} pixels",
                shape.orders, shape.frames, shape.pixels
            )));
        }
        if reference_wavelengths.dim() != (shape.orders, shape.pixels) {
            return Err(TemplateError::Internal(format!(
                "reference grid shaped {:?} does not match {} orders x {} pixels",
                reference_wavelengths.dim(),
                shape.orders,
                shape.pixels
            )));
        }

        let cube_len = shape.cube_len();
        let plane_len = shape.plane_len();
        let planes = Planes {
            shape,
            flux: (0..cube_len)
                .map(|_| UnsafeCell::new(0.0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            variance: (0..cube_len)
                .map(|_| UnsafeCell::new(0.0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            counts: (0..plane_len)
                .map(|_| AtomicU32::new(0))
                .collect::<Vec<_>>()
                .into_boxed_slice(),
            wavelengths: reference_wavelengths.iter().copied().collect(),
        };

        LIVE_BUFFER_SETS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            planes: Some(Arc::new(planes)),
        })
    }

    pub fn shape(&self) -> TemplateResult<CubeShape> {
        self.planes
            .as_ref()
            .map(|planes| planes.shape)
            .ok_or_else(released_error)
    }

    /// Hand out a non-owning view for one worker.
    pub fn attach(&self) -> TemplateResult<BufferView> {
        let planes = self.planes.as_ref().ok_or_else(released_error)?;
        Ok(BufferView {
            planes: Arc::clone(planes),
        })
    }

    /// Copy the planes out for reduction. Callers must have joined every
    /// worker first; no view may be written concurrently.
    pub fn snapshot(&self) -> TemplateResult<BufferSnapshot> {
        let planes = self.planes.as_ref().ok_or_else(released_error)?;
        let shape = planes.shape;

        let flux = Array3::from_shape_fn(
            (shape.orders, shape.frames, shape.pixels),
            |(order, frame, pixel)| {
                let cell = &planes.flux[(order * shape.frames + frame) * shape.pixels + pixel];
                // SAFETY: all workers have terminated; no writers remain.
                unsafe { *cell.get() }
            },
        );
        let variance = Array3::from_shape_fn(
            (shape.orders, shape.frames, shape.pixels),
            |(order, frame, pixel)| {
                let cell =
                    &planes.variance[(order * shape.frames + frame) * shape.pixels + pixel];
                // SAFETY: as above.
                unsafe { *cell.get() }
            },
        );
        let counts = Array2::from_shape_fn((shape.orders, shape.pixels), |(order, pixel)| {
            planes.counts[order * shape.pixels + pixel].load(Ordering::SeqCst)
        });
        let wavelengths = Array2::from_shape_fn((shape.orders, shape.pixels), |(order, pixel)| {
            planes.wavelengths[order * shape.pixels + pixel]
        });

        Ok(BufferSnapshot {
            flux,
            variance,
            counts,
            wavelengths,
        })
    }

    /// Drop the owning handle. Idempotent: releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.planes.take().is_some() {
            LIVE_BUFFER_SETS.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub fn is_released(&self) -> bool {
        self.planes.is_none()
    }
}

impl Drop for SharedBufferSet {
    fn drop(&mut self) {
        self.release();
    }
}

impl BufferView {
    pub fn pixels_per_order(&self) -> usize {
        self.planes.shape.pixels
    }

    /// Read-only reference wavelengths of one order.
    pub fn reference_wavelengths(&self, order: usize) -> &[f64] {
        let pixels = self.planes.shape.pixels;
        &self.planes.wavelengths[order * pixels..(order + 1) * pixels]
    }

    /// Accumulate interpolated flux and uncertainty at the given reference
    /// pixel positions and bump the contribution counters.
    ///
    /// The caller must hold the work item for `(order, frame_slot)`; the
    /// dispatch protocol guarantees no other task writes the same row.
    pub fn deposit(
        &self,
        order: usize,
        frame_slot: usize,
        positions: &[usize],
        flux: &[f64],
        uncertainties: &[f64],
    ) {
        let shape = self.planes.shape;
        debug_assert!(order < shape.orders && frame_slot < shape.frames);
        let row = (order * shape.frames + frame_slot) * shape.pixels;
        let counts_row = order * shape.pixels;

        for ((&pixel, &value), &uncertainty) in
            positions.iter().zip(flux).zip(uncertainties)
        {
            let flux_cell = &self.planes.flux[row + pixel];
            let variance_cell = &self.planes.variance[row + pixel];
            // SAFETY: this task is the sole writer of the (order, frame_slot)
            // row while its work item is in flight.
            unsafe {
                *flux_cell.get() += value;
                *variance_cell.get() += uncertainty * uncertainty;
            }
            self.planes.counts[counts_row + pixel].fetch_add(1, Ordering::Relaxed);
        }
    }
}
