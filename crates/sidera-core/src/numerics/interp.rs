#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpolationError {
    #[error("interpolation grid must be strictly increasing (violation at index {0})")]
    NonMonotonicGrid(usize),
    #[error("interpolation needs at least two samples, got {0}")]
    TooFewSamples(usize),
    #[error("sample arrays disagree in length: {xs} abscissae, {ys} ordinates")]
    LengthMismatch { xs: usize, ys: usize },
    #[error("target {target} outside the sample span [{lower}, {upper}]")]
    OutOfRange { target: f64, lower: f64, upper: f64 },
}

/// Order-preserving 1-D linear interpolation of `(xs, ys)` onto `targets`.
///
/// `xs` must be strictly increasing and every target must fall inside its
/// span; both conditions are checked so that malformed source data fails
/// loudly instead of extrapolating.
pub fn linear_interpolate(
    xs: &[f64],
    ys: &[f64],
    targets: &[f64],
) -> Result<Vec<f64>, InterpolationError> {
    if xs.len() != ys.len() {
        return Err(InterpolationError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }
    if xs.len() < 2 {
        return Err(InterpolationError::TooFewSamples(xs.len()));
    }
    if let Some(index) = xs.windows(2).position(|pair| pair[1] <= pair[0]) {
        return Err(InterpolationError::NonMonotonicGrid(index));
    }

    let lower = xs[0];
    let upper = xs[xs.len() - 1];
    let mut interpolated = Vec::with_capacity(targets.len());

    for &target in targets {
        if target < lower || target > upper {
            return Err(InterpolationError::OutOfRange {
                target,
                lower,
                upper,
            });
        }
        // index of the first sample strictly above the target; the segment
        // [right - 1, right] brackets it
        let right = xs.partition_point(|&x| x <= target).min(xs.len() - 1);
        let left = right - 1;
        let fraction = (target - xs[left]) / (xs[right] - xs[left]);
        interpolated.push(ys[left] + fraction * (ys[right] - ys[left]));
    }

    Ok(interpolated)
}
