//! Finite-difference checks for the hand-derived backward passes.

use super::Layer;
use crate::backends::{Scalar, Tensor};
use crate::error::{NnError, Result};

use rayon::prelude::*;

/// Denominator floor for [`relative_error`]; below it differences are
/// compared on an absolute scale.
const ERROR_FLOOR: f64 = 1e-4;

/// Centered difference `(f(x + h) - f(x - h)) / 2h` for every element of `x`.
///
/// Elements are perturbed one at a time on private copies of `x`, so the
/// evaluation order does not affect the result.
pub fn numerical_gradient<T, B, F>(f: F, x: &B, h: T) -> Result<B>
where
    T: Scalar,
    B: Tensor<T> + Sync,
    F: Fn(&B) -> Result<T> + Sync,
{
    let two_h = h + h;

    let grads = (0..x.size())
        .into_par_iter()
        .map(|i| {
            let plus = perturbed(x, i, h);
            let minus = perturbed(x, i, -h);
            Ok((f(&plus)? - f(&minus)?) / two_h)
        })
        .collect::<Result<Vec<T>>>()?;

    B::from_shape_vec(&x.shape(), grads)
}

fn perturbed<T, B>(x: &B, index: usize, delta: T) -> B
where
    T: Scalar,
    B: Tensor<T>,
{
    let mut copy = x.clone();
    if let Some(v) = copy.iter_mut().nth(index) {
        *v = *v + delta;
    }
    copy
}

/// Largest elementwise `|a - n| / max(|a| + |n|, 1e-4)`.
pub fn relative_error<T, B>(analytic: &B, numerical: &B) -> Result<T>
where
    T: Scalar,
    B: Tensor<T>,
{
    if analytic.shape() != numerical.shape() {
        return Err(NnError::shape(
            "relative_error",
            format!("{:?}", analytic.shape()),
            &numerical.shape(),
        ));
    }

    let floor = T::from_f64(ERROR_FLOOR).unwrap_or_else(T::epsilon);
    Ok(analytic
        .iter()
        .zip(numerical.iter())
        .map(|(&a, &n)| (a - n).abs() / (a.abs() + n.abs()).max(floor))
        .fold(T::zero(), T::max))
}

/// Compares a layer's input gradient against finite differences of
/// `sum(forward(x) * probe)`, whose exact gradient is `backward(probe)`.
pub fn check_layer<T, B, L>(layer: &L, input: &B, probe: &B, h: T) -> Result<T>
where
    T: Scalar,
    B: Tensor<T> + Sync,
    L: Layer<T, B> + Clone + Sync,
{
    let mut analytic_layer = layer.clone();
    analytic_layer.forward(input)?;
    let analytic = analytic_layer.backward(probe)?;

    let numerical = numerical_gradient(
        |x: &B| {
            let mut scratch = layer.clone();
            Ok(scratch.forward(x)?.mul(probe)?.sum())
        },
        input,
        h,
    )?;

    let error = relative_error(&analytic, &numerical)?;
    tracing::debug!(layer = layer.name(), error = ?error, "gradient check");
    Ok(error)
}
