use super::activations::{softmax_batch_with, softmax_vector_with};
use super::{NumericConfig, LOG_EPSILON};
use crate::backends::{Scalar, Tensor};
use crate::error::{NnError, Result};

use std::marker::PhantomData;

fn check_same_shape<T, B>(op: &'static str, y: &B, t: &B) -> Result<()>
where
    T: Scalar,
    B: Tensor<T>,
{
    if y.shape() == t.shape() {
        Ok(())
    } else {
        Err(NnError::shape(op, format!("target of shape {:?}", y.shape()), &t.shape()))
    }
}

/// Summed cross entropy `-sum(t * ln(y + 1e-7))`, not averaged over a batch.
pub fn cross_entropy_error<T, B>(y: &B, t: &B) -> Result<T>
where
    T: Scalar,
    B: Tensor<T>,
{
    check_same_shape("cross_entropy_error", y, t)?;
    let epsilon = T::from_f64(LOG_EPSILON).unwrap_or_else(T::epsilon);
    Ok(-t.mul(&y.add_scalar(epsilon).ln())?.sum())
}

/// `0.5 * sum((y - t)^2)`
pub fn mean_squared_error<T, B>(y: &B, t: &B) -> Result<T>
where
    T: Scalar,
    B: Tensor<T>,
{
    check_same_shape("mean_squared_error", y, t)?;
    let half = T::from_f64(0.5).unwrap_or_else(T::zero);
    Ok(half * y.sub(t)?.mapv(|d| d * d).sum())
}

/// Softmax followed by cross entropy, folded into one layer so that the
/// backward pass reduces to `(y - t) / batch_size`.
///
/// A 2-d input is a batch of rows and the loss is averaged over the rows. A
/// 1-d input is a single unbatched example with batch size one.
#[derive(Debug, Clone)]
pub struct SoftmaxWithLoss<T, B> {
    config: NumericConfig,
    output: Option<B>,
    target: Option<B>,
    batch_size: usize,
    dtype: PhantomData<T>,
}

impl<T, B> SoftmaxWithLoss<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    pub fn new() -> Self {
        Self::with_config(NumericConfig::default())
    }

    pub fn with_config(config: NumericConfig) -> Self {
        Self {
            config,
            output: None,
            target: None,
            batch_size: 0,
            dtype: PhantomData,
        }
    }

    /// Softmax probabilities from the last forward.
    pub fn output(&self) -> Option<&B> {
        self.output.as_ref()
    }

    pub fn target(&self) -> Option<&B> {
        self.target.as_ref()
    }

    /// A failed forward leaves the layer without cached state, so a following
    /// `backward` reports `NnError::State`.
    pub fn forward(&mut self, input: &B, target: &B) -> Result<T> {
        self.output = None;
        self.target = None;
        check_same_shape("SoftmaxWithLoss::forward", input, target)?;

        let (y, batch_size) = match input.ndim() {
            1 => (softmax_vector_with(input, &self.config)?, 1),
            2 if input.shape()[0] > 0 => (softmax_batch_with(input, &self.config)?, input.shape()[0]),
            _ => {
                return Err(NnError::shape(
                    "SoftmaxWithLoss::forward",
                    "1-d vector or non-empty 2-d batch",
                    &input.shape(),
                ))
            }
        };

        let epsilon = self.config.log_epsilon::<T>();
        let total = target.mul(&y.add_scalar(epsilon).ln())?.sum();
        let loss = -total / batch_size_as::<T>(batch_size);

        self.output = Some(y);
        self.target = Some(target.clone());
        self.batch_size = batch_size;

        Ok(loss)
    }

    pub fn backward(&mut self) -> Result<B> {
        let (y, t) = match (&self.output, &self.target) {
            (Some(y), Some(t)) => (y, t),
            _ => return Err(NnError::State { layer: "SoftmaxWithLoss" }),
        };

        Ok(y.sub(t)?.div_scalar(batch_size_as::<T>(self.batch_size)))
    }
}

impl<T, B> Default for SoftmaxWithLoss<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    fn default() -> Self {
        Self::new()
    }
}

fn batch_size_as<T: Scalar>(batch_size: usize) -> T {
    T::from_usize(batch_size).unwrap_or_else(T::one)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::cpu::CpuTensor;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_softmax_with_loss_single_row() {
        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        let z = CpuTensor::new(array![[0.6681877721681662, 0.8807970779778823]].into_dyn());
        let t = CpuTensor::new(array![[0.0, 1.0]].into_dyn());

        let loss = layer.forward(&z, &t).unwrap();
        assert_relative_eq!(loss, 0.5924820762704769, epsilon = 1e-12);

        let dx = layer.backward().unwrap();
        assert_relative_eq!(dx.get_data()[[0, 0]], 0.44704699175409246, epsilon = 1e-12);
        assert_relative_eq!(dx.get_data()[[0, 1]], -0.44704699175409246, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_with_loss_averages_over_batch() {
        let x = CpuTensor::new(array![[0.3, 2.9, 4.0], [0.3, 2.9, 4.0]].into_dyn());
        let t = CpuTensor::new(array![[0.0, 0.0, 1.0], [0.0, 0.0, 1.0]].into_dyn());

        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        let loss = layer.forward(&x, &t).unwrap();
        assert_relative_eq!(loss, -(0.7365969137693786_f64 + 1e-7).ln(), epsilon = 1e-12);

        let dx = layer.backward().unwrap();
        let y = layer.output().unwrap();
        for i in 0..2 {
            for j in 0..3 {
                let expected = (y.get_data()[[i, j]] - t.get_data()[[i, j]]) / 2.0;
                assert_relative_eq!(dx.get_data()[[i, j]], expected, epsilon = 1e-15);
            }
        }
    }

    #[test]
    fn test_softmax_with_loss_vector_is_single_example() {
        let x = CpuTensor::new(array![0.3, 2.9, 4.0].into_dyn());
        let t = CpuTensor::new(array![0.0, 1.0, 0.0].into_dyn());

        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        let loss = layer.forward(&x, &t).unwrap();
        assert_relative_eq!(loss, -(0.24519181293507392_f64 + 1e-7).ln(), epsilon = 1e-12);

        let dx = layer.backward().unwrap();
        assert_eq!(dx.shape(), vec![3]);
        assert_relative_eq!(dx.get_data()[1], 0.24519181293507392 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_softmax_with_loss_non_negative() {
        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        for _ in 0..10 {
            let x = CpuTensor::<f64>::random(&[8, 5]).mul_scalar(10.0);
            let raw = CpuTensor::<f64>::random(&[8, 5]).mapv(f64::abs);
            let t = raw.div(&raw.sum_axis(1).unwrap().insert_axis(1).unwrap()).unwrap();
            assert!(layer.forward(&x, &t).unwrap() >= 0.0);
        }
    }

    #[test]
    fn test_softmax_with_loss_zero_probability_is_finite() {
        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        let x = CpuTensor::new(array![[0.0, -1000.0]].into_dyn());
        let t = CpuTensor::new(array![[0.0, 1.0]].into_dyn());
        let loss = layer.forward(&x, &t).unwrap();
        assert!(loss.is_finite());
        assert_relative_eq!(loss, -(1e-7_f64).ln(), epsilon = 1e-9);
    }

    #[test]
    fn test_softmax_with_loss_errors() {
        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        assert_eq!(layer.backward(), Err(NnError::State { layer: "SoftmaxWithLoss" }));

        let x = CpuTensor::<f64>::zeros(&[2, 3]);
        assert!(layer.forward(&x, &CpuTensor::zeros(&[2, 2])).is_err());
        assert!(layer.forward(&CpuTensor::zeros(&[0, 3]), &CpuTensor::zeros(&[0, 3])).is_err());
        assert!(layer.forward(&CpuTensor::zeros(&[1, 2, 3]), &CpuTensor::zeros(&[1, 2, 3])).is_err());
    }

    #[test]
    fn test_failed_forward_clears_cached_state() {
        let mut layer = SoftmaxWithLoss::<f64, CpuTensor<f64>>::new();
        let x = CpuTensor::new(array![[0.7, 2.0]].into_dyn());
        let t = CpuTensor::new(array![[0.0, 1.0]].into_dyn());
        layer.forward(&x, &t).unwrap();
        assert!(layer.backward().is_ok());

        let bad_target = CpuTensor::<f64>::zeros(&[1, 3]);
        assert!(layer.forward(&x, &bad_target).is_err());
        assert!(layer.output().is_none());
        assert_eq!(layer.backward(), Err(NnError::State { layer: "SoftmaxWithLoss" }));
    }

    #[test]
    fn test_standalone_losses() {
        let y = CpuTensor::new(array![0.1, 0.05, 0.6, 0.0, 0.05, 0.1, 0.0, 0.1, 0.0, 0.0].into_dyn());
        let t = CpuTensor::new(array![0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0].into_dyn());

        assert_relative_eq!(cross_entropy_error(&y, &t).unwrap(), 0.510825457099338, epsilon = 1e-9);
        assert_relative_eq!(mean_squared_error(&y, &t).unwrap(), 0.0975, epsilon = 1e-12);

        let short = CpuTensor::<f64>::zeros(&[3]);
        assert!(cross_entropy_error(&y, &short).is_err());
        assert!(mean_squared_error(&y, &short).is_err());
    }
}
