use super::{Layer, NumericConfig};
use crate::backends::{Scalar, Tensor};
use crate::error::{NnError, Result};

use std::marker::PhantomData;

pub fn sigmoid<T, B>(x: &B) -> B
where
    T: Scalar,
    B: Tensor<T>,
{
    sigmoid_with(x, &NumericConfig::default())
}

/// Logistic function with inputs at or below `-exp_clamp` pinned to
/// `-exp_clamp`, so `exp(-x)` stays finite and the output saturates to 0.
pub fn sigmoid_with<T, B>(x: &B, config: &NumericConfig) -> B
where
    T: Scalar,
    B: Tensor<T>,
{
    let floor = -config.exp_clamp::<T>();
    x.mapv(|v| {
        let v = if v <= floor { floor } else { v };
        T::one() / (T::one() + (-v).exp())
    })
}

pub fn softmax_vector<T, B>(a: &B) -> Result<B>
where
    T: Scalar,
    B: Tensor<T>,
{
    softmax_vector_with(a, &NumericConfig::default())
}

/// Softmax of a single unbatched score vector.
pub fn softmax_vector_with<T, B>(a: &B, config: &NumericConfig) -> Result<B>
where
    T: Scalar,
    B: Tensor<T>,
{
    if a.ndim() != 1 {
        return Err(NnError::shape("softmax_vector", "1-d vector", &a.shape()));
    }

    let ceiling = config.exp_clamp::<T>();
    let c = a.max();
    let exps = a.mapv(|v| clamp_above(v - c, ceiling).exp());
    let sum = exps.sum();
    Ok(exps.div_scalar(sum))
}

pub fn softmax_batch<T, B>(a: &B) -> Result<B>
where
    T: Scalar,
    B: Tensor<T>,
{
    softmax_batch_with(a, &NumericConfig::default())
}

/// Row-wise softmax of a (batch, classes) matrix. Every row is normalized on
/// its own and sums to one.
pub fn softmax_batch_with<T, B>(a: &B, config: &NumericConfig) -> Result<B>
where
    T: Scalar,
    B: Tensor<T>,
{
    if a.ndim() != 2 {
        return Err(NnError::shape("softmax_batch", "2-d (batch, classes) matrix", &a.shape()));
    }

    let ceiling = config.exp_clamp::<T>();

    // Subtract the per-row max before exponentiating
    let row_max = a.max_axis(1)?.insert_axis(1)?;
    let exps = a.sub(&row_max)?.mapv(|v| clamp_above(v, ceiling)).exp();

    let row_sum = exps.sum_axis(1)?.insert_axis(1)?;
    exps.div(&row_sum)
}

fn clamp_above<T: Scalar>(v: T, ceiling: T) -> T {
    if v >= ceiling {
        ceiling
    } else {
        v
    }
}

/// Sigmoid activation layer. Caches its output, since the derivative is
/// `y * (1 - y)`.
#[derive(Debug, Clone)]
pub struct Sigmoid<T, B> {
    config: NumericConfig,
    output: Option<B>,
    dtype: PhantomData<T>,
}

impl<T, B> Sigmoid<T, B>
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
            dtype: PhantomData,
        }
    }

    pub fn output(&self) -> Option<&B> {
        self.output.as_ref()
    }

    pub fn forward(&mut self, input: &B) -> B {
        let out = sigmoid_with(input, &self.config);
        self.output = Some(out.clone());
        out
    }

    pub fn backward(&mut self, upstream_gradient: &B) -> Result<B> {
        let output = self.output.as_ref().ok_or(NnError::State { layer: "Sigmoid" })?;

        if upstream_gradient.shape() != output.shape() {
            return Err(NnError::shape(
                "Sigmoid::backward",
                format!("{:?}", output.shape()),
                &upstream_gradient.shape(),
            ));
        }

        let one_minus_y = output.mapv(|y| T::one() - y);
        upstream_gradient.mul(&one_minus_y)?.mul(output)
    }
}

impl<T, B> Default for Sigmoid<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, B> Layer<T, B> for Sigmoid<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    fn forward(&mut self, input: &B) -> Result<B> {
        Ok(Sigmoid::forward(self, input))
    }

    fn backward(&mut self, upstream_gradient: &B) -> Result<B> {
        Sigmoid::backward(self, upstream_gradient)
    }

    fn name(&self) -> &'static str {
        "Sigmoid"
    }
}
