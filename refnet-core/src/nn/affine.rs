use super::Layer;
use crate::backends::{Scalar, Tensor};
use crate::error::{NnError, Result};

use std::marker::PhantomData;

/// Fully connected layer computing `x·W + b`.
///
/// `W` is (in_features, out_features) and `b` is (1, out_features), broadcast
/// over the batch. Parameters are supplied by the caller; after `backward` the
/// gradients are available through [`Affine::weights_grad`] and
/// [`Affine::bias_grad`] for an external optimizer.
#[derive(Debug, Clone)]
pub struct Affine<T, B> {
    weights: B,
    bias: B,
    input: Option<B>,
    weights_grad: Option<B>,
    bias_grad: Option<B>,
    dtype: PhantomData<T>,
}

impl<T, B> Affine<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    pub fn new(weights: B, bias: B) -> Result<Self> {
        if weights.ndim() != 2 {
            return Err(NnError::shape("Affine::new", "2-d weight matrix", &weights.shape()));
        }

        let out_features = weights.shape()[1];
        let bias = match bias.shape().as_slice() {
            [n] if *n == out_features => bias.reshape(&[1, out_features])?,
            [1, n] if *n == out_features => bias,
            other => {
                return Err(NnError::shape(
                    "Affine::new",
                    format!("bias of shape [1, {}]", out_features),
                    other,
                ))
            }
        };

        Ok(Self {
            weights,
            bias,
            input: None,
            weights_grad: None,
            bias_grad: None,
            dtype: PhantomData,
        })
    }

    pub fn in_features(&self) -> usize {
        self.weights.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weights.shape()[1]
    }

    pub fn weights(&self) -> &B {
        &self.weights
    }

    pub fn bias(&self) -> &B {
        &self.bias
    }

    /// Mutable access for optimizers. Shapes must be preserved.
    pub fn weights_mut(&mut self) -> &mut B {
        &mut self.weights
    }

    pub fn bias_mut(&mut self) -> &mut B {
        &mut self.bias
    }

    pub fn weights_grad(&self) -> Option<&B> {
        self.weights_grad.as_ref()
    }

    pub fn bias_grad(&self) -> Option<&B> {
        self.bias_grad.as_ref()
    }

    pub fn forward(&mut self, input: &B) -> Result<B> {
        self.input = None;
        let shape = input.shape();
        if shape.len() != 2 || shape[1] != self.in_features() {
            return Err(NnError::shape(
                "Affine::forward",
                format!("[batch, {}]", self.in_features()),
                &shape,
            ));
        }

        let result = input.matmul(&self.weights)?.add(&self.bias)?;
        self.input = Some(input.clone());
        Ok(result)
    }

    pub fn backward(&mut self, upstream_gradient: &B) -> Result<B> {
        let input = self.input.as_ref().ok_or(NnError::State { layer: "Affine" })?;

        let batch_size = input.shape()[0];
        if upstream_gradient.shape() != [batch_size, self.out_features()] {
            return Err(NnError::shape(
                "Affine::backward",
                format!("[{}, {}]", batch_size, self.out_features()),
                &upstream_gradient.shape(),
            ));
        }

        let input_grad = upstream_gradient.matmul(&self.weights.transpose())?;
        let weights_grad = input.transpose().matmul(upstream_gradient)?;
        // bias is broadcast in forward, so its gradient sums over the batch
        let bias_grad = upstream_gradient.sum_axis(0)?.insert_axis(0)?;

        self.weights_grad = Some(weights_grad);
        self.bias_grad = Some(bias_grad);

        Ok(input_grad)
    }
}

impl<T, B> Layer<T, B> for Affine<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    fn forward(&mut self, input: &B) -> Result<B> {
        Affine::forward(self, input)
    }

    fn backward(&mut self, upstream_gradient: &B) -> Result<B> {
        Affine::backward(self, upstream_gradient)
    }

    fn name(&self) -> &'static str {
        "Affine"
    }
}
