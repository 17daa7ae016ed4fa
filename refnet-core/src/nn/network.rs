use super::activations::Sigmoid;
use super::affine::Affine;
use super::gradcheck::numerical_gradient;
use super::loss::SoftmaxWithLoss;
use super::NumericConfig;
use crate::backends::{Scalar, Tensor};
use crate::error::Result;

use tracing::{debug, trace};

/// Gradients of the loss with respect to the affine parameters and the
/// network input.
#[derive(Debug, Clone, PartialEq)]
pub struct NetGradients<B> {
    pub weights: B,
    pub bias: B,
    pub input: B,
}

/// Two-layer reference network: Affine -> Sigmoid -> SoftmaxWithLoss.
#[derive(Debug, Clone)]
pub struct TestNet<T, B> {
    affine: Affine<T, B>,
    sigmoid: Sigmoid<T, B>,
    loss: SoftmaxWithLoss<T, B>,
}

impl<T, B> TestNet<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    pub fn new(weights: B, bias: B) -> Result<Self> {
        Self::with_config(weights, bias, NumericConfig::default())
    }

    pub fn with_config(weights: B, bias: B, config: NumericConfig) -> Result<Self> {
        Ok(Self {
            affine: Affine::new(weights, bias)?,
            sigmoid: Sigmoid::with_config(config),
            loss: SoftmaxWithLoss::with_config(config),
        })
    }

    pub fn affine(&self) -> &Affine<T, B> {
        &self.affine
    }

    pub fn affine_mut(&mut self) -> &mut Affine<T, B> {
        &mut self.affine
    }

    pub fn sigmoid(&self) -> &Sigmoid<T, B> {
        &self.sigmoid
    }

    pub fn loss_layer(&self) -> &SoftmaxWithLoss<T, B> {
        &self.loss
    }

    /// Runs the pipeline and returns the mean cross-entropy loss.
    pub fn forward(&mut self, input: &B, target: &B) -> Result<T> {
        let a = self.affine.forward(input)?;
        trace!(layer = "Affine", shape = ?a.shape(), "forward");

        let z = self.sigmoid.forward(&a);
        trace!(layer = "Sigmoid", shape = ?z.shape(), "forward");

        let loss = self.loss.forward(&z, target)?;
        debug!(batch = input.shape()[0], loss = ?loss, "TestNet forward");
        Ok(loss)
    }

    /// Back-propagates from the loss and returns the gradient with respect
    /// to the network input. Parameter gradients stay on the affine layer.
    pub fn backward(&mut self) -> Result<B> {
        let dx3 = self.loss.backward()?;
        trace!(layer = "SoftmaxWithLoss", shape = ?dx3.shape(), "backward");

        let dx2 = self.sigmoid.backward(&dx3)?;
        trace!(layer = "Sigmoid", shape = ?dx2.shape(), "backward");

        let dx1 = self.affine.backward(&dx2)?;
        debug!(shape = ?dx1.shape(), "TestNet backward");
        Ok(dx1)
    }

    /// `(dW, db)` from the most recent backward.
    pub fn gradients(&self) -> Option<(&B, &B)> {
        Some((self.affine.weights_grad()?, self.affine.bias_grad()?))
    }

    /// Finite-difference gradients of the loss at `(input, target)`.
    ///
    /// Evaluated on clones; the cached state of `self` is left untouched.
    pub fn numerical_gradients(&self, input: &B, target: &B, h: T) -> Result<NetGradients<B>>
    where
        B: Sync,
    {
        let weights = numerical_gradient(
            |w: &B| {
                let mut net = self.clone();
                *net.affine.weights_mut() = w.clone();
                net.forward(input, target)
            },
            self.affine.weights(),
            h,
        )?;

        let bias = numerical_gradient(
            |b: &B| {
                let mut net = self.clone();
                *net.affine.bias_mut() = b.clone();
                net.forward(input, target)
            },
            self.affine.bias(),
            h,
        )?;

        let input_grad = numerical_gradient(|x: &B| self.clone().forward(x, target), input, h)?;

        Ok(NetGradients {
            weights,
            bias,
            input: input_grad,
        })
    }
}
