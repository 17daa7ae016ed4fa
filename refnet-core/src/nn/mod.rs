pub mod activations;
pub mod affine;
pub mod gradcheck;
pub mod loss;
pub mod network;

use crate::backends::{Scalar, Tensor};
use crate::error::Result;

use serde::{Deserialize, Serialize};

/// Exponent beyond which `exp` overflows double precision.
pub const EXP_CLAMP: f64 = 709.0;

/// Added inside `ln` so that a zero probability does not yield `-inf`.
pub const LOG_EPSILON: f64 = 1e-7;

/// A single-input layer with a hand-derived backward pass.
///
/// `backward` consumes the gradient of the loss with respect to the output of
/// the most recent `forward` and returns the gradient with respect to its input.
pub trait Layer<T, B>
where
    T: Scalar,
    B: Tensor<T>,
{
    fn forward(&mut self, input: &B) -> Result<B>;
    fn backward(&mut self, upstream_gradient: &B) -> Result<B>;
    fn name(&self) -> &'static str;
}

/// Numerical guards shared by the sigmoid and softmax layers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NumericConfig {
    pub exp_clamp: f64,
    pub log_epsilon: f64,
}

impl NumericConfig {
    pub fn exp_clamp<T: Scalar>(&self) -> T {
        T::from_f64(self.exp_clamp).unwrap_or_else(T::max_value)
    }

    pub fn log_epsilon<T: Scalar>(&self) -> T {
        T::from_f64(self.log_epsilon).unwrap_or_else(T::epsilon)
    }
}

impl Default for NumericConfig {
    fn default() -> Self {
        Self {
            exp_clamp: EXP_CLAMP,
            log_epsilon: LOG_EPSILON,
        }
    }
}
