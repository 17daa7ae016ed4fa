pub mod cpu;

use crate::error::Result;

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use num_traits::{Float, FromPrimitive};
use rand::distributions::uniform::SampleUniform;

/// Element type a tensor can hold. Implemented for `f32` and `f64`.
pub trait Scalar:
    'static + Float + FromPrimitive + SampleUniform + std::iter::Sum + std::fmt::Debug + Send + Sync
{
}

impl<T> Scalar for T where
    T: 'static + Float + FromPrimitive + SampleUniform + std::iter::Sum + std::fmt::Debug + Send + Sync
{
}

/// Dense numeric array used by the layers.
///
/// Elementwise operations follow numpy broadcasting rules and report a
/// `ShapeMismatch` instead of panicking when shapes are incompatible.
pub trait Tensor<T: Scalar>: Sized + Clone {
    fn new(data: ArrayD<T>) -> Self;
    fn from_shape_vec(shape: &[usize], values: Vec<T>) -> Result<Self>;
    fn view(&self) -> ArrayViewD<T>;
    fn get_data(&self) -> &ArrayD<T>;

    fn shape(&self) -> Vec<usize>;
    fn ndim(&self) -> usize;
    fn size(&self) -> usize;
    fn reshape(&self, shape: &[usize]) -> Result<Self>;
    fn transpose(&self) -> Self;
    fn insert_axis(&self, axis: usize) -> Result<Self>;

    fn matmul(&self, other: &Self) -> Result<Self>;
    fn add(&self, other: &Self) -> Result<Self>;
    fn sub(&self, other: &Self) -> Result<Self>;
    fn mul(&self, other: &Self) -> Result<Self>;
    fn div(&self, other: &Self) -> Result<Self>;

    fn mul_scalar(&self, scalar: T) -> Self;
    fn div_scalar(&self, scalar: T) -> Self;
    fn add_scalar(&self, scalar: T) -> Self;
    fn mapv<F: Fn(T) -> T>(&self, f: F) -> Self;
    fn exp(&self) -> Self;
    fn ln(&self) -> Self;

    fn max_axis(&self, axis: usize) -> Result<Self>;
    fn sum_axis(&self, axis: usize) -> Result<Self>;
    fn max(&self) -> T;
    fn sum(&self) -> T;

    fn zeros(shape: &[usize]) -> Self;
    fn random(shape: &[usize]) -> Self;

    fn iter(&self) -> ndarray::iter::Iter<'_, T, IxDyn>;
    fn iter_mut(&mut self) -> ndarray::iter::IterMut<'_, T, IxDyn>;
}
