use super::{Scalar, Tensor};
use crate::error::{NnError, Result};

use ndarray::linalg::general_mat_mul;
use ndarray::{Array, Array2, ArrayD, ArrayViewD, Axis, Ix2, IxDyn, Zip};
use serde::{Deserialize, Serialize};

use rand::Rng;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuTensor<T> {
    pub data: ArrayD<T>,
}

/// Common shape of two operands under numpy broadcasting, if any.
pub fn broadcast_shape(lhs: &[usize], rhs: &[usize]) -> Option<Vec<usize>> {
    let ndim = lhs.len().max(rhs.len());
    let mut shape = Vec::with_capacity(ndim);

    for i in 0..ndim {
        let from_end = ndim - i;
        let l = lhs.len().checked_sub(from_end).map_or(1, |j| lhs[j]);
        let r = rhs.len().checked_sub(from_end).map_or(1, |j| rhs[j]);
        let dim = match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => return None,
        };
        shape.push(dim);
    }

    Some(shape)
}

impl<T: Scalar> CpuTensor<T> {
    fn zip_with<F>(&self, other: &Self, op: &'static str, f: F) -> Result<Self>
    where
        F: Fn(T, T) -> T,
    {
        let mismatch = || {
            NnError::shape(
                op,
                format!("shape broadcastable with {:?}", self.data.shape()),
                other.data.shape(),
            )
        };

        let shape = broadcast_shape(self.data.shape(), other.data.shape()).ok_or_else(mismatch)?;
        let lhs = self.data.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;
        let rhs = other.data.broadcast(IxDyn(&shape)).ok_or_else(mismatch)?;

        let data = Zip::from(&lhs).and(&rhs).map_collect(|&a, &b| f(a, b));
        Ok(Self { data })
    }

    fn check_axis(&self, op: &'static str, axis: usize) -> Result<()> {
        if axis < self.data.ndim() {
            Ok(())
        } else {
            Err(NnError::shape(op, format!("tensor with axis {}", axis), self.data.shape()))
        }
    }
}

impl<T: Scalar> Tensor<T> for CpuTensor<T> {
    fn new(data: ArrayD<T>) -> Self {
        Self { data }
    }

    fn from_shape_vec(shape: &[usize], values: Vec<T>) -> Result<Self> {
        let len = values.len();
        let data = ArrayD::from_shape_vec(IxDyn(shape), values).map_err(|_| {
            NnError::shape(
                "from_shape_vec",
                format!("{} values", shape.iter().product::<usize>()),
                &[len],
            )
        })?;
        Ok(Self { data })
    }

    fn view(&self) -> ArrayViewD<T> {
        self.data.view()
    }

    fn get_data(&self) -> &ArrayD<T> {
        &self.data
    }

    fn shape(&self) -> Vec<usize> {
        self.data.shape().to_vec()
    }

    fn ndim(&self) -> usize {
        self.data.ndim()
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn reshape(&self, shape: &[usize]) -> Result<Self> {
        // iterate in logical order so transposed views reshape correctly
        Self::from_shape_vec(shape, self.data.iter().copied().collect())
    }

    fn transpose(&self) -> Self {
        Self { data: self.data.clone().reversed_axes() }
    }

    fn insert_axis(&self, axis: usize) -> Result<Self> {
        if axis > self.data.ndim() {
            return Err(NnError::shape(
                "insert_axis",
                format!("axis <= {}", self.data.ndim()),
                self.data.shape(),
            ));
        }
        Ok(Self { data: self.data.clone().insert_axis(Axis(axis)) })
    }

    fn matmul(&self, other: &Self) -> Result<Self> {
        let first = self
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| NnError::shape("matmul", "2-d left operand", self.data.shape()))?;
        let second = other
            .data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| NnError::shape("matmul", "2-d right operand", other.data.shape()))?;

        if first.ncols() != second.nrows() {
            return Err(NnError::shape(
                "matmul",
                format!("right operand with {} rows", first.ncols()),
                other.data.shape(),
            ));
        }

        let mut result_data = Array2::<T>::zeros((first.nrows(), second.ncols()));
        general_mat_mul(T::one(), &first, &second, T::zero(), &mut result_data);
        Ok(Self { data: result_data.into_dyn() })
    }

    fn add(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "add", |a, b| a + b)
    }

    fn sub(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "sub", |a, b| a - b)
    }

    fn mul(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "mul", |a, b| a * b)
    }

    fn div(&self, other: &Self) -> Result<Self> {
        self.zip_with(other, "div", |a, b| a / b)
    }

    fn mul_scalar(&self, scalar: T) -> Self {
        Self { data: self.data.mapv(|x| x * scalar) }
    }

    fn div_scalar(&self, scalar: T) -> Self {
        Self { data: self.data.mapv(|x| x / scalar) }
    }

    fn add_scalar(&self, scalar: T) -> Self {
        Self { data: self.data.mapv(|x| x + scalar) }
    }

    fn mapv<F: Fn(T) -> T>(&self, f: F) -> Self {
        Self { data: self.data.mapv(f) }
    }

    fn exp(&self) -> Self {
        self.mapv(T::exp)
    }

    fn ln(&self) -> Self {
        self.mapv(T::ln)
    }

    fn max_axis(&self, axis: usize) -> Result<Self> {
        self.check_axis("max_axis", axis)?;
        let data = self.data.fold_axis(Axis(axis), T::neg_infinity(), |&a, &b| a.max(b));
        Ok(Self { data })
    }

    fn sum_axis(&self, axis: usize) -> Result<Self> {
        self.check_axis("sum_axis", axis)?;
        Ok(Self { data: self.data.sum_axis(Axis(axis)) })
    }

    fn max(&self) -> T {
        self.data.iter().fold(T::neg_infinity(), |a, &b| a.max(b))
    }

    fn sum(&self) -> T {
        self.data.iter().copied().sum()
    }

    fn zeros(shape: &[usize]) -> Self {
        Self { data: Array::zeros(shape).into_dyn() }
    }

    fn random(shape: &[usize]) -> Self {
        let mut rng = rand::thread_rng();
        let data = Array::<T, IxDyn>::from_shape_fn(IxDyn(shape), |_| rng.gen_range(-T::one()..T::one()));
        Self { data }
    }

    fn iter(&self) -> ndarray::iter::Iter<'_, T, IxDyn> {
        self.data.iter()
    }

    fn iter_mut(&mut self) -> ndarray::iter::IterMut<'_, T, IxDyn> {
        self.data.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_broadcast_shape() {
        assert_eq!(broadcast_shape(&[2, 3], &[1, 3]), Some(vec![2, 3]));
        assert_eq!(broadcast_shape(&[2, 3], &[3]), Some(vec![2, 3]));
        assert_eq!(broadcast_shape(&[2, 1], &[1, 4]), Some(vec![2, 4]));
        assert_eq!(broadcast_shape(&[2, 3], &[2]), None);
    }

    #[test]
    fn test_matmul() {
        let a = CpuTensor::new(array![[1.0, 2.0], [3.0, 4.0]].into_dyn());
        let b = CpuTensor::new(array![[5.0], [6.0]].into_dyn());
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.get_data(), &array![[17.0], [39.0]].into_dyn());
    }

    #[test]
    fn test_matmul_shape_mismatch() {
        let a = CpuTensor::<f64>::zeros(&[2, 3]);
        let b = CpuTensor::<f64>::zeros(&[2, 3]);
        assert!(matches!(a.matmul(&b), Err(NnError::ShapeMismatch { op: "matmul", .. })));

        let v = CpuTensor::<f64>::zeros(&[3]);
        assert!(v.matmul(&b).is_err());
    }

    #[test]
    fn test_broadcast_add() {
        let a = CpuTensor::new(array![[1.0, 2.0], [3.0, 4.0]].into_dyn());
        let bias = CpuTensor::new(array![[10.0, 20.0]].into_dyn());
        let out = a.add(&bias).unwrap();
        assert_eq!(out.get_data(), &array![[11.0, 22.0], [13.0, 24.0]].into_dyn());

        let bad = CpuTensor::new(array![1.0, 2.0, 3.0].into_dyn());
        assert!(a.add(&bad).is_err());
    }

    #[test]
    fn test_reductions() {
        let a = CpuTensor::new(array![[1.0, 5.0], [7.0, 2.0]].into_dyn());
        assert_eq!(a.max_axis(1).unwrap().get_data(), &array![5.0, 7.0].into_dyn());
        assert_eq!(a.sum_axis(0).unwrap().get_data(), &array![8.0, 7.0].into_dyn());
        assert_eq!(a.max(), 7.0);
        assert_eq!(a.sum(), 15.0);
        assert!(a.sum_axis(2).is_err());
    }

    #[test]
    fn test_reshape_after_transpose() {
        let a = CpuTensor::new(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn());
        let flat = a.transpose().reshape(&[6]).unwrap();
        assert_eq!(flat.get_data(), &array![1.0, 4.0, 2.0, 5.0, 3.0, 6.0].into_dyn());
        assert!(a.reshape(&[4]).is_err());
    }

    #[test]
    fn test_random_range() {
        let r = CpuTensor::<f32>::random(&[4, 8]);
        assert_eq!(r.shape(), vec![4, 8]);
        assert!(r.iter().all(|&v| (-1.0..1.0).contains(&v)));
    }
}
