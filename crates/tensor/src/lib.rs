//! Sightline - validated tensor views
//!
//! Inference runtimes hand the decoder flat f32 buffers together with a shape
//! descriptor. This crate pairs the two and validates them once at
//! construction, so the decoders can walk anchors with plain stride
//! arithmetic instead of re-checking offsets on every element.

pub use error::{Error, Result};

use ndarray::{ArrayView1, ArrayView2, ArrayView3, ArrayViewD, IxDyn};

mod error;

/// An immutable f32 buffer with an attached shape.
///
/// The buffer is produced externally by an inference call and is never
/// mutated here. `shape.iter().product()` must equal the buffer length; the
/// constructor rejects anything else.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl Tensor {
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        check_shape(shape, data.len())?;
        Ok(Self {
            data,
            shape: shape.to_vec(),
        })
    }

    pub fn view(&self) -> TensorView<'_> {
        TensorView {
            data: &self.data,
            shape: self.shape.clone(),
            strides: row_major_strides(&self.shape),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

/// A borrowed, read-only view over a flat f32 buffer with a shape.
///
/// Element access is row-major strided. The shape/length contract is checked
/// once in [`TensorView::new`]; accessors after that only bounds-check the
/// requested index.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorView<'a> {
    data: &'a [f32],
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl<'a> TensorView<'a> {
    pub fn new(data: &'a [f32], shape: &[usize]) -> Result<Self> {
        check_shape(shape, data.len())?;
        Ok(Self {
            data,
            shape: shape.to_vec(),
            strides: row_major_strides(shape),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[f32] {
        self.data
    }

    /// Strided element access. `index` must name every axis.
    pub fn at(&self, index: &[usize]) -> Result<f32> {
        if index.len() != self.shape.len()
            || index.iter().zip(&self.shape).any(|(i, d)| i >= d)
        {
            return Err(Error::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let offset: usize = index.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
        Ok(self.data[offset])
    }

    /// The contiguous innermost slice for a fixed leading index prefix.
    ///
    /// With shape `[1, 84, 8400]`, `lane(&[0, 5])` is the 8400-element run of
    /// feature 5 across all anchors. Decoders iterate these lanes directly
    /// rather than calling `at` per element.
    pub fn lane(&self, prefix: &[usize]) -> Result<&'a [f32]> {
        if prefix.len() >= self.shape.len()
            || prefix.iter().zip(&self.shape).any(|(i, d)| i >= d)
        {
            return Err(Error::IndexOutOfBounds {
                index: prefix.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let offset: usize = prefix.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
        let len: usize = self.shape[prefix.len()..].iter().product();
        Ok(&self.data[offset..offset + len])
    }

    /// Dynamic-rank ndarray view over the whole buffer.
    pub fn view(&self) -> ArrayViewD<'a, f32> {
        // shape was validated against the buffer at construction
        ArrayViewD::from_shape(IxDyn(&self.shape), self.data).unwrap()
    }

    pub fn view1(&self) -> Result<ArrayView1<'a, f32>> {
        if self.rank() != 1 {
            return Err(Error::RankMismatch {
                expected: 1,
                actual: self.rank(),
            });
        }
        Ok(ArrayView1::from_shape(self.shape[0], self.data).unwrap())
    }

    pub fn view2(&self) -> Result<ArrayView2<'a, f32>> {
        if self.rank() != 2 {
            return Err(Error::RankMismatch {
                expected: 2,
                actual: self.rank(),
            });
        }
        Ok(ArrayView2::from_shape((self.shape[0], self.shape[1]), self.data).unwrap())
    }

    pub fn view3(&self) -> Result<ArrayView3<'a, f32>> {
        if self.rank() != 3 {
            return Err(Error::RankMismatch {
                expected: 3,
                actual: self.rank(),
            });
        }
        Ok(
            ArrayView3::from_shape((self.shape[0], self.shape[1], self.shape[2]), self.data)
                .unwrap(),
        )
    }

    /// Drops every leading axis of size 1. `[1, 84, 8400]` becomes
    /// `[84, 8400]`; a batched tensor with batch > 1 is left untouched.
    pub fn squeeze_leading(&self) -> TensorView<'a> {
        let keep = self
            .shape
            .iter()
            .position(|&d| d != 1)
            .unwrap_or(self.shape.len().saturating_sub(1));
        TensorView {
            data: self.data,
            shape: self.shape[keep..].to_vec(),
            strides: self.strides[keep..].to_vec(),
        }
    }
}

fn check_shape(shape: &[usize], actual: usize) -> Result<()> {
    let expected: usize = shape.iter().product();
    if expected != actual {
        return Err(Error::ShapeMismatch {
            shape: shape.to_vec(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_must_match_buffer() {
        let err = Tensor::from_vec(vec![0.0; 10], &[2, 6]).unwrap_err();
        assert!(matches!(
            err,
            Error::ShapeMismatch {
                expected: 12,
                actual: 10,
                ..
            }
        ));
        assert!(Tensor::from_vec(vec![0.0; 12], &[2, 6]).is_ok());
    }

    #[test]
    fn test_strided_access() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let view = TensorView::new(&data, &[2, 3, 4]).unwrap();
        assert_eq!(view.at(&[0, 0, 0]).unwrap(), 0.0);
        assert_eq!(view.at(&[1, 2, 3]).unwrap(), 23.0);
        assert_eq!(view.at(&[1, 0, 2]).unwrap(), 14.0);
        assert!(view.at(&[2, 0, 0]).is_err());
        assert!(view.at(&[0, 0]).is_err());
    }

    #[test]
    fn test_lane_is_contiguous_suffix() {
        let data: Vec<f32> = (0..24).map(|i| i as f32).collect();
        let view = TensorView::new(&data, &[2, 3, 4]).unwrap();
        assert_eq!(view.lane(&[1, 2]).unwrap(), &[20.0, 21.0, 22.0, 23.0]);
        assert_eq!(view.lane(&[0]).unwrap().len(), 12);
        assert!(view.lane(&[0, 3]).is_err());
    }

    #[test]
    fn test_squeeze_leading() {
        let data = vec![0.0; 12];
        let view = TensorView::new(&data, &[1, 3, 4]).unwrap();
        assert_eq!(view.squeeze_leading().shape(), &[3, 4]);
        let view = TensorView::new(&data, &[1, 1, 12]).unwrap();
        assert_eq!(view.squeeze_leading().shape(), &[12]);
        let view = TensorView::new(&data, &[2, 6]).unwrap();
        assert_eq!(view.squeeze_leading().shape(), &[2, 6]);
    }

    #[test]
    fn test_ndarray_bridge() {
        let data: Vec<f32> = (0..6).map(|i| i as f32).collect();
        let view = TensorView::new(&data, &[2, 3]).unwrap();
        let arr = view.view2().unwrap();
        assert_eq!(arr[[1, 2]], 5.0);
        assert!(view.view3().is_err());
        assert_eq!(view.view().shape(), &[2, 3]);
    }
}
