use std::marker::PhantomData;

use crate::{
    error::{Result, TopologyError},
    floating_type_mod::{FT, PI},
};

/**
 * Cubic spline shape function with q = r / (2h), zero for q >= 1.
 */
pub fn cubic_kernel_unnormalized(q: FT) -> FT {
    if q < 0.5 {
        6. * (q * q * q - q * q) + 1.
    } else if q < 1. {
        let v = 1. - q;
        2. * (v * v * v)
    } else {
        0.
    }
}

pub fn cubic_kernel_unnormalized_deriv(q: FT) -> FT {
    if q < 0.5 {
        18. * q * q - 12. * q
    } else if q < 1. {
        let v = 1. - q;
        -6. * v * v
    } else {
        0.
    }
}

// Sync is needed since we use this trait inside parallel iterators
pub trait DimensionUtils<const D: usize>: Sync + Send + 'static {
    /// Normalisation factor of the cubic spline for smoothing length `h`.
    fn kernel_normalization(h: FT) -> FT;
}

pub enum DimensionUtils2d {}
impl DimensionUtils<2> for DimensionUtils2d {
    fn kernel_normalization(h: FT) -> FT {
        10. / (7. * PI * (h * h))
    }
}

pub enum DimensionUtils3d {}
impl DimensionUtils<3> for DimensionUtils3d {
    fn kernel_normalization(h: FT) -> FT {
        1. / (PI * (h * h * h))
    }
}

/// Cubic spline kernel of one body, support radius `2h`.
///
/// Local resolution is expressed by a smoothing length ratio `h_ratio = h_ref / h_local`,
/// so a ratio below one means a larger kernel.
pub struct Kernel<DU: DimensionUtils<D>, const D: usize> {
    h: FT,
    _dimension: PhantomData<DU>,
}

impl<DU: DimensionUtils<D>, const D: usize> Clone for Kernel<DU, D> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<DU: DimensionUtils<D>, const D: usize> Copy for Kernel<DU, D> {}

impl<DU: DimensionUtils<D>, const D: usize> std::fmt::Debug for Kernel<DU, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel").field("D", &D).field("h", &self.h).finish()
    }
}

impl<DU: DimensionUtils<D>, const D: usize> Kernel<DU, D> {
    pub const SUPPORT_RADIUS_BY_SMOOTHING_LENGTH: FT = 2.;

    pub fn new(smoothing_length: FT) -> Result<Self> {
        if !(smoothing_length.is_finite() && smoothing_length > 0.) {
            return Err(TopologyError::InvalidConfig(format!(
                "smoothing length must be positive and finite, got {}",
                smoothing_length
            )));
        }
        Ok(Kernel {
            h: smoothing_length,
            _dimension: PhantomData,
        })
    }

    pub fn smoothing_length(&self) -> FT {
        self.h
    }

    pub fn cutoff_radius(&self) -> FT {
        self.h * Self::SUPPORT_RADIUS_BY_SMOOTHING_LENGTH
    }

    pub fn smoothing_length_with_ratio(&self, h_ratio: FT) -> FT {
        self.h / h_ratio
    }

    pub fn cutoff_radius_with_ratio(&self, h_ratio: FT) -> FT {
        self.cutoff_radius() / h_ratio
    }

    pub fn w(&self, r: FT, h: FT) -> FT {
        DU::kernel_normalization(h) * cubic_kernel_unnormalized(r / (Self::SUPPORT_RADIUS_BY_SMOOTHING_LENGTH * h))
    }

    /// dW/dr, non-positive inside the support.
    pub fn dw(&self, r: FT, h: FT) -> FT {
        let support = Self::SUPPORT_RADIUS_BY_SMOOTHING_LENGTH * h;
        DU::kernel_normalization(h) * cubic_kernel_unnormalized_deriv(r / support) / support
    }
}
