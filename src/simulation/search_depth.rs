use enum_dispatch::enum_dispatch;

use crate::floating_type_mod::FT;

/// Number of grid cells scanned around a particle's own cell.
#[enum_dispatch]
pub trait SearchDepthPolicy {
    fn search_depth(&self, particle_index: usize, h_ratio: &[FT]) -> i32;

    /// The depth if it does not depend on the particle.
    fn constant_depth(&self) -> Option<i32>;
}

fn depth_for(cutoff_radius: FT, cell_size: FT) -> i32 {
    // saturates for non-finite ratios
    (1. + (cutoff_radius / cell_size).floor()).min(i32::MAX as FT) as i32
}

/// Constant depth, one cell for a cutoff radius no larger than the cell size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDepth {
    depth: i32,
}

impl FixedDepth {
    pub fn new(depth: i32) -> Self {
        FixedDepth { depth }
    }
}

impl Default for FixedDepth {
    fn default() -> Self {
        FixedDepth { depth: 1 }
    }
}

impl SearchDepthPolicy for FixedDepth {
    #[inline(always)]
    fn search_depth(&self, _particle_index: usize, _h_ratio: &[FT]) -> i32 {
        self.depth
    }

    fn constant_depth(&self) -> Option<i32> {
        Some(self.depth)
    }
}

/// `1 + floor(cutoff / target_cell_size)`, computed once for a relation into another body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContactDepth {
    depth: i32,
}

impl ContactDepth {
    pub fn new(cutoff_radius: FT, target_cell_size: FT) -> Self {
        ContactDepth {
            depth: depth_for(cutoff_radius, target_cell_size),
        }
    }
}

impl SearchDepthPolicy for ContactDepth {
    #[inline(always)]
    fn search_depth(&self, _particle_index: usize, _h_ratio: &[FT]) -> i32 {
        self.depth
    }

    fn constant_depth(&self) -> Option<i32> {
        Some(self.depth)
    }
}

/**
 * `1 + floor(cutoff(min(h_ratio_i, neighbor_ratio)) / cell_size)`, recomputed for every particle
 * and search.
 *
 * `neighbor_ratio` is the smallest smoothing length ratio a neighbor can have. Pairs are evaluated
 * with the larger of the two kernels, so the scan has to reach the cutoff of the coarsest possible
 * partner.
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveDepth {
    reference_cutoff_radius: FT,
    cell_size: FT,
    neighbor_ratio: FT,
}

impl AdaptiveDepth {
    pub fn new(reference_cutoff_radius: FT, cell_size: FT) -> Self {
        AdaptiveDepth {
            reference_cutoff_radius,
            cell_size,
            neighbor_ratio: FT::INFINITY,
        }
    }

    pub fn with_neighbor_ratio(self, neighbor_ratio: FT) -> Self {
        AdaptiveDepth { neighbor_ratio, ..self }
    }

    pub fn neighbor_ratio(&self) -> FT {
        self.neighbor_ratio
    }
}

impl SearchDepthPolicy for AdaptiveDepth {
    #[inline(always)]
    fn search_depth(&self, particle_index: usize, h_ratio: &[FT]) -> i32 {
        let ratio = h_ratio[particle_index].min(self.neighbor_ratio);
        depth_for(self.reference_cutoff_radius / ratio, self.cell_size)
    }

    fn constant_depth(&self) -> Option<i32> {
        None
    }
}

#[enum_dispatch(SearchDepthPolicy)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchDepth {
    FixedDepth,
    ContactDepth,
    AdaptiveDepth,
}
