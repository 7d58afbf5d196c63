pub mod body;
pub mod cell_linked_list;
pub mod concurrency;
pub mod error;
pub mod neighborhood;
pub mod neighborhood_search;
pub mod particle_sorting;
pub mod particles;
pub mod periodic;
pub mod probe;
pub mod relation;
pub mod search_depth;
pub mod simulation_parameters;
pub mod sph_kernels;
pub mod system;

#[cfg(feature = "double-precision")]
pub mod floating_type_mod {
    pub type FT = f64;
    pub use std::f64::consts::PI;
}

#[cfg(not(feature = "double-precision"))]
pub mod floating_type_mod {
    pub type FT = f32;
    pub use std::f32::consts::PI;
}

use floating_type_mod::FT;

use nalgebra::SVector;
use num_traits::Float;
use std::fmt::Display;

pub type V<T, const D: usize> = SVector<T, D>;

pub type VF<const D: usize> = V<FT, D>;

pub type V2 = V<FT, 2>;
pub type V3 = V<FT, 3>;

pub fn vec2f(x: FT, y: FT) -> V<FT, 2> {
    [x, y].into()
}

pub fn vec3f(x: FT, y: FT, z: FT) -> V<FT, 3> {
    [x, y, z].into()
}

/// Floor applied to inter-particle distances before they are used as a divisor.
pub const DISTANCE_EPSILON: FT = 1.0e-6;

/// Floor applied to kernel weight sums in interpolating consumers.
pub const WEIGHT_EPSILON: FT = 1.0e-6;

pub fn is_ft_approx_eq<F: Float>(a: F, b: F, tolerance: F) -> bool {
    assert!(!a.is_nan());
    assert!(!b.is_nan());
    b <= a + tolerance && b >= a - tolerance
}

pub fn assert_ft_approx_eq<F: Float + Display>(a: F, b: F, tolerance: F, s: impl FnOnce() -> String) {
    if !is_ft_approx_eq(a, b, tolerance) {
        panic!(
            "{} value not equal with a tolerance of {}:\n\ta={}\n\tb={}\n",
            s(),
            tolerance,
            a,
            b
        );
    }
}

pub use body::{Body, BodyId};
pub use cell_linked_list::{CellLinkedList, CellRange};
pub use error::{Result, TopologyError};
pub use neighborhood::{ContactParticleConfiguration, Neighborhood, ParticleConfiguration};
pub use particles::ParticleStore;
pub use relation::{ComplexRelation, ContactRelation, InnerRelation, Relation, RelationId, UpdatePolicy};
pub use search_depth::{AdaptiveDepth, ContactDepth, FixedDepth, SearchDepth, SearchDepthPolicy};
pub use simulation_parameters::{BodyParams, SortingKey, SystemParams, TopologyConfig};
pub use sph_kernels::{DimensionUtils, DimensionUtils2d, DimensionUtils3d, Kernel};
pub use system::{SimulationContext, SphSystem};
