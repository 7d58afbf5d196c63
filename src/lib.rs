/*!
Cell-linked-list neighbor search and particle topology maintenance for
smoothed-particle hydrodynamics.

Bodies own their particle store and spatial grid, relations own the per-particle
neighbor lists that physics kernels read.
*/

mod simulation;

pub use simulation::*;
