use tracing::trace;

use crate::{
    concurrency::par_iter_mut1, error::Result, floating_type_mod::FT, particles::ParticleStore,
    simulation_parameters::PeriodicAxisParams, VF,
};

/// Periodic wrap of one axis onto `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBoundary {
    pub axis: usize,
    pub lower: FT,
    pub upper: FT,
}

impl From<&PeriodicAxisParams> for PeriodicBoundary {
    fn from(params: &PeriodicAxisParams) -> Self {
        PeriodicBoundary {
            axis: params.axis,
            lower: params.lower,
            upper: params.upper,
        }
    }
}

impl PeriodicBoundary {
    pub fn period(&self) -> FT {
        self.upper - self.lower
    }

    /// Wraps real particles that left the periodic range back into it.
    pub fn bound_positions<const D: usize>(&self, particles: &mut ParticleStore<D>) {
        let boundary = *self;
        let period = self.period();
        let total_real = particles.total_real_particles();
        par_iter_mut1(&mut particles.fields.position[..total_real], |_, position| {
            let x = &mut position[boundary.axis];
            if *x < boundary.lower {
                *x += period;
            } else if *x >= boundary.upper {
                *x -= period;
            }
        });
    }

    /**
     * Inserts a shifted image for every particle within `cutoff` of either face.
     *
     * Existing ghosts are mirrored too, so applying the boundaries of several axes one after
     * another produces the corner images. Returns the number of ghosts created.
     */
    pub fn create_ghosts<const D: usize>(&self, particles: &mut ParticleStore<D>, cutoff: FT) -> Result<usize> {
        let period = self.period();
        let candidates: Vec<usize> = (0..particles.total_real_particles())
            .chain(particles.ghost_range())
            .collect();

        let mut created = 0;
        for source in candidates {
            let x = particles.position()[source][self.axis];
            let shift = if x < self.lower + cutoff {
                period
            } else if x >= self.upper - cutoff {
                -period
            } else {
                continue;
            };

            let ghost = particles.insert_ghost(source)?;
            particles.fields.position[ghost][self.axis] += shift;
            trace!(axis = self.axis, source, ghost, "created periodic ghost");
            created += 1;
        }
        Ok(created)
    }

    /// Whole periods between a ghost and its source along this axis.
    fn image_shift<const D: usize>(&self, ghost: &VF<D>, source: &VF<D>) -> FT {
        let period = self.period();
        ((ghost[self.axis] - source[self.axis]) / period).round() * period
    }
}

/// Refreshes every ghost from its real source, keeping the periodic shift of its image.
pub fn update_ghosts<const D: usize>(particles: &mut ParticleStore<D>, boundaries: &[PeriodicBoundary]) {
    for ghost in particles.ghost_range() {
        let source = particles.sorted_id()[ghost];
        let mut shift = VF::<D>::zeros();
        for boundary in boundaries {
            shift[boundary.axis] =
                boundary.image_shift(&particles.position()[ghost], &particles.position()[source]);
        }
        particles.copy_particle(ghost, source);
        particles.fields.position[ghost] += shift;
    }
}
