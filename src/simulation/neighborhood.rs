use tracing::warn;

use crate::{
    error::{Result, TopologyError},
    floating_type_mod::FT,
    sph_kernels::{DimensionUtils, Kernel},
    VF, DISTANCE_EPSILON,
};

const INITIAL_NEIGHBOR_CAPACITY: usize = 16;

/**
 * Neighbor records of one particle, stored as parallel arrays.
 *
 * The arrays are `allocated_size` long, only the first `current_size` entries are valid.
 * `reset` keeps the allocation so that the next configuration update reuses it.
 */
#[derive(Debug, Clone)]
pub struct Neighborhood<const D: usize> {
    current_size: usize,
    j: Vec<usize>,
    w_ij: Vec<FT>,
    dw_ij: Vec<FT>,
    r_ij: Vec<FT>,
    e_ij: Vec<VF<D>>,
}

/// One neighborhood per particle slot of the source body.
pub type ParticleConfiguration<const D: usize> = Vec<Neighborhood<D>>;

/// One particle configuration per contact body.
pub type ContactParticleConfiguration<const D: usize> = Vec<ParticleConfiguration<D>>;

impl<const D: usize> Default for Neighborhood<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const D: usize> Neighborhood<D> {
    pub fn new() -> Self {
        Neighborhood {
            current_size: 0,
            j: Vec::new(),
            w_ij: Vec::new(),
            dw_ij: Vec::new(),
            r_ij: Vec::new(),
            e_ij: Vec::new(),
        }
    }

    pub fn current_size(&self) -> usize {
        self.current_size
    }

    pub fn allocated_size(&self) -> usize {
        self.j.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current_size == 0
    }

    pub fn neighbor_index(&self, n: usize) -> usize {
        self.neighbor_indices()[n]
    }

    pub fn kernel_value(&self, n: usize) -> FT {
        self.kernel_values()[n]
    }

    /// dW/dr of neighbor `n`.
    pub fn kernel_gradient(&self, n: usize) -> FT {
        self.kernel_gradients()[n]
    }

    pub fn distance(&self, n: usize) -> FT {
        self.distances()[n]
    }

    /// Unit vector pointing from neighbor `n` towards the particle.
    pub fn unit_direction(&self, n: usize) -> VF<D> {
        self.unit_directions()[n]
    }

    /// Kernel gradient vector `dW/dr * e_ij`.
    pub fn kernel_gradient_vector(&self, n: usize) -> VF<D> {
        self.unit_directions()[n] * self.kernel_gradients()[n]
    }

    pub fn neighbor_indices(&self) -> &[usize] {
        &self.j[..self.current_size]
    }

    pub fn kernel_values(&self) -> &[FT] {
        &self.w_ij[..self.current_size]
    }

    pub fn kernel_gradients(&self) -> &[FT] {
        &self.dw_ij[..self.current_size]
    }

    pub fn distances(&self) -> &[FT] {
        &self.r_ij[..self.current_size]
    }

    pub fn unit_directions(&self) -> &[VF<D>] {
        &self.e_ij[..self.current_size]
    }

    pub fn contains(&self, j: usize) -> bool {
        self.neighbor_indices().contains(&j)
    }

    /// Forgets all records without releasing memory.
    pub fn reset(&mut self) {
        self.current_size = 0;
    }

    fn grow(&mut self) -> Result<()> {
        let allocated = self.allocated_size();
        let new_size = (allocated * 2).max(INITIAL_NEIGHBOR_CAPACITY);
        let additional = new_size - allocated;

        (|| {
            self.j.try_reserve_exact(additional)?;
            self.w_ij.try_reserve_exact(additional)?;
            self.dw_ij.try_reserve_exact(additional)?;
            self.r_ij.try_reserve_exact(additional)?;
            self.e_ij.try_reserve_exact(additional)
        })()
        .map_err(|source| TopologyError::Allocation {
            what: "neighborhood",
            source,
        })?;

        self.j.resize(new_size, 0);
        self.w_ij.resize(new_size, 0.);
        self.dw_ij.resize(new_size, 0.);
        self.r_ij.resize(new_size, 0.);
        self.e_ij.resize(new_size, VF::<D>::zeros());
        Ok(())
    }

    pub fn push(&mut self, j: usize, w_ij: FT, dw_ij: FT, r_ij: FT, e_ij: VF<D>) -> Result<()> {
        if self.current_size == self.allocated_size() {
            self.grow()?;
        }
        let n = self.current_size;
        self.j[n] = j;
        self.w_ij[n] = w_ij;
        self.dw_ij[n] = dw_ij;
        self.r_ij[n] = r_ij;
        self.e_ij[n] = e_ij;
        self.current_size += 1;
        Ok(())
    }
}

/// Resizes `configuration` to `len` particle slots, keeping existing neighborhoods untouched.
///
/// Slots past `active` (inactive buffer particles) are reset so they never expose stale records.
pub fn resize_configuration<const D: usize>(
    configuration: &mut ParticleConfiguration<D>,
    len: usize,
    active: usize,
) -> Result<()> {
    if len > configuration.len() {
        configuration
            .try_reserve(len - configuration.len())
            .map_err(|source| TopologyError::Allocation {
                what: "particle configuration",
                source,
            })?;
    }
    configuration.resize_with(len, Neighborhood::new);
    for neighborhood in configuration.iter_mut().skip(active) {
        neighborhood.reset();
    }
    Ok(())
}

/**
 * Decides whether a candidate pair is a neighbor and computes its record.
 *
 * `Inner` and `InnerAdaptive` skip self pairs, the contact builders do not. The adaptive
 * builders evaluate the kernel with `h_ref / ratio` where `ratio` is the smaller smoothing length
 * ratio of the pair, so the larger of the two kernels decides. For `InnerAdaptive` this keeps the
 * relation symmetric. `ContactAdaptive` compares against the fixed ratio of the target body's
 * reference smoothing length.
 */
pub enum NeighborBuilder<DU: DimensionUtils<D>, const D: usize> {
    Inner(Kernel<DU, D>),
    InnerAdaptive(Kernel<DU, D>),
    Contact(Kernel<DU, D>),
    ContactAdaptive { kernel: Kernel<DU, D>, target_ratio: FT },
}

impl<DU: DimensionUtils<D>, const D: usize> Clone for NeighborBuilder<DU, D> {
    fn clone(&self) -> Self {
        match self {
            NeighborBuilder::Inner(kernel) => NeighborBuilder::Inner(*kernel),
            NeighborBuilder::InnerAdaptive(kernel) => NeighborBuilder::InnerAdaptive(*kernel),
            NeighborBuilder::Contact(kernel) => NeighborBuilder::Contact(*kernel),
            NeighborBuilder::ContactAdaptive { kernel, target_ratio } => NeighborBuilder::ContactAdaptive {
                kernel: *kernel,
                target_ratio: *target_ratio,
            },
        }
    }
}

impl<DU: DimensionUtils<D>, const D: usize> NeighborBuilder<DU, D> {
    pub fn kernel(&self) -> &Kernel<DU, D> {
        match self {
            NeighborBuilder::Inner(kernel)
            | NeighborBuilder::InnerAdaptive(kernel)
            | NeighborBuilder::Contact(kernel)
            | NeighborBuilder::ContactAdaptive { kernel, .. } => kernel,
        }
    }

    /// Smoothing length ratio the pair `(i, j)` is evaluated with.
    pub fn pair_ratio(&self, h_ratio_i: FT, h_ratio_j: FT) -> FT {
        match self {
            NeighborBuilder::Inner(_) | NeighborBuilder::Contact(_) => 1.,
            NeighborBuilder::InnerAdaptive(_) => h_ratio_i.min(h_ratio_j),
            NeighborBuilder::ContactAdaptive { target_ratio, .. } => h_ratio_i.min(*target_ratio),
        }
    }

    pub fn smoothing_length(&self, h_ratio_i: FT, h_ratio_j: FT) -> FT {
        self.kernel()
            .smoothing_length_with_ratio(self.pair_ratio(h_ratio_i, h_ratio_j))
    }

    pub fn cutoff_radius(&self, h_ratio_i: FT, h_ratio_j: FT) -> FT {
        self.smoothing_length(h_ratio_i, h_ratio_j) * Kernel::<DU, D>::SUPPORT_RADIUS_BY_SMOOTHING_LENGTH
    }

    pub(crate) fn skips_self(&self) -> bool {
        matches!(self, NeighborBuilder::Inner(_) | NeighborBuilder::InnerAdaptive(_))
    }

    /// Appends `j` to `neighborhood` if `|displacement| < cutoff`. Returns whether it was added.
    #[inline(always)]
    pub fn try_add(
        &self,
        neighborhood: &mut Neighborhood<D>,
        i: usize,
        j: usize,
        displacement: VF<D>,
        h_ratio_i: FT,
        h_ratio_j: FT,
    ) -> Result<bool> {
        if self.skips_self() && i == j {
            return Ok(false);
        }

        let h = self.smoothing_length(h_ratio_i, h_ratio_j);
        let cutoff = h * Kernel::<DU, D>::SUPPORT_RADIUS_BY_SMOOTHING_LENGTH;
        let r_sq = displacement.norm_squared();
        if r_sq >= cutoff * cutoff {
            return Ok(false);
        }

        let r = r_sq.sqrt();
        if r < DISTANCE_EPSILON {
            warn!(i, j, r, "coincident particles in neighbor search");
        }
        let e = displacement / r.max(DISTANCE_EPSILON);
        let kernel = self.kernel();
        neighborhood.push(j, kernel.w(r, h), kernel.dw(r, h), r, e)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_ft_approx_eq, sph_kernels::DimensionUtils2d, vec2f};

    fn kernel() -> Kernel<DimensionUtils2d, 2> {
        Kernel::new(1.).unwrap()
    }

    #[test]
    fn push_doubles_capacity_and_reset_keeps_it() {
        let mut neighborhood = Neighborhood::<2>::new();
        assert_eq!(neighborhood.allocated_size(), 0);

        for j in 0..INITIAL_NEIGHBOR_CAPACITY + 1 {
            neighborhood.push(j, 1., -1., 0.5, vec2f(1., 0.)).unwrap();
        }
        assert_eq!(neighborhood.current_size(), INITIAL_NEIGHBOR_CAPACITY + 1);
        assert_eq!(neighborhood.allocated_size(), 2 * INITIAL_NEIGHBOR_CAPACITY);
        assert_eq!(neighborhood.neighbor_index(INITIAL_NEIGHBOR_CAPACITY), INITIAL_NEIGHBOR_CAPACITY);

        neighborhood.reset();
        assert!(neighborhood.is_empty());
        assert!(neighborhood.neighbor_indices().is_empty());
        assert_eq!(neighborhood.allocated_size(), 2 * INITIAL_NEIGHBOR_CAPACITY);

        neighborhood.push(7, 0.25, -0.5, 1.5, vec2f(0., -1.)).unwrap();
        assert_eq!(neighborhood.neighbor_indices(), &[7]);
        assert_eq!(neighborhood.kernel_gradient_vector(0), vec2f(0., 0.5));
    }

    #[test]
    fn builder_stores_kernel_record() {
        let builder = NeighborBuilder::Inner(kernel());
        let mut neighborhood = Neighborhood::new();

        assert!(builder.try_add(&mut neighborhood, 0, 1, vec2f(0.6, 0.8), 1., 1.).unwrap());
        assert_eq!(neighborhood.current_size(), 1);
        assert_eq!(neighborhood.neighbor_index(0), 1);
        assert_ft_approx_eq(neighborhood.kernel_value(0), kernel().w(1., 1.), 1.0e-5, || "W".to_string());
        assert_ft_approx_eq(neighborhood.kernel_gradient(0), kernel().dw(1., 1.), 1.0e-5, || "dW".to_string());
        assert_ft_approx_eq(neighborhood.distance(0), 1., 1.0e-5, || "distance".to_string());
        let e = neighborhood.unit_direction(0);
        assert_ft_approx_eq(e.norm(), 1., 1.0e-5, || "unit direction".to_string());
        assert!(e.x > 0. && e.y > 0.);
    }

    #[test]
    fn cutoff_is_exclusive() {
        let builder = NeighborBuilder::Contact(kernel());
        let mut neighborhood = Neighborhood::new();
        assert!(!builder.try_add(&mut neighborhood, 0, 0, vec2f(2., 0.), 1., 1.).unwrap());
        assert!(builder.try_add(&mut neighborhood, 0, 0, vec2f(1.999, 0.), 1., 1.).unwrap());
        assert_eq!(neighborhood.current_size(), 1);
    }

    #[test]
    fn self_pairs_are_skipped_for_inner_builders_only() {
        let mut neighborhood = Neighborhood::new();
        assert!(!NeighborBuilder::Inner(kernel())
            .try_add(&mut neighborhood, 3, 3, vec2f(0., 0.), 1., 1.)
            .unwrap());
        assert!(!NeighborBuilder::InnerAdaptive(kernel())
            .try_add(&mut neighborhood, 3, 3, vec2f(0., 0.), 1., 1.)
            .unwrap());
        assert!(NeighborBuilder::Contact(kernel())
            .try_add(&mut neighborhood, 3, 3, vec2f(0., 0.), 1., 1.)
            .unwrap());
    }

    #[test]
    fn coincident_distinct_particles_get_finite_direction() {
        let mut neighborhood = Neighborhood::new();
        NeighborBuilder::Inner(kernel())
            .try_add(&mut neighborhood, 0, 1, vec2f(0., 0.), 1., 1.)
            .unwrap();
        let e = neighborhood.unit_direction(0);
        assert!(e.x.is_finite() && e.y.is_finite());
        assert_eq!(neighborhood.distance(0), 0.);
    }

    #[test]
    fn adaptive_builder_uses_the_larger_kernel_of_the_pair() {
        let builder = NeighborBuilder::InnerAdaptive(kernel());
        assert_eq!(builder.cutoff_radius(1., 1.), 2.);
        assert_eq!(builder.cutoff_radius(2., 2.), 1.);
        assert_eq!(builder.cutoff_radius(2., 0.5), 4.);
        assert_eq!(builder.cutoff_radius(0.5, 2.), 4.);

        let mut neighborhood = Neighborhood::new();
        assert!(!builder.try_add(&mut neighborhood, 0, 1, vec2f(1.5, 0.), 2., 2.).unwrap());
        // the coarse neighbor widens the fine particle's cutoff
        assert!(builder.try_add(&mut neighborhood, 0, 1, vec2f(1.5, 0.), 2., 1.).unwrap());
        assert!(builder.try_add(&mut neighborhood, 0, 1, vec2f(3., 0.), 2., 0.5).unwrap());
        assert_eq!(neighborhood.kernel_value(1), kernel().w(3., 2.));

        // both directions produce the same record
        let mut reverse = Neighborhood::new();
        assert!(builder.try_add(&mut reverse, 1, 0, vec2f(-3., 0.), 0.5, 2.).unwrap());
        assert_eq!(reverse.kernel_value(0), neighborhood.kernel_value(1));
        assert_eq!(reverse.kernel_gradient(0), neighborhood.kernel_gradient(1));
    }

    #[test]
    fn adaptive_contact_builder_is_bounded_by_the_target_kernel() {
        let builder = NeighborBuilder::ContactAdaptive {
            kernel: kernel(),
            target_ratio: 2.,
        };
        // fine source particles fall back to the target's kernel, coarse ones widen it
        assert_eq!(builder.cutoff_radius(4., 0.), 1.);
        assert_eq!(builder.cutoff_radius(1., 0.), 2.);
        assert_eq!(builder.cutoff_radius(0.5, 0.), 4.);
        assert!(!builder.clone().skips_self());

        let mut neighborhood = Neighborhood::new();
        assert!(builder.try_add(&mut neighborhood, 3, 3, vec2f(0.9, 0.), 4., 1.).unwrap());
        assert!(!builder.try_add(&mut neighborhood, 3, 4, vec2f(1.1, 0.), 4., 1.).unwrap());
        assert!(builder.try_add(&mut neighborhood, 3, 5, vec2f(3.5, 0.), 0.5, 1.).unwrap());
        assert_eq!(neighborhood.neighbor_indices(), &[3, 5]);
    }

    #[test]
    fn configuration_growth_keeps_existing_entries() {
        let mut configuration: ParticleConfiguration<2> = vec![Neighborhood::new(); 2];
        configuration[1].push(0, 1., -1., 0.1, vec2f(1., 0.)).unwrap();

        resize_configuration(&mut configuration, 5, 3).unwrap();
        assert_eq!(configuration.len(), 5);
        assert_eq!(configuration[1].neighbor_indices(), &[0]);
        assert!(configuration[2].is_empty());

        configuration[4].push(1, 1., -1., 0.1, vec2f(1., 0.)).unwrap();
        resize_configuration(&mut configuration, 5, 4).unwrap();
        assert!(configuration[4].is_empty());
        assert_eq!(configuration[1].current_size(), 1);
    }
}
