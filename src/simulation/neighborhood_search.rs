use rstar::{primitives::GeomWithData, Point, RTree};
use tracing::info;

use crate::{
    cell_linked_list::CellLinkedList,
    concurrency::{par_iter_mut0, par_iter_reduce1},
    error::Result,
    floating_type_mod::FT,
    neighborhood::{NeighborBuilder, Neighborhood, ParticleConfiguration},
    particles::ParticleStore,
    search_depth::{SearchDepth, SearchDepthPolicy},
    sph_kernels::DimensionUtils,
    VF,
};

/// Everything one configuration update reads from the source body.
pub struct SearchSource<'a, const D: usize> {
    pub relation: &'a str,
    pub total_real_particles: usize,
    pub position: &'a [VF<D>],
    pub h_ratio: &'a [FT],
}

impl<'a, const D: usize> SearchSource<'a, D> {
    pub fn new(relation: &'a str, particles: &'a ParticleStore<D>) -> Self {
        SearchSource {
            relation,
            total_real_particles: particles.total_real_particles(),
            position: particles.position(),
            h_ratio: particles.h_ratio(),
        }
    }
}

/**
 * Rebuilds the neighborhoods of all real source particles from `target_grid`.
 *
 * Every particle `i` only writes `configuration[i]`, the grid is read-only during the search.
 * `target_h_ratio` is indexed by the target particle ids stored in the grid. Entries past the
 * real particles are reset. Returns the total number of neighbor records.
 */
pub fn search_neighbors_by_particles<DU: DimensionUtils<D>, const D: usize>(
    source: &SearchSource<D>,
    configuration: &mut ParticleConfiguration<D>,
    target_grid: &CellLinkedList<D>,
    target_h_ratio: &[FT],
    search_depth: &SearchDepth,
    builder: &NeighborBuilder<DU, D>,
) -> Result<usize> {
    assert!(
        configuration.len() >= source.total_real_particles,
        "relation '{}': configuration holds {} neighborhoods for {} real particles",
        source.relation,
        configuration.len(),
        source.total_real_particles
    );

    let (active, inactive) = configuration.split_at_mut(source.total_real_particles);
    for neighborhood in inactive {
        neighborhood.reset();
    }

    let position = source.position;
    let h_ratio = source.h_ratio;
    par_iter_reduce1(
        active,
        || Ok(0),
        |a: Result<usize>, b: Result<usize>| -> Result<usize> { Ok(a? + b?) },
        |i, neighborhood: &mut Neighborhood<D>| -> Result<usize> {
            neighborhood.reset();

            let depth = search_depth.search_depth(i, h_ratio);
            assert!(
                depth > 0,
                "relation '{}': non-positive search depth {} for particle {}",
                source.relation,
                depth,
                i
            );

            let p_i = position[i];
            let h_ratio_i = h_ratio[i];
            for (j, p_j) in target_grid.query_range(&p_i, depth) {
                builder.try_add(neighborhood, i, j, p_i - p_j, h_ratio_i, target_h_ratio[j])?;
            }
            Ok(neighborhood.current_size())
        },
    )
}

#[derive(Debug, PartialEq, Clone, Copy)]
struct CustomRTreePoint<const D: usize> {
    p: VF<D>,
}

impl<const D: usize> Point for CustomRTreePoint<D> {
    type Scalar = FT;

    const DIMENSIONS: usize = D;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        CustomRTreePoint {
            p: VF::<D>::from_iterator((0..D).map(|d| generator(d))),
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.p[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.p[index]
    }
}

impl<const D: usize> From<VF<D>> for CustomRTreePoint<D> {
    fn from(p: VF<D>) -> Self {
        CustomRTreePoint { p }
    }
}

type CustomRTreeElem<const D: usize> = GeomWithData<CustomRTreePoint<D>, usize>;

/**
 * SLOW: compares a configuration against an independent R-tree range query over the real
 * and ghost particles of the target.
 *
 * Panics with the offending relation and particle on a missing, extra or duplicate neighbor,
 * or on a self pair in an inner relation.
 */
pub fn check_neighborhood<DU: DimensionUtils<D>, const D: usize>(
    source: &SearchSource<D>,
    configuration: &ParticleConfiguration<D>,
    target: &ParticleStore<D>,
    builder: &NeighborBuilder<DU, D>,
) {
    info!(relation = source.relation, "=====> SLOW: CHECK R-STAR NEIGHBORHOOD <=====");

    let target_position = target.position();
    let target_h_ratio = target.h_ratio();
    let target_min_ratio = (0..target.total_real_particles())
        .chain(target.ghost_range())
        .map(|j| target_h_ratio[j])
        .fold(FT::INFINITY, FT::min);
    let rtree_elems: Vec<_> = (0..target.total_real_particles())
        .chain(target.ghost_range())
        .map(|j| CustomRTreeElem::new(CustomRTreePoint::from(target_position[j]), j))
        .collect();
    let rtree = RTree::<CustomRTreeElem<D>>::bulk_load(rtree_elems);

    par_iter_mut0(source.total_real_particles, |i| {
        let p_i = source.position[i];
        let h_ratio_i = source.h_ratio[i];
        let query_cutoff = builder.cutoff_radius(h_ratio_i, target_min_ratio);

        // widened query, the exact test below decides
        let mut expected: Vec<usize> = rtree
            .locate_within_distance(CustomRTreePoint::from(p_i), query_cutoff * query_cutoff * 1.001)
            .map(|elem| elem.data)
            .filter(|&j| !(builder.skips_self() && i == j))
            .filter(|&j| {
                let cutoff = builder.cutoff_radius(h_ratio_i, target_h_ratio[j]);
                (p_i - target_position[j]).norm_squared() < cutoff * cutoff
            })
            .collect();
        expected.sort_unstable();

        let mut found: Vec<usize> = configuration[i].neighbor_indices().to_vec();
        found.sort_unstable();

        let found_len = found.len();
        found.dedup();
        assert!(
            found_len == found.len(),
            "relation '{}': duplicate neighbor entries for particle {}",
            source.relation,
            i
        );
        assert!(
            !(builder.skips_self() && found.contains(&i)),
            "relation '{}': particle {} is its own neighbor",
            source.relation,
            i
        );
        if expected != found {
            panic!(
                "relation '{}': neighbor mismatch for particle {}\n\texpected={:?}\n\tfound={:?}",
                source.relation, i, expected, found
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        neighborhood::Neighborhood,
        sph_kernels::{DimensionUtils2d, DimensionUtils3d, Kernel},
        vec2f, FixedDepth, V2,
    };
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_store<const D: usize>(seed: u64, n: usize, extent: FT) -> ParticleStore<D> {
        let mut rng = StdRng::seed_from_u64(seed);
        let positions: Vec<VF<D>> = (0..n)
            .map(|_| VF::<D>::from_iterator((0..D).map(|_| rng.gen_range(0.0..extent))))
            .collect();
        ParticleStore::with_uniform_volume("random", positions, 1., 1.).unwrap()
    }

    fn grid_for<const D: usize>(particles: &ParticleStore<D>, extent: FT, cell_size: FT) -> CellLinkedList<D> {
        let mut grid = CellLinkedList::new(VF::<D>::zeros(), VF::<D>::repeat(extent), cell_size).unwrap();
        grid.rebuild(particles);
        grid
    }

    #[test]
    fn grid_search_matches_r_tree_in_2d() {
        let particles = random_store::<2>(7, 400, 1.);
        let kernel = Kernel::<DimensionUtils2d, 2>::new(0.04).unwrap();
        let grid = grid_for(&particles, 1., kernel.cutoff_radius());
        let builder = NeighborBuilder::Inner(kernel);

        let depth: SearchDepth = FixedDepth::default().into();

        let source = SearchSource::new("random-inner", &particles);
        let mut configuration = vec![Neighborhood::new(); particles.real_particles_bound()];
        let total =
            search_neighbors_by_particles(&source, &mut configuration, &grid, particles.h_ratio(), &depth, &builder)
                .unwrap();

        assert!(total > 0);
        assert_eq!(total, configuration.iter().map(|n| n.current_size()).sum::<usize>());
        check_neighborhood(&source, &configuration, &particles, &builder);
    }

    #[test]
    fn grid_search_matches_r_tree_in_3d_with_coarse_cells() {
        let particles = random_store::<3>(11, 300, 1.);
        let kernel = Kernel::<DimensionUtils3d, 3>::new(0.1).unwrap();
        // cells finer than the cutoff need a deeper scan
        let grid = grid_for(&particles, 1., 0.07);
        let builder = NeighborBuilder::Inner(kernel);
        let depth: SearchDepth = crate::ContactDepth::new(kernel.cutoff_radius(), grid.cell_size()).into();
        assert_eq!(depth.constant_depth(), Some(3));

        let source = SearchSource::new("random-inner-3d", &particles);
        let mut configuration = vec![Neighborhood::new(); particles.real_particles_bound()];
        search_neighbors_by_particles(&source, &mut configuration, &grid, particles.h_ratio(), &depth, &builder).unwrap();
        check_neighborhood(&source, &configuration, &particles, &builder);
    }

    #[test]
    fn inactive_neighborhoods_are_reset() {
        let positions: Vec<V2> = vec![vec2f(0.1, 0.1), vec2f(0.16, 0.1), vec2f(0.22, 0.1)];
        let mut particles = ParticleStore::with_uniform_volume("row", positions, 1., 1.).unwrap();
        let kernel = Kernel::<DimensionUtils2d, 2>::new(0.05).unwrap();
        let builder = NeighborBuilder::Inner(kernel);
        let depth: SearchDepth = FixedDepth::default().into();

        let mut configuration = vec![Neighborhood::new(); 3];
        let grid = grid_for(&particles, 1., kernel.cutoff_radius());
        search_neighbors_by_particles(
            &SearchSource::new("row", &particles),
            &mut configuration,
            &grid,
            particles.h_ratio(),
            &depth,
            &builder,
        )
        .unwrap();
        assert_eq!(configuration[2].neighbor_indices(), &[1]);

        particles.remove_entry(0).unwrap();
        let grid = grid_for(&particles, 1., kernel.cutoff_radius());
        search_neighbors_by_particles(
            &SearchSource::new("row", &particles),
            &mut configuration,
            &grid,
            particles.h_ratio(),
            &depth,
            &builder,
        )
        .unwrap();
        assert!(configuration[2].is_empty());
        assert_eq!(configuration[0].neighbor_indices(), &[1]);
    }

    #[test]
    #[should_panic(expected = "neighbor mismatch")]
    fn verification_detects_missing_neighbors() {
        let particles = random_store::<3>(3, 50, 0.2);
        let kernel = Kernel::<DimensionUtils3d, 3>::new(0.1).unwrap();
        let builder = NeighborBuilder::Inner(kernel);
        let configuration: Vec<Neighborhood<3>> = vec![Neighborhood::new(); 50];
        check_neighborhood(&SearchSource::new("empty", &particles), &configuration, &particles, &builder);
    }
}
