use tracing::debug;

use crate::{
    cell_linked_list::CellLinkedList, concurrency::par_sort_by_key, particles::ParticleStore,
    simulation_parameters::SortingKey, V,
};

/// Spreads the bits of `cell` so that `D` coordinates interleave into one Z-order key.
pub fn morton_key<const D: usize>(cell: &V<usize, D>) -> u64 {
    let bits_per_axis = 64 / D.max(1);
    let mut key: u64 = 0;
    for bit in 0..bits_per_axis {
        for d in 0..D {
            key |= (((cell[d] as u64) >> bit) & 1) << (bit * D + d);
        }
    }
    key
}

pub fn sorting_key<const D: usize>(grid: &CellLinkedList<D>, cell: &V<usize, D>, key: SortingKey) -> u64 {
    match key {
        SortingKey::CellMajor => grid.linear_cell_index(cell) as u64,
        SortingKey::Morton => morton_key(cell),
    }
}

/**
 * Reorders the real particles of `particles` along the cell ordering `key` of `grid`.
 *
 * All registered fields and the id maps are permuted together. Ghosts are dropped since their
 * sources move, so the grid and every neighbor list of the body must be rebuilt afterwards.
 * Particles in the same cell keep their relative order.
 */
pub fn sort_particles<const D: usize>(particles: &mut ParticleStore<D>, grid: &CellLinkedList<D>, key: SortingKey) {
    let n = particles.total_real_particles();
    if n <= 1 {
        return;
    }
    particles.clear_ghosts();

    let position = particles.position();
    let mut keyed: Vec<(u64, usize)> = (0..n)
        .map(|i| {
            let cell = grid.cell_index_from_position(&position[i]);
            (sorting_key(grid, &cell, key), i)
        })
        .collect();
    par_sort_by_key(&mut keyed, |&(k, _)| k);

    let order: Vec<usize> = keyed.into_iter().map(|(_, i)| i).collect();
    particles.permute_real_particles(&order);

    debug!(body = particles.body_name(), particles = n, key = ?key, "sorted particles");
}
