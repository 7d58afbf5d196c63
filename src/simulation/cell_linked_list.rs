use tracing::debug;

use crate::{
    error::{Result, TopologyError},
    floating_type_mod::FT,
    particles::ParticleStore,
    V, VF,
};

/// A particle index together with its position at the time it was inserted.
pub type ListData<const D: usize> = (usize, VF<D>);

/// Uniform grid over the body domain, every cell holds the particles inside it.
///
/// Buckets are only valid for the positions at the last `rebuild`; moving particles afterwards
/// leaves them stale until the next rebuild.
pub struct CellLinkedList<const D: usize> {
    lower_bound: VF<D>,
    cell_size: FT,
    inv_cell_size: FT,
    number_of_cells: V<usize, D>,
    cells: Vec<Vec<ListData<D>>>,
}

impl<const D: usize> CellLinkedList<D> {
    pub fn new(lower_bound: VF<D>, upper_bound: VF<D>, cell_size: FT) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.) {
            return Err(TopologyError::InvalidConfig(format!(
                "cell size must be positive and finite, got {}",
                cell_size
            )));
        }

        let mut number_of_cells = V::<usize, D>::zeros();
        let mut total_cells: usize = 1;
        for d in 0..D {
            let extent = upper_bound[d] - lower_bound[d];
            if !(extent > 0.) {
                return Err(TopologyError::InvalidConfig(format!(
                    "grid domain is empty along axis {}",
                    d
                )));
            }
            number_of_cells[d] = ((extent / cell_size).ceil() as usize).max(1);
            total_cells = total_cells.checked_mul(number_of_cells[d]).ok_or_else(|| {
                TopologyError::InvalidConfig(format!(
                    "grid with cell size {} has too many cells ({:?})",
                    cell_size,
                    number_of_cells.as_slice()
                ))
            })?;
        }

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(total_cells)
            .map_err(|source| TopologyError::Allocation {
                what: "cell linked list",
                source,
            })?;
        cells.resize_with(total_cells, Vec::new);

        Ok(CellLinkedList {
            lower_bound,
            cell_size,
            inv_cell_size: 1. / cell_size,
            number_of_cells,
            cells,
        })
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    pub fn inv_cell_size(&self) -> FT {
        self.inv_cell_size
    }

    pub fn lower_bound(&self) -> VF<D> {
        self.lower_bound
    }

    pub fn number_of_cells(&self) -> V<usize, D> {
        self.number_of_cells
    }

    pub fn total_cells(&self) -> usize {
        self.cells.len()
    }

    /// Cell containing `position`, positions outside the domain are clamped to the border cells.
    pub fn cell_index_from_position(&self, position: &VF<D>) -> V<usize, D> {
        let mut cell = V::<usize, D>::zeros();
        for d in 0..D {
            let c = ((position[d] - self.lower_bound[d]) * self.inv_cell_size).floor();
            // negative and NaN saturate to 0
            cell[d] = (c as usize).min(self.number_of_cells[d] - 1);
        }
        cell
    }

    pub fn linear_cell_index(&self, cell: &V<usize, D>) -> usize {
        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..D {
            debug_assert!(cell[d] < self.number_of_cells[d]);
            idx += multiplier * cell[d];
            multiplier *= self.number_of_cells[d];
        }
        idx
    }

    pub fn cell(&self, cell: &V<usize, D>) -> &[ListData<D>] {
        &self.cells[self.linear_cell_index(cell)]
    }

    pub fn insert(&mut self, particle_index: usize, position: VF<D>) {
        let cell = self.cell_index_from_position(&position);
        let idx = self.linear_cell_index(&cell);
        self.cells[idx].push((particle_index, position));
    }

    /// Empties every bucket, keeping their capacity.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
    }

    /// Rebuilds all buckets from the real and ghost particles of `particles`.
    pub fn rebuild(&mut self, particles: &ParticleStore<D>) {
        self.clear();
        let position = particles.position();
        for i in (0..particles.total_real_particles()).chain(particles.ghost_range()) {
            self.insert(i, position[i]);
        }
        debug!(
            body = particles.body_name(),
            real = particles.total_real_particles(),
            ghosts = particles.total_ghost_particles(),
            cells = self.cells.len(),
            "rebuilt cell linked list"
        );
    }

    /// All cells within Chebyshev distance `search_depth` of `center`, clipped to the grid.
    pub fn cell_range(&self, center: &V<usize, D>, search_depth: i32) -> CellRange<D> {
        assert!(search_depth > 0, "search depth must be positive, got {}", search_depth);
        let depth = search_depth as usize;
        let mut lower = V::<usize, D>::zeros();
        let mut upper = V::<usize, D>::zeros();
        for d in 0..D {
            lower[d] = center[d].saturating_sub(depth);
            upper[d] = center[d].saturating_add(depth).min(self.number_of_cells[d] - 1);
        }
        CellRange::new(lower, upper)
    }

    /// Entries of all cells within `search_depth` cells of the cell containing `position`.
    pub fn query_range<'a>(
        &'a self,
        position: &VF<D>,
        search_depth: i32,
    ) -> impl Iterator<Item = ListData<D>> + Clone + 'a {
        let center = self.cell_index_from_position(position);
        self.cell_range(&center, search_depth)
            .flat_map(move |cell| self.cell(&cell).iter().copied())
    }
}

/// Iterator over an axis-aligned box of cells, bounds inclusive, axis 0 running fastest.
#[derive(Debug, Clone)]
pub struct CellRange<const D: usize> {
    lower: V<usize, D>,
    upper: V<usize, D>,
    current: Option<V<usize, D>>,
}

impl<const D: usize> CellRange<D> {
    pub fn new(lower: V<usize, D>, upper: V<usize, D>) -> Self {
        let empty = (0..D).any(|d| lower[d] > upper[d]);
        CellRange {
            lower,
            upper,
            current: if empty { None } else { Some(lower) },
        }
    }
}

impl<const D: usize> Iterator for CellRange<D> {
    type Item = V<usize, D>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        let mut next = current;
        self.current = None;
        for d in 0..D {
            if next[d] < self.upper[d] {
                next[d] += 1;
                self.current = Some(next);
                break;
            }
            next[d] = self.lower[d];
        }
        Some(current)
    }
}
