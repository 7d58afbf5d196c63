use tracing::{debug, info};

use crate::{
    cell_linked_list::CellLinkedList,
    error::Result,
    floating_type_mod::FT,
    particle_sorting::sort_particles,
    particles::ParticleStore,
    periodic::{self, PeriodicBoundary},
    relation::RelationId,
    simulation_parameters::{BodyParams, SystemParams},
    sph_kernels::{DimensionUtils, Kernel},
    system::SimulationContext,
    VF,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyId(pub usize);

/**
 * A set of particles sharing one kernel, one spatial grid and one sorting schedule.
 *
 * The body keeps the ids of all relations whose source it is, so particle count changes can be
 * forwarded to them.
 */
pub struct Body<DU: DimensionUtils<D>, const D: usize> {
    name: String,
    particles: ParticleStore<D>,
    cell_linked_list: CellLinkedList<D>,
    kernel: Kernel<DU, D>,
    adaptive: bool,
    periodic: Vec<PeriodicBoundary>,

    newly_moved: bool,
    to_update_cell_linked_list: bool,

    // counts cell linked list updates, drives the sorting schedule
    iteration_count: usize,
    sorting_locked: bool,

    dependents: Vec<RelationId>,
}

impl<DU: DimensionUtils<D>, const D: usize> Body<DU, D> {
    pub fn new(params: &BodyParams, system: &SystemParams, mut particles: ParticleStore<D>) -> Result<Self> {
        params.validate::<D>()?;
        system.validate::<D>()?;

        let kernel = Kernel::new(params.smoothing_length)?;
        let cell_size = params.cell_size.unwrap_or_else(|| kernel.cutoff_radius());

        // one cell of margin for particles and ghosts slightly outside the domain
        let margin = VF::<D>::repeat(cell_size);
        let lower = VF::<D>::from_column_slice(&system.domain_lower) - margin;
        let upper = VF::<D>::from_column_slice(&system.domain_upper) + margin;
        let cell_linked_list = CellLinkedList::new(lower, upper, cell_size)?;

        if params.buffer_size > 0 {
            particles.add_buffer_particles(params.buffer_size)?;
        }

        let mut body = Body {
            name: params.name.clone(),
            particles,
            cell_linked_list,
            kernel,
            adaptive: params.adaptive,
            periodic: params.periodic.iter().map(PeriodicBoundary::from).collect(),
            newly_moved: true,
            to_update_cell_linked_list: false,
            iteration_count: 0,
            sorting_locked: false,
            dependents: Vec::new(),
        };
        body.refresh_cell_linked_list()?;

        info!(
            body = %body.name,
            particles = body.particles.total_real_particles(),
            buffer = params.buffer_size,
            cell_size,
            cells = body.cell_linked_list.total_cells(),
            adaptive = body.adaptive,
            "created body"
        );
        Ok(body)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn particles(&self) -> &ParticleStore<D> {
        &self.particles
    }

    /// Entry and ghost changes have to go through the system so relations can follow them.
    pub(crate) fn particles_mut(&mut self) -> &mut ParticleStore<D> {
        &mut self.particles
    }

    /// Positions of the real particles. Callers that move them mark the body with `set_newly_moved`.
    pub fn position_mut(&mut self) -> &mut [VF<D>] {
        let total_real = self.particles.total_real_particles();
        &mut self.particles.fields.position[..total_real]
    }

    pub fn velocity_mut(&mut self) -> &mut [VF<D>] {
        let total_real = self.particles.total_real_particles();
        &mut self.particles.fields.velocity[..total_real]
    }

    pub fn h_ratio_mut(&mut self) -> &mut [FT] {
        let total_real = self.particles.total_real_particles();
        &mut self.particles.fields.h_ratio[..total_real]
    }

    /// Real particle values of a named scalar field, core or registered.
    pub fn scalar_mut(&mut self, name: &str) -> Result<&mut [FT]> {
        let total_real = self.particles.total_real_particles();
        Ok(&mut self.particles.scalar_mut(name)?[..total_real])
    }

    pub fn vector_mut(&mut self, name: &str) -> Result<&mut [VF<D>]> {
        let total_real = self.particles.total_real_particles();
        Ok(&mut self.particles.vector_mut(name)?[..total_real])
    }

    pub fn integer_mut(&mut self, name: &str) -> Result<&mut [i32]> {
        let total_real = self.particles.total_real_particles();
        Ok(&mut self.particles.integer_mut(name)?[..total_real])
    }

    pub fn cell_linked_list(&self) -> &CellLinkedList<D> {
        &self.cell_linked_list
    }

    pub fn kernel(&self) -> &Kernel<DU, D> {
        &self.kernel
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn periodic_boundaries(&self) -> &[PeriodicBoundary] {
        &self.periodic
    }

    pub fn dependents(&self) -> &[RelationId] {
        &self.dependents
    }

    pub(crate) fn add_dependent(&mut self, relation: RelationId) {
        self.dependents.push(relation);
    }

    /// Particles of this body moved, the next cell linked list update has to rebuild.
    pub fn set_newly_moved(&mut self) {
        self.newly_moved = true;
    }

    pub fn is_newly_moved(&self) -> bool {
        self.newly_moved
    }

    pub fn set_update_cell_linked_list(&mut self) {
        self.to_update_cell_linked_list = true;
    }

    pub fn is_cell_linked_list_update_requested(&self) -> bool {
        self.to_update_cell_linked_list
    }

    /// Total-Lagrangian relations keep particle indices forever, the body may not be sorted.
    pub(crate) fn lock_sorting(&mut self) {
        self.sorting_locked = true;
    }

    pub fn is_sorting_locked(&self) -> bool {
        self.sorting_locked
    }

    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    /// Smallest smoothing length ratio of the real particles, never above the reference ratio 1.
    pub fn min_h_ratio(&self) -> FT {
        if !self.adaptive {
            return 1.;
        }
        self.particles.h_ratio()[..self.particles.total_real_particles()]
            .iter()
            .copied()
            .fold(1., FT::min)
    }

    /// Largest cutoff radius of any particle, used for the periodic ghost layer and adaptive scans.
    pub fn max_cutoff_radius(&self) -> FT {
        self.kernel.cutoff_radius_with_ratio(self.min_h_ratio())
    }

    pub(crate) fn sort(&mut self, system: &SystemParams) {
        sort_particles(&mut self.particles, &self.cell_linked_list, system.sorting_key);
    }

    /// Rebuilds ghosts and the grid from the current positions without sorting.
    pub(crate) fn refresh_cell_linked_list(&mut self) -> Result<()> {
        self.particles.clear_ghosts();
        for boundary in &self.periodic {
            boundary.bound_positions(&mut self.particles);
        }
        let cutoff = self.max_cutoff_radius();
        for boundary in &self.periodic {
            boundary.create_ghosts(&mut self.particles, cutoff)?;
        }
        self.cell_linked_list.rebuild(&self.particles);
        Ok(())
    }

    /**
     * Rebuilds the grid if the body moved and a relation asked for it, sorting every
     * `sorting_interval` updates. Returns whether anything was rebuilt.
     */
    pub fn update_cell_linked_list(&mut self, ctx: &SimulationContext, system: &SystemParams) -> Result<bool> {
        if !(self.newly_moved && self.to_update_cell_linked_list) {
            return Ok(false);
        }

        self.particles.clear_ghosts();
        let interval = system.sorting_interval;
        if interval > 0 && !self.sorting_locked && self.iteration_count % interval == 0 {
            self.sort(system);
        }
        self.iteration_count += 1;
        self.refresh_cell_linked_list()?;

        self.newly_moved = false;
        self.to_update_cell_linked_list = false;

        debug!(
            body = %self.name,
            iteration = ctx.iteration,
            time = ctx.physical_time,
            real = self.particles.total_real_particles(),
            ghosts = self.particles.total_ghost_particles(),
            "updated cell linked list"
        );
        Ok(true)
    }

    /// Copies the state of every real particle into its ghosts, keeping the periodic shifts.
    pub fn update_ghosts(&mut self) {
        periodic::update_ghosts(&mut self.particles, &self.periodic);
    }
}
