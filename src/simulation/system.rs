use tracing::{debug, info};

use crate::{
    body::{Body, BodyId},
    error::{Result, TopologyError},
    floating_type_mod::FT,
    particles::ParticleStore,
    relation::{ComplexRelation, ContactRelation, InnerRelation, Relation, RelationId, UpdatePolicy},
    search_depth::SearchDepth,
    simulation_parameters::{BodyParams, SystemParams},
    sph_kernels::DimensionUtils,
};

/// Physical time and iteration counters, owned by the driver and passed into every step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationContext {
    pub physical_time: FT,
    pub iteration: usize,
    pub dt: FT,
}

impl SimulationContext {
    pub fn advance(&mut self, dt: FT) {
        self.dt = dt;
        self.physical_time += dt;
        self.iteration += 1;
    }
}

/**
 * Owns all bodies and relations.
 *
 * Relations refer to bodies by `BodyId` and bodies refer to relations by `RelationId`, so there
 * are no references between them. Particle count changes go through the system, which forwards
 * them to the relations registered on the body.
 */
pub struct SphSystem<DU: DimensionUtils<D>, const D: usize> {
    params: SystemParams,
    bodies: Vec<Body<DU, D>>,
    relations: Vec<Relation<DU, D>>,
}

impl<DU: DimensionUtils<D>, const D: usize> SphSystem<DU, D> {
    pub fn new(params: SystemParams) -> Result<Self> {
        params.validate::<D>()?;
        Ok(SphSystem {
            params,
            bodies: Vec::new(),
            relations: Vec::new(),
        })
    }

    pub fn params(&self) -> &SystemParams {
        &self.params
    }

    pub fn bodies(&self) -> &[Body<DU, D>] {
        &self.bodies
    }

    pub fn body(&self, id: BodyId) -> Result<&Body<DU, D>> {
        self.bodies.get(id.0).ok_or(TopologyError::UnknownBody(id.0))
    }

    /// Mutable access for physics that moves particles, callers mark the body as moved.
    pub fn body_mut(&mut self, id: BodyId) -> Result<&mut Body<DU, D>> {
        self.bodies.get_mut(id.0).ok_or(TopologyError::UnknownBody(id.0))
    }

    pub fn relation(&self, id: RelationId) -> Result<&Relation<DU, D>> {
        self.relations.get(id.0).ok_or(TopologyError::UnknownRelation(id.0))
    }

    pub fn body_by_name(&self, name: &str) -> Option<BodyId> {
        self.bodies.iter().position(|b| b.name() == name).map(BodyId)
    }

    pub fn add_body(&mut self, params: &BodyParams, particles: ParticleStore<D>) -> Result<BodyId> {
        if self.body_by_name(&params.name).is_some() {
            return Err(TopologyError::InvalidBody {
                body: params.name.clone(),
                reason: "a body with this name already exists".to_string(),
            });
        }
        let body = Body::new(params, &self.params, particles)?;
        self.bodies.push(body);
        Ok(BodyId(self.bodies.len() - 1))
    }

    fn register(&mut self, relation: Relation<DU, D>) -> Result<RelationId> {
        let id = RelationId(self.relations.len());
        self.body_mut(relation.body())?.add_dependent(id);
        // fixed neighbor lists keep indices into the source and every contact body
        if relation.update_policy() == UpdatePolicy::TotalLagrangian {
            for body in relation.bodies() {
                self.body_mut(body)?.lock_sorting();
            }
        }
        relation.set_update_cell_linked_list(&mut self.bodies);
        self.relations.push(relation);
        Ok(id)
    }

    pub fn add_inner_relation(&mut self, name: &str, body: BodyId, update_policy: UpdatePolicy) -> Result<RelationId> {
        let relation = InnerRelation::new(name, body, &self.bodies, None, update_policy)?;
        self.register(Relation::Inner(relation))
    }

    pub fn add_inner_relation_with_depth(
        &mut self,
        name: &str,
        body: BodyId,
        search_depth: SearchDepth,
        update_policy: UpdatePolicy,
    ) -> Result<RelationId> {
        let relation = InnerRelation::new(name, body, &self.bodies, Some(search_depth), update_policy)?;
        self.register(Relation::Inner(relation))
    }

    pub fn add_contact_relation(
        &mut self,
        name: &str,
        body: BodyId,
        contact_bodies: &[BodyId],
        update_policy: UpdatePolicy,
    ) -> Result<RelationId> {
        let relation = ContactRelation::new(name, body, contact_bodies, &self.bodies, update_policy)?;
        self.register(Relation::Contact(relation))
    }

    pub fn add_complex_relation(&mut self, name: &str, body: BodyId, contact_bodies: &[BodyId]) -> Result<RelationId> {
        let inner = InnerRelation::new(name, body, &self.bodies, None, UpdatePolicy::Dynamic)?;
        let contact_name = format!("{}-contact", name);
        let contact = ContactRelation::new(&contact_name, body, contact_bodies, &self.bodies, UpdatePolicy::Dynamic)?;
        self.register(Relation::Complex(ComplexRelation::new(inner, contact)?))
    }

    /// Marks every body a dynamic relation reads from for a grid rebuild.
    pub fn set_update_cell_linked_list(&mut self, relation: RelationId) -> Result<()> {
        let relation = self.relations.get(relation.0).ok_or(TopologyError::UnknownRelation(relation.0))?;
        relation.set_update_cell_linked_list(&mut self.bodies);
        Ok(())
    }

    /// Rebuilds the grid of every body that moved and was asked for an update.
    pub fn update_cell_linked_lists(&mut self, ctx: &SimulationContext) -> Result<usize> {
        let mut updated = 0;
        for body in &mut self.bodies {
            if body.update_cell_linked_list(ctx, &self.params)? {
                updated += 1;
            }
        }
        Ok(updated)
    }

    /// Rebuilds the neighbor lists of `relation` from the current grids.
    pub fn update_configuration(&mut self, relation: RelationId) -> Result<()> {
        let check = self.params.check_neighborhood;
        let relation = self
            .relations
            .get_mut(relation.0)
            .ok_or(TopologyError::UnknownRelation(relation.0))?;
        relation.update_configuration(&self.bodies, check)
    }

    /**
     * One topology step: request grids for all dynamic relations, rebuild the grids of moved
     * bodies and update every dynamic configuration.
     */
    pub fn update_topology(&mut self, ctx: &SimulationContext) -> Result<()> {
        for relation in &self.relations {
            relation.set_update_cell_linked_list(&mut self.bodies);
        }
        let updated = self.update_cell_linked_lists(ctx)?;

        let check = self.params.check_neighborhood;
        for relation in &mut self.relations {
            if relation.update_policy() == UpdatePolicy::Dynamic {
                relation.update_configuration(&self.bodies, check)?;
            }
        }
        debug!(iteration = ctx.iteration, bodies = updated, relations = self.relations.len(), "updated topology");
        Ok(())
    }

    fn update_configuration_memories(&mut self, body: BodyId) -> Result<()> {
        let dependents = self.body(body)?.dependents().to_vec();
        for id in dependents {
            let relation = self.relations.get_mut(id.0).ok_or(TopologyError::UnknownRelation(id.0))?;
            relation.update_configuration_memories(&self.bodies)?;
        }
        Ok(())
    }

    /**
     * Appends a particle with default field values to `body`.
     *
     * Without a free buffer slot the storage grows, which drops the current ghosts. The grid and
     * all neighbor lists of the body are stale until the next update either way.
     */
    pub fn add_entry(&mut self, body: BodyId) -> Result<usize> {
        let b = self.body_mut(body)?;
        let particles = b.particles_mut();
        if particles.total_real_particles() == particles.real_particles_bound() {
            particles.clear_ghosts();
        }
        let index = particles.add_entry()?;
        b.set_newly_moved();
        self.update_configuration_memories(body)?;
        Ok(index)
    }

    /**
     * Removes particle `index` of `body`, the last real particle takes over its slot.
     *
     * Refused on bodies with fixed-index neighbor lists, the renamed slot would corrupt them.
     */
    pub fn remove_entry(&mut self, body: BodyId, index: usize) -> Result<()> {
        let b = self.body_mut(body)?;
        if b.is_sorting_locked() {
            return Err(TopologyError::InvalidBody {
                body: b.name().to_string(),
                reason: "a total-Lagrangian relation depends on the particle order".to_string(),
            });
        }
        b.particles_mut().remove_entry(index)?;
        b.set_newly_moved();
        self.update_configuration_memories(body)
    }

    /// Injects a copy of `copy_from` into the next buffer slot of `body`.
    pub fn activate_buffer_particle(&mut self, body: BodyId, copy_from: usize) -> Result<usize> {
        let b = self.body_mut(body)?;
        let index = b.particles_mut().activate_buffer_particle(copy_from)?;
        b.set_newly_moved();
        self.update_configuration_memories(body)?;
        Ok(index)
    }

    /// Sorts `body` now and rebuilds its grid, the neighbor lists have to be updated afterwards.
    pub fn sort_body(&mut self, body: BodyId) -> Result<()> {
        let params = self.params.clone();
        let b = self.body_mut(body)?;
        if b.is_sorting_locked() {
            return Err(TopologyError::InvalidBody {
                body: b.name().to_string(),
                reason: "a total-Lagrangian relation depends on the particle order".to_string(),
            });
        }
        b.sort(&params);
        b.refresh_cell_linked_list()?;
        info!(body = b.name(), "sorted body on request");
        Ok(())
    }
}
