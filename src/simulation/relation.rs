use tracing::{debug, info};

use crate::{
    body::{Body, BodyId},
    error::{Result, TopologyError},
    neighborhood::{resize_configuration, ContactParticleConfiguration, NeighborBuilder, ParticleConfiguration},
    neighborhood_search::{check_neighborhood, search_neighbors_by_particles, SearchSource},
    search_depth::{AdaptiveDepth, ContactDepth, FixedDepth, SearchDepth, SearchDepthPolicy},
    sph_kernels::{DimensionUtils, Kernel},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationId(pub usize);

/// How a relation's configuration follows the particles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePolicy {
    // rebuilt from the current positions on every update
    Dynamic,
    // computed once from the reference positions, never rebuilt
    TotalLagrangian,
}

fn body<DU: DimensionUtils<D>, const D: usize>(bodies: &[Body<DU, D>], id: BodyId) -> Result<&Body<DU, D>> {
    bodies.get(id.0).ok_or(TopologyError::UnknownBody(id.0))
}

fn check_depth(relation: &str, search_depth: &SearchDepth) -> Result<()> {
    match search_depth.constant_depth() {
        Some(depth) if depth <= 0 => Err(TopologyError::NonPositiveSearchDepth {
            relation: relation.to_string(),
            depth,
        }),
        _ => Ok(()),
    }
}

/// Neighbors of every particle of one body among the particles of the same body.
pub struct InnerRelation<DU: DimensionUtils<D>, const D: usize> {
    name: String,
    body: BodyId,
    builder: NeighborBuilder<DU, D>,
    search_depth: SearchDepth,
    update_policy: UpdatePolicy,
    configuration: ParticleConfiguration<D>,
}

impl<DU: DimensionUtils<D>, const D: usize> InnerRelation<DU, D> {
    /// Depth one for a cutoff inside one cell, otherwise enough cells to cover it.
    pub fn default_search_depth(body: &Body<DU, D>) -> SearchDepth {
        let cutoff = body.kernel().cutoff_radius();
        let cell_size = body.cell_linked_list().cell_size();
        if body.is_adaptive() {
            AdaptiveDepth::new(cutoff, cell_size)
                .with_neighbor_ratio(body.min_h_ratio())
                .into()
        } else if cutoff <= cell_size {
            FixedDepth::default().into()
        } else {
            ContactDepth::new(cutoff, cell_size).into()
        }
    }

    pub fn new(
        name: &str,
        body_id: BodyId,
        bodies: &[Body<DU, D>],
        search_depth: Option<SearchDepth>,
        update_policy: UpdatePolicy,
    ) -> Result<Self> {
        let source = body(bodies, body_id)?;
        let search_depth = search_depth.unwrap_or_else(|| Self::default_search_depth(source));
        check_depth(name, &search_depth)?;

        let kernel = *source.kernel();
        let builder = if source.is_adaptive() {
            NeighborBuilder::InnerAdaptive(kernel)
        } else {
            NeighborBuilder::Inner(kernel)
        };

        let mut relation = InnerRelation {
            name: name.to_string(),
            body: body_id,
            builder,
            search_depth,
            update_policy,
            configuration: Vec::new(),
        };
        relation.update_configuration_memories(bodies)?;
        if update_policy == UpdatePolicy::TotalLagrangian {
            relation.search(bodies, false)?;
        }

        info!(
            relation = name,
            body = source.name(),
            policy = ?update_policy,
            search_depth = ?relation.search_depth,
            "created inner relation"
        );
        Ok(relation)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn search_depth(&self) -> &SearchDepth {
        &self.search_depth
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    pub fn configuration(&self) -> &ParticleConfiguration<D> {
        &self.configuration
    }

    /// One neighborhood per slot up to the real particle bound of the body.
    pub fn update_configuration_memories(&mut self, bodies: &[Body<DU, D>]) -> Result<()> {
        let particles = body(bodies, self.body)?.particles();
        resize_configuration(
            &mut self.configuration,
            particles.real_particles_bound(),
            particles.total_real_particles(),
        )
    }

    fn search(&mut self, bodies: &[Body<DU, D>], check: bool) -> Result<usize> {
        let source_body = body(bodies, self.body)?;
        // smoothing length ratios may have changed since the last search
        if let SearchDepth::AdaptiveDepth(depth) = &mut self.search_depth {
            *depth = depth.with_neighbor_ratio(source_body.min_h_ratio());
        }

        let source = SearchSource::new(&self.name, source_body.particles());
        let total = search_neighbors_by_particles(
            &source,
            &mut self.configuration,
            source_body.cell_linked_list(),
            source_body.particles().h_ratio(),
            &self.search_depth,
            &self.builder,
        )?;
        if check {
            check_neighborhood(&source, &self.configuration, source_body.particles(), &self.builder);
        }
        debug!(relation = %self.name, particles = source.total_real_particles, neighbors = total, "updated inner configuration");
        Ok(total)
    }

    pub fn update_configuration(&mut self, bodies: &[Body<DU, D>], check: bool) -> Result<()> {
        if self.update_policy == UpdatePolicy::TotalLagrangian {
            return Err(TopologyError::TotalLagrangianRebuild {
                relation: self.name.clone(),
            });
        }
        self.search(bodies, check)?;
        Ok(())
    }

    /// Asks the body for a fresh grid before the next update, ignored for total-Lagrangian relations.
    pub fn set_update_cell_linked_list(&self, bodies: &mut [Body<DU, D>]) {
        if self.update_policy == UpdatePolicy::Dynamic {
            if let Some(body) = bodies.get_mut(self.body.0) {
                body.set_update_cell_linked_list();
            }
        }
    }
}

/// Neighbors of every particle of one body among the particles of other bodies.
pub struct ContactRelation<DU: DimensionUtils<D>, const D: usize> {
    name: String,
    body: BodyId,
    contact_bodies: Vec<BodyId>,
    builders: Vec<NeighborBuilder<DU, D>>,
    search_depths: Vec<SearchDepth>,
    update_policy: UpdatePolicy,
    configurations: ContactParticleConfiguration<D>,
}

impl<DU: DimensionUtils<D>, const D: usize> ContactRelation<DU, D> {
    pub fn new(
        name: &str,
        body_id: BodyId,
        contact_bodies: &[BodyId],
        bodies: &[Body<DU, D>],
        update_policy: UpdatePolicy,
    ) -> Result<Self> {
        let source = body(bodies, body_id)?;

        let mut builders = Vec::with_capacity(contact_bodies.len());
        let mut search_depths = Vec::with_capacity(contact_bodies.len());
        for &contact_id in contact_bodies {
            if contact_id == body_id {
                return Err(TopologyError::InvalidRelation {
                    relation: name.to_string(),
                    reason: format!("body '{}' can not be in contact with itself", source.name()),
                });
            }
            let target = body(bodies, contact_id)?;
            let target_cell_size = target.cell_linked_list().cell_size();
            let (builder, search_depth): (_, SearchDepth) = if source.is_adaptive() {
                // the target's reference smoothing length expressed as a ratio of the source kernel
                let target_ratio = source.kernel().smoothing_length() / target.kernel().smoothing_length();
                let depth = AdaptiveDepth::new(source.kernel().cutoff_radius(), target_cell_size)
                    .with_neighbor_ratio(target_ratio);
                (
                    NeighborBuilder::ContactAdaptive {
                        kernel: *source.kernel(),
                        target_ratio,
                    },
                    depth.into(),
                )
            } else {
                let h = source.kernel().smoothing_length().max(target.kernel().smoothing_length());
                let kernel = Kernel::new(h)?;
                let depth = ContactDepth::new(kernel.cutoff_radius(), target_cell_size);
                (NeighborBuilder::Contact(kernel), depth.into())
            };
            check_depth(name, &search_depth)?;
            builders.push(builder);
            search_depths.push(search_depth);
        }

        let mut relation = ContactRelation {
            name: name.to_string(),
            body: body_id,
            contact_bodies: contact_bodies.to_vec(),
            builders,
            search_depths,
            update_policy,
            configurations: vec![Vec::new(); contact_bodies.len()],
        };
        relation.update_configuration_memories(bodies)?;
        if update_policy == UpdatePolicy::TotalLagrangian {
            relation.search(bodies, false)?;
        }

        info!(
            relation = name,
            body = source.name(),
            contacts = contact_bodies.len(),
            policy = ?update_policy,
            "created contact relation"
        );
        Ok(relation)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn contact_bodies(&self) -> &[BodyId] {
        &self.contact_bodies
    }

    pub fn search_depths(&self) -> &[SearchDepth] {
        &self.search_depths
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    pub fn configurations(&self) -> &ContactParticleConfiguration<D> {
        &self.configurations
    }

    /// Configuration of the `k`-th contact body.
    pub fn configuration(&self, k: usize) -> &ParticleConfiguration<D> {
        &self.configurations[k]
    }

    pub fn update_configuration_memories(&mut self, bodies: &[Body<DU, D>]) -> Result<()> {
        let particles = body(bodies, self.body)?.particles();
        for configuration in &mut self.configurations {
            resize_configuration(
                configuration,
                particles.real_particles_bound(),
                particles.total_real_particles(),
            )?;
        }
        Ok(())
    }

    fn search(&mut self, bodies: &[Body<DU, D>], check: bool) -> Result<usize> {
        let source_body = body(bodies, self.body)?;
        let source = SearchSource::new(&self.name, source_body.particles());

        let mut total = 0;
        for (k, &contact_id) in self.contact_bodies.iter().enumerate() {
            let target = body(bodies, contact_id)?;
            total += search_neighbors_by_particles(
                &source,
                &mut self.configurations[k],
                target.cell_linked_list(),
                target.particles().h_ratio(),
                &self.search_depths[k],
                &self.builders[k],
            )?;
            if check {
                check_neighborhood(&source, &self.configurations[k], target.particles(), &self.builders[k]);
            }
        }
        debug!(relation = %self.name, particles = source.total_real_particles, neighbors = total, "updated contact configuration");
        Ok(total)
    }

    pub fn update_configuration(&mut self, bodies: &[Body<DU, D>], check: bool) -> Result<()> {
        if self.update_policy == UpdatePolicy::TotalLagrangian {
            return Err(TopologyError::TotalLagrangianRebuild {
                relation: self.name.clone(),
            });
        }
        self.search(bodies, check)?;
        Ok(())
    }

    /// Requests fresh grids for the source and every contact body.
    pub fn set_update_cell_linked_list(&self, bodies: &mut [Body<DU, D>]) {
        if self.update_policy == UpdatePolicy::TotalLagrangian {
            return;
        }
        for id in std::iter::once(self.body).chain(self.contact_bodies.iter().copied()) {
            if let Some(body) = bodies.get_mut(id.0) {
                body.set_update_cell_linked_list();
            }
        }
    }
}

/// An inner and a contact relation of the same body, updated together.
pub struct ComplexRelation<DU: DimensionUtils<D>, const D: usize> {
    pub inner: InnerRelation<DU, D>,
    pub contact: ContactRelation<DU, D>,
}

impl<DU: DimensionUtils<D>, const D: usize> ComplexRelation<DU, D> {
    pub fn new(inner: InnerRelation<DU, D>, contact: ContactRelation<DU, D>) -> Result<Self> {
        if inner.body() != contact.body() {
            return Err(TopologyError::InvalidRelation {
                relation: format!("{}+{}", inner.name(), contact.name()),
                reason: "inner and contact relation must share their source body".to_string(),
            });
        }
        Ok(ComplexRelation { inner, contact })
    }
}

/// Every relation kind the system can hold.
pub enum Relation<DU: DimensionUtils<D>, const D: usize> {
    Inner(InnerRelation<DU, D>),
    Contact(ContactRelation<DU, D>),
    Complex(ComplexRelation<DU, D>),
}

impl<DU: DimensionUtils<D>, const D: usize> Relation<DU, D> {
    pub fn name(&self) -> &str {
        match self {
            Relation::Inner(r) => r.name(),
            Relation::Contact(r) => r.name(),
            Relation::Complex(r) => r.inner.name(),
        }
    }

    pub fn body(&self) -> BodyId {
        match self {
            Relation::Inner(r) => r.body(),
            Relation::Contact(r) => r.body(),
            Relation::Complex(r) => r.inner.body(),
        }
    }

    /// The source body followed by every contact body.
    pub fn bodies(&self) -> Vec<BodyId> {
        let mut bodies = vec![self.body()];
        if let Some(contact) = self.as_contact() {
            bodies.extend_from_slice(contact.contact_bodies());
        }
        bodies
    }

    /// Total-Lagrangian if any part of the relation is.
    pub fn update_policy(&self) -> UpdatePolicy {
        match self {
            Relation::Inner(r) => r.update_policy(),
            Relation::Contact(r) => r.update_policy(),
            Relation::Complex(r) => {
                if r.inner.update_policy() == UpdatePolicy::TotalLagrangian
                    || r.contact.update_policy() == UpdatePolicy::TotalLagrangian
                {
                    UpdatePolicy::TotalLagrangian
                } else {
                    UpdatePolicy::Dynamic
                }
            }
        }
    }

    pub fn as_inner(&self) -> Option<&InnerRelation<DU, D>> {
        match self {
            Relation::Inner(r) => Some(r),
            Relation::Complex(r) => Some(&r.inner),
            Relation::Contact(_) => None,
        }
    }

    pub fn as_contact(&self) -> Option<&ContactRelation<DU, D>> {
        match self {
            Relation::Contact(r) => Some(r),
            Relation::Complex(r) => Some(&r.contact),
            Relation::Inner(_) => None,
        }
    }

    pub fn update_configuration(&mut self, bodies: &[Body<DU, D>], check: bool) -> Result<()> {
        match self {
            Relation::Inner(r) => r.update_configuration(bodies, check),
            Relation::Contact(r) => r.update_configuration(bodies, check),
            Relation::Complex(r) => {
                r.inner.update_configuration(bodies, check)?;
                r.contact.update_configuration(bodies, check)
            }
        }
    }

    pub fn update_configuration_memories(&mut self, bodies: &[Body<DU, D>]) -> Result<()> {
        match self {
            Relation::Inner(r) => r.update_configuration_memories(bodies),
            Relation::Contact(r) => r.update_configuration_memories(bodies),
            Relation::Complex(r) => {
                r.inner.update_configuration_memories(bodies)?;
                r.contact.update_configuration_memories(bodies)
            }
        }
    }

    pub fn set_update_cell_linked_list(&self, bodies: &mut [Body<DU, D>]) {
        match self {
            Relation::Inner(r) => r.set_update_cell_linked_list(bodies),
            Relation::Contact(r) => r.set_update_cell_linked_list(bodies),
            Relation::Complex(r) => {
                r.inner.set_update_cell_linked_list(bodies);
                r.contact.set_update_cell_linked_list(bodies);
            }
        }
    }
}
