use std::collections::TryReserveError;

use nalgebra::zero;
use tracing::{debug, trace};

use crate::{
    error::{Result, TopologyError},
    floating_type_mod::FT,
    VF,
};

macro_rules! decl_particle_fields {
    (pub struct $struct_name:ident<const D: usize> { $(pub $field_name:ident: Vec<$field_type:ty> | $io_name:literal | $default_value:expr),*$(,)?  }) => {
        pub struct $struct_name<const D: usize> {
            $(
                pub $field_name : Vec<$field_type>,
            )*
        }

        impl<const D: usize> $struct_name<D> {
            pub const NAMES: &'static [&'static str] = &[$($io_name),*];

            pub fn swap(&mut self, i: usize, j: usize) {
                $(
                    self.$field_name.swap(i, j);
                )*
            }

            pub fn copy_particle(&mut self, dst: usize, src: usize) {
                $(
                    self.$field_name[dst] = self.$field_name[src];
                )*
            }

            pub fn reset_particle(&mut self, i: usize) {
                $(
                    self.$field_name[i] = $default_value;
                )*
            }

            pub fn push_default(&mut self) {
                $(
                    self.$field_name.push($default_value);
                )*
            }

            pub fn try_reserve(&mut self, additional: usize) -> std::result::Result<(), TryReserveError> {
                $(
                    self.$field_name.try_reserve(additional)?;
                )*
                Ok(())
            }

            /// Gathers `new[k] = old[order[k]]` for the leading `order.len()` entries.
            pub fn permute(&mut self, order: &[usize]) {
                $(
                    let permuted: Vec<$field_type> = order.iter().map(|&k| self.$field_name[k]).collect();
                    self.$field_name[..order.len()].copy_from_slice(&permuted);
                )*
            }

            pub fn lengths(&self) -> Vec<(&'static str, usize)> {
                vec![$(($io_name, self.$field_name.len())),*]
            }

            pub fn default(len: usize) -> Self {
                Self {
                    $(
                        $field_name: (0..len).map(|_| $default_value).collect::<Vec<$field_type>>(),
                    )*
                }
            }
        }
    }
}

decl_particle_fields! {
    pub struct ParticleFields<const D: usize> {
        pub position: Vec<VF<D>> | "Position" | zero(),
        pub velocity: Vec<VF<D>> | "Velocity" | zero(),
        pub acceleration: Vec<VF<D>> | "Acceleration" | zero(),
        pub mass: Vec<FT> | "Mass" | 0.,
        pub volume: Vec<FT> | "Volume" | 0.,
        pub density: Vec<FT> | "Density" | 0.,

        // h_ref / h_local, larger values mean finer particles
        pub h_ratio: Vec<FT> | "SmoothingLengthRatio" | 1.,
    }
}

/// A per-particle array registered at runtime, addressable by name, with the value new entries get.
#[derive(Debug, Clone)]
pub enum FieldData<const D: usize> {
    Scalar(Vec<FT>, FT),
    Vector(Vec<VF<D>>, VF<D>),
    Integer(Vec<i32>, i32),
}

macro_rules! with_field_vec {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            FieldData::Scalar($v, _) => $body,
            FieldData::Vector($v, _) => $body,
            FieldData::Integer($v, _) => $body,
        }
    };
    ($data:expr, $v:ident, $default:ident => $body:expr) => {
        match $data {
            FieldData::Scalar($v, $default) => $body,
            FieldData::Vector($v, $default) => $body,
            FieldData::Integer($v, $default) => $body,
        }
    };
}

impl<const D: usize> FieldData<D> {
    pub fn len(&self) -> usize {
        with_field_vec!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn swap(&mut self, i: usize, j: usize) {
        with_field_vec!(self, v => v.swap(i, j))
    }

    fn copy_particle(&mut self, dst: usize, src: usize) {
        with_field_vec!(self, v => v[dst] = v[src])
    }

    fn reset_particle(&mut self, i: usize) {
        with_field_vec!(self, v, default => v[i] = *default)
    }

    fn push_default(&mut self) {
        with_field_vec!(self, v, default => v.push(*default))
    }

    fn try_reserve(&mut self, additional: usize) -> std::result::Result<(), TryReserveError> {
        with_field_vec!(self, v => v.try_reserve(additional))
    }

    fn permute(&mut self, order: &[usize]) {
        with_field_vec!(self, v => {
            let permuted: Vec<_> = order.iter().map(|&k| v[k]).collect();
            v[..order.len()].copy_from_slice(&permuted);
        })
    }
}

/**
 * Columnar storage of all particles of one body.
 *
 * Index layout:
 *   [0, total_real_particles)                  real particles
 *   [total_real_particles, real_particles_bound) inactive buffer slots
 *   [real_particles_bound, +total_ghost_particles) ghosts, recreated every update
 *
 * `unsorted_id[slot]` is the stable identity of the particle stored in `slot` and
 * `sorted_id[identity]` is its current slot. A ghost slot maps through `sorted_id` to the
 * real particle it mirrors.
 */
pub struct ParticleStore<const D: usize> {
    body_name: String,
    pub fields: ParticleFields<D>,
    extra_fields: Vec<(String, FieldData<D>)>,

    total_real_particles: usize,
    real_particles_bound: usize,
    total_ghost_particles: usize,

    sorted_id: Vec<usize>,
    unsorted_id: Vec<usize>,
}

impl<const D: usize> ParticleStore<D> {
    pub fn new(body_name: &str, positions: Vec<VF<D>>, volumes: Vec<FT>, rest_density: FT) -> Result<Self> {
        if positions.len() != volumes.len() {
            return Err(TopologyError::FieldLengthMismatch {
                body: body_name.to_string(),
                field: "Volume".to_string(),
                expected: positions.len(),
                found: volumes.len(),
            });
        }

        let num_particles = positions.len();
        let mut fields = ParticleFields::default(num_particles);
        fields.mass = volumes.iter().map(|v| v * rest_density).collect();
        fields.density = vec![rest_density; num_particles];
        fields.position = positions;
        fields.volume = volumes;

        debug!(body = body_name, particles = num_particles, "created particle store");

        Ok(ParticleStore {
            body_name: body_name.to_string(),
            fields,
            extra_fields: Vec::new(),
            total_real_particles: num_particles,
            real_particles_bound: num_particles,
            total_ghost_particles: 0,
            sorted_id: (0..num_particles).collect(),
            unsorted_id: (0..num_particles).collect(),
        })
    }

    pub fn with_uniform_volume(body_name: &str, positions: Vec<VF<D>>, volume: FT, rest_density: FT) -> Result<Self> {
        let volumes = vec![volume; positions.len()];
        Self::new(body_name, positions, volumes, rest_density)
    }

    pub fn body_name(&self) -> &str {
        &self.body_name
    }

    pub fn total_real_particles(&self) -> usize {
        self.total_real_particles
    }

    pub fn real_particles_bound(&self) -> usize {
        self.real_particles_bound
    }

    pub fn total_ghost_particles(&self) -> usize {
        self.total_ghost_particles
    }

    /// Number of slots in use: real, buffer and ghost.
    pub fn total_particles(&self) -> usize {
        self.real_particles_bound + self.total_ghost_particles
    }

    /// Length of every field array, may exceed `total_particles` by stale ghost slots.
    pub fn allocated_len(&self) -> usize {
        self.unsorted_id.len()
    }

    pub fn ghost_range(&self) -> std::ops::Range<usize> {
        self.real_particles_bound..self.total_particles()
    }

    pub fn position(&self) -> &[VF<D>] {
        &self.fields.position
    }

    pub fn h_ratio(&self) -> &[FT] {
        &self.fields.h_ratio
    }

    pub fn sorted_id(&self) -> &[usize] {
        &self.sorted_id
    }

    pub fn unsorted_id(&self) -> &[usize] {
        &self.unsorted_id
    }

    /// The real particle a ghost slot mirrors.
    pub fn ghost_source(&self, index: usize) -> Option<usize> {
        if self.ghost_range().contains(&index) {
            Some(self.sorted_id[index])
        } else {
            None
        }
    }

    fn try_reserve_all(&mut self, additional: usize) -> std::result::Result<(), TryReserveError> {
        self.fields.try_reserve(additional)?;
        for (_, data) in &mut self.extra_fields {
            data.try_reserve(additional)?;
        }
        self.sorted_id.try_reserve(additional)?;
        self.unsorted_id.try_reserve(additional)
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.try_reserve_all(additional)
            .map_err(|source| TopologyError::Allocation {
                what: "particle entries",
                source,
            })
    }

    fn push_entry(&mut self) {
        let slot = self.allocated_len();
        self.fields.push_default();
        for (_, data) in &mut self.extra_fields {
            data.push_default();
        }
        self.unsorted_id.push(slot);
        self.sorted_id.push(slot);
    }

    fn reset_slot(&mut self, slot: usize) {
        self.fields.reset_particle(slot);
        for (_, data) in &mut self.extra_fields {
            data.reset_particle(slot);
        }
        self.unsorted_id[slot] = slot;
        self.sorted_id[slot] = slot;
    }

    pub fn copy_particle(&mut self, dst: usize, src: usize) {
        self.fields.copy_particle(dst, src);
        for (_, data) in &mut self.extra_fields {
            data.copy_particle(dst, src);
        }
    }

    fn ensure_no_ghosts(&self, operation: &str) -> Result<()> {
        if self.total_ghost_particles != 0 {
            return Err(TopologyError::InvalidBody {
                body: self.body_name.clone(),
                reason: format!(
                    "{} requires the {} ghost particles to be cleared first",
                    operation, self.total_ghost_particles
                ),
            });
        }
        Ok(())
    }

    /// Reserves `buffer_size` inactive slots behind the real particles.
    pub fn add_buffer_particles(&mut self, buffer_size: usize) -> Result<()> {
        self.ensure_no_ghosts("reserving buffer particles")?;

        let new_bound = self.real_particles_bound + buffer_size;
        self.reserve(new_bound.saturating_sub(self.allocated_len()))?;
        for slot in self.real_particles_bound..new_bound {
            if slot < self.allocated_len() {
                self.reset_slot(slot);
            } else {
                self.push_entry();
            }
        }
        self.real_particles_bound = new_bound;

        debug!(body = %self.body_name, buffer_size, bound = new_bound, "reserved buffer particles");
        Ok(())
    }

    /// Appends one real particle with default field values and returns its index.
    ///
    /// A free buffer slot is used if there is one, otherwise the storage grows by one entry.
    pub fn add_entry(&mut self) -> Result<usize> {
        let index = self.total_real_particles;
        if index == self.real_particles_bound {
            self.ensure_no_ghosts("growing the particle storage")?;
            if index == self.allocated_len() {
                self.reserve(1)?;
                self.push_entry();
            } else {
                self.reset_slot(index);
            }
            self.real_particles_bound += 1;
        } else {
            self.fields.reset_particle(index);
            for (_, data) in &mut self.extra_fields {
                data.reset_particle(index);
            }
        }
        self.total_real_particles += 1;
        trace!(body = %self.body_name, index, "added particle entry");
        Ok(index)
    }

    /// Turns the next buffer slot into a real particle copied from `copy_from`.
    pub fn activate_buffer_particle(&mut self, copy_from: usize) -> Result<usize> {
        self.check_real(copy_from)?;
        if self.total_real_particles == self.real_particles_bound {
            return Err(TopologyError::BufferExhausted {
                body: self.body_name.clone(),
                bound: self.real_particles_bound,
            });
        }
        let index = self.total_real_particles;
        self.copy_particle(index, copy_from);
        self.total_real_particles += 1;
        trace!(body = %self.body_name, index, copy_from, "activated buffer particle");
        Ok(index)
    }

    /// Moves particle `index` out of the real range by swapping it with the last real particle.
    ///
    /// The last real particle takes over slot `index`, so callers holding indices must
    /// treat the former last index as renamed to `index`.
    pub fn remove_entry(&mut self, index: usize) -> Result<()> {
        self.check_real(index)?;
        let last = self.total_real_particles - 1;
        if index < last {
            self.fields.swap(index, last);
            for (_, data) in &mut self.extra_fields {
                data.swap(index, last);
            }
            self.unsorted_id.swap(index, last);
            self.sorted_id[self.unsorted_id[index]] = index;
            self.sorted_id[self.unsorted_id[last]] = last;
        }
        self.total_real_particles -= 1;
        trace!(body = %self.body_name, index, "removed particle entry");
        Ok(())
    }

    /// Appends a ghost mirroring particle `source` and returns the ghost slot.
    ///
    /// `source` may itself be a ghost, the new ghost then maps to the same real particle.
    pub fn insert_ghost(&mut self, source: usize) -> Result<usize> {
        if source >= self.total_particles() || (source >= self.total_real_particles && source < self.real_particles_bound) {
            return Err(TopologyError::NotARealParticle {
                body: self.body_name.clone(),
                index: source,
                total_real: self.total_real_particles,
            });
        }
        let real_index = self.ghost_source(source).unwrap_or(source);

        let slot = self.total_particles();
        if slot == self.allocated_len() {
            self.reserve(1)?;
            self.push_entry();
        }
        self.copy_particle(slot, source);
        self.unsorted_id[slot] = slot;
        self.sorted_id[slot] = real_index;
        self.total_ghost_particles += 1;
        Ok(slot)
    }

    pub fn clear_ghosts(&mut self) {
        self.total_ghost_particles = 0;
    }

    fn check_real(&self, index: usize) -> Result<()> {
        if index >= self.total_real_particles {
            return Err(TopologyError::NotARealParticle {
                body: self.body_name.clone(),
                index,
                total_real: self.total_real_particles,
            });
        }
        Ok(())
    }

    /// Reorders the real particles so that slot `k` receives the particle from slot `order[k]`.
    pub(crate) fn permute_real_particles(&mut self, order: &[usize]) {
        assert_eq!(order.len(), self.total_real_particles, "permutation must cover all real particles");

        self.fields.permute(order);
        for (_, data) in &mut self.extra_fields {
            data.permute(order);
        }
        let unsorted: Vec<usize> = order.iter().map(|&k| self.unsorted_id[k]).collect();
        self.unsorted_id[..order.len()].copy_from_slice(&unsorted);
        for (slot, &identity) in unsorted.iter().enumerate() {
            self.sorted_id[identity] = slot;
        }
    }

    fn has_field(&self, name: &str) -> bool {
        ParticleFields::<D>::NAMES.contains(&name) || self.extra_fields.iter().any(|(n, _)| n == name)
    }

    fn register(&mut self, name: &str, mut data: FieldData<D>) -> Result<()> {
        if self.has_field(name) {
            return Err(TopologyError::DuplicateField {
                body: self.body_name.clone(),
                field: name.to_string(),
            });
        }
        for _ in data.len()..self.allocated_len() {
            data.push_default();
        }
        self.extra_fields.push((name.to_string(), data));
        debug!(body = %self.body_name, field = name, "registered particle field");
        Ok(())
    }

    pub fn register_scalar(&mut self, name: &str, initial: FT) -> Result<()> {
        self.register(name, FieldData::Scalar(vec![initial; self.allocated_len()], initial))
    }

    pub fn register_vector(&mut self, name: &str, initial: VF<D>) -> Result<()> {
        self.register(name, FieldData::Vector(vec![initial; self.allocated_len()], initial))
    }

    pub fn register_integer(&mut self, name: &str, initial: i32) -> Result<()> {
        self.register(name, FieldData::Integer(vec![initial; self.allocated_len()], initial))
    }

    fn unknown_field(&self, name: &str) -> TopologyError {
        TopologyError::UnknownField {
            body: self.body_name.clone(),
            field: name.to_string(),
        }
    }

    fn extra_field(&self, name: &str) -> Option<&FieldData<D>> {
        self.extra_fields.iter().find(|(n, _)| n == name).map(|(_, data)| data)
    }

    fn extra_field_mut(&mut self, name: &str) -> Option<&mut FieldData<D>> {
        self.extra_fields.iter_mut().find(|(n, _)| n == name).map(|(_, data)| data)
    }

    pub fn scalar(&self, name: &str) -> Result<&[FT]> {
        match name {
            "Mass" => Ok(&self.fields.mass),
            "Volume" => Ok(&self.fields.volume),
            "Density" => Ok(&self.fields.density),
            "SmoothingLengthRatio" => Ok(&self.fields.h_ratio),
            _ => match self.extra_field(name) {
                Some(FieldData::Scalar(v, _)) => Ok(v),
                _ => Err(self.unknown_field(name)),
            },
        }
    }

    pub fn scalar_mut(&mut self, name: &str) -> Result<&mut [FT]> {
        match name {
            "Mass" => Ok(&mut self.fields.mass),
            "Volume" => Ok(&mut self.fields.volume),
            "Density" => Ok(&mut self.fields.density),
            "SmoothingLengthRatio" => Ok(&mut self.fields.h_ratio),
            _ => {
                let error = self.unknown_field(name);
                match self.extra_field_mut(name) {
                    Some(FieldData::Scalar(v, _)) => Ok(v),
                    _ => Err(error),
                }
            }
        }
    }

    pub fn vector(&self, name: &str) -> Result<&[VF<D>]> {
        match name {
            "Position" => Ok(&self.fields.position),
            "Velocity" => Ok(&self.fields.velocity),
            "Acceleration" => Ok(&self.fields.acceleration),
            _ => match self.extra_field(name) {
                Some(FieldData::Vector(v, _)) => Ok(v),
                _ => Err(self.unknown_field(name)),
            },
        }
    }

    pub fn vector_mut(&mut self, name: &str) -> Result<&mut [VF<D>]> {
        match name {
            "Position" => Ok(&mut self.fields.position),
            "Velocity" => Ok(&mut self.fields.velocity),
            "Acceleration" => Ok(&mut self.fields.acceleration),
            _ => {
                let error = self.unknown_field(name);
                match self.extra_field_mut(name) {
                    Some(FieldData::Vector(v, _)) => Ok(v),
                    _ => Err(error),
                }
            }
        }
    }

    pub fn integer(&self, name: &str) -> Result<&[i32]> {
        match self.extra_field(name) {
            Some(FieldData::Integer(v, _)) => Ok(v),
            _ => Err(self.unknown_field(name)),
        }
    }

    pub fn integer_mut(&mut self, name: &str) -> Result<&mut [i32]> {
        let error = self.unknown_field(name);
        match self.extra_field_mut(name) {
            Some(FieldData::Integer(v, _)) => Ok(v),
            _ => Err(error),
        }
    }

    /// Names of every per-particle array, core fields first.
    pub fn field_names(&self) -> Vec<&str> {
        ParticleFields::<D>::NAMES
            .iter()
            .copied()
            .chain(self.extra_fields.iter().map(|(n, _)| n.as_str()))
            .collect()
    }

    /// Verifies that every array has the same length and that the counters fit inside it.
    pub fn check_consistency(&self) -> Result<()> {
        let expected = self.allocated_len();
        let mut lengths: Vec<(&str, usize)> = self.fields.lengths();
        lengths.extend(self.extra_fields.iter().map(|(name, data)| (name.as_str(), data.len())));
        lengths.push(("SortedId", self.sorted_id.len()));

        for (field, found) in lengths {
            if found != expected {
                return Err(TopologyError::FieldLengthMismatch {
                    body: self.body_name.clone(),
                    field: field.to_string(),
                    expected,
                    found,
                });
            }
        }

        if self.total_real_particles > self.real_particles_bound || self.total_particles() > expected {
            return Err(TopologyError::InvalidBody {
                body: self.body_name.clone(),
                reason: format!(
                    "particle counters out of range: real={} bound={} ghosts={} allocated={}",
                    self.total_real_particles, self.real_particles_bound, self.total_ghost_particles, expected
                ),
            });
        }
        Ok(())
    }
}
