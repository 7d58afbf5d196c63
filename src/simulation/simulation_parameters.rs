use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{Result, TopologyError},
    floating_type_mod::FT,
};

/// Ordering used by the particle sorter to lay particles out in memory.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SortingKey {
    // linear cell index, x running fastest
    CellMajor,
    // interleaved cell coordinate bits
    Morton,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    pub domain_lower: Vec<FT>,
    pub domain_upper: Vec<FT>,

    // sort every n-th cell linked list update, 0 disables sorting
    pub sorting_interval: usize,
    pub sorting_key: SortingKey,

    // SLOW: verify every configuration update against an R-tree query
    pub check_neighborhood: bool,
}

impl Default for SystemParams {
    fn default() -> Self {
        SystemParams {
            domain_lower: vec![0., 0.],
            domain_upper: vec![1., 1.],
            sorting_interval: 100,
            sorting_key: SortingKey::CellMajor,
            check_neighborhood: false,
        }
    }
}

impl SystemParams {
    pub fn validate<const D: usize>(&self) -> Result<()> {
        if self.domain_lower.len() != D || self.domain_upper.len() != D {
            return Err(TopologyError::InvalidConfig(format!(
                "domain bounds need {} components, got {} and {}",
                D,
                self.domain_lower.len(),
                self.domain_upper.len()
            )));
        }
        for d in 0..D {
            if !(self.domain_upper[d] > self.domain_lower[d]) {
                return Err(TopologyError::InvalidConfig(format!(
                    "empty domain along axis {}: [{}, {}]",
                    d, self.domain_lower[d], self.domain_upper[d]
                )));
            }
        }
        Ok(())
    }
}

/// One periodic axis of a body, particles are wrapped into `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodicAxisParams {
    pub axis: usize,
    pub lower: FT,
    pub upper: FT,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyParams {
    pub name: String,

    // reference smoothing length of the body kernel
    pub smoothing_length: FT,

    // defaults to one reference cutoff radius
    pub cell_size: Option<FT>,

    // inactive slots reserved behind the real particles
    pub buffer_size: usize,

    // per-particle smoothing length ratio drives the search depth
    pub adaptive: bool,

    pub periodic: Vec<PeriodicAxisParams>,
}

impl Default for BodyParams {
    fn default() -> Self {
        BodyParams {
            name: "body".to_string(),
            smoothing_length: 0.01,
            cell_size: None,
            buffer_size: 0,
            adaptive: false,
            periodic: Vec::new(),
        }
    }
}

impl BodyParams {
    pub fn new(name: &str, smoothing_length: FT) -> Self {
        BodyParams {
            name: name.to_string(),
            smoothing_length,
            ..Default::default()
        }
    }

    pub fn validate<const D: usize>(&self) -> Result<()> {
        let invalid = |reason: String| TopologyError::InvalidBody {
            body: self.name.clone(),
            reason,
        };

        if !(self.smoothing_length.is_finite() && self.smoothing_length > 0.) {
            return Err(invalid(format!(
                "smoothing length must be positive, got {}",
                self.smoothing_length
            )));
        }
        if let Some(cell_size) = self.cell_size {
            if !(cell_size.is_finite() && cell_size > 0.) {
                return Err(invalid(format!("cell size must be positive, got {}", cell_size)));
            }
        }
        for periodic in &self.periodic {
            if periodic.axis >= D {
                return Err(invalid(format!(
                    "periodic axis {} does not exist in {}D",
                    periodic.axis, D
                )));
            }
            if !(periodic.upper > periodic.lower) {
                return Err(invalid(format!(
                    "periodic axis {} has empty range [{}, {}]",
                    periodic.axis, periodic.lower, periodic.upper
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    pub system: SystemParams,
    pub bodies: Vec<BodyParams>,
}

impl TopologyConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        info!(
            bodies = config.bodies.len(),
            sorting_interval = config.system.sorting_interval,
            "loaded topology configuration"
        );
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }
}
