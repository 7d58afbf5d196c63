//! Ad hoc point queries on a body's grid, outside the relation machinery.

use std::cmp::Ordering;

use crate::{
    body::Body,
    error::Result,
    floating_type_mod::FT,
    search_depth::{ContactDepth, SearchDepthPolicy},
    sph_kernels::DimensionUtils,
    VF, WEIGHT_EPSILON,
};

fn probe_depth<DU: DimensionUtils<D>, const D: usize>(body: &Body<DU, D>) -> i32 {
    ContactDepth::new(body.kernel().cutoff_radius(), body.cell_linked_list().cell_size()).search_depth(0, &[])
}

/// Kernel weights `W_j V_j` of all particles within one reference cutoff of `point`.
fn weights<DU: DimensionUtils<D>, const D: usize>(body: &Body<DU, D>, point: &VF<D>) -> Vec<(usize, FT)> {
    let kernel = body.kernel();
    let h = kernel.smoothing_length();
    let cutoff = kernel.cutoff_radius();
    let volume = &body.particles().fields.volume;

    body.cell_linked_list()
        .query_range(point, probe_depth(body))
        .filter_map(|(j, p_j)| {
            let r = (point - p_j).norm();
            if r < cutoff {
                Some((j, kernel.w(r, h) * volume[j]))
            } else {
                None
            }
        })
        .collect()
}

/// Shepard interpolation of the scalar field `field` at `point`, zero where no particle is near.
pub fn interpolate_scalar<DU: DimensionUtils<D>, const D: usize>(
    body: &Body<DU, D>,
    field: &str,
    point: &VF<D>,
) -> Result<FT> {
    let values = body.particles().scalar(field)?;
    let weights = weights(body, point);

    let total: FT = weights.iter().map(|&(_, w)| w).sum();
    let sum: FT = weights.iter().map(|&(j, w)| w * values[j]).sum();
    Ok(sum / total.max(WEIGHT_EPSILON))
}

pub fn interpolate_vector<DU: DimensionUtils<D>, const D: usize>(
    body: &Body<DU, D>,
    field: &str,
    point: &VF<D>,
) -> Result<VF<D>> {
    let values = body.particles().vector(field)?;
    let weights = weights(body, point);

    let total: FT = weights.iter().map(|&(_, w)| w).sum();
    let sum = weights
        .iter()
        .fold(VF::<D>::zeros(), |acc, &(j, w)| acc + values[j] * w);
    Ok(sum / total.max(WEIGHT_EPSILON))
}

/// Closest real or ghost particle within one reference cutoff, with its distance.
pub fn nearest_particle<DU: DimensionUtils<D>, const D: usize>(body: &Body<DU, D>, point: &VF<D>) -> Option<(usize, FT)> {
    let cutoff = body.kernel().cutoff_radius();
    body.cell_linked_list()
        .query_range(point, probe_depth(body))
        .map(|(j, p_j)| (j, (point - p_j).norm()))
        .filter(|&(_, r)| r < cutoff)
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assert_ft_approx_eq,
        particles::ParticleStore,
        simulation_parameters::{BodyParams, SystemParams},
        sph_kernels::DimensionUtils2d,
        vec2f, V2,
    };

    fn lattice_body() -> Body<DimensionUtils2d, 2> {
        let dp = 0.05;
        let mut positions: Vec<V2> = Vec::new();
        for y in 0..20 {
            for x in 0..20 {
                positions.push(vec2f((x as FT + 0.5) * dp, (y as FT + 0.5) * dp));
            }
        }
        let mut particles = ParticleStore::with_uniform_volume("probe", positions, dp * dp, 1000.).unwrap();
        let xs: Vec<FT> = particles.position().iter().map(|p| p.x).collect();
        particles.register_scalar("Temperature", 0.).unwrap();
        particles.scalar_mut("Temperature").unwrap().copy_from_slice(&xs);
        for (v, p) in particles.fields.velocity.iter_mut().zip(xs.iter()) {
            *v = vec2f(1., 2. * p);
        }
        Body::new(&BodyParams::new("probe", 0.06), &SystemParams::default(), particles).unwrap()
    }

    #[test]
    fn linear_fields_are_reproduced_in_the_interior() {
        let body = lattice_body();
        // halfway between four lattice sites, the stencil is symmetric
        let point = vec2f(0.5, 0.5);
        let t = interpolate_scalar(&body, "Temperature", &point).unwrap();
        assert_ft_approx_eq(t, 0.5, 1.0e-4, || "interpolated temperature".to_string());

        let v = interpolate_vector(&body, "Velocity", &point).unwrap();
        assert_ft_approx_eq(v.x, 1., 1.0e-4, || "interpolated velocity x".to_string());
        assert_ft_approx_eq(v.y, 1., 2.0e-4, || "interpolated velocity y".to_string());
    }

    #[test]
    fn empty_neighborhood_interpolates_to_zero() {
        let body = lattice_body();
        let far = vec2f(5., 5.);
        assert_eq!(interpolate_scalar(&body, "Temperature", &far).unwrap(), 0.);
        assert_eq!(interpolate_vector(&body, "Velocity", &far).unwrap(), vec2f(0., 0.));
        assert!(nearest_particle(&body, &far).is_none());
        assert!(interpolate_scalar(&body, "Pressure", &vec2f(0.5, 0.5)).is_err());
    }

    #[test]
    fn nearest_particle_is_found() {
        let body = lattice_body();
        let (j, r) = nearest_particle(&body, &vec2f(0.235, 0.765)).unwrap();
        assert_ft_approx_eq(r, (0.01 as FT).hypot(0.01), 1.0e-5, || "nearest distance".to_string());
        let p = body.particles().position()[j];
        assert_ft_approx_eq(p.x, 0.225, 1.0e-5, || "nearest x".to_string());
        assert_ft_approx_eq(p.y, 0.775, 1.0e-5, || "nearest y".to_string());
    }
}
