use crate::{
    boundary_handler::BoundaryHandler, concurrency::Scheduler, error::SimulationError, floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache, particle::ParticleVec, simulation_parameters::SimulationSettings,
    sph_components::{density_error, state_equation_pressure},
};

use super::{check_pressure, PressureSolveOutcome};

/**
 * Pressure from the state equation `p = max(k (ρ/ρ0 - 1), 0)` followed by a single
 * pressure acceleration pass. Densities have to be up to date.
 */
pub fn solve(
    particles: &mut ParticleVec,
    neighs: &NeighborhoodCache,
    boundary_handler: &BoundaryHandler,
    settings: &SimulationSettings,
    h: FT,
    scheduler: Scheduler,
) -> Result<PressureSolveOutcome, SimulationError> {
    let stiffness = settings.fluid_stiffness;

    {
        let ParticleVec {
            density,
            rest_density,
            is_boundary,
            pressure,
            estimated_compression,
            ..
        } = particles;
        let (density, rest_density, is_boundary) = (&density[..], &rest_density[..], &is_boundary[..]);

        scheduler.for_each_mut2(pressure, estimated_compression, |i, p, compression| {
            if is_boundary[i] {
                return;
            }
            *p = state_equation_pressure(density[i], rest_density[i], stiffness);
            *compression = FT::max(density_error(density[i], rest_density[i]), 0.);
        });
    }
    check_pressure(&particles.pressure)?;

    boundary_handler.compute_pressure_accel(particles, neighs, h, settings.gamma3, scheduler)?;

    let num_fluid_particles = particles.num_fluid_particles();
    let avg_compression = if num_fluid_particles == 0 {
        0.
    } else {
        particles
            .fluid_indices()
            .map(|i| particles.estimated_compression[i])
            .sum::<FT>()
            / num_fluid_particles as FT
    };

    Ok(PressureSolveOutcome {
        iterations: 0,
        converged: true,
        avg_compression,
    })
}

#[cfg(test)]
mod tests {
    use super::solve;
    use crate::{
        boundary_handler::BoundaryHandler, concurrency::Scheduler, floating_type_mod::FT,
        neighborhood_search::NeighborhoodCache, particle::ParticleVec,
        simulation_parameters::{BoundaryHandling, SimulationSettings},
        spatial_hash::SpatialHash, sph_kernels::CubicSpline, vec2f, V2,
    };

    #[test]
    fn compressed_particle_gets_pushed_apart() {
        let h = 1.;
        let mut particles = ParticleVec::default(0);
        for x in 0..3 {
            particles.push(vec2f(x as FT * h, 0.), V2::zeros(), h, 1., false);
        }
        let mut hash = SpatialHash::new(2. * h);
        for i in 0..particles.len() {
            hash.insert(i, particles.position[i]);
        }
        let mut neighs = NeighborhoodCache::new(particles.len());
        neighs.build(&hash, &particles.position, &CubicSpline::new(h), Scheduler::Sequential);

        particles.density = vec![0.5, 1.5, 0.5];
        let settings = SimulationSettings {
            parallel: false,
            ..Default::default()
        };
        let outcome = solve(
            &mut particles,
            &neighs,
            &BoundaryHandler::new(BoundaryHandling::Zero),
            &settings,
            h,
            Scheduler::Sequential,
        )
        .unwrap();

        assert_eq!(outcome.iterations, 0);
        assert_eq!(particles.pressure[0], 0.);
        assert_eq!(particles.pressure[2], 0.);
        assert!((particles.pressure[1] - 0.5 * settings.fluid_stiffness).abs() < 1e-2);
        assert!(particles.pressure_accel[0].x < 0.);
        assert!(particles.pressure_accel[2].x > 0.);
        assert!(particles.pressure_accel[1].x.abs() < 1e-3);
        assert!((outcome.avg_compression - 50. / 3.).abs() < 1e-3);
    }
}
