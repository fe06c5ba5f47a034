use tracing::{debug, warn};

use crate::{
    boundary_handler::BoundaryHandler,
    concurrency::Scheduler,
    error::SimulationError,
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    particle::ParticleVec,
    simulation_parameters::SimulationSettings,
    sph_components::{diagonal_element, pressure_laplacian, source_term},
};

use super::{check_pressure, PressureSolveOutcome, PressureSolverStatistics, AII_EPS};

/**
 * Solves the pressure Poisson equation `A p = s` with a relaxed Jacobi iteration.
 *
 * Expects up to date densities and intermediate velocities `v*`. Boundary particles need
 * their scripted velocity in `intermediate_velocity`. On return `pressure_accel` belongs to
 * the final pressure field.
 *
 * The iteration stops when the average estimated compression drops to `min_error` (after at
 * least two sweeps) or after `max_iterations` sweeps.
 */
pub fn solve(
    particles: &mut ParticleVec,
    neighs: &NeighborhoodCache,
    boundary_handler: &BoundaryHandler,
    settings: &SimulationSettings,
    dt: FT,
    h: FT,
    scheduler: Scheduler,
) -> Result<PressureSolveOutcome, SimulationError> {
    let omega = settings.relaxation_coefficient;
    let warm_start = settings.warm_start;

    {
        let ParticleVec {
            mass,
            density,
            rest_density,
            intermediate_velocity,
            is_boundary,
            aii,
            source_term: st,
            pressure,
            ..
        } = particles;
        let (mass, density, rest_density, intermediate_velocity, is_boundary) = (
            &mass[..],
            &density[..],
            &rest_density[..],
            &intermediate_velocity[..],
            &is_boundary[..],
        );

        scheduler.for_each_mut3(aii, st, pressure, |i, aii, st, p| {
            if is_boundary[i] {
                *aii = 0.;
                *st = 0.;
                return;
            }
            let neighs = neighs.list(i);
            *aii = diagonal_element(i, neighs, mass, density, is_boundary, dt);
            *st = source_term(i, neighs, mass, density, intermediate_velocity, rest_density[i], dt);

            *p = if warm_start {
                0.5 * *p
            } else if aii.abs() > AII_EPS {
                FT::max(omega * *st / *aii, 0.)
            } else {
                0.
            };
        });
    }
    check_pressure(&particles.pressure)?;

    let max_iterations = settings.max_iterations.max(1);
    let mut iterations = 0;
    let (converged, avg_compression) = loop {
        boundary_handler.compute_pressure_accel(particles, neighs, h, settings.gamma3, scheduler)?;

        let stats = {
            let ParticleVec {
                mass,
                rest_density,
                is_boundary,
                aii,
                source_term: st,
                pressure_accel,
                laplacian,
                pressure,
                estimated_compression,
                ..
            } = particles;
            let (mass, rest_density, is_boundary, aii, st, pressure_accel) = (
                &mass[..],
                &rest_density[..],
                &is_boundary[..],
                &aii[..],
                &st[..],
                &pressure_accel[..],
            );

            scheduler.reduce_mut3(
                laplacian,
                pressure,
                estimated_compression,
                PressureSolverStatistics::zero,
                PressureSolverStatistics::combine,
                |i, ap, p, compression| {
                    if is_boundary[i] {
                        return PressureSolverStatistics::zero();
                    }

                    *ap = pressure_laplacian(i, neighs.list(i), mass, pressure_accel, is_boundary, dt);

                    if aii[i].abs() <= AII_EPS {
                        *p = 0.;
                        *compression = 0.;
                        return PressureSolverStatistics::for_singular_particle();
                    }

                    *compression = FT::max(*ap - st[i], 0.) * dt / rest_density[i] * 100.;
                    *p = FT::max(*p + omega / aii[i] * (st[i] - *ap), 0.);

                    PressureSolverStatistics::for_fluid_particle(*compression)
                },
            )
        };
        check_pressure(&particles.pressure)?;
        iterations += 1;

        let avg_compression = stats.avg_compression();
        debug!(
            iteration = iterations,
            avg_compression,
            max_compression = stats.max_compression,
            singular_particles = stats.singular_particle_count,
            "pressure iteration"
        );

        if avg_compression <= settings.min_error && iterations >= 2 {
            break (true, avg_compression);
        }
        if iterations >= max_iterations {
            warn!(
                iterations,
                avg_compression,
                min_error = settings.min_error,
                "pressure solver not converged"
            );
            break (false, avg_compression);
        }
    };

    boundary_handler.compute_pressure_accel(particles, neighs, h, settings.gamma3, scheduler)?;

    Ok(PressureSolveOutcome {
        iterations,
        converged,
        avg_compression,
    })
}
