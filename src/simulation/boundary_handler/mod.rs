use enum_dispatch::enum_dispatch;

use crate::{
    concurrency::Scheduler,
    error::SimulationError,
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    particle::ParticleVec,
    simulation_parameters::BoundaryHandling,
    sph_components::{self, extrapolate_pressure},
    V2,
};

/// Decides how boundary particles take part in the pressure acceleration of fluid particles.
#[enum_dispatch]
#[allow(unused_variables)]
pub trait BoundaryHandlerTrait {
    /// Runs before every pressure acceleration pass and may set the pressure of boundary
    /// particles.
    fn update_boundary_pressure(&self, particles: &mut ParticleVec, neighs: &NeighborhoodCache, h: FT, scheduler: Scheduler) {}

    /// Replaces `p_i/ρ_i² + p_b/ρ_b²` for a boundary neighbor `b`.
    fn boundary_term(&self, p_i: FT, p_b: FT) -> FT;
}

/// Boundary pressure is fitted from the fluid around every boundary particle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PressureExtrapolation;

impl BoundaryHandlerTrait for PressureExtrapolation {
    fn update_boundary_pressure(&self, particles: &mut ParticleVec, neighs: &NeighborhoodCache, h: FT, scheduler: Scheduler) {
        let ParticleVec {
            position,
            mass,
            density,
            pressure,
            pressure_next_iter,
            is_boundary,
            ..
        } = particles;

        {
            let (position, mass, density, pressure, is_boundary) =
                (&position[..], &mass[..], &density[..], &pressure[..], &is_boundary[..]);
            scheduler.for_each_mut1(pressure_next_iter, |i, p_next| {
                *p_next = if is_boundary[i] {
                    extrapolate_pressure(i, neighs.list(i), position, mass, density, pressure, is_boundary, h)
                } else {
                    pressure[i]
                };
            });
        }

        std::mem::swap(pressure, pressure_next_iter);
    }

    fn boundary_term(&self, p_i: FT, p_b: FT) -> FT {
        p_i + p_b
    }
}

/// The fluid particle sees its own pressure on the boundary.
#[derive(Debug, Clone, Copy, Default)]
pub struct PressureMirroring;

impl BoundaryHandlerTrait for PressureMirroring {
    fn boundary_term(&self, p_i: FT, _p_b: FT) -> FT {
        2. * p_i
    }
}

/// Boundary particles keep zero pressure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroBoundaryPressure;

impl BoundaryHandlerTrait for ZeroBoundaryPressure {
    fn update_boundary_pressure(&self, particles: &mut ParticleVec, _neighs: &NeighborhoodCache, _h: FT, scheduler: Scheduler) {
        let ParticleVec { pressure, is_boundary, .. } = particles;
        let is_boundary = &is_boundary[..];
        scheduler.for_each_mut1(pressure, |i, p| {
            if is_boundary[i] {
                *p = 0.;
            }
        });
    }

    fn boundary_term(&self, p_i: FT, p_b: FT) -> FT {
        p_i + p_b
    }
}

#[enum_dispatch(BoundaryHandlerTrait)]
#[derive(Debug, Clone, Copy)]
pub enum BoundaryHandler {
    PressureExtrapolation,
    PressureMirroring,
    ZeroBoundaryPressure,
}

impl BoundaryHandler {
    pub fn new(boundary_handling: BoundaryHandling) -> Self {
        match boundary_handling {
            BoundaryHandling::Extrapolation => PressureExtrapolation.into(),
            BoundaryHandling::Mirroring => PressureMirroring.into(),
            BoundaryHandling::Zero => ZeroBoundaryPressure.into(),
        }
    }

    /**
     * Updates the boundary pressure and writes the pressure acceleration of every fluid
     * particle. Boundary particles get a zero acceleration.
     */
    pub fn compute_pressure_accel(
        &self,
        particles: &mut ParticleVec,
        neighs: &NeighborhoodCache,
        h: FT,
        gamma3: FT,
        scheduler: Scheduler,
    ) -> Result<(), SimulationError> {
        self.update_boundary_pressure(particles, neighs, h, scheduler);

        let ParticleVec {
            mass,
            density,
            pressure,
            is_boundary,
            pressure_accel,
            ..
        } = particles;

        {
            let (mass, density, pressure, is_boundary) = (&mass[..], &density[..], &pressure[..], &is_boundary[..]);
            scheduler.for_each_mut1(pressure_accel, |i, accel| {
                *accel = if is_boundary[i] {
                    V2::zeros()
                } else {
                    sph_components::pressure_accel(
                        i,
                        neighs.list(i),
                        mass,
                        density,
                        pressure,
                        is_boundary,
                        gamma3,
                        |p_i, p_b| self.boundary_term(p_i, p_b),
                    )
                };
            });
        }

        match pressure_accel.iter().position(|a| !a.x.is_finite() || !a.y.is_finite()) {
            Some(particle) => Err(SimulationError::InvalidAcceleration { particle }),
            None => Ok(()),
        }
    }
}
