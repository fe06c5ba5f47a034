use crate::{floating_type_mod::FT, V2};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulationMethod {
    /// Pressure from a state equation.
    SESPH,
    /// Implicit incompressible SPH with a relaxed Jacobi solver.
    IISPH,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundaryHandling {
    /// Boundary pressure is fitted from the surrounding fluid pressure.
    Extrapolation,
    /// Boundary particles reflect the pressure of the fluid particle that sees them.
    Mirroring,
    /// Boundary particles have no pressure.
    Zero,
}

/**
 * Global settings. These are passed by value into every step and do not change during a
 * step.
 *
 * Gravity points along +y, which is "down" in screen coordinates.
 */
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationSettings {
    pub time_step: FT,
    pub gravity: FT,
    pub fluid_viscosity: FT,
    pub boundary_viscosity: FT,

    // only used for SESPH
    pub fluid_stiffness: FT,

    // only used for IISPH
    pub relaxation_coefficient: FT,
    /// average estimated compression in percent at which the solver stops
    pub min_error: FT,
    pub max_iterations: usize,
    pub warm_start: bool,

    pub simulation_method: SimulationMethod,
    pub boundary_handling: BoundaryHandling,

    /// scales the boundary particle masses at renormalization
    pub gamma1: FT,
    /// scales boundary contributions to the density
    pub gamma2: FT,
    /// scales boundary contributions to the pressure acceleration
    pub gamma3: FT,

    pub parallel: bool,

    pub dynamic_time_step: bool,
    pub max_time_step: FT,
    /// fraction of the particle diameter a particle may travel in a single step
    pub max_cfl: FT,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            time_step: 0.1,
            gravity: 0.3,
            fluid_viscosity: 30.,
            boundary_viscosity: 30.,
            fluid_stiffness: 2000.,
            relaxation_coefficient: 0.5,
            min_error: 0.1,
            max_iterations: 100,
            warm_start: false,
            simulation_method: SimulationMethod::SESPH,
            boundary_handling: BoundaryHandling::Extrapolation,
            gamma1: 1.,
            gamma2: 1.,
            gamma3: 1.,
            parallel: true,
            dynamic_time_step: false,
            max_time_step: 0.2,
            max_cfl: 0.5,
        }
    }
}

impl SimulationSettings {
    pub fn gravity_vector(&self) -> V2 {
        V2::new(0., self.gravity)
    }

    /**
     * Time step for the next step given the maximum fluid velocity of the last one.
     *
     * With dynamic stepping this is `min(max_time_step, max_cfl * diameter / max_velocity)`,
     * a fluid at rest uses `max_time_step`.
     */
    pub fn time_step_for(&self, diameter: FT, max_velocity: FT) -> FT {
        if !self.dynamic_time_step {
            return self.time_step;
        }
        if max_velocity <= 0. || !max_velocity.is_finite() {
            return self.max_time_step;
        }
        FT::min(self.max_time_step, self.max_cfl * diameter / max_velocity)
    }
}
