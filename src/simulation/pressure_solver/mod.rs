pub mod iisph;
pub mod sesph;

use crate::{error::SimulationError, floating_type_mod::FT};

/// Diagonal elements with a smaller magnitude make the Jacobi update degenerate.
pub const AII_EPS: FT = 1e-6;

/// What the pressure solve of one step reports back to the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSolveOutcome {
    /// zero for solvers without an iteration
    pub iterations: usize,
    pub converged: bool,
    /// average estimated compression of the fluid in percent
    pub avg_compression: FT,
}

/// Statistics of one Jacobi sweep, reduced over all particles.
#[derive(Debug, Clone, Copy)]
struct PressureSolverStatistics {
    fluid_particle_count: usize,

    // particles where the denominator in the jacobi update is close to zero
    singular_particle_count: usize,

    compression_sum: FT,
    max_compression: FT,
}

impl PressureSolverStatistics {
    fn zero() -> PressureSolverStatistics {
        PressureSolverStatistics {
            fluid_particle_count: 0,
            singular_particle_count: 0,
            compression_sum: 0.,
            max_compression: 0.,
        }
    }

    fn for_singular_particle() -> PressureSolverStatistics {
        PressureSolverStatistics {
            fluid_particle_count: 1,
            singular_particle_count: 1,
            ..Self::zero()
        }
    }

    fn for_fluid_particle(compression: FT) -> PressureSolverStatistics {
        PressureSolverStatistics {
            fluid_particle_count: 1,
            compression_sum: compression,
            max_compression: compression,
            ..Self::zero()
        }
    }

    fn combine(self, other: PressureSolverStatistics) -> PressureSolverStatistics {
        PressureSolverStatistics {
            fluid_particle_count: self.fluid_particle_count + other.fluid_particle_count,
            singular_particle_count: self.singular_particle_count + other.singular_particle_count,
            compression_sum: self.compression_sum + other.compression_sum,
            max_compression: FT::max(self.max_compression, other.max_compression),
        }
    }

    fn avg_compression(&self) -> FT {
        if self.fluid_particle_count == 0 {
            0.
        } else {
            self.compression_sum / self.fluid_particle_count as FT
        }
    }
}

pub(crate) fn check_pressure(pressure: &[FT]) -> Result<(), SimulationError> {
    match pressure.iter().position(|p| !p.is_finite()) {
        Some(particle) => Err(SimulationError::InvalidPressure {
            particle,
            pressure: pressure[particle],
        }),
        None => Ok(()),
    }
}
