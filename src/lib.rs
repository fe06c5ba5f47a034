/*!
Two-dimensional SPH fluid sandbox.

The solver advances a set of fluid and boundary particles with either an explicit
state-equation solver (SESPH) or the implicit incompressible solver (IISPH). Neighbors
are found through a uniform spatial hash, boundary pressure is handled by mirroring,
zeroing or a moving-least-squares extrapolation.
*/

mod platform;
mod simulation;

pub use simulation::*;

pub use platform::start;
