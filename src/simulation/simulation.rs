use std::{
    fmt,
    time::{Duration, Instant},
};

use tracing::{debug, error};

use crate::{
    body::Body,
    boundary_handler::BoundaryHandler,
    color_map::{self, VisualizedAttribute},
    concurrency::Scheduler,
    error::SimulationError,
    floating_type_mod::FT,
    neighborhood_search::NeighborhoodCache,
    particle::ParticleVec,
    pressure_solver::{iisph, sesph, PressureSolveOutcome},
    simulation_parameters::{SimulationMethod, SimulationSettings},
    spatial_hash::SpatialHash,
    sph_components::{density, density_error, viscosity_accel},
    sph_kernels::CubicSpline,
    V, V2,
};

/// Statistics of a single simulation step.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverState {
    /// pressure solver iterations, always 0 for SESPH
    pub iterations: usize,
    pub converged: bool,

    pub time_step: FT,
    pub max_velocity: FT,
    pub max_cfl: FT,
    pub max_pressure: FT,

    // all density errors are in percent of the rest density
    /// average of the positive density errors (compression) over all fluid particles
    pub compression_error: FT,
    pub abs_density_error: FT,
    pub avg_density_error: FT,

    pub num_fluid_particles: usize,
    pub num_boundary_particles: usize,

    pub neighborhood_search_time: Duration,
    pub pressure_solve_time: Duration,
    pub step_time: Duration,
}

impl fmt::Display for SolverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fluid / {} boundary particles, dt {:.4}, {} iterations{}, max velocity {:.3}, max cfl {:.3}, compression {:.3}%, avg density error {:.3}%, step {:.2?}",
            self.num_fluid_particles,
            self.num_boundary_particles,
            self.time_step,
            self.iterations,
            if self.converged { "" } else { " (not converged)" },
            self.max_velocity,
            self.max_cfl,
            self.compression_error,
            self.avg_density_error,
            self.step_time,
        )
    }
}

/**
 * Owns all particles together with the spatial hash and the neighbor lists built from it.
 *
 * Particles are only added and removed through this type so that the hash never holds a
 * stale id. All particles share one diameter, the smoothing length `h` equals the diameter.
 */
pub struct FluidSimulation {
    particles: ParticleVec,
    neighs: NeighborhoodCache,
    spatial_hash: SpatialHash,
    kernel: CubicSpline,
    bodies: Vec<Body>,

    diameter: FT,
    rest_density: FT,

    time: FT,
    step_number: usize,
    last_max_velocity: FT,

    // boundary masses have to be renormalized before the next density evaluation
    boundary_masses_dirty: bool,
    last_gamma1: FT,
}

impl FluidSimulation {
    pub fn new(diameter: FT, rest_density: FT) -> Self {
        FluidSimulation {
            particles: ParticleVec::default(0),
            neighs: NeighborhoodCache::new(0),
            spatial_hash: SpatialHash::new(2. * diameter),
            kernel: CubicSpline::new(diameter),
            bodies: Vec::new(),
            diameter,
            rest_density,
            time: 0.,
            step_number: 0,
            last_max_velocity: 0.,
            boundary_masses_dirty: true,
            last_gamma1: FT::NAN,
        }
    }

    pub fn particles(&self) -> &ParticleVec {
        &self.particles
    }

    pub fn spatial_hash(&self) -> &SpatialHash {
        &self.spatial_hash
    }

    pub fn neighbors(&self) -> &NeighborhoodCache {
        &self.neighs
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn diameter(&self) -> FT {
        self.diameter
    }

    pub fn rest_density(&self) -> FT {
        self.rest_density
    }

    /// Accumulated simulation time.
    pub fn time(&self) -> FT {
        self.time
    }

    pub fn step_number(&self) -> usize {
        self.step_number
    }

    pub fn num_fluid_particles(&self) -> usize {
        self.particles.num_fluid_particles()
    }

    pub fn num_boundary_particles(&self) -> usize {
        self.particles.num_boundary_particles()
    }

    pub fn add_fluid_particle(&mut self, position: V2, velocity: V2) -> usize {
        let i = self
            .particles
            .push(position, velocity, self.diameter, self.rest_density, false);
        self.spatial_hash.insert(i, position);
        i
    }

    pub fn add_boundary_particle(&mut self, position: V2) -> usize {
        let i = self
            .particles
            .push(position, V2::zeros(), self.diameter, self.rest_density, true);
        self.spatial_hash.insert(i, position);
        self.boundary_masses_dirty = true;
        i
    }

    /// Adds boundary particles at `positions` that rotate around `pivot`. Returns the body index.
    pub fn add_body(&mut self, positions: &[V2], pivot: V2, angular_velocity: FT) -> usize {
        let indices = positions.iter().map(|&p| self.add_boundary_particle(p)).collect();
        self.bodies.push(Body::new(pivot, angular_velocity, indices));
        self.bodies.len() - 1
    }

    /**
     * Removes particle `i`. The last particle takes over index `i`, so indices held outside
     * of the simulation become invalid. Returns `false` if `i` is out of range.
     */
    pub fn remove_particle(&mut self, i: usize) -> bool {
        let len = self.particles.len();
        if i >= len {
            return false;
        }
        let last = len - 1;

        self.spatial_hash.remove(i, self.particles.position[i]);
        if i != last {
            self.spatial_hash.remove(last, self.particles.position[last]);
        }
        if self.particles.is_boundary[i] {
            self.boundary_masses_dirty = true;
        }

        // neighbor lists are rebuilt every step, only their count has to follow
        if self.neighs.len() == len {
            self.neighs.swap_remove(i);
        } else {
            self.neighs.resize(len - 1);
        }
        self.particles.swap_remove(i);

        if i != last {
            self.spatial_hash.insert(i, self.particles.position[i]);
        }
        for body in self.bodies.iter_mut() {
            body.on_swap_remove(i, last);
        }
        self.bodies.retain(|body| !body.particles.is_empty());
        true
    }

    /// Removes all fluid particles within `radius` of `center`. Returns how many were removed.
    pub fn remove_fluid_in_radius(&mut self, center: V2, radius: FT) -> usize {
        let mut found = Vec::new();
        self.spatial_hash
            .in_radius(center, radius, &self.particles.position, &mut found);
        found.retain(|&i| !self.particles.is_boundary[i]);
        self.remove_descending(found)
    }

    pub fn clear_fluid(&mut self) -> usize {
        let fluid = self.particles.fluid_indices().collect();
        self.remove_descending(fluid)
    }

    pub fn clear_all(&mut self) {
        self.particles = ParticleVec::default(0);
        self.neighs = NeighborhoodCache::new(0);
        self.spatial_hash.clear();
        self.bodies.clear();
        self.last_max_velocity = 0.;
        self.boundary_masses_dirty = true;
    }

    // removing from the back keeps the remaining indices valid
    fn remove_descending(&mut self, mut indices: Vec<usize>) -> usize {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        indices.into_iter().filter(|&i| self.remove_particle(i)).count()
    }

    pub fn particle_colors(&self, attr: VisualizedAttribute) -> Vec<V<f32, 3>> {
        color_map::particle_colors(&self.particles, attr)
    }

    /**
     * Advances the simulation by one time step.
     *
     * On error the particle state is partially updated and should not be stepped further.
     */
    pub fn step(&mut self, settings: &SimulationSettings) -> Result<SolverState, SimulationError> {
        self.single_step(settings).map_err(|e| {
            error!(step = self.step_number, time = self.time, "simulation step failed: {}", e);
            e
        })
    }

    fn single_step(&mut self, settings: &SimulationSettings) -> Result<SolverState, SimulationError> {
        let step_start = Instant::now();
        let scheduler = Scheduler::new(settings.parallel);
        let h = self.kernel.h();

        let dt = settings.time_step_for(self.diameter, self.last_max_velocity);
        for body in &self.bodies {
            body.apply_velocities(&mut self.particles, dt);
        }

        // without fluid only the scripted bodies move
        if self.particles.num_fluid_particles() == 0 {
            if self.integrate(dt, scheduler) {
                self.boundary_masses_dirty = true;
            }
            self.spatial_hash.rearrange(&self.particles.position, scheduler);
            self.last_max_velocity = 0.;
            self.time += dt;
            self.step_number += 1;
            return Ok(SolverState {
                converged: true,
                time_step: dt,
                num_boundary_particles: self.particles.num_boundary_particles(),
                step_time: step_start.elapsed(),
                ..Default::default()
            });
        }

        debug_assert_eq!(self.spatial_hash.check_consistency(&self.particles.position), Ok(()));

        let neighborhood_start = Instant::now();
        self.neighs
            .build(&self.spatial_hash, &self.particles.position, &self.kernel, scheduler);
        let neighborhood_search_time = neighborhood_start.elapsed();

        if self.boundary_masses_dirty || settings.gamma1 != self.last_gamma1 {
            self.renormalize_boundary_masses(settings.gamma1, scheduler);
            self.boundary_masses_dirty = false;
            self.last_gamma1 = settings.gamma1;
        }

        self.reset_scratch(settings, scheduler);
        self.compute_density(settings.gamma2, scheduler)?;
        self.compute_non_pressure_accel(settings, dt, scheduler);

        let solve_start = Instant::now();
        let boundary_handler = BoundaryHandler::new(settings.boundary_handling);
        let outcome: PressureSolveOutcome = match settings.simulation_method {
            SimulationMethod::SESPH => sesph::solve(
                &mut self.particles,
                &self.neighs,
                &boundary_handler,
                settings,
                h,
                scheduler,
            )?,
            SimulationMethod::IISPH => iisph::solve(
                &mut self.particles,
                &self.neighs,
                &boundary_handler,
                settings,
                dt,
                h,
                scheduler,
            )?,
        };
        let pressure_solve_time = solve_start.elapsed();

        let boundary_moved = self.integrate(dt, scheduler);
        if boundary_moved {
            self.boundary_masses_dirty = true;
        }
        let moves = self.spatial_hash.rearrange(&self.particles.position, scheduler);

        let mut state = self.statistics();
        state.iterations = outcome.iterations;
        state.converged = outcome.converged;
        state.time_step = dt;
        state.neighborhood_search_time = neighborhood_search_time;
        state.pressure_solve_time = pressure_solve_time;
        state.step_time = step_start.elapsed();

        debug!(
            step = self.step_number,
            hash_moves = moves,
            estimated_compression = outcome.avg_compression,
            "step finished"
        );

        self.last_max_velocity = state.max_velocity;
        self.time += dt;
        self.step_number += 1;

        Ok(state)
    }

    /// Boundary mass `ρ0 γ1 / Σ_b W_ib` over the boundary neighbors, so a boundary of any
    /// spacing reaches the rest density.
    fn renormalize_boundary_masses(&mut self, gamma1: FT, scheduler: Scheduler) {
        let ParticleVec {
            mass,
            rest_density,
            is_boundary,
            ..
        } = &mut self.particles;
        let (rest_density, is_boundary) = (&rest_density[..], &is_boundary[..]);
        let neighs = &self.neighs;

        scheduler.for_each_mut1(mass, |i, m| {
            if !is_boundary[i] {
                return;
            }
            let kernel_sum: FT = neighs
                .iter(i)
                .filter(|&(j, _, _)| is_boundary[j])
                .map(|(_, w, _)| w)
                .sum();
            if kernel_sum > 0. {
                *m = rest_density[i] * gamma1 / kernel_sum;
            }
        });
    }

    fn reset_scratch(&mut self, settings: &SimulationSettings, scheduler: Scheduler) {
        let ParticleVec {
            is_boundary,
            pressure,
            aii,
            source_term,
            laplacian,
            ..
        } = &mut self.particles;
        let is_boundary = &is_boundary[..];
        let keep_pressure = settings.simulation_method == SimulationMethod::IISPH && settings.warm_start;

        scheduler.for_each_mut1(pressure, |i, p| {
            if is_boundary[i] || !keep_pressure {
                *p = 0.;
            }
        });
        scheduler.for_each_mut3(aii, source_term, laplacian, |_, aii, st, ap| {
            *aii = 0.;
            *st = 0.;
            *ap = 0.;
        });
        self.particles.estimated_compression.iter_mut().for_each(|c| *c = 0.);
        self.particles.cfl.iter_mut().for_each(|c| *c = 0.);
    }

    fn compute_density(&mut self, gamma2: FT, scheduler: Scheduler) -> Result<(), SimulationError> {
        {
            let ParticleVec {
                mass,
                rest_density,
                is_boundary,
                density: rho,
                density_error: rho_error,
                ..
            } = &mut self.particles;
            let (mass, rest_density, is_boundary) = (&mass[..], &rest_density[..], &is_boundary[..]);
            let neighs = &self.neighs;

            scheduler.for_each_mut2(rho, rho_error, |i, rho, rho_error| {
                *rho = density(neighs.list(i), mass, is_boundary, gamma2);
                *rho_error = density_error(*rho, rest_density[i]);
            });
        }

        match self
            .particles
            .density
            .iter()
            .position(|&rho| !rho.is_finite() || rho <= 0.)
        {
            Some(particle) => Err(SimulationError::InvalidDensity {
                particle,
                density: self.particles.density[particle],
            }),
            None => Ok(()),
        }
    }

    /// Viscosity and gravity, followed by the intermediate velocity `v* = v + Δt a_nonp`.
    fn compute_non_pressure_accel(&mut self, settings: &SimulationSettings, dt: FT, scheduler: Scheduler) {
        let h = self.kernel.h();
        let gravity = settings.gravity_vector();
        let (fluid_viscosity, boundary_viscosity) = (settings.fluid_viscosity, settings.boundary_viscosity);

        let ParticleVec {
            position,
            velocity,
            mass,
            density,
            is_boundary,
            viscosity_accel: visc,
            gravity_accel,
            intermediate_velocity,
            ..
        } = &mut self.particles;
        let (position, velocity, mass, density, is_boundary) =
            (&position[..], &velocity[..], &mass[..], &density[..], &is_boundary[..]);
        let neighs = &self.neighs;

        scheduler.for_each_mut3(visc, gravity_accel, intermediate_velocity, |i, visc, g, v_star| {
            if is_boundary[i] {
                *visc = V2::zeros();
                *g = V2::zeros();
                *v_star = velocity[i];
                return;
            }
            *visc = viscosity_accel(
                i,
                neighs.list(i),
                position,
                velocity,
                mass,
                density,
                is_boundary,
                h,
                fluid_viscosity,
                boundary_viscosity,
            );
            *g = gravity;
            *v_star = velocity[i] + dt * (*visc + *g);
        });
    }

    /// Semi-implicit Euler for fluid particles. Boundary particles move with their scripted
    /// velocity. Returns whether any boundary particle moved.
    fn integrate(&mut self, dt: FT, scheduler: Scheduler) -> bool {
        let h = self.kernel.h();
        let ParticleVec {
            position,
            velocity,
            intermediate_velocity,
            pressure_accel,
            is_boundary,
            cfl,
            ..
        } = &mut self.particles;
        let (intermediate_velocity, pressure_accel, is_boundary) =
            (&intermediate_velocity[..], &pressure_accel[..], &is_boundary[..]);

        scheduler.for_each_mut3(position, velocity, cfl, |i, x, v, cfl| {
            if is_boundary[i] {
                *x += dt * *v;
                *cfl = 0.;
                return;
            }
            *v = intermediate_velocity[i] + dt * pressure_accel[i];
            *x += dt * *v;
            *cfl = dt * v.norm() / h;
        });

        self.particles
            .boundary_indices()
            .any(|i| self.particles.velocity[i] != V2::zeros())
    }

    fn statistics(&self) -> SolverState {
        let particles = &self.particles;
        let num_fluid_particles = particles.num_fluid_particles();
        let n = FT::max(num_fluid_particles as FT, 1.);

        let mut state = SolverState {
            num_fluid_particles,
            num_boundary_particles: particles.num_boundary_particles(),
            ..Default::default()
        };
        let (mut compression_sum, mut abs_sum, mut signed_sum) = (0., 0., 0.);
        for i in particles.fluid_indices() {
            state.max_velocity = FT::max(state.max_velocity, particles.velocity[i].norm());
            state.max_cfl = FT::max(state.max_cfl, particles.cfl[i]);
            state.max_pressure = FT::max(state.max_pressure, particles.pressure[i]);

            let e = particles.density_error[i];
            compression_sum += FT::max(e, 0.);
            abs_sum += e.abs();
            signed_sum += e;
        }
        state.compression_error = compression_sum / n;
        state.abs_density_error = abs_sum / n;
        state.avg_density_error = signed_sum / n;
        state
    }
}

#[cfg(test)]
mod tests {
    use super::FluidSimulation;
    use crate::{
        body::{fluid_block, polygon_outline, rectangle_polygon, BlockLayout},
        error::SimulationError,
        floating_type_mod::FT,
        simulation_parameters::{BoundaryHandling, SimulationMethod, SimulationSettings},
        vec2f, V2,
    };

    fn sequential() -> SimulationSettings {
        SimulationSettings {
            parallel: false,
            fluid_stiffness: 500.,
            ..Default::default()
        }
    }

    const D: FT = 10.;

    /// A small fluid block resting on a three layer floor.
    fn small_scene() -> FluidSimulation {
        let d = D;
        let mut sim = FluidSimulation::new(d, 0.3);
        for layer in 0..3 {
            for x in -3..10 {
                sim.add_boundary_particle(vec2f(x as FT * d, (6 + layer) as FT * d));
            }
        }
        for p in fluid_block(vec2f(0., 0.), (6, 6), d, BlockLayout::default()) {
            sim.add_fluid_particle(p, V2::zeros());
        }
        sim
    }

    #[test]
    fn fluid_mass_is_conserved() {
        let mut sim = small_scene();
        let mass = sim.particles().total_fluid_mass();
        for _ in 0..20 {
            sim.step(&sequential()).unwrap();
        }
        assert_eq!(sim.particles().total_fluid_mass(), mass);
        assert_eq!(sim.step_number(), 20);
        assert!((sim.time() - 2.).abs() < 1e-4);
    }

    #[test]
    fn boundary_masses_reach_rest_density() {
        let mut sim = small_scene();
        sim.step(&sequential()).unwrap();
        let particles = sim.particles();
        // a boundary particle in the middle of the floor only sees boundary neighbors below the
        // fluid row
        let b = particles
            .boundary_indices()
            .find(|&i| particles.position[i] == vec2f(3. * D, 7. * D))
            .unwrap();
        let fluid_mass = particles.mass[particles.fluid_indices().next().unwrap()];
        assert!(particles.mass[b] > 0.);
        assert!((particles.mass[b] - fluid_mass).abs() / fluid_mass < 0.05);
    }

    #[test]
    fn parallel_and_sequential_steps_agree() {
        let run = |parallel: bool, method: SimulationMethod| {
            let mut sim = small_scene();
            let settings = SimulationSettings {
                parallel,
                simulation_method: method,
                ..sequential()
            };
            for _ in 0..5 {
                sim.step(&settings).unwrap();
            }
            sim.particles().position.clone()
        };
        for method in [SimulationMethod::SESPH, SimulationMethod::IISPH] {
            let a = run(false, method);
            let b = run(true, method);
            for (p, q) in a.iter().zip(b.iter()) {
                assert!((p - q).norm() < 1e-4, "{} {}", p, q);
            }
        }
    }

    #[test]
    fn removal_keeps_hash_consistent() {
        let mut sim = small_scene();
        sim.step(&sequential()).unwrap();

        let fluid_before = sim.num_fluid_particles();
        let removed = sim.remove_fluid_in_radius(vec2f(2.5 * D, 2.5 * D), D);
        assert!(removed > 0);
        assert_eq!(sim.num_fluid_particles(), fluid_before - removed);
        assert_eq!(sim.spatial_hash().len(), sim.particles().len());
        sim.spatial_hash().check_consistency(&sim.particles().position).unwrap();

        assert!(sim.remove_particle(0));
        assert!(!sim.remove_particle(sim.particles().len()));
        sim.spatial_hash().check_consistency(&sim.particles().position).unwrap();

        sim.step(&sequential()).unwrap();

        let removed = sim.clear_fluid();
        assert!(removed > 0);
        assert_eq!(sim.num_fluid_particles(), 0);
        assert!(sim.num_boundary_particles() > 0);
        sim.spatial_hash().check_consistency(&sim.particles().position).unwrap();

        // nothing to simulate, time still advances
        let (time, step_number) = (sim.time(), sim.step_number());
        let state = sim.step(&sequential()).unwrap();
        assert_eq!(state.num_fluid_particles, 0);
        assert!(state.time_step > 0.);
        assert_eq!(sim.step_number(), step_number + 1);
        assert!((sim.time() - time - state.time_step).abs() < 1e-5);

        sim.clear_all();
        assert!(sim.particles().is_empty());
        assert!(sim.spatial_hash().is_empty());
    }

    #[test]
    fn eraser_with_unbounded_radius_removes_all_fluid() {
        let mut sim = small_scene();
        let fluid = sim.num_fluid_particles();
        assert_eq!(sim.remove_fluid_in_radius(vec2f(0., 0.), 2e5), fluid);
        assert_eq!(sim.num_fluid_particles(), 0);
        assert!(sim.num_boundary_particles() > 0);

        sim.add_fluid_particle(vec2f(D, D), V2::zeros());
        assert_eq!(sim.remove_fluid_in_radius(vec2f(0., 0.), FT::INFINITY), 1);
        sim.spatial_hash().check_consistency(&sim.particles().position).unwrap();
    }

    #[test]
    fn massless_fluid_has_zero_density() {
        let mut sim = FluidSimulation::new(1., 1.);
        sim.add_fluid_particle(vec2f(0., 0.), V2::zeros());
        sim.particles.mass[0] = 0.;
        match sim.step(&sequential()) {
            Err(SimulationError::InvalidDensity { particle: 0, density }) => assert_eq!(density, 0.),
            other => panic!("expected an invalid density, got {:?}", other),
        }
    }

    #[test]
    fn bodies_keep_rotating_without_fluid() {
        let d = D;
        let mut sim = FluidSimulation::new(d, 0.3);
        let outline = polygon_outline(&rectangle_polygon(vec2f(0., 0.), vec2f(2. * d, 0.5 * d)), d);
        let body = sim.add_body(&outline, vec2f(0., 0.), 0.5);
        let before = sim.particles().position[sim.bodies()[body].particles[0]];

        for _ in 0..3 {
            let state = sim.step(&sequential()).unwrap();
            assert!(state.time_step > 0.);
        }
        assert_eq!(sim.step_number(), 3);
        assert!(sim.time() > 0.);

        let after = sim.particles().position[sim.bodies()[body].particles[0]];
        assert!((after - before).norm() > d * 0.1);
        sim.spatial_hash().check_consistency(&sim.particles().position).unwrap();
    }

    #[test]
    fn zero_density_is_reported() {
        let mut sim = FluidSimulation::new(1., 1.);
        sim.add_fluid_particle(vec2f(0., 0.), V2::zeros());
        sim.add_boundary_particle(vec2f(0., 1.));
        let settings = SimulationSettings {
            // an infinitely negative boundary scaling leaves no valid density
            gamma2: FT::NEG_INFINITY,
            ..sequential()
        };
        match sim.step(&settings) {
            Err(SimulationError::InvalidDensity { .. }) => {}
            other => panic!("expected an invalid density, got {:?}", other),
        }
    }

    #[test]
    fn rotating_body_moves_its_particles() {
        let d = D;
        let mut sim = FluidSimulation::new(d, 0.3);
        let outline = polygon_outline(&rectangle_polygon(vec2f(0., 0.), vec2f(2. * d, 0.5 * d)), d);
        let body = sim.add_body(&outline, vec2f(0., 0.), 0.5);
        sim.add_fluid_particle(vec2f(10. * d, 10. * d), V2::zeros());

        let radii: Vec<FT> = sim.bodies()[body]
            .particles
            .iter()
            .map(|&i| sim.particles().position[i].norm())
            .collect();
        let before = sim.particles().position[sim.bodies()[body].particles[0]];

        let settings = SimulationSettings {
            gravity: 0.,
            boundary_handling: BoundaryHandling::Zero,
            ..sequential()
        };
        for _ in 0..3 {
            sim.step(&settings).unwrap();
        }

        let particles = sim.particles();
        let after = particles.position[sim.bodies()[body].particles[0]];
        assert!((after - before).norm() > d * 0.1);
        for (&i, r) in sim.bodies()[body].particles.iter().zip(radii) {
            assert!((particles.position[i].norm() - r).abs() < 1e-3);
        }
        sim.spatial_hash().check_consistency(&particles.position).unwrap();
    }
}
