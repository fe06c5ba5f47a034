/*!
Placement of fluid and boundary particles.

All functions return positions only. The caller decides whether they become fluid or
boundary particles.
*/

use nalgebra::Rotation2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    floating_type_mod::{FT, TAU},
    particle::ParticleVec,
    vec2f, V2,
};

/**
 * Samples the closed polygon through `vertices` at roughly `spacing`.
 *
 * Every edge is split into `ceil(length / spacing)` segments and contributes its start point
 * and the interior points, so corners appear exactly once. Zero length edges contribute
 * nothing.
 */
pub fn polygon_outline(vertices: &[V2], spacing: FT) -> Vec<V2> {
    if vertices.len() == 1 {
        return vertices.to_vec();
    }

    let mut points = Vec::new();
    for (k, &start) in vertices.iter().enumerate() {
        let end = vertices[(k + 1) % vertices.len()];
        let length = (end - start).norm();
        if length <= 0. {
            continue;
        }
        let segments = FT::max((length / spacing).ceil(), 1.) as usize;
        for s in 0..segments {
            points.push(start + (end - start) * (s as FT / segments as FT));
        }
    }
    points
}

/// Corners of an axis aligned rectangle in counter clockwise order.
pub fn rectangle_polygon(center: V2, half_size: V2) -> Vec<V2> {
    vec![
        center + vec2f(-half_size.x, -half_size.y),
        center + vec2f(half_size.x, -half_size.y),
        center + vec2f(half_size.x, half_size.y),
        center + vec2f(-half_size.x, half_size.y),
    ]
}

/// Ellipse approximated by a polygon whose edges are not longer than `spacing`.
pub fn ellipse_polygon(center: V2, radii: V2, spacing: FT) -> Vec<V2> {
    let (a, b) = (radii.x.abs(), radii.y.abs());

    // a chord is never longer than the arc on the circle with the larger radius
    let segments = usize::max((TAU * FT::max(a, b) / spacing).ceil() as usize, 8);

    (0..segments)
        .map(|k| {
            let angle = TAU * k as FT / segments as FT;
            center + vec2f(a * angle.cos(), b * angle.sin())
        })
        .collect()
}

/// Staggered rows are shifted by half a diameter. Jitter is in multiples of the diameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockLayout {
    pub staggered: bool,
    pub jitter: FT,
    pub seed: u64,
}

impl Default for BlockLayout {
    fn default() -> Self {
        BlockLayout {
            staggered: false,
            jitter: 0.,
            seed: 0,
        }
    }
}

/// `count.0 × count.1` particle positions, the first one at `min`.
pub fn fluid_block(min: V2, count: (usize, usize), diameter: FT, layout: BlockLayout) -> Vec<V2> {
    let mut rng = StdRng::seed_from_u64(layout.seed);
    let mut positions = Vec::with_capacity(count.0 * count.1);

    for y in 0..count.1 {
        let offset = if layout.staggered && y % 2 == 1 { 0.5 } else { 0. };
        for x in 0..count.0 {
            let mut p = min + vec2f((x as FT + offset) * diameter, y as FT * diameter);
            if layout.jitter > 0. {
                let j = layout.jitter * diameter;
                p += vec2f(rng.gen_range(-j..=j), rng.gen_range(-j..=j));
            }
            positions.push(p);
        }
    }
    positions
}

/// Grid positions at `diameter` spacing that lie inside the disc.
pub fn fluid_disc(center: V2, radius: FT, diameter: FT) -> Vec<V2> {
    let n = (radius / diameter).floor() as i64;
    let mut positions = Vec::new();
    for y in -n..=n {
        for x in -n..=n {
            let offset = vec2f(x as FT * diameter, y as FT * diameter);
            if offset.norm() <= radius {
                positions.push(center + offset);
            }
        }
    }
    positions
}

/**
 * A group of boundary particles that rotates around a pivot.
 *
 * The body only scripts velocities. The simulation moves its particles with them.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub pivot: V2,
    /// radians per time unit, positive rotates from +x towards +y
    pub angular_velocity: FT,
    pub particles: Vec<usize>,
}

impl Body {
    pub fn new(pivot: V2, angular_velocity: FT, particles: Vec<usize>) -> Self {
        Body {
            pivot,
            angular_velocity,
            particles,
        }
    }

    /// `(R(ωΔt)(x - c) + c - x) / Δt`, so one step of length `dt` lands exactly on the circle.
    pub fn scripted_velocity(&self, position: V2, dt: FT) -> V2 {
        if dt <= 0. || self.angular_velocity == 0. {
            return V2::zeros();
        }
        let rotation = Rotation2::new(self.angular_velocity * dt);
        let r = position - self.pivot;
        (rotation * r - r) / dt
    }

    pub fn apply_velocities(&self, particles: &mut ParticleVec, dt: FT) {
        for &i in &self.particles {
            let v = self.scripted_velocity(particles.position[i], dt);
            particles.velocity[i] = v;
            particles.intermediate_velocity[i] = v;
        }
    }

    /// Keeps the indices valid after `ParticleVec::swap_remove(removed)` moved `last` into `removed`.
    pub fn on_swap_remove(&mut self, removed: usize, last: usize) {
        self.particles.retain(|&i| i != removed);
        for i in self.particles.iter_mut() {
            if *i == last {
                *i = removed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::floating_type_mod::PI;

    #[test]
    fn outline_has_no_duplicate_corners() {
        let square = rectangle_polygon(vec2f(0., 0.), vec2f(2., 2.));
        let points = polygon_outline(&square, 1.);
        assert_eq!(points.len(), 16);
        for (k, p) in points.iter().enumerate() {
            for q in &points[k + 1..] {
                assert!((p - q).norm() > 0.5);
            }
        }
        assert!(square.iter().all(|c| points.iter().any(|p| (p - c).norm() < 1e-6)));
    }

    #[test]
    fn outline_spacing_never_exceeds_requested() {
        let triangle = vec![vec2f(0., 0.), vec2f(10.3, 0.), vec2f(0., 7.7)];
        let points = polygon_outline(&triangle, 1.);
        for k in 0..points.len() {
            let d = (points[(k + 1) % points.len()] - points[k]).norm();
            assert!(d <= 1. + 1e-4 && d > 0.5, "{}", d);
        }
    }

    #[test]
    fn ellipse_vertices_lie_on_ellipse() {
        let polygon = ellipse_polygon(vec2f(1., 2.), vec2f(4., 2.), 0.5);
        assert!(polygon.len() >= 8);
        for p in &polygon {
            let d = p - vec2f(1., 2.);
            assert!(((d.x / 4.).powi(2) + (d.y / 2.).powi(2) - 1.).abs() < 1e-4);
        }
        for k in 0..polygon.len() {
            assert!((polygon[(k + 1) % polygon.len()] - polygon[k]).norm() <= 0.5 + 1e-3);
        }
    }

    #[test]
    fn block_layouts() {
        let d = 2.;
        let plain = fluid_block(vec2f(1., 1.), (3, 2), d, BlockLayout::default());
        assert_eq!(plain.len(), 6);
        assert_eq!(plain[0], vec2f(1., 1.));
        assert_eq!(plain[5], vec2f(5., 3.));

        let staggered = fluid_block(
            vec2f(0., 0.),
            (3, 2),
            d,
            BlockLayout {
                staggered: true,
                ..Default::default()
            },
        );
        assert_eq!(staggered[3], vec2f(1., 2.));

        let layout = BlockLayout {
            jitter: 0.1,
            seed: 7,
            ..Default::default()
        };
        let a = fluid_block(vec2f(0., 0.), (4, 4), d, layout);
        let b = fluid_block(vec2f(0., 0.), (4, 4), d, layout);
        assert_eq!(a, b);
        let grid = fluid_block(vec2f(0., 0.), (4, 4), d, BlockLayout::default());
        for (p, q) in a.iter().zip(grid.iter()) {
            assert!((p.x - q.x).abs() <= 0.2 + 1e-6 && (p.y - q.y).abs() <= 0.2 + 1e-6);
        }
        assert!(a.iter().zip(grid.iter()).any(|(p, q)| p != q));
    }

    #[test]
    fn disc_contains_center_and_stays_inside() {
        let positions = fluid_disc(vec2f(5., 5.), 3., 1.);
        assert!(positions.contains(&vec2f(5., 5.)));
        assert!(positions.iter().all(|p| (p - vec2f(5., 5.)).norm() <= 3.));
        // 29 lattice points within radius 3
        assert_eq!(positions.len(), 29);
    }

    #[test]
    fn scripted_velocity_rotates_around_pivot() {
        let body = Body::new(vec2f(1., 1.), PI / 2., vec![]);
        let dt = 1.;
        let x = vec2f(2., 1.);
        let next = x + dt * body.scripted_velocity(x, dt);
        assert!((next - vec2f(1., 2.)).norm() < 1e-5);

        let still = Body::new(vec2f(0., 0.), 0., vec![]);
        assert_eq!(still.scripted_velocity(x, dt), V2::zeros());
    }

    #[test]
    fn indices_follow_swap_remove() {
        let mut body = Body::new(vec2f(0., 0.), 1., vec![1, 3, 9]);
        body.on_swap_remove(3, 9);
        assert_eq!(body.particles, vec![1, 3]);
        body.on_swap_remove(0, 1);
        assert_eq!(body.particles, vec![0, 3]);
    }
}
