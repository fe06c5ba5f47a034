use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::{
    concurrency::Scheduler, floating_type_mod::FT, spatial_hash::SpatialHash, sph_kernels::CubicSpline, V2,
};

/// Neighbors of one particle with the kernel values cached for the current step.
/// The three vectors always have the same length.
#[derive(Debug, Clone, Default)]
pub struct NeighborList {
    indices: Vec<usize>,
    kernel: Vec<FT>,
    kernel_grad: Vec<V2>,
}

impl NeighborList {
    pub fn clear(&mut self) {
        self.indices.clear();
        self.kernel.clear();
        self.kernel_grad.clear();
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Yields `(j, W_ij, ∇W_ij)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, FT, V2)> + '_ {
        self.indices
            .iter()
            .zip(self.kernel.iter())
            .zip(self.kernel_grad.iter())
            .map(|((&j, &w), &grad_w)| (j, w, grad_w))
    }
}

pub struct NeighborhoodCache {
    lists: Vec<NeighborList>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            lists: (0..num_particles).map(|_| NeighborList::default()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn list(&self, i: usize) -> &NeighborList {
        &self.lists[i]
    }

    pub fn iter(&self, i: usize) -> impl Iterator<Item = (usize, FT, V2)> + '_ {
        self.lists[i].iter()
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.lists[i].len()
    }

    /// Matches `ParticleVec::swap_remove`.
    pub fn swap_remove(&mut self, i: usize) {
        self.lists.swap_remove(i);
    }

    pub fn resize(&mut self, num_particles: usize) {
        self.lists.resize_with(num_particles, NeighborList::default);
    }

    /**
     * Rebuilds all neighbor lists from the spatial hash and caches `W` and `∇W` for every
     * pair. The query radius is the kernel support.
     *
     * A particle that is not registered in the hash finds no neighbors and falls back to
     * itself as its only neighbor, which gives it the kernel self-contribution as density.
     * Returns the number of particles that used this fallback.
     */
    pub fn build(
        &mut self,
        spatial_hash: &SpatialHash,
        positions: &[V2],
        kernel: &CubicSpline,
        scheduler: Scheduler,
    ) -> usize {
        self.resize(positions.len());

        let num_fallbacks = AtomicUsize::new(0);
        let support_radius = kernel.support_radius();

        scheduler.for_each_mut1(&mut self.lists, |i, list| {
            list.clear();
            let xi = positions[i];
            spatial_hash.in_radius(xi, support_radius, positions, &mut list.indices);
            if list.indices.is_empty() {
                list.indices.push(i);
                num_fallbacks.fetch_add(1, Ordering::Relaxed);
            }

            // the bucket order depends on the insertion history
            list.indices.sort_unstable();

            for &j in &list.indices {
                let xj = positions[j];
                list.kernel.push(kernel.w(xi, xj));
                list.kernel_grad.push(kernel.grad_w(xi, xj));
            }
        });

        let num_fallbacks = num_fallbacks.into_inner();
        if num_fallbacks > 0 {
            debug!("{} particles without neighbors fall back to themselves", num_fallbacks);
        }
        num_fallbacks
    }
}

#[cfg(test)]
mod tests {
    use super::NeighborhoodCache;
    use crate::{
        concurrency::Scheduler, floating_type_mod::FT, spatial_hash::SpatialHash, sph_kernels::CubicSpline, vec2f,
        V2,
    };

    fn scattered_positions() -> Vec<V2> {
        // deterministic pseudo random cloud
        let mut positions = Vec::new();
        let mut s: u32 = 12345;
        for _ in 0..300 {
            s = s.wrapping_mul(1103515245).wrapping_add(12345);
            let x = (s >> 8) as FT / (1u32 << 24) as FT * 100.;
            s = s.wrapping_mul(1103515245).wrapping_add(12345);
            let y = (s >> 8) as FT / (1u32 << 24) as FT * 100.;
            positions.push(vec2f(x - 50., y - 50.));
        }
        positions
    }

    #[test]
    fn matches_brute_force_search() {
        let h = 4.;
        let kernel = CubicSpline::new(h);
        let positions = scattered_positions();
        let mut hash = SpatialHash::new(2. * h);
        for (i, p) in positions.iter().enumerate() {
            hash.insert(i, *p);
        }

        let mut neighs = NeighborhoodCache::new(positions.len());
        assert_eq!(neighs.build(&hash, &positions, &kernel, Scheduler::Parallel), 0);

        for i in 0..positions.len() {
            let expected: Vec<usize> = (0..positions.len())
                .filter(|&j| (positions[j] - positions[i]).norm_squared() <= (2. * h) * (2. * h))
                .collect();
            assert_eq!(neighs.list(i).indices(), &expected[..], "particle {}", i);

            for (j, w, grad_w) in neighs.iter(i) {
                assert_eq!(w, kernel.w(positions[i], positions[j]));
                assert_eq!(grad_w, kernel.grad_w(positions[i], positions[j]));
            }
        }
    }

    #[test]
    fn unregistered_particle_falls_back_to_itself() {
        let kernel = CubicSpline::new(1.);
        let positions = vec![vec2f(0., 0.), vec2f(0.5, 0.)];
        let mut hash = SpatialHash::new(2.);
        hash.insert(0, positions[0]);

        let mut neighs = NeighborhoodCache::new(2);
        assert_eq!(neighs.build(&hash, &positions, &kernel, Scheduler::Sequential), 0);
        assert_eq!(neighs.list(1).indices(), &[0]);

        let hash = SpatialHash::new(2.);
        assert_eq!(neighs.build(&hash, &positions, &kernel, Scheduler::Sequential), 2);
        assert_eq!(neighs.list(1).indices(), &[1]);
        assert_eq!(neighs.neighbor_count(0), 1);
    }
}
