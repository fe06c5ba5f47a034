use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::{concurrency::Scheduler, floating_type_mod::FT, vec2i, V2, V2I};

type Bucket = RwLock<Vec<usize>>;

fn read_bucket(bucket: &Bucket) -> RwLockReadGuard<'_, Vec<usize>> {
    bucket.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_bucket(bucket: &Bucket) -> RwLockWriteGuard<'_, Vec<usize>> {
    bucket.write().unwrap_or_else(PoisonError::into_inner)
}

/**
 * Uniform grid over particle ids, keyed by `floor(position / cell_size)`.
 *
 * Only ids are stored, positions are always passed in by the caller. Every bucket has its
 * own lock so queries and moves of particles in different cells do not block each other.
 */
pub struct SpatialHash {
    cell_size: FT,
    cells: HashMap<V2I, Bucket>,

    /// cell every id is currently registered in
    registered: Vec<Option<V2I>>,
    count: usize,
}

impl SpatialHash {
    pub fn new(cell_size: FT) -> Self {
        assert!(cell_size > 0., "cell size has to be positive");
        SpatialHash {
            cell_size,
            cells: HashMap::new(),
            registered: Vec::new(),
            count: 0,
        }
    }

    pub fn cell_size(&self) -> FT {
        self.cell_size
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_of(&self, position: V2) -> V2I {
        (position / self.cell_size).map(|x| x.floor() as i32)
    }

    pub fn insert(&mut self, id: usize, position: V2) {
        if self.registered.get(id).copied().flatten().is_some() {
            self.unregister(id);
        }

        let key = self.cell_of(position);
        self.cells.entry(key).or_default().get_mut().unwrap_or_else(PoisonError::into_inner).push(id);

        if self.registered.len() <= id {
            self.registered.resize(id + 1, None);
        }
        self.registered[id] = Some(key);
        self.count += 1;
    }

    /// Removes `id` from the cell of `position`. Returns `false` and leaves the hash
    /// untouched if the id is not registered there.
    pub fn remove(&mut self, id: usize, position: V2) -> bool {
        let key = self.cell_of(position);
        if self.registered.get(id).copied().flatten() != Some(key) {
            return false;
        }
        self.unregister(id)
    }

    fn unregister(&mut self, id: usize) -> bool {
        let key = match self.registered.get(id).copied().flatten() {
            Some(key) => key,
            None => return false,
        };

        let removed;
        let now_empty;
        match self.cells.get_mut(&key) {
            Some(bucket) => {
                let ids = bucket.get_mut().unwrap_or_else(PoisonError::into_inner);
                removed = match ids.iter().position(|&x| x == id) {
                    Some(pos) => {
                        ids.swap_remove(pos);
                        true
                    }
                    None => false,
                };
                now_empty = ids.is_empty();
            }
            None => return false,
        }

        if now_empty {
            self.cells.remove(&key);
        }
        if removed {
            self.registered[id] = None;
            self.count -= 1;
        }
        removed
    }

    /**
     * Appends all ids with a distance of at most `radius` to `position` to `out`.
     *
     * `out` is not cleared. Windows spanning more cells than the hash holds walk the occupied
     * buckets instead of every cell coordinate.
     */
    pub fn in_radius(&self, position: V2, radius: FT, positions: &[V2], out: &mut Vec<usize>) {
        let r = V2::repeat(radius);
        let min = ((position - r) / self.cell_size).map(|x| x.floor() as i32);
        let max = ((position + r) / self.cell_size).map(|x| x.ceil() as i32);
        let radius_sq = radius * radius;

        let mut collect = |bucket: &Bucket| {
            for &id in read_bucket(bucket).iter() {
                if (positions[id] - position).norm_squared() <= radius_sq {
                    out.push(id);
                }
            }
        };

        let window_cells = (max.x as i64 - min.x as i64 + 1).saturating_mul(max.y as i64 - min.y as i64 + 1);
        if window_cells > self.cells.len() as i64 {
            for (key, bucket) in self.cells.iter() {
                if (min.x..=max.x).contains(&key.x) && (min.y..=max.y).contains(&key.y) {
                    collect(bucket);
                }
            }
            return;
        }

        for y in min.y..=max.y {
            for x in min.x..=max.x {
                if let Some(bucket) = self.cells.get(&vec2i(x, y)) {
                    collect(bucket);
                }
            }
        }
    }

    /// Moves every id whose position left its registered cell. Returns the number of moves.
    pub fn rearrange(&mut self, positions: &[V2], scheduler: Scheduler) -> usize {
        let cell_size = self.cell_size;
        let registered = &self.registered;
        let moves: Vec<(usize, V2I, V2I)> = scheduler
            .map_collect(registered.len(), |id| {
                let from = registered[id]?;
                let to = (positions[id] / cell_size).map(|x| x.floor() as i32);
                if from == to {
                    None
                } else {
                    Some((id, from, to))
                }
            })
            .into_iter()
            .flatten()
            .collect();

        if moves.is_empty() {
            return 0;
        }

        // buckets can only be created with exclusive access to the map
        for &(_, _, to) in &moves {
            self.cells.entry(to).or_default();
        }

        {
            let cells = &self.cells;
            let moves = &moves;
            scheduler.for_each(moves.len(), |k| {
                let (id, from, to) = moves[k];
                if let Some(bucket) = cells.get(&from) {
                    let mut ids = write_bucket(bucket);
                    if let Some(pos) = ids.iter().position(|&x| x == id) {
                        ids.swap_remove(pos);
                    }
                }
                if let Some(bucket) = cells.get(&to) {
                    write_bucket(bucket).push(id);
                }
            });
        }

        for &(id, _, to) in &moves {
            self.registered[id] = Some(to);
        }
        self.cells
            .retain(|_, bucket| !bucket.get_mut().unwrap_or_else(PoisonError::into_inner).is_empty());

        moves.len()
    }

    pub fn clear(&mut self) {
        self.cells.clear();
        self.registered.clear();
        self.count = 0;
    }

    /**
     * Verifies that every registered id sits in exactly the cell of its position and that
     * the counters agree. Slow, meant for debug builds and tests.
     */
    pub fn check_consistency(&self, positions: &[V2]) -> Result<(), String> {
        let mut seen = 0;
        for (key, bucket) in &self.cells {
            let ids = read_bucket(bucket);
            if ids.is_empty() {
                return Err(format!("empty bucket {:?} was not dropped", key));
            }
            for &id in ids.iter() {
                if self.registered.get(id).copied().flatten() != Some(*key) {
                    return Err(format!("particle {} found in unexpected bucket {:?}", id, key));
                }
                let expected = self.cell_of(positions[id]);
                if expected != *key {
                    return Err(format!(
                        "particle {} is stale: registered in {:?} but located in {:?}",
                        id, key, expected
                    ));
                }
                seen += 1;
            }
        }

        let num_registered = self.registered.iter().filter(|x| x.is_some()).count();
        if seen != self.count || num_registered != self.count {
            return Err(format!(
                "count mismatch: count={} in buckets={} registered={}",
                self.count, seen, num_registered
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SpatialHash;
    use crate::{concurrency::Scheduler, floating_type_mod::FT, vec2f, V2};

    fn grid(n: usize, spacing: FT) -> Vec<V2> {
        let mut v = Vec::new();
        for y in 0..n {
            for x in 0..n {
                v.push(vec2f(x as FT * spacing, y as FT * spacing));
            }
        }
        v
    }

    fn hash_of(positions: &[V2], cell_size: FT) -> SpatialHash {
        let mut hash = SpatialHash::new(cell_size);
        for (id, p) in positions.iter().enumerate() {
            hash.insert(id, *p);
        }
        hash
    }

    #[test]
    fn radius_query_counts() {
        let spacing = 5.;
        let positions = grid(9, spacing);
        let hash = hash_of(&positions, 2. * spacing);
        let center = positions[4 * 9 + 4];

        for (factor, expected) in [(0.9, 1), (1.0, 5), (1.1, 5), (1.9, 9), (2.0, 13), (2.1, 13)] {
            let mut out = Vec::new();
            hash.in_radius(center, factor * spacing, &positions, &mut out);
            assert_eq!(out.len(), expected, "radius {}×spacing", factor);
        }
    }

    #[test]
    fn huge_radius_walks_occupied_cells() {
        let positions = grid(5, 1.);
        let hash = hash_of(&positions, 2.);

        let mut out = Vec::new();
        hash.in_radius(positions[12], 1e7, &positions, &mut out);
        out.sort_unstable();
        assert_eq!(out, (0..25).collect::<Vec<_>>());

        out.clear();
        hash.in_radius(positions[12], FT::INFINITY, &positions, &mut out);
        assert_eq!(out.len(), 25);

        // a wide window far away stays empty
        out.clear();
        hash.in_radius(vec2f(1e6, 1e6), 1e5, &positions, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn query_appends_to_output() {
        let positions = grid(5, 1.);
        let hash = hash_of(&positions, 2.);
        let mut out = vec![usize::MAX];
        hash.in_radius(positions[12], 0.5, &positions, &mut out);
        assert_eq!(out, vec![usize::MAX, 12]);
    }

    #[test]
    fn remove_is_noop_for_absent_particles() {
        let positions = grid(4, 3.);
        let mut hash = hash_of(&positions, 6.);
        let count = hash.len();

        // never inserted
        assert!(!hash.remove(100, vec2f(1., 1.)));
        // inserted but looked up in the wrong cell
        assert!(!hash.remove(0, vec2f(1000., 1000.)));
        assert_eq!(hash.len(), count);
        hash.check_consistency(&positions).unwrap();

        let mut positions = positions;
        positions.push(vec2f(-7., 2.));
        hash.insert(16, positions[16]);
        assert_eq!(hash.len(), count + 1);
        assert!(hash.remove(16, positions[16]));
        assert_eq!(hash.len(), count);
        assert!(!hash.remove(16, positions[16]));
        assert_eq!(hash.len(), count);
    }

    #[test]
    fn empty_buckets_are_dropped() {
        let mut hash = SpatialHash::new(1.);
        hash.insert(0, vec2f(0.5, 0.5));
        assert_eq!(hash.num_cells(), 1);
        assert!(hash.remove(0, vec2f(0.5, 0.5)));
        assert_eq!(hash.num_cells(), 0);
        assert!(hash.is_empty());
    }

    #[test]
    fn rearrange_follows_moved_particles() {
        for scheduler in [Scheduler::Sequential, Scheduler::Parallel] {
            let mut positions = grid(10, 1.);
            let mut hash = hash_of(&positions, 2.);

            for (i, p) in positions.iter_mut().enumerate() {
                if i % 3 == 0 {
                    *p += vec2f(3.3, -2.1);
                }
            }
            assert!(hash.check_consistency(&positions).is_err());

            let moved = hash.rearrange(&positions, scheduler);
            assert!(moved > 0);
            hash.check_consistency(&positions).unwrap();
            assert_eq!(hash.len(), 100);

            assert_eq!(hash.rearrange(&positions, scheduler), 0);

            let mut out = Vec::new();
            hash.in_radius(positions[0], 0.1, &positions, &mut out);
            assert_eq!(out, vec![0]);
        }
    }

    #[test]
    fn negative_coordinates_use_floor() {
        let mut hash = SpatialHash::new(2.);
        assert_eq!(hash.cell_of(vec2f(-0.5, 0.5)), crate::vec2i(-1, 0));
        let positions = vec![vec2f(-0.5, -0.5), vec2f(0.5, 0.5)];
        hash.insert(0, positions[0]);
        hash.insert(1, positions[1]);
        let mut out = Vec::new();
        hash.in_radius(V2::zeros(), 1., &positions, &mut out);
        out.sort();
        assert_eq!(out, vec![0, 1]);
    }
}
