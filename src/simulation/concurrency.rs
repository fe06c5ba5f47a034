use rayon::prelude::*;

/// Decides how per-particle loops of a simulation phase are executed.
///
/// A phase returns only after every particle has been processed, so consecutive calls
/// form the barriers between the phases of a time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    Sequential,
    Parallel,
}

impl Scheduler {
    pub fn new(parallel: bool) -> Self {
        if parallel {
            Scheduler::Parallel
        } else {
            Scheduler::Sequential
        }
    }

    pub fn for_each<F: Fn(usize) + Send + Sync>(self, n: usize, f: F) {
        match self {
            Scheduler::Sequential => (0..n).for_each(f),
            Scheduler::Parallel => (0..n).into_par_iter().for_each(f),
        }
    }

    pub fn for_each_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(self, arr1: &mut [T1], f: F) {
        match self {
            Scheduler::Sequential => arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
                f(idx, v1);
            }),
            Scheduler::Parallel => arr1.par_iter_mut().enumerate().for_each(|(idx, v1)| {
                f(idx, v1);
            }),
        }
    }

    pub fn for_each_mut2<T1: Send + Sync, T2: Send + Sync, F: Fn(usize, &mut T1, &mut T2) + Send + Sync>(
        self,
        arr1: &mut [T1],
        arr2: &mut [T2],
        f: F,
    ) {
        match self {
            Scheduler::Sequential => arr1
                .iter_mut()
                .zip(arr2.iter_mut())
                .enumerate()
                .for_each(|(idx, (v1, v2))| {
                    f(idx, v1, v2);
                }),
            Scheduler::Parallel => arr1
                .par_iter_mut()
                .zip(arr2.par_iter_mut())
                .enumerate()
                .for_each(|(idx, (v1, v2))| {
                    f(idx, v1, v2);
                }),
        }
    }

    pub fn for_each_mut3<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3) + Send + Sync,
    >(
        self,
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        f: F,
    ) {
        match self {
            Scheduler::Sequential => arr1
                .iter_mut()
                .zip(arr2.iter_mut())
                .zip(arr3.iter_mut())
                .enumerate()
                .for_each(|(idx, ((v1, v2), v3))| {
                    f(idx, v1, v2, v3);
                }),
            Scheduler::Parallel => arr1
                .par_iter_mut()
                .zip(arr2.par_iter_mut())
                .zip(arr3.par_iter_mut())
                .enumerate()
                .for_each(|(idx, ((v1, v2), v3))| {
                    f(idx, v1, v2, v3);
                }),
        }
    }

    /// Maps every index and folds the results with `combine`.
    ///
    /// `combine` has to be associative, the grouping of the parallel reduction is not
    /// deterministic.
    pub fn map_reduce<
        X: Send,
        F: Fn(usize) -> X + Send + Sync,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        self,
        n: usize,
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        match self {
            Scheduler::Sequential => (0..n).map(f).fold(identity(), combine),
            Scheduler::Parallel => (0..n).into_par_iter().map(f).reduce(identity, combine),
        }
    }

    pub fn map_collect<X: Send, F: Fn(usize) -> X + Send + Sync>(self, n: usize, f: F) -> Vec<X> {
        match self {
            Scheduler::Sequential => (0..n).map(f).collect(),
            Scheduler::Parallel => (0..n).into_par_iter().map(f).collect(),
        }
    }

    pub fn reduce_mut3<
        T1: Send + Sync,
        T2: Send + Sync,
        T3: Send + Sync,
        F: Fn(usize, &mut T1, &mut T2, &mut T3) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        self,
        arr1: &mut [T1],
        arr2: &mut [T2],
        arr3: &mut [T3],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        match self {
            Scheduler::Sequential => arr1
                .iter_mut()
                .zip(arr2.iter_mut())
                .zip(arr3.iter_mut())
                .enumerate()
                .map(|(i, ((a, b), c))| f(i, a, b, c))
                .fold(identity(), combine),
            Scheduler::Parallel => arr1
                .par_iter_mut()
                .zip(arr2.par_iter_mut())
                .zip(arr3.par_iter_mut())
                .enumerate()
                .map(|(i, ((a, b), c))| f(i, a, b, c))
                .reduce(identity, combine),
        }
    }
}
