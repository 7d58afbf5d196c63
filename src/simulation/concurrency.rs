pub use internal::*;

#[cfg(target_arch = "wasm32")]
mod internal {
    pub fn par_iter_mut0<F: Fn(usize) + Send + Sync>(n: usize, f: F) {
        (0..n).into_iter().for_each(|idx| {
            f(idx);
        });
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.iter_mut().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &mut T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.iter_mut()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .fold(identity(), |acc, value| combine(acc, value))
    }

    pub fn par_sort_by_key<T: Send, K: Ord + Send, F: Fn(&T) -> K + Send + Sync>(v: &mut [T], f: F) {
        v.sort_by_key(f);
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod internal {
    use rayon::prelude::*;

    pub fn par_iter_mut0<F: Fn(usize) + Send + Sync>(n: usize, f: F) {
        (0..n).into_par_iter().for_each(|idx| {
            f(idx);
        });
    }

    pub fn par_iter_mut1<T1: Send + Sync, F: Fn(usize, &mut T1) + Send + Sync>(arr1: &mut [T1], f: F) {
        arr1.into_par_iter().enumerate().for_each(|(idx, v1)| {
            f(idx, v1);
        });
    }

    pub fn par_iter_reduce1<
        T1: Send + Sync,
        F: Fn(usize, &mut T1) -> X + Send + Sync,
        X: Send,
        C: Fn(X, X) -> X + Send + Sync,
        I: Fn() -> X + Send + Sync,
    >(
        arr1: &mut [T1],
        identity: I,
        combine: C,
        f: F,
    ) -> X {
        arr1.into_par_iter()
            .enumerate()
            .map(|(i, a)| f(i, a))
            .reduce(identity, combine)
    }

    // stable, so equal keys keep their relative storage order
    pub fn par_sort_by_key<T: Send, K: Ord + Send, F: Fn(&T) -> K + Send + Sync>(v: &mut [T], f: F) {
        v.par_sort_by_key(f);
    }
}
