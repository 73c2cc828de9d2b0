//! Scoped worker fan-out for the CPU backends.
//!
//! Each worker owns a contiguous slice of the output, so per-cell kernels
//! never share mutable state.

/// Default worker count: available parallelism, else 4.
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get())
}

/// Fill `out[i] = f(i)` using up to `workers` threads.
pub fn fill_parallel<T, F>(out: &mut [T], workers: usize, f: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let workers = workers.clamp(1, out.len().max(1));
    if workers == 1 {
        for (i, cell) in out.iter_mut().enumerate() {
            *cell = f(i);
        }
        return;
    }
    let chunk = out.len().div_ceil(workers);
    let f = &f;
    std::thread::scope(|s| {
        for (c, slice) in out.chunks_mut(chunk).enumerate() {
            s.spawn(move || {
                let base = c * chunk;
                for (i, cell) in slice.iter_mut().enumerate() {
                    *cell = f(base + i);
                }
            });
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_matches_serial() {
        let mut a = vec![0u64; 1000];
        let mut b = vec![0u64; 1000];
        fill_parallel(&mut a, 1, |i| (i * i) as u64);
        fill_parallel(&mut b, 7, |i| (i * i) as u64);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fill_empty() {
        let mut out: Vec<u32> = Vec::new();
        fill_parallel(&mut out, 8, |_| 1);
        assert!(out.is_empty());
    }
}
