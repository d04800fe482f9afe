// ── Dense vector kernels ───────────────────────────────────────────

// Unrolled dot product; the 8-wide body keeps independent accumulators busy
#[inline(always)]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len().min(b.len());
    let mut sum = 0.0;
    let mut i = 0;
    while i + 8 <= n {
        sum += a[i] * b[i]
            + a[i + 1] * b[i + 1]
            + a[i + 2] * b[i + 2]
            + a[i + 3] * b[i + 3]
            + a[i + 4] * b[i + 4]
            + a[i + 5] * b[i + 5]
            + a[i + 6] * b[i + 6]
            + a[i + 7] * b[i + 7];
        i += 8;
    }
    while i < n {
        sum += a[i] * b[i];
        i += 1;
    }
    sum
}

/// `y += alpha * x`
#[inline(always)]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len().min(y.len());
    let mut i = 0;
    while i + 8 <= n {
        y[i] += alpha * x[i];
        y[i + 1] += alpha * x[i + 1];
        y[i + 2] += alpha * x[i + 2];
        y[i + 3] += alpha * x[i + 3];
        y[i + 4] += alpha * x[i + 4];
        y[i + 5] += alpha * x[i + 5];
        y[i + 6] += alpha * x[i + 6];
        y[i + 7] += alpha * x[i + 7];
        i += 8;
    }
    while i < n {
        y[i] += alpha * x[i];
        i += 1;
    }
}

/// Adds `scale * v` to `u` in place and hands `u` back for chaining.
pub fn add_in_place<'a>(u: &'a mut [f64], v: &[f64], scale: f64) -> &'a mut [f64] {
    axpy(scale, v, u);
    u
}

/// Euclidean norm.
#[inline]
pub fn l2_norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
