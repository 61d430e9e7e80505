//! Fixed-point costs.
//!
//! A cost is `-log2(p)` stored as an unsigned integer with `INT_BITS` integer bits and
//! `FRAC_BITS` fraction bits. Multiplying probabilities becomes adding costs, and every sum
//! saturates at [`COST_MAX`], which stands for "impossible".

pub const INT_BITS: u32 = 8;
pub const FRAC_BITS: u32 = 15;
pub const FMUL: u32 = 1 << FRAC_BITS;
pub const PREC: f64 = 1.0 / FMUL as f64;
pub const LEVELS: u32 = 1 << (INT_BITS + FRAC_BITS);

pub type Cost = u32;

pub const COST_MAX: Cost = LEVELS - 1;

#[inline]
pub fn float2fix(x: f64) -> Cost {
    if x.is_nan() || x >= COST_MAX as f64 * PREC {
        return COST_MAX;
    }
    if x <= 0.0 {
        return 0;
    }
    ((x * FMUL as f64).round() as Cost).min(COST_MAX)
}

#[inline]
pub fn fix2float(c: Cost) -> f64 {
    c as f64 * PREC
}

/// `-log2(p)` in fixed point. Zero (or negative) probabilities are impossible.
#[inline]
pub fn prob2cost(p: f64) -> Cost {
    if p <= 0.0 {
        COST_MAX
    } else {
        float2fix(-p.log2())
    }
}

#[inline]
pub fn cost2prob(c: Cost) -> f64 {
    if c >= COST_MAX {
        0.0
    } else {
        (-fix2float(c)).exp2()
    }
}

#[inline]
pub fn sat_add(a: Cost, b: Cost) -> Cost {
    // both operands are below 2^23, so the sum cannot wrap
    (a + b).min(COST_MAX)
}

/// `n` repetitions of cost `c`.
#[inline]
pub fn sat_mul(c: Cost, n: usize) -> Cost {
    (c as u64).saturating_mul(n as u64).min(COST_MAX as u64) as Cost
}
