//! NEON backend for aarch64: 2 doubles per 128-bit register.

use std::arch::aarch64::*;

use super::DotKernel;

/// NEON memory alignment requirement in bytes.
pub(crate) const NEON_ALIGNMENT: usize = 16;

/// Number of f64 elements that fit in a 128-bit vector.
pub(crate) const LANE_COUNT: usize = 2;

pub struct Neon;

impl DotKernel for Neon {
    fn name(&self) -> &'static str {
        "neon"
    }

    fn lanes(&self) -> usize {
        LANE_COUNT
    }

    fn alignment(&self) -> usize {
        NEON_ALIGNMENT
    }

    unsafe fn dot_run(&self, a: *const f64, b: *const f64, len: usize) -> f64 {
        dot_neon(a, b, len)
    }
}

pub(crate) fn is_available() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[target_feature(enable = "neon")]
unsafe fn dot_neon(a: *const f64, b: *const f64, len: usize) -> f64 {
    debug_assert_eq!(len % LANE_COUNT, 0);

    let mut acc0 = vdupq_n_f64(0.0);
    let mut acc1 = vdupq_n_f64(0.0);

    let mut i = 0;
    while i + 2 * LANE_COUNT <= len {
        acc0 = vfmaq_f64(acc0, vld1q_f64(a.add(i)), vld1q_f64(b.add(i)));
        acc1 = vfmaq_f64(
            acc1,
            vld1q_f64(a.add(i + LANE_COUNT)),
            vld1q_f64(b.add(i + LANE_COUNT)),
        );
        i += 2 * LANE_COUNT;
    }
    while i < len {
        acc0 = vfmaq_f64(acc0, vld1q_f64(a.add(i)), vld1q_f64(b.add(i)));
        i += LANE_COUNT;
    }

    vaddvq_f64(vaddq_f64(acc0, acc1))
}
