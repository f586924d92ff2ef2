//! Portable scalar backend.

use super::DotKernel;

pub struct Scalar;

impl DotKernel for Scalar {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn lanes(&self) -> usize {
        1
    }

    fn alignment(&self) -> usize {
        std::mem::align_of::<f64>()
    }

    unsafe fn dot_run(&self, a: *const f64, b: *const f64, len: usize) -> f64 {
        scalar_dot(
            std::slice::from_raw_parts(a, len),
            std::slice::from_raw_parts(b, len),
        )
    }
}

#[inline(always)]
pub(crate) fn scalar_dot(a: &[f64], b: &[f64]) -> f64 {
    let mut sum = 0.0;
    for (x, y) in a.iter().zip(b) {
        sum += x * y;
    }
    sum
}
