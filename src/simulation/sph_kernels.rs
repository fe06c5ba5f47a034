use crate::{floating_type_mod::{FT, PI}, V2};

/// Empirical scale applied to the kernel value, corrects the normalization of the
/// ideal-packing particle sum.
pub const KERNEL_CORRECTION: FT = 0.04 / 0.0400344729;

/// Cubic spline kernel in 2D with support `2h` where `h` is the particle diameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicSpline {
    h: FT,
    alpha: FT,
}

impl CubicSpline {
    pub fn new(h: FT) -> Self {
        CubicSpline {
            h,
            alpha: 5. / (14. * PI * h * h),
        }
    }

    pub fn h(&self) -> FT {
        self.h
    }

    pub fn support_radius(&self) -> FT {
        2. * self.h
    }

    pub fn w(&self, p1: V2, p2: V2) -> FT {
        let q = (p1 - p2).norm() / self.h;
        let t1 = FT::max(1. - q, 0.);
        let t2 = FT::max(2. - q, 0.);
        self.alpha * (t2 * t2 * t2 - 4. * t1 * t1 * t1) * KERNEL_CORRECTION
    }

    /**
     * Gradient with respect to `p1`. Coincident positions yield the zero vector.
     */
    pub fn grad_w(&self, p1: V2, p2: V2) -> V2 {
        let diff = p1 - p2;
        let r = diff.norm();
        let q = r / self.h;
        if q == 0. {
            return V2::zeros();
        }
        let t1 = FT::max(1. - q, 0.);
        let t2 = FT::max(2. - q, 0.);
        diff * (self.alpha / (r * self.h) * (-3. * t2 * t2 + 12. * t1 * t1))
    }
}
