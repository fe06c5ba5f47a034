/*!
Per-particle SPH sums. Every function reads the neighbor list of a single particle `i`
together with the particle attributes it needs and returns the value for `i`. Nothing is
written, so these can run in parallel over all particles of a phase.
*/

use nalgebra::{Matrix3, Vector3};

use crate::{floating_type_mod::FT, neighborhood_search::NeighborList, V2};

/// Relative threshold below which singular values of the extrapolation system are dropped.
const SINGULAR_VALUE_EPS: FT = 1e-5;

/// `ρ_i = Σ_j m_j W_ij`, boundary neighbors weighted with `gamma2`.
pub fn density(neighs: &NeighborList, mass: &[FT], is_boundary: &[bool], gamma2: FT) -> FT {
    neighs
        .iter()
        .map(|(j, w, _)| {
            let contribution = mass[j] * w;
            if is_boundary[j] {
                gamma2 * contribution
            } else {
                contribution
            }
        })
        .sum()
}

/// Deviation from the rest density in percent.
pub fn density_error(density: FT, rest_density: FT) -> FT {
    (density - rest_density) / rest_density * 100.
}

/// Linear state equation, tension is not allowed.
pub fn state_equation_pressure(density: FT, rest_density: FT, stiffness: FT) -> FT {
    FT::max(stiffness * (density / rest_density - 1.), 0.)
}

/**
 * Pressure acceleration `-Σ_j m_j (p_i/ρ_i² + p_j/ρ_j²) ∇W_ij`.
 *
 * For boundary neighbors the bracket is replaced by `boundary_term(p_i/ρ_i², p_b/ρ_b²)` and
 * the contribution is scaled with `gamma3`.
 */
#[allow(clippy::too_many_arguments)]
pub fn pressure_accel(
    i: usize,
    neighs: &NeighborList,
    mass: &[FT],
    density: &[FT],
    pressure: &[FT],
    is_boundary: &[bool],
    gamma3: FT,
    boundary_term: impl Fn(FT, FT) -> FT,
) -> V2 {
    let p_i = pressure[i] / (density[i] * density[i]);
    let mut accel = V2::zeros();
    for (j, _, grad_w) in neighs.iter() {
        if j == i {
            continue;
        }
        let p_j = pressure[j] / (density[j] * density[j]);
        if is_boundary[j] {
            accel -= grad_w * (gamma3 * mass[j] * boundary_term(p_i, p_j));
        } else {
            accel -= grad_w * (mass[j] * (p_i + p_j));
        }
    }
    accel
}

/// Artificial viscosity. Fluid pairs use `2·fluid_viscosity`, boundary pairs use
/// `2·boundary_viscosity`.
#[allow(clippy::too_many_arguments)]
pub fn viscosity_accel(
    i: usize,
    neighs: &NeighborList,
    position: &[V2],
    velocity: &[V2],
    mass: &[FT],
    density: &[FT],
    is_boundary: &[bool],
    h: FT,
    fluid_viscosity: FT,
    boundary_viscosity: FT,
) -> V2 {
    let eps = 0.01 * h * h;
    let mut accel = V2::zeros();
    for (j, _, grad_w) in neighs.iter() {
        if j == i {
            continue;
        }
        let x_ij = position[i] - position[j];
        let v_ij = velocity[i] - velocity[j];
        let viscosity = if is_boundary[j] {
            boundary_viscosity
        } else {
            fluid_viscosity
        };
        accel += grad_w * (2. * viscosity * mass[j] / density[j] * v_ij.dot(&x_ij) / (x_ij.norm_squared() + eps));
    }
    accel
}

/**
 * IISPH diagonal element
 * `-Δt/ρ_i² (Σ_{j fluid} |m_j ∇W_ij|² + |Σ_j m_j ∇W_ij|²)`.
 *
 * This is the derivative of `pressure_laplacian` of `i` with respect to `p_i`.
 */
pub fn diagonal_element(i: usize, neighs: &NeighborList, mass: &[FT], density: &[FT], is_boundary: &[bool], dt: FT) -> FT {
    let mut sum_grad = V2::zeros();
    let mut sum_sq = 0.;
    for (j, _, grad_w) in neighs.iter() {
        let m_grad_w = grad_w * mass[j];
        sum_grad += m_grad_w;
        if !is_boundary[j] {
            sum_sq += m_grad_w.norm_squared();
        }
    }
    -dt / (density[i] * density[i]) * (sum_sq + sum_grad.norm_squared())
}

/// `(ρ0 - ρ*) / Δt` where `ρ*` is the density predicted from the intermediate velocities.
pub fn source_term(
    i: usize,
    neighs: &NeighborList,
    mass: &[FT],
    density: &[FT],
    intermediate_velocity: &[V2],
    rest_density: FT,
    dt: FT,
) -> FT {
    let divergence: FT = neighs
        .iter()
        .map(|(j, _, grad_w)| mass[j] * (intermediate_velocity[i] - intermediate_velocity[j]).dot(&grad_w))
        .sum();
    let predicted_density = density[i] + dt * divergence;
    (rest_density - predicted_density) / dt
}

/// `Δt Σ_j m_j (a_i - a_j)·∇W_ij` with the pressure accelerations `a`. Boundary particles
/// do not accelerate.
///
/// Unlike solvers that plug the total acceleration in here, only the pressure part is used:
/// the non-pressure forces already enter through `v*` in `source_term`.
pub fn pressure_laplacian(
    i: usize,
    neighs: &NeighborList,
    mass: &[FT],
    pressure_accel: &[V2],
    is_boundary: &[bool],
    dt: FT,
) -> FT {
    let a_i = pressure_accel[i];
    let sum: FT = neighs
        .iter()
        .map(|(j, _, grad_w)| {
            let a_j = if is_boundary[j] { V2::zeros() } else { pressure_accel[j] };
            mass[j] * (a_i - a_j).dot(&grad_w)
        })
        .sum();
    dt * sum
}

/**
 * Pressure of boundary particle `b` from a moving least squares fit of the plane
 * `p(x) = a + b·x + c·y` through the pressure of the neighboring fluid particles.
 *
 * Samples are weighted with `m_j/ρ_j W_bj`. The 3×3 normal equations are solved with a
 * pseudo-inverse, so few or collinear fluid neighbors still give a finite result. Coordinates
 * are taken relative to the weighted sample centroid and scaled by `h`; a direction the samples
 * do not span then gets a zero slope. Negative values are clamped to zero.
 */
#[allow(clippy::too_many_arguments)]
pub fn extrapolate_pressure(
    b: usize,
    neighs: &NeighborList,
    position: &[V2],
    mass: &[FT],
    density: &[FT],
    pressure: &[FT],
    is_boundary: &[bool],
    h: FT,
) -> FT {
    let weight = |j: usize, w: FT| mass[j] / density[j] * w;

    let mut weight_sum = 0.;
    let mut centroid = V2::zeros();
    for (j, w, _) in neighs.iter() {
        if !is_boundary[j] {
            weight_sum += weight(j, w);
            centroid += position[j] * weight(j, w);
        }
    }
    if weight_sum <= 0. {
        return 0.;
    }
    centroid /= weight_sum;

    let mut normal_matrix = Matrix3::<FT>::zeros();
    let mut rhs = Vector3::<FT>::zeros();
    for (j, w, _) in neighs.iter() {
        if is_boundary[j] {
            continue;
        }
        let x = (position[j] - centroid) / h;
        let phi = Vector3::new(1., x.x, x.y);
        normal_matrix += phi * phi.transpose() * weight(j, w);
        rhs += phi * (weight(j, w) * pressure[j]);
    }

    let x_b = (position[b] - centroid) / h;
    match solve_pseudo_inverse(normal_matrix, rhs) {
        Some(coefficients) => {
            let p_b = coefficients.dot(&Vector3::new(1., x_b.x, x_b.y));
            if p_b.is_finite() {
                FT::max(p_b, 0.)
            } else {
                0.
            }
        }
        None => 0.,
    }
}

fn solve_pseudo_inverse(m: Matrix3<FT>, rhs: Vector3<FT>) -> Option<Vector3<FT>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let singular_values = svd.singular_values;

    let s_max = singular_values.iter().cloned().fold(0., FT::max);
    if s_max <= 0. {
        return None;
    }

    let mut s_inv = Matrix3::<FT>::zeros();
    for k in 0..3 {
        let s = singular_values[k];
        if s > s_max * SINGULAR_VALUE_EPS {
            s_inv[(k, k)] = 1. / s;
        }
    }

    Some(v_t.transpose() * s_inv * u.transpose() * rhs)
}
