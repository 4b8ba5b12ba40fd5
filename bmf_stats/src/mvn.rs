//! Multivariate normal draws parameterized by a precision matrix
use crate::rv::nalgebra::{DMatrix, DVector};
use crate::LinalgError;
use bmf_consts::{CHOLESKY_JITTER, CHOLESKY_MAX_TRIES};
use rand::Rng;
use rand_distr::StandardNormal;

/// Lower Cholesky factor of a symmetric positive definite matrix.
///
/// Matrices that fail to factorize get a diagonal jitter, scaled by the mean
/// diagonal entry, that grows tenfold per attempt.
pub fn cholesky_lower(mat: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    if !mat.iter().all(|x| x.is_finite()) {
        return Err(LinalgError::NonFinite("precision matrix"));
    }

    if let Some(chol) = mat.clone().cholesky() {
        return Ok(chol.unpack());
    }

    let dim = mat.nrows();
    let scale = (mat.trace() / dim as f64).abs().max(1.0);
    let mut jitter = CHOLESKY_JITTER * scale;
    for _ in 0..CHOLESKY_MAX_TRIES {
        let mut reg = mat.clone();
        (0..dim).for_each(|i| reg[(i, i)] += jitter);
        if let Some(chol) = reg.cholesky() {
            return Ok(chol.unpack());
        }
        jitter *= 10.0;
    }

    Err(LinalgError::NotPositiveDefinite { dim, jitter })
}

/// Solve `L Lᵀ x = b` given the lower factor `L`
pub fn chol_solve(
    lower: &DMatrix<f64>,
    rhs: &DVector<f64>,
) -> Result<DVector<f64>, LinalgError> {
    let dim = lower.nrows();
    lower
        .solve_lower_triangular(rhs)
        .and_then(|y| lower.tr_solve_lower_triangular(&y))
        .ok_or(LinalgError::SingularFactor { dim })
}

/// Solve `L Lᵀ X = B` for every column of `B`
pub fn chol_solve_matrix(
    lower: &DMatrix<f64>,
    rhs: &DMatrix<f64>,
) -> Result<DMatrix<f64>, LinalgError> {
    let dim = lower.nrows();
    lower
        .solve_lower_triangular(rhs)
        .and_then(|y| lower.tr_solve_lower_triangular(&y))
        .ok_or(LinalgError::SingularFactor { dim })
}

/// Inverse of a symmetric positive definite matrix
pub fn spd_inverse(mat: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    let dim = mat.nrows();
    let lower = cholesky_lower(mat)?;
    let linv = lower
        .solve_lower_triangular(&DMatrix::identity(dim, dim))
        .ok_or(LinalgError::SingularFactor { dim })?;
    Ok(linv.transpose() * linv)
}

/// Draw `x ~ N(0, (L Lᵀ)⁻¹)` given the lower factor `L` of the precision
pub fn draw_centered<R: Rng>(
    lower: &DMatrix<f64>,
    rng: &mut R,
) -> Result<DVector<f64>, LinalgError> {
    let dim = lower.nrows();
    let z = DVector::from_iterator(
        dim,
        (0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)),
    );
    lower
        .tr_solve_lower_triangular(&z)
        .ok_or(LinalgError::SingularFactor { dim })
}

/// Draw `x ~ N(P⁻¹ b, P⁻¹)` where `P` is `precision` and `b` is `rhs`.
///
/// This is the conjugate update of a Gaussian row given accumulated
/// precision and right hand side.
pub fn draw_from_precision<R: Rng>(
    precision: &DMatrix<f64>,
    rhs: &DVector<f64>,
    rng: &mut R,
) -> Result<DVector<f64>, LinalgError> {
    let lower = cholesky_lower(precision)?;
    let mean = chol_solve(&lower, rhs)?;
    let x = mean + draw_centered(&lower, rng)?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(LinalgError::NonFinite("posterior draw"))
    }
}

/// Draw `x ~ N(mean, P⁻¹)`
pub fn draw_with_mean<R: Rng>(
    precision: &DMatrix<f64>,
    mean: &DVector<f64>,
    rng: &mut R,
) -> Result<DVector<f64>, LinalgError> {
    let lower = cholesky_lower(precision)?;
    Ok(mean + draw_centered(&lower, rng)?)
}
