//! Least-squares fitting for the line-total regression.
//!
//! Solves the ridge-stabilized normal equations directly, so fitting is
//! deterministic: identical data always yields identical coefficients.

use ndarray::{s, Array1, Array2};

/// Stabilizer added to the normal-equation diagonal. Keeps the solve
/// well-posed when one-hot columns are collinear with the bias.
const RIDGE_LAMBDA: f64 = 1e-8;

/// Fitted linear mapping; weights follow the design-matrix column order.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearFit {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

/// Fit `targets ≈ design · weights + intercept` by ordinary least squares.
pub fn fit_least_squares(design: &Array2<f64>, targets: &Array1<f64>) -> LinearFit {
    let rows = design.nrows();
    let cols = design.ncols() + 1;

    let mut augmented = Array2::<f64>::ones((rows, cols));
    augmented.slice_mut(s![.., ..cols - 1]).assign(design);

    let mut gram = augmented.t().dot(&augmented);
    for index in 0..cols {
        gram[[index, index]] += RIDGE_LAMBDA;
    }
    let moment = augmented.t().dot(targets);

    let solution = solve(gram, moment);
    LinearFit {
        weights: solution.iter().take(cols - 1).copied().collect(),
        intercept: solution[cols - 1],
    }
}

/// Gauss-Jordan elimination with partial pivoting. The ridge term keeps
/// every pivot nonzero.
fn solve(mut matrix: Array2<f64>, mut rhs: Array1<f64>) -> Array1<f64> {
    let size = rhs.len();

    for pivot in 0..size {
        let mut best = pivot;
        for row in pivot + 1..size {
            if matrix[[row, pivot]].abs() > matrix[[best, pivot]].abs() {
                best = row;
            }
        }
        if best != pivot {
            for col in 0..size {
                let held = matrix[[pivot, col]];
                matrix[[pivot, col]] = matrix[[best, col]];
                matrix[[best, col]] = held;
            }
            rhs.swap(pivot, best);
        }

        let diagonal = matrix[[pivot, pivot]];
        for row in 0..size {
            if row == pivot {
                continue;
            }
            let factor = matrix[[row, pivot]] / diagonal;
            if factor == 0.0 {
                continue;
            }
            for col in pivot..size {
                matrix[[row, col]] -= factor * matrix[[pivot, col]];
            }
            rhs[row] -= factor * rhs[pivot];
        }
    }

    Array1::from_iter((0..size).map(|index| rhs[index] / matrix[[index, index]]))
}
