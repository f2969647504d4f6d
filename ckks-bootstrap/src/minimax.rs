//! Offline generation of composite minimax polynomials for the sign
//! function, via the two-interval Remez exchange, plus the closed-form
//! sign-doubling correction tables.

use tracing::debug;

use crate::error::{Error, Result};

/// Chebyshev coefficients of `(3x - x^3) / 2`, the doubling step appended to
/// a minimax sign composite to square its error. Kept as decimal strings so
/// the table reproduces bit-for-bit everywhere.
pub const COEFFS_SIGN_X2_CHEBY: [&str; 4] = ["0", "1.125", "0", "-0.125"];

/// Chebyshev coefficients of the self-composition of `(3x - x^3) / 2`,
/// appended to quadruple the precision of a minimax sign composite.
pub const COEFFS_SIGN_X4_CHEBY: [&str; 10] = [
	"0",
	"1.19970703125",
	"0",
	"-0.24609375",
	"0",
	"0.052734375",
	"0",
	"-0.006591796875",
	"0",
	"0.000244140625",
];

/// Parses a string-encoded coefficient table.
pub fn parse_coeff_table(table: &[&str]) -> Vec<f64> {
	table
		.iter()
		.map(|s| s.parse::<f64>().expect("static table parses"))
		.collect()
}

/// Upper bound on Remez exchange rounds before surfacing
/// [`Error::Convergence`].
const MAX_REMEZ_ITERATIONS: usize = 50;

/// Generates a composite minimax polynomial `p_k ∘ … ∘ p_0` approximating
/// `f` (normally the sign function) on `[-1, -2^-log_alpha] ∪ [2^-log_alpha, 1]`,
/// with every interval inflated by the scheme error `2^-log_beta`.
///
/// Each stage runs the Remez exchange at the requested degree; the output of
/// stage `i` determines the (shrunken) interval of stage `i + 1`, and each
/// intermediate stage is rescaled by the reciprocal of its maximal value so
/// the next stage reads inputs from `[-1, 1]`. The final stage is left
/// unscaled. `prec` caps the requested target precision in bits and is
/// clamped to the f64 mantissa.
pub fn gen_minimax_composite_polynomial(
	prec: usize,
	log_alpha: usize,
	log_beta: usize,
	degrees: &[usize],
	f: impl Fn(f64) -> f64,
) -> Result<Vec<Vec<f64>>> {
	if degrees.is_empty() {
		return Err(Error::ParameterCompatibility("empty degree list"));
	}
	let _target_bits = prec.min(52);
	let beta = 2f64.powi(-(log_beta as i32));
	let mut lo = 2f64.powi(-(log_alpha as i32));
	let mut hi = 1.0;
	let mut stages = Vec::with_capacity(degrees.len());
	for (i, &degree) in degrees.iter().enumerate() {
		// Inflate by the scheme error.
		let a = (lo - beta).max(lo * 0.5);
		let b = hi + beta;
		let approx = remez_two_intervals(&f, a, b, degree)?;
		debug!(
			stage = i,
			degree,
			interval_lo = a,
			interval_hi = b,
			max_err = approx.max_err,
			"minimax stage"
		);
		let max_value = 1.0 + approx.max_err;
		let min_value = 1.0 - approx.max_err;
		let mut coeffs = approx.coeffs;
		if i + 1 < degrees.len() {
			// Rescale so the next stage reads from [-1, 1].
			for c in coeffs.iter_mut() {
				*c /= max_value;
			}
			lo = min_value / max_value;
			hi = 1.0;
		}
		stages.push(coeffs);
	}
	Ok(stages)
}

struct RemezResult {
	coeffs: Vec<f64>,
	max_err: f64,
}

/// Remez exchange for an odd approximant of an odd function on
/// `[-b, -a] ∪ [a, b]`. By oddness the problem reduces to the positive
/// interval with alternation over `d + 2` references.
fn remez_two_intervals(
	f: &impl Fn(f64) -> f64,
	a: f64,
	b: f64,
	degree: usize,
) -> Result<RemezResult> {
	if a <= 0.0 || b <= a {
		return Err(Error::ParameterCompatibility("degenerate remez interval"));
	}
	// Odd Chebyshev basis T_1, T_3, ...
	let basis: Vec<usize> = (0..).map(|k| 2 * k + 1).take_while(|&d| d <= degree).collect();
	let unknowns = basis.len() + 1;

	// Initial reference: Chebyshev points on [a, b].
	let mut reference: Vec<f64> = (0..unknowns)
		.map(|i| {
			let t = (i as f64 * std::f64::consts::PI / (unknowns - 1) as f64).cos();
			0.5 * (a + b) + 0.5 * (b - a) * t
		})
		.collect();
	reference.sort_by(|x, y| x.partial_cmp(y).expect("finite nodes"));

	let mut coeffs = vec![0.0; basis.len()];
	let mut last_err = f64::INFINITY;
	for _ in 0..MAX_REMEZ_ITERATIONS {
		// Solve p(x_i) + (-1)^i E = f(x_i).
		let mut matrix = vec![vec![0.0; unknowns + 1]; unknowns];
		for (i, &x) in reference.iter().enumerate() {
			for (j, &d) in basis.iter().enumerate() {
				matrix[i][j] = chebyshev_t(d, x);
			}
			matrix[i][basis.len()] = if i % 2 == 0 { 1.0 } else { -1.0 };
			matrix[i][unknowns] = f(x);
		}
		let solution = solve_dense(&mut matrix).ok_or(Error::Convergence)?;
		coeffs.copy_from_slice(&solution[..basis.len()]);
		let leveled_err = solution[basis.len()].abs();

		// Locate the extrema of the error on a dense grid.
		let eval_err = |x: f64| {
			let p: f64 = basis
				.iter()
				.zip(&coeffs)
				.map(|(&d, &c)| c * chebyshev_t(d, x))
				.sum();
			p - f(x)
		};
		let extrema = alternating_extrema(&eval_err, a, b, unknowns);
		if extrema.len() < unknowns {
			return Err(Error::Convergence);
		}
		reference = extrema;

		let max_err = reference
			.iter()
			.map(|&x| eval_err(x).abs())
			.fold(0.0f64, f64::max);
		// Converged once the levelled error and the observed maximum agree.
		if (max_err - leveled_err).abs() <= 1e-12 + 1e-6 * max_err {
			let mut full = vec![0.0; degree + 1];
			for (&d, &c) in basis.iter().zip(&coeffs) {
				full[d] = c;
			}
			return Ok(RemezResult {
				coeffs: full,
				max_err,
			});
		}
		if max_err > last_err * 2.0 {
			// The exchange stopped contracting.
			return Err(Error::Convergence);
		}
		last_err = last_err.min(max_err);
	}
	Err(Error::Convergence)
}

/// `T_d(x)` by the three-term recurrence (valid outside [-1, 1] as well).
fn chebyshev_t(d: usize, x: f64) -> f64 {
	let mut t0 = 1.0;
	let mut t1 = x;
	if d == 0 {
		return t0;
	}
	for _ in 1..d {
		let t2 = 2.0 * x * t1 - t0;
		t0 = t1;
		t1 = t2;
	}
	t1
}

/// Picks `count` alternating-sign extrema of `err` over a dense sampling of
/// `[a, b]`, keeping the largest magnitude within each same-sign run and
/// trimming the weakest from the ends.
fn alternating_extrema(err: &impl Fn(f64) -> f64, a: f64, b: f64, count: usize) -> Vec<f64> {
	const GRID: usize = 1 << 13;
	let step = (b - a) / GRID as f64;
	// Local extrema candidates plus the endpoints.
	let mut candidates: Vec<(f64, f64)> = Vec::new();
	let mut prev = err(a);
	let mut curr = err(a + step);
	candidates.push((a, prev));
	for i in 2..=GRID {
		let x = a + step * i as f64;
		let next = err(x);
		if (curr - prev) * (next - curr) <= 0.0 {
			candidates.push((a + step * (i - 1) as f64, curr));
		}
		prev = curr;
		curr = next;
	}
	candidates.push((b, curr));

	// Collapse same-sign runs to their largest member.
	let mut picked: Vec<(f64, f64)> = Vec::new();
	for (x, e) in candidates {
		match picked.last_mut() {
			Some((lx, le)) if le.signum() == e.signum() => {
				if e.abs() > le.abs() {
					*lx = x;
					*le = e;
				}
			}
			_ => picked.push((x, e)),
		}
	}
	// Trim the weakest ends until the reference has the right size.
	while picked.len() > count {
		let first = picked.first().expect("non-empty").1.abs();
		let last = picked.last().expect("non-empty").1.abs();
		if first <= last {
			picked.remove(0);
		} else {
			picked.pop();
		}
	}
	picked.into_iter().map(|(x, _)| x).collect()
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
fn solve_dense(matrix: &mut [Vec<f64>]) -> Option<Vec<f64>> {
	let n = matrix.len();
	for col in 0..n {
		let pivot = (col..n).max_by(|&i, &j| {
			matrix[i][col]
				.abs()
				.partial_cmp(&matrix[j][col].abs())
				.expect("finite matrix")
		})?;
		if matrix[pivot][col].abs() < 1e-300 {
			return None;
		}
		matrix.swap(col, pivot);
		for row in col + 1..n {
			let factor = matrix[row][col] / matrix[col][col];
			for k in col..=n {
				matrix[row][k] -= factor * matrix[col][k];
			}
		}
	}
	let mut solution = vec![0.0; n];
	for row in (0..n).rev() {
		let mut acc = matrix[row][n];
		for k in row + 1..n {
			acc -= matrix[row][k] * solution[k];
		}
		solution[row] = acc / matrix[row][row];
	}
	Some(solution)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sign_tables_sum_to_one_at_one() {
		let x2 = parse_coeff_table(&COEFFS_SIGN_X2_CHEBY);
		let x4 = parse_coeff_table(&COEFFS_SIGN_X4_CHEBY);
		// T_k(1) = 1, and a doubling polynomial fixes 1.
		assert_eq!(x2.iter().sum::<f64>(), 1.0);
		assert_eq!(x4.iter().sum::<f64>(), 1.0);
	}

	#[test]
	fn single_stage_sign_approximation() {
		let stages =
			gen_minimax_composite_polynomial(52, 2, 20, &[7], f64::signum).unwrap();
		assert_eq!(stages.len(), 1);
		let coeffs = &stages[0];
		// Odd polynomial.
		for (d, c) in coeffs.iter().enumerate() {
			if d % 2 == 0 {
				assert_eq!(*c, 0.0);
			}
		}
		// Good sign approximation on the reference interval.
		let eval = |x: f64| -> f64 {
			coeffs
				.iter()
				.enumerate()
				.map(|(d, &c)| c * chebyshev_t(d, x))
				.sum()
		};
		for &x in &[0.3f64, 0.5, 0.8, 1.0] {
			assert!((eval(x) - 1.0).abs() < 0.45, "x = {x}: {}", eval(x));
			assert!((eval(-x) + 1.0).abs() < 0.45);
		}
	}

	#[test]
	fn composite_generation_is_reproducible() {
		let a = gen_minimax_composite_polynomial(52, 3, 24, &[7, 7], f64::signum).unwrap();
		let b = gen_minimax_composite_polynomial(52, 3, 24, &[7, 7], f64::signum).unwrap();
		assert_eq!(a, b);
		assert_eq!(a.len(), 2);
	}
}
