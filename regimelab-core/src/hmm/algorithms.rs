//! HMM recursions in log space: forward, backward, posteriors, Viterbi.
//!
//! All probabilities are carried as natural logs. `log_b[t][j]` is the log
//! emission density of observation `t` under state `j`.

use super::gaussian::DiagGaussian;

/// Row-major dense matrix.
pub type Matrix = Vec<Vec<f64>>;

/// `ln(Σ exp(v))` without overflow. Returns `-inf` for an empty or all `-inf` slice.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Element-wise natural log of a probability vector.
pub fn log_vec(p: &[f64]) -> Vec<f64> {
    p.iter().map(|v| v.ln()).collect()
}

/// Element-wise natural log of a probability matrix.
pub fn log_matrix(p: &[Vec<f64>]) -> Matrix {
    p.iter().map(|row| log_vec(row)).collect()
}

/// Log emission densities, T x K.
pub fn emission_log_probs(observations: &[Vec<f64>], emissions: &[DiagGaussian]) -> Matrix {
    observations
        .iter()
        .map(|x| emissions.iter().map(|e| e.log_pdf(x)).collect())
        .collect()
}

/// Forward recursion. Returns `(log_alpha, log_likelihood)`.
pub fn forward(log_start: &[f64], log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> (Matrix, f64) {
    let t_len = log_b.len();
    let n = log_start.len();
    if t_len == 0 {
        return (Vec::new(), 0.0);
    }

    let mut alpha = vec![vec![f64::NEG_INFINITY; n]; t_len];
    for j in 0..n {
        alpha[0][j] = log_start[j] + log_b[0][j];
    }

    let mut scratch = vec![0.0; n];
    for t in 1..t_len {
        for j in 0..n {
            for i in 0..n {
                scratch[i] = alpha[t - 1][i] + log_trans[i][j];
            }
            alpha[t][j] = log_sum_exp(&scratch) + log_b[t][j];
        }
    }

    let log_likelihood = log_sum_exp(&alpha[t_len - 1]);
    (alpha, log_likelihood)
}

/// Backward recursion. Returns `log_beta` with `log_beta[T-1] = 0`.
pub fn backward(log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> Matrix {
    let t_len = log_b.len();
    let n = log_trans.len();
    let mut beta = vec![vec![0.0; n]; t_len];
    if t_len == 0 {
        return beta;
    }

    let mut scratch = vec![0.0; n];
    for t in (0..t_len - 1).rev() {
        for i in 0..n {
            for j in 0..n {
                scratch[j] = log_trans[i][j] + log_b[t + 1][j] + beta[t + 1][j];
            }
            beta[t][i] = log_sum_exp(&scratch);
        }
    }
    beta
}

/// Posterior state occupancy `γ[t][j] = P(z_t = j | x)`; rows sum to 1.
pub fn state_posteriors(log_alpha: &[Vec<f64>], log_beta: &[Vec<f64>]) -> Matrix {
    log_alpha
        .iter()
        .zip(log_beta)
        .map(|(a, b)| {
            let joint: Vec<f64> = a.iter().zip(b).map(|(x, y)| x + y).collect();
            let norm = log_sum_exp(&joint);
            joint.iter().map(|v| (v - norm).exp()).collect()
        })
        .collect()
}

/// Expected transition counts `Σ_t P(z_t = i, z_{t+1} = j | x)`, K x K.
pub fn transition_posteriors(
    log_alpha: &[Vec<f64>],
    log_beta: &[Vec<f64>],
    log_trans: &[Vec<f64>],
    log_b: &[Vec<f64>],
    log_likelihood: f64,
) -> Matrix {
    let n = log_trans.len();
    let mut xi = vec![vec![0.0; n]; n];
    for t in 0..log_b.len().saturating_sub(1) {
        for i in 0..n {
            for j in 0..n {
                let lx = log_alpha[t][i] + log_trans[i][j] + log_b[t + 1][j] + log_beta[t + 1][j]
                    - log_likelihood;
                xi[i][j] += lx.exp();
            }
        }
    }
    xi
}

/// Viterbi decoding: most probable state path and its log probability.
///
/// Ties resolve to the lowest state index.
pub fn viterbi(log_start: &[f64], log_trans: &[Vec<f64>], log_b: &[Vec<f64>]) -> (Vec<usize>, f64) {
    let t_len = log_b.len();
    let n = log_start.len();
    if t_len == 0 {
        return (Vec::new(), 0.0);
    }

    let mut delta = vec![vec![f64::NEG_INFINITY; n]; t_len];
    let mut psi = vec![vec![0usize; n]; t_len];

    for j in 0..n {
        delta[0][j] = log_start[j] + log_b[0][j];
    }

    for t in 1..t_len {
        for j in 0..n {
            let mut best_val = f64::NEG_INFINITY;
            let mut best_state = 0;
            for i in 0..n {
                let val = delta[t - 1][i] + log_trans[i][j];
                if val > best_val {
                    best_val = val;
                    best_state = i;
                }
            }
            delta[t][j] = best_val + log_b[t][j];
            psi[t][j] = best_state;
        }
    }

    let (mut state, mut best) = (0, f64::NEG_INFINITY);
    for (j, &v) in delta[t_len - 1].iter().enumerate() {
        if v > best {
            best = v;
            state = j;
        }
    }

    let mut path = vec![0; t_len];
    path[t_len - 1] = state;
    for t in (1..t_len).rev() {
        state = psi[t][state];
        path[t - 1] = state;
    }

    (path, best)
}
