//! RegimeModel: Gaussian HMM fitted with Baum-Welch and decoded with Viterbi.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::algorithms::{
    backward, emission_log_probs, forward, log_matrix, log_vec, state_posteriors,
    transition_posteriors, viterbi, Matrix,
};
use super::gaussian::DiagGaussian;
use super::kmeans::kmeans;
use super::ModelFitError;
use crate::config::EngineConfig;
use crate::features::{FeatureFrame, FEATURE_NAMES};

/// Column-wise z-scoring fitted on the frame being modeled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    /// Population mean and standard deviation per column.
    pub fn fit(data: &[Vec<f64>]) -> Result<Self, ModelFitError> {
        let n = data.len();
        let d = data.first().map(Vec::len).unwrap_or(0);
        if n == 0 || d == 0 {
            return Err(ModelFitError::TooFewObservations { rows: n, states: 1 });
        }

        let mut means = vec![0.0; d];
        for row in data {
            if row.len() != d {
                return Err(ModelFitError::DimensionMismatch {
                    expected: d,
                    actual: row.len(),
                });
            }
            for (m, x) in means.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in &mut means {
            *m /= n as f64;
        }

        let mut stds = vec![0.0; d];
        for row in data {
            for ((s, x), m) in stds.iter_mut().zip(row).zip(&means) {
                *s += (x - m).powi(2);
            }
        }
        for (col, s) in stds.iter_mut().enumerate() {
            *s = (*s / n as f64).sqrt();
            if !(*s > 1e-12) {
                return Err(ModelFitError::ZeroVariance {
                    feature: column_name(col),
                });
            }
        }

        Ok(Self { means, stds })
    }

    pub fn transform(&self, data: &[Vec<f64>]) -> Result<Matrix, ModelFitError> {
        data.iter()
            .map(|row| {
                if row.len() != self.means.len() {
                    return Err(ModelFitError::DimensionMismatch {
                        expected: self.means.len(),
                        actual: row.len(),
                    });
                }
                Ok(row
                    .iter()
                    .zip(&self.means)
                    .zip(&self.stds)
                    .map(|((x, m), s)| (x - m) / s)
                    .collect())
            })
            .collect()
    }
}

fn column_name(col: usize) -> String {
    FEATURE_NAMES
        .get(col)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("column {col}"))
}

/// Fitted HMM parameters, in standardized feature space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmmParams {
    /// Initial state distribution (sums to 1).
    pub start_prob: Vec<f64>,
    /// Transition matrix, rows sum to 1.
    pub trans: Matrix,
    /// One diagonal Gaussian per state.
    pub emissions: Vec<DiagGaussian>,
}

impl HmmParams {
    pub fn n_states(&self) -> usize {
        self.start_prob.len()
    }

    pub fn n_features(&self) -> usize {
        self.emissions.first().map(DiagGaussian::dim).unwrap_or(0)
    }

    /// Mean of one feature column for every state.
    pub fn feature_means(&self, column: usize) -> Vec<f64> {
        self.emissions.iter().map(|e| e.mean[column]).collect()
    }
}

/// How EM ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub converged: bool,
    pub iterations: usize,
    /// Log-likelihood of the returned parameters.
    pub log_likelihood: f64,
}

/// Raw (model-internal) state index per observation row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSequence(pub Vec<usize>);

impl StateSequence {
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A fitted Gaussian HMM. Immutable: refitting builds a new model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeModel {
    params: HmmParams,
    standardizer: Standardizer,
    report: FitReport,
    seed: u64,
}

impl RegimeModel {
    /// Fit to a feature frame.
    pub fn fit(frame: &FeatureFrame, config: &EngineConfig, seed: u64) -> Result<Self, ModelFitError> {
        Self::fit_matrix(&frame.matrix(), config, seed)
    }

    /// Fit to raw (unstandardized) observation rows.
    pub fn fit_matrix(
        data: &[Vec<f64>],
        config: &EngineConfig,
        seed: u64,
    ) -> Result<Self, ModelFitError> {
        let k = config.n_states;
        if !(2..=3).contains(&k) {
            return Err(ModelFitError::InvalidStateCount(k));
        }
        if data.len() < k {
            return Err(ModelFitError::TooFewObservations {
                rows: data.len(),
                states: k,
            });
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelFitError::NonFiniteInput);
        }

        let standardizer = Standardizer::fit(data)?;
        let x = standardizer.transform(data)?;

        let mut rng = StdRng::seed_from_u64(seed);
        let mut params = initial_params(&x, k, config.min_covar, &mut rng);

        let max_iter = config.max_iter.max(1);
        let mut best: Option<(HmmParams, f64)> = None;
        let mut prev_ll = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..max_iter {
            iterations = iter + 1;
            let log_start = log_vec(&params.start_prob);
            let log_trans = log_matrix(&params.trans);
            let log_b = emission_log_probs(&x, &params.emissions);
            let (log_alpha, ll) = forward(&log_start, &log_trans, &log_b);
            if !ll.is_finite() {
                return Err(ModelFitError::NumericalFailure { iteration: iterations });
            }

            if best.as_ref().map_or(true, |(_, b)| ll > *b) {
                best = Some((params.clone(), ll));
            }

            if iterations % 10 == 0 {
                tracing::debug!(iteration = iterations, log_likelihood = ll, "em step");
            }

            if ll - prev_ll < config.tol {
                converged = true;
                break;
            }
            prev_ll = ll;

            let log_beta = backward(&log_trans, &log_b);
            let gamma = state_posteriors(&log_alpha, &log_beta);
            let xi = transition_posteriors(&log_alpha, &log_beta, &log_trans, &log_b, ll);
            params = m_step(&x, &gamma, &xi, &params, config);
        }

        let (params, log_likelihood) =
            best.ok_or(ModelFitError::NumericalFailure { iteration: iterations })?;

        if converged {
            tracing::info!(iterations, log_likelihood, "hmm fit converged");
        } else {
            tracing::warn!(
                iterations,
                log_likelihood,
                "hmm fit hit the iteration cap without converging"
            );
        }

        Ok(Self {
            params,
            standardizer,
            report: FitReport {
                converged,
                iterations,
                log_likelihood,
            },
            seed,
        })
    }

    pub fn params(&self) -> &HmmParams {
        &self.params
    }

    pub fn standardizer(&self) -> &Standardizer {
        &self.standardizer
    }

    pub fn report(&self) -> &FitReport {
        &self.report
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_states(&self) -> usize {
        self.params.n_states()
    }

    /// Most probable state path for a frame (Viterbi).
    pub fn decode(&self, frame: &FeatureFrame) -> Result<StateSequence, ModelFitError> {
        self.decode_matrix(&frame.matrix())
    }

    pub fn decode_matrix(&self, data: &[Vec<f64>]) -> Result<StateSequence, ModelFitError> {
        let log_b = self.log_emissions(data)?;
        let (path, _) = viterbi(
            &log_vec(&self.params.start_prob),
            &log_matrix(&self.params.trans),
            &log_b,
        );
        Ok(StateSequence(path))
    }

    /// Log-likelihood of a frame under the fitted parameters.
    pub fn score(&self, frame: &FeatureFrame) -> Result<f64, ModelFitError> {
        let log_b = self.log_emissions(&frame.matrix())?;
        let (_, ll) = forward(
            &log_vec(&self.params.start_prob),
            &log_matrix(&self.params.trans),
            &log_b,
        );
        Ok(ll)
    }

    /// Per-row posterior state probabilities.
    pub fn posteriors(&self, frame: &FeatureFrame) -> Result<Matrix, ModelFitError> {
        let log_b = self.log_emissions(&frame.matrix())?;
        let log_trans = log_matrix(&self.params.trans);
        let (alpha, _) = forward(&log_vec(&self.params.start_prob), &log_trans, &log_b);
        let beta = backward(&log_trans, &log_b);
        Ok(state_posteriors(&alpha, &beta))
    }

    fn log_emissions(&self, data: &[Vec<f64>]) -> Result<Matrix, ModelFitError> {
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ModelFitError::NonFiniteInput);
        }
        let x = self.standardizer.transform(data)?;
        Ok(emission_log_probs(&x, &self.params.emissions))
    }
}

/// Uniform start/transition probabilities, k-means emission means, and the
/// sample variance of each column (plus `min_covar`) for every state.
fn initial_params(x: &[Vec<f64>], k: usize, min_covar: f64, rng: &mut StdRng) -> HmmParams {
    let n = x.len() as f64;
    let d = x[0].len();

    let mut var = vec![0.0; d];
    for col in 0..d {
        let mean = x.iter().map(|r| r[col]).sum::<f64>() / n;
        let ss: f64 = x.iter().map(|r| (r[col] - mean).powi(2)).sum();
        var[col] = ss / (n - 1.0).max(1.0) + min_covar;
    }

    let centers = kmeans(x, k, rng);
    HmmParams {
        start_prob: vec![1.0 / k as f64; k],
        trans: vec![vec![1.0 / k as f64; k]; k],
        emissions: centers
            .into_iter()
            .map(|mean| DiagGaussian::new(mean, var.clone()))
            .collect(),
    }
}

fn normalize(v: &mut [f64]) -> bool {
    let sum: f64 = v.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        v.iter_mut().for_each(|p| *p /= sum);
        true
    } else {
        false
    }
}

/// M-step: re-estimate all parameters from posterior statistics.
fn m_step(
    x: &[Vec<f64>],
    gamma: &[Vec<f64>],
    xi: &[Vec<f64>],
    prev: &HmmParams,
    config: &EngineConfig,
) -> HmmParams {
    let k = prev.n_states();

    let mut start_prob = gamma[0].clone();
    if !normalize(&mut start_prob) {
        start_prob = prev.start_prob.clone();
    }

    let trans = xi
        .iter()
        .zip(&prev.trans)
        .map(|(row, prev_row)| {
            let mut row = row.clone();
            if normalize(&mut row) {
                row
            } else {
                prev_row.clone()
            }
        })
        .collect();

    let emissions = (0..k)
        .map(|j| {
            DiagGaussian::weighted(
                x,
                gamma.iter().map(move |g| g[j]),
                config.covars_prior,
                config.min_covar,
            )
            .unwrap_or_else(|| prev.emissions[j].clone())
        })
        .collect();

    HmmParams {
        start_prob,
        trans,
        emissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_cluster_data() -> Vec<Vec<f64>> {
        // alternating blocks of a calm and a noisy regime
        let mut data = Vec::new();
        for block in 0..6 {
            for i in 0..25 {
                let wiggle = ((i * 7 + block * 3) % 11) as f64 / 11.0 - 0.5;
                if block % 2 == 0 {
                    data.push(vec![0.1 * wiggle, 1.0 + 0.05 * wiggle]);
                } else {
                    data.push(vec![2.0 * wiggle, 5.0 + 0.5 * wiggle]);
                }
            }
        }
        data
    }

    fn config(k: usize) -> EngineConfig {
        EngineConfig {
            n_states: k,
            max_iter: 200,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn standardizer_zero_mean_unit_variance() {
        let data = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 60.0]];
        let s = Standardizer::fit(&data).unwrap();
        let z = s.transform(&data).unwrap();
        for col in 0..2 {
            let mean: f64 = z.iter().map(|r| r[col]).sum::<f64>() / 3.0;
            let var: f64 = z.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_variance_column_fails() {
        let data = vec![vec![1.0, 0.5, 3.0], vec![2.0, 0.5, 4.0], vec![3.0, 0.5, 1.0]];
        let err = RegimeModel::fit_matrix(&data, &config(2), 1).unwrap_err();
        assert_eq!(
            err,
            ModelFitError::ZeroVariance {
                feature: "volatility".into()
            }
        );
    }

    #[test]
    fn fewer_rows_than_states_fails() {
        let data = vec![vec![1.0, 2.0], vec![2.0, 1.0]];
        let err = RegimeModel::fit_matrix(&data, &config(3), 1).unwrap_err();
        assert!(matches!(err, ModelFitError::TooFewObservations { rows: 2, states: 3 }));
    }

    #[test]
    fn non_finite_input_fails() {
        let mut data = two_cluster_data();
        data[3][1] = f64::NAN;
        let err = RegimeModel::fit_matrix(&data, &config(2), 1).unwrap_err();
        assert_eq!(err, ModelFitError::NonFiniteInput);
    }

    #[test]
    fn fitted_parameters_are_distributions() {
        let model = RegimeModel::fit_matrix(&two_cluster_data(), &config(3), 42).unwrap();
        let p = model.params();
        assert!((p.start_prob.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        for row in &p.trans {
            assert!((row.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
        for e in &p.emissions {
            assert!(e.var.iter().all(|&v| v >= 1e-3));
        }
        assert!(model.report().log_likelihood.is_finite());
    }

    #[test]
    fn two_state_fit_separates_blocks() {
        let data = two_cluster_data();
        let model = RegimeModel::fit_matrix(&data, &config(2), 42).unwrap();
        let path = model.decode_matrix(&data).unwrap();
        assert_eq!(path.len(), data.len());
        // every block is decoded as a single state, alternating between blocks
        for block in 0..6 {
            let states = &path.as_slice()[block * 25..(block + 1) * 25];
            assert!(states.iter().all(|&s| s == states[0]), "block {block} split");
        }
        assert_ne!(path.as_slice()[0], path.as_slice()[25]);
    }

    #[test]
    fn best_likelihood_never_below_first_iteration() {
        let data = two_cluster_data();
        let one = RegimeModel::fit_matrix(
            &data,
            &EngineConfig {
                max_iter: 1,
                ..config(3)
            },
            5,
        )
        .unwrap();
        let many = RegimeModel::fit_matrix(&data, &config(3), 5).unwrap();
        assert!(!one.report().converged);
        assert_eq!(one.report().iterations, 1);
        assert!(many.report().log_likelihood >= one.report().log_likelihood);
    }

    #[test]
    fn decode_rejects_wrong_width() {
        let model = RegimeModel::fit_matrix(&two_cluster_data(), &config(2), 42).unwrap();
        let err = model.decode_matrix(&[vec![1.0, 2.0, 3.0]]).unwrap_err();
        assert!(matches!(err, ModelFitError::DimensionMismatch { expected: 2, actual: 3 }));
    }
}
