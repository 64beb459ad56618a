//! One-class SVM anomaly scorer (RBF kernel, SMO solver)
//!
//! The dual problem solved is
//!
//! ```text
//! min  ½ αᵀ K α     s.t.  0 ≤ αᵢ ≤ 1,  Σ αᵢ = ν·l
//! ```
//!
//! with a second-order working set selection. The decision value of a point is
//! `Σ αᵢ K(xᵢ, x) − ρ`; anything not strictly positive lies outside the learned
//! boundary.

use crate::config::{Gamma, GammaMode, ModelConfig};
use crate::error::DetectError;
use crate::features::FeatureMatrix;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::{debug, warn};

// curvature floor for non positive-definite pairs
const TAU: f64 = 1e-12;

// memory budget of the kernel row cache
const KERNEL_CACHE_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Inlier,
    Outlier,
}

impl Label {
    pub fn is_outlier(&self) -> bool {
        *self == Label::Outlier
    }
}

/// A boundary fitted on one feature matrix, kept as in-sample results only.
#[derive(Debug, Clone)]
pub struct OneClassModel {
    pub gamma: f64,
    pub rho: f64,
    // multipliers of the training rows
    pub alpha: Vec<f64>,
    // Σ αⱼ K(xᵢ, xⱼ) − ρ for every training row
    pub decision_values: Vec<f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl OneClassModel {
    pub fn labels(&self) -> Vec<Label> {
        self.decision_values.iter().map(|&f| label_for(f)).collect()
    }
}

fn label_for(decision: f64) -> Label {
    if decision > 0.0 { Label::Inlier } else { Label::Outlier }
}

// Anomaly scorer - fits a fresh boundary on every call
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: ModelConfig,
}

impl AnomalyScorer {
    pub fn new(config: ModelConfig) -> Result<Self, DetectError> {
        config.validate()?;
        Ok(Self { config })
    }

    // label every row of `matrix`, in-sample
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<Label>, DetectError> {
        if matrix.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.fit(matrix)?.labels())
    }

    pub fn resolve_gamma(&self, matrix: &FeatureMatrix) -> f64 {
        let features = matrix.cols();
        match self.config.gamma {
            Gamma::Fixed(value) => value,
            Gamma::Mode(_) if features == 0 => 1.0,
            Gamma::Mode(GammaMode::Auto) => 1.0 / features as f64,
            Gamma::Mode(GammaMode::Scale) => {
                let values = matrix.values();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
                if var > 0.0 { 1.0 / (features as f64 * var) } else { 1.0 }
            }
        }
    }

    pub fn fit(&self, matrix: &FeatureMatrix) -> Result<OneClassModel, DetectError> {
        if matrix.is_empty() {
            return Err(DetectError::InvalidModelParameter(
                "cannot fit a boundary on zero rows".to_string(),
            ));
        }

        let l = matrix.rows();
        let gamma = self.resolve_gamma(matrix);
        let mut kernel = KernelRows::new(matrix, gamma);

        // feasible start: first ⌊νl⌋ multipliers at the bound, the remainder on the next one
        let nu_l = self.config.nu * l as f64;
        let full = (nu_l.floor() as usize).min(l);
        let mut alpha = vec![0.0; l];
        alpha.iter_mut().take(full).for_each(|a| *a = 1.0);
        if full < l {
            alpha[full] = nu_l - full as f64;
        }

        // gradient of the objective: G = Kα
        let mut grad = vec![0.0; l];
        for (j, &a) in alpha.iter().enumerate() {
            if a > 0.0 {
                let column = kernel.row(j);
                grad.iter_mut().zip(column.iter()).for_each(|(g, k)| *g += a * k);
            }
        }

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.config.max_iterations {
            let Some((i, j)) = select_working_set(&alpha, &grad, &mut kernel, self.config.tolerance) else {
                converged = true;
                break;
            };
            iterations += 1;

            let qi = kernel.row(i);
            let qj = kernel.row(j);

            let old_ai = alpha[i];
            let old_aj = alpha[j];

            let mut quad = 2.0 - 2.0 * qi[j];
            if quad <= 0.0 {
                quad = TAU;
            }
            let delta = (grad[i] - grad[j]) / quad;
            let sum = old_ai + old_aj;
            let mut ai = old_ai - delta;
            let mut aj = old_aj + delta;

            // clip to the box while keeping αi + αj constant
            if sum > 1.0 {
                if ai > 1.0 {
                    ai = 1.0;
                    aj = sum - 1.0;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > 1.0 {
                if aj > 1.0 {
                    aj = 1.0;
                    ai = sum - 1.0;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }

            alpha[i] = ai;
            alpha[j] = aj;

            let dai = ai - old_ai;
            let daj = aj - old_aj;
            for (k, g) in grad.iter_mut().enumerate() {
                *g += qi[k] * dai + qj[k] * daj;
            }
        }

        if !converged {
            warn!(
                iterations,
                rows = l,
                "One-class solver hit the iteration cap, using current solution"
            );
        }

        let rho = compute_rho(&alpha, &grad);
        let decision_values = grad.iter().map(|g| g - rho).collect();

        debug!(rows = l, gamma, rho, iterations, "One-class boundary fitted");

        Ok(OneClassModel {
            gamma,
            rho,
            alpha,
            decision_values,
            iterations,
            converged,
        })
    }
}

// Pick the maximal violating pair, None once the KKT gap is below `eps`.
fn select_working_set(
    alpha: &[f64],
    grad: &[f64],
    kernel: &mut KernelRows,
    eps: f64,
) -> Option<(usize, usize)> {
    let mut gmax = f64::NEG_INFINITY;
    let mut gmax_idx = None;
    for (t, (&a, &g)) in alpha.iter().zip(grad).enumerate() {
        if a < 1.0 && -g >= gmax {
            gmax = -g;
            gmax_idx = Some(t);
        }
    }
    let i = gmax_idx?;
    let qi = kernel.row(i);

    let mut gmax2 = f64::NEG_INFINITY;
    let mut gmin_idx = None;
    let mut obj_diff_min = f64::INFINITY;
    for (j, (&a, &g)) in alpha.iter().zip(grad).enumerate() {
        if a <= 0.0 {
            continue;
        }
        if g >= gmax2 {
            gmax2 = g;
        }
        let grad_diff = gmax + g;
        if grad_diff > 0.0 {
            let quad = 2.0 - 2.0 * qi[j];
            let obj_diff = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
            if obj_diff <= obj_diff_min {
                gmin_idx = Some(j);
                obj_diff_min = obj_diff;
            }
        }
    }

    if gmax + gmax2 < eps {
        return None;
    }
    gmin_idx.map(|j| (i, j))
}

// offset of the boundary: mean gradient over free multipliers,
// midpoint of the feasible interval when none is free
fn compute_rho(alpha: &[f64], grad: &[f64]) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free = 0usize;
    let mut sum_free = 0.0;

    for (&a, &g) in alpha.iter().zip(grad) {
        if a >= 1.0 {
            lb = lb.max(g);
        } else if a <= 0.0 {
            ub = ub.min(g);
        } else {
            free += 1;
            sum_free += g;
        }
    }

    if free > 0 {
        sum_free / free as f64
    } else {
        (ub + lb) / 2.0
    }
}

// Kernel matrix rows computed on demand, FIFO-cached under a byte budget
struct KernelRows<'a> {
    matrix: &'a FeatureMatrix,
    gamma: f64,
    sq_norms: Vec<f64>,
    cache: Vec<Option<Rc<[f64]>>>,
    order: VecDeque<usize>,
    capacity: usize,
}

impl<'a> KernelRows<'a> {
    fn new(matrix: &'a FeatureMatrix, gamma: f64) -> Self {
        let l = matrix.rows();
        let sq_norms = (0..l)
            .map(|i| matrix.row(i).iter().map(|v| v * v).sum())
            .collect();
        let row_bytes = l.max(1) * std::mem::size_of::<f64>();
        Self {
            matrix,
            gamma,
            sq_norms,
            cache: vec![None; l],
            order: VecDeque::new(),
            capacity: (KERNEL_CACHE_BYTES / row_bytes).max(2),
        }
    }

    // shared handle to row i, computed on a miss
    fn row(&mut self, i: usize) -> Rc<[f64]> {
        if let Some(row) = &self.cache[i] {
            return Rc::clone(row);
        }

        let xi = self.matrix.row(i);
        let row: Rc<[f64]> = (0..self.matrix.rows())
            .map(|j| {
                let dot: f64 = xi.iter().zip(self.matrix.row(j)).map(|(a, b)| a * b).sum();
                let dist = (self.sq_norms[i] + self.sq_norms[j] - 2.0 * dot).max(0.0);
                (-self.gamma * dist).exp()
            })
            .collect();

        if self.order.len() >= self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.cache[evicted] = None;
            }
        }
        self.cache[i] = Some(Rc::clone(&row));
        self.order.push_back(i);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn rbf(a: &[f64], b: &[f64], gamma: f64) -> f64 {
        let dist: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
        (-gamma * dist).exp()
    }

    // Σ αᵢ K(xᵢ, x) − ρ recomputed from the training rows
    fn decision_at(model: &OneClassModel, m: &FeatureMatrix, x: &[f64]) -> f64 {
        let sum: f64 = (0..m.rows())
            .map(|i| model.alpha[i] * rbf(m.row(i), x, model.gamma))
            .sum();
        sum - model.rho
    }

    fn scorer(nu: f64, gamma: Gamma) -> AnomalyScorer {
        AnomalyScorer::new(ModelConfig {
            nu,
            gamma,
            ..ModelConfig::default()
        })
        .unwrap()
    }

    // 20 points on the unit circle plus its centre
    fn ring_with_centre() -> FeatureMatrix {
        let mut rows: Vec<Vec<f64>> = (0..20)
            .map(|k| {
                let theta = 2.0 * PI * k as f64 / 20.0;
                vec![theta.cos(), theta.sin()]
            })
            .collect();
        rows.push(vec![0.0, 0.0]);
        FeatureMatrix::from_rows(rows).unwrap()
    }

    #[test]
    fn test_labels_cover_every_row() {
        let m = ring_with_centre();
        let labels = scorer(0.1, Gamma::Fixed(0.5)).score(&m).unwrap();
        assert_eq!(labels.len(), m.rows());
    }

    #[test]
    fn test_centre_of_ring_is_inlier() {
        let m = ring_with_centre();
        let model = scorer(0.1, Gamma::Fixed(0.5)).fit(&m).unwrap();
        assert!(model.converged);
        assert_eq!(model.labels()[20], Label::Inlier);
        assert!(model.decision_values[20] > 0.1);
    }

    #[test]
    fn test_multipliers_stay_feasible() {
        let m = ring_with_centre();
        let model = scorer(0.1, Gamma::Fixed(0.5)).fit(&m).unwrap();
        let total: f64 = model.alpha.iter().sum();
        assert!((total - 0.1 * 21.0).abs() < 1e-9);
        assert!(model.alpha.iter().all(|a| (0.0..=1.0).contains(a)));
        assert!(model.alpha.iter().filter(|a| **a > 0.0).count() >= 3);
    }

    #[test]
    fn test_strict_outliers_bounded_by_nu() {
        // two tight clusters and a few stragglers
        let mut rows = Vec::new();
        for k in 0..30 {
            let jitter = (k as f64 * 0.37).sin() * 0.1;
            rows.push(vec![jitter, 0.05 * (k % 5) as f64]);
            rows.push(vec![3.0 + jitter, 3.0 - 0.05 * (k % 4) as f64]);
        }
        rows.push(vec![10.0, -10.0]);
        rows.push(vec![-8.0, 9.0]);
        let m = FeatureMatrix::from_rows(rows).unwrap();

        let model = scorer(0.1, Gamma::Fixed(0.5)).fit(&m).unwrap();
        // beyond the solver tolerance only rows with αi = 1 can sit outside, and Σα = νl
        let strict = model.decision_values.iter().filter(|f| **f < -2e-3).count();
        assert!(strict as f64 <= (0.1 * m.rows() as f64).ceil());
    }

    #[test]
    fn test_in_sample_decision_matches_kernel_expansion() {
        let m = ring_with_centre();
        let model = scorer(0.2, Gamma::Fixed(0.5)).fit(&m).unwrap();
        for i in 0..m.rows() {
            let f = decision_at(&model, &m, m.row(i));
            assert!((f - model.decision_values[i]).abs() < 1e-6);
        }
        assert!(decision_at(&model, &m, &[0.0, 0.0]) > 0.0);
    }

    #[test]
    fn test_kernel_rows_are_shared_from_cache() {
        let m = ring_with_centre();
        let mut kernel = KernelRows::new(&m, 0.5);
        let first = kernel.row(3);
        let again = kernel.row(3);
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(first.len(), m.rows());
        assert!((first[3] - 1.0).abs() < 1e-12);
        assert!((first[20] - (-0.5f64).exp()).abs() < 1e-12);
    }

    #[test]
    fn test_single_row() {
        let m = FeatureMatrix::from_rows(vec![vec![1.0, 0.0]]).unwrap();
        let labels = scorer(0.1, Gamma::Mode(GammaMode::Auto)).score(&m).unwrap();
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn test_empty_matrix_scores_nothing() {
        let labels = scorer(0.1, Gamma::Mode(GammaMode::Auto))
            .score(&FeatureMatrix::empty())
            .unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_gamma_resolution() {
        let m = FeatureMatrix::from_rows(vec![vec![0.0, 1.0, 0.0, 1.0]]).unwrap();
        assert_eq!(scorer(0.1, Gamma::Mode(GammaMode::Auto)).resolve_gamma(&m), 0.25);
        // variance of [0, 1, 0, 1] is 0.25
        assert_eq!(scorer(0.1, Gamma::Mode(GammaMode::Scale)).resolve_gamma(&m), 1.0);
        assert_eq!(scorer(0.1, Gamma::Fixed(2.0)).resolve_gamma(&m), 2.0);

        let flat = FeatureMatrix::from_rows(vec![vec![0.5, 0.5]]).unwrap();
        assert_eq!(scorer(0.1, Gamma::Mode(GammaMode::Scale)).resolve_gamma(&flat), 1.0);
    }

    #[test]
    fn test_invalid_nu_rejected() {
        let result = AnomalyScorer::new(ModelConfig {
            nu: 0.0,
            ..ModelConfig::default()
        });
        assert!(matches!(result, Err(DetectError::InvalidModelParameter(_))));
    }

    #[test]
    fn test_iteration_cap_still_labels() {
        let m = ring_with_centre();
        let capped = AnomalyScorer::new(ModelConfig {
            gamma: Gamma::Fixed(0.5),
            max_iterations: 1,
            ..ModelConfig::default()
        })
        .unwrap();
        let model = capped.fit(&m).unwrap();
        assert!(model.iterations <= 1);
        assert_eq!(model.labels().len(), m.rows());
    }
}
