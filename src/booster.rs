use crate::constants::DEFAULT_LOG_ITERATIONS;
use crate::data::{ClaimsData, Matrix};
use crate::errors::ClaimBoostError;
use crate::learner::{FittedLearner, WeakLearner};
use crate::metric::{is_comparison_better, metric_callables, poisson_deviance, Metric};
use log::{info, warn};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Instant;

/// One boosting round: the fitted weak learner and the log-scale update it
/// contributed to every training observation.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Round<M> {
    pub model: M,
    pub update: Vec<f64>,
}

/// Sequential multiplicative booster for claim frequency.
///
/// Keeps a log-scale score per training observation. Every round fits a weak
/// learner against the working exposure `exposure * exp(score)` and adds the
/// log of its multiplicative prediction to the score. The final frequency is
/// `exposure * exp(init_score + sum of round logs)`.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct FrequencyBooster<M> {
    /// Setting to a value (N) other than zero will result in information being logged about every N rounds.
    pub log_iterations: usize,
    /// Predict in parallel.
    pub parallel: bool,
    init_score: Option<f64>,
    n_features: usize,
    scores: Vec<f64>,
    rounds: Vec<Round<M>>,
}

impl<M> Default for FrequencyBooster<M> {
    fn default() -> Self {
        FrequencyBooster {
            log_iterations: DEFAULT_LOG_ITERATIONS,
            parallel: false,
            init_score: None,
            n_features: 0,
            scores: Vec::new(),
            rounds: Vec::new(),
        }
    }
}

impl<M> FrequencyBooster<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initialize the score with the portfolio log frequency
    /// `ln(total_count / total_exposure)`, discarding any previous rounds.
    ///
    /// Fails without touching the booster when the total count or the total exposure is zero.
    pub fn init(&mut self, data: &ClaimsData) -> Result<(), ClaimBoostError> {
        let total_count = data.total_count();
        let total_exposure = data.total_exposure();
        if total_count <= 0.0 {
            return Err(ClaimBoostError::DegenerateInput(
                "total count is zero, the log frequency is undefined".to_string(),
            ));
        }
        if total_exposure <= 0.0 {
            return Err(ClaimBoostError::DegenerateInput("total exposure is zero".to_string()));
        }
        let init_score = (total_count / total_exposure).ln();
        self.init_score = Some(init_score);
        self.n_features = data.features.cols;
        self.scores = vec![init_score; data.len()];
        self.rounds = Vec::new();
        Ok(())
    }

    /// Working exposure of the next round, `exposure * exp(score)`.
    pub fn working_offset(&self, data: &ClaimsData) -> Result<Vec<f64>, ClaimBoostError> {
        self.check_training_data(data)?;
        Ok(data
            .exposure
            .iter()
            .zip(&self.scores)
            .map(|(e, s)| e * s.exp())
            .collect())
    }

    fn check_training_data(&self, data: &ClaimsData) -> Result<(), ClaimBoostError> {
        if self.init_score.is_none() {
            return Err(ClaimBoostError::NotInitialized);
        }
        if self.scores.len() != data.len() {
            return Err(ClaimBoostError::LengthMismatch(
                "training data".to_string(),
                self.scores.len(),
                data.len(),
            ));
        }
        Ok(())
    }

    /// The log-scale intercept, `None` before `init`.
    pub fn init_score(&self) -> Option<f64> {
        self.init_score
    }

    /// Number of feature columns of the training data.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Current score of every training observation.
    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn rounds(&self) -> &[Round<M>] {
        &self.rounds
    }

    /// Number of successful rounds.
    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    /// Get reference to the fitted weak learners, in round order.
    pub fn get_models(&self) -> Vec<&M> {
        self.rounds.iter().map(|r| &r.model).collect()
    }

    /// Set the logging frequency.
    /// * `log_iterations` - Log every N rounds, 0 disables round logging.
    pub fn set_log_iterations(mut self, log_iterations: usize) -> Self {
        self.log_iterations = log_iterations;
        self
    }

    /// Set whether weak learners predict in parallel.
    pub fn set_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

impl<M> FrequencyBooster<M>
where
    M: FittedLearner,
{
    /// Run a single boosting round.
    ///
    /// The round either completes, updating the score and storing the model,
    /// or fails leaving the booster unchanged.
    ///
    /// * `data` - The dataset passed to `init`.
    /// * `learner` - Weak learner fitted on the counts with the working exposure as offset.
    pub fn run_round<W>(&mut self, data: &ClaimsData, learner: &W) -> Result<(), ClaimBoostError>
    where
        W: WeakLearner<Model = M>,
    {
        let offset = self.working_offset(data)?;
        let model = learner.fit(&data.features, data.counts, &offset)?;
        let preds = self.model_predictions(&model, &data.features)?;
        if let Some((i, p)) = preds.iter().enumerate().find(|(_, p)| !(p.is_finite() && **p > 0.0)) {
            return Err(ClaimBoostError::InvalidPrediction(i, *p));
        }
        let update: Vec<f64> = preds.iter().map(|p| p.ln()).collect();
        self.scores.iter_mut().zip(&update).for_each(|(s, u)| *s += u);
        self.rounds.push(Round { model, update });
        Ok(())
    }

    /// Initialize the booster and run `n_rounds` boosting rounds.
    /// Stops at the first failing round and returns its error.
    ///
    /// * `data` - Training data.
    /// * `learner` - Weak learner used every round.
    /// * `n_rounds` - Number of rounds to run.
    pub fn fit<W>(&mut self, data: &ClaimsData, learner: &W, n_rounds: usize) -> Result<(), ClaimBoostError>
    where
        W: WeakLearner<Model = M>,
    {
        let start = Instant::now();
        self.init(data)?;

        for i in 0..n_rounds {
            if let Err(e) = self.run_round(data, learner) {
                warn!("Boosting round {} failed: {}", i + 1, e);
                return Err(e);
            }
            if self.log_iterations > 0 && (i + 1) % self.log_iterations == 0 {
                info!(
                    "round {:0?}, training deviance: {:1?}",
                    i + 1,
                    self.training_deviance(data)
                );
            }
        }

        if self.log_iterations > 0 {
            info!(
                "Finished training a booster with {0} rounds in {1:.3}s.",
                self.rounds.len(),
                start.elapsed().as_secs_f32()
            );
        }
        Ok(())
    }

    /// Mean Poisson deviance of the current score on the training data.
    pub fn training_deviance(&self, data: &ClaimsData) -> f64 {
        let yhat: Vec<f64> = data
            .exposure
            .iter()
            .zip(&self.scores)
            .map(|(e, s)| e * s.exp())
            .collect();
        poisson_deviance(data.counts, &yhat, &vec![1.0; yhat.len()])
    }

    fn fitted_init_score(&self) -> Result<f64, ClaimBoostError> {
        match self.init_score {
            Some(init_score) if !self.rounds.is_empty() => Ok(init_score),
            _ => Err(ClaimBoostError::UnfittedModel),
        }
    }

    /// Query features must have the training columns and a consistent data block.
    fn check_features(&self, data: &Matrix<f64>) -> Result<(), ClaimBoostError> {
        if data.data.len() != data.rows * data.cols {
            return Err(ClaimBoostError::LengthMismatch(
                "feature data".to_string(),
                data.rows * data.cols,
                data.data.len(),
            ));
        }
        if data.cols != self.n_features {
            return Err(ClaimBoostError::LengthMismatch(
                "feature columns".to_string(),
                self.n_features,
                data.cols,
            ));
        }
        Ok(())
    }

    /// Predictions of one weak learner, one per row of `data`.
    fn model_predictions(&self, model: &M, data: &Matrix<f64>) -> Result<Vec<f64>, ClaimBoostError> {
        let preds = model.predict(data, self.parallel);
        if preds.len() != data.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "weak learner predictions".to_string(),
                data.rows,
                preds.len(),
            ));
        }
        Ok(preds)
    }

    fn check_exposure(data: &Matrix<f64>, exposure: &[f64]) -> Result<(), ClaimBoostError> {
        if exposure.len() != data.rows {
            return Err(ClaimBoostError::LengthMismatch(
                "exposure".to_string(),
                data.rows,
                exposure.len(),
            ));
        }
        Ok(())
    }

    /// Link-scale prediction `init_score + sum of round logs`, without exposure.
    ///
    /// * `data` - Feature matrix, not necessarily the training data.
    pub fn predict_log(&self, data: &Matrix<f64>) -> Result<Vec<f64>, ClaimBoostError> {
        let init_score = self.fitted_init_score()?;
        self.check_features(data)?;
        let mut log_preds = vec![init_score; data.rows];
        for round in &self.rounds {
            let preds = self.model_predictions(&round.model, data)?;
            log_preds.iter_mut().zip(preds).for_each(|(lp, p)| *lp += p.ln());
        }
        Ok(log_preds)
    }

    /// Expected claim count `exposure * exp(init_score + sum of round logs)`.
    ///
    /// * `data` - Feature matrix, not necessarily the training data.
    /// * `exposure` - Exposure of every row.
    pub fn predict(&self, data: &Matrix<f64>, exposure: &[f64]) -> Result<Vec<f64>, ClaimBoostError> {
        Self::check_exposure(data, exposure)?;
        let log_preds = self.predict_log(data)?;
        if self.parallel {
            Ok(log_preds.par_iter().zip(exposure).map(|(lp, e)| e * lp.exp()).collect())
        } else {
            Ok(log_preds.iter().zip(exposure).map(|(lp, e)| e * lp.exp()).collect())
        }
    }

    /// Same quantity as [`FrequencyBooster::predict`], computed as the literal product
    /// `exp(init_score) * exposure * prod of round predictions`.
    /// Prone to underflow for many rounds, prefer `predict`.
    pub fn predict_product(&self, data: &Matrix<f64>, exposure: &[f64]) -> Result<Vec<f64>, ClaimBoostError> {
        Self::check_exposure(data, exposure)?;
        let base = self.fitted_init_score()?.exp();
        self.check_features(data)?;
        let mut preds: Vec<f64> = exposure.iter().map(|e| base * e).collect();
        for round in &self.rounds {
            let round_preds = self.model_predictions(&round.model, data)?;
            preds.iter_mut().zip(round_preds).for_each(|(p, r)| *p *= r);
        }
        Ok(preds)
    }

    /// Expected claim counts after each round, `staged[k]` uses the first `k + 1` rounds.
    pub fn staged_predict(&self, data: &Matrix<f64>, exposure: &[f64]) -> Result<Vec<Vec<f64>>, ClaimBoostError> {
        Self::check_exposure(data, exposure)?;
        let init_score = self.fitted_init_score()?;
        self.check_features(data)?;
        let mut log_preds = vec![init_score; data.rows];
        let mut staged: Vec<Vec<f64>> = Vec::with_capacity(self.rounds.len());
        for round in &self.rounds {
            let preds = self.model_predictions(&round.model, data)?;
            log_preds.iter_mut().zip(preds).for_each(|(lp, p)| *lp += p.ln());
            staged.push(log_preds.iter().zip(exposure).map(|(lp, e)| e * lp.exp()).collect());
        }
        Ok(staged)
    }

    /// Value of `metric` on `data` after each round.
    pub fn evaluation_path(&self, data: &ClaimsData, metric: &Metric) -> Result<Vec<f64>, ClaimBoostError> {
        let (metric_fn, _) = metric_callables(metric);
        let sample_weight = vec![1.0; data.len()];
        Ok(self
            .staged_predict(&data.features, data.exposure)?
            .iter()
            .map(|yhat| metric_fn(data.counts, yhat, &sample_weight))
            .collect())
    }

    /// Mean Poisson deviance on `data` after each round.
    pub fn deviance_path(&self, data: &ClaimsData) -> Result<Vec<f64>, ClaimBoostError> {
        self.evaluation_path(data, &Metric::PoissonDeviance)
    }

    /// Number of rounds with the best `metric` on `data`, typically held-out data.
    /// Ties keep the smaller number of rounds.
    pub fn best_n_rounds(&self, data: &ClaimsData, metric: &Metric) -> Result<usize, ClaimBoostError> {
        let (_, maximize) = metric_callables(metric);
        let path = self.evaluation_path(data, metric)?;
        let mut best = 0;
        for (i, value) in path.iter().enumerate().skip(1) {
            if is_comparison_better(path[best], *value, maximize) {
                best = i;
            }
        }
        Ok(best + 1)
    }
}

impl<M> FrequencyBooster<M>
where
    M: Serialize + DeserializeOwned,
{
    /// Save a booster as a json object to a file.
    ///
    /// * `path` - Path to save booster.
    pub fn save_booster(&self, path: &str) -> Result<(), ClaimBoostError> {
        let model = self.json_dump()?;
        match fs::write(path, model) {
            Err(e) => Err(ClaimBoostError::UnableToWrite(e.to_string())),
            Ok(_) => Ok(()),
        }
    }

    /// Dump a booster as a json object
    pub fn json_dump(&self) -> Result<String, ClaimBoostError> {
        match serde_json::to_string(self) {
            Ok(s) => Ok(s),
            Err(e) => Err(ClaimBoostError::UnableToWrite(e.to_string())),
        }
    }

    /// Load a booster from Json string
    ///
    /// * `json_str` - String object, which can be serialized to json.
    pub fn from_json(json_str: &str) -> Result<Self, ClaimBoostError> {
        let model = serde_json::from_str::<FrequencyBooster<M>>(json_str);
        match model {
            Ok(m) => Ok(m),
            Err(e) => Err(ClaimBoostError::UnableToRead(e.to_string())),
        }
    }

    /// Load a booster from a path to a json booster object.
    ///
    /// * `path` - Path to load booster from.
    pub fn load_booster(path: &str) -> Result<Self, ClaimBoostError> {
        let json_str = match fs::read_to_string(path) {
            Ok(s) => Ok(s),
            Err(e) => Err(ClaimBoostError::UnableToRead(e.to_string())),
        }?;
        Self::from_json(&json_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learner::{ConstantLearner, ConstantModel};
    use crate::simulation::simulate_claims;
    use crate::tree::{PoissonTree, PoissonTreeLearner};
    use approx::assert_relative_eq;
    use hashbrown::HashSet;
    use std::cell::Cell;

    /// Predicts the same multiplier for every row.
    #[derive(Debug, Clone, Copy)]
    struct FixedLearner(f64);

    #[derive(Debug, Clone, Copy, Serialize, Deserialize)]
    struct FixedModel(f64);

    impl FittedLearner for FixedModel {
        fn predict(&self, data: &Matrix<f64>, _parallel: bool) -> Vec<f64> {
            vec![self.0; data.rows]
        }
    }

    impl WeakLearner for FixedLearner {
        type Model = FixedModel;
        fn fit(&self, _data: &Matrix<f64>, _y: &[f64], _offset: &[f64]) -> Result<FixedModel, ClaimBoostError> {
            Ok(FixedModel(self.0))
        }
    }

    /// Returns the same number of predictions whatever the number of rows.
    #[derive(Debug, Clone, Copy)]
    struct FixedLengthLearner(usize);

    #[derive(Debug, Clone, Copy)]
    struct FixedLengthModel(usize);

    impl FittedLearner for FixedLengthModel {
        fn predict(&self, _data: &Matrix<f64>, _parallel: bool) -> Vec<f64> {
            vec![2.0; self.0]
        }
    }

    impl WeakLearner for FixedLengthLearner {
        type Model = FixedLengthModel;
        fn fit(&self, _data: &Matrix<f64>, _y: &[f64], _offset: &[f64]) -> Result<FixedLengthModel, ClaimBoostError> {
            Ok(FixedLengthModel(self.0))
        }
    }

    /// Predicts 2.0 for the first `valid_rounds` fits, then a value that is not a valid multiplier.
    struct DegradingLearner {
        calls: Cell<usize>,
        valid_rounds: usize,
        bad_value: f64,
    }

    impl WeakLearner for DegradingLearner {
        type Model = FixedModel;
        fn fit(&self, _data: &Matrix<f64>, _y: &[f64], _offset: &[f64]) -> Result<FixedModel, ClaimBoostError> {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            if calls < self.valid_rounds {
                Ok(FixedModel(2.0))
            } else {
                Ok(FixedModel(self.bad_value))
            }
        }
    }

    fn tree_learner() -> PoissonTreeLearner {
        PoissonTreeLearner::default()
            .set_max_depth(2)
            .unwrap()
            .set_min_leaf_size(50)
            .unwrap()
            .set_categorical_features(HashSet::from_iter([1, 2]))
    }

    #[test]
    fn test_end_to_end_fixed_learner() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();

        let mut booster = FrequencyBooster::new();
        booster.init(&data).unwrap();
        let init = booster.init_score().unwrap();
        assert_relative_eq!(init, (0.75_f64).ln());
        assert_relative_eq!(init, -0.2877, epsilon = 1e-4);
        assert!(booster.scores().iter().all(|s| *s == init));

        booster.run_round(&data, &FixedLearner(1.5)).unwrap();
        booster.run_round(&data, &FixedLearner(1.5)).unwrap();
        assert_eq!(booster.n_rounds(), 2);
        for s in booster.scores() {
            assert_relative_eq!(*s, init + 2.0 * 1.5_f64.ln(), max_relative = 1e-12);
        }

        let preds = booster.predict(&data.features, &exposure).unwrap();
        for p in preds {
            assert_relative_eq!(p, 1.6875, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_prediction_length_is_checked() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();

        let mut booster = FrequencyBooster::new();
        booster.init(&data).unwrap();
        let init = booster.init_score().unwrap();
        let res = booster.run_round(&data, &FixedLengthLearner(2));
        assert!(matches!(res, Err(ClaimBoostError::LengthMismatch(_, 4, 2))));
        assert_eq!(booster.n_rounds(), 0);
        assert!(booster.scores().iter().all(|s| *s == init));

        // One prediction per training row, but not per query row.
        booster.run_round(&data, &FixedLengthLearner(4)).unwrap();
        for n_rows in [3, 5] {
            let query = vec![0.; n_rows];
            let query = Matrix::new(&query, n_rows, 1);
            let query_exposure = vec![1.; n_rows];
            assert!(matches!(
                booster.predict(&query, &query_exposure),
                Err(ClaimBoostError::LengthMismatch(_, r, 4)) if r == n_rows
            ));
            assert!(matches!(
                booster.predict_log(&query),
                Err(ClaimBoostError::LengthMismatch(_, r, 4)) if r == n_rows
            ));
            assert!(matches!(
                booster.predict_product(&query, &query_exposure),
                Err(ClaimBoostError::LengthMismatch(_, r, 4)) if r == n_rows
            ));
            assert!(matches!(
                booster.staged_predict(&query, &query_exposure),
                Err(ClaimBoostError::LengthMismatch(_, r, 4)) if r == n_rows
            ));
        }
        assert!(booster.predict(&data.features, &exposure).is_ok());
    }

    #[test]
    fn test_query_features_must_match_training_columns() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &FixedLearner(1.5), 1).unwrap();
        assert_eq!(booster.n_features(), 1);

        let wide = vec![0., 1., 2., 3.];
        let wide = Matrix::new(&wide, 2, 2);
        assert!(matches!(
            booster.predict(&wide, &[1., 1.]),
            Err(ClaimBoostError::LengthMismatch(_, 1, 2))
        ));

        let short = vec![0., 1.];
        let short = Matrix::new(&short, 4, 1);
        assert!(matches!(
            booster.predict(&short, &exposure),
            Err(ClaimBoostError::LengthMismatch(_, 4, 2))
        ));
    }

    #[test]
    fn test_tree_booster_rejects_narrow_query() {
        let sim = simulate_claims(1000, 4);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &tree_learner(), 2).unwrap();
        let narrow = vec![30., 40.];
        let narrow = Matrix::new(&narrow, 2, 1);
        assert!(matches!(
            booster.predict(&narrow, &[1., 1.]),
            Err(ClaimBoostError::LengthMismatch(..))
        ));
    }

    #[test]
    fn test_score_additivity() {
        let sim = simulate_claims(3000, 1);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &tree_learner(), 6).unwrap();
        assert_eq!(booster.n_rounds(), 6);

        let init = booster.init_score().unwrap();
        for (i, s) in booster.scores().iter().enumerate() {
            let expected = init + booster.rounds().iter().map(|r| r.update[i]).sum::<f64>();
            assert_relative_eq!(*s, expected, max_relative = 1e-12, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_sum_of_logs_matches_product() {
        let sim = simulate_claims(3000, 2);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new().set_parallel(true);
        booster.fit(&data, &tree_learner(), 6).unwrap();

        let test = simulate_claims(500, 3);
        let test_data = Matrix::new(&test.features, test.rows, test.cols);
        let by_logs = booster.predict(&test_data, &test.exposure).unwrap();
        let by_product = booster.predict_product(&test_data, &test.exposure).unwrap();
        for (a, b) in by_logs.iter().zip(&by_product) {
            assert_relative_eq!(*a, *b, max_relative = 1e-9);
        }

        // On the training rows the prediction is the exponentiated score.
        let train_preds = booster.predict(&data.features, data.exposure).unwrap();
        for ((p, s), e) in train_preds.iter().zip(booster.scores()).zip(data.exposure) {
            assert_relative_eq!(*p, e * s.exp(), max_relative = 1e-9);
        }
    }

    #[test]
    fn test_failed_round_is_atomic() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();

        for bad_value in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let learner = DegradingLearner {
                calls: Cell::new(0),
                valid_rounds: 1,
                bad_value,
            };
            let mut booster = FrequencyBooster::new();
            booster.init(&data).unwrap();
            booster.run_round(&data, &learner).unwrap();
            let scores = booster.scores().to_vec();

            let res = booster.run_round(&data, &learner);
            assert!(matches!(res, Err(ClaimBoostError::InvalidPrediction(0, _))));
            assert_eq!(booster.n_rounds(), 1);
            assert_eq!(booster.scores(), scores.as_slice());
        }
    }

    #[test]
    fn test_fit_stops_at_failing_round() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();
        let learner = DegradingLearner {
            calls: Cell::new(0),
            valid_rounds: 3,
            bad_value: 0.0,
        };
        let mut booster = FrequencyBooster::new().set_log_iterations(1);
        let res = booster.fit(&data, &learner, 6);
        assert!(matches!(res, Err(ClaimBoostError::InvalidPrediction(..))));
        assert_eq!(booster.n_rounds(), 3);
        assert_eq!(learner.calls.get(), 4);
    }

    #[test]
    fn test_predict_is_idempotent() {
        let sim = simulate_claims(2000, 4);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &tree_learner(), 3).unwrap();
        let first = booster.predict(&data.features, data.exposure).unwrap();
        let second = booster.predict(&data.features, data.exposure).unwrap();
        assert_eq!(first, second);
        assert_eq!(booster.n_rounds(), 3);
    }

    #[test]
    fn test_degenerate_init() {
        let x = vec![0., 1.];
        let exposure = vec![1., 1.];
        let counts = vec![0., 0.];
        let data = ClaimsData::new(Matrix::new(&x, 2, 1), &exposure, &counts).unwrap();
        let mut booster: FrequencyBooster<FixedModel> = FrequencyBooster::new();
        let res = booster.init(&data);
        assert!(matches!(res, Err(ClaimBoostError::DegenerateInput(_))));
        assert!(booster.init_score().is_none());
        assert!(booster.scores().is_empty());

        let zero_exposure = vec![0., 0.];
        let counts = vec![1., 0.];
        let data = ClaimsData::new(Matrix::new(&x, 2, 1), &zero_exposure, &counts).unwrap();
        assert!(matches!(booster.init(&data), Err(ClaimBoostError::DegenerateInput(_))));
    }

    #[test]
    fn test_unfitted_and_uninitialized() {
        let x = vec![0., 1.];
        let exposure = vec![1., 1.];
        let counts = vec![1., 0.];
        let data = ClaimsData::new(Matrix::new(&x, 2, 1), &exposure, &counts).unwrap();
        let mut booster = FrequencyBooster::new();
        assert!(matches!(
            booster.run_round(&data, &FixedLearner(1.0)),
            Err(ClaimBoostError::NotInitialized)
        ));
        assert!(matches!(
            booster.predict(&data.features, &exposure),
            Err(ClaimBoostError::UnfittedModel)
        ));
        booster.init(&data).unwrap();
        assert!(matches!(
            booster.predict(&data.features, &exposure),
            Err(ClaimBoostError::UnfittedModel)
        ));
        booster.run_round(&data, &FixedLearner(1.0)).unwrap();
        assert!(matches!(
            booster.predict(&data.features, &[1.]),
            Err(ClaimBoostError::LengthMismatch(..))
        ));

        let other_x = vec![0., 1., 2.];
        let other_exposure = vec![1., 1., 1.];
        let other_counts = vec![1., 0., 0.];
        let other = ClaimsData::new(Matrix::new(&other_x, 3, 1), &other_exposure, &other_counts).unwrap();
        assert!(matches!(
            booster.run_round(&other, &FixedLearner(1.0)),
            Err(ClaimBoostError::LengthMismatch(..))
        ));
    }

    #[test]
    fn test_constant_learner_first_round_is_neutral() {
        let sim = simulate_claims(1000, 5);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster: FrequencyBooster<ConstantModel> = FrequencyBooster::new();
        booster.fit(&data, &ConstantLearner, 2).unwrap();
        for model in booster.get_models() {
            assert_relative_eq!(model.multiplier, 1.0, max_relative = 1e-9);
        }
    }

    #[test]
    fn test_zero_exposure_rows_are_accepted() {
        let x = vec![0., 1., 2., 3., 4., 5.];
        let exposure = vec![0., 1., 1., 0.5, 1., 1.];
        let counts = vec![0., 1., 0., 2., 0., 1.];
        let data = ClaimsData::new(Matrix::new(&x, 6, 1), &exposure, &counts).unwrap();
        let learner = PoissonTreeLearner::default().set_min_leaf_size(1).unwrap();
        let mut booster: FrequencyBooster<PoissonTree> = FrequencyBooster::new();
        booster.fit(&data, &learner, 3).unwrap();
        let offset = booster.working_offset(&data).unwrap();
        assert_eq!(offset[0], 0.0);
        let preds = booster.predict(&data.features, &exposure).unwrap();
        assert_eq!(preds[0], 0.0);
        assert!(preds[1..].iter().all(|p| *p > 0.0));
    }

    #[test]
    fn test_boosting_reduces_deviance() {
        let sim = simulate_claims(5000, 6);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.init(&data).unwrap();
        let intercept_deviance = booster.training_deviance(&data);

        let learner = tree_learner();
        for _ in 0..6 {
            booster.run_round(&data, &learner).unwrap();
        }
        assert!(booster.training_deviance(&data) < intercept_deviance);

        let path = booster.deviance_path(&data).unwrap();
        assert_eq!(path.len(), 6);
        // Training deviance never increases with shrunk Poisson leaves.
        assert!(path.windows(2).all(|w| w[1] <= w[0] + 1e-12));
        assert_eq!(booster.best_n_rounds(&data, &Metric::PoissonDeviance).unwrap(), 6);
        assert_relative_eq!(path[5], booster.training_deviance(&data), max_relative = 1e-9);
        let staged = booster.staged_predict(&data.features, data.exposure).unwrap();
        assert_eq!(staged.len(), 6);
        assert_eq!(staged[5], booster.predict(&data.features, data.exposure).unwrap());
    }

    #[test]
    fn test_best_n_rounds_on_held_out_data() {
        let x = vec![0., 1., 2., 3.];
        let exposure = vec![1., 1., 1., 1.];
        let counts = vec![0., 1., 0., 2.];
        let data = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &FixedLearner(1.5), 4).unwrap();

        // Held-out counts match 0.75 * 1.5^2 best, that is two rounds.
        let held_out_counts = vec![2., 2., 1., 2.];
        let held_out = ClaimsData::new(Matrix::new(&x, 4, 1), &exposure, &held_out_counts).unwrap();
        let path = booster.deviance_path(&held_out).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(booster.best_n_rounds(&held_out, &Metric::PoissonDeviance).unwrap(), 2);
        assert_eq!(booster.evaluation_path(&held_out, &Metric::RootMeanSquaredError).unwrap().len(), 4);
    }

    #[test]
    fn test_booster_json_roundtrip() {
        let sim = simulate_claims(1500, 8);
        let data = ClaimsData::new(Matrix::new(&sim.features, sim.rows, sim.cols), &sim.exposure, &sim.counts).unwrap();
        let mut booster = FrequencyBooster::new();
        booster.fit(&data, &tree_learner(), 4).unwrap();

        let json = booster.json_dump().unwrap();
        let loaded: FrequencyBooster<PoissonTree> = FrequencyBooster::from_json(&json).unwrap();
        assert_eq!(loaded.n_rounds(), 4);
        assert_eq!(
            booster.predict(&data.features, data.exposure).unwrap(),
            loaded.predict(&data.features, data.exposure).unwrap()
        );

        let path = std::env::temp_dir().join("claimboost_booster_test.json");
        let path = path.to_str().unwrap();
        booster.save_booster(path).unwrap();
        let loaded: FrequencyBooster<PoissonTree> = FrequencyBooster::load_booster(path).unwrap();
        assert_eq!(loaded.scores(), booster.scores());
        assert!(FrequencyBooster::<PoissonTree>::from_json("{").is_err());
    }
}
