use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::tree::decision_tree_classifier::{
    DecisionTreeClassifier, DecisionTreeClassifierParameters, SplitCriterion,
};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

type Tree = DecisionTreeClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>;

/// Trait for binary failure classifiers
pub trait Classifier: Send + Sync {
    /// Probability of the failure class for every row
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>>;

    /// Predict 0/1 labels under a decision threshold
    fn predict(&self, features: &Array2<f64>, threshold: f64) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba(features)?
            .iter()
            .map(|&p| u8::from(p >= threshold))
            .collect())
    }

    /// Number of input columns the classifier was fitted on
    fn n_features(&self) -> usize;

    /// Get model type
    fn model_type(&self) -> ModelType;
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged ensemble of decision trees
    #[default]
    RandomForest,

    /// Single unbagged decision tree
    DecisionTree,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::RandomForest => write!(f, "Random Forest"),
            ModelType::DecisionTree => write!(f, "Decision Tree"),
        }
    }
}

/// Number of features considered by each tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features.max(1);
        let k = match self {
            MaxFeatures::Sqrt => (n as f64).sqrt().round() as usize,
            MaxFeatures::Log2 => (n as f64).log2().floor() as usize,
            MaxFeatures::All => n,
            MaxFeatures::Count(k) => *k,
        };
        k.clamp(1, n)
    }
}

/// Tree-growing hyperparameters shared by both model types
#[derive(Debug, Clone, PartialEq)]
pub struct TreeParams {
    /// Maximum tree depth; unlimited when unset
    pub max_depth: Option<u16>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    fn to_smartcore(&self) -> DecisionTreeClassifierParameters {
        let params = DecisionTreeClassifierParameters::default()
            .with_criterion(SplitCriterion::Gini)
            .with_min_samples_split(self.min_samples_split.max(2))
            .with_min_samples_leaf(self.min_samples_leaf.max(1));
        match self.max_depth {
            Some(depth) => params.with_max_depth(depth),
            None => params,
        }
    }

    pub fn describe(&self) -> HashMap<String, String> {
        [
            (
                "max_depth".to_string(),
                self.max_depth
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unlimited".to_string()),
            ),
            (
                "min_samples_split".to_string(),
                self.min_samples_split.to_string(),
            ),
            (
                "min_samples_leaf".to_string(),
                self.min_samples_leaf.to_string(),
            ),
        ]
        .into_iter()
        .collect()
    }
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let (rows, cols) = arr.dim();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(rows, cols, data, false)
}

fn labels_to_i32(labels: &[u8]) -> Vec<i32> {
    labels.iter().map(|&y| i32::from(y)).collect()
}

/// One member of an ensemble. A sample holding a single class cannot be
/// split, so it becomes a constant vote.
enum TreeMember {
    Fitted { tree: Tree, columns: Vec<usize> },
    Constant(u8),
}

impl TreeMember {
    fn fit(
        features: &Array2<f64>,
        labels: &[u8],
        columns: Vec<usize>,
        params: &TreeParams,
    ) -> Result<Self> {
        let first = labels.first().copied().unwrap_or(0);
        if labels.iter().all(|&y| y == first) {
            return Ok(TreeMember::Constant(first));
        }

        let x = ndarray_to_densematrix(&features.select(Axis(1), &columns));
        let y = labels_to_i32(labels);
        let tree = Tree::fit(&x, &y, params.to_smartcore())
            .map_err(|e| AppError::Training(format!("Failed to train decision tree: {}", e)))?;

        Ok(TreeMember::Fitted { tree, columns })
    }

    fn votes(&self, features: &Array2<f64>) -> Result<Vec<u8>> {
        match self {
            TreeMember::Constant(class) => Ok(vec![*class; features.nrows()]),
            TreeMember::Fitted { tree, columns } => {
                let x = ndarray_to_densematrix(&features.select(Axis(1), columns));
                let predictions = tree
                    .predict(&x)
                    .map_err(|e| AppError::Internal(format!("Prediction failed: {}", e)))?;
                Ok(predictions.iter().map(|&p| u8::from(p == 1)).collect())
            }
        }
    }
}

fn check_width(expected: usize, features: &Array2<f64>) -> Result<()> {
    if features.ncols() != expected {
        return Err(AppError::SchemaMismatch(format!(
            "classifier expects {} features, got {}",
            expected,
            features.ncols()
        )));
    }
    Ok(())
}

/// Single decision tree. Its probability is the tree's 0/1 vote.
pub struct DecisionTreeModel {
    member: TreeMember,
    n_features: usize,
}

impl DecisionTreeModel {
    pub fn fit(features: &Array2<f64>, labels: &[u8], params: &TreeParams) -> Result<Self> {
        let n_features = features.ncols();
        let member = TreeMember::fit(features, labels, (0..n_features).collect(), params)?;
        Ok(Self { member, n_features })
    }
}

impl Classifier for DecisionTreeModel {
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.n_features, features)?;
        let votes = self.member.votes(features)?;
        Ok(votes.into_iter().map(f64::from).collect())
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn model_type(&self) -> ModelType {
        ModelType::DecisionTree
    }
}

/// Random-forest hyperparameters
#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_features: MaxFeatures,

    /// Seed for bootstrap and feature sampling. Unset draws from OS entropy,
    /// so retrains differ slightly.
    pub seed: Option<u64>,

    pub tree: TreeParams,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_features: MaxFeatures::default(),
            seed: None,
            tree: TreeParams::default(),
        }
    }
}

impl ForestParams {
    pub fn describe(&self) -> HashMap<String, String> {
        let mut params = self.tree.describe();
        params.insert("n_trees".to_string(), self.n_trees.to_string());
        params.insert("max_features".to_string(), format!("{:?}", self.max_features));
        params.insert(
            "seed".to_string(),
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "entropy".to_string()),
        );
        params
    }
}

/// Bagged ensemble of CART trees. Each tree sees a bootstrap sample of the
/// rows and a random subset of the columns; the failure probability is the
/// share of trees voting for failure.
pub struct RandomForest {
    members: Vec<TreeMember>,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(features: &Array2<f64>, labels: &[u8], params: &ForestParams) -> Result<Self> {
        let (n_samples, n_features) = features.dim();
        if n_samples == 0 || n_features == 0 || n_samples != labels.len() {
            return Err(AppError::Training(format!(
                "cannot fit forest on {}x{} features with {} labels",
                n_samples,
                n_features,
                labels.len()
            )));
        }
        if params.n_trees == 0 {
            return Err(AppError::Configuration(
                "training.n_trees must be at least 1".to_string(),
            ));
        }

        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let k = params.max_features.resolve(n_features);

        let mut members = Vec::with_capacity(params.n_trees);
        for _ in 0..params.n_trees {
            let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
            let mut columns = rand::seq::index::sample(&mut rng, n_features, k).into_vec();
            columns.sort_unstable();

            let sample = features.select(Axis(0), &rows);
            let sample_labels: Vec<u8> = rows.iter().map(|&r| labels[r]).collect();
            members.push(TreeMember::fit(&sample, &sample_labels, columns, &params.tree)?);
        }

        let constant = members
            .iter()
            .filter(|m| matches!(m, TreeMember::Constant(_)))
            .count();
        debug!(
            n_trees = members.len(),
            constant_trees = constant,
            max_features = k,
            "Fitted random forest"
        );

        Ok(Self {
            members,
            n_features,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.members.len()
    }
}

impl Classifier for RandomForest {
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array1<f64>> {
        check_width(self.n_features, features)?;

        let mut positive = Array1::<f64>::zeros(features.nrows());
        for member in &self.members {
            for (slot, vote) in positive.iter_mut().zip(member.votes(features)?) {
                *slot += f64::from(vote);
            }
        }

        let n_trees = self.members.len() as f64;
        Ok(positive.mapv(|votes| votes / n_trees))
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }
}
