//! Model training module
//!
//! Provides the three classifier families the workflow compares:
//! - Multinomial logistic regression
//! - Random forest
//! - Softmax gradient boosted trees
//!
//! plus stratified cross-validation, test-set metrics and best-model
//! selection.

mod engine;
mod models;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod metrics;
pub mod random_forest;

pub use cross_validation::{cross_val_score, CVResults, CrossValidator, Fold};
pub use decision_tree::{DecisionTree, TreeNode, TreeTask};
pub use engine::{
    evaluate_model, select_best_model, train_gradient_boosting, train_logistic_regression,
    train_model, train_random_forest, TrainingConfig,
};
pub use gradient_boosting::{GradientBoostingClassifier, GradientBoostingConfig};
pub use linear_models::LogisticRegression;
pub use metrics::{accuracy_score, ClassificationReport};
pub use models::{unique_classes, Classifier, Estimator, ModelKind, TrainedModel};
pub use random_forest::RandomForest;
