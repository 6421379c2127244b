//! Pure logistic-regression ML components (spec.md §4.11). Both models are
//! scaler-baked dot-product-plus-sigmoid scorers: no ML runtime dependency
//! is needed at inference, only at the (separate, offline) training path.

pub mod classifier;
pub mod reranker;
pub mod training;

#[must_use]
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
