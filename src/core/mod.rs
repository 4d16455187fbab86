//! Core decision logic.

mod evaluator;

pub use evaluator::{Evaluation, Evaluator};
