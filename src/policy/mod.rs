//! Authorization policy evaluator for the User, Group and Permission resources.
//! Keep the decision table in `evaluator` and the vocabulary in `model`.

mod evaluator;
mod model;

pub use evaluator::{authenticated, authorize, decide};
pub use model::{Action, Decision, Denial, Owned, ResourceKind, Scope};
