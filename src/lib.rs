//! Case-split and pattern-elimination engine for an interactive proof
//! kernel.
//!
//! Given a goal containing a hypothesis of inductively defined type,
//! [cases] decomposes it into one sub-goal per constructor, generalizing
//! shared type indices first when needed, and then simplifies the
//! equality hypotheses the decomposition introduces: impossible branches
//! are discharged (no-confusion, acyclicity), solvable equalities are
//! substituted away (injectivity, free-variable elimination).

pub mod acyclic;
pub mod cases;
pub mod env;
pub mod goal;
pub mod simp;
pub mod tt;
pub mod unify_eq;

pub use cases::{cases, cases_at_most_one, cases_exactly_one, Generalized, SubGoal};
pub use unify_eq::{subst_eqs, unify_eqs};
