//! The acyclicity prover.
//!
//! For a hypothesis `x = b` where `b` is a constructor term strictly
//! containing `x`, derive falsehood from the family's registered
//! structural measure: the simplifier closes `size x < size b`, congruence
//! on the hypothesis gives `size x = size b`, and irreflexivity of the
//! strict order finishes. The attempt is speculative: the store is
//! snapshotted and restored if any sub-step fails.

use std::sync::LazyLock;

use crate::env::Env;
use crate::goal::Store;
use crate::simp;
use crate::tt::{mk_abs, mk_const, mk_hole, mk_local, mk_var, Id, QualifiedName, Term};

static CONGR_ARG: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("congr_arg"));
static EQ_NDREC: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq.ndrec"));

/// Attempts to discharge `goal_id`, whose target starts with the guard
/// `guard_ty` equating the free variable `x` with the constructor term
/// `rhs` of element type `elem_ty`. Returns `false` ("rule does not
/// apply") when no measure is registered or the size inequality cannot be
/// closed; the failure reason is traced either way.
pub fn prove_acyclic(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    guard_ty: &Term,
    elem_ty: &Term,
    x: Id,
    rhs: &Term,
) -> anyhow::Result<bool> {
    let ty = env.whnf(store, elem_ty);
    let Some((ind, _, _)) = env.as_inductive_app(store, &ty) else {
        log::debug!(target: "wari::acyclic", "acyclicity failed: {} is not an inductive application", ty);
        return Ok(false);
    };
    let ind_name = ind.name.clone();
    let Some(measure) = env.measure(&ind_name).cloned() else {
        log::debug!(
            target: "wari::acyclic",
            "acyclicity failed: no structural measure registered for {}",
            ind_name
        );
        return Ok(false);
    };
    let Some(rules) = env.rule_set(&measure.rules) else {
        log::debug!(
            target: "wari::acyclic",
            "acyclicity failed: rule set {} is not registered",
            measure.rules
        );
        return Ok(false);
    };

    let snapshot = store.snapshot();
    let size = mk_const(measure.size_fn.clone());
    let lt_target = mk_const(measure.lt_fn.clone()).apply([
        size.apply([mk_local(x)]),
        size.apply([rhs.clone()]),
    ]);
    let context = match store.goal(goal_id) {
        Ok(goal) => goal.context.clone(),
        Err(e) => return Err(e.into()),
    };
    let lt_goal = store.fresh_goal(context, lt_target.clone());
    let closed = match simp::close_goal(store, lt_goal, rules) {
        Ok(closed) => closed,
        Err(e) => {
            store.restore(snapshot);
            return Err(e);
        }
    };
    if !closed {
        store.restore(snapshot);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                target: "wari::acyclic",
                "acyclicity failed: {} is not closed by rule set {}",
                lt_target,
                measure.rules
            );
        }
        return Ok(false);
    }

    // size x = size rhs by congruence from the hypothesis; transport the
    // strict inequality along it and hit irreflexivity
    let h: Term = mk_var(0);
    let size_eq = mk_const(CONGR_ARG.clone()).apply([size.clone(), h]);
    let contradiction = mk_const(measure.irrefl.clone()).apply([
        size.apply([mk_local(x)]),
        mk_const(EQ_NDREC.clone()).apply([mk_hole(lt_goal), size_eq]),
    ]);
    store.assign(goal_id, mk_abs(None, guard_ty.clone(), contradiction))?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            target: "wari::acyclic",
            "acyclicity succeeded: {} = {} is impossible",
            x,
            rhs
        );
    }
    Ok(true)
}
