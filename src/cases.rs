//! Case splitting on a hypothesis of inductive type.
//!
//! The pipeline: decide whether the type's indices are independent
//! ([indices_independent]); if not, rewrite the goal so they are
//! ([generalize_indices]); resolve the eliminator; apply it, producing one
//! sub-goal per constructor ([split]); clear the auxiliary index
//! hypotheses ([elim_aux_indices]); and hand each sub-goal's equality
//! guards to the equation unifier.

use std::iter::zip;

use anyhow::{bail, ensure};

use crate::env::{Eliminator, Env, Inductive};
use crate::goal::{Goal, Store, Subst};
use crate::tt::{
    as_eq, guard, mk_const, mk_eq, mk_eq_refl, mk_heq, mk_heq_refl, mk_hole, mk_local, Context,
    Ctor, Decl, Id, Parameter, QualifiedName, Term,
};
use crate::unify_eq::{self, unify_eqs};

/// The case splitter's output unit: one goal per constructor, tagged with
/// the constructor's name and the substitution accumulated for the branch.
#[derive(Debug, Clone)]
pub struct SubGoal {
    pub goal: Id,
    pub ctor_name: QualifiedName,
    pub subst: Subst,
}

/// The index generalizer's output: the rewritten goal, the fresh major
/// variable standing in for the original one, the fresh index variables,
/// and the number of equality guards left in the target.
#[derive(Debug)]
pub struct Generalized {
    pub goal: Id,
    pub fvar: Id,
    pub indices: Vec<Id>,
    pub num_eqs: usize,
}

/// Decides whether the target type's indices are independent: each a bare
/// distinct variable occurring nowhere else reachable from the goal —
/// parameters, other hypotheses, or the target statement. A `false` here
/// is the normal dependent case, not an error.
pub fn indices_independent(
    store: &Store,
    goal: &Goal,
    fvar: Id,
    params: &[Term],
    indices: &[Term],
) -> bool {
    let mut seen: Vec<Id> = Vec::with_capacity(indices.len());
    for index in indices {
        let Some(x) = index.as_local() else {
            return false;
        };
        if seen.contains(&x) {
            return false;
        }
        let Some(decl) = goal.context.get(x) else {
            return false;
        };
        if decl.value.is_some() {
            return false;
        }
        seen.push(x);
    }
    for &x in &seen {
        if params.iter().any(|p| store.occurs(x, p)) {
            return false;
        }
        for decl in &goal.context.decls {
            if decl.id == fvar || seen.contains(&decl.id) {
                continue;
            }
            if store.occurs(x, &decl.ty)
                || decl
                    .value
                    .as_ref()
                    .is_some_and(|value| store.occurs(x, value))
            {
                return false;
            }
        }
        if store.occurs(x, &goal.target) {
            return false;
        }
    }
    true
}

/// Looks up the registered specialized eliminator, or derives the generic
/// recursor-shaped descriptor from the declaration itself.
pub fn resolve_eliminator(env: &Env, ind: &Inductive) -> Eliminator {
    if let Some(eliminator) = env.eliminator(&ind.name) {
        log::debug!(
            target: "wari::cases",
            "using specialized eliminator {}",
            eliminator.name
        );
        return eliminator.clone();
    }
    let (binders, _) = ind.ty.unpi();
    Eliminator {
        name: ind.name.extend("rec"),
        num_params: ind.num_params,
        num_indices: ind.num_indices,
        num_minors: ind.ctors.len(),
        index_tys: binders[ind.num_params..]
            .iter()
            .map(|binder| binder.ty.clone())
            .collect(),
    }
}

/// Beta-reduces `fun` applied to `args`, without normalizing any further.
fn beta_apply(fun: &Term, args: &[Term]) -> Term {
    let mut current = fun.clone();
    let mut k = 0;
    while k < args.len() {
        let Term::Abs(inner) = &current else {
            break;
        };
        current = inner.body.open(&[args[k].clone()], 0);
        k += 1;
    }
    current.apply(args[k..].iter().cloned())
}

/// Rewrites the goal so that every index of the target variable's type
/// becomes a fresh universally quantified variable connected to the
/// original index by an equality guard, the target variable itself
/// re-typed over the fresh indices; everything is re-introduced, leaving
/// the guards in the target for the splitter's motive.
pub fn generalize_indices(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    fvar: Id,
) -> anyhow::Result<Generalized> {
    let goal = store.goal(goal_id)?.clone();
    let Some(decl) = goal.context.get(fvar).cloned() else {
        bail!("unknown hypothesis {} in goal ?{}", fvar, goal_id);
    };
    let ty = env.whnf(store, &decl.ty);
    let Ok(view) = Ctor::try_from(ty.clone()) else {
        bail!("target type {} is not of inductive application shape", ty);
    };
    let Some(ind) = env.inductive(&view.head.name) else {
        bail!("target type head {} is not an inductive type", view.head.name);
    };
    let ind = ind.clone();
    ensure!(
        view.args.len() == ind.num_params + ind.num_indices,
        "inductive {} expects {} indices, found {}",
        ind.name,
        ind.num_indices,
        view.args.len().saturating_sub(ind.num_params)
    );
    let mut args = view.args;
    let indices = args.split_off(ind.num_params);
    let params = args;

    let (index_binders, _) = env.index_binders(&ind, &params);
    let mut js: Vec<Parameter> = Vec::with_capacity(indices.len());
    let mut inst: Vec<(Id, Term)> = Vec::with_capacity(indices.len());
    for binder in &index_binders {
        let j = Id::fresh_from(binder.id);
        js.push(Parameter {
            id: j,
            ty: binder.ty.subst(&inst),
        });
        inst.push((binder.id, mk_local(j)));
    }
    let x_new = Id::fresh_from(fvar);
    let x_new_ty = mk_const(ind.name.clone()).apply(
        params
            .iter()
            .cloned()
            .chain(js.iter().map(|j| mk_local(j.id))),
    );

    let mut guards = Vec::with_capacity(indices.len() + 1);
    let mut refls = Vec::with_capacity(indices.len() + 1);
    for (j, index) in zip(&js, &indices) {
        let index_ty = env.infer_type(store, &goal.context, index)?;
        if j.ty.alpha_eq(&index_ty) {
            guards.push(mk_eq(j.ty.clone(), mk_local(j.id), index.clone()));
            refls.push(mk_eq_refl(index_ty, index.clone()));
        } else {
            guards.push(mk_heq(
                j.ty.clone(),
                mk_local(j.id),
                index_ty.clone(),
                index.clone(),
            ));
            refls.push(mk_heq_refl(index_ty, index.clone()));
        }
    }
    if x_new_ty.alpha_eq(&ty) {
        guards.push(mk_eq(ty.clone(), mk_local(x_new), mk_local(fvar)));
        refls.push(mk_eq_refl(ty.clone(), mk_local(fvar)));
    } else {
        guards.push(mk_heq(
            x_new_ty.clone(),
            mk_local(x_new),
            ty.clone(),
            mk_local(fvar),
        ));
        refls.push(mk_heq_refl(ty.clone(), mk_local(fvar)));
    }
    let num_eqs = guards.len();

    let mut context = goal.context.clone();
    for j in &js {
        context.push(Decl {
            id: j.id,
            ty: j.ty.clone(),
            value: None,
        });
    }
    context.push(Decl {
        id: x_new,
        ty: x_new_ty,
        value: None,
    });
    let new_target = guard(goal.target.clone(), guards);
    let new_goal = store.fresh_goal(context, new_target);
    let proof = mk_hole(new_goal).apply(
        indices
            .iter()
            .cloned()
            .chain([mk_local(fvar)])
            .chain(refls),
    );
    store.assign(goal_id, proof)?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            target: "wari::cases",
            "generalized {} indices of {} in ?{} (now ?{})",
            indices.len(),
            fvar,
            goal_id,
            new_goal
        );
    }
    Ok(Generalized {
        goal: new_goal,
        fvar: x_new,
        indices: js.iter().map(|j| j.id).collect(),
        num_eqs,
    })
}

/// Applies the eliminator to the target variable, producing one sub-goal
/// per constructor in declaration order. The original goal is assigned the
/// eliminator application over the sub-goals' holes. The type's indices
/// must be bare distinct variables (guaranteed after generalization).
pub fn split(env: &Env, store: &mut Store, goal_id: Id, fvar: Id) -> anyhow::Result<Vec<SubGoal>> {
    let goal = store.goal(goal_id)?.clone();
    let Some(decl) = goal.context.get(fvar).cloned() else {
        bail!("unknown hypothesis {} in goal ?{}", fvar, goal_id);
    };
    ensure!(
        decl.value.is_none(),
        "cannot split on the let-bound hypothesis {}",
        fvar
    );
    let ty = env.whnf(store, &decl.ty);
    let Some((ind, params, indices)) = env.as_inductive_app(store, &ty) else {
        bail!("hypothesis {} : {} is not of inductive type", fvar, ty);
    };
    let ind = ind.clone();
    let eliminator = resolve_eliminator(env, &ind);
    ensure!(
        eliminator.num_params == ind.num_params
            && eliminator.num_indices == ind.num_indices
            && eliminator.num_minors == ind.ctors.len()
            && eliminator.index_tys.len() == eliminator.num_indices,
        "eliminator {} does not match the arity of {}",
        eliminator.name,
        ind.name
    );

    let mut index_ids = Vec::with_capacity(indices.len());
    for index in &indices {
        let Some(x) = index.as_local() else {
            bail!(
                "index {} of {} is not a variable; its indices must be generalized first",
                index,
                fvar
            );
        };
        index_ids.push(x);
    }

    let mut motive_params = Vec::with_capacity(index_ids.len() + 1);
    for &x in &index_ids {
        let Some(index_decl) = goal.context.get(x) else {
            bail!("index variable {} is not declared in goal ?{}", x, goal_id);
        };
        motive_params.push(Parameter {
            id: x,
            ty: index_decl.ty.clone(),
        });
    }
    motive_params.push(Parameter {
        id: fvar,
        ty: decl.ty.clone(),
    });
    let motive = goal.target.lambda_abstract(&motive_params);

    if ind.ctors.is_empty() {
        let proof = mk_const(eliminator.name.clone()).apply(
            params
                .iter()
                .cloned()
                .chain([motive])
                .chain(indices.iter().cloned())
                .chain([mk_local(fvar)]),
        );
        store.assign(goal_id, proof)?;
        log::debug!(
            target: "wari::cases",
            "empty family {}: goal ?{} closed outright",
            ind.name,
            goal_id
        );
        return Ok(vec![]);
    }

    let mut sub_goals = Vec::with_capacity(ind.ctors.len());
    let mut minors = Vec::with_capacity(ind.ctors.len());
    for ctor in &ind.ctors {
        let (binders, result_ty) = ctor.ty.unpi();
        ensure!(
            binders.len() == ind.num_params + ctor.num_fields,
            "constructor {} has a malformed telescope",
            ctor.name
        );
        let param_subst: Vec<(Id, Term)> = binders[..ind.num_params]
            .iter()
            .map(|binder| binder.id)
            .zip(params.iter().cloned())
            .collect();
        let fields: Vec<Parameter> = binders[ind.num_params..]
            .iter()
            .map(|binder| Parameter {
                id: binder.id,
                ty: binder.ty.subst(&param_subst),
            })
            .collect();
        let result = result_ty.subst(&param_subst);
        let result_args: Vec<Term> = result.args().into_iter().cloned().collect();
        ensure!(
            result_args.len() == ind.num_params + ind.num_indices,
            "constructor {} does not land in the family {}",
            ctor.name,
            ind.name
        );
        let ctor_indices = &result_args[ind.num_params..];
        let ctor_app = mk_const(ctor.name.clone()).apply(
            params
                .iter()
                .cloned()
                .chain(fields.iter().map(|field| mk_local(field.id))),
        );

        let motive_args: Vec<Term> = ctor_indices
            .iter()
            .cloned()
            .chain([ctor_app.clone()])
            .collect();
        let target = beta_apply(&motive, &motive_args);

        let mut context = Context::default();
        for d in &goal.context.decls {
            if d.id == fvar || index_ids.contains(&d.id) {
                continue;
            }
            context.push(d.clone());
        }
        for field in &fields {
            context.push(Decl {
                id: field.id,
                ty: field.ty.clone(),
                value: None,
            });
        }

        let sub_goal_id = store.fresh_goal(context, target);
        let mut subst = Subst::default();
        for (&x, t) in zip(&index_ids, ctor_indices) {
            subst = subst.extended(x, t.clone());
        }
        subst = subst.extended(fvar, ctor_app);
        sub_goals.push(SubGoal {
            goal: sub_goal_id,
            ctor_name: ctor.name.clone(),
            subst,
        });
        minors.push(mk_hole(sub_goal_id).lambda_abstract(&fields));
    }

    let proof = mk_const(eliminator.name.clone()).apply(
        params
            .iter()
            .cloned()
            .chain([motive])
            .chain(minors)
            .chain(indices.iter().cloned())
            .chain([mk_local(fvar)]),
    );
    store.assign(goal_id, proof)?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            target: "wari::cases",
            "split ?{} on {} into {} cases with {}",
            goal_id,
            fvar,
            sub_goals.len(),
            eliminator.name
        );
    }
    Ok(sub_goals)
}

/// Best-effort cleanup of the auxiliary index hypotheses a generalized
/// split leaves behind: each of the first `num_index_eqs` guards is either
/// discharged by substituting away the original index variable, or kept as
/// a plain hypothesis when still referenced. Never an error.
pub fn elim_aux_indices(
    env: &Env,
    store: &mut Store,
    sub_goals: Vec<SubGoal>,
    num_index_eqs: usize,
) -> anyhow::Result<Vec<SubGoal>> {
    let mut result = Vec::with_capacity(sub_goals.len());
    for mut sub in sub_goals {
        for _ in 0..num_index_eqs {
            let goal = store.goal(sub.goal)?.clone();
            let target = env.whnf(store, &goal.target);
            let Term::Pi(pi) = &target else {
                break;
            };
            let guard_ty = env.whnf(store, &pi.binder_type);
            let body = pi.body.clone();
            if let Some((eq_ty, lhs, rhs)) = as_eq(&guard_ty) {
                let (eq_ty, lhs, rhs) = (eq_ty.clone(), lhs.clone(), rhs.clone());
                let lhs_w = env.whnf(store, &lhs);
                let rhs_w = env.whnf(store, &rhs);
                if lhs_w.alpha_eq(&rhs_w) {
                    sub.goal = unify_eq::drop_refl_guard(
                        store, sub.goal, guard_ty, eq_ty, lhs_w, body,
                    )?;
                    continue;
                }
                // prefer eliminating the original index variable, which
                // sits on the right of the guard the generalizer built
                let mut substituted = None;
                if let Some(x) = rhs_w.as_local() {
                    if !store.occurs(x, &lhs_w) {
                        substituted = unify_eq::subst_guard(
                            store,
                            sub.goal,
                            guard_ty.clone(),
                            x,
                            &lhs,
                            true,
                            body.clone(),
                        )?
                        .map(|new_goal| (x, lhs.clone(), new_goal));
                    }
                }
                if substituted.is_none() {
                    if let Some(x) = lhs_w.as_local() {
                        if !store.occurs(x, &rhs_w) {
                            substituted = unify_eq::subst_guard(
                                store,
                                sub.goal,
                                guard_ty.clone(),
                                x,
                                &rhs,
                                false,
                                body.clone(),
                            )?
                            .map(|new_goal| (x, rhs.clone(), new_goal));
                        }
                    }
                }
                if let Some((x, t, new_goal)) = substituted {
                    sub.subst = sub.subst.extended(x, t);
                    sub.goal = new_goal;
                    continue;
                }
            }
            let (_, new_goal) = unify_eq::keep_guard(env, store, sub.goal, "h")?;
            sub.goal = new_goal;
        }
        result.push(sub);
    }
    Ok(result)
}

fn unify_all(
    env: &Env,
    store: &mut Store,
    sub_goals: Vec<SubGoal>,
    num_eqs: usize,
) -> anyhow::Result<Vec<SubGoal>> {
    let mut remaining = Vec::with_capacity(sub_goals.len());
    for sub in sub_goals {
        if let Some(sub) = unify_eqs(env, store, sub, num_eqs)? {
            remaining.push(sub);
        }
    }
    Ok(remaining)
}

/// The full pipeline: split the goal on `fvar`, one sub-goal per
/// constructor of its type, generalizing shared indices first and cleaning
/// the introduced equalities afterwards. Returns the remaining open
/// sub-goals.
pub fn cases(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    fvar: Id,
) -> anyhow::Result<Vec<SubGoal>> {
    ensure!(
        !store.is_assigned(goal_id),
        "goal ?{} is already solved",
        goal_id
    );
    let goal = store.goal(goal_id)?.clone();
    let Some(decl) = goal.context.get(fvar).cloned() else {
        bail!("unknown hypothesis {} in goal ?{}", fvar, goal_id);
    };
    let ty = env.whnf(store, &decl.ty);
    let Some((_, params, indices)) = env.as_inductive_app(store, &ty) else {
        bail!("hypothesis {} : {} is not of inductive type", fvar, ty);
    };

    if indices.is_empty() || indices_independent(store, &goal, fvar, &params, &indices) {
        let sub_goals = split(env, store, goal_id, fvar)?;
        return unify_all(env, store, sub_goals, 0);
    }

    let generalized = generalize_indices(env, store, goal_id, fvar)?;
    let sub_goals = split(env, store, generalized.goal, generalized.fvar)?;
    let sub_goals = elim_aux_indices(env, store, sub_goals, generalized.num_eqs - 1)?;
    unify_all(env, store, sub_goals, 1)
}

/// Boolean-style split: the case analysis must leave exactly one open
/// sub-goal.
pub fn cases_exactly_one(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    fvar: Id,
) -> anyhow::Result<SubGoal> {
    let mut sub_goals = cases(env, store, goal_id, fvar)?;
    ensure!(
        sub_goals.len() == 1,
        "case split left {} open sub-goals, expected exactly one",
        sub_goals.len()
    );
    Ok(sub_goals.remove(0))
}

/// Boolean-style split: the case analysis must leave at most one open
/// sub-goal.
pub fn cases_at_most_one(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    fvar: Id,
) -> anyhow::Result<Option<SubGoal>> {
    let mut sub_goals = cases(env, store, goal_id, fvar)?;
    ensure!(
        sub_goals.len() <= 1,
        "case split left {} open sub-goals, expected at most one",
        sub_goals.len()
    );
    Ok(sub_goals.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Constructor;
    use crate::tt::{mk_arrow, mk_pi, mk_prop, mk_type, Name};

    fn local_named(value: &str) -> Id {
        Id::fresh_with_name(Name::intern(value))
    }

    /// Bool with two nullary constructors, Nat, Empty, and the indexed
    /// family Vect : Nat → Type.
    fn fixture() -> Env {
        let mut env = Env::new();

        let bool_name = QualifiedName::intern("Bool");
        env.add_inductive(Inductive {
            name: bool_name.clone(),
            num_params: 0,
            num_indices: 0,
            ty: mk_type(),
            ctors: vec![
                Constructor {
                    name: bool_name.extend("false"),
                    num_fields: 0,
                    ty: mk_const(bool_name.clone()),
                },
                Constructor {
                    name: bool_name.extend("true"),
                    num_fields: 0,
                    ty: mk_const(bool_name.clone()),
                },
            ],
        });

        let nat = QualifiedName::intern("Nat");
        env.add_inductive(Inductive {
            name: nat.clone(),
            num_params: 0,
            num_indices: 0,
            ty: mk_type(),
            ctors: vec![
                Constructor {
                    name: nat.extend("zero"),
                    num_fields: 0,
                    ty: mk_const(nat.clone()),
                },
                Constructor {
                    name: nat.extend("succ"),
                    num_fields: 1,
                    ty: mk_arrow(mk_const(nat.clone()), mk_const(nat.clone())),
                },
            ],
        });

        env.add_inductive(Inductive {
            name: QualifiedName::intern("Empty"),
            num_params: 0,
            num_indices: 0,
            ty: mk_type(),
            ctors: vec![],
        });

        // Vect : Nat → Type
        // vnil : Vect zero
        // vcons : Π (n : Nat), Vect n → Vect (succ n)
        let vect = QualifiedName::intern("Vect");
        let nat_ty = mk_const(nat.clone());
        let zero = mk_const(nat.extend("zero"));
        let succ = mk_const(nat.extend("succ"));
        let n = local_named("n");
        let t = local_named("t");
        let vcons_ty = mk_const(vect.clone())
            .apply([succ.apply([mk_local(n)])])
            .pi_abstract(&[
                Parameter {
                    id: n,
                    ty: nat_ty.clone(),
                },
                Parameter {
                    id: t,
                    ty: mk_const(vect.clone()).apply([mk_local(n)]),
                },
            ]);
        env.add_inductive(Inductive {
            name: vect.clone(),
            num_params: 0,
            num_indices: 1,
            ty: mk_arrow(nat_ty.clone(), mk_type()),
            ctors: vec![
                Constructor {
                    name: vect.extend("vnil"),
                    num_fields: 0,
                    ty: mk_const(vect.clone()).apply([zero]),
                },
                Constructor {
                    name: vect.extend("vcons"),
                    num_fields: 2,
                    ty: vcons_ty,
                },
            ],
        });

        // P : Nat → Prop, R : Π n, Vect n → Prop, Q : Prop
        env.add_const(
            QualifiedName::intern("P"),
            mk_arrow(nat_ty.clone(), mk_prop()),
        );
        env.add_const(
            QualifiedName::intern("R"),
            mk_pi(
                Some(Name::intern("n")),
                nat_ty.clone(),
                mk_arrow(
                    mk_const(vect.clone()).apply([crate::tt::mk_var(0)]),
                    mk_prop(),
                ),
            ),
        );
        env.add_const(QualifiedName::intern("Q"), mk_prop());
        env
    }

    #[test]
    fn enum_split_yields_one_sub_goal_per_constructor() {
        // scenario A
        let env = fixture();
        let mut store = Store::new();
        let b = local_named("b");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: b,
            ty: mk_const(QualifiedName::intern("Bool")),
            value: None,
        });
        // an opaque statement mentioning b
        let f = mk_const(QualifiedName::intern("F"));
        let goal = store.fresh_goal(ctx, f.apply([mk_local(b)]));
        let sub_goals = cases(&env, &mut store, goal, b).unwrap();
        assert_eq!(sub_goals.len(), 2);
        assert_eq!(sub_goals[0].ctor_name, QualifiedName::intern("Bool.false"));
        assert_eq!(sub_goals[1].ctor_name, QualifiedName::intern("Bool.true"));
        assert!(store.is_assigned(goal));
        for (sub, ctor) in zip(&sub_goals, ["Bool.false", "Bool.true"]) {
            let sub_goal = store.goal(sub.goal).unwrap();
            // the target variable is gone, replaced by the constructor
            assert!(sub_goal.context.decls.is_empty());
            assert!(sub_goal
                .target
                .alpha_eq(&f.apply([mk_const(QualifiedName::intern(ctor))])));
            assert!(sub
                .subst
                .get(b)
                .unwrap()
                .alpha_eq(&mk_const(QualifiedName::intern(ctor))));
        }
    }

    #[test]
    fn empty_family_closes_the_goal() {
        let env = fixture();
        let mut store = Store::new();
        let e = local_named("e");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: e,
            ty: mk_const(QualifiedName::intern("Empty")),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let sub_goals = cases(&env, &mut store, goal, e).unwrap();
        assert!(sub_goals.is_empty());
        assert!(store.is_assigned(goal));
    }

    #[test]
    fn split_on_non_inductive_hypothesis_fails() {
        let env = fixture();
        let mut store = Store::new();
        let h = local_named("h");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: h,
            ty: mk_prop(),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let err = cases(&env, &mut store, goal, h).unwrap_err();
        assert!(err.to_string().contains("not of inductive type"));
    }

    #[test]
    fn split_on_solved_goal_fails() {
        let env = fixture();
        let mut store = Store::new();
        let b = local_named("b");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: b,
            ty: mk_const(QualifiedName::intern("Bool")),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        store.assign(goal, mk_const(QualifiedName::intern("Q"))).unwrap();
        let err = cases(&env, &mut store, goal, b).unwrap_err();
        assert!(err.to_string().contains("already solved"));
    }

    #[test]
    fn unknown_hypothesis_fails() {
        let env = fixture();
        let mut store = Store::new();
        let goal = store.fresh_goal(Context::default(), mk_const(QualifiedName::intern("Q")));
        assert!(cases(&env, &mut store, goal, local_named("ghost")).is_err());
    }

    #[test]
    fn independence_holds_for_fresh_unshared_index() {
        let mut store = Store::new();
        let n = local_named("n");
        let v = local_named("v");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(QualifiedName::intern("Nat")),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        let goal_id = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let goal = store.goal(goal_id).unwrap().clone();
        assert!(indices_independent(
            &store,
            &goal,
            v,
            &[],
            &[mk_local(n)]
        ));
    }

    #[test]
    fn independence_fails_when_index_is_shared() {
        let mut store = Store::new();
        let n = local_named("n");
        let v = local_named("v");
        let h2 = local_named("h2");
        let p = mk_const(QualifiedName::intern("P"));
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(QualifiedName::intern("Nat")),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        ctx.push(Decl {
            id: h2,
            ty: p.apply([mk_local(n)]),
            value: None,
        });
        let goal_id = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let goal = store.goal(goal_id).unwrap().clone();
        assert!(!indices_independent(
            &store,
            &goal,
            v,
            &[],
            &[mk_local(n)]
        ));
        // occurrence in the target statement also blocks independence
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(QualifiedName::intern("Nat")),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        let goal_id = store.fresh_goal(ctx, p.apply([mk_local(n)]));
        let goal = store.goal(goal_id).unwrap().clone();
        assert!(!indices_independent(&store, &goal, v, &[], &[mk_local(n)]));
        // a non-variable index is never independent
        assert!(!indices_independent(
            &store,
            &goal,
            v,
            &[],
            &[mk_const(QualifiedName::intern("Nat.zero"))]
        ));
    }

    #[test]
    fn generalizer_introduces_fresh_indices_and_guards() {
        let env = fixture();
        let mut store = Store::new();
        let n = local_named("n");
        let v = local_named("v");
        let h2 = local_named("h2");
        let p = mk_const(QualifiedName::intern("P"));
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(QualifiedName::intern("Nat")),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        ctx.push(Decl {
            id: h2,
            ty: p.apply([mk_local(n)]),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let generalized = generalize_indices(&env, &mut store, goal, v).unwrap();
        assert_eq!(generalized.num_eqs, 2);
        assert_eq!(generalized.indices.len(), 1);
        assert!(store.is_assigned(goal));
        let new_goal = store.goal(generalized.goal).unwrap();
        // fresh index and fresh major variable are in the context
        assert!(new_goal.context.contains(generalized.indices[0]));
        assert!(new_goal.context.contains(generalized.fvar));
        // and the guards are in the target
        let (g1, rest) = crate::tt::unguard1(&new_goal.target).unwrap();
        assert!(as_eq(&g1).is_some());
        let (g2, rest) = crate::tt::unguard1(&rest).unwrap();
        assert!(crate::tt::as_heq(&g2).is_some());
        assert!(rest.alpha_eq(&mk_const(QualifiedName::intern("Q"))));
    }

    #[test]
    fn dependent_split_generalizes_and_unifies() {
        // scenario B: the index n is shared with another hypothesis
        let env = fixture();
        let mut store = Store::new();
        let n = local_named("n");
        let v = local_named("v");
        let h2 = local_named("h2");
        let p = mk_const(QualifiedName::intern("P"));
        let r = mk_const(QualifiedName::intern("R"));
        let nat = QualifiedName::intern("Nat");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(nat.clone()),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        ctx.push(Decl {
            id: h2,
            ty: p.apply([mk_local(n)]),
            value: None,
        });
        let goal = store.fresh_goal(ctx, r.apply([mk_local(n), mk_local(v)]));
        let sub_goals = cases(&env, &mut store, goal, v).unwrap();
        assert_eq!(sub_goals.len(), 2);

        let zero = mk_const(nat.extend("zero"));
        let succ = mk_const(nat.extend("succ"));

        // vnil branch: n := zero, v := vnil, everything substituted away
        let vnil = store.goal(sub_goals[0].goal).unwrap();
        assert_eq!(vnil.context.decls.len(), 1);
        assert_eq!(vnil.context.decls[0].id, h2);
        assert!(vnil.context.decls[0].ty.alpha_eq(&p.apply([zero.clone()])));
        assert!(vnil.target.alpha_eq(&r.apply([
            zero.clone(),
            mk_const(QualifiedName::intern("Vect.vnil"))
        ])));
        assert!(!vnil.target.contains_local(n));
        assert!(!vnil.target.contains_local(v));

        // vcons branch: n := succ n', v := vcons n' t
        let vcons = store.goal(sub_goals[1].goal).unwrap();
        assert_eq!(vcons.context.decls.len(), 3);
        let fields: Vec<Id> = vcons.context.decls[..2].iter().map(|d| d.id).collect();
        let n2 = fields[0];
        let t = fields[1];
        assert!(vcons.context.decls[2]
            .ty
            .alpha_eq(&p.apply([succ.apply([mk_local(n2)])])));
        assert!(vcons.target.alpha_eq(&r.apply([
            succ.apply([mk_local(n2)]),
            mk_const(QualifiedName::intern("Vect.vcons")).apply([mk_local(n2), mk_local(t)])
        ])));
    }

    #[test]
    fn independent_indexed_split_needs_no_generalization() {
        let env = fixture();
        let mut store = Store::new();
        let n = local_named("n");
        let v = local_named("v");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: n,
            ty: mk_const(QualifiedName::intern("Nat")),
            value: None,
        });
        ctx.push(Decl {
            id: v,
            ty: mk_const(QualifiedName::intern("Vect")).apply([mk_local(n)]),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let sub_goals = cases(&env, &mut store, goal, v).unwrap();
        assert_eq!(sub_goals.len(), 2);
        // no auxiliary equality hypotheses anywhere
        for sub in &sub_goals {
            let sub_goal = store.goal(sub.goal).unwrap();
            assert!(sub_goal
                .context
                .decls
                .iter()
                .all(|d| as_eq(&d.ty).is_none()));
            assert!(sub_goal.target.alpha_eq(&mk_const(QualifiedName::intern("Q"))));
        }
    }

    #[test]
    fn exactly_one_and_at_most_one_checks() {
        let env = fixture();
        let mut store = Store::new();

        // Bool split leaves two open sub-goals: both checks fail
        let b = local_named("b");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: b,
            ty: mk_const(QualifiedName::intern("Bool")),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        assert!(cases_exactly_one(&env, &mut store, goal, b).is_err());

        // Empty split leaves zero: at-most-one passes, exactly-one fails
        let e = local_named("e");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: e,
            ty: mk_const(QualifiedName::intern("Empty")),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let result = cases_at_most_one(&env, &mut store, goal, e).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn specialized_eliminator_is_preferred() {
        let mut env = fixture();
        let bool_name = QualifiedName::intern("Bool");
        env.add_eliminator(
            bool_name.clone(),
            Eliminator {
                name: bool_name.extend("cases_on"),
                num_params: 0,
                num_indices: 0,
                num_minors: 2,
                index_tys: vec![],
            },
        );
        let mut store = Store::new();
        let b = local_named("b");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: b,
            ty: mk_const(bool_name.clone()),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let sub_goals = cases(&env, &mut store, goal, b).unwrap();
        assert_eq!(sub_goals.len(), 2);
        // the assigned proof term is headed by the specialized eliminator
        let proof = store.assignment(goal).unwrap();
        let Term::Const(head) = proof.head() else {
            panic!("eliminator application expected");
        };
        assert_eq!(head.name, bool_name.extend("cases_on"));
    }

    #[test]
    fn mismatched_eliminator_arity_is_rejected() {
        let mut env = fixture();
        let bool_name = QualifiedName::intern("Bool");
        env.add_eliminator(
            bool_name.clone(),
            Eliminator {
                name: bool_name.extend("cases_on"),
                num_params: 1,
                num_indices: 0,
                num_minors: 2,
                index_tys: vec![],
            },
        );
        let mut store = Store::new();
        let b = local_named("b");
        let mut ctx = Context::default();
        ctx.push(Decl {
            id: b,
            ty: mk_const(bool_name),
            value: None,
        });
        let goal = store.fresh_goal(ctx, mk_const(QualifiedName::intern("Q")));
        let err = cases(&env, &mut store, goal, b).unwrap_err();
        assert!(err.to_string().contains("does not match the arity"));
    }

    #[test]
    fn elim_aux_is_idempotent_with_no_guards() {
        let env = fixture();
        let mut store = Store::new();
        let goal = store.fresh_goal(Context::default(), mk_const(QualifiedName::intern("Q")));
        let sub = SubGoal {
            goal,
            ctor_name: QualifiedName::intern("Bool.true"),
            subst: Subst::default(),
        };
        let result = elim_aux_indices(&env, &mut store, vec![sub.clone()], 0).unwrap();
        assert_eq!(result[0].goal, sub.goal);
        assert!(!store.is_assigned(goal));
    }
}
