//! The equation unifier.
//!
//! After a case split, each sub-goal's target carries the introduced
//! equality hypotheses as leading guards. [unify_eqs] processes them in
//! introduction order: a constructor-vs-constructor equality is decomposed
//! by injectivity or refuted by no-confusion, a free-variable equality is
//! eliminated by substitution, a cyclic equality is handed to the
//! acyclicity prover, and anything else is kept as a plain hypothesis.

use std::sync::LazyLock;

use anyhow::bail;

use crate::acyclic;
use crate::cases::SubGoal;
use crate::env::Env;
use crate::goal::Store;
use crate::tt::{
    as_eq, as_heq, free_locals, guard, mk_abs, mk_app, mk_const, mk_eq, mk_eq_refl, mk_hole,
    mk_local, mk_var, Context, Ctor, Decl, Id, Name, QualifiedName, Term,
};

static EQ_NDREC: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq.ndrec"));
static EQ_SYMM: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq.symm"));
static EQ_OF_HEQ: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("eq_of_heq"));

/// The transitive dependency closure of `x` in `ctx`: every declaration
/// whose type or value reaches `x`, directly or through another member.
fn dependency_closure(store: &Store, ctx: &Context, x: Id) -> Vec<Id> {
    let mut closure = vec![x];
    for decl in &ctx.decls {
        if decl.id == x {
            continue;
        }
        let reaches = closure.iter().any(|&y| {
            store.occurs(y, &decl.ty)
                || decl.value.as_ref().is_some_and(|value| store.occurs(y, value))
        });
        if reaches {
            closure.push(decl.id);
        }
    }
    closure
}

/// Rewrites `x := t` throughout the context, or `None` when the
/// elimination is ineligible. Declarations depending on `x` are moved to
/// the end (their relative order kept) so the result stays well-scoped;
/// ineligibility is a whole-context condition: `x` must be value-free,
/// must not occur in `t` (through hole assignments), and no free local of
/// `t` may itself depend on `x`.
pub(crate) fn subst_into_context(
    store: &Store,
    ctx: &Context,
    x: Id,
    t: &Term,
    dropped: &[Id],
) -> Option<Context> {
    let decl = ctx.get(x)?;
    if decl.value.is_some() {
        return None;
    }
    if store.occurs(x, t) {
        return None;
    }
    let closure = dependency_closure(store, ctx, x);
    let t_inst = store.instantiate(t);
    if free_locals(&t_inst)
        .iter()
        .any(|y| *y != x && closure.contains(y))
    {
        return None;
    }
    let mut kept = Vec::new();
    let mut moved = Vec::new();
    for d in &ctx.decls {
        if d.id == x || dropped.contains(&d.id) {
            continue;
        }
        if closure.contains(&d.id) {
            moved.push(Decl {
                id: d.id,
                ty: d.ty.subst(&[(x, t.clone())]),
                value: d.value.as_ref().map(|value| value.subst(&[(x, t.clone())])),
            });
        } else {
            kept.push(d.clone());
        }
    }
    kept.extend(moved);
    Some(Context { decls: kept })
}

/// Splits the goal's target into its head guard and the rest.
fn peek_guard(env: &Env, store: &Store, goal_id: Id) -> anyhow::Result<Option<(Term, Term)>> {
    let target = env.whnf(store, &store.goal(goal_id)?.target);
    let Term::Pi(pi) = &target else {
        return Ok(None);
    };
    Ok(Some((pi.binder_type.clone(), pi.body.clone())))
}

/// Introduces the head guard as a plain hypothesis.
pub(crate) fn keep_guard(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    hint: &str,
) -> anyhow::Result<(Id, Id)> {
    let Some((guard_ty, body)) = peek_guard(env, store, goal_id)? else {
        bail!("goal ?{} has no hypothesis left to introduce", goal_id);
    };
    let h = Id::fresh_with_name(Name::intern(hint));
    let mut context = store.goal(goal_id)?.context.clone();
    context.push(Decl {
        id: h,
        ty: guard_ty.clone(),
        value: None,
    });
    let new_target = body.open(&[mk_local(h)], 0);
    let new_goal = store.fresh_goal(context, new_target);
    store.assign(
        goal_id,
        mk_abs(h.name(), guard_ty, mk_hole(new_goal)),
    )?;
    Ok((h, new_goal))
}

/// Drops a reflexive head guard.
pub(crate) fn drop_refl_guard(
    store: &mut Store,
    goal_id: Id,
    guard_ty: Term,
    eq_ty: Term,
    side: Term,
    body: Term,
) -> anyhow::Result<Id> {
    let context = store.goal(goal_id)?.context.clone();
    let new_target = body.open(&[mk_eq_refl(eq_ty, side)], 0);
    let new_goal = store.fresh_goal(context, new_target);
    store.assign(goal_id, mk_abs(None, guard_ty, mk_hole(new_goal)))?;
    Ok(new_goal)
}

/// Converts a heterogeneous head guard with definitionally equal side
/// types into a homogeneous one.
fn convert_heq_guard(
    store: &mut Store,
    goal_id: Id,
    guard_ty: Term,
    eq_ty: Term,
    lhs: Term,
    rhs: Term,
    body: Term,
) -> anyhow::Result<Id> {
    let context = store.goal(goal_id)?.context.clone();
    let new_target = crate::tt::mk_pi(None, mk_eq(eq_ty, lhs, rhs), body);
    let new_goal = store.fresh_goal(context, new_target);
    let proof = mk_abs(
        None,
        guard_ty,
        mk_app(
            mk_hole(new_goal),
            mk_const(EQ_OF_HEQ.clone()).apply([mk_var(0)]),
        ),
    );
    store.assign(goal_id, proof)?;
    Ok(new_goal)
}

/// Eliminates the head guard `x = t` (or `t = x` with `symm`) by
/// substitution. `None` means the elimination is ineligible.
pub(crate) fn subst_guard(
    store: &mut Store,
    goal_id: Id,
    guard_ty: Term,
    x: Id,
    t: &Term,
    symm: bool,
    body: Term,
) -> anyhow::Result<Option<Id>> {
    if body.contains_var(0) {
        return Ok(None);
    }
    let goal = store.goal(goal_id)?.clone();
    let Some(context) = subst_into_context(store, &goal.context, x, t, &[]) else {
        return Ok(None);
    };
    let new_target = body.subst(&[(x, t.clone())]);
    let new_goal = store.fresh_goal(context, new_target);
    let mut h: Term = mk_var(0);
    if symm {
        h = mk_const(EQ_SYMM.clone()).apply([h]);
    }
    let proof = mk_abs(
        None,
        guard_ty,
        mk_const(EQ_NDREC.clone()).apply([mk_hole(new_goal), h]),
    );
    store.assign(goal_id, proof)?;
    Ok(Some(new_goal))
}

/// Decomposes a same-constructor head guard into one guard per field pair.
/// Returns the new goal and the number of field equalities produced.
fn inject_guard(
    env: &Env,
    store: &mut Store,
    goal_id: Id,
    guard_ty: Term,
    ind_name: &QualifiedName,
    lhs: &Ctor,
    rhs: &Ctor,
    num_params: usize,
    body: Term,
) -> anyhow::Result<(Id, usize)> {
    let goal = store.goal(goal_id)?.clone();
    let mut new_guards = Vec::new();
    for (a, b) in lhs.args[num_params..]
        .iter()
        .zip(rhs.args[num_params..].iter())
    {
        let a_ty = env.infer_type(store, &goal.context, a)?;
        let b_ty = env.infer_type(store, &goal.context, b)?;
        if a_ty.alpha_eq(&b_ty) {
            new_guards.push(mk_eq(a_ty, a.clone(), b.clone()));
        } else {
            new_guards.push(crate::tt::mk_heq(a_ty, a.clone(), b_ty, b.clone()));
        }
    }
    let produced = new_guards.len();
    let new_target = guard(body, new_guards);
    let new_goal = store.fresh_goal(goal.context, new_target);
    let no_confusion = mk_const(ind_name.extend("no_confusion"));
    let proof = mk_abs(
        None,
        guard_ty,
        no_confusion.apply([mk_hole(new_goal), mk_var(0)]),
    );
    store.assign(goal_id, proof)?;
    Ok((new_goal, produced))
}

/// Discharges the goal outright: the head guard equates different
/// constructors of the same family.
fn refute_guard(
    store: &mut Store,
    goal_id: Id,
    guard_ty: Term,
    ind_name: &QualifiedName,
) -> anyhow::Result<()> {
    let no_confusion = mk_const(ind_name.extend("no_confusion"));
    store.assign(
        goal_id,
        mk_abs(None, guard_ty, no_confusion.apply([mk_var(0)])),
    )?;
    Ok(())
}

fn as_registered_ctor<'a>(env: &'a Env, m: &Term) -> Option<(Ctor, &'a QualifiedName, usize)> {
    let view = Ctor::try_from(m.clone()).ok()?;
    let (ind, ctor, _) = env.constructor(&view.head.name)?;
    if view.args.len() != ind.num_params + ctor.num_fields {
        return None;
    }
    Some((view, &ind.name, ind.num_params))
}

/// Runs the equation-unification work-list over one sub-goal's first
/// `num_eqs` guards. Returns `None` when the sub-goal got discharged.
pub fn unify_eqs(
    env: &Env,
    store: &mut Store,
    sub: SubGoal,
    num_eqs: usize,
) -> anyhow::Result<Option<SubGoal>> {
    let mut sub = sub;
    let mut remaining = num_eqs;
    while remaining > 0 {
        let Some((guard_ty_raw, body)) = peek_guard(env, store, sub.goal)? else {
            break;
        };
        let guard_ty = env.whnf(store, &guard_ty_raw);

        if let Some((lhs_ty, lhs, rhs_ty, rhs)) = as_heq(&guard_ty) {
            if env.equiv(store, lhs_ty, rhs_ty) {
                sub.goal = convert_heq_guard(
                    store,
                    sub.goal,
                    guard_ty.clone(),
                    lhs_ty.clone(),
                    lhs.clone(),
                    rhs.clone(),
                    body,
                )?;
                // reprocessed as a homogeneous equality
                continue;
            }
            let (_, new_goal) = keep_guard(env, store, sub.goal, "h")?;
            sub.goal = new_goal;
            remaining -= 1;
            continue;
        }

        let Some((eq_ty, lhs, rhs)) = as_eq(&guard_ty) else {
            // not an equality; plain hypothesis
            let (_, new_goal) = keep_guard(env, store, sub.goal, "h")?;
            sub.goal = new_goal;
            remaining -= 1;
            continue;
        };
        let (eq_ty, lhs, rhs) = (eq_ty.clone(), lhs.clone(), rhs.clone());
        let lhs_w = env.whnf(store, &lhs);
        let rhs_w = env.whnf(store, &rhs);

        if lhs_w.alpha_eq(&rhs_w) {
            sub.goal = drop_refl_guard(store, sub.goal, guard_ty, eq_ty, lhs_w, body)?;
            remaining -= 1;
            continue;
        }

        let lhs_ctor = as_registered_ctor(env, &lhs_w);
        let rhs_ctor = as_registered_ctor(env, &rhs_w);
        if let (Some((lc, l_ind, num_params)), Some((rc, r_ind, _))) =
            (lhs_ctor.clone(), rhs_ctor.clone())
        {
            if l_ind == r_ind {
                if lc.head.name == rc.head.name {
                    let (new_goal, produced) = inject_guard(
                        env,
                        store,
                        sub.goal,
                        guard_ty,
                        l_ind,
                        &lc,
                        &rc,
                        num_params,
                        body,
                    )?;
                    if log::log_enabled!(log::Level::Debug) {
                        log::debug!(
                            target: "wari::unify",
                            "injectivity on {}: {} component equalities",
                            lc.head.name,
                            produced
                        );
                    }
                    sub.goal = new_goal;
                    remaining = remaining - 1 + produced;
                    continue;
                }
                refute_guard(store, sub.goal, guard_ty, l_ind)?;
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!(
                        target: "wari::unify",
                        "no-confusion: {} ≠ {} discharges sub-goal {}",
                        lc.head.name,
                        rc.head.name,
                        sub.ctor_name
                    );
                }
                return Ok(None);
            }
        }

        // free-variable elimination, trying both orientations
        let mut handled = false;
        if let Some(x) = lhs_w.as_local() {
            if !store.occurs(x, &rhs_w) {
                if let Some(new_goal) =
                    subst_guard(store, sub.goal, guard_ty.clone(), x, &rhs, false, body.clone())?
                {
                    sub.subst = sub.subst.extended(x, rhs.clone());
                    sub.goal = new_goal;
                    remaining -= 1;
                    handled = true;
                }
            } else if rhs_ctor.is_some() {
                // genuinely cyclic: x strictly inside a constructor term
                if acyclic::prove_acyclic(env, store, sub.goal, &guard_ty, &eq_ty, x, &rhs_w)? {
                    return Ok(None);
                }
            }
        }
        if handled {
            continue;
        }
        if let Some(x) = rhs_w.as_local() {
            if !store.occurs(x, &lhs_w) {
                if let Some(new_goal) =
                    subst_guard(store, sub.goal, guard_ty.clone(), x, &lhs, true, body.clone())?
                {
                    sub.subst = sub.subst.extended(x, lhs.clone());
                    sub.goal = new_goal;
                    remaining -= 1;
                    continue;
                }
            } else if lhs_ctor.is_some() {
                if acyclic::prove_acyclic(env, store, sub.goal, &guard_ty, &eq_ty, x, &lhs_w)? {
                    return Ok(None);
                }
            }
        }

        // no rule applies; keep the hypothesis and move on
        let (_, new_goal) = keep_guard(env, store, sub.goal, "h")?;
        sub.goal = new_goal;
        remaining -= 1;
    }
    Ok(Some(sub))
}

/// The plain entry point: substitute away every currently-substitutable
/// equality hypothesis already present in the goal's context. Returns the
/// final goal id.
pub fn subst_eqs(env: &Env, store: &mut Store, goal_id: Id) -> anyhow::Result<Id> {
    let mut current = goal_id;
    loop {
        let goal = store.goal(current)?.clone();
        let mut progressed = false;
        'decls: for decl in &goal.context.decls {
            let hyp_ty = env.whnf(store, &decl.ty);
            let Some((_, lhs, rhs)) = as_eq(&hyp_ty) else {
                continue;
            };
            // the proof hypothesis itself must be otherwise unused
            if goal.context.mentions(decl.id) || goal.target.contains_local(decl.id) {
                continue;
            }
            let mut orientations = Vec::with_capacity(2);
            if let Some(x) = lhs.as_local() {
                if !store.occurs(x, rhs) {
                    orientations.push((x, rhs.clone(), false));
                }
            }
            if let Some(x) = rhs.as_local() {
                if !store.occurs(x, lhs) {
                    orientations.push((x, lhs.clone(), true));
                }
            }
            for (x, t, symm) in orientations {
                let Some(context) = subst_into_context(store, &goal.context, x, &t, &[decl.id])
                else {
                    continue;
                };
                let new_target = goal.target.subst(&[(x, t.clone())]);
                let new_goal = store.fresh_goal(context, new_target);
                let mut h: Term = mk_local(decl.id);
                if symm {
                    h = mk_const(EQ_SYMM.clone()).apply([h]);
                }
                store.assign(
                    current,
                    mk_const(EQ_NDREC.clone()).apply([mk_hole(new_goal), h]),
                )?;
                if log::log_enabled!(log::Level::Debug) {
                    log::debug!(
                        target: "wari::unify",
                        "substituted {} := {} via {}",
                        x,
                        t,
                        decl.id
                    );
                }
                current = new_goal;
                progressed = true;
                break 'decls;
            }
        }
        if !progressed {
            return Ok(current);
        }
    }
}
