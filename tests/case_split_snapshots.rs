//! End-to-end case-split scenarios, with goal renderings pinned as
//! snapshots.

use wari::env::{Constructor, Env, Inductive, Measure};
use wari::goal::{Store, Subst};
use wari::simp::{Closer, Rule, RuleSet};
use wari::tt::{
    as_eq, guard, mk_arrow, mk_const, mk_eq, mk_hole, mk_local, mk_pi, mk_prop, mk_type, mk_var,
    Context, Decl, Id, Name, Parameter, QualifiedName,
};
use wari::SubGoal;

fn local_named(value: &str) -> Id {
    Id::fresh_with_name(Name::intern(value))
}

/// Bool, Nat (with a structural size measure), Empty, Pair, and the
/// indexed family Vect : Nat → Type.
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
    let nat_ty = mk_const(nat.clone());
    env.add_inductive(Inductive {
        name: nat.clone(),
        num_params: 0,
        num_indices: 0,
        ty: mk_type(),
        ctors: vec![
            Constructor {
                name: nat.extend("zero"),
                num_fields: 0,
                ty: nat_ty.clone(),
            },
            Constructor {
                name: nat.extend("succ"),
                num_fields: 1,
                ty: mk_arrow(nat_ty.clone(), nat_ty.clone()),
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

    let pair = QualifiedName::intern("Pair");
    env.add_inductive(Inductive {
        name: pair.clone(),
        num_params: 0,
        num_indices: 0,
        ty: mk_type(),
        ctors: vec![Constructor {
            name: pair.extend("mk"),
            num_fields: 2,
            ty: mk_arrow(nat_ty.clone(), mk_arrow(nat_ty.clone(), mk_const(pair.clone()))),
        }],
    });

    let vect = QualifiedName::intern("Vect");
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

    // the measure for Nat, with its monotonicity rule set
    let size = mk_const(nat.extend("size"));
    let succ = mk_const(nat.extend("succ"));
    let lt = mk_const(nat.extend("lt"));
    let le = mk_const(nat.extend("le"));
    let pn = local_named("pn");
    let pa = local_named("pa");
    let pb = local_named("pb");
    let mut rule_set = RuleSet::new(Name::intern("Nat.size_lemmas"));
    rule_set.rewrites.push(Rule {
        name: nat.extend("size_succ"),
        lhs: size.apply([succ.apply([mk_hole(pn)])]),
        rhs: succ.apply([size.apply([mk_hole(pn)])]),
    });
    rule_set.rewrites.push(Rule {
        name: nat.extend("lt_succ_of_le"),
        lhs: lt.apply([mk_hole(pa), succ.apply([mk_hole(pb)])]),
        rhs: le.apply([mk_hole(pa), mk_hole(pb)]),
    });
    rule_set.rewrites.push(Rule {
        name: nat.extend("le_succ_of_le"),
        lhs: le.apply([mk_hole(pa), succ.apply([mk_hole(pb)])]),
        rhs: le.apply([mk_hole(pa), mk_hole(pb)]),
    });
    rule_set.closers.push(Closer {
        name: nat.extend("le_refl"),
        pattern: le.apply([mk_hole(pa), mk_hole(pa)]),
        vars: vec![pa],
    });
    env.add_rule_set(rule_set);
    env.add_measure(
        nat.clone(),
        Measure {
            size_fn: nat.extend("size"),
            lt_fn: nat.extend("lt"),
            irrefl: nat.extend("lt_irrefl"),
            rules: Name::intern("Nat.size_lemmas"),
        },
    );

    env.add_const(
        QualifiedName::intern("P"),
        mk_arrow(nat_ty.clone(), mk_prop()),
    );
    env.add_const(
        QualifiedName::intern("R"),
        mk_pi(
            Some(Name::intern("n")),
            nat_ty.clone(),
            mk_arrow(mk_const(vect).apply([mk_var(0)]), mk_prop()),
        ),
    );
    env.add_const(QualifiedName::intern("Q"), mk_prop());
    env
}

fn render(store: &Store, sub: &SubGoal) -> String {
    format!("{}", store.goal(sub.goal).unwrap())
}

#[test]
fn scenario_a_enumeration_split() {
    let env = fixture();
    let mut store = Store::new();
    let b = local_named("b");
    let mut ctx = Context::default();
    ctx.push(Decl {
        id: b,
        ty: mk_const(QualifiedName::intern("Bool")),
        value: None,
    });
    let f = mk_const(QualifiedName::intern("F"));
    let goal = store.fresh_goal(ctx, f.apply([mk_local(b)]));
    let sub_goals = wari::cases(&env, &mut store, goal, b).unwrap();
    assert_eq!(sub_goals.len(), 2);
    insta::assert_snapshot!(render(&store, &sub_goals[0]), @"⊢ F Bool.false");
    insta::assert_snapshot!(render(&store, &sub_goals[1]), @"⊢ F Bool.true");
    assert!(store.is_assigned(goal));
}

#[test]
fn scenario_b_shared_index_is_generalized_and_unified() {
    let env = fixture();
    let mut store = Store::new();
    let n = local_named("n");
    let v = local_named("v");
    let h2 = local_named("h2");
    let p = mk_const(QualifiedName::intern("P"));
    let r = mk_const(QualifiedName::intern("R"));
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
    let goal = store.fresh_goal(ctx, r.apply([mk_local(n), mk_local(v)]));
    let sub_goals = wari::cases(&env, &mut store, goal, v).unwrap();
    assert_eq!(sub_goals.len(), 2);
    insta::assert_snapshot!(
        render(&store, &sub_goals[0]),
        @"(h2 : P Nat.zero) ⊢ R Nat.zero Vect.vnil"
    );
    insta::assert_snapshot!(
        render(&store, &sub_goals[1]),
        @"(n : Nat) (t : Vect n) (h2 : P (Nat.succ n)) ⊢ R (Nat.succ n) (Vect.vcons n t)"
    );
    // the branch substitutions record how the old variables map in
    assert!(sub_goals[0].subst.get(n).is_some());
    assert!(sub_goals[0].subst.get(v).is_some());
}

#[test]
fn scenario_c_cyclic_equality_is_discharged() {
    let env = fixture();
    let mut store = Store::new();
    let nat = mk_const(QualifiedName::intern("Nat"));
    let succ = mk_const(QualifiedName::intern("Nat.succ"));
    let x = local_named("x");
    let mut ctx = Context::default();
    ctx.push(Decl {
        id: x,
        ty: nat.clone(),
        value: None,
    });
    let eq = mk_eq(nat, mk_local(x), succ.apply([mk_local(x)]));
    let goal = store.fresh_goal(ctx, guard(mk_const(QualifiedName::intern("Q")), [eq]));
    let sub = SubGoal {
        goal,
        ctor_name: QualifiedName::intern("Nat.succ"),
        subst: Subst::default(),
    };
    let result = wari::unify_eqs(&env, &mut store, sub, 1).unwrap();
    assert!(result.is_none());
    assert!(store.is_assigned(goal));
}

#[test]
fn scenario_d_same_constructor_equality_splits_into_components() {
    let mut env = fixture();
    let nat = mk_const(QualifiedName::intern("Nat"));
    for name in ["c1", "c2", "c3", "c4"] {
        env.add_const(QualifiedName::intern(name), nat.clone());
    }
    let mut store = Store::new();
    let mk = mk_const(QualifiedName::intern("Pair.mk"));
    let c1 = mk_const(QualifiedName::intern("c1"));
    let c2 = mk_const(QualifiedName::intern("c2"));
    let c3 = mk_const(QualifiedName::intern("c3"));
    let c4 = mk_const(QualifiedName::intern("c4"));
    let eq = mk_eq(
        mk_const(QualifiedName::intern("Pair")),
        mk.apply([c1, c2]),
        mk.apply([c3, c4]),
    );
    let goal = store.fresh_goal(
        Context::default(),
        guard(mk_const(QualifiedName::intern("Q")), [eq]),
    );
    let sub = SubGoal {
        goal,
        ctor_name: QualifiedName::intern("Pair.mk"),
        subst: Subst::default(),
    };
    let result = wari::unify_eqs(&env, &mut store, sub, 1).unwrap().unwrap();
    let final_goal = store.goal(result.goal).unwrap();
    let eqs: Vec<String> = final_goal
        .context
        .decls
        .iter()
        .filter(|d| as_eq(&d.ty).is_some())
        .map(|d| format!("{}", d.ty))
        .collect();
    assert_eq!(eqs.len(), 2);
    insta::assert_snapshot!(eqs.join("\n"), @r"
    Eq Nat c1 c3
    Eq Nat c2 c4
    ");
}

#[test]
fn zero_constructor_split_closes_the_goal() {
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
    let sub_goals = wari::cases(&env, &mut store, goal, e).unwrap();
    assert!(sub_goals.is_empty());
    assert!(store.is_assigned(goal));
}

#[test]
fn substituted_variables_vanish_from_the_sub_goal() {
    // splitting v also substitutes v and n away in every branch; their
    // ids occur nowhere in the returned sub-goals
    let env = fixture();
    let mut store = Store::new();
    let n = local_named("n");
    let v = local_named("v");
    let h2 = local_named("h2");
    let p = mk_const(QualifiedName::intern("P"));
    let r = mk_const(QualifiedName::intern("R"));
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
    let goal = store.fresh_goal(ctx, r.apply([mk_local(n), mk_local(v)]));
    let sub_goals = wari::cases(&env, &mut store, goal, v).unwrap();
    for sub in &sub_goals {
        let sub_goal = store.goal(sub.goal).unwrap();
        for x in [n, v] {
            assert!(!sub_goal.target.contains_local(x));
            assert!(!sub_goal.context.contains(x));
            assert!(!sub_goal.context.mentions(x));
        }
    }
}
