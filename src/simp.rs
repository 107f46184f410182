//! A small rewriting simplifier.
//!
//! The engine consumes this as an opaque service: given a goal and a named
//! rule set, try to close it. Rules are first-order: hole nodes on the
//! left-hand side are pattern variables, bound on first occurrence and
//! checked for alpha-equality on later ones.

use anyhow::bail;

use crate::goal::Store;
use crate::tt::{mk_const, Id, Name, QualifiedName, Term};

/// An equational rewrite `lhs ⇒ rhs`, or a backward-chaining implication
/// read right-to-left on propositions.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: QualifiedName,
    pub lhs: Term,
    pub rhs: Term,
}

/// A pattern that closes a goal outright when it matches the whole target.
/// `vars` fixes the argument order of the closing lemma's application.
#[derive(Debug, Clone)]
pub struct Closer {
    pub name: QualifiedName,
    pub pattern: Term,
    pub vars: Vec<Id>,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub name: Name,
    pub rewrites: Vec<Rule>,
    pub closers: Vec<Closer>,
}

impl RuleSet {
    pub fn new(name: Name) -> RuleSet {
        RuleSet {
            name,
            rewrites: vec![],
            closers: vec![],
        }
    }
}

fn match_pattern(pattern: &Term, m: &Term, subst: &mut Vec<(Id, Term)>) -> bool {
    match pattern {
        Term::Hole(inner) => {
            if let Some((_, bound)) = subst.iter().find(|(x, _)| *x == inner.id) {
                return bound.alpha_eq(m);
            }
            subst.push((inner.id, m.clone()));
            true
        }
        Term::Const(pattern) => {
            matches!(m, Term::Const(inner) if inner.name == pattern.name)
        }
        Term::Local(pattern) => {
            matches!(m, Term::Local(inner) if inner.id == pattern.id)
        }
        Term::Var(pattern) => {
            matches!(m, Term::Var(inner) if inner.index == pattern.index)
        }
        Term::App(pattern) => {
            let Term::App(inner) = m else {
                return false;
            };
            match_pattern(&pattern.fun, &inner.fun, subst)
                && match_pattern(&pattern.arg, &inner.arg, subst)
        }
        Term::Pi(pattern) => {
            let Term::Pi(inner) = m else {
                return false;
            };
            match_pattern(&pattern.binder_type, &inner.binder_type, subst)
                && match_pattern(&pattern.body, &inner.body, subst)
        }
        Term::Abs(pattern) => {
            let Term::Abs(inner) = m else {
                return false;
            };
            match_pattern(&pattern.binder_type, &inner.binder_type, subst)
                && match_pattern(&pattern.body, &inner.body, subst)
        }
        Term::Let(pattern) => {
            let Term::Let(inner) = m else {
                return false;
            };
            match_pattern(&pattern.binder_type, &inner.binder_type, subst)
                && match_pattern(&pattern.value, &inner.value, subst)
                && match_pattern(&pattern.body, &inner.body, subst)
        }
    }
}

fn instantiate_pattern(pattern: &Term, subst: &[(Id, Term)]) -> Term {
    pattern.replace_hole(&|id| {
        subst
            .iter()
            .find(|(x, _)| *x == id)
            .map(|(_, m)| m.clone())
    })
}

fn rewrite_head(rules: &[Rule], m: &Term) -> Option<Term> {
    for rule in rules {
        let mut subst = vec![];
        if match_pattern(&rule.lhs, m, &mut subst) {
            return Some(instantiate_pattern(&rule.rhs, &subst));
        }
    }
    None
}

/// One bottom-up pass: children first, then the node itself.
fn rewrite_once(rules: &[Rule], m: &Term) -> Term {
    let rebuilt = match m {
        Term::Var(_) | Term::Local(_) | Term::Hole(_) | Term::Const(_) => m.clone(),
        Term::App(inner) => {
            let fun = rewrite_once(rules, &inner.fun);
            let arg = rewrite_once(rules, &inner.arg);
            if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                m.clone()
            } else {
                crate::tt::mk_app(fun, arg)
            }
        }
        Term::Abs(inner) => {
            let binder_type = rewrite_once(rules, &inner.binder_type);
            let body = rewrite_once(rules, &inner.body);
            if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                m.clone()
            } else {
                crate::tt::mk_abs(inner.binder_name.clone(), binder_type, body)
            }
        }
        Term::Pi(inner) => {
            let binder_type = rewrite_once(rules, &inner.binder_type);
            let body = rewrite_once(rules, &inner.body);
            if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                m.clone()
            } else {
                crate::tt::mk_pi(inner.binder_name.clone(), binder_type, body)
            }
        }
        Term::Let(inner) => {
            let binder_type = rewrite_once(rules, &inner.binder_type);
            let value = rewrite_once(rules, &inner.value);
            let body = rewrite_once(rules, &inner.body);
            if inner.binder_type.ptr_eq(&binder_type)
                && inner.value.ptr_eq(&value)
                && inner.body.ptr_eq(&body)
            {
                m.clone()
            } else {
                crate::tt::mk_let(inner.binder_name.clone(), binder_type, value, body)
            }
        }
    };
    match rewrite_head(rules, &rebuilt) {
        Some(next) => next,
        None => rebuilt,
    }
}

const SIMP_FUEL: usize = 100;

/// Exhaustive bottom-up rewriting, fuel-bounded.
pub fn simplify(rule_set: &RuleSet, m: &Term) -> Term {
    let mut current = m.clone();
    for _ in 0..SIMP_FUEL {
        let next = rewrite_once(&rule_set.rewrites, &current);
        if next.alpha_eq(&current) {
            break;
        }
        current = next;
    }
    current
}

/// Attempts to close the goal with the rule set: simplify the target, then
/// look for a closing rule matching the result. On success the goal is
/// assigned and `true` is returned; `false` means "no rule applied".
pub fn close_goal(store: &mut Store, goal: Id, rule_set: &RuleSet) -> anyhow::Result<bool> {
    let target = store.instantiate(&store.goal(goal)?.target);
    let simplified = simplify(rule_set, &target);
    for closer in &rule_set.closers {
        let mut subst = vec![];
        if !match_pattern(&closer.pattern, &simplified, &mut subst) {
            continue;
        }
        let mut args = Vec::with_capacity(closer.vars.len());
        for x in &closer.vars {
            let Some((_, m)) = subst.iter().find(|(y, _)| y == x) else {
                bail!("closing rule {}: unbound pattern variable {}", closer.name, x);
            };
            args.push(m.clone());
        }
        let mut proof = mk_const(closer.name.clone()).apply(args);
        if !simplified.alpha_eq(&target) {
            static EQ_MPR: std::sync::LazyLock<QualifiedName> =
                std::sync::LazyLock::new(|| QualifiedName::intern("Eq.mpr"));
            proof = mk_const(EQ_MPR.clone()).apply([proof]);
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                target: "wari::simp",
                "closed {} with {} (rule set {})",
                target,
                closer.name,
                rule_set.name
            );
        }
        store.assign(goal, proof)?;
        return Ok(true);
    }
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            target: "wari::simp",
            "rule set {} does not close {} (normal form {})",
            rule_set.name,
            target,
            simplified
        );
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tt::{mk_hole, mk_local, Context, Name};

    fn pattern_var(value: &str) -> Id {
        Id::fresh_with_name(Name::intern(value))
    }

    fn nat_rules() -> RuleSet {
        let size = mk_const(QualifiedName::intern("Nat.size"));
        let succ = mk_const(QualifiedName::intern("Nat.succ"));
        let lt = mk_const(QualifiedName::intern("Nat.lt"));
        let le = mk_const(QualifiedName::intern("Nat.le"));

        let n = pattern_var("n");
        let a = pattern_var("a");
        let b = pattern_var("b");

        let mut rule_set = RuleSet::new(Name::intern("Nat.size_lemmas"));
        // size (succ n) ⇒ succ (size n)
        rule_set.rewrites.push(Rule {
            name: QualifiedName::intern("Nat.size_succ"),
            lhs: size.apply([succ.apply([mk_hole(n)])]),
            rhs: succ.apply([size.apply([mk_hole(n)])]),
        });
        // a < succ b ⇐ a ≤ b
        rule_set.rewrites.push(Rule {
            name: QualifiedName::intern("Nat.lt_succ_of_le"),
            lhs: lt.apply([mk_hole(a), succ.apply([mk_hole(b)])]),
            rhs: le.apply([mk_hole(a), mk_hole(b)]),
        });
        // a ≤ succ b ⇐ a ≤ b
        rule_set.rewrites.push(Rule {
            name: QualifiedName::intern("Nat.le_succ_of_le"),
            lhs: le.apply([mk_hole(a), succ.apply([mk_hole(b)])]),
            rhs: le.apply([mk_hole(a), mk_hole(b)]),
        });
        rule_set.closers.push(Closer {
            name: QualifiedName::intern("Nat.le_refl"),
            pattern: le.apply([mk_hole(a), mk_hole(a)]),
            vars: vec![a],
        });
        rule_set
    }

    #[test]
    fn rewrites_to_fixpoint() {
        let rule_set = nat_rules();
        let size = mk_const(QualifiedName::intern("Nat.size"));
        let succ = mk_const(QualifiedName::intern("Nat.succ"));
        let x = Id::fresh_with_name(Name::intern("x"));
        // size (succ (succ x)) ⇒ succ (succ (size x))
        let m = size.apply([succ.apply([succ.apply([mk_local(x)])])]);
        let simplified = simplify(&rule_set, &m);
        let expected = succ.apply([succ.apply([size.apply([mk_local(x)])])]);
        assert!(simplified.alpha_eq(&expected));
    }

    #[test]
    fn nonlinear_pattern_requires_equal_bindings() {
        let rule_set = nat_rules();
        let le = mk_const(QualifiedName::intern("Nat.le"));
        let x = Id::fresh_with_name(Name::intern("x"));
        let y = Id::fresh_with_name(Name::intern("y"));
        let mut store = Store::new();
        let good = store.fresh_goal(
            Context::default(),
            le.apply([mk_local(x), mk_local(x)]),
        );
        let bad = store.fresh_goal(Context::default(), le.apply([mk_local(x), mk_local(y)]));
        assert!(close_goal(&mut store, good, &rule_set).unwrap());
        assert!(!close_goal(&mut store, bad, &rule_set).unwrap());
    }

    #[test]
    fn closes_strict_size_inequality() {
        let rule_set = nat_rules();
        let size = mk_const(QualifiedName::intern("Nat.size"));
        let succ = mk_const(QualifiedName::intern("Nat.succ"));
        let lt = mk_const(QualifiedName::intern("Nat.lt"));
        let x = Id::fresh_with_name(Name::intern("x"));
        // size x < size (succ (succ x))
        let target = lt.apply([
            size.apply([mk_local(x)]),
            size.apply([succ.apply([succ.apply([mk_local(x)])])]),
        ]);
        let mut store = Store::new();
        let goal = store.fresh_goal(Context::default(), target);
        assert!(close_goal(&mut store, goal, &rule_set).unwrap());
        assert!(store.is_assigned(goal));
    }
}
