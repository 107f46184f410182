//! The global environment and the kernel services the engine consumes.
//!
//! The engine treats reduction, type inference and definitional equality
//! as opaque services; the versions here are deliberately modest — enough
//! for the term shapes the case-split pipeline builds.

use std::collections::HashMap;

use anyhow::bail;

use crate::goal::Store;
use crate::simp::RuleSet;
use crate::tt::{mk_pi, mk_type, Context, Ctor, Decl, Id, Name, Parameter, QualifiedName, Term};

/// A typed constant.
#[derive(Debug, Clone)]
pub struct Const {
    pub ty: Term,
}

/// A definition unfolded by weak-head normalization.
#[derive(Debug, Clone)]
pub struct Def {
    pub ty: Term,
    pub target: Term,
}

/// One constructor of an inductive family. `ty` is the full Pi telescope:
/// parameters, then fields, ending in the applied family.
#[derive(Debug, Clone)]
pub struct Constructor {
    pub name: QualifiedName,
    pub num_fields: usize,
    pub ty: Term,
}

/// An inductive family declaration. `ty` is the telescope of parameters
/// and indices ending in a sort.
#[derive(Debug, Clone)]
pub struct Inductive {
    pub name: QualifiedName,
    pub num_params: usize,
    pub num_indices: usize,
    pub ty: Term,
    pub ctors: Vec<Constructor>,
}

/// Derived metadata about one registered specialized eliminator: just
/// enough to size and shape the application the case splitter builds.
#[derive(Debug, Clone)]
pub struct Eliminator {
    pub name: QualifiedName,
    pub num_params: usize,
    pub num_indices: usize,
    pub num_minors: usize,
    /// Types of the motive's index binders, as a telescope over the
    /// family's parameters.
    pub index_tys: Vec<Term>,
}

/// A structural size measure registered for an inductive family, used by
/// the acyclicity prover.
#[derive(Debug, Clone)]
pub struct Measure {
    /// `size : T → Nat`-shaped function.
    pub size_fn: QualifiedName,
    /// The strict order on the measure's codomain.
    pub lt_fn: QualifiedName,
    /// Irreflexivity lemma of the strict order.
    pub irrefl: QualifiedName,
    /// Name of the rule set holding the measure's equations and ordering
    /// facts.
    pub rules: Name,
}

#[derive(Debug, Clone, Default)]
pub struct Env {
    consts: HashMap<QualifiedName, Const>,
    defs: HashMap<QualifiedName, Def>,
    inductives: HashMap<QualifiedName, Inductive>,
    /// constructor name → owning inductive name
    ctor_table: HashMap<QualifiedName, QualifiedName>,
    eliminators: HashMap<QualifiedName, Eliminator>,
    measures: HashMap<QualifiedName, Measure>,
    rule_sets: HashMap<Name, RuleSet>,
}

impl Env {
    pub fn new() -> Env {
        Env::default()
    }

    pub fn add_const(&mut self, name: QualifiedName, ty: Term) {
        self.consts.insert(name, Const { ty });
    }

    pub fn add_def(&mut self, name: QualifiedName, ty: Term, target: Term) {
        self.consts.insert(name.clone(), Const { ty: ty.clone() });
        self.defs.insert(name, Def { ty, target });
    }

    /// Registers the family and its constructors, including their constant
    /// typings and the `no_confusion` principle's constant.
    pub fn add_inductive(&mut self, decl: Inductive) {
        self.consts
            .insert(decl.name.clone(), Const { ty: decl.ty.clone() });
        self.consts
            .insert(decl.name.extend("no_confusion"), Const { ty: mk_type() });
        for ctor in &decl.ctors {
            self.consts
                .insert(ctor.name.clone(), Const { ty: ctor.ty.clone() });
            self.ctor_table.insert(ctor.name.clone(), decl.name.clone());
        }
        self.inductives.insert(decl.name.clone(), decl);
    }

    pub fn add_eliminator(&mut self, ind_name: QualifiedName, eliminator: Eliminator) {
        self.consts
            .insert(eliminator.name.clone(), Const { ty: mk_type() });
        self.eliminators.insert(ind_name, eliminator);
    }

    pub fn add_measure(&mut self, ind_name: QualifiedName, measure: Measure) {
        self.measures.insert(ind_name, measure);
    }

    pub fn add_rule_set(&mut self, rule_set: RuleSet) {
        self.rule_sets.insert(rule_set.name.clone(), rule_set);
    }

    pub fn const_ty(&self, name: &QualifiedName) -> Option<&Term> {
        self.consts.get(name).map(|c| &c.ty)
    }

    pub fn def(&self, name: &QualifiedName) -> Option<&Def> {
        self.defs.get(name)
    }

    pub fn inductive(&self, name: &QualifiedName) -> Option<&Inductive> {
        self.inductives.get(name)
    }

    /// Looks up a constructor by name, returning the owning family, the
    /// constructor, and its declaration position.
    pub fn constructor(&self, name: &QualifiedName) -> Option<(&Inductive, &Constructor, usize)> {
        let ind_name = self.ctor_table.get(name)?;
        let ind = self.inductives.get(ind_name)?;
        let k = ind.ctors.iter().position(|ctor| &ctor.name == name)?;
        Some((ind, &ind.ctors[k], k))
    }

    /// `None` is the normal "use the generic case split" branch, not an
    /// error.
    pub fn eliminator(&self, ind_name: &QualifiedName) -> Option<&Eliminator> {
        self.eliminators.get(ind_name)
    }

    pub fn measure(&self, ind_name: &QualifiedName) -> Option<&Measure> {
        self.measures.get(ind_name)
    }

    pub fn rule_set(&self, name: &Name) -> Option<&RuleSet> {
        self.rule_sets.get(name)
    }

    /// Weak-head normal form: hole instantiation, beta, zeta, delta.
    pub fn whnf(&self, store: &Store, m: &Term) -> Term {
        let mut current = m.clone();
        for _ in 0..10_000 {
            match self.whnf_step(store, &current) {
                Some(next) => current = next,
                None => return current,
            }
        }
        current
    }

    fn whnf_step(&self, store: &Store, m: &Term) -> Option<Term> {
        match m {
            Term::Hole(inner) => store.assignment(inner.id).cloned(),
            Term::Let(inner) => Some(inner.body.open(&[inner.value.clone()], 0)),
            Term::Const(inner) => self.defs.get(&inner.name).map(|def| def.target.clone()),
            Term::App(_) => {
                let head = m.head().clone();
                let args: Vec<Term> = m.args().into_iter().cloned().collect();
                match &head {
                    Term::Abs(inner) => {
                        let body = inner.body.open(&[args[0].clone()], 0);
                        Some(body.apply(args.into_iter().skip(1)))
                    }
                    Term::Hole(inner) => store
                        .assignment(inner.id)
                        .map(|assignment| assignment.clone().apply(args)),
                    Term::Const(inner) => self
                        .defs
                        .get(&inner.name)
                        .map(|def| def.target.clone().apply(args)),
                    Term::Let(inner) => {
                        Some(inner.body.open(&[inner.value.clone()], 0).apply(args))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Definitional equality, up to weak-head reduction at every position.
    pub fn equiv(&self, store: &Store, m1: &Term, m2: &Term) -> bool {
        let m1 = self.whnf(store, m1);
        let m2 = self.whnf(store, m2);
        if m1.alpha_eq(&m2) {
            return true;
        }
        match (&m1, &m2) {
            (Term::App(a), Term::App(b)) => {
                self.equiv(store, &a.fun, &b.fun) && self.equiv(store, &a.arg, &b.arg)
            }
            (Term::Abs(a), Term::Abs(b)) => {
                self.equiv(store, &a.binder_type, &b.binder_type)
                    && self.equiv_under_binder(store, &a.body, &b.body)
            }
            (Term::Pi(a), Term::Pi(b)) => {
                self.equiv(store, &a.binder_type, &b.binder_type)
                    && self.equiv_under_binder(store, &a.body, &b.body)
            }
            _ => false,
        }
    }

    fn equiv_under_binder(&self, store: &Store, body1: &Term, body2: &Term) -> bool {
        let x = crate::tt::mk_local(Id::fresh());
        let body1 = body1.open(std::slice::from_ref(&x), 0);
        let body2 = body2.open(std::slice::from_ref(&x), 0);
        self.equiv(store, &body1, &body2)
    }

    /// Type inference for the term shapes the engine builds. Loose bound
    /// variables are a caller error.
    pub fn infer_type(&self, store: &Store, ctx: &Context, m: &Term) -> anyhow::Result<Term> {
        match m {
            Term::Var(_) => bail!("cannot infer the type of a loose bound variable in {}", m),
            Term::Local(inner) => match ctx.get(inner.id) {
                Some(decl) => Ok(decl.ty.clone()),
                None => bail!("unknown local {} during type inference", inner.id),
            },
            Term::Hole(inner) => Ok(store.goal(inner.id)?.target.clone()),
            Term::Const(inner) => match self.consts.get(&inner.name) {
                Some(c) => Ok(c.ty.clone()),
                None => bail!("unknown constant {} during type inference", inner.name),
            },
            Term::App(inner) => {
                let fun_ty = self.whnf(store, &self.infer_type(store, ctx, &inner.fun)?);
                let Term::Pi(pi) = &fun_ty else {
                    bail!(
                        "expected a function type applying {} (found {})",
                        inner.fun,
                        fun_ty
                    );
                };
                Ok(pi.body.open(std::slice::from_ref(&inner.arg), 0))
            }
            Term::Abs(inner) => {
                let x = Id::fresh();
                let mut scratch = ctx.clone();
                scratch.push(Decl {
                    id: x,
                    ty: inner.binder_type.clone(),
                    value: None,
                });
                let body = inner.body.open(&[crate::tt::mk_local(x)], 0);
                let body_ty = self.infer_type(store, &scratch, &body)?;
                Ok(mk_pi(
                    inner.binder_name.clone(),
                    inner.binder_type.clone(),
                    body_ty.close(&[x], 0),
                ))
            }
            Term::Pi(_) => Ok(mk_type()),
            Term::Let(inner) => {
                let body = inner.body.open(&[inner.value.clone()], 0);
                self.infer_type(store, ctx, &body)
            }
        }
    }

    /// Views `m` as an application of a registered inductive family,
    /// splitting its arguments into parameters and indices.
    pub fn as_inductive_app(
        &self,
        store: &Store,
        m: &Term,
    ) -> Option<(&Inductive, Vec<Term>, Vec<Term>)> {
        let m = self.whnf(store, m);
        let ctor = Ctor::try_from(m).ok()?;
        let ind = self.inductives.get(&ctor.head.name)?;
        if ctor.args.len() != ind.num_params + ind.num_indices {
            return None;
        }
        let mut args = ctor.args;
        let indices = args.split_off(ind.num_params);
        Some((ind, args, indices))
    }

    /// The index binders of the family's telescope, instantiated at the
    /// given parameters.
    pub fn index_binders(&self, ind: &Inductive, params: &[Term]) -> (Vec<Parameter>, Term) {
        let (binders, sort) = ind.ty.unpi();
        let param_subst: Vec<(Id, Term)> = binders[..ind.num_params]
            .iter()
            .map(|p| p.id)
            .zip(params.iter().cloned())
            .collect();
        let index_binders = binders[ind.num_params..]
            .iter()
            .map(|p| Parameter {
                id: p.id,
                ty: p.ty.subst(&param_subst),
            })
            .collect();
        (index_binders, sort.subst(&param_subst))
    }
}
