//! Terms, local contexts, and the operations on them.
//!
//! [Term] is an immutable, structurally shared tree. Binding is
//! locally nameless: bound variables are de Bruijn indices ([Term::Var])
//! and free variables are globally fresh ids ([Term::Local]). [Term::Hole]
//! is a metavariable; its assignment lives in the goal store, not in the
//! term itself.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, LazyLock, Mutex, Weak};

#[derive(Debug, Clone, Ord, PartialOrd, Default)]
pub struct Name(Arc<String>);

static NAME_TABLE: LazyLock<Mutex<HashMap<String, Weak<String>>>> = LazyLock::new(Default::default);

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Name {
    pub fn intern(value: &str) -> Name {
        let mut table = NAME_TABLE.lock().unwrap();
        if let Some(existing) = table.get(value).and_then(|weak| weak.upgrade()) {
            return Name(existing);
        }

        let owned = Arc::new(value.to_owned());
        table.insert(value.to_owned(), Arc::downgrade(&owned));
        Name(owned)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

/// A dot-separated constant name, e.g. `List.cons` or `Nat.rec`.
#[derive(Debug, Clone, Ord, PartialOrd, Default)]
pub struct QualifiedName(Arc<String>);

static QUALIFIED_NAME_TABLE: LazyLock<Mutex<HashMap<String, Weak<String>>>> =
    LazyLock::new(Default::default);

impl Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl QualifiedName {
    pub fn intern(value: &str) -> QualifiedName {
        let mut table = QUALIFIED_NAME_TABLE.lock().unwrap();
        if let Some(existing) = table.get(value).and_then(|weak| weak.upgrade()) {
            return QualifiedName(existing);
        }

        let owned = Arc::new(value.to_owned());
        table.insert(value.to_owned(), Arc::downgrade(&owned));
        QualifiedName(owned)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// `QualifiedName::intern("List").extend("cons")` is `List.cons`.
    pub fn extend(&self, suffix: &str) -> QualifiedName {
        QualifiedName::intern(&format!("{}.{}", self.0, suffix))
    }

    /// The last dot-separated segment.
    pub fn name(&self) -> &str {
        self.0.rsplit('.').next().unwrap_or(self.0.as_str())
    }
}

impl PartialEq for QualifiedName {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for QualifiedName {}

impl Hash for QualifiedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.0).hash(state);
    }
}

/// Identity of a free variable or metavariable.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct Id(usize);

static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);
static ID_NAME_REV_TABLE: LazyLock<Mutex<HashMap<Id, Name>>> = LazyLock::new(Default::default);

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = self.name() {
            return write!(f, "{}", name);
        }
        write!(f, "{}", self.0)
    }
}

impl Id {
    pub fn fresh() -> Self {
        let id = ID_COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Id(id)
    }

    pub fn fresh_with_name(name: Name) -> Self {
        let new_id = Id::fresh();
        ID_NAME_REV_TABLE.lock().unwrap().insert(new_id, name);
        new_id
    }

    pub fn fresh_from(other: Id) -> Self {
        match other.name() {
            Some(name) => Id::fresh_with_name(name),
            None => Id::fresh(),
        }
    }

    pub fn name(&self) -> Option<Name> {
        ID_NAME_REV_TABLE.lock().unwrap().get(self).cloned()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TermMetadata {
    /// One past the highest loose de Bruijn index reachable below this
    /// node. Conservative: not decremented when passing under binders.
    pub bound: usize,
    /// No free [Term::Local] below this node.
    pub is_closed: bool,
    pub has_hole: bool,
}

#[derive(Clone, Debug)]
pub enum Term {
    Var(Arc<TermVar>),
    Local(Arc<TermLocal>),
    Hole(Arc<TermHole>),
    Const(Arc<TermConst>),
    App(Arc<TermApp>),
    Abs(Arc<TermAbs>),
    Pi(Arc<TermPi>),
    Let(Arc<TermLet>),
}

#[derive(Clone, Debug)]
pub struct TermVar {
    pub metadata: TermMetadata,
    pub index: usize,
}

#[derive(Clone, Debug)]
pub struct TermLocal {
    pub metadata: TermMetadata,
    pub id: Id,
}

#[derive(Clone, Debug)]
pub struct TermHole {
    pub metadata: TermMetadata,
    pub id: Id,
}

#[derive(Clone, Debug)]
pub struct TermConst {
    pub metadata: TermMetadata,
    pub name: QualifiedName,
}

#[derive(Clone, Debug)]
pub struct TermApp {
    pub metadata: TermMetadata,
    pub fun: Term,
    pub arg: Term,
}

#[derive(Clone, Debug)]
pub struct TermAbs {
    pub metadata: TermMetadata,
    // for pretty-printing
    pub binder_name: Option<Name>,
    pub binder_type: Term,
    pub body: Term,
}

#[derive(Clone, Debug)]
pub struct TermPi {
    pub metadata: TermMetadata,
    // for pretty-printing
    pub binder_name: Option<Name>,
    pub binder_type: Term,
    pub body: Term,
}

#[derive(Clone, Debug)]
pub struct TermLet {
    pub metadata: TermMetadata,
    pub binder_name: Option<Name>,
    pub binder_type: Term,
    pub value: Term,
    pub body: Term,
}

impl Default for Term {
    fn default() -> Self {
        mk_var(0)
    }
}

pub fn mk_var(index: usize) -> Term {
    let metadata = TermMetadata {
        bound: index + 1,
        is_closed: true,
        has_hole: false,
    };
    Term::Var(Arc::new(TermVar { metadata, index }))
}

pub fn mk_local(id: Id) -> Term {
    let metadata = TermMetadata {
        bound: 0,
        is_closed: false,
        has_hole: false,
    };
    Term::Local(Arc::new(TermLocal { metadata, id }))
}

pub fn mk_hole(id: Id) -> Term {
    let metadata = TermMetadata {
        bound: 0,
        is_closed: true,
        has_hole: true,
    };
    Term::Hole(Arc::new(TermHole { metadata, id }))
}

pub fn mk_fresh_hole() -> Term {
    mk_hole(Id::fresh())
}

pub fn mk_const(name: QualifiedName) -> Term {
    let metadata = TermMetadata {
        bound: 0,
        is_closed: true,
        has_hole: false,
    };
    Term::Const(Arc::new(TermConst { metadata, name }))
}

pub fn mk_app(fun: Term, arg: Term) -> Term {
    let lhs = fun.metadata();
    let rhs = arg.metadata();
    let metadata = TermMetadata {
        bound: lhs.bound.max(rhs.bound),
        is_closed: lhs.is_closed && rhs.is_closed,
        has_hole: lhs.has_hole || rhs.has_hole,
    };
    Term::App(Arc::new(TermApp { metadata, fun, arg }))
}

pub fn mk_abs(binder_name: Option<Name>, binder_type: Term, body: Term) -> Term {
    let metadata = binder_metadata(&binder_type, &body);
    Term::Abs(Arc::new(TermAbs {
        metadata,
        binder_name,
        binder_type,
        body,
    }))
}

pub fn mk_pi(binder_name: Option<Name>, binder_type: Term, body: Term) -> Term {
    let metadata = binder_metadata(&binder_type, &body);
    Term::Pi(Arc::new(TermPi {
        metadata,
        binder_name,
        binder_type,
        body,
    }))
}

/// A non-dependent [Term::Pi]. The codomain must not have loose vars.
pub fn mk_arrow(dom: Term, cod: Term) -> Term {
    mk_pi(None, dom, cod)
}

pub fn mk_let(binder_name: Option<Name>, binder_type: Term, value: Term, body: Term) -> Term {
    let inner = binder_metadata(&binder_type, &body);
    let v = value.metadata();
    let metadata = TermMetadata {
        bound: inner.bound.max(v.bound),
        is_closed: inner.is_closed && v.is_closed,
        has_hole: inner.has_hole || v.has_hole,
    };
    Term::Let(Arc::new(TermLet {
        metadata,
        binder_name,
        binder_type,
        value,
        body,
    }))
}

fn binder_metadata(binder_type: &Term, body: &Term) -> TermMetadata {
    let t = binder_type.metadata();
    let b = body.metadata();
    TermMetadata {
        bound: t.bound.max(b.bound),
        is_closed: t.is_closed && b.is_closed,
        has_hole: t.has_hole || b.has_hole,
    }
}

/// The unapplied view of a left-spined application with a constant head.
#[derive(Debug, Clone)]
pub struct Ctor {
    pub head: Arc<TermConst>,
    pub args: Vec<Term>,
}

impl TryFrom<Term> for Ctor {
    type Error = ();

    fn try_from(value: Term) -> Result<Self, Self::Error> {
        match value {
            Term::Const(value) => Ok(Ctor {
                head: value,
                args: vec![],
            }),
            Term::App(value) => {
                let value = Arc::unwrap_or_clone(value);
                let mut ctor: Ctor = value.fun.try_into()?;
                ctor.args.push(value.arg);
                Ok(ctor)
            }
            Term::Var(_) | Term::Local(_) | Term::Hole(_) | Term::Abs(_) | Term::Pi(_)
            | Term::Let(_) => Err(()),
        }
    }
}

impl Term {
    #[inline]
    pub fn metadata(&self) -> &TermMetadata {
        match self {
            Term::Var(inner) => &inner.metadata,
            Term::Local(inner) => &inner.metadata,
            Term::Hole(inner) => &inner.metadata,
            Term::Const(inner) => &inner.metadata,
            Term::App(inner) => &inner.metadata,
            Term::Abs(inner) => &inner.metadata,
            Term::Pi(inner) => &inner.metadata,
            Term::Let(inner) => &inner.metadata,
        }
    }

    pub fn ptr_eq(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Var(a), Term::Var(b)) => Arc::ptr_eq(a, b),
            (Term::Local(a), Term::Local(b)) => Arc::ptr_eq(a, b),
            (Term::Hole(a), Term::Hole(b)) => Arc::ptr_eq(a, b),
            (Term::Const(a), Term::Const(b)) => Arc::ptr_eq(a, b),
            (Term::App(a), Term::App(b)) => Arc::ptr_eq(a, b),
            (Term::Abs(a), Term::Abs(b)) => Arc::ptr_eq(a, b),
            (Term::Pi(a), Term::Pi(b)) => Arc::ptr_eq(a, b),
            (Term::Let(a), Term::Let(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `self.open([x, y], k)` substitutes `x` for var `k+1` and `y` for var `k`.
    pub fn open(&self, xs: &[Term], level: usize) -> Term {
        if self.metadata().bound <= level {
            return self.clone();
        }
        match self {
            Self::Local(_) | Self::Const(_) | Self::Hole(_) => self.clone(),
            Self::Var(inner) => {
                if inner.index >= level {
                    let i = inner.index - level;
                    if i < xs.len() {
                        return xs[xs.len() - i - 1].clone();
                    }
                }
                self.clone()
            }
            Self::App(inner) => {
                let fun = inner.fun.open(xs, level);
                let arg = inner.arg.open(xs, level);
                if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                    self.clone()
                } else {
                    mk_app(fun, arg)
                }
            }
            Self::Abs(inner) => {
                let binder_type = inner.binder_type.open(xs, level);
                let body = inner.body.open(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_abs(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Pi(inner) => {
                let binder_type = inner.binder_type.open(xs, level);
                let body = inner.body.open(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_pi(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Let(inner) => {
                let binder_type = inner.binder_type.open(xs, level);
                let value = inner.value.open(xs, level);
                let body = inner.body.open(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type)
                    && inner.value.ptr_eq(&value)
                    && inner.body.ptr_eq(&body)
                {
                    self.clone()
                } else {
                    mk_let(inner.binder_name.clone(), binder_type, value, body)
                }
            }
        }
    }

    /// `self.close([x, y], k)` abstracts local `x` to var `k+1` and `y` to var `k`.
    pub fn close(&self, xs: &[Id], level: usize) -> Term {
        if self.metadata().is_closed {
            return self.clone();
        }
        match self {
            Self::Local(inner) => {
                let id = inner.id;
                for (i, &x) in xs.iter().rev().enumerate() {
                    if id == x {
                        return mk_var(level + i);
                    }
                }
                self.clone()
            }
            Self::Var(_) | Self::Const(_) | Self::Hole(_) => self.clone(),
            Self::App(inner) => {
                let fun = inner.fun.close(xs, level);
                let arg = inner.arg.close(xs, level);
                if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                    self.clone()
                } else {
                    mk_app(fun, arg)
                }
            }
            Self::Abs(inner) => {
                let binder_type = inner.binder_type.close(xs, level);
                let body = inner.body.close(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_abs(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Pi(inner) => {
                let binder_type = inner.binder_type.close(xs, level);
                let body = inner.body.close(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_pi(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Let(inner) => {
                let binder_type = inner.binder_type.close(xs, level);
                let value = inner.value.close(xs, level);
                let body = inner.body.close(xs, level + 1);
                if inner.binder_type.ptr_eq(&binder_type)
                    && inner.value.ptr_eq(&value)
                    && inner.body.ptr_eq(&body)
                {
                    self.clone()
                } else {
                    mk_let(inner.binder_name.clone(), binder_type, value, body)
                }
            }
        }
    }

    pub fn replace_local(&self, f: &impl Fn(Id) -> Option<Term>) -> Term {
        if self.metadata().is_closed {
            return self.clone();
        }
        match self {
            Self::Local(inner) => f(inner.id).unwrap_or_else(|| self.clone()),
            Self::Var(_) | Self::Const(_) | Self::Hole(_) => self.clone(),
            Self::App(inner) => {
                let fun = inner.fun.replace_local(f);
                let arg = inner.arg.replace_local(f);
                if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                    self.clone()
                } else {
                    mk_app(fun, arg)
                }
            }
            Self::Abs(inner) => {
                let binder_type = inner.binder_type.replace_local(f);
                let body = inner.body.replace_local(f);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_abs(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Pi(inner) => {
                let binder_type = inner.binder_type.replace_local(f);
                let body = inner.body.replace_local(f);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_pi(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Let(inner) => {
                let binder_type = inner.binder_type.replace_local(f);
                let value = inner.value.replace_local(f);
                let body = inner.body.replace_local(f);
                if inner.binder_type.ptr_eq(&binder_type)
                    && inner.value.ptr_eq(&value)
                    && inner.body.ptr_eq(&body)
                {
                    self.clone()
                } else {
                    mk_let(inner.binder_name.clone(), binder_type, value, body)
                }
            }
        }
    }

    pub fn replace_hole(&self, f: &impl Fn(Id) -> Option<Term>) -> Term {
        if !self.metadata().has_hole {
            return self.clone();
        }
        match self {
            Self::Hole(inner) => {
                if let Some(replacement) = f(inner.id) {
                    replacement.replace_hole(f)
                } else {
                    self.clone()
                }
            }
            Self::Var(_) | Self::Local(_) | Self::Const(_) => self.clone(),
            Self::App(inner) => {
                let fun = inner.fun.replace_hole(f);
                let arg = inner.arg.replace_hole(f);
                if inner.fun.ptr_eq(&fun) && inner.arg.ptr_eq(&arg) {
                    self.clone()
                } else {
                    mk_app(fun, arg)
                }
            }
            Self::Abs(inner) => {
                let binder_type = inner.binder_type.replace_hole(f);
                let body = inner.body.replace_hole(f);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_abs(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Pi(inner) => {
                let binder_type = inner.binder_type.replace_hole(f);
                let body = inner.body.replace_hole(f);
                if inner.binder_type.ptr_eq(&binder_type) && inner.body.ptr_eq(&body) {
                    self.clone()
                } else {
                    mk_pi(inner.binder_name.clone(), binder_type, body)
                }
            }
            Self::Let(inner) => {
                let binder_type = inner.binder_type.replace_hole(f);
                let value = inner.value.replace_hole(f);
                let body = inner.body.replace_hole(f);
                if inner.binder_type.ptr_eq(&binder_type)
                    && inner.value.ptr_eq(&value)
                    && inner.body.ptr_eq(&body)
                {
                    self.clone()
                } else {
                    mk_let(inner.binder_name.clone(), binder_type, value, body)
                }
            }
        }
    }

    /// Simultaneously substitute terms for free locals.
    pub fn subst(&self, subst: &[(Id, Term)]) -> Term {
        self.replace_local(&|id| {
            subst
                .iter()
                .find(|(x, _)| *x == id)
                .map(|(_, t)| t.clone())
        })
    }

    /// Syntactic occurrence of a free local. Does not look through hole
    /// assignments; see the goal store for the deep check.
    pub fn contains_local(&self, id: Id) -> bool {
        if self.metadata().is_closed {
            return false;
        }
        match self {
            Self::Local(inner) => inner.id == id,
            Self::Var(_) | Self::Const(_) | Self::Hole(_) => false,
            Self::App(inner) => inner.fun.contains_local(id) || inner.arg.contains_local(id),
            Self::Abs(inner) => {
                inner.binder_type.contains_local(id) || inner.body.contains_local(id)
            }
            Self::Pi(inner) => {
                inner.binder_type.contains_local(id) || inner.body.contains_local(id)
            }
            Self::Let(inner) => {
                inner.binder_type.contains_local(id)
                    || inner.value.contains_local(id)
                    || inner.body.contains_local(id)
            }
        }
    }

    pub fn contains_hole(&self, id: Id) -> bool {
        if !self.metadata().has_hole {
            return false;
        }
        match self {
            Self::Hole(inner) => inner.id == id,
            Self::Var(_) | Self::Local(_) | Self::Const(_) => false,
            Self::App(inner) => inner.fun.contains_hole(id) || inner.arg.contains_hole(id),
            Self::Abs(inner) => inner.binder_type.contains_hole(id) || inner.body.contains_hole(id),
            Self::Pi(inner) => inner.binder_type.contains_hole(id) || inner.body.contains_hole(id),
            Self::Let(inner) => {
                inner.binder_type.contains_hole(id)
                    || inner.value.contains_hole(id)
                    || inner.body.contains_hole(id)
            }
        }
    }

    pub fn head(&self) -> &Term {
        let mut m = self;
        while let Term::App(inner) = m {
            m = &inner.fun;
        }
        m
    }

    pub fn args(&self) -> Vec<&Term> {
        let mut m = self;
        let mut args = vec![];
        while let Term::App(inner) = m {
            args.push(&inner.arg);
            m = &inner.fun;
        }
        args.reverse();
        args
    }

    pub fn apply(&self, args: impl IntoIterator<Item = Term>) -> Term {
        let mut fun = self.clone();
        for arg in args {
            fun = mk_app(fun, arg);
        }
        fun
    }

    /// `t.pi_abstract(&[x, y])` is `Π x y, t` with the locals closed over.
    pub fn pi_abstract(&self, params: &[Parameter]) -> Term {
        let ids: Vec<Id> = params.iter().map(|p| p.id).collect();
        let mut result = self.close(&ids, 0);
        let mut tys: Vec<Term> = params.iter().map(|p| p.ty.clone()).collect();
        for (k, p) in params.iter().enumerate().rev() {
            // binder types of later params may mention earlier params
            let ty = tys.pop().unwrap().close(&ids[..k], 0);
            result = mk_pi(p.id.name(), ty, result);
        }
        result
    }

    /// `t.lambda_abstract(&[x, y])` is `λ x y, t`.
    pub fn lambda_abstract(&self, params: &[Parameter]) -> Term {
        let ids: Vec<Id> = params.iter().map(|p| p.id).collect();
        let mut result = self.close(&ids, 0);
        let mut tys: Vec<Term> = params.iter().map(|p| p.ty.clone()).collect();
        for (k, p) in params.iter().enumerate().rev() {
            let ty = tys.pop().unwrap().close(&ids[..k], 0);
            result = mk_abs(p.id.name(), ty, result);
        }
        result
    }

    /// Strips a Pi telescope, instantiating each binder with a fresh local.
    /// Returns the binders and the fully opened body.
    pub fn unpi(&self) -> (Vec<Parameter>, Term) {
        let mut params = vec![];
        let mut current = self.clone();
        while let Term::Pi(inner) = &current {
            let id = match &inner.binder_name {
                Some(name) => Id::fresh_with_name(name.clone()),
                None => Id::fresh(),
            };
            params.push(Parameter {
                id,
                ty: inner.binder_type.clone(),
            });
            current = inner.body.open(&[mk_local(id)], 0);
        }
        (params, current)
    }

    pub fn alpha_eq(&self, other: &Term) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Term::Var(a), Term::Var(b)) => a.index == b.index,
            (Term::Local(a), Term::Local(b)) => a.id == b.id,
            (Term::Hole(a), Term::Hole(b)) => a.id == b.id,
            (Term::Const(a), Term::Const(b)) => a.name == b.name,
            (Term::App(a), Term::App(b)) => a.fun.alpha_eq(&b.fun) && a.arg.alpha_eq(&b.arg),
            (Term::Abs(a), Term::Abs(b)) => {
                a.binder_type.alpha_eq(&b.binder_type) && a.body.alpha_eq(&b.body)
            }
            (Term::Pi(a), Term::Pi(b)) => {
                a.binder_type.alpha_eq(&b.binder_type) && a.body.alpha_eq(&b.body)
            }
            (Term::Let(a), Term::Let(b)) => {
                a.binder_type.alpha_eq(&b.binder_type)
                    && a.value.alpha_eq(&b.value)
                    && a.body.alpha_eq(&b.body)
            }
            _ => false,
        }
    }

    pub fn is_pi(&self) -> bool {
        matches!(self, Term::Pi(_))
    }

    pub fn as_local(&self) -> Option<Id> {
        match self {
            Term::Local(inner) => Some(inner.id),
            _ => None,
        }
    }
}

/// A free variable together with its type.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: Id,
    pub ty: Term,
}

pub fn mk_prop() -> Term {
    static PROP: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Prop"));
    mk_const(PROP.clone())
}

pub fn mk_type() -> Term {
    static TYPE: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Type"));
    mk_const(TYPE.clone())
}

pub fn mk_eq(ty: Term, lhs: Term, rhs: Term) -> Term {
    static EQ: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq"));
    mk_const(EQ.clone()).apply([ty, lhs, rhs])
}

pub fn mk_eq_refl(ty: Term, m: Term) -> Term {
    static EQ_REFL: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq.refl"));
    mk_const(EQ_REFL.clone()).apply([ty, m])
}

pub fn mk_heq(lhs_ty: Term, lhs: Term, rhs_ty: Term, rhs: Term) -> Term {
    static HEQ: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("HEq"));
    mk_const(HEQ.clone()).apply([lhs_ty, lhs, rhs_ty, rhs])
}

pub fn mk_heq_refl(ty: Term, m: Term) -> Term {
    static HEQ_REFL: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("HEq.refl"));
    mk_const(HEQ_REFL.clone()).apply([ty, m])
}

/// Matches `Eq ty lhs rhs`.
pub fn as_eq(m: &Term) -> Option<(&Term, &Term, &Term)> {
    static EQ: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("Eq"));
    let args = m.args();
    if args.len() != 3 {
        return None;
    }
    let Term::Const(head) = m.head() else {
        return None;
    };
    if head.name != *EQ {
        return None;
    }
    Some((args[0], args[1], args[2]))
}

/// Matches `HEq lhs_ty lhs rhs_ty rhs`.
pub fn as_heq(m: &Term) -> Option<(&Term, &Term, &Term, &Term)> {
    static HEQ: LazyLock<QualifiedName> = LazyLock::new(|| QualifiedName::intern("HEq"));
    let args = m.args();
    if args.len() != 4 {
        return None;
    }
    let Term::Const(head) = m.head() else {
        return None;
    };
    if head.name != *HEQ {
        return None;
    }
    Some((args[0], args[1], args[2], args[3]))
}

/// `guard(t, [p, q])` is `p → q → t`.
pub fn guard(target: Term, guards: impl IntoIterator<Item = Term>) -> Term {
    let guards: Vec<Term> = guards.into_iter().collect();
    let mut result = target;
    for g in guards.into_iter().rev() {
        result = mk_arrow(g, result);
    }
    result
}

/// Splits one leading non-dependent Pi into (domain, codomain).
pub fn unguard1(m: &Term) -> Option<(Term, Term)> {
    let Term::Pi(inner) = m else {
        return None;
    };
    if inner.body.contains_var(0) {
        return None;
    }
    Some((inner.binder_type.clone(), inner.body.clone()))
}

impl Term {
    pub fn contains_var(&self, i: usize) -> bool {
        if self.metadata().bound <= i {
            return false;
        }
        match self {
            Self::Var(inner) => inner.index == i,
            Self::Local(_) | Self::Const(_) | Self::Hole(_) => false,
            Self::App(inner) => inner.fun.contains_var(i) || inner.arg.contains_var(i),
            Self::Abs(inner) => {
                inner.binder_type.contains_var(i) || inner.body.contains_var(i + 1)
            }
            Self::Pi(inner) => inner.binder_type.contains_var(i) || inner.body.contains_var(i + 1),
            Self::Let(inner) => {
                inner.binder_type.contains_var(i)
                    || inner.value.contains_var(i)
                    || inner.body.contains_var(i + 1)
            }
        }
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const TERM_PREC_BINDER: u8 = 0;
        const TERM_PREC_APP: u8 = 1;
        const TERM_PREC_ATOM: u8 = 2;

        fn fmt_binder_name(name: &Option<Name>, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match name {
                Some(name) => write!(f, "{}", name),
                None => write!(f, "_"),
            }
        }

        fn fmt_term(term: &Term, f: &mut std::fmt::Formatter<'_>, prec: u8) -> std::fmt::Result {
            match term {
                Term::Var(inner) => write!(f, "#{}", inner.index),
                Term::Local(inner) => write!(f, "{}", inner.id),
                Term::Hole(inner) => write!(f, "?{}", inner.id),
                Term::Const(inner) => write!(f, "{}", inner.name),
                Term::App(inner) => {
                    let needs_paren = prec > TERM_PREC_APP;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    fmt_term(&inner.fun, f, TERM_PREC_APP)?;
                    write!(f, " ")?;
                    fmt_term(&inner.arg, f, TERM_PREC_ATOM)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Abs(inner) => {
                    let needs_paren = prec > TERM_PREC_BINDER;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "λ")?;
                    fmt_binder_name(&inner.binder_name, f)?;
                    write!(f, ":")?;
                    fmt_term(&inner.binder_type, f, TERM_PREC_APP)?;
                    write!(f, ". ")?;
                    fmt_term(&inner.body, f, TERM_PREC_BINDER)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Pi(inner) => {
                    let needs_paren = prec > TERM_PREC_BINDER;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    if inner.body.contains_var(0) {
                        write!(f, "Π")?;
                        fmt_binder_name(&inner.binder_name, f)?;
                        write!(f, ":")?;
                        fmt_term(&inner.binder_type, f, TERM_PREC_APP)?;
                        write!(f, ". ")?;
                        fmt_term(&inner.body, f, TERM_PREC_BINDER)?;
                    } else {
                        fmt_term(&inner.binder_type, f, TERM_PREC_APP)?;
                        write!(f, " → ")?;
                        fmt_term(&inner.body, f, TERM_PREC_BINDER)?;
                    }
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
                Term::Let(inner) => {
                    let needs_paren = prec > TERM_PREC_BINDER;
                    if needs_paren {
                        write!(f, "(")?;
                    }
                    write!(f, "let ")?;
                    fmt_binder_name(&inner.binder_name, f)?;
                    write!(f, ":")?;
                    fmt_term(&inner.binder_type, f, TERM_PREC_APP)?;
                    write!(f, " := ")?;
                    fmt_term(&inner.value, f, TERM_PREC_BINDER)?;
                    write!(f, " in ")?;
                    fmt_term(&inner.body, f, TERM_PREC_BINDER)?;
                    if needs_paren {
                        write!(f, ")")?;
                    }
                    Ok(())
                }
            }
        }

        fmt_term(self, f, TERM_PREC_BINDER)
    }
}

/// One local declaration. The user-facing name lives in [Id]'s name table.
#[derive(Debug, Clone)]
pub struct Decl {
    pub id: Id,
    pub ty: Term,
    pub value: Option<Term>,
}

/// An ordered snapshot of local declarations. Case splitting never mutates
/// a context in place; it builds a new one per sub-goal.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub decls: Vec<Decl>,
}

impl Context {
    pub fn get(&self, id: Id) -> Option<&Decl> {
        self.decls.iter().rev().find(|decl| decl.id == id)
    }

    pub fn index_of(&self, id: Id) -> Option<usize> {
        self.decls.iter().position(|decl| decl.id == id)
    }

    pub fn push(&mut self, decl: Decl) {
        self.decls.push(decl);
    }

    pub fn contains(&self, id: Id) -> bool {
        self.get(id).is_some()
    }

    /// Syntactic occurrence of `id` in any decl type or value, excluding
    /// `id`'s own declaration.
    pub fn mentions(&self, id: Id) -> bool {
        self.decls.iter().any(|decl| {
            decl.id != id
                && (decl.ty.contains_local(id)
                    || decl
                        .value
                        .as_ref()
                        .is_some_and(|value| value.contains_local(id)))
        })
    }

    /// Every local referenced by a decl must be declared earlier.
    pub fn is_well_scoped(&self) -> bool {
        for (k, decl) in self.decls.iter().enumerate() {
            let declared_before = |x: Id| self.decls[..k].iter().any(|d| d.id == x);
            if !free_locals(&decl.ty).into_iter().all(declared_before) {
                return false;
            }
            if let Some(value) = &decl.value {
                if !free_locals(value).into_iter().all(declared_before) {
                    return false;
                }
            }
        }
        true
    }
}

/// Collects the free locals of a term, in first-occurrence order.
pub fn free_locals(m: &Term) -> Vec<Id> {
    fn walk(m: &Term, acc: &mut Vec<Id>) {
        if m.metadata().is_closed {
            return;
        }
        match m {
            Term::Local(inner) => {
                if !acc.contains(&inner.id) {
                    acc.push(inner.id);
                }
            }
            Term::Var(_) | Term::Const(_) | Term::Hole(_) => {}
            Term::App(inner) => {
                walk(&inner.fun, acc);
                walk(&inner.arg, acc);
            }
            Term::Abs(inner) => {
                walk(&inner.binder_type, acc);
                walk(&inner.body, acc);
            }
            Term::Pi(inner) => {
                walk(&inner.binder_type, acc);
                walk(&inner.body, acc);
            }
            Term::Let(inner) => {
                walk(&inner.binder_type, acc);
                walk(&inner.value, acc);
                walk(&inner.body, acc);
            }
        }
    }
    let mut acc = vec![];
    walk(m, &mut acc);
    acc
}

impl Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (k, decl) in self.decls.iter().enumerate() {
            if k > 0 {
                write!(f, " ")?;
            }
            match &decl.value {
                Some(value) => write!(f, "({} : {} := {})", decl.id, decl.ty, value)?,
                None => write!(f, "({} : {})", decl.id, decl.ty)?,
            }
        }
        Ok(())
    }
}
