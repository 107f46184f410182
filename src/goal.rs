//! The goal store.
//!
//! A goal is a metavariable: a hole id owning one local context and one
//! target type. The store is the single logical writer of the elaboration
//! session; speculative steps take a whole-value [Snapshot] and restore it
//! on failure.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;

use thiserror::Error;

use crate::tt::{Context, Id, Term};

#[derive(Debug, Clone)]
pub struct Goal {
    pub context: Context,
    pub target: Term,
}

impl Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.context.decls.is_empty() {
            write!(f, "{} ", self.context)?;
        }
        write!(f, "⊢ {}", self.target)
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("unknown goal ?{0}")]
    UnknownGoal(Id),
    #[error("goal ?{0} is already assigned")]
    AlreadyAssigned(Id),
}

#[derive(Debug, Clone)]
struct Entry {
    goal: Goal,
    assignment: Option<Term>,
}

#[derive(Debug, Clone, Default)]
pub struct Store {
    entries: HashMap<Id, Entry>,
}

/// A whole-value checkpoint of the store.
#[derive(Debug)]
pub struct Snapshot(Store);

impl Store {
    pub fn new() -> Store {
        Store::default()
    }

    pub fn fresh_goal(&mut self, context: Context, target: Term) -> Id {
        let id = Id::fresh();
        self.entries.insert(
            id,
            Entry {
                goal: Goal { context, target },
                assignment: None,
            },
        );
        id
    }

    pub fn goal(&self, id: Id) -> Result<&Goal, StoreError> {
        self.entries
            .get(&id)
            .map(|entry| &entry.goal)
            .ok_or(StoreError::UnknownGoal(id))
    }

    pub fn assignment(&self, id: Id) -> Option<&Term> {
        self.entries
            .get(&id)
            .and_then(|entry| entry.assignment.as_ref())
    }

    pub fn is_assigned(&self, id: Id) -> bool {
        self.assignment(id).is_some()
    }

    /// Assigns a goal exactly once. A second assignment is a programming
    /// error, not a recoverable condition.
    pub fn assign(&mut self, id: Id, m: Term) -> Result<(), StoreError> {
        let entry = self.entries.get_mut(&id).ok_or(StoreError::UnknownGoal(id))?;
        if entry.assignment.is_some() {
            return Err(StoreError::AlreadyAssigned(id));
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(target: "wari::goal", "assign ?{} := {}", id, m);
        }
        entry.assignment = Some(m);
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot(self.clone())
    }

    pub fn restore(&mut self, snapshot: Snapshot) {
        *self = snapshot.0;
    }

    /// Deeply replaces assigned holes in `m`.
    pub fn instantiate(&self, m: &Term) -> Term {
        m.replace_hole(&|id| self.assignment(id).cloned())
    }

    /// Deep, binder-aware occurrence check of the free local `x` in `m`,
    /// looking through hole assignments. Explicit work stack with an
    /// identity-keyed visited cache so shared subtrees are scanned once.
    pub fn occurs(&self, x: Id, m: &Term) -> bool {
        let mut stack: Vec<Term> = vec![m.clone()];
        let mut visited: HashSet<usize> = HashSet::new();
        while let Some(m) = stack.pop() {
            let metadata = m.metadata();
            if metadata.is_closed && !metadata.has_hole {
                continue;
            }
            if !visited.insert(ptr_key(&m)) {
                continue;
            }
            match &m {
                Term::Local(inner) => {
                    if inner.id == x {
                        return true;
                    }
                }
                Term::Var(_) | Term::Const(_) => {}
                Term::Hole(inner) => {
                    if let Some(assignment) = self.assignment(inner.id) {
                        stack.push(assignment.clone());
                    }
                }
                Term::App(inner) => {
                    stack.push(inner.fun.clone());
                    stack.push(inner.arg.clone());
                }
                Term::Abs(inner) => {
                    stack.push(inner.binder_type.clone());
                    stack.push(inner.body.clone());
                }
                Term::Pi(inner) => {
                    stack.push(inner.binder_type.clone());
                    stack.push(inner.body.clone());
                }
                Term::Let(inner) => {
                    stack.push(inner.binder_type.clone());
                    stack.push(inner.value.clone());
                    stack.push(inner.body.clone());
                }
            }
        }
        false
    }
}

fn ptr_key(m: &Term) -> usize {
    match m {
        Term::Var(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Local(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Hole(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Const(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::App(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Abs(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Pi(inner) => std::sync::Arc::as_ptr(inner) as usize,
        Term::Let(inner) => std::sync::Arc::as_ptr(inner) as usize,
    }
}

/// An insertion-ordered free-variable replacement map. Never mutated in
/// place: each elimination step extends a copy.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    map: Vec<(Id, Term)>,
}

impl Subst {
    pub fn get(&self, id: Id) -> Option<&Term> {
        self.map.iter().find(|(x, _)| *x == id).map(|(_, m)| m)
    }

    pub fn domain(&self) -> impl Iterator<Item = Id> + '_ {
        self.map.iter().map(|(x, _)| *x)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns a copy extended with `x := m`; earlier entries are rewritten
    /// so the map stays idempotent.
    pub fn extended(&self, x: Id, m: Term) -> Subst {
        let mut map: Vec<(Id, Term)> = self
            .map
            .iter()
            .map(|(y, n)| (*y, n.subst(&[(x, m.clone())])))
            .collect();
        map.push((x, m));
        Subst { map }
    }

    pub fn apply(&self, m: &Term) -> Term {
        m.subst(&self.map)
    }
}

impl Display for Subst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (k, (x, m)) in self.map.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ↦ {}", x, m)?;
        }
        write!(f, "}}")
    }
}
