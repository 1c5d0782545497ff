//! Stage definitions: which roles take part in a run and what each one waits for.
//!
//! A definition is validated once when it is built (unknown dependencies, duplicates,
//! self-edges and cycles are rejected), so the scheduler can treat it as a DAG.

use crate::model::Role;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;

/// One role and the roles whose reports it consumes, in the order it receives them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpec {
    pub role: Role,
    #[serde(default)]
    pub depends_on: Vec<Role>,
}

impl StageSpec {
    pub fn new(role: Role, depends_on: impl IntoIterator<Item = Role>) -> Self {
        let mut seen = BTreeSet::new();
        let depends_on = depends_on
            .into_iter()
            .filter(|dep| seen.insert(*dep))
            .collect();
        Self { role, depends_on }
    }
}

/// Built-in topologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// context, then strategy and risk in parallel, creative after strategy.
    Reference,
    /// context → strategy → risk → creative.
    Linear,
    /// context, then every other role in parallel.
    FanOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDefinition {
    specs: Vec<StageSpec>,
}

impl StageDefinition {
    pub fn new(specs: Vec<StageSpec>) -> Result<Self> {
        let specs = specs
            .into_iter()
            .map(|s| StageSpec::new(s.role, s.depends_on))
            .collect();
        let def = Self { specs };
        def.validate()?;
        Ok(def)
    }

    pub fn builtin(topology: Topology) -> Self {
        let specs = match topology {
            Topology::Reference => vec![
                StageSpec::new(Role::Context, []),
                StageSpec::new(Role::Strategy, [Role::Context]),
                StageSpec::new(Role::Risk, [Role::Context]),
                StageSpec::new(Role::Creative, [Role::Context, Role::Strategy]),
            ],
            Topology::Linear => vec![
                StageSpec::new(Role::Context, []),
                StageSpec::new(Role::Strategy, [Role::Context]),
                StageSpec::new(Role::Risk, [Role::Strategy]),
                StageSpec::new(Role::Creative, [Role::Risk]),
            ],
            Topology::FanOut => vec![
                StageSpec::new(Role::Context, []),
                StageSpec::new(Role::Strategy, [Role::Context]),
                StageSpec::new(Role::Risk, [Role::Context]),
                StageSpec::new(Role::Creative, [Role::Context]),
            ],
        };
        Self { specs }
    }

    /// Skips validation so tests can hand the scheduler a broken definition.
    #[cfg(test)]
    pub(crate) fn unchecked(specs: Vec<StageSpec>) -> Self {
        Self { specs }
    }

    pub fn reference() -> Self {
        Self::builtin(Topology::Reference)
    }

    pub fn linear() -> Self {
        Self::builtin(Topology::Linear)
    }

    pub fn fan_out() -> Self {
        Self::builtin(Topology::FanOut)
    }

    /// Load a definition from a JSON array of `{"role": ..., "depends_on": [...]}`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read stage definition {}", path.display()))?;
        let specs: Vec<StageSpec> = serde_json::from_str(&raw)
            .with_context(|| format!("parse stage definition {}", path.display()))?;
        Self::new(specs).with_context(|| format!("invalid stage definition {}", path.display()))
    }

    pub fn specs(&self) -> &[StageSpec] {
        &self.specs
    }

    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.specs.iter().map(|s| s.role)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check the definition is a DAG over declared roles.
    pub fn validate(&self) -> Result<()> {
        if self.specs.is_empty() {
            bail!("stage definition declares no stages");
        }
        let mut declared = BTreeSet::new();
        for spec in &self.specs {
            if !declared.insert(spec.role) {
                bail!("role '{}' is declared more than once", spec.role);
            }
        }
        for spec in &self.specs {
            for dep in &spec.depends_on {
                if *dep == spec.role {
                    bail!("role '{}' depends on itself", spec.role);
                }
                if !declared.contains(dep) {
                    bail!(
                        "role '{}' depends on '{}', which is not part of the definition",
                        spec.role,
                        dep
                    );
                }
            }
        }
        let order = self.kahn_order();
        if order.len() != self.specs.len() {
            let stuck: Vec<String> = self
                .roles()
                .filter(|r| !order.contains(r))
                .map(|r| r.to_string())
                .collect();
            bail!("dependency cycle between roles: {}", stuck.join(", "));
        }
        Ok(())
    }

    /// Roles in an order where every role follows all of its dependencies.
    pub fn topo_order(&self) -> Vec<Role> {
        self.kahn_order()
    }

    /// Kahn's algorithm; ties resolve in declaration order. Roles caught in a cycle are left out.
    fn kahn_order(&self) -> Vec<Role> {
        let position: BTreeMap<Role, usize> = self
            .specs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.role, i))
            .collect();
        let mut in_degree: BTreeMap<Role, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<Role, Vec<Role>> = BTreeMap::new();
        for spec in &self.specs {
            let known = spec
                .depends_on
                .iter()
                .filter(|d| position.contains_key(d))
                .count();
            in_degree.insert(spec.role, known);
            for dep in &spec.depends_on {
                dependents.entry(*dep).or_default().push(spec.role);
            }
        }

        let mut queue: VecDeque<Role> = self
            .specs
            .iter()
            .filter(|s| in_degree.get(&s.role) == Some(&0))
            .map(|s| s.role)
            .collect();
        let mut order = Vec::with_capacity(self.specs.len());
        while let Some(role) = queue.pop_front() {
            order.push(role);
            let mut unlocked = Vec::new();
            for next in dependents.get(&role).map(Vec::as_slice).unwrap_or_default() {
                if let Some(d) = in_degree.get_mut(next) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        unlocked.push(*next);
                    }
                }
            }
            unlocked.sort_by_key(|r| position.get(r).copied().unwrap_or(usize::MAX));
            queue.extend(unlocked);
        }
        order
    }
}
