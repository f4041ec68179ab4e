// Copyright (c) 2026 XMRT DAO Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Coordination Rules
//!
//! A coordination rule pairs a predicate over a newly created [`Task`] with
//! the agents whose input the task needs. When a rule matches, the task
//! manager spawns one `Coordination: <title>` task per required agent, each
//! depending on the original.
//!
//! Rules are advisory. The spawned review task runs after the original task
//! completes and never holds the original back, including the
//! `security_veto` rule despite its name.

use std::fmt;

use crate::domain::agent::AgentId;
use crate::domain::task::{Specialization, Task};

pub const SECURITY_GUARDIAN: &str = "security_guardian";
pub const COMMUNITY_MANAGER: &str = "community_manager";

pub trait CoordinationRule: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn applies_to(&self, task: &Task) -> bool;

    fn required_agents(&self) -> &[AgentId];
}

type TaskPredicate = Box<dyn Fn(&Task) -> bool + Send + Sync>;

/// Rule built from a closure.
pub struct PredicateRule {
    name: String,
    description: String,
    predicate: TaskPredicate,
    required_agents: Vec<AgentId>,
}

impl PredicateRule {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        required_agents: Vec<AgentId>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&Task) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            predicate: Box::new(predicate),
            required_agents,
        }
    }

    /// Every DeFi task gets a Security Guardian review.
    pub fn security_veto() -> Self {
        Self::new(
            "security_veto",
            "Security Guardian reviews every DeFi operation",
            vec![AgentId::new(SECURITY_GUARDIAN)],
            |task| task.specialization == Specialization::Defi,
        )
    }

    /// Governance decisions are relayed through the Community Manager.
    pub fn governance_community() -> Self {
        Self::new(
            "governance_community",
            "Community Manager communicates every governance decision",
            vec![AgentId::new(COMMUNITY_MANAGER)],
            |task| task.specialization == Specialization::Governance,
        )
    }
}

impl CoordinationRule for PredicateRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn applies_to(&self, task: &Task) -> bool {
        (self.predicate)(task)
    }

    fn required_agents(&self) -> &[AgentId] {
        &self.required_agents
    }
}

impl fmt::Debug for PredicateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateRule")
            .field("name", &self.name)
            .field("required_agents", &self.required_agents)
            .finish()
    }
}

/// A required co-agent selected by a matching rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    pub rule: String,
    pub agent_id: AgentId,
}

/// Ordered set of rules registered at startup.
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn CoordinationRule>>,
}

impl RuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in XMRT rules.
    pub fn standard() -> Self {
        let mut rules = Self::empty();
        rules.register(PredicateRule::security_veto());
        rules.register(PredicateRule::governance_community());
        rules
    }

    pub fn register(&mut self, rule: impl CoordinationRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Required agents for `task`, in rule order, without duplicates.
    pub fn matching(&self, task: &Task) -> Vec<RuleMatch> {
        let mut matches: Vec<RuleMatch> = Vec::new();
        for rule in self.rules.iter().filter(|r| r.applies_to(task)) {
            for agent_id in rule.required_agents() {
                if matches.iter().any(|m| &m.agent_id == agent_id) {
                    continue;
                }
                matches.push(RuleMatch {
                    rule: rule.name().to_string(),
                    agent_id: agent_id.clone(),
                });
            }
        }
        matches
    }

    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{NewTask, TaskPriority};
    use chrono::Utc;

    fn task(specialization: Specialization) -> Task {
        Task::new(NewTask::new("Quarterly review", specialization), Utc::now())
    }

    #[test]
    fn test_security_veto_matches_only_defi() {
        let rule = PredicateRule::security_veto();
        assert!(rule.applies_to(&task(Specialization::Defi)));
        assert!(!rule.applies_to(&task(Specialization::Security)));
        assert!(!rule.applies_to(&task(Specialization::Governance)));
        assert_eq!(rule.required_agents(), &[AgentId::new(SECURITY_GUARDIAN)]);
    }

    #[test]
    fn test_governance_community_matches_only_governance() {
        let rule = PredicateRule::governance_community();
        assert!(rule.applies_to(&task(Specialization::Governance)));
        assert!(!rule.applies_to(&task(Specialization::Community)));
    }

    #[test]
    fn test_standard_rules_yield_single_reviewer_for_defi() {
        let rules = RuleSet::standard();
        let matches = rules.matching(&task(Specialization::Defi));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule, "security_veto");
        assert_eq!(matches[0].agent_id, AgentId::new(SECURITY_GUARDIAN));
    }

    #[test]
    fn test_duplicate_required_agents_collapse() {
        let mut rules = RuleSet::standard();
        rules.register(PredicateRule::new(
            "critical_security",
            "Security reviews critical work",
            vec![AgentId::new(SECURITY_GUARDIAN)],
            |task| task.priority == TaskPriority::Critical,
        ));

        let mut critical_defi = task(Specialization::Defi);
        critical_defi.priority = TaskPriority::Critical;

        let matches = rules.matching(&critical_defi);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].rule, "security_veto");
    }

    #[test]
    fn test_no_rules_match_development() {
        assert!(RuleSet::standard()
            .matching(&task(Specialization::Development))
            .is_empty());
    }
}
