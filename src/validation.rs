//! Structural validation of chart models.
//!
//! Validation is a linear pass producing diagnostics; it never halts
//! compilation. Findings are returned to the caller and mirrored through
//! the `log` facade (`warn` / `error`).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{GuardKind, PseudoStateKind, StateChart, TransitionId, TransitionKind, VertexId};

/// How serious a finding is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// The model is suspicious but runnable.
    Warning,
    /// The model breaches a structural rule; runtime behavior is undefined
    /// for the affected elements.
    Error,
}

/// One validation finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Finding severity.
    pub severity: Severity,
    /// Qualified name of the offending element.
    pub element: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.element, self.message)
    }
}

fn warning(issues: &mut Vec<ValidationIssue>, element: String, message: impl Into<String>) {
    issues.push(ValidationIssue {
        severity: Severity::Warning,
        element,
        message: message.into(),
    });
}

fn error(issues: &mut Vec<ValidationIssue>, element: String, message: impl Into<String>) {
    issues.push(ValidationIssue {
        severity: Severity::Error,
        element,
        message: message.into(),
    });
}

/// Validate a chart's structure.
pub fn validate<M>(chart: &StateChart<M>) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_regions(chart, &mut issues);
    check_states(chart, &mut issues);
    check_pseudostates(chart, &mut issues);
    check_transitions(chart, &mut issues);
    check_reachability(chart, &mut issues);

    for issue in &issues {
        match issue.severity {
            Severity::Warning => log::warn!("{}", issue),
            Severity::Error => log::error!("{}", issue),
        }
    }
    issues
}

fn check_regions<M>(chart: &StateChart<M>, issues: &mut Vec<ValidationIssue>) {
    for region in chart.live_region_ids() {
        let mut per_kind: HashMap<PseudoStateKind, usize> = HashMap::new();
        for &vertex in chart.vertices_of(region) {
            if let Some(kind) = chart.pseudo_kind(vertex).filter(|kind| kind.is_initial()) {
                *per_kind.entry(kind).or_insert(0) += 1;
            }
        }
        for (kind, count) in &per_kind {
            if *count > 1 {
                error(
                    issues,
                    chart.region_qualified_name(region).to_string(),
                    format!(
                        "region has {} {} pseudo states; the first discovered is used",
                        count, kind
                    ),
                );
            }
        }
        if per_kind.is_empty() {
            warning(
                issues,
                chart.region_qualified_name(region).to_string(),
                "region has no initial pseudo state; implicit entry finds nothing to enter",
            );
        }
    }
}

fn check_states<M>(chart: &StateChart<M>, issues: &mut Vec<ValidationIssue>) {
    for vertex in chart.live_vertex_ids() {
        if !chart.is_state(vertex) {
            continue;
        }
        if chart.is_final_state(vertex) && !chart.outgoing(vertex).is_empty() {
            error(
                issues,
                chart.qualified_name(vertex).to_string(),
                "final state has outgoing transitions",
            );
        }
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for &region in chart.regions_of(vertex) {
            *name_counts.entry(chart.region_name(region)).or_insert(0) += 1;
        }
        for (name, count) in name_counts {
            if count > 1 {
                error(
                    issues,
                    chart.qualified_name(vertex).to_string(),
                    format!("state has {} regions named '{}'", count, name),
                );
            }
        }
    }
}

fn check_pseudostates<M>(chart: &StateChart<M>, issues: &mut Vec<ValidationIssue>) {
    for vertex in chart.live_vertex_ids() {
        let kind = match chart.pseudo_kind(vertex) {
            Some(kind) => kind,
            None => continue,
        };
        if kind.is_initial() {
            let outgoing = chart.outgoing(vertex);
            if outgoing.len() != 1 {
                error(
                    issues,
                    chart.qualified_name(vertex).to_string(),
                    format!(
                        "initial pseudo state must have exactly one outgoing transition, found {}",
                        outgoing.len()
                    ),
                );
            }
            for &transition in outgoing {
                if !matches!(transition_guard(chart, transition), GuardKind::Always) {
                    error(
                        issues,
                        chart.qualified_name(vertex).to_string(),
                        "initial transition may not carry a guard",
                    );
                }
            }
        }
        let branches = matches!(kind, PseudoStateKind::Choice | PseudoStateKind::Junction);
        let else_count = chart
            .outgoing(vertex)
            .iter()
            .filter(|&&transition| transition_guard(chart, transition).is_else())
            .count();
        if branches && else_count > 1 {
            error(
                issues,
                chart.qualified_name(vertex).to_string(),
                format!("at most one else transition is allowed, found {}", else_count),
            );
        }
    }
}

fn check_transitions<M>(chart: &StateChart<M>, issues: &mut Vec<ValidationIssue>) {
    for transition in chart.live_transition_ids() {
        let source = chart.transition_source(transition);
        if transition_guard(chart, transition).is_else()
            && !matches!(
                chart.pseudo_kind(source),
                Some(PseudoStateKind::Choice) | Some(PseudoStateKind::Junction)
            )
        {
            error(
                issues,
                chart.qualified_name(source).to_string(),
                "else transitions are only permitted from choice or junction pseudo states",
            );
        }
        if chart.transition_kind(transition) == TransitionKind::Local {
            if let Some(target) = chart.transition_target(transition) {
                let descendant =
                    target != source && chart.ancestry(target).contains(&source);
                if !descendant {
                    error(
                        issues,
                        chart.qualified_name(source).to_string(),
                        format!(
                            "local transition target '{}' is not a descendant of its source",
                            chart.qualified_name(target)
                        ),
                    );
                }
            }
        }
    }
}

fn check_reachability<M>(chart: &StateChart<M>, issues: &mut Vec<ValidationIssue>) {
    // Incoming transitions are a derived index; build it transiently here,
    // the only place that needs it.
    let mut incoming: HashMap<VertexId, Vec<TransitionId>> = HashMap::new();
    for transition in chart.live_transition_ids() {
        if let Some(target) = chart.transition_target(transition) {
            incoming.entry(target).or_default().push(transition);
        }
    }
    for vertex in chart.live_vertex_ids() {
        if chart.parent_region(vertex).is_none() {
            continue;
        }
        if chart
            .pseudo_kind(vertex)
            .map_or(false, PseudoStateKind::is_initial)
        {
            continue;
        }
        if !incoming.contains_key(&vertex) {
            warning(
                issues,
                chart.qualified_name(vertex).to_string(),
                "vertex has no incoming transitions",
            );
        }
    }
}

fn transition_guard<M>(chart: &StateChart<M>, transition: TransitionId) -> &GuardKind<M> {
    &chart.transitions[transition.0].guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PseudoStateKind, StateChart};

    fn errors(issues: &[ValidationIssue]) -> Vec<&ValidationIssue> {
        issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .collect()
    }

    #[test]
    fn test_clean_chart_has_no_errors() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(initial).to(idle).build().unwrap();

        let issues = validate(&chart);
        assert!(errors(&issues).is_empty(), "unexpected: {:?}", issues);
    }

    #[test]
    fn test_multiple_initials_reported() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let first = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        chart
            .add_pseudostate(region, "spare", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(first).to(idle).build().unwrap();

        let issues = validate(&chart);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("2 initial pseudo states")));
    }

    #[test]
    fn test_initial_and_history_may_coexist() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let history = chart
            .add_pseudostate(region, "history", PseudoStateKind::ShallowHistory)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(initial).to(idle).build().unwrap();
        chart.transition(history).to(idle).build().unwrap();

        let issues = validate(&chart);
        assert!(errors(&issues).is_empty(), "unexpected: {:?}", issues);
    }

    #[test]
    fn test_final_state_with_outgoing_reported() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let done = chart.add_final_state(region, "done").unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.transition(initial).to(idle).build().unwrap();
        chart.transition(done).to(idle).build().unwrap();

        let issues = validate(&chart);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("final state has outgoing")));
    }

    #[test]
    fn test_guarded_initial_transition_reported() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart
            .transition(initial)
            .to(idle)
            .when(|_, _| true)
            .build()
            .unwrap();

        let issues = validate(&chart);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("may not carry a guard")));
    }

    #[test]
    fn test_non_descendant_local_target_reported() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let a = chart.add_state(region, "a").unwrap();
        let b = chart.add_state(region, "b").unwrap();
        chart.transition(initial).to(a).build().unwrap();
        chart
            .transition(a)
            .local(b)
            .when(|m, _| *m == "go")
            .build()
            .unwrap();

        let issues = validate(&chart);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("not a descendant")));
    }

    #[test]
    fn test_else_outside_branch_reported() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let a = chart.add_state(region, "a").unwrap();
        let b = chart.add_state(region, "b").unwrap();
        chart.transition(initial).to(a).build().unwrap();
        chart.transition(a).to(b).otherwise().build().unwrap();

        let issues = validate(&chart);
        assert!(issues
            .iter()
            .any(|issue| issue.message.contains("only permitted from choice or junction")));
    }

    #[test]
    fn test_unreachable_vertex_warned() {
        let mut chart = StateChart::<&str>::new("machine");
        let region = chart.default_region(chart.root()).unwrap();
        let initial = chart
            .add_pseudostate(region, "initial", PseudoStateKind::Initial)
            .unwrap();
        let idle = chart.add_state(region, "idle").unwrap();
        chart.add_state(region, "orphan").unwrap();
        chart.transition(initial).to(idle).build().unwrap();

        let issues = validate(&chart);
        assert!(issues.iter().any(|issue| {
            issue.severity == Severity::Warning
                && issue.element.ends_with("orphan")
                && issue.message.contains("no incoming")
        }));
    }
}
