//! Rule row checks: identity, tag references, typed parameters, gates.

use std::collections::HashSet;

use crate::ruleset::RuleCheck;
use crate::schema::{RuleDef, RuleSetDocument};

use super::fuzzy::{is_kebab_case, suggest};
use super::ValidationResult;

pub(crate) fn validate_rules(doc: &RuleSetDocument, result: &mut ValidationResult) {
    let tag_ids: Vec<&str> = doc.tags.iter().map(|t| t.tag_id.as_str()).collect();
    let mut seen = HashSet::new();

    for (i, rule) in doc.rules.iter().enumerate() {
        let path = format!("rules[{i}]");

        if rule.rule_id.trim().is_empty() {
            result.error(format!("{path}.rule_id"), "rule_id must not be empty");
        } else {
            if !seen.insert(rule.rule_id.as_str()) {
                result.error(
                    format!("{path}.rule_id"),
                    format!("duplicate rule_id `{}`", rule.rule_id),
                );
            }
            if !is_kebab_case(&rule.rule_id) {
                result.warn(
                    format!("{path}.rule_id"),
                    format!("rule_id `{}` is not kebab-case", rule.rule_id),
                );
            }
        }

        if rule.event_name.trim().is_empty() {
            result.error(format!("{path}.event_name"), "event_name must not be empty");
        }

        check_tag_ref(&tag_ids, &rule.tag_id, &format!("{path}.tag_id"), result);
        result.check_duration(format!("{path}.min_duration"), rule.min_duration);
        result.check_duration(format!("{path}.clear_duration"), rule.clear_duration);

        match RuleCheck::from_def(rule) {
            Ok(check) => validate_check(&check, &path, result),
            Err(message) => result.error(format!("{path}.params"), message),
        }

        if let Some(eps) = rule.epsilon {
            if !eps.is_finite() || eps < 0.0 {
                result.error(format!("{path}.epsilon"), "must be a finite, non-negative number");
            }
        }

        validate_gates(rule, &tag_ids, &path, result);

        if !rule.enabled {
            result.warn(path, format!("rule `{}` is disabled", rule.rule_id));
        }
    }
}

fn check_tag_ref(tag_ids: &[&str], tag_id: &str, path: &str, result: &mut ValidationResult) {
    if tag_ids.contains(&tag_id) {
        return;
    }
    let message = format!("unknown tag `{tag_id}`");
    match suggest(tag_id, tag_ids) {
        Some(suggestion) => result.error_with_suggestion(path, message, suggestion),
        None => result.error(path, message),
    }
}

fn validate_check(check: &RuleCheck, path: &str, result: &mut ValidationResult) {
    match check {
        RuleCheck::Threshold(p) => {
            if !p.limit.is_finite() {
                result.error(format!("{path}.params.limit"), "limit must be finite");
            }
        }
        RuleCheck::Band(p) => match (p.low, p.high) {
            (None, None) => {
                result.error(format!("{path}.params"), "band needs at least one of `low` or `high`")
            }
            (Some(low), Some(high)) if low > high => result.error(
                format!("{path}.params"),
                format!("band low {low} is greater than high {high}"),
            ),
            _ => {}
        },
        RuleCheck::RateOfChange(p) => {
            result.check_duration(format!("{path}.params.window"), p.window);
            result.check_duration(format!("{path}.params.per"), p.per);
            if p.window.is_zero() {
                result.error(format!("{path}.params.window"), "window must be greater than zero");
            }
            if p.per.is_zero() {
                result.error(format!("{path}.params.per"), "per must be greater than zero");
            }
            if !p.max_rate.is_finite() || p.max_rate < 0.0 {
                result.error(
                    format!("{path}.params.max_rate"),
                    "max_rate must be a finite, non-negative number",
                );
            }
        }
        RuleCheck::Stagnant(p) => {
            result.check_duration(format!("{path}.params.span"), p.span);
            if p.span.is_zero() {
                result.error(format!("{path}.params.span"), "span must be greater than zero");
            }
        }
    }
}

fn validate_gates(rule: &RuleDef, tag_ids: &[&str], path: &str, result: &mut ValidationResult) {
    for (j, gate) in rule.gates.iter().enumerate() {
        let gate_path = format!("{path}.gates[{j}]");
        check_tag_ref(tag_ids, &gate.tag_id, &format!("{gate_path}.tag_id"), result);
        if gate.tag_id == rule.tag_id {
            result.warn(gate_path.clone(), "rule is gated on its own tag");
        }
        if !gate.equals.is_finite() {
            result.error(format!("{gate_path}.equals"), "equals must be finite");
        }
    }
}
