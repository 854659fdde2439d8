//! The validated, immutable RuleSet passed through the detection driver.

use std::collections::BTreeMap;
use std::time::Duration;

use ccp_core::{Severity, Tag};

use crate::schema::{
    BandParams, Gate, MissingPolicy, RateOfChangeParams, RuleDef, RuleSetDocument, RuleType,
    StagnantParams, ThresholdParams,
};
use crate::validation::{validate_document, ValidationResult};

/// Typed detection check of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCheck {
    Threshold(ThresholdParams),
    Band(BandParams),
    RateOfChange(RateOfChangeParams),
    Stagnant(StagnantParams),
}

impl RuleCheck {
    pub fn rule_type(&self) -> RuleType {
        match self {
            RuleCheck::Threshold(_) => RuleType::Threshold,
            RuleCheck::Band(_) => RuleType::Band,
            RuleCheck::RateOfChange(_) => RuleType::RateOfChange,
            RuleCheck::Stagnant(_) => RuleType::Stagnant,
        }
    }

    /// How much point history this check needs to look back over.
    ///
    /// Stagnant rules follow a flat run instead of keeping points.
    pub fn history_span(&self) -> Duration {
        match self {
            RuleCheck::RateOfChange(p) => p.window,
            RuleCheck::Threshold(_) | RuleCheck::Band(_) | RuleCheck::Stagnant(_) => Duration::ZERO,
        }
    }

    /// Parse a rule row's raw `params` for its declared `rule_type`.
    pub(crate) fn from_def(def: &RuleDef) -> Result<Self, String> {
        let missing = || format!("rule type `{}` requires `params`", def.rule_type.as_str());
        let parsed = match def.rule_type {
            RuleType::Threshold => def
                .parse_params::<ThresholdParams>()
                .ok_or_else(missing)?
                .map(RuleCheck::Threshold),
            RuleType::Band => def
                .parse_params::<BandParams>()
                .ok_or_else(missing)?
                .map(RuleCheck::Band),
            RuleType::RateOfChange => def
                .parse_params::<RateOfChangeParams>()
                .ok_or_else(missing)?
                .map(RuleCheck::RateOfChange),
            RuleType::Stagnant => def
                .parse_params::<StagnantParams>()
                .ok_or_else(missing)?
                .map(RuleCheck::Stagnant),
        };
        parsed.map_err(|e| format!("invalid `{}` params: {e}", def.rule_type.as_str()))
    }
}

/// A validated rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub rule_id: String,
    pub tag_id: String,
    pub event_name: String,
    pub check: RuleCheck,
    pub min_duration: Duration,
    pub clear_duration: Duration,
    pub severity: Severity,
    pub process: Option<String>,
    pub category: Option<String>,
    pub epsilon: f64,
    pub on_missing: MissingPolicy,
    pub gates: Vec<Gate>,
}

impl Rule {
    fn compile(def: &RuleDef, check: RuleCheck, default_epsilon: f64, tag: &Tag) -> Self {
        let on_missing = def.on_missing.unwrap_or(match check {
            RuleCheck::Stagnant(_) => MissingPolicy::Violation,
            _ => MissingPolicy::Indeterminate,
        });
        Self {
            rule_id: def.rule_id.clone(),
            tag_id: def.tag_id.clone(),
            event_name: def.event_name.clone(),
            check,
            min_duration: def.min_duration,
            clear_duration: def.clear_duration,
            severity: def.severity,
            process: def.process.clone().or_else(|| tag.process.clone()),
            category: def.category.clone(),
            epsilon: def.epsilon.unwrap_or(default_epsilon),
            on_missing,
            gates: def.gates.clone(),
        }
    }
}

/// Tags and enabled rules, validated and indexed. Immutable for a run.
#[derive(Debug, Clone)]
pub struct RuleSet {
    epsilon: f64,
    tags: BTreeMap<String, Tag>,
    rules: Vec<Rule>,
    by_tag: BTreeMap<String, Vec<usize>>,
}

impl RuleSet {
    /// Validate a parsed document and build the RuleSet.
    ///
    /// Returns the validation result either way so callers can surface
    /// warnings; `Err` carries a result with at least one error.
    pub fn compile(doc: &RuleSetDocument) -> Result<(Self, ValidationResult), ValidationResult> {
        let result = validate_document(doc);
        if !result.valid {
            return Err(result);
        }

        let tags: BTreeMap<String, Tag> = doc
            .tags
            .iter()
            .map(|t| (t.tag_id.clone(), t.clone()))
            .collect();

        let mut rules = Vec::new();
        let mut by_tag: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for def in doc.rules.iter().filter(|d| d.enabled) {
            // validate_document already proved both of these resolve.
            let (Some(tag), Ok(check)) = (tags.get(&def.tag_id), RuleCheck::from_def(def)) else {
                continue;
            };
            by_tag.entry(def.tag_id.clone()).or_default().push(rules.len());
            rules.push(Rule::compile(def, check, doc.epsilon, tag));
        }

        Ok((
            Self {
                epsilon: doc.epsilon,
                tags,
                rules,
                by_tag,
            },
            result,
        ))
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn tag(&self, tag_id: &str) -> Option<&Tag> {
        self.tags.get(tag_id)
    }

    /// All tags in tag_id order.
    pub fn tags(&self) -> impl Iterator<Item = &Tag> {
        self.tags.values()
    }

    pub fn tag_ids(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    /// Enabled rules in document order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, rule_id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    /// Enabled rules watching `tag_id`, in document order.
    pub fn rules_for_tag<'a>(&'a self, tag_id: &str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.by_tag
            .get(tag_id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.rules[i])
    }

    /// Longest look-back any rule on `tag_id` needs.
    pub fn history_span(&self, tag_id: &str) -> Duration {
        self.rules_for_tag(tag_id)
            .map(|r| r.check.history_span())
            .max()
            .unwrap_or(Duration::ZERO)
    }
}
