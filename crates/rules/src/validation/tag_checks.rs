//! Tag table checks: identity, staleness timeout, usage.

use std::collections::HashSet;

use ccp_core::duration::format_duration;

use crate::schema::RuleSetDocument;

use super::ValidationResult;

pub(crate) fn validate_tags(doc: &RuleSetDocument, result: &mut ValidationResult) {
    if doc.tags.is_empty() {
        result.warn("tags", "no tags defined; nothing will be monitored");
        return;
    }

    let used: HashSet<&str> = doc
        .rules
        .iter()
        .filter(|r| r.enabled)
        .flat_map(|r| {
            std::iter::once(r.tag_id.as_str()).chain(r.gates.iter().map(|g| g.tag_id.as_str()))
        })
        .collect();

    let mut seen = HashSet::new();
    for (i, tag) in doc.tags.iter().enumerate() {
        let path = format!("tags[{i}]");

        if tag.tag_id.trim().is_empty() {
            result.error(format!("{path}.tag_id"), "tag_id must not be empty");
            continue;
        }
        if !seen.insert(tag.tag_id.as_str()) {
            result.error(
                format!("{path}.tag_id"),
                format!("duplicate tag_id `{}`", tag.tag_id),
            );
        }

        result.check_duration(format!("{path}.staleness_timeout"), tag.staleness_timeout);
        result.check_duration(format!("{path}.sample_interval"), tag.sample_interval);

        if tag.staleness_timeout.is_zero() {
            result.error(
                format!("{path}.staleness_timeout"),
                "staleness_timeout must be greater than zero",
            );
        } else if tag.sample_interval > tag.staleness_timeout {
            result.warn(
                format!("{path}.sample_interval"),
                format!(
                    "sample_interval {} exceeds staleness_timeout {}; the tag will look stale between every update",
                    format_duration(tag.sample_interval),
                    format_duration(tag.staleness_timeout)
                ),
            );
        }

        if !used.contains(tag.tag_id.as_str()) {
            result.warn(path, format!("tag `{}` is not used by any enabled rule", tag.tag_id));
        }
    }
}
