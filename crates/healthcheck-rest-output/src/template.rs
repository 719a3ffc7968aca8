// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destination URL templates.
//!
//! A template such as `https://collector/{watcher_name}/{status}` is resolved
//! per event against a [`SubstitutionContext`]. Placeholders without a value
//! in the context stay in the URL verbatim.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

pub const WATCHER_NAME: &str = "watcher_name";
pub const OUTPUT_SLUG: &str = "output_slug";
pub const STATUS: &str = "status";

/// Status value substituted for a check that failed. A passed check
/// substitutes the empty string; downstream templates rely on the asymmetry.
pub const STATUS_FAILED: &str = "fail";
pub const STATUS_PASSED: &str = "";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("placeholder pattern is valid")
    })
}

/// Per-event placeholder values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionContext {
    values: HashMap<String, String>,
}

impl SubstitutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for one health-check event. A missing output slug resolves to
    /// the empty string.
    pub fn for_event(watcher_name: &str, output_slug: Option<&str>, checks_passed: bool) -> Self {
        let mut context = Self::new();
        context.insert(WATCHER_NAME, watcher_name);
        context.insert(OUTPUT_SLUG, output_slug.unwrap_or_default());
        context.insert(
            STATUS,
            if checks_passed {
                STATUS_PASSED
            } else {
                STATUS_FAILED
            },
        );
        context
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SubstitutionContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = Self::new();
        for (name, value) in iter {
            context.insert(name, value);
        }
        context
    }
}

/// Substitutes `{name}` placeholders and strips trailing `/` from the result.
///
/// Substituted values are not scanned again, so a value that itself looks
/// like a placeholder is inserted literally.
pub fn resolve(template: &str, context: &SubstitutionContext) -> String {
    let substituted = placeholder_regex().replace_all(template, |caps: &Captures<'_>| {
        match context.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        }
    });
    substituted.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&str, &str)]) -> SubstitutionContext {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_resolve_leaves_unmatched_placeholder() {
        assert_eq!(
            resolve("http://x/{a}/{b}", &context(&[("a", "1")])),
            "http://x/1/{b}"
        );
    }

    #[test]
    fn test_resolve_strips_trailing_separator() {
        assert_eq!(resolve("http://x/{a}/", &context(&[("a", "")])), "http://x");
        assert_eq!(resolve("http://x/path///", &context(&[])), "http://x/path");
    }

    #[test]
    fn test_resolve_repeated_placeholder() {
        assert_eq!(
            resolve("http://x/{a}/{a}?q={a}", &context(&[("a", "v")])),
            "http://x/v/v?q=v"
        );
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        assert_eq!(
            resolve("http://x/{A}/{a}", &context(&[("a", "lower")])),
            "http://x/{A}/lower"
        );
    }

    #[test]
    fn test_resolve_does_not_expand_substituted_values() {
        assert_eq!(
            resolve("http://x/{a}", &context(&[("a", "{b}"), ("b", "nope")])),
            "http://x/{b}"
        );
    }

    #[test]
    fn test_resolve_leaves_malformed_braces_alone() {
        let ctx = context(&[("a", "1")]);
        assert_eq!(resolve("http://x/{}/{a", &ctx), "http://x/{}/{a");
        assert_eq!(resolve("http://x/{{a}}", &ctx), "http://x/{1}");
        assert_eq!(resolve("http://x/{a b}", &ctx), "http://x/{a b}");
    }

    #[test]
    fn test_resolve_without_placeholders() {
        assert_eq!(
            resolve("https://collector.local:8443/ingest", &SubstitutionContext::new()),
            "https://collector.local:8443/ingest"
        );
    }

    #[test]
    fn test_for_event_status_asymmetry() {
        let passed = SubstitutionContext::for_event("disk", Some("prod"), true);
        assert_eq!(passed.get(STATUS), Some(""));
        assert_eq!(passed.get(WATCHER_NAME), Some("disk"));
        assert_eq!(passed.get(OUTPUT_SLUG), Some("prod"));

        let failed = SubstitutionContext::for_event("disk", None, false);
        assert_eq!(failed.get(STATUS), Some("fail"));
        assert_eq!(failed.get(OUTPUT_SLUG), Some(""));
    }

    #[test]
    fn test_for_event_resolves_full_template() {
        let template = "https://c/{output_slug}/{watcher_name}/{status}";
        assert_eq!(
            resolve(
                template,
                &SubstitutionContext::for_event("disk", Some("prod"), false)
            ),
            "https://c/prod/disk/fail"
        );
        assert_eq!(
            resolve(
                template,
                &SubstitutionContext::for_event("disk", Some("prod"), true)
            ),
            "https://c/prod/disk"
        );
    }
}
