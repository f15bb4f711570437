//! Matches qualified entity names against include/exclude rule lists,
//! generalizing `prost-build::path::PathMap`'s prefix/suffix
//! matching from "first matching rule wins" to "most specific rule wins,
//! with per-rule used-flags" for dead-configuration diagnostics.

use std::cell::Cell;

/// One parsed rule. Ordering of variants is also specificity order, from
/// least to most specific, matching the tie-break rule below.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum RuleKind {
    Wildcard,
    PackageWildcard(String),
    Type(String),
    Member(String, String),
}

impl RuleKind {
    fn parse(rule: &str) -> RuleKind {
        if rule == "*" {
            return RuleKind::Wildcard;
        }
        if let Some(prefix) = rule.strip_suffix(".*") {
            return RuleKind::PackageWildcard(prefix.to_string());
        }
        if let Some((ty, member)) = rule.split_once('#') {
            return RuleKind::Member(ty.to_string(), member.to_string());
        }
        RuleKind::Type(rule.to_string())
    }

    fn matches(&self, candidate: &str) -> bool {
        match self {
            RuleKind::Wildcard => true,
            RuleKind::PackageWildcard(pkg) => {
                candidate == pkg || candidate.starts_with(&format!("{pkg}."))
            }
            RuleKind::Type(ty) => {
                candidate == ty || candidate.starts_with(&format!("{ty}#"))
            }
            RuleKind::Member(ty, member) => candidate == format!("{ty}#{member}"),
        }
    }

    fn specificity(&self) -> u8 {
        match self {
            RuleKind::Wildcard => 0,
            RuleKind::PackageWildcard(_) => 1,
            RuleKind::Type(_) => 2,
            RuleKind::Member(..) => 3,
        }
    }
}

struct Rule {
    text: String,
    kind: RuleKind,
    used: Cell<bool>,
}

impl Rule {
    fn new(text: &str) -> Rule {
        Rule {
            text: text.to_string(),
            kind: RuleKind::parse(text),
            used: Cell::new(false),
        }
    }
}

/// A compiled pair of include/exclude rule lists.
pub struct IdentifierSet {
    includes: Vec<Rule>,
    excludes: Vec<Rule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Included,
    Excluded,
}

impl IdentifierSet {
    /// Compiles `includes`/`excludes`. Fails with `ConfigError`
    /// when a rule is strictly more specific than another rule that would
    /// still fire with it removed — a rule made permanently redundant by
    /// a broader one already covering the same ground.
    pub fn build(includes: &[String], excludes: &[String]) -> crate::error::Result<IdentifierSet> {
        let set = IdentifierSet {
            includes: includes.iter().map(|r| Rule::new(r)).collect(),
            excludes: excludes.iter().map(|r| Rule::new(r)).collect(),
        };
        set.check_redundancy(&set.includes)?;
        set.check_redundancy(&set.excludes)?;
        Ok(set)
    }

    fn check_redundancy(&self, rules: &[Rule]) -> crate::error::Result<()> {
        for (i, a) in rules.iter().enumerate() {
            for (j, b) in rules.iter().enumerate() {
                if i == j {
                    continue;
                }
                // `a` is redundant if some broader rule `b` subsumes every
                // candidate `a` could ever match.
                if a.kind.specificity() > b.kind.specificity() && subsumes(&b.kind, &a.kind) {
                    return Err(crate::error::Error::Config(format!(
                        "rule '{}' is redundant: '{}' already covers everything it matches",
                        a.text, b.text
                    )));
                }
            }
        }
        Ok(())
    }

    /// Decides whether `name` (a type or `type#member` qualified name) is
    /// included, marking whichever rule fired as used.
    pub fn decide(&self, name: &str) -> Decision {
        if let Some(rule) = most_specific_match(&self.excludes, name) {
            rule.used.set(true);
            return Decision::Excluded;
        }
        if let Some(rule) = most_specific_match(&self.includes, name) {
            rule.used.set(true);
            return Decision::Included;
        }
        Decision::Excluded
    }

    /// Rule strings whose `used` flag never fired.
    pub fn unused_includes(&self) -> Vec<&str> {
        self.includes
            .iter()
            .filter(|r| !r.used.get())
            .map(|r| r.text.as_str())
            .collect()
    }

    pub fn unused_excludes(&self) -> Vec<&str> {
        self.excludes
            .iter()
            .filter(|r| !r.used.get())
            .map(|r| r.text.as_str())
            .collect()
    }
}

fn most_specific_match<'a>(rules: &'a [Rule], name: &str) -> Option<&'a Rule> {
    rules
        .iter()
        .filter(|r| r.kind.matches(name))
        .max_by_key(|r| r.kind.specificity())
}

/// `true` if every name `narrow` could ever match is also matched by `broad`.
fn subsumes(broad: &RuleKind, narrow: &RuleKind) -> bool {
    match (broad, narrow) {
        (RuleKind::Wildcard, _) => true,
        (RuleKind::PackageWildcard(pkg), RuleKind::Type(ty)) => {
            ty == pkg || ty.starts_with(&format!("{pkg}."))
        }
        (RuleKind::PackageWildcard(pkg), RuleKind::Member(ty, _)) => {
            ty == pkg || ty.starts_with(&format!("{pkg}."))
        }
        (RuleKind::PackageWildcard(a), RuleKind::PackageWildcard(b)) => a == b || b.starts_with(&format!("{a}.")),
        (RuleKind::Type(ty), RuleKind::Member(member_ty, _)) => ty == member_ty,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        let set = IdentifierSet::build(&["*".to_string()], &[]).unwrap();
        assert_eq!(set.decide("p.M"), Decision::Included);
    }

    #[test]
    fn package_wildcard_matches_descendants_only() {
        let set = IdentifierSet::build(&["p.*".to_string()], &[]).unwrap();
        assert_eq!(set.decide("p.sub.M"), Decision::Included);
        assert_eq!(set.decide("q.M"), Decision::Excluded);
    }

    #[test]
    fn member_rule_excludes_other_members_of_same_type() {
        let set = IdentifierSet::build(
            &["p.M#field_a".to_string()],
            &[],
        )
        .unwrap();
        assert_eq!(set.decide("p.M#field_a"), Decision::Included);
        assert_eq!(set.decide("p.M#field_b"), Decision::Excluded);
    }

    #[test]
    fn exclude_beats_include_at_equal_specificity() {
        let set = IdentifierSet::build(&["p.M".to_string()], &["p.M".to_string()]).unwrap();
        assert_eq!(set.decide("p.M"), Decision::Excluded);
    }

    #[test]
    fn more_specific_include_wins_over_wildcard_exclude() {
        let set = IdentifierSet::build(&["p.M".to_string()], &["q.*".to_string()]).unwrap();
        assert_eq!(set.decide("p.M"), Decision::Included);
    }

    #[test]
    fn redundant_rule_is_rejected() {
        let err = IdentifierSet::build(&["p.*".to_string(), "p.M".to_string()], &[]).unwrap_err();
        assert!(matches!(err, crate::error::Error::Config(_)));
    }

    #[test]
    fn unused_rule_is_tracked() {
        let set = IdentifierSet::build(&["p.M".to_string()], &[]).unwrap();
        assert_eq!(set.unused_includes(), vec!["p.M"]);
        set.decide("p.M");
        assert!(set.unused_includes().is_empty());
    }
}
