//! Property name -> spoofed value

use crate::config::{Config, OverrideRule};

/// Find the rule that applies to `name`, if any.
///
/// A literal rule for `name` always wins. Otherwise the first prefix rule, in
/// declaration order, that `name` starts with.
pub fn lookup<'a>(name: &str, config: &'a Config) -> Option<&'a OverrideRule> {
    config.rules.literal(name).or_else(|| {
        config
            .rules
            .prefixes()
            .find(|rule| rule.pattern().matches(name))
    })
}

/// The value a read of `name` should observe, given it originally read `original`.
pub fn resolve<'a>(name: &str, original: &'a str, config: &'a Config) -> &'a str {
    lookup(name, config).map_or(original, OverrideRule::value_str)
}
