//! Visibility and identity policy
//!
//! Supplies the id ranges the coalescer rewrites through and the two
//! hidden-identity sets the ranking stage and read API honor. Kept behind
//! a trait so hosts can plug in their own rules; `StaticPolicy` is the
//! config-backed implementation used by the daemon and demo.

use crate::core::PolicyConfig;
use std::collections::HashSet;

/// Policy consulted by the coalescer and the ranking stage
pub trait UsagePolicy {
    /// Identity keys never shown, not even in the show-all view
    fn is_hidden_always(&self, identity_key: &str) -> bool;

    /// Identity keys hidden from the default view only
    fn is_hidden_by_default(&self, identity_key: &str) -> bool;

    /// Inclusive uid range of OS services that collapse together
    fn os_reserved_range(&self) -> (i64, i64);

    /// The uid the collapsed OS services are attributed to
    fn os_system_id(&self) -> i64;

    /// Inclusive uid range of synthetic shared-group ids
    fn shared_gid_range(&self) -> (i64, i64);

    /// Package hints that stay separate despite an OS-range uid
    fn is_excluded_service(&self, package_hint: &str) -> bool;
}

/// Policy backed by the loaded configuration
pub struct StaticPolicy {
    hidden_always: HashSet<String>,
    hidden_by_default: HashSet<String>,
    excluded_services: HashSet<String>,
    os_reserved_id_min: i64,
    os_reserved_id_max: i64,
    os_system_id: i64,
    shared_gid_start: i64,
    shared_gid_end: i64,
}

impl StaticPolicy {
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            hidden_always: config.hidden_always.iter().cloned().collect(),
            hidden_by_default: config.hidden_by_default.iter().cloned().collect(),
            excluded_services: config.excluded_services.iter().cloned().collect(),
            os_reserved_id_min: config.os_reserved_id_min,
            os_reserved_id_max: config.os_reserved_id_max,
            os_system_id: config.os_system_id,
            shared_gid_start: config.shared_gid_start,
            shared_gid_end: config.shared_gid_end,
        }
    }
}

impl Default for StaticPolicy {
    fn default() -> Self {
        Self::new(&PolicyConfig::default())
    }
}

impl UsagePolicy for StaticPolicy {
    fn is_hidden_always(&self, identity_key: &str) -> bool {
        self.hidden_always.contains(identity_key)
    }

    fn is_hidden_by_default(&self, identity_key: &str) -> bool {
        self.hidden_by_default.contains(identity_key)
    }

    fn os_reserved_range(&self) -> (i64, i64) {
        (self.os_reserved_id_min, self.os_reserved_id_max)
    }

    fn os_system_id(&self) -> i64 {
        self.os_system_id
    }

    fn shared_gid_range(&self) -> (i64, i64) {
        (self.shared_gid_start, self.shared_gid_end)
    }

    fn is_excluded_service(&self, package_hint: &str) -> bool {
        self.excluded_services.contains(package_hint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PolicyConfig;

    #[test]
    fn test_default_policy_ranges() {
        let policy = StaticPolicy::default();
        assert_eq!(policy.os_reserved_range(), (0, 1_000));
        assert_eq!(policy.os_system_id(), 1_000);
        assert_eq!(policy.shared_gid_range(), (97_000, 99_999));
        assert!(policy.is_excluded_service("mediaserver"));
        assert!(!policy.is_excluded_service("com.example.app"));
    }

    #[test]
    fn test_hidden_sets_are_distinct() {
        let config = PolicyConfig {
            hidden_always: vec!["4242".to_string()],
            hidden_by_default: vec!["S|7".to_string()],
            ..PolicyConfig::default()
        };
        let policy = StaticPolicy::new(&config);

        assert!(policy.is_hidden_always("4242"));
        assert!(!policy.is_hidden_by_default("4242"));
        assert!(policy.is_hidden_by_default("S|7"));
        assert!(!policy.is_hidden_always("S|7"));
    }
}
