//! Property tests for permission dominance.

use proptest::prelude::*;
use trc_config::PermissionConfig;
use trc_policy::{effective_class, CommandClass, PermissionRules};

fn class_strategy() -> impl Strategy<Value = CommandClass> {
    prop_oneof![
        Just(CommandClass::Allow),
        Just(CommandClass::Ask),
        Just(CommandClass::Deny),
    ]
}

proptest! {
    /// The effective class equals the max under deny > ask > allow and is
    /// never weaker than either side.
    #[test]
    fn effective_is_max_of_both_sides(server in class_strategy(), local in class_strategy()) {
        let effective = effective_class(server, local);
        prop_assert_eq!(effective, server.max(local));
        prop_assert!(effective >= server);
        prop_assert!(effective >= local);
    }

    /// Classification of an arbitrary command is deterministic.
    #[test]
    fn classify_is_deterministic(command in "[ -~]{0,80}") {
        let rules = PermissionRules::compile(&PermissionConfig {
            allow: vec!["git status*".into(), "ls*".into()],
            ask: vec!["git push*".into()],
            deny: vec!["rm -rf*".into(), "sudo *".into()],
        }).unwrap();
        prop_assert_eq!(rules.classify(&command), rules.classify(&command));
    }

    /// A command matching a deny pattern is always denied regardless of the
    /// other lists.
    #[test]
    fn deny_always_wins(tail in "[a-z /._-]{0,40}") {
        let rules = PermissionRules::compile(&PermissionConfig {
            allow: vec!["rm -rf*".into(), "*".into()],
            ask: vec!["rm -rf*".into()],
            deny: vec!["rm -rf*".into()],
        }).unwrap();
        let command = format!("rm -rf{tail}");
        prop_assert_eq!(rules.classify(&command), CommandClass::Deny);
    }
}
