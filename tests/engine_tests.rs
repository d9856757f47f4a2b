//! End-to-end resolution tests against the in-memory store.

use std::sync::Arc;

use capauth::{
    AccessEngine, AccessError, CapabilityDef, ContextLevel, MemoryStore, NewRole, Permission,
    SYSTEM_CONTEXT_ID,
};

const ALICE: i64 = 101;
const BOB: i64 = 102;

fn cap(name: &str) -> CapabilityDef {
    CapabilityDef {
        name: name.to_string(),
        captype: "write".to_string(),
        context_level: ContextLevel::System,
        risk_bitmask: 0,
        description: format!("test capability {name}"),
    }
}

async fn engine() -> AccessEngine {
    let engine = AccessEngine::new(Arc::new(MemoryStore::new()));
    engine
        .register_capabilities(
            "core",
            &[cap("site:config"), cap("report:view"), cap("user:delete")],
        )
        .await
        .unwrap();
    engine
}

async fn role(engine: &AccessEngine, shortname: &str, sortorder: i64) -> i64 {
    engine
        .create_role(NewRole {
            name: shortname.to_string(),
            shortname: shortname.to_string(),
            description: String::new(),
            archetype: String::new(),
            sortorder,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_admin_allowed_at_root() {
    let engine = engine().await;
    let admin = role(&engine, "siteadmin", 1).await;

    engine
        .assign_capability(admin, "site:config", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_role(admin, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(engine
        .has_capability(ALICE, "site:config", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    // Other capabilities stay at the default deny.
    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    // Other subjects are unaffected.
    assert!(!engine
        .has_capability(BOB, "site:config", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_prohibit_overrides_allow_across_roles() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let suspended = role(&engine, "suspended", 2).await;

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_capability(
            suspended,
            "report:view",
            Permission::Prohibit,
            SYSTEM_CONTEXT_ID,
        )
        .await
        .unwrap();

    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();
    engine
        .assign_role(suspended, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_prevent_does_not_defeat_allow_from_another_role() {
    let engine = engine().await;
    let viewer = role(&engine, "viewer", 1).await;
    let restricted = role(&engine, "restricted", 2).await;

    engine
        .assign_capability(viewer, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_capability(
            restricted,
            "report:view",
            Permission::Prevent,
            SYSTEM_CONTEXT_ID,
        )
        .await
        .unwrap();

    engine
        .assign_role(viewer, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();
    engine
        .assign_role(restricted, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    // ALLOW outranks PREVENT in the aggregate.
    assert!(engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_prevent_alone_denies() {
    let engine = engine().await;
    let restricted = role(&engine, "restricted", 1).await;

    engine
        .assign_capability(
            restricted,
            "report:view",
            Permission::Prevent,
            SYSTEM_CONTEXT_ID,
        )
        .await
        .unwrap();
    engine
        .assign_role(restricted, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_specific_context_overrides_root_entry() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let module = engine
        .get_or_create_context(ContextLevel::Module, 7, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_capability(editor, "report:view", Permission::Prevent, module)
        .await
        .unwrap();
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    // Root entry applies everywhere except where a more specific one exists.
    assert!(engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(!engine
        .has_capability(ALICE, "report:view", module)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_root_assignment_applies_in_child_context() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let module = engine
        .get_or_create_context(ContextLevel::Module, 7, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(engine
        .has_capability(ALICE, "report:view", module)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_context_local_assignment_invisible_elsewhere() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let module_a = engine
        .get_or_create_context(ContextLevel::Module, 1, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    let module_b = engine
        .get_or_create_context(ContextLevel::Module, 2, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine.assign_role(editor, ALICE, module_a, 0, 0).await.unwrap();

    assert!(engine
        .has_capability(ALICE, "report:view", module_a)
        .await
        .unwrap());
    assert!(!engine
        .has_capability(ALICE, "report:view", module_b)
        .await
        .unwrap());
    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_temporal_validity_window() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let now = chrono::Utc::now().timestamp();

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    // Future-dated: not yet active.
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, now + 3600, 0)
        .await
        .unwrap();
    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());

    // Expired: no longer active.
    engine
        .assign_role(editor, BOB, SYSTEM_CONTEXT_ID, 0, now - 3600)
        .await
        .unwrap();
    assert!(!engine
        .has_capability(BOB, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());

    // Re-assigning widens the window in place.
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();
    assert!(engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_clean_expired_assignments() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let now = chrono::Utc::now().timestamp();

    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, now - 10)
        .await
        .unwrap();
    engine
        .assign_role(editor, BOB, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert_eq!(engine.clean_expired_assignments().await.unwrap(), 1);
    assert!(engine.user_assignments(ALICE).await.unwrap().is_empty());
    assert_eq!(engine.user_assignments(BOB).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_require_capability_denied_error() {
    let engine = engine().await;

    let err = engine
        .require_capability(ALICE, "site:config", SYSTEM_CONTEXT_ID)
        .await
        .unwrap_err();
    match err {
        AccessError::Denied {
            subject_id,
            capability,
            context_id,
        } => {
            assert_eq!(subject_id, ALICE);
            assert_eq!(capability, "site:config");
            assert_eq!(context_id, SYSTEM_CONTEXT_ID);
        }
        other => panic!("expected Denied, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_and_malformed_capabilities_deny() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(!engine
        .has_capability(ALICE, "no:such", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(!engine
        .has_capability(ALICE, "NOT A NAME", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_has_any_and_has_all() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(engine
        .has_any_capability(ALICE, &["site:config", "report:view"], SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(!engine
        .has_all_capabilities(ALICE, &["site:config", "report:view"], SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(engine
        .has_all_capabilities(ALICE, &["report:view"], SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(!engine
        .has_any_capability(ALICE, &[], SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(engine
        .has_all_capabilities(ALICE, &[], SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_user_capabilities_lists_allows() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let auditor = role(&engine, "auditor", 2).await;

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_capability(auditor, "user:delete", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_capability(editor, "site:config", Permission::Prevent, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();
    engine
        .assign_role(auditor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    let caps = engine
        .user_capabilities(ALICE, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    let names: Vec<&str> = caps.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["report:view", "user:delete"]);
}

#[tokio::test]
async fn test_bulk_assignment_counts() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let subjects = [ALICE, BOB, 103];

    assert_eq!(
        engine
            .bulk_assign_role(editor, &subjects, SYSTEM_CONTEXT_ID)
            .await
            .unwrap(),
        3
    );
    assert!(engine
        .user_has_role(BOB, editor, SYSTEM_CONTEXT_ID)
        .await
        .unwrap());

    // One of them was never assigned at that context.
    assert_eq!(
        engine
            .bulk_unassign_role(editor, &[ALICE, BOB, 999], SYSTEM_CONTEXT_ID)
            .await
            .unwrap(),
        2
    );
    assert!(!engine
        .user_has_role(ALICE, editor, SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(engine
        .user_has_role(103, editor, SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_shortname_queries() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();

    assert!(engine
        .user_has_role_shortname(ALICE, "editor", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(!engine
        .user_has_role_shortname(ALICE, "missing", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());

    let roles = engine.user_roles(ALICE, SYSTEM_CONTEXT_ID).await.unwrap();
    assert_eq!(roles.len(), 1);
    assert_eq!(roles[0].shortname, "editor");
}

#[tokio::test]
async fn test_protected_roles_cannot_be_deleted_or_renamed() {
    let engine = engine().await;
    engine.roles().ensure_defaults().await.unwrap();

    let admin = engine.roles().find("admin").await.unwrap().unwrap();
    assert!(!engine.delete_role(admin.id).await.unwrap());

    let mut renamed = admin.clone();
    renamed.shortname = "superadmin".to_string();
    assert!(!engine.update_role(&renamed).await.unwrap());

    // Non-identity fields remain editable.
    let mut described = admin.clone();
    described.description = "Site administrators".to_string();
    assert!(engine.update_role(&described).await.unwrap());
}

#[tokio::test]
async fn test_deleting_role_revokes_access() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;

    engine
        .assign_capability(editor, "report:view", Permission::Allow, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();
    engine
        .assign_role(editor, ALICE, SYSTEM_CONTEXT_ID, 0, 0)
        .await
        .unwrap();
    assert!(engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());

    assert!(engine.delete_role(editor).await.unwrap());
    assert!(!engine
        .has_capability(ALICE, "report:view", SYSTEM_CONTEXT_ID)
        .await
        .unwrap());
    assert!(engine.user_assignments(ALICE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_deleting_context_revokes_scoped_access() {
    let engine = engine().await;
    let editor = role(&engine, "editor", 1).await;
    let module = engine
        .get_or_create_context(ContextLevel::Module, 7, SYSTEM_CONTEXT_ID)
        .await
        .unwrap();

    engine
        .assign_capability(editor, "report:view", Permission::Allow, module)
        .await
        .unwrap();
    engine.assign_role(editor, ALICE, module, 0, 0).await.unwrap();
    assert!(engine
        .has_capability(ALICE, "report:view", module)
        .await
        .unwrap());

    assert!(engine.delete_context(module).await.unwrap());
    assert!(engine.user_assignments(ALICE).await.unwrap().is_empty());
}

mod aggregation_properties {
    use capauth::Permission;
    use proptest::prelude::*;

    fn permission_strategy() -> impl Strategy<Value = Permission> {
        prop_oneof![
            Just(Permission::Inherit),
            Just(Permission::Allow),
            Just(Permission::Prevent),
            Just(Permission::Prohibit),
        ]
    }

    fn aggregate(perms: &[Permission]) -> Permission {
        perms
            .iter()
            .fold(Permission::Inherit, |acc, p| acc.combine(*p))
    }

    proptest! {
        #[test]
        fn aggregation_is_order_independent(
            mut perms in prop::collection::vec(permission_strategy(), 0..8),
            seed in any::<u64>(),
        ) {
            let original = aggregate(&perms);
            // Cheap deterministic shuffle.
            let len = perms.len();
            for i in 0..len {
                let j = (seed as usize).wrapping_mul(i + 1) % len.max(1);
                perms.swap(i, j);
            }
            prop_assert_eq!(aggregate(&perms), original);
        }

        #[test]
        fn prohibit_is_absorbing(
            perms in prop::collection::vec(permission_strategy(), 0..8),
        ) {
            let mut with_prohibit = perms.clone();
            with_prohibit.push(Permission::Prohibit);
            prop_assert_eq!(aggregate(&with_prohibit), Permission::Prohibit);
        }

        #[test]
        fn allow_sticks_over_prevent(
            prevents in prop::collection::vec(Just(Permission::Prevent), 0..8),
        ) {
            let mut perms = prevents;
            perms.push(Permission::Allow);
            prop_assert_eq!(aggregate(&perms), Permission::Allow);
        }
    }
}
