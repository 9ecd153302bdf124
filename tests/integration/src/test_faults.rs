//! Fault handling integration tests: retries, eventual consistency,
//! conflicts and partial failure.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use bucketctl_core::AwsRegion;
    use bucketctl_engine::api::operation;
    use bucketctl_engine::{
        ApiError, BlockHasher, BlockKey, CanonicalForm, FailureCause, MemoryBucketApi,
        ReconcileError, ReconcileState, SubResource,
    };
    use bucketctl_model::{
        CannedAcl, DesiredConfiguration, LifecycleExpiration, LifecycleRule,
        ObservedConfiguration, VersioningStatus,
    };

    use crate::{
        TEST_REGION, cors_rule, harness, legacy_rule, reconciler_for, replication,
        test_bucket_name,
    };

    /// Maps every block to the same key.
    #[derive(Debug)]
    struct CollidingHasher;

    impl BlockHasher for CollidingHasher {
        fn key(&self, _form: &CanonicalForm) -> BlockKey {
            BlockKey::new(42)
        }
    }

    fn expiring(prefix: &str) -> LifecycleRule {
        LifecycleRule {
            id: Some(format!("expire-{}", prefix.trim_end_matches('/'))),
            prefix: Some(prefix.to_owned()),
            enabled: true,
            expiration: Some(LifecycleExpiration {
                days: Some(30),
                ..LifecycleExpiration::default()
            }),
            ..LifecycleRule::default()
        }
    }

    #[tokio::test]
    async fn test_should_retry_transient_failures() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("transient");
        api.inject_failure(operation::HEAD_BUCKET, ApiError::SlowDown);
        api.inject_failures(
            operation::PUT_TAGS,
            ApiError::ServiceUnavailable {
                message: "try again".to_owned(),
            },
            2,
        );
        let desired = DesiredConfiguration {
            tags: BTreeMap::from([("env".to_owned(), "test".to_owned())]),
            ..DesiredConfiguration::named(&name)
        };

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert_eq!(outcome.applied, vec![SubResource::Tags]);
        assert_eq!(api.calls_for(operation::PUT_TAGS), 3);
    }

    #[tokio::test]
    async fn test_should_give_up_after_retry_budget() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("budget");
        api.inject_failures(operation::HEAD_BUCKET, ApiError::SlowDown, 3);

        let err = reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap_err();
        assert!(
            matches!(err, ReconcileError::Remote { source: ApiError::SlowDown, .. }),
            "{err}"
        );
        assert!(!api.bucket_exists(&name));
    }

    #[tokio::test]
    async fn test_should_wait_for_new_bucket_to_become_visible() {
        let api = Arc::new(MemoryBucketApi::new().with_visibility_lag(3));
        let reconciler = reconciler_for(&api);
        let name = test_bucket_name("lag");

        let outcome = reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(
            outcome.transitions,
            vec![
                ReconcileState::Absent,
                ReconcileState::Creating,
                ReconcileState::Converging,
                ReconcileState::Stable,
            ]
        );
        // One existence check, three hidden checks, one visible check.
        assert_eq!(api.calls_for(operation::HEAD_BUCKET), 5);
    }

    #[tokio::test]
    async fn test_should_time_out_when_bucket_never_appears() {
        let api = Arc::new(MemoryBucketApi::new().with_visibility_lag(100));
        let reconciler = reconciler_for(&api);
        let name = test_bucket_name("invisible");

        let err = reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap_err();
        assert!(
            matches!(
                &err,
                ReconcileError::EventualConsistencyTimeout { attempts: 6, expectation, .. }
                    if expectation == "visible"
            ),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_should_report_conflict_for_foreign_name() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("foreign");
        api.reserve_foreign_name(&name);

        let err = reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Conflict { .. }), "{err}");
        assert!(!api.bucket_exists(&name));
    }

    #[tokio::test]
    async fn test_should_report_conflict_for_bucket_in_other_region() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("elsewhere");
        api.seed(&ObservedConfiguration::empty(&name, AwsRegion::new("eu-west-1")));

        let err = reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("eu-west-1"), "{err}");
        assert_eq!(api.mutations(), vec![]);
    }

    #[tokio::test]
    async fn test_should_adopt_existing_bucket() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("adopt");
        api.seed(&ObservedConfiguration {
            acl: Some(CannedAcl::Private),
            versioning: VersioningStatus::Enabled,
            cors_rules: vec![cors_rule(&["GET"], &["*"])],
            ..ObservedConfiguration::empty(&name, AwsRegion::new(TEST_REGION))
        });

        let desired = DesiredConfiguration {
            versioning_enabled: false,
            ..DesiredConfiguration::named(&name)
        };
        let outcome = reconciler.ensure(&desired).await.unwrap();

        assert!(!outcome.created);
        assert_eq!(outcome.transitions[0], ReconcileState::Stable);
        assert_eq!(outcome.applied, vec![SubResource::Versioning, SubResource::Cors]);
        assert_eq!(api.calls_for(operation::CREATE_BUCKET), 0);
        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.versioning, VersioningStatus::Suspended);
    }

    #[tokio::test]
    async fn test_should_continue_past_failed_sub_resource() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("partial");
        api.inject_failures(
            operation::PUT_LIFECYCLE,
            ApiError::Internal {
                message: "boom".to_owned(),
            },
            3,
        );
        let desired = DesiredConfiguration {
            lifecycle_rules: vec![expiring("logs/")],
            cors_rules: vec![cors_rule(&["GET"], &["*"])],
            ..DesiredConfiguration::named(&name)
        };

        let err = reconciler.ensure(&desired).await.unwrap_err();
        let ReconcileError::PartialConfigurationFailure { failures, .. } = &err else {
            panic!("expected partial failure, got {err}");
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sub_resource, SubResource::Lifecycle);
        assert!(err.to_string().contains("lifecycle"), "{err}");

        // CORS was applied despite the lifecycle failure.
        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.cors_rules.len(), 1);
        assert!(observed.lifecycle_rules.is_empty());

        // The next run converges the remainder only.
        api.clear_journal();
        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert_eq!(outcome.applied, vec![SubResource::Lifecycle]);
    }

    #[tokio::test]
    async fn test_should_skip_replication_when_versioning_fails() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("skip");
        api.inject_failure(
            operation::PUT_VERSIONING,
            ApiError::AccessDenied {
                message: "denied".to_owned(),
            },
        );
        let desired = DesiredConfiguration {
            versioning_enabled: true,
            replication: Some(replication(vec![legacy_rule("foobar", "foo")])),
            ..DesiredConfiguration::named(&name)
        };

        let err = reconciler.ensure(&desired).await.unwrap_err();
        let ReconcileError::PartialConfigurationFailure { failures, .. } = err else {
            panic!("expected partial failure");
        };
        let subjects: Vec<SubResource> = failures.iter().map(|f| f.sub_resource).collect();
        assert_eq!(subjects, vec![SubResource::Versioning, SubResource::Replication]);
        assert!(matches!(failures[1].cause, FailureCause::Skipped(_)));
        assert_eq!(api.calls_for(operation::PUT_REPLICATION), 0);
    }

    #[tokio::test]
    async fn test_should_update_blocks_on_key_collision() {
        let (api, _) = harness();
        let reconciler = reconciler_for(&api).with_hasher(Arc::new(CollidingHasher));
        let name = test_bucket_name("collide");
        let mut desired = DesiredConfiguration {
            cors_rules: vec![cors_rule(&["GET"], &["*"])],
            ..DesiredConfiguration::named(&name)
        };
        reconciler.ensure(&desired).await.unwrap();

        desired.cors_rules = vec![cors_rule(&["PUT"], &["https://example.com"])];
        let outcome = reconciler.ensure(&desired).await.unwrap();
        let cors = outcome
            .plan
            .block_diffs
            .iter()
            .find(|d| d.sub_resource == SubResource::Cors)
            .unwrap();
        assert_eq!((cors.created, cors.updated, cors.deleted), (0, 1, 0));

        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.cors_rules, desired.cors_rules);
    }

    #[tokio::test]
    async fn test_should_keep_distinct_blocks_sharing_a_key() {
        let (api, _) = harness();
        let reconciler = reconciler_for(&api).with_hasher(Arc::new(CollidingHasher));
        let name = test_bucket_name("shared-key");
        let desired = DesiredConfiguration {
            cors_rules: vec![
                cors_rule(&["GET"], &["*"]),
                cors_rule(&["PUT"], &["https://example.com"]),
            ],
            ..DesiredConfiguration::named(&name)
        };

        reconciler.ensure(&desired).await.unwrap();
        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.cors_rules.len(), 2);
        for rule in &desired.cors_rules {
            assert!(observed.cors_rules.contains(rule), "{rule:?} was dropped");
        }

        let second = reconciler.ensure(&desired).await.unwrap();
        assert!(second.plan.is_empty());
    }

    #[tokio::test]
    async fn test_should_absorb_missing_bucket_right_after_create() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("fresh");
        api.inject_failure(operation::GET_ACL, ApiError::no_such_bucket(&name));
        api.inject_failure(operation::PUT_VERSIONING, ApiError::no_such_bucket(&name));
        let desired = DesiredConfiguration {
            versioning_enabled: true,
            ..DesiredConfiguration::named(&name)
        };

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert!(outcome.created);
        assert_eq!(reconciler.state(&name), Some(ReconcileState::Stable));
        let observed = reconciler.read(&name).await.unwrap();
        assert_eq!(observed.versioning, VersioningStatus::Enabled);
    }

    #[tokio::test]
    async fn test_should_mark_bucket_failed_when_it_never_appears() {
        let api = Arc::new(MemoryBucketApi::new().with_visibility_lag(100));
        let reconciler = reconciler_for(&api);
        let name = test_bucket_name("unseen");

        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap_err();
        assert_eq!(reconciler.state(&name), Some(ReconcileState::Failed));
    }
}
