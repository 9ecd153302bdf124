//! Replication integration tests.

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use bucketctl_engine::api::operation;
    use bucketctl_engine::{ReconcileError, SubResource};
    use bucketctl_model::{
        Deferred, DesiredConfiguration, DestinationSpec, ReplicationAndOperator,
        ReplicationFilterSpec, ReplicationRuleSpec, ResourceRef, RuleStatus, StorageClass, Tag,
    };

    use crate::{harness, legacy_rule, reconciler_for, replication, test_bucket_name};

    fn versioned(name: &str) -> DesiredConfiguration {
        DesiredConfiguration {
            versioning_enabled: true,
            ..DesiredConfiguration::named(name)
        }
    }

    fn filter_rule(id: &str, filter: ReplicationFilterSpec, priority: i32) -> ReplicationRuleSpec {
        ReplicationRuleSpec {
            id: Some(id.to_owned()),
            status: RuleStatus::Enabled,
            priority: Some(priority),
            filter: Some(filter),
            destination: DestinationSpec::bucket("arn:aws:s3:::destination"),
            delete_marker_replication: Some(RuleStatus::Disabled),
            ..ReplicationRuleSpec::default()
        }
    }

    #[tokio::test]
    async fn test_should_treat_equivalent_legacy_and_filter_rules_as_equal() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("schema");
        let legacy = DesiredConfiguration {
            replication: Some(replication(vec![legacy_rule("foobar", "foo")])),
            ..versioned(&name)
        };
        let outcome = reconciler.ensure(&legacy).await.unwrap();
        assert_eq!(outcome.applied, vec![SubResource::Versioning, SubResource::Replication]);
        api.clear_journal();

        let filter = DesiredConfiguration {
            replication: Some(replication(vec![filter_rule(
                "foobar",
                ReplicationFilterSpec {
                    prefix: Some("foo".to_owned()),
                    ..ReplicationFilterSpec::default()
                },
                0,
            )])),
            ..versioned(&name)
        };
        let outcome = reconciler.ensure(&filter).await.unwrap();
        assert!(outcome.plan.is_empty());
        assert_eq!(api.calls_for(operation::PUT_REPLICATION), 0);
    }

    #[tokio::test]
    async fn test_should_ignore_tag_declaration_order() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("tags");
        let tagged = |tags: Vec<Tag>| DesiredConfiguration {
            replication: Some(replication(vec![filter_rule(
                "tagged",
                ReplicationFilterSpec {
                    and: Some(ReplicationAndOperator {
                        prefix: Some("logs/".to_owned()),
                        tags,
                    }),
                    ..ReplicationFilterSpec::default()
                },
                1,
            )])),
            ..versioned(&name)
        };

        reconciler
            .ensure(&tagged(vec![Tag::new("a", "1"), Tag::new("b", "2")]))
            .await
            .unwrap();
        api.clear_journal();

        let outcome = reconciler
            .ensure(&tagged(vec![Tag::new("b", "2"), Tag::new("a", "1")]))
            .await
            .unwrap();
        assert!(outcome.plan.is_empty());
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_should_resolve_deferred_references() {
        let (api, _) = harness();
        let lookup: HashMap<String, String> = HashMap::from([
            (
                "aws_s3_bucket.destination.arn".to_owned(),
                "arn:aws:s3:::destination".to_owned(),
            ),
            (
                "aws_iam_role.role.arn".to_owned(),
                "arn:aws:iam::123456789012:role/tf-iam-role-replication".to_owned(),
            ),
        ]);
        let reconciler = reconciler_for(&api).with_references(Arc::new(lookup));
        let name = test_bucket_name("refs");

        let literal = DesiredConfiguration {
            replication: Some(replication(vec![legacy_rule("foobar", "foo")])),
            ..versioned(&name)
        };
        reconciler.ensure(&literal).await.unwrap();
        api.clear_journal();

        let mut referenced = legacy_rule("foobar", "foo");
        referenced.destination.bucket =
            Deferred::reference(ResourceRef::new("aws_s3_bucket.destination", "arn"));
        let mut config = replication(vec![referenced]);
        config.role = Deferred::reference(ResourceRef::new("aws_iam_role.role", "arn"));
        let desired = DesiredConfiguration {
            replication: Some(config),
            ..versioned(&name)
        };

        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert!(outcome.plan.is_empty());
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_should_report_unresolved_reference_before_remote_mutation() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("unresolved");
        let mut rule = legacy_rule("foobar", "foo");
        rule.destination.bucket =
            Deferred::reference(ResourceRef::new("aws_s3_bucket.missing", "arn"));
        let desired = DesiredConfiguration {
            replication: Some(replication(vec![rule])),
            ..versioned(&name)
        };

        let err = reconciler.ensure(&desired).await.unwrap_err();
        assert!(err.to_string().contains("aws_s3_bucket.missing.arn"), "{err}");
        assert!(api.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_should_require_versioning_before_any_remote_call() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("noversion");
        let desired = DesiredConfiguration {
            replication: Some(replication(vec![legacy_rule("foobar", "foo")])),
            ..DesiredConfiguration::named(&name)
        };

        let err = reconciler.ensure(&desired).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Precondition { .. }));
        assert!(err.is_preflight());
        assert!(api.calls().is_empty());
        assert!(!api.bucket_exists(&name));
    }

    #[tokio::test]
    async fn test_should_update_and_remove_replication_rules() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("rules");
        let mut desired = DesiredConfiguration {
            replication: Some(replication(vec![
                legacy_rule("foobar", "foo"),
                legacy_rule("barbaz", "bar"),
            ])),
            ..versioned(&name)
        };
        reconciler.ensure(&desired).await.unwrap();

        let mut changed = legacy_rule("barbaz", "bar");
        changed.destination.storage_class = Some(StorageClass::StandardIa);
        desired.replication = Some(replication(vec![legacy_rule("foobar", "foo"), changed]));
        let outcome = reconciler.ensure(&desired).await.unwrap();
        let diff = outcome
            .plan
            .block_diffs
            .iter()
            .find(|d| d.sub_resource == SubResource::Replication)
            .unwrap();
        assert_eq!((diff.created, diff.deleted, diff.unchanged), (1, 1, 1));

        desired.replication = None;
        let outcome = reconciler.ensure(&desired).await.unwrap();
        assert_eq!(outcome.applied, vec![SubResource::Replication]);
        assert_eq!(api.calls_for(operation::DELETE_REPLICATION), 1);
        assert!(reconciler.read(&name).await.unwrap().replication.is_none());
    }

    #[tokio::test]
    async fn test_should_assign_stable_ids_to_anonymous_rules() {
        let (_api, reconciler) = harness();
        let name = test_bucket_name("anon");
        let mut rule = legacy_rule("unused", "docs/");
        rule.id = None;
        let desired = DesiredConfiguration {
            replication: Some(replication(vec![rule])),
            tags: BTreeMap::new(),
            ..versioned(&name)
        };

        reconciler.ensure(&desired).await.unwrap();
        let first = reconciler.read(&name).await.unwrap().replication.unwrap();
        let id = first.rules[0].id.clone().unwrap();
        assert!(id.starts_with("tf-s3-replication-"), "{id}");

        let again = reconciler.ensure(&desired).await.unwrap();
        assert!(again.plan.is_empty());
    }
}
