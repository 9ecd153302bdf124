//! Destroy integration tests.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bucketctl_engine::api::operation;
    use bucketctl_engine::{ApiError, MemoryBucketApi, ReconcileError};
    use bucketctl_model::DesiredConfiguration;

    use crate::{harness, reconciler_for, test_bucket_name};

    #[tokio::test]
    async fn test_should_treat_absent_bucket_as_deleted() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("absent");

        reconciler.destroy(&name, false).await.unwrap();
        reconciler.destroy(&name, true).await.unwrap();
        assert_eq!(api.calls_for(operation::DELETE_BUCKET), 1);
    }

    #[tokio::test]
    async fn test_should_refuse_non_empty_bucket_without_force() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("nonempty");
        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        api.put_objects(&name, 3).unwrap();

        let err = reconciler.destroy(&name, false).await.unwrap_err();
        assert!(matches!(err, ReconcileError::Conflict { .. }), "{err}");
        assert!(err.to_string().contains("forceDestroy"));
        assert!(api.bucket_exists(&name));
        assert_eq!(api.calls_for(operation::DELETE_OBJECTS), 0);
    }

    #[tokio::test]
    async fn test_should_drain_in_batches_before_delete() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("drain");
        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        api.put_objects(&name, 35).unwrap();
        api.clear_journal();

        reconciler.destroy(&name, true).await.unwrap();

        assert!(!api.bucket_exists(&name));
        // 10 + 10 + 10 + 5, then an empty batch.
        assert_eq!(api.calls_for(operation::DELETE_OBJECTS), 5);
        let last = api.calls().pop().unwrap();
        assert_eq!(last.operation, operation::DELETE_BUCKET);
        assert!(matches!(
            reconciler.read(&name).await,
            Err(ReconcileError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_retry_throttled_drain_batches() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("throttled");
        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        api.put_objects(&name, 15).unwrap();
        api.inject_failures(operation::DELETE_OBJECTS, ApiError::SlowDown, 2);

        reconciler.destroy(&name, true).await.unwrap();
        assert!(!api.bucket_exists(&name));
    }

    #[tokio::test]
    async fn test_should_stop_draining_at_deadline() {
        let api = Arc::new(MemoryBucketApi::new().with_drain_delay(Duration::from_millis(10)));
        let reconciler = reconciler_for(&api);
        let name = test_bucket_name("deadline");
        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        api.put_objects(&name, 10_000).unwrap();

        let err = reconciler
            .destroy_with_deadline(&name, true, Duration::from_millis(60))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Timeout { .. }), "{err}");
        assert!(api.bucket_exists(&name));
        let remaining = api.object_count(&name).unwrap();
        assert!(remaining > 0 && remaining < 10_000, "remaining: {remaining}");
        assert_eq!(api.calls_for(operation::DELETE_BUCKET), 0);
    }

    #[tokio::test]
    async fn test_should_surface_permanent_delete_failure() {
        let (api, reconciler) = harness();
        let name = test_bucket_name("denied");
        reconciler
            .ensure(&DesiredConfiguration::named(&name))
            .await
            .unwrap();
        api.inject_failure(
            operation::DELETE_BUCKET,
            ApiError::AccessDenied {
                message: "explicit deny".to_owned(),
            },
        );

        let err = reconciler.destroy(&name, false).await.unwrap_err();
        assert!(
            matches!(err, ReconcileError::Remote { operation: "DeleteBucket", .. }),
            "{err}"
        );
        assert!(api.bucket_exists(&name));
    }
}
