//! Concurrent reconciliation of independent buckets.

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use bucketctl_engine::api::operation;
    use bucketctl_model::DesiredConfiguration;
    use futures::future::join_all;

    use crate::{cors_rule, harness, test_bucket_name};

    fn desired(name: &str, index: usize) -> DesiredConfiguration {
        DesiredConfiguration {
            versioning_enabled: index % 2 == 0,
            cors_rules: vec![cors_rule(&["GET"], &["*"])],
            tags: BTreeMap::from([("index".to_owned(), index.to_string())]),
            ..DesiredConfiguration::named(name)
        }
    }

    #[tokio::test]
    async fn test_should_converge_many_buckets_concurrently() {
        let (api, reconciler) = harness();
        let names: Vec<String> = (0..16).map(|_| test_bucket_name("par")).collect();
        let configs: Vec<DesiredConfiguration> = names
            .iter()
            .enumerate()
            .map(|(i, name)| desired(name, i))
            .collect();

        let results = join_all(configs.iter().map(|d| reconciler.ensure(d))).await;
        for (result, name) in results.into_iter().zip(&names) {
            let outcome = result.unwrap();
            assert_eq!(&outcome.name, name);
            assert!(outcome.created);
        }
        assert_eq!(api.calls_for(operation::CREATE_BUCKET), 16);

        for (i, name) in names.iter().enumerate() {
            let observed = reconciler.read(name).await.unwrap();
            assert_eq!(observed.tags["index"], i.to_string());
        }
    }

    #[tokio::test]
    async fn test_should_destroy_many_buckets_concurrently() {
        let (api, reconciler) = harness();
        let names: Vec<String> = (0..8).map(|_| test_bucket_name("gone")).collect();
        for name in &names {
            reconciler
                .ensure(&DesiredConfiguration::named(name))
                .await
                .unwrap();
            api.put_objects(name, 25).unwrap();
        }

        let results = join_all(names.iter().map(|n| reconciler.destroy(n, true))).await;
        assert!(results.iter().all(Result::is_ok));
        assert!(names.iter().all(|n| !api.bucket_exists(n)));
    }
}
