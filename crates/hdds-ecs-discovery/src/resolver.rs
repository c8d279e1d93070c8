// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Selector to running task descriptors.

use crate::client::{EcsApi, EcsError, DESCRIBE_TASKS_BATCH};
use crate::config::{NamePattern, Selector};
use crate::model::Task;

/// Resource name of an ECS ARN (`.../cluster/prod` -> `prod`).
pub fn resource_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Whole-string match against the full ARN or its resource name.
fn matches_arn(pattern: &NamePattern, arn: &str) -> bool {
    pattern.matches(arn) || pattern.matches(resource_name(arn))
}

/// Every RUNNING task selected by `selector`.
///
/// Any failing call aborts the whole resolution.
pub async fn resolve_running_tasks<A: EcsApi>(
    selector: &Selector,
    api: &A,
) -> Result<Vec<Task>, EcsError> {
    match selector {
        Selector::ExactNames { cluster, service } => {
            let arns = api.list_running_tasks(cluster, service).await?;
            describe_in_batches(api, cluster, &arns).await
        }
        Selector::Patterns { cluster, service } => {
            let mut tasks = Vec::new();

            for cluster_arn in api.list_clusters().await? {
                if !matches_arn(cluster, &cluster_arn) {
                    continue;
                }

                let mut task_arns = Vec::new();
                for service_arn in api.list_services(&cluster_arn).await? {
                    if matches_arn(service, &service_arn) {
                        log::debug!("[ECS-DISCOVERY] Selected service {}", service_arn);
                        task_arns.extend(api.list_running_tasks(&cluster_arn, &service_arn).await?);
                    }
                }

                tasks.extend(describe_in_batches(api, &cluster_arn, &task_arns).await?);
            }

            Ok(tasks)
        }
    }
}

/// Describe `task_arns` in consecutive chunks of at most [`DESCRIBE_TASKS_BATCH`].
pub async fn describe_in_batches<A: EcsApi>(
    api: &A,
    cluster: &str,
    task_arns: &[String],
) -> Result<Vec<Task>, EcsError> {
    let mut tasks = Vec::with_capacity(task_arns.len());
    for chunk in task_arns.chunks(DESCRIBE_TASKS_BATCH) {
        tasks.extend(api.describe_tasks(cluster, chunk).await?);
    }
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeEcs {
        clusters: Vec<String>,
        services: HashMap<String, Vec<String>>,
        tasks: HashMap<(String, String), Vec<String>>,
        describe_calls: Mutex<Vec<usize>>,
        listed_services: Mutex<Vec<(String, String)>>,
    }

    impl FakeEcs {
        fn with_service(mut self, cluster: &str, service: &str, task_count: usize) -> Self {
            let cluster_arn = format!("arn:aws:ecs:us-east-1:1:cluster/{}", cluster);
            let service_arn = format!("arn:aws:ecs:us-east-1:1:service/{}/{}", cluster, service);
            if !self.clusters.contains(&cluster_arn) {
                self.clusters.push(cluster_arn.clone());
            }
            self.services
                .entry(cluster_arn.clone())
                .or_default()
                .push(service_arn.clone());
            let task_arns = (0..task_count)
                .map(|i| format!("arn:aws:ecs:us-east-1:1:task/{}/{}-{}", cluster, service, i))
                .collect();
            self.tasks.insert((cluster_arn, service_arn), task_arns);
            self
        }
    }

    impl EcsApi for FakeEcs {
        async fn list_clusters(&self) -> Result<Vec<String>, EcsError> {
            Ok(self.clusters.clone())
        }

        async fn list_services(&self, cluster: &str) -> Result<Vec<String>, EcsError> {
            Ok(self.services.get(cluster).cloned().unwrap_or_default())
        }

        async fn list_running_tasks(
            &self,
            cluster: &str,
            service: &str,
        ) -> Result<Vec<String>, EcsError> {
            self.listed_services
                .lock()
                .unwrap()
                .push((cluster.to_string(), service.to_string()));
            let key = (cluster.to_string(), service.to_string());
            if let Some(arns) = self.tasks.get(&key) {
                return Ok(arns.clone());
            }
            // exact-name lookups use plain names
            Ok(self
                .tasks
                .iter()
                .find(|((c, s), _)| resource_name(c) == cluster && resource_name(s) == service)
                .map(|(_, arns)| arns.clone())
                .unwrap_or_default())
        }

        async fn describe_tasks(
            &self,
            _cluster: &str,
            task_arns: &[String],
        ) -> Result<Vec<Task>, EcsError> {
            assert!(task_arns.len() <= DESCRIBE_TASKS_BATCH);
            self.describe_calls.lock().unwrap().push(task_arns.len());
            Ok(task_arns.iter().map(Task::new).collect())
        }
    }

    fn patterns(cluster: &str, service: &str) -> Selector {
        Selector::Patterns {
            cluster: NamePattern::new(cluster).unwrap(),
            service: NamePattern::new(service).unwrap(),
        }
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name("arn:aws:ecs:us-east-1:1:cluster/prod"), "prod");
        assert_eq!(resource_name("arn:aws:ecs:us-east-1:1:service/prod/api"), "api");
        assert_eq!(resource_name("prod"), "prod");
    }

    #[tokio::test]
    async fn test_exact_names() {
        let api = FakeEcs::default()
            .with_service("prod", "api", 3)
            .with_service("prod", "worker", 5);
        let selector = Selector::ExactNames {
            cluster: "prod".into(),
            service: "api".into(),
        };

        let tasks = resolve_running_tasks(&selector, &api).await.unwrap();
        assert_eq!(tasks.len(), 3);
        assert_eq!(*api.describe_calls.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_patterns_filter_clusters_and_services() {
        let api = FakeEcs::default()
            .with_service("prod-eu", "api", 2)
            .with_service("prod-eu", "api-canary", 1)
            .with_service("prod-us", "api", 4)
            .with_service("staging", "api", 7);

        let tasks = resolve_running_tasks(&patterns("prod-.*", "api"), &api)
            .await
            .unwrap();

        assert_eq!(tasks.len(), 6);
        let listed = api.listed_services.lock().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(_, s)| resource_name(s) == "api"));
    }

    #[tokio::test]
    async fn test_pattern_is_whole_string() {
        let api = FakeEcs::default().with_service("prod", "application-backup", 2);

        let tasks = resolve_running_tasks(&patterns(".*", "app"), &api)
            .await
            .unwrap();
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_describe_batching() {
        let api = FakeEcs::default();
        let ids: Vec<String> = (0..250).map(|i| format!("t{}", i)).collect();

        let tasks = describe_in_batches(&api, "prod", &ids).await.unwrap();

        assert_eq!(*api.describe_calls.lock().unwrap(), vec![100, 100, 50]);
        let seen: Vec<&str> = tasks.iter().map(|t| t.task_arn.as_str()).collect();
        let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_describe_batching_exact_multiple_and_empty() {
        let api = FakeEcs::default();
        let ids: Vec<String> = (0..200).map(|i| format!("t{}", i)).collect();
        describe_in_batches(&api, "prod", &ids).await.unwrap();
        describe_in_batches(&api, "prod", &[]).await.unwrap();

        assert_eq!(*api.describe_calls.lock().unwrap(), vec![100, 100]);
    }

    #[tokio::test]
    async fn test_error_aborts_resolution() {
        struct Broken;
        impl EcsApi for Broken {
            async fn list_clusters(&self) -> Result<Vec<String>, EcsError> {
                Err(EcsError::Api {
                    code: "AccessDeniedException".into(),
                    message: "denied".into(),
                })
            }
            async fn list_services(&self, _: &str) -> Result<Vec<String>, EcsError> {
                Ok(Vec::new())
            }
            async fn list_running_tasks(&self, _: &str, _: &str) -> Result<Vec<String>, EcsError> {
                Ok(Vec::new())
            }
            async fn describe_tasks(&self, _: &str, _: &[String]) -> Result<Vec<Task>, EcsError> {
                Ok(Vec::new())
            }
        }

        let err = resolve_running_tasks(&patterns(".*", ".*"), &Broken)
            .await
            .unwrap_err();
        assert!(matches!(err, EcsError::Api { .. }));
    }
}
