//! End-to-end apply runs against the in-memory cluster

use kapply_kube::{
    Applier, ApplyOptions, ApplyRequest, KubeError, MockCluster, OperationCounts, OutcomeObserver,
    OwnerReferencePolicy, ReconcileOptions, ReconcileOutcome, ResourceOutcome, TypeRegistry,
};
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn options(&self) -> ApplyOptions {
        ApplyOptions {
            temp_dir: Some(self.dir.path().to_path_buf()),
            ..Default::default()
        }
    }
}

fn applier(cluster: &MockCluster, options: ApplyOptions) -> Applier<MockCluster> {
    Applier::new(cluster.clone(), TypeRegistry::builtin(), options)
}

const SERVICE_TEMPLATE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: svc-{{ env }}
  namespace: "{{ namespace }}"
spec:
  ports:
    - port: 80
"#;

#[tokio::test]
async fn test_namespace_comes_from_the_caller() {
    let ws = Workspace::new();
    let template = ws.file("service.yaml", SERVICE_TEMPLATE);
    let values = ws.file("values.yaml", "env: prod\n");
    let cluster = MockCluster::with_builtin_discovery();

    let request = ApplyRequest::new(&template, "team-a").with_values_file(&values);
    let report = applier(&cluster, ws.options()).apply(&request).await.unwrap();

    assert_eq!(report.outcomes.len(), 1);
    let outcome = &report.outcomes[0];
    assert_eq!(outcome.name, "svc-prod");
    assert_eq!(outcome.namespace.as_deref(), Some("team-a"));
    assert_eq!(outcome.outcome, ReconcileOutcome::Created);

    let stored = cluster.object("services", Some("team-a"), "svc-prod").unwrap();
    assert_eq!(stored["spec"]["ports"][0]["port"], 80);
}

#[tokio::test]
async fn test_second_apply_updates() {
    let ws = Workspace::new();
    let template = ws.file(
        "cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  level: \"{{ level }}\"\n",
    );
    let cluster = MockCluster::with_builtin_discovery();
    let applier = applier(&cluster, ws.options());

    let first = applier
        .apply(&ApplyRequest::new(&template, "default").with_set("level=info"))
        .await
        .unwrap();
    assert_eq!(first.created(), 1);

    let second = applier
        .apply(&ApplyRequest::new(&template, "default").with_set("level=debug"))
        .await
        .unwrap();
    assert_eq!(second.updated(), 1);
    assert!(!second.has_failures());

    let stored = cluster.object("configmaps", Some("default"), "settings").unwrap();
    assert_eq!(stored["data"]["level"], "debug");
    assert_eq!(cluster.object_count(), 1);
}

#[tokio::test]
async fn test_rejected_update_is_a_failure() {
    let ws = Workspace::new();
    let template = ws.file(
        "cm.yaml",
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  level: \"{{ level }}\"\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: creds\n",
    );
    let cluster = MockCluster::with_builtin_discovery();
    let applier = applier(&cluster, ws.options());

    let first = applier
        .apply(&ApplyRequest::new(&template, "default").with_set("level=info"))
        .await
        .unwrap();
    assert_eq!(first.created(), 2);

    cluster.fail_patches("ConfigMap", 422, "Invalid");
    let second = applier
        .apply(&ApplyRequest::new(&template, "default").with_set("level=debug"))
        .await
        .unwrap();

    match &second.outcomes[0].outcome {
        ReconcileOutcome::Failed { reason } => {
            assert!(reason.starts_with("could not patch ConfigMap 'default/settings'"), "{}", reason)
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(second.outcomes[1].outcome, ReconcileOutcome::Updated);
    assert_eq!(second.summary(), "1 updated, 1 failed");

    let stored = cluster.object("configmaps", Some("default"), "settings").unwrap();
    assert_eq!(stored["data"]["level"], "info");
}

#[tokio::test]
async fn test_unknown_kind_does_not_stop_siblings() {
    let ws = Workspace::new();
    let template = ws.file(
        "mixed.yaml",
        r#"apiVersion: v1
kind: List
items:
  - apiVersion: example.com/v1
    kind: Widget
    metadata:
      name: w
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: after-widget
"#,
    );
    let cluster = MockCluster::with_builtin_discovery();

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();

    assert_eq!(report.outcomes.len(), 2);
    assert!(matches!(report.outcomes[0].outcome, ReconcileOutcome::Skipped { .. }));
    assert_eq!(report.outcomes[1].outcome, ReconcileOutcome::Created);
    assert!(cluster.object("configmaps", Some("default"), "after-widget").is_some());
    assert_eq!(report.summary(), "1 created, 1 skipped");
}

#[tokio::test]
async fn test_empty_list_applies_nothing() {
    let ws = Workspace::new();
    let template = ws.file("empty.yaml", "apiVersion: v1\nkind: List\nitems: []\n");
    let cluster = MockCluster::with_builtin_discovery();

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();

    assert!(report.outcomes.is_empty());
    assert_eq!(cluster.operation_counts().creates, 0);
    assert_eq!(cluster.operation_counts().discovery_calls, 0);
}

#[tokio::test]
async fn test_discovery_runs_once_per_group_version() {
    let ws = Workspace::new();
    let template = ws.file(
        "many.yaml",
        r#"{% for name in names %}
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ name }}
{% endfor %}
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
"#,
    );
    let values = ws.file("values.yaml", "names: [a, b, c]\n");
    let cluster = MockCluster::with_builtin_discovery();

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default").with_values_file(&values))
        .await
        .unwrap();

    assert_eq!(report.created(), 4);
    assert_eq!(cluster.operation_counts().discovery_calls, 2);
}

#[tokio::test]
async fn test_discovery_failure_is_reported_per_resource() {
    let ws = Workspace::new();
    let template = ws.file(
        "two.yaml",
        r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
---
apiVersion: v1
kind: Secret
metadata:
  name: creds
"#,
    );
    let cluster = MockCluster::with_builtin_discovery();
    cluster.fail_discovery("apps/v1");

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();

    assert!(report.has_failures());
    match &report.outcomes[0].outcome {
        ReconcileOutcome::Failed { reason } => assert!(reason.contains("apps/v1, Kind=Deployment")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.outcomes[1].outcome, ReconcileOutcome::Created);
}

#[tokio::test]
async fn test_malformed_manifest_aborts() {
    let ws = Workspace::new();
    let template = ws.file("bad.yaml", "apiVersion: v1\nkind: [unclosed\n");
    let cluster = MockCluster::with_builtin_discovery();

    let err = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap_err();

    assert!(matches!(err, KubeError::Decode(_)));
    assert_eq!(cluster.operation_counts().discovery_calls, 0);
}

#[tokio::test]
async fn test_missing_template_aborts_before_cluster_calls() {
    let ws = Workspace::new();
    let cluster = MockCluster::with_builtin_discovery();

    let err = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(ws.dir.path().join("nope.yaml"), "default"))
        .await
        .unwrap_err();

    assert!(matches!(err, KubeError::Stat { .. }));
    assert_eq!(cluster.operation_counts(), OperationCounts::default());
}

#[tokio::test]
async fn test_invalid_item_is_a_failure_not_an_abort() {
    let ws = Workspace::new();
    let template = ws.file(
        "items.yaml",
        r#"apiVersion: v1
kind: List
items:
  - apiVersion: v1
    kind: ConfigMap
    metadata: {}
  - apiVersion: v1
    kind: ConfigMap
    metadata:
      name: good
"#,
    );
    let cluster = MockCluster::with_builtin_discovery();

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();

    assert!(report.outcomes[0].outcome.is_failure());
    assert_eq!(report.outcomes[1].outcome, ReconcileOutcome::Created);
}

#[tokio::test]
async fn test_owner_reference_policy() {
    let ws = Workspace::new();
    let template = ws.file(
        "owned.yaml",
        r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: owned
  uid: stale
  ownerReferences:
    - apiVersion: apps/v1
      kind: Deployment
      name: web
      uid: 0000
"#,
    );

    let stripped = MockCluster::with_builtin_discovery();
    applier(&stripped, ws.options())
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();
    let stored = stripped.object("configmaps", Some("default"), "owned").unwrap();
    assert!(stored["metadata"].get("ownerReferences").is_none());
    assert!(stored["metadata"].get("uid").is_none());

    let preserved = MockCluster::with_builtin_discovery();
    let options = ApplyOptions {
        reconcile: ReconcileOptions {
            owner_references: OwnerReferencePolicy::Preserve,
        },
        ..ws.options()
    };
    applier(&preserved, options)
        .apply(&ApplyRequest::new(&template, "default"))
        .await
        .unwrap();
    let stored = preserved.object("configmaps", Some("default"), "owned").unwrap();
    assert!(stored["metadata"].get("ownerReferences").is_some());
}

#[tokio::test]
async fn test_cluster_scoped_kind_ignores_namespace() {
    let ws = Workspace::new();
    let template = ws.file(
        "ns.yaml",
        "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: \"{{ namespace }}\"\n",
    );
    let cluster = MockCluster::with_builtin_discovery();

    let report = applier(&cluster, ws.options())
        .apply(&ApplyRequest::new(&template, "team-b"))
        .await
        .unwrap();

    assert_eq!(report.outcomes[0].namespace, None);
    assert!(cluster.object("namespaces", None, "team-b").is_some());
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<ResourceOutcome>>,
}

impl OutcomeObserver for Recorder {
    fn on_outcome(&self, outcome: &ResourceOutcome) {
        self.seen.lock().unwrap().push(outcome.clone());
    }
}

#[tokio::test]
async fn test_observer_sees_every_outcome_in_order() {
    let ws = Workspace::new();
    let template = ws.file(
        "pair.yaml",
        "apiVersion: v1\nkind: Secret\nmetadata:\n  name: first\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: second\n",
    );
    let cluster = MockCluster::with_builtin_discovery();
    let recorder = Recorder::default();

    let report = applier(&cluster, ws.options())
        .apply_with_observer(&ApplyRequest::new(&template, "default"), &recorder)
        .await
        .unwrap();

    let seen = recorder.seen.lock().unwrap();
    assert_eq!(*seen, report.outcomes);
    let names: Vec<&str> = seen.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, ["first", "second"]);
}
