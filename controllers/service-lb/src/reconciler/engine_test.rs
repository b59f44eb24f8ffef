//! End-to-end convergence tests against the in-memory mock cloud

#[cfg(test)]
mod tests {
    use iaas_client::{AssociatedResource, Eip, IaasClientTrait, MockIaasClient, SecurityGroup};

    use crate::error::ControllerError;
    use crate::test_utils::*;

    fn mock() -> MockIaasClient {
        MockIaasClient::new("https://mock.iaas.example")
    }

    #[tokio::test]
    async fn test_ensure_creates_the_full_resource_graph() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        let status = reconciler.ensure(&service, &nodes).await.unwrap();

        let ingress = status.ingress.unwrap();
        assert_eq!(ingress.len(), 1);
        assert!(ingress[0].ip.is_some());

        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lb.eips.len(), 1);
        assert!(lb.security_group_id.is_some());

        let listeners = client.list_listeners(&lb.id).await.unwrap();
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].port, 80);
        let backends = client.list_backends(&listeners[0].id).await.unwrap();
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].resource_id, "i-aaa");
        assert_eq!(backends[0].port, 30080);
    }

    #[tokio::test]
    async fn test_second_ensure_applies_no_mutations() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080), (443, 30443)], &[]);
        let nodes = vec![
            create_test_node("node-1", "i-aaa", "10.0.0.1"),
            create_test_node("node-2", "i-bbb", "10.0.0.2"),
        ];

        let first = reconciler.ensure(&service, &nodes).await.unwrap();
        client.clear_mutations();

        let second = reconciler.ensure(&service, &nodes).await.unwrap();

        assert_eq!(first, second);
        assert!(
            client.mutations().is_empty(),
            "converged re-run mutated the cloud: {:?}",
            client.mutations()
        );
    }

    #[tokio::test]
    async fn test_second_ensure_with_tags_applies_no_mutations() {
        let client = mock();
        let reconciler =
            create_test_reconciler_with_tags(client.clone(), vec!["tag-cluster".to_string()]);
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        reconciler.ensure(&service, &nodes).await.unwrap();
        let log = client.mutations();
        assert!(log.iter().any(|m| m.starts_with("attach_tags load_balancer")));
        assert!(log.iter().any(|m| m.starts_with("attach_tags security_group")));

        client.clear_mutations();
        reconciler.ensure(&service, &nodes).await.unwrap();
        assert!(client.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_port_change_removes_before_adding() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        let before = create_test_service("default", "web", &[(80, 30080)], &[]);
        reconciler.ensure(&before, &nodes).await.unwrap();
        client.clear_mutations();

        let after = create_test_service("default", "web", &[(443, 30443)], &[]);
        reconciler.ensure(&after, &nodes).await.unwrap();

        let log = client.mutations();
        let removed = log
            .iter()
            .position(|m| m.starts_with("delete_listener"))
            .expect("stale listener was not removed");
        let added = log
            .iter()
            .position(|m| m.starts_with("add_listener"))
            .expect("new listener was not added");
        assert!(removed < added, "listener addition preceded removal: {:?}", log);

        let rule_removed = log
            .iter()
            .position(|m| m.starts_with("delete_security_group_rule"))
            .expect("stale rule was not removed");
        let rule_added = log
            .iter()
            .position(|m| m.starts_with("add_security_group_rule"))
            .expect("new rule was not added");
        assert!(rule_removed < rule_added, "rule addition preceded removal: {:?}", log);
    }

    #[tokio::test]
    async fn test_node_set_change_converges_backends() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);

        let before = vec![
            create_test_node("node-1", "i-aaa", "10.0.0.1"),
            create_test_node("node-2", "i-bbb", "10.0.0.2"),
        ];
        reconciler.ensure(&service, &before).await.unwrap();
        client.clear_mutations();

        // node-2 drained away, node-3 joined
        let after = vec![
            create_test_node("node-1", "i-aaa", "10.0.0.1"),
            create_test_node("node-3", "i-ccc", "10.0.0.3"),
        ];
        reconciler.ensure(&service, &after).await.unwrap();

        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap()
            .unwrap();
        let listeners = client.list_listeners(&lb.id).await.unwrap();
        let backends = client.list_backends(&listeners[0].id).await.unwrap();
        let members: Vec<&str> = backends.iter().map(|b| b.resource_id.as_str()).collect();
        assert_eq!(members, vec!["i-aaa", "i-ccc"]);

        let log = client.mutations();
        assert!(log.iter().any(|m| m.starts_with("delete_backend")));
        assert!(log.iter().any(|m| m.contains("i-ccc")));
    }

    #[tokio::test]
    async fn test_reuse_conflict_fails_without_mutations() {
        let client = mock();
        client.add_eip(Eip {
            id: "eip-taken".to_string(),
            name: "someone-elses".to_string(),
            address: "203.0.113.99".to_string(),
            status: "associated".to_string(),
            owner: TEST_USER.to_string(),
            associated_resource: Some(AssociatedResource {
                resource_id: "lb-other".to_string(),
                resource_type: "load_balancer".to_string(),
            }),
        });
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service(
            "default",
            "web",
            &[(80, 30080)],
            &[("service.beta.kubernetes.io/lb-eip-ids", "eip-taken")],
        );
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        let result = reconciler.ensure(&service, &nodes).await;

        assert!(matches!(result, Err(ControllerError::Conflict(_))));
        assert!(
            client.mutations().is_empty(),
            "conflicting ensure mutated the cloud: {:?}",
            client.mutations()
        );
    }

    #[tokio::test]
    async fn test_reuse_of_foreign_eip_is_a_validation_error() {
        let client = mock();
        client.add_eip(Eip {
            id: "eip-foreign".to_string(),
            name: "foreign".to_string(),
            address: "203.0.113.50".to_string(),
            status: "available".to_string(),
            owner: "usr-other".to_string(),
            associated_resource: None,
        });
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service(
            "default",
            "web",
            &[(80, 30080)],
            &[("service.beta.kubernetes.io/lb-eip-ids", "eip-foreign")],
        );

        let result = reconciler.ensure(&service, &[]).await;

        assert!(matches!(result, Err(ControllerError::Validation(_))));
        assert!(client.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_get_status_reports_absence_without_error() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);

        let (status, exists) = reconciler.get_status(&service).await.unwrap();
        assert!(status.is_none());
        assert!(!exists);

        reconciler.ensure(&service, &[]).await.unwrap();
        let (status, exists) = reconciler.get_status(&service).await.unwrap();
        assert!(status.is_some());
        assert!(exists);
    }

    #[tokio::test]
    async fn test_delete_of_absent_balancer_succeeds() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "gone", &[(80, 30080)], &[]);

        reconciler.delete(&service, false).await.unwrap();
        assert!(client.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_delete_twice_with_skip_check_succeeds() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        reconciler.ensure(&service, &nodes).await.unwrap();
        reconciler.delete(&service, true).await.unwrap();
        reconciler.delete(&service, true).await.unwrap();

        let remaining = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap();
        assert!(remaining.is_none());
    }

    #[tokio::test]
    async fn test_delete_releases_allocated_eip() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);

        reconciler.ensure(&service, &[]).await.unwrap();
        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap()
            .unwrap();
        let eip_id = lb.eips[0].id.clone();
        let sg_id = lb.security_group_id.clone().unwrap();

        reconciler.delete(&service, false).await.unwrap();

        assert!(client.eip(&eip_id).is_none(), "allocated EIP was not released");
        assert!(client.describe_security_group(&sg_id).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_keeps_reused_eip() {
        let client = mock();
        client.add_eip(Eip {
            id: "eip-external".to_string(),
            name: "operator-owned".to_string(),
            address: "203.0.113.10".to_string(),
            status: "available".to_string(),
            owner: TEST_USER.to_string(),
            associated_resource: None,
        });
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service(
            "default",
            "web",
            &[(80, 30080)],
            &[("service.beta.kubernetes.io/lb-eip-ids", "eip-external")],
        );

        reconciler.ensure(&service, &[]).await.unwrap();
        reconciler.delete(&service, false).await.unwrap();

        let eip = client.eip("eip-external").expect("reused EIP was released");
        assert!(eip.associated_resource.is_none(), "reused EIP is still bound");
    }

    #[tokio::test]
    async fn test_delete_keeps_operator_attached_security_group() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);

        reconciler.ensure(&service, &[]).await.unwrap();
        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap()
            .unwrap();

        // An operator swaps in their own group out-of-band
        client.add_security_group(SecurityGroup {
            id: "sg-operator".to_string(),
            name: "operator-sg".to_string(),
        });
        client.attach_security_group("sg-operator", &lb.id).await.unwrap();

        reconciler.delete(&service, false).await.unwrap();

        client
            .describe_security_group("sg-operator")
            .await
            .expect("delete destroyed a security group the controller does not own");
        let remaining = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap();
        assert!(remaining.is_none());
    }

    #[tokio::test]
    async fn test_switch_to_reuse_replaces_allocated_address() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        let allocate = create_test_service("default", "web", &[(80, 30080)], &[]);
        reconciler.ensure(&allocate, &nodes).await.unwrap();
        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap()
            .unwrap();
        let allocated_id = lb.eips[0].id.clone();

        client.add_eip(Eip {
            id: "eip-wanted".to_string(),
            name: "operator-owned".to_string(),
            address: "203.0.113.200".to_string(),
            status: "available".to_string(),
            owner: TEST_USER.to_string(),
            associated_resource: None,
        });
        let reuse = create_test_service(
            "default",
            "web",
            &[(80, 30080)],
            &[("service.beta.kubernetes.io/lb-eip-ids", "eip-wanted")],
        );
        let status = reconciler.ensure(&reuse, &nodes).await.unwrap();

        let ips: Vec<&str> = status
            .ingress
            .as_deref()
            .unwrap()
            .iter()
            .filter_map(|i| i.ip.as_deref())
            .collect();
        assert_eq!(ips, vec!["203.0.113.200"], "stale allocated address still published");
        assert!(client.eip(&allocated_id).is_none(), "stale allocated EIP was not released");
    }

    #[tokio::test]
    async fn test_switch_to_allocate_detaches_reused_address() {
        let client = mock();
        client.add_eip(Eip {
            id: "eip-external".to_string(),
            name: "operator-owned".to_string(),
            address: "203.0.113.10".to_string(),
            status: "available".to_string(),
            owner: TEST_USER.to_string(),
            associated_resource: None,
        });
        let reconciler = create_test_reconciler(client.clone());
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        let reuse = create_test_service(
            "default",
            "web",
            &[(80, 30080)],
            &[("service.beta.kubernetes.io/lb-eip-ids", "eip-external")],
        );
        reconciler.ensure(&reuse, &nodes).await.unwrap();

        let allocate = create_test_service("default", "web", &[(80, 30080)], &[]);
        let status = reconciler.ensure(&allocate, &nodes).await.unwrap();

        let ingress = status.ingress.unwrap();
        assert_eq!(ingress.len(), 1);
        assert_ne!(ingress[0].ip.as_deref(), Some("203.0.113.10"));

        let eip = client.eip("eip-external").expect("reused EIP was released");
        assert!(eip.associated_resource.is_none(), "reused EIP is still bound");
    }

    #[tokio::test]
    async fn test_delete_detaches_tags() {
        let client = mock();
        let reconciler =
            create_test_reconciler_with_tags(client.clone(), vec!["tag-cluster".to_string()]);
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);

        reconciler.ensure(&service, &[]).await.unwrap();
        client.clear_mutations();
        reconciler.delete(&service, false).await.unwrap();

        let log = client.mutations();
        assert!(log.iter().any(|m| m.starts_with("detach_tags load_balancer")));
        assert!(log.iter().any(|m| m.starts_with("detach_tags security_group")));
    }

    #[tokio::test]
    async fn test_update_delegates_to_ensure() {
        let client = mock();
        let reconciler = create_test_reconciler(client.clone());
        let service = create_test_service("default", "web", &[(80, 30080)], &[]);
        let nodes = vec![create_test_node("node-1", "i-aaa", "10.0.0.1")];

        reconciler.update(&service, &nodes).await.unwrap();

        let lb = client
            .describe_load_balancer_by_name("k8s-testcluster-default-web")
            .await
            .unwrap();
        assert!(lb.is_some());
    }
}
