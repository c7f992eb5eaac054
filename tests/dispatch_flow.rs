//! End-to-end dispatch flows: proxy -> chain -> dispatcher -> service,
//! with the queue-mediated and cluster-routed variants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trestle::chain::InterceptorChain;
use trestle::cluster::{
    spawn_keep_alive, ClusterInvoker, KeepAliveConfig, LoadMetric, MemberEndpoint, Membership,
};
use trestle::context::Value;
use trestle::dispatch::{queue, Dispatcher, QueueConfig};
use trestle::interceptors::Instrumented;
use trestle::invoker::{InvokeError, Invoker, LocalInvoker, MethodTable, RemoteInvoker};
use trestle::proxy::ServiceProxy;
use trestle::registry::InMemoryRegistry;
use trestle::transport::{CallChannel, LoopbackChannel};

/// Load metric that always reports the same value.
struct FixedLoad(u64);

impl LoadMetric for FixedLoad {
    fn current_load(&self) -> Option<u64> {
        Some(self.0)
    }
}

fn local_chain() -> Arc<InterceptorChain> {
    Arc::new(InterceptorChain::new(vec![], Arc::new(LocalInvoker::new())))
}

/// A "process" hosting the calc service: registry, dispatcher, and a
/// loopback channel standing in for its transport endpoint.
async fn calc_server(host_name: &'static str) -> Arc<Dispatcher> {
    let registry = Arc::new(InMemoryRegistry::new());
    registry
        .register(
            MethodTable::new("calc")
                .register("add", |params: Vec<Value>| async move {
                    let sum: i64 = params.iter().filter_map(|v| v.as_i64()).sum();
                    Ok(Value::from(sum))
                })
                .register("host", move |_| async move { Ok(Value::from(host_name)) }),
        )
        .await;

    Arc::new(
        Dispatcher::builder()
            .registry(registry)
            .fixed_chain(local_chain())
            .build()
            .unwrap(),
    )
}

#[tokio::test]
async fn test_proxy_round_trip_through_remote_dispatcher() {
    let server = calc_server("m1").await;
    let channel: Arc<dyn CallChannel> = Arc::new(LoopbackChannel::new(server));

    let client_chain = Arc::new(InterceptorChain::new(
        vec![Arc::new(Instrumented::new())],
        Arc::new(RemoteInvoker::new(channel)),
    ));
    let proxy = ServiceProxy::builder()
        .target("calc")
        .fixed_chain(client_chain)
        .build()
        .unwrap();

    let result = proxy
        .call("add", vec![Value::from(19), Value::from(23)])
        .await
        .unwrap();
    assert_eq!(result, Value::from(42));
}

#[tokio::test]
async fn test_access_denied_surfaces_to_proxy_caller() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(MethodTable::new("calc")).await;
    let server = Arc::new(
        Dispatcher::builder()
            .registry(registry)
            .allowed_target("calc")
            .fixed_chain(local_chain())
            .build()
            .unwrap(),
    );

    let proxy = ServiceProxy::builder()
        .target("vault")
        .fixed_chain(Arc::new(InterceptorChain::new(
            vec![],
            Arc::new(RemoteInvoker::new(Arc::new(LoopbackChannel::new(server)))),
        )))
        .build()
        .unwrap();

    let err = proxy.call("peek", vec![]).await.unwrap_err();
    assert!(matches!(err, InvokeError::AccessDenied { .. }));
}

#[tokio::test]
async fn test_queue_fire_and_forget_delivery() {
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&deliveries);

    let registry = Arc::new(InMemoryRegistry::new());
    registry
        .register(MethodTable::new("audit").register("record", move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            }
        }))
        .await;

    let dispatcher = Arc::new(
        Dispatcher::builder()
            .registry(registry)
            .fixed_chain(local_chain())
            .build()
            .unwrap(),
    );

    let (queue, worker) = queue::spawn(
        dispatcher,
        QueueConfig {
            capacity: 16,
            retry_limit: 1,
            poll_interval: Duration::from_millis(20),
        },
    );

    for i in 0..3 {
        queue
            .enqueue(trestle::context::InvocationContext::new(
                Some("audit".into()),
                "record",
                vec![Value::from(i)],
            ))
            .await
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    worker.shutdown().await;

    assert_eq!(deliveries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_cluster_call_prefers_least_loaded_live_member() {
    let busy = calc_server("busy-host").await;
    let idle = calc_server("idle-host").await;

    let membership = Arc::new(Membership::new());
    membership
        .join_local(
            MemberEndpoint::new("10.0.0.1", 7400, "calc"),
            busy,
            Arc::new(FixedLoad(40)),
        )
        .await;
    membership
        .join_local(
            MemberEndpoint::new("10.0.0.2", 7400, "calc"),
            idle,
            Arc::new(FixedLoad(2)),
        )
        .await;

    // Let the keep-alive sweep collect each member's load metric.
    let keep_alive = spawn_keep_alive(
        Arc::clone(&membership),
        KeepAliveConfig {
            interval: Duration::from_millis(10),
            failure_threshold: 2,
        },
    );
    tokio::time::sleep(Duration::from_millis(80)).await;

    let proxy = ServiceProxy::builder()
        .target("calc")
        .fixed_chain(Arc::new(InterceptorChain::new(
            vec![],
            Arc::new(ClusterInvoker::new(Arc::clone(&membership))),
        )))
        .build()
        .unwrap();

    let host = proxy.call("host", vec![]).await.unwrap();
    assert_eq!(host, Value::from("idle-host"));

    keep_alive.shutdown().await;
}

#[tokio::test]
async fn test_cluster_call_with_no_members_fails_distinctly() {
    let membership = Arc::new(Membership::new());
    let invoker = ClusterInvoker::new(membership);

    let mut ctx =
        trestle::context::InvocationContext::new(Some("calc".into()), "add", vec![]);
    let err = invoker.invoke(&mut ctx).await.unwrap_err();

    assert!(matches!(err, InvokeError::NoAvailableMember));
}
