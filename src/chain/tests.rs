use std::sync::{Arc, Mutex};

use super::*;
use crate::invoker::InvokeError;
use crate::test_utils::{
    make_context, FailingInterceptor, MockInvoker, RecordingInterceptor, ShortCircuitInterceptor,
};

fn recording_chain(
    names: &[&str],
    terminal: Arc<MockInvoker>,
) -> (InterceptorChain, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let interceptors: Vec<Arc<dyn Interceptor>> = names
        .iter()
        .map(|n| {
            Arc::new(RecordingInterceptor::new(*n, Arc::clone(&log))) as Arc<dyn Interceptor>
        })
        .collect();
    (InterceptorChain::new(interceptors, terminal), log)
}

#[tokio::test]
async fn test_all_interceptors_run_in_order_then_terminal() {
    let terminal = Arc::new(MockInvoker::returning(Value::from("done")));
    let (chain, log) = recording_chain(&["first", "second", "third"], Arc::clone(&terminal));

    let mut ctx = make_context(Some("svc"), "op", vec![]);
    let result = chain.invoke(&mut ctx).await.unwrap();

    assert_eq!(result, Value::from("done"));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(terminal.invocation_count().await, 1);
}

#[tokio::test]
async fn test_empty_chain_hits_terminal_directly() {
    let terminal = Arc::new(MockInvoker::returning(Value::from(42)));
    let chain = InterceptorChain::new(vec![], Arc::clone(&terminal) as Arc<dyn Invoker>);

    let mut ctx = make_context(Some("svc"), "op", vec![]);
    assert_eq!(chain.invoke(&mut ctx).await.unwrap(), Value::from(42));
    assert_eq!(terminal.invocation_count().await, 1);
}

#[tokio::test]
async fn test_cursor_reset_after_success() {
    let terminal = Arc::new(MockInvoker::new());
    let (chain, _) = recording_chain(&["a", "b"], Arc::clone(&terminal));

    assert!(chain.is_reset());
    let mut ctx = make_context(Some("svc"), "op", vec![]);
    chain.invoke(&mut ctx).await.unwrap();
    assert!(chain.is_reset());
}

#[tokio::test]
async fn test_cursor_reset_after_failure() {
    let terminal = Arc::new(MockInvoker::new());
    terminal
        .set_failure(|| InvokeError::Invocation("terminal down".into()))
        .await;
    let (chain, _) = recording_chain(&["a"], Arc::clone(&terminal));

    let mut ctx = make_context(Some("svc"), "op", vec![]);
    chain.invoke(&mut ctx).await.unwrap_err();
    assert!(chain.is_reset());
}

#[tokio::test]
async fn test_chain_reusable_across_sequential_calls() {
    let terminal = Arc::new(MockInvoker::new());
    let (chain, log) = recording_chain(&["a", "b"], Arc::clone(&terminal));

    for _ in 0..3 {
        let mut ctx = make_context(Some("svc"), "op", vec![]);
        chain.invoke(&mut ctx).await.unwrap();
    }

    assert_eq!(log.lock().unwrap().len(), 6);
    assert_eq!(terminal.invocation_count().await, 3);
}

#[tokio::test]
async fn test_short_circuit_skips_rest_of_chain() {
    let terminal = Arc::new(MockInvoker::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(RecordingInterceptor::new("outer", Arc::clone(&log))),
        Arc::new(ShortCircuitInterceptor::new(Value::from("cached"))),
        Arc::new(RecordingInterceptor::new("never", Arc::clone(&log))),
    ];
    let chain = InterceptorChain::new(interceptors, Arc::clone(&terminal) as Arc<dyn Invoker>);

    let mut ctx = make_context(Some("svc"), "op", vec![]);
    let result = chain.invoke(&mut ctx).await.unwrap();

    assert_eq!(result, Value::from("cached"));
    assert_eq!(*log.lock().unwrap(), vec!["outer"]);
    assert_eq!(terminal.invocation_count().await, 0);
    assert!(chain.is_reset());
}

#[tokio::test]
async fn test_interceptor_failure_propagates_unchanged() {
    let terminal = Arc::new(MockInvoker::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(RecordingInterceptor::new("outer", Arc::clone(&log))),
        Arc::new(FailingInterceptor::new("masked column")),
    ];
    let chain = InterceptorChain::new(interceptors, Arc::clone(&terminal) as Arc<dyn Invoker>);

    let mut ctx = make_context(Some("svc"), "op", vec![]);
    let err = chain.invoke(&mut ctx).await.unwrap_err();

    assert!(matches!(err, InvokeError::Invocation(ref m) if m == "masked column"));
    assert_eq!(terminal.invocation_count().await, 0);
}

#[tokio::test]
async fn test_factory_same_key_yields_same_chain() {
    let terminal: Arc<dyn Invoker> = Arc::new(MockInvoker::new());
    let log = Arc::new(Mutex::new(Vec::new()));
    let factory = ChainFactory::uniform(
        vec![Arc::new(RecordingInterceptor::new("only", log))],
        terminal,
    );

    let key = ChainKey::new("svc", "op");
    let first = factory.chain_for(&key).await;
    let second = factory.chain_for(&key).await;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn test_factory_distinct_keys_get_distinct_chains() {
    let terminal: Arc<dyn Invoker> = Arc::new(MockInvoker::new());
    let factory = ChainFactory::uniform(vec![], terminal);

    let first = factory.chain_for(&ChainKey::new("svc", "read")).await;
    let second = factory.chain_for(&ChainKey::new("svc", "write")).await;

    assert!(!Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_per_call_provider_builds_fresh_chains() {
    let terminal: Arc<dyn Invoker> = Arc::new(MockInvoker::new());
    let provider = ChainProvider::from_factory(Arc::new(ChainFactory::uniform(vec![], terminal)), true);

    let key = ChainKey::new("svc", "op");
    let first = provider.chain_for(&key).await;
    let second = provider.chain_for(&key).await;

    assert!(!Arc::ptr_eq(&first, &second));
}
