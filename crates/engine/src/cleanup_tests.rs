// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn recorder(order: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> impl FnOnce() -> futures::future::BoxFuture<'static, ()> {
    let order = Arc::clone(order);
    move || {
        Box::pin(async move {
            order.lock().push(tag);
        })
    }
}

#[tokio::test]
async fn drains_in_lifo_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("first", recorder(&order, "first"));
    stack.push("second", recorder(&order, "second"));
    stack.push("third", recorder(&order, "third"));

    stack.drain().await;

    assert_eq!(*order.lock(), vec!["third", "second", "first"]);
    assert!(stack.is_empty());
}

#[tokio::test]
async fn drain_on_empty_stack_is_a_no_op() {
    let mut stack = CleanupStack::new();
    stack.drain().await;
    assert!(stack.is_empty());
}

#[tokio::test]
async fn absorbed_callbacks_run_before_earlier_entries() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut job = CleanupStack::new();
    job.push("job-early", recorder(&order, "job-early"));

    let mut target = CleanupStack::new();
    target.push("target-a", recorder(&order, "target-a"));
    target.push("target-b", recorder(&order, "target-b"));
    job.absorb(target);

    job.drain().await;

    assert_eq!(*order.lock(), vec!["target-b", "target-a", "job-early"]);
}

#[tokio::test]
async fn double_drain_is_safe() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut stack = CleanupStack::new();
    stack.push("only", recorder(&order, "only"));
    stack.drain().await;
    stack.drain().await;
    assert_eq!(order.lock().len(), 1);
}
