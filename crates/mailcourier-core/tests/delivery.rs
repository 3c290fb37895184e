//! End-to-end behavior of fan-out, delivery and the worker cycle.

#![allow(clippy::unwrap_used)]

mod support;

use std::time::Duration;

use chrono::Utc;
use mailcourier_core::{
    Attachment, DeliveryStatus, Dispatcher, Error, Message, RateLimits, Window, Worker, fan_out,
};
use support::{engine, engine_with};

fn newsletter() -> Message {
    Message::new("News <news@x.com>", "October")
        .to("a@x.com")
        .to("b@x.com")
        .to("c@x.com")
        .text("plain body")
        .html("<p>html body</p>")
        .attach(Attachment::new("issue.pdf", "application/pdf", vec![1, 2, 3]))
}

#[tokio::test]
async fn test_send_creates_one_record_per_recipient() {
    let (engine, transport) = engine().await;
    let dispatches = engine.send(&newsletter()).await.unwrap();

    assert_eq!(dispatches.len(), 3);
    for dispatch in &dispatches {
        assert!(matches!(dispatch.result, Ok(DeliveryStatus::Delivered)));
        let record = engine.get(dispatch.email_id).await.unwrap();
        assert_eq!(record.recipient, dispatch.recipient);
        assert_eq!(record.subject, "October");
        assert_eq!(record.sender.address, "news@x.com");
        assert_eq!(record.message_html.as_deref(), Some("<p>html body</p>"));
        assert_eq!(record.attachments.len(), 1);
        assert!(record.sent_at.is_some());
        assert!(record.error.is_none());
    }
    assert_eq!(transport.delivered_to(), vec!["a@x.com", "b@x.com", "c@x.com"]);
    // One ad-hoc connection per record.
    assert_eq!(transport.connects(), 3);
    assert_eq!(transport.closes(), 3);
}

#[tokio::test]
async fn test_schedule_stores_without_sending() {
    let (engine, transport) = engine().await;
    let ids = engine.schedule(&newsletter(), None).await.unwrap();

    assert_eq!(ids.len(), 3);
    assert_eq!(engine.unsent().await.unwrap().len(), 3);
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_zero_recipients_is_not_an_error() {
    let (engine, _) = engine().await;
    let message = Message::new("a@x.com", "nobody");
    assert!(engine.send(&message).await.unwrap().is_empty());
    assert!(engine.schedule(&message, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_message_round_trip() {
    let (engine, _) = engine().await;
    let ids = engine.schedule(&newsletter(), None).await.unwrap();
    let record = engine.get(ids[1]).await.unwrap();

    let drafts = fan_out(&record.message(), record.scheduled_at);
    assert_eq!(drafts.len(), 1);
    let draft = &drafts[0];
    assert_eq!(draft.sender, record.sender);
    assert_eq!(draft.recipient, record.recipient);
    assert_eq!(draft.subject, record.subject);
    assert_eq!(draft.message_txt, record.message_txt);
    assert_eq!(draft.message_html, record.message_html);
    assert_eq!(record.message().attachments, newsletter().attachments);
}

#[tokio::test]
async fn test_scheduled_only_returns_due_records() {
    let (engine, _) = engine().await;
    let future = engine
        .schedule(
            &Message::new("s@x.com", "later").to("later@x.com"),
            Some(Utc::now() + chrono::Duration::hours(1)),
        )
        .await
        .unwrap();
    let past = engine
        .schedule(
            &Message::new("s@x.com", "overdue").to("now@x.com"),
            Some(Utc::now() - chrono::Duration::seconds(5)),
        )
        .await
        .unwrap();

    let due: Vec<_> = engine.scheduled().await.unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(due, past);
    assert!(!due.contains(&future[0]));
    assert_eq!(engine.unsent().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_fan_out_scenario() {
    let (engine, _) = engine().await;
    let before = Utc::now() - chrono::Duration::milliseconds(1);
    let ids = engine
        .schedule(&Message::new("A <a@x.com>", "S").to("b@x.com").to("c@x.com"), None)
        .await
        .unwrap();
    let after = Utc::now();

    assert_eq!(ids.len(), 2);
    let mut recipients = Vec::new();
    let mut scheduled = Vec::new();
    for id in ids {
        let record = engine.get(id).await.unwrap();
        assert_eq!(record.sender.name.as_deref(), Some("A"));
        assert_eq!(record.sender.address, "a@x.com");
        assert_eq!(record.subject, "S");
        assert!(record.sent_at.is_none());
        assert!(record.scheduled_at >= before && record.scheduled_at <= after);
        recipients.push(record.recipient);
        scheduled.push(record.scheduled_at);
    }
    recipients.sort();
    assert_eq!(recipients, vec!["b@x.com", "c@x.com"]);
    assert_eq!(scheduled[0], scheduled[1]);
}

#[tokio::test]
async fn test_per_minute_limit_leaves_second_send_pending() {
    let (engine, transport) = engine_with(RateLimits {
        per_minute: Some(1),
        ..RateLimits::default()
    })
    .await;

    let first = engine.send(&Message::new("s@x.com", "1").to("a@x.com")).await.unwrap();
    assert!(matches!(first[0].result, Ok(DeliveryStatus::Delivered)));

    let second = engine.send(&Message::new("s@x.com", "2").to("b@x.com")).await.unwrap();
    match &second[0].result {
        Err(Error::RateLimited(limit)) => {
            assert_eq!(limit.window, Window::Minute);
            assert_eq!(limit.count, 1);
        }
        other => panic!("expected rate limit, got {other:?}"),
    }

    let record = engine.get(second[0].email_id).await.unwrap();
    assert!(record.sent_at.is_none());
    assert!(record.error.is_none());
    assert_eq!(transport.delivered_to(), vec!["a@x.com"]);
}

#[tokio::test]
async fn test_rejection_is_recorded_not_raised() {
    let (engine, transport) = engine().await;
    transport.refuse("b@x.com");

    let dispatches = engine.send(&newsletter()).await.unwrap();
    let refused = dispatches.iter().find(|d| d.recipient == "b@x.com").unwrap();
    let Ok(DeliveryStatus::Rejected(reason)) = &refused.result else {
        panic!("expected rejection, got {:?}", refused.result);
    };
    assert!(reason.contains("550"));

    let record = engine.get(refused.email_id).await.unwrap();
    assert!(record.sent_at.is_some());
    assert_eq!(record.error.as_deref(), Some(reason.as_str()));
    assert_eq!(transport.delivered_to(), vec!["a@x.com", "c@x.com"]);
}

#[tokio::test]
async fn test_hard_failure_leaves_record_pending() {
    let (engine, transport) = engine().await;
    transport.drop_connection_for("a@x.com");

    let dispatches = engine.send(&Message::new("s@x.com", "x").to("a@x.com")).await.unwrap();
    assert!(matches!(dispatches[0].result, Err(Error::Transport(_))));

    let record = engine.get(dispatches[0].email_id).await.unwrap();
    assert!(record.sent_at.is_none());
    assert!(record.error.is_none());
}

#[tokio::test]
async fn test_get_unknown_id() {
    let (engine, _) = engine().await;
    let err = engine.get(mailcourier_core::EmailId(99)).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_cycle_processes_only_overdue_record() {
    let (engine, transport) = engine().await;
    let overdue = engine
        .schedule(
            &Message::new("s@x.com", "overdue").to("due@x.com"),
            Some(Utc::now() - chrono::Duration::minutes(1)),
        )
        .await
        .unwrap();
    let future = engine
        .schedule(
            &Message::new("s@x.com", "future").to("later@x.com"),
            Some(Utc::now() + chrono::Duration::days(1)),
        )
        .await
        .unwrap();

    let worker = Worker::new(engine.clone(), Duration::ZERO);
    let report = worker.run_cycle().await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.delivered, 1);
    assert!(engine.get(overdue[0]).await.unwrap().sent_at.is_some());
    let untouched = engine.get(future[0]).await.unwrap();
    assert!(untouched.sent_at.is_none() && untouched.error.is_none());
    assert_eq!(transport.delivered_to(), vec!["due@x.com"]);
}

#[tokio::test]
async fn test_cycle_reuses_one_connection_and_survives_failures() {
    let (engine, transport) = engine().await;
    transport.refuse("b@x.com");
    transport.drop_connection_for("c@x.com");
    engine
        .schedule(&newsletter().to("d@x.com"), None)
        .await
        .unwrap();

    let report = Worker::new(engine.clone(), Duration::ZERO).run_cycle().await;

    assert_eq!(report.processed, 4);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.throttled);
    assert_eq!(transport.connects(), 1);
    assert_eq!(transport.closes(), 1);

    let pending = engine.unsent().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recipient, "c@x.com");
}

#[tokio::test]
async fn test_cycle_stops_at_rate_limit() {
    let (engine, transport) = engine_with(RateLimits {
        per_hour: Some(2),
        ..RateLimits::default()
    })
    .await;
    engine.schedule(&newsletter(), None).await.unwrap();

    let report = Worker::new(engine.clone(), Duration::ZERO).run_cycle().await;
    assert_eq!(report.delivered, 2);
    assert!(report.throttled);
    assert_eq!(transport.delivered_to(), vec!["a@x.com", "b@x.com"]);

    let pending = engine.unsent().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].recipient, "c@x.com");
}

#[tokio::test]
async fn test_unreachable_server_skips_cycle() {
    let (engine, transport) = engine().await;
    transport.set_unreachable(true);
    engine.schedule(&newsletter(), None).await.unwrap();

    let worker = Worker::new(engine.clone(), Duration::ZERO);
    let report = worker.run_cycle().await;
    assert_eq!(report, mailcourier_core::CycleReport::default());
    assert_eq!(engine.unsent().await.unwrap().len(), 3);

    transport.set_unreachable(false);
    assert_eq!(worker.run_cycle().await.delivered, 3);
}

#[tokio::test]
async fn test_empty_cycle_does_not_connect() {
    let (engine, transport) = engine().await;
    let report = Worker::new(engine, Duration::ZERO).run_cycle().await;
    assert_eq!(report.processed, 0);
    assert_eq!(transport.connects(), 0);
}

#[tokio::test]
async fn test_dispatcher_worker_lifecycle() {
    let (engine, transport) = engine().await;
    let dispatcher = Dispatcher::new(engine, Duration::from_millis(20));

    assert!(!dispatcher.is_running());
    assert!(dispatcher.start_worker());
    assert!(!dispatcher.start_worker());
    assert!(dispatcher.is_running());

    dispatcher.schedule(&newsletter(), None).await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while transport.delivered_to().len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(transport.delivered_to().len(), 3);

    dispatcher.stop_worker().await;
    assert!(!dispatcher.is_running());
    assert!(dispatcher.engine().unsent().await.unwrap().is_empty());

    // Stopping twice is harmless, and the worker can be started again.
    dispatcher.stop_worker().await;
    assert!(dispatcher.start_worker());
    dispatcher.stop_worker().await;
}

#[tokio::test]
async fn test_stop_interrupts_long_wait() {
    let (engine, _) = engine().await;
    let dispatcher = Dispatcher::new(engine, Duration::from_secs(3600));
    dispatcher.start_worker();

    tokio::time::timeout(Duration::from_secs(5), dispatcher.stop_worker())
        .await
        .unwrap();
    assert!(!dispatcher.is_running());
}

#[tokio::test]
async fn test_stop_lets_running_batch_finish() {
    let (engine, transport) = engine().await;
    transport.drop_connection_for("c@x.com");
    let (parked, release) = transport.hold_next_send();
    let ids = engine.schedule(&newsletter(), None).await.unwrap();

    let dispatcher = Dispatcher::new(engine, Duration::from_millis(10));
    dispatcher.start_worker();
    tokio::time::timeout(Duration::from_secs(5), parked.notified())
        .await
        .unwrap();

    // Stop is signalled while the first send is still parked.
    let release_later = async {
        tokio::task::yield_now().await;
        release.notify_one();
    };
    tokio::time::timeout(
        Duration::from_secs(5),
        async { tokio::join!(dispatcher.stop_worker(), release_later) },
    )
    .await
    .unwrap();
    assert!(!dispatcher.is_running());

    let engine = dispatcher.engine();
    assert!(engine.get(ids[0]).await.unwrap().sent_at.is_some());
    assert!(engine.get(ids[1]).await.unwrap().sent_at.is_some());
    // The hard failure stays pending; a second cycle would have retried it.
    assert!(engine.get(ids[2]).await.unwrap().is_pending());
    assert_eq!(transport.delivered_to(), vec!["a@x.com", "b@x.com"]);
    assert_eq!(transport.connects(), 1);
}
