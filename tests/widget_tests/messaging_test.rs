use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use widget_bridge::{
    create_widget, handler,
    host::{MountTarget, WindowId},
    message::{InboundMessage, OutboundMessage},
    transport::{Delivery, InboundSink, Transport},
    EventKind, ErrorCode, PreviewSessionConfig, SessionDescriptor, WidgetConfig, WidgetResult,
};

use crate::{host, mount_ready, post_from_frame, settle, spawn_mount, CONTAINER, READY_S1};

#[derive(Default)]
struct Collected(Mutex<Vec<InboundMessage>>);

impl InboundSink for Collected {
    fn deliver(&self, message: InboundMessage) {
        self.0.lock().unwrap().push(message);
    }
}

#[tokio::test]
async fn test_commands_before_ready_flush_in_issue_order() {
    let host = host();
    let transport = Transport::new(
        host.clone(),
        &Url::parse("https://widget.test/embed").unwrap(),
        WidgetConfig::default(),
    )
    .unwrap();
    let sink: Arc<dyn InboundSink> = Arc::new(Collected::default());
    let weak: Weak<dyn InboundSink> = Arc::downgrade(&sink);

    transport
        .mount(
            &MountTarget::id(CONTAINER),
            Url::parse("https://widget.test/embed?preview=true").unwrap(),
            OutboundMessage::PreviewInit {
                config: PreviewSessionConfig::choice(500, vec!["c1".into()]),
            },
            weak,
        )
        .unwrap();

    let issued = [
        OutboundMessage::Refresh,
        OutboundMessage::Destroy,
        OutboundMessage::Refresh,
        OutboundMessage::Refresh,
        OutboundMessage::Destroy,
    ];
    for command in issued.iter().cloned() {
        assert_eq!(transport.send(command), Delivery::Queued);
    }
    assert!(host.posted_types().iter().all(|t| t == "preview-init"));

    post_from_frame(&host, json!({"type": "ready", "payload": {}}));
    settle().await;

    let expected: Vec<String> = issued
        .iter()
        .map(|c| c.message_type().to_string())
        .collect();
    let flushed: Vec<String> = host
        .posted_types()
        .into_iter()
        .filter(|t| t != "preview-init")
        .collect();
    assert_eq!(flushed, expected);
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn test_refresh_before_ready_is_queued_then_resolves() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    let mounting = spawn_mount(&widget);
    settle().await;

    let refreshing = tokio::spawn({
        let widget = widget.clone();
        async move { widget.refresh().await }
    });
    settle().await;
    assert_eq!(widget.pending_len(), 1);
    assert!(host.posted_types().iter().all(|t| t != "refresh"));

    post_from_frame(&host, READY_S1.clone());
    mounting.await.expect("mount task")?;
    settle().await;
    assert!(host.posted_types().iter().any(|t| t == "refresh"));

    post_from_frame(
        &host,
        json!({
            "type": "session-updated",
            "payload": {"type": "choice", "session_id": "s1", "amount": 500, "available_campaigns": []}
        }),
    );
    refreshing.await.expect("refresh task")?;
    Ok(())
}

#[tokio::test]
async fn test_ready_with_unfamiliar_fields_still_completes_mount() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    let mounting = spawn_mount(&widget);
    settle().await;
    let _refreshing = tokio::spawn({
        let widget = widget.clone();
        async move { widget.refresh().await }
    });
    settle().await;
    assert_eq!(widget.pending_len(), 1);

    post_from_frame(
        &host,
        json!({
            "type": "ready",
            "payload": {"sessionId": "s1", "version": 1, "type": "subscription"}
        }),
    );
    mounting.await.expect("mount task")?;
    settle().await;

    assert!(widget.is_ready());
    assert_eq!(widget.pending_len(), 0);
    assert!(host.posted_types().iter().any(|t| t == "refresh"));
    assert_eq!(widget.get_type(), None);
    assert_eq!(widget.get_version().as_deref(), Some("1"));
    Ok(())
}

#[tokio::test]
async fn test_messages_from_other_windows_or_origins_are_ignored() {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k")).unwrap();
    let mounting = spawn_mount(&widget);
    settle().await;
    let frame = host.current_frame().unwrap();

    host.deliver(Some(WindowId(424_242)), &frame.origin(), READY_S1.clone());
    host.deliver(Some(frame.content_window), "https://attacker.test", READY_S1.clone());
    settle().await;
    assert!(!widget.is_ready());

    post_from_frame(&host, READY_S1.clone());
    mounting.await.unwrap().unwrap();
    assert!(widget.is_ready());
}

#[tokio::test]
async fn test_malformed_and_unknown_messages() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let seen = seen.clone();
        handler(move |message| {
            seen.lock().unwrap().push(message.kind().to_string());
            Ok(())
        })
    };
    widget
        .on(EventKind::Resize, &record)
        .on("checkout-started", &record);

    for raw in [
        json!(null),
        json!("ready"),
        json!([1, 2, 3]),
        json!({"payload": {}}),
        json!({"type": ""}),
        json!({"type": "resize", "payload": {"width": true}}),
    ] {
        post_from_frame(&host, raw);
    }
    post_from_frame(&host, json!({"type": "checkout-started", "payload": {"step": 1}}));
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec!["checkout-started".to_string()]);
    assert!(widget.is_ready());
    Ok(())
}

#[tokio::test]
async fn test_failing_handler_does_not_starve_siblings() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    let reached = Arc::new(Mutex::new(0));
    widget.on(EventKind::Error, &handler(|_| Err("first handler fails".into())));
    widget.on(EventKind::Error, &handler(|_| panic!("second handler panics")));
    {
        let reached = reached.clone();
        widget.on(
            EventKind::Error,
            &handler(move |_| {
                *reached.lock().unwrap() += 1;
                Ok(())
            }),
        );
    }

    post_from_frame(&host, json!({"type": "error", "payload": {"message": "card declined"}}));
    settle().await;
    assert_eq!(*reached.lock().unwrap(), 1);
    assert!(widget.is_ready());
    Ok(())
}

#[tokio::test]
async fn test_wait_for_resolves_with_payload_once() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    let waiting = tokio::spawn({
        let widget = widget.clone();
        async move { widget.wait_for(EventKind::Destroyed, None).await }
    });
    settle().await;
    post_from_frame(&host, json!({"type": "destroyed", "payload": {"sessionId": "s1"}}));
    post_from_frame(&host, json!({"type": "destroyed", "payload": {"sessionId": "other"}}));

    match waiting.await.expect("wait task")? {
        InboundMessage::Destroyed(payload) => assert_eq!(payload.session_id.as_deref(), Some("s1")),
        other => panic!("unexpected message: {:?}", other),
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_times_out() {
    let host = host();
    let widget = create_widget(host, SessionDescriptor::new("s1", "k")).unwrap();
    let err = widget
        .wait_for(EventKind::SessionUpdated, Some(Duration::from_millis(250)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
}
