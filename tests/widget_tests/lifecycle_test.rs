use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use widget_bridge::{
    create_preview_widget, create_widget, create_widget_with_config, Allocation, ErrorCode,
    PreviewSessionConfig, SessionDescriptor, SessionType, StyleMode, WidgetConfig, WidgetResult,
    WidgetState,
};

use crate::{host, mount_ready, post_from_frame, settle, spawn_mount, READY_S1};

#[tokio::test]
async fn test_live_widget_mount_and_ready() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;

    mount_ready(&host, &widget, READY_S1.clone()).await?;

    assert!(widget.is_ready());
    assert_eq!(widget.get_session_id().as_deref(), Some("s1"));
    assert_eq!(widget.get_type(), Some(SessionType::AddOn));
    assert_eq!(widget.state(), WidgetState::Ready);
    Ok(())
}

#[tokio::test]
async fn test_frame_address_and_origin() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(
        host.clone(),
        SessionDescriptor::new("s1", "k").with_style_mode(StyleMode::Light),
    )?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    let frame = host.current_frame().expect("frame");
    let address = widget.frame_address().expect("address");
    assert_eq!(frame.spec.src, address);
    assert_eq!(address.query(), Some("sessionId=s1&styleMode=light"));
    assert_eq!(frame.spec.allow, "payment");
    assert_eq!(widget.target_origin(), address.origin().ascii_serialization());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mount_without_ready_times_out() {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k")).unwrap();

    let started = tokio::time::Instant::now();
    let err = widget.mount(crate::CONTAINER).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(started.elapsed() >= Duration::from_secs(10));

    // 3 attempts by default, then the transport gives up.
    let inits = host
        .posted_types()
        .iter()
        .filter(|t| t.as_str() == "init")
        .count();
    assert_eq!(inits, 3);
}

#[tokio::test(start_paused = true)]
async fn test_late_ready_after_timeout_still_readies() {
    let host = host();
    let widget = create_widget_with_config(
        host.clone(),
        SessionDescriptor::new("s1", "k"),
        WidgetConfig {
            default_timeout: Duration::from_secs(1),
            ..Default::default()
        },
    )
    .unwrap();
    let err = widget.mount(crate::CONTAINER).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::Timeout);
    assert!(!widget.is_ready());

    post_from_frame(&host, READY_S1.clone());
    settle().await;
    assert!(widget.is_ready());
    assert_eq!(widget.state(), WidgetState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_mid_mount_never_times_out() {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k")).unwrap();
    let mounting = spawn_mount(&widget);
    settle().await;

    widget.destroy();
    let err = mounting.await.unwrap().unwrap_err();
    assert_eq!(err.code(), ErrorCode::Cancelled);

    // Nothing fires once the default window has long passed.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(widget.state(), WidgetState::Destroyed);
    assert!(host.posted_types().iter().all(|t| t != "destroy"));
    assert_eq!(host.attached_frames(), 0);
    assert_eq!(host.listener_count(), 0);
}

#[tokio::test]
async fn test_destroy_after_ready_notifies_frame() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    widget.destroy();
    widget.destroy();

    assert_eq!(
        host.posted_types()
            .iter()
            .filter(|t| t.as_str() == "destroy")
            .count(),
        1
    );
    assert!(!widget.is_ready());
    assert_eq!(host.attached_frames(), 0);
    Ok(())
}

#[tokio::test]
async fn test_mount_while_ready_remounts() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;
    let first = host.current_frame().expect("frame").frame;

    let mounting = spawn_mount(&widget);
    settle().await;
    assert_eq!(widget.state(), WidgetState::Mounting);
    assert!(!widget.is_ready());

    let second = host.current_frame().expect("frame").frame;
    assert_ne!(first, second);
    assert_eq!(host.attached_frames(), 1);
    assert_eq!(host.listener_count(), 1);

    post_from_frame(&host, READY_S1.clone());
    mounting.await.expect("mount task")?;
    assert!(widget.is_ready());
    Ok(())
}

#[tokio::test]
async fn test_dropping_last_handle_tears_down() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    drop(widget);
    settle().await;
    assert_eq!(host.attached_frames(), 0);
    assert_eq!(host.listener_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_preview_ready_assigns_session_id() -> WidgetResult<()> {
    let host = host();
    let widget = create_preview_widget(
        host.clone(),
        PreviewSessionConfig::add_on(1_000, vec!["c1".into(), "c2".into()]),
    )?;
    assert_eq!(widget.get_session_id(), None);

    mount_ready(
        &host,
        &widget,
        json!({"type": "ready", "payload": {"sessionId": "preview-42", "version": "1.0"}}),
    )
    .await?;
    assert_eq!(widget.get_session_id().as_deref(), Some("preview-42"));
    assert_eq!(widget.get_type(), Some(SessionType::AddOn));
    Ok(())
}

#[tokio::test]
async fn test_preview_refresh_sends_nothing() -> WidgetResult<()> {
    let host = host();
    let widget = create_preview_widget(
        host.clone(),
        PreviewSessionConfig::portion_of_sales(vec![Allocation::new("c1", 300)]),
    )?;
    widget.refresh().await?;
    assert_eq!(widget.pending_len(), 0);

    mount_ready(&host, &widget, json!({"type": "ready", "payload": {}})).await?;
    widget.refresh().await?;
    settle().await;
    assert!(host.posted_types().iter().all(|t| t != "refresh"));
    Ok(())
}
