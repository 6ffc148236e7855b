use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use widget_bridge::{
    create_preview_widget, create_widget, handler,
    message::{decode, AllocationsUpdate, InboundMessage},
    Allocation, EventKind, PreviewSessionConfig, SessionData, SessionDescriptor, SessionType,
    WidgetResult,
};

use crate::{host, mount_ready, post_from_frame, settle, READY_S1};

#[tokio::test]
async fn test_session_update_replaces_cache_before_handlers_run() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    // Handlers observe the cache already updated.
    let observed = Arc::new(Mutex::new(None));
    {
        let observed = observed.clone();
        let reader = widget.clone();
        widget.on(
            EventKind::SessionUpdated,
            &handler(move |_| {
                *observed.lock().unwrap() = Some(reader.total_amount());
                Ok(())
            }),
        );
    }

    post_from_frame(
        &host,
        json!({
            "type": "session-updated",
            "payload": {
                "type": "portion_of_sales",
                "session_id": "s1",
                "allocations": [
                    {"campaign_identifier": "c1", "amount": 300},
                    {"campaign_identifier": "c2", "amount": 450}
                ],
                "total_amount": 750,
                "merchant_name": "Corner Cafe"
            }
        }),
    );
    settle().await;

    assert_eq!(*observed.lock().unwrap(), Some(750));
    assert_eq!(widget.get_type(), Some(SessionType::PortionOfSales));
    assert_eq!(widget.get_allocations().len(), 2);
    match widget.get_session_data() {
        Some(SessionData::PortionOfSales(data)) => {
            assert_eq!(data.total_amount, Some(750));
            assert_eq!(data.extra["merchant_name"], json!("Corner Cafe"));
        }
        other => panic!("unexpected session data: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_allocations_update_does_not_touch_session_data() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;

    post_from_frame(
        &host,
        json!({
            "type": "session-updated",
            "payload": {
                "type": "add_on",
                "amount": 1000,
                "available_campaigns": [{"identifier": "c1", "name": "Trees"}],
                "allocations": [{"campaign_identifier": "c1", "amount": 1000}]
            }
        }),
    );
    post_from_frame(
        &host,
        json!({
            "type": "allocations-updated",
            "payload": {
                "allocations": [
                    {"campaign_identifier": "c1", "amount": 600},
                    {"campaign_identifier": "c1", "amount": 400}
                ],
                "totalAmount": 1000
            }
        }),
    );
    settle().await;

    assert_eq!(
        widget.get_allocations(),
        vec![Allocation::new("c1", 600), Allocation::new("c1", 400)]
    );
    let data = widget.get_session_data().expect("session data");
    assert_eq!(data.allocations(), &[Allocation::new("c1", 1000)]);
    assert_eq!(widget.total_amount(), 1000);
    Ok(())
}

#[tokio::test]
async fn test_resize_adjusts_each_dimension_independently() -> WidgetResult<()> {
    let host = host();
    let widget = create_preview_widget(
        host.clone(),
        PreviewSessionConfig::choice(500, vec!["c1".into()]),
    )?;
    mount_ready(&host, &widget, json!({"type": "ready", "payload": {}})).await?;

    post_from_frame(&host, json!({"type": "resize", "payload": {"height": 720}}));
    settle().await;
    let frame = host.current_frame().expect("frame");
    assert_eq!((frame.width.as_str(), frame.height.as_str()), ("100%", "720px"));

    post_from_frame(&host, json!({"type": "resize", "payload": {"width": "80vw"}}));
    settle().await;
    let frame = host.current_frame().expect("frame");
    assert_eq!((frame.width.as_str(), frame.height.as_str()), ("80vw", "720px"));
    Ok(())
}

#[tokio::test]
async fn test_cache_survives_destroy() -> WidgetResult<()> {
    let host = host();
    let widget = create_widget(host.clone(), SessionDescriptor::new("s1", "k"))?;
    mount_ready(&host, &widget, READY_S1.clone()).await?;
    post_from_frame(
        &host,
        json!({"type": "allocations-updated", "payload": {"allocations": [{"campaign_identifier": "c9", "amount": 5}], "totalAmount": 5}}),
    );
    settle().await;

    widget.destroy();
    assert_eq!(widget.get_allocations(), vec![Allocation::new("c9", 5)]);
    assert_eq!(widget.get_session_id().as_deref(), Some("s1"));
    Ok(())
}

fn arb_allocations() -> impl Strategy<Value = Vec<Allocation>> {
    prop::collection::vec(("[a-z][a-z0-9]{0,8}", 0u64..1_000_000), 0..16).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(campaign, amount)| Allocation::new(campaign, amount))
            .collect()
    })
}

proptest! {
    #[test]
    fn prop_allocation_total_matches_sum(allocations in arb_allocations()) {
        let update = AllocationsUpdate::new(allocations.clone());
        let raw = json!({"type": "allocations-updated", "payload": serde_json::to_value(&update).unwrap()});

        match decode(&raw).unwrap() {
            InboundMessage::AllocationsUpdated(decoded) => {
                prop_assert!(decoded.is_consistent());
                prop_assert_eq!(decoded.total_amount, allocations.iter().map(|a| a.amount).sum::<u64>());
                prop_assert_eq!(decoded.allocations, allocations);
            }
            other => prop_assert!(false, "unexpected message: {:?}", other),
        }
    }

    #[test]
    fn prop_skewed_total_is_detected(allocations in arb_allocations(), skew in 1u64..1_000) {
        let update = AllocationsUpdate {
            total_amount: AllocationsUpdate::new(allocations.clone()).total_amount + skew,
            allocations,
        };
        prop_assert!(!update.is_consistent());
    }
}
