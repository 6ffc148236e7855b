mod widget_tests;

use std::sync::Arc;

use lazy_static::lazy_static;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use widget_bridge::{InMemoryHost, Widget, WidgetResult};

#[ctor::ctor]
fn init_tests() {
    // テストの前に一度だけ実行したい処理
    // tracing_subscriberの初期化
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

pub const CONTAINER: &str = "widget-container";

lazy_static! {
    /// The `ready` a live add-on session answers with.
    pub static ref READY_S1: Value = json!({
        "type": "ready",
        "payload": {"sessionId": "s1", "version": "1.0", "type": "add_on"}
    });
}

pub fn host() -> Arc<InMemoryHost> {
    Arc::new(
        InMemoryHost::new()
            .with_container(CONTAINER)
            .with_auto_load(true),
    )
}

/// Lets spawned pump and mount tasks run to their next suspension point.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn spawn_mount(widget: &Widget) -> JoinHandle<WidgetResult<()>> {
    let widget = widget.clone();
    tokio::spawn(async move { widget.mount(CONTAINER).await })
}

/// Posts `message` from the most recently mounted frame.
pub fn post_from_frame(host: &InMemoryHost, message: Value) {
    let frame = host.current_frame().expect("no frame mounted");
    host.deliver_from_frame(frame.frame, message)
        .expect("frame detached");
}

/// Mounts `widget` and answers with `ready`.
pub async fn mount_ready(host: &InMemoryHost, widget: &Widget, ready: Value) -> WidgetResult<()> {
    let mounting = spawn_mount(widget);
    settle().await;
    post_from_frame(host, ready);
    mounting.await.expect("mount task panicked")
}
