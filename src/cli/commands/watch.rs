use std::sync::Arc;

use serde::Serialize;

use super::super::render;
use super::super::{Ctx, WatchArgs, print_json_line, print_line};
use crate::Result;
use crate::notify::{ChannelSink, Notification};
use crate::realtime::{BridgeStats, EventEnvelope, RealtimeBridge, StompTransport};

#[derive(Serialize)]
struct WatchedEvent<'a> {
    #[serde(flatten)]
    envelope: &'a EventEnvelope,
    notification: Option<&'a Notification>,
}

pub(crate) fn handle(ctx: &Ctx, args: WatchArgs) -> Result<()> {
    let config = ctx.config.bridge_config(args.topic.clone());
    let endpoint = config.endpoint.addr.clone();

    let (sink, toasts) = ChannelSink::unbounded();
    let (events_tx, events) = crossbeam::channel::unbounded::<EventEnvelope>();
    let bridge = RealtimeBridge::start(
        config,
        StompTransport::new(),
        Arc::new(sink),
        Some(Box::new(move |envelope: &EventEnvelope| {
            let _ = events_tx.send(envelope.clone());
        })),
    )?;
    tracing::info!("watching {} on {endpoint}", args.topic);

    let mut seen = 0u64;
    while args.max_events.is_none_or(|max| seen < max) {
        let Ok(envelope) = events.recv() else {
            break;
        };
        seen += 1;
        // The sink is notified before the callback runs.
        let toast = toasts.try_recv().ok();
        if ctx.json {
            print_json_line(&WatchedEvent {
                envelope: &envelope,
                notification: toast.as_ref(),
            })?;
        } else if let Some(toast) = &toast {
            print_line(&render::render_notification(toast))?;
        }
    }

    bridge.teardown();
    let stats = bridge.stats();
    report_stats(ctx, &stats)
}

fn report_stats(ctx: &Ctx, stats: &BridgeStats) -> Result<()> {
    if ctx.json {
        tracing::debug!(?stats, "watch finished");
        return Ok(());
    }
    eprintln!("{}", render::render_stats(stats));
    Ok(())
}
