//! Playback session example
//!
//! Drives a session through a start, a network failure with CDN rotation,
//! a delayed refetch and a sponsor skip.
//!
//! Run with: cargo run -p reprise-core --example session

use async_trait::async_trait;
use reprise_core::{
    AudioRepresentation, CooldownManager, EngineConfig, Entitlement, ErrorCode, NetworkClass,
    PlaybackErrorSignal, PlaybackSession, QualityId, RecoveryAction, Representation,
    RepresentationSet, RepresentationSource, SkipInterval,
};
use std::sync::Arc;

struct DemoSource;

#[async_trait]
impl RepresentationSource for DemoSource {
    async fn fetch(
        &self,
        item_key: &str,
        quality: QualityId,
    ) -> reprise_core::Result<RepresentationSet> {
        println!("  fetching {} at quality {}", item_key, quality);
        demo_ladder()
    }
}

fn demo_ladder() -> reprise_core::Result<RepresentationSet> {
    RepresentationSet::new(
        vec![
            Representation::new(80, 3_000_000, "https://cdn-a.example.com/80.m4s")
                .with_backups(["https://cdn-b.example.com/80.m4s"]),
            Representation::new(64, 1_500_000, "https://cdn-a.example.com/64.m4s"),
        ],
        vec![AudioRepresentation::new(30280, 192_000, "https://cdn-a.example.com/audio.m4s")],
    )
}

#[tokio::main]
async fn main() -> reprise_core::Result<()> {
    println!("Reprise Core - Playback Session Example");
    println!("=======================================\n");

    let cooldown = Arc::new(CooldownManager::default());
    let (mut session, mut events) = PlaybackSession::with_event_channel(
        EngineConfig::default(),
        cooldown,
        Entitlement::member(),
    );

    if let Some(profile) = session.on_network_change(NetworkClass::Metered) {
        println!("Buffer: start after {} ms", profile.buffer_for_playback_ms);
    }

    let decision = session.start("BV1xx411c7mD", demo_ladder()?)?;
    println!("Start: quality {} from {}", decision.quality, decision.video_url);

    let signal = PlaybackErrorSignal::new(ErrorCode::IO_NETWORK_CONNECTION_FAILED);
    loop {
        let plan = session.on_error(&signal)?;
        println!("Error {}: {}", signal.code, plan.action);

        match plan.action {
            RecoveryAction::SwitchCdn => {
                println!("  now on {}", plan.endpoint.as_deref().unwrap_or("-"));
            }
            RecoveryAction::RetryNetwork => {
                let decision = session.refetch(Arc::new(DemoSource), &plan).await?;
                println!("  recovered at quality {}", decision.quality);
                break;
            }
            _ => break,
        }
    }
    session.on_playback_ready();

    session.load_skip_intervals(vec![
        SkipInterval::new("sponsor-1", 30_000, 75_000).with_category("sponsor"),
    ])?;
    for position in [10_000, 31_000, 40_000] {
        println!("Position {} ms: {:?}", position, session.on_position(position));
    }

    println!("\nEvents:");
    while let Ok(record) = events.try_recv() {
        println!("  #{} {}", record.sequence, serde_json::to_string(&record.event)?);
    }

    Ok(())
}
