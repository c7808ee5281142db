//! Arcade room demo: one perpetual room, a handful of simulated
//! participants, cycling forever.
//!
//! Run with `RUST_LOG=info cargo run -p arcade-room` and watch the room
//! cycle: intermission countdown, join window, rounds with staggered bot
//! submissions, scoring, winner, intermission again.

use std::sync::Arc;
use std::time::Duration;

use liveplay::prelude::*;
use rand::Rng;

const BOTS: usize = 4;

type DemoService = LiveplayService<MemoryStore, LocalFabric, StaticPromptSet>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = Arc::new(MemoryStore::new());
    let fabric = Arc::new(LocalFabric::new());
    let provider = StaticPromptSet::career_defaults(&BingoGrid::default());

    let service: Arc<DemoService> = Arc::new(
        LiveplayBuilder::new()
            .total_rounds(9)
            .round_time_limit(Duration::from_secs(6))
            .intermission(Duration::from_secs(8))
            .join_window(Duration::from_secs(2))
            .bingo_slots(2)
            .build(store, fabric, provider, Arc::new(StandardScoring::default())),
    );

    let room = service.create_room().await?;
    tracing::info!(room_id = %room.id, code = %room.room_code, "arcade room ready");

    // Narrate scoring milestones.
    service
        .sync()
        .subscribe(room.id, EventKind::RoundScored, |envelope| {
            if let GameEvent::RoundScored { round_number, leaderboard } = &envelope.event {
                if let Some(top) = leaderboard.first() {
                    tracing::info!(
                        round_number,
                        leader = %top.display_name,
                        score = top.total_score,
                        "round scored"
                    );
                }
            }
        })
        .await;
    service
        .sync()
        .subscribe(room.id, EventKind::GameCompleted, |envelope| {
            if let GameEvent::GameCompleted { winner, .. } = &envelope.event {
                tracing::info!(winner = ?winner, "game over");
            }
        })
        .await;

    for i in 0..BOTS {
        spawn_bot(Arc::clone(&service), room.id, format!("bot-{}", i + 1)).await;
    }

    service.open_room(room.id).await?;
    tracing::info!("room cycling; ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    service.close_room(room.id).await?;
    Ok(())
}

/// A simulated participant: joins every game it hears about and answers
/// each round after a think delay, guessing among the offered targets.
async fn spawn_bot(service: Arc<DemoService>, room_id: RoomId, name: String) {
    let mut events = service.sync().watch(room_id).await;

    tokio::spawn(async move {
        let mut seat: Option<(SessionId, ParticipantId)> = None;
        loop {
            let envelope = match events.recv().await {
                Ok(envelope) => envelope,
                // Fell behind: the next GameStarting re-seats us.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            };

            match envelope.event {
                GameEvent::GameStarting { session_id, .. } => {
                    match service
                        .join_session(session_id, &name, ParticipantKind::Ai)
                        .await
                    {
                        Ok(p) => seat = Some((session_id, p.id)),
                        Err(e) => tracing::debug!(%name, error = %e, "join failed"),
                    }
                }
                GameEvent::RoundStarted { session_id, round_number, targets, .. } => {
                    let Some((sid, pid)) = seat else { continue };
                    if sid != session_id || targets.is_empty() {
                        continue;
                    }
                    // Selection is only open during round 1.
                    if round_number == 1 && rand::rng().random_bool(0.5) {
                        let roles = ["ceo", "cfo", "cmo", "cto", "chro"];
                        let pick = roles[rand::rng().random_range(0..roles.len())];
                        let _ = service.select_c_suite(sid, pid, pick).await;
                    }
                    let think = Duration::from_millis(rand::rng().random_range(200..2_000));
                    let guess = targets[rand::rng().random_range(0..targets.len())];
                    let service = Arc::clone(&service);
                    tokio::spawn(async move {
                        tokio::time::sleep(think).await;
                        if let Err(e) =
                            service.submit_play(sid, pid, round_number, guess).await
                        {
                            tracing::debug!(%pid, error = %e, "submission rejected");
                        }
                    });
                }
                _ => {}
            }
        }
    });
}
