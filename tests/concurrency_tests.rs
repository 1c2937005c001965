//! Concurrency properties of the engine under parallel requests

use std::sync::{Arc, Barrier};
use std::time::Duration;

use logistics_engine::deploy::{Deployable, DeployableStatus, DeployOutcome};
use logistics_engine::events::{DeployDenyReason, EngineEvent, ThreatPhase};
use logistics_engine::notify::{CapturingNotifier, NoopRecorder};
use logistics_engine::resupply::{AmmoStore, KitRole, PlayerKit, ResupplyOutcome};
use logistics_engine::types::{PlayerId, Position, TeamId, VehicleId};
use logistics_engine::util::time::ManualClock;
use logistics_engine::world::{GameWorld, InMemoryWorld};
use logistics_engine::{Engine, EngineConfig};

const BLUE: TeamId = TeamId(1);

struct Harness {
    engine: Engine,
    world: Arc<InMemoryWorld>,
    notifier: Arc<CapturingNotifier>,
}

fn harness(deploy_delay: Duration) -> Harness {
    let world = Arc::new(InMemoryWorld::new());
    let notifier = Arc::new(CapturingNotifier::new());
    let config = EngineConfig {
        deploy_delay,
        request_rate_per_sec: 1_000,
        rng_seed: Some(42),
        ..EngineConfig::default()
    };
    let engine = Engine::new(
        config,
        world.clone(),
        notifier.clone(),
        Arc::new(NoopRecorder),
        Arc::new(ManualClock::new()),
    );
    Harness {
        engine,
        world,
        notifier,
    }
}

/// Rifleman with an empty kit standing at the origin
fn join_empty(h: &Harness, player: PlayerId) {
    h.world.place_player(player, BLUE, Position::default());
    h.engine.player_joined(player, BLUE, KitRole::Rifleman).unwrap();
    h.engine
        .resupply
        .set_kit(player, PlayerKit::with_ammo(KitRole::Rifleman, 0))
        .unwrap();
}

#[test]
fn concurrent_draws_never_oversell_a_store() {
    const CAPACITY: u32 = 500;
    const PLAYERS: u64 = 64;

    let h = harness(Duration::ZERO);
    for id in 0..PLAYERS {
        join_empty(&h, PlayerId(id));
    }
    let store = h
        .engine
        .resupply
        .register(AmmoStore::new(BLUE, Position::default(), CAPACITY))
        .unwrap();

    let barrier = Barrier::new(PLAYERS as usize);
    let granted: Vec<u32> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..PLAYERS)
            .map(|id| {
                let engine = &h.engine;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let requested = 10 + (id as u32 * 7) % 50;
                    engine.request_resupply(PlayerId(id), store, requested).granted()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let total: u32 = granted.iter().sum();
    let remaining = h.engine.resupply.store(store).unwrap().remaining;

    // total demand exceeds capacity, so the store must end exactly empty
    assert_eq!(total, CAPACITY);
    assert_eq!(remaining, 0);
    assert_eq!(
        h.notifier
            .count(|e| matches!(e, EngineEvent::StoreDepleted { .. })),
        1
    );
}

#[test]
fn two_simultaneous_requests_split_fifty() {
    let h = harness(Duration::ZERO);
    join_empty(&h, PlayerId(1));
    join_empty(&h, PlayerId(2));
    let store = h
        .engine
        .resupply
        .register(AmmoStore::new(BLUE, Position::default(), 50))
        .unwrap();

    let barrier = Barrier::new(2);
    let outcomes: Vec<ResupplyOutcome> = std::thread::scope(|s| {
        let a = s.spawn(|| {
            barrier.wait();
            h.engine.request_resupply(PlayerId(1), store, 30)
        });
        let b = s.spawn(|| {
            barrier.wait();
            h.engine.request_resupply(PlayerId(2), store, 30)
        });
        vec![a.join().unwrap(), b.join().unwrap()]
    });

    let mut granted: Vec<u32> = outcomes.iter().map(|o| o.granted()).collect();
    granted.sort_unstable();
    assert_eq!(granted, vec![20, 30]);
    assert!(outcomes.iter().any(|o| matches!(
        o,
        ResupplyOutcome::Resupplied { partial: true, amount: 20, .. }
    )));
    assert_eq!(h.engine.resupply.store(store).unwrap().remaining, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_deploys_by_one_player_succeed_once() {
    let h = harness(Duration::from_millis(50));
    h.world.place_player(PlayerId(1), BLUE, Position::default());
    h.engine
        .player_joined(PlayerId(1), BLUE, KitRole::Rifleman)
        .unwrap();
    let base = h
        .engine
        .deployments
        .register(Deployable::main_base(BLUE, Position::new(900.0, 900.0, 0.0)))
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.request_deploy(PlayerId(1), base).await })
        })
        .collect();

    let mut deployed = 0;
    for task in tasks {
        match task.await.unwrap() {
            DeployOutcome::Deployed { .. } => deployed += 1,
            DeployOutcome::Denied(reason) => assert!(matches!(
                reason,
                DeployDenyReason::AlreadyInProgress | DeployDenyReason::OnCooldown
            )),
        }
    }

    assert_eq!(deployed, 1);
    assert_eq!(
        h.notifier
            .count(|e| matches!(e, EngineEvent::Deployed { .. })),
        1
    );
    assert!(!h.engine.deployments.player_state(PlayerId(1)).unwrap().in_progress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn target_destroyed_mid_flight_is_denied() {
    let h = harness(Duration::from_millis(100));
    let start = Position::new(-50.0, 0.0, 0.0);
    h.world.place_player(PlayerId(1), BLUE, start);
    h.engine
        .player_joined(PlayerId(1), BLUE, KitRole::Rifleman)
        .unwrap();
    let fob = h
        .engine
        .deployments
        .register(Deployable::fob(BLUE, Position::new(400.0, 0.0, 0.0)))
        .unwrap();

    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.request_deploy(PlayerId(1), fob).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.engine
        .deployments
        .set_status(fob, DeployableStatus::Destroyed)
        .unwrap();

    let outcome = pending.await.unwrap();
    assert_eq!(outcome.denial(), Some(DeployDenyReason::TargetNoLongerValid));
    assert_eq!(
        h.notifier
            .count(|e| matches!(e, EngineEvent::Deployed { .. })),
        0
    );
    assert_eq!(h.world.player_position(PlayerId(1)), Some(start));

    // in-progress was rolled back, and no cooldown was charged
    let state = h.engine.deployments.player_state(PlayerId(1)).unwrap();
    assert!(!state.in_progress);
    assert!(state.last_deploy.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn target_removed_mid_flight_is_denied() {
    let h = harness(Duration::from_millis(100));
    h.world.place_player(PlayerId(1), BLUE, Position::default());
    h.engine
        .player_joined(PlayerId(1), BLUE, KitRole::Rifleman)
        .unwrap();
    let rally = h
        .engine
        .deployments
        .register(Deployable::rally_point(BLUE, Position::new(200.0, 0.0, 0.0)))
        .unwrap();

    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.request_deploy(PlayerId(1), rally).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.engine.deployments.remove(rally).unwrap();

    assert_eq!(
        pending.await.unwrap().denial(),
        Some(DeployDenyReason::TargetNoLongerValid)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn player_leaving_mid_flight_cancels_deploy() {
    let h = harness(Duration::from_millis(100));
    h.world.place_player(PlayerId(1), BLUE, Position::default());
    h.engine
        .player_joined(PlayerId(1), BLUE, KitRole::Rifleman)
        .unwrap();
    let base = h
        .engine
        .deployments
        .register(Deployable::main_base(BLUE, Position::new(10.0, 10.0, 0.0)))
        .unwrap();

    let engine = h.engine.clone();
    let pending = tokio::spawn(async move { engine.request_deploy(PlayerId(1), base).await });

    tokio::time::sleep(Duration::from_millis(30)).await;
    h.engine.player_left(PlayerId(1));
    // rejoining does not revive the old in-flight request
    h.engine
        .player_joined(PlayerId(1), BLUE, KitRole::Rifleman)
        .unwrap();

    assert_eq!(
        pending.await.unwrap().denial(),
        Some(DeployDenyReason::PlayerLeft)
    );
    assert!(!h.engine.deployments.player_state(PlayerId(1)).unwrap().in_progress);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_targets_deploy_in_parallel() {
    let h = harness(Duration::from_millis(20));
    let mut targets = Vec::new();
    for id in 0..16u64 {
        h.world.place_player(PlayerId(id), BLUE, Position::default());
        h.engine
            .player_joined(PlayerId(id), BLUE, KitRole::Rifleman)
            .unwrap();
        let fob = h
            .engine
            .deployments
            .register(Deployable::fob(
                BLUE,
                Position::new(1_000.0 * (id as f32 + 1.0), 0.0, 0.0),
            ))
            .unwrap();
        targets.push((PlayerId(id), fob));
    }

    let tasks: Vec<_> = targets
        .into_iter()
        .map(|(player, fob)| {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.request_deploy(player, fob).await })
        })
        .collect();

    for task in tasks {
        assert!(task.await.unwrap().is_deployed());
    }
}

#[test]
fn simultaneous_flares_consume_one_charge() {
    let h = harness(Duration::ZERO);
    let vehicle = VehicleId::new();
    h.engine
        .vehicle_spawned(vehicle, BLUE, Position::default())
        .unwrap();
    h.engine.threats.lock_acquired(vehicle, 7);
    h.engine.threats.warning_threshold_elapsed(vehicle);

    let barrier = Barrier::new(16);
    let successes: usize = std::thread::scope(|s| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let engine = &h.engine;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    engine.deploy_flare(vehicle)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });

    assert_eq!(successes, 1);
    let view = h.engine.threats.view(vehicle).unwrap();
    assert_eq!(view.phase, ThreatPhase::FlareDeployed);
    assert_eq!(view.charges, h.engine.config.flare_charges - 1);
}
