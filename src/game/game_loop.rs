//! Fixed-step tick scheduler
//!
//! One tick runs these phases in order:
//! 1. queued human input is applied
//! 2. every bot controller decides and its input is applied
//! 3. `tick_character` for every living character, in handle order
//! 4. `tick_deferred` for every character, then projectiles
//! 5. the snapshot is captured
//! 6. characters flagged for removal leave the arena
//! 7. dead players whose delay ran out respawn
//!
//! Bot decisions all finish before any character ticks, so a character tick
//! never sees a half-updated bot input.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::SimConfig;
use crate::game::ai::{AiController, Archetype};
use crate::game::catalog::WeaponCatalog;
use crate::game::constants::physics::{TICK_DURATION_MS, TICK_RATE};
use crate::game::events::{GameEvent, TickOutput};
use crate::game::input::{InputQueue, InputSender};
use crate::game::performance::PerformanceMonitor;
use crate::game::snapshot::WorldSnapshot;
use crate::game::state::{CharacterHandle, Player, PlayerId, PlayerKind, SimState, Team};
use crate::game::systems::damage::kill;
use crate::game::systems::lifecycle::{apply_input, spawn_character, tick_character, tick_deferred};
use crate::game::systems::projectile::step_projectiles;
use crate::game::waypoints::WaypointGraph;
use crate::game::world::TileMap;
use crate::metrics::SimMetrics;
use crate::util::vec2::Vec2;

/// What one tick hands to the outside
#[derive(Debug)]
pub struct TickResult {
    pub snapshot: WorldSnapshot,
    pub output: TickOutput,
}

pub struct Simulation {
    state: SimState,
    inputs: InputQueue,
    spawn_points: Vec<Vec2>,
    monitor: PerformanceMonitor,
    seed: u64,
}

impl Simulation {
    pub fn new(map: TileMap, catalog: Arc<WeaponCatalog>, config: &SimConfig) -> Self {
        let waypoints = WaypointGraph::build(&map);
        let spawn_points = map.spawn_points().to_vec();
        let mut state = SimState::new(
            catalog,
            Arc::new(map),
            Arc::new(waypoints),
            config.tunables,
            config.seed,
        );
        state.respawn_delay_ticks = config.respawn_delay_ticks;

        info!(
            spawn_points = spawn_points.len(),
            nodes = state.waypoints.node_count(),
            edges = state.waypoints.edge_count(),
            "simulation ready"
        );

        Self {
            state,
            inputs: InputQueue::default(),
            spawn_points,
            monitor: PerformanceMonitor::new(TICK_RATE),
            seed: config.seed,
        }
    }

    #[inline]
    pub fn state(&self) -> &SimState {
        &self.state
    }

    #[inline]
    pub fn state_mut(&mut self) -> &mut SimState {
        &mut self.state
    }

    #[inline]
    pub fn tick_count(&self) -> u64 {
        self.state.tick
    }

    /// Handle for a connection thread to push human input
    pub fn input_sender(&self) -> InputSender {
        self.inputs.sender()
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn metrics(&self) -> Arc<SimMetrics> {
        self.state.metrics.clone()
    }

    pub fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    /// Take the lowest free slot. Bots get a controller at the configured
    /// level; the archetype cycles with the slot when none is given. The new
    /// player spawns at the end of the next tick.
    pub fn add_player(
        &mut self,
        kind: PlayerKind,
        team: Team,
        archetype: Option<Archetype>,
    ) -> Option<PlayerId> {
        let Some(id) = self.state.players.iter().position(Option::is_none) else {
            debug!("no free player slot");
            return None;
        };

        let mut player = Player::new(id, kind, team);
        player.respawn_tick = Some(self.state.tick);
        if kind == PlayerKind::Bot {
            let archetype = archetype.unwrap_or_else(|| Archetype::from_index(id));
            let seed = self.seed ^ (id as u64 + 1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
            player.ai = Some(AiController::new(id, archetype, self.state.tunables.bot_level, seed));
        }
        self.state.players[id] = Some(player);

        info!(player = id, ?kind, ?team, "player joined");
        Some(id)
    }

    /// Disconnect: the character dies and is removed with the other dead at
    /// the end of the tick
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        if self.state.player(id).is_none() {
            debug!(player = id, "remove for empty slot ignored");
            return false;
        }
        if let Some(h) = self.state.character_of(id) {
            kill(&mut self.state, h);
        }
        self.state.players[id] = None;
        info!(player = id, "player left");
        true
    }

    /// Advance one step
    pub fn tick(&mut self) -> TickResult {
        self.monitor.tick_start();

        self.apply_queued_input();
        self.run_bots();

        self.state.rebuild_grid();
        let handles: Vec<CharacterHandle> = self.state.characters.handles();
        for &h in &handles {
            tick_character(&mut self.state, h);
        }
        for &h in &handles {
            tick_deferred(&mut self.state, h);
        }
        step_projectiles(&mut self.state);
        self.state.rebuild_grid();

        let snapshot = WorldSnapshot::capture(&self.state);

        self.remove_dead();
        self.respawn_due();

        let output = self.state.effects.drain();
        self.state.tick += 1;
        self.update_metrics();

        TickResult { snapshot, output }
    }

    fn apply_queued_input(&mut self) {
        for msg in self.inputs.drain() {
            match self.state.player(msg.player_id) {
                Some(p) if !p.is_bot() => {}
                _ => {
                    debug!(player = msg.player_id, "input for invalid or bot slot ignored");
                    continue;
                }
            }
            if let Some(h) = self.state.character_of(msg.player_id) {
                apply_input(&mut self.state, h, msg.input);
            }
        }
    }

    /// Controllers are taken out of their slot while they read the state
    fn run_bots(&mut self) {
        for id in 0..self.state.players.len() {
            let Some(mut ai) = self.state.player_mut(id).and_then(|p| p.ai.take()) else {
                continue;
            };
            ai.tick(&self.state);
            let input = ai.input();
            if let Some(p) = self.state.player_mut(id) {
                p.ai = Some(ai);
            }
            if let Some(h) = self.state.character_of(id) {
                apply_input(&mut self.state, h, input);
            }
        }
    }

    fn remove_dead(&mut self) {
        let dead: Vec<CharacterHandle> = self
            .state
            .characters
            .iter()
            .filter(|(_, ch)| ch.pending_removal)
            .map(|(h, _)| h)
            .collect();
        for h in dead {
            self.state.characters.remove(h);
        }
    }

    fn respawn_due(&mut self) {
        if self.spawn_points.is_empty() {
            return;
        }
        let now = self.state.tick;
        for id in 0..self.state.players.len() {
            let due = self.state.player(id).is_some_and(|p| {
                p.character.is_none() && p.respawn_tick.is_some_and(|t| t <= now)
            });
            if !due {
                continue;
            }
            let pos = self.pick_spawn_point(id);
            if let Some(ai) = self.state.player_mut(id).and_then(|p| p.ai.as_mut()) {
                ai.reset();
            }
            spawn_character(&mut self.state, id, pos);
        }
    }

    /// Spawn point whose closest living opponent is farthest away; the lowest
    /// index wins ties
    pub fn pick_spawn_point(&self, player: PlayerId) -> Vec2 {
        let mut best = self.spawn_points[0];
        let mut best_score = f32::NEG_INFINITY;
        for &point in &self.spawn_points {
            let score = self
                .state
                .characters
                .iter()
                .filter(|(_, ch)| ch.alive && self.state.is_hostile(player, ch.owner))
                .map(|(_, ch)| ch.pos.distance_sq_to(point))
                .fold(f32::INFINITY, f32::min);
            if score > best_score {
                best_score = score;
                best = point;
            }
        }
        best
    }

    fn update_metrics(&mut self) {
        let alive = self.state.characters.iter().filter(|(_, c)| c.alive).count();
        let bots = self.state.players_iter().filter(|p| p.is_bot()).count();
        let humans = self.state.players_iter().count() - bots;
        let metrics = &self.state.metrics;
        metrics.set_population(alive, self.state.effects.projectiles.len(), bots, humans);

        if let Some(duration) = self.monitor.tick_end(alive) {
            metrics.record_tick(duration);
            metrics
                .performance_status
                .store(self.monitor.status().code(), std::sync::atomic::Ordering::Relaxed);
        }
    }
}

/// Drive the simulation at the fixed rate, publishing every snapshot.
/// Runs until `max_ticks` ticks have passed, forever otherwise.
pub async fn run_headless(
    mut sim: Simulation,
    latest: Arc<RwLock<WorldSnapshot>>,
    log_interval: u64,
    max_ticks: Option<u64>,
) -> Simulation {
    let mut ticker = interval(Duration::from_millis(TICK_DURATION_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Tick loop started at {} Hz", TICK_RATE);

    let mut ran: u64 = 0;
    loop {
        if max_ticks.is_some_and(|max| ran >= max) {
            break;
        }
        ticker.tick().await;

        let result = sim.tick();
        ran += 1;
        let kills = result
            .output
            .events
            .iter()
            .filter(|e| matches!(e, GameEvent::Kill { .. }))
            .count();
        if kills > 0 {
            debug!(tick = result.snapshot.tick, kills, "kills this tick");
        }

        if log_interval > 0 && result.snapshot.tick % log_interval == 0 {
            info!(
                "tick {}, {} characters, {} projectiles | Perf: {}",
                result.snapshot.tick,
                result.snapshot.characters.len(),
                result.snapshot.projectiles.len(),
                sim.performance().status_message()
            );
        }
        *latest.write() = result.snapshot;
    }
    sim
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::CharacterInput;
    use crate::game::world::DEMO_MAP;

    const ARENA: &str = "
##############################
#............................#
#.S........................S.#
##############################
";

    fn sim_with(map: &str) -> Simulation {
        let map = TileMap::from_ascii(map).unwrap();
        let catalog = Arc::new(WeaponCatalog::builtin().unwrap());
        Simulation::new(map, catalog, &SimConfig::default())
    }

    #[test]
    fn test_added_player_spawns_next_tick() {
        let mut sim = sim_with(ARENA);
        let id = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        assert!(sim.state().character_of(id).is_none());

        let result = sim.tick();
        assert!(result.snapshot.characters.is_empty(), "snapshot precedes respawn");
        assert!(sim.state().character_of(id).is_some());
        assert_eq!(sim.tick_count(), 1);
        assert_eq!(sim.tick().snapshot.characters.len(), 1);
    }

    #[test]
    fn test_second_spawn_goes_far_from_enemy() {
        let mut sim = sim_with(ARENA);
        let a = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        let b = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        sim.tick();

        let pa = sim.state().character(sim.state().character_of(a).unwrap()).unwrap().pos;
        let pb = sim.state().character(sim.state().character_of(b).unwrap()).unwrap().pos;
        assert_eq!(pa, sim.spawn_points()[0], "no enemies: first point");
        assert_eq!(pb, sim.spawn_points()[1]);
    }

    #[test]
    fn test_removed_player_leaves_arena() {
        let mut sim = sim_with(ARENA);
        let id = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        sim.tick();
        let h = sim.state().character_of(id).unwrap();

        assert!(sim.remove_player(id));
        assert!(!sim.remove_player(id));
        let result = sim.tick();
        assert!(result.snapshot.characters.is_empty());
        assert!(sim.state().character(h).is_none(), "stale handle fails generation check");
        assert!(sim.state().characters.is_empty());
    }

    #[test]
    fn test_dead_player_respawns_after_delay() {
        let mut sim = sim_with(ARENA);
        let id = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        sim.tick();
        let h = sim.state().character_of(id).unwrap();
        kill(sim.state_mut(), h);

        let delay = sim.state().respawn_delay_ticks;
        sim.tick();
        assert!(sim.state().character(h).is_none());
        for _ in 0..delay - 2 {
            sim.tick();
        }
        assert!(sim.state().character_of(id).is_none());
        sim.tick();
        sim.tick();
        assert!(sim.state().character_of(id).is_some());
        assert_eq!(sim.state().player(id).unwrap().deaths, 1);
    }

    #[test]
    fn test_human_input_reaches_character() {
        let mut sim = sim_with(ARENA);
        let id = sim.add_player(PlayerKind::Human, Team::Free, None).unwrap();
        sim.tick();
        let sender = sim.input_sender();
        let input = CharacterInput {
            fire: true,
            target: Vec2::new(1.0, 0.0),
            ..Default::default()
        };
        sender.try_send(id, input).unwrap();
        sender.try_send(63, input).unwrap();
        let result = sim.tick();

        assert_eq!(result.snapshot.projectiles.len(), 1);
        assert_eq!(sim.metrics().shots_fired.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_bots_fight_on_demo_map() {
        let map = TileMap::from_ascii(DEMO_MAP).unwrap();
        let catalog = Arc::new(WeaponCatalog::builtin().unwrap());
        let mut config = SimConfig::default();
        config.seed = 99;
        let mut sim = Simulation::new(map, catalog, &config);
        for _ in 0..6 {
            sim.add_player(PlayerKind::Bot, Team::Free, None).unwrap();
        }
        for _ in 0..500 {
            sim.tick();
        }
        let state = sim.state();
        assert!(state.characters.iter().all(|(_, c)| c.pos.is_finite()));
        assert!(state.characters.len() <= 6);
        assert_eq!(state.players_iter().count(), 6);
    }

    #[test]
    fn test_player_slots_exhaust() {
        let mut sim = sim_with(ARENA);
        for _ in 0..crate::game::constants::players::MAX_PLAYERS {
            assert!(sim.add_player(PlayerKind::Bot, Team::Free, None).is_some());
        }
        assert!(sim.add_player(PlayerKind::Human, Team::Free, None).is_none());
    }

    #[test]
    fn test_run_headless_publishes_snapshots() {
        let mut sim = sim_with(ARENA);
        sim.add_player(PlayerKind::Bot, Team::Free, Some(Archetype::Grunt));
        let latest = Arc::new(RwLock::new(WorldSnapshot::default()));

        let sim = tokio_test::block_on(run_headless(sim, latest.clone(), 0, Some(5)));
        assert_eq!(sim.tick_count(), 5);
        assert_eq!(latest.read().tick, 4);
        assert_eq!(latest.read().characters.len(), 1);
    }
}
