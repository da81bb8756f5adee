//! Per-bot decision loop
//!
//! Runs once per tick before any character tick and writes a
//! `CharacterInput`; it never touches the character itself. Checks run as an
//! ordered cascade: sleep and stun, perception, the reaction gate, then
//! engagement, patrol or aggro search, and finally steering along the cached
//! waypoint route. Stuck detection and emotion decay run every tick.

use std::f32::consts::FRAC_PI_2;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::game::ai::archetype::{Archetype, ArchetypeParams, SpawnLoadout};
use crate::game::ai::emotions::Emotions;
use crate::game::catalog::{ProjectileKind, WeaponSpec};
use crate::game::constants::ai::{
    AIM_LENGTH, AIM_NOISE, ATTACK_ON_DAMAGE_TICKS, ENEMY_ABOVE_HEIGHT, JUMP_TRIGGER_HEIGHT,
    MOVE_REACT_TICKS, REACTION_MIN, REACTION_SPREAD, SEEK_RANGE, SHOCK_CHANCE_PER_DAMAGE,
    SIGHT_RANGE, SPAWN_REACTION_TICKS, SPAWN_SHOCK_TICKS, STANDOFF_MARGIN, STAND_STILL_RADIUS,
    STATIC_FIRE_CHANCE, STEADY_POWER_LEVEL, STEER_DEAD_ZONE, STUCK_DISTANCE, STUCK_WINDOW,
    TRIGGER_CHANCE_PER_DAMAGE, UNSTUCK_HOLD,
};
use crate::game::constants::weapon::{CHAIN_SEGMENTS, CHAIN_SEGMENT_LENGTH};
use crate::game::input::CharacterInput;
use crate::game::state::{Character, CharacterHandle, PlayerId, SimState};
use crate::game::waypoints::PathCache;
use crate::util::vec2::Vec2;

/// Closest visible enemy at the last perception pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemySighting {
    pub player: PlayerId,
    pub pos: Vec2,
    /// Unit direction from the bot to the enemy
    pub dir: Vec2,
    pub distance: f32,
}

/// Distance at which a weapon is worth firing
pub fn shoot_range(spec: &WeaponSpec) -> f32 {
    match spec.kind {
        ProjectileKind::Melee => 60.0,
        ProjectileKind::Dash => 300.0,
        ProjectileKind::FlyingMelee => 350.0,
        ProjectileKind::Bullet => 700.0,
        ProjectileKind::Pellet => 400.0,
        ProjectileKind::Grenade => 600.0,
        ProjectileKind::Beam => spec.life.min(SIGHT_RANGE),
        ProjectileKind::ChainArc => CHAIN_SEGMENT_LENGTH * CHAIN_SEGMENTS as f32,
        ProjectileKind::Build => 100.0,
    }
}

pub struct AiController {
    player: PlayerId,
    archetype: Archetype,
    params: ArchetypeParams,
    level: i32,
    power_level: i32,
    rng: StdRng,
    input: CharacterInput,
    emotions: Emotions,

    // === PERCEPTION ===
    enemy: Option<EnemySighting>,
    last_seen: Option<Vec2>,
    sight_ticks: i32,
    visible_enemies: usize,

    // === NAVIGATION ===
    spawn_anchor: Vec2,
    destination: Option<Vec2>,
    path: PathCache,
    progress_anchor: Vec2,
    stuck_ticks: u32,
    unstuck_ticks: i32,
    unstuck_aim: Vec2,

    // === TIMERS ===
    reaction_timer: i32,
    stun_timer: i32,
    sleep_timer: i32,
    stand_still_timer: i32,
    attack_timer: i32,
}

impl AiController {
    pub fn new(player: PlayerId, archetype: Archetype, level: i32, seed: u64) -> Self {
        let params = archetype.params();
        let mut rng = StdRng::seed_from_u64(seed);
        let trigger_level = rng.gen_range(params.trigger_level.clone());
        Self {
            player,
            archetype,
            power_level: params.power_level,
            params,
            level: level.max(1),
            rng,
            input: CharacterInput::default(),
            emotions: Emotions::new(trigger_level),
            enemy: None,
            last_seen: None,
            sight_ticks: 0,
            visible_enemies: 0,
            spawn_anchor: Vec2::ZERO,
            destination: None,
            path: PathCache::new(),
            progress_anchor: Vec2::ZERO,
            stuck_ticks: 0,
            unstuck_ticks: 0,
            unstuck_aim: Vec2::UP,
            reaction_timer: 0,
            stun_timer: 0,
            sleep_timer: 0,
            stand_still_timer: 0,
            attack_timer: 0,
        }
    }

    #[inline]
    pub fn player(&self) -> PlayerId {
        self.player
    }

    #[inline]
    pub fn archetype(&self) -> Archetype {
        self.archetype
    }

    #[inline]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Synthetic input produced by the last tick
    #[inline]
    pub fn input(&self) -> CharacterInput {
        self.input
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.emotions.triggered()
    }

    pub fn trigger_level(&self) -> i32 {
        self.emotions.trigger_level()
    }

    pub fn set_trigger_level(&mut self, level: i32) {
        self.emotions.set_trigger_level(level);
    }

    pub fn emotions(&self) -> &Emotions {
        &self.emotions
    }

    pub fn enemy(&self) -> Option<EnemySighting> {
        self.enemy
    }

    pub fn visible_enemies(&self) -> usize {
        self.visible_enemies
    }

    pub fn destination(&self) -> Option<Vec2> {
        self.destination
    }

    pub fn spawn_anchor(&self) -> Vec2 {
        self.spawn_anchor
    }

    pub fn reaction_timer(&self) -> i32 {
        self.reaction_timer
    }

    pub fn path(&self) -> &PathCache {
        &self.path
    }

    /// Full wipe, including the aggro latch. Used on respawn.
    pub fn reset(&mut self) {
        let trigger_level = self.rng.gen_range(self.params.trigger_level.clone());
        self.emotions.reset(trigger_level);
        self.power_level = self.params.power_level;
        self.input = CharacterInput::default();
        self.enemy = None;
        self.last_seen = None;
        self.sight_ticks = 0;
        self.visible_enemies = 0;
        self.destination = None;
        self.path.clear();
        self.stuck_ticks = 0;
        self.unstuck_ticks = 0;
        self.reaction_timer = 0;
        self.stun_timer = 0;
        self.sleep_timer = 0;
        self.stand_still_timer = 0;
        self.attack_timer = 0;
    }

    /// Anchor the bot at its spawn point and roll its loadout
    pub fn on_character_spawn(&mut self, pos: Vec2) -> SpawnLoadout {
        self.spawn_anchor = pos;
        self.progress_anchor = pos;
        self.destination = Some(pos);
        self.path.clear();
        self.enemy = None;
        self.sight_ticks = 0;
        self.input = CharacterInput::default();
        self.stun_timer = SPAWN_SHOCK_TICKS;
        if !self.emotions.triggered() {
            self.reaction_timer = SPAWN_REACTION_TICKS;
        }
        self.archetype.loadout(self.level, &mut self.rng)
    }

    pub fn stun(&mut self, ticks: i32) {
        self.stun_timer = self.stun_timer.max(ticks);
    }

    pub fn sleep(&mut self, ticks: i32) {
        self.sleep_timer = self.sleep_timer.max(ticks);
    }

    pub fn stand_still(&mut self, ticks: i32) {
        self.stand_still_timer = self.stand_still_timer.max(ticks);
    }

    /// External provocation, e.g. from the game mode. Latches once `level`
    /// reaches the trigger threshold.
    pub fn trigger(&mut self, level: i32) {
        if level >= self.emotions.trigger_level() {
            self.emotions.latch();
        }
    }

    /// Damage feedback from the character simulation
    pub fn receive_damage(&mut self, attacker: Option<PlayerId>, amount: i32) {
        self.emotions.add_anger(attacker, amount);

        if attacker.is_some() && self.rng.gen::<f32>() < amount as f32 * TRIGGER_CHANCE_PER_DAMAGE {
            self.emotions.latch();
        }
        if self.rng.gen::<f32>() < amount as f32 * SHOCK_CHANCE_PER_DAMAGE {
            self.stun(2 + amount / 2);
        }
        if self.power_level < STEADY_POWER_LEVEL {
            self.input.fire = false;
        }
        if self.params.attack_on_damage {
            self.attack_timer = ATTACK_ON_DAMAGE_TICKS;
            self.input.fire = true;
        }
    }

    fn roll_reaction(&mut self) -> i32 {
        (REACTION_MIN + self.rng.gen_range(0..REACTION_SPREAD)).max(1)
    }

    fn idle(&mut self) {
        self.input.direction = 0;
        self.input.jump = false;
        self.input.hook = false;
        self.input.fire = false;
    }

    /// Produce this tick's input
    pub fn tick(&mut self, state: &SimState) {
        self.emotions.decay();

        let Some(h) = state.character_of(self.player) else {
            self.input = CharacterInput::default();
            return;
        };
        let Some(ch) = state.character(h) else {
            return;
        };

        if self.sleep_timer > 0 {
            self.sleep_timer -= 1;
            self.idle();
            return;
        }
        if self.stun_timer > 0 {
            self.stun_timer -= 1;
            self.idle();
            self.reaction_timer = self.roll_reaction();
            return;
        }

        self.perceive(state, h, ch.pos);
        self.track_progress(state, ch.pos);
        if self.attack_timer > 0 {
            self.attack_timer -= 1;
        }
        if self.stand_still_timer > 0 {
            self.stand_still_timer -= 1;
        }

        if self.reaction_timer > 0 {
            self.reaction_timer -= 1;
        } else {
            self.reaction_timer = self.roll_reaction();
            self.decide(state, ch);
        }

        self.apply_unstuck();
    }

    /// Closest visible enemy, biased by anger and attachment
    fn perceive(&mut self, state: &SimState, h: CharacterHandle, pos: Vec2) {
        let mut best: Option<(f32, EnemySighting)> = None;
        let mut visible = 0;

        for entry in state.find_characters_in_radius(pos, SIGHT_RANGE) {
            if entry.handle == h {
                continue;
            }
            let Some(other) = state.character(entry.handle) else {
                continue;
            };
            if !state.is_hostile(self.player, other.owner) {
                continue;
            }
            let distance = pos.distance_to(entry.position);
            if distance > SIGHT_RANGE || !state.world.has_line_of_sight(pos, entry.position) {
                continue;
            }
            visible += 1;
            self.emotions.notice(other.owner);

            let score = distance - self.emotions.preference(other.owner);
            if best.as_ref().is_some_and(|(s, _)| score >= *s) {
                continue;
            }
            let dir = if distance > 0.0001 {
                (entry.position - pos) / distance
            } else {
                Vec2::new(1.0, 0.0)
            };
            best = Some((
                score,
                EnemySighting {
                    player: other.owner,
                    pos: entry.position,
                    dir,
                    distance,
                },
            ));
        }

        self.visible_enemies = visible;
        self.enemy = best.map(|(_, e)| e);
        match self.enemy {
            Some(e) => {
                self.last_seen = Some(e.pos);
                self.sight_ticks = self.sight_ticks.saturating_add(1);
            }
            None => self.sight_ticks = 0,
        }
    }

    /// No-progress window while moving triggers a jump plus hook maneuver
    fn track_progress(&mut self, state: &SimState, pos: Vec2) {
        if self.input.direction == 0 || self.unstuck_ticks > 0 {
            self.progress_anchor = pos;
            self.stuck_ticks = 0;
            return;
        }
        if pos.distance_to(self.progress_anchor) >= STUCK_DISTANCE {
            self.progress_anchor = pos;
            self.stuck_ticks = 0;
            return;
        }
        self.stuck_ticks += 1;
        if self.stuck_ticks < STUCK_WINDOW {
            return;
        }

        debug!(player = self.player, ?pos, "bot stuck, unstuck maneuver");
        state.metrics.record_unstuck();
        let angle = -FRAC_PI_2 + self.rng.gen_range(-0.8f32..0.8);
        self.unstuck_aim = Vec2::from_angle(angle) * AIM_LENGTH;
        self.unstuck_ticks = UNSTUCK_HOLD;
        self.stuck_ticks = 0;
        self.progress_anchor = pos;
        self.path.clear();
    }

    fn apply_unstuck(&mut self) {
        if self.unstuck_ticks <= 0 {
            return;
        }
        self.unstuck_ticks -= 1;
        self.input.hook = self.unstuck_ticks > 0;
        // Toggle so the jump is re-pressed for an air jump
        self.input.jump = self.unstuck_ticks % 2 == 1;
        self.input.target = self.unstuck_aim;
    }

    fn aim_at(&mut self, dir: Vec2) {
        let noise = AIM_NOISE * (1.0 - self.power_level as f32 / 20.0).max(0.0);
        let offset = if noise > 0.0 {
            self.rng.gen_range(-noise..=noise)
        } else {
            0.0
        };
        self.input.target = dir.rotate(offset) * AIM_LENGTH;
    }

    fn nearest_hostile(&self, state: &SimState, pos: Vec2) -> Option<Vec2> {
        state
            .characters
            .iter()
            .filter(|(_, c)| c.alive && state.is_hostile(self.player, c.owner))
            .map(|(h, c)| (c.pos.distance_to(pos), h, c.pos))
            .filter(|(d, _, _)| *d <= SEEK_RANGE)
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, _, p)| p)
    }

    fn decide(&mut self, state: &SimState, ch: &Character) {
        let pos = ch.pos;
        self.input.fire = self.attack_timer > 0;
        self.input.hook = false;
        let mut shooting = false;

        if let Some(enemy) = self.enemy {
            self.aim_at(enemy.dir);
            let range = state.weapon(ch.active_weapon).map_or(0.0, shoot_range);

            if enemy.distance <= range && !self.rng.gen_bool(self.params.stop_fire_chance as f64) {
                self.input.fire = true;
                shooting = true;
            }

            self.destination = if self.sight_ticks < MOVE_REACT_TICKS {
                None
            } else if range - enemy.distance > STANDOFF_MARGIN {
                let back_off = enemy.pos - enemy.dir * (range - STANDOFF_MARGIN);
                Some(
                    state
                        .world
                        .intersect_line(pos, back_off)
                        .map_or(back_off, |hit| hit.before),
                )
            } else if enemy.distance > range {
                Some(enemy.pos)
            } else {
                None
            };
        } else if !self.emotions.triggered() {
            self.destination = Some(self.spawn_anchor);
        } else {
            if let Some(seen) = self.last_seen {
                if (seen - pos).x.abs() < STAND_STILL_RADIUS && (seen - pos).y.abs() < STAND_STILL_RADIUS {
                    self.last_seen = None;
                }
            }
            let target = self
                .last_seen
                .or_else(|| self.nearest_hostile(state, pos))
                .unwrap_or(self.spawn_anchor);
            self.destination = Some(target);
            if self.rng.gen_bool(STATIC_FIRE_CHANCE) {
                self.input.fire = true;
            }
        }

        let jumping = self.input.jump;
        self.steer(state, ch, shooting);

        if let Some(enemy) = self.enemy {
            if enemy.pos.y < pos.y - ENEMY_ABOVE_HEIGHT && ch.grounded {
                self.input.jump = !jumping;
            }
        }
    }

    fn steer(&mut self, state: &SimState, ch: &Character, shooting: bool) {
        let pos = ch.pos;
        let Some(dest) = self.destination else {
            self.input.direction = 0;
            self.input.jump = false;
            return;
        };

        let close = (dest.x - pos.x).abs() < STAND_STILL_RADIUS && (dest.y - pos.y).abs() < STAND_STILL_RADIUS;
        if (shooting && ch.grounded) || close || self.stand_still_timer > 0 {
            self.input.direction = 0;
            self.input.jump = false;
            return;
        }

        let before = self.path.replans();
        let waypoint = self
            .path
            .next_waypoint(&state.waypoints, state.world.as_ref(), pos, dest, state.tick)
            .unwrap_or(dest);
        if self.path.replans() != before {
            state.metrics.record_replan();
        }

        let dx = waypoint.x - pos.x;
        self.input.direction = if dx > STEER_DEAD_ZONE {
            1
        } else if dx < -STEER_DEAD_ZONE {
            -1
        } else {
            0
        };

        let above = pos.y - waypoint.y > JUMP_TRIGGER_HEIGHT;
        self.input.jump = above && (ch.grounded || ch.vel.y > 0.0) && !self.input.jump;

        if !shooting && self.enemy.is_none() {
            let toward = waypoint - pos;
            if !toward.is_zero(0.0001) {
                self.input.target = toward.normalize() * AIM_LENGTH;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::test_support::*;
    use crate::game::state::{PlayerKind, Team};
    use crate::game::systems::damage::set_health;

    fn spawn_at(state: &mut SimState, owner: PlayerId, kind: PlayerKind, pos: Vec2) -> CharacterHandle {
        if state.player(owner).is_none() {
            add_player(state, owner, kind, Team::Free);
        }
        let mut ch = Character::new(owner, pos, state.catalog.len(), kind == PlayerKind::Bot, 0);
        set_health(&mut ch, 100);
        ch.grounded = true;
        ch.weapons[0].got = true;
        let pistol = state.catalog.id_of("pistol").unwrap();
        ch.weapons[pistol].got = true;
        ch.weapons[pistol].ammo = 10;
        ch.active_weapon = pistol;
        let h = state.characters.insert(ch);
        state.player_mut(owner).unwrap().character = Some(h);
        state.rebuild_grid();
        h
    }

    fn ready_bot(pos: Vec2) -> AiController {
        let mut ai = AiController::new(0, Archetype::Grunt, 1, 11);
        ai.on_character_spawn(pos);
        ai.stun_timer = 0;
        ai.reaction_timer = 0;
        ai
    }

    #[test]
    fn test_reaction_timer_never_below_one() {
        let mut ai = AiController::new(0, Archetype::Grunt, 1, 5);
        for _ in 0..1000 {
            let r = ai.roll_reaction();
            assert!(r >= 1, "reaction rearmed to {}", r);
        }
    }

    #[test]
    fn test_stun_blocks_input() {
        let mut state = test_state();
        spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(5));
        let mut ai = ready_bot(floor_pos(5));
        ai.input.direction = 1;
        ai.input.fire = true;
        ai.stun(3);
        ai.tick(&state);
        assert_eq!(ai.input().direction, 0);
        assert!(!ai.input().fire);
        assert!(ai.reaction_timer() >= 1);
    }

    #[test]
    fn test_idle_bot_returns_to_spawn_anchor() {
        let mut state = test_state();
        let anchor = floor_pos(5);
        let h = spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(20));
        let mut ai = ready_bot(anchor);

        for tick in 0..40 {
            state.tick = tick;
            ai.tick(&state);
        }
        assert!(!ai.is_triggered());
        assert_eq!(ai.destination(), Some(anchor));
        assert_eq!(ai.input().direction, -1, "walks back toward the anchor");
        assert!(state.character(h).is_some());
    }

    #[test]
    fn test_bot_engages_visible_enemy() {
        let mut state = test_state();
        spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(5));
        spawn_at(&mut state, 1, PlayerKind::Human, floor_pos(15));
        let mut ai = ready_bot(floor_pos(5));
        ai.params.stop_fire_chance = 0.0;

        ai.tick(&state);
        let enemy = ai.enemy().expect("enemy in sight");
        assert_eq!(enemy.player, 1);
        assert_eq!(ai.visible_enemies(), 1);
        assert!(ai.input().fire, "pistol range covers the gap");
        assert!(ai.input().target.x > 0.0);
    }

    #[test]
    fn test_wall_hides_enemy() {
        let map = "
########################################
#......................................#
#......................................#
#......................................#
#......................................#
#......................................#
#..........#...........................#
#..........#...........................#
#..........#...........................#
#.S........#.........................S.#
########################################
";
        let mut state = test_state_with_map(map);
        spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(5));
        spawn_at(&mut state, 1, PlayerKind::Human, floor_pos(15));
        let mut ai = ready_bot(floor_pos(5));
        ai.tick(&state);
        assert!(ai.enemy().is_none());
        assert!(!ai.input().fire);
    }

    #[test]
    fn test_latch_survives_losing_target() {
        let mut state = test_state();
        spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(5));
        let enemy = spawn_at(&mut state, 1, PlayerKind::Human, floor_pos(15));
        let mut ai = ready_bot(floor_pos(5));
        ai.set_trigger_level(5);

        ai.receive_damage(Some(1), 6);
        assert!(ai.is_triggered());

        state.characters.get_mut(enemy).unwrap().alive = false;
        state.rebuild_grid();
        for tick in 0..200 {
            state.tick = tick;
            ai.tick(&state);
        }
        assert!(ai.enemy().is_none());
        assert!(ai.is_triggered(), "latch stays set after the target is gone");
    }

    #[test]
    fn test_sleep_counts_down() {
        let mut state = test_state();
        spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(5));
        let mut ai = ready_bot(floor_pos(5));
        ai.sleep(2);
        ai.tick(&state);
        ai.tick(&state);
        assert_eq!(ai.sleep_timer, 0);
    }

    #[test]
    fn test_spawn_sets_long_reaction_unless_triggered() {
        let mut ai = AiController::new(0, Archetype::Shocker, 3, 1);
        let loadout = ai.on_character_spawn(Vec2::new(10.0, 10.0));
        assert_eq!(ai.reaction_timer(), SPAWN_REACTION_TICKS);
        assert_eq!(loadout.weapons.as_slice(), &["taser"]);
        assert_eq!(ai.spawn_anchor(), Vec2::new(10.0, 10.0));

        ai.trigger(100);
        ai.reaction_timer = 0;
        ai.on_character_spawn(Vec2::ZERO);
        assert_eq!(ai.reaction_timer(), 0);
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut ai = AiController::new(0, Archetype::Grunt, 1, 9);
        ai.trigger(1000);
        assert!(ai.is_triggered());
        ai.reset();
        assert!(!ai.is_triggered());
        assert!(Archetype::Grunt.params().trigger_level.contains(&ai.trigger_level()));
    }

    #[test]
    fn test_stuck_bot_tries_unstuck() {
        let mut state = test_state();
        // Pressed against the left wall
        let h = spawn_at(&mut state, 0, PlayerKind::Bot, floor_pos(1));
        let mut ai = ready_bot(floor_pos(1));
        ai.input.direction = -1;
        for _ in 0..STUCK_WINDOW {
            ai.track_progress(&state, state.character(h).unwrap().pos);
        }
        assert_eq!(ai.unstuck_ticks, UNSTUCK_HOLD);
        ai.apply_unstuck();
        assert!(ai.input().hook);
        assert!(ai.input().target.y < 0.0, "hook aims upward");
    }
}
