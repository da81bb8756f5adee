//! Simulation state: characters, players and the shared world context

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::config::GameTunables;
use crate::game::ai::AiController;
use crate::game::arena::{Arena, Handle};
use crate::game::catalog::{WeaponCatalog, WeaponCategory, WeaponId, WeaponSpec};
use crate::game::constants::character::{HIT_LIST_CAP, PROXIMITY_RADIUS, START_GRENADES};
use crate::game::constants::players::{MAX_PLAYERS, RESPAWN_DELAY_TICKS};
use crate::game::events::{Effects, Emote};
use crate::game::input::CharacterInput;
use crate::game::spatial::{CharacterGrid, GridEntry, GridHits};
use crate::game::waypoints::WaypointGraph;
use crate::game::world::WorldQuery;
use crate::metrics::SimMetrics;
use crate::util::vec2::Vec2;

/// Connection slot index
pub type PlayerId = usize;

pub type CharacterHandle = Handle<Character>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Team {
    #[default]
    Free,
    Red,
    Blue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerKind {
    Human,
    Bot,
}

/// Purchased passive upgrades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Ability {
    BodyArmor,
    HeavyBodyArmor,
    AntiImpactArmor,
    FastReload,
    MeleeSpeed,
    MeleeDamage1,
    MeleeDamage2,
    MeleeLifesteal,
    BulletDamage1,
    BulletDamage2,
    ShotgunSpread,
    ElectroDamage,
    ElectroReach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AbilitySet(u32);

impl AbilitySet {
    #[inline]
    pub fn contains(self, ability: Ability) -> bool {
        self.0 & (1 << ability as u32) != 0
    }

    #[inline]
    pub fn insert(&mut self, ability: Ability) {
        self.0 |= 1 << ability as u32;
    }

    #[inline]
    pub fn remove(&mut self, ability: Ability) {
        self.0 &= !(1 << ability as u32);
    }

    /// How many of `abilities` are present
    pub fn count(self, abilities: &[Ability]) -> i32 {
        abilities.iter().filter(|a| self.contains(**a)).count() as i32
    }
}

/// One connection slot
pub struct Player {
    pub id: PlayerId,
    pub kind: PlayerKind,
    pub team: Team,
    pub abilities: AbilitySet,
    pub character: Option<CharacterHandle>,
    /// Tick at which a dead player respawns
    pub respawn_tick: Option<u64>,
    pub ai: Option<AiController>,
    pub kills: u32,
    pub deaths: u32,
    /// Weapons granted again on the next spawn
    pub saved_weapons: SmallVec<[WeaponId; 8]>,
}

impl Player {
    pub fn new(id: PlayerId, kind: PlayerKind, team: Team) -> Self {
        Self {
            id,
            kind,
            team,
            abilities: AbilitySet::default(),
            character: None,
            respawn_tick: Some(0),
            ai: None,
            kills: 0,
            deaths: 0,
            saved_weapons: SmallVec::new(),
        }
    }

    /// Remember every weapon `ch` owns
    pub fn save_weapons(&mut self, ch: &Character) {
        self.saved_weapons = ch
            .weapons
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.got)
            .map(|(w, _)| w)
            .collect();
    }

    pub fn erase_weapons(&mut self) {
        self.saved_weapons.clear();
    }

    #[inline]
    pub fn is_bot(&self) -> bool {
        self.kind == PlayerKind::Bot
    }
}

/// Per-weapon inventory slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeaponSlot {
    pub got: bool,
    /// Superseded by an acquired successor
    pub disabled: bool,
    pub ready: bool,
    /// Loaded ammo
    pub ammo: i32,
    /// Reserved ammo
    pub reserved: i32,
}

impl WeaponSlot {
    #[inline]
    pub fn usable(&self) -> bool {
        self.got && !self.disabled
    }
}

/// Dash sub-state for one activation window
#[derive(Debug, Clone, Default)]
pub struct MeleeState {
    pub weapon: Option<WeaponId>,
    pub activation_dir: Vec2,
    /// Remaining ticks of body movement
    pub move_ticks: i32,
    /// Speed restored when the window closes
    pub old_vel_amount: f32,
    pub hit: SmallVec<[CharacterHandle; HIT_LIST_CAP]>,
}

impl MeleeState {
    #[inline]
    pub fn active(&self) -> bool {
        self.move_ticks > 0
    }
}

/// Live character entity
pub struct Character {
    // === HOT FIELDS (read every tick) ===
    pub owner: PlayerId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub grounded: bool,
    pub radius: f32,
    pub alive: bool,
    /// Flagged for removal at end of tick
    pub pending_removal: bool,
    pub input: CharacterInput,
    pub prev_input: CharacterInput,
    pub recoil: Vec2,

    // === WEAPON STATE ===
    pub weapons: Vec<WeaponSlot>,
    pub active_weapon: WeaponId,
    pub last_weapon: WeaponId,
    pub queued_weapon: Option<WeaponId>,
    /// Last selected variant per category
    pub category_choice: [Option<WeaponId>; WeaponCategory::COUNT],
    pub reload_timer: i32,
    pub clip_reload_timer: i32,
    pub melee_ready: bool,
    pub melee: MeleeState,
    pub grenades: i32,

    // === VITALITY ===
    pub health: i32,
    pub max_health: i32,
    /// Display value of the active weapon's reserve
    pub armor: i32,

    // === COLD FIELDS ===
    pub is_bot: bool,
    /// Copy of the owner's abilities, taken at spawn
    pub abilities: AbilitySet,
    pub spawn_pos: Vec2,
    pub spawn_tick: u64,
    /// Bit 0: jump held, bit 1: air jump used
    pub jumped: u8,
    pub hook_anchor: Option<Vec2>,
    pub last_no_ammo_sound: Option<u64>,
    pub pain_sound_timer: i32,
    pub reload_sound_timer: i32,
    pub death_tile_timer: i32,
    pub emote: Emote,
    pub emote_until: u64,
}

impl Character {
    pub fn new(owner: PlayerId, pos: Vec2, weapon_count: usize, is_bot: bool, tick: u64) -> Self {
        Self {
            owner,
            pos,
            vel: Vec2::ZERO,
            grounded: false,
            radius: PROXIMITY_RADIUS,
            alive: true,
            pending_removal: false,
            input: CharacterInput::default(),
            prev_input: CharacterInput::default(),
            recoil: Vec2::ZERO,
            weapons: vec![WeaponSlot::default(); weapon_count],
            active_weapon: 0,
            last_weapon: 0,
            queued_weapon: None,
            category_choice: [None; WeaponCategory::COUNT],
            reload_timer: 0,
            clip_reload_timer: 0,
            melee_ready: false,
            melee: MeleeState::default(),
            grenades: START_GRENADES,
            health: 0,
            max_health: 0,
            armor: 0,
            is_bot,
            abilities: AbilitySet::default(),
            spawn_pos: pos,
            spawn_tick: tick,
            jumped: 0,
            hook_anchor: None,
            last_no_ammo_sound: None,
            pain_sound_timer: 0,
            reload_sound_timer: 0,
            death_tile_timer: 0,
            emote: Emote::Normal,
            emote_until: 0,
        }
    }

    #[inline]
    pub fn slot(&self, weapon: WeaponId) -> Option<&WeaponSlot> {
        self.weapons.get(weapon)
    }

    #[inline]
    pub fn slot_mut(&mut self, weapon: WeaponId) -> Option<&mut WeaponSlot> {
        self.weapons.get_mut(weapon)
    }

    #[inline]
    pub fn active_slot(&self) -> Option<&WeaponSlot> {
        self.weapons.get(self.active_weapon)
    }

    #[inline]
    pub fn aim_direction(&self) -> Vec2 {
        self.input.aim_direction()
    }

    pub fn set_emote(&mut self, emote: Emote, until_tick: u64) {
        self.emote = emote;
        self.emote_until = until_tick;
    }

    /// Emote currently shown, falling back to normal once expired
    pub fn current_emote(&self, tick: u64) -> Emote {
        if tick < self.emote_until {
            self.emote
        } else {
            Emote::Normal
        }
    }
}

/// Shared per-simulation context plus all live entities
pub struct SimState {
    pub tick: u64,
    pub catalog: Arc<WeaponCatalog>,
    pub world: Arc<dyn WorldQuery>,
    pub waypoints: Arc<WaypointGraph>,
    pub tunables: GameTunables,
    pub respawn_delay_ticks: u64,
    pub characters: Arena<Character>,
    pub players: Vec<Option<Player>>,
    pub effects: Effects,
    pub grid: CharacterGrid,
    /// Spread and other non-bot randomness
    pub rng: StdRng,
    pub metrics: Arc<SimMetrics>,
}

impl SimState {
    pub fn new(
        catalog: Arc<WeaponCatalog>,
        world: Arc<dyn WorldQuery>,
        waypoints: Arc<WaypointGraph>,
        tunables: GameTunables,
        seed: u64,
    ) -> Self {
        Self {
            tick: 0,
            catalog,
            world,
            waypoints,
            tunables,
            respawn_delay_ticks: RESPAWN_DELAY_TICKS,
            characters: Arena::with_capacity(MAX_PLAYERS),
            players: (0..MAX_PLAYERS).map(|_| None).collect(),
            effects: Effects::new(),
            grid: CharacterGrid::default(),
            rng: StdRng::seed_from_u64(seed),
            metrics: Arc::new(SimMetrics::new()),
        }
    }

    #[inline]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id)?.as_ref()
    }

    #[inline]
    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(id)?.as_mut()
    }

    pub fn players_iter(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().flatten()
    }

    #[inline]
    pub fn character(&self, handle: CharacterHandle) -> Option<&Character> {
        self.characters.get(handle)
    }

    #[inline]
    pub fn character_mut(&mut self, handle: CharacterHandle) -> Option<&mut Character> {
        self.characters.get_mut(handle)
    }

    /// Living character of a player
    pub fn character_of(&self, player: PlayerId) -> Option<CharacterHandle> {
        let handle = self.player(player)?.character?;
        match self.characters.get(handle) {
            Some(ch) if ch.alive => Some(handle),
            _ => None,
        }
    }

    #[inline]
    pub fn weapon(&self, id: WeaponId) -> Option<&WeaponSpec> {
        self.catalog.get(id)
    }

    pub fn abilities_of(&self, player: PlayerId) -> AbilitySet {
        self.player(player).map(|p| p.abilities).unwrap_or_default()
    }

    pub fn team_of(&self, player: PlayerId) -> Team {
        self.player(player).map(|p| p.team).unwrap_or_default()
    }

    pub fn is_bot(&self, player: PlayerId) -> bool {
        self.player(player).is_some_and(Player::is_bot)
    }

    /// Hit between different players of the same team while teamplay is on
    pub fn is_friendly_fire(&self, victim: PlayerId, attacker: PlayerId) -> bool {
        if victim == attacker || !self.tunables.teamplay {
            return false;
        }
        let team = self.team_of(victim);
        team != Team::Free && team == self.team_of(attacker)
    }

    /// Opponent from `player`'s point of view
    pub fn is_hostile(&self, player: PlayerId, other: PlayerId) -> bool {
        if player == other {
            return false;
        }
        if !self.tunables.teamplay {
            return true;
        }
        let team = self.team_of(player);
        team == Team::Free || team != self.team_of(other)
    }

    /// Re-index every living character
    pub fn rebuild_grid(&mut self) {
        self.grid.clear();
        for (handle, ch) in self.characters.iter() {
            if ch.alive {
                self.grid.insert(GridEntry {
                    handle,
                    position: ch.pos,
                    radius: ch.radius,
                });
            }
        }
    }

    fn still_alive(&self, hits: GridHits) -> GridHits {
        hits.into_iter()
            .filter(|e| self.characters.get(e.handle).is_some_and(|c| c.alive))
            .collect()
    }

    /// Living characters whose body overlaps the circle, ordered by handle
    pub fn find_characters_in_radius(&self, pos: Vec2, radius: f32) -> GridHits {
        self.still_alive(self.grid.query_radius(pos, radius))
    }

    pub fn nearest_character(
        &self,
        pos: Vec2,
        radius: f32,
        exclude: Option<CharacterHandle>,
    ) -> Option<CharacterHandle> {
        let mut candidates: SmallVec<[(f32, CharacterHandle); 16]> = self
            .find_characters_in_radius(pos, radius)
            .into_iter()
            .filter(|e| Some(e.handle) != exclude)
            .map(|e| (e.position.distance_to(pos), e.handle))
            .filter(|(d, _)| *d <= radius)
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        candidates.first().map(|(_, h)| *h)
    }

    /// First living character along `from -> to` within `radius` of the
    /// segment, with the closest point on the segment
    pub fn intersect_character(
        &self,
        from: Vec2,
        to: Vec2,
        radius: f32,
        exclude: Option<CharacterHandle>,
    ) -> Option<(CharacterHandle, Vec2)> {
        self.still_alive(self.grid.query_segment(from, to, radius))
            .into_iter()
            .filter(|e| Some(e.handle) != exclude)
            .map(|e| {
                let point = e.position.closest_on_segment(from, to);
                (e.handle, point, from.distance_to(point))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)))
            .map(|(h, p, _)| (h, p))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::game::waypoints::WaypointGraph;
    use crate::game::world::TileMap;

    /// Flat 40x12 room, floor at row 10
    pub const FLAT_MAP: &str = "
########################################
#......................................#
#......................................#
#......................................#
#......................................#
#......................................#
#......................................#
#......................................#
#......................................#
#.S..................................S.#
########################################
########################################
";

    pub fn test_state_with_map(map: &str) -> SimState {
        let map = TileMap::from_ascii(map).unwrap();
        let waypoints = WaypointGraph::build(&map);
        let catalog = WeaponCatalog::builtin().unwrap();
        SimState::new(
            Arc::new(catalog),
            Arc::new(map),
            Arc::new(waypoints),
            GameTunables::default(),
            7,
        )
    }

    pub fn test_state() -> SimState {
        test_state_with_map(FLAT_MAP)
    }

    pub fn add_player(state: &mut SimState, id: PlayerId, kind: PlayerKind, team: Team) {
        state.players[id] = Some(Player::new(id, kind, team));
    }

    /// Standing position on the floor of `FLAT_MAP` at tile column `col`
    pub fn floor_pos(col: i32) -> Vec2 {
        Vec2::new((col as f32 + 0.5) * 32.0, 9.0 * 32.0 + 32.0 - PROXIMITY_RADIUS - 0.5)
    }
}
