//! Read-only projections of the simulation for the network layer
//!
//! Health and ammo are quantized to the 0..=10 display range the HUD draws.
//! Encoding uses bincode's standard config over the serde derives.

use serde::{Deserialize, Serialize};

use crate::game::catalog::WeaponId;
use crate::game::events::Emote;
use crate::game::state::{Character, PlayerId, SimState, Team};
use crate::util::vec2::Vec2;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("snapshot encode failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),
    #[error("snapshot decode failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// One living character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub player: PlayerId,
    pub team: Team,
    pub is_bot: bool,
    pub position: Vec2,
    pub velocity: Vec2,
    pub grounded: bool,
    pub aim: Vec2,
    /// 0..=10, at least 1 while alive
    pub health: u8,
    /// 0..=10
    pub armor: u8,
    /// Raw count below a 10-round clip, else 0..=10
    pub ammo: u8,
    pub weapon: WeaponId,
    pub emote: Emote,
    pub hooking: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub owner: PlayerId,
    pub weapon: WeaponId,
    pub position: Vec2,
    pub velocity: Vec2,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSnapshot {
    pub player: PlayerId,
    pub kills: u32,
    pub deaths: u32,
}

/// Everything a client needs to draw one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub characters: Vec<CharacterSnapshot>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub scores: Vec<ScoreSnapshot>,
}

/// `hidden / max * 10`, never 0 for a living character
pub fn display_health(health: i32, max_health: i32) -> u8 {
    if health <= 0 {
        return 0;
    }
    let max = max_health.max(1);
    ((health * 10 / max).clamp(1, 10)) as u8
}

/// Small clips show the raw count; larger ones a 0..=10 gauge
pub fn display_ammo(loaded: i32, clip_size: i32) -> u8 {
    if loaded <= 0 {
        return 0;
    }
    if clip_size < 10 {
        return loaded.min(u8::MAX as i32) as u8;
    }
    ((loaded * 10 / clip_size).clamp(1, 10)) as u8
}

impl CharacterSnapshot {
    pub fn from_character(state: &SimState, ch: &Character) -> Self {
        let loaded = ch.active_slot().map_or(0, |s| s.ammo);
        let clip = state.weapon(ch.active_weapon).map_or(0, |s| s.clip_size);
        Self {
            player: ch.owner,
            team: state.team_of(ch.owner),
            is_bot: ch.is_bot,
            position: ch.pos,
            velocity: ch.vel,
            grounded: ch.grounded,
            aim: ch.aim_direction(),
            health: display_health(ch.health, ch.max_health),
            armor: ch.armor.clamp(0, 10) as u8,
            ammo: display_ammo(loaded, clip),
            weapon: ch.active_weapon,
            emote: ch.current_emote(state.tick),
            hooking: ch.hook_anchor.is_some(),
        }
    }
}

impl WorldSnapshot {
    /// Project the current state; characters in handle order
    pub fn capture(state: &SimState) -> Self {
        let characters = state
            .characters
            .iter()
            .filter(|(_, ch)| ch.alive)
            .map(|(_, ch)| CharacterSnapshot::from_character(state, ch))
            .collect();
        let projectiles = state
            .effects
            .projectiles
            .iter()
            .map(|(_, p)| ProjectileSnapshot {
                owner: p.owner,
                weapon: p.weapon,
                position: p.pos,
                velocity: p.vel,
            })
            .collect();
        let scores = state
            .players_iter()
            .map(|p| ScoreSnapshot {
                player: p.id,
                kills: p.kills,
                deaths: p.deaths,
            })
            .collect();

        Self {
            tick: state.tick,
            characters,
            projectiles,
            scores,
        }
    }

    pub fn character(&self, player: PlayerId) -> Option<&CharacterSnapshot> {
        self.characters.iter().find(|c| c.player == player)
    }

    pub fn encode(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(bincode::serde::encode_to_vec(self, bincode::config::standard())?)
    }

    pub fn decode(data: &[u8]) -> Result<Self, SnapshotError> {
        let (snapshot, _) = bincode::serde::decode_from_slice(data, bincode::config::standard())?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::test_support::*;
    use crate::game::state::PlayerKind;
    use crate::game::systems::lifecycle::spawn_character;

    #[test]
    fn test_display_health() {
        assert_eq!(display_health(500, 500), 10);
        assert_eq!(display_health(250, 500), 5);
        assert_eq!(display_health(1, 500), 1, "alive never shows empty");
        assert_eq!(display_health(0, 500), 0);
        assert_eq!(display_health(-20, 100), 0);
        assert_eq!(display_health(700, 500), 10);
    }

    #[test]
    fn test_display_ammo() {
        assert_eq!(display_ammo(3, 5), 3, "small clips show the count");
        assert_eq!(display_ammo(10, 10), 10);
        assert_eq!(display_ammo(1, 30), 1);
        assert_eq!(display_ammo(15, 30), 5);
        assert_eq!(display_ammo(0, 30), 0);
    }

    #[test]
    fn test_capture_and_encode() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        add_player(&mut state, 1, PlayerKind::Bot, Team::Free);
        spawn_character(&mut state, 0, floor_pos(4)).unwrap();
        spawn_character(&mut state, 1, floor_pos(20)).unwrap();
        state.tick = 42;

        let snapshot = WorldSnapshot::capture(&state);
        assert_eq!(snapshot.tick, 42);
        assert_eq!(snapshot.characters.len(), 2);
        assert_eq!(snapshot.scores.len(), 2);

        let human = snapshot.character(0).unwrap();
        assert_eq!(human.health, 10);
        assert!(!human.is_bot);
        assert_eq!(human.ammo, 10, "full pistol clip");
        assert!(snapshot.character(1).unwrap().is_bot);

        let bytes = snapshot.encode().unwrap();
        assert_eq!(WorldSnapshot::decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(WorldSnapshot::decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
