//! Outbound side effects of a tick
//!
//! The simulation never talks to the network or audio layers directly. It
//! pushes fire-and-forget `GameEvent`s into an `EventSink` and creates
//! projectiles / transient effects through an `EntitySpawner`. `Effects` is the
//! in-tree implementation of both and is drained by the game loop.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::arena::{Arena, Handle};
use crate::game::catalog::WeaponId;
use crate::game::state::{CharacterHandle, PlayerId};
use crate::game::systems::projectile::Projectile;
use crate::util::vec2::Vec2;

pub type ProjectileHandle = Handle<Projectile>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sound {
    Spawn,
    Death,
    Hit,
    Pain,
    PainLong,
    HammerFire,
    HammerHit,
    GunFire,
    ShotgunFire,
    GrenadeFire,
    RifleFire,
    NinjaFire,
    NinjaHit,
    WeaponSwitch,
    NoAmmo,
    Reload,
    Explosion,
    Electro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Emote {
    #[default]
    Normal,
    Pain,
    Happy,
}

/// User-visible resource exhaustion messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    NoGrenades,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    Sound {
        sound: Sound,
        pos: Vec2,
    },
    DamageIndicator {
        pos: Vec2,
        /// Direction the hit came from
        angle: f32,
        amount: i32,
    },
    HammerHit {
        pos: Vec2,
    },
    Explosion {
        pos: Vec2,
        owner: Option<PlayerId>,
        weapon: WeaponId,
    },
    Spawn {
        player: PlayerId,
        pos: Vec2,
    },
    Death {
        player: PlayerId,
        pos: Vec2,
    },
    Kill {
        killer: Option<PlayerId>,
        victim: PlayerId,
        weapon: Option<WeaponId>,
    },
    Notice {
        player: PlayerId,
        notice: Notice,
    },
    /// Loadout handed to persistence right before a human dies
    SaveState {
        player: PlayerId,
        weapons: Vec<SavedWeapon>,
        kills: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedWeapon {
    pub weapon: WeaponId,
    pub ammo: i32,
    pub reserved: i32,
}

/// Creation contract for a flying projectile
#[derive(Debug, Clone, Copy)]
pub struct ProjectileSpawn {
    pub owner: PlayerId,
    pub weapon: WeaponId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub gravity: f32,
    pub lifetime_ticks: i32,
    pub damage: i32,
    pub knockback: f32,
    pub explosive: bool,
}

/// Short-lived visual effects mirrored to the network layer
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Beam {
        owner: PlayerId,
        from: Vec2,
        to: Vec2,
        hit: Option<CharacterHandle>,
    },
    Lightning {
        owner: PlayerId,
        points: SmallVec<[Vec2; 8]>,
    },
}

pub trait EventSink {
    fn emit(&mut self, event: GameEvent);

    #[inline]
    fn sound(&mut self, sound: Sound, pos: Vec2) {
        self.emit(GameEvent::Sound { sound, pos });
    }
}

impl EventSink for Vec<GameEvent> {
    #[inline]
    fn emit(&mut self, event: GameEvent) {
        self.push(event);
    }
}

pub trait EntitySpawner {
    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> ProjectileHandle;

    fn spawn_effect(&mut self, effect: Effect);

    /// Area-denial construction request, resolved by the game mode
    fn request_build(&mut self, owner: PlayerId, pos: Vec2);
}

/// Drained per-tick output handed to the network / game-mode layers
#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<GameEvent>,
    pub effects: Vec<Effect>,
    pub builds: Vec<(PlayerId, Vec2)>,
}

/// Everything a tick produced besides character state
#[derive(Default)]
pub struct Effects {
    pub events: Vec<GameEvent>,
    pub projectiles: Arena<Projectile>,
    pub transient: Vec<Effect>,
    pub builds: Vec<(PlayerId, Vec2)>,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take this tick's output, keeping live projectiles
    pub fn drain(&mut self) -> TickOutput {
        TickOutput {
            events: std::mem::take(&mut self.events),
            effects: std::mem::take(&mut self.transient),
            builds: std::mem::take(&mut self.builds),
        }
    }
}

impl EventSink for Effects {
    #[inline]
    fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }
}

impl EntitySpawner for Effects {
    fn spawn_projectile(&mut self, spawn: ProjectileSpawn) -> ProjectileHandle {
        self.projectiles.insert(Projectile::from_spawn(spawn))
    }

    fn spawn_effect(&mut self, effect: Effect) {
        self.transient.push(effect);
    }

    fn request_build(&mut self, owner: PlayerId, pos: Vec2) {
        self.builds.push((owner, pos));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effects_drain_keeps_projectiles() {
        let mut fx = Effects::new();
        fx.sound(Sound::GunFire, Vec2::ZERO);
        fx.spawn_effect(Effect::Beam {
            owner: 0,
            from: Vec2::ZERO,
            to: Vec2::new(10.0, 0.0),
            hit: None,
        });
        let handle = fx.spawn_projectile(ProjectileSpawn {
            owner: 0,
            weapon: 4,
            pos: Vec2::ZERO,
            vel: Vec2::new(1.0, 0.0),
            gravity: 0.0,
            lifetime_ticks: 10,
            damage: 1,
            knockback: 0.0,
            explosive: false,
        });
        fx.request_build(0, Vec2::ZERO);

        let out = fx.drain();
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.effects.len(), 1);
        assert_eq!(out.builds.len(), 1);
        assert!(fx.events.is_empty() && fx.builds.is_empty());
        assert!(fx.projectiles.contains(handle));
    }
}
