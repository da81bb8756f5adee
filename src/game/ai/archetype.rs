//! Bot archetypes: one shared decision loop, tuned per archetype

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Archetype {
    /// Pistol or magnum, sometimes an uzi or taser at higher levels
    Grunt,
    Grenadier,
    Shocker,
    Demolisher,
    /// Thunder hammer melee
    Brawler,
}

/// Tuning values read by the controller
#[derive(Debug, Clone, PartialEq)]
pub struct ArchetypeParams {
    pub power_level: i32,
    pub trigger_level: RangeInclusive<i32>,
    /// Health is `base + min((level - 1) * per_level, cap)`
    pub health_base: i32,
    pub health_per_level: i32,
    pub health_cap: i32,
    /// Chance per decision to release the trigger while in range
    pub stop_fire_chance: f32,
    /// Keep firing for a second after being hit
    pub attack_on_damage: bool,
}

/// What a freshly spawned bot character carries
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnLoadout {
    /// Weapon names; the last one becomes active
    pub weapons: SmallVec<[&'static str; 4]>,
    pub health: i32,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::Grunt,
        Archetype::Grenadier,
        Archetype::Shocker,
        Archetype::Demolisher,
        Archetype::Brawler,
    ];

    pub fn params(self) -> ArchetypeParams {
        match self {
            Archetype::Grunt => ArchetypeParams {
                power_level: 2,
                trigger_level: 5..=10,
                health_base: 60,
                health_per_level: 3,
                health_cap: 300,
                stop_fire_chance: 0.4,
                attack_on_damage: false,
            },
            Archetype::Grenadier => ArchetypeParams {
                power_level: 8,
                trigger_level: 15..=19,
                health_base: 60,
                health_per_level: 4,
                health_cap: 300,
                stop_fire_chance: 0.3,
                attack_on_damage: false,
            },
            Archetype::Shocker => ArchetypeParams {
                power_level: 12,
                trigger_level: 15..=19,
                health_base: 60,
                health_per_level: 4,
                health_cap: 200,
                stop_fire_chance: 0.2,
                attack_on_damage: true,
            },
            Archetype::Demolisher => ArchetypeParams {
                power_level: 10,
                trigger_level: 15..=19,
                health_base: 50,
                health_per_level: 4,
                health_cap: 150,
                stop_fire_chance: 0.3,
                attack_on_damage: false,
            },
            Archetype::Brawler => ArchetypeParams {
                power_level: 8,
                trigger_level: 15..=19,
                health_base: 60,
                health_per_level: 4,
                health_cap: 300,
                stop_fire_chance: 0.1,
                attack_on_damage: true,
            },
        }
    }

    /// Spawn health for a bot of `level`
    pub fn health(self, level: i32) -> i32 {
        let p = self.params();
        p.health_base + ((level.max(1) - 1) * p.health_per_level).min(p.health_cap)
    }

    pub fn loadout(self, level: i32, rng: &mut impl Rng) -> SpawnLoadout {
        let weapons = match self {
            Archetype::Grunt => {
                let odds = (level as f64 * 0.1).clamp(0.0, 1.0);
                let mut w: SmallVec<[&'static str; 4]> = SmallVec::new();
                if rng.gen_bool(odds) {
                    w.push("taser");
                } else if rng.gen_bool(odds) {
                    w.push("uzi");
                }
                w.push(if rng.gen_bool(0.6) { "pistol" } else { "magnum" });
                w
            }
            Archetype::Grenadier => smallvec!["grenade_launcher"],
            Archetype::Shocker => smallvec!["taser"],
            Archetype::Demolisher => smallvec!["doom_launcher"],
            Archetype::Brawler => smallvec!["thunder_hammer"],
        };
        SpawnLoadout {
            weapons,
            health: self.health(level),
        }
    }

    pub fn from_index(i: usize) -> Self {
        Self::ALL[i % Self::ALL.len()]
    }
}
