//! Damage, death and hazard terrain
//!
//! Knockback never touches velocity directly; it accumulates into the recoil
//! vector which the character tick feeds into velocity and decays.

use rand::Rng;
use tracing::{debug, info};

use crate::game::catalog::{WeaponCategory, WeaponId};
use crate::game::constants::character::{
    DEATH_TILE_CONTACT_TICKS, DEATH_TILE_DAMAGE, DEATH_TILE_PROBE, DEATH_TILE_PUSH, HAPPY_EMOTE_MS,
    LIFESTEAL_RATIO, PAIN_EMOTE_MS, PAIN_SOUND_INTERVAL,
};
use crate::game::constants::ms_to_ticks;
use crate::game::events::{Emote, EventSink, GameEvent, SavedWeapon, Sound};
use crate::game::state::{Ability, Character, CharacterHandle, PlayerId, SimState};
use crate::util::vec2::Vec2;

/// What dealt the damage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageSource {
    Weapon(WeaponId),
    /// Hazard terrain
    World,
    /// Game-mode kills (disconnect, team change)
    Game,
}

impl DamageSource {
    pub fn weapon(self) -> Option<WeaponId> {
        match self {
            DamageSource::Weapon(w) => Some(w),
            _ => None,
        }
    }
}

/// Apply a hit to `victim`. Returns whether the victim is still alive and
/// actually took the hit (false for dead, missing or friendly-fire targets).
pub fn take_damage(
    state: &mut SimState,
    victim: CharacterHandle,
    force: Vec2,
    amount: i32,
    from: Option<PlayerId>,
    source: DamageSource,
    lifesteal: bool,
) -> bool {
    let Some(ch) = state.characters.get_mut(victim) else {
        debug!(?victim, "take_damage: stale character handle");
        return false;
    };
    if !ch.alive {
        return false;
    }

    ch.recoil += force;
    let owner = ch.owner;
    let armor = ch
        .abilities
        .count(&[Ability::BodyArmor, Ability::HeavyBodyArmor]);
    let mut dmg = (amount - armor).max(0);

    // Aggro is registered before the friendly-fire check
    if dmg > 0 && matches!(source, DamageSource::Weapon(_)) {
        if let Some(ai) = state.player_mut(owner).and_then(|p| p.ai.as_mut()) {
            ai.receive_damage(from, dmg);
        }
    }

    if let Some(attacker) = from {
        if state.is_friendly_fire(owner, attacker) && !state.tunables.team_damage {
            return false;
        }
        if attacker == owner {
            dmg = (dmg / 2).max(1);
        }
    }
    if dmg == 0 {
        return true;
    }

    let tick = state.tick;
    let Some(ch) = state.characters.get_mut(victim) else {
        return false;
    };
    let pos = ch.pos;
    ch.health -= dmg;
    let dead = ch.health <= 0;

    state.effects.emit(GameEvent::DamageIndicator {
        pos,
        angle: (-force).angle(),
        amount: dmg,
    });

    if lifesteal {
        if let Some(attacker) = from.filter(|a| *a != owner) {
            if let Some(h) = state.character_of(attacker) {
                let heal = ((dmg as f32 * LIFESTEAL_RATIO) as i32).max(1);
                if let Some(att) = state.characters.get_mut(h) {
                    increase_health(att, heal);
                }
            }
        }
    }

    if let Some(attacker_pos) = from
        .filter(|a| *a != owner)
        .and_then(|a| state.character_of(a))
        .and_then(|h| state.characters.get(h))
        .map(|c| c.pos)
    {
        state.effects.sound(Sound::Hit, attacker_pos);
    }

    if dead {
        die(state, victim, from, source);
        if let Some(h) = from.filter(|a| *a != owner).and_then(|a| state.character_of(a)) {
            if let Some(att) = state.characters.get_mut(h) {
                att.set_emote(Emote::Happy, tick + ms_to_ticks(HAPPY_EMOTE_MS) as u64);
            }
        }
        return false;
    }

    let long_pain = dmg > 10 || state.rng.gen_bool(0.3);
    let Some(ch) = state.characters.get_mut(victim) else {
        return false;
    };
    if ch.pain_sound_timer <= 0 {
        ch.pain_sound_timer = PAIN_SOUND_INTERVAL;
        let sound = if long_pain { Sound::PainLong } else { Sound::Pain };
        state.effects.sound(sound, pos);
    }
    ch.set_emote(Emote::Pain, tick + ms_to_ticks(PAIN_EMOTE_MS) as u64);
    true
}

/// Kill `victim`. Idempotent: dead or missing characters are ignored.
pub fn die(state: &mut SimState, victim: CharacterHandle, killer: Option<PlayerId>, source: DamageSource) {
    let Some(ch) = state.characters.get_mut(victim) else {
        return;
    };
    if !ch.alive {
        return;
    }
    ch.alive = false;
    ch.pending_removal = true;
    ch.health = ch.health.min(0);
    ch.melee.move_ticks = 0;
    ch.hook_anchor = None;
    let owner = ch.owner;
    let pos = ch.pos;

    if state.tunables.save_state && !ch.is_bot {
        save_state(state, victim);
    }

    let respawn_at = state.tick + state.respawn_delay_ticks;
    if let Some(player) = state.player_mut(owner) {
        if source != DamageSource::Game {
            player.erase_weapons();
        }
        player.character = None;
        player.respawn_tick = Some(respawn_at);
        player.deaths += 1;
    }

    let weapon = source.weapon();
    let self_hammer = killer == Some(owner)
        && weapon
            .and_then(|w| state.catalog.get(w))
            .is_some_and(|s| s.category == WeaponCategory::Hammer);
    if source != DamageSource::Game && !self_hammer {
        info!(killer = ?killer, victim = owner, weapon = ?weapon, "kill");
        state.effects.emit(GameEvent::Kill {
            killer,
            victim: owner,
            weapon,
        });
    }

    if let Some(k) = killer.filter(|k| *k != owner) {
        if let Some(player) = state.player_mut(k) {
            player.kills += 1;
        }
    }
    state.metrics.record_kill();

    state.effects.sound(Sound::Death, pos);
    state.effects.emit(GameEvent::Death { player: owner, pos });
}

/// Record the loadout of `h` on its player and hand it to persistence
fn save_state(state: &mut SimState, h: CharacterHandle) {
    let Some(ch) = state.characters.get(h) else {
        return;
    };
    let weapons = ch
        .weapons
        .iter()
        .enumerate()
        .filter(|(_, slot)| slot.got)
        .map(|(weapon, slot)| SavedWeapon {
            weapon,
            ammo: slot.ammo,
            reserved: slot.reserved,
        })
        .collect();
    let owner = ch.owner;
    let Some(player) = state.players.get_mut(owner).and_then(|p| p.as_mut()) else {
        return;
    };
    player.save_weapons(ch);
    let kills = player.kills;
    debug!(player = owner, "saving state");
    state.effects.emit(GameEvent::SaveState {
        player: owner,
        weapons,
        kills,
    });
}

/// Game-mode kill without a kill message
pub fn kill(state: &mut SimState, victim: CharacterHandle) {
    die(state, victim, None, DamageSource::Game);
}

/// Hazard contact: instant death, or a push out of the hazard plus fixed
/// damage on every tick of contact
pub fn take_death_tile_damage(state: &mut SimState, victim: CharacterHandle) {
    if state.tunables.insta_death_tiles {
        die(state, victim, None, DamageSource::World);
        return;
    }

    let world = state.world.clone();
    let tick = state.tick;
    let Some(ch) = state.characters.get_mut(victim) else {
        return;
    };
    if !ch.alive {
        return;
    }
    ch.death_tile_timer = DEATH_TILE_CONTACT_TICKS;

    let pos = ch.pos;
    let solid = |offset: Vec2| world.is_solid_at(pos + offset);
    let top = solid(Vec2::new(0.0, -DEATH_TILE_PROBE));
    let bottom = solid(Vec2::new(0.0, DEATH_TILE_PROBE));
    let left = solid(Vec2::new(-DEATH_TILE_PROBE, 0.0));
    let right = solid(Vec2::new(DEATH_TILE_PROBE, 0.0));

    // Only a side with open space opposite it pushes
    if bottom && !top {
        ch.vel.y = -DEATH_TILE_PUSH;
    }
    if top && !bottom {
        ch.vel.y = DEATH_TILE_PUSH;
    }
    if right && !left {
        ch.vel.x = -DEATH_TILE_PUSH;
    }
    if left && !right {
        ch.vel.x = DEATH_TILE_PUSH;
    }
    ch.jumped = 0;
    ch.health -= DEATH_TILE_DAMAGE;
    if ch.health <= 0 {
        die(state, victim, None, DamageSource::World);
        return;
    }
    ch.set_emote(Emote::Pain, tick + ms_to_ticks(PAIN_EMOTE_MS) as u64);
    let owner = ch.owner;

    state.effects.sound(Sound::Pain, pos);
    if let Some(ai) = state.player_mut(owner).and_then(|p| p.ai.as_mut()) {
        ai.receive_damage(None, DEATH_TILE_DAMAGE);
    }
}

/// Heal up to the maximum. Returns false when already full.
pub fn increase_health(ch: &mut Character, amount: i32) -> bool {
    if ch.health >= ch.max_health {
        return false;
    }
    ch.health = (ch.health + amount).min(ch.max_health);
    true
}

/// Set both maximum and current health
pub fn set_health(ch: &mut Character, health: i32) {
    ch.max_health = health;
    ch.health = health;
}

/// Electric hits stun bots for a few ticks
pub fn electro_shock(state: &mut SimState, victim: CharacterHandle, ticks: i32) {
    let Some(ch) = state.characters.get(victim) else {
        return;
    };
    if !ch.alive {
        return;
    }
    let (owner, pos) = (ch.owner, ch.pos);
    if let Some(ai) = state.player_mut(owner).and_then(|p| p.ai.as_mut()) {
        ai.stun(ticks);
    }
    state.effects.sound(Sound::Electro, pos);
}
