//! Weapon state machine: reload, fire and per-kind effects
//!
//! Fire gates, in order: fire delay, clip reload, dash readiness, trigger
//! signal (edge or held), loaded ammo. A shot consumes ammo (humans only),
//! pushes recoil, resets the fire delay and spawns the weapon's effect.

use rand::Rng;
use smallvec::SmallVec;

use crate::game::catalog::{pellet_pattern, ProjectileKind, WeaponCategory, WeaponId, WeaponSpec};
use crate::game::constants::character::{
    ELECTRO_STUN_TICKS, NO_AMMO_LOCKOUT_MS, NO_AMMO_SOUND_MS, RELOAD_SOUND_INTERVAL,
};
use crate::game::constants::weapon::{
    ABILITY_SPEEDUP, BEAM_HIT_RADIUS, BEAM_OFFSET_GUN, BEAM_OFFSET_RIFLE, BULLET_GRAVITY,
    BULLET_SPEED, CHAIN_HIT_RADIUS, CHAIN_JITTER, CHAIN_SEGMENTS, CHAIN_SEGMENT_LENGTH,
    DASH_MOVETIME_MS, GRENADE_GRAVITY, GRENADE_SPEED, MUZZLE_OFFSET, PELLET_GRAVITY, PELLET_SPEED,
};
use crate::game::constants::{ms_to_ticks, secs_to_ticks};
use crate::game::events::{Effect, EntitySpawner, EventSink, GameEvent, Notice, ProjectileSpawn, Sound};
use crate::game::state::{Ability, AbilitySet, CharacterHandle, PlayerId, SimState};
use crate::game::systems::damage::{electro_shock, take_damage, DamageSource};
use crate::game::systems::inventory::{clip_reload_ticks, do_weapon_switch, show_armor};
use crate::game::systems::melee::{handle_dash, melee_bonus};
use crate::util::vec2::Vec2;

/// Per-tick weapon update for one character
pub fn handle_weapons(state: &mut SimState, h: CharacterHandle) {
    handle_dash(state, h);
    let forced = state
        .characters
        .get(h)
        .is_some_and(|ch| ch.input.reload_pressed(&ch.prev_input));
    reload_step(state, h, forced);

    let catalog = state.catalog.clone();
    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive {
        return;
    }
    show_armor(ch, &catalog);

    if ch.reload_timer > 0 {
        ch.reload_timer -= 1;
        return;
    }

    fire_weapon(state, h);
}

/// Clip reload: start when the clip is empty, transfer ammo on expiry
pub fn do_reloading(state: &mut SimState, h: CharacterHandle) {
    reload_step(state, h, false);
}

/// Start a clip reload on a partially loaded clip. Full clips, weapons
/// without clips and an empty reserve are left alone.
pub fn force_reload(state: &mut SimState, h: CharacterHandle) {
    reload_step(state, h, true);
}

fn reload_step(state: &mut SimState, h: CharacterHandle, force: bool) {
    let catalog = state.catalog.clone();
    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    let active = ch.active_weapon;
    let (Some(spec), Some(slot)) = (catalog.get(active), ch.slot(active).copied()) else {
        return;
    };
    if spec.clip_size <= 0 || slot.ammo >= spec.clip_size || !ch.alive {
        return;
    }
    let unlimited = spec.max_ammo == 0;

    if ch.clip_reload_timer <= 0 {
        if (slot.ammo <= 0 || force) && (slot.reserved > 0 || unlimited) {
            ch.clip_reload_timer = clip_reload_ticks(spec, ch.abilities);
            ch.reload_sound_timer = 0;
        }
        if ch.clip_reload_timer <= 0 {
            return;
        }
    }

    ch.clip_reload_timer -= 1;
    if !ch.is_bot {
        ch.reload_sound_timer -= 1;
        if ch.reload_sound_timer <= 0 {
            ch.reload_sound_timer = RELOAD_SOUND_INTERVAL;
            let pos = ch.pos;
            state.effects.sound(Sound::Reload, pos);
        }
    }

    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if ch.clip_reload_timer > 0 {
        return;
    }
    let Some(slot) = ch.slot_mut(active) else {
        return;
    };
    if unlimited {
        slot.ammo = spec.clip_size;
    } else {
        let moved = (spec.clip_size - slot.ammo).min(slot.reserved).max(0);
        slot.ammo += moved;
        slot.reserved -= moved;
    }
}

/// Fire delay in ticks after a shot
fn fire_delay(spec: &WeaponSpec, abilities: AbilitySet) -> i32 {
    let ticks = spec.reload_ticks();
    if spec.kind.is_melee() && abilities.contains(Ability::MeleeSpeed) {
        (ticks as f32 / ABILITY_SPEEDUP) as i32
    } else {
        ticks
    }
}

/// Everything the effect dispatch needs once the character borrow is released
struct Shot {
    owner: PlayerId,
    weapon: WeaponId,
    pos: Vec2,
    dir: Vec2,
    muzzle: Vec2,
    target: Vec2,
    abilities: AbilitySet,
}

/// Try to fire the active weapon
pub fn fire_weapon(state: &mut SimState, h: CharacterHandle) {
    let catalog = state.catalog.clone();
    let tick = state.tick;

    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    do_weapon_switch(ch, &catalog, &mut state.effects);
    if !ch.alive || ch.reload_timer > 0 || ch.clip_reload_timer > 0 {
        return;
    }

    let active = ch.active_weapon;
    let (Some(spec), Some(slot)) = (catalog.get(active), ch.slot(active).copied()) else {
        return;
    };
    if !slot.usable() {
        return;
    }
    if spec.kind.is_dash() && !ch.melee_ready {
        return;
    }

    let will_fire = if spec.full_auto || ch.is_bot {
        ch.input.fire
    } else {
        ch.input.fire_pressed(&ch.prev_input)
    };
    if !will_fire {
        return;
    }

    if spec.clip_size > 0 && slot.ammo <= 0 {
        if !ch.is_bot {
            ch.reload_timer = ms_to_ticks(NO_AMMO_LOCKOUT_MS);
            let due = ch
                .last_no_ammo_sound
                .map_or(true, |t| tick >= t + ms_to_ticks(NO_AMMO_SOUND_MS) as u64);
            if due {
                ch.last_no_ammo_sound = Some(tick);
                let pos = ch.pos;
                state.effects.sound(Sound::NoAmmo, pos);
            }
        }
        return;
    }

    let dir = ch.aim_direction();
    if !ch.is_bot && spec.clip_size > 0 {
        if let Some(slot) = ch.slot_mut(active) {
            slot.ammo -= 1;
        }
    }
    ch.recoil -= dir * spec.self_knockback;
    ch.reload_timer = fire_delay(spec, ch.abilities);

    let shot = Shot {
        owner: ch.owner,
        weapon: active,
        pos: ch.pos,
        dir,
        muzzle: ch.pos + dir * ch.radius * MUZZLE_OFFSET,
        target: ch.input.target,
        abilities: ch.abilities,
    };

    if spec.kind.is_dash() {
        ch.melee_ready = false;
        ch.melee.weapon = Some(active);
        ch.melee.activation_dir = dir;
        ch.melee.move_ticks = (ms_to_ticks(DASH_MOVETIME_MS as i32) as f32 * spec.life) as i32;
        ch.melee.old_vel_amount = ch.vel.length();
        ch.melee.hit.clear();
    }

    state.metrics.record_shot();

    match spec.kind {
        ProjectileKind::Melee => fire_hammer(state, h, spec, &shot),
        ProjectileKind::Dash | ProjectileKind::FlyingMelee => {
            state.effects.sound(Sound::NinjaFire, shot.pos);
        }
        ProjectileKind::Bullet => fire_bullet(state, spec, &shot),
        ProjectileKind::Pellet => fire_pellets(state, spec, &shot),
        ProjectileKind::Grenade => {
            launch_grenade(state, spec, &shot);
            state.effects.sound(Sound::GrenadeFire, shot.pos);
        }
        ProjectileKind::Beam => fire_beams(state, h, spec, &shot),
        ProjectileKind::ChainArc => fire_chain_arcs(state, h, spec, &shot),
        ProjectileKind::Build => {
            state.effects.request_build(shot.owner, shot.pos + shot.target);
            state.effects.sound(Sound::HammerFire, shot.pos);
        }
    }
}

/// Strike every visible character around the muzzle
fn fire_hammer(state: &mut SimState, h: CharacterHandle, spec: &WeaponSpec, shot: &Shot) {
    state.effects.sound(Sound::HammerFire, shot.pos);
    let radius = state.characters.get(h).map_or(0.0, |c| c.radius);

    let targets: SmallVec<[(CharacterHandle, Vec2); 8]> = state
        .find_characters_in_radius(shot.muzzle, radius * 0.5)
        .into_iter()
        .filter(|e| e.handle != h)
        .filter(|e| state.world.has_line_of_sight(shot.muzzle, e.position))
        .map(|e| (e.handle, e.position))
        .collect();

    let damage = spec.damage + melee_bonus(shot.abilities);
    let lifesteal = shot.abilities.contains(Ability::MeleeLifesteal);
    for (target, target_pos) in targets {
        let toward = target_pos - shot.pos;
        let dir = if toward.is_zero(0.0001) {
            Vec2::UP
        } else {
            toward.normalize()
        };
        state.effects.emit(GameEvent::HammerHit {
            pos: target_pos - dir * radius * 0.5,
        });
        let force = Vec2::UP + (dir + Vec2::new(0.0, -1.1)).normalize() * 10.0 * spec.knockback;
        take_damage(
            state,
            target,
            force,
            damage,
            Some(shot.owner),
            DamageSource::Weapon(shot.weapon),
            lifesteal,
        );
    }
}

fn bullet_damage(spec: &WeaponSpec, abilities: AbilitySet) -> i32 {
    spec.damage + abilities.count(&[Ability::BulletDamage1, Ability::BulletDamage2])
}

/// `(r1 - r2) * spread`, a triangular jitter centered on zero
fn jitter(state: &mut SimState, spread: f32) -> f32 {
    let r1: f32 = state.rng.gen();
    let r2: f32 = state.rng.gen();
    (r1 - r2) * spread
}

fn spawn_projectile(state: &mut SimState, spawn: ProjectileSpawn) {
    state.effects.spawn_projectile(spawn);
    state.metrics.record_projectile();
}

fn fire_bullet(state: &mut SimState, spec: &WeaponSpec, shot: &Shot) {
    let angle = shot.dir.angle() + jitter(state, spec.spread);
    spawn_projectile(
        state,
        ProjectileSpawn {
            owner: shot.owner,
            weapon: shot.weapon,
            pos: shot.muzzle,
            vel: Vec2::from_angle(angle) * BULLET_SPEED,
            gravity: BULLET_GRAVITY,
            lifetime_ticks: secs_to_ticks(spec.life),
            damage: bullet_damage(spec, shot.abilities),
            knockback: spec.knockback,
            explosive: false,
        },
    );
    state.effects.sound(Sound::GunFire, shot.pos);
}

fn fire_pellets(state: &mut SimState, spec: &WeaponSpec, shot: &Shot) {
    let extra = shot.abilities.count(&[Ability::ShotgunSpread]);
    let base = shot.dir.angle();
    for (offset, speed) in pellet_pattern(spec.shot_spread, extra) {
        let angle = base + offset + jitter(state, spec.spread);
        spawn_projectile(
            state,
            ProjectileSpawn {
                owner: shot.owner,
                weapon: shot.weapon,
                pos: shot.muzzle,
                vel: Vec2::from_angle(angle) * PELLET_SPEED * speed,
                gravity: PELLET_GRAVITY,
                lifetime_ticks: secs_to_ticks(spec.life).max(1),
                damage: bullet_damage(spec, shot.abilities),
                knockback: spec.knockback,
                explosive: false,
            },
        );
    }
    state.effects.sound(Sound::ShotgunFire, shot.pos);
}

fn launch_grenade(state: &mut SimState, spec: &WeaponSpec, shot: &Shot) {
    spawn_projectile(
        state,
        ProjectileSpawn {
            owner: shot.owner,
            weapon: shot.weapon,
            pos: shot.muzzle,
            vel: shot.dir * GRENADE_SPEED,
            gravity: GRENADE_GRAVITY,
            lifetime_ticks: secs_to_ticks(spec.life),
            damage: spec.damage,
            knockback: spec.knockback,
            explosive: true,
        },
    );
}

fn electro_damage(spec: &WeaponSpec, abilities: AbilitySet) -> i32 {
    if spec.electric {
        spec.damage + abilities.count(&[Ability::ElectroDamage])
    } else {
        spec.damage
    }
}

fn fire_beams(state: &mut SimState, h: CharacterHandle, spec: &WeaponSpec, shot: &Shot) {
    let offset = if spec.category == WeaponCategory::Rifle {
        BEAM_OFFSET_RIFLE
    } else {
        BEAM_OFFSET_GUN
    };
    let mut reach = spec.life;
    if shot.abilities.contains(Ability::ElectroReach) {
        reach *= ABILITY_SPEEDUP;
    }

    let mut angles: SmallVec<[f32; 2]> = SmallVec::new();
    if spec.shot_spread == 1 {
        angles.push(0.0);
    } else {
        let r: f32 = state.rng.gen();
        let a = (1.0 + r) / 10.0;
        angles.push(-a);
        angles.push(a);
    }

    let damage = electro_damage(spec, shot.abilities);
    for a in angles {
        let dir = shot.dir.rotate(a);
        fire_beam(state, h, shot, dir, offset, reach, damage, spec.electric);
    }
    let sound = if spec.electric {
        Sound::Electro
    } else {
        Sound::RifleFire
    };
    state.effects.sound(sound, shot.pos);
}

/// One hitscan line. Solid geometry clips the line before the character
/// search, so a blocked target is never hit.
#[allow(clippy::too_many_arguments)]
fn fire_beam(
    state: &mut SimState,
    h: CharacterHandle,
    shot: &Shot,
    dir: Vec2,
    offset: f32,
    reach: f32,
    damage: i32,
    electric: bool,
) {
    let mut from = shot.pos + dir * offset;
    let mut to = from + dir * reach;
    if let Some(hit) = state.world.intersect_line(shot.pos, to) {
        to = hit.point;
        if shot.pos.distance_sq_to(to) < shot.pos.distance_sq_to(from) {
            from = shot.pos;
        }
    }

    let target = state.intersect_character(from, to, BEAM_HIT_RADIUS, Some(h));
    let hit = target.map(|(t, _)| t);
    if let Some((t, point)) = target {
        to = point;
        take_damage(
            state,
            t,
            dir,
            damage,
            Some(shot.owner),
            DamageSource::Weapon(shot.weapon),
            false,
        );
        if electric {
            electro_shock(state, t, ELECTRO_STUN_TICKS);
        }
    }

    state.effects.spawn_effect(Effect::Beam {
        owner: shot.owner,
        from,
        to,
        hit,
    });
}

fn fire_chain_arcs(state: &mut SimState, h: CharacterHandle, spec: &WeaponSpec, shot: &Shot) {
    let damage = electro_damage(spec, shot.abilities);
    for _ in 0..spec.shot_spread.max(1) {
        let dir = shot.dir.rotate(jitter(state, spec.spread));
        fire_chain_arc(state, h, shot, dir, damage);
    }
    state.effects.sound(Sound::Electro, shot.pos);
}

/// Jittered segment walk that ends on the first wall or character
fn fire_chain_arc(state: &mut SimState, h: CharacterHandle, shot: &Shot, dir: Vec2, damage: i32) {
    let mut points: SmallVec<[Vec2; 8]> = SmallVec::new();
    let mut cur = shot.muzzle;
    let mut d = dir;
    points.push(cur);

    for _ in 0..CHAIN_SEGMENTS {
        let r: f32 = state.rng.gen();
        d = d.rotate((r - 0.5) * CHAIN_JITTER);
        let mut next = cur + d * CHAIN_SEGMENT_LENGTH;
        let wall = state.world.intersect_line(cur, next);
        if let Some(hit) = wall {
            next = hit.point;
        }

        if let Some((t, point)) = state.intersect_character(cur, next, CHAIN_HIT_RADIUS, Some(h)) {
            points.push(point);
            take_damage(
                state,
                t,
                d,
                damage,
                Some(shot.owner),
                DamageSource::Weapon(shot.weapon),
                false,
            );
            electro_shock(state, t, ELECTRO_STUN_TICKS);
            break;
        }
        points.push(next);
        if wall.is_some() {
            break;
        }
        cur = next;
    }

    state.effects.spawn_effect(Effect::Lightning {
        owner: shot.owner,
        points,
    });
}

/// Hand grenade on the grenade button edge, independent of the active weapon
pub fn throw_grenade(state: &mut SimState, h: CharacterHandle) {
    let catalog = state.catalog.clone();
    let Some(launcher) = catalog.id_of("grenade_launcher") else {
        return;
    };
    let Some(spec) = catalog.get(launcher) else {
        return;
    };
    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive || !ch.input.grenade_pressed(&ch.prev_input) {
        return;
    }
    if ch.grenades <= 0 {
        let owner = ch.owner;
        state.effects.emit(GameEvent::Notice {
            player: owner,
            notice: Notice::NoGrenades,
        });
        return;
    }
    ch.grenades -= 1;

    let dir = ch.aim_direction();
    let shot = Shot {
        owner: ch.owner,
        weapon: launcher,
        pos: ch.pos,
        dir,
        muzzle: ch.pos + dir * ch.radius * MUZZLE_OFFSET,
        target: ch.input.target,
        abilities: ch.abilities,
    };
    launch_grenade(state, spec, &shot);
    state.effects.sound(Sound::GrenadeFire, shot.pos);
}
