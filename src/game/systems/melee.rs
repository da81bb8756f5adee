//! Dash melee windows
//!
//! A dash moves the wielder's body along the activation direction for a fixed
//! number of ticks and damages every character it passes at most once. The
//! hit list is capped; once full, further targets are skipped for the rest of
//! the window instead of recycling entries.

use crate::game::catalog::{ProjectileKind, WeaponId};
use crate::game::constants::character::HIT_LIST_CAP;
use crate::game::constants::weapon::{
    DASH_VELOCITY, FLYING_ARC_DAMAGE, FLYING_ARC_RADIUS, FLYING_ARC_REACH, FLYING_SPEED_FACTOR,
    FLYING_STEER, FLYING_WALL_BOX, FLYING_WALL_PROBE, MELEE_DAMAGE_BONUS,
};
use crate::game::events::{Effect, EntitySpawner, EventSink, Sound};
use crate::game::state::{Ability, AbilitySet, CharacterHandle, SimState};
use crate::game::systems::damage::{take_damage, DamageSource};
use crate::util::vec2::Vec2;
use smallvec::smallvec;

/// Flat melee damage bonus from abilities
pub fn melee_bonus(abilities: AbilitySet) -> i32 {
    MELEE_DAMAGE_BONUS * abilities.count(&[Ability::MeleeDamage1, Ability::MeleeDamage2])
}

/// Advance an active dash window by one tick
pub fn handle_dash(state: &mut SimState, h: CharacterHandle) {
    let catalog = state.catalog.clone();
    let world = state.world.clone();
    let tick = state.tick;

    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive || !ch.melee.active() {
        return;
    }
    let Some(spec) = ch.melee.weapon.and_then(|w| catalog.get(w)) else {
        ch.melee.move_ticks = 0;
        return;
    };
    let weapon = ch.melee.weapon.unwrap_or_default();
    let flying = spec.kind == ProjectileKind::FlyingMelee;

    ch.melee.move_ticks -= 1;
    if ch.melee.move_ticks == 0 {
        ch.vel = ch.melee.activation_dir * ch.melee.old_vel_amount;
        return;
    }

    if flying {
        let steered = ch.melee.activation_dir * (1.0 - FLYING_STEER) + ch.aim_direction() * FLYING_STEER;
        ch.melee.activation_dir = steered.normalize();
        // Weapon stays locked while flying
        ch.reload_timer = spec.reload_ticks();
        if world.test_box(ch.pos + ch.melee.activation_dir * FLYING_WALL_PROBE, FLYING_WALL_BOX) {
            ch.melee.move_ticks = 0;
            return;
        }
    }

    let speed = if flying {
        DASH_VELOCITY * FLYING_SPEED_FACTOR
    } else {
        DASH_VELOCITY
    };
    let old_pos = ch.pos;
    let (new_pos, _) = world.move_box(ch.pos, ch.melee.activation_dir * speed, ch.radius * 2.0, 0.0);
    ch.pos = new_pos;
    ch.vel = if flying { ch.vel * 0.5 } else { Vec2::ZERO };

    let owner = ch.owner;
    let radius = ch.radius;
    let dir = ch.melee.activation_dir;
    let abilities = ch.abilities;
    let already_hit = ch.melee.hit.clone();
    let center = old_pos + (new_pos - old_pos) * 0.5;

    let mut hits: Vec<CharacterHandle> = Vec::new();
    let mut list_len = already_hit.len();
    for target in state.find_characters_in_radius(center, radius * 2.0) {
        if target.handle == h || already_hit.contains(&target.handle) {
            continue;
        }
        if target.position.distance_to(new_pos) > radius * 2.0 + target.radius {
            continue;
        }
        if list_len >= HIT_LIST_CAP {
            break;
        }
        list_len += 1;
        hits.push(target.handle);
    }

    let damage = spec.damage + melee_bonus(abilities);
    let lifesteal = abilities.contains(Ability::MeleeLifesteal);
    let force = if flying {
        dir * 30.0 + Vec2::new(0.0, -3.0)
    } else {
        Vec2::new(0.0, -4.0)
    };

    for target in &hits {
        if let Some(ch) = state.characters.get_mut(h) {
            ch.melee.hit.push(*target);
        }
        if let Some(t) = state.characters.get(*target) {
            let pos = t.pos;
            state.effects.sound(Sound::NinjaHit, pos);
        }
        take_damage(
            state,
            *target,
            force,
            damage,
            Some(owner),
            DamageSource::Weapon(weapon),
            lifesteal,
        );
    }

    if flying && !hits.is_empty() {
        if let Some(ch) = state.characters.get_mut(h) {
            ch.melee.move_ticks = 0;
        }
        return;
    }

    if flying && spec.electric && tick % 2 == 1 {
        flying_arc(state, h, new_pos, dir, damage_arc(abilities), weapon);
    }
}

fn damage_arc(abilities: AbilitySet) -> i32 {
    FLYING_ARC_DAMAGE + abilities.count(&[Ability::ElectroDamage])
}

/// Electric arc from a flying melee to the closest visible character ahead
fn flying_arc(
    state: &mut SimState,
    h: CharacterHandle,
    pos: Vec2,
    dir: Vec2,
    damage: i32,
    weapon: WeaponId,
) {
    let Some(owner) = state.characters.get(h).map(|c| c.owner) else {
        return;
    };
    let probe = pos + dir * FLYING_ARC_REACH;
    let target = state
        .find_characters_in_radius(probe, FLYING_ARC_RADIUS)
        .into_iter()
        .filter(|e| e.handle != h)
        .filter(|e| state.world.has_line_of_sight(pos, e.position))
        .filter(|e| {
            state
                .characters
                .get(e.handle)
                .is_some_and(|c| state.is_hostile(owner, c.owner))
        })
        .min_by(|a, b| {
            a.position
                .distance_to(pos)
                .total_cmp(&b.position.distance_to(pos))
                .then(a.handle.cmp(&b.handle))
        });
    let Some(target) = target else {
        return;
    };

    state.effects.spawn_effect(Effect::Lightning {
        owner,
        points: smallvec![pos, target.position],
    });
    take_damage(
        state,
        target.handle,
        Vec2::ZERO,
        damage,
        Some(owner),
        DamageSource::Weapon(weapon),
        false,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::secs_to_ticks;
    use crate::game::constants::weapon::DASH_MOVETIME_MS;
    use crate::game::state::test_support::*;
    use crate::game::state::{Character, PlayerId, PlayerKind, Team};
    use crate::game::systems::damage::set_health;

    fn spawn(state: &mut SimState, owner: PlayerId, pos: Vec2) -> CharacterHandle {
        add_player(state, owner, PlayerKind::Human, Team::Free);
        let mut ch = Character::new(owner, pos, state.catalog.len(), false, 0);
        set_health(&mut ch, 100);
        let h = state.characters.insert(ch);
        state.player_mut(owner).unwrap().character = Some(h);
        h
    }

    fn start(state: &mut SimState, h: CharacterHandle, weapon: &str, dir: Vec2) {
        let w = state.catalog.id_of(weapon).unwrap();
        let ch = state.character_mut(h).unwrap();
        ch.melee.weapon = Some(w);
        ch.melee.activation_dir = dir;
        ch.melee.move_ticks = secs_to_ticks(DASH_MOVETIME_MS / 1000.0);
        ch.melee.old_vel_amount = 0.0;
        ch.melee.hit.clear();
        ch.input.target = dir;
    }

    fn run(state: &mut SimState, h: CharacterHandle, ticks: usize) {
        for _ in 0..ticks {
            state.rebuild_grid();
            handle_dash(state, h);
            state.tick += 1;
        }
    }

    #[test]
    fn test_dash_hits_each_target_once() {
        let mut state = test_state();
        let dasher = spawn(&mut state, 0, floor_pos(3));
        let target = spawn(&mut state, 1, floor_pos(6));
        start(&mut state, dasher, "sword", Vec2::new(1.0, 0.0));

        run(&mut state, dasher, 12);
        let sword = state.catalog.get(state.catalog.id_of("sword").unwrap()).unwrap().damage;
        assert_eq!(state.character(target).unwrap().health, 100 - sword);
        assert_eq!(state.character(dasher).unwrap().melee.hit.len(), 1);
    }

    #[test]
    fn test_dash_target_stays_in_range_over_several_ticks() {
        // Target moves along with the dasher, overlapping on every tick
        let mut state = test_state();
        let dasher = spawn(&mut state, 0, floor_pos(3));
        let target = spawn(&mut state, 1, floor_pos(4));
        start(&mut state, dasher, "sword", Vec2::new(1.0, 0.0));

        for _ in 0..8 {
            let p = state.character(dasher).unwrap().pos;
            state.character_mut(target).unwrap().pos = p + Vec2::new(10.0, 0.0);
            state.rebuild_grid();
            handle_dash(&mut state, dasher);
        }
        let sword = state.catalog.get(state.catalog.id_of("sword").unwrap()).unwrap().damage;
        assert_eq!(state.character(target).unwrap().health, 100 - sword);
    }

    #[test]
    fn test_hit_list_cap_skips_extra_targets() {
        let mut state = test_state();
        let dasher = spawn(&mut state, 0, floor_pos(3));
        let base = floor_pos(4);
        let mut targets = Vec::new();
        for i in 0..(HIT_LIST_CAP + 3) {
            targets.push(spawn(&mut state, i + 1, base + Vec2::new(i as f32 * 0.5, 0.0)));
        }
        start(&mut state, dasher, "sword", Vec2::new(1.0, 0.0));
        run(&mut state, dasher, 12);

        let damaged = targets
            .iter()
            .filter(|t| state.character(**t).unwrap().health < 100)
            .count();
        assert_eq!(damaged, HIT_LIST_CAP);
        assert_eq!(state.character(dasher).unwrap().melee.hit.len(), HIT_LIST_CAP);
    }

    #[test]
    fn test_dash_restores_velocity_at_end() {
        let mut state = test_state();
        let dasher = spawn(&mut state, 0, floor_pos(3));
        start(&mut state, dasher, "sword", Vec2::new(1.0, 0.0));
        state.character_mut(dasher).unwrap().melee.old_vel_amount = 4.0;
        run(&mut state, dasher, 10);
        let ch = state.character(dasher).unwrap();
        assert!(!ch.melee.active());
        assert_eq!(ch.vel, Vec2::new(4.0, 0.0));
        assert!(ch.pos.x > floor_pos(3).x + 100.0);
    }

    #[test]
    fn test_flying_melee_stops_at_wall() {
        let mut state = test_state();
        let dasher = spawn(&mut state, 0, floor_pos(2));
        start(&mut state, dasher, "thunder_hammer", Vec2::new(-1.0, 0.0));
        run(&mut state, dasher, 3);
        assert!(!state.character(dasher).unwrap().melee.active());
    }
}
