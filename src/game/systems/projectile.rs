//! Flying projectiles: bullets, pellets and grenades
//!
//! Advanced once per tick in the deferred phase. Each step sweeps the segment
//! from the old to the new position against characters and the world; the
//! closer contact wins.

use crate::game::catalog::WeaponId;
use crate::game::constants::weapon::{
    EXPLOSION_FORCE, EXPLOSION_INNER_RADIUS, EXPLOSION_RADIUS, PROJECTILE_RADIUS,
};
use crate::game::events::{EventSink, GameEvent, ProjectileSpawn, Sound};
use crate::game::state::{CharacterHandle, PlayerId, SimState};
use crate::game::systems::damage::{take_damage, DamageSource};
use crate::util::vec2::Vec2;

#[derive(Debug, Clone)]
pub struct Projectile {
    pub owner: PlayerId,
    pub weapon: WeaponId,
    pub pos: Vec2,
    pub vel: Vec2,
    pub gravity: f32,
    /// Remaining ticks
    pub lifetime: i32,
    pub damage: i32,
    pub knockback: f32,
    pub explosive: bool,
}

impl Projectile {
    pub fn from_spawn(spawn: ProjectileSpawn) -> Self {
        Self {
            owner: spawn.owner,
            weapon: spawn.weapon,
            pos: spawn.pos,
            vel: spawn.vel,
            gravity: spawn.gravity,
            lifetime: spawn.lifetime_ticks,
            damage: spawn.damage,
            knockback: spawn.knockback,
            explosive: spawn.explosive,
        }
    }
}

enum Impact {
    Character(CharacterHandle, Vec2),
    World(Vec2),
    Expired(Vec2),
}

/// Advance every projectile one tick and resolve impacts
pub fn step_projectiles(state: &mut SimState) {
    let mut projectiles = std::mem::take(&mut state.effects.projectiles);

    for handle in projectiles.handles() {
        let Some(p) = projectiles.get_mut(handle) else {
            continue;
        };
        p.vel.y += p.gravity;
        let from = p.pos;
        let to = p.pos + p.vel;
        p.lifetime -= 1;

        let owner_char = state.character_of(p.owner);
        let char_hit = state.intersect_character(from, to, PROJECTILE_RADIUS, owner_char);
        let world_hit = state.world.intersect_line(from, to);

        let impact = match (char_hit, world_hit) {
            (Some((h, at)), Some(wall)) => {
                if from.distance_sq_to(at) <= from.distance_sq_to(wall.point) {
                    Some(Impact::Character(h, at))
                } else {
                    Some(Impact::World(wall.before))
                }
            }
            (Some((h, at)), None) => Some(Impact::Character(h, at)),
            (None, Some(wall)) => Some(Impact::World(wall.before)),
            (None, None) if p.lifetime <= 0 => Some(Impact::Expired(to)),
            (None, None) => None,
        };

        let Some(impact) = impact else {
            p.pos = to;
            continue;
        };

        let p = p.clone();
        projectiles.remove(handle);
        match impact {
            Impact::Character(_, at) | Impact::World(at) | Impact::Expired(at) if p.explosive => {
                explode(state, at, p.owner, p.weapon, p.damage, p.knockback);
            }
            Impact::Character(target, _) => {
                let force = p.vel.normalize() * p.knockback;
                take_damage(
                    state,
                    target,
                    force,
                    p.damage,
                    Some(p.owner),
                    DamageSource::Weapon(p.weapon),
                    false,
                );
            }
            Impact::World(_) | Impact::Expired(_) => {}
        }
    }

    // Impacts never spawn projectiles, so nothing was added meanwhile
    debug_assert!(state.effects.projectiles.is_empty());
    state.effects.projectiles = projectiles;
}

/// Radius damage with linear falloff outside the inner radius
pub fn explode(
    state: &mut SimState,
    pos: Vec2,
    owner: PlayerId,
    weapon: WeaponId,
    damage: i32,
    knockback: f32,
) {
    state.effects.emit(GameEvent::Explosion {
        pos,
        owner: Some(owner),
        weapon,
    });
    state.effects.sound(Sound::Explosion, pos);

    for target in state.find_characters_in_radius(pos, EXPLOSION_RADIUS) {
        let offset = target.position - pos;
        let distance = offset.length();
        let falloff = 1.0
            - ((distance - EXPLOSION_INNER_RADIUS) / (EXPLOSION_RADIUS - EXPLOSION_INNER_RADIUS))
                .clamp(0.0, 1.0);
        if falloff <= 0.0 {
            continue;
        }
        let dir = if distance > 0.0001 { offset / distance } else { Vec2::UP };
        let force = dir * EXPLOSION_FORCE * knockback.max(1.0) * falloff;
        let dmg = (damage as f32 * falloff).round() as i32;
        take_damage(
            state,
            target.handle,
            force,
            dmg,
            Some(owner),
            DamageSource::Weapon(weapon),
            false,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::events::EntitySpawner;
    use crate::game::state::test_support::*;
    use crate::game::state::{Character, PlayerKind, Team};
    use crate::game::systems::damage::set_health;

    fn spawn(state: &mut SimState, owner: PlayerId, pos: Vec2) -> CharacterHandle {
        let mut ch = Character::new(owner, pos, state.catalog.len(), false, 0);
        set_health(&mut ch, 100);
        let h = state.characters.insert(ch);
        state.player_mut(owner).unwrap().character = Some(h);
        state.rebuild_grid();
        h
    }

    fn bullet(owner: PlayerId, pos: Vec2, vel: Vec2, explosive: bool) -> ProjectileSpawn {
        ProjectileSpawn {
            owner,
            weapon: 4,
            pos,
            vel,
            gravity: 0.0,
            lifetime_ticks: 50,
            damage: 10,
            knockback: 1.0,
            explosive,
        }
    }

    #[test]
    fn test_bullet_hits_character_not_owner() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        add_player(&mut state, 1, PlayerKind::Human, Team::Free);
        let shooter = spawn(&mut state, 0, floor_pos(5));
        let target = spawn(&mut state, 1, floor_pos(10));
        let start = state.character(shooter).unwrap().pos;
        state.effects.spawn_projectile(bullet(0, start, Vec2::new(40.0, 0.0), false));

        for _ in 0..10 {
            step_projectiles(&mut state);
        }
        assert_eq!(state.character(shooter).unwrap().health, 100);
        assert_eq!(state.character(target).unwrap().health, 90);
        assert!(state.effects.projectiles.is_empty());
    }

    #[test]
    fn test_bullet_stops_at_wall() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        state
            .effects
            .spawn_projectile(bullet(0, Vec2::new(100.0, 100.0), Vec2::new(-40.0, 0.0), false));
        step_projectiles(&mut state);
        step_projectiles(&mut state);
        assert!(state.effects.projectiles.is_empty());
    }

    #[test]
    fn test_lifetime_expires() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let mut spawn = bullet(0, Vec2::new(300.0, 100.0), Vec2::new(0.1, 0.0), false);
        spawn.lifetime_ticks = 3;
        state.effects.spawn_projectile(spawn);
        for _ in 0..2 {
            step_projectiles(&mut state);
        }
        assert_eq!(state.effects.projectiles.len(), 1);
        step_projectiles(&mut state);
        assert!(state.effects.projectiles.is_empty());
    }

    #[test]
    fn test_explosion_falloff() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        add_player(&mut state, 1, PlayerKind::Human, Team::Free);
        add_player(&mut state, 2, PlayerKind::Human, Team::Free);
        let near = spawn(&mut state, 1, floor_pos(10));
        let far = spawn(&mut state, 2, floor_pos(30));
        let at = state.character(near).unwrap().pos + Vec2::new(20.0, 0.0);

        explode(&mut state, at, 0, 10, 10, 1.0);
        let near_ch = state.character(near).unwrap();
        assert_eq!(near_ch.health, 90, "inside the inner radius takes full damage");
        assert!(near_ch.recoil.x < 0.0, "pushed away from the blast");
        assert_eq!(state.character(far).unwrap().health, 100);
    }
}
