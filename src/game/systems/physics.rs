//! Character core physics
//!
//! Split in two like the tick itself: `apply_intent` turns input into
//! velocity during the character tick, `integrate` resolves the move against
//! the world in the deferred pass once every character has applied intent.

use crate::game::constants::physics::{
    AIR_CONTROL_ACCEL, AIR_CONTROL_SPEED, AIR_FRICTION, AIR_JUMP_IMPULSE, GRAVITY,
    GROUND_CONTROL_ACCEL, GROUND_CONTROL_SPEED, GROUND_FRICTION, GROUND_JUMP_IMPULSE,
    HOOK_DRAG_ACCEL, HOOK_DRAG_SPEED, HOOK_LENGTH, HOOK_SLACK, MAX_VELOCITY, RECOIL_DECAY,
    RECOIL_FEED, RECOIL_FEED_ARMORED,
};
use crate::game::state::Character;
use crate::game::world::WorldQuery;
use crate::util::vec2::Vec2;

const JUMP_HELD: u8 = 1;
const AIR_JUMP_USED: u8 = 2;

/// Ground probe below both bottom corners of the body
pub fn is_grounded(world: &dyn WorldQuery, pos: Vec2, radius: f32) -> bool {
    let y = pos.y + radius + 5.0;
    world.is_solid_at(Vec2::new(pos.x + radius, y)) || world.is_solid_at(Vec2::new(pos.x - radius, y))
}

/// Move `value` toward `limit` by `step` without overshooting, never pushing
/// an already faster value further out
#[inline]
fn saturated_add(min: f32, max: f32, value: f32, step: f32) -> f32 {
    if step > 0.0 {
        if value > max {
            value
        } else {
            (value + step).min(max)
        }
    } else if value < min {
        value
    } else {
        (value + step).max(min)
    }
}

/// Feed accumulated knockback into velocity and decay it
pub fn apply_recoil(ch: &mut Character, anti_impact: bool) {
    let feed = if anti_impact {
        RECOIL_FEED_ARMORED
    } else {
        RECOIL_FEED
    };
    ch.vel += ch.recoil * feed;
    ch.recoil *= RECOIL_DECAY;
}

/// Gravity, walking, jumping and hook pull from the current input
pub fn apply_intent(world: &dyn WorldQuery, ch: &mut Character) {
    ch.grounded = is_grounded(world, ch.pos, ch.radius);
    ch.vel.y += GRAVITY;

    let (max_speed, accel, friction) = if ch.grounded {
        (GROUND_CONTROL_SPEED, GROUND_CONTROL_ACCEL, GROUND_FRICTION)
    } else {
        (AIR_CONTROL_SPEED, AIR_CONTROL_ACCEL, AIR_FRICTION)
    };

    match ch.input.direction {
        d if d < 0 => ch.vel.x = saturated_add(-max_speed, max_speed, ch.vel.x, -accel),
        d if d > 0 => ch.vel.x = saturated_add(-max_speed, max_speed, ch.vel.x, accel),
        _ => ch.vel.x *= friction,
    }

    if ch.input.jump {
        if ch.jumped & JUMP_HELD == 0 {
            if ch.grounded {
                ch.vel.y = -GROUND_JUMP_IMPULSE;
                ch.jumped |= JUMP_HELD;
            } else if ch.jumped & AIR_JUMP_USED == 0 {
                ch.vel.y = -AIR_JUMP_IMPULSE;
                ch.jumped |= JUMP_HELD | AIR_JUMP_USED;
            }
        }
    } else {
        ch.jumped &= !JUMP_HELD;
    }
    if ch.grounded {
        ch.jumped &= !AIR_JUMP_USED;
    }

    update_hook(world, ch);

    ch.vel = ch.vel.clamp_length(MAX_VELOCITY);
}

fn update_hook(world: &dyn WorldQuery, ch: &mut Character) {
    if !ch.input.hook {
        ch.hook_anchor = None;
        return;
    }

    if ch.hook_anchor.is_none() {
        let reach = ch.pos + ch.aim_direction() * HOOK_LENGTH;
        ch.hook_anchor = world.intersect_line(ch.pos, reach).map(|hit| hit.point);
    }

    let Some(anchor) = ch.hook_anchor else {
        return;
    };
    if anchor.distance_to(ch.pos) <= HOOK_SLACK {
        return;
    }

    let pulled = ch.vel + (anchor - ch.pos).normalize() * HOOK_DRAG_ACCEL;
    // Only accelerate up to drag speed, but never slow down a faster swing
    if pulled.length() <= HOOK_DRAG_SPEED || pulled.length() < ch.vel.length() {
        ch.vel = pulled;
    }
}

/// Resolve the tick's motion against solid geometry
pub fn integrate(world: &dyn WorldQuery, ch: &mut Character) {
    let (pos, vel) = world.move_box(ch.pos, ch.vel, ch.radius * 2.0, 0.0);
    ch.pos = pos;
    ch.vel = vel;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::test_support::{floor_pos, FLAT_MAP};
    use crate::game::world::TileMap;

    fn map() -> TileMap {
        TileMap::from_ascii(FLAT_MAP).unwrap()
    }

    fn character_at(pos: Vec2) -> Character {
        Character::new(0, pos, 1, false, 0)
    }

    fn step(world: &TileMap, ch: &mut Character) {
        apply_intent(world, ch);
        integrate(world, ch);
    }

    #[test]
    fn test_falls_and_lands() {
        let world = map();
        let mut ch = character_at(Vec2::new(300.0, 100.0));
        for _ in 0..100 {
            step(&world, &mut ch);
        }
        assert!(is_grounded(&world, ch.pos, ch.radius));
        assert!(ch.pos.y + ch.radius <= 320.0, "sank into floor: {}", ch.pos.y);
    }

    #[test]
    fn test_walk_speed_capped() {
        let world = map();
        let mut ch = character_at(floor_pos(5));
        ch.input.direction = 1;
        for _ in 0..30 {
            step(&world, &mut ch);
        }
        assert!(ch.pos.x > floor_pos(5).x + 100.0);
        assert!(ch.vel.x <= GROUND_CONTROL_SPEED + 1e-4);
    }

    #[test]
    fn test_jump_is_edge_triggered_with_one_air_jump() {
        let world = map();
        let mut ch = character_at(floor_pos(10));
        ch.input.jump = true;
        step(&world, &mut ch);
        assert!(ch.vel.y < 0.0, "ground jump");
        let first = ch.pos.y;

        // Holding does not air jump
        for _ in 0..5 {
            step(&world, &mut ch);
        }
        assert_eq!(ch.jumped & AIR_JUMP_USED, 0);

        ch.input.jump = false;
        step(&world, &mut ch);
        ch.input.jump = true;
        step(&world, &mut ch);
        assert_ne!(ch.jumped & AIR_JUMP_USED, 0, "air jump consumed");
        assert!(ch.pos.y < first);
    }

    #[test]
    fn test_recoil_decays_by_half() {
        let mut ch = character_at(Vec2::ZERO);
        ch.recoil = Vec2::new(10.0, 0.0);
        apply_recoil(&mut ch, false);
        assert!((ch.vel.x - 7.0).abs() < 1e-5);
        assert!((ch.recoil.x - 5.0).abs() < 1e-5);

        let mut armored = character_at(Vec2::ZERO);
        armored.recoil = Vec2::new(10.0, 0.0);
        apply_recoil(&mut armored, true);
        assert!((armored.vel.x - 4.2).abs() < 1e-5);
    }

    #[test]
    fn test_hook_pulls_toward_wall() {
        let world = map();
        let mut ch = character_at(floor_pos(10));
        ch.input.hook = true;
        ch.input.target = Vec2::new(-1.0, 0.0);
        apply_intent(&world, &mut ch);
        let anchor = ch.hook_anchor.expect("left wall within hook length");
        assert!(anchor.x < 32.5);
        assert!(ch.vel.x < 0.0);
    }
}
