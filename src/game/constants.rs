/// Simulation timing and character physics. Velocities are in world units per tick.
pub mod physics {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 50;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Downward acceleration per tick
    pub const GRAVITY: f32 = 0.5;
    /// Horizontal speed cap while grounded
    pub const GROUND_CONTROL_SPEED: f32 = 10.0;
    pub const GROUND_CONTROL_ACCEL: f32 = 2.0;
    /// Horizontal velocity multiplier when grounded with no move input
    pub const GROUND_FRICTION: f32 = 0.5;
    pub const GROUND_JUMP_IMPULSE: f32 = 13.2;
    pub const AIR_JUMP_IMPULSE: f32 = 12.0;
    pub const AIR_CONTROL_SPEED: f32 = 5.0;
    pub const AIR_CONTROL_ACCEL: f32 = 1.5;
    pub const AIR_FRICTION: f32 = 0.95;
    /// Maximum reach of the grappling hook
    pub const HOOK_LENGTH: f32 = 380.0;
    pub const HOOK_DRAG_ACCEL: f32 = 3.0;
    pub const HOOK_DRAG_SPEED: f32 = 15.0;
    /// Hook stops pulling inside this distance
    pub const HOOK_SLACK: f32 = 46.0;
    /// Hard velocity cap
    pub const MAX_VELOCITY: f32 = 60.0;
    /// Fraction of the recoil accumulator fed into velocity each tick
    pub const RECOIL_FEED: f32 = 0.7;
    /// Recoil feed with impact armor
    pub const RECOIL_FEED_ARMORED: f32 = 0.42;
    /// Recoil accumulator multiplier per tick
    pub const RECOIL_DECAY: f32 = 0.5;
}

/// Character entity constants
pub mod character {
    /// Collision half-size
    pub const PROXIMITY_RADIUS: f32 = 14.0;
    pub const HUMAN_MAX_HEALTH: i32 = 500;
    pub const BOT_MAX_HEALTH: i32 = 100;
    /// Hidden health before any loadout applies
    pub const DEFAULT_HEALTH: i32 = 100;
    pub const START_GRENADES: i32 = 2;
    /// Maximum entries in a melee swing's hit list
    pub const HIT_LIST_CAP: usize = 10;
    /// Minimum interval between clicks on an empty weapon
    pub const NO_AMMO_LOCKOUT_MS: i32 = 125;
    /// Pain sound cooldown in ticks
    pub const PAIN_SOUND_INTERVAL: i32 = 2;
    pub const PAIN_EMOTE_MS: i32 = 500;
    pub const HAPPY_EMOTE_MS: i32 = 1000;
    /// Fraction of dealt damage returned to the attacker with lifesteal
    pub const LIFESTEAL_RATIO: f32 = 0.33;
    /// Hazard tile damage per touching tick
    pub const DEATH_TILE_DAMAGE: i32 = 10;
    /// Velocity applied away from solid sides on hazard contact
    pub const DEATH_TILE_PUSH: f32 = 5.0;
    /// Probe distance for solid sides around a hazard contact
    pub const DEATH_TILE_PROBE: f32 = 32.0;
    /// Countdown restarted on every hazard contact tick
    pub const DEATH_TILE_CONTACT_TICKS: i32 = 10;
    /// Stun applied to bots hit by an electric weapon
    pub const ELECTRO_STUN_TICKS: i32 = 10;
    /// Weapon cycle press counters wrap at this value
    pub const WEAPON_PRESS_MASK: u8 = 0x7f;
    /// No-ammo sound at most once per this many ms
    pub const NO_AMMO_SOUND_MS: i32 = 1000;
    /// Reload sound cadence for human clip reloads
    pub const RELOAD_SOUND_INTERVAL: i32 = 10;
}

/// Weapon behavior constants shared by all catalog entries
pub mod weapon {
    /// Ability multiplier applied to reload and reach values
    pub const ABILITY_SPEEDUP: f32 = 1.33;
    /// Dash speed for sword-type melee
    pub const DASH_VELOCITY: f32 = 50.0;
    /// Base dash duration; scaled by the catalog life value
    pub const DASH_MOVETIME_MS: f32 = 200.0;
    /// Flying melee moves at this fraction of dash speed
    pub const FLYING_SPEED_FACTOR: f32 = 0.3;
    /// Aim weight blended into the flying melee heading each tick
    pub const FLYING_STEER: f32 = 1.0 / 6.0;
    /// Wall probe ahead of a flying melee swing
    pub const FLYING_WALL_PROBE: f32 = 20.0;
    pub const FLYING_WALL_BOX: f32 = 16.0;
    pub const MELEE_DAMAGE_BONUS: i32 = 2;
    /// Muzzle offset as a fraction of the proximity radius
    pub const MUZZLE_OFFSET: f32 = 0.75;
    pub const BULLET_SPEED: f32 = 44.0;
    pub const BULLET_GRAVITY: f32 = 0.05;
    pub const PELLET_SPEED: f32 = 55.0;
    pub const PELLET_GRAVITY: f32 = 0.1;
    /// Edge pellets travel at this fraction of center speed
    pub const PELLET_SPEED_DIFF: f32 = 0.8;
    /// Angular offsets for odd pellet counts: center plus pairs
    pub const PELLET_SPREAD_ODD: [f32; 2] = [0.070, 0.185];
    /// Angular offsets for even pellet counts: pairs only
    pub const PELLET_SPREAD_EVEN: [f32; 3] = [0.050, 0.130, 0.185];
    pub const GRENADE_SPEED: f32 = 20.0;
    pub const GRENADE_GRAVITY: f32 = 0.35;
    pub const EXPLOSION_RADIUS: f32 = 135.0;
    /// Full-strength inner explosion radius
    pub const EXPLOSION_INNER_RADIUS: f32 = 48.0;
    pub const EXPLOSION_FORCE: f32 = 6.0;
    /// Projectile collision radius against characters
    pub const PROJECTILE_RADIUS: f32 = 6.0;
    pub const BEAM_OFFSET_GUN: f32 = 30.0;
    pub const BEAM_OFFSET_RIFLE: f32 = 50.0;
    /// Beam tolerance added to the target's proximity radius
    pub const BEAM_HIT_RADIUS: f32 = 70.0;
    pub const CHAIN_SEGMENT_LENGTH: f32 = 50.0;
    pub const CHAIN_SEGMENTS: usize = 4;
    pub const CHAIN_HIT_RADIUS: f32 = 20.0;
    /// Random heading change per chain segment
    pub const CHAIN_JITTER: f32 = 0.5;
    /// Electric flying melee arc reach and damage
    pub const FLYING_ARC_REACH: f32 = 140.0;
    pub const FLYING_ARC_RADIUS: f32 = 100.0;
    pub const FLYING_ARC_DAMAGE: i32 = 4;
}

/// AI controller constants
pub mod ai {
    /// Maximum distance at which a bot can see an enemy
    pub const SIGHT_RANGE: f32 = 900.0;
    /// Maximum distance for target search without line of sight
    pub const SEEK_RANGE: f32 = 2400.0;
    /// Bots back off when this much deeper than needed inside weapon range
    pub const STANDOFF_MARGIN: f32 = 200.0;
    /// Bots stop moving within this distance (per axis) of their target
    pub const STAND_STILL_RADIUS: f32 = 40.0;
    /// Decision ticks to wait after first sighting before moving
    pub const MOVE_REACT_TICKS: i32 = 9;
    /// Reaction delay lower bound in ticks
    pub const REACTION_MIN: i32 = 1;
    /// Reaction delay is REACTION_MIN + rand(0..REACTION_SPREAD)
    pub const REACTION_SPREAD: i32 = 3;
    /// Ticks without progress before the unstuck maneuver fires
    pub const STUCK_WINDOW: u32 = 20;
    /// Movement below this distance counts as no progress
    pub const STUCK_DISTANCE: f32 = 4.0;
    /// Ticks the unstuck hook is held
    pub const UNSTUCK_HOLD: i32 = 10;
    pub const ANGER_DECAY: f32 = 0.99;
    pub const ATTACHMENT_DECAY: f32 = 0.995;
    pub const ATTACHMENT_GAIN: f32 = 0.05;
    /// Target score weights (lower score wins)
    pub const ANGER_WEIGHT: f32 = 4.0;
    pub const ATTACHMENT_WEIGHT: f32 = 20.0;
    /// Latch chance per damage point from a player hit
    pub const TRIGGER_CHANCE_PER_DAMAGE: f32 = 0.02;
    /// Shock chance per damage point
    pub const SHOCK_CHANCE_PER_DAMAGE: f32 = 0.03;
    pub const SPAWN_SHOCK_TICKS: i32 = 10;
    /// Reaction delay after spawning unless already latched
    pub const SPAWN_REACTION_TICKS: i32 = 100;
    /// Fire duration after a hit for bots that attack on damage
    pub const ATTACK_ON_DAMAGE_TICKS: i32 = super::physics::TICK_RATE as i32;
    /// Bots below this power level release fire when hit
    pub const STEADY_POWER_LEVEL: i32 = 10;
    /// Horizontal dead zone when steering to a waypoint
    pub const STEER_DEAD_ZONE: f32 = 8.0;
    /// A waypoint this far above triggers a jump
    pub const JUMP_TRIGGER_HEIGHT: f32 = 40.0;
    /// Enemy this far above triggers a jump
    pub const ENEMY_ABOVE_HEIGHT: f32 = 60.0;
    /// Max aim error in radians at power level 0
    pub const AIM_NOISE: f32 = 0.25;
    /// Aim target length written to synthetic input
    pub const AIM_LENGTH: f32 = 100.0;
    pub const STATIC_FIRE_CHANCE: f64 = 0.5;
}

/// Waypoint navigation constants
pub mod nav {
    pub const TILE_SIZE: f32 = 32.0;
    /// Longest edge considered during graph build
    pub const MAX_EDGE_LENGTH: f32 = 6.0 * TILE_SIZE;
    /// Highest climb an edge may require
    pub const MAX_CLIMB: f32 = 5.0 * TILE_SIZE;
    /// Cost multiplier applied to the upward part of an edge
    pub const CLIMB_COST_FACTOR: f32 = 1.5;
    /// Destination drift that invalidates a cached path
    pub const REPLAN_THRESHOLD: f32 = 64.0;
    /// Minimum ticks between path recomputes
    pub const REPLAN_COOLDOWN: u64 = 25;
    /// Age at which a cached path is recomputed even for a fixed destination
    pub const REPLAN_INTERVAL: u64 = 100;
    /// Distance at which a waypoint counts as reached
    pub const WAYPOINT_REACHED: f32 = 24.0;
}

/// Player slot limits
pub mod players {
    pub const MAX_PLAYERS: usize = 64;
    /// Default respawn delay after death
    pub const RESPAWN_DELAY_TICKS: u64 = 4 * super::physics::TICK_RATE as u64;
}

/// Convert a millisecond duration to whole ticks
#[inline]
pub fn ms_to_ticks(ms: i32) -> i32 {
    let ticks = ms as i64 * physics::TICK_RATE as i64 / 1000;
    ticks.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Convert seconds to whole ticks
#[inline]
pub fn secs_to_ticks(secs: f32) -> i32 {
    (secs * physics::TICK_RATE as f32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_ticks() {
        assert_eq!(ms_to_ticks(1000), 50);
        assert_eq!(ms_to_ticks(125), 6);
        assert_eq!(ms_to_ticks(2000), 100);
        assert_eq!(ms_to_ticks(0), 0);
        assert_eq!(ms_to_ticks(i32::MAX), i32::MAX / 20, "no overflow on huge durations");
    }

    #[test]
    fn test_secs_to_ticks() {
        assert_eq!(secs_to_ticks(1.0), 50);
        assert_eq!(secs_to_ticks(0.5), 25);
    }

    #[test]
    fn test_recoil_feed_ordering() {
        assert!(physics::RECOIL_FEED_ARMORED < physics::RECOIL_FEED);
        assert!(physics::RECOIL_DECAY > 0.0 && physics::RECOIL_DECAY < 1.0);
    }

    #[test]
    fn test_reaction_floor_is_at_least_one_tick() {
        assert!(ai::REACTION_MIN >= 1, "reaction delay must never drop below 1 tick");
        assert!(ai::REACTION_SPREAD >= 1);
    }

    #[test]
    fn test_decay_factors_shrink() {
        assert!(ai::ANGER_DECAY < 1.0);
        assert!(ai::ATTACHMENT_DECAY < 1.0);
    }

    #[test]
    fn test_pellet_tables_are_ascending() {
        for table in [&PELLET_ODD[..], &PELLET_EVEN[..]] {
            for pair in table.windows(2) {
                assert!(pair[0] < pair[1], "pellet offsets must grow outward: {:?}", table);
            }
        }
    }

    const PELLET_ODD: [f32; 2] = weapon::PELLET_SPREAD_ODD;
    const PELLET_EVEN: [f32; 3] = weapon::PELLET_SPREAD_EVEN;

    #[test]
    fn test_climb_fits_in_edge() {
        assert!(nav::MAX_CLIMB <= nav::MAX_EDGE_LENGTH);
        assert!(nav::WAYPOINT_REACHED < nav::REPLAN_THRESHOLD);
    }
}
