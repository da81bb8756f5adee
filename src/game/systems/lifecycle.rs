//! Character spawn and the per-character tick phases

use tracing::{debug, info};

use crate::game::constants::character::{BOT_MAX_HEALTH, HUMAN_MAX_HEALTH};
use crate::game::events::{EventSink, GameEvent, Sound};
use crate::game::input::CharacterInput;
use crate::game::spatial::GridEntry;
use crate::game::state::{Ability, Character, CharacterHandle, PlayerId, SimState};
use crate::game::systems::damage::{set_health, take_death_tile_damage};
use crate::game::systems::inventory::{auto_weapon_change, give_weapon, handle_weapon_switch, set_weapon};
use crate::game::systems::physics::{apply_intent, apply_recoil, integrate};
use crate::game::systems::weapons::{handle_weapons, throw_grenade};
use crate::game::world::WorldQuery;
use crate::util::vec2::Vec2;

fn equip(state: &mut SimState, ch: &mut Character, name: &str) {
    let catalog = state.catalog.clone();
    let Some(w) = catalog.id_of(name) else {
        debug!(weapon = name, "loadout weapon missing from catalog");
        return;
    };
    give_weapon(ch, &catalog, w, 1.0, &mut state.effects);
    set_weapon(ch, &catalog, w, &mut state.effects);
}

/// Create a character for `owner` at `pos`
///
/// Grants the baseline melee weapon, then the game mode's starting weapon,
/// then the bot loadout if the owner is a bot, then any saved weapons.
/// Returns `None` when the player slot is empty or already has a living
/// character.
pub fn spawn_character(state: &mut SimState, owner: PlayerId, pos: Vec2) -> Option<CharacterHandle> {
    let tick = state.tick;
    let hammer_fight = state.tunables.hammer_fight;
    let (is_bot, abilities) = match state.player(owner) {
        Some(p) if state.character_of(owner).is_none() => (p.is_bot(), p.abilities),
        Some(_) => {
            debug!(player = owner, "spawn ignored, character alive");
            return None;
        }
        None => {
            debug!(player = owner, "spawn ignored, empty slot");
            return None;
        }
    };

    let mut ch = Character::new(owner, pos, state.catalog.len(), is_bot, tick);
    ch.abilities = abilities;
    set_health(&mut ch, if is_bot { BOT_MAX_HEALTH } else { HUMAN_MAX_HEALTH });

    let baseline = state.catalog.baseline_melee();
    let baseline_name = state.catalog.get(baseline).map(|s| s.name.clone());
    if let Some(name) = baseline_name {
        equip(state, &mut ch, &name);
    }
    equip(state, &mut ch, if hammer_fight { "thunder_hammer" } else { "pistol" });

    let loadout = state
        .player_mut(owner)
        .and_then(|p| p.ai.as_mut())
        .map(|ai| ai.on_character_spawn(pos));
    if let Some(loadout) = loadout {
        for name in &loadout.weapons {
            equip(state, &mut ch, name);
        }
        set_health(&mut ch, loadout.health);
    }

    let saved = state
        .player(owner)
        .map(|p| p.saved_weapons.clone())
        .unwrap_or_default();
    let catalog = state.catalog.clone();
    for w in saved {
        give_weapon(&mut ch, &catalog, w, 1.0, &mut state.effects);
    }

    let radius = ch.radius;
    let h = state.characters.insert(ch);
    state.grid.insert(GridEntry {
        handle: h,
        position: pos,
        radius,
    });
    if let Some(player) = state.player_mut(owner) {
        player.character = Some(h);
        player.respawn_tick = None;
    }

    info!(player = owner, bot = is_bot, x = pos.x, y = pos.y, "spawn");
    state.effects.sound(Sound::Spawn, pos);
    state.effects.emit(GameEvent::Spawn { player: owner, pos });
    Some(h)
}

/// Replace the pending input. Edges are detected against the input of the
/// previous tick.
pub fn apply_input(state: &mut SimState, h: CharacterHandle, input: CharacterInput) {
    match state.characters.get_mut(h) {
        Some(ch) if ch.alive => ch.input = input,
        _ => debug!(?h, "input for missing character ignored"),
    }
}

/// Any of the four probe points at a third of the radius touches hazard terrain
fn touches_death_tile(world: &dyn WorldQuery, pos: Vec2, radius: f32) -> bool {
    let r = radius / 3.0;
    [
        Vec2::new(pos.x - r, pos.y - r),
        Vec2::new(pos.x + r, pos.y - r),
        Vec2::new(pos.x - r, pos.y + r),
        Vec2::new(pos.x + r, pos.y + r),
    ]
    .into_iter()
    .any(|p| world.is_death_at(p))
}

/// Input-driven phase: intent, hazards, weapon switch and fire
pub fn tick_character(state: &mut SimState, h: CharacterHandle) {
    let world = state.world.clone();
    let catalog = state.catalog.clone();

    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive {
        return;
    }

    let anti_impact = ch.abilities.contains(Ability::AntiImpactArmor);
    apply_recoil(ch, anti_impact);
    apply_intent(world.as_ref(), ch);
    if ch.grounded {
        ch.melee_ready = true;
    }
    if ch.pain_sound_timer > 0 {
        ch.pain_sound_timer -= 1;
    }
    if ch.death_tile_timer > 0 {
        ch.death_tile_timer -= 1;
    }

    if touches_death_tile(world.as_ref(), ch.pos, ch.radius) {
        take_death_tile_damage(state, h);
    }

    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive {
        return;
    }
    handle_weapon_switch(ch, &catalog, &mut state.effects);
    if ch.is_bot {
        auto_weapon_change(ch, &catalog, &mut state.rng);
    }

    handle_weapons(state, h);
    throw_grenade(state, h);

    if let Some(ch) = state.characters.get_mut(h) {
        ch.prev_input = ch.input;
    }
}

/// Deferred phase: resolve the move against the world
pub fn tick_deferred(state: &mut SimState, h: CharacterHandle) {
    let world = state.world.clone();
    let Some(ch) = state.characters.get_mut(h) else {
        return;
    };
    if !ch.alive {
        return;
    }

    let old = ch.pos;
    integrate(world.as_ref(), ch);
    if !ch.pos.is_finite() || !ch.vel.is_finite() {
        debug!(player = ch.owner, "non-finite motion, reverting");
        ch.pos = old;
        ch.vel = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::ai::{AiController, Archetype};
    use crate::game::state::test_support::*;
    use crate::game::state::{PlayerKind, Team};

    #[test]
    fn test_human_spawn_loadout() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let h = spawn_character(&mut state, 0, floor_pos(5)).unwrap();

        let ch = state.character(h).unwrap();
        let pistol = state.catalog.id_of("pistol").unwrap();
        assert_eq!(ch.health, HUMAN_MAX_HEALTH);
        assert!(ch.weapons[state.catalog.baseline_melee()].got);
        assert!(ch.weapons[pistol].got);
        assert_eq!(ch.active_weapon, pistol);
        assert!(!ch.melee_ready);
        assert_eq!(state.player(0).unwrap().character, Some(h));
        assert!(state.effects.events.contains(&GameEvent::Spawn { player: 0, pos: floor_pos(5) }));
    }

    #[test]
    fn test_hammer_fight_loadout() {
        let mut state = test_state();
        state.tunables.hammer_fight = true;
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let h = spawn_character(&mut state, 0, floor_pos(5)).unwrap();
        let thunder = state.catalog.id_of("thunder_hammer").unwrap();
        let ch = state.character(h).unwrap();
        assert_eq!(ch.active_weapon, thunder);
        assert!(ch.weapons[0].disabled, "thunder hammer supersedes the hammer");
    }

    #[test]
    fn test_bot_spawn_uses_archetype() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Bot, Team::Free);
        state.player_mut(0).unwrap().ai = Some(AiController::new(0, Archetype::Grenadier, 11, 1));
        let h = spawn_character(&mut state, 0, floor_pos(5)).unwrap();
        let ch = state.character(h).unwrap();
        assert_eq!(ch.health, 100);
        assert_eq!(ch.active_weapon, state.catalog.id_of("grenade_launcher").unwrap());
        assert!(ch.is_bot);
    }

    #[test]
    fn test_double_spawn_ignored() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        assert!(spawn_character(&mut state, 0, floor_pos(5)).is_some());
        assert!(spawn_character(&mut state, 0, floor_pos(6)).is_none());
        assert!(spawn_character(&mut state, 9, floor_pos(6)).is_none());
        assert_eq!(state.characters.len(), 1);
    }

    #[test]
    fn test_spawn_restores_saved_weapons() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let shotgun = state.catalog.id_of("shotgun").unwrap();
        state.player_mut(0).unwrap().saved_weapons.push(shotgun);

        let h = spawn_character(&mut state, 0, floor_pos(5)).unwrap();
        let ch = state.character(h).unwrap();
        assert!(ch.weapons[shotgun].got, "saved weapon granted on spawn");
        assert_ne!(ch.active_weapon, shotgun, "starting weapon stays active");
    }

    #[test]
    fn test_falling_character_lands() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let h = spawn_character(&mut state, 0, Vec2::new(200.0, 100.0)).unwrap();
        for _ in 0..100 {
            tick_character(&mut state, h);
            tick_deferred(&mut state, h);
        }
        let ch = state.character(h).unwrap();
        assert!(ch.grounded);
        assert!(ch.melee_ready);
        assert!((ch.pos.y - floor_pos(0).y).abs() < 2.0, "rests on the floor, y = {}", ch.pos.y);
    }

    #[test]
    fn test_death_tiles_hurt() {
        let map = "
##########
#........#
#.S......#
#..^^^^..#
##########
";
        let mut state = test_state_with_map(map);
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        // Inside the hazard strip
        let h = spawn_character(&mut state, 0, Vec2::new(5.0 * 32.0, 3.5 * 32.0)).unwrap();
        tick_character(&mut state, h);
        let ch = state.character(h).unwrap();
        assert_eq!(ch.health, HUMAN_MAX_HEALTH - 10);
        assert!(ch.death_tile_timer > 0);

        // Standing on the strip keeps hurting every tick
        for _ in 0..9 {
            tick_character(&mut state, h);
        }
        assert_eq!(
            state.character(h).unwrap().health,
            HUMAN_MAX_HEALTH - 100,
            "10 damage per contact tick"
        );

        state.tunables.insta_death_tiles = true;
        state.character_mut(h).unwrap().death_tile_timer = 0;
        tick_character(&mut state, h);
        assert!(!state.character(h).unwrap().alive);
    }

    #[test]
    fn test_edges_use_previous_tick_input() {
        let mut state = test_state();
        add_player(&mut state, 0, PlayerKind::Human, Team::Free);
        let h = spawn_character(&mut state, 0, floor_pos(5)).unwrap();
        let input = CharacterInput {
            fire: true,
            target: Vec2::new(1.0, 0.0),
            ..Default::default()
        };
        let pistol = state.catalog.id_of("pistol").unwrap();

        apply_input(&mut state, h, input);
        tick_character(&mut state, h);
        assert_eq!(state.character(h).unwrap().weapons[pistol].ammo, 9);

        // Still held: no new edge even after the fire delay runs out
        for _ in 0..20 {
            apply_input(&mut state, h, input);
            tick_character(&mut state, h);
        }
        assert_eq!(state.character(h).unwrap().weapons[pistol].ammo, 9);
    }
}
