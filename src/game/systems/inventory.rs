//! Weapon inventory: acquisition, ammo pickups and switching
//!
//! Every weapon index coming from outside is bounds-checked against the
//! catalog; invalid or unusable slots turn the call into a no-op.

use rand::Rng;
use tracing::debug;

use crate::game::catalog::{WeaponCatalog, WeaponId, WeaponSpec};
use crate::game::constants::character::WEAPON_PRESS_MASK;
use crate::game::constants::weapon::ABILITY_SPEEDUP;
use crate::game::events::{EventSink, Sound};
use crate::game::state::{Ability, AbilitySet, Character};

/// Clip reload duration in ticks for `spec`, shortened by `FastReload`
pub fn clip_reload_ticks(spec: &WeaponSpec, abilities: AbilitySet) -> i32 {
    let ticks = spec.clip_reload_ticks();
    if abilities.contains(Ability::FastReload) {
        (ticks as f32 / ABILITY_SPEEDUP) as i32
    } else {
        ticks
    }
}

/// Grant `weapon`. Returns false if out of range, already owned or superseded.
///
/// If the predecessor is owned its whole pool (loaded + reserved) moves into
/// the new slot's reserve, capped at the new maximum, and the new clip starts
/// empty so the first clip reload fills it. A predecessor that was active is
/// replaced right away when the switch timer allows it.
pub fn give_weapon(
    ch: &mut Character,
    catalog: &WeaponCatalog,
    weapon: WeaponId,
    fill: f32,
    sink: &mut impl EventSink,
) -> bool {
    let Some(spec) = catalog.get(weapon) else {
        debug!(weapon, "give_weapon: weapon index out of range");
        return false;
    };
    let Some(slot) = ch.slot(weapon).copied() else {
        return false;
    };
    if slot.got || slot.disabled {
        return false;
    }

    let mut new_slot = slot;
    new_slot.got = true;
    new_slot.ready = true;
    new_slot.ammo = spec.clip_size;
    new_slot.reserved = ((spec.max_ammo as f32 * fill.clamp(0.0, 1.0)) as i32).min(spec.max_ammo);

    let mut replace_active = false;
    if let Some(pred) = catalog.predecessor(weapon) {
        if let Some(pred_slot) = ch.slot_mut(pred) {
            if pred_slot.got && spec.max_ammo > 0 {
                new_slot.ammo = 0;
                new_slot.reserved = (pred_slot.ammo + pred_slot.reserved).min(spec.max_ammo);
            }
            pred_slot.disabled = true;
            pred_slot.ammo = 0;
            pred_slot.reserved = 0;
            replace_active = ch.active_weapon == pred;
        }
    }
    ch.weapons[weapon] = new_slot;

    if replace_active {
        ch.queued_weapon = Some(weapon);
        do_weapon_switch(ch, catalog, sink);
    }
    true
}

/// Make `weapon` active immediately
pub fn set_weapon(ch: &mut Character, catalog: &WeaponCatalog, weapon: WeaponId, sink: &mut impl EventSink) {
    if weapon == ch.active_weapon {
        return;
    }
    let (Some(spec), Some(slot)) = (catalog.get(weapon), ch.slot(weapon).copied()) else {
        debug!(weapon, "set_weapon: weapon index out of range");
        return;
    };
    if !slot.usable() {
        return;
    }

    ch.last_weapon = ch.active_weapon;
    ch.queued_weapon = None;
    ch.active_weapon = weapon;
    ch.category_choice[spec.category.index()] = Some(weapon);
    sink.sound(Sound::WeaponSwitch, ch.pos);

    let can_reload = slot.reserved > 0 || spec.max_ammo == 0;
    ch.clip_reload_timer = if slot.ammo <= 0 && can_reload && spec.clip_size > 0 {
        clip_reload_ticks(spec, ch.abilities)
    } else {
        0
    };
    show_armor(ch, catalog);
}

/// Apply the queued switch once the fire delay has run out
pub fn do_weapon_switch(ch: &mut Character, catalog: &WeaponCatalog, sink: &mut impl EventSink) {
    if ch.reload_timer > 0 {
        return;
    }
    let Some(queued) = ch.queued_weapon.take() else {
        return;
    };
    set_weapon(ch, catalog, queued, sink);
}

fn next_usable(ch: &Character, from: WeaponId, forward: bool) -> WeaponId {
    let n = ch.weapons.len();
    if n == 0 {
        return from;
    }
    let mut w = from;
    for _ in 0..n {
        w = if forward { (w + 1) % n } else { (w + n - 1) % n };
        if ch.weapons[w].usable() {
            return w;
        }
    }
    from
}

/// Resolve next/prev press counters and direct category selection into a
/// queued switch
pub fn handle_weapon_switch(ch: &mut Character, catalog: &WeaponCatalog, sink: &mut impl EventSink) {
    let mut wanted = ch.queued_weapon.unwrap_or(ch.active_weapon);

    let next = ch.input.next_weapon.wrapping_sub(ch.prev_input.next_weapon) & WEAPON_PRESS_MASK;
    let prev = ch.input.prev_weapon.wrapping_sub(ch.prev_input.prev_weapon) & WEAPON_PRESS_MASK;
    for _ in 0..next {
        wanted = next_usable(ch, wanted, true);
    }
    for _ in 0..prev {
        wanted = next_usable(ch, wanted, false);
    }

    if let Some(category) = ch.input.wanted_weapon {
        let current = catalog.get(wanted).map(|s| s.category);
        if current != Some(category) {
            let remembered = ch.category_choice[category.index()]
                .filter(|w| ch.slot(*w).is_some_and(|s| s.usable()));
            let any = catalog
                .iter()
                .find(|(id, s)| s.category == category && ch.slot(*id).is_some_and(|sl| sl.usable()))
                .map(|(id, _)| id);
            if let Some(w) = remembered.or(any) {
                wanted = w;
            }
        }
    }

    if wanted != ch.active_weapon && ch.slot(wanted).is_some_and(|s| s.usable()) {
        ch.queued_weapon = Some(wanted);
    }
    do_weapon_switch(ch, catalog, sink);
}

/// Add reserved ammo, redirecting to the successor if `weapon` was superseded
pub fn give_ammo(ch: &mut Character, catalog: &WeaponCatalog, weapon: WeaponId, fill: f32) -> bool {
    let mut target = weapon;
    let mut hops = 0;
    while ch.slot(target).is_some_and(|s| s.disabled) {
        match catalog.successor(target) {
            Some(next) if hops < catalog.len() => {
                target = next;
                hops += 1;
            }
            _ => return false,
        }
    }
    let Some(spec) = catalog.get(target) else {
        debug!(weapon, "give_ammo: weapon index out of range");
        return false;
    };
    let Some(slot) = ch.slot_mut(target) else {
        return false;
    };
    if !slot.got || spec.max_ammo == 0 || slot.reserved >= spec.max_ammo {
        return false;
    }
    let amount = ((spec.max_ammo as f32 * fill) as i32).max(1);
    slot.reserved = (slot.reserved + amount).min(spec.max_ammo);
    show_armor(ch, catalog);
    true
}

/// Add one clip worth of reserve
pub fn add_clip(ch: &mut Character, catalog: &WeaponCatalog, weapon: WeaponId) -> bool {
    let Some(spec) = catalog.get(weapon) else {
        return false;
    };
    let Some(slot) = ch.slot_mut(weapon) else {
        return false;
    };
    if !slot.usable() || spec.max_ammo == 0 || slot.reserved >= spec.max_ammo {
        return false;
    }
    slot.reserved = (slot.reserved + spec.clip_size.max(1)).min(spec.max_ammo);
    show_armor(ch, catalog);
    true
}

/// Armor pickup: tops up the active weapon's reserve
pub fn increase_armor(ch: &mut Character, catalog: &WeaponCatalog, amount: i32) -> bool {
    let active = ch.active_weapon;
    let Some(spec) = catalog.get(active) else {
        return false;
    };
    let Some(slot) = ch.slot_mut(active) else {
        return false;
    };
    if spec.max_ammo == 0 || slot.reserved >= spec.max_ammo {
        return false;
    }
    slot.reserved = (slot.reserved + amount.max(0)).min(spec.max_ammo);
    show_armor(ch, catalog);
    true
}

/// Refresh the reserve display value for the active weapon
pub fn show_armor(ch: &mut Character, catalog: &WeaponCatalog) {
    let (Some(spec), Some(slot)) = (catalog.get(ch.active_weapon), ch.active_slot()) else {
        ch.armor = 0;
        return;
    };
    ch.armor = if spec.has_ammo_system() {
        let scaled = slot.reserved * 10 / spec.max_ammo;
        if slot.reserved > 0 {
            scaled.max(1)
        } else {
            0
        }
    } else {
        0
    };
}

/// Bots with an empty weapon pick another owned weapon that can still fire
pub fn auto_weapon_change(ch: &mut Character, catalog: &WeaponCatalog, rng: &mut impl Rng) {
    let (Some(spec), Some(slot)) = (catalog.get(ch.active_weapon), ch.active_slot()) else {
        return;
    };
    if spec.clip_size == 0 || slot.ammo > 0 || slot.reserved > 0 || spec.max_ammo == 0 {
        return;
    }

    let candidates: Vec<WeaponId> = catalog
        .iter()
        .filter(|(id, s)| {
            *id != ch.active_weapon
                && ch.slot(*id).is_some_and(|sl| {
                    sl.usable() && (s.clip_size == 0 || s.max_ammo == 0 || sl.ammo > 0 || sl.reserved > 0)
                })
        })
        .map(|(id, _)| id)
        .collect();
    if candidates.is_empty() {
        return;
    }
    ch.queued_weapon = Some(candidates[rng.gen_range(0..candidates.len())]);
}
