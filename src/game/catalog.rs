//! Immutable weapon catalog
//!
//! One entry per weapon variant. Entries may name a predecessor ("requires")
//! forming upgrade chains; the chain is validated to be acyclic once at load
//! time and the catalog is then shared read-only as `Arc<WeaponCatalog>`.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::ms_to_ticks;
use crate::game::constants::weapon::{PELLET_SPEED_DIFF, PELLET_SPREAD_EVEN, PELLET_SPREAD_ODD};
use crate::util::vec2::mix;

/// Index into the catalog
pub type WeaponId = usize;

/// Parent weapon category (used for direct selection and display)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponCategory {
    Hammer,
    Gun,
    Shotgun,
    Grenade,
    Rifle,
    Ninja,
}

impl WeaponCategory {
    pub const COUNT: usize = 6;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// How a weapon delivers its effect when fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    /// Instant strike around the muzzle
    Melee,
    /// Body dash along the aim direction
    Dash,
    /// Steerable slow dash that stops on first contact
    FlyingMelee,
    Bullet,
    Pellet,
    Grenade,
    /// Hitscan line
    Beam,
    ChainArc,
    /// Area-denial construction at the aim target
    Build,
}

impl ProjectileKind {
    /// Dash kinds need a "grounded since last swing" readiness flag
    #[inline]
    pub fn is_dash(self) -> bool {
        matches!(self, ProjectileKind::Dash | ProjectileKind::FlyingMelee)
    }

    #[inline]
    pub fn is_melee(self) -> bool {
        matches!(
            self,
            ProjectileKind::Melee | ProjectileKind::Dash | ProjectileKind::FlyingMelee
        )
    }
}

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeaponSpec {
    pub name: String,
    pub category: WeaponCategory,
    pub kind: ProjectileKind,
    pub damage: i32,
    /// Loaded ammo capacity, 0 = no clip (never runs dry)
    #[serde(default)]
    pub clip_size: i32,
    /// Reserved ammo capacity, 0 = unlimited
    #[serde(default)]
    pub max_ammo: i32,
    /// Delay between shots
    pub reload_ms: i32,
    #[serde(default)]
    pub clip_reload_ms: i32,
    /// Random angular jitter in radians
    #[serde(default)]
    pub spread: f32,
    /// Pellet / beam count
    #[serde(default = "one")]
    pub shot_spread: i32,
    #[serde(default)]
    pub knockback: f32,
    #[serde(default)]
    pub self_knockback: f32,
    /// Projectile lifetime in seconds, beam reach in units, or dash length factor
    #[serde(default = "one_f")]
    pub life: f32,
    #[serde(default)]
    pub cost: i32,
    /// Name of the predecessor variant
    #[serde(default)]
    pub requires: Option<String>,
    #[serde(default)]
    pub full_auto: bool,
    #[serde(default)]
    pub electric: bool,
}

fn one() -> i32 {
    1
}

fn one_f() -> f32 {
    1.0
}

impl WeaponSpec {
    #[inline]
    pub fn reload_ticks(&self) -> i32 {
        ms_to_ticks(self.reload_ms)
    }

    #[inline]
    pub fn clip_reload_ticks(&self) -> i32 {
        ms_to_ticks(self.clip_reload_ms)
    }

    /// Weapons without a clip or reserve never track ammo
    #[inline]
    pub fn has_ammo_system(&self) -> bool {
        self.clip_size > 0 && self.max_ammo > 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog has no entries")]
    Empty,
    #[error("duplicate weapon name '{0}'")]
    DuplicateName(String),
    #[error("weapon '{weapon}' requires unknown weapon '{requires}'")]
    UnknownPredecessor { weapon: String, requires: String },
    #[error("weapon '{0}' is part of a predecessor cycle")]
    Cycle(String),
    #[error("weapon '{0}' has negative clip or ammo capacity")]
    InvalidCapacity(String),
    #[error("weapon '{0}' has a reload time outside 0..={max} ms", max = MAX_TIMING_MS)]
    InvalidTiming(String),
    #[error("weapons '{first}' and '{second}' both require '{predecessor}'")]
    DuplicateSuccessor {
        predecessor: String,
        first: String,
        second: String,
    },
    #[error("weapon '{0}' has no baseline melee variant")]
    MissingBaseline(String),
    #[error("catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("catalog read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validated, immutable weapon table
#[derive(Debug, Clone)]
pub struct WeaponCatalog {
    specs: Vec<WeaponSpec>,
    predecessor: Vec<Option<WeaponId>>,
    successor: Vec<Option<WeaponId>>,
    by_name: HashMap<String, WeaponId>,
}

/// Name of the melee weapon every character spawns with
pub const BASELINE_MELEE: &str = "hammer";

/// Longest accepted fire delay or clip reload
pub const MAX_TIMING_MS: i32 = 60_000;

impl WeaponCatalog {
    pub fn new(specs: Vec<WeaponSpec>) -> Result<Self, CatalogError> {
        if specs.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut by_name = HashMap::with_capacity(specs.len());
        for (id, spec) in specs.iter().enumerate() {
            if spec.clip_size < 0 || spec.max_ammo < 0 {
                return Err(CatalogError::InvalidCapacity(spec.name.clone()));
            }
            let timing = 0..=MAX_TIMING_MS;
            if !timing.contains(&spec.reload_ms) || !timing.contains(&spec.clip_reload_ms) {
                return Err(CatalogError::InvalidTiming(spec.name.clone()));
            }
            if by_name.insert(spec.name.clone(), id).is_some() {
                return Err(CatalogError::DuplicateName(spec.name.clone()));
            }
        }

        if !by_name.contains_key(BASELINE_MELEE) {
            return Err(CatalogError::MissingBaseline(BASELINE_MELEE.to_string()));
        }

        let mut predecessor = vec![None; specs.len()];
        let mut successor: Vec<Option<usize>> = vec![None; specs.len()];
        for (id, spec) in specs.iter().enumerate() {
            if let Some(req) = &spec.requires {
                let pred = *by_name.get(req).ok_or_else(|| CatalogError::UnknownPredecessor {
                    weapon: spec.name.clone(),
                    requires: req.clone(),
                })?;
                if let Some(other) = successor[pred] {
                    return Err(CatalogError::DuplicateSuccessor {
                        predecessor: req.clone(),
                        first: specs[other].name.clone(),
                        second: spec.name.clone(),
                    });
                }
                predecessor[id] = Some(pred);
                successor[pred] = Some(id);
            }
        }

        // Walking back from any entry must terminate within len steps
        for (id, spec) in specs.iter().enumerate() {
            let mut cursor = predecessor[id];
            let mut steps = 0;
            while let Some(p) = cursor {
                steps += 1;
                if p == id || steps > specs.len() {
                    return Err(CatalogError::Cycle(spec.name.clone()));
                }
                cursor = predecessor[p];
            }
        }

        Ok(Self {
            specs,
            predecessor,
            successor,
            by_name,
        })
    }

    /// Parse a JSON array of entries
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let specs: Vec<WeaponSpec> = serde_json::from_str(json)?;
        Self::new(specs)
    }

    pub fn from_file(path: &str) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Bounds-checked lookup
    #[inline]
    pub fn get(&self, id: WeaponId) -> Option<&WeaponSpec> {
        self.specs.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<WeaponId> {
        self.by_name.get(name).copied()
    }

    /// Id of the baseline melee weapon (validated at construction)
    pub fn baseline_melee(&self) -> WeaponId {
        self.by_name.get(BASELINE_MELEE).copied().unwrap_or(0)
    }

    #[inline]
    pub fn predecessor(&self, id: WeaponId) -> Option<WeaponId> {
        self.predecessor.get(id).copied().flatten()
    }

    #[inline]
    pub fn successor(&self, id: WeaponId) -> Option<WeaponId> {
        self.successor.get(id).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WeaponId, &WeaponSpec)> {
        self.specs.iter().enumerate()
    }

    /// Catalog built from [`default_specs`]
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::new(default_specs())
    }
}

/// Angular offset and speed factor for each pellet of a spread shot.
///
/// Odd counts fire a center pellet plus symmetric pairs, even counts fire
/// pairs only. `extra_pairs` widens the fan (capped by the offset table).
pub fn pellet_pattern(shot_spread: i32, extra_pairs: i32) -> SmallVec<[(f32, f32); 8]> {
    let mut out = SmallVec::new();
    let count = shot_spread.max(1);
    let odd = count % 2 == 1;
    let table: &[f32] = if odd { &PELLET_SPREAD_ODD } else { &PELLET_SPREAD_EVEN };
    let pairs = ((count / 2) + extra_pairs).clamp(0, table.len() as i32) as usize;

    let speed = |rank: usize| {
        if pairs == 0 {
            1.0
        } else {
            mix(PELLET_SPEED_DIFF, 1.0, 1.0 - rank as f32 / pairs as f32)
        }
    };

    if odd {
        out.push((0.0, 1.0));
    }
    for (i, offset) in table.iter().take(pairs).enumerate() {
        let rank = i + 1;
        out.push((-offset, speed(rank)));
        out.push((*offset, speed(rank)));
    }
    out
}

fn spec(name: &str, category: WeaponCategory, kind: ProjectileKind) -> WeaponSpec {
    WeaponSpec {
        name: name.to_string(),
        category,
        kind,
        damage: 1,
        clip_size: 0,
        max_ammo: 0,
        reload_ms: 250,
        clip_reload_ms: 0,
        spread: 0.0,
        shot_spread: 1,
        knockback: 0.0,
        self_knockback: 0.0,
        life: 1.0,
        cost: 0,
        requires: None,
        full_auto: false,
        electric: false,
    }
}

/// Built-in weapon table
pub fn default_specs() -> Vec<WeaponSpec> {
    use ProjectileKind as K;
    use WeaponCategory as C;

    vec![
        WeaponSpec { damage: 3, reload_ms: 320, knockback: 1.0, ..spec("hammer", C::Hammer, K::Melee) },
        WeaponSpec {
            damage: 8,
            reload_ms: 600,
            life: 1.5,
            cost: 40,
            electric: true,
            requires: Some("hammer".into()),
            ..spec("thunder_hammer", C::Hammer, K::FlyingMelee)
        },
        WeaponSpec { damage: 0, reload_ms: 400, cost: 15, ..spec("build_tool", C::Hammer, K::Build) },
        WeaponSpec { damage: 9, reload_ms: 800, cost: 30, ..spec("sword", C::Ninja, K::Dash) },
        WeaponSpec {
            damage: 2,
            clip_size: 10,
            max_ammo: 60,
            reload_ms: 125,
            clip_reload_ms: 1000,
            spread: 0.05,
            knockback: 1.0,
            life: 2.0,
            ..spec("pistol", C::Gun, K::Bullet)
        },
        WeaponSpec {
            damage: 5,
            clip_size: 6,
            max_ammo: 36,
            reload_ms: 300,
            clip_reload_ms: 1400,
            spread: 0.02,
            knockback: 3.0,
            self_knockback: 2.0,
            life: 2.0,
            cost: 20,
            requires: Some("pistol".into()),
            ..spec("magnum", C::Gun, K::Bullet)
        },
        WeaponSpec {
            damage: 2,
            clip_size: 30,
            max_ammo: 150,
            reload_ms: 80,
            clip_reload_ms: 1600,
            spread: 0.12,
            knockback: 0.5,
            life: 1.5,
            cost: 25,
            full_auto: true,
            ..spec("uzi", C::Gun, K::Bullet)
        },
        WeaponSpec {
            damage: 4,
            clip_size: 5,
            max_ammo: 30,
            reload_ms: 400,
            clip_reload_ms: 1500,
            life: 350.0,
            cost: 30,
            electric: true,
            ..spec("taser", C::Gun, K::Beam)
        },
        WeaponSpec {
            damage: 3,
            clip_size: 4,
            max_ammo: 24,
            reload_ms: 500,
            clip_reload_ms: 2000,
            spread: 0.02,
            shot_spread: 5,
            knockback: 2.0,
            self_knockback: 4.0,
            life: 0.25,
            cost: 20,
            ..spec("shotgun", C::Shotgun, K::Pellet)
        },
        WeaponSpec {
            damage: 3,
            clip_size: 6,
            max_ammo: 36,
            reload_ms: 400,
            clip_reload_ms: 2000,
            spread: 0.03,
            shot_spread: 6,
            knockback: 2.0,
            self_knockback: 4.0,
            life: 0.25,
            cost: 40,
            requires: Some("shotgun".into()),
            ..spec("combat_shotgun", C::Shotgun, K::Pellet)
        },
        WeaponSpec {
            damage: 6,
            clip_size: 4,
            max_ammo: 20,
            reload_ms: 500,
            clip_reload_ms: 2000,
            knockback: 1.0,
            self_knockback: 3.0,
            life: 2.0,
            cost: 30,
            ..spec("grenade_launcher", C::Grenade, K::Grenade)
        },
        WeaponSpec {
            damage: 9,
            clip_size: 3,
            max_ammo: 15,
            reload_ms: 700,
            clip_reload_ms: 2500,
            knockback: 2.0,
            self_knockback: 5.0,
            life: 2.0,
            cost: 60,
            requires: Some("grenade_launcher".into()),
            ..spec("doom_launcher", C::Grenade, K::Grenade)
        },
        WeaponSpec {
            damage: 5,
            clip_size: 5,
            max_ammo: 25,
            reload_ms: 800,
            clip_reload_ms: 2000,
            shot_spread: 2,
            life: 500.0,
            cost: 35,
            electric: true,
            ..spec("rifle", C::Rifle, K::Beam)
        },
        WeaponSpec {
            damage: 4,
            clip_size: 8,
            max_ammo: 40,
            reload_ms: 350,
            clip_reload_ms: 2000,
            spread: 0.1,
            shot_spread: 2,
            cost: 50,
            electric: true,
            requires: Some("rifle".into()),
            ..spec("lightning_rifle", C::Rifle, K::ChainArc)
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_is_valid() {
        let catalog = WeaponCatalog::builtin().unwrap();
        assert_eq!(catalog.len(), default_specs().len());
        assert_eq!(catalog.baseline_melee(), 0);
    }

    #[test]
    fn test_predecessor_links_resolve_both_ways() {
        let catalog = WeaponCatalog::builtin().unwrap();
        let pistol = catalog.id_of("pistol").unwrap();
        let magnum = catalog.id_of("magnum").unwrap();
        assert_eq!(catalog.predecessor(magnum), Some(pistol));
        assert_eq!(catalog.successor(pistol), Some(magnum));
        assert_eq!(catalog.predecessor(pistol), None);
    }

    #[test]
    fn test_out_of_range_lookup_is_none() {
        let catalog = WeaponCatalog::builtin().unwrap();
        assert!(catalog.get(catalog.len()).is_none());
        assert!(catalog.predecessor(usize::MAX).is_none());
    }

    #[test]
    fn test_cycle_rejected() {
        let mut specs = default_specs();
        let pistol = specs.iter().position(|s| s.name == "pistol").unwrap();
        specs[pistol].requires = Some("magnum".into());
        match WeaponCatalog::new(specs) {
            Err(CatalogError::Cycle(_)) => {}
            other => panic!("expected cycle error, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_self_requirement_is_a_cycle() {
        let mut specs = default_specs();
        specs[4].requires = Some(specs[4].name.clone());
        assert!(matches!(WeaponCatalog::new(specs), Err(CatalogError::Cycle(_))));
    }

    #[test]
    fn test_unknown_predecessor_rejected() {
        let mut specs = default_specs();
        specs[4].requires = Some("railgun".into());
        assert!(matches!(
            WeaponCatalog::new(specs),
            Err(CatalogError::UnknownPredecessor { .. })
        ));
    }

    #[test]
    fn test_out_of_range_timing_rejected() {
        let mut specs = default_specs();
        specs[4].reload_ms = -1;
        assert!(matches!(WeaponCatalog::new(specs), Err(CatalogError::InvalidTiming(_))));

        let mut specs = default_specs();
        specs[4].clip_reload_ms = 50_000_000;
        assert!(matches!(WeaponCatalog::new(specs), Err(CatalogError::InvalidTiming(_))));

        let mut specs = default_specs();
        specs[4].clip_reload_ms = MAX_TIMING_MS;
        assert!(WeaponCatalog::new(specs).is_ok(), "upper bound is inclusive");
    }

    #[test]
    fn test_two_successors_rejected() {
        let mut specs = default_specs();
        let uzi = specs.iter().position(|s| s.name == "uzi").unwrap();
        specs[uzi].requires = Some("pistol".into());
        match WeaponCatalog::new(specs) {
            Err(CatalogError::DuplicateSuccessor { predecessor, .. }) => assert_eq!(predecessor, "pistol"),
            other => panic!("expected duplicate successor error, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_missing_baseline_rejected() {
        let specs: Vec<_> = default_specs().into_iter().filter(|s| s.name != "hammer").collect();
        // thunder_hammer still requires hammer, so the baseline check must fire first
        assert!(matches!(WeaponCatalog::new(specs), Err(CatalogError::MissingBaseline(_))));
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"[
            {"name": "hammer", "category": "hammer", "kind": "melee", "damage": 3, "reload_ms": 320},
            {"name": "pistol", "category": "gun", "kind": "bullet", "damage": 2,
             "clip_size": 10, "max_ammo": 60, "reload_ms": 125, "clip_reload_ms": 1000},
            {"name": "magnum", "category": "gun", "kind": "bullet", "damage": 5,
             "clip_size": 6, "max_ammo": 36, "reload_ms": 300, "requires": "pistol"}
        ]"#;
        let catalog = WeaponCatalog::from_json(json).unwrap();
        assert_eq!(catalog.len(), 3);
        let hammer = catalog.get(0).unwrap();
        assert_eq!(hammer.shot_spread, 1);
        assert_eq!(hammer.clip_size, 0);
        assert_eq!(catalog.predecessor(2), Some(1));
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(
            WeaponCatalog::from_json("{not json"),
            Err(CatalogError::Parse(_))
        ));
    }

    #[test]
    fn test_pellet_pattern_odd() {
        let pattern = pellet_pattern(5, 0);
        assert_eq!(pattern.len(), 5);
        assert_eq!(pattern[0], (0.0, 1.0));
        assert!((pattern[1].0 + 0.070).abs() < 1e-6);
        assert!((pattern[4].0 - 0.185).abs() < 1e-6);
        // outermost pair travels at the reduced speed
        assert!((pattern[4].1 - PELLET_SPEED_DIFF).abs() < 1e-6);
    }

    #[test]
    fn test_pellet_pattern_even_has_no_center() {
        let pattern = pellet_pattern(6, 0);
        assert_eq!(pattern.len(), 6);
        assert!(pattern.iter().all(|(a, _)| a.abs() > 0.01));
        let sum: f32 = pattern.iter().map(|(a, _)| a).sum();
        assert!(sum.abs() < 1e-6, "fan must be symmetric, sum {}", sum);
    }

    #[test]
    fn test_pellet_pattern_extra_pairs_capped() {
        assert_eq!(pellet_pattern(3, 1).len(), 5);
        assert_eq!(pellet_pattern(5, 1).len(), 5, "odd table holds two pairs");
        assert_eq!(pellet_pattern(1, 0).len(), 1);
    }
}
