//! Static world geometry
//!
//! `WorldQuery` is the collision surface both the character simulation and the
//! bot controller read from. `TileMap` is the in-tree implementation: a grid of
//! 32-unit tiles parsed from ASCII, with separate solid and hazard layers.
//! Entity queries (radius / nearest / segment) live on `SimState` since they
//! need the live character set.

use bitvec::prelude::*;

use crate::game::constants::nav::TILE_SIZE;
use crate::util::vec2::Vec2;

/// Result of a line cast that hit solid geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    /// First solid sample along the line
    pub point: Vec2,
    /// Last free sample before the hit
    pub before: Vec2,
}

/// Read-only geometry queries
pub trait WorldQuery: Send + Sync {
    fn is_solid_at(&self, pos: Vec2) -> bool;

    /// Hazard terrain (including everything outside the playable area)
    fn is_death_at(&self, pos: Vec2) -> bool;

    /// Playable area size in world units
    fn bounds(&self) -> Vec2;

    /// Step along `from -> to` one unit at a time, reporting the first solid sample
    fn intersect_line(&self, from: Vec2, to: Vec2) -> Option<LineHit> {
        let distance = from.distance_to(to);
        let steps = (distance.round() as i32).max(1);
        let mut last = from;
        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let pos = from.mix(to, t);
            if self.is_solid_at(pos) {
                return Some(LineHit { point: pos, before: last });
            }
            last = pos;
        }
        None
    }

    #[inline]
    fn has_line_of_sight(&self, from: Vec2, to: Vec2) -> bool {
        self.intersect_line(from, to).is_none()
    }

    /// Axis-aligned box of `size` centered on `pos` overlaps solid geometry
    fn test_box(&self, pos: Vec2, size: f32) -> bool {
        let half = size * 0.5;
        self.is_solid_at(Vec2::new(pos.x - half, pos.y - half))
            || self.is_solid_at(Vec2::new(pos.x + half, pos.y - half))
            || self.is_solid_at(Vec2::new(pos.x - half, pos.y + half))
            || self.is_solid_at(Vec2::new(pos.x + half, pos.y + half))
    }

    /// Sweep a box through `vel` in sub-unit steps, sliding along walls.
    /// Blocked axes have their velocity reflected and scaled by `elasticity`.
    fn move_box(&self, pos: Vec2, vel: Vec2, size: f32, elasticity: f32) -> (Vec2, Vec2) {
        let mut pos = pos;
        let mut vel = vel;
        let distance = vel.length();
        if distance <= 0.00001 {
            return (pos, vel);
        }

        let max = distance as i32;
        let fraction = 1.0 / (max + 1) as f32;
        for _ in 0..=max {
            let mut new_pos = pos + vel * fraction;
            if self.test_box(new_pos, size) {
                let mut hits = 0;
                if self.test_box(Vec2::new(pos.x, new_pos.y), size) {
                    new_pos.y = pos.y;
                    vel.y *= -elasticity;
                    hits += 1;
                }
                if self.test_box(Vec2::new(new_pos.x, pos.y), size) {
                    new_pos.x = pos.x;
                    vel.x *= -elasticity;
                    hits += 1;
                }
                // Corner hit: neither axis alone collides
                if hits == 0 {
                    new_pos = pos;
                    vel = vel * -elasticity;
                }
            }
            pos = new_pos;
        }
        (pos, vel)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("map has no rows")]
    Empty,
    #[error("map row {row} has width {found}, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("map has no spawn points")]
    NoSpawnPoints,
    #[error("unknown map tile '{tile}' at row {row}, column {col}")]
    UnknownTile { tile: char, row: usize, col: usize },
    #[error("map read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Tile grid with solid and hazard layers
#[derive(Debug, Clone)]
pub struct TileMap {
    width: usize,
    height: usize,
    solid: BitVec,
    death: BitVec,
    spawn_points: Vec<Vec2>,
}

impl TileMap {
    /// Parse an ASCII map.
    ///
    /// `#` solid, `^` hazard, `S` spawn point, `.` or space empty. Blank lines
    /// are skipped.
    pub fn from_ascii(text: &str) -> Result<Self, MapError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();
        if rows.is_empty() {
            return Err(MapError::Empty);
        }

        let width = rows[0].chars().count();
        let height = rows.len();
        let mut solid = bitvec![0; width * height];
        let mut death = bitvec![0; width * height];
        let mut spawn_points = Vec::new();

        for (y, row) in rows.iter().enumerate() {
            let found = row.chars().count();
            if found != width {
                return Err(MapError::Ragged {
                    row: y,
                    expected: width,
                    found,
                });
            }
            for (x, tile) in row.chars().enumerate() {
                let idx = y * width + x;
                match tile {
                    '#' => solid.set(idx, true),
                    '^' => death.set(idx, true),
                    'S' => spawn_points.push(Self::tile_center(x as i32, y as i32)),
                    '.' | ' ' => {}
                    other => {
                        return Err(MapError::UnknownTile {
                            tile: other,
                            row: y,
                            col: x,
                        })
                    }
                }
            }
        }

        if spawn_points.is_empty() {
            return Err(MapError::NoSpawnPoints);
        }

        Ok(Self {
            width,
            height,
            solid,
            death,
            spawn_points,
        })
    }

    pub fn from_file(path: &str) -> Result<Self, MapError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ascii(&text)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn spawn_points(&self) -> &[Vec2] {
        &self.spawn_points
    }

    #[inline]
    pub fn tile_center(x: i32, y: i32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) * TILE_SIZE,
            (y as f32 + 0.5) * TILE_SIZE,
        )
    }

    #[inline]
    fn tile_at(pos: Vec2) -> (i32, i32) {
        (
            (pos.x / TILE_SIZE).floor() as i32,
            (pos.y / TILE_SIZE).floor() as i32,
        )
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return None;
        }
        Some(y as usize * self.width + x as usize)
    }

    pub fn is_solid_tile(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) => self.solid[i],
            None => true,
        }
    }

    pub fn is_death_tile(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) => self.death[i],
            None => true,
        }
    }

    /// Centers of free, non-hazard tiles that rest on solid ground
    pub fn standing_points(&self) -> Vec<Vec2> {
        let mut points = Vec::new();
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                if !self.is_solid_tile(x, y)
                    && !self.is_death_tile(x, y)
                    && self.index(x, y + 1).is_some()
                    && self.is_solid_tile(x, y + 1)
                {
                    points.push(Self::tile_center(x, y));
                }
            }
        }
        points
    }
}

impl WorldQuery for TileMap {
    fn is_solid_at(&self, pos: Vec2) -> bool {
        let (x, y) = Self::tile_at(pos);
        self.is_solid_tile(x, y)
    }

    fn is_death_at(&self, pos: Vec2) -> bool {
        let (x, y) = Self::tile_at(pos);
        self.is_death_tile(x, y)
    }

    fn bounds(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * TILE_SIZE,
            self.height as f32 * TILE_SIZE,
        )
    }
}

/// Small two-level arena used by the headless binary and benches
pub const DEMO_MAP: &str = "
########################################
#......................................#
#......................................#
#..S................................S..#
#######.........................########
#......................................#
#..............##########..............#
#......................................#
#......................................#
#....S..........................S......#
#..########....................######..#
#......................................#
#......................................#
#...............S......S...............#
#.............############.............#
#......................................#
#.S..................................S.#
####....##########^^^^##########....####
#......................................#
########################################
";

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map() -> TileMap {
        TileMap::from_ascii(
            "
#######
#.....#
#.S...#
#######
",
        )
        .unwrap()
    }

    #[test]
    fn test_parse_demo_map() {
        let map = TileMap::from_ascii(DEMO_MAP).unwrap();
        assert_eq!(map.width(), 40);
        assert_eq!(map.height(), 20);
        assert!(map.spawn_points().len() >= 8);
        assert!(!map.standing_points().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(TileMap::from_ascii("\n\n"), Err(MapError::Empty)));
        assert!(matches!(
            TileMap::from_ascii("###\n#S\n###"),
            Err(MapError::Ragged { row: 1, .. })
        ));
        assert!(matches!(
            TileMap::from_ascii("###\n#.#\n###"),
            Err(MapError::NoSpawnPoints)
        ));
        assert!(matches!(
            TileMap::from_ascii("###\n#S?\n###"),
            Err(MapError::UnknownTile { tile: '?', .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_is_solid_and_deadly() {
        let map = small_map();
        let outside = Vec2::new(-10.0, 40.0);
        assert!(map.is_solid_at(outside));
        assert!(map.is_death_at(outside));
        assert!(!map.is_solid_at(TileMap::tile_center(2, 2)));
    }

    #[test]
    fn test_intersect_line_reports_first_solid_sample() {
        let map = small_map();
        let from = TileMap::tile_center(2, 2);
        let to = Vec2::new(from.x, 200.0);
        let hit = map.intersect_line(from, to).expect("floor must block");
        assert!(hit.point.y >= 96.0 && hit.point.y < 97.5, "hit y {}", hit.point.y);
        assert!(!map.is_solid_at(hit.before));
        assert!(map.has_line_of_sight(from, TileMap::tile_center(5, 1)));
    }

    #[test]
    fn test_move_box_stops_on_floor() {
        let map = small_map();
        let start = TileMap::tile_center(2, 2);
        let (pos, vel) = map.move_box(start, Vec2::new(0.0, 40.0), 28.0, 0.0);
        assert!(pos.y + 14.0 <= 96.0, "box sank into floor at {}", pos.y);
        assert_eq!(vel.y, 0.0);
    }

    #[test]
    fn test_move_box_slides_along_wall() {
        let map = small_map();
        let start = TileMap::tile_center(5, 2);
        let (pos, vel) = map.move_box(start, Vec2::new(30.0, -5.0), 28.0, 0.0);
        assert!(pos.x + 14.0 <= 192.0, "went through wall: {}", pos.x);
        assert!(pos.y < start.y, "vertical motion must survive the wall");
        assert_eq!(vel.x, 0.0);
    }

    #[test]
    fn test_standing_points_rest_on_ground() {
        let map = small_map();
        let points = map.standing_points();
        assert_eq!(points.len(), 5);
        for p in points {
            assert!(map.is_solid_at(p + Vec2::new(0.0, TILE_SIZE)));
        }
    }
}
