use std::str::FromStr;

use crate::game::constants::players::{MAX_PLAYERS, RESPAWN_DELAY_TICKS};

/// Game-mode switches read during the tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameTunables {
    /// Friendly hits still deal damage while teamplay is on
    pub team_damage: bool,
    /// Hazard tiles kill outright instead of pushing and hurting
    pub insta_death_tiles: bool,
    pub teamplay: bool,
    /// Everyone spawns with the thunder hammer active
    pub hammer_fight: bool,
    /// Level new bots are created with
    pub bot_level: i32,
    /// Persist human loadouts on death and restore them after game-mode kills
    pub save_state: bool,
}

impl Default for GameTunables {
    fn default() -> Self {
        Self {
            team_damage: false,
            insta_death_tiles: false,
            teamplay: false,
            hammer_fight: false,
            bot_level: 1,
            save_state: false,
        }
    }
}

/// Simulation server configuration
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub tunables: GameTunables,
    /// Bots added at startup
    pub bot_count: usize,
    /// Seed for the simulation and bot RNGs
    pub seed: u64,
    /// JSON weapon table replacing the built-in one
    pub weapon_catalog_path: Option<String>,
    /// ASCII map file; the built-in demo map otherwise
    pub map_path: Option<String>,
    pub respawn_delay_ticks: u64,
    /// Ticks between snapshot summaries in the log (0 disables)
    pub snapshot_log_interval: u64,
    pub metrics_port: u16,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tunables: GameTunables::default(),
            bot_count: 8,
            seed: 0x5eed,
            weapon_catalog_path: None,
            map_path: None,
            respawn_delay_ticks: RESPAWN_DELAY_TICKS,
            snapshot_log_interval: 250,
            metrics_port: 9090,
        }
    }
}

/// Parse `key` into `target`, keeping the old value on garbage
fn read_env<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}

/// Booleans accept `1/0`, `true/false`, `on/off`
fn read_env_flag(key: &str, target: &mut bool) {
    if let Ok(raw) = std::env::var(key) {
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => *target = true,
            "0" | "false" | "off" | "no" => *target = false,
            _ => tracing::warn!("Invalid {} '{}', using default", key, raw),
        }
    }
}

impl SimConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        read_env("BOT_COUNT", &mut config.bot_count);
        if config.bot_count > MAX_PLAYERS {
            tracing::warn!("BOT_COUNT must be at most {}, clamping", MAX_PLAYERS);
            config.bot_count = MAX_PLAYERS;
        }

        read_env("BOT_LEVEL", &mut config.tunables.bot_level);
        if config.tunables.bot_level < 1 {
            tracing::warn!("BOT_LEVEL must be >= 1, using 1");
            config.tunables.bot_level = 1;
        }

        read_env_flag("TEAM_DAMAGE", &mut config.tunables.team_damage);
        read_env_flag("INSTA_DEATH_TILES", &mut config.tunables.insta_death_tiles);
        read_env_flag("TEAMPLAY", &mut config.tunables.teamplay);
        read_env_flag("HAMMER_FIGHT", &mut config.tunables.hammer_fight);
        read_env_flag("SAVE_STATE", &mut config.tunables.save_state);
        read_env("SIM_SEED", &mut config.seed);
        read_env("RESPAWN_DELAY_TICKS", &mut config.respawn_delay_ticks);
        read_env("SNAPSHOT_LOG_INTERVAL", &mut config.snapshot_log_interval);
        read_env("METRICS_PORT", &mut config.metrics_port);

        if let Ok(path) = std::env::var("WEAPON_CATALOG_PATH") {
            config.weapon_catalog_path = Some(path);
        }
        if let Ok(path) = std::env::var("MAP_PATH") {
            config.map_path = Some(path);
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.bot_count > MAX_PLAYERS {
            return Err(format!("bot_count cannot exceed {}", MAX_PLAYERS));
        }
        if self.tunables.bot_level < 1 {
            return Err("bot_level must be at least 1".to_string());
        }
        if self.respawn_delay_ticks == 0 {
            return Err("respawn_delay_ticks must be at least 1".to_string());
        }
        if self.metrics_port == 0 {
            return Err("metrics_port cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.bot_count, 8);
        assert_eq!(config.respawn_delay_ticks, RESPAWN_DELAY_TICKS);
        assert!(!config.tunables.team_damage);
        assert!(!config.tunables.hammer_fight);
        assert!(!config.tunables.save_state);
        assert_eq!(config.tunables.bot_level, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = SimConfig::default();
        config.bot_count = MAX_PLAYERS + 1;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.respawn_delay_ticks = 0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.tunables.bot_level = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default() {
        let config = SimConfig::load_or_default();
        assert!(config.bot_count <= MAX_PLAYERS);
        assert!(config.tunables.bot_level >= 1);
    }
}
