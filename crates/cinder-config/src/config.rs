//! Server settings with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and player policy.
    pub server: ServerConfig,
    /// Protocol version the server speaks by default.
    pub protocol: ProtocolConfig,
    /// Entity ceiling and interest tuning.
    pub entities: EntityConfig,
    /// Transport and tick settings.
    pub network: NetworkConfig,
    /// World description sent on login and respawn.
    pub world: WorldConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// Listener and player policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the listener to.
    pub bind_address: String,
    /// TCP port.
    pub port: u16,
    /// Maximum concurrent connections.
    pub max_players: usize,
    /// Verify player accounts.
    pub online_mode: bool,
    /// Grant operator rights to every player on join.
    pub everybody_op: bool,
    /// Message of the day.
    pub motd: String,
}

/// Protocol settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Version string such as `"1.16.5"`. Object metadata defaults are
    /// built for this version.
    pub version: String,
}

/// Entity lifecycle and interest tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EntityConfig {
    /// Maximum number of live entities, players included.
    pub max_entities: usize,
    /// Radius within which a player is shown other entities.
    pub view_distance: f64,
    /// Distance an entity must travel before its interest is recomputed.
    pub movement_threshold: f64,
    /// Seconds before a dropped item despawns. `None` keeps items forever.
    pub item_despawn_seconds: Option<u64>,
}

/// Transport and tick settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Records queued per client before it is dropped as too slow.
    pub outbound_queue_capacity: usize,
    /// Largest accepted frame in bytes.
    pub max_frame_size: u32,
    /// Client timeout in seconds.
    pub timeout_seconds: u32,
}

/// World description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Dimension names, the first being the one players live in.
    pub dimension_names: Vec<String>,
    /// Difficulty, 0 (peaceful) to 3 (hard).
    pub difficulty: u8,
    /// Game mode new players start in.
    pub game_mode: String,
    /// Where players join and respawn.
    pub spawn_point: [f64; 3],
    /// Hashed world seed sent on respawn.
    pub hashed_seed: i64,
    /// Level type name, e.g. `"default"` or `"flat"`.
    pub level_type: String,
}

/// Log output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive such as `"info"` or `"cinder_entity=debug"`.
    pub level: String,
    /// Also write JSON logs to `log_dir`.
    pub file_logging: bool,
    /// Directory for log files.
    pub log_dir: PathBuf,
}

// --- Default implementations ---

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 25565,
            max_players: 20,
            online_mode: true,
            everybody_op: false,
            motd: "A cinder server".to_string(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: "1.16.5".to_string(),
        }
    }
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            max_entities: 100,
            view_distance: 150.0,
            movement_threshold: 2.0,
            item_despawn_seconds: Some(300),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            tick_rate: 20,
            outbound_queue_capacity: 4096,
            max_frame_size: 1_048_576,
            timeout_seconds: 30,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            dimension_names: vec![
                "minecraft:overworld".to_string(),
                "minecraft:the_nether".to_string(),
                "minecraft:the_end".to_string(),
            ],
            difficulty: 2,
            game_mode: "survival".to_string(),
            spawn_point: [6.0, 53.0, 6.0],
            hashed_seed: 0,
            level_type: "default".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for cinder, or the working directory when
    /// the platform has none.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("cinder"))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.entities.view_distance.is_finite() && self.entities.view_distance > 0.0) {
            return Err(ConfigError::Invalid {
                field: "entities.view_distance",
                reason: format!("must be positive, got {}", self.entities.view_distance),
            });
        }
        if !(self.entities.movement_threshold.is_finite() && self.entities.movement_threshold >= 0.0)
        {
            return Err(ConfigError::Invalid {
                field: "entities.movement_threshold",
                reason: format!("must not be negative, got {}", self.entities.movement_threshold),
            });
        }
        if self.network.tick_rate == 0 {
            return Err(ConfigError::Invalid {
                field: "network.tick_rate",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.world.dimension_names.is_empty() {
            return Err(ConfigError::Invalid {
                field: "world.dimension_names",
                reason: "needs at least one dimension".to_string(),
            });
        }
        Ok(())
    }
}
