//! Configuration for teamrole-daemon

use crate::error::{DaemonError, DaemonResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use teamrole_types::{GuildId, TeamBinding, TeamSide};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Directory backend configuration
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// Guild whose roles are managed
    #[serde(default)]
    pub guild_id: String,

    /// Team to role bindings
    #[serde(default)]
    pub teams: TeamsConfig,

    /// Roster source configuration
    #[serde(default)]
    pub roster: RosterConfig,

    /// Scheduler configuration
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Status API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Directory backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectoryConfig {
    /// Discord REST API
    Discord {
        /// Bot token
        #[serde(default)]
        token: String,

        /// API base URL
        #[serde(default = "default_api_base")]
        api_base: String,

        /// Request timeout in seconds
        #[serde(default = "default_request_timeout")]
        request_timeout_secs: u64,

        /// Age in seconds after which the member cache is re-enumerated
        #[serde(default = "default_member_refresh")]
        member_refresh_secs: u64,
    },

    /// In-memory directory (for development/testing)
    Memory,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig::Discord {
            token: String::new(),
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout(),
            member_refresh_secs: default_member_refresh(),
        }
    }
}

/// Both team bindings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamsConfig {
    #[serde(default)]
    pub red: TeamConfig,

    #[serde(default)]
    pub blue: TeamConfig,
}

/// A single roster team and the directory role mirroring it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamConfig {
    /// Team name in the roster
    #[serde(default)]
    pub team: String,

    /// Role name in the directory
    #[serde(default)]
    pub role: String,
}

/// Roster source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RosterConfig {
    /// JSON or TOML file, re-read on every tick
    File {
        /// Path to the roster file
        path: PathBuf,
    },

    /// Fixed team lists. Team names are matched ignoring case, since the
    /// layered loader lowercases map keys.
    Static {
        #[serde(default)]
        teams: HashMap<String, BTreeSet<String>>,
    },
}

impl Default for RosterConfig {
    fn default() -> Self {
        RosterConfig::File {
            path: PathBuf::from("roster.toml"),
        }
    }
}

/// What to do with an entry listed in both rosters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// The blue team claims the entry; it is not processed as red
    #[default]
    LastWins,

    /// Leave dual-listed entries untouched
    Skip,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reconciliation interval in seconds
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,

    /// Upper bound on the shutdown drain in seconds
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,

    /// Handling of entries present in both rosters
    #[serde(default)]
    pub overlap_policy: OverlapPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: default_reconcile_interval(),
            drain_timeout_secs: default_drain_timeout(),
            overlap_policy: OverlapPolicy::LastWins,
        }
    }
}

impl SchedulerConfig {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

/// Status API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve the status API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: default_listen_addr(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_member_refresh() -> u64 {
    60
}

fn default_reconcile_interval() -> u64 {
    10
}

fn default_drain_timeout() -> u64 {
    60
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8085))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Environment: TEAMROLE_GUILD_ID, TEAMROLE_TEAMS__RED__ROLE, ...
        builder = builder.add_source(
            config::Environment::with_prefix("TEAMROLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Create a development configuration backed by in-memory collaborators
    pub fn development() -> Self {
        Self {
            directory: DirectoryConfig::Memory,
            guild_id: "dev-guild".to_string(),
            teams: TeamsConfig {
                red: TeamConfig {
                    team: "Red".to_string(),
                    role: "Red".to_string(),
                },
                blue: TeamConfig {
                    team: "Blue".to_string(),
                    role: "Blue".to_string(),
                },
            },
            roster: RosterConfig::Static {
                teams: HashMap::new(),
            },
            ..Default::default()
        }
    }

    /// Check that every required value is present
    pub fn validate(&self) -> DaemonResult<()> {
        let mut missing = Vec::new();

        if let DirectoryConfig::Discord { token, .. } = &self.directory {
            if token.trim().is_empty() {
                missing.push("directory.token");
            }
        }
        if self.guild_id.trim().is_empty() {
            missing.push("guild_id");
        }
        if self.teams.red.team.trim().is_empty() {
            missing.push("teams.red.team");
        }
        if self.teams.red.role.trim().is_empty() {
            missing.push("teams.red.role");
        }
        if self.teams.blue.team.trim().is_empty() {
            missing.push("teams.blue.team");
        }
        if self.teams.blue.role.trim().is_empty() {
            missing.push("teams.blue.role");
        }

        if !missing.is_empty() {
            return Err(DaemonError::Config(format!(
                "Missing required values: {}",
                missing.join(", ")
            )));
        }

        if self.teams.red.team == self.teams.blue.team {
            return Err(DaemonError::Config(format!(
                "Red and blue teams must differ (both are '{}')",
                self.teams.red.team
            )));
        }

        if self.scheduler.reconcile_interval_secs == 0 {
            return Err(DaemonError::Config(
                "scheduler.reconcile_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn guild(&self) -> GuildId {
        GuildId::new(self.guild_id.trim())
    }

    /// Role binding for one side
    pub fn binding(&self, side: TeamSide) -> TeamBinding {
        let team = match side {
            TeamSide::Red => &self.teams.red,
            TeamSide::Blue => &self.teams.blue,
        };
        TeamBinding::new(side, team.team.clone(), team.role.clone())
    }
}
