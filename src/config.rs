//! Application-level configuration loading, including the topic and mission pools.

use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use rand::{rng, seq::IndexedRandom};
use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the pools and game rules are read from.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MISSION_COMPLETE_CONFIG_PATH";
/// Missions written for a player when they join.
const DEFAULT_INITIAL_MISSIONS: usize = 3;
/// Points granted per completed mission.
const DEFAULT_REWARD_POINTS: i32 = 1;
/// Players required before the host may start the game; lower values are raised to it.
const DEFAULT_MIN_PLAYERS: usize = 2;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    topics: Vec<String>,
    missions: Vec<String>,
    initial_missions: usize,
    reward_points: i32,
    min_players: usize,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to the built-in pools.
    pub fn load() -> Self {
        Self::load_from(&resolve_config_path())
    }

    /// Load the configuration from `path`, falling back to the built-in pools.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        topics = app_config.topics.len(),
                        missions = app_config.missions.len(),
                        "loaded game pools from config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Build a configuration from explicit pools, mostly for tests and embedding.
    pub fn with_pools(topics: Vec<String>, missions: Vec<String>) -> Self {
        RawConfig {
            topics,
            missions,
            initial_missions: DEFAULT_INITIAL_MISSIONS,
            reward_points: DEFAULT_REWARD_POINTS,
            min_players: DEFAULT_MIN_PLAYERS,
        }
        .into()
    }

    /// Override the reward granted per completed mission.
    pub fn with_reward_points(mut self, reward_points: i32) -> Self {
        self.reward_points = reward_points;
        self
    }

    /// Override the size of the initial mission batch.
    pub fn with_initial_missions(mut self, initial_missions: usize) -> Self {
        self.initial_missions = initial_missions.max(1);
        self
    }

    /// Number of missions provisioned when a player joins.
    pub fn initial_missions(&self) -> usize {
        self.initial_missions
    }

    /// Points added to a player's score per completed mission.
    pub fn reward_points(&self) -> i32 {
        self.reward_points
    }

    /// Players that must be present before the game can start.
    pub fn min_players(&self) -> usize {
        self.min_players
    }

    /// Topic pool.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Mission pool.
    pub fn missions(&self) -> &[String] {
        &self.missions
    }

    /// Draw a topic at random, avoiding `previous` whenever another topic exists.
    pub fn draw_topic(&self, previous: Option<&str>) -> Option<String> {
        let mut rng = rng();
        let fresh = self
            .topics
            .iter()
            .filter(|topic| Some(topic.as_str()) != previous)
            .collect::<Vec<_>>();

        fresh
            .choose(&mut rng)
            .map(|topic| (*topic).clone())
            .or_else(|| self.topics.choose(&mut rng).cloned())
    }

    /// Draw `count` missions at random.
    ///
    /// Contents listed in `pending` (the player's open queue) and contents drawn
    /// earlier in the same batch are skipped while the pool still has other
    /// entries; once it runs dry duplicates are allowed so the queue never
    /// comes up short.
    pub fn draw_missions(&self, count: usize, pending: &[String]) -> Vec<String> {
        let mut rng = rng();
        let mut drawn: Vec<String> = Vec::with_capacity(count);

        for _ in 0..count {
            let fresh = self
                .missions
                .iter()
                .filter(|mission| !pending.contains(mission) && !drawn.contains(mission))
                .collect::<Vec<_>>();

            let pick = fresh
                .choose(&mut rng)
                .copied()
                .or_else(|| self.missions.choose(&mut rng));

            match pick {
                Some(mission) => drawn.push(mission.clone()),
                None => break,
            }
        }

        drawn
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
            missions: default_missions(),
            initial_missions: DEFAULT_INITIAL_MISSIONS,
            reward_points: DEFAULT_REWARD_POINTS,
            min_players: DEFAULT_MIN_PLAYERS,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    #[serde(default = "default_topics")]
    topics: Vec<String>,
    #[serde(default = "default_missions")]
    missions: Vec<String>,
    #[serde(default = "default_initial_missions")]
    initial_missions: usize,
    #[serde(default = "default_reward_points")]
    reward_points: i32,
    #[serde(default = "default_min_players")]
    min_players: usize,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let topics = non_blank(value.topics);
        let missions = non_blank(value.missions);

        Self {
            topics: if topics.is_empty() {
                warn!("topic pool is empty; using built-in topics");
                default_topics()
            } else {
                topics
            },
            missions: if missions.is_empty() {
                warn!("mission pool is empty; using built-in missions");
                default_missions()
            } else {
                missions
            },
            initial_missions: value.initial_missions.max(1),
            reward_points: value.reward_points,
            min_players: value.min_players.max(DEFAULT_MIN_PLAYERS),
        }
    }
}

fn non_blank(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn default_initial_missions() -> usize {
    DEFAULT_INITIAL_MISSIONS
}

fn default_reward_points() -> i32 {
    DEFAULT_REWARD_POINTS
}

fn default_min_players() -> usize {
    DEFAULT_MIN_PLAYERS
}

/// Built-in conversation topics shipped with the binary.
fn default_topics() -> Vec<String> {
    [
        "The best trip you have ever taken",
        "A food you could eat every day",
        "Your most embarrassing moment at school",
        "If you won the lottery tomorrow",
        "The last thing that made you laugh out loud",
        "A skill you secretly want to learn",
        "Your worst part-time job",
        "The movie you have watched the most",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Built-in secret missions shipped with the binary.
fn default_missions() -> Vec<String> {
    [
        "Get someone to say \"delicious\"",
        "Make a toast without anyone noticing it was your mission",
        "Get two people to high-five each other",
        "Make someone check the time",
        "Get someone to tell you their birthday",
        "Get someone to refill your glass",
        "Make someone say \"seriously?\"",
        "Get the whole table to laugh",
        "Get someone to take a photo of you",
        "Make someone repeat your name",
        "Get someone to recommend a song",
        "Make someone stand up",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn pools(topics: &[&str], missions: &[&str]) -> AppConfig {
        AppConfig::with_pools(
            topics.iter().map(|s| s.to_string()).collect(),
            missions.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn draw_topic_avoids_previous_when_possible() {
        let config = pools(&["a", "b"], &["m"]);
        for _ in 0..20 {
            assert_eq!(config.draw_topic(Some("a")).as_deref(), Some("b"));
        }

        let single = pools(&["only"], &["m"]);
        assert_eq!(single.draw_topic(Some("only")).as_deref(), Some("only"));
    }

    #[test]
    fn draw_missions_skips_pending_contents() {
        let config = pools(&["t"], &["m1", "m2", "m3", "m4"]);
        let pending = vec!["m1".to_string(), "m2".to_string()];

        let drawn = config.draw_missions(2, &pending);
        assert_eq!(drawn.len(), 2);
        assert!(drawn.iter().all(|m| m == "m3" || m == "m4"));
        assert_ne!(drawn[0], drawn[1]);
    }

    #[test]
    fn draw_missions_allows_duplicates_once_pool_is_exhausted() {
        let config = pools(&["t"], &["m1"]);
        let drawn = config.draw_missions(3, &["m1".to_string()]);
        assert_eq!(drawn, vec!["m1", "m1", "m1"]);
    }

    #[test]
    fn blank_pools_fall_back_to_defaults() {
        let config = pools(&["  "], &[]);
        assert_eq!(config.topics(), default_topics().as_slice());
        assert_eq!(config.missions(), default_missions().as_slice());
    }

    #[test]
    fn load_from_reads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"topics": ["Pets"], "missions": ["Wave"], "reward_points": 10}}"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path());
        assert_eq!(config.topics(), ["Pets".to_string()].as_slice());
        assert_eq!(config.missions(), ["Wave".to_string()].as_slice());
        assert_eq!(config.reward_points(), 10);
        assert_eq!(config.initial_missions(), DEFAULT_INITIAL_MISSIONS);
        assert_eq!(config.min_players(), DEFAULT_MIN_PLAYERS);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/mission-complete.json"));
        assert_eq!(config.reward_points(), DEFAULT_REWARD_POINTS);
        assert!(!config.topics().is_empty());
    }
}
