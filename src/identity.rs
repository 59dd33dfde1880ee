//! Per-device identity: the [`Session`] value every core operation receives,
//! the holder that persists it across restarts, and the join links that
//! carry a room id plus the host role marker.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ServiceError;

/// Default location of the persisted identity.
const DEFAULT_IDENTITY_PATH: &str = "data/identity.json";
/// Environment variable that overrides [`DEFAULT_IDENTITY_PATH`].
const IDENTITY_PATH_ENV: &str = "MISSION_COMPLETE_IDENTITY_PATH";
/// Path segment every join link starts with.
const JOIN_SEGMENT: &str = "mission-complete";

/// Who this device is inside one room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Room the device is looking at.
    pub room_id: Uuid,
    /// Player identity, absent on the shared display.
    pub player_id: Option<Uuid>,
}

impl Session {
    /// Session of a device that joined as a player.
    pub fn player(room_id: Uuid, player_id: Uuid) -> Self {
        Self {
            room_id,
            player_id: Some(player_id),
        }
    }

    /// Session of the shared display, which never acts as a player.
    pub fn display(room_id: Uuid) -> Self {
        Self {
            room_id,
            player_id: None,
        }
    }

    /// Whether the device acts as a player.
    pub fn is_player(&self) -> bool {
        self.player_id.is_some()
    }

    /// Player id, or [`ServiceError::NotJoined`] on a display session.
    pub fn require_player(&self) -> Result<Uuid, ServiceError> {
        self.player_id.ok_or(ServiceError::NotJoined)
    }
}

/// Failures while reading or writing the persisted identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to access identity file `{path}`")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("identity file `{path}` is corrupted")]
    Corrupted {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Process-local storage of the current player identity.
pub trait IdentityHolder: Send + Sync {
    /// Identity saved by the last join, if any.
    fn load(&self) -> Result<Option<Session>, IdentityError>;
    /// Persist the identity of a fresh join.
    fn save(&self, session: &Session) -> Result<(), IdentityError>;
    /// Forget the stored identity.
    fn clear(&self) -> Result<(), IdentityError>;
}

/// Identity kept in a JSON file so it survives restarts.
#[derive(Debug, Clone)]
pub struct FileIdentityHolder {
    path: PathBuf,
}

impl FileIdentityHolder {
    /// Holder writing to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Holder writing to the path configured in the environment.
    pub fn from_env() -> Self {
        let path = env::var_os(IDENTITY_PATH_ENV)
            .map(PathBuf::from)
            .filter(|path| !path.as_os_str().is_empty())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IDENTITY_PATH));
        Self::new(path)
    }

    /// Location of the identity file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl IdentityHolder for FileIdentityHolder {
    fn load(&self) -> Result<Option<Session>, IdentityError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents)
                .map(Some)
                .map_err(|source| IdentityError::Corrupted {
                    path: self.path.display().to_string(),
                    source,
                }),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.io_error(err)),
        }
    }

    fn save(&self, session: &Session) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.io_error(err))?;
        }
        let contents = serde_json::to_string_pretty(session).map_err(|source| {
            IdentityError::Corrupted {
                path: self.path.display().to_string(),
                source,
            }
        })?;
        fs::write(&self.path, contents).map_err(|err| self.io_error(err))?;
        info!(path = %self.path.display(), room_id = %session.room_id, "identity saved");
        Ok(())
    }

    fn clear(&self) -> Result<(), IdentityError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }
}

/// Identity kept in memory only, for tests and embedded displays.
#[derive(Debug, Default)]
pub struct MemoryIdentityHolder {
    slot: Mutex<Option<Session>>,
}

impl IdentityHolder for MemoryIdentityHolder {
    fn load(&self) -> Result<Option<Session>, IdentityError> {
        Ok(self.slot.lock().map(|slot| *slot).unwrap_or_else(|poisoned| *poisoned.into_inner()))
    }

    fn save(&self, session: &Session) -> Result<(), IdentityError> {
        match self.slot.lock() {
            Ok(mut slot) => *slot = Some(*session),
            Err(poisoned) => *poisoned.into_inner() = Some(*session),
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), IdentityError> {
        match self.slot.lock() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
        Ok(())
    }
}

/// Shareable invitation into a room, optionally carrying the host role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinLink {
    /// Room to join.
    pub room_id: Uuid,
    /// Whether the joiner becomes the host.
    pub as_host: bool,
}

impl JoinLink {
    /// Guest invitation.
    pub fn guest(room_id: Uuid) -> Self {
        Self {
            room_id,
            as_host: false,
        }
    }

    /// Invitation the room creator follows to join as host.
    pub fn host(room_id: Uuid) -> Self {
        Self {
            room_id,
            as_host: true,
        }
    }

    /// Render as `{base}/mission-complete/{room_id}`, with `?role=host` for the host.
    pub fn to_url(&self, base: &str) -> String {
        let mut url = format!(
            "{}/{JOIN_SEGMENT}/{}",
            base.trim_end_matches('/'),
            self.room_id
        );
        if self.as_host {
            url.push_str("?role=host");
        }
        url
    }

    /// Parse a link produced by [`JoinLink::to_url`]. Unknown query parameters are ignored.
    pub fn parse(url: &str) -> Result<Self, ServiceError> {
        let url = url.trim();
        let without_fragment = url.split('#').next().unwrap_or(url);
        let (path, query) = without_fragment
            .split_once('?')
            .unwrap_or((without_fragment, ""));

        let mut segments = path.trim_end_matches('/').rsplit('/');
        let room_segment = segments.next().unwrap_or_default();
        if segments.next() != Some(JOIN_SEGMENT) {
            return Err(ServiceError::InvalidInput(format!(
                "`{url}` is not a mission-complete join link"
            )));
        }
        let room_id = Uuid::parse_str(room_segment).map_err(|err| {
            ServiceError::InvalidInput(format!("invalid room id `{room_segment}`: {err}"))
        })?;

        let as_host = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .any(|(key, value)| key == "role" && value == "host");

        debug!(%room_id, as_host, "parsed join link");
        Ok(Self { room_id, as_host })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_link_round_trips_host_marker() {
        let room_id = Uuid::new_v4();
        for link in [JoinLink::guest(room_id), JoinLink::host(room_id)] {
            let url = link.to_url("https://party.example/");
            assert_eq!(JoinLink::parse(&url).unwrap(), link);
        }
        assert_eq!(
            JoinLink::host(room_id).to_url("http://localhost:3000"),
            format!("http://localhost:3000/mission-complete/{room_id}?role=host")
        );
    }

    #[test]
    fn join_link_ignores_unknown_parameters() {
        let room_id = Uuid::new_v4();
        let url = format!("http://x/mission-complete/{room_id}?utm=qr&role=guest");
        assert_eq!(JoinLink::parse(&url).unwrap(), JoinLink::guest(room_id));

        let url = format!("http://x/mission-complete/{room_id}/?lang=ja&role=host#top");
        assert_eq!(JoinLink::parse(&url).unwrap(), JoinLink::host(room_id));
    }

    #[test]
    fn malformed_links_are_invalid_input() {
        assert!(matches!(
            JoinLink::parse("http://x/other-game/4821"),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            JoinLink::parse("http://x/mission-complete/not-a-uuid"),
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[test]
    fn file_holder_persists_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let holder = FileIdentityHolder::new(dir.path().join("nested/identity.json"));
        assert_eq!(holder.load().unwrap(), None);

        let session = Session::player(Uuid::new_v4(), Uuid::new_v4());
        holder.save(&session).unwrap();
        let reopened = FileIdentityHolder::new(holder.path().to_path_buf());
        assert_eq!(reopened.load().unwrap(), Some(session));

        reopened.clear().unwrap();
        assert_eq!(holder.load().unwrap(), None);
    }

    #[test]
    fn corrupted_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileIdentityHolder::new(path).load(),
            Err(IdentityError::Corrupted { .. })
        ));
    }

    #[test]
    fn display_session_is_not_a_player() {
        let session = Session::display(Uuid::new_v4());
        assert!(!session.is_player());
        assert!(matches!(
            session.require_player(),
            Err(ServiceError::NotJoined)
        ));
    }
}
