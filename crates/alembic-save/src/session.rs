//! A running game: engine, player state and the storage it persists to.
//!
//! The session is the only place that talks to [`Storage`]. Failures there
//! never reach the simulation; they become [`Notice`]s for the host to show
//! and the session carries on with whatever state it has.

use crate::codec::{ImportError, decode_import, encode_export, export_file_name};
use crate::config::{ConfigError, SessionConfig};
use crate::migration::MigrationList;
use crate::pipeline::load_player;
use crate::storage::{Storage, StorageError};
use alembic_core::engine::{Engine, EngineError};
use alembic_core::player::PlayerState;
use alembic_core::sim::AdvanceResult;
use serde_json::Value;

/// Something the player should be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Saving or loading failed at the storage layer.
    StorageUnavailable,
    /// A save could not be read.
    InvalidSavefile,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Notice::StorageUnavailable => {
                "The game is unable to save, possibly because you are in incognito. \
                 Please export your save manually before closing the game."
            }
            Notice::InvalidSavefile => "Invalid savefile format.",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to serialize save: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// An export ready for the host to write out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedSave {
    pub file_name: String,
    pub contents: String,
}

pub struct Session<S: Storage> {
    engine: Engine,
    migrations: MigrationList,
    config: SessionConfig,
    storage: S,
    player: PlayerState,
    notices: Vec<Notice>,
    since_autosave: f64,
}

impl<S: Storage> Session<S> {
    /// Start a session with the built-in machines and load whatever the
    /// storage holds.
    pub fn open(config: SessionConfig, storage: S, now_ms: u64) -> Result<Self, SessionError> {
        config.validate()?;
        let engine = Engine::standard(config.sim.clone())?;
        Ok(Self::with_engine(
            engine,
            MigrationList::standard(),
            config,
            storage,
            now_ms,
        ))
    }

    pub fn with_engine(
        engine: Engine,
        migrations: MigrationList,
        config: SessionConfig,
        storage: S,
        now_ms: u64,
    ) -> Self {
        let player = PlayerState::default_start(&engine, now_ms, migrations.version());
        let mut session = Self {
            engine,
            migrations,
            config,
            storage,
            player,
            notices: Vec::new(),
            since_autosave: 0.0,
        };
        session.load_save(now_ms);
        session
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn player(&self) -> &PlayerState {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut PlayerState {
        &mut self.player
    }

    /// The engine alongside the player, for player actions that consult
    /// machine definitions.
    pub fn parts_mut(&mut self) -> (&Engine, &mut PlayerState) {
        (&self.engine, &mut self.player)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Take every notice raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn notify(&mut self, notice: Notice) {
        if !self.notices.contains(&notice) {
            self.notices.push(notice);
        }
    }

    fn new_game(&self, now_ms: u64) -> PlayerState {
        match load_player(&self.engine, &self.migrations, None, now_ms) {
            Ok(player) => player,
            // Without a save there is nothing to reject.
            Err(_) => PlayerState::default_start(&self.engine, now_ms, self.migrations.version()),
        }
    }

    /// Replace the player with the stored save, or a new game if there is
    /// none or it cannot be read.
    pub fn load_save(&mut self, now_ms: u64) {
        let stored = match self.storage.get(&self.config.storage_key) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(error = %e, "could not read save, starting a new game");
                self.player = self.new_game(now_ms);
                self.notify(Notice::StorageUnavailable);
                return;
            }
        };
        let Some(text) = stored else {
            self.player = self.new_game(now_ms);
            return;
        };
        let loaded = serde_json::from_str::<Value>(&text)
            .map_err(|e| e.to_string())
            .and_then(|value| {
                load_player(&self.engine, &self.migrations, Some(&value), now_ms)
                    .map_err(|e| e.to_string())
            });
        match loaded {
            Ok(player) => self.player = player,
            Err(error) => {
                tracing::warn!(
                    error = error.as_str(),
                    "stored save is invalid, starting a new game"
                );
                self.player = self.new_game(now_ms);
                self.notify(Notice::InvalidSavefile);
            }
        }
    }

    /// Write the player to storage. Returns `false` without writing when
    /// the state does not carry a valid marker.
    pub fn save_player(&mut self) -> Result<bool, SessionError> {
        if !self.player.has_valid_marker() {
            tracing::warn!("refusing to save state with an invalid marker");
            return Ok(false);
        }
        let json = serde_json::to_string(&self.player)?;
        self.storage.set(&self.config.storage_key, &json)?;
        Ok(true)
    }

    fn save_or_notify(&mut self) {
        if let Err(e) = self.save_player() {
            tracing::warn!(error = %e, "save failed");
            self.notify(Notice::StorageUnavailable);
        }
    }

    /// Start over and persist the new game immediately.
    pub fn reset(&mut self, now_ms: u64) {
        self.player = self.new_game(now_ms);
        self.save_or_notify();
    }

    /// Advance the simulation by `real_dt` seconds of wall time and
    /// autosave when the interval has passed.
    pub fn update(&mut self, real_dt: f64, now_ms: u64) -> AdvanceResult {
        let result = self.engine.advance(&mut self.player, real_dt);
        self.player.last_update_time = now_ms;

        if real_dt.is_finite() && real_dt > 0.0 {
            self.since_autosave += real_dt;
        }
        if self.since_autosave >= self.config.autosave_interval_secs {
            self.since_autosave = 0.0;
            if self.player.options.autosave {
                self.save_or_notify();
            }
        }
        result
    }

    /// Bump the export counter and encode the current state.
    pub fn export_save(&mut self, stamp: &str) -> Result<ExportedSave, SessionError> {
        self.player.options.export_count += 1;
        let contents = encode_export(&self.player)?;
        Ok(ExportedSave {
            file_name: export_file_name(self.player.options.export_count, stamp),
            contents,
        })
    }

    /// Replace the player with an exported save and persist it. On failure
    /// the current state is kept and one [`Notice::InvalidSavefile`] is
    /// raised.
    pub fn import_save(&mut self, text: &str, now_ms: u64) -> Result<(), ImportError> {
        let loaded = decode_import(text).and_then(|value| {
            load_player(&self.engine, &self.migrations, Some(&value), now_ms)
                .map_err(ImportError::from)
        });
        match loaded {
            Ok(player) => {
                self.player = player;
                self.save_or_notify();
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "rejected imported save");
                self.notify(Notice::InvalidSavefile);
                Err(e)
            }
        }
    }
}
