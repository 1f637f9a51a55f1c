//! Action facade shared by the interactive shell and the HTTP API.
//!
//! Every operation returns `Result<Payload, ActionError>` and never panics;
//! [`ActionResponse`] renders either side into the `{ "success": .. }` shape
//! both front ends present to users.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::catalog::{Division, StopId};
use crate::config::SharedNotePolicy;
use crate::engine::Organ;
use crate::error::ActionError;
use crate::stops::{Activation, Deactivation};

/// Velocity used for simulated key presses.
pub const SIMULATED_VELOCITY: u8 = 64;

fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A stop as listed to users.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopInfo {
    pub id: String,
    pub name: String,
    pub division: Division,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopList {
    pub stops: Vec<StopInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveStopList {
    pub stops: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopChange {
    pub stop_id: String,
    pub stop_name: String,
    pub division: Division,
    /// Notes sent as a consequence (retriggered or silenced).
    pub notes: usize,
    pub already_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub count: usize,
    pub stops: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PanicResult {
    pub outputs_count: usize,
    pub messages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub active_stops: Vec<StopInfo>,
    pub active_keys: usize,
    pub active_notes: usize,
    pub stop_count: usize,
    pub rank_count: usize,
    pub outputs: Vec<String>,
    pub shared_notes: SharedNotePolicy,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyInfo {
    pub division: Division,
    pub note: u8,
    pub timestamp: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteInfo {
    pub rank: String,
    pub output: String,
    pub channel: u8,
    pub note: u8,
    pub timestamp: f64,
    pub sources: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<KeyInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<NoteInfo>>,
    pub active_stops: Vec<String>,
}

/// Which parts of the live state to report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StateFilter {
    #[default]
    All,
    Keys,
    Notes,
}

impl FromStr for StateFilter {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "all" => Ok(StateFilter::All),
            "keys" => Ok(StateFilter::Keys),
            "notes" => Ok(StateFilter::Notes),
            other => Err(ActionError::InvalidInput(format!(
                "Unknown state filter: {}. Use keys or notes",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyResult {
    pub manual: char,
    pub division: Division,
    pub note: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity: Option<u8>,
    pub commands: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub running: bool,
    pub timestamp: f64,
}

/// Uniform command surface over the organ engine.
#[derive(Clone, Debug)]
pub struct Actions {
    organ: Organ,
    running: Arc<AtomicBool>,
}

impl Actions {
    pub fn new(organ: Organ) -> Self {
        Self {
            organ,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Share an existing running flag (cleared on shutdown).
    pub fn with_running_flag(organ: Organ, running: Arc<AtomicBool>) -> Self {
        Self { organ, running }
    }

    pub fn organ(&self) -> &Organ {
        &self.organ
    }

    fn stop_change(&self, id: &StopId, notes: usize, already_active: bool) -> StopChange {
        let stop_name = self
            .organ
            .catalog()
            .get(id)
            .map(|s| s.display_name.clone())
            .unwrap_or_else(|| id.name.clone());
        StopChange {
            stop_id: id.to_string(),
            stop_name,
            division: id.division,
            notes,
            already_active,
        }
    }

    /// Mutating calls are refused once the running flag is cleared.
    fn ensure_running(&self) -> Result<(), ActionError> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ActionError::ShuttingDown)
        }
    }

    pub fn activate_stop(&self, id: &str) -> Result<StopChange, ActionError> {
        self.ensure_running()?;
        let id = self.organ.resolve_stop(id)?;
        match self.organ.activate(&id)? {
            Activation::Activated { retriggered } => Ok(self.stop_change(&id, retriggered, false)),
            Activation::AlreadyActive => Ok(self.stop_change(&id, 0, true)),
        }
    }

    pub fn deactivate_stop(&self, id: &str) -> Result<StopChange, ActionError> {
        self.ensure_running()?;
        let id = self.organ.resolve_stop(id)?;
        match self.organ.deactivate(&id)? {
            Deactivation::Deactivated { silenced } => Ok(self.stop_change(&id, silenced, false)),
            Deactivation::NotActive => Err(ActionError::StopNotActive(id.to_string())),
        }
    }

    pub fn all_clear(&self) -> Result<ClearResult, ActionError> {
        self.ensure_running()?;
        let cleared = self.organ.all_clear();
        Ok(ClearResult {
            count: cleared.len(),
            stops: cleared.iter().map(ToString::to_string).collect(),
        })
    }

    pub fn panic(&self) -> Result<PanicResult, ActionError> {
        let messages = self.organ.panic();
        Ok(PanicResult {
            outputs_count: self.organ.catalog().outputs().len(),
            messages,
        })
    }

    /// List stops in declaration order, optionally for one division.
    pub fn list_stops(&self, division: Option<&str>) -> Result<StopList, ActionError> {
        let division = match division.map(str::trim).filter(|d| !d.is_empty()) {
            Some(d) => Some(
                d.parse::<Division>()
                    .map_err(|_| ActionError::UnknownDivision(d.to_ascii_lowercase()))?,
            ),
            None => None,
        };
        let catalog = self.organ.catalog();
        let stops: Vec<StopInfo> = self.organ.state().with_state(|state| {
            catalog
                .stops()
                .iter()
                .enumerate()
                .filter(|(_, s)| division.map_or(true, |d| s.id.division == d))
                .map(|(ordinal, s)| StopInfo {
                    id: s.id.name.clone(),
                    name: s.display_name.clone(),
                    division: s.id.division,
                    active: state.active_stops.contains(ordinal),
                })
                .collect()
        });
        Ok(StopList { stops })
    }

    pub fn get_active_stops(&self) -> Result<ActiveStopList, ActionError> {
        let stops: Vec<String> = self
            .organ
            .state()
            .with_state(|s| s.active_stops.iter().map(|(_, id)| id.to_string()).collect());
        Ok(ActiveStopList { stops })
    }

    pub fn get_status(&self) -> Result<Status, ActionError> {
        let catalog = self.organ.catalog();
        let router_policy = self.shared_notes();
        Ok(self.organ.state().with_state(|state| Status {
            active_stops: state
                .active_stops
                .iter()
                .filter_map(|(_, id)| catalog.get(id))
                .map(|s| StopInfo {
                    id: s.id.name.clone(),
                    name: s.display_name.clone(),
                    division: s.id.division,
                    active: true,
                })
                .collect(),
            active_keys: state.keys.len(),
            active_notes: state.sounding.len(),
            stop_count: catalog.stops().len(),
            rank_count: catalog.rank_count(),
            outputs: catalog.outputs().to_vec(),
            shared_notes: router_policy,
            version: state.version,
        }))
    }

    pub fn get_state(&self, filter: StateFilter) -> Result<StateView, ActionError> {
        Ok(self.organ.state().with_state(|state| {
            let keys: Option<Vec<KeyInfo>> = matches!(filter, StateFilter::All | StateFilter::Keys).then(|| {
                state
                    .keys
                    .iter()
                    .map(|(division, note, since)| KeyInfo {
                        division,
                        note,
                        timestamp: unix_seconds(since),
                    })
                    .collect()
            });
            let notes: Option<Vec<NoteInfo>> = matches!(filter, StateFilter::All | StateFilter::Notes).then(|| {
                state
                    .sounding
                    .iter()
                    .map(|(key, note)| NoteInfo {
                        rank: note.rank_id.clone(),
                        output: key.output.clone(),
                        channel: key.channel,
                        note: key.note,
                        timestamp: unix_seconds(note.since),
                        sources: note.sources.len(),
                    })
                    .collect()
            });
            StateView {
                keys,
                notes,
                active_stops: state.active_stops.iter().map(|(_, id)| id.to_string()).collect(),
            }
        }))
    }

    /// Inject a key event as if it came from the console.
    ///
    /// `manual` is a division code (`G`, `S`, `C`, `P`) or name; `note` must be 0-127.
    pub fn simulate_key(&self, manual: &str, note: i64, down: bool) -> Result<KeyResult, ActionError> {
        self.ensure_running()?;
        let division = manual.parse::<Division>().map_err(|_| {
            ActionError::InvalidInput(format!("Invalid manual: {}. Use G/S/C/P", manual.trim()))
        })?;
        let note = u8::try_from(note)
            .ok()
            .filter(|n| *n <= 127)
            .ok_or_else(|| ActionError::InvalidInput(format!("Invalid note: {}. Must be 0-127", note)))?;

        let (velocity, commands) = if down {
            (Some(SIMULATED_VELOCITY), self.organ.key_down(division, note, SIMULATED_VELOCITY))
        } else {
            (None, self.organ.key_up(division, note))
        };
        Ok(KeyResult {
            manual: division.code(),
            division,
            note,
            velocity,
            commands,
        })
    }

    pub fn health(&self) -> Health {
        let running = self.running.load(Ordering::SeqCst);
        Health {
            status: if running { "running" } else { "stopping" },
            running,
            timestamp: unix_seconds(SystemTime::now()),
        }
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    fn shared_notes(&self) -> SharedNotePolicy {
        self.organ.shared_notes()
    }
}

/// A facade result rendered for users: `{ "success": true, ..payload }` or
/// `{ "success": false, "error": "..." }`.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResponse<T: Serialize> {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> From<Result<T, ActionError>> for ActionResponse<T> {
    fn from(result: Result<T, ActionError>) -> Self {
        match result {
            Ok(payload) => Self {
                success: true,
                payload: Some(payload),
                error: None,
            },
            Err(e) => Self {
                success: false,
                payload: None,
                error: Some(e.to_string()),
            },
        }
    }
}
