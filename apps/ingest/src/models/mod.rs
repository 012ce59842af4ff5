//! Domain models for bands, telemetry, sessions and events

mod band;
mod event;
mod session;
mod telemetry;

pub use band::{bid_from_ext_address, Band, ConnectState};
pub use event::{Event, EventKind, NewEvent};
pub use session::{
    generate_session_id, BloodPressure, EndReason, SessionRecord, SessionStatus, StimParams,
    StimSession, MAX_STIM_LEVEL, MIN_STIM_LEVEL,
};
pub use telemetry::{haversine_km, LocationFix, LocationParseError, TelemetrySample};
