mod client;
mod config;
mod entry;
mod error;
mod fanout;
mod host;
mod logger;
mod sensor;
mod session;
mod switch;
mod types;
mod watchdog;

pub use client::{RemoteClient, UpdateCallback, is_connected};
pub use config::{AccountConfig, SessionConfig, Settings, WatchdogConfig};
pub use entry::{AccountEntry, Integration};
pub use error::{Error, Result};
pub use fanout::{EntityCallback, UpdateFanout};
pub use host::{Host, ShutdownEvent, TimerHandle};
pub use logger::{ParameterLogMode, ParameterLogger};
pub use sensor::{
    COMMON_SENSORS, ConnectionStatus, ON_OFF_SENSORS, PELTEC_SENSORS, ParameterSensor, SensorDescriptor,
    SensorKind, connection_status_for, normalize_on_off, sensors_for,
};
pub use session::{SessionController, SessionControllerBuilder, SessionState};
pub use switch::{CircuitSwitch, POWER_SWITCH_KINDS, PowerSwitch, Switch, switches_for};
pub use types::*;
pub use watchdog::{
    CheckOutcome, ReloadReason, Watchdog, WatchdogRecord, WatchdogRegistry, reload_reason,
};
