use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::types::{Device, DeviceCollection, Parameter};

/// Invoked by the remote client for every pushed parameter update.
/// `create` is true the first time a parameter is seen.
pub type UpdateCallback = Arc<dyn Fn(&Device, &Parameter, bool) + Send + Sync>;

/// Session with the vendor's web boiler service.
///
/// Implementations own authentication, the push websocket and the HTTP
/// transport. `Ok(false)` from the boolean operations means the server
/// refused; `Err` means the call itself failed. Callers treat both as
/// failure.
#[async_trait]
pub trait RemoteClient: Send + Sync + 'static {
    async fn login(&self, username: &str, password: &str) -> Result<bool>;

    /// Fetches the device list; afterwards `devices()` is populated.
    async fn get_configuration(&self) -> Result<bool>;

    /// Snapshot of the known devices and their parameters.
    fn devices(&self) -> DeviceCollection;

    async fn start_websocket(&self, on_update: UpdateCallback) -> Result<()>;

    async fn close_websocket(&self) -> Result<()>;

    /// Requests a full data refresh for every device.
    async fn refresh(&self) -> Result<bool>;

    /// Logs in again with the credentials of the last successful login.
    async fn relogin(&self) -> Result<bool>;

    fn is_websocket_connected(&self) -> Result<bool>;

    /// Closes the underlying HTTP session.
    async fn close_session(&self) -> Result<()>;

    async fn turn(&self, serial: &str, on: bool) -> Result<bool>;

    async fn turn_circuit(&self, serial: &str, dbindex: u32, on: bool) -> Result<bool>;
}

/// Connectivity as seen by the supervisors: a failed read counts as offline.
pub fn is_connected(client: &dyn RemoteClient) -> bool {
    client.is_websocket_connected().unwrap_or(false)
}
