use std::fmt;

#[derive(Debug)]
pub enum Error {
    Authentication(String),
    Configuration(String),
    NoDevices(String),
    NotConnected,
    Refresh(String),
    Relogin(String),
    Transport(String),
    Command(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Authentication(account) => {
                write!(f, "cannot login to web boiler server: {account}")
            }
            Error::Configuration(account) => {
                write!(f, "cannot get configuration from web boiler server: {account}")
            }
            Error::NoDevices(account) => write!(f, "no device found for account: {account}"),
            Error::NotConnected => write!(f, "websocket not connected"),
            Error::Refresh(msg) => write!(f, "refresh failed: {msg}"),
            Error::Relogin(msg) => write!(f, "relogin failed: {msg}"),
            Error::Transport(msg) => write!(f, "transport error: {msg}"),
            Error::Command(msg) => write!(f, "command failed: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
