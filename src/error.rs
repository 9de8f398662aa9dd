use thiserror::Error;

#[derive(Error, Debug)]
pub enum WifiError {
    #[error("No WiFi interface found")]
    NoInterfaceFound,

    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("Failed to execute nmcli: {0}")]
    NmcliExecution(String),

    #[error("Failed to parse nmcli output: {0}")]
    NmcliParse(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Interface setup failed: {0}")]
    InterfaceSetup(String),

    #[error("Operation not supported by this driver: {0}")]
    Unsupported(&'static str),

    #[error("Wifi controller has stopped")]
    ControllerStopped,

    #[error("Daemon request failed: {0}")]
    DaemonRequest(String),
}
