use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    BadIPFormatting(String),
    BadPortsRange(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::BadIPFormatting(e) => write!(f, "IP formatting error: {}", e),
            ConfigError::BadPortsRange(e) => write!(f, "Port range error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum NetworkError {
    BindError(std::io::Error),
    SockError(std::io::Error),
    ConnectionFailed(String),
    HandshakeFailed(String),
    Timeout,
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkError::BindError(e) => write!(f, "Network bind error: {}", e),
            NetworkError::SockError(e) => write!(f, "Socket error: {}", e),
            NetworkError::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            NetworkError::HandshakeFailed(e) => write!(f, "WebSocket handshake failed: {}", e),
            NetworkError::Timeout => write!(f, "Network operation timed out"),
        }
    }
}

impl std::error::Error for NetworkError {}

/// Payload-level failures: the bytes arrived but did not mean anything to us.
#[derive(Debug)]
pub enum ProtocolError {
    EmptyMessage,
    InvalidJson(String),
    UnexpectedShape(String),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::EmptyMessage => write!(f, "Empty message"),
            ProtocolError::InvalidJson(e) => write!(f, "Invalid JSON: {}", e),
            ProtocolError::UnexpectedShape(e) => write!(f, "Unexpected message shape: {}", e),
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        ProtocolError::InvalidJson(err.to_string())
    }
}

#[derive(Debug)]
pub enum StorageError {
    WriteFailed,
    ReadFailed,
    InvalidName(String),
    Disabled,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::InvalidName(e) => write!(f, "Invalid name: {}", e),
            StorageError::Disabled => write!(f, "Storage is disabled"),
        }
    }
}

impl std::error::Error for StorageError {}

#[derive(Debug)]
pub enum ClientError {
    NoServerSelected,
    InvalidCommand(String),
    UnknownServer(String),
    Network(NetworkError),
    Protocol(ProtocolError),
    Storage(StorageError),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NoServerSelected => write!(f, "No server selected"),
            ClientError::InvalidCommand(e) => write!(f, "Invalid command: {}", e),
            ClientError::UnknownServer(name) => write!(f, "Unknown server '{}'", name),
            ClientError::Network(e) => write!(f, "Network error: {}", e),
            ClientError::Protocol(e) => write!(f, "Protocol error: {}", e),
            ClientError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<NetworkError> for ClientError {
    fn from(err: NetworkError) -> Self {
        ClientError::Network(err)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        ClientError::Protocol(err)
    }
}

impl From<StorageError> for ClientError {
    fn from(err: StorageError) -> Self {
        ClientError::Storage(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    NetworkError(NetworkError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::NetworkError(e) => write!(f, "Network error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<NetworkError> for ControllerError {
    fn from(err: NetworkError) -> Self {
        ControllerError::NetworkError(err)
    }
}
