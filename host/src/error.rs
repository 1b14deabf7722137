use thiserror::Error;

/// Errors raised by the host adapters
#[derive(Error, Debug)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("link error: {0}")]
    Link(#[from] esplink::Error),
    #[error("simulated modem has stopped")]
    ModemStopped,
}
