//! Error type for the demo binary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    #[error("Transaction log error: {0}")]
    Log(#[from] tpc_log::LogError),

    #[error("Coordinator error: {0}")]
    Coordinator(#[from] tpc_coordinator::CoordinatorError),

    #[error("Staging error: {0}")]
    Staging(#[from] tpc_participants::StagingError),
}

pub type Result<T> = std::result::Result<T, Error>;
