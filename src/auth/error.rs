use thiserror::Error;

use crate::notify::DeliveryMode;

/// Infrastructure failures of the login core.
///
/// Credential problems are not errors; they come back as
/// [`super::LoginOutcome::Rejected`]. Everything here maps to a server error.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("session store failure: {0:#}")]
    Session(anyhow::Error),

    #[error("OTP dispatch failure: {0:#}")]
    Dispatch(anyhow::Error),

    #[error("random source failure: {0}")]
    Randomness(#[from] rand::Error),

    #[error("OTP delivery over {0} is not implemented")]
    DeliveryNotImplemented(DeliveryMode),
}
