//! Conversions from external infrastructure errors into domain errors.

use reqwest::Error as HttpError;
use tally_common::resilience::RegistryError;
use tally_domain::TallyError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub TallyError);

impl From<InfraError> for TallyError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<TallyError> for InfraError {
    fn from(value: TallyError) -> Self {
        InfraError(value)
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → TallyError */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        let error = if value.is_builder() {
            TallyError::Config(format!("invalid http client configuration: {value}"))
        } else if value.is_decode() {
            TallyError::Decode(value.to_string())
        } else {
            TallyError::Network(format!("http error: {value}"))
        };
        InfraError(error)
    }
}

/* -------------------------------------------------------------------------- */
/* RegistryError → TallyError */
/* -------------------------------------------------------------------------- */

impl From<RegistryError> for InfraError {
    fn from(value: RegistryError) -> Self {
        InfraError(TallyError::Config(format!("resilience policy error: {value}")))
    }
}
