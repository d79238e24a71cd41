use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Capacity exceeded: need {needed} bytes, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    #[error("Save not found: {0}")]
    NotFound(String),

    #[error("Package too large: {size} bytes (device maximum is {max})")]
    PackageTooLarge { size: usize, max: usize },

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("No free short name after {attempts} attempts")]
    NameSpaceExhausted { attempts: usize },

    #[error("Write aborted: {0}")]
    WriteAborted(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SaveError {
    /// Unwrap a `SaveError` that was carried through an `io::Error`
    ///
    /// Write streams report failures through `std::io::Write`, which only
    /// speaks `io::Error`. This recovers the typed error when one was wrapped
    /// and falls back to `SaveError::Io` otherwise.
    pub fn from_io(err: std::io::Error) -> Self {
        if err.get_ref().map_or(false, |inner| inner.is::<SaveError>()) {
            match err.into_inner().map(|inner| inner.downcast::<SaveError>()) {
                Some(Ok(save)) => *save,
                Some(Err(other)) => SaveError::Io(std::io::Error::other(other)),
                None => SaveError::Io(std::io::Error::other("unknown I/O failure")),
            }
        } else {
            SaveError::Io(err)
        }
    }

    /// Wrap this error so it can travel through `std::io` traits
    pub fn into_io(self) -> std::io::Error {
        match self {
            SaveError::Io(err) => err,
            other => std::io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SaveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_round_trip_keeps_variant() {
        let err = SaveError::CapacityExceeded {
            needed: 10,
            available: 5,
        };
        let io = err.into_io();
        assert!(matches!(
            SaveError::from_io(io),
            SaveError::CapacityExceeded {
                needed: 10,
                available: 5
            }
        ));
    }

    #[test]
    fn test_plain_io_error_stays_io() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short");
        assert!(matches!(SaveError::from_io(io), SaveError::Io(_)));
    }
}
