use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::geofile::feature::FeatureId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error reading shapefile {}: {reason}", path.display())]
    SourceRead { path: PathBuf, reason: String },

    #[error("feature {0} not found")]
    NotFound(FeatureId),

    #[error("shapefile not loaded")]
    NotLoaded,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("selected feature {0} no longer exists")]
    StaleSelection(FeatureId, #[source] StoreError),

    #[error(transparent)]
    NotFound(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{program} failed: {diagnostic}")]
    ToolExecution { program: String, diagnostic: String },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("in-process conversion failed: {0}")]
    InProcess(String),
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("shapefile not loaded")]
    NothingLoaded,

    #[error("{} error saving: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} error saving: {source}", path.display())]
    Conversion {
        path: PathBuf,
        interchange_path: PathBuf,
        #[source]
        source: ConversionError,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("please enter latitude and longitude separated by a comma ex) 126.939056574,36.218311760")]
    MissingSeparator,

    #[error("please enter valid latitude and longitude ex) 126.939056574,36.218311760")]
    NotANumber,
}
