//! Configuration types shared by the spectral and connectivity crates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How each epoch is turned into complex spectral coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralMode {
    /// A single Hann taper over the whole epoch.
    Fft,
    /// Discrete prolate spheroidal (Slepian) tapers.
    #[default]
    Multitaper,
}

impl SpectralMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectralMode::Fft => "fft",
            SpectralMode::Multitaper => "multitaper",
        }
    }
}

impl fmt::Display for SpectralMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a spectral mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown spectral mode '{0}', expected 'fft' or 'multitaper'")]
pub struct UnknownSpectralMode(pub String);

impl FromStr for SpectralMode {
    type Err = UnknownSpectralMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fft" => Ok(SpectralMode::Fft),
            "multitaper" => Ok(SpectralMode::Multitaper),
            other => Err(UnknownSpectralMode(other.to_string())),
        }
    }
}
