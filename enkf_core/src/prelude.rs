// enkf_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::error::{AnalysisError, Result};
pub use crate::estimation::{AnalysisInput, AnalysisScheme, FilterKind, Tolerances};
pub use crate::localization::distance::{GeodesicDistance, Haversine};

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::localization::LocalizationMatrices;
pub use crate::types::{Ensemble, GeoPoint, ObsVector};

// --- Concrete Analysis Schemes (Export all of them for convenience) ---
pub use crate::estimation::filters::{
    ensrf::Ensrf,
    ensrf_direct::{EnsrfDirect, EnsrfDirectLocalized},
    ensrf_serial::EnsrfSerial,
    estkf::Estkf,
    etkf::{Etkf, EtkfLivings},
    senkf::{StochasticEnkf, StochasticEnkfLocalized},
};

// --- Diagnostics ---
pub use crate::linalg::{ensemble_mean, ensemble_spread};
