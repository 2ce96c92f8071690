#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

pub mod alerts;
pub mod batch;
pub mod config;
pub mod conservation;
pub mod contract;
pub mod error;
pub mod frame;
pub mod geofence;
pub mod model;
pub mod pipeline;
pub mod provenance;
pub mod quality;
pub mod quota;
pub mod schema;
pub mod season;
pub mod store;

#[cfg(feature = "python")]
mod python;

pub use config::TraceConfig;
pub use contract::HerbTrace;
pub use error::TraceError;
pub use pipeline::{Accepted, Rejection, Stage, Submission, ValidationPipeline};
pub use provenance::{Provenance, ProvenanceAssembler};
pub use quota::{HarvestQuotaLedger, HarvestQuotaRecord, QuotaKey, QuotaStatus};
pub use store::{LedgerStore, MemoryLedger};

#[cfg(feature = "python")]
#[pymodule]
#[pyo3(name = "_core")]
fn core_module(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::TraceLedger>()?;
    m.add_function(wrap_pyfunction!(python::init_logging, m)?)?;
    python::add_schema_exports(m)?;
    Ok(())
}
