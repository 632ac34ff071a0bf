//! Python bindings for derivation-trace using PyO3.
//!
//! Lets the Python orchestration layer hand captured tracer output to the
//! reconstruction core and get branch trees back as JSON.

#[cfg(feature = "python")]
mod derivation;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Initialize the derivation_trace Python module.
#[cfg(feature = "python")]
#[pymodule]
fn derivation_trace(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<derivation::PyBuilderConfig>()?;
    m.add_class::<derivation::PyDerivationForest>()?;
    m.add_function(wrap_pyfunction!(derivation::parse_trace, m)?)?;
    m.add_function(wrap_pyfunction!(derivation::build_forest, m)?)?;
    Ok(())
}
