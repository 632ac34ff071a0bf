//! Python bindings for derivation reconstruction.

use pyo3::prelude::*;

use crate::derivation::{BuilderConfig, DerivationForest, TraceAnalyzer, TraceBuilder};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(e.to_string())
}

/// Python wrapper for BuilderConfig.
#[pyclass(name = "BuilderConfig")]
#[derive(Clone)]
pub struct PyBuilderConfig {
    pub(crate) inner: BuilderConfig,
}

#[pymethods]
impl PyBuilderConfig {
    #[new]
    #[pyo3(signature = (root_label="root".to_string(), ignored_goals=None, record_spans=true, max_branches=None))]
    fn new(
        root_label: String,
        ignored_goals: Option<Vec<String>>,
        record_spans: bool,
        max_branches: Option<usize>,
    ) -> PyResult<Self> {
        let mut inner = BuilderConfig::default()
            .with_root_label(root_label)
            .with_spans(record_spans);
        if let Some(goals) = ignored_goals {
            inner.ignored_goals = goals;
        }
        inner.max_branches = max_branches;
        inner.validate().map_err(value_error)?;
        Ok(Self { inner })
    }

    /// Parse a configuration from JSON.
    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        let inner = BuilderConfig::from_json(json).map_err(value_error)?;
        Ok(Self { inner })
    }

    #[getter]
    fn root_label(&self) -> String {
        self.inner.root_label.clone()
    }

    #[getter]
    fn ignored_goals(&self) -> Vec<String> {
        self.inner.ignored_goals.clone()
    }

    #[getter]
    fn record_spans(&self) -> bool {
        self.inner.record_spans
    }

    #[getter]
    fn max_branches(&self) -> Option<usize> {
        self.inner.max_branches
    }

    fn __repr__(&self) -> String {
        format!(
            "BuilderConfig(root_label={:?}, ignored_goals={:?}, record_spans={}, max_branches={:?})",
            self.inner.root_label,
            self.inner.ignored_goals,
            self.inner.record_spans,
            self.inner.max_branches
        )
    }
}

/// Python wrapper for DerivationForest.
#[pyclass(name = "DerivationForest")]
#[derive(Clone)]
pub struct PyDerivationForest {
    pub(crate) inner: DerivationForest,
}

#[pymethods]
impl PyDerivationForest {
    fn __len__(&self) -> usize {
        self.inner.len()
    }

    /// Branch trees as a JSON array.
    #[pyo3(signature = (pretty=false))]
    fn to_json(&self, pretty: bool) -> PyResult<String> {
        let json = if pretty {
            self.inner.to_json_pretty()
        } else {
            self.inner.to_json()
        };
        json.map_err(value_error)
    }

    /// Branch `index` as a JSON object.
    fn branch_json(&self, index: usize) -> PyResult<String> {
        let branch = self
            .inner
            .get(index)
            .ok_or_else(|| value_error(format!("branch index {} out of range", index)))?;
        branch.tree.to_json().map_err(value_error)
    }

    /// Indented outline of branch `index`.
    fn outline(&self, index: usize) -> PyResult<String> {
        self.inner
            .get(index)
            .map(|b| b.tree.to_string())
            .ok_or_else(|| value_error(format!("branch index {} out of range", index)))
    }

    /// Indices of branches whose first goal succeeded.
    fn successful_indices(&self) -> Vec<usize> {
        TraceAnalyzer::new(&self.inner)
            .successful_branches()
            .iter()
            .map(|b| b.index)
            .collect()
    }

    /// Replay counters as a JSON object.
    fn stats_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.inner.stats).map_err(value_error)
    }

    fn __repr__(&self) -> String {
        format!(
            "DerivationForest(branches={}, redos={})",
            self.inner.len(),
            self.inner.stats.redos
        )
    }
}

/// Rebuild a trace with default settings and return the branch trees as JSON.
#[pyfunction]
pub fn parse_trace(trace: &str) -> PyResult<String> {
    crate::derivation::parse_trace(trace)
        .to_json()
        .map_err(value_error)
}

/// Rebuild a trace into a forest object.
#[pyfunction]
#[pyo3(signature = (trace, config=None))]
pub fn build_forest(trace: &str, config: Option<PyBuilderConfig>) -> PyResult<PyDerivationForest> {
    let builder = match config {
        Some(config) => TraceBuilder::with_config(config.inner).map_err(value_error)?,
        None => TraceBuilder::new(),
    };
    Ok(PyDerivationForest {
        inner: builder.build(trace),
    })
}
