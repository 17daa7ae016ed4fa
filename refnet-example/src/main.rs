use refnet_core::backends::{cpu::CpuTensor, Tensor};
use refnet_core::nn::gradcheck::relative_error;
use refnet_core::nn::network::TestNet;

use anyhow::{bail, Context, Result};
use ndarray::Ix2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_CASE: &str = "reference_case.json";
const FINITE_DIFFERENCE_STEP: f64 = 1e-5;

/// Inputs of one reference run, as row-major nested arrays.
#[derive(Debug, Clone, Deserialize)]
struct ReferenceCase {
    x: Vec<Vec<f64>>,
    t: Vec<Vec<f64>>,
    w: Vec<Vec<f64>>,
    b: Vec<Vec<f64>>,
}

impl ReferenceCase {
    fn builtin() -> Self {
        Self {
            x: vec![vec![0.1, 0.2]],
            t: vec![vec![0.0, 1.0]],
            w: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            b: vec![vec![0.0, 1.0]],
        }
    }
}

#[derive(Debug, Serialize)]
struct ReferenceReport {
    loss: f64,
    y: Vec<Vec<f64>>,
    dx: Vec<Vec<f64>>,
    dw: Vec<Vec<f64>>,
    db: Vec<Vec<f64>>,
    max_relative_error: f64,
}

fn from_rows(name: &str, rows: &[Vec<f64>]) -> Result<CpuTensor<f64>> {
    let cols = rows.first().map_or(0, Vec::len);
    if rows.iter().any(|row| row.len() != cols) {
        bail!("`{}` has rows of differing length", name);
    }

    let values: Vec<f64> = rows.iter().flatten().copied().collect();
    CpuTensor::<f64>::from_shape_vec(&[rows.len(), cols], values).with_context(|| format!("building `{}`", name))
}

fn to_rows(tensor: &CpuTensor<f64>) -> Result<Vec<Vec<f64>>> {
    let matrix = tensor.view().into_dimensionality::<Ix2>().context("expected a 2-d tensor")?;
    Ok(matrix.rows().into_iter().map(|row| row.to_vec()).collect())
}

fn load_case(arg: Option<String>) -> Result<ReferenceCase> {
    let path = match arg {
        Some(path) => path,
        None if Path::new(DEFAULT_CASE).exists() => DEFAULT_CASE.to_string(),
        None => {
            info!("No case file given, using the built-in reference case");
            return Ok(ReferenceCase::builtin());
        }
    };

    let data = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path))?;
    let case = serde_json::from_str(&data).with_context(|| format!("parsing {}", path))?;
    info!("Reference case loaded from {}", path);
    Ok(case)
}

fn run_case(case: &ReferenceCase) -> Result<ReferenceReport> {
    let x = from_rows("x", &case.x)?;
    let t = from_rows("t", &case.t)?;
    let w = from_rows("w", &case.w)?;
    let b = from_rows("b", &case.b)?;

    let mut net = TestNet::<f64, CpuTensor<f64>>::new(w, b)?;
    let loss = net.forward(&x, &t)?;
    let dx = net.backward()?;

    let y = net.loss_layer().output().context("softmax output missing after forward")?;
    let (dw, db) = net.gradients().context("parameter gradients missing after backward")?;

    let numerical = net.numerical_gradients(&x, &t, FINITE_DIFFERENCE_STEP)?;
    let max_relative_error = [
        relative_error(dw, &numerical.weights)?,
        relative_error(db, &numerical.bias)?,
        relative_error(&dx, &numerical.input)?,
    ]
    .into_iter()
    .fold(0.0, f64::max);
    info!(loss, max_relative_error, "Reference case evaluated");

    Ok(ReferenceReport {
        loss,
        y: to_rows(y)?,
        dx: to_rows(&dx)?,
        dw: to_rows(dw)?,
        db: to_rows(db)?,
        max_relative_error,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let case = load_case(std::env::args().nth(1))?;
    let report = run_case(&case)?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
