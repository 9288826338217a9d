//! Command-line tool for checking and bounding the spectral norm of kernels
//! stored in safetensors checkpoints.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use specnorm::config::{load_plan, LayerKind, LayerPlan, NormalizePlan};
use specnorm::spectral::{conv2d_spectral_norm, matrix_spectral_norm};
use specnorm::weights::{load_tensors, save_tensors, RawTensor};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level CLI options.
#[derive(Parser)]
#[command(name = "specnorm", about = "Spectral-norm tooling for safetensors checkpoints")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Report the spectral norm of kernels in a checkpoint.
    Check {
        /// SafeTensors checkpoint to inspect.
        #[arg(long)]
        weights: PathBuf,
        /// Plan naming the kernels to inspect. Without a plan every rank-2
        /// tensor is reported; conv kernels need the plan's input sizes.
        #[arg(long)]
        plan: Option<PathBuf>,
    },
    /// Rescale kernels so their spectral norm stays inside the plan's bound.
    Normalize {
        /// SafeTensors checkpoint to read.
        #[arg(long)]
        weights: PathBuf,
        /// Plan naming the kernels to rescale.
        #[arg(long)]
        plan: PathBuf,
        /// Path for the rescaled checkpoint.
        #[arg(long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();

    let cli = Cli::parse();
    match cli.command {
        Command::Check { weights, plan } => run_check(&weights, plan.as_deref()),
        Command::Normalize {
            weights,
            plan,
            output,
        } => run_normalize(&weights, &plan, &output),
    }
}

fn run_check(weights: &std::path::Path, plan: Option<&std::path::Path>) -> Result<()> {
    let tensors = load_tensors(weights)?;
    match plan {
        Some(plan) => {
            let plan = load_plan(plan)?;
            for layer in &plan.layers {
                let tensor = lookup(&tensors, &layer.name)?;
                let sigma = layer_sigma(tensor, layer)?;
                println!("{}\t{sigma:.6}", layer.name);
            }
        }
        None => {
            let mut names: Vec<&String> = tensors.keys().collect();
            names.sort();
            for name in names {
                let tensor = &tensors[name];
                if let &[rows, cols] = tensor.shape.as_slice() {
                    let sigma = matrix_spectral_norm(&tensor.to_f32()?, rows, cols)?;
                    println!("{name}\t{sigma:.6}");
                } else {
                    log::warn!(
                        "skipping {name} (rank {}): only rank-2 tensors are checked without a plan",
                        tensor.shape.len()
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_normalize(
    weights: &std::path::Path,
    plan: &std::path::Path,
    output: &std::path::Path,
) -> Result<()> {
    let plan: NormalizePlan = load_plan(plan)?;
    let mut tensors = load_tensors(weights)?;

    for layer in &plan.layers {
        let tensor = lookup(&tensors, &layer.name)?;
        let sigma = layer_sigma(tensor, layer)?;
        let bound = plan.multiplier_for(layer);
        let ratio = bound / sigma;
        if ratio >= 1.0 {
            log::info!("{}: sigma {sigma:.6} already inside bound {bound}", layer.name);
            continue;
        }

        let rescaled: Vec<f32> = tensor.to_f32()?.iter().map(|v| v * ratio).collect();
        let shape = tensor.shape.clone();
        tensors.insert(
            layer.name.clone(),
            RawTensor::from_f32(shape, &rescaled),
        );
        log::info!("{}: sigma {sigma:.6} -> {bound}", layer.name);
    }

    save_tensors(output, &tensors)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn lookup<'a>(tensors: &'a HashMap<String, RawTensor>, name: &str) -> Result<&'a RawTensor> {
    match tensors.get(name) {
        Some(tensor) => Ok(tensor),
        None => bail!("tensor {name} not found in checkpoint"),
    }
}

fn layer_sigma(tensor: &RawTensor, layer: &LayerPlan) -> Result<f32> {
    let values = tensor.to_f32()?;
    match layer.kind {
        LayerKind::Dense => {
            let &[rows, cols] = tensor.shape.as_slice() else {
                bail!(
                    "{}: dense kernels must be rank 2, got shape {:?}",
                    layer.name,
                    tensor.shape
                );
            };
            matrix_spectral_norm(&values, rows, cols)
        }
        LayerKind::Conv2d => {
            let &[out_c, in_c, kh, kw] = tensor.shape.as_slice() else {
                bail!(
                    "{}: conv kernels must be rank 4, got shape {:?}",
                    layer.name,
                    tensor.shape
                );
            };
            let Some(input_size) = layer.input_size else {
                bail!("{}: conv kernels need input_size in the plan", layer.name);
            };
            conv2d_spectral_norm(&values, [out_c, in_c, kh, kw], input_size)
        }
    }
}
