//! Parameter store helpers: seeded initialisation, transfer and the optimizer

use crate::common::{LayerError, LayerResult};
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Variables whose name starts with `prefix`, in name order
pub fn named_parameters(varmap: &VarMap, prefix: &str) -> LayerResult<BTreeMap<String, Var>> {
    let vars = varmap.data().lock().map_err(|_| LayerError::Parameter {
        name: prefix.to_string(),
        reason: "parameter store lock poisoned".to_string(),
    })?;
    Ok(vars
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .map(|(name, var)| (name.clone(), var.clone()))
        .collect())
}

pub fn parameter_count(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|v| v.elem_count()).sum()
}

/// Re-draw every `*.weight` and `*.bias` uniformly in ±1/√fan_in from a
/// seeded RNG, visiting variables in name order.
///
/// Variables that are neither (e.g. normalization constants) keep the value
/// they were created with.
pub fn seed_parameters(varmap: &VarMap, seed: u64) -> LayerResult<()> {
    let vars = named_parameters(varmap, "")?;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut seeded = 0;
    for (name, var) in &vars {
        let Some(fan_in) = fan_in(&vars, name)? else {
            continue;
        };
        let bound = 1.0 / (fan_in.max(1) as f32).sqrt();
        let values: Vec<f32> = (0..var.elem_count()).map(|_| rng.gen_range(-bound..bound)).collect();
        var.set(&Tensor::from_vec(values, var.dims().to_vec(), var.device())?.to_dtype(var.dtype())?)?;
        seeded += 1;
    }
    debug!("Seeded {} of {} parameters with seed {}", seeded, vars.len(), seed);
    Ok(())
}

fn fan_in(vars: &BTreeMap<String, Var>, name: &str) -> LayerResult<Option<usize>> {
    let weight = if name.ends_with(".weight") {
        vars.get(name)
    } else if let Some(stem) = name.strip_suffix(".bias") {
        vars.get(&format!("{stem}.weight"))
    } else {
        None
    };
    match weight {
        Some(w) => Ok(Some(w.dim(1)?)),
        None => Ok(None),
    }
}

/// Overwrite every variable in `targets` with the tensor of the same name
pub fn assign_parameters(targets: &BTreeMap<String, Var>, source: &HashMap<String, Tensor>) -> LayerResult<()> {
    for (name, var) in targets {
        let Some(value) = source.get(name) else {
            return Err(LayerError::Parameter {
                name: name.clone(),
                reason: "missing from source".to_string(),
            });
        };
        if value.dims() != var.dims() {
            return Err(LayerError::Parameter {
                name: name.clone(),
                reason: format!("shape {:?} cannot replace {:?}", value.dims(), var.dims()),
            });
        }
        var.set(&value.to_device(var.device())?.to_dtype(var.dtype())?)?;
    }
    Ok(())
}

/// Adam (Kingma & Ba, 2014): `AdamW` with weight decay switched off
pub fn adam(vars: Vec<Var>, learning_rate: f64) -> LayerResult<AdamW> {
    let params = ParamsAdamW {
        lr: learning_rate,
        weight_decay: 0.0,
        ..ParamsAdamW::default()
    };
    Ok(AdamW::new(vars, params)?)
}
