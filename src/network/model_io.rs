//! Portable model serialization via `safetensors`.
//!
//! Safetensors survives libtorch version drift, which is why weights are
//! format-private to the backend while the checkpoint manager only records
//! a backend id. Writes here are NOT atomic by themselves; [`crate::checkpoint`]
//! wraps this with the temp-file-then-rename discipline that crash-safe
//! persistence requires.

use safetensors::serialize_to_file;
use safetensors::tensor::{Dtype, SafeTensors, TensorView};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tch::{nn, Kind, Tensor};

use crate::{ChessRlError, Result};

pub fn save_varstore(vs: &nn::VarStore, path: impl AsRef<Path>) -> Result<()> {
    let mut raw: HashMap<String, (Vec<usize>, Vec<u8>, Dtype)> = HashMap::new();
    for (name, tensor) in vs.variables() {
        let shape: Vec<usize> = tensor.size().iter().map(|&x| x as usize).collect();
        let (data, dtype) = tensor_to_bytes(&tensor)?;
        raw.insert(name, (shape, data, dtype));
    }

    let views: HashMap<String, TensorView<'_>> = raw
        .iter()
        .map(|(name, (shape, data, dtype))| {
            let view = TensorView::new(*dtype, shape.clone(), data)
                .map_err(|e| ChessRlError::Backend(format!("safetensors view {name}: {e}")))?;
            Ok((name.clone(), view))
        })
        .collect::<Result<_>>()?;

    serialize_to_file(views, &None, path.as_ref())
        .map_err(|e| ChessRlError::Backend(format!("safetensors write: {e}")))
}

pub fn load_varstore(vs: &mut nn::VarStore, path: impl AsRef<Path>) -> Result<()> {
    let mut file = File::open(path.as_ref())?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;

    let tensors = SafeTensors::deserialize(&buffer)
        .map_err(|e| ChessRlError::Backend(format!("safetensors parse: {e}")))?;

    for (name, mut var) in vs.variables() {
        match tensors.tensor(&name) {
            Ok(view) => {
                let loaded = tensor_view_to_tensor(&view)?;
                tch::no_grad(|| {
                    var.copy_(&loaded);
                });
            }
            Err(_) => {
                return Err(ChessRlError::Backend(format!(
                    "safetensors load: tensor '{name}' missing from {}",
                    path.as_ref().display()
                )))
            }
        }
    }
    Ok(())
}

fn tensor_to_bytes(tensor: &Tensor) -> Result<(Vec<u8>, Dtype)> {
    let tensor = tensor.to_device(tch::Device::Cpu).flatten(0, -1).contiguous();
    match tensor.kind() {
        Kind::Float => {
            let data: Vec<f32> = Vec::<f32>::try_from(&tensor)
                .map_err(|e| ChessRlError::Backend(format!("tensor export: {e}")))?;
            Ok((data.iter().flat_map(|x| x.to_le_bytes()).collect(), Dtype::F32))
        }
        Kind::Double => {
            let data: Vec<f64> = Vec::<f64>::try_from(&tensor)
                .map_err(|e| ChessRlError::Backend(format!("tensor export: {e}")))?;
            Ok((data.iter().flat_map(|x| x.to_le_bytes()).collect(), Dtype::F64))
        }
        other => Err(ChessRlError::Backend(format!(
            "unsupported tensor kind for persistence: {other:?}"
        ))),
    }
}

fn tensor_view_to_tensor(view: &TensorView) -> Result<Tensor> {
    let shape: Vec<i64> = view.shape().iter().map(|&x| x as i64).collect();
    let data = view.data();
    match view.dtype() {
        Dtype::F32 => {
            let floats: Vec<f32> = data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            Ok(Tensor::from_slice(&floats).reshape(&shape))
        }
        Dtype::F64 => {
            let doubles: Vec<f64> = data
                .chunks_exact(8)
                .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                .collect();
            Ok(Tensor::from_slice(&doubles).reshape(&shape))
        }
        other => Err(ChessRlError::Backend(format!("unsupported dtype on load: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn save_load_roundtrips_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");

        let vs1 = nn::VarStore::new(Device::Cpu);
        let _l = nn::linear(&vs1.root() / "l", 10, 5, Default::default());
        save_varstore(&vs1, &path).unwrap();

        let mut vs2 = nn::VarStore::new(Device::Cpu);
        let _l2 = nn::linear(&vs2.root() / "l", 10, 5, Default::default());
        load_varstore(&mut vs2, &path).unwrap();

        for (name, t1) in vs1.variables() {
            let t2 = vs2.variables().into_iter().find(|(n, _)| n == &name).unwrap().1;
            assert!(t1.allclose(&t2, 1e-6, 1e-6, false));
        }
    }

    #[test]
    fn load_rejects_missing_tensor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.safetensors");
        let vs1 = nn::VarStore::new(Device::Cpu);
        let _l = nn::linear(&vs1.root() / "a", 4, 4, Default::default());
        save_varstore(&vs1, &path).unwrap();

        let mut vs2 = nn::VarStore::new(Device::Cpu);
        let _l2 = nn::linear(&vs2.root() / "b", 4, 4, Default::default());
        assert!(load_varstore(&mut vs2, &path).is_err());
    }
}
