//! Tagged binary persistence for trainable nets.
//!
//! Layout: magic, format version, game-type tag (length-prefixed UTF-8),
//! backend byte, layer descriptor list, then the parameter tensors as
//! little-endian `f32` in layer order. Saving always stores the CPU form
//! (a GPU-backed net is swapped first); loading yields a CPU net that the
//! caller may swap afterwards.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::ModelError;
use crate::model::Backend;
use crate::net::{LinearNet, LogitNet};

const MAGIC: &[u8; 4] = b"TBLA";

/// Current snapshot format version. Older or newer snapshots are rejected.
pub const FORMAT_VERSION: u32 = 1;

/// Kind tag of a persisted layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Dense,
}

impl LayerKind {
    fn tag(self) -> u8 {
        match self {
            LayerKind::Dense => 0,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, ModelError> {
        match tag {
            0 => Ok(LayerKind::Dense),
            other => Err(ModelError::Load(format!("unknown layer kind {other}"))),
        }
    }
}

/// Shape of one persisted layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerDescriptor {
    pub kind: LayerKind,
    pub input_len: u32,
    pub output_len: u32,
}

impl LayerDescriptor {
    /// Number of `f32` parameters this layer contributes to the tensor
    /// section.
    pub fn param_count(&self) -> usize {
        match self.kind {
            // Weights followed by bias.
            LayerKind::Dense => (self.input_len * self.output_len + self.output_len) as usize,
        }
    }
}

/// A net that can describe and reconstitute itself for persistence.
pub trait Snapshot: Sized {
    fn descriptors(&self) -> Vec<LayerDescriptor>;

    /// Append all parameters in layer order.
    fn write_params(&self, out: &mut Vec<f32>);

    /// Rebuild a CPU net from its descriptors and parameters.
    fn from_snapshot(layers: &[LayerDescriptor], params: &[f32]) -> Result<Self, ModelError>;
}

impl Snapshot for LinearNet {
    fn descriptors(&self) -> Vec<LayerDescriptor> {
        vec![LayerDescriptor {
            kind: LayerKind::Dense,
            input_len: self.input_len() as u32,
            output_len: self.output_len() as u32,
        }]
    }

    fn write_params(&self, out: &mut Vec<f32>) {
        out.extend_from_slice(self.weights());
        out.extend_from_slice(self.bias());
    }

    fn from_snapshot(layers: &[LayerDescriptor], params: &[f32]) -> Result<Self, ModelError> {
        let [layer] = layers else {
            return Err(ModelError::Load(format!(
                "expected a single dense layer, got {} layers",
                layers.len()
            )));
        };
        if layer.kind != LayerKind::Dense {
            return Err(ModelError::Load("expected a dense layer".into()));
        }
        if params.len() != layer.param_count() {
            return Err(ModelError::Load(format!(
                "dense layer expects {} parameters, got {}",
                layer.param_count(),
                params.len()
            )));
        }

        let weight_count = (layer.input_len * layer.output_len) as usize;
        let weights = params[..weight_count].to_vec();
        let bias = params[weight_count..].to_vec();
        LinearNet::from_parts(
            layer.input_len as usize,
            layer.output_len as usize,
            weights,
            bias,
        )
    }
}

fn io_err(err: io::Error) -> ModelError {
    ModelError::Load(err.to_string())
}

/// Serialize `net` into `writer` under `game_tag`.
///
/// A GPU-backed net is moved to the CPU first; the stored backend byte is
/// therefore always CPU.
pub fn save<N, W>(writer: &mut W, game_tag: &str, net: &N) -> Result<(), ModelError>
where
    N: LogitNet + Snapshot,
    W: Write,
{
    let cpu;
    let net = if net.backend() == Backend::Gpu {
        cpu = net.swap();
        &cpu
    } else {
        net
    };

    writer.write_all(MAGIC).map_err(io_err)?;
    writer
        .write_all(&FORMAT_VERSION.to_le_bytes())
        .map_err(io_err)?;

    let tag = game_tag.as_bytes();
    writer
        .write_all(&(tag.len() as u32).to_le_bytes())
        .map_err(io_err)?;
    writer.write_all(tag).map_err(io_err)?;
    writer.write_all(&[0u8]).map_err(io_err)?; // backend: CPU

    let layers = net.descriptors();
    writer
        .write_all(&(layers.len() as u32).to_le_bytes())
        .map_err(io_err)?;
    for layer in &layers {
        writer.write_all(&[layer.kind.tag()]).map_err(io_err)?;
        writer
            .write_all(&layer.input_len.to_le_bytes())
            .map_err(io_err)?;
        writer
            .write_all(&layer.output_len.to_le_bytes())
            .map_err(io_err)?;
    }

    let mut params = Vec::new();
    net.write_params(&mut params);
    writer
        .write_all(&(params.len() as u32).to_le_bytes())
        .map_err(io_err)?;
    for value in params {
        writer.write_all(&value.to_le_bytes()).map_err(io_err)?;
    }

    Ok(())
}

fn read_exact<R: Read, const LEN: usize>(reader: &mut R) -> Result<[u8; LEN], ModelError> {
    let mut buf = [0u8; LEN];
    reader.read_exact(&mut buf).map_err(io_err)?;
    Ok(buf)
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, ModelError> {
    Ok(u32::from_le_bytes(read_exact::<R, 4>(reader)?))
}

/// Deserialize a CPU net from `reader`, checking the tag against
/// `expected_tag`.
pub fn load<N, R>(reader: &mut R, expected_tag: &str) -> Result<N, ModelError>
where
    N: LogitNet + Snapshot,
    R: Read,
{
    let magic = read_exact::<R, 4>(reader)?;
    if &magic != MAGIC {
        return Err(ModelError::Load("not a model snapshot".into()));
    }

    let version = read_u32(reader)?;
    if version != FORMAT_VERSION {
        return Err(ModelError::Load(format!(
            "unsupported format version {version}"
        )));
    }

    let tag_len = read_u32(reader)? as usize;
    let mut tag = vec![0u8; tag_len];
    reader.read_exact(&mut tag).map_err(io_err)?;
    let tag = String::from_utf8(tag)
        .map_err(|_| ModelError::Load("game tag is not valid UTF-8".into()))?;
    if tag != expected_tag {
        return Err(ModelError::Load(format!(
            "snapshot is for game '{tag}', expected '{expected_tag}'"
        )));
    }

    let backend = read_exact::<R, 1>(reader)?[0];
    if backend != 0 {
        return Err(ModelError::Load(format!(
            "snapshot stored on unexpected backend {backend}"
        )));
    }

    let layer_count = read_u32(reader)? as usize;
    let mut layers = Vec::with_capacity(layer_count);
    for _ in 0..layer_count {
        let kind = LayerKind::from_tag(read_exact::<R, 1>(reader)?[0])?;
        let input_len = read_u32(reader)?;
        let output_len = read_u32(reader)?;
        layers.push(LayerDescriptor {
            kind,
            input_len,
            output_len,
        });
    }

    let param_count = read_u32(reader)? as usize;
    let expected: usize = layers.iter().map(|layer| layer.param_count()).sum();
    if param_count != expected {
        return Err(ModelError::Load(format!(
            "parameter count {param_count} does not match the layer list ({expected})"
        )));
    }

    let mut params = Vec::with_capacity(param_count);
    for _ in 0..param_count {
        params.push(f32::from_le_bytes(read_exact::<R, 4>(reader)?));
    }

    let mut trailing = [0u8; 1];
    match reader.read(&mut trailing).map_err(io_err)? {
        0 => {}
        _ => return Err(ModelError::Load("trailing bytes after snapshot".into())),
    }

    N::from_snapshot(&layers, &params)
}

/// Save `net` to a file at `path`.
pub fn save_file<N>(path: impl AsRef<Path>, game_tag: &str, net: &N) -> Result<(), ModelError>
where
    N: LogitNet + Snapshot,
{
    let mut file = File::create(path).map_err(io_err)?;
    save(&mut file, game_tag, net)
}

/// Load a CPU net from a file at `path`.
pub fn load_file<N>(path: impl AsRef<Path>, expected_tag: &str) -> Result<N, ModelError>
where
    N: LogitNet + Snapshot,
{
    let mut file = File::open(path).map_err(io_err)?;
    load(&mut file, expected_tag)
}
