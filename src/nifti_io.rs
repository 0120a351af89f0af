//! NIfTI-1 image I/O
//!
//! Masks are read from .nii or .nii.gz (gzip is auto-detected) into
//! [`Volume`]s; scalar images and deformation fields are written as
//! float32 NIfTI-1, gzip compressed when the path ends in `.nii.gz`.

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, IxDyn};
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{Result, VirtueError};
use crate::field::DisplacementField;
use crate::volume::{Mask, Volume};

/// Header (348) plus the empty extension block
const DATA_OFFSET: usize = 352;

/// NIFTI_INTENT_NONE. Warps hold absolute positions, not the relative
/// vectors NIFTI_INTENT_DISPVECT (1006) would announce.
pub const INTENT_NONE: i16 = 0;

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Header summary for error messages
fn header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("file too small ({} bytes, need at least 348)", bytes.len());
    }
    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);
    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

fn parse_object(bytes: &[u8]) -> Result<InMemNiftiObject> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes))).map_err(|e| {
            let mut decompressed = Vec::new();
            let info = match std::io::Read::read_to_end(&mut GzDecoder::new(Cursor::new(bytes)), &mut decompressed) {
                Ok(_) => header_info(&decompressed),
                Err(_) => "could not decompress".to_string(),
            };
            VirtueError::nifti(format!("failed to read gzipped NIfTI: {} ({})", e, info))
        })
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| VirtueError::nifti(format!("failed to read NIfTI: {} ({})", e, header_info(bytes))))
    }
}

/// Voxel-to-scanner affine, sform first, else voxel scaling
fn header_affine(header: &NiftiHeader) -> [f64; 16] {
    if header.sform_code > 0 {
        let (s, t, u) = (&header.srow_x, &header.srow_y, &header.srow_z);
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let p = &header.pixdim;
        [
            p[1] as f64, 0.0, 0.0, 0.0,
            0.0, p[2] as f64, 0.0, 0.0,
            0.0, 0.0, p[3] as f64, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// Decode an image, keeping up to `max_frames` volumes along the 4th axis
fn decode(bytes: &[u8], max_frames: usize) -> Result<(Vec<f64>, (usize, usize, usize, usize), NiftiHeader)> {
    let obj = parse_object(bytes)?;
    let header = obj.header().clone();
    if header.dim[0] < 3 {
        return Err(VirtueError::nifti(format!("expected at least a 3D image, got {}D", header.dim[0])));
    }

    let array: Array<f64, IxDyn> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| VirtueError::nifti(format!("failed to convert image data: {}", e)))?;
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(VirtueError::nifti(format!("expected at least a 3D array, got {}D", shape.len())));
    }

    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let nt = if shape.len() >= 4 { shape[3].min(max_frames) } else { 1 };
    let mut data = Vec::with_capacity(nx * ny * nz * nt);
    for t in 0..nt {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let v = if shape.len() >= 4 { array[[i, j, k, t].as_slice()] } else { array[[i, j, k].as_slice()] };
                    data.push(v);
                }
            }
        }
    }
    Ok((data, (nx, ny, nz, nt), header))
}

/// Load a 3D scalar image from bytes; 4D images yield their first volume
pub fn load_volume(bytes: &[u8]) -> Result<Volume<f64>> {
    let (data, (nx, ny, nz, _), header) = decode(bytes, 1)?;
    let voxel_size = (header.pixdim[1] as f64, header.pixdim[2] as f64, header.pixdim[3] as f64);
    Volume::new(data, (nx, ny, nz), voxel_size, header_affine(&header))
}

/// Read a 3D scalar image from disk
pub fn read_volume(path: &Path) -> Result<Volume<f64>> {
    let bytes = std::fs::read(path).map_err(|e| VirtueError::io(path, e))?;
    load_volume(&bytes).map_err(|e| match e {
        VirtueError::Nifti(msg) => VirtueError::nifti(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

/// Read a mask image, binarised at `threshold`
pub fn read_mask(path: &Path, threshold: f64) -> Result<Mask> {
    Ok(read_volume(path)?.to_mask(threshold))
}

/// Encode float32 NIfTI-1 bytes for a 3D or 4D image
///
/// `data` is Fortran ordered with the 4th axis slowest.
pub fn encode_nifti(
    data: &[f64],
    dims: (usize, usize, usize, usize),
    voxel_size: (f64, f64, f64),
    affine: &[f64; 16],
    intent_code: i16,
) -> Result<Vec<u8>> {
    let (nx, ny, nz, nt) = dims;
    if data.len() != nx * ny * nz * nt {
        return Err(VirtueError::nifti(format!(
            "{} values do not fill an image of {:?}",
            data.len(),
            dims
        )));
    }
    for d in [nx, ny, nz, nt] {
        if d == 0 || d > i16::MAX as usize {
            return Err(VirtueError::nifti(format!("dimension {} out of NIfTI-1 range", d)));
        }
    }

    let mut header = [0u8; 348];
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    let ndim: i16 = if nt > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, nt as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    header[68..70].copy_from_slice(&intent_code.to_le_bytes());
    // FLOAT32
    header[70..72].copy_from_slice(&16i16.to_le_bytes());
    header[72..74].copy_from_slice(&32i16.to_le_bytes());

    let (vx, vy, vz) = voxel_size;
    let pixdim: [f32; 8] = [1.0, vx as f32, vy as f32, vz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    header[108..112].copy_from_slice(&(DATA_OFFSET as f32).to_le_bytes());
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(DATA_OFFSET + data.len() * 4);
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(&[0u8; 4]);
    for &val in data {
        buffer.extend_from_slice(&(val as f32).to_le_bytes());
    }
    Ok(buffer)
}

fn write_bytes(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let bytes = if path.to_string_lossy().ends_with(".nii.gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes).map_err(|e| VirtueError::io(path, e))?;
        encoder.finish().map_err(|e| VirtueError::io(path, e))?
    } else {
        bytes
    };
    std::fs::write(path, bytes).map_err(|e| VirtueError::io(path, e))
}

/// Write a scalar image
pub fn write_volume(path: &Path, volume: &Volume<f64>) -> Result<()> {
    let (nx, ny, nz) = volume.dims;
    let bytes = encode_nifti(&volume.data, (nx, ny, nz, 1), volume.voxel_size, &volume.affine, INTENT_NONE)?;
    write_bytes(path, bytes)
}

/// Affine of a sub-grid starting at voxel `offset`
pub fn shifted_affine(affine: &[f64; 16], offset: (usize, usize, usize)) -> [f64; 16] {
    let (ox, oy, oz) = (offset.0 as f64, offset.1 as f64, offset.2 as f64);
    let mut out = *affine;
    for row in 0..3 {
        let r = row * 4;
        out[r + 3] += affine[r] * ox + affine[r + 1] * oy + affine[r + 2] * oz;
    }
    out
}

/// Write a deformation field as a 4D image of absolute scanner positions
///
/// The image covers the field's region, with `grid`'s affine shifted to the
/// region's first voxel. Volume t holds the t-th coordinate.
pub fn write_deformation_field<T>(path: &Path, field: &DisplacementField, grid: &Volume<T>) -> Result<()> {
    if field.grid_dims != grid.dims {
        return Err(VirtueError::geometry(format!(
            "field grid {:?} does not match image grid {:?}",
            field.grid_dims, grid.dims
        )));
    }
    let positions = field.to_scanner_positions(grid);
    let n = positions.len();
    let mut data = vec![0.0; n * 3];
    for (i, p) in positions.iter().enumerate() {
        data[i] = p[0];
        data[n + i] = p[1];
        data[2 * n + i] = p[2];
    }

    let (rx, ry, rz) = field.region.dims;
    let affine = shifted_affine(&grid.affine, field.region.offset);
    let bytes = encode_nifti(&data, (rx, ry, rz, 3), grid.voxel_size, &affine, INTENT_NONE)?;
    write_bytes(path, bytes)
}

/// Read a 3-volume vector image back as per-voxel vectors
pub fn read_vector_field(path: &Path) -> Result<(Vec<[f64; 3]>, (usize, usize, usize), [f64; 16])> {
    let bytes = std::fs::read(path).map_err(|e| VirtueError::io(path, e))?;
    let (data, (nx, ny, nz, nt), header) = decode(&bytes, 3)?;
    if nt != 3 {
        return Err(VirtueError::nifti(format!("expected 3 vector components, found {}", nt)));
    }
    let n = nx * ny * nz;
    let vectors = (0..n).map(|i| [data[i], data[n + i], data[2 * n + i]]).collect();
    Ok((vectors, (nx, ny, nz), header_affine(&header)))
}
