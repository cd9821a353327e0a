use std::io::{BufRead, BufWriter, Read, Write};
use std::path::Path;

use super::IoError;
use crate::pointset::PointSet;

// cap on the pre-allocation driven by the header vertex count
const MAX_PREALLOC: usize = 1 << 20;

/// Scalar types allowed in a PLY vertex property.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Signed byte.
    Int8,
    /// Unsigned byte.
    UInt8,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    UInt32,
}

impl PlyDataType {
    /// Size in bytes of one value.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    // decode one little-endian value as f64
    fn read_le(&self, buf: &[u8]) -> f64 {
        match self {
            PlyDataType::Float32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PlyDataType::Float64 => f64::from_le_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            PlyDataType::Int8 => buf[0] as i8 as f64,
            PlyDataType::UInt8 => buf[0] as f64,
            PlyDataType::Int16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            PlyDataType::UInt16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            PlyDataType::Int32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            PlyDataType::UInt32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
        }
    }
}

/// Storage format declared in the PLY header.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyFormat {
    /// Whitespace separated text.
    Ascii,
    /// Packed little-endian records.
    BinaryLittleEndian,
}

/// A single property of the vertex element.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// Property name, e.g. `x` or `red`.
    pub name: String,
    /// Property scalar type.
    pub data_type: PlyDataType,
}

#[derive(Debug)]
struct PlyHeader {
    format: PlyFormat,
    vertex_count: usize,
    properties: Vec<PlyPropertyDefinition>,
}

impl PlyHeader {
    fn coordinate_indices(&self) -> Result<[usize; 3], IoError> {
        let find = |name: &'static str| {
            self.properties
                .iter()
                .position(|p| p.name == name)
                .ok_or(IoError::MissingCoordinate(name))
        };
        Ok([find("x")?, find("y")?, find("z")?])
    }
}

fn parse_data_type(type_str: &str) -> Result<PlyDataType, IoError> {
    match type_str {
        "float" | "float32" => Ok(PlyDataType::Float32),
        "double" | "float64" => Ok(PlyDataType::Float64),
        "char" | "int8" => Ok(PlyDataType::Int8),
        "uchar" | "uint8" => Ok(PlyDataType::UInt8),
        "short" | "int16" => Ok(PlyDataType::Int16),
        "ushort" | "uint16" => Ok(PlyDataType::UInt16),
        "int" | "int32" => Ok(PlyDataType::Int32),
        "uint" | "uint32" => Ok(PlyDataType::UInt32),
        _ => Err(IoError::UnsupportedProperty(type_str.to_string())),
    }
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, IoError> {
    let mut line = String::new();
    let mut format = None;
    let mut vertex_count = None;
    let mut in_vertex_element = false;
    let mut properties = Vec::new();

    reader.read_line(&mut line)?;
    if line.trim() != "ply" {
        return Err(IoError::MalformedHeader("missing `ply` magic".to_string()));
    }

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(IoError::MalformedHeader("missing `end_header`".to_string()));
        }
        let parts = line.split_whitespace().collect::<Vec<_>>();

        match parts.as_slice() {
            ["end_header"] => break,
            ["format", "ascii", ..] => format = Some(PlyFormat::Ascii),
            ["format", "binary_little_endian", ..] => {
                format = Some(PlyFormat::BinaryLittleEndian)
            }
            ["format", other, ..] => {
                return Err(IoError::UnsupportedProperty(other.to_string()));
            }
            ["element", name, count] => {
                in_vertex_element = *name == "vertex";
                if in_vertex_element {
                    let count = count
                        .parse()
                        .map_err(|_| IoError::ParseValue(count.to_string()))?;
                    vertex_count = Some(count);
                }
            }
            ["property", "list", ..] if in_vertex_element => {
                return Err(IoError::UnsupportedProperty(
                    "list property in vertex element".to_string(),
                ));
            }
            ["property", data_type, name] if in_vertex_element => {
                properties.push(PlyPropertyDefinition {
                    name: name.to_string(),
                    data_type: parse_data_type(data_type)?,
                });
            }
            // comments, obj_info and properties of other elements
            _ => {}
        }
    }

    Ok(PlyHeader {
        format: format.ok_or_else(|| IoError::MalformedHeader("missing format".to_string()))?,
        vertex_count: vertex_count
            .ok_or_else(|| IoError::MalformedHeader("missing vertex element".to_string()))?,
        properties,
    })
}

fn read_binary_vertices<R: Read>(
    reader: &mut R,
    header: &PlyHeader,
) -> Result<Vec<[f32; 3]>, IoError> {
    let [ix, iy, iz] = header.coordinate_indices()?;

    let mut offsets = Vec::with_capacity(header.properties.len());
    let mut record_size = 0;
    for p in &header.properties {
        offsets.push(record_size);
        record_size += p.data_type.size();
    }

    let read_coord = |buf: &[u8], i: usize| -> f32 {
        let p = &header.properties[i];
        p.data_type.read_le(&buf[offsets[i]..offsets[i] + p.data_type.size()]) as f32
    };

    let mut buffer = vec![0u8; record_size];
    let mut points = Vec::with_capacity(header.vertex_count.min(MAX_PREALLOC));
    for _ in 0..header.vertex_count {
        reader.read_exact(&mut buffer)?;
        points.push([
            read_coord(&buffer, ix),
            read_coord(&buffer, iy),
            read_coord(&buffer, iz),
        ]);
    }

    Ok(points)
}

fn read_ascii_vertices<R: BufRead>(
    reader: &mut R,
    header: &PlyHeader,
) -> Result<Vec<[f32; 3]>, IoError> {
    let indices = header.coordinate_indices()?;

    let mut line = String::new();
    let mut points = Vec::with_capacity(header.vertex_count.min(MAX_PREALLOC));
    while points.len() < header.vertex_count {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(IoError::MalformedHeader(format!(
                "expected {} vertices, found {}",
                header.vertex_count,
                points.len()
            )));
        }
        let values = line.split_whitespace().collect::<Vec<_>>();
        if values.is_empty() {
            continue;
        }

        let mut point = [0.0f32; 3];
        for (coord, &idx) in point.iter_mut().zip(indices.iter()) {
            let token = values
                .get(idx)
                .ok_or_else(|| IoError::ParseValue(line.trim().to_string()))?;
            *coord = token
                .parse::<f64>()
                .map_err(|_| IoError::ParseValue(token.to_string()))? as f32;
        }
        points.push(point);
    }

    Ok(points)
}

/// Read the vertex positions of a PLY file.
///
/// Supports the `ascii` and `binary_little_endian` formats. Vertex properties other
/// than `x`, `y`, `z` are skipped; elements after the vertex element are ignored.
pub fn read_ply(path: impl AsRef<Path>) -> Result<PointSet, IoError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let header = parse_header(&mut reader)?;

    let points = match header.format {
        PlyFormat::Ascii => read_ascii_vertices(&mut reader, &header)?,
        PlyFormat::BinaryLittleEndian => read_binary_vertices(&mut reader, &header)?,
    };

    log::debug!("read {} vertices from ply", points.len());

    Ok(PointSet::new(points))
}

/// Write a point set as a binary little-endian PLY file with float x, y, z.
pub fn write_ply_binary(path: impl AsRef<Path>, points: &PointSet) -> Result<(), IoError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        "ply\nformat binary_little_endian 1.0\nelement vertex {}\nproperty float x\nproperty float y\nproperty float z\nend_header\n",
        points.len()
    )?;

    for p in points.points() {
        for v in p {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    writer.flush()?;

    Ok(())
}
