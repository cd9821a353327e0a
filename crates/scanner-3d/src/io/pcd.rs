use std::io::{BufRead, BufWriter, Read, Write};
use std::path::Path;

use super::IoError;
use crate::pointset::PointSet;

const MAX_POINT_STEP: usize = 1024;

// cap on the pre-allocation driven by the header point count
const MAX_PREALLOC: usize = 1 << 20;

/// Storage format declared by the `DATA` line.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PcdFormat {
    /// Whitespace separated text, one point per line.
    Ascii,
    /// Packed little-endian records.
    Binary,
}

#[derive(Debug)]
struct PcdField {
    name: String,
    // byte offset within a binary record
    offset: usize,
    // first value index within an ascii line
    column: usize,
    size: usize,
    kind: char,
}

#[derive(Debug)]
struct PcdLayout {
    format: PcdFormat,
    fields: Vec<PcdField>,
    point_step: usize,
    num_points: usize,
}

impl PcdLayout {
    fn coordinate(&self, name: &'static str) -> Result<&PcdField, IoError> {
        let field = self
            .fields
            .iter()
            .find(|f| f.name == name)
            .ok_or(IoError::MissingCoordinate(name))?;
        if field.kind != 'F' || !(field.size == 4 || field.size == 8) {
            return Err(IoError::UnsupportedProperty(format!(
                "coordinate `{}` of type {}{}",
                name, field.kind, field.size
            )));
        }
        Ok(field)
    }
}

fn parse_list<T: std::str::FromStr>(values: &[&str]) -> Result<Vec<T>, IoError> {
    values
        .iter()
        .map(|v| v.parse::<T>().map_err(|_| IoError::ParseValue(v.to_string())))
        .collect()
}

fn parse_layout<R: BufRead>(reader: &mut R) -> Result<PcdLayout, IoError> {
    let mut names = Vec::new();
    let mut sizes = Vec::new();
    let mut kinds = Vec::new();
    let mut counts = Vec::new();
    let mut num_points = None;
    let mut line = String::new();

    let format = loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(IoError::MalformedHeader("missing `DATA` line".to_string()));
        }
        let parts = line.split_whitespace().collect::<Vec<_>>();

        match parts.as_slice() {
            ["DATA", "ascii"] => break PcdFormat::Ascii,
            ["DATA", "binary"] => break PcdFormat::Binary,
            ["DATA", other, ..] => return Err(IoError::UnsupportedProperty(other.to_string())),
            ["FIELDS", rest @ ..] => names = rest.iter().map(|s| s.to_string()).collect(),
            ["SIZE", rest @ ..] => sizes = parse_list::<usize>(rest)?,
            ["COUNT", rest @ ..] => counts = parse_list::<usize>(rest)?,
            ["TYPE", rest @ ..] => {
                kinds = rest
                    .iter()
                    .map(|t| t.chars().next().unwrap_or('?'))
                    .collect()
            }
            ["POINTS", count] => {
                num_points = Some(
                    count
                        .parse::<usize>()
                        .map_err(|_| IoError::ParseValue(count.to_string()))?,
                )
            }
            // comments, VERSION, WIDTH, HEIGHT and VIEWPOINT
            _ => {}
        }
    };

    if names.is_empty()
        || sizes.len() != names.len()
        || kinds.len() != names.len()
        || (!counts.is_empty() && counts.len() != names.len())
    {
        return Err(IoError::MalformedHeader(
            "FIELDS, SIZE, TYPE and COUNT disagree".to_string(),
        ));
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut offset = 0usize;
    let mut column = 0usize;
    for (i, name) in names.into_iter().enumerate() {
        // COUNT defaults to one value per field
        let count = counts.get(i).copied().unwrap_or(1);
        fields.push(PcdField {
            name,
            offset,
            column,
            size: sizes[i],
            kind: kinds[i],
        });
        offset = sizes[i]
            .checked_mul(count)
            .and_then(|bytes| offset.checked_add(bytes))
            .filter(|&step| step <= MAX_POINT_STEP)
            .ok_or_else(|| IoError::MalformedHeader("point record too large".to_string()))?;
        column += count;
    }

    Ok(PcdLayout {
        format,
        fields,
        point_step: offset,
        num_points: num_points
            .ok_or_else(|| IoError::MalformedHeader("missing POINTS".to_string()))?,
    })
}

fn read_float(buf: &[u8], field: &PcdField) -> f32 {
    let bytes = &buf[field.offset..field.offset + field.size];
    match field.size {
        8 => f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]) as f32,
        _ => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

fn read_binary_points<R: Read>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f32; 3]>, IoError> {
    let fields = [
        layout.coordinate("x")?,
        layout.coordinate("y")?,
        layout.coordinate("z")?,
    ];

    let mut buffer = vec![0u8; layout.point_step];
    let mut points = Vec::with_capacity(layout.num_points.min(MAX_PREALLOC));
    for _ in 0..layout.num_points {
        reader.read_exact(&mut buffer)?;
        points.push(fields.map(|f| read_float(&buffer, f)));
    }
    Ok(points)
}

fn read_ascii_points<R: BufRead>(
    reader: &mut R,
    layout: &PcdLayout,
) -> Result<Vec<[f32; 3]>, IoError> {
    let columns = [
        layout.coordinate("x")?.column,
        layout.coordinate("y")?.column,
        layout.coordinate("z")?.column,
    ];

    let mut line = String::new();
    let mut points = Vec::with_capacity(layout.num_points.min(MAX_PREALLOC));
    while points.len() < layout.num_points {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(IoError::MalformedHeader(format!(
                "expected {} points, found {}",
                layout.num_points,
                points.len()
            )));
        }
        let values = line.split_whitespace().collect::<Vec<_>>();
        if values.is_empty() {
            continue;
        }

        let mut point = [0.0f32; 3];
        for (coord, &col) in point.iter_mut().zip(columns.iter()) {
            let token = values
                .get(col)
                .ok_or_else(|| IoError::ParseValue(line.trim().to_string()))?;
            *coord = token
                .parse::<f64>()
                .map_err(|_| IoError::ParseValue(token.to_string()))? as f32;
        }
        points.push(point);
    }
    Ok(points)
}

/// Read the point positions of a PCD file.
///
/// Supports `DATA ascii` and `DATA binary`; `binary_compressed` is rejected. The `x`,
/// `y`, `z` fields must be floats of 4 or 8 bytes and are located by byte offset, so
/// any other fields (rgb, normals, intensity) are skipped.
pub fn read_pcd(path: impl AsRef<Path>) -> Result<PointSet, IoError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let layout = parse_layout(&mut reader)?;

    let points = match layout.format {
        PcdFormat::Ascii => read_ascii_points(&mut reader, &layout)?,
        PcdFormat::Binary => read_binary_points(&mut reader, &layout)?,
    };

    log::debug!("read {} points from pcd", points.len());

    Ok(PointSet::new(points))
}

/// Write a point set as a binary PCD file with float x, y, z.
pub fn write_pcd_binary(path: impl AsRef<Path>, points: &PointSet) -> Result<(), IoError> {
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        "# .PCD v0.7 - Point Cloud Data file format\nVERSION 0.7\nFIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nCOUNT 1 1 1\nWIDTH {0}\nHEIGHT 1\nVIEWPOINT 0 0 0 1 0 0 0\nPOINTS {0}\nDATA binary\n",
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
