use craft_types::PlacedPart;
use thiserror::Error;

/// Export parts as wavefront-style text: `g <name>`, then `v x y z` per vertex, then
/// `f i j k ...` per face with 1-based indices on a single running counter.
///
/// Parts, vertices and faces keep input order. Coordinates are written raw.
pub fn export_wireframe<'a>(parts: impl IntoIterator<Item = &'a PlacedPart>) -> String {
    let mut lines = Vec::new();
    let mut offset: u64 = 1;
    for part in parts {
        lines.push(format!("g {}", part.name));
        for v in &part.mesh.vertices {
            lines.push(format!("v {} {} {}", v.x, v.y, v.z));
        }
        for face in &part.mesh.faces {
            let idx: Vec<String> = face
                .vertices
                .iter()
                .map(|&i| (u64::from(i) + offset).to_string())
                .collect();
            lines.push(format!("f {}", idx.join(" ")));
        }
        offset += part.mesh.vertices.len() as u64;
    }
    lines.join("\n")
}

/// One group recovered from wireframe text, with local 0-based face indices.
#[derive(Clone, Debug, PartialEq)]
pub struct WireframeGroup {
    pub name: String,
    pub vertices: Vec<[f64; 3]>,
    pub faces: Vec<Vec<u32>>,
}

#[derive(Debug, Error, PartialEq)]
pub enum WireframeError {
    #[error("line {line}: {record} record before any group")]
    OutsideGroup { line: usize, record: char },
    #[error("line {line}: malformed record: {text}")]
    Malformed { line: usize, text: String },
    #[error("line {line}: index {index} is outside the current group")]
    IndexOutOfGroup { line: usize, index: u64 },
}

/// Inverse of [`export_wireframe`]: split on groups and undo the running offset.
pub fn parse_wireframe(text: &str) -> Result<Vec<WireframeGroup>, WireframeError> {
    let mut groups: Vec<WireframeGroup> = Vec::new();
    let mut offset: u64 = 1;

    for (n, raw) in text.lines().enumerate() {
        let line = n + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let malformed = || WireframeError::Malformed {
            line,
            text: raw.to_string(),
        };

        if let Some(name) = raw.strip_prefix("g ") {
            if let Some(prev) = groups.last() {
                offset += prev.vertices.len() as u64;
            }
            groups.push(WireframeGroup {
                name: name.to_string(),
                vertices: Vec::new(),
                faces: Vec::new(),
            });
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        match fields.next() {
            Some("v") => {
                let group = groups
                    .last_mut()
                    .ok_or(WireframeError::OutsideGroup { line, record: 'v' })?;
                let coords: Vec<f64> = fields
                    .map(str::parse)
                    .collect::<Result<_, _>>()
                    .map_err(|_| malformed())?;
                let [x, y, z] = coords[..] else {
                    return Err(malformed());
                };
                group.vertices.push([x, y, z]);
            }
            Some("f") => {
                let group = groups
                    .last_mut()
                    .ok_or(WireframeError::OutsideGroup { line, record: 'f' })?;
                let mut face = Vec::new();
                for field in fields {
                    let index: u64 = field.parse().map_err(|_| malformed())?;
                    let local = index
                        .checked_sub(offset)
                        .filter(|&l| l < group.vertices.len() as u64)
                        .ok_or(WireframeError::IndexOutOfGroup { line, index })?;
                    face.push(local as u32);
                }
                group.faces.push(face);
            }
            _ => return Err(malformed()),
        }
    }
    Ok(groups)
}
