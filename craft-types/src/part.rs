use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Join key shared by every stage. Compared by exact string equality.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartName(String);

#[derive(Debug, Error, PartialEq)]
#[error("part name must not be empty")]
pub struct EmptyPartName;

impl PartName {
    pub fn new(name: impl Into<String>) -> Result<Self, EmptyPartName> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EmptyPartName);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartName {
    type Error = EmptyPartName;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PartName::new(value)
    }
}

impl From<PartName> for String {
    fn from(value: PartName) -> Self {
        value.0
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for PartName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// One physical component as detected from the photograph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub name: PartName,
    #[serde(default)]
    pub shape: String,
    #[serde(default)]
    pub adjacent: Vec<PartName>,
    #[serde(default)]
    pub material: String,
    /// Shape-dependent dimensions (radius/height, width/depth/height, thickness/width/length).
    #[serde(default)]
    pub size: BTreeMap<String, f64>,
    #[serde(default)]
    pub shape_note: String,
}

/// Row returned by the parts-list read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartSummary {
    pub part_id: usize,
    pub part_name: PartName,
    pub size: BTreeMap<String, f64>,
}

impl PartSummary {
    pub fn from_parts(parts: &[Part]) -> Vec<PartSummary> {
        parts
            .iter()
            .enumerate()
            .map(|(i, p)| PartSummary {
                part_id: i + 1,
                part_name: p.name.clone(),
                size: p.size.clone(),
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Local index within the owning part.
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Face {
    #[serde(default)]
    pub name: String,
    pub vertices: Vec<u32>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub faces: Vec<Face>,
}

/// A part after 3D placement. Immutable once the placement stage wrote it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedPart {
    pub name: PartName,
    #[serde(default, alias = "type")]
    pub shape: String,
    #[serde(flatten)]
    pub mesh: Mesh,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_note: Option<String>,
}

impl PlacedPart {
    pub fn new(name: PartName, shape: impl Into<String>, mesh: Mesh) -> Self {
        Self {
            name,
            shape: shape.into(),
            mesh,
            material: None,
            shape_note: None,
        }
    }
}

/// Per-part fabrication entry. `part_name` is a comma-joined group of part names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FabricationStep {
    pub part_name: String,
    #[serde(default)]
    pub description: String,
}

impl FabricationStep {
    pub fn group_names(&self) -> Vec<&str> {
        self.part_name
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Normalized group key: trimmed names joined by a bare comma.
    pub fn group_key(&self) -> String {
        self.group_names().join(",")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssemblyStep {
    pub step: u32,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parts_already_used: Vec<PartName>,
}

#[derive(Debug, Error, PartialEq)]
pub enum StepError {
    #[error("assembly step at position {position} is numbered {found}, expected {expected}")]
    NonContiguous {
        position: usize,
        expected: u32,
        found: u32,
    },
}

impl AssemblyStep {
    /// Steps must be numbered 1..=n in list order; consumers index by `step - 1`.
    pub fn check_sequence(steps: &[AssemblyStep]) -> Result<(), StepError> {
        for (position, s) in steps.iter().enumerate() {
            let expected = position as u32 + 1;
            if s.step != expected {
                return Err(StepError::NonContiguous {
                    position,
                    expected,
                    found: s.step,
                });
            }
        }
        Ok(())
    }

    /// Step numbers whose `parts_already_used` drops a part used by the previous step.
    pub fn non_cumulative_steps(steps: &[AssemblyStep]) -> Vec<u32> {
        steps
            .windows(2)
            .filter(|w| {
                let now: HashSet<&PartName> = w[1].parts_already_used.iter().collect();
                w[0].parts_already_used.iter().any(|p| !now.contains(p))
            })
            .map(|w| w[1].step)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(n: u32, parts: &[&str]) -> AssemblyStep {
        AssemblyStep {
            step: n,
            description: String::new(),
            parts_already_used: parts.iter().map(|p| PartName::new(*p).unwrap()).collect(),
        }
    }

    #[test]
    fn empty_names_are_rejected_on_decode() {
        let res: Result<Part, _> = serde_json::from_str(r#"{"name": "  "}"#);
        assert!(res.is_err());
    }

    #[test]
    fn placed_part_reads_type_alias_and_flat_mesh() {
        let json = r#"{
            "name": "天板",
            "type": "cylinder",
            "vertices": [{"id": 0, "x": 0.0, "y": 0.0, "z": 42.0}],
            "faces": []
        }"#;
        let part: PlacedPart = serde_json::from_str(json).unwrap();
        assert_eq!(part.name.as_str(), "天板");
        assert_eq!(part.shape, "cylinder");
        assert_eq!(part.mesh.vertices.len(), 1);
        assert!(part.material.is_none());
    }

    #[test]
    fn fabrication_group_is_split_and_trimmed() {
        let s = FabricationStep {
            part_name: "脚1, 脚2,,".into(),
            description: "cut".into(),
        };
        assert_eq!(s.group_names(), vec!["脚1", "脚2"]);
        assert_eq!(s.group_key(), "脚1,脚2");
    }

    #[test]
    fn step_numbers_must_be_contiguous() {
        assert!(AssemblyStep::check_sequence(&[step(1, &[]), step(2, &[])]).is_ok());
        let err = AssemblyStep::check_sequence(&[step(1, &[]), step(3, &[])]).unwrap_err();
        assert_eq!(
            err,
            StepError::NonContiguous {
                position: 1,
                expected: 2,
                found: 3
            }
        );
        assert!(AssemblyStep::check_sequence(&[step(0, &[])]).is_err());
    }

    #[test]
    fn dropped_parts_are_reported() {
        let steps = [step(1, &["a"]), step(2, &["a", "b"]), step(3, &["b"])];
        assert_eq!(AssemblyStep::non_cumulative_steps(&steps), vec![3]);
    }

    #[test]
    fn summary_numbers_parts_from_one() {
        let parts: Vec<Part> = serde_json::from_str(
            r#"[{"name": "leg1", "size": {"width": 4}}, {"name": "leg2"}]"#,
        )
        .unwrap();
        let summary = PartSummary::from_parts(&parts);
        assert_eq!(summary[0].part_id, 1);
        assert_eq!(summary[1].part_id, 2);
        assert_eq!(summary[0].size.get("width"), Some(&4.0));
    }
}
