//! Scene descriptors: the validated build parameters of one panorama.
//!
//! Descriptors are YAML mappings, one per panorama:
//!
//! ```yaml
//! pname: harbour
//! input: 2024/harbour.tif      # literal path, or relative to the panorama root
//! panotype: cylinder
//! hfov: 360
//! vfov: 60                     # optional
//! voffset: -5                  # optional
//! hlookat: 30                  # optional view overrides
//! vlookat: 0
//! fov: 90
//! preview: 2024/harbour_small.jpg
//! twittercard: 2024/harbour_tc.jpg
//! title: The harbour at dawn   # optional, used by the HTML page
//! description: Looking east
//! hotspots:
//!   - { ath: 10, atv: -5, description: Lighthouse }
//! ```
//!
//! Loading is split in two: [`RawDescriptor`] accepts anything shaped like a
//! mapping, then [`SceneDescriptor::load`] checks every field at once and
//! reports *all* problems by name rather than stopping at the first.
//!
//! Scalars may be written as strings or numbers; both reach the tiling tool
//! exactly as written in the file. An empty value counts as absent.

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("cannot read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{}", join_problems(.problems))]
    Invalid { problems: Vec<Problem> },
}

/// One thing wrong with a descriptor, always naming the field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    #[error("missing required field `{0}`")]
    Missing(String),
    #[error("field `{field}` is malformed: {reason}")]
    Malformed { field: String, reason: String },
    #[error("field `{field}`: no such file {} or {}", .literal.display(), .under_root.display())]
    Unresolved {
        field: String,
        literal: PathBuf,
        under_root: PathBuf,
    },
}

fn join_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A YAML scalar kept exactly as written, whether it reads as text or as a
/// number: `hfov: 360.0` reaches the tool as `360.0`, not `360`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar(String);

impl Scalar {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_yaml hands plain scalars to `deserialize_str` as their source
        // text; the numeric visits only cover other formats.
        deserializer.deserialize_str(ScalarVisitor)
    }
}

struct ScalarVisitor;

impl Visitor<'_> for ScalarVisitor {
    type Value = Scalar;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string or number")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Scalar, E> {
        Ok(Scalar(v))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Scalar, E> {
        Ok(Scalar(v.to_string()))
    }
}

/// Unvalidated descriptor as read from YAML. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawDescriptor {
    pub pname: Option<Scalar>,
    pub input: Option<Scalar>,
    pub panotype: Option<Scalar>,
    pub hfov: Option<Scalar>,
    pub vfov: Option<Scalar>,
    pub voffset: Option<Scalar>,
    pub hlookat: Option<Scalar>,
    pub vlookat: Option<Scalar>,
    pub fov: Option<Scalar>,
    pub preview: Option<Scalar>,
    pub twittercard: Option<Scalar>,
    pub title: Option<Scalar>,
    pub description: Option<Scalar>,
    pub hotspots: Option<Vec<RawHotspot>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawHotspot {
    pub ath: Option<Scalar>,
    pub atv: Option<Scalar>,
    pub description: Option<Scalar>,
}

impl RawDescriptor {
    /// Parse a descriptor from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// The `pname` as written, if it is a non-empty scalar.
    pub fn pname_hint(&self) -> Option<String> {
        text(&self.pname)
    }
}

/// Optional `<view>` attribute overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOverrides {
    pub hlookat: Option<String>,
    pub vlookat: Option<String>,
    pub fov: Option<String>,
}

impl ViewOverrides {
    /// Overrides in the fixed application order, with their attribute names.
    pub fn entries(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("hlookat", self.hlookat.as_deref()),
            ("vlookat", self.vlookat.as_deref()),
            ("fov", self.fov.as_deref()),
        ]
    }
}

/// One interactive marker: angular position plus hover text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hotspot {
    pub ath: String,
    pub atv: String,
    pub description: String,
}

/// A validated panorama build request. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDescriptor {
    /// Output identifier; names every artifact in the output directory.
    pub pname: String,
    /// Resolved source panorama image.
    pub input: PathBuf,
    pub panotype: String,
    pub hfov: String,
    pub vfov: Option<String>,
    pub voffset: Option<String>,
    pub view: ViewOverrides,
    /// Resolved preview image, copied to `<pname>_small.jpg`.
    pub preview: Option<PathBuf>,
    /// Resolved twitter-card image, copied to `<pname>_tc.jpg`.
    pub twittercard: Option<PathBuf>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub hotspots: Vec<Hotspot>,
    /// The descriptor file this was loaded from, if any. Declared as a
    /// source of the scene document alongside `input`.
    pub origin: Option<PathBuf>,
}

impl SceneDescriptor {
    /// Validate a raw descriptor, resolving image references against
    /// `panorama_root`. Every problem found is reported.
    pub fn load(raw: RawDescriptor, panorama_root: &Path) -> Result<Self, ValidationError> {
        let mut problems = Vec::new();

        let pname = required(&raw.pname, "pname", &mut problems);
        if let Some(p) = &pname
            && let Some(bad) = p.chars().find(|c| matches!(c, '/' | '\\' | '"' | '\''))
        {
            problems.push(Problem::Malformed {
                field: "pname".into(),
                reason: format!("must not contain {bad:?}"),
            });
        }

        let input = required(&raw.input, "input", &mut problems)
            .and_then(|r| resolve_or_record(&r, "input", panorama_root, &mut problems));
        let panotype = required(&raw.panotype, "panotype", &mut problems);
        let hfov = required(&raw.hfov, "hfov", &mut problems);

        let preview = text(&raw.preview)
            .and_then(|r| resolve_or_record(&r, "preview", panorama_root, &mut problems));
        let twittercard = text(&raw.twittercard)
            .and_then(|r| resolve_or_record(&r, "twittercard", panorama_root, &mut problems));

        let mut hotspots = Vec::new();
        for (i, h) in raw.hotspots.iter().flatten().enumerate() {
            let ath = required(&h.ath, &format!("hotspots[{i}].ath"), &mut problems);
            let atv = required(&h.atv, &format!("hotspots[{i}].atv"), &mut problems);
            let description = required(
                &h.description,
                &format!("hotspots[{i}].description"),
                &mut problems,
            );
            if let (Some(ath), Some(atv), Some(description)) = (ath, atv, description) {
                hotspots.push(Hotspot {
                    ath,
                    atv,
                    description,
                });
            }
        }

        match (pname, input, panotype, hfov) {
            (Some(pname), Some(input), Some(panotype), Some(hfov)) if problems.is_empty() => {
                Ok(Self {
                    pname,
                    input,
                    panotype,
                    hfov,
                    vfov: text(&raw.vfov),
                    voffset: text(&raw.voffset),
                    view: ViewOverrides {
                        hlookat: text(&raw.hlookat),
                        vlookat: text(&raw.vlookat),
                        fov: text(&raw.fov),
                    },
                    preview,
                    twittercard,
                    title: text(&raw.title),
                    description: text(&raw.description),
                    hotspots,
                    origin: None,
                })
            }
            _ => Err(ValidationError::Invalid { problems }),
        }
    }

    /// Read, parse and validate a descriptor file.
    pub fn load_file(path: &Path, panorama_root: &Path) -> Result<Self, ValidationError> {
        let raw = read_raw(path)?;
        let mut descriptor = Self::load(raw, panorama_root)?;
        descriptor.origin = Some(path.to_path_buf());
        Ok(descriptor)
    }
}

/// Read and parse a descriptor file without validating it.
pub fn read_raw(path: &Path) -> Result<RawDescriptor, ValidationError> {
    let content = fs::read_to_string(path).map_err(|source| ValidationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    RawDescriptor::from_yaml(&content).map_err(|source| ValidationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve an image reference: the literal path if it is an existing file,
/// otherwise the same reference under `panorama_root`.
///
/// On failure returns both attempted paths.
pub fn resolve_image(reference: &str, panorama_root: &Path) -> Result<PathBuf, (PathBuf, PathBuf)> {
    let literal = PathBuf::from(reference);
    if literal.is_file() {
        return Ok(literal);
    }
    let under_root = panorama_root.join(reference);
    if under_root.is_file() {
        return Ok(under_root);
    }
    Err((literal, under_root))
}

fn text(value: &Option<Scalar>) -> Option<String> {
    value
        .as_ref()
        .map(|v| v.to_string())
        .filter(|s| !s.trim().is_empty())
}

fn required(value: &Option<Scalar>, field: &str, problems: &mut Vec<Problem>) -> Option<String> {
    let found = text(value);
    if found.is_none() {
        problems.push(Problem::Missing(field.to_string()));
    }
    found
}

fn resolve_or_record(
    reference: &str,
    field: &str,
    panorama_root: &Path,
    problems: &mut Vec<Problem>,
) -> Option<PathBuf> {
    match resolve_image(reference, panorama_root) {
        Ok(path) => Some(path),
        Err((literal, under_root)) => {
            problems.push(Problem::Unresolved {
                field: field.to_string(),
                literal,
                under_root,
            });
            None
        }
    }
}
