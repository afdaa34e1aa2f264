use std::path::{Path, PathBuf};

use craft_manual::{CommandRenderer, ManualLabels};
use craft_mesh::PreviewOptions;
use craft_types::JoinPolicy;
use serde::{Deserialize, Serialize};

use crate::PipelineError;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Runtime settings. Environment variables first, then an optional YAML file named by
/// `CRAFT_CONFIG` whose keys override them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CraftConfig {
    pub bind: String,
    pub store_root: PathBuf,
    pub scratch_root: PathBuf,
    pub generation_url: String,
    pub generation_stub: bool,
    pub fixtures: Option<PathBuf>,
    pub render_program: String,
    pub render_args: Vec<String>,
    pub preview_size: u32,
    pub join_policy: JoinPolicy,
    pub manual_lang: String,
    pub max_upload_bytes: usize,
}

impl Default for CraftConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".into(),
            store_root: PathBuf::from("./plans"),
            scratch_root: std::env::temp_dir().join("plancraft"),
            generation_url: "http://localhost:8080".into(),
            generation_stub: false,
            fixtures: None,
            render_program: "weasyprint".into(),
            render_args: vec!["{input}".into(), "{output}".into()],
            preview_size: 700,
            join_policy: JoinPolicy::Permissive,
            manual_lang: "en".into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// YAML keys, all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Overlay {
    bind: Option<String>,
    store_root: Option<PathBuf>,
    scratch_root: Option<PathBuf>,
    generation_url: Option<String>,
    generation_stub: Option<bool>,
    fixtures: Option<PathBuf>,
    render_program: Option<String>,
    render_args: Option<Vec<String>>,
    preview_size: Option<u32>,
    join_policy: Option<JoinPolicy>,
    manual_lang: Option<String>,
    max_upload_bytes: Option<usize>,
}

impl CraftConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        let mut cfg = Self::from_lookup(|key| std::env::var(key).ok())?;
        if let Ok(path) = std::env::var("CRAFT_CONFIG") {
            cfg.overlay_file(path)?;
        }
        Ok(cfg)
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut cfg = Self::default();
        let get = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CRAFT_BIND") {
            cfg.bind = v;
        }
        if let Some(v) = get("CRAFT_STORE_ROOT") {
            cfg.store_root = v.into();
        }
        if let Some(v) = get("CRAFT_SCRATCH_ROOT") {
            cfg.scratch_root = v.into();
        }
        if let Some(v) = get("CRAFT_GENERATION_URL") {
            cfg.generation_url = v;
        }
        if let Some(v) = get("CRAFT_GENERATION_STUB") {
            cfg.generation_stub = v == "1" || v.to_lowercase() == "true";
        }
        if let Some(v) = get("CRAFT_FIXTURES") {
            cfg.fixtures = Some(v.into());
        }
        if let Some(v) = get("CRAFT_RENDER_PROGRAM") {
            cfg.render_program = v;
        }
        if let Some(v) = get("CRAFT_RENDER_ARGS") {
            cfg.render_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Some(v) = get("CRAFT_PREVIEW_SIZE") {
            cfg.preview_size = parse_number("CRAFT_PREVIEW_SIZE", &v)?;
        }
        if let Some(v) = get("CRAFT_JOIN_POLICY") {
            cfg.join_policy = match v.to_lowercase().as_str() {
                "permissive" => JoinPolicy::Permissive,
                "strict" => JoinPolicy::Strict,
                other => {
                    return Err(PipelineError::Config(format!(
                        "CRAFT_JOIN_POLICY must be permissive or strict, got {other:?}"
                    )))
                }
            };
        }
        if let Some(v) = get("CRAFT_MANUAL_LANG") {
            cfg.manual_lang = v;
        }
        if let Some(v) = get("CRAFT_MAX_UPLOAD_BYTES") {
            cfg.max_upload_bytes = parse_number("CRAFT_MAX_UPLOAD_BYTES", &v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn overlay_file(&mut self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("{}: {e}", path.display())))?;
        self.overlay_yaml(&text)
    }

    pub fn overlay_yaml(&mut self, text: &str) -> Result<(), PipelineError> {
        let o: Overlay = if text.trim().is_empty() {
            Overlay::default()
        } else {
            serde_yaml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?
        };
        macro_rules! take {
            ($($field:ident),*) => {
                $(if let Some(v) = o.$field { self.$field = v; })*
            };
        }
        take!(
            bind,
            store_root,
            scratch_root,
            generation_url,
            generation_stub,
            render_program,
            render_args,
            preview_size,
            join_policy,
            manual_lang,
            max_upload_bytes
        );
        if o.fixtures.is_some() {
            self.fixtures = o.fixtures;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.preview_size == 0 {
            return Err(PipelineError::Config(
                "preview size must be at least 1 pixel".into(),
            ));
        }
        self.labels()?;
        Ok(())
    }

    pub fn labels(&self) -> Result<ManualLabels, PipelineError> {
        ManualLabels::for_language(&self.manual_lang).ok_or_else(|| {
            PipelineError::Config(format!(
                "manual language must be en or ja, got {:?}",
                self.manual_lang
            ))
        })
    }

    pub fn preview(&self) -> PreviewOptions {
        PreviewOptions {
            size: self.preview_size,
            ..PreviewOptions::default()
        }
    }

    pub fn renderer(&self) -> CommandRenderer {
        CommandRenderer::new(self.render_program.clone(), self.render_args.clone())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, PipelineError> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{key} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_variables() {
        let cfg = CraftConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8000");
        assert_eq!(cfg.preview_size, 700);
        assert_eq!(cfg.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.join_policy, JoinPolicy::Permissive);
        assert!(!cfg.generation_stub);
    }

    #[test]
    fn variables_override_defaults() {
        let cfg = CraftConfig::from_lookup(lookup(&[
            ("CRAFT_GENERATION_STUB", "TRUE"),
            ("CRAFT_JOIN_POLICY", "strict"),
            ("CRAFT_MANUAL_LANG", "ja"),
            ("CRAFT_RENDER_ARGS", "--quiet {input} {output}"),
            ("CRAFT_PREVIEW_SIZE", "320"),
        ]))
        .unwrap();
        assert!(cfg.generation_stub);
        assert_eq!(cfg.join_policy, JoinPolicy::Strict);
        assert_eq!(cfg.labels().unwrap().title, "DIY設計書");
        assert_eq!(cfg.render_args, ["--quiet", "{input}", "{output}"]);
        assert_eq!(cfg.preview().size, 320);
    }

    #[test]
    fn bad_values_are_config_errors() {
        for pairs in [
            [("CRAFT_PREVIEW_SIZE", "big")],
            [("CRAFT_JOIN_POLICY", "lenient")],
            [("CRAFT_MANUAL_LANG", "fr")],
            [("CRAFT_PREVIEW_SIZE", "0")],
        ] {
            assert!(matches!(
                CraftConfig::from_lookup(lookup(&pairs)),
                Err(PipelineError::Config(_))
            ));
        }
    }

    #[test]
    fn yaml_overlays_only_given_keys() {
        let mut cfg = CraftConfig::from_lookup(lookup(&[("CRAFT_BIND", "127.0.0.1:9000")])).unwrap();
        cfg.overlay_yaml("preview_size: 256\njoin_policy: strict\n").unwrap();
        assert_eq!(cfg.bind, "127.0.0.1:9000");
        assert_eq!(cfg.preview_size, 256);
        assert_eq!(cfg.join_policy, JoinPolicy::Strict);

        assert!(cfg.overlay_yaml("no_such_key: 1").is_err());
        assert!(matches!(
            cfg.overlay_yaml("preview_size: 0"),
            Err(PipelineError::Config(_))
        ));
    }
}
