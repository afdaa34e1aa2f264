use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Headings used by the generated manual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ManualLabels {
    pub title: String,
    pub complete_model: String,
    pub required_parts: String,
    pub assembly_procedure: String,
    /// Step heading; `{n}` is replaced by the step number.
    pub step: String,
}

impl ManualLabels {
    pub fn english() -> Self {
        Self {
            title: "DIY Design Document".into(),
            complete_model: "3D Model".into(),
            required_parts: "Required Parts".into(),
            assembly_procedure: "Assembly Procedure".into(),
            step: "Step {n}".into(),
        }
    }

    pub fn japanese() -> Self {
        Self {
            title: "DIY設計書".into(),
            complete_model: "3Dモデル".into(),
            required_parts: "必要な部品".into(),
            assembly_procedure: "組立手順".into(),
            step: "手順{n}".into(),
        }
    }

    /// `en` or `ja`.
    pub fn for_language(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::english()),
            "ja" | "japanese" => Some(Self::japanese()),
            _ => None,
        }
    }

    pub fn step_heading(&self, step: u32) -> String {
        self.step.replace("{n}", &step.to_string())
    }
}

impl Default for ManualLabels {
    fn default() -> Self {
        Self::english()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PartsSection {
    /// Fabrication group key, used verbatim.
    pub heading: String,
    pub image: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepSection {
    pub step: u32,
    pub description: String,
    pub image: String,
}

/// The structured manual. Image references are file names relative to the directory the
/// document is rendered in.
#[derive(Clone, Debug, PartialEq)]
pub struct ManualDocument {
    pub labels: ManualLabels,
    pub complete_image: String,
    pub parts: Vec<PartsSection>,
    pub steps: Vec<StepSection>,
}

impl ManualDocument {
    /// Standalone HTML: title, complete model, parts sections, then numbered steps.
    pub fn to_html(&self) -> String {
        let l = &self.labels;
        let mut out = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
             body { font-family: sans-serif; margin: 2em; }\n\
             img { max-width: 100%; display: block; margin: 1em auto; }\n\
             </style>\n",
        );
        let _ = writeln!(out, "<title>{}</title>\n</head>\n<body>", escape(&l.title));
        let _ = writeln!(out, "<h1>{}</h1>", escape(&l.title));
        let _ = writeln!(out, "<h2>{}</h2>", escape(&l.complete_model));
        image_tag(&mut out, &self.complete_image, &l.complete_model);

        let _ = writeln!(out, "<h2>{}</h2>", escape(&l.required_parts));
        for section in &self.parts {
            let _ = writeln!(out, "<h3>{}</h3>", escape(&section.heading));
            image_tag(&mut out, &section.image, &section.heading);
            paragraphs(&mut out, &section.description);
        }

        let _ = writeln!(out, "<h2>{}</h2>", escape(&l.assembly_procedure));
        for step in &self.steps {
            let _ = writeln!(out, "<h3>{}</h3>", escape(&l.step_heading(step.step)));
            paragraphs(&mut out, &step.description);
            image_tag(&mut out, &step.image, &format!("step{}", step.step));
        }
        out.push_str("</body>\n</html>\n");
        out
    }
}

fn image_tag(out: &mut String, src: &str, alt: &str) {
    let _ = writeln!(out, "<img src=\"{}\" alt=\"{}\">", escape(src), escape(alt));
}

fn paragraphs(out: &mut String, text: &str) {
    for block in text.split("\n\n").map(str::trim).filter(|b| !b.is_empty()) {
        let lines: Vec<String> = block.lines().map(escape).collect();
        let _ = writeln!(out, "<p>{}</p>", lines.join("<br>"));
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
