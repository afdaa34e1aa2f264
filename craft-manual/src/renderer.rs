use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::document::ManualDocument;
use crate::scratch::ScratchDir;
use crate::ManualError;

/// Turns a manual into the final printable bytes. Images referenced by the document are
/// already present in `scratch`.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    async fn render(
        &self,
        doc: &ManualDocument,
        scratch: &mut ScratchDir,
    ) -> Result<Vec<u8>, ManualError>;
}

/// Runs an external HTML-to-PDF program inside the scratch directory.
///
/// `{input}` and `{output}` in the arguments are replaced with the HTML and PDF file names.
#[derive(Clone, Debug)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

pub const HTML_FILE: &str = "manual.html";
pub const PDF_FILE: &str = "manual.pdf";

impl CommandRenderer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn weasyprint() -> Self {
        Self::new("weasyprint", vec!["{input}".into(), "{output}".into()])
    }

    fn expand_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace("{input}", HTML_FILE).replace("{output}", PDF_FILE))
            .collect()
    }
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self::weasyprint()
    }
}

#[async_trait]
impl DocumentRenderer for CommandRenderer {
    async fn render(
        &self,
        doc: &ManualDocument,
        scratch: &mut ScratchDir,
    ) -> Result<Vec<u8>, ManualError> {
        scratch.write(HTML_FILE, doc.to_html().as_bytes()).await?;
        let output = scratch.track(PDF_FILE);
        let args = self.expand_args();
        debug!(program = %self.program, ?args, "[manual_pdf] running renderer");

        let result = Command::new(&self.program)
            .args(&args)
            .current_dir(scratch.path())
            .output()
            .await
            .map_err(|e| ManualError::Renderer(format!("{}: {e}", self.program)))?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ManualError::Renderer(format!(
                "{} exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(&output)
            .await
            .map_err(|source| ManualError::Scratch {
                path: output.clone(),
                source,
            })?;
        info!(bytes = bytes.len(), "[manual_pdf] document rendered");
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ManualLabels;

    fn empty_doc() -> ManualDocument {
        ManualDocument {
            labels: ManualLabels::default(),
            complete_image: "complete.png".into(),
            parts: Vec::new(),
            steps: Vec::new(),
        }
    }

    #[test]
    fn placeholders_expand_to_scratch_file_names() {
        let r = CommandRenderer::new("render", vec!["-i".into(), "{input}".into(), "--out={output}".into()]);
        assert_eq!(r.expand_args(), ["-i", "manual.html", "--out=manual.pdf"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copies_through_a_shell_program() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create(root.path(), "plan").await.unwrap();
        let r = CommandRenderer::new("sh", vec!["-c".into(), "cp {input} {output}".into()]);
        let bytes = r.render(&empty_doc(), &mut scratch).await.unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("<h1>DIY Design Document</h1>"));
        scratch.cleanup().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let mut scratch = ScratchDir::create(root.path(), "plan").await.unwrap();
        let r = CommandRenderer::new("sh", vec!["-c".into(), "exit 3".into()]);
        let err = r.render(&empty_doc(), &mut scratch).await.unwrap_err();
        assert!(matches!(err, ManualError::Renderer(_)));
        scratch.cleanup().await;
    }
}
