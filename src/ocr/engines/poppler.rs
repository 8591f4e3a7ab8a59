//! Page counting and rasterization using Poppler's `pdfinfo` and `pdftocairo`.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use tokio::process::Command;

use super::{PageCounter, Rasterizer};
use crate::{
    async_utils::{DEFAULT_ERROR_REGEX, check_for_command_failure},
    cpu_limit::with_cpu_semaphore, prelude::*,
};

/// The only MIME type we know how to rasterize.
const PDF_MIME_TYPE: &str = "application/pdf";

/// Poppler reports some recoverable problems as errors.
static DOWNGRADE_TO_WARNING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)error: xref num").expect("failed to compile regex")
});

/// Does this line contain an error?
fn is_error_line(line: &str) -> bool {
    DEFAULT_ERROR_REGEX.is_match(line) && !DOWNGRADE_TO_WARNING_REGEX.is_match(line)
}

/// Counts and renders PDF pages using the `poppler-utils` CLI tools.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct Poppler {}

impl Poppler {
    /// Create a new Poppler wrapper.
    pub fn new() -> Self {
        Self {}
    }
}

#[async_trait]
impl PageCounter for Poppler {
    #[instrument(level = "debug", skip_all, fields(path = %document.display()))]
    async fn page_count(&self, document: &Path) -> Result<usize> {
        let mime_type = get_mime_type(document)?;
        if mime_type != PDF_MIME_TYPE {
            return Err(anyhow!(
                "expected {} but found {} for {:?}",
                PDF_MIME_TYPE,
                mime_type,
                document.display()
            ));
        }

        let output = Command::new("pdfinfo")
            .arg(document)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run pdfinfo on {:?}", document.display()))?;
        check_for_command_failure("pdfinfo", &output, Some(&is_error_line))?;

        let output =
            String::from_utf8(output.stdout).context("pdfinfo output was not valid UTF-8")?;
        let page_count = parse_pdfinfo_page_count(&output).with_context(|| {
            format!("failed to get page count for {:?}", document.display())
        })?;
        if page_count == 0 {
            return Err(anyhow!("{:?} has no pages", document.display()));
        }
        Ok(page_count)
    }
}

#[async_trait]
impl Rasterizer for Poppler {
    #[instrument(level = "debug", skip_all, fields(path = %document.display(), page = page_number, dpi))]
    async fn render(
        &self,
        document: &Path,
        page_number: usize,
        dpi: u32,
        output: &Path,
    ) -> Result<()> {
        // With `-singlefile`, pdftocairo appends the extension itself.
        let out_root = output.with_extension("");
        let page = page_number.to_string();
        let mut cmd = Command::new("pdftocairo");
        cmd.arg("-png")
            .arg("-singlefile")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg(&page)
            .arg("-l")
            .arg(&page)
            .arg(document)
            .arg(&out_root)
            .kill_on_drop(true);

        // `pdftocairo` will use _at least_ 100% of a CPU, and we don't want to
        // run 200 copies of it at once by mistake.
        let result = with_cpu_semaphore(|| async move { cmd.output().await }).await?;
        let cmd_output = result.with_context(|| {
            format!("failed to run pdftocairo on {:?}", document.display())
        })?;
        check_for_command_failure("pdftocairo", &cmd_output, Some(&is_error_line))?;

        let rendered = out_root.with_extension("png");
        if rendered != output {
            tokio::fs::rename(&rendered, output)
                .await
                .with_context(|| format!("failed to move {:?}", rendered.display()))?;
        }
        if !output.is_file() {
            return Err(anyhow!(
                "pdftocairo did not produce an image for page {}",
                page_number
            ));
        }
        Ok(())
    }
}

/// Parse the `Pages:` line out of `pdfinfo` output.
fn parse_pdfinfo_page_count(output: &str) -> Result<usize> {
    let mut properties = BTreeMap::new();
    for line in output.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        properties.insert(key, value);
    }
    let page_count_str = properties
        .get("Pages")
        .ok_or_else(|| anyhow!("failed to find page count in pdfinfo output"))?;
    page_count_str
        .parse::<usize>()
        .with_context(|| format!("failed to parse page count {:?}", page_count_str))
}

/// Get the MIME type of a file by sniffing its contents.
pub fn get_mime_type(path: &Path) -> Result<String> {
    Ok(infer::get_from_path(path)
        .with_context(|| format!("failed to get MIME type for {:?}", path.display()))?
        .ok_or_else(|| anyhow!("unknown MIME type for {:?}", path.display()))?
        .mime_type()
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal one-page PDF with a valid cross-reference table.
    fn one_page_pdf() -> String {
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>",
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>",
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>",
        ];
        let mut pdf = "%PDF-1.4\n".to_owned();
        let mut offsets = vec![];
        for (idx, object) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", idx + 1, object));
        }
        let xref_offset = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{:010} 00000 n \n", offset));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        ));
        pdf
    }

    #[test]
    fn is_error_line_works() {
        assert!(is_error_line("error: something went wrong"));
        assert!(is_error_line("Syntax Error: Couldn't find trailer dictionary"));
        assert!(!is_error_line("Warning: something is odd"));
        assert!(!is_error_line(
            "Internal Error: xref num 1234 not found but needed, document has changes, reconstruct aborted"
        ));
    }

    #[test]
    fn pdfinfo_output_is_parsed() {
        let output = "Title:          Notes\nProducer:       Example\nPages:          12\nEncrypted:      no\n";
        assert_eq!(parse_pdfinfo_page_count(output).unwrap(), 12);
        assert!(parse_pdfinfo_page_count("Title: x\n").is_err());
        assert!(parse_pdfinfo_page_count("Pages: many\n").is_err());
    }

    #[tokio::test]
    async fn non_pdf_documents_are_rejected_without_touching_the_directory() -> Result<()>
    {
        let dir = tempfile::TempDir::with_prefix("poppler-test")?;
        let path = dir.path().join("notes.pdf");
        tokio::fs::write(&path, "this is plain text, not a PDF").await?;

        let before = std::fs::read_dir(dir.path())?.count();
        let err = Poppler::new().page_count(&path).await.unwrap_err();
        let after = std::fs::read_dir(dir.path())?.count();

        assert!(err.to_string().contains("MIME type"), "{err:?}");
        assert_eq!(before, after);
        assert_eq!(std::fs::read_to_string(&path)?, "this is plain text, not a PDF");
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn page_count_returns_correct_number_of_pages() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("poppler-test")?;
        let path = dir.path().join("one_page.pdf");
        tokio::fs::write(&path, one_page_pdf()).await?;
        assert_eq!(Poppler::new().page_count(&path).await?, 1);
        Ok(())
    }

    #[tokio::test]
    #[ignore = "Requires poppler-utils to be installed"]
    async fn render_writes_the_requested_image() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("poppler-test")?;
        let path = dir.path().join("one_page.pdf");
        tokio::fs::write(&path, one_page_pdf()).await?;
        let output = dir.path().join("page-1.png");
        Poppler::new().render(&path, 1, 72, &output).await?;
        assert_eq!(get_mime_type(&output)?, "image/png");
        Ok(())
    }
}
