//! I/O utilities.
//!
//! This module is responsible for reading JSON, TOML and JSONL files, and for
//! writing JSON records to files or standard output. Our parsing libraries
//! don't do async I/O, so we read whole files (or whole lines) and parse them
//! in memory.

use serde::de::DeserializeOwned;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt as _, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, BufReader},
};

use crate::prelude::*;

/// Read TOML or JSON from a file. Files ending in `.json` are parsed as JSON,
/// and everything else as TOML.
pub async fn read_json_or_toml<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open file at path: {:?}", path))?;
    let mut data = String::new();
    file.read_to_string(&mut data)
        .await
        .with_context(|| format!("Failed to read file at path: {:?}", path))?;
    if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&data).with_context(|| {
            format!("Failed to parse JSON from file at path: {:?}", path)
        })
    } else {
        toml::from_str(&data).with_context(|| {
            format!("Failed to parse TOML from file at path: {:?}", path)
        })
    }
}

/// Read every record from a JSON Lines file. Blank lines are skipped.
pub async fn read_jsonl<T>(path: &Path) -> Result<Vec<T>>
where
    T: DeserializeOwned,
{
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open file at path: {:?}", path))?;
    let mut lines = BufReader::new(file).lines();
    let mut records = vec![];
    let mut line_number = 0;
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| format!("Failed to read line from {:?}", path))?
    {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).with_context(|| {
            format!("Failed to parse JSON on line {} of {:?}", line_number, path)
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a single value as pretty-printed JSON to either standard output or a
/// file.
pub async fn write_json<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize,
{
    let mut writer = create_writer(path).await?;
    let json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    writer
        .write_all(json.as_bytes())
        .await
        .context("Failed to write JSON to output")?;
    writer
        .write_all(b"\n")
        .await
        .context("Failed to write newline to output")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Append a single value to a JSON Lines file, creating it if needed.
pub async fn append_jsonl<T>(path: &Path, value: &T) -> Result<()>
where
    T: Serialize,
{
    let mut line = serde_json::to_string(value).context("Failed to serialize JSON")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {:?} for appending", path))?;
    file.write_all(line.as_bytes())
        .await
        .with_context(|| format!("Failed to append to {:?}", path))?;
    file.flush()
        .await
        .with_context(|| format!("Failed to flush {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Record {
        name: String,
    }

    #[tokio::test]
    async fn appended_records_can_be_read_back() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("records.jsonl");
        append_jsonl(&path, &Record { name: "a".to_owned() }).await?;
        append_jsonl(&path, &Record { name: "b".to_owned() }).await?;
        let records = read_jsonl::<Record>(&path).await?;
        assert_eq!(
            records,
            vec![
                Record { name: "a".to_owned() },
                Record { name: "b".to_owned() }
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn bad_jsonl_lines_report_line_numbers() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let path = dir.path().join("records.jsonl");
        tokio::fs::write(&path, "{\"name\":\"a\"}\n\nnot json\n").await?;
        let err = read_jsonl::<Record>(&path).await.unwrap_err();
        assert!(format!("{err:?}").contains("line 3"));
        Ok(())
    }

    #[tokio::test]
    async fn toml_and_json_are_detected_by_extension() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io-test")?;
        let toml_path = dir.path().join("record.toml");
        tokio::fs::write(&toml_path, "name = \"t\"\n").await?;
        let json_path = dir.path().join("record.json");
        tokio::fs::write(&json_path, "{\"name\": \"j\"}").await?;
        assert_eq!(read_json_or_toml::<Record>(&toml_path).await?.name, "t");
        assert_eq!(read_json_or_toml::<Record>(&json_path).await?.name, "j");
        Ok(())
    }
}
