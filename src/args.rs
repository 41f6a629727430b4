use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bytes::Bytes;
use dahlia_storage::Storage;
use dahlia_value::{ArchiveValue, ResourceValue, Value};

/// Split `KEY=VALUE`.
pub fn parse_key_value(raw: &str) -> Result<(String, String)> {
  match raw.split_once('=') {
    Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
    _ => bail!("expected KEY=VALUE, got {:?}", raw),
  }
}

/// A `--param` value.
///
/// `@path` reads a file as a resource or a directory as an archive. Text
/// that parses as JSON becomes a plain object, anything else a string.
pub fn parse_argument(raw: &str) -> Result<Value> {
  if let Some(path) = raw.strip_prefix('@') {
    let path = PathBuf::from(path);
    let metadata = std::fs::metadata(&path)
      .with_context(|| format!("cannot read parameter file {}", path.display()))?;
    return Ok(if metadata.is_dir() {
      Value::Archive(ArchiveValue::from_directory(path))
    } else {
      Value::Resource(ResourceValue::from_file(path))
    });
  }
  Ok(match serde_json::from_str::<serde_json::Value>(raw) {
    Ok(json) => Value::PlainObject(json),
    Err(_) => Value::String(raw.to_string()),
  })
}

pub fn parse_arguments(raw: &[String]) -> Result<BTreeMap<String, Value>> {
  let mut arguments = BTreeMap::new();
  for entry in raw {
    let (name, value) = parse_key_value(entry)?;
    let value = parse_argument(&value).with_context(|| format!("invalid parameter {}", name))?;
    if arguments.insert(name.clone(), value).is_some() {
      bail!("parameter {} given twice", name);
    }
  }
  Ok(arguments)
}

pub fn parse_environment(raw: &[String]) -> Result<BTreeMap<String, String>> {
  raw.iter().map(|entry| parse_key_value(entry)).collect()
}

/// Every file below `dir`, keyed by its `/`-separated relative path.
pub async fn read_context(dir: &Path) -> Result<BTreeMap<String, Bytes>> {
  if !dir.is_dir() {
    bail!("context {} is not a directory", dir.display());
  }
  let storage = Storage::filesystem(dir);
  let mut context = BTreeMap::new();
  for path in storage
    .entries()
    .await
    .with_context(|| format!("failed to list {}", dir.display()))?
  {
    let data = storage
      .read(&path)
      .await
      .with_context(|| format!("failed to read context file {}", path))?;
    context.insert(path, data);
  }
  Ok(context)
}
