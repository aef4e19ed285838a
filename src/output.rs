use std::io::{self, Write};

use serde::Serialize;

use crate::catalog::CatalogSnapshot;
use crate::codelist::CodeList;
use crate::resolver::{ContainerContentResponse, ContainerItem};

#[derive(Debug, Clone, Serialize)]
pub struct DownloadResult {
    pub id: String,
    pub path: String,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_listing(result: &ContainerContentResponse) -> io::Result<()> {
        Self::print_json(result)
    }

    /// Prints `null` for an unknown id.
    pub fn print_item(result: Option<&ContainerItem>) -> io::Result<()> {
        Self::print_json(&result)
    }

    pub fn print_download(result: &DownloadResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_codelists(result: &[CodeList]) -> io::Result<()> {
        Self::print_json(&result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Indented outline of everything reachable from the roots. Containers end
/// with `/`.
pub fn write_tree<W: Write>(snapshot: &CatalogSnapshot, out: &mut W) -> io::Result<()> {
    let mut result = Ok(());
    snapshot.walk(|depth, node| {
        if result.is_err() {
            return;
        }
        let marker = if node.is_container() { "/" } else { "" };
        result = writeln!(
            out,
            "{:indent$}{}{} [{}]",
            "",
            node.name(),
            marker,
            node.id(),
            indent = depth * 2
        );
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_result_serializes_path() {
        let result = DownloadResult {
            id: "sdmx:ESTAT:DF1".to_string(),
            path: camino::Utf8Path::new("out").join("DF1.csv").to_string(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["id"], "sdmx:ESTAT:DF1");
        assert_eq!(json["path"], result.path.as_str());
    }
}
