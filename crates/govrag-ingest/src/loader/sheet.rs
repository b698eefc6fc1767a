use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::warn;

use super::{corrupt, DocumentFormat, DocumentLoader, TextBlock, TextBlocks};
use govrag_core::LoaderError;

/// Excel workbooks (`.xls`, `.xlsx`): one block per non-empty sheet,
/// cells tab-separated, rows newline-separated.
pub struct SpreadsheetLoader;

impl DocumentLoader for SpreadsheetLoader {
    fn formats(&self) -> &[DocumentFormat] {
        &[DocumentFormat::Xls, DocumentFormat::Xlsx]
    }

    fn load(&self, path: &Path) -> Result<TextBlocks, LoaderError> {
        let format = DocumentFormat::from_path(path)?;
        if !path.exists() {
            return Err(LoaderError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }
        let mut workbook = open_workbook_auto(path).map_err(|e| corrupt(path, e))?;
        let source = path.display().to_string();

        let names = workbook.sheet_names();
        let blocks = names.into_iter().filter_map(move |name| {
            let range = match workbook.worksheet_range(&name) {
                Ok(range) => range,
                Err(e) => {
                    warn!("Skipping unreadable sheet '{}' in {}: {}", name, source, e);
                    return None;
                }
            };
            let text = range
                .rows()
                .map(row_text)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            if text.trim().is_empty() {
                return None;
            }
            Some(Ok(TextBlock::new(
                format!("{}\n{}", name, text),
                &source,
                format,
            )
            .with_section(name)))
        });
        Ok(TextBlocks::new(blocks))
    }
}

fn row_text(row: &[Data]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|cell| match cell {
            Data::Empty => String::new(),
            other => other.to_string().trim().to_string(),
        })
        .collect();
    let last = cells.iter().rposition(|c| !c.is_empty()).map_or(0, |i| i + 1);
    cells[..last].join("\t")
}
