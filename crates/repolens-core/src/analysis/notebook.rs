use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("notebook is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("notebook contains no cell list")]
    MissingCells,
}

#[derive(Deserialize)]
struct Notebook {
    #[serde(default)]
    cells: Option<Vec<Cell>>,
    /// nbformat 3 nests cells inside worksheets.
    #[serde(default)]
    worksheets: Option<Vec<Worksheet>>,
}

#[derive(Deserialize)]
struct Worksheet {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: Option<CellText>,
    /// nbformat 3 stores code cell text under `input`.
    #[serde(default)]
    input: Option<CellText>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CellText {
    Lines(Vec<String>),
    Text(String),
}

impl CellText {
    fn into_string(self) -> String {
        match self {
            Self::Lines(lines) => lines.concat(),
            Self::Text(text) => text,
        }
    }
}

/// Concatenate the source of every code cell in document order.
///
/// Each cell's text is terminated with a newline so adjacent cells never fuse
/// into one line. Markdown and raw cells are dropped.
pub fn extract_code_cells(raw: &str) -> Result<String, NotebookError> {
    let notebook: Notebook = serde_json::from_str(raw)?;
    let cells = match (notebook.cells, notebook.worksheets) {
        (Some(cells), _) => cells,
        (None, Some(worksheets)) => worksheets.into_iter().flat_map(|ws| ws.cells).collect(),
        (None, None) => return Err(NotebookError::MissingCells),
    };

    let mut blob = String::new();
    for cell in cells.into_iter().filter(|cell| cell.cell_type == "code") {
        let Some(text) = cell.source.or(cell.input) else {
            continue;
        };
        let text = text.into_string();
        if text.is_empty() {
            continue;
        }
        blob.push_str(&text);
        if !text.ends_with('\n') {
            blob.push('\n');
        }
    }
    Ok(blob)
}
