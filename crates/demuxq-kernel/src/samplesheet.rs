//! Sample sheet model.
//!
//! A sample sheet is a comma-separated file with free-form sections. Only the
//! `[Data]` section is read: exactly one line must contain the `[Data]`
//! marker, the following line is the header, and every later non-blank line
//! is a sample.
//!
//! Columns are matched by header name. A column missing from the header gives
//! an absent field; a present column with an empty cell gives `""`.

use std::path::{Path, PathBuf};

use demuxq_types::SampleRecord;

use crate::error::{DemuxError, DemuxResult};

const DATA_MARKER: &str = "[Data]";

const COL_LANE: &str = "Lane";
const COL_SAMPLE_ID: &str = "Sample_ID";
const COL_SAMPLE_NAME: &str = "Sample_Name";
const COL_PLATE: &str = "Sample_Plate";
const COL_WELL: &str = "Sample_Well";
const COL_INDEX1: &str = "index";
const COL_INDEX2: &str = "index2";
const COL_PROJECT: &str = "Sample_Project";
const COL_DESCRIPTION: &str = "Description";

/// Parsed sample sheet.
#[derive(Debug, Clone)]
pub struct SampleSheet {
    path: Option<PathBuf>,
    samples: Vec<SampleRecord>,
}

impl SampleSheet {
    /// Read and parse the sample sheet at `path`.
    pub fn from_path(path: &Path) -> DemuxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                DemuxError::NotFound(format!("sample sheet {}", path.display()))
            }
            _ => DemuxError::Io(format!("reading {}: {}", path.display(), e)),
        })?;
        let mut sheet = Self::parse(&content)?;
        sheet.path = Some(path.to_path_buf());
        Ok(sheet)
    }

    /// Parse sample sheet text.
    pub fn parse(content: &str) -> DemuxResult<Self> {
        let lines: Vec<&str> = content.lines().collect();
        let markers: Vec<usize> = lines
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(DATA_MARKER))
            .map(|(i, _)| i)
            .collect();

        let data_line = match markers.as_slice() {
            [one] => *one,
            _ => {
                return Err(DemuxError::Format(format!(
                    "sample sheet must contain exactly one {} line, found {}",
                    DATA_MARKER,
                    markers.len()
                )));
            }
        };

        let mut rows = lines[data_line + 1..]
            .iter()
            .filter(|line| !line.trim().is_empty());

        let header = rows.next().ok_or_else(|| {
            DemuxError::Format(format!("no header row after {}", DATA_MARKER))
        })?;
        let columns = Columns::new(&split_row(header));

        let mut samples = Vec::new();
        for cells in rows.map(|line| split_row(line)) {
            // Lines made only of separators are padding, not samples.
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let row_index = samples.len();
            samples.push(columns.record(&cells, row_index)?);
        }

        Ok(Self {
            path: None,
            samples,
        })
    }

    pub fn samples(&self) -> &[SampleRecord] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<SampleRecord> {
        self.samples
    }

    /// Path the sheet was read from, if it came from a file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Header positions of the known columns.
struct Columns {
    lane: Option<usize>,
    sample_id: Option<usize>,
    sample_name: Option<usize>,
    plate: Option<usize>,
    well: Option<usize>,
    index1: Option<usize>,
    index2: Option<usize>,
    project: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn new(header: &[String]) -> Self {
        let find = |name: &str| header.iter().position(|h| h.trim() == name);
        Self {
            lane: find(COL_LANE),
            sample_id: find(COL_SAMPLE_ID),
            sample_name: find(COL_SAMPLE_NAME),
            plate: find(COL_PLATE),
            well: find(COL_WELL),
            index1: find(COL_INDEX1),
            index2: find(COL_INDEX2),
            project: find(COL_PROJECT),
            description: find(COL_DESCRIPTION),
        }
    }

    fn record(&self, cells: &[String], row_index: usize) -> DemuxResult<SampleRecord> {
        // A present column with a short row still counts as present-but-empty.
        let cell = |col: Option<usize>| -> Option<String> {
            col.map(|i| cells.get(i).cloned().unwrap_or_default())
        };

        let lane = match cell(self.lane) {
            Some(raw) if !raw.trim().is_empty() => parse_lane(&raw, row_index)?,
            _ => 1,
        };

        Ok(SampleRecord {
            lane,
            sample_id: cell(self.sample_id).unwrap_or_default(),
            sample_name: cell(self.sample_name).unwrap_or_default(),
            index1: cell(self.index1).unwrap_or_default(),
            index2: cell(self.index2),
            project: cell(self.project).unwrap_or_default(),
            plate: cell(self.plate),
            well: cell(self.well),
            description: cell(self.description),
        })
    }
}

fn parse_lane(raw: &str, row_index: usize) -> DemuxResult<u32> {
    match raw.trim().parse::<u32>() {
        Ok(lane) if lane >= 1 => Ok(lane),
        _ => Err(DemuxError::Format(format!(
            "row {}: invalid lane value {:?}",
            row_index, raw
        ))),
    }
}

/// Split one CSV row, honouring double-quoted cells.
fn split_row(line: &str) -> Vec<String> {
    let line = line.trim_end_matches('\r');
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
            '"' if current.is_empty() => in_quotes = true,
            ',' if !in_quotes => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells
}

fn quote_cell(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Columns written by [`render_sample_sheet`], in output order.
#[derive(Debug, Clone, Copy)]
enum RenderColumn {
    Lane,
    SampleId,
    SampleName,
    Plate,
    Well,
    Index1,
    Index2,
    Project,
    Description,
}

impl RenderColumn {
    const ALL: [RenderColumn; 9] = [
        RenderColumn::Lane,
        RenderColumn::SampleId,
        RenderColumn::SampleName,
        RenderColumn::Plate,
        RenderColumn::Well,
        RenderColumn::Index1,
        RenderColumn::Index2,
        RenderColumn::Project,
        RenderColumn::Description,
    ];

    fn header(self) -> &'static str {
        match self {
            RenderColumn::Lane => COL_LANE,
            RenderColumn::SampleId => COL_SAMPLE_ID,
            RenderColumn::SampleName => COL_SAMPLE_NAME,
            RenderColumn::Plate => COL_PLATE,
            RenderColumn::Well => COL_WELL,
            RenderColumn::Index1 => COL_INDEX1,
            RenderColumn::Index2 => COL_INDEX2,
            RenderColumn::Project => COL_PROJECT,
            RenderColumn::Description => COL_DESCRIPTION,
        }
    }

    fn value(self, record: &SampleRecord) -> Option<String> {
        match self {
            RenderColumn::Lane => Some(record.lane.to_string()),
            RenderColumn::SampleId => Some(record.sample_id.clone()),
            RenderColumn::SampleName => Some(record.sample_name.clone()),
            RenderColumn::Plate => record.plate.clone(),
            RenderColumn::Well => record.well.clone(),
            RenderColumn::Index1 => Some(record.index1.clone()),
            RenderColumn::Index2 => record.index2.clone(),
            RenderColumn::Project => Some(record.project.clone()),
            RenderColumn::Description => record.description.clone(),
        }
    }

    fn is_optional(self) -> bool {
        matches!(
            self,
            RenderColumn::Plate
                | RenderColumn::Well
                | RenderColumn::Index2
                | RenderColumn::Description
        )
    }
}

/// Render records as sample sheet text with a `[Data]` section.
///
/// Optional columns are written when at least one record has a value for
/// them. Parsing the result yields the same records as long as every record
/// agrees on which optional columns it carries.
///
/// Cells may not contain line breaks or the `[Data]` marker, since the
/// parser splits sections on both; such records are a format error.
pub fn render_sample_sheet(records: &[SampleRecord]) -> DemuxResult<String> {
    let columns: Vec<RenderColumn> = RenderColumn::ALL
        .into_iter()
        .filter(|col| !col.is_optional() || records.iter().any(|r| col.value(r).is_some()))
        .collect();

    let mut out = String::from("[Header],\nIEMFileVersion,4\n\n");
    out.push_str(DATA_MARKER);
    out.push('\n');
    let header: Vec<&str> = columns.iter().map(|c| c.header()).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for (i, record) in records.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for col in &columns {
            let cell = col.value(record).unwrap_or_default();
            if cell.contains(['\n', '\r']) || cell.contains(DATA_MARKER) {
                return Err(DemuxError::Format(format!(
                    "record {} has a line break or {} in {}, which cannot be written to a sample sheet",
                    i + 1,
                    DATA_MARKER,
                    col.header()
                )));
            }
            row.push(quote_cell(&cell));
        }
        out.push_str(&row.join(","));
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY_SHEET: &str = "
,,,,,,,,
[Data],,,,,,,,
Lane,Sample_ID,Sample_Name,Sample_Plate,Sample_Well,I7_Index_ID,index,Sample_Project,Description
1,1,1,,,,CAGATC,Dummy-Project,FRAGMENT_SIZE:387;LIBRARY_NAME:SX444_1
1,2,2,,,,ACTTGA,Dummy-Project,FRAGMENT_SIZE:387;LIBRARY_NAME:SX444_2
";

    #[test]
    fn parses_data_section() {
        let sheet = SampleSheet::parse(TINY_SHEET).expect("parse failed");
        let samples = sheet.samples();
        assert_eq!(samples.len(), 2);

        let first = &samples[0];
        assert_eq!(first.lane, 1);
        assert_eq!(first.sample_id, "1");
        assert_eq!(first.sample_name, "1");
        assert_eq!(first.index1, "CAGATC");
        assert_eq!(first.project, "Dummy-Project");
        assert_eq!(
            first.description.as_deref(),
            Some("FRAGMENT_SIZE:387;LIBRARY_NAME:SX444_1")
        );
        assert_eq!(samples[1].index1, "ACTTGA");
    }

    #[test]
    fn absent_column_differs_from_empty_cell() {
        let sheet = SampleSheet::parse(TINY_SHEET).expect("parse failed");
        let first = &sheet.samples()[0];
        // Present but empty
        assert_eq!(first.plate.as_deref(), Some(""));
        assert_eq!(first.well.as_deref(), Some(""));
        // No index2 column at all
        assert_eq!(first.index2, None);
    }

    #[test]
    fn lane_defaults_to_one_without_lane_column() {
        let content = "[Data]\nSample_ID,Sample_Name,index,Sample_Project\nS1,S1,ACGT,P\n";
        let sheet = SampleSheet::parse(content).expect("parse failed");
        assert_eq!(sheet.samples()[0].lane, 1);
    }

    #[test]
    fn missing_data_marker_is_format_error() {
        let err = SampleSheet::parse("Lane,Sample_ID\n1,S1\n").unwrap_err();
        assert!(matches!(err, DemuxError::Format(_)), "{err}");
    }

    #[test]
    fn duplicate_data_marker_is_format_error() {
        let content = "[Data]\nLane,Sample_ID\n1,S1\n[Data]\nLane,Sample_ID\n2,S2\n";
        let err = SampleSheet::parse(content).unwrap_err();
        assert!(matches!(err, DemuxError::Format(_)), "{err}");
        assert!(err.to_string().contains("found 2"));
    }

    #[test]
    fn bad_lane_names_the_row() {
        let content = "[Data]\nLane,Sample_ID,index\n1,S1,AAAA\nfour,S2,CCCC\n";
        let err = SampleSheet::parse(content).unwrap_err();
        assert!(matches!(err, DemuxError::Format(_)));
        assert!(err.to_string().contains("row 1"), "{err}");
    }

    #[test]
    fn quoted_cells_keep_commas() {
        let content = "[Data]\nSample_ID,Description\nS1,\"a, b\"\n";
        let sheet = SampleSheet::parse(content).expect("parse failed");
        assert_eq!(sheet.samples()[0].description.as_deref(), Some("a, b"));
    }

    #[test]
    fn rendered_sheet_parses_back_to_same_records() {
        let records = vec![
            SampleRecord::new("S1", "first", "ACGTACGT", "Proj")
                .with_lane(1)
                .with_index2("TTTTGGGG")
                .with_description("size:300, frag"),
            SampleRecord::new("S2", "second", "CCCCAAAA", "Proj")
                .with_lane(2)
                .with_index2("")
                .with_description(""),
        ];
        let text = render_sample_sheet(&records).expect("render failed");
        let parsed = SampleSheet::parse(&text).expect("parse failed");
        assert_eq!(parsed.into_samples(), records);
    }

    #[test]
    fn render_rejects_cells_that_break_sections() {
        let marker = vec![
            SampleRecord::new("S1", "first", "ACGTACGT", "Proj"),
            SampleRecord::new("S2", "second", "CCCCAAAA", "Proj").with_description("see [Data]"),
        ];
        let err = render_sample_sheet(&marker).unwrap_err();
        assert!(matches!(err, DemuxError::Format(_)));
        assert!(err.to_string().contains("record 2"));
        assert!(err.to_string().contains("Description"));

        let newline = vec![SampleRecord::new("S1", "two\nlines", "ACGTACGT", "Proj")];
        let err = render_sample_sheet(&newline).unwrap_err();
        assert!(err.to_string().contains("Sample_Name"));

        let carriage = vec![SampleRecord::new("S1\r", "first", "ACGTACGT", "Proj")];
        assert!(render_sample_sheet(&carriage).is_err());
    }

    #[test]
    fn from_path_missing_file_is_not_found() {
        let err = SampleSheet::from_path(Path::new("/nonexistent/demuxq/SampleSheet.csv"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
