use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV is empty")]
    Empty,
    #[error("CSV has a header but no data rows")]
    NoRows,
    #[error("row {row}, column '{column}': '{value}' is not a number")]
    NotNumeric {
        row: usize,
        column: String,
        value: String,
    },
    #[error("expected {expected} prediction labels, got {got}")]
    LabelCount { expected: usize, got: usize },
    #[error("CSV write error: {0}")]
    Write(String),
}

/// Rectangular table of named numeric columns, the interchange format
/// between CSV parsing, prediction and visualization.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self { columns, rows }
    }

    /// Parse an uploaded CSV body. The first record is the header row;
    /// every cell below it must parse as a number.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, TableError> {
        let text = std::str::from_utf8(bytes)?;
        let mut reader = csv::Reader::from_reader(text.as_bytes());

        let columns: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
            return Err(TableError::Empty);
        }

        let mut rows = Vec::new();
        for (row_no, result) in reader.records().enumerate() {
            let record = result?;
            let mut row = Vec::with_capacity(columns.len());
            for (col_idx, value) in record.iter().enumerate() {
                let parsed =
                    value
                        .trim()
                        .parse::<f64>()
                        .map_err(|_| TableError::NotNumeric {
                            row: row_no,
                            column: columns
                                .get(col_idx)
                                .cloned()
                                .unwrap_or_else(|| col_idx.to_string()),
                            value: value.to_string(),
                        })?;
                row.push(parsed);
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(TableError::NoRows);
        }

        Ok(Self { columns, rows })
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[idx]).collect()
    }

    /// Re-encode the table as CSV with one extra `predictions` column,
    /// preserving column order and row count.
    pub fn to_csv_with_predictions(&self, labels: &[String]) -> Result<String, TableError> {
        if labels.len() != self.rows.len() {
            return Err(TableError::LabelCount {
                expected: self.rows.len(),
                got: labels.len(),
            });
        }

        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        header.push("predictions");
        writer.write_record(&header)?;

        for (row, label) in self.rows.iter().zip(labels) {
            let mut record: Vec<String> = row.iter().map(|v| v.to_string()).collect();
            record.push(label.clone());
            writer.write_record(&record)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| TableError::Write(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| TableError::Write(e.to_string()))
    }
}
