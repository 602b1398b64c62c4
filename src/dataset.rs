//! Time-indexed forcing/observation records and their CSV adapters.
//!
//! Input rows carry 5 columns: datetime, precipitation (mm/timestep),
//! minimum temperature (C), maximum temperature (C), observed discharge
//! (m^3/s). The model uses the arithmetic mean of min/max temperature.

use std::io::{Read, Write};
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("line {line}: expected 5 columns, found {found}")]
    WrongRowSize { line: usize, found: usize },
    #[error("line {line}: column {column} is empty")]
    EmptyField { line: usize, column: usize },
    #[error("line {line}: `{value}` is not a number")]
    NotANumber { line: usize, value: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One timestep of forcing and observation data.
#[derive(Debug, Clone)]
pub struct ForcingRecord {
    pub datetime: String,
    /// Precipitation (mm/timestep).
    pub precip_mm: f64,
    /// Mean temperature (C), averaged from the min/max input columns.
    pub temp_c: f64,
    /// Observed discharge (m^3/s).
    pub q_obs_m3s: f64,
}

/// Parse forcing records from CSV.
///
/// Rows with an empty first column (or fewer than two fields) are skipped
/// as blank/trailer lines. Every other row must have exactly 5 non-empty
/// columns with columns 2-5 numeric, else the whole input is rejected.
pub fn parse_forcing_csv<R: Read>(reader: R) -> Result<Vec<ForcingRecord>, ParseError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in csv_reader.records() {
        let row = row?;
        let line = row.position().map_or(0, |p| p.line() as usize);

        // Blank and trailer lines
        if row.len() <= 1 || row.get(0).is_none_or(str::is_empty) {
            continue;
        }

        if row.len() != 5 {
            return Err(ParseError::WrongRowSize {
                line,
                found: row.len(),
            });
        }
        for column in 0..5 {
            if row[column].is_empty() {
                return Err(ParseError::EmptyField {
                    line,
                    column: column + 1,
                });
            }
        }

        let number = |field: &str| -> Result<f64, ParseError> {
            field.parse().map_err(|_| ParseError::NotANumber {
                line,
                value: field.to_string(),
            })
        };

        let precip_mm = number(&row[1])?;
        let t_min = number(&row[2])?;
        let t_max = number(&row[3])?;
        let q_obs_m3s = number(&row[4])?;

        records.push(ForcingRecord {
            datetime: row[0].to_string(),
            precip_mm,
            temp_c: 0.5 * (t_min + t_max),
            q_obs_m3s,
        });
    }

    Ok(records)
}

pub fn load_forcing_csv(path: &Path) -> Result<Vec<ForcingRecord>, ParseError> {
    let file = std::fs::File::open(path)?;
    parse_forcing_csv(file)
}

/// Write one row per input timestep: observed forcing alongside the
/// simulated discharge.
pub fn write_simulation_csv<W: Write>(
    writer: W,
    records: &[ForcingRecord],
    simulated: &[f64],
) -> Result<(), ParseError> {
    assert_eq!(
        records.len(),
        simulated.len(),
        "records and simulated discharge must have the same length"
    );

    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Datetime",
        "Precipitation (mm)",
        "Temperature (C)",
        "Observed discharge (m3/s)",
        "Simulated discharge (m3/s)",
    ])?;
    for (record, q_sim) in records.iter().zip(simulated) {
        csv_writer.write_record([
            record.datetime.as_str(),
            &record.precip_mm.to_string(),
            &record.temp_c.to_string(),
            &record.q_obs_m3s.to_string(),
            &q_sim.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_rows() {
        let csv = "2010-01-01,5.0,-2.0,4.0,12.5\n2010-01-02,0.0,1.0,3.0,11.0\n";
        let records = parse_forcing_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].datetime, "2010-01-01");
        assert_eq!(records[0].precip_mm, 5.0);
        assert_eq!(records[0].temp_c, 1.0); // mean of -2 and 4
        assert_eq!(records[1].q_obs_m3s, 11.0);
    }

    #[test]
    fn skips_rows_with_empty_first_column() {
        let csv = "2010-01-01,5.0,-2.0,4.0,12.5\n,,,,\n";
        let records = parse_forcing_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn skips_blank_lines() {
        let csv = "2010-01-01,5.0,-2.0,4.0,12.5\n\n";
        let records = parse_forcing_csv(csv.as_bytes()).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn rejects_wrong_row_size() {
        let csv = "2010-01-01,5.0,-2.0,4.0\n";
        match parse_forcing_csv(csv.as_bytes()) {
            Err(ParseError::WrongRowSize { found, .. }) => assert_eq!(found, 4),
            other => panic!("expected WrongRowSize, got {other:?}"),
        }
    }

    #[test]
    fn rejects_non_numeric_field() {
        let csv = "2010-01-01,5.0,cold,4.0,12.5\n";
        match parse_forcing_csv(csv.as_bytes()) {
            Err(ParseError::NotANumber { value, .. }) => assert_eq!(value, "cold"),
            other => panic!("expected NotANumber, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_field() {
        let csv = "2010-01-01,5.0,,4.0,12.5\n";
        match parse_forcing_csv(csv.as_bytes()) {
            Err(ParseError::EmptyField { column, .. }) => assert_eq!(column, 3),
            other => panic!("expected EmptyField, got {other:?}"),
        }
    }

    #[test]
    fn writes_header_and_rows() {
        let records = vec![ForcingRecord {
            datetime: "2010-01-01".to_string(),
            precip_mm: 5.0,
            temp_c: 1.0,
            q_obs_m3s: 12.5,
        }];
        let mut out = Vec::new();
        write_simulation_csv(&mut out, &records, &[10.25]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Datetime,Precipitation (mm),Temperature (C),Observed discharge (m3/s),Simulated discharge (m3/s)"
        );
        assert_eq!(lines.next().unwrap(), "2010-01-01,5,1,12.5,10.25");
    }
}
