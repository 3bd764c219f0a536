//! Titanic data version preparation
//!
//! Cleans the raw passenger CSV and writes the training sets the default
//! data version config points at:
//! - `v1_1_train.csv`: Pclass, Age, SibSp, Fare, Sex_male, Survived
//! - `v1_2_train.csv`: every cleaned column except PassengerId
//! - `v1_3_train.csv`: a seeded 70% row sample of v1.2
//!
//! Cleaning drops Cabin, Name and Ticket, fills Age with its median and
//! Embarked with its most frequent value, then one-hot encodes Sex and
//! Embarked without the first (alphabetical) category. Encoded columns
//! are written as `True`/`False`.

use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::deterministic::LcgRng;
use crate::errors::{Result, TrainerError};

pub const DROPPED_COLUMNS: [&str; 3] = ["Cabin", "Name", "Ticket"];
pub const CATEGORICAL_COLUMNS: [&str; 2] = ["Sex", "Embarked"];
pub const SUBSET_FRACTION: f64 = 0.7;

const V1_1_COLUMNS: [&str; 6] = ["Pclass", "Age", "SibSp", "Fare", "Sex_male", "Survived"];

#[derive(Debug, Clone, PartialEq)]
enum Values {
    Numeric {
        values: Vec<Option<f64>>,
        integer: bool,
    },
    Category(Vec<Option<String>>),
    Flag(Vec<bool>),
}

impl Values {
    fn render(&self, row: usize) -> String {
        match self {
            Values::Numeric { values, integer } => match values[row] {
                Some(v) if *integer => format!("{}", v as i64),
                Some(v) => format!("{v:?}"),
                None => String::new(),
            },
            Values::Category(values) => values[row].clone().unwrap_or_default(),
            Values::Flag(values) => String::from(if values[row] { "True" } else { "False" }),
        }
    }

    fn select(&self, rows: &[usize]) -> Values {
        match self {
            Values::Numeric { values, integer } => Values::Numeric {
                values: rows.iter().map(|&r| values[r]).collect(),
                integer: *integer,
            },
            Values::Category(values) => {
                Values::Category(rows.iter().map(|&r| values[r].clone()).collect())
            }
            Values::Flag(values) => Values::Flag(rows.iter().map(|&r| values[r]).collect()),
        }
    }
}

/// Column-oriented table of cleaned passenger data
#[derive(Debug, Clone, PartialEq)]
pub struct PassengerTable {
    names: Vec<String>,
    columns: Vec<Values>,
    n_rows: usize,
}

/// One written data version
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedVersion {
    pub key: String,
    pub path: PathBuf,
    pub rows: usize,
    pub columns: Vec<String>,
}

impl PassengerTable {
    /// Read the raw CSV, dropping the unused text columns
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); header.len()];
        for record in reader.records() {
            let record = record?;
            for (col, cell) in record.iter().enumerate() {
                cells[col].push(cell.to_string());
            }
        }
        let n_rows = cells.first().map_or(0, Vec::len);
        if n_rows == 0 {
            return Err(TrainerError::Dataset("raw passenger data has no rows".to_string()));
        }

        let mut names = Vec::new();
        let mut columns = Vec::new();
        for (name, raw) in header.into_iter().zip(cells) {
            if DROPPED_COLUMNS.contains(&name.as_str()) {
                continue;
            }
            let values = if CATEGORICAL_COLUMNS.contains(&name.as_str()) {
                Values::Category(
                    raw.into_iter()
                        .map(|c| (!c.is_empty()).then_some(c))
                        .collect(),
                )
            } else {
                parse_numeric(&name, &raw)?
            };
            names.push(name);
            columns.push(values);
        }

        Ok(Self {
            names,
            columns,
            n_rows,
        })
    }

    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::File::open(path).map_err(|e| {
            TrainerError::Dataset(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| TrainerError::Dataset(format!("column {name} not found")))
    }

    /// Apply the fills and the one-hot encoding
    pub fn clean(mut self) -> Result<Self> {
        self.fill_median("Age")?;
        self.fill_mode("Embarked")?;
        for name in CATEGORICAL_COLUMNS {
            self.one_hot(name)?;
        }

        for (name, values) in self.names.iter().zip(&self.columns) {
            if let Values::Numeric { values, .. } = values {
                if values.iter().any(Option::is_none) {
                    return Err(TrainerError::Dataset(format!(
                        "column {name} has missing values"
                    )));
                }
            }
        }
        Ok(self)
    }

    fn fill_median(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        let Values::Numeric { values, .. } = &mut self.columns[idx] else {
            return Err(TrainerError::Dataset(format!("column {name} is not numeric")));
        };

        let mut present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return Err(TrainerError::Dataset(format!("column {name} has no values")));
        }
        present.sort_by(f64::total_cmp);
        let mid = present.len() / 2;
        let median = if present.len() % 2 == 0 {
            (present[mid - 1] + present[mid]) / 2.0
        } else {
            present[mid]
        };

        debug!(
            "Filling {} missing {} with median {}",
            values.len() - present.len(),
            name,
            median
        );
        values.iter_mut().filter(|v| v.is_none()).for_each(|v| *v = Some(median));
        Ok(())
    }

    /// Ties go to the alphabetically first value
    fn fill_mode(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        let Values::Category(values) = &mut self.columns[idx] else {
            return Err(TrainerError::Dataset(format!("column {name} is not categorical")));
        };

        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for v in values.iter().flatten() {
            *counts.entry(v.as_str()).or_default() += 1;
        }
        let mode = counts
            .iter()
            .fold(None, |best: Option<(&str, usize)>, (&v, &c)| match best {
                Some((_, bc)) if bc >= c => best,
                _ => Some((v, c)),
            })
            .map(|(v, _)| v.to_string())
            .ok_or_else(|| TrainerError::Dataset(format!("column {name} has no values")))?;

        debug!("Filling missing {} with mode {}", name, mode);
        values
            .iter_mut()
            .filter(|v| v.is_none())
            .for_each(|v| *v = Some(mode.clone()));
        Ok(())
    }

    /// Replace a categorical column with `<name>_<category>` flags appended
    /// at the end, skipping the first category
    fn one_hot(&mut self, name: &str) -> Result<()> {
        let idx = self.index_of(name)?;
        let Values::Category(values) = self.columns.remove(idx) else {
            return Err(TrainerError::Dataset(format!("column {name} is not categorical")));
        };
        self.names.remove(idx);

        let categories: Vec<&String> = values
            .iter()
            .flatten()
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        for category in categories.into_iter().skip(1) {
            let flags = values
                .iter()
                .map(|v| v.as_ref() == Some(category))
                .collect();
            self.names.push(format!("{name}_{category}"));
            self.columns.push(Values::Flag(flags));
        }
        Ok(())
    }

    /// Keep the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.columns[self.index_of(name)?].clone());
        }
        Ok(Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            columns,
            n_rows: self.n_rows,
        })
    }

    pub fn drop_column(&self, name: &str) -> Result<Self> {
        let idx = self.index_of(name)?;
        let mut table = self.clone();
        table.names.remove(idx);
        table.columns.remove(idx);
        Ok(table)
    }

    /// `round(fraction * n)` rows in seeded shuffled order
    pub fn sample(&self, fraction: f64, seed: u64) -> Self {
        let k = ((self.n_rows as f64 * fraction).round() as usize).min(self.n_rows);
        let mut rows: Vec<usize> = (0..self.n_rows).collect();
        LcgRng::new(seed).shuffle(&mut rows);
        rows.truncate(k);

        Self {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(&rows)).collect(),
            n_rows: k,
        }
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path.as_ref())?;
        writer.write_record(&self.names)?;
        for row in 0..self.n_rows {
            writer.write_record(self.columns.iter().map(|c| c.render(row)))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn parse_numeric(name: &str, raw: &[String]) -> Result<Values> {
    let mut integer = true;
    let mut values = Vec::with_capacity(raw.len());
    for (row, cell) in raw.iter().enumerate() {
        if cell.is_empty() {
            integer = false;
            values.push(None);
            continue;
        }
        integer &= cell.parse::<i64>().is_ok();
        let value = cell
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                TrainerError::Dataset(format!(
                    "row {}, column {}: not a number: {}",
                    row + 1,
                    name,
                    cell
                ))
            })?;
        values.push(Some(value));
    }
    Ok(Values::Numeric { values, integer })
}

/// Clean `raw` and write v1.1, v1.2 and v1.3 into `out_dir`
pub fn prepare_versions(raw: &Path, out_dir: &Path, seed: u64) -> Result<Vec<PreparedVersion>> {
    let cleaned = PassengerTable::from_csv(raw)?.clean()?;
    info!(
        "Cleaned {} passengers from {}: {:?}",
        cleaned.n_rows(),
        raw.display(),
        cleaned.column_names()
    );

    let v1_2 = cleaned.drop_column("PassengerId")?;
    let tables = [
        ("1.1", cleaned.select(&V1_1_COLUMNS)?),
        ("1.3", v1_2.sample(SUBSET_FRACTION, seed)),
        ("1.2", v1_2),
    ];

    fs::create_dir_all(out_dir)?;
    let mut written = Vec::with_capacity(tables.len());
    for (key, table) in tables {
        let path = out_dir.join(format!("v{}_train.csv", key.replace('.', "_")));
        table.write_csv(&path)?;
        info!(
            "Wrote data version {} ({} rows) to {}",
            key,
            table.n_rows(),
            path.display()
        );
        written.push(PreparedVersion {
            key: key.to_string(),
            path,
            rows: table.n_rows(),
            columns: table.column_names().to_vec(),
        });
    }
    written.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(written)
}
