use chrono::prelude::*;
pub mod cli;
pub mod config;
pub mod error;
pub mod plot;
pub mod select;
pub mod source;

pub use error::{Result, VisualizerError};

pub const VERSION: Option<&'static str> = option_env!("CARGO_PKG_VERSION");

pub const DT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named value column of a time series
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<f64>,
}

impl Column {
    pub fn new(name: &str, capacity: usize) -> Column {
        Column {
            name: name.to_string(),
            values: Vec::with_capacity(capacity),
        }
    }
}

/// The main struct for the time series to plot:
/// one timestamp index shared by any number of value columns.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub time: Vec<NaiveDateTime>,
    pub columns: Vec<Column>,
}

impl TimeSeries {
    pub fn new(names: &[&str], capacity: usize) -> TimeSeries {
        let time: Vec<NaiveDateTime> = Vec::with_capacity(capacity);
        let columns = names.iter().map(|n| Column::new(n, capacity)).collect();
        TimeSeries { time, columns }
    }

    /// push one row, the values must follow the column order
    pub fn push(&mut self, dt: NaiveDateTime, values: &[f64]) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.time.push(dt);
        for (c, v) in self.columns.iter_mut().zip(values.iter()) {
            c.values.push(*v);
        }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// keeps only the named columns, in the order given by `names`;
    /// unknown names are dropped
    pub fn select(&self, names: &[String]) -> TimeSeries {
        let columns = names
            .iter()
            .filter_map(|n| self.column(n).cloned())
            .collect();
        TimeSeries {
            time: self.time.clone(),
            columns,
        }
    }
}

impl std::fmt::Display for TimeSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "datetime")?;
        for c in self.columns.iter() {
            write!(f, ",{}", c.name)?;
        }
        writeln!(f)?;
        for (i, t) in self.time.iter().enumerate() {
            write!(f, "{}", t.format(DT_FORMAT))?;
            for c in self.columns.iter() {
                write!(f, ",{}", c.values[i])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Result of parsing a data file: a two-level index,
/// outer group key (archive entry, symbol) and inner timestamp.
#[derive(Debug, Clone, Default)]
pub struct ParsedData {
    pub groups: Vec<(String, TimeSeries)>,
}

impl ParsedData {
    pub fn new() -> ParsedData {
        ParsedData { groups: Vec::new() }
    }

    pub fn push_group(&mut self, key: &str, series: TimeSeries) {
        self.groups.push((key.to_string(), series));
    }

    /// narrows to the first outer group, the others are dropped:
    /// multi-symbol archives are only partially represented
    pub fn first_group(self) -> Result<(String, TimeSeries)> {
        self.groups
            .into_iter()
            .next()
            .ok_or_else(|| VisualizerError::DataAccess("parsed data has no groups".to_string()))
    }
}

/// min and max of a slice, NAN values are never selected
pub fn min_and_max<T: std::cmp::PartialOrd + Copy>(s: &[T]) -> Option<(T, T)> {
    let mut self_iter = s.iter().filter(|v| v.partial_cmp(v).is_some());
    let (mut min, mut max) = match self_iter.next() {
        Some(v) => (*v, *v),
        None => return None,
    };
    for es in self_iter {
        if *es > max {
            max = *es
        }
        if *es < min {
            min = *es
        }
    }
    Some((min, max))
}

pub fn suitable_xfmt(d: chrono::Duration) -> &'static str {
    if d > chrono::Duration::weeks(52) {
        "%Y-%m"
    } else if d > chrono::Duration::weeks(1) {
        "%y-%m-%d"
    } else if d > chrono::Duration::days(1) {
        "%m-%d %H"
    } else {
        "%d %H:%M"
    }
}
