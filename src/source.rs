use crate::{ParsedData, Result, TimeSeries, VisualizerError};
use chrono::prelude::*;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// equity prices are stored as integers in units of 1/10000 of a dollar
pub const EQUITY_PRICE_SCALE: f64 = 10000.;

pub const LOW_RES_DT_FORMAT: &str = "%Y%m%d %H:%M";
pub const DATE_FORMAT: &str = "%Y%m%d";

const MS_PER_DAY: f64 = 86_400_000.;

/// A zipped data file, optionally with the name of one entry in the archive,
/// written on the command line as `archive.zip#entry.csv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFileRef {
    pub archive: PathBuf,
    pub entry: Option<String>,
}

impl DataFileRef {
    pub fn new(archive: PathBuf, entry: Option<String>) -> DataFileRef {
        DataFileRef { archive, entry }
    }

    /// splits on the first `#`, an empty selector counts as none
    pub fn parse(s: &str) -> DataFileRef {
        match s.split_once('#') {
            Some((archive, entry)) if !entry.is_empty() => {
                DataFileRef::new(PathBuf::from(archive), Some(entry.to_string()))
            }
            Some((archive, _)) => DataFileRef::new(PathBuf::from(archive), None),
            None => DataFileRef::new(PathBuf::from(s), None),
        }
    }
}

impl std::fmt::Display for DataFileRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.entry {
            Some(e) => write!(f, "{}#{}", self.archive.display(), e),
            None => write!(f, "{}", self.archive.display()),
        }
    }
}

/// Anything able to turn a data file into a two-level indexed table.
pub trait DataSource {
    fn load(&self, file: &DataFileRef) -> Result<ParsedData>;
}

/// Loads the file and narrows the result to its first group.
pub fn load_series(source: &dyn DataSource, file: &DataFileRef) -> Result<TimeSeries> {
    let parsed = source.load(file)?;
    let n_groups = parsed.groups.len();
    let (key, series) = parsed.first_group()?;
    if n_groups > 1 {
        info!(group = %key, skipped = n_groups - 1, "plotting only the first group");
    }
    debug!(group = %key, rows = series.len(), columns = ?series.column_names(), "series loaded");
    Ok(series)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Tick,
    Second,
    Minute,
    Hour,
    Daily,
}

impl Resolution {
    /// the first path component naming a resolution
    pub fn from_path(path: &Path) -> Option<Resolution> {
        path.components()
            .filter_map(|c| c.as_os_str().to_str())
            .find_map(|c| match c {
                "tick" => Some(Resolution::Tick),
                "second" => Some(Resolution::Second),
                "minute" => Some(Resolution::Minute),
                "hour" => Some(Resolution::Hour),
                "daily" => Some(Resolution::Daily),
                _ => None,
            })
    }

    pub fn is_intraday(self) -> bool {
        !matches!(self, Resolution::Hour | Resolution::Daily)
    }
}

/// `path` joined to the working directory when relative, the file need not exist
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    Ok(absolute_from(&std::env::current_dir()?, path))
}

pub fn absolute_from(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// false when any path component is `hour` or `daily`, true otherwise
pub fn is_intraday_path(path: &Path) -> bool {
    !path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .any(|c| c == "hour" || c == "daily")
}

/// Csv layouts of the LEAN data files, the time column excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    TradeBar,
    QuoteBar,
    OpenInterest,
    TradeTick,
    QuoteTick,
    ForexTick,
}

impl Layout {
    /// security type from the path components, data type from the file and entry names
    pub fn detect(archive: &Path, entry: &str, resolution: Resolution) -> Layout {
        let parts: Vec<String> = archive
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .map(|c| c.to_lowercase())
            .collect();
        let names = format!(
            "{}#{}",
            parts.last().map(String::as_str).unwrap_or_default(),
            entry
        )
        .to_lowercase();
        let quote_market = parts.iter().any(|p| p == "forex" || p == "cfd");
        if names.contains("openinterest") || parts.iter().any(|p| p == "openinterest") {
            Layout::OpenInterest
        } else if resolution == Resolution::Tick {
            if quote_market {
                Layout::ForexTick
            } else if names.contains("quote") {
                Layout::QuoteTick
            } else {
                Layout::TradeTick
            }
        } else if quote_market || names.contains("quote") {
            Layout::QuoteBar
        } else {
            Layout::TradeBar
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Layout::TradeBar => &["open", "high", "low", "close", "volume"],
            Layout::QuoteBar => &[
                "bidopen", "bidhigh", "bidlow", "bidclose", "bidsize", "askopen", "askhigh",
                "asklow", "askclose", "asksize",
            ],
            Layout::OpenInterest => &["openinterest"],
            Layout::TradeTick => &["lastprice", "quantity"],
            Layout::QuoteTick => &["bidprice", "bidsize", "askprice", "asksize"],
            Layout::ForexTick => &["bidprice", "askprice"],
        }
    }
}

fn is_price_column(name: &str) -> bool {
    !(name.ends_with("size") || name == "volume" || name == "quantity" || name == "openinterest")
}

/// Reads the zipped LEAN csv files directly.
/// Only one entry is read: the selected one, or else the first csv entry of the archive.
/// The group is keyed by the entry name.
#[derive(Debug, Clone, Default)]
pub struct LeanZipSource;

impl LeanZipSource {
    pub fn new() -> LeanZipSource {
        LeanZipSource
    }
}

impl DataSource for LeanZipSource {
    fn load(&self, file: &DataFileRef) -> Result<ParsedData> {
        // the markers may sit above the working directory
        let path = absolute_path(&file.archive)?;
        let resolution = Resolution::from_path(&path).ok_or_else(|| {
            VisualizerError::Usage(format!(
                "data type or resolution of {} not supported",
                path.display()
            ))
        })?;
        let handle = File::open(&path).map_err(|e| {
            VisualizerError::DataAccess(format!("could not open {}: {}", path.display(), e))
        })?;
        let mut archive = ZipArchive::new(handle).map_err(|e| zip_error(&path, e))?;
        let is_equity = path.components().any(|c| c.as_os_str() == "equity");

        let (name, buffer) = match &file.entry {
            Some(name) => {
                let mut entry = archive.by_name(name).map_err(|e| match e {
                    ZipError::FileNotFound => VisualizerError::DataAccess(format!(
                        "there is no entry named {} in {}",
                        name,
                        path.display()
                    )),
                    e => zip_error(&path, e),
                })?;
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                (name.clone(), buffer)
            }
            None => read_first_csv(&mut archive, &path)?,
        };

        let layout = Layout::detect(&path, &name, resolution);
        debug!(entry = %name, ?resolution, ?layout, "parsing entry");
        let mut series = parse_entry(&name, &buffer, resolution, layout)?;
        if series.is_empty() {
            return Err(VisualizerError::DataAccess(format!(
                "no valid rows found in {}#{}",
                path.display(),
                name
            )));
        }
        if is_equity {
            for c in series.columns.iter_mut().filter(|c| is_price_column(&c.name)) {
                c.values.iter_mut().for_each(|v| *v /= EQUITY_PRICE_SCALE);
            }
        }
        let mut parsed = ParsedData::new();
        parsed.push_group(&name, series);
        Ok(parsed)
    }
}

fn read_first_csv(archive: &mut ZipArchive<File>, path: &Path) -> Result<(String, Vec<u8>)> {
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| zip_error(path, e))?;
        if !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }
        let mut buffer = Vec::new();
        entry.read_to_end(&mut buffer)?;
        return Ok((entry.name().to_string(), buffer));
    }
    Err(VisualizerError::DataAccess(format!(
        "no csv payload found inside {}",
        path.display()
    )))
}

fn zip_error(archive: &Path, e: ZipError) -> VisualizerError {
    VisualizerError::DataAccess(format!("could not read zip {}: {}", archive.display(), e))
}

/// the day of intraday files is given by the first 8 characters of the entry file name
fn entry_date(entry: &str) -> Result<NaiveDate> {
    let file_name = entry.rsplit('/').next().unwrap_or(entry);
    let invalid = || {
        VisualizerError::DataAccess(format!(
            "could not read the date from the entry name {}",
            entry
        ))
    };
    let prefix = file_name.get(..8).ok_or_else(invalid)?;
    NaiveDate::parse_from_str(prefix, DATE_FORMAT).map_err(|_| invalid())
}

fn parse_low_res_time(field: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(field, LOW_RES_DT_FORMAT)
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(field, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// milliseconds since midnight, None outside of the day
fn parse_intraday_time(midnight: NaiveDateTime, field: &str) -> Option<NaiveDateTime> {
    let ms = field.parse::<f64>().ok()?;
    if !ms.is_finite() || ms < 0. || ms >= MS_PER_DAY {
        return None;
    }
    midnight.checked_add_signed(chrono::Duration::milliseconds(ms as i64))
}

fn parse_entry(
    name: &str,
    buffer: &[u8],
    resolution: Resolution,
    layout: Layout,
) -> Result<TimeSeries> {
    let midnight = if resolution.is_intraday() {
        entry_date(name)?.and_hms_opt(0, 0, 0)
    } else {
        None
    };
    let names = layout.columns();
    let mut series = TimeSeries::new(names, 1024);
    let mut values: Vec<f64> = Vec::with_capacity(names.len());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(buffer);
    for (n, record) in reader.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                warn!(entry = %name, line = n + 1, error = %e, "could not read csv line");
                continue;
            }
        };
        let time_field = record.get(0).unwrap_or_default();
        let dt = match midnight {
            Some(m) => parse_intraday_time(m, time_field),
            None => parse_low_res_time(time_field),
        };
        let dt = match dt {
            Some(dt) => dt,
            None => {
                warn!(entry = %name, line = n + 1, "invalid time {:?}", time_field);
                continue;
            }
        };
        values.clear();
        for i in 1..=names.len() {
            match record.get(i).and_then(|v| v.parse::<f64>().ok()) {
                Some(v) => values.push(v),
                None => break,
            }
        }
        if values.len() != names.len() {
            warn!(entry = %name, line = n + 1, "expected {} values", names.len());
            continue;
        }
        series.push(dt, &values);
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn parse_splits_on_first_hash() {
        let r = DataFileRef::parse("option/usa/minute/aapl/20140609_quote_american.zip#a#b.csv");
        assert_eq!(
            r.archive,
            PathBuf::from("option/usa/minute/aapl/20140609_quote_american.zip")
        );
        assert_eq!(r.entry.as_deref(), Some("a#b.csv"));
        assert_eq!(r.to_string(), "option/usa/minute/aapl/20140609_quote_american.zip#a#b.csv");

        assert_eq!(DataFileRef::parse("spy.zip").entry, None);
        assert_eq!(DataFileRef::parse("spy.zip#").entry, None);
    }

    #[test]
    fn resolution_from_path_components() {
        let r = |p: &str| Resolution::from_path(Path::new(p));
        assert_eq!(r("data/equity/usa/daily/spy.zip"), Some(Resolution::Daily));
        assert_eq!(r("data/forex/fxcm/minute/eurusd/20160623_quote.zip"), Some(Resolution::Minute));
        assert_eq!(r("data/future/tick/openinterest/ES.zip"), Some(Resolution::Tick));
        assert_eq!(r("data/equity/usa/hourly/spy.zip"), None);
        assert!(!Resolution::Hour.is_intraday());
        assert!(Resolution::Second.is_intraday());
    }

    #[test]
    fn intraday_path_polarity() {
        assert!(!is_intraday_path(Path::new("data/equity/usa/daily/AAPL.zip")));
        assert!(!is_intraday_path(Path::new("data/equity/usa/hour/AAPL.zip")));
        assert!(is_intraday_path(Path::new("data/equity/usa/minute/aapl/20140609_trade.zip")));
        assert!(is_intraday_path(Path::new("data/equity/usa/tick/aapl/20140609_trade.zip")));
    }

    #[test]
    fn layout_detection() {
        let l = |p: &str, entry: &str| {
            let p = Path::new(p);
            Layout::detect(p, entry, Resolution::from_path(p).unwrap())
        };
        assert_eq!(l("equity/usa/daily/spy.zip", "spy.csv"), Layout::TradeBar);
        assert_eq!(l("cfd/oanda/daily/jp225usd.zip", "jp225usd.csv"), Layout::QuoteBar);
        assert_eq!(l("crypto/gdax/daily/btcusd_quote.zip", "btcusd.csv"), Layout::QuoteBar);
        assert_eq!(
            l("future/usa/tick/es/20131008_openinterest.zip", "20131008_es.csv"),
            Layout::OpenInterest
        );
        assert_eq!(l("future/tick/openinterest/ES.zip", "es.csv"), Layout::OpenInterest);
        assert_eq!(l("equity/usa/tick/spy/20131008_quote.zip", "x.csv"), Layout::QuoteTick);
        assert_eq!(l("equity/usa/tick/spy/20131008_trade.zip", "x.csv"), Layout::TradeTick);
        assert_eq!(
            l("forex/fxcm/tick/eurusd/20140501_quote.zip", "x.csv"),
            Layout::ForexTick
        );
        assert_eq!(
            l("option/usa/minute/aapl/20140609.zip", "20140609_aapl_minute_quote_american.csv"),
            Layout::QuoteBar
        );
    }

    #[test]
    fn daily_equity_is_scaled() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("equity/usa/daily/spy.zip");
        write_zip(
            &path,
            &[(
                "spy.csv",
                "19980102 00:00,1000000,1010000,990000,1005000,100\n\
                 19980105 00:00,1005000,1020000,1000000,1015000,200\n",
            )],
        );
        let parsed = LeanZipSource::new()
            .load(&DataFileRef::new(path, None))
            .unwrap();
        let (key, series) = parsed.first_group().unwrap();
        assert_eq!(key, "spy.csv");
        assert_eq!(series.len(), 2);
        assert_eq!(
            series.time[1],
            NaiveDate::from_ymd_opt(1998, 1, 5).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert_eq!(series.column("close").unwrap().values, vec![100.5, 101.5]);
        assert_eq!(series.column("volume").unwrap().values, vec![100., 200.]);
    }

    #[test]
    fn minute_quotes_use_entry_date_and_milliseconds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forex/fxcm/minute/eurusd/20160623_quote.zip");
        write_zip(
            &path,
            &[(
                "20160623_eurusd_minute_quote.csv",
                "60000,1.1,1.2,1.0,1.15,5,1.2,1.3,1.1,1.25,6\n\
                 bad,line\n\
                 120000,1.15,1.2,1.1,1.18,5,1.25,1.3,1.2,1.28,6\n",
            )],
        );
        let series = load_series(&LeanZipSource::new(), &DataFileRef::new(path, None)).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.columns.len(), 10);
        assert_eq!(
            series.time[0],
            NaiveDate::from_ymd_opt(2016, 6, 23).unwrap().and_hms_opt(0, 1, 0).unwrap()
        );
        assert_eq!(series.column("askclose").unwrap().values, vec![1.25, 1.28]);
    }

    #[test]
    fn entry_selector_picks_one_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future/usa/minute/gc/20131008_trade.zip");
        write_zip(
            &path,
            &[
                ("20131008_gc_minute_trade_201312.csv", "0,1,2,0.5,1.5,10\n"),
                ("20131008_gc_minute_trade_201402.csv", "0,3,4,2.5,3.5,20\n"),
            ],
        );
        let source = LeanZipSource::new();
        let first = source.load(&DataFileRef::new(path.clone(), None)).unwrap();
        assert_eq!(first.groups.len(), 1);
        assert_eq!(first.groups[0].0, "20131008_gc_minute_trade_201312.csv");

        let one = DataFileRef::new(path.clone(), Some("20131008_gc_minute_trade_201402.csv".into()));
        let series = load_series(&source, &one).unwrap();
        assert_eq!(series.column("close").unwrap().values, vec![3.5]);

        let bad = DataFileRef::new(path, Some("some_bad_name".into()));
        assert!(matches!(source.load(&bad), Err(VisualizerError::DataAccess(_))));
    }

    #[test]
    fn unused_entries_are_not_parsed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future/usa/minute/gc/20131008_trade.zip");
        write_zip(
            &path,
            &[
                ("readme.txt", "not a csv\n"),
                ("20131008_gc_minute_trade_201312.csv", "0,1,2,0.5,1.5,10\n"),
                ("contract_list.csv", "no date prefix here\n"),
            ],
        );
        let series = load_series(&LeanZipSource::new(), &DataFileRef::new(path, None)).unwrap();
        assert_eq!(series.column("close").unwrap().values, vec![1.5]);
    }

    #[test]
    fn out_of_day_milliseconds_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("equity/usa/minute/spy/20131008_trade.zip");
        write_zip(
            &path,
            &[(
                "20131008_spy_minute_trade.csv",
                "1e20,1,2,0.5,1.5,10\n\
                 inf,1,2,0.5,1.5,10\n\
                 NaN,1,2,0.5,1.5,10\n\
                 -5,1,2,0.5,1.5,10\n\
                 86400000,1,2,0.5,1.5,10\n\
                 60000,10000,20000,5000,15000,10\n",
            )],
        );
        let series = load_series(&LeanZipSource::new(), &DataFileRef::new(path, None)).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(
            series.time[0],
            NaiveDate::from_ymd_opt(2013, 10, 8).unwrap().and_hms_opt(0, 1, 0).unwrap()
        );
        assert_eq!(series.column("close").unwrap().values, vec![1.5]);
    }

    #[test]
    fn relative_paths_are_joined_to_the_base() {
        let base = Path::new("/lean/data/equity/usa");
        assert_eq!(
            absolute_from(base, Path::new("daily/spy.zip")),
            PathBuf::from("/lean/data/equity/usa/daily/spy.zip")
        );
        assert_eq!(
            absolute_from(base, Path::new("/other/minute/spy.zip")),
            PathBuf::from("/other/minute/spy.zip")
        );
        // the markers above the working directory now count
        let joined = absolute_from(base, Path::new("daily/spy.zip"));
        assert_eq!(Resolution::from_path(&joined), Some(Resolution::Daily));
        assert!(!is_intraday_path(&joined));
        assert!(absolute_path(Path::new("spy.zip")).unwrap().is_absolute());
    }

    #[test]
    fn tick_open_interest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("future/usa/tick/es/20131008_openinterest.zip");
        write_zip(
            &path,
            &[("20131008_es_tick_openinterest_201312.csv", "0,2500\n3600000,2600\n")],
        );
        let series = load_series(&LeanZipSource::new(), &DataFileRef::new(path, None)).unwrap();
        assert_eq!(series.column_names(), vec!["openinterest"]);
        assert_eq!(series.columns[0].values, vec![2500., 2600.]);
        assert_eq!(series.time[1].hour(), 1);
    }

    #[test]
    fn missing_archive_is_a_data_access_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("equity/usa/daily/none.zip");
        let r = LeanZipSource::new().load(&DataFileRef::new(path, None));
        assert!(matches!(r, Err(VisualizerError::DataAccess(_))));
    }

    #[test]
    fn unknown_resolution_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("equity/usa/weekly/spy.zip");
        write_zip(&path, &[("spy.csv", "19980102 00:00,1,1,1,1,1\n")]);
        let r = LeanZipSource::new().load(&DataFileRef::new(path, None));
        assert!(matches!(r, Err(VisualizerError::Usage(_))));
    }

    #[test]
    fn no_valid_rows_is_a_data_access_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("equity/usa/daily/spy.zip");
        write_zip(&path, &[("spy.csv", "not,a,bar\n")]);
        let r = LeanZipSource::new().load(&DataFileRef::new(path, None));
        assert!(matches!(r, Err(VisualizerError::DataAccess(_))));
    }
}
