use crate::config::{resolve_assembly_folder, Config, CONFIG_FILE};
use crate::plot::{render, PlotSize, PlotSpec, DEFAULT_SIZE};
use crate::select::select_columns;
use crate::source::{absolute_path, is_intraday_path, load_series, DataFileRef, DataSource};
use crate::{Result, VisualizerError, VERSION};
use clap::{App, Arg, ErrorKind};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

/// The arguments of one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    /// zip file as typed, possibly with a `#entry` suffix
    pub datafile: String,
    /// entry of an option or future archive
    pub csvfile: Option<String>,
    /// PLOTFILE or --output; None for an auto-named plot
    pub output: Option<PathBuf>,
    pub size: PlotSize,
    pub config: PathBuf,
    pub verbose: bool,
}

impl CliArgs {
    pub fn data_file_ref(&self) -> Result<DataFileRef> {
        let file = DataFileRef::parse(&self.datafile);
        match (&file.entry, &self.csvfile) {
            (Some(_), Some(_)) => Err(VisualizerError::Usage(
                "give the csv entry either as CSVFILE or as DATAFILE#entry, not both".to_string(),
            )),
            (None, Some(csv)) => Ok(DataFileRef::new(file.archive, Some(csv.clone()))),
            _ => Ok(file),
        }
    }

    /// the given output path, or a random name in the default output folder,
    /// created if needed
    pub fn output_path(&self, config: &Config) -> Result<PathBuf> {
        match &self.output {
            Some(p) => Ok(with_png_extension(p)),
            None => {
                let folder = config.output_folder()?;
                std::fs::create_dir_all(folder).map_err(|e| {
                    VisualizerError::Render(format!(
                        "could not create output folder {}: {}",
                        folder.display(),
                        e
                    ))
                })?;
                Ok(folder.join(random_png_name()))
            }
        }
    }
}

/// 8 hex characters and the png extension
pub fn random_png_name() -> String {
    format!("{:08x}.png", rand::random::<u32>())
}

/// appends .png unless the path already has that extension
pub fn with_png_extension(p: &Path) -> PathBuf {
    match p.extension().and_then(|e| e.to_str()) {
        Some(e) if e.eq_ignore_ascii_case("png") => p.to_path_buf(),
        _ => {
            let mut s = p.as_os_str().to_owned();
            s.push(".png");
            PathBuf::from(s)
        }
    }
}

fn app<'a, 'b>() -> App<'a, 'b> {
    let arg_datafile = Arg::with_name("DATAFILE")
        .help("path to the zipped data file to plot, optionally as file.zip#entry.csv")
        .required(true)
        .index(1);
    let arg_plotfile = Arg::with_name("PLOTFILE")
        .help("path of the output plot, .png is appended if missing")
        .index(2);
    let arg_csvfile = Arg::with_name("CSVFILE")
        .help(
            "csv entry to plot from an option or future archive; the order is \
             DATAFILE PLOTFILE CSVFILE, not DATAFILE CSVFILE PLOTFILE, \
             so without a PLOTFILE use DATAFILE#CSVFILE",
        )
        .index(3);
    let arg_output = Arg::with_name("output")
        .help("path of the output plot, same as PLOTFILE; without either a random name is used")
        .short("o")
        .long("output")
        .takes_value(true)
        .conflicts_with("PLOTFILE");
    let arg_size = Arg::with_name("size")
        .help("plot size in pixels, horizontal first")
        .short("s")
        .long("size")
        .value_name("width,height")
        .takes_value(true)
        .default_value(DEFAULT_SIZE);
    let arg_config = Arg::with_name("config")
        .help("json file with the assembly_folder and default_output_folder")
        .short("c")
        .long("config")
        .takes_value(true)
        .default_value(CONFIG_FILE);
    let arg_verbose = Arg::with_name("verbose")
        .help("print verbose information")
        .short("v")
        .long("verbose")
        .takes_value(false)
        .required(false);
    App::new("lean_visualizer")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to plot the time series of a zipped LEAN data file to png")
        .arg(arg_datafile)
        .arg(arg_plotfile)
        .arg(arg_csvfile)
        .arg(arg_output)
        .arg(arg_size)
        .arg(arg_config)
        .arg(arg_verbose)
}

/// Takes the CLI arguments of the process.
pub fn parse_cli() -> Result<CliArgs> {
    parse_cli_from(std::env::args_os())
}

/// Takes the CLI arguments from an iterator, the first item is the program name.
/// Help and version requests print and exit.
pub fn parse_cli_from<I, T>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = match app().get_matches_from_safe(args) {
        Ok(m) => m,
        Err(e) if e.kind == ErrorKind::HelpDisplayed || e.kind == ErrorKind::VersionDisplayed => {
            e.exit()
        }
        Err(e) => return Err(VisualizerError::Usage(e.message)),
    };
    let datafile = cli_args.value_of("DATAFILE").unwrap_or_default().to_string();
    let output = cli_args
        .value_of("PLOTFILE")
        .or_else(|| cli_args.value_of("output"))
        .map(PathBuf::from);
    let csvfile = cli_args.value_of("CSVFILE").map(String::from);
    let size: PlotSize = cli_args.value_of("size").unwrap_or(DEFAULT_SIZE).parse()?;
    let config = PathBuf::from(cli_args.value_of("config").unwrap_or(CONFIG_FILE));
    let verbose = cli_args.is_present("verbose");
    Ok(CliArgs {
        datafile,
        csvfile,
        output,
        size,
        config,
        verbose,
    })
}

/// Runs the whole pipeline and returns the path of the written plot:
/// config, data, column selection, plot.
pub fn run(args: &CliArgs, source: &dyn DataSource) -> Result<PathBuf> {
    let config = Config::load(&args.config)?;
    let assembly_folder = resolve_assembly_folder(&config)?;
    info!(assembly_folder = %assembly_folder.display(), "assemblies found");

    let file = args.data_file_ref()?;
    info!(file = %file, "reading data");
    let series = load_series(source, &file)?;

    // resolution and data type markers may sit above the working directory
    let archive = absolute_path(&file.archive)?;
    let identifier = DataFileRef::new(archive.clone(), file.entry.clone()).to_string();
    let columns = select_columns(&series.column_names(), &identifier);
    let series = series.select(&columns);
    if series.columns.is_empty() {
        return Err(VisualizerError::DataAccess(format!(
            "none of the columns {:?} of {} can be plotted",
            columns, file
        )));
    }
    info!(columns = ?series.column_names(), rows = series.len(), "columns selected");

    let spec = PlotSpec::new(args.size, is_intraday_path(&archive));
    let fout = args.output_path(&config)?;
    info!(plot = %fout.display(), ?spec, "plotting");
    render(&series, &fout, &spec)?;
    Ok(fout)
}
