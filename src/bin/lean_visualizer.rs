use lean_visualizer::cli::{parse_cli, run};
use lean_visualizer::source::LeanZipSource;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args = parse_cli()?;

    // stdout only carries the plot path
    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let fout = run(&args, &LeanZipSource::new())?;
    println!("{}", fout.display());
    Ok(())
}
