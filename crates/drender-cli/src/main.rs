//! d-render command line
//!
//! Loads a page, runs the runtime until the clock is idle and prints the
//! resulting markup.
//!
//! ```text
//! drender page.html [--config config.json] [--component Name]...
//! ```

use anyhow::{Context, bail};
use drender::{ComponentClass, Config, Runtime};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    page: PathBuf,
    config: Option<PathBuf>,
    /// Class names to register without behavior so their markers build
    components: Vec<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut page = None;
    let mut config = None;
    let mut components = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--component" => components.push(args.next().context("--component needs a name")?),
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ if page.is_none() => page = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument {arg}"),
        }
    }
    let page = page.context("usage: drender <page.html> [--config config.json] [--component Name]...")?;
    Ok(Args { page, config, components })
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    let Some(path) = path else { return Ok(Config::default()) };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Config::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = parse_args()?;
    let config = load_config(args.config.as_ref())?;
    let html = std::fs::read_to_string(&args.page).with_context(|| format!("reading {}", args.page.display()))?;

    tracing::info!("Rendering {}", args.page.display());
    let runtime = Runtime::from_html(&html, config)?;
    for name in &args.components {
        runtime.register_component(ComponentClass::new(name))?;
    }
    runtime.start()?;
    runtime.run_until_idle()?;

    let components = runtime.components();
    tracing::info!("{} components live after {} ms", components.len(), runtime.now());
    for component in &components {
        for error in component.setup_errors() {
            tracing::warn!("{}: {}", component.name(), error);
        }
    }

    let doc = runtime.document();
    let root = doc.document_element().unwrap_or(doc.root());
    println!("{}", doc.outer_html(root));
    Ok(())
}
