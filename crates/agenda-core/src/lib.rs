pub mod bucket;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod event;
pub mod grid;
pub mod layout;
pub mod mapper;
pub mod normalize;
pub mod pipeline;
pub mod range;
pub mod render;
pub mod source;
pub mod tracker;

use std::ffi::OsString;

use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting agenda CLI"
  );
  debug!(overrides = ?cli.overrides, "parsed config overrides");

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;

  let tz = cfg.timezone();
  let now = datetime::now_in(&tz);
  debug!(%tz, %now, "resolved local time");

  let mut renderer =
    render::Renderer::new(&cfg);

  commands::dispatch(
    &cfg,
    &mut renderer,
    cli.command,
    now
  )?;

  info!("done");
  Ok(())
}
