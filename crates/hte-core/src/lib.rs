pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod date_picker;
pub mod datetime;
pub mod month_grid;
pub mod navigator;
pub mod program;
pub mod range_calendar;
pub mod render;
pub mod schedule;
pub mod session;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting hte CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.hterc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );
  if let Some(now) = cli.now.as_deref()
  {
    cfg.set("clock.now", now);
  }

  let settings =
    session::SessionSettings::from_config(
      &cfg
    )
    .context(
      "failed to read session \
       settings"
    )?;
  let mut session =
    session::Session::bootstrap(
      settings
    );

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv =
    cli::Invocation::parse(cli.rest)?;

  commands::dispatch(
    &mut session,
    &cfg,
    &renderer,
    inv
  )?;

  info!("done");
  Ok(())
}
