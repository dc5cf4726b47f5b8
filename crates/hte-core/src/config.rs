use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

pub const RC_ENV: &str = "HTERC";
pub const RC_FILE_NAME: &str = ".hterc";

#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let mut map = BTreeMap::new();
    for (key, value) in [
      ("color", "on"),
      (
        "delivery.schedule",
        "every-day"
      ),
      (
        "delivery.slots",
        "06:00-07:00"
      ),
      (
        "calendar.close_delay_ms",
        "300"
      )
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    hterc_override
  ))]
  pub fn load(
    hterc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    let hterc = resolve_hterc_path(
      hterc_override
    )?;
    if let Some(path) = hterc {
      info!(hterc = %path.display(), "loading hterc");
      cfg.load_file(&path)?;
    } else {
      warn!(
        "no hterc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self
      .map
      .get(key)
      .map(|v| v.trim().to_string())
      .filter(|v| !v.is_empty())
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  /// Parses a key with `FromStr`; a present but malformed value is an
  /// error naming the key.
  pub fn get_parsed<T>(
    &self,
    key: &str
  ) -> anyhow::Result<Option<T>>
  where
    T: std::str::FromStr,
    T::Err: std::fmt::Display
  {
    let Some(raw) = self.get(key) else {
      return Ok(None);
    };
    raw
      .parse::<T>()
      .map(Some)
      .map_err(|e| {
        anyhow!(
          "invalid value for {key}: \
           {raw} ({e})"
        )
      })
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_hterc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(hterc_env) =
    std::env::var(RC_ENV)
  {
    if hterc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      hterc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    debug!(
      "cannot determine home \
       directory; skipping ~/.hterc"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::Config;

  #[test]
  fn defaults_cover_calendar_keys() {
    let cfg = Config::default();
    assert_eq!(
      cfg.get("delivery.schedule").as_deref(),
      Some("every-day")
    );
    assert_eq!(
      cfg
        .get_parsed::<u64>(
          "calendar.close_delay_ms"
        )
        .expect("parse"),
      Some(300)
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
    assert!(cfg.get("clock.now").is_none());
  }

  #[test]
  fn loads_file_with_include_and_comments()
  {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "program.duration=7\n"
    )
    .expect("write include");
    let main = dir.path().join("main.rc");
    fs::write(
      &main,
      "# store demo\n\
       clock.now=2025-09-01T10:00 # injected\n\
       include extra.rc\n\n\
       delivery.schedule = every-other-day\n"
    )
    .expect("write rc");

    let cfg = Config::load(Some(&main))
      .expect("load");
    assert_eq!(cfg.loaded_files.len(), 2);
    assert_eq!(
      cfg.get("clock.now").as_deref(),
      Some("2025-09-01T10:00")
    );
    assert_eq!(
      cfg.get("program.duration").as_deref(),
      Some("7")
    );
    assert_eq!(
      cfg.get("delivery.schedule").as_deref(),
      Some("every-other-day")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::default();
    cfg.apply_overrides([
      (
        "rc.program.duration".to_string(),
        "5".to_string()
      ),
      (
        "color".to_string(),
        "off".to_string()
      )
    ]);
    assert_eq!(
      cfg.get_parsed::<u32>("program.duration").expect("parse"),
      Some(5)
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
  }

  #[test]
  fn malformed_line_is_an_error() {
    let dir = tempfile::tempdir()
      .expect("tempdir");
    let main = dir.path().join("bad.rc");
    fs::write(&main, "no equals sign\n")
      .expect("write rc");
    assert!(Config::load(Some(&main)).is_err());
  }

  #[test]
  fn malformed_value_names_the_key() {
    let mut cfg = Config::default();
    cfg.set("program.duration", "five");
    let err = cfg
      .get_parsed::<u32>("program.duration")
      .expect_err("should fail");
    assert!(err.to_string().contains("program.duration"));
  }
}
