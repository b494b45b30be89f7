use crate::defaults;
use crate::endpoint::EndpointRegistry;
use crate::error::{ExchangeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

const ROUTES_SECTION: &str = "routes";

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    /// Output stream name → push endpoint feeding it.
    pub routes: BTreeMap<String, String>,
}

/// Engine runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSection {
    pub input_capacity: usize,
    pub verbose: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            input_capacity: defaults::INPUT_CAPACITY,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    ///
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        Self::load_with_overrides(path, &Overrides::new())
    }

    /// Load configuration from a TOML file, then apply `overrides` in order.
    pub fn load_with_overrides(path: &Path, overrides: &Overrides) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExchangeError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ExchangeError::Io(e)
            }
        })?;
        Self::from_toml_str(&contents, overrides)
    }

    /// Parse TOML text and apply `overrides` before deserializing.
    pub fn from_toml_str(contents: &str, overrides: &Overrides) -> Result<Self> {
        let mut table: toml::Table = toml::from_str(contents)?;
        overrides.apply(&mut table)?;
        let config: EngineConfig = toml::Value::Table(table).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks values that have no meaningful default.
    pub fn validate(&self) -> Result<()> {
        if self.engine.input_capacity == 0 {
            return Err(ExchangeError::ConfigInvalidValue {
                key: "engine.input_capacity".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some((stream, _)) = self.routes.iter().find(|(_, ep)| ep.trim().is_empty()) {
            return Err(ExchangeError::ConfigInvalidValue {
                key: format!("routes.{}", stream),
                message: "push endpoint name is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Push endpoint feeding `stream`: the configured route, or the stream's
    /// own name.
    pub fn source_for<'a>(&'a self, stream: &'a str) -> &'a str {
        self.routes.get(stream).map(String::as_str).unwrap_or(stream)
    }

    /// Every pull stream must resolve to a declared push endpoint.
    pub fn check_wiring(&self, registry: &EndpointRegistry) -> Result<()> {
        for (endpoint, streams) in registry.pull_endpoints() {
            for stream in streams {
                let source = self.source_for(stream);
                if !registry.has_push_endpoint(source) {
                    return Err(ExchangeError::EngineStartup {
                        message: format!(
                            "stream {} of pull endpoint {} has no source (push endpoint {} is not declared)",
                            stream, endpoint, source
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Ordered `dotted.path = value` overrides, last writer wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    entries: Vec<(String, String)>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Builder form of [`Overrides::push`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    /// Splits `key=value` at the first `=`.
    pub fn parse_arg(arg: &str) -> Result<(String, String)> {
        let (key, value) = arg.split_once('=').ok_or_else(|| ExchangeError::ConfigParse {
            message: format!("override '{}' is not of the form key=value", arg),
        })?;
        let key = key.trim();
        if key.is_empty() || key.split('.').any(str::is_empty) {
            return Err(ExchangeError::ConfigParse {
                message: format!("override '{}' has an invalid key", arg),
            });
        }
        Ok((key.to_string(), value.trim().to_string()))
    }

    /// Parses every `key=value` argument.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::new();
        for arg in args {
            let (key, value) = Self::parse_arg(arg.as_ref())?;
            overrides.push(key, value);
        }
        Ok(overrides)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes every override into `table`, creating intermediate tables.
    ///
    /// Values under `routes.` always stay strings, since they name push
    /// endpoints; elsewhere they are typed by [`typed_value`].
    pub fn apply(&self, table: &mut toml::Table) -> Result<()> {
        for (key, value) in &self.entries {
            let mut segments: Vec<&str> = key.split('.').collect();
            let value = if segments.first() == Some(&ROUTES_SECTION) {
                toml::Value::String(value.clone())
            } else {
                typed_value(value)
            };
            let Some(leaf) = segments.pop() else {
                continue;
            };
            let mut node = &mut *table;
            for segment in segments {
                let child = node
                    .entry(segment.to_string())
                    .or_insert(toml::Value::Table(toml::Table::new()));
                node = match child {
                    toml::Value::Table(inner) => inner,
                    _ => {
                        return Err(ExchangeError::ConfigInvalidValue {
                            key: key.clone(),
                            message: format!("'{}' is not a table", segment),
                        });
                    }
                };
            }
            node.insert(leaf.to_string(), value);
        }
        Ok(())
    }
}

/// Interprets override text as bool, then integer, then finite float, else
/// string. `inf` and `nan` stay strings.
fn typed_value(raw: &str) -> toml::Value {
    if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>()
        && f.is_finite()
    {
        toml::Value::Float(f)
    } else {
        toml::Value::String(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        temp_file
    }

    #[test]
    fn test_default_config_has_correct_values() {
        let config = EngineConfig::default();
        assert_eq!(config.engine.input_capacity, 1024);
        assert!(!config.engine.verbose);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_load_from_toml_file() {
        let temp_file = write_config(
            r#"
            [engine]
            input_capacity = 16
            verbose = true

            [routes]
            dec_output = "raw_audio"
            convstate_output = "convstate_input"
        "#,
        );

        let config = EngineConfig::load(temp_file.path()).unwrap();

        assert_eq!(config.engine.input_capacity, 16);
        assert!(config.engine.verbose);
        assert_eq!(config.source_for("dec_output"), "raw_audio");
        assert_eq!(config.source_for("convstate_output"), "convstate_input");
        assert_eq!(config.source_for("unrouted"), "unrouted");
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        let temp_file = write_config("");
        let config = EngineConfig::load(temp_file.path()).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_missing_file_is_reported() {
        let result = EngineConfig::load(Path::new("/tmp/nonexistent_streamgate_12345.toml"));
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let temp_file = write_config(
            r#"
            [engine
            verbose = "broken
        "#,
        );
        assert!(matches!(
            EngineConfig::load(temp_file.path()),
            Err(ExchangeError::Config(_))
        ));
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let result = EngineConfig::from_toml_str(
            "[engine]\ninput_capacity = \"lots\"\n",
            &Overrides::new(),
        );
        assert!(matches!(result, Err(ExchangeError::Config(_))));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = EngineConfig::from_toml_str(
            "[engine]\ninput_capacity = 0\n",
            &Overrides::new(),
        );
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let overrides = Overrides::new()
            .with("engine.input_capacity", "8")
            .with("engine.input_capacity", "32")
            .with("engine.verbose", "true");
        let config = EngineConfig::from_toml_str("", &overrides).unwrap();
        assert_eq!(config.engine.input_capacity, 32);
        assert!(config.engine.verbose);
    }

    #[test]
    fn test_override_creates_intermediate_tables() {
        let overrides = Overrides::new().with("routes.dec_output", "raw_audio");
        let config = EngineConfig::from_toml_str("", &overrides).unwrap();
        assert_eq!(config.source_for("dec_output"), "raw_audio");
    }

    #[test]
    fn test_override_through_scalar_fails() {
        let overrides = Overrides::new().with("engine.verbose.deep", "1");
        let result = EngineConfig::from_toml_str("[engine]\nverbose = false\n", &overrides);
        assert!(matches!(
            result,
            Err(ExchangeError::ConfigInvalidValue { .. })
        ));
    }

    #[test]
    fn test_override_file_values() {
        let temp_file = write_config("[engine]\ninput_capacity = 4\n");
        let overrides = Overrides::from_args(["engine.input_capacity=64"]).unwrap();
        let config = EngineConfig::load_with_overrides(temp_file.path(), &overrides).unwrap();
        assert_eq!(config.engine.input_capacity, 64);
    }

    #[test]
    fn test_parse_arg_splits_at_first_equals() {
        let (key, value) = Overrides::parse_arg("routes.out=a=b").unwrap();
        assert_eq!(key, "routes.out");
        assert_eq!(value, "a=b");
    }

    #[test]
    fn test_parse_arg_rejects_malformed() {
        assert!(Overrides::parse_arg("no_equals").is_err());
        assert!(Overrides::parse_arg("=value").is_err());
        assert!(Overrides::parse_arg("a..b=1").is_err());
    }

    #[test]
    fn test_route_overrides_stay_strings() {
        let overrides = Overrides::new()
            .with("routes.dec_output", "true")
            .with("routes.convstate_output", "1")
            .with("routes.dec_tentative_output", "nan");
        let config = EngineConfig::from_toml_str("", &overrides).unwrap();
        assert_eq!(config.routes["dec_output"], "true");
        assert_eq!(config.routes["convstate_output"], "1");
        assert_eq!(config.routes["dec_tentative_output"], "nan");
    }

    #[test]
    fn test_non_finite_text_stays_string() {
        assert_eq!(typed_value("inf"), toml::Value::String("inf".into()));
        assert_eq!(typed_value("NaN"), toml::Value::String("NaN".into()));
    }

    #[test]
    fn test_typed_values() {
        assert_eq!(typed_value("true"), toml::Value::Boolean(true));
        assert_eq!(typed_value("42"), toml::Value::Integer(42));
        assert_eq!(typed_value("0.5"), toml::Value::Float(0.5));
        assert_eq!(
            typed_value("hello"),
            toml::Value::String("hello".to_string())
        );
    }

    #[test]
    fn test_check_wiring_identity_and_routes() {
        let mut registry = EndpointRegistry::new();
        registry.add_push_endpoint("raw_audio").unwrap();
        registry.add_pull_endpoint("echo", ["raw_audio"]).unwrap();
        assert!(EngineConfig::default().check_wiring(&registry).is_ok());

        registry.add_pull_endpoint("results", ["dec_output"]).unwrap();
        assert!(matches!(
            EngineConfig::default().check_wiring(&registry),
            Err(ExchangeError::EngineStartup { .. })
        ));

        let routed = EngineConfig::from_toml_str(
            "[routes]\ndec_output = \"raw_audio\"\n",
            &Overrides::new(),
        )
        .unwrap();
        assert!(routed.check_wiring(&registry).is_ok());
    }
}
