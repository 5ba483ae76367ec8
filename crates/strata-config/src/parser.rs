//! Format parsers.
//!
//! A [`Parser`] decodes the bytes of a reader into a [`Partial`]. Parsers are
//! selected by declared format through a [`ParserFactory`], an ordered list of
//! [`ParserCreator`]s where the first creator accepting the format wins.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use strata_config::ParserFactory;
//!
//! let factory = ParserFactory::default();
//! let partial = factory
//!     .parse("json", Box::new(Cursor::new(r#"{"server": {"port": 8080}}"#)))
//!     .unwrap();
//!
//! assert_eq!(partial.int("server.port").unwrap(), 8080);
//! ```

use std::io::Read;

use crate::{convert, ConfigError, ConfigResult, Partial, Value};

/// Reader handed to a parser.
pub type ParserReader = Box<dyn Read + Send>;

/// Decodes a reader into a partial.
pub trait Parser: Send {
    /// Decode the whole reader.
    fn parse(&mut self) -> ConfigResult<Partial>;

    /// Release the reader. Calling it more than once is a no-op.
    fn close(&mut self) -> ConfigResult<()>;
}

/// Builds parsers for the formats it accepts.
pub trait ParserCreator: Send + Sync {
    /// Returns true if this creator handles the format.
    fn accept(&self, format: &str) -> bool;

    /// Create a parser over the reader.
    fn create(&self, reader: ParserReader) -> ConfigResult<Box<dyn Parser>>;
}

/// Ordered registry of parser creators.
pub struct ParserFactory {
    creators: Vec<Box<dyn ParserCreator>>,
}

impl ParserFactory {
    /// Create a factory with no creators registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            creators: Vec::new(),
        }
    }

    /// Append a creator. Earlier registrations take precedence.
    pub fn register(&mut self, creator: impl ParserCreator + 'static) -> &mut Self {
        self.creators.push(Box::new(creator));
        self
    }

    /// Create a parser for the format.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFormat` if no creator accepts the format.
    pub fn create(&self, format: &str, reader: ParserReader) -> ConfigResult<Box<dyn Parser>> {
        self.creators
            .iter()
            .find(|creator| creator.accept(format))
            .ok_or_else(|| ConfigError::invalid_format(format))?
            .create(reader)
    }

    /// Create a parser for the format, parse the reader and close the parser.
    ///
    /// The parser is closed even when parsing fails.
    pub fn parse(&self, format: &str, reader: ParserReader) -> ConfigResult<Partial> {
        let mut parser = self.create(format, reader)?;
        let parsed = parser.parse();
        let closed = parser.close();
        let partial = parsed?;
        closed?;
        Ok(partial)
    }
}

impl Default for ParserFactory {
    /// Factory with the JSON, YAML and TOML parsers registered.
    fn default() -> Self {
        let mut factory = Self::new();
        factory
            .register(JsonParserCreator)
            .register(YamlParserCreator)
            .register(TomlParserCreator);
        factory
    }
}

impl std::fmt::Debug for ParserFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserFactory")
            .field("creators", &self.creators.len())
            .finish()
    }
}

// Shared by the decoder parsers: owns the reader until parse or close.
struct Source {
    format: &'static str,
    reader: Option<ParserReader>,
}

impl Source {
    fn new(format: &'static str, reader: ParserReader) -> Self {
        Self {
            format,
            reader: Some(reader),
        }
    }

    fn read(&mut self) -> ConfigResult<String> {
        let mut reader = self.reader.take().ok_or(ConfigError::NilArgument("reader"))?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| ConfigError::parse(self.format, e))?;
        Ok(content)
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn into_partial(&self, value: Value) -> ConfigResult<Partial> {
        match value {
            Value::Partial(partial) => Ok(partial),
            Value::Null => Ok(Partial::new()),
            other => Err(ConfigError::parse(
                self.format,
                format!("top-level value is a {}, expected a map", other.type_name()),
            )),
        }
    }
}

/// JSON parser.
pub struct JsonParser {
    source: Source,
}

impl JsonParser {
    /// Create a parser over the reader.
    pub fn new(reader: ParserReader) -> Self {
        Self {
            source: Source::new("json", reader),
        }
    }
}

impl Parser for JsonParser {
    fn parse(&mut self) -> ConfigResult<Partial> {
        let content = self.source.read()?;
        if content.trim().is_empty() {
            return Ok(Partial::new());
        }
        let decoded: serde_json::Value =
            serde_json::from_str(&content).map_err(|e| ConfigError::parse("json", e))?;
        self.source.into_partial(convert(decoded)?)
    }

    fn close(&mut self) -> ConfigResult<()> {
        self.source.close();
        Ok(())
    }
}

/// YAML parser.
pub struct YamlParser {
    source: Source,
}

impl YamlParser {
    /// Create a parser over the reader.
    pub fn new(reader: ParserReader) -> Self {
        Self {
            source: Source::new("yaml", reader),
        }
    }
}

impl Parser for YamlParser {
    fn parse(&mut self) -> ConfigResult<Partial> {
        let content = self.source.read()?;
        if content.trim().is_empty() {
            return Ok(Partial::new());
        }
        let decoded: serde_yaml::Value =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::parse("yaml", e))?;
        self.source.into_partial(convert(decoded)?)
    }

    fn close(&mut self) -> ConfigResult<()> {
        self.source.close();
        Ok(())
    }
}

/// TOML parser.
pub struct TomlParser {
    source: Source,
}

impl TomlParser {
    /// Create a parser over the reader.
    pub fn new(reader: ParserReader) -> Self {
        Self {
            source: Source::new("toml", reader),
        }
    }
}

impl Parser for TomlParser {
    fn parse(&mut self) -> ConfigResult<Partial> {
        let content = self.source.read()?;
        let decoded: toml::Value =
            toml::from_str(&content).map_err(|e| ConfigError::parse("toml", e))?;
        self.source.into_partial(convert(decoded)?)
    }

    fn close(&mut self) -> ConfigResult<()> {
        self.source.close();
        Ok(())
    }
}

/// Creates [`JsonParser`]s for the `json` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonParserCreator;

impl ParserCreator for JsonParserCreator {
    fn accept(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("json")
    }

    fn create(&self, reader: ParserReader) -> ConfigResult<Box<dyn Parser>> {
        Ok(Box::new(JsonParser::new(reader)))
    }
}

/// Creates [`YamlParser`]s for the `yaml` and `yml` formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlParserCreator;

impl ParserCreator for YamlParserCreator {
    fn accept(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("yaml") || format.eq_ignore_ascii_case("yml")
    }

    fn create(&self, reader: ParserReader) -> ConfigResult<Box<dyn Parser>> {
        Ok(Box::new(YamlParser::new(reader)))
    }
}

/// Creates [`TomlParser`]s for the `toml` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TomlParserCreator;

impl ParserCreator for TomlParserCreator {
    fn accept(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("toml")
    }

    fn create(&self, reader: ParserReader) -> ConfigResult<Box<dyn Parser>> {
        Ok(Box::new(TomlParser::new(reader)))
    }
}
