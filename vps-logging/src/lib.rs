//! Tracing setup for the fleet manager binaries.
//!
//! Configured entirely from the environment:
//! `LOG_LEVEL`, `LOG_OUTPUT` (console|file|both), `LOG_FORMAT` (human|json),
//! `LOG_FILE_PATH`, and `LOG_TAGS` (comma separated `key:value` span filters,
//! e.g. `tenant:1234,op:create`).

use std::{
    collections::HashMap,
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{field::Visit, span, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Context, Layer},
    prelude::*,
    registry, EnvFilter,
};

const DEFAULT_LOG_FILE: &str = "/tmp/vps.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub json: bool,
    pub file_path: PathBuf,
    pub tags: Vec<(String, String)>,
}

impl LogSettings {
    pub fn from_env() -> Self {
        let var = |key: &str| env::var(key).ok();
        Self::from_values(
            var("LOG_LEVEL").as_deref(),
            var("LOG_OUTPUT").as_deref(),
            var("LOG_FORMAT").as_deref(),
            var("LOG_FILE_PATH").as_deref(),
            var("LOG_TAGS").as_deref(),
        )
    }

    fn from_values(
        level: Option<&str>,
        output: Option<&str>,
        format: Option<&str>,
        file_path: Option<&str>,
        tags: Option<&str>,
    ) -> Self {
        let output = match output.unwrap_or("console") {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            "none" | "off" => LogOutput::Off,
            _ => LogOutput::Console,
        };

        Self {
            level: level.unwrap_or("info").to_string(),
            output,
            json: format == Some("json"),
            file_path: PathBuf::from(file_path.unwrap_or(DEFAULT_LOG_FILE)),
            tags: tags.map(parse_tags).unwrap_or_default(),
        }
    }
}

fn parse_tags(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|s| {
            let (key, value) = s.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

// Writes every line to both console and file
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A: Write, B: Write> Write for Tee<A, B> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a>,
    B: MakeWriter<'a>,
{
    type Writer = Tee<A::Writer, B::Writer>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// Drops events unless every configured tag matches a field on an enclosing span.
struct TagFilterLayer {
    filters: Vec<(String, String)>,
}

impl<S> Layer<S> for TagFilterLayer
where
    S: Subscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut fields = HashMap::new();
            attrs.record(&mut FieldVisitor(&mut fields));
            span.extensions_mut().insert(fields);
        }
    }

    fn enabled(&self, _meta: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        if self.filters.is_empty() {
            return true;
        }

        let Some(scope) = ctx.current_span().id().and_then(|id| ctx.span_scope(id)) else {
            return false;
        };

        let mut all_fields = HashMap::new();
        for span_ref in scope {
            if let Some(fields) = span_ref.extensions().get::<HashMap<String, String>>() {
                for (k, v) in fields {
                    all_fields.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        self.filters.iter().all(|(key, value)| {
            all_fields
                .get(key)
                .is_some_and(|found| value == "*" || found.contains(value.as_str()))
        })
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

fn env_filter(level: &str) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    for directive in ["tokio=warn", "hyper=warn", "tower_http=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }
    filter
}

/// Initializes the global tracing subscriber from `LOG_*` environment variables.
///
/// The returned guard must be kept alive for file output to be flushed.
pub fn init_subscriber() -> Option<WorkerGuard> {
    init_with(LogSettings::from_env())
}

pub fn init_with(settings: LogSettings) -> Option<WorkerGuard> {
    let subscriber = registry()
        .with(env_filter(&settings.level))
        .with(TagFilterLayer {
            filters: settings.tags.clone(),
        });

    let log_dir = settings
        .file_path
        .parent()
        .unwrap_or_else(|| Path::new("/tmp"))
        .to_path_buf();
    let log_filename = settings
        .file_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "vps.log".into());

    // Each branch builds a differently-typed writer, so the fmt layer is set up per branch.
    macro_rules! install {
        ($writer:expr) => {{
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer($writer);
            if settings.json {
                subscriber.with(fmt_layer.json()).init();
            } else {
                subscriber.with(fmt_layer.pretty()).init();
            }
        }};
    }

    match settings.output {
        LogOutput::Console => {
            install!(std::io::stdout);
            None
        }
        LogOutput::File => {
            let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            install!(non_blocking);
            Some(guard)
        }
        LogOutput::Both => {
            let appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            install!(MakeTee {
                make_a: std::io::stdout,
                make_b: non_blocking,
            });
            Some(guard)
        }
        LogOutput::Off => {
            subscriber.init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = LogSettings::from_values(None, None, None, None, None);
        assert_eq!(settings.level, "info");
        assert_eq!(settings.output, LogOutput::Console);
        assert!(!settings.json);
        assert_eq!(settings.file_path, PathBuf::from(DEFAULT_LOG_FILE));
        assert!(settings.tags.is_empty());
    }

    #[test]
    fn test_explicit_values() {
        let settings = LogSettings::from_values(
            Some("debug"),
            Some("both"),
            Some("json"),
            Some("/var/log/vps/api.log"),
            Some("tenant:42, op:create"),
        );
        assert_eq!(settings.level, "debug");
        assert_eq!(settings.output, LogOutput::Both);
        assert!(settings.json);
        assert_eq!(
            settings.tags,
            vec![
                ("tenant".to_string(), "42".to_string()),
                ("op".to_string(), "create".to_string())
            ]
        );
    }

    #[test]
    fn test_malformed_tags_are_skipped() {
        assert_eq!(
            parse_tags("novalue,:x,ok:1"),
            vec![("ok".to_string(), "1".to_string())]
        );
    }
}
