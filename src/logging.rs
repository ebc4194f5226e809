// ABOUTME: Tracing subscriber setup with host-prefixed, colorized command output.
// ABOUTME: Command lines render as "[prefix] message", each prefix in its own color.

use owo_colors::{AnsiColors, OwoColorize};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fmt::{self, Write as _};
use std::io::IsTerminal;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// Prefix colors, ANSI 31 through 37.
const PALETTE: [AnsiColors; 7] = [
    AnsiColors::Red,
    AnsiColors::Green,
    AnsiColors::Yellow,
    AnsiColors::Blue,
    AnsiColors::Magenta,
    AnsiColors::Cyan,
    AnsiColors::White,
];

/// Hands out palette colors to prefixes in first-seen order.
///
/// Starts one step into the palette so the first host isn't red.
#[derive(Debug)]
pub struct PrefixColorAssigner {
    seen: Mutex<Vec<String>>,
    offset: usize,
}

impl Default for PrefixColorAssigner {
    fn default() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            offset: 1,
        }
    }
}

impl PrefixColorAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Palette index for `prefix`, registering it if new.
    pub fn index(&self, prefix: &str) -> usize {
        let mut seen = self.seen.lock();
        let position = match seen.iter().position(|p| p == prefix) {
            Some(position) => position,
            None => {
                seen.push(prefix.to_string());
                seen.len() - 1
            }
        };
        (position + self.offset) % PALETTE.len()
    }

    pub fn color(&self, prefix: &str) -> AnsiColors {
        PALETTE[self.index(prefix)]
    }
}

/// Event formatter for the whole application.
///
/// Events carrying a `command_prefix` field are host output and render as
/// `[prefix] message`. Everything else renders as the bare message, with a
/// level tag for warnings and errors.
#[derive(Debug)]
pub struct CommandFormatter {
    colors: PrefixColorAssigner,
    ansi: bool,
}

impl CommandFormatter {
    pub fn new(ansi: bool) -> Self {
        Self {
            colors: PrefixColorAssigner::new(),
            ansi,
        }
    }

    /// Render one line without a trailing newline.
    pub fn render(&self, level: Level, prefix: Option<&str>, message: &str) -> String {
        let message_color = if level == Level::ERROR {
            Some(AnsiColors::Red)
        } else if level == Level::WARN {
            Some(AnsiColors::Yellow)
        } else {
            None
        };

        let body = match (self.ansi, message_color) {
            (true, Some(color)) => message.color(color).to_string(),
            _ => message.to_string(),
        };

        match prefix {
            Some(prefix) => {
                let tag = format!("[{prefix}]");
                if self.ansi {
                    format!("{} {body}", tag.color(self.colors.color(prefix)))
                } else {
                    format!("{tag} {body}")
                }
            }
            None if message_color.is_some() => {
                let tag = level.as_str().to_ascii_lowercase();
                format!("{tag}: {body}")
            }
            None => body,
        }
    }
}

impl<S, N> FormatEvent<S, N> for CommandFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut fields = EventFields::default();
        event.record(&mut fields);
        let line = self.render(
            *event.metadata().level(),
            fields.command_prefix.as_deref(),
            &fields.message,
        );
        writeln!(writer, "{line}")
    }
}

/// Collects the message, the command prefix, and any other fields as `k=v`.
#[derive(Debug, Default)]
struct EventFields {
    command_prefix: Option<String>,
    message: String,
}

impl EventFields {
    fn push(&mut self, field: &Field, value: String) {
        match field.name() {
            "command_prefix" => self.command_prefix = Some(value),
            "message" => {
                if self.message.is_empty() {
                    self.message = value;
                } else {
                    self.message.insert_str(0, &format!("{value} "));
                }
            }
            name => {
                let _ = write!(self.message, " {name}={value}");
            }
        }
    }
}

impl Visit for EventFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }
}

/// Whether ANSI colors should be used on stderr (see <https://no-color.org>).
pub fn color_enabled() -> bool {
    color_enabled_for(std::env::var_os("NO_COLOR"), std::io::stderr().is_terminal())
}

fn color_enabled_for(no_color: Option<OsString>, is_tty: bool) -> bool {
    let disabled = no_color.is_some_and(|v| !v.is_empty());
    is_tty && !disabled
}

/// Build the log filter from `RUST_LOG`, or from the verbosity count.
pub fn create_env_filter(verbosity: u8) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbosity {
            0 => EnvFilter::new("fleetrun=info"),
            1 => EnvFilter::new("fleetrun=debug"),
            _ => EnvFilter::new("trace"),
        }
    }
}

/// Install the global subscriber writing to stderr.
pub fn init(verbosity: u8) {
    tracing_subscriber::fmt()
        .with_env_filter(create_env_filter(verbosity))
        .with_writer(std::io::stderr)
        .event_format(CommandFormatter::new(color_enabled()))
        .init();
}
